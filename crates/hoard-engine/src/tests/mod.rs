//! Tests for the hoard-engine crate.

pub(crate) mod helpers;

mod failures;
