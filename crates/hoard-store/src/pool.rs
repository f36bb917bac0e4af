//! Bounded pool of store connections.
//!
//! At most `max_active` connections are checked out at once; further
//! checkouts wait. Returned connections are kept (up to `max_idle`) and
//! handed out most-recently-used first after a liveness ping. Idle
//! connections older than `idle_timeout_secs` are dropped instead of reused.

use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use serde::Deserialize;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::{debug, warn};

use crate::error::StoreError;
use crate::traits::{BlobConn, BlobStore};

/// Connection pool limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Maximum connections checked out concurrently.
    pub max_active: usize,
    /// Maximum connections kept for reuse.
    pub max_idle: usize,
    /// Idle connections older than this are closed. Zero disables expiry.
    pub idle_timeout_secs: u64,
}

impl PoolConfig {
    pub fn idle_timeout(&self) -> Option<Duration> {
        (self.idle_timeout_secs > 0).then(|| Duration::from_secs(self.idle_timeout_secs))
    }
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_active: 50,
            max_idle: 50,
            idle_timeout_secs: 240,
        }
    }
}

struct IdleConn {
    conn: Box<dyn BlobConn>,
    returned_at: Instant,
}

struct Shared {
    idle: Mutex<Vec<IdleConn>>,
    max_idle: usize,
    closed: AtomicBool,
}

/// Pool of connections to a [`BlobStore`].
pub struct ConnPool {
    store: Arc<dyn BlobStore>,
    config: PoolConfig,
    permits: Arc<Semaphore>,
    shared: Arc<Shared>,
}

impl ConnPool {
    pub fn new(store: Arc<dyn BlobStore>, config: PoolConfig) -> Self {
        Self {
            store,
            permits: Arc::new(Semaphore::new(config.max_active.max(1))),
            shared: Arc::new(Shared {
                idle: Mutex::new(Vec::with_capacity(config.max_idle)),
                max_idle: config.max_idle,
                closed: AtomicBool::new(false),
            }),
            config,
        }
    }

    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    /// Check out a connection, waiting while `max_active` are in use.
    pub async fn get(&self) -> Result<PooledConn, StoreError> {
        let permit = Arc::clone(&self.permits)
            .acquire_owned()
            .await
            .map_err(|_| StoreError::PoolClosed)?;

        while let Some(idle) = self.pop_idle() {
            if is_expired(idle.returned_at, Instant::now(), self.config.idle_timeout()) {
                debug!("closing expired idle connection");
                continue;
            }
            let mut conn = idle.conn;
            match conn.ping().await {
                Ok(()) => return Ok(PooledConn::new(conn, permit, &self.shared)),
                Err(e) => warn!(error = %e, "idle connection failed ping, discarding"),
            }
        }

        let conn = self.store.connect().await?;
        debug!("opened new store connection");
        Ok(PooledConn::new(conn, permit, &self.shared))
    }

    /// Stop handing out connections and drop the idle ones.
    ///
    /// Connections already checked out stay usable; they are closed when
    /// returned.
    pub fn close(&self) {
        self.shared.closed.store(true, Ordering::Release);
        self.permits.close();
        self.shared.idle.lock().expect("lock poisoned").clear();
    }

    pub fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::Acquire)
    }

    /// Connections parked for reuse.
    pub fn idle_count(&self) -> usize {
        self.shared.idle.lock().expect("lock poisoned").len()
    }

    /// Checkouts that can proceed without waiting.
    pub fn available(&self) -> usize {
        self.permits.available_permits()
    }

    fn pop_idle(&self) -> Option<IdleConn> {
        self.shared.idle.lock().expect("lock poisoned").pop()
    }
}

fn is_expired(returned_at: Instant, now: Instant, timeout: Option<Duration>) -> bool {
    match timeout {
        Some(timeout) => now.saturating_duration_since(returned_at) >= timeout,
        None => false,
    }
}

/// A checked-out connection. Returned to the pool on drop.
pub struct PooledConn {
    conn: Option<Box<dyn BlobConn>>,
    reusable: bool,
    shared: Arc<Shared>,
    _permit: OwnedSemaphorePermit,
}

impl PooledConn {
    fn new(conn: Box<dyn BlobConn>, permit: OwnedSemaphorePermit, shared: &Arc<Shared>) -> Self {
        Self {
            conn: Some(conn),
            reusable: true,
            shared: Arc::clone(shared),
            _permit: permit,
        }
    }

    /// Close this connection instead of returning it to the pool.
    ///
    /// Used after a call failed and the connection state is unknown.
    pub fn discard(mut self) {
        self.conn = None;
    }

    /// Mark whether the connection may go back to the pool when dropped.
    ///
    /// Set to `false` while a transaction is open, so a guard dropped
    /// mid-transaction (e.g. a cancelled task) closes the connection and the
    /// store discards the transaction with it.
    pub fn set_reusable(&mut self, reusable: bool) {
        self.reusable = reusable;
    }
}

impl Deref for PooledConn {
    type Target = dyn BlobConn;

    fn deref(&self) -> &Self::Target {
        self.conn.as_deref().expect("connection present until drop")
    }
}

impl DerefMut for PooledConn {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.conn.as_deref_mut().expect("connection present until drop")
    }
}

impl Drop for PooledConn {
    fn drop(&mut self) {
        let Some(conn) = self.conn.take() else {
            return;
        };
        if !self.reusable || self.shared.closed.load(Ordering::Acquire) {
            return;
        }
        let mut idle = self.shared.idle.lock().expect("lock poisoned");
        if idle.len() < self.shared.max_idle {
            idle.push(IdleConn {
                conn,
                returned_at: Instant::now(),
            });
        }
    }
}
