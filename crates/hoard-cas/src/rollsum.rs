//! Rolling checksum over a fixed-size sliding window.
//!
//! Two running sums in the style of rsync/bup: `s1` is the sum of the window
//! bytes and `s2` weights each byte by its age. Both are updated in O(1) per
//! byte from the incoming byte and the byte leaving the window, and once the
//! window has filled they depend only on its contents. That makes split
//! points a local property of the data: an edit shifts boundaries only near
//! the edited region.

/// Added to every byte so runs of zeros still move the sums.
const CHAR_OFFSET: u32 = 31;

/// Split candidates occur when the low `SPLIT_BITS` bits of `s2` are all set,
/// i.e. roughly every 8 KiB of input.
const SPLIT_BITS: u32 = 13;
const SPLIT_MASK: u32 = (1 << SPLIT_BITS) - 1;

/// Rolling checksum over the last `window` bytes written.
#[derive(Debug, Clone)]
pub struct Rollsum {
    s1: u32,
    s2: u32,
    window: Box<[u8]>,
    pos: usize,
}

impl Rollsum {
    /// Create a checksum with an all-zero window of `window` bytes.
    ///
    /// # Panics
    ///
    /// Panics if `window` is 0.
    pub fn new(window: usize) -> Self {
        assert!(window > 0, "rollsum window must be non-empty");
        let w = window as u32;
        Self {
            s1: w.wrapping_mul(CHAR_OFFSET),
            s2: w.wrapping_mul(w.wrapping_sub(1)).wrapping_mul(CHAR_OFFSET),
            window: vec![0u8; window].into_boxed_slice(),
            pos: 0,
        }
    }

    /// Slide the window forward by one byte.
    #[inline]
    pub fn roll(&mut self, byte: u8) {
        let drop = u32::from(self.window[self.pos]);
        let add = u32::from(byte);
        let w = self.window.len() as u32;

        self.s1 = self.s1.wrapping_add(add).wrapping_sub(drop);
        self.s2 = self
            .s2
            .wrapping_add(self.s1)
            .wrapping_sub(w.wrapping_mul(drop + CHAR_OFFSET));

        self.window[self.pos] = byte;
        self.pos = (self.pos + 1) % self.window.len();
    }

    /// Feed a run of bytes.
    pub fn write(&mut self, data: &[u8]) {
        for &b in data {
            self.roll(b);
        }
    }

    /// Whether the current window position is a content-defined split candidate.
    #[inline]
    pub fn on_split(&self) -> bool {
        self.s2 & SPLIT_MASK == SPLIT_MASK
    }

    /// Combined 32-bit checksum of the current window.
    pub fn digest(&self) -> u32 {
        (self.s1 << 16) | (self.s2 & 0xffff)
    }

    pub fn window_size(&self) -> usize {
        self.window.len()
    }
}
