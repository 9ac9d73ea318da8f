/// Sliding window of the last `RATE_MESSAGES` transmit sizes.
pub const RATE_MESSAGES: usize = 10;

/// Fixed per-peer byte budget, checked before a snapshot is built.
///
/// The window covers the last ten sends, which is one second at the default
/// ten snapshots per second, so `rate` reads as bytes per second.
#[derive(Debug, Clone)]
pub struct RateBudget {
    rate: usize,
    sizes: [usize; RATE_MESSAGES],
    slot: usize,
}

impl RateBudget {
    pub fn new(rate: usize) -> Self {
        Self {
            rate,
            sizes: [0; RATE_MESSAGES],
            slot: 0,
        }
    }

    pub fn rate(&self) -> usize {
        self.rate
    }

    pub fn set_rate(&mut self, rate: usize) {
        self.rate = rate;
    }

    pub fn total(&self) -> usize {
        self.sizes.iter().sum()
    }

    pub fn record(&mut self, bytes: usize) {
        self.sizes[self.slot] = bytes;
        self.slot = (self.slot + 1) % RATE_MESSAGES;
    }

    /// Returns true when the budget is spent; the skipped frame counts as
    /// zero bytes so the window drains.
    pub fn should_drop(&mut self) -> bool {
        if self.total() > self.rate {
            self.record(0);
            return true;
        }
        false
    }
}
