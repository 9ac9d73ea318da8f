use std::time::Duration;

use crate::protocol::MAX_MSGLEN;

#[derive(Debug, Clone)]
pub struct ChannelConfig {
    /// Largest datagram the channel will assemble, header included.
    pub max_msglen: usize,
    /// Peer rate in bytes per second.
    pub rate: usize,
    pub timeout: Duration,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            max_msglen: MAX_MSGLEN,
            rate: 25000,
            timeout: Duration::from_secs(120),
        }
    }
}

impl ChannelConfig {
    /// Capacity of the reliable accumulation buffer. Leaves room for the
    /// header and a little unreliable data in the same datagram.
    pub fn reliable_capacity(&self) -> usize {
        self.max_msglen.saturating_sub(16)
    }
}
