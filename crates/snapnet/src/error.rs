use std::io;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MsgError {
    #[error("overflow without allow_overflow set: {requested} bytes requested, {available} available")]
    Overflow { requested: usize, available: usize },
    #[error("{length} bytes is larger than the full buffer size {max_size}")]
    TooLarge { length: usize, max_size: usize },
    #[error("read past end of message: {requested} bytes requested, {available} available")]
    UnexpectedEnd { requested: usize, available: usize },
    #[error("entity number {0} is out of range")]
    InvalidEntityNumber(u32),
    #[error("direction index {0} is out of range")]
    InvalidDirection(u8),
}

#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error(transparent)]
    Message(#[from] MsgError),
    #[error("transport send failed: {0}")]
    Transport(#[from] io::Error),
}
