use thiserror::Error;

/// Reasons a queue operation is rejected. A rejected call never mutates the queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Error)]
pub enum QueueError {
    #[error("bounded queue cannot have a capacity of 0 items")]
    InvalidCapacity,
    #[error("bounded queue is full")]
    Full,
    #[error("bounded queue is empty")]
    Empty,
}
