//! Error types.

use thiserror::Error;

pub type RingResult<T> = Result<T, RingError>;

#[derive(Debug, Error)]
pub enum RingError {
    #[error("Backing object already exists: {0}")]
    AlreadyExists(String),

    #[error("Backing object does not exist: {0}")]
    DoesNotExist(String),

    #[error("Access denied: {0}")]
    AccessDenied(String),

    #[error("Name too long: {0}")]
    NameTooLong(String),

    #[error("File descriptor quota exceeded")]
    FdQuotaExceeded,

    #[error("Mirror mapping is not adjacent to the primary mapping")]
    MapsNotAdjacent,

    #[error("Size {size} is not a multiple of the allocation granularity {granularity}")]
    AllocationGranularity { size: usize, granularity: usize },

    #[error("Index {index} out of range: count is {count}")]
    IndexOutOfRange { index: u64, count: u64 },

    #[error("Window starting at {start} is behind the tail {tail}")]
    WindowCrossesTail { start: u64, tail: u64 },

    #[error("Invalid capacity")]
    InvalidCapacity,

    #[error("Config error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(String),

    #[error("Platform error: {0}")]
    Platform(String),
}

impl From<std::io::Error> for RingError {
    fn from(e: std::io::Error) -> Self {
        RingError::Io(e.to_string())
    }
}

impl RingError {
    /// True for errors that leave the handle unusable rather than just
    /// failing the operation.
    pub fn is_fatal_to_handle(&self) -> bool {
        matches!(self, RingError::MapsNotAdjacent)
    }
}
