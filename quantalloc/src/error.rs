use thiserror::Error;

/// Errors that can occur during pool operations
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum PoolError {
    /// No free block is large enough and the uncarved part of the pool cannot
    /// hold the request
    #[error("Out of memory")]
    OutOfMemory,
    /// The handle does not designate a block inside the carved region
    #[error("Invalid pointer")]
    InvalidPointer,
    /// The block overlaps memory that is already free
    #[error("Double free detected")]
    DoubleFree,
    /// The backing buffer cannot be addressed with 32-bit quantum indices
    #[error("Pool too large")]
    PoolTooLarge,
}

pub type Result<T> = core::result::Result<T, PoolError>;
