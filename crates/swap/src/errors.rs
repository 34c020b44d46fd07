#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum SwapError {
    #[error("Unable to allocate a tile buffer of {bytes} bytes")]
    OutOfMemory { bytes: usize },

    #[error("Swap file I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("Swapping has been disabled for this process after an earlier failure")]
    SwapForbidden,

    #[error("Attempted to access a tile which was already deregistered")]
    TileReleased,

    #[error("Pixels must be at least one byte")]
    ZeroPixelSize,

    #[error("Expected {expected} bytes but got {actual}")]
    DataSizeMismatch { expected: usize, actual: usize },
}

pub type Result<T, E = SwapError> = std::result::Result<T, E>;
