use tessera_swap::SwapError;

/// Ways a memento can be used out of order.
#[derive(Debug, Clone, Copy, Eq, PartialEq, thiserror::Error)]
#[non_exhaustive]
pub enum MementoStateError {
    #[error("The memento belongs to a different grid")]
    WrongGrid,

    #[error("Mementos must be rolled back newest first")]
    NotLatest,

    #[error("Only a rolled back memento can be rolled forward")]
    NotRolledBack,

    #[error("The memento is already rolled back")]
    AlreadyRolledBack,

    #[error("The grid was modified after the rollback")]
    GridModified,

    #[error("Mementos must be rolled forward in the reverse order they were rolled back")]
    NotNextRedo,
}

#[derive(Debug, Clone, Eq, PartialEq, thiserror::Error)]
#[non_exhaustive]
pub enum ParseError {
    #[error("The stream is missing its tile count")]
    MissingTileCount,

    #[error("Invalid tile count {0:?}")]
    BadTileCount(String),

    #[error("Tile {index}: invalid header {line:?}")]
    BadTileHeader { index: usize, line: String },

    #[error("Tile {index}: expected a whole tile but got {width}x{height}")]
    UnexpectedTileSize { index: usize, width: i64, height: i64 },

    #[error("Tile {index}: origin ({x}, {y}) is not on the tile grid")]
    UnalignedTile { index: usize, x: i64, y: i64 },

    #[error("Tile ({col}, {row}) appears twice")]
    DuplicateTile { col: i32, row: i32 },

    #[error("Tile {index}: the stream ended inside the pixel data")]
    TruncatedTileData { index: usize },
}

#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    #[error("Unable to allocate {bytes} bytes of tile data")]
    OutOfMemory { bytes: usize },

    #[error("Invalid memento use: {0}")]
    InvalidMementoState(#[from] MementoStateError),

    #[error("Unable to parse tile store: {0}")]
    Parse(#[from] ParseError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Expected pixels of {expected} bytes but got {actual}")]
    PixelSizeMismatch { expected: usize, actual: usize },

    #[error("Buffer too small: need {expected} bytes but got {actual}")]
    BufferTooSmall { expected: usize, actual: usize },

    #[error("Attempted to write through a read-only iterator")]
    ReadOnlyIterator,

    #[error("The iterator is already past its last pixel")]
    IteratorDone,

    #[error("Asked for {requested} consecutive pixels but only {available} are left in this tile")]
    RunTooLong { requested: usize, available: usize },

    #[error("Tile swap failure: {0}")]
    Swap(SwapError),
}

impl From<SwapError> for Error {
    fn from(e: SwapError) -> Error {
        match e {
            SwapError::OutOfMemory { bytes } => Error::OutOfMemory { bytes },
            SwapError::Io(io) => Error::Io(io),
            other => Error::Swap(other),
        }
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
