//! Tile buffers and the process-wide machinery which owns them.
//!
//! Tile bytes come out of fixed-size pools where possible, and a [TileManager] moves the bytes of cold tiles out to a
//! memory-mapped swap file once too many are resident.  The grid itself lives in `tessera_tiles`; this crate knows
//! nothing about coordinates beyond labelling tiles.
mod buffer;
mod config;
mod errors;
mod manager;
mod swap_file;
mod tile;


pub use buffer::{PoolStats, TileBuffer};
pub use config::*;
pub use errors::*;
pub use manager::*;
pub use tile::*;

/// Width of every tile, in pixels.
pub const TILE_WIDTH: usize = 64;

/// Height of every tile, in pixels.
pub const TILE_HEIGHT: usize = 64;

/// Number of pixels in a tile.
pub const TILE_PIXELS: usize = TILE_WIDTH * TILE_HEIGHT;

/// Size of one tile's buffer, in bytes.
pub const fn tile_bytes(pixel_size: usize) -> usize {
    TILE_PIXELS * pixel_size
}
