//! A sparse, tiled pixel grid with undo and redo.
//!
//! [TiledDataManager] stores pixels as fixed-size tiles from `tessera_swap`, materialized on first write.  Mementos
//! record what every write replaced so it can be rolled back; iterators walk pixel regions without exposing tiles.
mod bulk;
mod coords;
mod data_manager;
mod errors;
mod hash_table;
mod iterators;
mod memento;
mod store;


pub use coords::{calc_tile_hash, floor_div, tile_from_pixel, PixelRect, TileCoord, HASH_TABLE_SIZE};
pub use data_manager::*;
pub use errors::*;
pub use iterators::*;
pub use memento::{ChangeKind, Memento, MementoState};
pub use tessera_swap::{SwapConfig, TileManager, TILE_HEIGHT, TILE_WIDTH};
