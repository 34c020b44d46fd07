//! The sparse tile grid.
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use log::*;
use tessera_swap::{Tile, TileHandle, TileManager, TILE_WIDTH};

use crate::coords::*;
use crate::errors::*;
use crate::hash_table::TileTable;
use crate::memento::{Memento, MementoRef, OldTile};

static NEXT_GRID_ID: AtomicU64 = AtomicU64::new(0);

/// An unbounded grid of pixels, stored as a sparse set of tiles.
///
/// Cells which were never written read as the default pixel, through one shared default tile.  Writing materializes a
/// tile as a copy of the default tile and records it into the open memento, if any.
///
/// Not internally synchronized; share between threads behind a lock.
pub struct TiledDataManager {
    pub(crate) id: u64,
    pub(crate) manager: Arc<TileManager>,
    pub(crate) pixel_size: usize,
    pub(crate) default_pixel: Vec<u8>,
    /// Pinned for the grid's lifetime.
    pub(crate) default_tile: Tile,
    pub(crate) tiles: TileTable<Tile>,
    /// `None` for an empty grid.
    pub(crate) extent: Option<PixelRect>,
    pub(crate) current_memento: Option<Memento>,
    /// Mementos which may still be rolled back, oldest first.
    pub(crate) history: Vec<MementoRef>,
    /// Rolled back mementos, oldest rollback first.
    pub(crate) redo: Vec<MementoRef>,
}

impl TiledDataManager {
    /// A grid of `pixel_size` byte pixels, which reads as `default_pixel` everywhere.
    pub fn new(
        manager: Arc<TileManager>,
        pixel_size: usize,
        default_pixel: &[u8],
    ) -> Result<TiledDataManager> {
        if pixel_size == 0 || default_pixel.len() != pixel_size {
            return Err(Error::PixelSizeMismatch {
                expected: pixel_size,
                actual: default_pixel.len(),
            });
        }

        let default_tile = Tile::new_filled(&manager, 0, 0, default_pixel)?;
        default_tile.handle().pin()?;

        let id = NEXT_GRID_ID.fetch_add(1, Ordering::Relaxed);
        debug!("Created grid {} with pixel size {}", id, pixel_size);
        Ok(TiledDataManager {
            id,
            manager,
            pixel_size,
            default_pixel: default_pixel.to_vec(),
            default_tile,
            tiles: TileTable::new(),
            extent: None,
            current_memento: None,
            history: vec![],
            redo: vec![],
        })
    }

    /// Like [Self::new], using [TileManager::shared].
    pub fn with_shared_manager(pixel_size: usize, default_pixel: &[u8]) -> Result<TiledDataManager> {
        TiledDataManager::new(TileManager::shared(), pixel_size, default_pixel)
    }

    /// A deep copy of the grid's content, default pixel and extent.  Undo history is not copied.
    pub fn try_clone(&self) -> Result<TiledDataManager> {
        let mut copy = TiledDataManager::new(self.manager.clone(), self.pixel_size, &self.default_pixel)?;
        for (coord, tile) in self.tiles.iter() {
            copy.tiles.insert(coord, tile.try_clone()?);
        }
        copy.extent = self.extent;
        Ok(copy)
    }

    pub fn pixel_size(&self) -> usize {
        self.pixel_size
    }

    pub fn manager(&self) -> &Arc<TileManager> {
        &self.manager
    }

    pub fn default_pixel(&self) -> &[u8] {
        &self.default_pixel
    }

    /// Change what never-written pixels read as.  Recorded by the open memento.
    pub fn set_default_pixel(&mut self, pixel: &[u8]) -> Result<()> {
        self.check_pixel(pixel)?;
        self.touch();
        if let Some(m) = &self.current_memento {
            m.record_default_pixel(&self.default_pixel);
        }
        self.fill_default_tile(pixel)
    }

    pub(crate) fn fill_default_tile(&mut self, pixel: &[u8]) -> Result<()> {
        self.default_tile.fill(pixel)?;
        self.default_pixel = pixel.to_vec();
        Ok(())
    }

    pub(crate) fn check_pixel(&self, pixel: &[u8]) -> Result<()> {
        if pixel.len() != self.pixel_size {
            return Err(Error::PixelSizeMismatch {
                expected: self.pixel_size,
                actual: pixel.len(),
            });
        }
        Ok(())
    }

    /// Note a change to the grid which isn't an undo or redo.  Nothing can be rolled forward afterwards.
    pub(crate) fn touch(&mut self) {
        if !self.redo.is_empty() {
            trace!("Grid {}: discarding {} redo steps", self.id, self.redo.len());
            self.redo.clear();
        }
    }

    pub fn has_tile(&self, col: i32, row: i32) -> bool {
        self.tiles.contains(TileCoord::new(col, row))
    }

    /// The tile at `(col, row)` for reading: the stored one, or the shared default tile.
    ///
    /// The default tile is labelled `(0, 0)` whatever the coordinates asked for.
    pub fn get_tile(&self, col: i32, row: i32) -> &Tile {
        self.tiles
            .get(TileCoord::new(col, row))
            .unwrap_or(&self.default_tile)
    }

    /// The tile at `(col, row)` for writing, created from the default tile if missing.
    ///
    /// The open memento records the tile the first time it is asked for.
    pub fn get_tile_mut(&mut self, col: i32, row: i32) -> Result<&mut Tile> {
        let coord = TileCoord::new(col, row);
        self.touch();

        match self.tiles.get(coord) {
            Some(existing) => {
                if let Some(m) = &self.current_memento {
                    m.record_modified(coord, existing)?;
                }
            }
            None => {
                let tile = self.default_tile.try_clone_at(col, row)?;
                if let Some(m) = &self.current_memento {
                    m.record_created(coord);
                }
                self.tiles.insert(coord, tile);
                self.add_to_extent(coord);
            }
        }

        Ok(self
            .tiles
            .get_mut(coord)
            .expect("The tile was found or inserted above"))
    }

    /// Remove a tile, so that it reads as the default again.  Recorded by the open memento.
    ///
    /// Returns whether there was a tile.  The extent is left alone.
    pub fn remove_tile(&mut self, col: i32, row: i32) -> bool {
        self.touch();
        self.remove_tile_recorded(TileCoord::new(col, row))
    }

    pub(crate) fn remove_tile_recorded(&mut self, coord: TileCoord) -> bool {
        match self.tiles.remove(coord) {
            Some(tile) => {
                if let Some(m) = &self.current_memento {
                    m.record_deleted(coord, tile);
                }
                true
            }
            None => false,
        }
    }

    /// The tile whose bytes count as "old" for `coord`: the open memento's copy, else the current tile.
    pub(crate) fn old_tile_handle(&self, coord: TileCoord) -> TileHandle {
        if let Some(m) = &self.current_memento {
            match m.old_tile(coord) {
                OldTile::Snapshot(h) => return h,
                OldTile::Absent => return self.default_tile.handle().clone(),
                OldTile::Unrecorded => {}
            }
        }

        self.get_tile(coord.col, coord.row).handle().clone()
    }

    pub fn num_tiles(&self) -> usize {
        self.tiles.len()
    }

    /// Coordinates of every materialized tile, in storage order.
    pub fn tile_coords(&self) -> Vec<TileCoord> {
        self.tiles.coords()
    }

    /// The pixel rect of every materialized tile.
    pub fn region(&self) -> Vec<PixelRect> {
        self.tiles.iter().map(|(c, _)| c.pixel_rect()).collect()
    }

    fn add_to_extent(&mut self, coord: TileCoord) {
        let rect = coord.pixel_rect();
        self.extent = Some(match self.extent {
            Some(e) => e.united(&rect),
            None => rect,
        });
    }

    /// Bounding rect of everything written, in pixels.  Empty grids report `(0, 0, 0, 0)`.
    pub fn extent(&self) -> PixelRect {
        self.extent.unwrap_or_default()
    }

    /// Recompute the extent as the bounding rect of the tiles actually present.
    pub fn recalculate_extent(&mut self) {
        self.extent = self
            .tiles
            .iter()
            .map(|(c, _)| c.pixel_rect())
            .reduce(|a, b| a.united(&b));
    }

    /// Crop or extend the grid to `rect`.
    ///
    /// Tiles entirely outside are removed and pixels outside in the remaining tiles reset to the default pixel.  The
    /// extent becomes exactly `rect`.
    pub fn set_extent(&mut self, rect: PixelRect) -> Result<()> {
        let rect = rect.normalized();
        self.touch();

        for coord in self.tiles.coords() {
            let tile_rect = coord.pixel_rect();
            if rect.contains_rect(&tile_rect) {
                continue;
            }
            if !tile_rect.intersects(&rect) {
                self.remove_tile_recorded(coord);
                continue;
            }

            let inside = tile_rect.intersection(&rect);
            let default = self.default_pixel.clone();
            let ps = self.pixel_size;
            let tile = self.get_tile_mut(coord.col, coord.row)?;
            let mut data = tile.write()?;
            for y in 0..TILE_H {
                for x in 0..TILE_W {
                    if !inside.contains(tile_rect.x + x, tile_rect.y + y) {
                        let offset = (y as usize * TILE_WIDTH + x as usize) * ps;
                        data[offset..offset + ps].copy_from_slice(&default);
                    }
                }
            }
        }

        self.extent = if rect.is_empty() { None } else { Some(rect) };
        Ok(())
    }

    /// How many columns starting at `x` lie in the same tile.
    pub fn num_contiguous_columns(&self, x: i32) -> usize {
        (TILE_W - x.rem_euclid(TILE_W)) as usize
    }

    /// How many rows starting at `y` lie in the same tile.
    pub fn num_contiguous_rows(&self, y: i32) -> usize {
        (TILE_H - y.rem_euclid(TILE_H)) as usize
    }

    /// Bytes between vertically adjacent pixels of a tile.
    pub fn row_stride(&self) -> usize {
        TILE_WIDTH * self.pixel_size
    }
}

impl std::fmt::Debug for TiledDataManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TiledDataManager")
            .field("id", &self.id)
            .field("pixel_size", &self.pixel_size)
            .field("tiles", &self.tiles.len())
            .field("extent", &self.extent())
            .finish()
    }
}
