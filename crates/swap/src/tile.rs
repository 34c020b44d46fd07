use std::ops::{Deref, DerefMut};
use std::sync::{Arc, RwLockReadGuard, RwLockWriteGuard};

use crate::errors::*;
use crate::manager::{Residency, TileManager, TileSlot};
use crate::tile_bytes;

/// Where a tile's bytes currently are.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum TileResidency {
    InMemory,
    Swapped,
    /// The tile was deregistered; there are no bytes any more.
    Released,
}

/// A reference to one tile buffer, as tracked by its [TileManager].
///
/// Cloning a handle does not copy data.  Handles let code which only borrows a tile (iterators, mostly) pin it while
/// working on it.
#[derive(Clone)]
pub struct TileHandle {
    pub(crate) slot: Arc<TileSlot>,
    pub(crate) manager: Arc<TileManager>,
}

impl TileHandle {
    /// Unique among all handles of the same manager.
    pub fn id(&self) -> u64 {
        self.slot.id
    }

    pub fn pixel_size(&self) -> usize {
        self.slot.pixel_size
    }

    pub fn manager(&self) -> &Arc<TileManager> {
        &self.manager
    }

    /// Do these two handles refer to the same buffer?
    pub fn same_tile(&self, other: &TileHandle) -> bool {
        Arc::ptr_eq(&self.slot, &other.slot)
    }

    /// Load the tile and keep it in memory until a matching [Self::unpin].  Pins nest.
    pub fn pin(&self) -> Result<()> {
        self.manager.ensure_tile_loaded(self)
    }

    pub fn unpin(&self) {
        self.manager.may_swap_tile(self)
    }

    pub fn pin_count(&self) -> u32 {
        self.slot.pins()
    }

    pub fn is_registered(&self) -> bool {
        self.slot.is_registered()
    }

    pub fn residency(&self) -> TileResidency {
        match *crate::manager::read(&self.slot.data) {
            Residency::Resident(_) => TileResidency::InMemory,
            Residency::Swapped { .. } => TileResidency::Swapped,
            Residency::Released => TileResidency::Released,
        }
    }

    /// Shared access to the tile's bytes, reading them back from swap first if needed.
    ///
    /// Holding the guard keeps the tile in memory.
    pub fn read(&self) -> Result<TileReadGuard<'_>> {
        let (guard, pinned) = self.manager.load_read(&self.slot)?;
        Ok(TileReadGuard {
            guard: Some(guard),
            pinned: pinned.then(|| self),
        })
    }

    /// Exclusive access to the tile's bytes.  Don't hold this together with any other guard for the same tile.
    pub fn write(&self) -> Result<TileDataGuard<'_>> {
        let (guard, pinned) = self.manager.load_write(&self.slot)?;
        Ok(TileDataGuard {
            guard: Some(guard),
            pinned: pinned.then(|| self),
        })
    }
}

impl std::fmt::Debug for TileHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TileHandle")
            .field("id", &self.slot.id)
            .field("pixel_size", &self.slot.pixel_size)
            .finish()
    }
}

/// Exclusive access to a tile's bytes.
pub struct TileDataGuard<'a> {
    /// Always `Some` until dropped.
    guard: Option<RwLockWriteGuard<'a, Residency>>,
    /// The tile had to be faulted in and stays pinned while the guard lives.
    pinned: Option<&'a TileHandle>,
}

impl Deref for TileDataGuard<'_> {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        match self.guard.as_deref() {
            Some(Residency::Resident(b)) => b,
            _ => unreachable!("A locked tile is always resident"),
        }
    }
}

impl DerefMut for TileDataGuard<'_> {
    fn deref_mut(&mut self) -> &mut [u8] {
        match self.guard.as_deref_mut() {
            Some(Residency::Resident(b)) => b,
            _ => unreachable!("A locked tile is always resident"),
        }
    }
}

impl Drop for TileDataGuard<'_> {
    fn drop(&mut self) {
        self.guard.take();
        if let Some(handle) = self.pinned {
            handle.manager.release_load(&handle.slot);
        }
    }
}

/// Shared access to a tile's bytes.
pub struct TileReadGuard<'a> {
    guard: Option<RwLockReadGuard<'a, Residency>>,
    pinned: Option<&'a TileHandle>,
}

impl Deref for TileReadGuard<'_> {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        match self.guard.as_deref() {
            Some(Residency::Resident(b)) => b,
            _ => unreachable!("A locked tile is always resident"),
        }
    }
}

impl Drop for TileReadGuard<'_> {
    fn drop(&mut self) {
        self.guard.take();
        if let Some(handle) = self.pinned {
            handle.manager.release_load(&handle.slot);
        }
    }
}

/// One registered, swappable tile, labelled with its grid coordinates.
///
/// A tile exclusively owns its bytes: copies are always deep.  Dropping the tile deregisters it.
pub struct Tile {
    col: i32,
    row: i32,
    handle: TileHandle,
}

impl Tile {
    /// A tile with every pixel set to `pixel`.  The pixel size is `pixel.len()`.
    pub fn new_filled(manager: &Arc<TileManager>, col: i32, row: i32, pixel: &[u8]) -> Result<Tile> {
        if pixel.is_empty() {
            return Err(SwapError::ZeroPixelSize);
        }

        let mut buffer = manager.acquire_buffer(pixel.len())?;
        for p in buffer.chunks_exact_mut(pixel.len()) {
            p.copy_from_slice(pixel);
        }

        Ok(Tile::from_handle(col, row, manager.new_slot(pixel.len(), buffer)))
    }

    /// A tile holding a copy of `data`, which must be exactly one tile of `pixel_size` pixels.
    pub fn from_bytes(
        manager: &Arc<TileManager>,
        col: i32,
        row: i32,
        pixel_size: usize,
        data: &[u8],
    ) -> Result<Tile> {
        if pixel_size == 0 {
            return Err(SwapError::ZeroPixelSize);
        }
        if data.len() != tile_bytes(pixel_size) {
            return Err(SwapError::DataSizeMismatch {
                expected: tile_bytes(pixel_size),
                actual: data.len(),
            });
        }

        let mut buffer = manager.acquire_buffer(pixel_size)?;
        buffer.copy_from_slice(data);
        Ok(Tile::from_handle(col, row, manager.new_slot(pixel_size, buffer)))
    }

    fn from_handle(col: i32, row: i32, handle: TileHandle) -> Tile {
        handle.manager.register_tile(&handle);
        Tile { col, row, handle }
    }

    /// Deep copy this tile, giving the copy new coordinates.
    pub fn try_clone_at(&self, col: i32, row: i32) -> Result<Tile> {
        let manager = &self.handle.manager;
        let mut buffer = manager.acquire_buffer(self.pixel_size())?;
        {
            let src = match self.read() {
                Ok(s) => s,
                Err(e) => {
                    manager.release_buffer(buffer);
                    return Err(e);
                }
            };
            buffer.copy_from_slice(&src);
        }

        Ok(Tile::from_handle(
            col,
            row,
            manager.new_slot(self.pixel_size(), buffer),
        ))
    }

    pub fn try_clone(&self) -> Result<Tile> {
        self.try_clone_at(self.col, self.row)
    }

    pub fn col(&self) -> i32 {
        self.col
    }

    pub fn row(&self) -> i32 {
        self.row
    }

    pub fn pixel_size(&self) -> usize {
        self.handle.pixel_size()
    }

    pub fn handle(&self) -> &TileHandle {
        &self.handle
    }

    pub fn read(&self) -> Result<TileReadGuard<'_>> {
        self.handle.read()
    }

    pub fn write(&mut self) -> Result<TileDataGuard<'_>> {
        self.handle.write()
    }

    /// Set every pixel to `pixel`.
    pub fn fill(&mut self, pixel: &[u8]) -> Result<()> {
        if pixel.len() != self.pixel_size() {
            return Err(SwapError::DataSizeMismatch {
                expected: self.pixel_size(),
                actual: pixel.len(),
            });
        }
        let mut data = self.write()?;
        for p in data.chunks_exact_mut(pixel.len()) {
            p.copy_from_slice(pixel);
        }
        Ok(())
    }

    /// Do both tiles hold the same bytes?
    pub fn same_content(&self, other: &Tile) -> Result<bool> {
        if self.handle.same_tile(&other.handle) {
            return Ok(true);
        }

        let ours = self.read()?;
        let theirs = other.read()?;
        Ok(ours[..] == theirs[..])
    }
}

impl Drop for Tile {
    fn drop(&mut self) {
        self.handle.manager.deregister_tile(&self.handle);
    }
}

impl std::fmt::Debug for Tile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tile")
            .field("col", &self.col)
            .field("row", &self.row)
            .field("handle", &self.handle)
            .finish()
    }
}
