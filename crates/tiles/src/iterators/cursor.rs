//! The state shared by every iterator: which tile we are on, kept pinned, and the tile holding its old bytes.
use std::ops::{Deref, DerefMut, Range};

use tessera_swap::{TileDataGuard, TileHandle, TileReadGuard};

use crate::coords::*;
use crate::data_manager::TiledDataManager;
use crate::errors::*;

pub(crate) enum GridAccess<'a> {
    Read(&'a TiledDataManager),
    Write(&'a mut TiledDataManager),
}

struct Position {
    coord: TileCoord,
    current: TileHandle,
    old: TileHandle,
}

pub(crate) struct TileCursor<'a> {
    grid: GridAccess<'a>,
    pixel_size: usize,
    position: Option<Position>,
}

impl<'a> TileCursor<'a> {
    pub(crate) fn new(grid: GridAccess<'a>) -> TileCursor<'a> {
        let pixel_size = match &grid {
            GridAccess::Read(g) => g.pixel_size(),
            GridAccess::Write(g) => g.pixel_size(),
        };

        TileCursor {
            grid,
            pixel_size,
            position: None,
        }
    }

    pub(crate) fn pixel_size(&self) -> usize {
        self.pixel_size
    }

    pub(crate) fn is_writable(&self) -> bool {
        matches!(self.grid, GridAccess::Write(_))
    }

    /// Move onto a tile.  Writable cursors materialize it, which records it in the open memento on first visit.
    pub(crate) fn seek(&mut self, coord: TileCoord) -> Result<()> {
        if self.position.as_ref().map(|p| p.coord) == Some(coord) {
            return Ok(());
        }
        self.release();

        let (current, old) = match &mut self.grid {
            GridAccess::Read(g) => (
                g.get_tile(coord.col, coord.row).handle().clone(),
                g.old_tile_handle(coord),
            ),
            GridAccess::Write(g) => {
                let current = g.get_tile_mut(coord.col, coord.row)?.handle().clone();
                (current, g.old_tile_handle(coord))
            }
        };

        current.pin()?;
        if let Err(e) = old.pin() {
            current.unpin();
            return Err(e.into());
        }

        self.position = Some(Position {
            coord,
            current,
            old,
        });
        Ok(())
    }

    fn release(&mut self) {
        if let Some(p) = self.position.take() {
            p.current.unpin();
            p.old.unpin();
        }
    }

    fn position(&self) -> Result<&Position> {
        self.position.as_ref().ok_or(Error::IteratorDone)
    }

    pub(crate) fn data(&self, bytes: Range<usize>) -> Result<PixelRef<'_>> {
        Ok(PixelRef {
            guard: self.position()?.current.read()?,
            bytes,
        })
    }

    pub(crate) fn data_mut(&mut self, bytes: Range<usize>) -> Result<PixelMut<'_>> {
        if !self.is_writable() {
            return Err(Error::ReadOnlyIterator);
        }

        Ok(PixelMut {
            guard: self.position()?.current.write()?,
            bytes,
        })
    }

    pub(crate) fn old_data(&self, bytes: Range<usize>) -> Result<PixelRef<'_>> {
        Ok(PixelRef {
            guard: self.position()?.old.read()?,
            bytes,
        })
    }
}

impl Drop for TileCursor<'_> {
    fn drop(&mut self) {
        self.release();
    }
}

/// Borrowed bytes of one or more consecutive pixels in a tile.
pub struct PixelRef<'a> {
    guard: TileReadGuard<'a>,
    bytes: Range<usize>,
}

impl Deref for PixelRef<'_> {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.guard[self.bytes.clone()]
    }
}

/// Mutable bytes of one or more consecutive pixels in a tile.
pub struct PixelMut<'a> {
    guard: TileDataGuard<'a>,
    bytes: Range<usize>,
}

impl Deref for PixelMut<'_> {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.guard[self.bytes.clone()]
    }
}

impl DerefMut for PixelMut<'_> {
    fn deref_mut(&mut self) -> &mut [u8] {
        &mut self.guard[self.bytes.clone()]
    }
}
