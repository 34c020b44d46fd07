//! Cursors over pixel regions which hide the tile grid.
//!
//! Every iterator comes in a read-only flavour, which borrows the grid shared and reads never-written pixels from the
//! default tile, and a writable one, which borrows the grid exclusively and materializes each tile the first time it is
//! visited.
mod cursor;
mod hline;
mod rect;
mod vline;

pub use cursor::{PixelMut, PixelRef};
pub use hline::*;
pub use rect::*;
pub use vline::*;

use crate::coords::PixelRect;
use crate::data_manager::TiledDataManager;
use crate::errors::*;
use cursor::GridAccess;

impl TiledDataManager {
    pub fn create_rect_iterator(&self, rect: PixelRect) -> Result<RectIterator<'_>> {
        RectIterator::new(GridAccess::Read(self), rect)
    }

    pub fn create_rect_iterator_mut(&mut self, rect: PixelRect) -> Result<RectIterator<'_>> {
        RectIterator::new(GridAccess::Write(self), rect)
    }

    /// Iterate over `width` pixels starting at `(x, y)`.
    pub fn create_hline_iterator(&self, x: i32, y: i32, width: i32) -> Result<HLineIterator<'_>> {
        HLineIterator::new(GridAccess::Read(self), x, y, width)
    }

    pub fn create_hline_iterator_mut(&mut self, x: i32, y: i32, width: i32) -> Result<HLineIterator<'_>> {
        HLineIterator::new(GridAccess::Write(self), x, y, width)
    }

    /// Iterate over `height` pixels starting at `(x, y)`.
    pub fn create_vline_iterator(&self, x: i32, y: i32, height: i32) -> Result<VLineIterator<'_>> {
        VLineIterator::new(GridAccess::Read(self), x, y, height)
    }

    pub fn create_vline_iterator_mut(&mut self, x: i32, y: i32, height: i32) -> Result<VLineIterator<'_>> {
        VLineIterator::new(GridAccess::Write(self), x, y, height)
    }
}
