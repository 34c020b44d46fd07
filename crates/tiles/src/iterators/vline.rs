use crate::coords::*;
use crate::errors::*;
use crate::iterators::cursor::*;

/// Walks one column of pixels top to bottom.
///
/// Vertically adjacent pixels are a row stride apart in a tile, so there are no runs to hand out.
pub struct VLineIterator<'a> {
    cursor: TileCursor<'a>,
    top: i32,
    /// Exclusive.
    bottom: i32,
    x: i32,
    y: i32,
}

impl<'a> VLineIterator<'a> {
    pub(crate) fn new(grid: GridAccess<'a>, x: i32, y: i32, height: i32) -> Result<VLineIterator<'a>> {
        let mut it = VLineIterator {
            cursor: TileCursor::new(grid),
            top: y,
            bottom: y.saturating_add(height.max(0)),
            x,
            y,
        };
        if !it.is_done() {
            it.seek()?;
        }
        Ok(it)
    }

    fn seek(&mut self) -> Result<()> {
        self.cursor.seek(tile_from_pixel(self.x, self.y))
    }

    pub fn x(&self) -> i32 {
        self.x
    }

    pub fn y(&self) -> i32 {
        self.y
    }

    pub fn is_done(&self) -> bool {
        self.y >= self.bottom
    }

    pub fn advance(&mut self) -> Result<bool> {
        self.advance_by(1)
    }

    pub fn advance_by(&mut self, n: usize) -> Result<bool> {
        let n = n.min((self.bottom - self.y).max(0) as usize) as i32;
        self.y += n;
        if self.is_done() {
            return Ok(false);
        }

        self.seek()?;
        Ok(true)
    }

    /// How many pixels, starting with the current one, are in the current tile.
    pub fn n_conseq_v_pixels(&self) -> usize {
        if self.is_done() {
            return 0;
        }

        let in_tile = TILE_H - self.y.rem_euclid(TILE_H);
        in_tile.min(self.bottom - self.y) as usize
    }

    /// Go to the top of the same span in the next column.
    pub fn next_col(&mut self) -> Result<bool> {
        self.x += 1;
        self.y = self.top;
        if self.is_done() {
            return Ok(false);
        }

        self.seek()?;
        Ok(true)
    }

    fn pixel_bytes(&self) -> Result<std::ops::Range<usize>> {
        if self.is_done() {
            return Err(Error::IteratorDone);
        }

        let ps = self.cursor.pixel_size();
        let start = pixel_offset(self.x, self.y, ps);
        Ok(start..start + ps)
    }

    pub fn raw_data(&self) -> Result<PixelRef<'_>> {
        self.cursor.data(self.pixel_bytes()?)
    }

    pub fn raw_data_mut(&mut self) -> Result<PixelMut<'_>> {
        let bytes = self.pixel_bytes()?;
        self.cursor.data_mut(bytes)
    }

    pub fn old_raw_data(&self) -> Result<PixelRef<'_>> {
        self.cursor.old_data(self.pixel_bytes()?)
    }

    pub fn is_writable(&self) -> bool {
        self.cursor.is_writable()
    }
}
