use crate::coords::*;
use crate::errors::*;
use crate::iterators::cursor::*;

/// Walks one row of pixels left to right.
pub struct HLineIterator<'a> {
    cursor: TileCursor<'a>,
    left: i32,
    /// Exclusive.
    right: i32,
    x: i32,
    y: i32,
}

impl<'a> HLineIterator<'a> {
    pub(crate) fn new(grid: GridAccess<'a>, x: i32, y: i32, width: i32) -> Result<HLineIterator<'a>> {
        let mut it = HLineIterator {
            cursor: TileCursor::new(grid),
            left: x,
            right: x.saturating_add(width.max(0)),
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
        self.x >= self.right
    }

    /// Step one pixel.  Returns false once past the end of the line.
    pub fn advance(&mut self) -> Result<bool> {
        self.advance_by(1)
    }

    /// Step `n` pixels.  Returns false once past the end of the line.
    pub fn advance_by(&mut self, n: usize) -> Result<bool> {
        let n = n.min((self.right - self.x).max(0) as usize) as i32;
        self.x += n;
        if self.is_done() {
            return Ok(false);
        }

        self.seek()?;
        Ok(true)
    }

    /// How many pixels, starting with the current one, sit next to each other in the current tile's memory.
    pub fn n_conseq_h_pixels(&self) -> usize {
        if self.is_done() {
            return 0;
        }

        let in_tile = TILE_W - self.x.rem_euclid(TILE_W);
        in_tile.min(self.right - self.x) as usize
    }

    /// Go to the start of the same span on the next row.  Returns false if the span is empty.
    pub fn next_row(&mut self) -> Result<bool> {
        self.y += 1;
        self.x = self.left;
        if self.is_done() {
            return Ok(false);
        }

        self.seek()?;
        Ok(true)
    }

    fn run_bytes(&self, n: usize) -> Result<std::ops::Range<usize>> {
        if self.is_done() {
            return Err(Error::IteratorDone);
        }
        let available = self.n_conseq_h_pixels();
        if n > available {
            return Err(Error::RunTooLong { requested: n, available });
        }

        let ps = self.cursor.pixel_size();
        let start = pixel_offset(self.x, self.y, ps);
        Ok(start..start + n * ps)
    }

    /// The current pixel.
    pub fn raw_data(&self) -> Result<PixelRef<'_>> {
        self.raw_run(1)
    }

    /// The current pixel and the `n - 1` following it.  `n` may not exceed [Self::n_conseq_h_pixels].
    pub fn raw_run(&self, n: usize) -> Result<PixelRef<'_>> {
        self.cursor.data(self.run_bytes(n)?)
    }

    pub fn raw_data_mut(&mut self) -> Result<PixelMut<'_>> {
        self.raw_run_mut(1)
    }

    pub fn raw_run_mut(&mut self, n: usize) -> Result<PixelMut<'_>> {
        let bytes = self.run_bytes(n)?;
        self.cursor.data_mut(bytes)
    }

    /// The current pixel as it was when the grid's open memento started recording.
    pub fn old_raw_data(&self) -> Result<PixelRef<'_>> {
        self.old_raw_run(1)
    }

    pub fn old_raw_run(&self, n: usize) -> Result<PixelRef<'_>> {
        self.cursor.old_data(self.run_bytes(n)?)
    }

    pub fn is_writable(&self) -> bool {
        self.cursor.is_writable()
    }
}
