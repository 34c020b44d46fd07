use crate::coords::*;
use crate::errors::*;
use crate::iterators::cursor::*;

/// Walks every pixel of a rect.
///
/// Finishes each tile's share of the rect before moving to the next tile, so that every tile is fetched once.  Tiles
/// are visited left to right, then top to bottom; within a tile, pixels go row by row.
pub struct RectIterator<'a> {
    cursor: TileCursor<'a>,
    rect: PixelRect,
    first_col: i32,
    last_col: i32,
    last_row: i32,
    tile: TileCoord,
    /// The current tile's part of the rect.
    part: PixelRect,
    x: i32,
    y: i32,
    done: bool,
}

impl<'a> RectIterator<'a> {
    pub(crate) fn new(grid: GridAccess<'a>, rect: PixelRect) -> Result<RectIterator<'a>> {
        let rect = rect.normalized();
        let first = tile_from_pixel(rect.x, rect.y);
        let last = if rect.is_empty() {
            first
        } else {
            tile_from_pixel(rect.right() - 1, rect.bottom() - 1)
        };

        let mut it = RectIterator {
            cursor: TileCursor::new(grid),
            rect,
            first_col: first.col,
            last_col: last.col,
            last_row: last.row,
            tile: first,
            part: PixelRect::default(),
            x: rect.x,
            y: rect.y,
            done: rect.is_empty(),
        };
        if !it.done {
            it.enter_tile()?;
        }
        Ok(it)
    }

    fn enter_tile(&mut self) -> Result<()> {
        self.part = self.tile.pixel_rect().intersection(&self.rect);
        self.x = self.part.x;
        self.y = self.part.y;
        self.cursor.seek(self.tile)
    }

    pub fn x(&self) -> i32 {
        self.x
    }

    pub fn y(&self) -> i32 {
        self.y
    }

    pub fn is_done(&self) -> bool {
        self.done
    }

    /// Step one pixel.  Returns false once every pixel was visited.
    pub fn advance(&mut self) -> Result<bool> {
        if self.done {
            return Ok(false);
        }

        self.x += 1;
        if self.x < self.part.right() {
            return Ok(true);
        }

        self.x = self.part.x;
        self.y += 1;
        if self.y < self.part.bottom() {
            return Ok(true);
        }

        self.tile.col += 1;
        if self.tile.col > self.last_col {
            self.tile.col = self.first_col;
            self.tile.row += 1;
            if self.tile.row > self.last_row {
                self.done = true;
                return Ok(false);
            }
        }

        self.enter_tile()?;
        Ok(true)
    }

    /// Step `n` pixels in iteration order.
    pub fn advance_by(&mut self, mut n: usize) -> Result<bool> {
        while n > 0 && !self.done {
            let in_row = self.n_conseq_pixels();
            if n < in_row {
                self.x += n as i32;
                return Ok(true);
            }

            // Jump to the last pixel of the row and let advance deal with wrapping.
            self.x = self.part.right() - 1;
            n -= in_row;
            self.advance()?;
        }

        Ok(!self.done)
    }

    /// How many pixels, starting with the current one, remain in this row of the current tile.
    pub fn n_conseq_pixels(&self) -> usize {
        if self.done {
            return 0;
        }

        (self.part.right() - self.x) as usize
    }

    fn run_bytes(&self, n: usize) -> Result<std::ops::Range<usize>> {
        if self.done {
            return Err(Error::IteratorDone);
        }
        let available = self.n_conseq_pixels();
        if n > available {
            return Err(Error::RunTooLong { requested: n, available });
        }

        let ps = self.cursor.pixel_size();
        let start = pixel_offset(self.x, self.y, ps);
        Ok(start..start + n * ps)
    }

    pub fn raw_data(&self) -> Result<PixelRef<'_>> {
        self.raw_run(1)
    }

    /// The current pixel and the `n - 1` following it.  `n` may not exceed [Self::n_conseq_pixels].
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

    pub fn old_raw_data(&self) -> Result<PixelRef<'_>> {
        self.cursor.old_data(self.run_bytes(1)?)
    }

    pub fn is_writable(&self) -> bool {
        self.cursor.is_writable()
    }
}
