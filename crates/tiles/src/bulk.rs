//! Pixel level access and bulk operations.  All writes go through [TiledDataManager::get_tile_mut] or a writable
//! iterator, so the open memento sees them.
use log::*;

use crate::coords::*;
use crate::data_manager::TiledDataManager;
use crate::errors::*;

impl TiledDataManager {
    pub fn pixel(&self, x: i32, y: i32) -> Result<Vec<u8>> {
        let coord = tile_from_pixel(x, y);
        let data = self.get_tile(coord.col, coord.row).read()?;
        let offset = pixel_offset(x, y, self.pixel_size);
        Ok(data[offset..offset + self.pixel_size].to_vec())
    }

    /// The pixel as it was when the open memento started recording, or the current pixel if none is open.
    pub fn old_pixel(&self, x: i32, y: i32) -> Result<Vec<u8>> {
        let handle = self.old_tile_handle(tile_from_pixel(x, y));
        let data = handle.read()?;
        let offset = pixel_offset(x, y, self.pixel_size);
        Ok(data[offset..offset + self.pixel_size].to_vec())
    }

    pub fn set_pixel(&mut self, x: i32, y: i32, pixel: &[u8]) -> Result<()> {
        self.check_pixel(pixel)?;
        let coord = tile_from_pixel(x, y);
        let offset = pixel_offset(x, y, self.pixel_size);
        let tile = self.get_tile_mut(coord.col, coord.row)?;
        tile.write()?[offset..offset + pixel.len()].copy_from_slice(pixel);
        Ok(())
    }

    fn check_buffer(&self, rect: &PixelRect, len: usize) -> Result<()> {
        let expected = rect.area() * self.pixel_size;
        if len < expected {
            return Err(Error::BufferTooSmall {
                expected,
                actual: len,
            });
        }
        Ok(())
    }

    /// Copy `rect` into `buf`, row-major with no padding.
    pub fn read_bytes(&self, buf: &mut [u8], rect: PixelRect) -> Result<()> {
        let rect = rect.normalized();
        self.check_buffer(&rect, buf.len())?;
        let ps = self.pixel_size;
        let stride = self.row_stride();
        let dst_stride = rect.width.max(0) as usize * ps;

        let mut y = rect.y;
        while y < rect.bottom() {
            let rows = self.num_contiguous_rows(y).min((rect.bottom() - y) as usize);
            let mut x = rect.x;
            while x < rect.right() {
                let cols = self.num_contiguous_columns(x).min((rect.right() - x) as usize);
                let coord = tile_from_pixel(x, y);
                let data = self.get_tile(coord.col, coord.row).read()?;

                let mut src = pixel_offset(x, y, ps);
                let mut dst = (y - rect.y) as usize * dst_stride + (x - rect.x) as usize * ps;
                for _ in 0..rows {
                    buf[dst..dst + cols * ps].copy_from_slice(&data[src..src + cols * ps]);
                    src += stride;
                    dst += dst_stride;
                }
                x += cols as i32;
            }
            y += rows as i32;
        }

        Ok(())
    }

    /// Copy `bytes`, row-major with no padding, into `rect`.
    pub fn write_bytes(&mut self, bytes: &[u8], rect: PixelRect) -> Result<()> {
        let rect = rect.normalized();
        self.check_buffer(&rect, bytes.len())?;
        let ps = self.pixel_size;
        let stride = self.row_stride();
        let src_stride = rect.width.max(0) as usize * ps;

        let mut y = rect.y;
        while y < rect.bottom() {
            let rows = self.num_contiguous_rows(y).min((rect.bottom() - y) as usize);
            let mut x = rect.x;
            while x < rect.right() {
                let cols = self.num_contiguous_columns(x).min((rect.right() - x) as usize);
                let coord = tile_from_pixel(x, y);
                let tile = self.get_tile_mut(coord.col, coord.row)?;
                let mut data = tile.write()?;

                let mut dst = pixel_offset(x, y, ps);
                let mut src = (y - rect.y) as usize * src_stride + (x - rect.x) as usize * ps;
                for _ in 0..rows {
                    data[dst..dst + cols * ps].copy_from_slice(&bytes[src..src + cols * ps]);
                    dst += stride;
                    src += src_stride;
                }
                x += cols as i32;
            }
            y += rows as i32;
        }

        Ok(())
    }

    /// Set every byte of every pixel in `rect` to `value`.
    pub fn clear(&mut self, rect: PixelRect, value: u8) -> Result<()> {
        let pixel = vec![value; self.pixel_size];
        self.clear_with_pixel(rect, &pixel)
    }

    /// Set every pixel in `rect` to `pixel`.
    ///
    /// Clearing to the default pixel only looks at the extent, and drops tiles which end up entirely default.
    pub fn clear_with_pixel(&mut self, rect: PixelRect, pixel: &[u8]) -> Result<()> {
        self.check_pixel(pixel)?;
        let mut rect = rect.normalized();
        let is_default = pixel == &self.default_pixel[..];
        if is_default {
            rect = rect.intersection(&self.extent());
        }
        if rect.is_empty() {
            return Ok(());
        }

        self.touch();
        if !is_default {
            return self.fill_rows(rect, pixel);
        }

        for coord in rect.tiles() {
            if !self.has_tile(coord.col, coord.row) {
                continue;
            }

            let tile_rect = coord.pixel_rect();
            let part = tile_rect.intersection(&rect);
            if part == tile_rect {
                self.remove_tile_recorded(coord);
            } else {
                self.fill_rows(part, pixel)?;
            }
        }

        Ok(())
    }

    fn fill_rows(&mut self, rect: PixelRect, pixel: &[u8]) -> Result<()> {
        let ps = self.pixel_size;
        let mut it = self.create_hline_iterator_mut(rect.x, rect.y, rect.width)?;

        for row in 0..rect.height {
            if row > 0 {
                it.next_row()?;
            }

            while !it.is_done() {
                let n = it.n_conseq_h_pixels();
                {
                    let mut run = it.raw_run_mut(n)?;
                    for p in run.chunks_exact_mut(ps) {
                        p.copy_from_slice(pixel);
                    }
                }
                it.advance_by(n)?;
            }
        }

        Ok(())
    }

    /// Remove every tile.  The open memento records them as deleted.
    pub fn clear_all(&mut self) {
        self.touch();
        for (coord, tile) in self.tiles.drain() {
            if let Some(m) = &self.current_memento {
                m.record_deleted(coord, tile);
            }
        }
        self.extent = None;
    }

    /// Remove the tiles touching `rect` which hold nothing but the default pixel.  Returns how many went.
    pub fn purge(&mut self, rect: PixelRect) -> Result<usize> {
        let rect = rect.normalized();
        self.touch();

        let mut removed = 0;
        for coord in self.tiles.coords() {
            if !coord.pixel_rect().intersects(&rect) {
                continue;
            }

            let is_default = match self.tiles.get(coord) {
                Some(t) => t.same_content(&self.default_tile)?,
                None => false,
            };
            if is_default {
                self.remove_tile_recorded(coord);
                removed += 1;
            }
        }

        if removed > 0 {
            self.recalculate_extent();
            debug!("Grid {}: purged {} default tiles", self.id, removed);
        }
        Ok(removed)
    }

    /// Copy `src_rect` of `source` to this grid, with its top left corner landing on `(dst_x, dst_y)`.
    ///
    /// When both sides line up with the tile grid whole tiles are copied; unmaterialized source tiles then stay
    /// unmaterialized if both grids share a default pixel.
    pub fn paste(
        &mut self,
        source: &TiledDataManager,
        src_rect: PixelRect,
        dst_x: i32,
        dst_y: i32,
    ) -> Result<()> {
        if source.pixel_size != self.pixel_size {
            return Err(Error::PixelSizeMismatch {
                expected: self.pixel_size,
                actual: source.pixel_size,
            });
        }

        let src_rect = src_rect.normalized();
        if src_rect.is_empty() {
            return Ok(());
        }
        self.touch();

        let aligned = [src_rect.x, dst_x, src_rect.width].iter().all(|v| v % TILE_W == 0)
            && [src_rect.y, dst_y, src_rect.height].iter().all(|v| v % TILE_H == 0);
        if aligned {
            self.paste_tiles(source, src_rect, dst_x, dst_y)
        } else {
            self.paste_rows(source, src_rect, dst_x, dst_y)
        }
    }

    fn paste_tiles(
        &mut self,
        source: &TiledDataManager,
        src_rect: PixelRect,
        dst_x: i32,
        dst_y: i32,
    ) -> Result<()> {
        let dcol = floor_div(dst_x - src_rect.x, TILE_W);
        let drow = floor_div(dst_y - src_rect.y, TILE_H);
        let same_default = source.default_pixel == self.default_pixel;

        for coord in src_rect.tiles() {
            let (col, row) = (coord.col + dcol, coord.row + drow);
            match source.tiles.get(coord) {
                Some(tile) => {
                    let data = tile.read()?;
                    self.get_tile_mut(col, row)?.write()?.copy_from_slice(&data);
                }
                None if same_default => {
                    self.remove_tile_recorded(TileCoord::new(col, row));
                }
                None => {
                    self.get_tile_mut(col, row)?.fill(&source.default_pixel)?;
                }
            }
        }

        Ok(())
    }

    fn paste_rows(
        &mut self,
        source: &TiledDataManager,
        src_rect: PixelRect,
        dst_x: i32,
        dst_y: i32,
    ) -> Result<()> {
        let mut src = source.create_hline_iterator(src_rect.x, src_rect.y, src_rect.width)?;
        let mut dst = self.create_hline_iterator_mut(dst_x, dst_y, src_rect.width)?;

        for row in 0..src_rect.height {
            if row > 0 {
                src.next_row()?;
                dst.next_row()?;
            }

            while !src.is_done() {
                let n = src.n_conseq_h_pixels().min(dst.n_conseq_h_pixels());
                {
                    let from = src.raw_run(n)?;
                    let mut to = dst.raw_run_mut(n)?;
                    to.copy_from_slice(&from);
                }
                src.advance_by(n)?;
                dst.advance_by(n)?;
            }
        }

        Ok(())
    }
}
