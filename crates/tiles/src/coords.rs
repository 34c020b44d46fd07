//! Pixel and tile addressing.
use tessera_swap::{TILE_HEIGHT, TILE_WIDTH};

pub(crate) const TILE_W: i32 = TILE_WIDTH as i32;
pub(crate) const TILE_H: i32 = TILE_HEIGHT as i32;

/// Number of buckets in a tile hash table.
pub const HASH_TABLE_SIZE: usize = 1024;

/// Division rounding towards negative infinity.  `b` must be positive.
pub fn floor_div(a: i32, b: i32) -> i32 {
    debug_assert!(b > 0);
    a.div_euclid(b)
}

/// The tile containing a pixel.
pub fn tile_from_pixel(x: i32, y: i32) -> TileCoord {
    TileCoord {
        col: floor_div(x, TILE_W),
        row: floor_div(y, TILE_H),
    }
}

/// Byte offset of pixel `(x, y)` within its tile.
pub(crate) fn pixel_offset(x: i32, y: i32, pixel_size: usize) -> usize {
    let tx = x.rem_euclid(TILE_W) as usize;
    let ty = y.rem_euclid(TILE_H) as usize;
    (ty * TILE_WIDTH + tx) * pixel_size
}

/// Bucket of a tile.  Rows spread over all buckets; columns only over a band of 32.
pub fn calc_tile_hash(col: i32, row: i32) -> usize {
    (row.wrapping_shl(5).wrapping_add(col & 0x1F) & 0x3FF) as usize
}

#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct TileCoord {
    pub col: i32,
    pub row: i32,
}

impl TileCoord {
    pub fn new(col: i32, row: i32) -> TileCoord {
        TileCoord { col, row }
    }

    /// The pixels covered by this tile.
    pub fn pixel_rect(&self) -> PixelRect {
        PixelRect::new(self.col * TILE_W, self.row * TILE_H, TILE_W, TILE_H)
    }

    pub(crate) fn bucket(&self) -> usize {
        calc_tile_hash(self.col, self.row)
    }
}

/// A rectangle in pixel space.  `x`/`y` is the top left corner; `right()` and `bottom()` are exclusive.
///
/// Edges saturate at the ends of the `i32` range, so pixels on `i32::MAX` itself are never covered.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Hash)]
pub struct PixelRect {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl PixelRect {
    pub const fn new(x: i32, y: i32, width: i32, height: i32) -> PixelRect {
        PixelRect {
            x,
            y,
            width,
            height,
        }
    }

    /// Build a rect from inclusive corners.
    pub fn from_corners(min_x: i32, min_y: i32, max_x: i32, max_y: i32) -> PixelRect {
        PixelRect::new(
            min_x,
            min_y,
            max_x.saturating_sub(min_x).saturating_add(1),
            max_y.saturating_sub(min_y).saturating_add(1),
        )
    }

    pub fn is_empty(&self) -> bool {
        self.right() <= self.x || self.bottom() <= self.y
    }

    pub fn right(&self) -> i32 {
        self.x.saturating_add(self.width)
    }

    pub fn bottom(&self) -> i32 {
        self.y.saturating_add(self.height)
    }

    /// Number of pixels covered, after clipping at the end of the coordinate range.
    pub fn area(&self) -> usize {
        if self.is_empty() {
            0
        } else {
            (self.right() as i64 - self.x as i64) as usize * (self.bottom() as i64 - self.y as i64) as usize
        }
    }

    /// Flip negative widths and heights so that the rect covers the same pixels with a positive size.
    pub fn normalized(&self) -> PixelRect {
        let mut r = *self;
        if r.width < 0 {
            r.x = r.x.saturating_add(r.width);
            r.width = r.width.saturating_neg();
        }
        if r.height < 0 {
            r.y = r.y.saturating_add(r.height);
            r.height = r.height.saturating_neg();
        }
        r
    }

    pub fn contains(&self, x: i32, y: i32) -> bool {
        x >= self.x && x < self.right() && y >= self.y && y < self.bottom()
    }

    pub fn contains_rect(&self, other: &PixelRect) -> bool {
        other.is_empty()
            || (!self.is_empty()
                && other.x >= self.x
                && other.y >= self.y
                && other.right() <= self.right()
                && other.bottom() <= self.bottom())
    }

    pub fn intersects(&self, other: &PixelRect) -> bool {
        !self.intersection(other).is_empty()
    }

    /// The overlap of two rects.  Empty rects come back as the default rect.
    pub fn intersection(&self, other: &PixelRect) -> PixelRect {
        let x = self.x.max(other.x);
        let y = self.y.max(other.y);
        let right = self.right().min(other.right());
        let bottom = self.bottom().min(other.bottom());
        if right <= x || bottom <= y {
            return PixelRect::default();
        }

        PixelRect::new(x, y, right - x, bottom - y)
    }

    /// The smallest rect containing both.  Empty rects are ignored.
    pub fn united(&self, other: &PixelRect) -> PixelRect {
        if self.is_empty() {
            return *other;
        }
        if other.is_empty() {
            return *self;
        }

        let x = self.x.min(other.x);
        let y = self.y.min(other.y);
        PixelRect::new(
            x,
            y,
            self.right().max(other.right()).saturating_sub(x),
            self.bottom().max(other.bottom()).saturating_sub(y),
        )
    }

    /// Every tile this rect touches, row by row.
    pub fn tiles(&self) -> impl Iterator<Item = TileCoord> {
        let (first, last) = if self.is_empty() {
            (TileCoord::new(0, 0), TileCoord::new(-1, -1))
        } else {
            (
                tile_from_pixel(self.x, self.y),
                tile_from_pixel(self.right() - 1, self.bottom() - 1),
            )
        };

        (first.row..=last.row)
            .flat_map(move |row| (first.col..=last.col).map(move |col| TileCoord { col, row }))
    }
}
