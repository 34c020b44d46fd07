//! Saving and loading a grid's tiles.
//!
//! The stream is the tile count on its own line, then for every tile a `x,y,width,height` line giving the tile's pixel
//! rect followed by the raw tile bytes.  Numbers are decimal ASCII.  Nothing in the stream says what the pixel size
//! is; the reading grid must already know.
use std::collections::HashSet;
use std::io::{BufRead, Write};

use log::*;
use tessera_swap::tile_bytes;

use crate::coords::*;
use crate::data_manager::TiledDataManager;
use crate::errors::*;

fn read_line<R: BufRead>(store: &mut R, buf: &mut Vec<u8>) -> Result<Option<String>> {
    buf.clear();
    if store.read_until(b'\n', buf)? == 0 {
        return Ok(None);
    }

    while matches!(buf.last(), Some(b'\n') | Some(b'\r')) {
        buf.pop();
    }
    Ok(Some(String::from_utf8_lossy(buf).into_owned()))
}

fn parse_header(index: usize, line: &str) -> Result<TileCoord, ParseError> {
    let bad_header = || ParseError::BadTileHeader {
        index,
        line: line.to_string(),
    };

    let fields = line
        .split(',')
        .map(|f| f.trim().parse::<i64>())
        .collect::<Result<Vec<i64>, _>>()
        .map_err(|_| bad_header())?;
    let (x, y, width, height) = match fields[..] {
        [x, y, w, h] => (x, y, w, h),
        _ => return Err(bad_header()),
    };

    if width != TILE_W as i64 || height != TILE_H as i64 {
        return Err(ParseError::UnexpectedTileSize {
            index,
            width,
            height,
        });
    }
    if x.rem_euclid(TILE_W as i64) != 0 || y.rem_euclid(TILE_H as i64) != 0 {
        return Err(ParseError::UnalignedTile { index, x, y });
    }

    let col = i32::try_from(x / TILE_W as i64).map_err(|_| bad_header())?;
    let row = i32::try_from(y / TILE_H as i64).map_err(|_| bad_header())?;
    Ok(TileCoord { col, row })
}

/// Read a whole stream without touching any grid.
fn parse_store<R: BufRead>(store: &mut R, pixel_size: usize) -> Result<Vec<(TileCoord, Vec<u8>)>> {
    let mut line = vec![];
    let count_line = read_line(store, &mut line)?.ok_or(ParseError::MissingTileCount)?;
    let count: usize = count_line
        .trim()
        .parse()
        .map_err(|_| ParseError::BadTileCount(count_line.clone()))?;

    let mut seen = HashSet::new();
    let mut tiles = vec![];
    for index in 0..count {
        let header = read_line(store, &mut line)?.unwrap_or_default();
        let coord = parse_header(index, &header)?;
        if !seen.insert(coord) {
            return Err(ParseError::DuplicateTile {
                col: coord.col,
                row: coord.row,
            }
            .into());
        }

        let mut data = vec![0u8; tile_bytes(pixel_size)];
        if let Err(e) = store.read_exact(&mut data) {
            return Err(match e.kind() {
                std::io::ErrorKind::UnexpectedEof => ParseError::TruncatedTileData { index }.into(),
                _ => e.into(),
            });
        }
        tiles.push((coord, data));
    }

    Ok(tiles)
}

impl TiledDataManager {
    /// Write every materialized tile to `store`.  Tiles come out in storage order.
    pub fn write<W: Write>(&self, mut store: W) -> Result<()> {
        writeln!(store, "{}", self.tiles.len())?;
        for (coord, tile) in self.tiles.iter() {
            let r = coord.pixel_rect();
            writeln!(store, "{},{},{},{}", r.x, r.y, r.width, r.height)?;
            store.write_all(&tile.read()?)?;
        }
        store.flush()?;

        debug!("Grid {}: wrote {} tiles", self.id, self.tiles.len());
        Ok(())
    }

    /// Replace the grid's content with the tiles in `store`.
    ///
    /// The whole stream is parsed first; a malformed stream leaves the grid untouched.  The replacement goes through
    /// the usual write path, so the open memento can undo it.
    pub fn read<R: BufRead>(&mut self, mut store: R) -> Result<()> {
        let tiles = match parse_store(&mut store, self.pixel_size) {
            Ok(t) => t,
            Err(e) => {
                warn!("Grid {}: rejecting tile store: {}", self.id, e);
                return Err(e);
            }
        };

        self.clear_all();
        let count = tiles.len();
        for (coord, data) in tiles {
            self.get_tile_mut(coord.col, coord.row)?
                .write()?
                .copy_from_slice(&data);
        }

        debug!("Grid {}: read {} tiles", self.id, count);
        Ok(())
    }
}
