//! The backing file evicted tiles are written to.
//!
//! An anonymous temporary file, addressed by byte offset.  Regions are only ever whole tiles, so freed regions are
//! kept in per-size free lists and handed out again before the file grows.
use std::collections::HashMap;
use std::fs::File;
use std::path::Path;

use log::*;
use memmap2::MmapOptions;

use crate::errors::*;

/// Granularity the file grows by.
pub(crate) const SWAP_FILE_ALIGNMENT: u64 = 4096;

fn align_up(value: u64, alignment: u64) -> u64 {
    (value + alignment - 1) / alignment * alignment
}

pub(crate) struct SwapFile {
    file: File,
    file_len: u64,
    /// Everything below this offset has been handed out at least once.
    used_end: u64,
    free_regions: HashMap<usize, Vec<u64>>,
}

impl SwapFile {
    pub(crate) fn new(dir: Option<&Path>) -> Result<SwapFile> {
        let file = match dir {
            Some(d) => tempfile::tempfile_in(d)?,
            None => tempfile::tempfile()?,
        };

        info!(
            "Created tile swap file in {}",
            dir.map(|d| d.display().to_string())
                .unwrap_or_else(|| "the temporary directory".into())
        );

        Ok(SwapFile {
            file,
            file_len: 0,
            used_end: 0,
            free_regions: Default::default(),
        })
    }

    /// Find room for `len` bytes, reusing a hole of the same size if there is one.
    pub(crate) fn allocate(&mut self, len: usize) -> Result<u64> {
        if let Some(offset) = self.free_regions.get_mut(&len).and_then(|v| v.pop()) {
            return Ok(offset);
        }

        let offset = self.used_end;
        let end = offset + len as u64;
        if end > self.file_len {
            let new_len = align_up(end, SWAP_FILE_ALIGNMENT);
            self.file.set_len(new_len)?;
            trace!("Grew swap file from {} to {} bytes", self.file_len, new_len);
            self.file_len = new_len;
        }

        self.used_end = end;
        Ok(offset)
    }

    /// Return a region to the free lists.
    pub(crate) fn free(&mut self, offset: u64, len: usize) {
        debug_assert!(offset + len as u64 <= self.used_end);
        self.free_regions.entry(len).or_default().push(offset);
    }

    pub(crate) fn write(&mut self, offset: u64, data: &[u8]) -> Result<()> {
        // Safety: the file is private to this process and the mapping lives only for this copy.
        let mut map = unsafe {
            MmapOptions::new()
                .offset(offset)
                .len(data.len())
                .map_mut(&self.file)?
        };
        map.copy_from_slice(data);
        Ok(())
    }

    pub(crate) fn read(&self, offset: u64, dest: &mut [u8]) -> Result<()> {
        let map = unsafe {
            MmapOptions::new()
                .offset(offset)
                .len(dest.len())
                .map(&self.file)?
        };
        dest.copy_from_slice(&map);
        Ok(())
    }

    pub(crate) fn len(&self) -> u64 {
        self.file_len
    }

    pub(crate) fn free_region_count(&self) -> usize {
        self.free_regions.values().map(|v| v.len()).sum()
    }
}
