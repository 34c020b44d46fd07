//! Tile byte buffers, and the fixed-size pools they are preferably carved out of.
//!
//! A pool is one big zeroed arena holding `tiles_per_pool` buffers for a single pixel size, plus a stack of free slot
//! indices.  Handing out and taking back a slot is `O(1)` and never touches the global allocator.  Requests nothing
//! can satisfy fall back to the heap.
//!
//! Pooled buffers keep their arena alive through an `Arc`, so a buffer is always safe to use no matter what happens to
//! the [PoolSet] it came from.
use std::alloc::{alloc_zeroed, dealloc, Layout};
use std::ops::{Deref, DerefMut};
use std::ptr::NonNull;
use std::sync::Arc;

use log::*;

use crate::errors::*;
use crate::tile_bytes;

struct Arena {
    ptr: NonNull<u8>,
    layout: Layout,
}

// The arena is plain bytes; exclusive access to each slot is handed out through `TileBuffer`.
unsafe impl Send for Arena {}
unsafe impl Sync for Arena {}

impl Arena {
    fn new(size: usize) -> Option<Arena> {
        let layout = Layout::array::<u8>(size).ok()?;
        if layout.size() == 0 {
            return None;
        }

        let ptr = NonNull::new(unsafe { alloc_zeroed(layout) })?;
        Some(Arena { ptr, layout })
    }

    fn contains(&self, ptr: NonNull<u8>) -> bool {
        let start = self.ptr.as_ptr() as usize;
        let p = ptr.as_ptr() as usize;
        p >= start && p < start + self.layout.size()
    }
}

impl Drop for Arena {
    fn drop(&mut self) {
        unsafe { dealloc(self.ptr.as_ptr(), self.layout) };
    }
}

enum Storage {
    Pooled {
        arena: Arc<Arena>,
        ptr: NonNull<u8>,
        len: usize,
    },
    Heap(Box<[u8]>),
}

/// The bytes of one tile: `TILE_WIDTH * TILE_HEIGHT * pixel_size` of them, row-major.
///
/// Contents are unspecified when freshly acquired; callers always fill them.
pub struct TileBuffer {
    storage: Storage,
}

// A pooled buffer is the only handle to its slot of the arena.
unsafe impl Send for TileBuffer {}
unsafe impl Sync for TileBuffer {}

impl TileBuffer {
    /// Was this buffer handed out by a pool, as opposed to the heap?
    pub fn is_pooled(&self) -> bool {
        matches!(self.storage, Storage::Pooled { .. })
    }
}

impl Deref for TileBuffer {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        match &self.storage {
            Storage::Pooled { ptr, len, .. } => unsafe {
                std::slice::from_raw_parts(ptr.as_ptr(), *len)
            },
            Storage::Heap(b) => b,
        }
    }
}

impl DerefMut for TileBuffer {
    fn deref_mut(&mut self) -> &mut [u8] {
        match &mut self.storage {
            Storage::Pooled { ptr, len, .. } => unsafe {
                std::slice::from_raw_parts_mut(ptr.as_ptr(), *len)
            },
            Storage::Heap(b) => b,
        }
    }
}

impl std::fmt::Debug for TileBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TileBuffer")
            .field("len", &self.len())
            .field("pooled", &self.is_pooled())
            .finish()
    }
}

struct BufferPool {
    pixel_size: usize,
    buffer_len: usize,
    arena: Arc<Arena>,
    /// Slot indices, popped from the back.
    free_slots: Vec<u32>,
}

impl BufferPool {
    fn new(pixel_size: usize, capacity: usize) -> Option<BufferPool> {
        let buffer_len = tile_bytes(pixel_size);
        let arena = Arena::new(buffer_len.checked_mul(capacity)?)?;
        Some(BufferPool {
            pixel_size,
            buffer_len,
            arena: Arc::new(arena),
            free_slots: (0..capacity as u32).rev().collect(),
        })
    }

    fn take(&mut self) -> Option<TileBuffer> {
        let slot = self.free_slots.pop()?;
        let ptr = unsafe {
            NonNull::new_unchecked(
                self.arena
                    .ptr
                    .as_ptr()
                    .add(slot as usize * self.buffer_len),
            )
        };
        Some(TileBuffer {
            storage: Storage::Pooled {
                arena: self.arena.clone(),
                ptr,
                len: self.buffer_len,
            },
        })
    }

    fn give_back(&mut self, ptr: NonNull<u8>) {
        let offset = ptr.as_ptr() as usize - self.arena.ptr.as_ptr() as usize;
        debug_assert_eq!(offset % self.buffer_len, 0);
        let slot = (offset / self.buffer_len) as u32;
        debug_assert!(!self.free_slots.contains(&slot), "Double free of a pool slot");
        self.free_slots.push(slot);
    }
}

/// Counters describing where buffers came from.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct PoolStats {
    pub pools: usize,
    pub pooled_buffers: usize,
    pub heap_buffers: usize,
}

/// All pools of a manager.  Guarded by the manager's pool lock.
pub(crate) struct PoolSet {
    pools: Vec<BufferPool>,
    max_pools: usize,
    tiles_per_pool: usize,
    heap_buffers: usize,
}

impl PoolSet {
    pub(crate) fn new(max_pools: usize, tiles_per_pool: usize) -> PoolSet {
        PoolSet {
            pools: Vec::new(),
            max_pools,
            tiles_per_pool,
            heap_buffers: 0,
        }
    }

    /// Change the pool geometry.  Existing pools keep their size.
    pub(crate) fn reconfigure(&mut self, max_pools: usize, tiles_per_pool: usize) {
        self.max_pools = max_pools;
        self.tiles_per_pool = tiles_per_pool;
    }

    pub(crate) fn acquire(&mut self, pixel_size: usize) -> Result<TileBuffer> {
        if let Some(buf) = self
            .pools
            .iter_mut()
            .filter(|p| p.pixel_size == pixel_size)
            .find_map(|p| p.take())
        {
            return Ok(buf);
        }

        if self.pools.len() < self.max_pools && self.tiles_per_pool > 0 {
            match BufferPool::new(pixel_size, self.tiles_per_pool) {
                Some(mut pool) => {
                    info!(
                        "Created tile pool {} for pixel size {} ({} buffers)",
                        self.pools.len(),
                        pixel_size,
                        self.tiles_per_pool
                    );
                    let buf = pool.take();
                    self.pools.push(pool);
                    if let Some(buf) = buf {
                        return Ok(buf);
                    }
                }
                None => warn!(
                    "Could not allocate a tile pool for pixel size {}; falling back to the heap",
                    pixel_size
                ),
            }
        }

        let bytes = tile_bytes(pixel_size);
        let mut data: Vec<u8> = Vec::new();
        data.try_reserve_exact(bytes)
            .map_err(|_| SwapError::OutOfMemory { bytes })?;
        data.resize(bytes, 0);
        self.heap_buffers += 1;
        debug!("Heap-allocated a {} byte tile buffer", bytes);
        Ok(TileBuffer {
            storage: Storage::Heap(data.into_boxed_slice()),
        })
    }

    pub(crate) fn release(&mut self, buffer: TileBuffer) {
        match buffer.storage {
            Storage::Pooled { arena, ptr, .. } => {
                if let Some(pool) = self
                    .pools
                    .iter_mut()
                    .find(|p| Arc::ptr_eq(&p.arena, &arena) && p.arena.contains(ptr))
                {
                    pool.give_back(ptr);
                }
                // Otherwise the pool is gone and the arena is freed along with its last buffer.
            }
            Storage::Heap(_) => {
                self.heap_buffers = self.heap_buffers.saturating_sub(1);
            }
        }
    }

    pub(crate) fn stats(&self) -> PoolStats {
        PoolStats {
            pools: self.pools.len(),
            pooled_buffers: self
                .pools
                .iter()
                .map(|p| self.tiles_per_pool_of(p) - p.free_slots.len())
                .sum(),
            heap_buffers: self.heap_buffers,
        }
    }

    fn tiles_per_pool_of(&self, pool: &BufferPool) -> usize {
        pool.arena.layout.size() / pool.buffer_len
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pool_reuses_slots() {
        let mut pools = PoolSet::new(4, 2);
        let a = pools.acquire(4).unwrap();
        let b = pools.acquire(4).unwrap();
        assert!(a.is_pooled());
        assert!(b.is_pooled());
        assert_eq!(a.len(), tile_bytes(4));

        let a_ptr = a.as_ptr();
        pools.release(a);
        let c = pools.acquire(4).unwrap();
        assert_eq!(c.as_ptr(), a_ptr);
        assert_eq!(pools.stats().pools, 1);
        assert_eq!(pools.stats().pooled_buffers, 2);

        pools.release(b);
        pools.release(c);
        assert_eq!(pools.stats().pooled_buffers, 0);
    }

    #[test]
    fn test_one_pool_per_pixel_size_until_limit() {
        let mut pools = PoolSet::new(2, 1);
        let a = pools.acquire(1).unwrap();
        let b = pools.acquire(3).unwrap();
        // Both pools are full and the limit is reached.
        let c = pools.acquire(1).unwrap();
        let d = pools.acquire(5).unwrap();

        assert!(a.is_pooled());
        assert!(b.is_pooled());
        assert!(!c.is_pooled());
        assert!(!d.is_pooled());
        assert_eq!(d.len(), tile_bytes(5));

        let stats = pools.stats();
        assert_eq!(stats.pools, 2);
        assert_eq!(stats.heap_buffers, 2);

        pools.release(c);
        pools.release(d);
        assert_eq!(pools.stats().heap_buffers, 0);
        pools.release(a);
        pools.release(b);
    }

    #[test]
    fn test_buffers_outlive_their_pool_set() {
        let mut pools = PoolSet::new(1, 4);
        let mut buf = pools.acquire(2).unwrap();
        drop(pools);
        buf.fill(7);
        assert!(buf.iter().all(|b| *b == 7));
    }

    #[test]
    fn test_zero_pools_means_heap() {
        let mut pools = PoolSet::new(0, 16);
        let buf = pools.acquire(4).unwrap();
        assert!(!buf.is_pooled());
        assert!(buf.iter().all(|b| *b == 0));
    }
}
