//! The [TileManager]: owner of every tile buffer, and the thing which decides when they go to disk.
//!
//! The pool lock only covers handing out and taking back buffers.  The swap lock covers registration, the eviction
//! candidate list, and the swap file; it is held across every check-then-act sequence so that two threads never race
//! to move the same tile.  Each tile additionally has a small bookkeeping lock (pins, candidacy), only taken under the
//! swap lock, and a reader/writer lock around its bytes.
//!
//! Locks are always taken in the order swap, bookkeeping, bytes, pool.  Eviction only ever tries to lock a tile's bytes
//! and skips busy tiles, and fault-in only locks bytes which are on disk and so have no guards.  That is what lets
//! data access hold a tile's bytes while taking the swap lock for another tile.
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{
    Arc, Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard, TryLockError,
};

use log::*;

use crate::buffer::{PoolSet, TileBuffer};
use crate::config::SwapConfig;
use crate::errors::*;
use crate::swap_file::SwapFile;
use crate::tile::TileHandle;

pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

pub(crate) fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

pub(crate) fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}

pub(crate) enum Residency {
    Resident(TileBuffer),
    Swapped { offset: u64, len: usize },
    Released,
}

#[derive(Default)]
struct SlotBook {
    /// Key in the candidate list, if this tile is currently an eviction candidate.
    candidate: Option<u64>,
    pins: u32,
    /// Mirrors `Residency::Swapped`, so that pinning a resident tile never waits on its byte lock.
    swapped: bool,
    registered: bool,
    released: bool,
}

/// The manager's view of one tile buffer.
pub(crate) struct TileSlot {
    pub(crate) id: u64,
    pub(crate) pixel_size: usize,
    book: Mutex<SlotBook>,
    pub(crate) data: RwLock<Residency>,
}

impl TileSlot {
    pub(crate) fn pins(&self) -> u32 {
        lock(&self.book).pins
    }

    pub(crate) fn is_registered(&self) -> bool {
        lock(&self.book).registered
    }
}

struct SwapState {
    config: SwapConfig,
    /// Created on first eviction.
    file: Option<SwapFile>,
    /// Eviction candidates, oldest admission first.
    candidates: BTreeMap<u64, Arc<TileSlot>>,
    next_seq: u64,
    registered: usize,
    /// Registered tiles whose bytes are in memory.
    resident: usize,
    swapped: usize,
}

impl SwapState {
    fn admit(&mut self, slot: &Arc<TileSlot>, book: &mut SlotBook) {
        debug_assert!(book.candidate.is_none());
        let seq = self.next_seq;
        self.next_seq += 1;
        book.candidate = Some(seq);
        self.candidates.insert(seq, slot.clone());
    }

    fn withdraw(&mut self, book: &mut SlotBook) {
        if let Some(seq) = book.candidate.take() {
            self.candidates.remove(&seq);
        }
    }
}

/// A snapshot of a manager's counters.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct SwapStats {
    pub registered_tiles: usize,
    pub resident_tiles: usize,
    pub swapped_tiles: usize,
    pub eviction_candidates: usize,
    pub pools: usize,
    pub pooled_buffers: usize,
    pub heap_buffers: usize,
    pub swap_file_bytes: u64,
    pub free_swap_regions: usize,
    pub swap_forbidden: bool,
}

pub struct TileManager {
    pools: Mutex<PoolSet>,
    swap: Mutex<SwapState>,
    /// Latched by the first swap failure; never cleared.
    swap_forbidden: AtomicBool,
    next_slot_id: AtomicU64,
}

lazy_static::lazy_static! {
    static ref SHARED_MANAGER: Arc<TileManager> = Arc::new(TileManager::new(SwapConfig::from_env()));
}

impl TileManager {
    pub fn new(config: SwapConfig) -> TileManager {
        TileManager {
            pools: Mutex::new(PoolSet::new(config.max_pools, config.tiles_per_pool)),
            swap: Mutex::new(SwapState {
                config,
                file: None,
                candidates: Default::default(),
                next_seq: 0,
                registered: 0,
                resident: 0,
                swapped: 0,
            }),
            swap_forbidden: AtomicBool::new(false),
            next_slot_id: AtomicU64::new(0),
        }
    }

    /// The process-wide manager, configured from the environment on first use.
    pub fn shared() -> Arc<TileManager> {
        SHARED_MANAGER.clone()
    }

    pub fn config(&self) -> SwapConfig {
        lock(&self.swap).config.clone()
    }

    /// Replace the configuration, then evict if the new ceiling demands it.
    ///
    /// Pool geometry changes only apply to pools created from now on.
    pub fn reconfigure(&self, config: SwapConfig) {
        lock(&self.pools).reconfigure(config.max_pools, config.tiles_per_pool);

        let mut swap = lock(&self.swap);
        info!(
            "Reconfigured tile manager: max {} tiles in memory, eviction batch {}",
            config.max_tiles_in_memory, config.eviction_batch_size
        );
        swap.config = config;
        self.sweep(&mut swap);
    }

    pub fn is_swap_forbidden(&self) -> bool {
        self.swap_forbidden.load(Ordering::Relaxed)
    }

    pub fn stats(&self) -> SwapStats {
        let mut stats = {
            let swap = lock(&self.swap);
            SwapStats {
                registered_tiles: swap.registered,
                resident_tiles: swap.resident,
                swapped_tiles: swap.swapped,
                eviction_candidates: swap.candidates.len(),
                swap_file_bytes: swap.file.as_ref().map(|f| f.len()).unwrap_or(0),
                free_swap_regions: swap
                    .file
                    .as_ref()
                    .map(|f| f.free_region_count())
                    .unwrap_or(0),
                swap_forbidden: self.is_swap_forbidden(),
                ..Default::default()
            }
        };

        let pools = lock(&self.pools).stats();
        stats.pools = pools.pools;
        stats.pooled_buffers = pools.pooled_buffers;
        stats.heap_buffers = pools.heap_buffers;
        stats
    }

    /// Get a buffer for one tile of the given pixel size.  Contents are unspecified.
    pub fn acquire_buffer(&self, pixel_size: usize) -> Result<TileBuffer> {
        lock(&self.pools).acquire(pixel_size)
    }

    /// Give a buffer back to the pool it came from, or to the heap.
    pub fn release_buffer(&self, buffer: TileBuffer) {
        lock(&self.pools).release(buffer)
    }

    /// Wrap a buffer into a new, unregistered tile slot.
    pub(crate) fn new_slot(self: &Arc<Self>, pixel_size: usize, buffer: TileBuffer) -> TileHandle {
        debug_assert_eq!(buffer.len(), crate::tile_bytes(pixel_size));
        let slot = TileSlot {
            id: self.next_slot_id.fetch_add(1, Ordering::Relaxed),
            pixel_size,
            book: Default::default(),
            data: RwLock::new(Residency::Resident(buffer)),
        };

        TileHandle {
            slot: Arc::new(slot),
            manager: self.clone(),
        }
    }

    /// Make a tile swappable.  It joins the back of the eviction candidate list unless pinned.
    ///
    /// Registering twice is a no-op.
    pub fn register_tile(&self, handle: &TileHandle) {
        let mut swap = lock(&self.swap);
        {
            let mut book = lock(&handle.slot.book);
            if book.registered || book.released {
                return;
            }

            book.registered = true;
            swap.registered += 1;
            swap.resident += 1;
            if book.pins == 0 {
                swap.admit(&handle.slot, &mut book);
            }
        }

        self.sweep(&mut swap);
    }

    /// Forget a tile: its buffer goes back to the pools, or its swap file region to the free lists.
    ///
    /// The tile's data is gone afterwards.  Deregistering twice is a no-op.
    pub fn deregister_tile(&self, handle: &TileHandle) {
        let mut swap = lock(&self.swap);
        let mut book = lock(&handle.slot.book);
        if book.released {
            return;
        }

        swap.withdraw(&mut book);
        book.released = true;
        let residency = std::mem::replace(&mut *write(&handle.slot.data), Residency::Released);
        match residency {
            Residency::Resident(buffer) => {
                if book.registered {
                    swap.resident -= 1;
                }
                lock(&self.pools).release(buffer);
            }
            Residency::Swapped { offset, len } => {
                swap.swapped -= 1;
                if let Some(file) = swap.file.as_mut() {
                    file.free(offset, len);
                }
            }
            Residency::Released => {}
        }

        if book.registered {
            book.registered = false;
            swap.registered -= 1;
        }
    }

    /// Pin a tile: make sure its bytes are in memory and keep them there until the matching [Self::may_swap_tile].
    ///
    /// Blocks while the tile is read back from the swap file.
    pub fn ensure_tile_loaded(&self, handle: &TileHandle) -> Result<()> {
        self.pin(&handle.slot)
    }

    /// Unpin a tile.  Once the last pin is gone it goes to the back of the eviction candidate list.
    pub fn may_swap_tile(&self, handle: &TileHandle) {
        self.unpin(&handle.slot)
    }

    fn pin(&self, slot: &Arc<TileSlot>) -> Result<()> {
        let mut swap = lock(&self.swap);
        {
            let mut book = lock(&slot.book);
            if book.released {
                return Err(SwapError::TileReleased);
            }

            swap.withdraw(&mut book);
            if book.swapped {
                if let Err(e) = self.fault_in(&mut swap, slot) {
                    if book.pins == 0 && book.registered {
                        swap.admit(slot, &mut book);
                    }
                    return Err(e);
                }
                book.swapped = false;
            }
            book.pins += 1;
        }

        self.sweep(&mut swap);
        Ok(())
    }

    fn unpin(&self, slot: &Arc<TileSlot>) {
        let mut swap = lock(&self.swap);
        {
            let mut book = lock(&slot.book);
            if book.pins == 0 {
                debug!("Tile {} unpinned more often than pinned", slot.id);
                return;
            }

            book.pins -= 1;
            if book.pins == 0 && book.registered && !book.released && book.candidate.is_none() {
                swap.admit(slot, &mut book);
            }
        }

        self.sweep(&mut swap);
    }

    /// Whether the bytes are in memory.  Released tiles are an error.
    fn is_resident(data: &Residency) -> Result<bool> {
        match data {
            Residency::Resident(_) => Ok(true),
            Residency::Swapped { .. } => Ok(false),
            Residency::Released => Err(SwapError::TileReleased),
        }
    }

    /// Read-lock a tile's bytes, faulting them in if required.
    ///
    /// A tile which has to be faulted in is pinned first, so that no sweep can send it back out before the lock is
    /// taken.  The returned flag says so; the caller unpins once the guard is gone.
    pub(crate) fn load_read<'a>(&self, slot: &'a Arc<TileSlot>) -> Result<(RwLockReadGuard<'a, Residency>, bool)> {
        {
            let data = read(&slot.data);
            if Self::is_resident(&data)? {
                return Ok((data, false));
            }
        }

        self.pin(slot)?;
        let data = read(&slot.data);
        match Self::is_resident(&data) {
            Ok(true) => Ok((data, true)),
            // Pinned tiles are never evicted, so only a concurrent release gets here.
            _ => {
                drop(data);
                self.unpin(slot);
                Err(SwapError::TileReleased)
            }
        }
    }

    /// Like [Self::load_read], but for writing.
    pub(crate) fn load_write<'a>(&self, slot: &'a Arc<TileSlot>) -> Result<(RwLockWriteGuard<'a, Residency>, bool)> {
        {
            let data = write(&slot.data);
            if Self::is_resident(&data)? {
                return Ok((data, false));
            }
        }

        self.pin(slot)?;
        let data = write(&slot.data);
        match Self::is_resident(&data) {
            Ok(true) => Ok((data, true)),
            _ => {
                drop(data);
                self.unpin(slot);
                Err(SwapError::TileReleased)
            }
        }
    }

    /// Drop a pin taken by [Self::load_read] or [Self::load_write].
    pub(crate) fn release_load(&self, slot: &Arc<TileSlot>) {
        self.unpin(slot)
    }

    /// Bring a swapped tile's bytes back.  Does nothing for resident tiles.
    fn fault_in(&self, swap: &mut SwapState, slot: &TileSlot) -> Result<()> {
        // Nobody holds a guard on swapped bytes, and nobody can swap them in without the swap lock we hold.
        let mut data = write(&slot.data);
        let (offset, len) = match *data {
            Residency::Swapped { offset, len } => (offset, len),
            _ => return Ok(()),
        };

        let mut buffer = lock(&self.pools).acquire(slot.pixel_size)?;
        let file = swap
            .file
            .as_mut()
            .expect("A swapped tile implies a swap file exists");
        if let Err(e) = file.read(offset, &mut buffer[..len]) {
            lock(&self.pools).release(buffer);
            self.forbid_swap(&e);
            return Err(e);
        }

        file.free(offset, len);
        *data = Residency::Resident(buffer);
        swap.swapped -= 1;
        swap.resident += 1;
        trace!("Faulted tile {} back in from offset {}", slot.id, offset);
        Ok(())
    }

    fn forbid_swap(&self, error: &SwapError) {
        if !self.swap_forbidden.swap(true, Ordering::Relaxed) {
            error!(
                "Tile swapping failed and is now disabled for this process: {}",
                error
            );
        }
    }

    /// Evict candidates from the front of the list while more tiles than allowed are resident.
    fn sweep(&self, swap: &mut SwapState) {
        if !swap.config.swap_enabled
            || self.is_swap_forbidden()
            || swap.resident <= swap.config.max_tiles_in_memory
        {
            return;
        }

        let batch = swap.config.eviction_batch_size.max(1);
        let mut evicted = 0;
        let mut busy = vec![];

        while evicted < batch {
            let seq = match swap.candidates.keys().next() {
                Some(s) => *s,
                None => break,
            };
            let slot = match swap.candidates.remove(&seq) {
                Some(s) => s,
                None => break,
            };

            let mut book = lock(&slot.book);
            book.candidate = None;

            let result = match slot.data.try_write() {
                Ok(mut data) => self.evict(swap, &slot, &mut data),
                Err(TryLockError::Poisoned(p)) => self.evict(swap, &slot, &mut p.into_inner()),
                Err(TryLockError::WouldBlock) => {
                    book.candidate = Some(seq);
                    drop(book);
                    busy.push((seq, slot.clone()));
                    continue;
                }
            };

            match result {
                Ok(()) => {
                    book.swapped = true;
                    evicted += 1;
                }
                Err(e) => {
                    // Put it back where it was; nothing will be evicted any more.
                    book.candidate = Some(seq);
                    drop(book);
                    swap.candidates.insert(seq, slot);
                    self.forbid_swap(&e);
                    break;
                }
            }
        }

        for (seq, slot) in busy {
            swap.candidates.insert(seq, slot);
        }

        if evicted > 0 {
            trace!(
                "Evicted {} tiles, {} remain in memory",
                evicted,
                swap.resident
            );
        }
    }

    fn evict(&self, swap: &mut SwapState, slot: &TileSlot, data: &mut Residency) -> Result<()> {
        let buffer = match &*data {
            Residency::Resident(b) => b,
            _ => return Ok(()),
        };

        if swap.file.is_none() {
            swap.file = Some(SwapFile::new(swap.config.swap_dir.as_deref())?);
        }
        let file = swap
            .file
            .as_mut()
            .expect("The swap file was created just above");

        let len = buffer.len();
        let offset = file.allocate(len)?;
        if let Err(e) = file.write(offset, &buffer[..]) {
            file.free(offset, len);
            return Err(e);
        }

        if let Residency::Resident(buffer) =
            std::mem::replace(data, Residency::Swapped { offset, len })
        {
            lock(&self.pools).release(buffer);
        }
        swap.resident -= 1;
        swap.swapped += 1;
        trace!("Evicted tile {} to offset {}", slot.id, offset);
        Ok(())
    }
}

impl Default for TileManager {
    fn default() -> Self {
        TileManager::new(SwapConfig::default())
    }
}

impl std::fmt::Debug for TileManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TileManager")
            .field("stats", &self.stats())
            .finish()
    }
}
