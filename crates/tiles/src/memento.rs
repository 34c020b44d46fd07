//! Undo and redo for a [TiledDataManager].
//!
//! A memento records, for every tile touched while it was recording, a private copy of the tile as it was at first
//! touch.  Rolling back swaps those copies into the grid and keeps what they replaced, so that rolling forward can
//! swap them back.
//!
//! The grid keeps the mementos which can still be rolled back in creation order, and the rolled back ones in rollback
//! order.  Only the newest of the former may be rolled back, and only the newest of the latter rolled forward.  Any
//! other change to the grid discards the rolled back list.  Dropping every handle to a memento commits it for good,
//! together with every older one.
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use atomic_refcell::AtomicRefCell;
use log::*;
use tessera_swap::{Tile, TileHandle};

use crate::coords::TileCoord;
use crate::data_manager::TiledDataManager;
use crate::errors::*;
use crate::hash_table::TileTable;

static NEXT_MEMENTO_ID: AtomicU64 = AtomicU64::new(0);

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum MementoState {
    /// The grid's open memento: writes are recorded into it.
    Recording,
    /// No longer recording; can still be rolled back.
    Finalized,
    RolledBack,
    RolledForward,
}

/// What happened to a tile while a memento was recording.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ChangeKind {
    /// The tile existed and was written to.
    Modified,
    /// The tile did not exist before.
    Created,
    /// The tile existed and was removed.
    Deleted,
}

pub(crate) struct TileChange {
    kind: ChangeKind,
    /// The tile at first touch.  `None` if it didn't exist.
    before: Option<Tile>,
    /// What the last rollback replaced.  `None` if nothing.
    after: Option<Tile>,
}

pub(crate) struct MementoInner {
    id: u64,
    grid_id: u64,
    state: MementoState,
    default_pixel: Option<Vec<u8>>,
    redo_default_pixel: Option<Vec<u8>>,
    changes: TileTable<TileChange>,
}

pub(crate) type MementoRef = Weak<AtomicRefCell<MementoInner>>;

/// The tile an old-data lookup resolves to.
pub(crate) enum OldTile {
    Snapshot(TileHandle),
    /// The tile was created after the memento was opened.
    Absent,
    /// The memento hasn't seen the tile.
    Unrecorded,
}

/// A handle to one undo step.  Clones refer to the same memento.
#[derive(Clone)]
pub struct Memento {
    inner: Arc<AtomicRefCell<MementoInner>>,
}

impl Memento {
    pub(crate) fn new(grid_id: u64) -> Memento {
        Memento {
            inner: Arc::new(AtomicRefCell::new(MementoInner {
                id: NEXT_MEMENTO_ID.fetch_add(1, Ordering::Relaxed),
                grid_id,
                state: MementoState::Recording,
                default_pixel: None,
                redo_default_pixel: None,
                changes: TileTable::new(),
            })),
        }
    }

    pub fn id(&self) -> u64 {
        self.inner.borrow().id
    }

    pub fn state(&self) -> MementoState {
        self.inner.borrow().state
    }

    pub fn is_recording(&self) -> bool {
        self.state() == MementoState::Recording
    }

    /// Number of tiles recorded.
    pub fn tile_count(&self) -> usize {
        self.inner.borrow().changes.len()
    }

    pub fn changes(&self) -> Vec<(TileCoord, ChangeKind)> {
        self.inner
            .borrow()
            .changes
            .iter()
            .map(|(c, change)| (c, change.kind))
            .collect()
    }

    /// Did the memento see the default pixel change?
    pub fn changed_default_pixel(&self) -> bool {
        self.inner.borrow().default_pixel.is_some()
    }

    pub(crate) fn downgrade(&self) -> MementoRef {
        Arc::downgrade(&self.inner)
    }

    fn is(&self, other: &MementoRef) -> bool {
        std::ptr::eq(other.as_ptr(), Arc::as_ptr(&self.inner))
    }

    pub(crate) fn finalize(&self) {
        let mut inner = self.inner.borrow_mut();
        if inner.state == MementoState::Recording {
            inner.state = MementoState::Finalized;
        }
    }

    /// Record an existing tile about to be written.  First touch wins.
    pub(crate) fn record_modified(&self, coord: TileCoord, existing: &Tile) -> Result<()> {
        let mut inner = self.inner.borrow_mut();
        debug_assert_eq!(inner.state, MementoState::Recording);
        if inner.changes.contains(coord) {
            return Ok(());
        }

        let before = existing.try_clone()?;
        inner.changes.insert(
            coord,
            TileChange {
                kind: ChangeKind::Modified,
                before: Some(before),
                after: None,
            },
        );
        Ok(())
    }

    /// Record a tile about to be created.
    pub(crate) fn record_created(&self, coord: TileCoord) {
        let mut inner = self.inner.borrow_mut();
        match inner.changes.get_mut(coord) {
            Some(change) => {
                if change.kind == ChangeKind::Deleted {
                    change.kind = ChangeKind::Modified;
                }
            }
            None => {
                inner.changes.insert(
                    coord,
                    TileChange {
                        kind: ChangeKind::Created,
                        before: None,
                        after: None,
                    },
                );
            }
        }
    }

    /// Record a tile which was just removed from the grid, taking ownership of it.
    pub(crate) fn record_deleted(&self, coord: TileCoord, tile: Tile) {
        let mut inner = self.inner.borrow_mut();
        match inner.changes.get_mut(coord) {
            Some(change) => {
                change.kind = if change.before.is_some() {
                    ChangeKind::Deleted
                } else {
                    ChangeKind::Created
                };
            }
            None => {
                inner.changes.insert(
                    coord,
                    TileChange {
                        kind: ChangeKind::Deleted,
                        before: Some(tile),
                        after: None,
                    },
                );
            }
        }
    }

    pub(crate) fn record_default_pixel(&self, old: &[u8]) {
        let mut inner = self.inner.borrow_mut();
        if inner.default_pixel.is_none() {
            inner.default_pixel = Some(old.to_vec());
        }
    }

    pub(crate) fn old_tile(&self, coord: TileCoord) -> OldTile {
        let inner = self.inner.borrow();
        match inner.changes.get(coord) {
            Some(TileChange {
                before: Some(t), ..
            }) => OldTile::Snapshot(t.handle().clone()),
            Some(_) => OldTile::Absent,
            None => OldTile::Unrecorded,
        }
    }
}

impl std::fmt::Debug for Memento {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.borrow();
        f.debug_struct("Memento")
            .field("id", &inner.id)
            .field("state", &inner.state)
            .field("tiles", &inner.changes.len())
            .finish()
    }
}

fn clone_tiles<'a>(
    tiles: impl Iterator<Item = (TileCoord, Option<&'a Tile>)>,
) -> Result<Vec<(TileCoord, Option<Tile>)>> {
    tiles
        .map(|(c, t)| -> Result<(TileCoord, Option<Tile>)> {
            Ok((c, t.map(|t| t.try_clone()).transpose()?))
        })
        .collect()
}

impl TiledDataManager {
    /// Start a new undo step.  Whatever memento was recording stops.
    pub fn get_memento(&mut self) -> Memento {
        self.commit();

        let memento = Memento::new(self.id);
        self.forget_committed();
        self.history.push(memento.downgrade());
        self.redo.clear();
        self.current_memento = Some(memento.clone());
        debug!("Grid {}: opened memento {}", self.id, memento.id());
        memento
    }

    /// A dropped memento can't be rolled back, and neither can anything older than it.
    fn forget_committed(&mut self) {
        if let Some(i) = self.history.iter().rposition(|m| m.strong_count() == 0) {
            self.history.drain(..=i);
        }
    }

    /// Stop recording without opening a new memento.
    pub fn commit(&mut self) {
        if let Some(m) = self.current_memento.take() {
            m.finalize();
        }
    }

    /// The memento currently recording, if any.
    pub fn current_memento(&self) -> Option<&Memento> {
        self.current_memento.as_ref()
    }

    /// Restore every tile the memento recorded to its state when the memento was opened.
    ///
    /// Must be called for the newest memento which hasn't been rolled back yet.
    pub fn rollback(&mut self, memento: &Memento) -> Result<()> {
        let mut guard = memento.inner.borrow_mut();
        let inner: &mut MementoInner = &mut guard;

        if inner.grid_id != self.id {
            return Err(MementoStateError::WrongGrid.into());
        }
        if inner.state == MementoState::RolledBack {
            return Err(MementoStateError::AlreadyRolledBack.into());
        }

        self.forget_committed();
        if !self.history.last().map(|m| memento.is(m)).unwrap_or(false) {
            debug!("Grid {}: memento {} rolled back out of order", self.id, inner.id);
            return Err(MementoStateError::NotLatest.into());
        }

        // Everything which can fail happens before the grid is touched.
        let restored = clone_tiles(inner.changes.iter().map(|(c, ch)| (c, ch.before.as_ref())))?;
        if let Some(pixel) = &inner.default_pixel {
            let current = self.default_pixel.clone();
            self.fill_default_tile(pixel)?;
            inner.redo_default_pixel = Some(current);
        }

        for (coord, before) in restored {
            let after = self.tiles.remove(coord);
            if let Some(t) = before {
                self.tiles.insert(coord, t);
            }
            if let Some(change) = inner.changes.get_mut(coord) {
                change.after = after;
            }
        }

        if self
            .current_memento
            .as_ref()
            .map(|m| Arc::ptr_eq(&m.inner, &memento.inner))
            .unwrap_or(false)
        {
            self.current_memento = None;
        }
        inner.state = MementoState::RolledBack;
        self.history.pop();
        self.redo.push(memento.downgrade());
        self.recalculate_extent();

        debug!(
            "Grid {}: rolled back memento {} ({} tiles)",
            self.id,
            inner.id,
            inner.changes.len()
        );
        Ok(())
    }

    /// Undo a rollback.  Only valid for the most recently rolled back memento, and only if the grid wasn't changed
    /// since.
    pub fn rollforward(&mut self, memento: &Memento) -> Result<()> {
        let mut guard = memento.inner.borrow_mut();
        let inner: &mut MementoInner = &mut guard;

        if inner.grid_id != self.id {
            return Err(MementoStateError::WrongGrid.into());
        }
        if inner.state != MementoState::RolledBack {
            return Err(MementoStateError::NotRolledBack.into());
        }

        // Dropped entries stay put: a memento rolled back after this one and since dropped blocks it for good.
        match self.redo.iter().position(|m| memento.is(m)) {
            None => {
                debug!("Grid {}: memento {} rolled forward after a change", self.id, inner.id);
                return Err(MementoStateError::GridModified.into());
            }
            Some(i) if i + 1 != self.redo.len() => {
                debug!("Grid {}: memento {} rolled forward out of order", self.id, inner.id);
                return Err(MementoStateError::NotNextRedo.into());
            }
            Some(_) => {}
        }

        let restored = clone_tiles(inner.changes.iter().map(|(c, ch)| (c, ch.after.as_ref())))?;
        if let Some(pixel) = &inner.redo_default_pixel {
            self.fill_default_tile(pixel)?;
        }

        for (coord, after) in restored {
            self.tiles.remove(coord);
            if let Some(t) = after {
                self.tiles.insert(coord, t);
            }
        }

        inner.state = MementoState::RolledForward;
        self.redo.pop();
        self.history.push(memento.downgrade());
        self.recalculate_extent();

        debug!(
            "Grid {}: rolled forward memento {} ({} tiles)",
            self.id,
            inner.id,
            inner.changes.len()
        );
        Ok(())
    }
}
