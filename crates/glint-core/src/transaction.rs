use std::cell::Cell as StdCell;
use std::rc::Rc;

use crate::{Error, Result};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Phase {
    Idle,
    Rendering,
}

/// Snapshot of the transaction slot.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RenderTransaction {
    pub id: u64,
    pub phase: Phase,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TransactionStats {
    pub committed: u64,
    pub aborted: u64,
}

/// Owns the "are we rendering" flag for one renderer.
///
/// At most one transaction is open at a time. The flag is reset by the
/// guard's `Drop`, so it goes back to [`Phase::Idle`] on early returns and on
/// unwinding alike.
#[derive(Clone, Default)]
pub struct TransactionTracker {
    inner: Rc<TrackerInner>,
}

#[derive(Default)]
struct TrackerInner {
    current: StdCell<Option<u64>>,
    last_id: StdCell<u64>,
    committed: StdCell<u64>,
    aborted: StdCell<u64>,
    batch_depth: StdCell<usize>,
}

impl TransactionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn begin(&self) -> Result<TransactionGuard> {
        if let Some(open) = self.inner.current.get() {
            return Err(Error::assertion(format!(
                "render transaction #{open} is still open; transactions cannot overlap"
            )));
        }
        let id = self.inner.last_id.get() + 1;
        self.inner.last_id.set(id);
        self.inner.current.set(Some(id));
        log::debug!("render transaction #{id} opened");
        Ok(TransactionGuard {
            tracker: self.clone(),
            id,
            committed: false,
        })
    }

    pub fn in_transaction(&self) -> bool {
        self.inner.current.get().is_some()
    }

    pub fn current(&self) -> RenderTransaction {
        match self.inner.current.get() {
            Some(id) => RenderTransaction {
                id,
                phase: Phase::Rendering,
            },
            None => RenderTransaction {
                id: self.inner.last_id.get(),
                phase: Phase::Idle,
            },
        }
    }

    pub fn stats(&self) -> TransactionStats {
        TransactionStats {
            committed: self.inner.committed.get(),
            aborted: self.inner.aborted.get(),
        }
    }

    /// Enters a batch; writes made inside are flushed once the outermost
    /// batch exits.
    pub fn enter_batch(&self) -> BatchGuard {
        self.inner.batch_depth.set(self.inner.batch_depth.get() + 1);
        BatchGuard {
            tracker: self.clone(),
        }
    }

    pub fn batch_depth(&self) -> usize {
        self.inner.batch_depth.get()
    }
}

pub struct TransactionGuard {
    tracker: TransactionTracker,
    id: u64,
    committed: bool,
}

impl TransactionGuard {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn commit(mut self) {
        self.committed = true;
    }
}

impl Drop for TransactionGuard {
    fn drop(&mut self) {
        let inner = &self.tracker.inner;
        inner.current.set(None);
        if self.committed {
            inner.committed.set(inner.committed.get() + 1);
            log::debug!("render transaction #{} committed", self.id);
        } else {
            inner.aborted.set(inner.aborted.get() + 1);
            log::warn!("render transaction #{} aborted", self.id);
        }
    }
}

pub struct BatchGuard {
    tracker: TransactionTracker,
}

impl BatchGuard {
    /// True when dropping this guard leaves no batch open.
    pub fn is_outermost(&self) -> bool {
        self.tracker.inner.batch_depth.get() == 1
    }
}

impl Drop for BatchGuard {
    fn drop(&mut self) {
        let depth = &self.tracker.inner.batch_depth;
        depth.set(depth.get().saturating_sub(1));
    }
}
