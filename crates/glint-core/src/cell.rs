//! Tracked storage.
//!
//! A [`Cell`] is one mutable slot. Reading it while a computation is being
//! tracked records an edge `cell -> observer` in a thread-local dependency
//! graph. Writing it walks those edges and calls each observer's *schedule*
//! callback. Observers are never recomputed synchronously from a write; the
//! callback only queues them (the renderer turns that into a dirty instance).

use std::cell::{Cell as StdCell, RefCell};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::rc::Rc;

use crate::{Error, Result};

pub type CellId = usize;
pub type ObserverId = usize;

thread_local! {
    static CURRENT_OBSERVER: RefCell<Option<ObserverId>> = const { RefCell::new(None) };
    static GRAPH: RefCell<DepGraph> = RefCell::new(DepGraph::default());
}

#[derive(Default)]
struct DepGraph {
    next_cell: CellId,
    next_observer: ObserverId,
    // cell -> observers that read it
    edges: HashMap<CellId, HashSet<ObserverId>>,
    // observer -> cells it read during its last run
    back: HashMap<ObserverId, HashSet<CellId>>,
    // schedule callbacks
    observers: HashMap<ObserverId, Rc<dyn Fn()>>,
}

impl DepGraph {
    fn remove_all_edges_for(&mut self, obs: ObserverId) {
        if let Some(cells) = self.back.remove(&obs) {
            for c in cells {
                if let Some(set) = self.edges.get_mut(&c) {
                    set.remove(&obs);
                    if set.is_empty() {
                        self.edges.remove(&c);
                    }
                }
            }
        }
    }
}

/// Allocates an id for something that behaves like a cell (e.g. the tag of a
/// [`Derived`](crate::Derived)).
pub fn next_cell_id() -> CellId {
    GRAPH.with(|g| {
        let mut g = g.borrow_mut();
        let id = g.next_cell;
        g.next_cell += 1;
        id
    })
}

/// Records a read of `cell` by the currently tracked computation, if any.
pub fn register_read(cell: CellId) {
    CURRENT_OBSERVER.with(|co| {
        if let Some(obs) = *co.borrow() {
            GRAPH.with(|g| {
                let mut g = g.borrow_mut();
                g.edges.entry(cell).or_default().insert(obs);
                g.back.entry(obs).or_default().insert(cell);
            });
        }
    });
}

/// Notifies every observer that read `cell`.
pub fn invalidate(cell: CellId) {
    let callbacks: Vec<(ObserverId, Rc<dyn Fn()>)> = GRAPH.with(|g| {
        let g = g.borrow();
        let Some(dependents) = g.edges.get(&cell) else {
            return Vec::new();
        };
        let mut ids: Vec<ObserverId> = dependents.iter().copied().collect();
        ids.sort_unstable();
        ids.into_iter()
            .filter_map(|id| g.observers.get(&id).map(|f| (id, f.clone())))
            .collect()
    });
    for (id, schedule) in callbacks {
        log::trace!("cell #{cell} invalidated observer #{id}");
        schedule();
    }
}

/// Registers a computation; `schedule` runs whenever one of its dependencies
/// is written.
pub fn new_observer(schedule: impl Fn() + 'static) -> ObserverId {
    GRAPH.with(|g| {
        let mut g = g.borrow_mut();
        let id = g.next_observer;
        g.next_observer += 1;
        g.observers.insert(id, Rc::new(schedule));
        id
    })
}

/// Remove an observer and all of its dependency edges.
pub fn remove_observer(id: ObserverId) {
    GRAPH.with(|g| {
        let mut g = g.borrow_mut();
        g.observers.remove(&id);
        g.remove_all_edges_for(id);
    });
}

/// Cells read by `obs` during its most recent tracked run.
pub fn dependencies(obs: ObserverId) -> Vec<CellId> {
    GRAPH.with(|g| {
        let mut deps: Vec<CellId> = g
            .borrow()
            .back
            .get(&obs)
            .map(|s| s.iter().copied().collect())
            .unwrap_or_default();
        deps.sort_unstable();
        deps
    })
}

pub fn current_observer() -> Option<ObserverId> {
    CURRENT_OBSERVER.with(|co| *co.borrow())
}

fn with_observer<R>(obs: Option<ObserverId>, f: impl FnOnce() -> R) -> R {
    // restores the previous observer on unwind too
    struct Restore(Option<ObserverId>);
    impl Drop for Restore {
        fn drop(&mut self) {
            CURRENT_OBSERVER.with(|co| *co.borrow_mut() = self.0);
        }
    }
    let prev = CURRENT_OBSERVER.with(|co| std::mem::replace(&mut *co.borrow_mut(), obs));
    let _restore = Restore(prev);
    f()
}

/// Runs `f` as observer `obs`. Edges from its previous run are dropped first,
/// so afterwards the graph holds exactly what `f` read.
pub fn track<R>(obs: ObserverId, f: impl FnOnce() -> R) -> R {
    GRAPH.with(|g| g.borrow_mut().remove_all_edges_for(obs));
    with_observer(Some(obs), f)
}

/// Like [`track`], but keeps the edges `obs` already has.
pub fn track_also<R>(obs: ObserverId, f: impl FnOnce() -> R) -> R {
    with_observer(Some(obs), f)
}

/// Runs `f` without recording any reads.
pub fn untracked<R>(f: impl FnOnce() -> R) -> R {
    with_observer(None, f)
}

/// Observable, writable slot.
pub struct Cell<T: 'static>(Rc<CellInner<T>>);

struct CellInner<T> {
    id: CellId,
    value: RefCell<T>,
    retired: StdCell<bool>,
}

impl<T> Clone for Cell<T> {
    fn clone(&self) -> Self {
        Self(self.0.clone())
    }
}

impl<T: fmt::Debug> fmt::Debug for Cell<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cell")
            .field("id", &self.0.id)
            .field("value", &*self.0.value.borrow())
            .finish()
    }
}

impl<T: 'static> Cell<T> {
    pub fn new(value: T) -> Self {
        Self(Rc::new(CellInner {
            id: next_cell_id(),
            value: RefCell::new(value),
            retired: StdCell::new(false),
        }))
    }

    pub fn id(&self) -> CellId {
        self.0.id
    }

    pub fn get(&self) -> T
    where
        T: Clone,
    {
        register_read(self.0.id);
        self.0.value.borrow().clone()
    }

    /// Untracked read.
    pub fn peek(&self) -> T
    where
        T: Clone,
    {
        self.0.value.borrow().clone()
    }

    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        register_read(self.0.id);
        f(&self.0.value.borrow())
    }

    /// Stores `value`. Writing the value the cell already holds is a no-op.
    pub fn set(&self, value: T) -> Result<()>
    where
        T: PartialEq,
    {
        self.check_live()?;
        {
            let mut slot = self.0.value.borrow_mut();
            if *slot == value {
                return Ok(());
            }
            *slot = value;
        }
        invalidate(self.0.id);
        Ok(())
    }

    /// Mutates in place and always invalidates.
    pub fn update(&self, f: impl FnOnce(&mut T)) -> Result<()> {
        self.check_live()?;
        f(&mut self.0.value.borrow_mut());
        invalidate(self.0.id);
        Ok(())
    }

    /// Marks the cell as belonging to a torn-down owner; later writes fail.
    pub fn retire(&self) {
        self.0.retired.set(true);
    }

    pub fn is_retired(&self) -> bool {
        self.0.retired.get()
    }

    pub fn ptr_eq(&self, other: &Cell<T>) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    fn check_live(&self) -> Result<()> {
        if self.0.retired.get() {
            return Err(Error::StaleWrite {
                target: format!("cell #{}", self.0.id),
            });
        }
        Ok(())
    }
}

pub fn cell<T>(value: T) -> Cell<T> {
    Cell::new(value)
}
