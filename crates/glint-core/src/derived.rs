use std::cell::{Cell as StdCell, RefCell};
use std::rc::Rc;

use crate::cell::{self, CellId, ObserverId};

/// Memoised computation over cells.
///
/// The cached value is dropped as soon as one of the cells it read is
/// written; the next `get` recomputes. Readers of a `Derived` are invalidated
/// along with it, so derived values chain.
pub struct Derived<T: Clone + 'static> {
    inner: Rc<DerivedInner<T>>,
}

struct DerivedInner<T> {
    tag: CellId,
    observer: ObserverId,
    compute: Box<dyn Fn() -> T>,
    cached: RefCell<Option<T>>,
    runs: StdCell<usize>,
}

impl<T: Clone + 'static> Clone for Derived<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T: Clone + 'static> Derived<T> {
    pub fn new(compute: impl Fn() -> T + 'static) -> Self {
        let inner = Rc::new_cyclic(|weak: &std::rc::Weak<DerivedInner<T>>| {
            let weak = weak.clone();
            let tag = cell::next_cell_id();
            let observer = cell::new_observer(move || {
                if let Some(inner) = weak.upgrade() {
                    inner.cached.borrow_mut().take();
                    cell::invalidate(inner.tag);
                }
            });
            DerivedInner {
                tag,
                observer,
                compute: Box::new(compute),
                cached: RefCell::new(None),
                runs: StdCell::new(0),
            }
        });
        Self { inner }
    }

    pub fn get(&self) -> T {
        cell::register_read(self.inner.tag);
        if let Some(v) = self.inner.cached.borrow().as_ref() {
            return v.clone();
        }
        let v = cell::track(self.inner.observer, || (self.inner.compute)());
        self.inner.runs.set(self.inner.runs.get() + 1);
        *self.inner.cached.borrow_mut() = Some(v.clone());
        v
    }

    pub fn invalidate(&self) {
        self.inner.cached.borrow_mut().take();
        cell::invalidate(self.inner.tag);
    }

    pub fn is_cached(&self) -> bool {
        self.inner.cached.borrow().is_some()
    }

    /// How many times the computation has actually run.
    pub fn runs(&self) -> usize {
        self.inner.runs.get()
    }
}

impl<T> Drop for DerivedInner<T> {
    fn drop(&mut self) {
        cell::remove_observer(self.observer);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cell::cell;

    #[test]
    fn caches_until_a_dependency_changes() {
        let first = cell("Jane".to_string());
        let last = cell("Doe".to_string());
        let full = Derived::new({
            let first = first.clone();
            let last = last.clone();
            move || format!("{} {}", first.get(), last.get())
        });

        assert_eq!(full.get(), "Jane Doe");
        assert_eq!(full.get(), "Jane Doe");
        assert_eq!(full.runs(), 1);

        last.set("Roe".into()).unwrap();
        assert!(!full.is_cached());
        assert_eq!(full.get(), "Jane Roe");
        assert_eq!(full.runs(), 2);
    }

    #[test]
    fn chained_derived_values_invalidate_together() {
        let n = cell(2);
        let doubled = Derived::new({
            let n = n.clone();
            move || n.get() * 2
        });
        let quadrupled = Derived::new({
            let d = doubled.clone();
            move || d.get() * 2
        });
        assert_eq!(quadrupled.get(), 8);
        n.set(3).unwrap();
        assert!(!quadrupled.is_cached());
        assert_eq!(quadrupled.get(), 12);
    }
}
