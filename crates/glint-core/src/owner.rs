use std::cell::{Cell as StdCell, RefCell};
use std::rc::{Rc, Weak};

/// Lifetime scope for things that must be cleaned up together.
///
/// An application owns one root `Owner`; every component instance gets a child
/// of its parent's owner. Disposing an owner disposes its children first, then
/// runs its own disposers in registration order.
pub struct Owner {
    inner: Rc<OwnerInner>,
}

struct OwnerInner {
    label: String,
    disposers: RefCell<Vec<Box<dyn FnOnce()>>>,
    children: RefCell<Vec<Owner>>,
    parent: RefCell<Option<Weak<OwnerInner>>>,
    destroyed: StdCell<bool>,
}

impl Owner {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            inner: Rc::new(OwnerInner {
                label: label.into(),
                disposers: RefCell::new(Vec::new()),
                children: RefCell::new(Vec::new()),
                parent: RefCell::new(None),
                destroyed: StdCell::new(false),
            }),
        }
    }

    pub fn label(&self) -> &str {
        &self.inner.label
    }

    pub fn child(&self, label: impl Into<String>) -> Owner {
        let child = Owner::new(label);
        *child.inner.parent.borrow_mut() = Some(Rc::downgrade(&self.inner));
        if self.is_destroyed() {
            log::warn!(
                "owner `{}` is destroyed; child `{}` starts detached",
                self.inner.label,
                child.inner.label
            );
        } else {
            self.inner.children.borrow_mut().push(child.clone());
        }
        child
    }

    /// Registers cleanup. On an already destroyed owner it runs immediately.
    pub fn add_disposer(&self, disposer: impl FnOnce() + 'static) {
        if self.is_destroyed() {
            disposer();
            return;
        }
        self.inner.disposers.borrow_mut().push(Box::new(disposer));
    }

    pub fn is_destroyed(&self) -> bool {
        self.inner.destroyed.get()
    }

    pub fn dispose(&self) {
        if self.inner.destroyed.replace(true) {
            return;
        }

        // Dispose children first
        let children = std::mem::take(&mut *self.inner.children.borrow_mut());
        for child in children {
            child.dispose();
        }

        let disposers = std::mem::take(&mut *self.inner.disposers.borrow_mut());
        for disposer in disposers {
            disposer();
        }

        if let Some(parent) = self.inner.parent.borrow_mut().take().and_then(|p| p.upgrade()) {
            parent
                .children
                .borrow_mut()
                .retain(|c| !Rc::ptr_eq(&c.inner, &self.inner));
        }
    }

    pub fn child_count(&self) -> usize {
        self.inner.children.borrow().len()
    }
}

impl Clone for Owner {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl std::fmt::Debug for Owner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Owner")
            .field("label", &self.inner.label)
            .field("destroyed", &self.inner.destroyed.get())
            .finish()
    }
}

impl Drop for OwnerInner {
    fn drop(&mut self) {
        if self.destroyed.get() {
            return;
        }
        let disposers = std::mem::take(&mut *self.disposers.borrow_mut());
        for disposer in disposers {
            disposer();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn children_dispose_before_parent() {
        let order = Rc::new(RefCell::new(Vec::new()));
        let root = Owner::new("root");
        let child = root.child("child");

        let o = order.clone();
        root.add_disposer(move || o.borrow_mut().push("root"));
        let o = order.clone();
        child.add_disposer(move || o.borrow_mut().push("child"));

        root.dispose();
        assert_eq!(*order.borrow(), vec!["child", "root"]);
        assert!(child.is_destroyed());
    }

    #[test]
    fn disposing_a_child_detaches_it() {
        let root = Owner::new("root");
        let child = root.child("child");
        assert_eq!(root.child_count(), 1);
        child.dispose();
        assert_eq!(root.child_count(), 0);
        assert!(!root.is_destroyed());
    }

    #[test]
    fn late_disposers_run_immediately() {
        let ran = Rc::new(StdCell::new(false));
        let owner = Owner::new("gone");
        owner.dispose();
        let r = ran.clone();
        owner.add_disposer(move || r.set(true));
        assert!(ran.get());
    }
}
