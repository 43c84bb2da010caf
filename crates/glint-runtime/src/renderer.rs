//! Render transactions.
//!
//! Every entry point (`render`, `flush`, `destroy`, `teardown`) opens one
//! transaction and runs it in two passes:
//!
//! 1. the walk: create and update instances top-down, firing the sync hooks
//!    and patching the document;
//! 2. the commit: detach removed content, then fire the post hooks
//!    bottom-up, then the destruction hooks.
//!
//! If the walk fails the document and every touched instance go back to the
//! checkpoint taken when the transaction opened. Pending updates outside the
//! failed component's line stay queued for the next flush.

use std::cell::{Cell as StdCell, RefCell};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::rc::{Rc, Weak};

use glint_core::{
    Derived, Document, Error, LifecycleState, NodeId, Owner, RenderTransaction, Result, TransactionTracker,
    new_observer, remove_observer, track, untracked,
};

use crate::actions::ActionModifier;
use crate::component::ComponentDescriptor;
use crate::config::RenderConfig;
use crate::container::Container;
use crate::definition::{Capabilities, Definition};
use crate::instance::{Attrs, Instance, InstanceId, InstanceInner};
use crate::lifecycle::Hook;
use crate::template::{BlockKey, Builder, Invocation, Template, VNode};
use crate::value::Value;

pub type HookObserver = Rc<dyn Fn(&Instance, Hook)>;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RenderStats {
    pub transactions: u64,
    pub aborted: u64,
    pub flushes: u64,
    pub hooks_fired: u64,
    pub instances_created: u64,
    pub instances_destroyed: u64,
    pub dom_mutations: u64,
    pub deferred: u64,
}

/// What a template produced last time, with the DOM nodes it maps to.
#[derive(Clone)]
pub(crate) enum Mounted {
    Element {
        node: NodeId,
        tag: String,
        attrs: Vec<(String, String)>,
        children: Vec<Mounted>,
    },
    Text {
        node: NodeId,
        text: String,
    },
    Component(Instance),
    /// `end` is an empty comment closing the block's range.
    Block {
        key: BlockKey,
        end: NodeId,
        children: Vec<Mounted>,
    },
}

impl Mounted {
    pub(crate) fn text_content(&self, doc: &Document) -> String {
        match self {
            Mounted::Element { node, .. } | Mounted::Text { node, .. } => doc.text_content(*node),
            Mounted::Component(instance) => match instance.0.element.get() {
                Some(el) => doc.text_content(el),
                None => instance
                    .0
                    .mounted
                    .borrow()
                    .iter()
                    .map(|m| m.text_content(doc))
                    .collect(),
            },
            Mounted::Block { children, .. } => children.iter().map(|m| m.text_content(doc)).collect(),
        }
    }

    fn first_node(&self) -> Option<NodeId> {
        match self {
            Mounted::Element { node, .. } | Mounted::Text { node, .. } => Some(*node),
            Mounted::Component(instance) => instance.0.element.get().or_else(|| {
                instance
                    .0
                    .mounted
                    .borrow()
                    .iter()
                    .find_map(Mounted::first_node)
                    .or(instance.0.anchor.get())
            }),
            Mounted::Block { end, children, .. } => {
                children.iter().find_map(Mounted::first_node).or(Some(*end))
            }
        }
    }

    /// Nodes that have to be detached to remove this item.
    fn top_nodes(&self, out: &mut Vec<NodeId>) {
        match self {
            Mounted::Element { node, .. } | Mounted::Text { node, .. } => out.push(*node),
            Mounted::Component(instance) => match instance.0.element.get() {
                Some(el) => out.push(el),
                None => {
                    for m in instance.0.mounted.borrow().iter() {
                        m.top_nodes(out);
                    }
                    out.extend(instance.0.anchor.get());
                }
            },
            Mounted::Block { end, children, .. } => {
                for m in children {
                    m.top_nodes(out);
                }
                out.push(*end);
            }
        }
    }

    fn accepts(&self, node: &VNode) -> bool {
        match (self, node) {
            (Mounted::Element { tag: a, .. }, VNode::Element { tag: b, .. }) => a == b,
            (Mounted::Text { .. }, VNode::Text(_)) => true,
            (Mounted::Component(instance), VNode::Component { definition, .. }) => {
                Rc::ptr_eq(instance.definition(), definition) && !instance.is_destroying()
            }
            (Mounted::Block { key: a, .. }, VNode::Block { key: b, .. }) => a == b,
            _ => false,
        }
    }
}

/// Components directly inside `list`, not descending into them.
pub(crate) fn collect_components(list: &[Mounted], out: &mut Vec<Instance>) {
    for m in list {
        match m {
            Mounted::Component(instance) => out.push(instance.clone()),
            Mounted::Element { children, .. } | Mounted::Block { children, .. } => {
                collect_components(children, out)
            }
            Mounted::Text { .. } => {}
        }
    }
}

/// Every component under `list`, parents before children.
fn collect_tree(list: &[Mounted], out: &mut Vec<Instance>) {
    for m in list {
        match m {
            Mounted::Component(instance) => {
                out.push(instance.clone());
                collect_tree(&instance.0.mounted.borrow(), out);
            }
            Mounted::Element { children, .. } | Mounted::Block { children, .. } => {
                collect_tree(children, out)
            }
            Mounted::Text { .. } => {}
        }
    }
}

fn replace_component(list: &mut [Mounted], target: &Instance, with: &mut Option<Mounted>) -> bool {
    for m in list.iter_mut() {
        if matches!(m, Mounted::Component(instance) if instance.ptr_eq(target)) {
            if let Some(placeholder) = with.take() {
                *m = placeholder;
            }
            return true;
        }
        if let Mounted::Element { children, .. } | Mounted::Block { children, .. } = m
            && replace_component(children, target, with)
        {
            return true;
        }
    }
    false
}

/// `a` and `b` are the same instance or one descends from the other.
fn same_line(a: &Instance, b: &Instance) -> bool {
    let descends = |child: &Instance, ancestor: &Instance| {
        let mut cursor = Some(child.clone());
        while let Some(current) = cursor {
            if current.ptr_eq(ancestor) {
                return true;
            }
            cursor = current.parent_view();
        }
        false
    };
    descends(a, b) || descends(b, a)
}

fn note(failure: &mut Option<Error>, result: Result<()>) {
    if let Err(err) = result
        && failure.is_none()
    {
        *failure = Some(err);
    }
}

#[derive(Default)]
struct DirtySet {
    ids: BTreeMap<InstanceId, Weak<InstanceInner>>,
    version: u64,
}

enum Undo {
    Invocation {
        instance: Instance,
        previous: Invocation,
    },
    Render {
        instance: Instance,
        mounted: Vec<Mounted>,
        root_attrs: Vec<(String, String)>,
    },
}

struct Checkpoint {
    document: Document,
    elements: HashMap<NodeId, Weak<InstanceInner>>,
    actions: HashMap<NodeId, Vec<ActionModifier>>,
}

#[derive(Default)]
struct Tx {
    created: Vec<Instance>,
    removals: Vec<Mounted>,
    /// `(instance, inserted)`, children before parents.
    post: Vec<(Instance, bool)>,
    undo: Vec<Undo>,
    path: HashSet<InstanceId>,
    path_version: Option<u64>,
    /// Dirty instances this transaction took off the queue.
    taken: Vec<Instance>,
    /// Innermost instance whose update failed.
    failed: Option<Instance>,
}

pub(crate) struct RendererInner {
    pub(crate) config: RenderConfig,
    pub(crate) container: Rc<Container>,
    pub(crate) document: RefCell<Document>,
    tracker: TransactionTracker,
    dirty: RefCell<DirtySet>,
    roots: RefCell<Vec<Instance>>,
    elements: RefCell<HashMap<NodeId, Weak<InstanceInner>>>,
    element_actions: RefCell<HashMap<NodeId, Vec<ActionModifier>>>,
    root_descriptor: Rc<ComponentDescriptor>,
    next_id: StdCell<InstanceId>,
    hook_observers: RefCell<Vec<(usize, HookObserver)>>,
    next_observer: StdCell<usize>,
    stats: StdCell<RenderStats>,
    owner: Owner,
    destroyed: StdCell<bool>,
    self_weak: Weak<RendererInner>,
}

/// Turns templates into DOM and keeps it up to date.
///
/// Writes to cells only mark instances dirty; nothing re-renders until
/// [`flush`](Renderer::flush), [`settle`](Renderer::settle) or the end of
/// the outermost [`batch`](Renderer::batch).
#[derive(Clone)]
pub struct Renderer {
    inner: Rc<RendererInner>,
}

impl Renderer {
    pub fn new(config: RenderConfig, container: Rc<Container>) -> Self {
        let inner = Rc::new_cyclic(|weak| RendererInner {
            config,
            container,
            document: RefCell::new(Document::new()),
            tracker: TransactionTracker::new(),
            dirty: RefCell::new(DirtySet::default()),
            roots: RefCell::new(Vec::new()),
            elements: RefCell::new(HashMap::new()),
            element_actions: RefCell::new(HashMap::new()),
            root_descriptor: Rc::new(ComponentDescriptor::template_only("-top-level")),
            next_id: StdCell::new(0),
            hook_observers: RefCell::new(Vec::new()),
            next_observer: StdCell::new(0),
            stats: StdCell::new(RenderStats::default()),
            owner: Owner::new("renderer"),
            destroyed: StdCell::new(false),
            self_weak: weak.clone(),
        });
        Self { inner }
    }

    pub fn config(&self) -> &RenderConfig {
        &self.inner.config
    }

    pub fn container(&self) -> &Rc<Container> {
        &self.inner.container
    }

    pub fn with_document<R>(&self, f: impl FnOnce(&Document) -> R) -> R {
        f(&self.inner.document.borrow())
    }

    pub fn body(&self) -> NodeId {
        self.inner.document.borrow().body()
    }

    /// Serialized content of the body.
    pub fn html(&self) -> String {
        let doc = self.inner.document.borrow();
        doc.inner_html(doc.body())
    }

    /// Renders `template` at the end of `parent` with `context` as `this`.
    pub fn render(
        &self,
        template: &Template,
        context: impl Into<Value>,
        parent: NodeId,
    ) -> Result<Instance> {
        self.inner.render(template, context.into(), parent)
    }

    /// Marks `instance` for re-rendering. Idempotent until the next flush.
    pub fn schedule_update(&self, instance: &Instance) -> Result<()> {
        self.inner.schedule_update(instance)
    }

    /// Runs one transaction over the dirty instances. `Ok(false)` when there
    /// was nothing to do.
    pub fn flush(&self) -> Result<bool> {
        self.inner.flush()
    }

    /// Flushes until nothing is dirty.
    pub fn settle(&self) -> Result<()> {
        self.inner.settle()
    }

    /// Runs `f`; the outermost batch settles when `f` returns.
    pub fn batch<R>(&self, f: impl FnOnce() -> Result<R>) -> Result<R> {
        self.inner.batch(f)
    }

    pub fn in_transaction(&self) -> bool {
        self.inner.tracker.in_transaction()
    }

    pub fn transaction(&self) -> RenderTransaction {
        self.inner.tracker.current()
    }

    pub fn has_pending(&self) -> bool {
        self.inner.prune_dirty();
        !self.inner.dirty.borrow().ids.is_empty()
    }

    pub fn stats(&self) -> RenderStats {
        let tx = self.inner.tracker.stats();
        RenderStats {
            transactions: tx.committed,
            aborted: tx.aborted,
            dom_mutations: self.inner.document.borrow().mutation_count(),
            ..self.inner.stats.get()
        }
    }

    /// Calls `f` for every hook that fires, before the hook runs.
    pub fn add_hook_observer(&self, f: impl Fn(&Instance, Hook) + 'static) -> usize {
        let id = self.inner.next_observer.get() + 1;
        self.inner.next_observer.set(id);
        self.inner.hook_observers.borrow_mut().push((id, Rc::new(f)));
        id
    }

    pub fn remove_hook_observer(&self, id: usize) {
        self.inner
            .hook_observers
            .borrow_mut()
            .retain(|(observer, _)| *observer != id);
    }

    pub fn roots(&self) -> Vec<Instance> {
        self.inner.roots.borrow().clone()
    }

    /// The live component whose root element is `node`.
    pub fn instance_for_element(&self, node: NodeId) -> Option<Instance> {
        self.inner
            .elements
            .borrow()
            .get(&node)
            .and_then(Weak::upgrade)
            .map(Instance)
            .filter(|i| !i.is_destroying())
    }

    pub(crate) fn actions_for(&self, node: NodeId) -> Vec<ActionModifier> {
        self.inner
            .element_actions
            .borrow()
            .get(&node)
            .cloned()
            .unwrap_or_default()
    }

    /// Destroys every root with the teardown hooks. Later renders fail.
    pub fn teardown(&self) -> Result<()> {
        self.inner.teardown()
    }

    pub fn is_destroyed(&self) -> bool {
        self.inner.destroyed.get()
    }
}

impl RendererInner {
    fn check_live(&self, operation: &str) -> Result<()> {
        if self.destroyed.get() {
            return Err(Error::destroyed("renderer", operation));
        }
        Ok(())
    }

    fn bump(&self, f: impl FnOnce(&mut RenderStats)) {
        let mut stats = self.stats.get();
        f(&mut stats);
        self.stats.set(stats);
    }

    fn render(&self, template: &Template, context: Value, parent: NodeId) -> Result<Instance> {
        self.check_live("render")?;
        let definition = self
            .container
            .cache()
            .resolve_component(&self.root_descriptor, Some(template))?;
        let guard = self.tracker.begin()?;
        let checkpoint = self.checkpoint();
        let mut tx = Tx::default();
        let created = self.create_instance(
            &definition,
            Invocation::default(),
            None,
            Some(context),
            parent,
            None,
            &mut tx,
        );
        let root = match created {
            Ok(root) => root,
            Err(err) => {
                log::warn!("initial render of `{}` failed: {err}", template.name());
                self.rollback(checkpoint, tx);
                return Err(err);
            }
        };
        if let Err(err) = self.commit(&mut tx) {
            log::warn!("initial render of `{}` failed: {err}", template.name());
            self.rollback(checkpoint, tx);
            return Err(err);
        }
        self.roots.borrow_mut().push(root.clone());
        guard.commit();
        Ok(root)
    }

    pub(crate) fn schedule_update(&self, instance: &Instance) -> Result<()> {
        if instance.is_destroying() {
            return Err(Error::destroyed(instance.describe(), "rerender"));
        }
        self.mark_dirty(instance);
        Ok(())
    }

    fn mark_dirty(&self, instance: &Instance) {
        if instance.is_destroying() {
            return;
        }
        let mut dirty = self.dirty.borrow_mut();
        if dirty.ids.insert(instance.id(), instance.downgrade()).is_none() {
            dirty.version += 1;
            log::trace!("{} scheduled", instance.describe());
        }
    }

    fn take_dirty(&self, instance: &Instance, tx: &mut Tx) -> bool {
        let taken = self.dirty.borrow_mut().ids.remove(&instance.id()).is_some();
        if taken {
            tx.taken.push(instance.clone());
        }
        taken
    }

    fn prune_dirty(&self) {
        self.dirty
            .borrow_mut()
            .ids
            .retain(|_, w| w.upgrade().is_some_and(|i| !i.state.get().is_tearing_down()));
    }

    /// True when `instance` or one of its descendants is dirty.
    fn on_dirty_path(&self, instance: &Instance, tx: &mut Tx) -> bool {
        let version = self.dirty.borrow().version;
        if tx.path_version != Some(version) {
            tx.path.clear();
            let dirty: Vec<Weak<InstanceInner>> = self.dirty.borrow().ids.values().cloned().collect();
            for weak in dirty {
                let mut cursor = weak.upgrade().map(Instance);
                while let Some(current) = cursor {
                    if !tx.path.insert(current.id()) {
                        break;
                    }
                    cursor = current.parent_view();
                }
            }
            tx.path_version = Some(version);
        }
        tx.path.contains(&instance.id())
    }

    fn flush(&self) -> Result<bool> {
        self.check_live("flush")?;
        self.prune_dirty();
        if self.dirty.borrow().ids.is_empty() {
            return Ok(false);
        }
        let guard = self.tracker.begin()?;
        self.bump(|s| s.flushes += 1);
        let checkpoint = self.checkpoint();
        let mut tx = Tx::default();
        let roots = self.roots.borrow().clone();
        let walked = roots
            .iter()
            .try_for_each(|root| self.update_instance(root, None, &mut tx));
        if let Err(err) = walked {
            log::warn!("render transaction #{} failed, update discarded: {err}", guard.id());
            self.rollback(checkpoint, tx);
            return Err(err);
        }
        let committed = self.commit(&mut tx);
        let deferred = self.dirty.borrow().ids.len();
        if deferred > 0 {
            log::warn!("{deferred} component(s) invalidated after they rendered; deferred to the next flush");
            self.bump(|s| s.deferred += deferred as u64);
        }
        committed?;
        guard.commit();
        Ok(true)
    }

    fn settle(&self) -> Result<()> {
        let passes = self.config.max_settle_passes.max(1);
        for _ in 0..passes {
            if !self.flush()? {
                return Ok(());
            }
        }
        self.prune_dirty();
        if self.dirty.borrow().ids.is_empty() {
            return Ok(());
        }
        Err(Error::assertion(format!(
            "rendering did not settle after {passes} passes; something keeps invalidating what it renders"
        )))
    }

    fn batch<R>(&self, f: impl FnOnce() -> Result<R>) -> Result<R> {
        let guard = self.tracker.enter_batch();
        let outermost = guard.is_outermost();
        let result = f();
        drop(guard);
        let value = result?;
        if outermost && !self.destroyed.get() {
            self.settle()?;
        }
        Ok(value)
    }

    fn checkpoint(&self) -> Checkpoint {
        Checkpoint {
            document: self.document.borrow().clone(),
            elements: self.elements.borrow().clone(),
            actions: self.element_actions.borrow().clone(),
        }
    }

    fn rollback(&self, checkpoint: Checkpoint, tx: Tx) {
        *self.document.borrow_mut() = checkpoint.document;
        *self.elements.borrow_mut() = checkpoint.elements;
        *self.element_actions.borrow_mut() = checkpoint.actions;
        for undo in tx.undo.into_iter().rev() {
            match undo {
                Undo::Invocation { instance, previous } => {
                    let attempted = instance.0.attrs.replace(previous.attrs);
                    *instance.0.forwarded.borrow_mut() = previous.forwarded;
                    *instance.0.block.borrow_mut() = previous.block;
                    if *instance.0.attrs.borrow() != attempted
                        && let Err(err) = instance.sync_props(&attempted)
                    {
                        log::warn!("{}: props not restored: {err}", instance.describe());
                    }
                }
                Undo::Render {
                    instance,
                    mounted,
                    root_attrs,
                } => {
                    *instance.0.mounted.borrow_mut() = mounted;
                    *instance.0.root_attrs.borrow_mut() = root_attrs;
                }
            }
        }
        for instance in tx.created.iter().rev() {
            instance.0.state.set(LifecycleState::Destroyed);
            instance.0.owner.dispose();
        }
        // The failed instance's line is discarded. Other work taken by this
        // transaction was rolled back with it and goes back on the queue.
        let discard = |instance: &Instance| match &tx.failed {
            Some(failed) => same_line(failed, instance),
            None => true,
        };
        let mut dirty = self.dirty.borrow_mut();
        dirty.ids.retain(|_, w| w.upgrade().is_some_and(|i| !discard(&Instance(i))));
        let mut requeued = 0;
        for instance in &tx.taken {
            if !discard(instance) && !instance.is_destroying() {
                dirty.ids.insert(instance.id(), instance.downgrade());
                requeued += 1;
            }
        }
        if requeued > 0 {
            log::debug!("{requeued} component(s) re-queued after rollback");
        }
        dirty.version += 1;
    }

    fn instantiate(
        &self,
        definition: &Rc<Definition>,
        invocation: Invocation,
        parent: Option<&Instance>,
        context: Option<Value>,
    ) -> Result<Instance> {
        let id = self.next_id.get() + 1;
        self.next_id.set(id);
        let label = format!("<{}#{id}>", definition.name());
        let owner = match parent {
            Some(p) => p.0.owner.child(label),
            None => self.owner.child(label),
        };
        let renderer = self.self_weak.clone();
        let Invocation {
            attrs,
            forwarded,
            block,
        } = invocation;
        let inner = Rc::new_cyclic(|this: &Weak<InstanceInner>| {
            let (r, w) = (renderer.clone(), this.clone());
            let observer = new_observer(move || {
                if let (Some(r), Some(i)) = (r.upgrade(), w.upgrade()) {
                    r.mark_dirty(&Instance(i));
                }
            });
            let computed: HashMap<String, Derived<Value>> = definition
                .descriptor()
                .map(|d| {
                    d.computed
                        .iter()
                        .map(|(name, f)| {
                            let (w, f) = (this.clone(), f.clone());
                            let derived = Derived::new(move || match w.upgrade() {
                                Some(i) => f(&Instance(i)),
                                None => Value::Undefined,
                            });
                            (name.clone(), derived)
                        })
                        .collect()
                })
                .unwrap_or_default();
            let w = this.clone();
            owner.add_disposer(move || {
                remove_observer(observer);
                if let Some(i) = w.upgrade() {
                    for cell in i.props.borrow().values() {
                        cell.retire();
                    }
                }
            });
            InstanceInner {
                id,
                definition: definition.clone(),
                renderer,
                parent: parent.map(Instance::downgrade),
                context,
                attrs: RefCell::new(attrs),
                forwarded: RefCell::new(forwarded),
                block: RefCell::new(block),
                props: RefCell::new(HashMap::new()),
                computed,
                state: StdCell::new(LifecycleState::PreRender),
                element: StdCell::new(None),
                anchor: StdCell::new(None),
                root_attrs: RefCell::new(Vec::new()),
                mounted: RefCell::new(Vec::new()),
                target: RefCell::new(None),
                hooks: definition.hooks(),
                observer,
                owner,
            }
        });
        let instance = Instance(inner);
        if let Some(descriptor) = definition.descriptor() {
            for (key, value) in &descriptor.defaults {
                if let Some(cell) = instance.prop_cell(key) {
                    cell.set(value.clone())?;
                }
            }
        }
        instance.sync_props(&Attrs::default())?;
        Ok(instance)
    }

    #[allow(clippy::too_many_arguments)]
    fn create_instance(
        &self,
        definition: &Rc<Definition>,
        invocation: Invocation,
        parent: Option<&Instance>,
        context: Option<Value>,
        dom_parent: NodeId,
        before: Option<NodeId>,
        tx: &mut Tx,
    ) -> Result<Instance> {
        if definition.is_tagless() && definition.capabilities().contains(Capabilities::EVENTS) {
            return Err(Error::assertion(format!(
                "`{}` handles DOM events but has no element; give it a tag",
                definition.name()
            )));
        }
        let instance = self.instantiate(definition, invocation, parent, context)?;
        tx.created.push(instance.clone());
        self.bump(|s| s.instances_created += 1);

        self.fire(&instance, Hook::Init)?;
        self.fire(&instance, Hook::DidReceiveAttrs)?;
        self.fire(&instance, Hook::WillRender)?;

        let tag = definition.descriptor().and_then(|d| d.tag_name());
        let element = match tag {
            Some(tag) => {
                let el = self.document.borrow_mut().create_element(tag);
                instance.0.element.set(Some(el));
                self.elements.borrow_mut().insert(el, instance.downgrade());
                Some(el)
            }
            None => {
                let mut doc = self.document.borrow_mut();
                let anchor = doc.create_comment("");
                doc.insert_before(dom_parent, anchor, before)?;
                instance.0.anchor.set(Some(anchor));
                None
            }
        };
        instance.transition(LifecycleState::HasElement)?;
        self.fire(&instance, Hook::WillInsertElement)?;

        self.render_instance(&instance, tx)?;
        if let Some(el) = element {
            self.document.borrow_mut().insert_before(dom_parent, el, before)?;
        }
        tx.post.push((instance.clone(), true));
        Ok(instance)
    }

    /// Brings an existing instance up to date. `invocation` is `Some` when
    /// the parent re-rendered and invoked it again.
    fn update_instance(
        &self,
        instance: &Instance,
        invocation: Option<Invocation>,
        tx: &mut Tx,
    ) -> Result<()> {
        let result = self.apply_update(instance, invocation, tx);
        if result.is_err() && tx.failed.is_none() {
            tx.failed = Some(instance.clone());
        }
        result
    }

    fn apply_update(
        &self,
        instance: &Instance,
        invocation: Option<Invocation>,
        tx: &mut Tx,
    ) -> Result<()> {
        if instance.is_destroying() {
            return Ok(());
        }
        let mut attrs_changed = false;
        let mut inputs_changed = false;
        let mut reyield = false;
        if let Some(invocation) = invocation {
            let previous = Invocation {
                attrs: instance.0.attrs.replace(invocation.attrs),
                forwarded: instance.0.forwarded.replace(invocation.forwarded),
                block: instance.0.block.replace(invocation.block),
            };
            attrs_changed = *instance.0.attrs.borrow() != previous.attrs;
            let forwarded_changed = *instance.0.forwarded.borrow() != previous.forwarded;
            inputs_changed = attrs_changed || forwarded_changed;
            reyield = instance.has_block();
            let previous_attrs = previous.attrs.clone();
            tx.undo.push(Undo::Invocation {
                instance: instance.clone(),
                previous,
            });
            if attrs_changed {
                instance.sync_props(&previous_attrs)?;
            }
        }
        let on_path = self.on_dirty_path(instance, tx);
        if !inputs_changed && !on_path {
            // The caller's block may read state that changed; that belongs
            // to the caller, so no hooks fire here.
            if reyield {
                log::trace!("{} re-yields its block", instance.describe());
                self.render_instance(instance, tx)?;
            }
            return Ok(());
        }

        if attrs_changed {
            self.fire(instance, Hook::DidUpdateAttrs)?;
            self.fire(instance, Hook::DidReceiveAttrs)?;
        }
        self.fire(instance, Hook::WillUpdate)?;
        self.fire(instance, Hook::WillRender)?;

        let dirty = self.take_dirty(instance, tx);
        if dirty || inputs_changed || reyield {
            self.render_instance(instance, tx)?;
        } else {
            for child in instance.child_views() {
                self.update_instance(&child, None, tx)?;
            }
        }
        tx.post.push((instance.clone(), false));
        Ok(())
    }

    fn evaluate(&self, instance: &Instance) -> Result<(Vec<(String, String)>, Vec<VNode>)> {
        track(instance.0.observer, || -> Result<(Vec<(String, String)>, Vec<VNode>)> {
            let definition = instance.definition();
            let root_attrs = if definition.is_tagless() {
                Vec::new()
            } else {
                definition.bindings().root_attributes(instance, &self.config)
            };
            let mut b = Builder::new(self, instance.clone());
            match definition.template() {
                Some(template) => template.render(&mut b)?,
                None => b.yield_block(Vec::new())?,
            }
            Ok((root_attrs, b.finish()))
        })
    }

    fn render_instance(&self, instance: &Instance, tx: &mut Tx) -> Result<()> {
        let (root_attrs, nodes) = self.evaluate(instance)?;
        tx.undo.push(Undo::Render {
            instance: instance.clone(),
            mounted: instance.0.mounted.borrow().clone(),
            root_attrs: instance.0.root_attrs.borrow().clone(),
        });
        let (parent, end) = match instance.0.element.get() {
            Some(el) => {
                let previous = instance.0.root_attrs.replace(root_attrs.clone());
                self.patch_attributes(el, &previous, &root_attrs)?;
                (el, None)
            }
            None => {
                let anchor = instance.0.anchor.get().ok_or_else(|| {
                    Error::assertion(format!("{} has neither an element nor an anchor", instance.describe()))
                })?;
                let parent = self.document.borrow().parent(anchor).ok_or_else(|| {
                    Error::assertion(format!("{} is not attached", instance.describe()))
                })?;
                (parent, Some(anchor))
            }
        };
        let old = std::mem::take(&mut *instance.0.mounted.borrow_mut());
        let mounted = self.reconcile(instance, parent, end, old, nodes, tx)?;
        *instance.0.mounted.borrow_mut() = mounted;
        Ok(())
    }

    /// Matches new nodes against the old ones by position. Compatible pairs
    /// are patched, anything else is created fresh and the old item is
    /// queued for removal at commit.
    fn reconcile(
        &self,
        scope: &Instance,
        parent: NodeId,
        end: Option<NodeId>,
        old: Vec<Mounted>,
        new: Vec<VNode>,
        tx: &mut Tx,
    ) -> Result<Vec<Mounted>> {
        let mut old: Vec<Option<Mounted>> = old.into_iter().map(Some).collect();
        let mut out = Vec::with_capacity(new.len());
        for (i, node) in new.into_iter().enumerate() {
            let next = old
                .get(i + 1..)
                .unwrap_or(&[])
                .iter()
                .flatten()
                .find_map(Mounted::first_node)
                .or(end);
            let mounted = match old.get_mut(i).and_then(Option::take) {
                Some(prev) if prev.accepts(&node) => self.patch(scope, prev, node, parent, tx)?,
                Some(prev) => {
                    let before = prev.first_node().or(next);
                    let created = self.create(scope, node, parent, before, tx)?;
                    tx.removals.push(prev);
                    created
                }
                None => self.create(scope, node, parent, next, tx)?,
            };
            out.push(mounted);
        }
        tx.removals.extend(old.into_iter().flatten());
        Ok(out)
    }

    fn create(
        &self,
        scope: &Instance,
        node: VNode,
        parent: NodeId,
        before: Option<NodeId>,
        tx: &mut Tx,
    ) -> Result<Mounted> {
        match node {
            VNode::Text(text) => {
                let mut doc = self.document.borrow_mut();
                let node = doc.create_text(text.clone());
                doc.insert_before(parent, node, before)?;
                Ok(Mounted::Text { node, text })
            }
            VNode::Element {
                tag,
                attrs,
                actions,
                children,
            } => {
                let el = self.document.borrow_mut().create_element(tag.clone());
                self.patch_attributes(el, &[], &attrs)?;
                self.register_actions(el, actions);
                let children = self.reconcile(scope, el, None, Vec::new(), children, tx)?;
                self.document.borrow_mut().insert_before(parent, el, before)?;
                Ok(Mounted::Element {
                    node: el,
                    tag,
                    attrs,
                    children,
                })
            }
            VNode::Block { key, children } => {
                let end = {
                    let mut doc = self.document.borrow_mut();
                    let end = doc.create_comment("");
                    doc.insert_before(parent, end, before)?;
                    end
                };
                let children = self.reconcile(scope, parent, Some(end), Vec::new(), children, tx)?;
                Ok(Mounted::Block { key, end, children })
            }
            VNode::Component {
                definition,
                invocation,
            } => {
                let instance =
                    self.create_instance(&definition, invocation, Some(scope), None, parent, before, tx)?;
                Ok(Mounted::Component(instance))
            }
        }
    }

    fn patch(
        &self,
        scope: &Instance,
        prev: Mounted,
        node: VNode,
        parent: NodeId,
        tx: &mut Tx,
    ) -> Result<Mounted> {
        Ok(match (prev, node) {
            (
                Mounted::Element {
                    node: el,
                    tag,
                    attrs: old_attrs,
                    children: old_children,
                },
                VNode::Element {
                    attrs,
                    actions,
                    children,
                    ..
                },
            ) => {
                self.patch_attributes(el, &old_attrs, &attrs)?;
                self.register_actions(el, actions);
                let children = self.reconcile(scope, el, None, old_children, children, tx)?;
                Mounted::Element {
                    node: el,
                    tag,
                    attrs,
                    children,
                }
            }
            (Mounted::Text { node, text }, VNode::Text(next)) => {
                if text != next {
                    self.document.borrow_mut().set_text(node, &next)?;
                }
                Mounted::Text { node, text: next }
            }
            (Mounted::Component(instance), VNode::Component { invocation, .. }) => {
                self.update_instance(&instance, Some(invocation), tx)?;
                Mounted::Component(instance)
            }
            (
                Mounted::Block {
                    key,
                    end,
                    children: old_children,
                },
                VNode::Block { children, .. },
            ) => {
                let children = self.reconcile(scope, parent, Some(end), old_children, children, tx)?;
                Mounted::Block { key, end, children }
            }
            _ => return Err(Error::assertion("patched a node with an incompatible one")),
        })
    }

    fn patch_attributes(
        &self,
        node: NodeId,
        old: &[(String, String)],
        new: &[(String, String)],
    ) -> Result<()> {
        let mut doc = self.document.borrow_mut();
        for (name, value) in new {
            let previous = old.iter().find(|(n, _)| n == name).map(|(_, v)| v);
            if previous != Some(value) {
                doc.set_attribute(node, name, value)?;
            }
        }
        for (name, _) in old {
            if !new.iter().any(|(n, _)| n == name) {
                doc.remove_attribute(node, name)?;
            }
        }
        Ok(())
    }

    fn register_actions(&self, node: NodeId, actions: Vec<ActionModifier>) {
        let mut registry = self.element_actions.borrow_mut();
        if actions.is_empty() {
            registry.remove(&node);
        } else {
            registry.insert(node, actions);
        }
    }

    fn fire(&self, instance: &Instance, hook: Hook) -> Result<()> {
        if !instance.hooks().contains(hook.flag()) || instance.is_destroyed() {
            return Ok(());
        }
        if !self.config.interactive && !hook.fires_non_interactive() {
            return Ok(());
        }
        log::trace!("{} {hook}", instance.describe());
        self.bump(|s| s.hooks_fired += 1);
        let observers: Vec<HookObserver> = self
            .hook_observers
            .borrow()
            .iter()
            .map(|(_, f)| f.clone())
            .collect();
        for observer in observers {
            observer(instance, hook);
        }
        match instance.descriptor().and_then(|d| d.hook_fn(hook)) {
            Some(f) => untracked(|| f(instance)),
            None => Ok(()),
        }
    }

    /// Second pass. Errors from hooks are collected; the first one is
    /// returned once everything has run.
    fn commit(&self, tx: &mut Tx) -> Result<()> {
        let mut failure = None;

        let removals = std::mem::take(&mut tx.removals);
        let mut doomed = Vec::new();
        collect_tree(&removals, &mut doomed);
        for instance in &doomed {
            note(&mut failure, self.fire(instance, Hook::WillDestroyElement));
            note(&mut failure, self.fire(instance, Hook::WillClearRender));
            note(&mut failure, instance.transition(LifecycleState::Destroying));
        }
        {
            let mut doc = self.document.borrow_mut();
            for item in &removals {
                let mut nodes = Vec::new();
                item.top_nodes(&mut nodes);
                for node in nodes {
                    if doc.contains(node) {
                        note(&mut failure, doc.remove(node));
                    }
                }
            }
        }
        self.prune_elements();

        for (instance, inserted) in std::mem::take(&mut tx.post) {
            if instance.is_destroying() {
                continue;
            }
            if inserted {
                note(&mut failure, instance.transition(LifecycleState::InDom));
            }
            if failure.is_some() {
                continue;
            }
            let result = if inserted {
                self.fire(&instance, Hook::DidInsertElement)
                    .and_then(|_| self.fire(&instance, Hook::DidRender))
            } else {
                self.fire(&instance, Hook::DidUpdate)
                    .and_then(|_| self.fire(&instance, Hook::DidRender))
            };
            note(&mut failure, result);
        }

        for instance in doomed.iter().rev() {
            note(&mut failure, self.fire(instance, Hook::DidDestroyElement));
        }
        for instance in &doomed {
            note(&mut failure, self.fire(instance, Hook::WillDestroy));
        }
        for instance in doomed.iter().rev() {
            self.finalize(instance);
        }
        failure.map_or(Ok(()), Err)
    }

    fn finalize(&self, instance: &Instance) {
        instance.0.state.set(LifecycleState::Destroyed);
        if let Some(el) = instance.0.element.get() {
            self.elements.borrow_mut().remove(&el);
            self.element_actions.borrow_mut().remove(&el);
        }
        self.dirty.borrow_mut().ids.remove(&instance.id());
        instance.0.owner.dispose();
        self.bump(|s| s.instances_destroyed += 1);
        log::trace!("{} destroyed", instance.describe());
    }

    fn prune_elements(&self) {
        let doc = self.document.borrow();
        self.elements.borrow_mut().retain(|node, _| doc.contains(*node));
        self.element_actions
            .borrow_mut()
            .retain(|node, _| doc.contains(*node));
    }

    pub(crate) fn destroy_instance(&self, instance: &Instance) -> Result<()> {
        if instance.is_destroying() {
            return Ok(());
        }
        if self.tracker.in_transaction() {
            return Err(Error::assertion(format!(
                "cannot destroy {} while a render transaction is open",
                instance.describe()
            )));
        }
        let guard = self.tracker.begin()?;
        let mut tx = Tx::default();
        match instance.parent_view() {
            Some(parent) => {
                let first = Mounted::Component(instance.clone()).first_node();
                let end = {
                    let mut doc = self.document.borrow_mut();
                    let end = doc.create_comment("");
                    if let Some(first) = first
                        && let Some(dom_parent) = doc.parent(first)
                    {
                        doc.insert_before(dom_parent, end, Some(first))?;
                    }
                    end
                };
                let mut placeholder = Some(Mounted::Block {
                    key: BlockKey::Empty,
                    end,
                    children: Vec::new(),
                });
                replace_component(&mut parent.0.mounted.borrow_mut(), instance, &mut placeholder);
            }
            None => self.roots.borrow_mut().retain(|r| !r.ptr_eq(instance)),
        }
        tx.removals.push(Mounted::Component(instance.clone()));
        let result = self.commit(&mut tx);
        if result.is_ok() {
            guard.commit();
        }
        result
    }

    fn teardown(&self) -> Result<()> {
        if self.destroyed.get() {
            return Ok(());
        }
        let guard = self.tracker.begin()?;
        self.destroyed.set(true);
        let mut tx = Tx::default();
        tx.removals = self
            .roots
            .take()
            .into_iter()
            .map(Mounted::Component)
            .collect();
        let result = self.commit(&mut tx);
        if result.is_ok() {
            guard.commit();
        }
        self.dirty.borrow_mut().ids.clear();
        self.owner.dispose();
        log::debug!("renderer torn down");
        result
    }
}
