use std::cell::{Cell as StdCell, RefCell};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::rc::{Rc, Weak};

use glint_core::{
    Cell, Derived, Document, Error, LifecycleState, NodeId, ObserverId, Owner, Result,
};
use smallvec::SmallVec;

use crate::actions::ActionTarget;
use crate::component::ComponentDescriptor;
use crate::definition::Definition;
use crate::lifecycle::HookSet;
use crate::renderer::{Mounted, RendererInner, collect_components};
use crate::template::Block;
use crate::value::{MutBinding, Value};

pub type InstanceId = u64;

/// Arguments a component was invoked with.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Attrs {
    pub positional: SmallVec<[Value; 2]>,
    pub named: BTreeMap<String, Value>,
}

impl Attrs {
    /// Named arg, with `mut` bindings resolved.
    pub fn get(&self, name: &str) -> Value {
        self.named
            .get(name)
            .map(|v| v.resolved().clone())
            .unwrap_or_default()
    }

    pub fn raw(&self, name: &str) -> Option<&Value> {
        self.named.get(name)
    }

    pub fn positional(&self, index: usize) -> Value {
        self.positional
            .get(index)
            .map(|v| v.resolved().clone())
            .unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.positional.is_empty() && self.named.is_empty()
    }
}

/// A live component.
///
/// Cheap to clone; all clones are the same instance. Properties live in
/// cells: named args are copied into them whenever the args change, and
/// [`Instance::set`] writes them (and, for `mut` args, the caller's cell).
#[derive(Clone)]
pub struct Instance(pub(crate) Rc<InstanceInner>);

pub(crate) struct InstanceInner {
    pub(crate) id: InstanceId,
    pub(crate) definition: Rc<Definition>,
    pub(crate) renderer: Weak<RendererInner>,
    pub(crate) parent: Option<Weak<InstanceInner>>,
    pub(crate) context: Option<Value>,
    pub(crate) attrs: RefCell<Attrs>,
    pub(crate) forwarded: RefCell<Vec<(String, String)>>,
    pub(crate) block: RefCell<Option<Block>>,
    pub(crate) props: RefCell<HashMap<String, Cell<Value>>>,
    pub(crate) computed: HashMap<String, Derived<Value>>,
    pub(crate) state: StdCell<LifecycleState>,
    pub(crate) element: StdCell<Option<NodeId>>,
    pub(crate) anchor: StdCell<Option<NodeId>>,
    pub(crate) root_attrs: RefCell<Vec<(String, String)>>,
    pub(crate) mounted: RefCell<Vec<Mounted>>,
    pub(crate) target: RefCell<Option<Rc<dyn ActionTarget>>>,
    pub(crate) hooks: HookSet,
    pub(crate) observer: ObserverId,
    pub(crate) owner: Owner,
}

impl Instance {
    pub fn id(&self) -> InstanceId {
        self.0.id
    }

    pub fn name(&self) -> &str {
        self.0.definition.name()
    }

    pub fn definition(&self) -> &Rc<Definition> {
        &self.0.definition
    }

    pub(crate) fn descriptor(&self) -> Option<&Rc<ComponentDescriptor>> {
        self.0.definition.descriptor()
    }

    /// `<x-foo#3>`
    pub fn describe(&self) -> String {
        format!("<{}#{}>", self.name(), self.0.id)
    }

    pub fn state(&self) -> LifecycleState {
        self.0.state.get()
    }

    pub fn is_destroying(&self) -> bool {
        self.state().is_tearing_down()
    }

    pub fn is_destroyed(&self) -> bool {
        self.state() == LifecycleState::Destroyed
    }

    pub fn hooks(&self) -> HookSet {
        self.0.hooks
    }

    pub fn attrs(&self) -> Attrs {
        self.0.attrs.borrow().clone()
    }

    pub fn attr(&self, name: &str) -> Value {
        self.0.attrs.borrow().get(name)
    }

    /// Attributes the invocation site passed for `...attributes`.
    pub fn forwarded_attributes(&self) -> Vec<(String, String)> {
        self.0.forwarded.borrow().clone()
    }

    pub fn has_block(&self) -> bool {
        self.0.block.borrow().is_some()
    }

    pub(crate) fn block(&self) -> Option<Block> {
        self.0.block.borrow().clone()
    }

    /// Tracked property read. Supports dotted paths and `attrs.name`.
    pub fn get(&self, path: &str) -> Value {
        let (head, rest) = path.split_once('.').unwrap_or((path, ""));
        if head == "attrs" {
            let (name, rest) = rest.split_once('.').unwrap_or((rest, ""));
            return self.attr(name).get_path(rest);
        }
        let base = match &self.0.context {
            Some(context) => context.get(head),
            None => match self.0.computed.get(head) {
                Some(derived) => derived.get(),
                None => match self.prop_cell(head) {
                    Some(cell) => cell.get(),
                    None => Value::Undefined,
                },
            },
        };
        base.get_path(rest)
    }

    /// Writes property `key`. When the component received `key` through a
    /// `mut` binding the caller's cell is written as well.
    pub fn set(&self, key: &str, value: impl Into<Value>) -> Result<()> {
        if self.is_destroyed() {
            return Err(Error::StaleWrite {
                target: format!("`{key}` on {}", self.describe()),
            });
        }
        if self.0.context.is_some() {
            return Err(Error::assertion(format!(
                "cannot set `{key}` on the root; write to its context object instead"
            )));
        }
        if self.0.computed.contains_key(key) {
            return Err(Error::assertion(format!(
                "`{key}` on {} is computed and cannot be set",
                self.describe()
            )));
        }
        let value = value.into();
        let upstream = match self.0.attrs.borrow().raw(key) {
            Some(Value::Mut(m)) => Some(m.clone()),
            _ => None,
        };
        if let Some(binding) = upstream {
            binding.update(value.clone())?;
        }
        match self.prop_cell(key) {
            Some(cell) => cell.set(value),
            None => Err(Error::StaleWrite {
                target: format!("`{key}` on {}", self.describe()),
            }),
        }
    }

    /// Cell backing property `key`, created on first use. `None` once the
    /// instance is destroyed and the key was never used.
    pub fn prop_cell(&self, key: &str) -> Option<Cell<Value>> {
        if let Some(c) = self.0.props.borrow().get(key) {
            return Some(c.clone());
        }
        if self.is_destroyed() {
            return None;
        }
        let c = Cell::new(Value::Undefined);
        self.0.props.borrow_mut().insert(key.to_string(), c.clone());
        Some(c)
    }

    /// `(mut this.key)`: a two-way binding to `key`. A `mut` arg is passed
    /// through so writes reach the original cell.
    pub fn binding(&self, key: &str) -> Result<Value> {
        if let Some(context) = &self.0.context {
            return match context.resolved() {
                Value::Object(o) => o
                    .binding_cell(key)
                    .map(|c| Value::mutable(&c))
                    .ok_or_else(|| Error::assertion(format!("`{key}` cannot be bound with mut"))),
                _ => Err(Error::assertion(format!("`{key}` cannot be bound with mut"))),
            };
        }
        if let Some(Value::Mut(m)) = self.0.attrs.borrow().raw(key) {
            return Ok(Value::Mut(m.refresh()));
        }
        let cell = self.prop_cell(key).ok_or_else(|| {
            Error::destroyed(self.describe(), format!("bind `{key}`"))
        })?;
        Ok(Value::Mut(MutBinding::new(cell)))
    }

    /// The component's root element.
    ///
    /// Only available while the instance owns one: after the first render
    /// started and before teardown, never for tagless components, never in
    /// non-interactive mode.
    pub fn element(&self) -> Result<NodeId> {
        let interactive = self
            .0
            .renderer
            .upgrade()
            .is_some_and(|r| r.config.interactive);
        let state = self.state();
        match self.0.element.get() {
            Some(el) if interactive && state.has_element() => Ok(el),
            _ => Err(Error::IllegalElementAccess {
                component: self.name().to_string(),
                state,
            }),
        }
    }

    pub fn with_document<R>(&self, f: impl FnOnce(&Document) -> R) -> Option<R> {
        let renderer = self.0.renderer.upgrade()?;
        let doc = renderer.document.borrow();
        Some(f(&doc))
    }

    /// Text of the rendered content (element or tagless range).
    pub fn text_content(&self) -> String {
        self.with_document(|doc| match self.0.element.get() {
            Some(el) => doc.text_content(el),
            None => self
                .0
                .mounted
                .borrow()
                .iter()
                .map(|m| m.text_content(doc))
                .collect(),
        })
        .unwrap_or_default()
    }

    pub fn parent_view(&self) -> Option<Instance> {
        self.0
            .parent
            .as_ref()
            .and_then(Weak::upgrade)
            .map(Instance)
    }

    /// Components rendered directly by this one, in document order.
    pub fn child_views(&self) -> Vec<Instance> {
        let mut out = Vec::new();
        collect_components(&self.0.mounted.borrow(), &mut out);
        out
    }

    pub fn set_target(&self, target: Rc<dyn ActionTarget>) {
        *self.0.target.borrow_mut() = Some(target);
    }

    pub fn target(&self) -> Option<Rc<dyn ActionTarget>> {
        self.0.target.borrow().clone()
    }

    /// Schedules a re-render of this instance.
    pub fn rerender(&self) -> Result<()> {
        match self.0.renderer.upgrade() {
            Some(r) => r.schedule_update(self),
            None => Err(Error::destroyed(self.describe(), "rerender")),
        }
    }

    /// Removes the instance (and its subtree) right away, running the
    /// teardown hooks.
    pub fn destroy(&self) -> Result<()> {
        match self.0.renderer.upgrade() {
            Some(r) => r.destroy_instance(self),
            None => Ok(()),
        }
    }

    /// Runs `f` when the instance is destroyed.
    pub fn on_destroy(&self, f: impl FnOnce() + 'static) {
        self.0.owner.add_disposer(f);
    }

    pub fn ptr_eq(&self, other: &Instance) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    pub(crate) fn downgrade(&self) -> Weak<InstanceInner> {
        Rc::downgrade(&self.0)
    }

    pub(crate) fn transition(&self, next: LifecycleState) -> Result<()> {
        let current = self.state();
        if !current.can_transition_to(next) {
            return Err(Error::assertion(format!(
                "{} cannot go from {current} to {next}",
                self.describe()
            )));
        }
        self.0.state.set(next);
        Ok(())
    }

    /// Copies named args into property cells; args that went away become
    /// undefined.
    pub(crate) fn sync_props(&self, previous: &Attrs) -> Result<()> {
        let attrs = self.attrs();
        for (key, value) in &attrs.named {
            if let Some(cell) = self.prop_cell(key) {
                cell.set(value.resolved().clone())?;
            }
        }
        for key in previous.named.keys() {
            if !attrs.named.contains_key(key)
                && let Some(cell) = self.prop_cell(key)
            {
                cell.set(Value::Undefined)?;
            }
        }
        Ok(())
    }
}

impl fmt::Debug for Instance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Instance")
            .field("id", &self.0.id)
            .field("name", &self.name())
            .field("state", &self.state())
            .finish()
    }
}

impl PartialEq for Instance {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}
