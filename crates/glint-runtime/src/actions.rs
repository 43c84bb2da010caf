//! Actions.
//!
//! `send` on an instance looks for a handler in the component's fragments
//! (most specific first), then hands the action to the instance's target.
//! Targets are anything implementing [`ActionTarget`]; instances do, and so
//! does the free-standing [`ActionHandler`].

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::{Rc, Weak};

use glint_core::{Error, Result};

use crate::component::ActionFn;
use crate::instance::{Instance, InstanceInner};
use crate::value::{MutBinding, Value, expect_mut};

pub trait ActionTarget {
    fn send(&self, action: &str, args: &[Value]) -> Result<()>;

    fn describe(&self) -> String;
}

/// What a component action handler sees.
pub struct ActionContext<'a> {
    instance: &'a Instance,
    action: &'a str,
    args: &'a [Value],
    rest: &'a [ActionFn],
}

impl<'a> ActionContext<'a> {
    pub fn instance(&self) -> &Instance {
        self.instance
    }

    pub fn action(&self) -> &str {
        self.action
    }

    pub fn args(&self) -> &[Value] {
        self.args
    }

    pub fn arg(&self, index: usize) -> Value {
        self.args
            .get(index)
            .map(|v| v.resolved().clone())
            .unwrap_or_default()
    }

    /// Runs the next less specific handler for this action with the same
    /// arguments. Without one the action continues to the target.
    pub fn call_super(&self) -> Result<()> {
        self.call_super_with(self.args)
    }

    pub fn call_super_with(&self, args: &[Value]) -> Result<()> {
        match self.rest.split_first() {
            Some((next, rest)) => next(&ActionContext {
                instance: self.instance,
                action: self.action,
                args,
                rest,
            }),
            None => send_to_target(self.instance, self.action, args),
        }
    }
}

impl Instance {
    /// Dispatches `action` to this component.
    pub fn send(&self, action: &str, args: &[Value]) -> Result<()> {
        if self.is_destroying() {
            return Err(Error::destroyed(self.describe(), format!("send `{action}`")));
        }
        let chain = self
            .descriptor()
            .map(|d| d.action_chain(action))
            .unwrap_or_default();
        log::trace!("{} send `{action}` ({} handlers)", self.describe(), chain.len());
        match chain.split_first() {
            Some((first, rest)) => first(&ActionContext {
                instance: self,
                action,
                args,
                rest,
            }),
            None => send_to_target(self, action, args),
        }
    }
}

fn send_to_target(instance: &Instance, action: &str, args: &[Value]) -> Result<()> {
    match instance.target() {
        Some(target) => target.send(action, args),
        None => Err(Error::UnhandledAction {
            action: action.to_string(),
            origin: instance.describe(),
        }),
    }
}

impl ActionTarget for Instance {
    fn send(&self, action: &str, args: &[Value]) -> Result<()> {
        Instance::send(self, action, args)
    }

    fn describe(&self) -> String {
        Instance::describe(self)
    }
}

pub type HandlerFn = Rc<dyn Fn(&[Value]) -> Result<()>>;

/// Plain action map, e.g. a route or controller. Unhandled actions go on
/// to `next` when set.
pub struct ActionHandler {
    name: String,
    handlers: RefCell<HashMap<String, HandlerFn>>,
    next: RefCell<Option<Rc<dyn ActionTarget>>>,
}

impl ActionHandler {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            handlers: RefCell::new(HashMap::new()),
            next: RefCell::new(None),
        }
    }

    pub fn on(self, action: impl Into<String>, f: impl Fn(&[Value]) -> Result<()> + 'static) -> Self {
        self.handlers.borrow_mut().insert(action.into(), Rc::new(f));
        self
    }

    pub fn chain(self, next: Rc<dyn ActionTarget>) -> Self {
        *self.next.borrow_mut() = Some(next);
        self
    }
}

impl ActionTarget for ActionHandler {
    fn send(&self, action: &str, args: &[Value]) -> Result<()> {
        let handler = self.handlers.borrow().get(action).cloned();
        if let Some(f) = handler {
            return f(args);
        }
        let next = self.next.borrow().clone();
        match next {
            Some(next) => next.send(action, args),
            None => Err(Error::UnhandledAction {
                action: action.to_string(),
                origin: self.name.clone(),
            }),
        }
    }

    fn describe(&self) -> String {
        self.name.clone()
    }
}

#[derive(Clone)]
enum ClosureKind {
    Send {
        scope: Weak<InstanceInner>,
        action: String,
    },
    Func(HandlerFn),
    Update(MutBinding),
}

/// An action as a value: can be passed down as an argument and invoked
/// later. Bound arguments come before call arguments.
#[derive(Clone)]
pub struct ClosureAction(Rc<ClosureInner>);

struct ClosureInner {
    kind: ClosureKind,
    bound: Vec<Value>,
}

impl ClosureAction {
    pub fn func(f: impl Fn(&[Value]) -> Result<()> + 'static) -> Self {
        Self::from_kind(ClosureKind::Func(Rc::new(f)))
    }

    /// `(action (mut this.value))`: sets the bound cell to the first argument.
    pub fn update(binding: &Value) -> Result<Self> {
        let m = expect_mut(binding, "an update action")?;
        Ok(Self::from_kind(ClosureKind::Update(m.clone())))
    }

    pub(crate) fn send(scope: Weak<InstanceInner>, action: &str) -> Self {
        Self::from_kind(ClosureKind::Send {
            scope,
            action: action.to_string(),
        })
    }

    fn from_kind(kind: ClosureKind) -> Self {
        Self(Rc::new(ClosureInner {
            kind,
            bound: Vec::new(),
        }))
    }

    pub fn with_args(&self, args: Vec<Value>) -> Self {
        if args.is_empty() {
            return self.clone();
        }
        let mut bound = self.0.bound.clone();
        bound.extend(args);
        Self(Rc::new(ClosureInner {
            kind: self.0.kind.clone(),
            bound,
        }))
    }

    pub fn invoke(&self, args: &[Value]) -> Result<()> {
        let all: Vec<Value> = self.0.bound.iter().chain(args).cloned().collect();
        match &self.0.kind {
            ClosureKind::Send { scope, action } => match scope.upgrade() {
                Some(inner) => Instance(inner).send(action, &all),
                None => Err(Error::destroyed("a released component", format!("send `{action}`"))),
            },
            ClosureKind::Func(f) => f(&all),
            ClosureKind::Update(binding) => {
                let value = all.first().map(|v| v.resolved().clone()).unwrap_or_default();
                binding.update(value)
            }
        }
    }
}

impl fmt::Debug for ClosureAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match &self.0.kind {
            ClosureKind::Send { action, .. } => action.as_str(),
            ClosureKind::Func(_) => "<fn>",
            ClosureKind::Update(_) => "<mut>",
        };
        f.debug_struct("ClosureAction")
            .field("action", &kind)
            .field("bound", &self.0.bound)
            .finish()
    }
}

// Two renders of the same `(action ...)` compare equal, so passing one down
// does not count as an attrs change.
impl PartialEq for ClosureAction {
    fn eq(&self, other: &Self) -> bool {
        if Rc::ptr_eq(&self.0, &other.0) {
            return true;
        }
        let same_kind = match (&self.0.kind, &other.0.kind) {
            (
                ClosureKind::Send { scope: a, action: x },
                ClosureKind::Send { scope: b, action: y },
            ) => a.ptr_eq(b) && x == y,
            (ClosureKind::Func(f), ClosureKind::Func(g)) => {
                std::ptr::addr_eq(Rc::as_ptr(f), Rc::as_ptr(g))
            }
            (ClosureKind::Update(a), ClosureKind::Update(b)) => a == b,
            _ => false,
        };
        same_kind && self.0.bound == other.0.bound
    }
}

#[derive(Clone)]
enum ModifierAction {
    Named {
        scope: Weak<InstanceInner>,
        action: String,
        args: Vec<Value>,
    },
    Closure(ClosureAction),
}

/// `{{action ...}}` attached to an element.
#[derive(Clone)]
pub struct ActionModifier {
    pub(crate) event: String,
    action: ModifierAction,
    pub(crate) bubbles: bool,
    pub(crate) prevent_default: bool,
}

impl ActionModifier {
    pub(crate) fn named(
        event: impl Into<String>,
        scope: Weak<InstanceInner>,
        action: &str,
        args: Vec<Value>,
    ) -> Self {
        Self {
            event: event.into(),
            action: ModifierAction::Named {
                scope,
                action: action.to_string(),
                args,
            },
            bubbles: true,
            prevent_default: true,
        }
    }

    pub(crate) fn closure(event: impl Into<String>, action: ClosureAction) -> Self {
        Self {
            event: event.into(),
            action: ModifierAction::Closure(action),
            bubbles: true,
            prevent_default: true,
        }
    }

    pub(crate) fn fire(&self) -> Result<()> {
        match &self.action {
            ModifierAction::Named {
                scope,
                action,
                args,
            } => match scope.upgrade() {
                Some(inner) => Instance(inner).send(action, args),
                None => Ok(()),
            },
            ModifierAction::Closure(c) => c.invoke(&[]),
        }
    }
}
