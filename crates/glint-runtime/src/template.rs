//! Templates and the builder they render into.
//!
//! A [`Template`] is a precompiled render function. Rendering it produces a
//! list of virtual nodes that the renderer reconciles against what is
//! already mounted. Everything a template reads goes through the builder's
//! instance, so it is tracked by that instance's observer. Block content is
//! tracked by the observer of the instance that passed the block.

use std::collections::BTreeMap;
use std::fmt;
use std::rc::{Rc, Weak};

use glint_core::{Error, Result, track_also};

use crate::actions::{ActionModifier, ClosureAction};
use crate::bindings::{AttrPart, merge_attributes};
use crate::component::PositionalParams;
use crate::curry::{CurriedComponent, curry};
use crate::definition::{Definition, DefinitionKind};
use crate::instance::{Attrs, Instance, InstanceInner};
use crate::renderer::RendererInner;
use crate::value::Value;

pub type RenderFn = dyn Fn(&mut Builder<'_>) -> Result<()>;
pub type BlockFn = dyn Fn(&mut Builder<'_>, &[Value]) -> Result<()>;

/// Identity-stable render function.
#[derive(Clone)]
pub struct Template(Rc<TemplateInner>);

struct TemplateInner {
    name: String,
    render: Box<RenderFn>,
}

impl Template {
    pub fn new(name: impl Into<String>, render: impl Fn(&mut Builder<'_>) -> Result<()> + 'static) -> Self {
        Self(Rc::new(TemplateInner {
            name: name.into(),
            render: Box::new(render),
        }))
    }

    pub fn name(&self) -> &str {
        &self.0.name
    }

    pub fn ptr_eq(&self, other: &Template) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    pub(crate) fn key(&self) -> usize {
        Rc::as_ptr(&self.0) as usize
    }

    pub(crate) fn render(&self, b: &mut Builder<'_>) -> Result<()> {
        (self.0.render)(b)
    }
}

impl fmt::Debug for Template {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Template({})", self.0.name)
    }
}

/// Block passed to a component invocation. Runs in the scope that wrote it.
#[derive(Clone)]
pub struct Block {
    pub(crate) scope: Weak<InstanceInner>,
    pub(crate) render: Rc<BlockFn>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) enum BlockKey {
    Then,
    Else,
    Each,
    Item,
    Yield,
    Empty,
}

#[derive(Clone, Default)]
pub(crate) struct Invocation {
    pub(crate) attrs: Attrs,
    pub(crate) forwarded: Vec<(String, String)>,
    pub(crate) block: Option<Block>,
}

pub(crate) enum VNode {
    Element {
        tag: String,
        attrs: Vec<(String, String)>,
        actions: Vec<ActionModifier>,
        children: Vec<VNode>,
    },
    Text(String),
    Component {
        definition: Rc<Definition>,
        invocation: Invocation,
    },
    Block {
        key: BlockKey,
        children: Vec<VNode>,
    },
}

/// Something a template can invoke as a component.
pub enum Invocable {
    Name(String),
    Definition(Rc<Definition>),
    Value(Value),
}

impl From<&str> for Invocable {
    fn from(name: &str) -> Self {
        Invocable::Name(name.to_string())
    }
}

impl From<String> for Invocable {
    fn from(name: String) -> Self {
        Invocable::Name(name)
    }
}

impl From<Rc<Definition>> for Invocable {
    fn from(d: Rc<Definition>) -> Self {
        Invocable::Definition(d)
    }
}

impl From<Value> for Invocable {
    fn from(v: Value) -> Self {
        Invocable::Value(v)
    }
}

impl From<CurriedComponent> for Invocable {
    fn from(c: CurriedComponent) -> Self {
        Invocable::Value(Value::Component(c))
    }
}

pub struct Builder<'r> {
    renderer: &'r RendererInner,
    this: Instance,
    nodes: Vec<VNode>,
}

impl<'r> Builder<'r> {
    pub(crate) fn new(renderer: &'r RendererInner, this: Instance) -> Self {
        Self {
            renderer,
            this,
            nodes: Vec::new(),
        }
    }

    pub(crate) fn finish(self) -> Vec<VNode> {
        self.nodes
    }

    fn nested(&self, this: Instance) -> Builder<'r> {
        Builder::new(self.renderer, this)
    }

    /// The instance whose scope this template reads from.
    pub fn this(&self) -> &Instance {
        &self.this
    }

    /// `this.path`
    pub fn get(&self, path: &str) -> Value {
        self.this.get(path)
    }

    /// `@name`
    pub fn arg(&self, name: &str) -> Value {
        self.this.attr(name)
    }

    pub fn has_block(&self) -> bool {
        self.this.has_block()
    }

    pub fn text(&mut self, value: impl Into<Value>) {
        self.nodes.push(VNode::Text(value.into().to_string()));
    }

    pub fn element(&mut self, tag: impl Into<String>) -> ElementBuilder<'_, 'r> {
        ElementBuilder {
            tag: tag.into(),
            parts: Vec::new(),
            actions: Vec::new(),
            parent: self,
        }
    }

    /// `<Target ...>` / `{{component target ...}}`
    pub fn component(&mut self, target: impl Into<Invocable>) -> InvocationBuilder<'_, 'r> {
        InvocationBuilder {
            target: target.into(),
            positional: Vec::new(),
            named: Vec::new(),
            attrs: Vec::new(),
            block: None,
            parent: self,
        }
    }

    /// `{{yield params...}}`. Renders nothing without a block.
    pub fn yield_block(&mut self, params: Vec<Value>) -> Result<()> {
        let Some(block) = self.this.block() else {
            return Ok(());
        };
        let Some(scope) = block.scope.upgrade() else {
            return Ok(());
        };
        // block reads belong to the scope that wrote the block
        let observer = scope.observer;
        let mut inner = self.nested(Instance(scope));
        track_also(observer, || (block.render)(&mut inner, &params))?;
        self.nodes.push(VNode::Block {
            key: BlockKey::Yield,
            children: inner.finish(),
        });
        Ok(())
    }

    /// `{{#if cond}}...{{/if}}`
    pub fn if_block(
        &mut self,
        cond: &Value,
        then: impl FnOnce(&mut Builder<'r>) -> Result<()>,
    ) -> Result<()> {
        self.if_else(cond, then, |_| Ok(()))
    }

    /// `{{#if cond}}...{{else}}...{{/if}}`
    pub fn if_else(
        &mut self,
        cond: &Value,
        then: impl FnOnce(&mut Builder<'r>) -> Result<()>,
        otherwise: impl FnOnce(&mut Builder<'r>) -> Result<()>,
    ) -> Result<()> {
        let mut inner = self.nested(self.this.clone());
        let key = if cond.is_truthy() {
            then(&mut inner)?;
            BlockKey::Then
        } else {
            otherwise(&mut inner)?;
            BlockKey::Else
        };
        self.nodes.push(VNode::Block {
            key,
            children: inner.finish(),
        });
        Ok(())
    }

    /// `{{#each items as |item index|}}...{{/each}}`
    pub fn each(
        &mut self,
        items: &Value,
        mut f: impl FnMut(&mut Builder<'r>, &Value, usize) -> Result<()>,
    ) -> Result<()> {
        let items: Rc<[Value]> = match items.resolved() {
            Value::List(items) => items.clone(),
            Value::Undefined | Value::Null => Rc::from([]),
            other => {
                return Err(Error::assertion(format!(
                    "#each expects a list, got {other:?}"
                )));
            }
        };
        let mut children = Vec::with_capacity(items.len());
        for (i, item) in items.iter().enumerate() {
            let mut inner = self.nested(self.this.clone());
            f(&mut inner, item, i)?;
            children.push(VNode::Block {
                key: BlockKey::Item,
                children: inner.finish(),
            });
        }
        self.nodes.push(VNode::Block {
            key: BlockKey::Each,
            children,
        });
        Ok(())
    }

    /// `(name positional... key=value...)`
    pub fn helper(
        &self,
        name: &str,
        positional: Vec<Value>,
        named: Vec<(String, Value)>,
    ) -> Result<Value> {
        let def = self.renderer.container.helper_definition(name)?;
        let Some(helper) = def.helper_factory() else {
            return Err(Error::assertion(format!("`{name}` is not a helper")));
        };
        let positional: Vec<Value> = positional.iter().map(Value::refreshed).collect();
        let named: BTreeMap<String, Value> = named
            .into_iter()
            .map(|(k, v)| (k, v.refreshed()))
            .collect();
        helper.call(&positional, &named)
    }

    /// `(component target positional... key=value...)`
    pub fn curry(
        &self,
        target: impl Into<Invocable>,
        positional: Vec<Value>,
        named: Vec<(String, Value)>,
    ) -> Result<Value> {
        let positional: Vec<Value> = positional.iter().map(Value::refreshed).collect();
        let named: Vec<(String, Value)> = named
            .into_iter()
            .map(|(k, v)| (k, v.refreshed()))
            .collect();
        let curried = match target.into() {
            Invocable::Name(name) => self.renderer.container.curry(&name, positional, named)?,
            Invocable::Definition(d) => curry(d, positional, named),
            Invocable::Value(v) => match v.resolved() {
                Value::Component(c) => curry(c, positional, named),
                Value::Str(name) => self.renderer.container.curry(name, positional, named)?,
                Value::Undefined | Value::Null => return Ok(Value::Null),
                other => {
                    return Err(Error::assertion(format!(
                        "cannot curry {other:?} as a component"
                    )));
                }
            },
        };
        Ok(Value::Component(curried))
    }

    /// `(action "name" args...)` bound to this scope.
    pub fn action(&self, name: &str, args: Vec<Value>) -> Value {
        Value::Action(ClosureAction::send(self.this.downgrade(), name).with_args(args))
    }

    /// `(mut this.key)`
    pub fn mutable(&self, key: &str) -> Result<Value> {
        self.this.binding(key)
    }

    fn resolve(&self, target: Invocable) -> Result<Option<(Rc<Definition>, Option<CurriedComponent>)>> {
        let container = &self.renderer.container;
        Ok(Some(match target {
            Invocable::Name(name) => (container.component_definition(&name)?, None),
            Invocable::Definition(d) => (d, None),
            Invocable::Value(v) => match v.resolved() {
                Value::Component(c) => (c.definition().clone(), Some(c.clone())),
                Value::Str(name) => (container.component_definition(name)?, None),
                Value::Undefined | Value::Null => return Ok(None),
                other => {
                    return Err(Error::assertion(format!(
                        "cannot invoke {other:?} as a component"
                    )));
                }
            },
        }))
    }
}

pub struct ElementBuilder<'b, 'r> {
    parent: &'b mut Builder<'r>,
    tag: String,
    parts: Vec<AttrPart>,
    actions: Vec<ActionModifier>,
}

impl<'b, 'r> ElementBuilder<'b, 'r> {
    pub fn attr(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.parts.push(AttrPart::Static(name.into(), value.into()));
        self
    }

    pub fn bind(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.parts.push(AttrPart::Bound(name.into(), value.into()));
        self
    }

    pub fn class(self, class: impl Into<String>) -> Self {
        self.attr("class", class)
    }

    /// `...attributes`
    pub fn splat(mut self) -> Self {
        self.parts.push(AttrPart::Splat);
        self
    }

    /// `{{action "name" on="event"}}`
    pub fn on(self, event: impl Into<String>, action: &str) -> Self {
        self.on_with(event, action, Vec::new())
    }

    pub fn on_with(mut self, event: impl Into<String>, action: &str, args: Vec<Value>) -> Self {
        let modifier = ActionModifier::named(event, self.parent.this.downgrade(), action, args);
        self.actions.push(modifier);
        self
    }

    /// `{{action this.onSave on="click"}}` with a closure action value.
    pub fn on_action(mut self, event: impl Into<String>, action: &Value) -> Result<Self> {
        let Value::Action(a) = action.resolved() else {
            return Err(Error::assertion(format!(
                "action modifiers need an action, got {action:?}"
            )));
        };
        self.actions.push(ActionModifier::closure(event, a.clone()));
        Ok(self)
    }

    /// Adjusts the last action modifier added.
    pub fn bubbles(mut self, bubbles: bool) -> Self {
        if let Some(m) = self.actions.last_mut() {
            m.bubbles = bubbles;
        }
        self
    }

    pub fn finish(self) -> Result<()> {
        self.children(|_| Ok(()))
    }

    pub fn children(self, f: impl FnOnce(&mut Builder<'r>) -> Result<()>) -> Result<()> {
        let mut inner = self.parent.nested(self.parent.this.clone());
        f(&mut inner)?;
        let attrs = merge_attributes(&self.parts, &self.parent.this.forwarded_attributes());
        self.parent.nodes.push(VNode::Element {
            tag: self.tag,
            attrs,
            actions: self.actions,
            children: inner.finish(),
        });
        Ok(())
    }
}

pub struct InvocationBuilder<'b, 'r> {
    parent: &'b mut Builder<'r>,
    target: Invocable,
    positional: Vec<Value>,
    named: Vec<(String, Value)>,
    attrs: Vec<AttrPart>,
    block: Option<Rc<BlockFn>>,
}

impl<'b, 'r> InvocationBuilder<'b, 'r> {
    pub fn positional(mut self, value: impl Into<Value>) -> Self {
        self.positional.push(value.into());
        self
    }

    /// `@name={{value}}` / `name=value`
    pub fn arg(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.named.push((name.into(), value.into()));
        self
    }

    /// Plain HTML attribute, forwarded to the component's `...attributes`.
    pub fn attr(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attrs.push(AttrPart::Static(name.into(), value.into()));
        self
    }

    pub fn bind_attr(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.attrs.push(AttrPart::Bound(name.into(), value.into()));
        self
    }

    /// Passes the current `...attributes` on.
    pub fn splat(mut self) -> Self {
        self.attrs.push(AttrPart::Splat);
        self
    }

    pub fn block(mut self, f: impl Fn(&mut Builder<'_>, &[Value]) -> Result<()> + 'static) -> Self {
        self.block = Some(Rc::new(f));
        self
    }

    pub fn finish(self) -> Result<()> {
        let Self {
            parent,
            target,
            positional,
            named,
            attrs,
            block,
        } = self;
        let Some((definition, curried)) = parent.resolve(target)? else {
            parent.nodes.push(VNode::Block {
                key: BlockKey::Empty,
                children: Vec::new(),
            });
            return Ok(());
        };
        if definition.kind() == DefinitionKind::Helper {
            return Err(Error::assertion(format!(
                "`{}` is a helper and cannot be invoked as a component",
                definition.name()
            )));
        }
        let positional: Vec<Value> = positional.iter().map(Value::refreshed).collect();
        let named: Vec<(String, Value)> = named
            .into_iter()
            .map(|(k, v)| (k, v.refreshed()))
            .collect();
        let explicit: Vec<String> = named.iter().map(|(k, _)| k.clone()).collect();
        let mut args = match &curried {
            Some(c) => c.merged(positional, named),
            None => {
                let mut a = Attrs::default();
                a.positional.extend(positional);
                a.named.extend(named);
                a
            }
        };
        map_positional(&definition, &mut args, &explicit)?;

        let forwarded = merge_attributes(&attrs, &parent.this.forwarded_attributes());
        let block = block.map(|render| Block {
            scope: parent.this.downgrade(),
            render,
        });
        parent.nodes.push(VNode::Component {
            definition,
            invocation: Invocation {
                attrs: args,
                forwarded,
                block,
            },
        });
        Ok(())
    }
}

/// Copies positional args onto the names the component declared for them.
fn map_positional(definition: &Definition, args: &mut Attrs, explicit: &[String]) -> Result<()> {
    let Some(descriptor) = definition.descriptor() else {
        return Ok(());
    };
    let conflict = |name: &str| {
        Error::assertion(format!(
            "you cannot specify both a positional param and the hash argument `{name}` for `{}`",
            definition.name()
        ))
    };
    match descriptor.positional_params() {
        PositionalParams::None => {}
        PositionalParams::Named(names) => {
            for (name, value) in names.iter().zip(args.positional.iter()) {
                if explicit.iter().any(|k| k == name) {
                    return Err(conflict(name));
                }
                args.named.insert(name.clone(), value.clone());
            }
        }
        PositionalParams::Rest(name) => {
            if explicit.iter().any(|k| k == name) {
                return Err(conflict(name));
            }
            if !args.positional.is_empty() || !args.named.contains_key(name) {
                let list = Value::list(args.positional.iter().cloned());
                args.named.insert(name.clone(), list);
            }
        }
    }
    Ok(())
}
