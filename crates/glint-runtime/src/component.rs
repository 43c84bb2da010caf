//! Component descriptors.
//!
//! A [`ComponentDescriptor`] is the factory half of a definition: element
//! shape, bindings, positional params, default props, and a stack of
//! behaviour [`Fragment`]s. Fragments are ordered least specific first, so a
//! descriptor built from a shared fragment plus its own handlers behaves
//! like a subclass: lookups start at the end and `call_super` walks back.

use std::collections::HashMap;
use std::rc::Rc;

use glint_core::Result;

use crate::actions::ActionContext;
use crate::events::{Event, Propagation};
use crate::instance::Instance;
use crate::lifecycle::{Hook, HookSet};
use crate::template::Template;
use crate::value::Value;

pub type HookFn = Rc<dyn Fn(&Instance) -> Result<()>>;
pub type ActionFn = Rc<dyn Fn(&ActionContext<'_>) -> Result<()>>;
pub type EventFn = Rc<dyn Fn(&Instance, &mut Event) -> Result<Propagation>>;
pub type ComputedFn = Rc<dyn Fn(&Instance) -> Value>;

/// A named bundle of hooks, actions and event handlers.
#[derive(Clone, Default)]
pub struct Fragment {
    name: String,
    hooks: HashMap<Hook, HookFn>,
    actions: HashMap<String, ActionFn>,
    events: HashMap<String, EventFn>,
}

impl Fragment {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn hook(mut self, hook: Hook, f: impl Fn(&Instance) -> Result<()> + 'static) -> Self {
        self.hooks.insert(hook, Rc::new(f));
        self
    }

    pub fn action(
        mut self,
        name: impl Into<String>,
        f: impl Fn(&ActionContext<'_>) -> Result<()> + 'static,
    ) -> Self {
        self.actions.insert(name.into(), Rc::new(f));
        self
    }

    /// Handler for the component method `method` (`"click"`, `"doubleClick"`).
    pub fn event(
        mut self,
        method: impl Into<String>,
        f: impl Fn(&Instance, &mut Event) -> Result<Propagation> + 'static,
    ) -> Self {
        self.events.insert(method.into(), Rc::new(f));
        self
    }

    fn is_empty(&self) -> bool {
        self.hooks.is_empty() && self.actions.is_empty() && self.events.is_empty()
    }
}

/// How positional arguments map onto named attrs.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum PositionalParams {
    #[default]
    None,
    /// `["title", "body"]`: the first positional arg becomes `title`, ...
    Named(Vec<String>),
    /// All positional args as one list attr.
    Rest(String),
}

pub struct ComponentDescriptor {
    pub(crate) name: String,
    pub(crate) tag_name: Option<String>,
    pub(crate) element_id: Option<String>,
    pub(crate) class_names: Vec<String>,
    pub(crate) class_name_bindings: Vec<String>,
    pub(crate) attribute_bindings: Vec<String>,
    pub(crate) positional_params: PositionalParams,
    pub(crate) layout: Option<Template>,
    pub(crate) fragments: Vec<Rc<Fragment>>,
    pub(crate) defaults: Vec<(String, Value)>,
    pub(crate) computed: Vec<(String, ComputedFn)>,
}

impl ComponentDescriptor {
    pub fn builder(name: impl Into<String>) -> ComponentBuilder {
        ComponentBuilder::new(name)
    }

    /// Descriptor used for a template registered without a component:
    /// tagless, no behaviour.
    pub fn template_only(name: impl Into<String>) -> Self {
        ComponentBuilder::new(name).tagless().build()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn tag_name(&self) -> Option<&str> {
        self.tag_name.as_deref()
    }

    pub fn is_tagless(&self) -> bool {
        self.tag_name.is_none()
    }

    pub fn layout(&self) -> Option<&Template> {
        self.layout.as_ref()
    }

    pub fn positional_params(&self) -> &PositionalParams {
        &self.positional_params
    }

    pub fn hooks(&self) -> HookSet {
        self.fragments
            .iter()
            .flat_map(|f| f.hooks.keys())
            .fold(HookSet::empty(), |set, h| set | h.flag())
    }

    /// Most specific implementation of `hook`.
    pub fn hook_fn(&self, hook: Hook) -> Option<HookFn> {
        self.fragments
            .iter()
            .rev()
            .find_map(|f| f.hooks.get(&hook).cloned())
    }

    /// Every implementation of `action`, most specific first.
    pub fn action_chain(&self, action: &str) -> Vec<ActionFn> {
        self.fragments
            .iter()
            .rev()
            .filter_map(|f| f.actions.get(action).cloned())
            .collect()
    }

    pub fn event_handler(&self, method: &str) -> Option<EventFn> {
        self.fragments
            .iter()
            .rev()
            .find_map(|f| f.events.get(method).cloned())
    }

    pub(crate) fn has_actions(&self) -> bool {
        self.fragments.iter().any(|f| !f.actions.is_empty())
    }

    pub(crate) fn event_methods(&self) -> Vec<&str> {
        let mut methods: Vec<&str> = self
            .fragments
            .iter()
            .flat_map(|f| f.events.keys().map(String::as_str))
            .collect();
        methods.sort_unstable();
        methods.dedup();
        methods
    }
}

pub struct ComponentBuilder {
    desc: ComponentDescriptor,
    own: Fragment,
}

impl ComponentBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            own: Fragment::new(name.clone()),
            desc: ComponentDescriptor {
                name,
                tag_name: Some("div".into()),
                element_id: None,
                class_names: Vec::new(),
                class_name_bindings: Vec::new(),
                attribute_bindings: Vec::new(),
                positional_params: PositionalParams::None,
                layout: None,
                fragments: Vec::new(),
                defaults: Vec::new(),
                computed: Vec::new(),
            },
        }
    }

    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.desc.tag_name = Some(tag.into());
        self
    }

    pub fn tagless(mut self) -> Self {
        self.desc.tag_name = None;
        self
    }

    pub fn element_id(mut self, id: impl Into<String>) -> Self {
        self.desc.element_id = Some(id.into());
        self
    }

    pub fn class_names<S: Into<String>>(mut self, names: impl IntoIterator<Item = S>) -> Self {
        self.desc
            .class_names
            .extend(names.into_iter().map(Into::into));
        self
    }

    /// Bindings like `"isUrgent"`, `"isEnabled:enabled:disabled"` or
    /// `"isHidden::visible"`. Checked when the definition is first resolved.
    pub fn class_name_bindings<S: Into<String>>(
        mut self,
        specs: impl IntoIterator<Item = S>,
    ) -> Self {
        self.desc
            .class_name_bindings
            .extend(specs.into_iter().map(Into::into));
        self
    }

    /// Bindings like `"title"` or `"linkUrl:href"`.
    pub fn attribute_bindings<S: Into<String>>(
        mut self,
        specs: impl IntoIterator<Item = S>,
    ) -> Self {
        self.desc
            .attribute_bindings
            .extend(specs.into_iter().map(Into::into));
        self
    }

    pub fn positional_params<S: Into<String>>(mut self, names: impl IntoIterator<Item = S>) -> Self {
        self.desc.positional_params =
            PositionalParams::Named(names.into_iter().map(Into::into).collect());
        self
    }

    pub fn rest_positional(mut self, name: impl Into<String>) -> Self {
        self.desc.positional_params = PositionalParams::Rest(name.into());
        self
    }

    pub fn layout(mut self, template: Template) -> Self {
        self.desc.layout = Some(template);
        self
    }

    /// Initial value of an instance property.
    pub fn prop(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.desc.defaults.push((name.into(), value.into()));
        self
    }

    /// Read-only property derived from other properties. Cached per
    /// instance until one of the cells it read changes.
    pub fn computed(
        mut self,
        name: impl Into<String>,
        f: impl Fn(&Instance) -> Value + 'static,
    ) -> Self {
        self.desc.computed.push((name.into(), Rc::new(f)));
        self
    }

    /// Mixes in a shared fragment. Later fragments (and the builder's own
    /// handlers) are more specific.
    pub fn fragment(mut self, fragment: impl Into<Rc<Fragment>>) -> Self {
        self.desc.fragments.push(fragment.into());
        self
    }

    pub fn hook(mut self, hook: Hook, f: impl Fn(&Instance) -> Result<()> + 'static) -> Self {
        self.own = self.own.hook(hook, f);
        self
    }

    pub fn action(
        mut self,
        name: impl Into<String>,
        f: impl Fn(&ActionContext<'_>) -> Result<()> + 'static,
    ) -> Self {
        self.own = self.own.action(name, f);
        self
    }

    pub fn event(
        mut self,
        method: impl Into<String>,
        f: impl Fn(&Instance, &mut Event) -> Result<Propagation> + 'static,
    ) -> Self {
        self.own = self.own.event(method, f);
        self
    }

    pub fn build(mut self) -> ComponentDescriptor {
        if !self.own.is_empty() {
            self.desc.fragments.push(Rc::new(self.own));
        }
        self.desc
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn own_handlers_are_most_specific() {
        let base = Fragment::new("base")
            .hook(Hook::Init, |_| Ok(()))
            .action("save", |_| Ok(()));
        let desc = ComponentDescriptor::builder("x-editor")
            .fragment(base)
            .action("save", |cx| cx.call_super())
            .hook(Hook::DidRender, |_| Ok(()))
            .build();

        assert_eq!(desc.hooks(), HookSet::INIT | HookSet::DID_RENDER);
        assert_eq!(desc.action_chain("save").len(), 2);
        assert!(desc.action_chain("missing").is_empty());
        assert_eq!(desc.tag_name(), Some("div"));
    }

    #[test]
    fn template_only_components_are_tagless() {
        let desc = ComponentDescriptor::template_only("x-card");
        assert!(desc.is_tagless());
        assert!(desc.hooks().is_empty());
    }
}
