//! Definitions and the definition cache.
//!
//! A [`Definition`] pairs a factory (component descriptor or helper) with
//! the template it renders and everything derived from the two that does not
//! change per instance: parsed bindings, capability flags, the hook mask.
//! The cache guarantees one `Rc<Definition>` per `(factory, template)`
//! identity pair, which is what instance reuse compares.

use std::cell::{Cell as StdCell, RefCell};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::rc::Rc;

use bitflags::bitflags;
use glint_core::{Error, Result};

use crate::bindings::ComponentBindings;
use crate::component::{ComponentDescriptor, PositionalParams};
use crate::lifecycle::HookSet;
use crate::template::Template;
use crate::value::Value;

bitflags! {
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct Capabilities: u8 {
        /// Renders a wrapper element.
        const ELEMENT = 1 << 0;
        const TEMPLATE = 1 << 1;
        const ACTIONS = 1 << 2;
        const EVENTS = 1 << 3;
        const POSITIONAL = 1 << 4;
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DefinitionKind {
    Component,
    Helper,
}

pub type HelperFn = dyn Fn(&[Value], &BTreeMap<String, Value>) -> Result<Value>;

pub struct HelperFactory {
    name: String,
    f: Box<HelperFn>,
}

impl HelperFactory {
    pub fn new(
        name: impl Into<String>,
        f: impl Fn(&[Value], &BTreeMap<String, Value>) -> Result<Value> + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            f: Box::new(f),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn call(&self, positional: &[Value], named: &BTreeMap<String, Value>) -> Result<Value> {
        (self.f)(positional, named)
    }
}

#[derive(Clone)]
pub enum Factory {
    Component(Rc<ComponentDescriptor>),
    Helper(Rc<HelperFactory>),
}

impl Factory {
    fn key(&self) -> usize {
        match self {
            Factory::Component(c) => Rc::as_ptr(c) as usize,
            Factory::Helper(h) => Rc::as_ptr(h) as usize,
        }
    }
}

pub struct Definition {
    kind: DefinitionKind,
    name: String,
    factory: Factory,
    template: Option<Template>,
    bindings: ComponentBindings,
    capabilities: Capabilities,
    hooks: HookSet,
}

impl Definition {
    fn component(descriptor: &Rc<ComponentDescriptor>, template: Option<&Template>) -> Result<Self> {
        let bindings = ComponentBindings::parse(
            descriptor.element_id.as_deref(),
            &descriptor.class_names,
            &descriptor.class_name_bindings,
            &descriptor.attribute_bindings,
        )?;
        let mut capabilities = Capabilities::empty();
        capabilities.set(Capabilities::ELEMENT, !descriptor.is_tagless());
        capabilities.set(Capabilities::TEMPLATE, template.is_some());
        capabilities.set(Capabilities::ACTIONS, descriptor.has_actions());
        capabilities.set(Capabilities::EVENTS, !descriptor.event_methods().is_empty());
        capabilities.set(
            Capabilities::POSITIONAL,
            *descriptor.positional_params() != PositionalParams::None,
        );
        Ok(Self {
            kind: DefinitionKind::Component,
            name: descriptor.name().to_string(),
            factory: Factory::Component(descriptor.clone()),
            template: template.cloned(),
            bindings,
            capabilities,
            hooks: descriptor.hooks(),
        })
    }

    fn helper(helper: &Rc<HelperFactory>) -> Self {
        Self {
            kind: DefinitionKind::Helper,
            name: helper.name().to_string(),
            factory: Factory::Helper(helper.clone()),
            template: None,
            bindings: ComponentBindings::default(),
            capabilities: Capabilities::empty(),
            hooks: HookSet::empty(),
        }
    }

    pub fn kind(&self) -> DefinitionKind {
        self.kind
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn factory(&self) -> &Factory {
        &self.factory
    }

    pub fn template(&self) -> Option<&Template> {
        self.template.as_ref()
    }

    pub fn capabilities(&self) -> Capabilities {
        self.capabilities
    }

    pub fn hooks(&self) -> HookSet {
        self.hooks
    }

    pub fn bindings(&self) -> &ComponentBindings {
        &self.bindings
    }

    pub fn descriptor(&self) -> Option<&Rc<ComponentDescriptor>> {
        match &self.factory {
            Factory::Component(c) => Some(c),
            Factory::Helper(_) => None,
        }
    }

    pub fn helper_factory(&self) -> Option<&Rc<HelperFactory>> {
        match &self.factory {
            Factory::Helper(h) => Some(h),
            Factory::Component(_) => None,
        }
    }

    pub fn is_tagless(&self) -> bool {
        !self.capabilities.contains(Capabilities::ELEMENT)
    }
}

impl fmt::Debug for Definition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Definition")
            .field("kind", &self.kind)
            .field("name", &self.name)
            .field("template", &self.template.as_ref().map(Template::name))
            .field("capabilities", &self.capabilities)
            .field("hooks", &self.hooks)
            .finish()
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
}

type CacheKey = (usize, usize);

/// `(factory, template) -> Definition`, keyed by pointer identity. Entries
/// hold the `Rc`s they were keyed by, so an address cannot be reused while
/// its entry is alive.
#[derive(Default)]
pub struct DefinitionCache {
    entries: RefCell<HashMap<CacheKey, Rc<Definition>>>,
    hits: StdCell<u64>,
    misses: StdCell<u64>,
    torn_down: StdCell<bool>,
}

impl DefinitionCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn resolve_component(
        &self,
        descriptor: &Rc<ComponentDescriptor>,
        template: Option<&Template>,
    ) -> Result<Rc<Definition>> {
        let key = (
            Factory::Component(descriptor.clone()).key(),
            template.map_or(0, Template::key),
        );
        self.resolve(key, descriptor.name(), || {
            Definition::component(descriptor, template)
        })
    }

    pub fn resolve_helper(&self, helper: &Rc<HelperFactory>) -> Result<Rc<Definition>> {
        let key = (Factory::Helper(helper.clone()).key(), 0);
        self.resolve(key, helper.name(), || Ok(Definition::helper(helper)))
    }

    fn resolve(
        &self,
        key: CacheKey,
        name: &str,
        build: impl FnOnce() -> Result<Definition>,
    ) -> Result<Rc<Definition>> {
        if self.torn_down.get() {
            return Err(Error::destroyed("definition cache", format!("resolve `{name}`")));
        }
        if let Some(def) = self.entries.borrow().get(&key) {
            self.hits.set(self.hits.get() + 1);
            return Ok(def.clone());
        }
        self.misses.set(self.misses.get() + 1);
        log::debug!("definition cache miss for `{name}`");
        let def = Rc::new(build()?);
        self.entries.borrow_mut().insert(key, def.clone());
        Ok(def)
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.get(),
            misses: self.misses.get(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.borrow().is_empty()
    }

    /// Drops every entry; later lookups fail.
    pub fn clear(&self) {
        self.torn_down.set(true);
        self.entries.borrow_mut().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::component::ComponentDescriptor;

    #[test]
    fn one_definition_per_factory_template_pair() {
        let cache = DefinitionCache::new();
        let desc = Rc::new(ComponentDescriptor::builder("x-foo").build());
        let a = Template::new("a", |_| Ok(()));
        let b = Template::new("b", |_| Ok(()));

        let first = cache.resolve_component(&desc, Some(&a)).unwrap();
        let again = cache.resolve_component(&desc, Some(&a.clone())).unwrap();
        let other = cache.resolve_component(&desc, Some(&b)).unwrap();

        assert!(Rc::ptr_eq(&first, &again));
        assert!(!Rc::ptr_eq(&first, &other));
        assert_eq!(cache.stats(), CacheStats { hits: 1, misses: 2 });
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn invalid_bindings_surface_on_resolution() {
        let cache = DefinitionCache::new();
        let desc = Rc::new(
            ComponentDescriptor::builder("x-bad")
                .attribute_bindings(["user.name:title"])
                .build(),
        );
        assert!(matches!(
            cache.resolve_component(&desc, None),
            Err(Error::InvalidBinding(_))
        ));
        assert!(cache.is_empty());
    }

    #[test]
    fn cleared_cache_refuses_lookups() {
        let cache = DefinitionCache::new();
        let helper = Rc::new(HelperFactory::new("upper", |p, _| {
            Ok(Value::str(p[0].to_string().to_uppercase()))
        }));
        let def = cache.resolve_helper(&helper).unwrap();
        assert_eq!(def.kind(), DefinitionKind::Helper);
        cache.clear();
        assert!(matches!(
            cache.resolve_helper(&helper),
            Err(Error::DestroyedObject { .. })
        ));
    }
}
