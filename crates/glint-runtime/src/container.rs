use std::cell::{Cell as StdCell, RefCell};
use std::collections::{BTreeMap, HashMap};
use std::rc::Rc;

use glint_core::{Error, Result};

use crate::component::ComponentDescriptor;
use crate::curry::{CurriedComponent, curry};
use crate::definition::{Definition, DefinitionCache, Factory, HelperFactory};
use crate::template::Template;
use crate::value::Value;

/// Name -> factory registry in front of the definition cache.
///
/// A component is a descriptor, a template, or both. Registering only a
/// template gives a tagless, behaviour-less component.
#[derive(Default)]
pub struct Container {
    components: RefCell<HashMap<String, Rc<ComponentDescriptor>>>,
    templates: RefCell<HashMap<String, Template>>,
    helpers: RefCell<HashMap<String, Rc<HelperFactory>>>,
    cache: DefinitionCache,
    destroyed: StdCell<bool>,
}

impl Container {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_component(
        &self,
        name: impl Into<String>,
        descriptor: ComponentDescriptor,
    ) -> Rc<ComponentDescriptor> {
        let descriptor = Rc::new(descriptor);
        self.components
            .borrow_mut()
            .insert(name.into(), descriptor.clone());
        descriptor
    }

    pub fn register_template(&self, name: impl Into<String>, template: Template) {
        self.templates.borrow_mut().insert(name.into(), template);
    }

    pub fn register_helper(
        &self,
        name: impl Into<String>,
        f: impl Fn(&[Value], &BTreeMap<String, Value>) -> Result<Value> + 'static,
    ) {
        let name = name.into();
        let helper = Rc::new(HelperFactory::new(name.clone(), f));
        self.helpers.borrow_mut().insert(name, helper);
    }

    pub fn factory_for(&self, name: &str) -> Option<Factory> {
        if let Some(c) = self.components.borrow().get(name) {
            return Some(Factory::Component(c.clone()));
        }
        self.helpers
            .borrow()
            .get(name)
            .map(|h| Factory::Helper(h.clone()))
    }

    pub fn template_for(&self, name: &str) -> Option<Template> {
        self.templates.borrow().get(name).cloned()
    }

    pub fn component_definition(&self, name: &str) -> Result<Rc<Definition>> {
        self.check_live(name)?;
        let registered = self.components.borrow().get(name).cloned();
        let template = self.template_for(name);
        let descriptor = match (registered, &template) {
            (Some(d), _) => d,
            (None, Some(_)) => {
                // keep the synthesized descriptor so its identity is stable
                let d = Rc::new(ComponentDescriptor::template_only(name));
                self.components
                    .borrow_mut()
                    .insert(name.to_string(), d.clone());
                d
            }
            (None, None) => {
                return Err(Error::assertion(format!(
                    "no component or template named `{name}` is registered"
                )));
            }
        };
        let template = descriptor.layout().cloned().or(template);
        self.cache.resolve_component(&descriptor, template.as_ref())
    }

    pub fn helper_definition(&self, name: &str) -> Result<Rc<Definition>> {
        self.check_live(name)?;
        let helper = self.helpers.borrow().get(name).cloned();
        match helper {
            Some(h) => self.cache.resolve_helper(&h),
            None => Err(Error::assertion(format!(
                "no helper named `{name}` is registered"
            ))),
        }
    }

    /// `(component "name" ...)` with arguments bound ahead of time.
    pub fn curry(
        &self,
        name: &str,
        positional: Vec<Value>,
        named: Vec<(String, Value)>,
    ) -> Result<CurriedComponent> {
        Ok(curry(self.component_definition(name)?, positional, named))
    }

    pub fn cache(&self) -> &DefinitionCache {
        &self.cache
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed.get()
    }

    pub fn teardown(&self) {
        if self.destroyed.replace(true) {
            return;
        }
        self.cache.clear();
        self.components.borrow_mut().clear();
        self.templates.borrow_mut().clear();
        self.helpers.borrow_mut().clear();
    }

    fn check_live(&self, name: &str) -> Result<()> {
        if self.destroyed.get() {
            return Err(Error::destroyed("container", format!("look up `{name}`")));
        }
        Ok(())
    }
}
