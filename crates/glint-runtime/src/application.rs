use std::cell::Cell as StdCell;
use std::collections::BTreeMap;
use std::rc::Rc;

use glint_core::{Error, NodeId, Owner, Result};

use crate::component::ComponentDescriptor;
use crate::config::RenderConfig;
use crate::container::Container;
use crate::events::{Event, EventDispatcher};
use crate::instance::Instance;
use crate::renderer::Renderer;
use crate::template::Template;
use crate::value::Value;

/// Everything one running app shares: the registry and definition cache,
/// the renderer with its document, and the event dispatcher.
///
/// ```rust
/// use glint_runtime::prelude::*;
///
/// let app = Application::new(RenderConfig::default());
/// app.register_template(
///     "x-hello",
///     Template::new("x-hello", |b| {
///         let name = b.arg("name");
///         b.text(format!("Hello, {name}"));
///         Ok(())
///     }),
/// );
/// let root = Template::new("application", |b| {
///     let name = b.get("name");
///     b.component("x-hello").arg("name", name).finish()
/// });
/// app.render(&root, Record::new().with("name", "Tom")).unwrap();
/// assert_eq!(app.html(), "Hello, Tom");
/// ```
pub struct Application {
    config: RenderConfig,
    container: Rc<Container>,
    renderer: Renderer,
    events: EventDispatcher,
    owner: Owner,
    destroyed: StdCell<bool>,
}

impl Application {
    pub fn new(config: RenderConfig) -> Self {
        let container = Rc::new(Container::new());
        let renderer = Renderer::new(config.clone(), container.clone());
        let events = EventDispatcher::new(&renderer);
        if config.interactive
            && let Err(err) = events.setup(renderer.body())
        {
            log::warn!("events disabled: {err}");
        }
        let owner = Owner::new("application");
        let c = container.clone();
        owner.add_disposer(move || c.teardown());
        Self {
            config,
            container,
            renderer,
            events,
            owner,
            destroyed: StdCell::new(false),
        }
    }

    pub fn config(&self) -> &RenderConfig {
        &self.config
    }

    pub fn container(&self) -> &Rc<Container> {
        &self.container
    }

    pub fn renderer(&self) -> &Renderer {
        &self.renderer
    }

    pub fn events(&self) -> &EventDispatcher {
        &self.events
    }

    pub fn register_component(&self, name: impl Into<String>, descriptor: ComponentDescriptor) {
        self.container.register_component(name, descriptor);
    }

    pub fn register_template(&self, name: impl Into<String>, template: Template) {
        self.container.register_template(name, template);
    }

    pub fn register_helper(
        &self,
        name: impl Into<String>,
        f: impl Fn(&[Value], &BTreeMap<String, Value>) -> Result<Value> + 'static,
    ) {
        self.container.register_helper(name, f);
    }

    /// Renders `template` into the body and settles whatever the first
    /// render's hooks invalidated.
    pub fn render(&self, template: &Template, context: impl Into<Value>) -> Result<Instance> {
        let body = self.renderer.body();
        self.render_into(template, context, body)
    }

    pub fn render_into(
        &self,
        template: &Template,
        context: impl Into<Value>,
        parent: NodeId,
    ) -> Result<Instance> {
        self.check_live("render")?;
        let root = self.renderer.render(template, context, parent)?;
        self.renderer.settle()?;
        Ok(root)
    }

    /// Runs `f` as one batch; the DOM is up to date when it returns.
    pub fn run<R>(&self, f: impl FnOnce() -> Result<R>) -> Result<R> {
        self.check_live("run")?;
        self.renderer.batch(f)
    }

    pub fn dispatch(&self, kind: &str, target: NodeId) -> Result<Event> {
        self.check_live("dispatch")?;
        self.events.dispatch(kind, target)
    }

    pub fn html(&self) -> String {
        self.renderer.html()
    }

    pub fn element_by_id(&self, id: &str) -> Option<NodeId> {
        self.renderer.with_document(|doc| doc.element_by_id(id))
    }

    /// Runs `f` during teardown, after every component is destroyed.
    pub fn on_teardown(&self, f: impl FnOnce() + 'static) {
        self.owner.add_disposer(f);
    }

    /// Destroys the rendered roots (running their teardown hooks), then the
    /// registry and definition cache.
    pub fn teardown(&self) -> Result<()> {
        if self.destroyed.replace(true) {
            return Ok(());
        }
        let result = self.renderer.teardown();
        self.owner.dispose();
        log::debug!("application torn down");
        result
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed.get()
    }

    fn check_live(&self, operation: &str) -> Result<()> {
        if self.destroyed.get() {
            return Err(Error::destroyed("application", operation));
        }
        Ok(())
    }
}

impl Drop for Application {
    fn drop(&mut self) {
        if let Err(err) = self.teardown() {
            log::warn!("teardown on drop failed: {err}");
        }
    }
}
