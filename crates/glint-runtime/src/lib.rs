//! # Components, templates and render transactions
//!
//! `glint-runtime` drives component trees on top of the cells and document
//! from `glint-core`:
//!
//! - [`Container`] maps names to component descriptors, templates and
//!   helpers; the [`DefinitionCache`] behind it hands out one
//!   [`Definition`] per `(descriptor, template)` pair.
//! - [`Renderer`] creates [`Instance`]s, fires their lifecycle hooks in
//!   order and keeps the DOM in sync. Cell writes only mark instances dirty;
//!   a flush re-renders them inside one transaction.
//! - [`bindings`] computes a component's root element attributes
//!   (`classNameBindings`, `attributeBindings`, `...attributes`).
//! - [`curry`] binds arguments to a component ahead of time.
//! - [`actions`] and [`events`] route actions up the target chain and DOM
//!   events up the element tree.
//! - [`Application`] ties the pieces together.
//!
//! ## Components
//!
//! A component is a descriptor plus an optional template:
//!
//! ```rust
//! use std::rc::Rc;
//!
//! use glint_runtime::prelude::*;
//!
//! let app = Application::new(RenderConfig::default());
//! app.register_component(
//!     "x-mood",
//!     ComponentDescriptor::builder("x-mood")
//!         .tag("span")
//!         .class_name_bindings(["isHappy:happy:sad"])
//!         .build(),
//! );
//! let mood = Rc::new(Record::new().with("happy", false));
//! let root = Template::new("application", |b| {
//!     let happy = b.get("happy");
//!     b.component("x-mood").arg("isHappy", happy).finish()
//! });
//! app.render(&root, Value::Object(mood.clone())).unwrap();
//! assert!(app.html().contains("sad"));
//!
//! app.run(|| mood.set("happy", true)).unwrap();
//! assert!(app.html().contains("happy"));
//! ```
//!
//! Behaviour comes from [`Fragment`]s: hooks, actions and event handlers.
//! Later fragments are more specific; an action handler can continue to the
//! next one with [`ActionContext::call_super`].

pub mod actions;
pub mod application;
pub mod bindings;
pub mod component;
pub mod config;
pub mod container;
pub mod curry;
pub mod definition;
pub mod events;
pub mod instance;
pub mod lifecycle;
pub mod prelude;
pub mod renderer;
pub mod template;
pub mod tests;
pub mod value;

pub use actions::{ActionContext, ActionHandler, ActionTarget, ClosureAction};
pub use application::Application;
pub use component::{ComponentBuilder, ComponentDescriptor, Fragment, PositionalParams};
pub use config::RenderConfig;
pub use container::Container;
pub use curry::{CurriedComponent, curry};
pub use definition::{Capabilities, CacheStats, Definition, DefinitionCache, DefinitionKind};
pub use events::{Event, EventDispatcher, Propagation};
pub use instance::{Attrs, Instance, InstanceId};
pub use lifecycle::{Hook, HookSet};
pub use renderer::{RenderStats, Renderer};
pub use template::{Builder, ElementBuilder, Invocable, InvocationBuilder, Template};
pub use value::{MutBinding, Proxy, Readable, Record, Value};
