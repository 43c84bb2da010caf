pub use glint_core::{Cell, Error, LifecycleState, NodeId, Result, cell};

pub use crate::actions::{ActionContext, ActionHandler, ActionTarget, ClosureAction};
pub use crate::application::Application;
pub use crate::component::{ComponentDescriptor, Fragment, PositionalParams};
pub use crate::config::RenderConfig;
pub use crate::curry::{CurriedComponent, curry};
pub use crate::events::{Event, Propagation};
pub use crate::instance::{Attrs, Instance};
pub use crate::lifecycle::{Hook, HookSet};
pub use crate::renderer::{RenderStats, Renderer};
pub use crate::template::{Builder, Template};
pub use crate::value::{Proxy, Readable, Record, Value};
