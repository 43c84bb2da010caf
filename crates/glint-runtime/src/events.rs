//! DOM event delegation.
//!
//! One dispatcher per application listens at a root element. An event is
//! walked from its target up through the DOM ancestry: at each node the
//! element's action modifiers run first, then the handler method of the
//! component whose root element it is.

use std::cell::Cell as StdCell;
use std::collections::BTreeMap;

use glint_core::{Error, NodeId, Result};

use crate::renderer::Renderer;

/// Event type -> component method name.
const DEFAULT_EVENTS: &[(&str, &str)] = &[
    ("touchstart", "touchStart"),
    ("touchmove", "touchMove"),
    ("touchend", "touchEnd"),
    ("touchcancel", "touchCancel"),
    ("keydown", "keyDown"),
    ("keyup", "keyUp"),
    ("keypress", "keyPress"),
    ("mousedown", "mouseDown"),
    ("mouseup", "mouseUp"),
    ("contextmenu", "contextMenu"),
    ("click", "click"),
    ("dblclick", "doubleClick"),
    ("focusin", "focusIn"),
    ("focusout", "focusOut"),
    ("submit", "submit"),
    ("input", "input"),
    ("change", "change"),
    ("dragstart", "dragStart"),
    ("drag", "drag"),
    ("dragenter", "dragEnter"),
    ("dragleave", "dragLeave"),
    ("dragover", "dragOver"),
    ("drop", "drop"),
    ("dragend", "dragEnd"),
];

/// What a handler returns: keep bubbling or stop here.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Propagation {
    Continue,
    Stop,
}

#[derive(Clone, Debug)]
pub struct Event {
    kind: String,
    target: NodeId,
    current_target: NodeId,
    propagation_stopped: bool,
    default_prevented: bool,
    handled: bool,
}

impl Event {
    fn new(kind: &str, target: NodeId) -> Self {
        Self {
            kind: kind.to_string(),
            target,
            current_target: target,
            propagation_stopped: false,
            default_prevented: false,
            handled: false,
        }
    }

    pub fn kind(&self) -> &str {
        &self.kind
    }

    pub fn target(&self) -> NodeId {
        self.target
    }

    /// The node whose handlers are running.
    pub fn current_target(&self) -> NodeId {
        self.current_target
    }

    pub fn stop_propagation(&mut self) {
        self.propagation_stopped = true;
    }

    pub fn prevent_default(&mut self) {
        self.default_prevented = true;
    }

    pub fn is_propagation_stopped(&self) -> bool {
        self.propagation_stopped
    }

    pub fn is_default_prevented(&self) -> bool {
        self.default_prevented
    }

    /// Whether any modifier or component handler saw the event.
    pub fn was_handled(&self) -> bool {
        self.handled
    }
}

pub struct EventDispatcher {
    renderer: Renderer,
    methods: BTreeMap<String, String>,
    root: StdCell<Option<NodeId>>,
}

impl EventDispatcher {
    /// The default event map with the renderer's `custom_events` applied:
    /// `Some(method)` adds or renames, `None` stops listening.
    pub fn new(renderer: &Renderer) -> Self {
        let mut methods: BTreeMap<String, String> = DEFAULT_EVENTS
            .iter()
            .map(|(event, method)| (event.to_string(), method.to_string()))
            .collect();
        for (event, method) in &renderer.config().custom_events {
            match method {
                Some(method) => {
                    methods.insert(event.clone(), method.clone());
                }
                None => {
                    methods.remove(event);
                }
            }
        }
        Self {
            renderer: renderer.clone(),
            methods,
            root: StdCell::new(None),
        }
    }

    /// Starts listening at `root`.
    pub fn setup(&self, root: NodeId) -> Result<()> {
        if !self.renderer.config().interactive {
            return Err(Error::assertion(
                "event dispatch needs an interactive renderer",
            ));
        }
        if !self.renderer.with_document(|doc| doc.contains(root)) {
            return Err(Error::assertion("event root is not in the document"));
        }
        self.root.set(Some(root));
        log::debug!("event dispatcher listening for {} events", self.methods.len());
        Ok(())
    }

    pub fn root(&self) -> Option<NodeId> {
        self.root.get()
    }

    pub fn method_for(&self, event: &str) -> Option<&str> {
        self.methods.get(event).map(String::as_str)
    }

    pub fn events(&self) -> impl Iterator<Item = (&str, &str)> {
        self.methods.iter().map(|(e, m)| (e.as_str(), m.as_str()))
    }

    /// Delivers an event of type `kind` at `target`. Handlers run in one
    /// batch, so whatever they write renders once afterwards.
    pub fn dispatch(&self, kind: &str, target: NodeId) -> Result<Event> {
        if kind.is_empty() {
            return Err(Error::assertion("cannot dispatch an event without a type"));
        }
        let root = self
            .root
            .get()
            .ok_or_else(|| Error::assertion("event dispatcher has not been set up"))?;
        let mut event = Event::new(kind, target);
        let Some(method) = self.methods.get(kind) else {
            log::trace!("ignoring `{kind}`: not in the event map");
            return Ok(event);
        };
        let path: Vec<NodeId> = self.renderer.with_document(|doc| doc.ancestors(target));
        let Some(depth) = path.iter().position(|n| *n == root) else {
            log::trace!("ignoring `{kind}`: target is outside the root");
            return Ok(event);
        };

        self.renderer.batch(|| {
            for node in &path[..=depth] {
                event.current_target = *node;
                for modifier in self.renderer.actions_for(*node) {
                    if modifier.event != kind {
                        continue;
                    }
                    event.handled = true;
                    if modifier.prevent_default {
                        event.prevent_default();
                    }
                    if !modifier.bubbles {
                        event.stop_propagation();
                    }
                    modifier.fire()?;
                }
                if event.propagation_stopped {
                    break;
                }
                let Some(instance) = self.renderer.instance_for_element(*node) else {
                    continue;
                };
                let handler = instance
                    .definition()
                    .descriptor()
                    .and_then(|d| d.event_handler(method));
                if let Some(handler) = handler {
                    event.handled = true;
                    log::trace!("{} {method}", instance.describe());
                    if handler(&instance, &mut event)? == Propagation::Stop {
                        event.stop_propagation();
                    }
                }
                if event.propagation_stopped {
                    break;
                }
            }
            Ok(())
        })?;
        Ok(event)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::rc::Rc;

    use crate::config::RenderConfig;
    use crate::container::Container;

    #[test]
    fn custom_events_rename_and_disable() {
        let config = RenderConfig::default()
            .with_event("dblclick", Some("dblClick"))
            .with_event("drop", None)
            .with_event("paste", Some("paste"));
        let renderer = Renderer::new(config, Rc::new(Container::new()));
        let events = EventDispatcher::new(&renderer);
        assert_eq!(events.method_for("dblclick"), Some("dblClick"));
        assert_eq!(events.method_for("drop"), None);
        assert_eq!(events.method_for("paste"), Some("paste"));
        assert_eq!(events.method_for("click"), Some("click"));
    }

    #[test]
    fn setup_and_dispatch_preconditions() {
        let renderer = Renderer::new(RenderConfig::non_interactive(), Rc::new(Container::new()));
        let events = EventDispatcher::new(&renderer);
        assert!(matches!(events.setup(renderer.body()), Err(Error::Assertion(_))));

        let renderer = Renderer::new(RenderConfig::default(), Rc::new(Container::new()));
        let events = EventDispatcher::new(&renderer);
        let body = renderer.body();
        assert!(matches!(events.dispatch("click", body), Err(Error::Assertion(_))));
        events.setup(body).unwrap();
        assert!(matches!(events.dispatch("", body), Err(Error::Assertion(_))));
        let event = events.dispatch("click", body).unwrap();
        assert!(!event.was_handled());
    }
}
