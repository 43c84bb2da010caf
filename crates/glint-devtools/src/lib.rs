use std::cell::RefCell;
use std::collections::VecDeque;
use std::fmt::Write as _;
use std::rc::Rc;
use std::time::Duration;

use web_time::Instant;

use glint_core::Result;
use glint_runtime::{Application, Hook, Instance, InstanceId, Renderer};

/// One hook invocation seen by the inspector.
#[derive(Clone, Debug, PartialEq)]
pub struct HookEvent {
    pub component: String,
    pub id: InstanceId,
    pub hook: Hook,
    /// Time since the inspector was attached.
    pub at: Duration,
}

struct Timeline {
    started: Instant,
    events: VecDeque<HookEvent>,
    capacity: usize,
    dropped: u64,
}

impl Timeline {
    fn push(&mut self, instance: &Instance, hook: Hook) {
        if self.events.len() == self.capacity {
            self.events.pop_front();
            self.dropped += 1;
        }
        self.events.push_back(HookEvent {
            component: instance.name().to_string(),
            id: instance.id(),
            hook,
            at: self.started.elapsed(),
        });
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Metrics {
    pub elapsed_ms: f32,
    pub hooks: u64,
    pub dom_mutations: u64,
    pub flushes: u64,
    pub instances_created: u64,
    pub instances_destroyed: u64,
}

/// Records every lifecycle hook an application fires and times batches of
/// work. Detaches itself when dropped.
pub struct Inspector {
    renderer: Renderer,
    observer: usize,
    timeline: Rc<RefCell<Timeline>>,
    flush_ms_smooth: f32,
    pub metrics: Option<Metrics>,
}

impl Inspector {
    pub const DEFAULT_CAPACITY: usize = 4096;

    pub fn attach(app: &Application) -> Self {
        Self::with_capacity(app, Self::DEFAULT_CAPACITY)
    }

    /// Keeps at most `capacity` events; older ones are dropped first.
    pub fn with_capacity(app: &Application, capacity: usize) -> Self {
        let timeline = Rc::new(RefCell::new(Timeline {
            started: Instant::now(),
            events: VecDeque::new(),
            capacity: capacity.max(1),
            dropped: 0,
        }));
        let renderer = app.renderer().clone();
        let t = timeline.clone();
        let observer = renderer.add_hook_observer(move |instance, hook| {
            t.borrow_mut().push(instance, hook);
        });
        log::debug!("inspector attached (observer #{observer})");
        Self {
            renderer,
            observer,
            timeline,
            flush_ms_smooth: 0.0,
            metrics: None,
        }
    }

    pub fn timeline(&self) -> Vec<HookEvent> {
        self.timeline.borrow().events.iter().cloned().collect()
    }

    /// The timeline as `component:hook` strings.
    pub fn hook_log(&self) -> Vec<String> {
        self.timeline
            .borrow()
            .events
            .iter()
            .map(|e| format!("{}:{}", e.component, e.hook))
            .collect()
    }

    /// Events that fell off the front of a full timeline.
    pub fn dropped(&self) -> u64 {
        self.timeline.borrow().dropped
    }

    pub fn clear(&self) {
        let mut t = self.timeline.borrow_mut();
        t.events.clear();
        t.dropped = 0;
    }

    /// The live instance tree, one component per line:
    /// `<name#id> state #element-id`.
    pub fn outline(&self) -> String {
        let mut out = String::new();
        for root in self.renderer.roots() {
            self.write_instance(&root, 0, &mut out);
        }
        out
    }

    fn write_instance(&self, instance: &Instance, depth: usize, out: &mut String) {
        let _ = write!(out, "{:indent$}{} {}", "", instance.describe(), instance.state(), indent = depth * 2);
        let id = instance
            .element()
            .ok()
            .and_then(|el| self.renderer.with_document(|doc| doc.attribute(el, "id").map(str::to_string)));
        if let Some(id) = id {
            let _ = write!(out, " #{id}");
        }
        out.push('\n');
        for child in instance.child_views() {
            self.write_instance(&child, depth + 1, out);
        }
    }

    /// Runs `f` as one batch and reports what it cost, including the flushes
    /// it caused.
    pub fn measure<R>(&mut self, f: impl FnOnce() -> Result<R>) -> Result<(R, Metrics)> {
        let before = self.renderer.stats();
        let start = Instant::now();
        let value = self.renderer.batch(f)?;
        let elapsed_ms = start.elapsed().as_secs_f32() * 1000.0;
        let after = self.renderer.stats();

        // simple EMA
        let a = 0.2;
        self.flush_ms_smooth = if self.flush_ms_smooth == 0.0 {
            elapsed_ms
        } else {
            (1.0 - a) * self.flush_ms_smooth + a * elapsed_ms
        };
        let metrics = Metrics {
            elapsed_ms,
            hooks: after.hooks_fired - before.hooks_fired,
            dom_mutations: after.dom_mutations - before.dom_mutations,
            flushes: after.flushes - before.flushes,
            instances_created: after.instances_created - before.instances_created,
            instances_destroyed: after.instances_destroyed - before.instances_destroyed,
        };
        log::debug!(
            "measured {:.2} ms: {} hooks, {} mutations",
            metrics.elapsed_ms,
            metrics.hooks,
            metrics.dom_mutations
        );
        self.metrics = Some(metrics.clone());
        Ok((value, metrics))
    }

    /// Smoothed duration of measured batches.
    pub fn average_ms(&self) -> f32 {
        self.flush_ms_smooth
    }
}

impl Drop for Inspector {
    fn drop(&mut self) {
        self.renderer.remove_hook_observer(self.observer);
    }
}
