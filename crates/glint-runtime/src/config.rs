/// Renderer configuration.
///
/// `custom_events` maps a DOM event name to the component method that
/// handles it. `Some(method)` adds or renames an entry of the default table,
/// `None` stops the dispatcher from listening to that event.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(default)
)]
pub struct RenderConfig {
    /// `false` renders without element access and fires only
    /// `init`, `didReceiveAttrs` and `didUpdateAttrs`.
    pub interactive: bool,
    /// Class added to every tagged component's root element.
    pub component_class: Option<String>,
    /// Prefix of generated element ids (`glint12`).
    pub element_id_prefix: String,
    /// Upper bound on consecutive flushes in [`settle`](crate::Renderer::settle).
    pub max_settle_passes: usize,
    pub custom_events: Vec<(String, Option<String>)>,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            interactive: true,
            component_class: Some("glint-view".into()),
            element_id_prefix: "glint".into(),
            max_settle_passes: 10,
            custom_events: Vec::new(),
        }
    }
}

impl RenderConfig {
    pub fn non_interactive() -> Self {
        Self {
            interactive: false,
            ..Self::default()
        }
    }

    pub fn with_event(mut self, event: impl Into<String>, method: Option<&str>) -> Self {
        self.custom_events
            .push((event.into(), method.map(str::to_string)));
        self
    }
}
