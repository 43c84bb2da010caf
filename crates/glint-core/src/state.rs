use std::fmt;

/// Where a component instance is in its life.
///
/// `PreRender` is initial, `Destroyed` is terminal. An instance owns an
/// element exactly while it is `HasElement` or `InDom`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum LifecycleState {
    #[default]
    PreRender,
    HasElement,
    InDom,
    Destroying,
    Destroyed,
}

impl LifecycleState {
    pub fn has_element(self) -> bool {
        matches!(self, LifecycleState::HasElement | LifecycleState::InDom)
    }

    pub fn is_tearing_down(self) -> bool {
        matches!(self, LifecycleState::Destroying | LifecycleState::Destroyed)
    }

    /// Legal edges of the lifecycle state machine.
    pub fn can_transition_to(self, next: LifecycleState) -> bool {
        use LifecycleState::*;
        matches!(
            (self, next),
            (PreRender, HasElement)
                | (HasElement, InDom)
                | (InDom, InDom)
                | (PreRender | HasElement | InDom, Destroying)
                | (Destroying, Destroyed)
        )
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            LifecycleState::PreRender => "preRender",
            LifecycleState::HasElement => "hasElement",
            LifecycleState::InDom => "inDOM",
            LifecycleState::Destroying => "destroying",
            LifecycleState::Destroyed => "destroyed",
        };
        f.write_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::LifecycleState::*;

    #[test]
    fn destruction_is_one_way() {
        assert!(InDom.can_transition_to(Destroying));
        assert!(Destroying.can_transition_to(Destroyed));
        assert!(!Destroyed.can_transition_to(InDom));
        assert!(!Destroying.can_transition_to(InDom));
        assert!(!PreRender.can_transition_to(InDom));
    }

    #[test]
    fn element_window() {
        assert!(!PreRender.has_element());
        assert!(HasElement.has_element());
        assert!(InDom.has_element());
        assert!(!Destroying.has_element());
    }
}
