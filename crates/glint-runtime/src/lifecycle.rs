use std::fmt;

use bitflags::bitflags;

/// Component lifecycle hooks, in the order a full create/update/destroy
/// cycle can fire them.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Hook {
    Init,
    DidReceiveAttrs,
    DidUpdateAttrs,
    WillRender,
    WillInsertElement,
    DidInsertElement,
    WillUpdate,
    DidUpdate,
    DidRender,
    WillDestroyElement,
    WillClearRender,
    DidDestroyElement,
    WillDestroy,
}

bitflags! {
    /// Which hooks a definition implements. Computed once per definition so
    /// the renderer can skip hooks nobody listens to.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct HookSet: u16 {
        const INIT = 1 << 0;
        const DID_RECEIVE_ATTRS = 1 << 1;
        const DID_UPDATE_ATTRS = 1 << 2;
        const WILL_RENDER = 1 << 3;
        const WILL_INSERT_ELEMENT = 1 << 4;
        const DID_INSERT_ELEMENT = 1 << 5;
        const WILL_UPDATE = 1 << 6;
        const DID_UPDATE = 1 << 7;
        const DID_RENDER = 1 << 8;
        const WILL_DESTROY_ELEMENT = 1 << 9;
        const WILL_CLEAR_RENDER = 1 << 10;
        const DID_DESTROY_ELEMENT = 1 << 11;
        const WILL_DESTROY = 1 << 12;
    }
}

impl Hook {
    pub const ALL: [Hook; 13] = [
        Hook::Init,
        Hook::DidReceiveAttrs,
        Hook::DidUpdateAttrs,
        Hook::WillRender,
        Hook::WillInsertElement,
        Hook::DidInsertElement,
        Hook::WillUpdate,
        Hook::DidUpdate,
        Hook::DidRender,
        Hook::WillDestroyElement,
        Hook::WillClearRender,
        Hook::DidDestroyElement,
        Hook::WillDestroy,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Hook::Init => "init",
            Hook::DidReceiveAttrs => "didReceiveAttrs",
            Hook::DidUpdateAttrs => "didUpdateAttrs",
            Hook::WillRender => "willRender",
            Hook::WillInsertElement => "willInsertElement",
            Hook::DidInsertElement => "didInsertElement",
            Hook::WillUpdate => "willUpdate",
            Hook::DidUpdate => "didUpdate",
            Hook::DidRender => "didRender",
            Hook::WillDestroyElement => "willDestroyElement",
            Hook::WillClearRender => "willClearRender",
            Hook::DidDestroyElement => "didDestroyElement",
            Hook::WillDestroy => "willDestroy",
        }
    }

    pub fn flag(self) -> HookSet {
        HookSet::from_bits_truncate(1 << self as u16)
    }

    /// Hooks that still fire when rendering without a live DOM.
    pub fn fires_non_interactive(self) -> bool {
        matches!(
            self,
            Hook::Init | Hook::DidReceiveAttrs | Hook::DidUpdateAttrs
        )
    }
}

impl fmt::Display for Hook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl HookSet {
    pub fn hooks(self) -> impl Iterator<Item = Hook> {
        Hook::ALL.into_iter().filter(move |h| self.contains(h.flag()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_line_up_with_variants() {
        assert_eq!(Hook::Init.flag(), HookSet::INIT);
        assert_eq!(Hook::DidRender.flag(), HookSet::DID_RENDER);
        assert_eq!(Hook::WillDestroy.flag(), HookSet::WILL_DESTROY);
        let set = HookSet::INIT | HookSet::WILL_DESTROY;
        assert_eq!(set.hooks().collect::<Vec<_>>(), [Hook::Init, Hook::WillDestroy]);
    }
}
