use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;

use smallvec::SmallVec;

use crate::definition::Definition;
use crate::instance::Attrs;
use crate::value::Value;

/// A component definition with some arguments already bound.
///
/// Immutable; compared by identity. Invoking it merges the invocation's
/// arguments on top of the bound ones.
#[derive(Clone)]
pub struct CurriedComponent(Rc<CurriedInner>);

struct CurriedInner {
    definition: Rc<Definition>,
    positional: SmallVec<[Value; 4]>,
    named: BTreeMap<String, Value>,
}

/// What can be curried: a definition or an already curried component.
pub enum CurryBase {
    Definition(Rc<Definition>),
    Curried(CurriedComponent),
}

impl From<Rc<Definition>> for CurryBase {
    fn from(d: Rc<Definition>) -> Self {
        CurryBase::Definition(d)
    }
}

impl From<CurriedComponent> for CurryBase {
    fn from(c: CurriedComponent) -> Self {
        CurryBase::Curried(c)
    }
}

impl From<&CurriedComponent> for CurryBase {
    fn from(c: &CurriedComponent) -> Self {
        CurryBase::Curried(c.clone())
    }
}

/// Binds `positional` and `named` to `base`.
///
/// Currying a curried component layers: positional args are appended only
/// when some are given, named args are merged and the newer value wins.
pub fn curry(
    base: impl Into<CurryBase>,
    positional: Vec<Value>,
    named: Vec<(String, Value)>,
) -> CurriedComponent {
    let (definition, mut bound_positional, mut bound_named) = match base.into() {
        CurryBase::Definition(d) => (d, SmallVec::new(), BTreeMap::new()),
        CurryBase::Curried(c) => (
            c.0.definition.clone(),
            c.0.positional.clone(),
            c.0.named.clone(),
        ),
    };
    if !positional.is_empty() {
        bound_positional.extend(positional);
    }
    bound_named.extend(named);
    CurriedComponent(Rc::new(CurriedInner {
        definition,
        positional: bound_positional,
        named: bound_named,
    }))
}

impl CurriedComponent {
    pub fn definition(&self) -> &Rc<Definition> {
        &self.0.definition
    }

    pub fn positional(&self) -> &[Value] {
        &self.0.positional
    }

    pub fn named(&self) -> &BTreeMap<String, Value> {
        &self.0.named
    }

    pub fn with_args(&self, positional: Vec<Value>, named: Vec<(String, Value)>) -> Self {
        curry(self, positional, named)
    }

    /// Arguments of an invocation of this value. Bound `mut` args are
    /// re-read so the invoking render tracks them.
    pub(crate) fn merged(&self, positional: Vec<Value>, named: Vec<(String, Value)>) -> Attrs {
        let mut attrs = Attrs::default();
        attrs
            .positional
            .extend(self.0.positional.iter().map(Value::refreshed));
        attrs.positional.extend(positional);
        for (k, v) in &self.0.named {
            attrs.named.insert(k.clone(), v.refreshed());
        }
        attrs.named.extend(named);
        attrs
    }
}

impl PartialEq for CurriedComponent {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for CurriedComponent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CurriedComponent")
            .field("definition", &self.0.definition.name())
            .field("positional", &self.0.positional)
            .field("named", &self.0.named)
            .finish()
    }
}
