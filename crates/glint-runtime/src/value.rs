//! Values flowing through templates.
//!
//! Everything a template reads or passes as an argument is a [`Value`].
//! Objects are anything implementing [`Readable`]; [`Record`] is the stock
//! cell-backed implementation and [`Proxy`] forwards unknown keys to its
//! content (looked up again on every read).

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;

use glint_core::{Cell, Error, Result};

use crate::actions::ClosureAction;
use crate::curry::CurriedComponent;

#[derive(Clone, Default)]
pub enum Value {
    #[default]
    Undefined,
    Null,
    Bool(bool),
    Int(i64),
    Str(Rc<str>),
    /// String the caller vouches for; never sanitized.
    Safe(Rc<str>),
    List(Rc<[Value]>),
    Object(Rc<dyn Readable>),
    Component(CurriedComponent),
    Action(ClosureAction),
    Mut(MutBinding),
}

/// Keyed read access used by path lookups.
pub trait Readable {
    /// Own property `key`, or `None` when this object does not define it.
    fn read(&self, key: &str) -> Option<Value>;

    /// Wrapped content that unknown keys are forwarded to.
    fn content(&self) -> Option<Value> {
        None
    }

    fn describe(&self) -> String {
        "object".into()
    }

    /// Cell behind `key`, for objects that can hand out `mut` bindings.
    fn binding_cell(&self, _key: &str) -> Option<Cell<Value>> {
        None
    }
}

impl Value {
    pub fn str(s: impl AsRef<str>) -> Value {
        Value::Str(Rc::from(s.as_ref()))
    }

    pub fn safe(s: impl AsRef<str>) -> Value {
        Value::Safe(Rc::from(s.as_ref()))
    }

    pub fn list(items: impl IntoIterator<Item = Value>) -> Value {
        Value::List(items.into_iter().collect())
    }

    pub fn object(o: impl Readable + 'static) -> Value {
        Value::Object(Rc::new(o))
    }

    /// `mut` binding over `cell`. Reads the cell, so it is tracked.
    pub fn mutable(cell: &Cell<Value>) -> Value {
        Value::Mut(MutBinding::new(cell.clone()))
    }

    /// JS-style truthiness, with empty lists falsy as well.
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Undefined | Value::Null => false,
            Value::Bool(b) => *b,
            Value::Int(i) => *i != 0,
            Value::Str(s) | Value::Safe(s) => !s.is_empty(),
            Value::List(items) => !items.is_empty(),
            Value::Mut(m) => m.value().is_truthy(),
            Value::Object(_) | Value::Component(_) | Value::Action(_) => true,
        }
    }

    pub fn is_nullish(&self) -> bool {
        matches!(self.resolved(), Value::Undefined | Value::Null)
    }

    /// The value behind a `mut` binding, or `self`.
    pub fn resolved(&self) -> &Value {
        match self {
            Value::Mut(m) => m.value(),
            other => other,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self.resolved() {
            Value::Str(s) | Value::Safe(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self.resolved() {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self.resolved() {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn is_safe(&self) -> bool {
        matches!(self.resolved(), Value::Safe(_))
    }

    /// One path segment. Objects are asked first; when they do not define
    /// `key`, their content (if any) is asked next, and so on.
    pub fn get(&self, key: &str) -> Value {
        match self.resolved() {
            Value::Object(o) => {
                let mut cur = o.clone();
                loop {
                    if let Some(v) = cur.read(key) {
                        return v;
                    }
                    match cur.content() {
                        Some(Value::Object(next)) => cur = next,
                        Some(other) => return other.get(key),
                        None => return Value::Undefined,
                    }
                }
            }
            Value::List(items) => match key {
                "length" => Value::Int(items.len() as i64),
                "firstObject" => items.first().cloned().unwrap_or_default(),
                "lastObject" => items.last().cloned().unwrap_or_default(),
                _ => key
                    .parse::<usize>()
                    .ok()
                    .and_then(|i| items.get(i).cloned())
                    .unwrap_or_default(),
            },
            Value::Str(s) | Value::Safe(s) if key == "length" => {
                Value::Int(s.chars().count() as i64)
            }
            _ => Value::Undefined,
        }
    }

    /// Dotted path lookup (`"user.name.first"`).
    pub fn get_path(&self, path: &str) -> Value {
        path.split('.')
            .filter(|s| !s.is_empty())
            .fold(self.clone(), |v, seg| v.get(seg))
    }

    /// Re-reads any `mut` binding so the current computation tracks it.
    pub(crate) fn refreshed(&self) -> Value {
        match self {
            Value::Mut(m) => Value::Mut(m.refresh()),
            other => other.clone(),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Undefined, Value::Undefined) | (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Str(a), Value::Str(b)) | (Value::Safe(a), Value::Safe(b)) => a == b,
            (Value::List(a), Value::List(b)) => Rc::ptr_eq(a, b) || a == b,
            (Value::Object(a), Value::Object(b)) => Rc::ptr_eq(a, b),
            (Value::Component(a), Value::Component(b)) => a == b,
            (Value::Action(a), Value::Action(b)) => a == b,
            (Value::Mut(a), Value::Mut(b)) => a == b,
            _ => false,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Undefined | Value::Null => Ok(()),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(i) => write!(f, "{i}"),
            Value::Str(s) | Value::Safe(s) => f.write_str(s),
            Value::List(items) => {
                for (i, v) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(",")?;
                    }
                    write!(f, "{v}")?;
                }
                Ok(())
            }
            Value::Object(o) => write!(f, "[{}]", o.describe()),
            Value::Component(c) => write!(f, "[component {}]", c.definition().name()),
            Value::Action(_) => f.write_str("[action]"),
            Value::Mut(m) => write!(f, "{}", m.value()),
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Undefined => f.write_str("Undefined"),
            Value::Null => f.write_str("Null"),
            Value::Bool(b) => write!(f, "Bool({b})"),
            Value::Int(i) => write!(f, "Int({i})"),
            Value::Str(s) => write!(f, "Str({s:?})"),
            Value::Safe(s) => write!(f, "Safe({s:?})"),
            Value::List(items) => f.debug_list().entries(items.iter()).finish(),
            Value::Object(o) => write!(f, "Object({})", o.describe()),
            Value::Component(c) => write!(f, "Component({})", c.definition().name()),
            Value::Action(_) => f.write_str("Action"),
            Value::Mut(m) => write!(f, "Mut({:?})", m.value()),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::str(s)
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(Rc::from(s))
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Value::Int(i as i64)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::List(items.into())
    }
}

impl From<Record> for Value {
    fn from(record: Record) -> Self {
        Value::object(record)
    }
}

impl From<CurriedComponent> for Value {
    fn from(c: CurriedComponent) -> Self {
        Value::Component(c)
    }
}

impl From<ClosureAction> for Value {
    fn from(a: ClosureAction) -> Self {
        Value::Action(a)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Value::Null)
    }
}

/// Two-way binding: the value read at render time plus the cell it came from.
#[derive(Clone)]
pub struct MutBinding {
    cell: Cell<Value>,
    snapshot: Rc<Value>,
}

impl MutBinding {
    pub fn new(cell: Cell<Value>) -> Self {
        let snapshot = Rc::new(cell.get());
        Self { cell, snapshot }
    }

    pub fn value(&self) -> &Value {
        &self.snapshot
    }

    pub fn cell(&self) -> &Cell<Value> {
        &self.cell
    }

    pub fn refresh(&self) -> MutBinding {
        MutBinding::new(self.cell.clone())
    }

    /// Writes upstream.
    pub fn update(&self, value: Value) -> Result<()> {
        self.cell.set(value)
    }
}

impl PartialEq for MutBinding {
    fn eq(&self, other: &Self) -> bool {
        self.cell.ptr_eq(&other.cell) && self.snapshot == other.snapshot
    }
}

/// Object whose properties are cells, created on first access.
///
/// Reading a missing key still allocates its cell so the reader is notified
/// when the key is assigned later.
#[derive(Default)]
pub struct Record {
    name: String,
    fields: RefCell<BTreeMap<String, Cell<Value>>>,
}

impl Record {
    pub fn new() -> Self {
        Self::named("object")
    }

    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fields: RefCell::new(BTreeMap::new()),
        }
    }

    pub fn with(self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields
            .borrow_mut()
            .insert(key.into(), Cell::new(value.into()));
        self
    }

    pub fn cell(&self, key: &str) -> Cell<Value> {
        self.fields
            .borrow_mut()
            .entry(key.to_string())
            .or_insert_with(|| Cell::new(Value::Undefined))
            .clone()
    }

    pub fn get(&self, key: &str) -> Value {
        self.cell(key).get()
    }

    pub fn set(&self, key: &str, value: impl Into<Value>) -> Result<()> {
        self.cell(key).set(value.into())
    }

    /// `mut` binding to `key`.
    pub fn bind(&self, key: &str) -> Value {
        Value::mutable(&self.cell(key))
    }

    pub fn keys(&self) -> Vec<String> {
        self.fields.borrow().keys().cloned().collect()
    }

    /// Rejects further writes (used when the record's owner goes away).
    pub fn retire(&self) {
        for c in self.fields.borrow().values() {
            c.retire();
        }
    }
}

impl Readable for Record {
    fn read(&self, key: &str) -> Option<Value> {
        match self.get(key) {
            Value::Undefined => None,
            v => Some(v),
        }
    }

    fn describe(&self) -> String {
        self.name.clone()
    }

    fn binding_cell(&self, key: &str) -> Option<Cell<Value>> {
        Some(self.cell(key))
    }
}

/// Forwards keys it does not define itself to a swappable content value.
pub struct Proxy {
    content: Cell<Value>,
    own: Record,
}

impl Proxy {
    pub fn new(content: impl Into<Value>) -> Self {
        Self {
            content: Cell::new(content.into()),
            own: Record::named("proxy"),
        }
    }

    pub fn set_content(&self, content: impl Into<Value>) -> Result<()> {
        self.content.set(content.into())
    }

    pub fn own(&self) -> &Record {
        &self.own
    }
}

impl Readable for Proxy {
    fn read(&self, key: &str) -> Option<Value> {
        self.own.read(key)
    }

    fn content(&self) -> Option<Value> {
        Some(self.content.get())
    }

    fn describe(&self) -> String {
        "proxy".into()
    }
}

/// `Error::Assertion` unless `value` is a `mut` binding.
pub(crate) fn expect_mut<'a>(value: &'a Value, what: &str) -> Result<&'a MutBinding> {
    match value {
        Value::Mut(m) => Ok(m),
        other => Err(Error::assertion(format!(
            "{what} expects a `mut` binding, got {other:?}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glint_core::{dependencies, new_observer, remove_observer, track};

    #[test]
    fn truthiness_matches_template_conditionals() {
        for falsy in [
            Value::Undefined,
            Value::Null,
            false.into(),
            0.into(),
            "".into(),
            Value::list([]),
        ] {
            assert!(!falsy.is_truthy(), "{falsy:?}");
        }
        assert!(Value::from("0").is_truthy());
        assert!(Value::list([Value::Null]).is_truthy());
    }

    #[test]
    fn proxy_lookups_follow_replaced_content() {
        let first = Record::named("first").with("name", "Tom");
        let second = Record::named("second").with("name", "Yehuda");
        let proxy = Rc::new(Proxy::new(Value::object(first)));
        let value = Value::Object(proxy.clone());

        assert_eq!(value.get("name"), Value::from("Tom"));
        proxy.set_content(Value::object(second)).unwrap();
        assert_eq!(value.get("name"), Value::from("Yehuda"));

        // own keys shadow the content
        proxy.own().set("name", "Kris").unwrap();
        assert_eq!(value.get_path("name"), Value::from("Kris"));
    }

    #[test]
    fn missing_keys_are_still_tracked() {
        let record = Rc::new(Record::new());
        let value = Value::Object(record.clone());
        let obs = new_observer(|| {});
        track(obs, || value.get("later"));
        assert_eq!(dependencies(obs).len(), 1);
        remove_observer(obs);
    }

    #[test]
    fn list_paths() {
        let list = Value::list(["a".into(), "b".into()]);
        assert_eq!(list.get("length"), Value::Int(2));
        assert_eq!(list.get_path("1"), Value::from("b"));
        assert_eq!(list.get("lastObject"), Value::from("b"));
        assert_eq!(list.to_string(), "a,b");
    }

    #[test]
    fn mut_bindings_write_upstream() {
        let record = Record::new().with("name", "tomdale");
        let binding = record.bind("name");
        let m = expect_mut(&binding, "test").unwrap();
        m.update("wycats".into()).unwrap();
        assert_eq!(record.get("name"), Value::from("wycats"));
        assert_eq!(m.refresh().value(), &Value::from("wycats"));
        assert!(expect_mut(&Value::from("x"), "test").is_err());
    }
}
