//! Attribute and class binding.
//!
//! Two sources feed an element's attributes: the element's own parts
//! (static or bound) and the attributes forwarded to the enclosing component
//! through `...attributes`. Source order relative to the splat marker
//! decides: whatever comes later wins. `class` is the exception and
//! concatenates every contribution.

use glint_core::{Error, Result};

use crate::config::RenderConfig;
use crate::instance::Instance;
use crate::value::Value;

/// One piece of an element's attribute list.
#[derive(Clone, Debug, PartialEq)]
pub enum AttrPart {
    Static(String, String),
    Bound(String, Value),
    /// `...attributes`
    Splat,
}

const URL_ATTRIBUTES: [&str; 4] = ["href", "src", "background", "action"];
const UNSAFE_PROTOCOLS: [&str; 2] = ["javascript:", "vbscript:"];

/// Prefixes `javascript:`/`vbscript:` URLs in URL-valued attributes with
/// `unsafe:`. Values marked safe are left alone.
pub fn sanitize(attribute: &str, value: &Value, rendered: String) -> String {
    if value.is_safe() || !URL_ATTRIBUTES.contains(&attribute) {
        return rendered;
    }
    let probe = rendered.trim_start().to_ascii_lowercase();
    if UNSAFE_PROTOCOLS.iter().any(|p| probe.starts_with(p)) {
        log::warn!("sanitized `{attribute}` value `{rendered}`");
        format!("unsafe:{rendered}")
    } else {
        rendered
    }
}

/// Rendered form of a bound attribute value; `None` means "absent".
pub fn attribute_value(attribute: &str, value: &Value) -> Option<String> {
    match value.resolved() {
        Value::Undefined | Value::Null | Value::Bool(false) => None,
        Value::Bool(true) => Some(String::new()),
        v => Some(sanitize(attribute, v, v.to_string())),
    }
}

/// `isUrgent` -> `is-urgent`, `foo_bar` -> `foo-bar`.
pub fn dasherize(name: &str) -> String {
    let mut out = String::with_capacity(name.len() + 4);
    for (i, ch) in name.chars().enumerate() {
        if ch.is_ascii_uppercase() {
            if i > 0 {
                out.push('-');
            }
            out.push(ch.to_ascii_lowercase());
        } else if ch == '_' || ch == ' ' {
            out.push('-');
        } else {
            out.push(ch);
        }
    }
    out
}

#[derive(Default)]
struct Merged {
    attrs: Vec<(String, String)>,
    classes: Vec<String>,
}

impl Merged {
    fn apply(&mut self, name: &str, value: Option<String>) {
        if name == "class" {
            if !self.attrs.iter().any(|(n, _)| n == "class") {
                self.attrs.push(("class".into(), String::new()));
            }
            if let Some(v) = value.filter(|v| !v.is_empty()) {
                self.classes.push(v);
            }
            return;
        }
        let slot = self.attrs.iter().position(|(n, _)| n == name);
        match (slot, value) {
            (Some(i), Some(v)) => self.attrs[i].1 = v,
            (None, Some(v)) => self.attrs.push((name.to_string(), v)),
            (Some(i), None) => {
                self.attrs.remove(i);
            }
            (None, None) => {}
        }
    }

    fn finish(mut self) -> Vec<(String, String)> {
        let class = self.classes.join(" ");
        if class.is_empty() {
            self.attrs.retain(|(n, _)| n != "class");
        } else if let Some(slot) = self.attrs.iter_mut().find(|(n, _)| n == "class") {
            slot.1 = class;
        }
        self.attrs
    }
}

/// Resolves `parts` against the attributes forwarded to the current
/// component. Each attribute keeps the position of its first appearance.
pub fn merge_attributes(parts: &[AttrPart], forwarded: &[(String, String)]) -> Vec<(String, String)> {
    let mut merged = Merged::default();
    for part in parts {
        match part {
            AttrPart::Static(name, value) => merged.apply(name, Some(value.clone())),
            AttrPart::Bound(name, value) => merged.apply(name, attribute_value(name, value)),
            AttrPart::Splat => {
                for (name, value) in forwarded {
                    merged.apply(name, Some(value.clone()));
                }
            }
        }
    }
    merged.finish()
}

/// Parsed `classNameBindings` entry.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClassNameBinding {
    /// Empty for a static `":class"` entry.
    pub property: String,
    pub truthy: Option<String>,
    pub falsy: Option<String>,
    explicit: bool,
}

impl ClassNameBinding {
    pub fn parse(spec: &str) -> Result<Self> {
        let parts: Vec<&str> = spec.split(':').collect();
        if spec.trim().is_empty() || parts.len() > 3 || spec.contains(char::is_whitespace) {
            return Err(Error::InvalidBinding(format!(
                "`{spec}` is not a valid classNameBinding"
            )));
        }
        let property = parts[0].to_string();
        let named = |s: Option<&&str>| s.filter(|s| !s.is_empty()).map(|s| s.to_string());
        let truthy = named(parts.get(1));
        let falsy = named(parts.get(2));
        if property.is_empty() && (truthy.is_none() || falsy.is_some()) {
            return Err(Error::InvalidBinding(format!(
                "`{spec}`: a static classNameBinding is written `:class-name`"
            )));
        }
        Ok(Self {
            explicit: parts.len() > 1,
            property,
            truthy,
            falsy,
        })
    }

    pub fn is_static(&self) -> bool {
        self.property.is_empty()
    }

    /// Class contributed for the bound property's current `value`.
    ///
    /// Without explicit class names, `true` yields the dasherized property
    /// name and a string yields itself.
    pub fn class_for(&self, value: &Value) -> Option<String> {
        if self.is_static() {
            return self.truthy.clone();
        }
        match value.resolved() {
            Value::Str(s) | Value::Safe(s) if !self.explicit && !s.is_empty() => {
                Some(s.to_string())
            }
            v if v.is_truthy() => {
                if self.explicit {
                    self.truthy.clone()
                } else {
                    let last = self.property.rsplit('.').next().unwrap_or(&self.property);
                    Some(dasherize(last))
                }
            }
            _ => self.falsy.clone(),
        }
    }
}

/// Parsed `attributeBindings` entry.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AttributeBinding {
    pub property: String,
    pub attribute: String,
}

impl AttributeBinding {
    pub fn parse(spec: &str) -> Result<Self> {
        let (property, attribute) = match spec.split_once(':') {
            Some((p, a)) => (p, a),
            None => (spec, spec.strip_prefix("attrs.").unwrap_or(spec)),
        };
        let invalid =
            |why: &str| -> Result<Self> { Err(Error::InvalidBinding(format!("`{spec}`: {why}"))) };
        if property.is_empty() || attribute.is_empty() || attribute.contains(':') {
            return invalid("expected `property` or `property:attribute`");
        }
        let nested = property
            .strip_prefix("attrs.")
            .unwrap_or(property)
            .contains('.');
        if nested {
            return invalid("nested paths cannot be bound to attributes");
        }
        if attribute.contains('.') {
            return invalid("attribute names cannot contain `.`");
        }
        if attribute == "class" {
            return invalid("use classNameBindings to bind `class`");
        }
        Ok(Self {
            property: property.to_string(),
            attribute: attribute.to_string(),
        })
    }

    fn read(&self, instance: &Instance) -> Value {
        match self.property.strip_prefix("attrs.") {
            Some(attr) => instance.attr(attr),
            None => instance.get(&self.property),
        }
    }
}

/// Bindings of one component definition, parsed and checked.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ComponentBindings {
    pub element_id: Option<String>,
    pub class_names: Vec<String>,
    pub class_name_bindings: Vec<ClassNameBinding>,
    pub attribute_bindings: Vec<AttributeBinding>,
}

impl ComponentBindings {
    pub fn parse(
        element_id: Option<&str>,
        class_names: &[String],
        class_name_bindings: &[String],
        attribute_bindings: &[String],
    ) -> Result<Self> {
        let class_name_bindings = class_name_bindings
            .iter()
            .map(|s| ClassNameBinding::parse(s))
            .collect::<Result<Vec<_>>>()?;
        let attribute_bindings = attribute_bindings
            .iter()
            .map(|s| AttributeBinding::parse(s))
            .collect::<Result<Vec<_>>>()?;
        if element_id.is_some() && attribute_bindings.iter().any(|b| b.attribute == "id") {
            return Err(Error::InvalidBinding(
                "`id` cannot be bound when the component declares an elementId".into(),
            ));
        }
        Ok(Self {
            element_id: element_id.map(str::to_string),
            class_names: class_names.to_vec(),
            class_name_bindings,
            attribute_bindings,
        })
    }

    /// Attributes of `instance`'s root element: id, component class, class
    /// names and class bindings, attribute bindings, then whatever the
    /// invocation site forwarded.
    pub fn root_attributes(&self, instance: &Instance, config: &RenderConfig) -> Vec<(String, String)> {
        let id = self
            .element_id
            .clone()
            .unwrap_or_else(|| format!("{}{}", config.element_id_prefix, instance.id()));
        let mut parts = vec![AttrPart::Static("id".into(), id)];
        if let Some(class) = &config.component_class {
            parts.push(AttrPart::Static("class".into(), class.clone()));
        }
        for class in &self.class_names {
            parts.push(AttrPart::Static("class".into(), class.clone()));
        }
        for binding in &self.class_name_bindings {
            let value = if binding.is_static() {
                Value::Undefined
            } else {
                instance.get(&binding.property)
            };
            if let Some(class) = binding.class_for(&value) {
                parts.push(AttrPart::Static("class".into(), class));
            }
        }
        for binding in &self.attribute_bindings {
            parts.push(AttrPart::Bound(binding.attribute.clone(), binding.read(instance)));
        }
        parts.push(AttrPart::Splat);
        merge_attributes(&parts, &instance.forwarded_attributes())
    }
}
