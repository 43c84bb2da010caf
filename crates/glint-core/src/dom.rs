//! In-memory DOM.
//!
//! The renderer only needs a handful of primitives: create nodes, set and
//! remove attributes, set text, insert before a reference node, remove a
//! subtree. `Document` implements exactly those over a slotmap arena and
//! counts every mutation that actually changed something, which is what the
//! "stable rerender" checks look at.
//!
//! Empty comment nodes are used by the renderer as position anchors and are
//! left out of serialized HTML.

use slotmap::SlotMap;

use crate::{Error, Result};

slotmap::new_key_type! {
    pub struct NodeId;
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum NodeKind {
    Element {
        tag: String,
        attrs: Vec<(String, String)>,
    },
    Text(String),
    Comment(String),
}

#[derive(Clone, Debug)]
struct Node {
    kind: NodeKind,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Mutation {
    Create(NodeId),
    SetAttribute { node: NodeId, name: String },
    RemoveAttribute { node: NodeId, name: String },
    SetText(NodeId),
    Insert { parent: NodeId, node: NodeId },
    Remove(NodeId),
}

#[derive(Clone, Debug)]
pub struct Document {
    nodes: SlotMap<NodeId, Node>,
    body: NodeId,
    mutation_count: u64,
    journal: Option<Vec<Mutation>>,
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

impl Document {
    pub fn new() -> Self {
        let mut nodes = SlotMap::with_key();
        let body = nodes.insert(Node {
            kind: NodeKind::Element {
                tag: "body".into(),
                attrs: Vec::new(),
            },
            parent: None,
            children: Vec::new(),
        });
        Self {
            nodes,
            body,
            mutation_count: 0,
            journal: None,
        }
    }

    pub fn body(&self) -> NodeId {
        self.body
    }

    /// Starts keeping a journal of mutations (see [`Document::take_journal`]).
    pub fn record_mutations(&mut self, on: bool) {
        self.journal = if on { Some(Vec::new()) } else { None };
    }

    pub fn take_journal(&mut self) -> Vec<Mutation> {
        self.journal.as_mut().map(std::mem::take).unwrap_or_default()
    }

    pub fn mutation_count(&self) -> u64 {
        self.mutation_count
    }

    fn note(&mut self, m: Mutation) {
        self.mutation_count += 1;
        if let Some(j) = self.journal.as_mut() {
            j.push(m);
        }
    }

    fn alloc(&mut self, kind: NodeKind) -> NodeId {
        let id = self.nodes.insert(Node {
            kind,
            parent: None,
            children: Vec::new(),
        });
        self.note(Mutation::Create(id));
        id
    }

    pub fn create_element(&mut self, tag: impl Into<String>) -> NodeId {
        self.alloc(NodeKind::Element {
            tag: tag.into(),
            attrs: Vec::new(),
        })
    }

    pub fn create_text(&mut self, text: impl Into<String>) -> NodeId {
        self.alloc(NodeKind::Text(text.into()))
    }

    pub fn create_comment(&mut self, text: impl Into<String>) -> NodeId {
        self.alloc(NodeKind::Comment(text.into()))
    }

    pub fn contains(&self, node: NodeId) -> bool {
        self.nodes.contains_key(node)
    }

    fn node(&self, id: NodeId) -> Result<&Node> {
        self.nodes
            .get(id)
            .ok_or_else(|| Error::assertion(format!("unknown DOM node {id:?}")))
    }

    fn node_mut(&mut self, id: NodeId) -> Result<&mut Node> {
        self.nodes
            .get_mut(id)
            .ok_or_else(|| Error::assertion(format!("unknown DOM node {id:?}")))
    }

    pub fn kind(&self, node: NodeId) -> Option<&NodeKind> {
        self.nodes.get(node).map(|n| &n.kind)
    }

    pub fn tag(&self, node: NodeId) -> Option<&str> {
        match self.kind(node)? {
            NodeKind::Element { tag, .. } => Some(tag),
            _ => None,
        }
    }

    pub fn attributes(&self, node: NodeId) -> &[(String, String)] {
        match self.kind(node) {
            Some(NodeKind::Element { attrs, .. }) => attrs,
            _ => &[],
        }
    }

    pub fn attribute(&self, node: NodeId, name: &str) -> Option<&str> {
        self.attributes(node)
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn class_list(&self, node: NodeId) -> Vec<&str> {
        self.attribute(node, "class")
            .map(|c| c.split_whitespace().collect())
            .unwrap_or_default()
    }

    pub fn set_attribute(&mut self, node: NodeId, name: &str, value: &str) -> Result<()> {
        let NodeKind::Element { attrs, .. } = &mut self.node_mut(node)?.kind else {
            return Err(Error::assertion("set_attribute on a non-element node"));
        };
        match attrs.iter_mut().find(|(n, _)| n == name) {
            Some((_, v)) if v == value => return Ok(()),
            Some((_, v)) => *v = value.to_string(),
            None => attrs.push((name.to_string(), value.to_string())),
        }
        self.note(Mutation::SetAttribute {
            node,
            name: name.to_string(),
        });
        Ok(())
    }

    pub fn remove_attribute(&mut self, node: NodeId, name: &str) -> Result<()> {
        let NodeKind::Element { attrs, .. } = &mut self.node_mut(node)?.kind else {
            return Err(Error::assertion("remove_attribute on a non-element node"));
        };
        let before = attrs.len();
        attrs.retain(|(n, _)| n != name);
        if attrs.len() != before {
            self.note(Mutation::RemoveAttribute {
                node,
                name: name.to_string(),
            });
        }
        Ok(())
    }

    pub fn set_text(&mut self, node: NodeId, text: &str) -> Result<()> {
        match &mut self.node_mut(node)?.kind {
            NodeKind::Text(t) | NodeKind::Comment(t) => {
                if t == text {
                    return Ok(());
                }
                *t = text.to_string();
            }
            NodeKind::Element { .. } => {
                return Err(Error::assertion("set_text on an element"));
            }
        }
        self.note(Mutation::SetText(node));
        Ok(())
    }

    pub fn parent(&self, node: NodeId) -> Option<NodeId> {
        self.nodes.get(node).and_then(|n| n.parent)
    }

    pub fn children(&self, node: NodeId) -> &[NodeId] {
        self.nodes
            .get(node)
            .map(|n| n.children.as_slice())
            .unwrap_or(&[])
    }

    fn unlink(&mut self, node: NodeId) -> Result<()> {
        if let Some(parent) = self.node(node)?.parent {
            self.node_mut(parent)?.children.retain(|c| *c != node);
            self.node_mut(node)?.parent = None;
        }
        Ok(())
    }

    /// Moves `node` under `parent`, before `reference` (or last when `None`).
    pub fn insert_before(
        &mut self,
        parent: NodeId,
        node: NodeId,
        reference: Option<NodeId>,
    ) -> Result<()> {
        if !matches!(self.node(parent)?.kind, NodeKind::Element { .. }) {
            return Err(Error::assertion("only elements can have children"));
        }
        if self.ancestors(parent).contains(&node) {
            return Err(Error::assertion("cannot insert a node into its own subtree"));
        }
        self.unlink(node)?;
        let children = &mut self.node_mut(parent)?.children;
        let index = match reference {
            None => children.len(),
            Some(r) => children.iter().position(|c| *c == r).ok_or_else(|| {
                Error::assertion("reference node is not a child of the insertion parent")
            })?,
        };
        children.insert(index, node);
        self.node_mut(node)?.parent = Some(parent);
        self.note(Mutation::Insert { parent, node });
        Ok(())
    }

    pub fn append_child(&mut self, parent: NodeId, node: NodeId) -> Result<()> {
        self.insert_before(parent, node, None)
    }

    /// Detaches `node` and frees its whole subtree.
    pub fn remove(&mut self, node: NodeId) -> Result<()> {
        if node == self.body {
            return Err(Error::assertion("the body cannot be removed"));
        }
        self.unlink(node)?;
        let mut stack = vec![node];
        while let Some(id) = stack.pop() {
            if let Some(n) = self.nodes.remove(id) {
                stack.extend(n.children);
            }
        }
        self.note(Mutation::Remove(node));
        Ok(())
    }

    /// `node` first, then each parent up to the root of its tree.
    pub fn ancestors(&self, node: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut cur = Some(node);
        while let Some(id) = cur {
            if !self.nodes.contains_key(id) {
                break;
            }
            out.push(id);
            cur = self.parent(id);
        }
        out
    }

    pub fn is_connected(&self, node: NodeId) -> bool {
        self.ancestors(node).last() == Some(&self.body)
    }

    pub fn text_content(&self, node: NodeId) -> String {
        let mut out = String::new();
        self.collect_text(node, &mut out);
        out
    }

    fn collect_text(&self, node: NodeId, out: &mut String) {
        match self.kind(node) {
            Some(NodeKind::Text(t)) => out.push_str(t),
            Some(NodeKind::Element { .. }) => {
                for c in self.children(node) {
                    self.collect_text(*c, out);
                }
            }
            _ => {}
        }
    }

    fn descendants(&self, root: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack = vec![root];
        while let Some(id) = stack.pop() {
            out.push(id);
            stack.extend(self.children(id).iter().rev().copied());
        }
        out
    }

    pub fn element_by_id(&self, id: &str) -> Option<NodeId> {
        self.descendants(self.body)
            .into_iter()
            .find(|n| self.attribute(*n, "id") == Some(id))
    }

    pub fn elements_by_tag(&self, tag: &str) -> Vec<NodeId> {
        self.descendants(self.body)
            .into_iter()
            .filter(|n| self.tag(*n) == Some(tag))
            .collect()
    }

    pub fn inner_html(&self, node: NodeId) -> String {
        let mut out = String::new();
        for c in self.children(node) {
            self.write_html(*c, &mut out);
        }
        out
    }

    pub fn outer_html(&self, node: NodeId) -> String {
        let mut out = String::new();
        self.write_html(node, &mut out);
        out
    }

    fn write_html(&self, node: NodeId, out: &mut String) {
        match self.kind(node) {
            Some(NodeKind::Element { tag, attrs }) => {
                out.push('<');
                out.push_str(tag);
                for (name, value) in attrs {
                    out.push(' ');
                    out.push_str(name);
                    out.push_str("=\"");
                    out.push_str(&escape(value, true));
                    out.push('"');
                }
                out.push('>');
                for c in self.children(node) {
                    self.write_html(*c, out);
                }
                out.push_str("</");
                out.push_str(tag);
                out.push('>');
            }
            Some(NodeKind::Text(t)) => out.push_str(&escape(t, false)),
            Some(NodeKind::Comment(c)) if !c.is_empty() => {
                out.push_str("<!--");
                out.push_str(c);
                out.push_str("-->");
            }
            _ => {}
        }
    }
}

fn escape(s: &str, attr: bool) -> String {
    let mut out = String::with_capacity(s.len());
    for ch in s.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' if attr => out.push_str("&quot;"),
            c => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_and_serializes() {
        let mut doc = Document::new();
        let div = doc.create_element("div");
        doc.set_attribute(div, "id", "main").unwrap();
        let text = doc.create_text("a < b");
        doc.append_child(div, text).unwrap();
        let anchor = doc.create_comment("");
        doc.append_child(div, anchor).unwrap();
        doc.append_child(doc.body(), div).unwrap();

        assert_eq!(doc.inner_html(doc.body()), r#"<div id="main">a &lt; b</div>"#);
        assert_eq!(doc.element_by_id("main"), Some(div));
        assert!(doc.is_connected(text));
    }

    #[test]
    fn unchanged_writes_are_not_mutations() {
        let mut doc = Document::new();
        let div = doc.create_element("div");
        doc.set_attribute(div, "class", "a").unwrap();
        let before = doc.mutation_count();
        doc.set_attribute(div, "class", "a").unwrap();
        doc.remove_attribute(div, "title").unwrap();
        assert_eq!(doc.mutation_count(), before);
    }

    #[test]
    fn insert_before_reference_and_remove_subtree() {
        let mut doc = Document::new();
        let body = doc.body();
        let a = doc.create_text("a");
        let c = doc.create_text("c");
        doc.append_child(body, a).unwrap();
        doc.append_child(body, c).unwrap();
        let b = doc.create_element("b");
        doc.insert_before(body, b, Some(c)).unwrap();
        assert_eq!(doc.inner_html(body), "a<b></b>c");

        let inner = doc.create_text("x");
        doc.append_child(b, inner).unwrap();
        doc.remove(b).unwrap();
        assert!(!doc.contains(inner));
        assert_eq!(doc.inner_html(body), "ac");
    }

    #[test]
    fn reference_must_be_a_child() {
        let mut doc = Document::new();
        let stray = doc.create_text("stray");
        let node = doc.create_text("n");
        let err = doc.insert_before(doc.body(), node, Some(stray)).unwrap_err();
        assert!(matches!(err, Error::Assertion(_)));
    }
}
