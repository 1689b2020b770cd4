//! In-Memory Document
//!
//! The renderer drives a DOM through this arena. Nodes are addressed by
//! [`NodeId`] and never move in memory; detaching a node only unlinks it
//! from its parent, so ids held by update operations stay valid for the
//! node's whole life.

mod builder;

pub use builder::{ClientBuilder, Cursor, ElementBuilder, RehydrationBuilder, SerializeBuilder};

use std::cell::RefCell;
use std::fmt::Write as _;
use std::rc::Rc;

use indexmap::IndexMap;

use crate::error::Result;
use crate::reactive::Runtime;

/// Handle to a node in a [`Document`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

/// Handle to an installed event listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

/// What a node is.
#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    Element {
        tag: String,
        attrs: IndexMap<String, String>,
    },
    Text(String),
    Comment(String),
}

/// An event listener callback.
pub type Listener = Rc<dyn Fn(&Runtime, &mut Event) -> Result<()>>;

struct NodeData {
    kind: NodeKind,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    listeners: Vec<(ListenerId, String, Listener)>,
}

/// A dispatched event.
#[derive(Debug, Clone)]
pub struct Event {
    pub kind: String,
    pub target: Option<NodeId>,
    pub current_target: Option<NodeId>,
    pub default_prevented: bool,
    pub propagation_stopped: bool,
    pub alt_key: bool,
    pub ctrl_key: bool,
    pub meta_key: bool,
    pub shift_key: bool,
}

impl Event {
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            target: None,
            current_target: None,
            default_prevented: false,
            propagation_stopped: false,
            alt_key: false,
            ctrl_key: false,
            meta_key: false,
            shift_key: false,
        }
    }

    /// Set a modifier key by name (`alt`, `ctrl`, `meta`, `shift`).
    pub fn with_key(mut self, key: &str) -> Self {
        match key {
            "alt" => self.alt_key = true,
            "ctrl" => self.ctrl_key = true,
            "meta" => self.meta_key = true,
            "shift" => self.shift_key = true,
            _ => {}
        }
        self
    }

    pub fn prevent_default(&mut self) {
        self.default_prevented = true;
    }

    pub fn stop_propagation(&mut self) {
        self.propagation_stopped = true;
    }
}

/// The node arena. A fresh document has one `body` element.
pub struct Document {
    nodes: Vec<NodeData>,
    body: NodeId,
    next_listener: u64,
}

impl Document {
    pub fn new() -> Self {
        let mut doc = Self {
            nodes: Vec::new(),
            body: NodeId(0),
            next_listener: 0,
        };
        doc.body = doc.create_element("body");
        doc
    }

    pub fn body(&self) -> NodeId {
        self.body
    }

    fn alloc(&mut self, kind: NodeKind) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(NodeData {
            kind,
            parent: None,
            children: Vec::new(),
            listeners: Vec::new(),
        });
        id
    }

    fn data(&self, node: NodeId) -> &NodeData {
        &self.nodes[node.0]
    }

    fn data_mut(&mut self, node: NodeId) -> &mut NodeData {
        &mut self.nodes[node.0]
    }

    pub fn create_element(&mut self, tag: &str) -> NodeId {
        self.alloc(NodeKind::Element {
            tag: tag.to_string(),
            attrs: IndexMap::new(),
        })
    }

    pub fn create_text(&mut self, text: &str) -> NodeId {
        self.alloc(NodeKind::Text(text.to_string()))
    }

    pub fn create_comment(&mut self, text: &str) -> NodeId {
        self.alloc(NodeKind::Comment(text.to_string()))
    }

    pub fn kind(&self, node: NodeId) -> &NodeKind {
        &self.data(node).kind
    }

    pub fn tag_name(&self, node: NodeId) -> Option<&str> {
        match &self.data(node).kind {
            NodeKind::Element { tag, .. } => Some(tag),
            _ => None,
        }
    }

    pub fn parent(&self, node: NodeId) -> Option<NodeId> {
        self.data(node).parent
    }

    pub fn children(&self, node: NodeId) -> &[NodeId] {
        &self.data(node).children
    }

    pub fn first_child(&self, node: NodeId) -> Option<NodeId> {
        self.data(node).children.first().copied()
    }

    pub fn next_sibling(&self, node: NodeId) -> Option<NodeId> {
        let parent = self.data(node).parent?;
        let siblings = &self.data(parent).children;
        let index = siblings.iter().position(|n| *n == node)?;
        siblings.get(index + 1).copied()
    }

    /// Insert `child` into `parent` before `reference` (or at the end).
    /// A child that is already attached somewhere is moved.
    pub fn insert_before(&mut self, parent: NodeId, child: NodeId, reference: Option<NodeId>) {
        self.remove(child);
        let index = reference
            .and_then(|r| self.data(parent).children.iter().position(|n| *n == r))
            .unwrap_or(self.data(parent).children.len());
        self.data_mut(parent).children.insert(index, child);
        self.data_mut(child).parent = Some(parent);
    }

    pub fn append_child(&mut self, parent: NodeId, child: NodeId) {
        self.insert_before(parent, child, None);
    }

    /// Detach `node` from its parent. The node and its subtree stay valid.
    pub fn remove(&mut self, node: NodeId) {
        if let Some(parent) = self.data_mut(node).parent.take() {
            self.data_mut(parent).children.retain(|n| *n != node);
        }
    }

    pub fn is_attached(&self, node: NodeId) -> bool {
        let mut current = node;
        loop {
            if current == self.body {
                return true;
            }
            match self.data(current).parent {
                Some(parent) => current = parent,
                None => return false,
            }
        }
    }

    pub fn set_text(&mut self, node: NodeId, text: &str) {
        match &mut self.data_mut(node).kind {
            NodeKind::Text(current) | NodeKind::Comment(current) => {
                current.clear();
                current.push_str(text);
            }
            NodeKind::Element { .. } => {}
        }
    }

    pub fn text(&self, node: NodeId) -> Option<&str> {
        match &self.data(node).kind {
            NodeKind::Text(text) | NodeKind::Comment(text) => Some(text),
            NodeKind::Element { .. } => None,
        }
    }

    pub fn set_attribute(&mut self, element: NodeId, name: &str, value: &str) {
        if let NodeKind::Element { attrs, .. } = &mut self.data_mut(element).kind {
            attrs.insert(name.to_string(), value.to_string());
        }
    }

    pub fn remove_attribute(&mut self, element: NodeId, name: &str) {
        if let NodeKind::Element { attrs, .. } = &mut self.data_mut(element).kind {
            attrs.shift_remove(name);
        }
    }

    pub fn clear_attributes(&mut self, element: NodeId) {
        if let NodeKind::Element { attrs, .. } = &mut self.data_mut(element).kind {
            attrs.clear();
        }
    }

    pub fn attribute(&self, element: NodeId, name: &str) -> Option<&str> {
        match &self.data(element).kind {
            NodeKind::Element { attrs, .. } => attrs.get(name).map(String::as_str),
            _ => None,
        }
    }

    pub fn add_listener(&mut self, node: NodeId, event: &str, listener: Listener) -> ListenerId {
        let id = ListenerId(self.next_listener);
        self.next_listener += 1;
        self.data_mut(node).listeners.push((id, event.to_string(), listener));
        id
    }

    pub fn remove_listener(&mut self, node: NodeId, id: ListenerId) {
        self.data_mut(node).listeners.retain(|(l, _, _)| *l != id);
    }

    pub fn listener_count(&self, node: NodeId) -> usize {
        self.data(node).listeners.len()
    }

    fn listeners_for(&self, node: NodeId, event: &str) -> Vec<Listener> {
        self.data(node)
            .listeners
            .iter()
            .filter(|(_, kind, _)| kind == event)
            .map(|(_, _, listener)| listener.clone())
            .collect()
    }

    /// Concatenated text of `node`'s subtree, comments excluded.
    pub fn text_content(&self, node: NodeId) -> String {
        let mut out = String::new();
        self.collect_text(node, &mut out);
        out
    }

    fn collect_text(&self, node: NodeId, out: &mut String) {
        match &self.data(node).kind {
            NodeKind::Text(text) => out.push_str(text),
            NodeKind::Comment(_) => {}
            NodeKind::Element { .. } => {
                for child in &self.data(node).children {
                    self.collect_text(*child, out);
                }
            }
        }
    }

    /// Markup for `node`'s children.
    pub fn inner_html(&self, node: NodeId) -> String {
        let mut out = String::new();
        for child in &self.data(node).children {
            self.write_node(*child, &mut out);
        }
        out
    }

    /// Markup for `node` itself.
    pub fn serialize(&self, node: NodeId) -> String {
        let mut out = String::new();
        self.write_node(node, &mut out);
        out
    }

    fn write_node(&self, node: NodeId, out: &mut String) {
        match &self.data(node).kind {
            NodeKind::Text(text) => out.push_str(&escape(text, false)),
            NodeKind::Comment(text) => {
                let _ = write!(out, "<!--{text}-->");
            }
            NodeKind::Element { tag, attrs } => {
                let _ = write!(out, "<{tag}");
                for (name, value) in attrs {
                    let _ = write!(out, " {name}=\"{}\"", escape(value, true));
                }
                out.push('>');
                for child in &self.data(node).children {
                    self.write_node(*child, out);
                }
                let _ = write!(out, "</{tag}>");
            }
        }
    }
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

fn escape(text: &str, attribute: bool) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' if !attribute => out.push_str("&lt;"),
            '>' if !attribute => out.push_str("&gt;"),
            '"' if attribute => out.push_str("&quot;"),
            c => out.push(c),
        }
    }
    out
}

/// Dispatch `event` at `target`, bubbling to the document root.
///
/// The document is only borrowed while collecting listeners, so listeners
/// are free to mutate it.
pub fn dispatch_event(doc: &RefCell<Document>, rt: &Runtime, target: NodeId, mut event: Event) -> Result<Event> {
    event.target = Some(target);
    let mut current = Some(target);
    while let Some(node) = current {
        let listeners = doc.borrow().listeners_for(node, &event.kind);
        event.current_target = Some(node);
        for listener in listeners {
            listener(rt, &mut event)?;
        }
        if event.propagation_stopped {
            break;
        }
        current = doc.borrow().parent(node);
    }
    Ok(event)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn builds_and_serializes_markup() {
        let mut doc = Document::new();
        let div = doc.create_element("div");
        doc.set_attribute(div, "class", "a \"b\"");
        let text = doc.create_text("1 < 2");
        doc.append_child(div, text);
        doc.append_child(doc.body(), div);

        assert_eq!(doc.inner_html(doc.body()), "<div class=\"a &quot;b&quot;\">1 &lt; 2</div>");
        assert_eq!(doc.text_content(doc.body()), "1 < 2");
        assert!(doc.is_attached(text));
    }

    #[test]
    fn insert_before_respects_reference_node() {
        let mut doc = Document::new();
        let body = doc.body();
        let a = doc.create_text("a");
        let c = doc.create_text("c");
        doc.append_child(body, a);
        doc.append_child(body, c);
        let b = doc.create_text("b");
        doc.insert_before(body, b, Some(c));

        assert_eq!(doc.text_content(body), "abc");
        assert_eq!(doc.next_sibling(a), Some(b));
    }

    #[test]
    fn events_bubble_until_stopped() {
        let rt = Runtime::new();
        let doc = RefCell::new(Document::new());
        let (outer, inner) = {
            let mut d = doc.borrow_mut();
            let outer = d.create_element("div");
            let inner = d.create_element("button");
            d.append_child(outer, inner);
            let body = d.body();
            d.append_child(body, outer);
            (outer, inner)
        };

        let outer_hits = Rc::new(Cell::new(0));
        let hits = outer_hits.clone();
        doc.borrow_mut().add_listener(
            outer,
            "click",
            Rc::new(move |_, _| {
                hits.set(hits.get() + 1);
                Ok(())
            }),
        );

        dispatch_event(&doc, &rt, inner, Event::new("click")).unwrap();
        assert_eq!(outer_hits.get(), 1);

        doc.borrow_mut().add_listener(
            inner,
            "click",
            Rc::new(|_, event| {
                event.stop_propagation();
                Ok(())
            }),
        );
        dispatch_event(&doc, &rt, inner, Event::new("click")).unwrap();
        assert_eq!(outer_hits.get(), 1);
    }
}
