//! Element builders: the VM's only way of producing DOM.
//!
//! [`ClientBuilder`] creates fresh nodes. [`SerializeBuilder`] does the same
//! but also emits block boundary markers and text separators so the output
//! can later be claimed by a [`RehydrationBuilder`], which walks existing
//! nodes instead of creating new ones.

use super::{Document, NodeId, NodeKind};

/// Insertion point: new nodes go into `parent` before `next_sibling`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cursor {
    pub parent: NodeId,
    pub next_sibling: Option<NodeId>,
}

impl Cursor {
    pub fn append_to(parent: NodeId) -> Self {
        Self {
            parent,
            next_sibling: None,
        }
    }
}

/// Constructs DOM for the VM.
pub trait ElementBuilder {
    /// Open an element; following nodes go inside it until it is closed.
    fn open_element(&mut self, doc: &mut Document, tag: &str) -> NodeId;

    fn close_element(&mut self, doc: &mut Document);

    fn set_attribute(&mut self, doc: &mut Document, element: NodeId, name: &str, value: &str) {
        doc.set_attribute(element, name, value);
    }

    fn append_text(&mut self, doc: &mut Document, text: &str) -> NodeId;

    fn append_comment(&mut self, doc: &mut Document, text: &str) -> NodeId;

    /// Start a dynamic block (conditional, component).
    fn open_block(&mut self, _doc: &mut Document) {}

    fn close_block(&mut self, _doc: &mut Document) {}

    /// Called once rendering is complete.
    fn finish(&mut self, _doc: &mut Document) {}

    fn cursor(&self) -> Cursor;

    /// Temporarily redirect output to `cursor` (used when re-rendering a
    /// block in place).
    fn push_cursor(&mut self, cursor: Cursor);

    fn pop_cursor(&mut self);
}

/// Builds fresh DOM.
#[derive(Debug)]
pub struct ClientBuilder {
    stack: Vec<Cursor>,
}

impl ClientBuilder {
    pub fn new(cursor: Cursor) -> Self {
        Self { stack: vec![cursor] }
    }

    fn top(&self) -> Cursor {
        // The root cursor is never popped.
        self.stack[self.stack.len() - 1]
    }

    fn insert(&self, doc: &mut Document, node: NodeId) {
        let cursor = self.top();
        doc.insert_before(cursor.parent, node, cursor.next_sibling);
    }
}

impl ElementBuilder for ClientBuilder {
    fn open_element(&mut self, doc: &mut Document, tag: &str) -> NodeId {
        let element = doc.create_element(tag);
        self.insert(doc, element);
        self.stack.push(Cursor::append_to(element));
        element
    }

    fn close_element(&mut self, _doc: &mut Document) {
        if self.stack.len() > 1 {
            self.stack.pop();
        }
    }

    fn append_text(&mut self, doc: &mut Document, text: &str) -> NodeId {
        let node = doc.create_text(text);
        self.insert(doc, node);
        node
    }

    fn append_comment(&mut self, doc: &mut Document, text: &str) -> NodeId {
        let node = doc.create_comment(text);
        self.insert(doc, node);
        node
    }

    fn cursor(&self) -> Cursor {
        self.top()
    }

    fn push_cursor(&mut self, cursor: Cursor) {
        self.stack.push(cursor);
    }

    fn pop_cursor(&mut self) {
        if self.stack.len() > 1 {
            self.stack.pop();
        }
    }
}

/// Builds DOM annotated for later rehydration.
///
/// Blocks are bracketed by `%+b:N%` / `%-b:N%` comments where `N` is the
/// nesting depth, and adjacent text nodes are separated by `%|%` so they
/// survive a round trip through markup.
#[derive(Debug)]
pub struct SerializeBuilder {
    inner: ClientBuilder,
    depth: usize,
    last_was_text: Vec<bool>,
}

impl SerializeBuilder {
    pub fn new(cursor: Cursor) -> Self {
        Self {
            inner: ClientBuilder::new(cursor),
            depth: 0,
            last_was_text: vec![false],
        }
    }

    fn mark_text(&mut self, is_text: bool) {
        if let Some(last) = self.last_was_text.last_mut() {
            *last = is_text;
        }
    }
}

impl ElementBuilder for SerializeBuilder {
    fn open_element(&mut self, doc: &mut Document, tag: &str) -> NodeId {
        self.mark_text(false);
        self.last_was_text.push(false);
        self.inner.open_element(doc, tag)
    }

    fn close_element(&mut self, doc: &mut Document) {
        if self.last_was_text.len() > 1 {
            self.last_was_text.pop();
        }
        self.inner.close_element(doc);
    }

    fn append_text(&mut self, doc: &mut Document, text: &str) -> NodeId {
        if self.last_was_text.last().copied().unwrap_or(false) {
            self.inner.append_comment(doc, "%|%");
        }
        self.mark_text(true);
        self.inner.append_text(doc, text)
    }

    fn append_comment(&mut self, doc: &mut Document, text: &str) -> NodeId {
        self.mark_text(false);
        self.inner.append_comment(doc, text)
    }

    fn open_block(&mut self, doc: &mut Document) {
        let marker = format!("%+b:{}%", self.depth);
        self.depth += 1;
        self.append_comment(doc, &marker);
    }

    fn close_block(&mut self, doc: &mut Document) {
        self.depth = self.depth.saturating_sub(1);
        let marker = format!("%-b:{}%", self.depth);
        self.append_comment(doc, &marker);
    }

    fn cursor(&self) -> Cursor {
        self.inner.cursor()
    }

    fn push_cursor(&mut self, cursor: Cursor) {
        self.last_was_text.push(false);
        self.inner.push_cursor(cursor);
    }

    fn pop_cursor(&mut self) {
        if self.last_was_text.len() > 1 {
            self.last_was_text.pop();
        }
        self.inner.pop_cursor();
    }
}

fn is_marker(doc: &Document, node: NodeId) -> bool {
    match doc.kind(node) {
        NodeKind::Comment(text) => text.len() >= 2 && text.starts_with('%') && text.ends_with('%'),
        _ => false,
    }
}

#[derive(Debug, Clone, Copy)]
struct Frame {
    parent: NodeId,
    candidate: Option<NodeId>,
}

/// Claims server-rendered DOM instead of creating it.
///
/// Matching nodes are reused in place; mismatches get fresh nodes and any
/// unclaimed leftovers are removed when their parent closes.
#[derive(Debug)]
pub struct RehydrationBuilder {
    stack: Vec<Frame>,
    claimed: usize,
    created: usize,
}

impl RehydrationBuilder {
    /// Rehydrate the existing children of `parent`.
    pub fn new(doc: &Document, parent: NodeId) -> Self {
        Self {
            stack: vec![Frame {
                parent,
                candidate: doc.first_child(parent),
            }],
            claimed: 0,
            created: 0,
        }
    }

    /// Number of existing nodes that were reused.
    pub fn claimed(&self) -> usize {
        self.claimed
    }

    /// Number of nodes that had to be created because nothing matched.
    pub fn created(&self) -> usize {
        self.created
    }

    fn frame(&mut self) -> &mut Frame {
        let last = self.stack.len() - 1;
        &mut self.stack[last]
    }

    /// Drop marker comments at the candidate position.
    fn skip_markers(&mut self, doc: &mut Document) {
        while let Some(candidate) = self.frame().candidate {
            if !is_marker(doc, candidate) {
                break;
            }
            let next = doc.next_sibling(candidate);
            doc.remove(candidate);
            self.frame().candidate = next;
        }
    }

    /// Take the candidate if `matches` accepts it, else insert `create()`
    /// before it.
    fn claim_or_create(
        &mut self,
        doc: &mut Document,
        matches: impl Fn(&NodeKind) -> bool,
        create: impl FnOnce(&mut Document) -> NodeId,
    ) -> (NodeId, bool) {
        self.skip_markers(doc);
        let frame = *self.frame();
        if let Some(candidate) = frame.candidate {
            if matches(doc.kind(candidate)) {
                self.frame().candidate = doc.next_sibling(candidate);
                self.claimed += 1;
                return (candidate, true);
            }
        }
        let node = create(doc);
        doc.insert_before(frame.parent, node, frame.candidate);
        self.created += 1;
        (node, false)
    }

    fn clear_leftovers(&mut self, doc: &mut Document) {
        self.skip_markers(doc);
        while let Some(candidate) = self.frame().candidate {
            let next = doc.next_sibling(candidate);
            doc.remove(candidate);
            self.frame().candidate = next;
        }
    }
}

impl ElementBuilder for RehydrationBuilder {
    fn open_element(&mut self, doc: &mut Document, tag: &str) -> NodeId {
        let (element, claimed) = self.claim_or_create(
            doc,
            |kind| matches!(kind, NodeKind::Element { tag: t, .. } if t.eq_ignore_ascii_case(tag)),
            |doc| doc.create_element(tag),
        );
        if claimed {
            doc.clear_attributes(element);
        }
        let candidate = doc.first_child(element);
        self.stack.push(Frame {
            parent: element,
            candidate,
        });
        element
    }

    fn close_element(&mut self, doc: &mut Document) {
        if self.stack.len() > 1 {
            self.clear_leftovers(doc);
            self.stack.pop();
        }
    }

    fn append_text(&mut self, doc: &mut Document, text: &str) -> NodeId {
        let (node, claimed) =
            self.claim_or_create(doc, |kind| matches!(kind, NodeKind::Text(_)), |doc| doc.create_text(text));
        if claimed && doc.text(node) != Some(text) {
            doc.set_text(node, text);
        }
        node
    }

    fn append_comment(&mut self, doc: &mut Document, text: &str) -> NodeId {
        let (node, claimed) = self.claim_or_create(
            doc,
            |kind| matches!(kind, NodeKind::Comment(_)),
            |doc| doc.create_comment(text),
        );
        if claimed && doc.text(node) != Some(text) {
            doc.set_text(node, text);
        }
        node
    }

    fn finish(&mut self, doc: &mut Document) {
        while self.stack.len() > 1 {
            self.close_element(doc);
        }
        self.clear_leftovers(doc);
    }

    fn cursor(&self) -> Cursor {
        let frame = self.stack[self.stack.len() - 1];
        Cursor {
            parent: frame.parent,
            next_sibling: frame.candidate,
        }
    }

    fn push_cursor(&mut self, cursor: Cursor) {
        self.stack.push(Frame {
            parent: cursor.parent,
            candidate: cursor.next_sibling,
        });
    }

    fn pop_cursor(&mut self) {
        if self.stack.len() > 1 {
            self.stack.pop();
        }
    }
}
