//! Arena-based document
//!
//! Stores every node in a single `Vec` and links them through parent, child and
//! sibling handles. Detached nodes keep their slot; nothing is ever reused, so a
//! [`NodeId`] held by the text index or the highlight map cannot silently start
//! pointing at unrelated content.

use super::node::{Element, Node, NodeData, NodeId};
use crate::adapter::TreeAdapter;

pub const DEFAULT_HIGHLIGHT_TAG: &str = "span";
pub const DEFAULT_HIGHLIGHT_CLASS: &str = "spanmark";

/// A mutable text/element tree stored in arena format
///
/// Every split, wrap, unwrap and merge leaves detached slots behind, so the arena
/// grows with each highlight cycle even when the markup returns to its original
/// shape. [`Document::compacted`] copies the attached tree into a fresh arena once
/// no handles into the old one are needed, e.g. after
/// [`crate::Highlighter::into_tree`].
#[derive(Debug, Clone)]
pub struct Document {
    nodes: Vec<Node>,
    root: NodeId,
    highlight_tag: String,
    highlight_class: String,
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

impl Document {
    /// Create an empty document holding only the synthetic root node
    pub fn new() -> Self {
        Document {
            nodes: vec![Node::new(NodeData::Document)],
            root: NodeId(0),
            highlight_tag: DEFAULT_HIGHLIGHT_TAG.to_string(),
            highlight_class: DEFAULT_HIGHLIGHT_CLASS.to_string(),
        }
    }

    /// Use `class` to mark (and recognise) highlight containers
    pub fn with_highlight_class(mut self, class: impl Into<String>) -> Self {
        self.highlight_class = class.into();
        self
    }

    pub fn highlight_class(&self) -> &str {
        &self.highlight_class
    }

    /// The synthetic document root
    pub fn root(&self) -> NodeId {
        self.root
    }

    /// Get a node by ID
    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id.index())
    }

    fn node_mut(&mut self, id: NodeId) -> &mut Node {
        &mut self.nodes[id.index()]
    }

    /// Number of arena slots, detached nodes included
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Number of arena slots reachable from the root
    pub fn attached_count(&self) -> usize {
        fn count(doc: &Document, id: NodeId) -> usize {
            1 + doc.children(id).into_iter().map(|c| count(doc, c)).sum::<usize>()
        }
        count(self, self.root)
    }

    /// A copy of the attached tree in a fresh arena with no detached slots.
    /// Handles into `self` are not valid in the copy.
    pub fn compacted(&self) -> Document {
        let mut out = Document {
            nodes: vec![Node::new(NodeData::Document)],
            root: NodeId(0),
            highlight_tag: self.highlight_tag.clone(),
            highlight_class: self.highlight_class.clone(),
        };
        let root = out.root;
        self.copy_children(self.root, &mut out, root);
        out
    }

    fn copy_children(&self, from: NodeId, out: &mut Document, to: NodeId) {
        let mut child = self.first_child(from);
        while let Some(c) = child {
            if let Some(node) = self.node(c) {
                let copy = out.push(node.data.clone());
                out.append_child(to, copy);
                self.copy_children(c, out, copy);
            }
            child = self.next_sibling(c);
        }
    }

    pub fn element(&self, id: NodeId) -> Option<&Element> {
        self.node(id).and_then(Node::element)
    }

    /// Whether `id` is still reachable from the document root
    pub fn is_attached(&self, id: NodeId) -> bool {
        let mut current = Some(id);
        while let Some(node) = current {
            if node == self.root {
                return true;
            }
            current = self.node(node).and_then(|n| n.parent);
        }
        false
    }

    pub fn create_element(&mut self, element: Element) -> NodeId {
        self.push(NodeData::Element(element))
    }

    pub fn create_text(&mut self, text: impl Into<String>) -> NodeId {
        self.push(NodeData::Text(text.into()))
    }

    fn push(&mut self, data: NodeData) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(Node::new(data));
        id
    }

    /// Create an element with `tag` and append it to `parent`
    pub fn append_element(&mut self, parent: NodeId, tag: &str) -> NodeId {
        let id = self.create_element(Element::new(tag));
        self.append_child(parent, id);
        id
    }

    /// Create a text node and append it to `parent`
    pub fn append_text(&mut self, parent: NodeId, text: &str) -> NodeId {
        let id = self.create_text(text);
        self.append_child(parent, id);
        id
    }

    pub fn append_child(&mut self, parent: NodeId, child: NodeId) {
        self.detach(child);
        let last = self.node_mut(parent).last_child;
        {
            let node = self.node_mut(child);
            node.parent = Some(parent);
            node.prev_sibling = last;
        }
        match last {
            Some(last) => self.node_mut(last).next_sibling = Some(child),
            None => self.node_mut(parent).first_child = Some(child),
        }
        self.node_mut(parent).last_child = Some(child);
    }

    /// Insert `new` as the previous sibling of `reference`
    pub fn insert_before(&mut self, reference: NodeId, new: NodeId) {
        self.detach(new);
        let parent = self.node_mut(reference).parent;
        let prev = self.node_mut(reference).prev_sibling;
        {
            let node = self.node_mut(new);
            node.parent = parent;
            node.prev_sibling = prev;
            node.next_sibling = Some(reference);
        }
        self.node_mut(reference).prev_sibling = Some(new);
        match prev {
            Some(prev) => self.node_mut(prev).next_sibling = Some(new),
            None => {
                if let Some(parent) = parent {
                    self.node_mut(parent).first_child = Some(new);
                }
            }
        }
    }

    /// Insert `new` as the next sibling of `reference`
    pub fn insert_after(&mut self, reference: NodeId, new: NodeId) {
        match self.node_mut(reference).next_sibling {
            Some(next) => self.insert_before(next, new),
            None => match self.node_mut(reference).parent {
                Some(parent) => self.append_child(parent, new),
                None => {
                    self.detach(new);
                    self.node_mut(reference).next_sibling = Some(new);
                    self.node_mut(new).prev_sibling = Some(reference);
                }
            },
        }
    }

    /// Unlink `id` from its parent and siblings; the subtree below it is kept
    pub fn detach(&mut self, id: NodeId) {
        let (parent, prev, next) = {
            let node = self.node_mut(id);
            (node.parent, node.prev_sibling, node.next_sibling)
        };
        match prev {
            Some(prev) => self.node_mut(prev).next_sibling = next,
            None => {
                if let Some(parent) = parent {
                    self.node_mut(parent).first_child = next;
                }
            }
        }
        match next {
            Some(next) => self.node_mut(next).prev_sibling = prev,
            None => {
                if let Some(parent) = parent {
                    self.node_mut(parent).last_child = prev;
                }
            }
        }
        let node = self.node_mut(id);
        node.parent = None;
        node.prev_sibling = None;
        node.next_sibling = None;
    }

    pub fn set_attribute(&mut self, id: NodeId, name: &str, value: &str) {
        if let NodeData::Element(element) = &mut self.node_mut(id).data {
            match element.attributes.iter_mut().find(|(key, _)| key == name) {
                Some((_, existing)) => *existing = value.to_string(),
                None => element
                    .attributes
                    .push((name.to_string(), value.to_string())),
            }
        }
    }

    /// Concatenated text of every text node below `id`, in document order
    pub fn text_content(&self, id: NodeId) -> String {
        let mut out = String::new();
        self.collect_text(id, &mut out);
        out
    }

    fn collect_text(&self, id: NodeId, out: &mut String) {
        if let Some(text) = self.node(id).and_then(Node::text) {
            out.push_str(text);
            return;
        }
        let mut child = self.first_child(id);
        while let Some(c) = child {
            self.collect_text(c, out);
            child = self.next_sibling(c);
        }
    }

    fn link(&self, id: NodeId, pick: fn(&Node) -> Option<NodeId>) -> Option<NodeId> {
        self.node(id).and_then(pick)
    }
}

impl TreeAdapter for Document {
    fn parent(&self, node: NodeId) -> Option<NodeId> {
        self.link(node, |n| n.parent)
    }

    fn first_child(&self, node: NodeId) -> Option<NodeId> {
        self.link(node, |n| n.first_child)
    }

    fn last_child(&self, node: NodeId) -> Option<NodeId> {
        self.link(node, |n| n.last_child)
    }

    fn next_sibling(&self, node: NodeId) -> Option<NodeId> {
        self.link(node, |n| n.next_sibling)
    }

    fn prev_sibling(&self, node: NodeId) -> Option<NodeId> {
        self.link(node, |n| n.prev_sibling)
    }

    fn text_of(&self, node: NodeId) -> Option<&str> {
        self.node(node).and_then(Node::text)
    }

    fn tag_name(&self, node: NodeId) -> Option<&str> {
        self.element(node).map(|e| e.tag.as_str())
    }

    fn is_highlight(&self, node: NodeId) -> bool {
        self.element(node)
            .is_some_and(|e| e.has_class(&self.highlight_class))
    }

    fn insert_text_before(&mut self, reference: NodeId, text: &str) -> NodeId {
        let id = self.create_text(text);
        self.insert_before(reference, id);
        id
    }

    fn insert_text_after(&mut self, reference: NodeId, text: &str) -> NodeId {
        let id = self.create_text(text);
        self.insert_after(reference, id);
        id
    }

    fn remove(&mut self, node: NodeId) {
        self.detach(node);
    }

    fn wrap(&mut self, node: NodeId, classes: &[String]) -> NodeId {
        let mut element = Element::new(self.highlight_tag.clone());
        element.classes.push(self.highlight_class.clone());
        for class in classes {
            if !element.has_class(class) {
                element.classes.push(class.clone());
            }
        }
        let container = self.create_element(element);
        self.insert_before(node, container);
        self.append_child(container, node);
        container
    }

    fn unwrap(&mut self, container: NodeId) {
        while let Some(child) = self.first_child(container) {
            self.insert_before(container, child);
        }
        self.detach(container);
    }

    fn normalize(&mut self, node: NodeId) {
        let mut child = self.first_child(node);
        while let Some(c) = child {
            let next = self.next_sibling(c);
            match self.text_of(c).map(str::to_owned) {
                Some(text) if text.is_empty() => self.detach(c),
                Some(text) => {
                    let prev = self.prev_sibling(c);
                    if let Some(prev) = prev
                        && let NodeData::Text(existing) = &mut self.node_mut(prev).data
                    {
                        existing.push_str(&text);
                        self.detach(c);
                    }
                }
                None => self.normalize(c),
            }
            child = next;
        }
    }

    fn add_class(&mut self, node: NodeId, class: &str) {
        if let NodeData::Element(element) = &mut self.node_mut(node).data
            && !element.has_class(class)
        {
            element.classes.push(class.to_string());
        }
    }

    fn remove_class(&mut self, node: NodeId, class: &str) {
        if let NodeData::Element(element) = &mut self.node_mut(node).data {
            element.classes.retain(|c| c != class);
        }
    }

    /// Hidden when the node or any ancestor carries a `hidden` attribute
    fn is_visible(&self, node: NodeId) -> bool {
        let mut current = Some(node);
        while let Some(id) = current {
            if self
                .element(id)
                .is_some_and(|e| e.attribute("hidden").is_some())
            {
                return false;
            }
            current = self.parent(id);
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn paragraph(text: &str) -> (Document, NodeId, NodeId) {
        let mut doc = Document::new();
        let root = doc.root();
        let p = doc.append_element(root, "p");
        let t = doc.append_text(p, text);
        (doc, p, t)
    }

    #[test]
    fn test_append_and_siblings() {
        let mut doc = Document::new();
        let root = doc.root();
        let a = doc.append_text(root, "a");
        let b = doc.append_element(root, "b");
        let c = doc.append_text(root, "c");

        assert_eq!(doc.children(root), vec![a, b, c]);
        assert_eq!(doc.prev_sibling(c), Some(b));
        assert_eq!(doc.next_sibling(a), Some(b));
        assert_eq!(doc.parent(b), Some(root));
        assert_eq!(doc.last_child(root), Some(c));
    }

    #[test]
    fn test_insert_text_before_and_after() {
        let (mut doc, p, t) = paragraph("middle");
        let before = doc.insert_text_before(t, "before");
        let after = doc.insert_text_after(t, "after");

        assert_eq!(doc.children(p), vec![before, t, after]);
        assert_eq!(doc.text_content(p), "beforemiddleafter");
    }

    #[test]
    fn test_wrap_and_unwrap_restore_structure() {
        let (mut doc, p, t) = paragraph("hello");
        let container = doc.wrap(t, &["group-1".to_string()]);

        assert!(doc.is_highlight(container));
        assert_eq!(doc.children(p), vec![container]);
        assert_eq!(doc.parent(t), Some(container));
        assert_eq!(
            doc.element(container).map(|e| e.classes.clone()),
            Some(vec!["spanmark".to_string(), "group-1".to_string()])
        );

        doc.unwrap(container);
        assert_eq!(doc.children(p), vec![t]);
        assert!(!doc.is_attached(container));
    }

    #[test]
    fn test_normalize_merges_and_drops_empty() {
        let mut doc = Document::new();
        let root = doc.root();
        let p = doc.append_element(root, "p");
        let first = doc.append_text(p, "h");
        doc.append_text(p, "");
        doc.append_text(p, "ell");
        doc.append_text(p, "o");

        doc.normalize(root);

        assert_eq!(doc.children(p), vec![first]);
        assert_eq!(doc.text_of(first), Some("hello"));
    }

    #[test]
    fn test_class_toggling() {
        let (mut doc, _, t) = paragraph("x");
        let container = doc.wrap(t, &[]);
        doc.add_class(container, "active");
        doc.add_class(container, "active");
        assert_eq!(
            doc.element(container).map(|e| e.classes.len()),
            Some(2)
        );
        doc.remove_class(container, "active");
        assert!(!doc.element(container).is_some_and(|e| e.has_class("active")));
    }

    #[test]
    fn test_hidden_ancestor_is_not_visible() {
        let (mut doc, p, t) = paragraph("x");
        assert!(doc.is_visible(t));
        doc.set_attribute(p, "hidden", "");
        assert!(!doc.is_visible(t));
    }

    #[test]
    fn test_index_among_siblings_counts_matching_predecessors() {
        let mut doc = Document::new();
        let root = doc.root();
        doc.append_element(root, "p");
        doc.append_element(root, "div");
        let second_p = doc.append_element(root, "p");

        let index = doc.index_among_siblings(second_p, &|n| doc.tag_name(n) == Some("p"));
        assert_eq!(index, 2);
    }

    #[test]
    fn test_compacted_drops_detached_slots() {
        let (mut doc, p, t) = paragraph("hello");
        for _ in 0..3 {
            let after = doc.insert_text_after(t, "x");
            let container = doc.wrap(after, &[]);
            doc.unwrap(container);
            doc.normalize(p);
        }
        assert_eq!(doc.attached_count(), 3);
        assert_eq!(doc.node_count(), 9);

        let compact = doc.compacted();
        assert_eq!(compact.node_count(), 3);
        assert_eq!(compact.to_markup(), doc.to_markup());
        assert_eq!(compact.highlight_class(), doc.highlight_class());
    }
}
