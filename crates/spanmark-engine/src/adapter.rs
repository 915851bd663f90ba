//! Tree Adapter - the capability set the engine needs from a host tree
//!
//! The engine never touches a concrete node representation. Everything it does to
//! the tree (reading text, splitting text nodes, wrapping fragments in highlight
//! containers, unwrapping them again) goes through this trait, so any arena or
//! handle based tree can host highlights. [`crate::dom::Document`] is the bundled
//! implementation.

use crate::dom::NodeId;

/// Primitive tree operations consumed by the engine.
///
/// Handles passed to the mutating operations must refer to nodes that are still
/// attached to the tree.
pub trait TreeAdapter {
    fn parent(&self, node: NodeId) -> Option<NodeId>;
    fn first_child(&self, node: NodeId) -> Option<NodeId>;
    fn last_child(&self, node: NodeId) -> Option<NodeId>;
    fn next_sibling(&self, node: NodeId) -> Option<NodeId>;
    fn prev_sibling(&self, node: NodeId) -> Option<NodeId>;

    /// Content of a text node, `None` for every other node kind
    fn text_of(&self, node: NodeId) -> Option<&str>;

    /// Tag name of an element node
    fn tag_name(&self, node: NodeId) -> Option<&str>;

    /// Whether `node` is a highlight container created by [`TreeAdapter::wrap`]
    fn is_highlight(&self, node: NodeId) -> bool;

    /// Insert a new text node immediately before `reference`
    fn insert_text_before(&mut self, reference: NodeId, text: &str) -> NodeId;

    /// Insert a new text node immediately after `reference`
    fn insert_text_after(&mut self, reference: NodeId, text: &str) -> NodeId;

    /// Detach `node` (and its subtree) from the tree
    fn remove(&mut self, node: NodeId);

    /// Wrap `node` in a new highlight container carrying `classes`
    fn wrap(&mut self, node: NodeId, classes: &[String]) -> NodeId;

    /// Reinsert the children of `container` before it, then remove the container
    fn unwrap(&mut self, container: NodeId);

    /// Merge adjacent text nodes and drop empty ones below `node`
    fn normalize(&mut self, node: NodeId);

    fn add_class(&mut self, node: NodeId, class: &str);
    fn remove_class(&mut self, node: NodeId, class: &str);

    /// Host visibility of a node. Headless trees treat everything as visible.
    fn is_visible(&self, _node: NodeId) -> bool {
        true
    }

    /// Ask the host to bring `node` into view.
    fn scroll_into_view(&mut self, _node: NodeId) {}

    fn is_text(&self, node: NodeId) -> bool {
        self.text_of(node).is_some()
    }

    /// Text nodes and highlight containers both belong to a normalized text unit
    fn is_text_like(&self, node: NodeId) -> bool {
        self.is_text(node) || self.is_highlight(node)
    }

    fn children(&self, node: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut child = self.first_child(node);
        while let Some(c) = child {
            out.push(c);
            child = self.next_sibling(c);
        }
        out
    }

    /// 1-based position of `node` among its preceding siblings that satisfy `predicate`
    fn index_among_siblings(&self, node: NodeId, predicate: &dyn Fn(NodeId) -> bool) -> usize {
        let mut index = 1;
        let mut sibling = self.prev_sibling(node);
        while let Some(s) = sibling {
            if predicate(s) {
                index += 1;
            }
            sibling = self.prev_sibling(s);
        }
        index
    }

    /// Length of a text node in characters (0 for other nodes)
    fn text_len(&self, node: NodeId) -> usize {
        self.text_of(node).map_or(0, |t| t.chars().count())
    }

    /// Total characters of all text nodes in the subtree rooted at `node`
    fn deep_text_len(&self, node: NodeId) -> usize {
        if let Some(text) = self.text_of(node) {
            return text.chars().count();
        }
        let mut total = 0;
        let mut child = self.first_child(node);
        while let Some(c) = child {
            total += self.deep_text_len(c);
            child = self.next_sibling(c);
        }
        total
    }
}
