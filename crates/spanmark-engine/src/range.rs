//! Range and Node Visitor
//!
//! A [`Range`] spans `[start, end]` (both inclusive) over the text index. Each end
//! is a marker index plus a character offset inside that marker's text node.
//! [`Range::surround`] is the highlighting primitive: it truncates the boundary
//! text nodes so the span starts and ends on node boundaries, then wraps every text
//! node of the span in a highlight container.

use crate::adapter::TreeAdapter;
use crate::address::{AddressError, AddressPoint, AddressRange, Codec};
use crate::dom::NodeId;
use crate::index::{IndexError, TextIndex};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RangeError {
    #[error(transparent)]
    Index(#[from] IndexError),
    #[error(transparent)]
    Address(#[from] AddressError),
    #[error("Invalid range: {0}")]
    Invalid(String),
    #[error("Traversal left the bounding root before reaching a text node")]
    OutOfBounds,
}

/// Walks text nodes in document order, never leaving `root`
#[derive(Debug, Clone)]
pub struct NodeVisitor {
    current: NodeId,
    root: NodeId,
}

impl NodeVisitor {
    pub fn new(start: NodeId, root: NodeId) -> Self {
        NodeVisitor {
            current: start,
            root,
        }
    }

    pub fn current(&self) -> NodeId {
        self.current
    }

    /// Next text node after the current one
    pub fn next<T: TreeAdapter>(&mut self, tree: &T) -> Result<NodeId, RangeError> {
        let mut node =
            advance(tree, self.root, self.current, false).ok_or(RangeError::OutOfBounds)?;
        loop {
            if tree.is_text(node) {
                self.current = node;
                return Ok(node);
            }
            node = advance(tree, self.root, node, true).ok_or(RangeError::OutOfBounds)?;
        }
    }
}

/// Pre-order successor of `node` bounded by `root`; `descend` controls whether the
/// children of `node` are visited
fn advance<T: TreeAdapter>(tree: &T, root: NodeId, node: NodeId, descend: bool) -> Option<NodeId> {
    if descend && let Some(child) = tree.first_child(node) {
        return Some(child);
    }
    let mut current = node;
    loop {
        if current == root {
            return None;
        }
        if let Some(sibling) = tree.next_sibling(current) {
            return Some(sibling);
        }
        current = tree.parent(current)?;
    }
}

/// One end of a range, resolved against a marker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RangeDescriptor {
    pub marker: usize,
    pub offset: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Range {
    pub start: RangeDescriptor,
    /// Inclusive: points at the last character of the span
    pub end: RangeDescriptor,
}

impl Range {
    pub fn new(
        index: &TextIndex,
        start: RangeDescriptor,
        end: RangeDescriptor,
    ) -> Result<Self, RangeError> {
        for descriptor in [start, end] {
            let len = index.marker_len(descriptor.marker)?;
            if descriptor.offset >= len {
                return Err(RangeError::Invalid(format!(
                    "offset {} outside marker {} of length {len}",
                    descriptor.offset, descriptor.marker
                )));
            }
        }
        let range = Range { start, end };
        let (from, to) = (range.start_offset(index)?, range.end_offset(index)?);
        if from > to {
            return Err(RangeError::Invalid(format!("start {from} is after end {to}")));
        }
        Ok(range)
    }

    /// Range over global offsets `start..=end`
    pub fn from_offsets(index: &TextIndex, start: usize, end: usize) -> Result<Self, RangeError> {
        let start_marker = index.index_of(start)?;
        let end_marker = index.index_of(end)?;
        Range::new(
            index,
            RangeDescriptor {
                marker: start_marker,
                offset: start - index.at(start_marker)?.offset,
            },
            RangeDescriptor {
                marker: end_marker,
                offset: end - index.at(end_marker)?.offset,
            },
        )
    }

    /// Global offset of the first character
    pub fn start_offset(&self, index: &TextIndex) -> Result<usize, RangeError> {
        Ok(index.at(self.start.marker)?.offset + self.start.offset)
    }

    /// Global offset of the last character
    pub fn end_offset(&self, index: &TextIndex) -> Result<usize, RangeError> {
        Ok(index.at(self.end.marker)?.offset + self.end.offset)
    }

    pub fn is_single_node(&self) -> bool {
        self.start.marker == self.end.marker
    }

    /// The spanned slice of the flattened text
    pub fn text(&self, index: &TextIndex) -> Result<String, RangeError> {
        let from = self.start_offset(index)?;
        let to = self.end_offset(index)?;
        Ok(index.text().chars().skip(from).take(to - from + 1).collect())
    }

    /// Number of characters covered, walking the tree between the end nodes
    pub fn length<T: TreeAdapter>(
        &self,
        index: &TextIndex,
        tree: &T,
        root: NodeId,
    ) -> Result<usize, RangeError> {
        if self.is_single_node() {
            return Ok(self.end.offset - self.start.offset + 1);
        }
        let start_node = index.at(self.start.marker)?.node;
        let end_node = index.at(self.end.marker)?.node;

        let mut total = tree.text_len(start_node) - self.start.offset;
        let mut visitor = NodeVisitor::new(start_node, root);
        loop {
            let node = visitor.next(tree)?;
            if node == end_node {
                break;
            }
            total += tree.text_len(node);
        }
        Ok(total + self.end.offset + 1)
    }

    /// Wrap the span in highlight containers, returning them left to right.
    ///
    /// Afterwards both descriptors refer to the freshly split nodes and
    /// `start.offset` is 0.
    pub fn surround<T: TreeAdapter>(
        &mut self,
        index: &mut TextIndex,
        tree: &mut T,
        root: NodeId,
        classes: &[String],
    ) -> Result<Vec<NodeId>, RangeError> {
        if self.is_single_node() {
            let cut = index.truncate(tree, self.start.marker, self.start.offset, self.end.offset)?;
            let node = index.at(cut.index)?.node;
            let container = tree.wrap(node, classes);
            self.end = RangeDescriptor {
                marker: cut.index,
                offset: self.end.offset - self.start.offset,
            };
            self.start = RangeDescriptor {
                marker: cut.index,
                offset: 0,
            };
            return Ok(vec![container]);
        }

        let start_len = index.marker_len(self.start.marker)?;
        let first = index.truncate(tree, self.start.marker, self.start.offset, start_len - 1)?;
        let end_marker = self.end.marker + first.inserted;
        let start_node = index.at(first.index)?.node;
        let end_node = index.at(end_marker)?.node;

        let mut between = Vec::new();
        let mut visitor = NodeVisitor::new(start_node, root);
        loop {
            let node = visitor.next(tree)?;
            if node == end_node {
                break;
            }
            if tree.text_len(node) > 0 {
                between.push(node);
            }
        }

        let last = index.truncate(tree, end_marker, 0, self.end.offset)?;
        let end_node = index.at(last.index)?.node;

        let mut containers = Vec::with_capacity(between.len() + 2);
        containers.push(tree.wrap(start_node, classes));
        for node in between {
            containers.push(tree.wrap(node, classes));
        }
        containers.push(tree.wrap(end_node, classes));

        self.start = RangeDescriptor {
            marker: first.index,
            offset: 0,
        };
        self.end = RangeDescriptor {
            marker: last.index,
            offset: self.end.offset,
        };
        Ok(containers)
    }

    /// Mutation-independent address of the span; the end offset is exclusive
    pub fn compute_address<T: TreeAdapter>(
        &self,
        index: &TextIndex,
        tree: &T,
        root: NodeId,
    ) -> Result<AddressRange, RangeError> {
        let codec = Codec::new(tree, root);
        let start_node = index.at(self.start.marker)?.node;
        let end_node = index.at(self.end.marker)?.node;
        Ok(AddressRange {
            start: AddressPoint {
                address: codec.address_of(start_node)?,
                offset: codec.offset_within_unit(start_node) + self.start.offset,
            },
            end: AddressPoint {
                address: codec.address_of(end_node)?,
                offset: codec.offset_within_unit(end_node) + self.end.offset + 1,
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::Document;
    use pretty_assertions::assert_eq;

    fn setup(markup: &str) -> (Document, TextIndex) {
        let doc = Document::parse_markup(markup).unwrap();
        let index = TextIndex::build(&doc, doc.root()).unwrap();
        (doc, index)
    }

    fn classes() -> Vec<String> {
        vec!["hl".to_string()]
    }

    #[test]
    fn test_visitor_walks_text_in_document_order() {
        let (doc, index) = setup("<p>a<b>b<i>c</i></b><br></br>d</p><p>e</p>");
        let mut visitor = NodeVisitor::new(index.at(0).unwrap().node, doc.root());
        let mut seen = vec![];
        while let Ok(node) = visitor.next(&doc) {
            seen.push(doc.text_of(node).unwrap().to_string());
        }
        assert_eq!(seen, vec!["b", "c", "d", "e"]);
    }

    #[test]
    fn test_visitor_respects_bound() {
        let (doc, index) = setup("<p>a<b>b</b></p><p>c</p>");
        let p = doc.children(doc.root())[0];
        let mut visitor = NodeVisitor::new(index.at(0).unwrap().node, p);
        assert_eq!(visitor.next(&doc), Ok(index.at(1).unwrap().node));
        assert_eq!(visitor.next(&doc), Err(RangeError::OutOfBounds));
    }

    #[test]
    fn test_surround_single_node() {
        let (mut doc, mut index) = setup("<p>hello</p>");
        let root = doc.root();
        let mut range = Range::from_offsets(&index, 1, 3).unwrap();

        let containers = range.surround(&mut index, &mut doc, root, &classes()).unwrap();

        assert_eq!(containers.len(), 1);
        let texts: Vec<_> = index
            .markers()
            .iter()
            .map(|m| doc.text_of(m.node).unwrap())
            .collect();
        assert_eq!(texts, vec!["h", "ell", "o"]);
        assert_eq!(range.start.offset, 0);
        assert_eq!(range.length(&index, &doc, root), Ok(3));
        assert_eq!(range.text(&index).unwrap(), "ell");
        insta::assert_snapshot!(doc.to_markup(), @r#"<p>h<span class="spanmark hl">ell</span>o</p>"#);
    }

    #[test]
    fn test_surround_across_elements() {
        let (mut doc, mut index) = setup("<p>one <b>two</b> three</p>");
        let root = doc.root();
        // "e two th"
        let mut range = Range::from_offsets(&index, 2, 9).unwrap();
        assert_eq!(range.length(&index, &doc, root), Ok(8));

        let containers = range.surround(&mut index, &mut doc, root, &classes()).unwrap();

        assert_eq!(containers.len(), 3);
        assert_eq!(range.length(&index, &doc, root), Ok(8));
        assert_eq!(range.text(&index).unwrap(), "e two th");
        index.check(&doc).unwrap();
        insta::assert_snapshot!(
            doc.to_markup(),
            @r#"<p>on<span class="spanmark hl">e </span><b><span class="spanmark hl">two</span></b><span class="spanmark hl"> th</span>ree</p>"#
        );
    }

    #[test]
    fn test_new_rejects_inverted_range() {
        let (_, index) = setup("<p>hello</p>");
        let result = Range::new(
            &index,
            RangeDescriptor { marker: 0, offset: 3 },
            RangeDescriptor { marker: 0, offset: 1 },
        );
        assert!(matches!(result, Err(RangeError::Invalid(_))));
    }

    #[test]
    fn test_compute_address_uses_exclusive_end() {
        let (doc, index) = setup("<p>hello <b>big</b> world</p>");
        let range = Range::from_offsets(&index, 6, 12).unwrap();
        let address = range.compute_address(&index, &doc, doc.root()).unwrap();

        assert_eq!(address.start, AddressPoint::new("/p[1]/b[1]/text()[1]", 0));
        assert_eq!(address.end, AddressPoint::new("/p[1]/text()[2]", 4));
    }

    #[test]
    fn test_address_is_stable_across_surround_and_unwrap() {
        let (mut doc, mut index) = setup("<div><p>alpha beta</p><p>gamma delta</p></div>");
        let root = doc.root();
        let mut range = Range::from_offsets(&index, 6, 14).unwrap();
        let before = range.compute_address(&index, &doc, root).unwrap();

        let containers = range.surround(&mut index, &mut doc, root, &classes()).unwrap();
        assert_eq!(range.compute_address(&index, &doc, root).unwrap(), before);

        for container in containers {
            doc.unwrap(container);
        }
        doc.normalize(root);
        index.refresh(&doc, root).unwrap();

        let again = Range::from_offsets(&index, 6, 14).unwrap();
        assert_eq!(again.compute_address(&index, &doc, root).unwrap(), before);
        assert_eq!(index.len(), 2);
    }
}
