//! Node-Address Codec
//!
//! Converts between tree positions and path strings such as
//! `/div[1]/p[2]/text()[1]`. Paths are computed against the *normalized* tree: a run
//! of adjacent text nodes and highlight containers counts as one text unit, and
//! highlight containers never contribute a path segment. An address captured before
//! highlighting therefore still resolves after any number of highlight/unhighlight
//! cycles.
//!
//! Offsets paired with an address count characters from the start of the text unit,
//! see [`Codec::offset_within_unit`].

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::adapter::TreeAdapter;
use crate::dom::NodeId;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AddressError {
    #[error("Malformed address `{0}`")]
    Malformed(String),
    #[error("Address `{address}` does not resolve: {reason}")]
    Resolution { address: String, reason: String },
    #[error("Node {0} is not attached below the addressed root")]
    Detached(NodeId),
}

impl AddressError {
    fn resolution(address: &str, reason: impl Into<String>) -> Self {
        AddressError::Resolution {
            address: address.to_string(),
            reason: reason.into(),
        }
    }
}

/// One path step
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    /// nth (1-based) non-highlight child element with `tag`
    Element { tag: String, nth: usize },
    /// nth (1-based) normalized text unit
    Text { nth: usize },
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Step::Element { tag, nth } => write!(f, "{tag}[{nth}]"),
            Step::Text { nth } => write!(f, "text()[{nth}]"),
        }
    }
}

/// Parse an address into its steps. A text step may only appear last.
pub fn parse(address: &str) -> Result<Vec<Step>, AddressError> {
    let malformed = || AddressError::Malformed(address.to_string());
    let body = address.strip_prefix('/').ok_or_else(malformed)?;
    if body.is_empty() {
        return Ok(Vec::new());
    }

    let mut steps = Vec::new();
    for segment in body.split('/') {
        if matches!(steps.last(), Some(Step::Text { .. })) {
            return Err(malformed());
        }
        let (name, rest) = segment.split_once('[').ok_or_else(malformed)?;
        let nth: usize = rest
            .strip_suffix(']')
            .and_then(|n| n.parse().ok())
            .filter(|n| *n > 0)
            .ok_or_else(malformed)?;
        if name.is_empty() {
            return Err(malformed());
        }
        steps.push(if name == "text()" {
            Step::Text { nth }
        } else {
            Step::Element {
                tag: name.to_string(),
                nth,
            }
        });
    }
    Ok(steps)
}

/// What an address points at
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    /// First node (text or highlight container) of a text unit
    TextUnit(NodeId),
    Element(NodeId),
}

/// Address codec bound to a tree and the subtree root addresses are relative to
pub struct Codec<'a, T: TreeAdapter> {
    tree: &'a T,
    root: NodeId,
}

impl<'a, T: TreeAdapter> Codec<'a, T> {
    pub fn new(tree: &'a T, root: NodeId) -> Self {
        Codec { tree, root }
    }

    /// Normalized address of the text unit containing `node`
    pub fn address_of(&self, node: NodeId) -> Result<String, AddressError> {
        let unit = self.lift_out_of_highlights(node);
        let parent = self.tree.parent(unit).ok_or(AddressError::Detached(node))?;

        let mut steps = vec![Step::Text {
            nth: self.text_unit_index(unit),
        }];
        let mut current = parent;
        while current != self.root {
            if !self.tree.is_highlight(current) {
                let tag = self
                    .tree
                    .tag_name(current)
                    .ok_or(AddressError::Detached(node))?;
                let nth = self.tree.index_among_siblings(current, &|s| {
                    !self.tree.is_highlight(s) && self.tree.tag_name(s) == Some(tag)
                });
                steps.push(Step::Element {
                    tag: tag.to_string(),
                    nth,
                });
            }
            current = self
                .tree
                .parent(current)
                .ok_or(AddressError::Detached(node))?;
        }

        let path: Vec<String> = steps.iter().rev().map(Step::to_string).collect();
        Ok(format!("/{}", path.join("/")))
    }

    /// Resolve an address to the first text node of the unit it names
    pub fn resolve(&self, address: &str) -> Result<NodeId, AddressError> {
        match self.resolve_target(address)? {
            Target::TextUnit(start) => self
                .first_text_in_unit(start)
                .ok_or_else(|| AddressError::resolution(address, "text unit holds no text")),
            Target::Element(_) => Err(AddressError::resolution(
                address,
                "address names an element, not a text unit",
            )),
        }
    }

    /// Resolve an address to either a text unit or an element
    pub fn resolve_target(&self, address: &str) -> Result<Target, AddressError> {
        let mut current = self.root;
        for step in parse(address)? {
            match step {
                Step::Element { tag, nth } => {
                    current = self.nth_element(current, &tag, nth).ok_or_else(|| {
                        AddressError::resolution(address, format!("no {tag}[{nth}]"))
                    })?;
                }
                Step::Text { nth } => {
                    let start = self.nth_text_unit(current, nth).ok_or_else(|| {
                        AddressError::resolution(address, format!("no text()[{nth}]"))
                    })?;
                    return Ok(Target::TextUnit(start));
                }
            }
        }
        Ok(Target::Element(current))
    }

    /// Normalized characters preceding `node` within its own text unit.
    ///
    /// Walks left through siblings, stepping out of enclosing highlight containers,
    /// and stops at the first node that is neither text nor a highlight.
    pub fn offset_within_unit(&self, node: NodeId) -> usize {
        let mut total = 0;
        let mut current = node;
        loop {
            let mut sibling = self.tree.prev_sibling(current);
            while let Some(s) = sibling {
                if self.tree.is_text(s) {
                    total += self.tree.text_len(s);
                } else if self.tree.is_highlight(s) {
                    total += self.tree.deep_text_len(s);
                } else {
                    return total;
                }
                sibling = self.tree.prev_sibling(s);
            }
            match self.tree.parent(current) {
                Some(parent) if parent != self.root && self.tree.is_highlight(parent) => {
                    current = parent;
                }
                _ => return total,
            }
        }
    }

    /// Total characters in the unit starting at `start`
    pub fn unit_len(&self, start: NodeId) -> usize {
        self.unit_members(start)
            .into_iter()
            .map(|n| self.tree.deep_text_len(n))
            .sum()
    }

    /// First non-empty text node of the unit starting at `start`
    pub fn first_text_in_unit(&self, start: NodeId) -> Option<NodeId> {
        self.unit_members(start)
            .into_iter()
            .find_map(|n| self.first_text_within(n))
    }

    /// First non-empty text node at or below `node`
    pub fn first_text_within(&self, node: NodeId) -> Option<NodeId> {
        if self.tree.is_text(node) {
            return (self.tree.text_len(node) > 0).then_some(node);
        }
        let mut child = self.tree.first_child(node);
        while let Some(c) = child {
            if let Some(found) = self.first_text_within(c) {
                return Some(found);
            }
            child = self.tree.next_sibling(c);
        }
        None
    }

    fn unit_members(&self, start: NodeId) -> Vec<NodeId> {
        let mut members = Vec::new();
        let mut current = Some(start);
        while let Some(n) = current {
            if !self.tree.is_text_like(n) {
                break;
            }
            members.push(n);
            current = self.tree.next_sibling(n);
        }
        members
    }

    fn lift_out_of_highlights(&self, node: NodeId) -> NodeId {
        let mut current = node;
        while let Some(parent) = self.tree.parent(current) {
            if parent == self.root || !self.tree.is_highlight(parent) {
                break;
            }
            current = parent;
        }
        current
    }

    /// Empty text nodes vanish under normalization, so they neither start nor
    /// break a run
    fn is_empty_text(&self, node: NodeId) -> bool {
        self.tree.text_of(node).is_some_and(str::is_empty)
    }

    fn text_unit_index(&self, unit: NodeId) -> usize {
        let mut nth = 1;
        let mut in_run = true;
        let mut sibling = self.tree.prev_sibling(unit);
        while let Some(s) = sibling {
            if !self.is_empty_text(s) {
                if self.tree.is_text_like(s) {
                    if !in_run {
                        nth += 1;
                        in_run = true;
                    }
                } else {
                    in_run = false;
                }
            }
            sibling = self.tree.prev_sibling(s);
        }
        nth
    }

    fn nth_element(&self, parent: NodeId, tag: &str, nth: usize) -> Option<NodeId> {
        self.tree
            .children(parent)
            .into_iter()
            .filter(|c| !self.tree.is_highlight(*c) && self.tree.tag_name(*c) == Some(tag))
            .nth(nth - 1)
    }

    fn nth_text_unit(&self, parent: NodeId, nth: usize) -> Option<NodeId> {
        let mut seen = 0;
        let mut in_run = false;
        for child in self.tree.children(parent) {
            if self.is_empty_text(child) {
                continue;
            }
            if self.tree.is_text_like(child) {
                if !in_run {
                    seen += 1;
                    if seen == nth {
                        return Some(child);
                    }
                    in_run = true;
                }
            } else {
                in_run = false;
            }
        }
        None
    }
}

/// An address plus a character offset within the addressed unit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddressPoint {
    pub address: String,
    pub offset: usize,
}

impl AddressPoint {
    pub fn new(address: impl Into<String>, offset: usize) -> Self {
        AddressPoint {
            address: address.into(),
            offset,
        }
    }
}

/// A mutation-independent span: start inclusive, end exclusive
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddressRange {
    pub start: AddressPoint,
    pub end: AddressPoint,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::Document;
    use crate::index::TextIndex;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    const SAMPLE: &str = "<div><p>alpha <b>beta</b> gamma</p><p>delta</p></div><p>epsilon</p>";

    fn texts(doc: &Document) -> Vec<NodeId> {
        let index = TextIndex::build(doc, doc.root()).unwrap();
        index.markers().iter().map(|m| m.node).collect()
    }

    #[rstest]
    #[case("/div[1]/p[1]/text()[1]", Step::Text { nth: 1 })]
    #[case("/p[12]", Step::Element { tag: "p".into(), nth: 12 })]
    fn test_parse_last_step(#[case] address: &str, #[case] last: Step) {
        assert_eq!(parse(address).unwrap().last(), Some(&last));
    }

    #[rstest]
    #[case("div[1]")]
    #[case("/div")]
    #[case("/div[0]")]
    #[case("/text()[1]/p[1]")]
    #[case("/[1]")]
    fn test_parse_rejects_malformed(#[case] address: &str) {
        assert!(matches!(parse(address), Err(AddressError::Malformed(_))));
    }

    #[test]
    fn test_address_of_sample_nodes() {
        let doc = Document::parse_markup(SAMPLE).unwrap();
        let codec = Codec::new(&doc, doc.root());
        let addresses: Vec<String> = texts(&doc)
            .into_iter()
            .map(|n| codec.address_of(n).unwrap())
            .collect();

        assert_eq!(
            addresses,
            vec![
                "/div[1]/p[1]/text()[1]",
                "/div[1]/p[1]/b[1]/text()[1]",
                "/div[1]/p[1]/text()[2]",
                "/div[1]/p[2]/text()[1]",
                "/p[1]/text()[1]",
            ]
        );
    }

    #[test]
    fn test_resolve_roundtrip_before_highlighting() {
        let doc = Document::parse_markup(SAMPLE).unwrap();
        let codec = Codec::new(&doc, doc.root());
        for node in texts(&doc) {
            let address = codec.address_of(node).unwrap();
            assert_eq!(codec.resolve(&address), Ok(node), "{address}");
        }
    }

    #[test]
    fn test_address_survives_fragmentation() {
        let mut doc = Document::parse_markup("<p>hello world</p>").unwrap();
        let root = doc.root();
        let mut index = TextIndex::build(&doc, root).unwrap();
        let original = Codec::new(&doc, root)
            .address_of(index.at(0).unwrap().node)
            .unwrap();

        let truncation = index.truncate(&mut doc, 0, 6, 10).unwrap();
        let middle = index.at(truncation.index).unwrap().node;
        doc.wrap(middle, &[]);

        let codec = Codec::new(&doc, root);
        assert_eq!(codec.address_of(middle).unwrap(), original);
        assert_eq!(codec.offset_within_unit(middle), 6);
        assert_eq!(codec.address_of(index.at(0).unwrap().node).unwrap(), original);
        assert_eq!(codec.resolve(&original), Ok(index.at(0).unwrap().node));
    }

    #[test]
    fn test_offset_within_unit_stops_at_unrelated_node() {
        let doc = Document::parse_markup("<p>ab<i>cd</i>ef</p>").unwrap();
        let codec = Codec::new(&doc, doc.root());
        let nodes = texts(&doc);

        assert_eq!(codec.offset_within_unit(nodes[0]), 0);
        assert_eq!(codec.offset_within_unit(nodes[2]), 0);
        assert_eq!(codec.address_of(nodes[2]).unwrap(), "/p[1]/text()[2]");
    }

    #[test]
    fn test_offset_within_nested_highlights() {
        let mut doc = Document::parse_markup("<p>abcdef</p>").unwrap();
        let root = doc.root();
        let mut index = TextIndex::build(&doc, root).unwrap();
        let t = index.truncate(&mut doc, 0, 2, 3).unwrap();
        let cd = index.at(t.index).unwrap().node;
        let inner = doc.wrap(cd, &[]);
        doc.wrap(inner, &[]);

        let codec = Codec::new(&doc, root);
        assert_eq!(codec.offset_within_unit(cd), 2);
        let ef = index.at(t.index + 1).unwrap().node;
        assert_eq!(codec.offset_within_unit(ef), 4);
        assert_eq!(codec.unit_len(index.at(0).unwrap().node), 6);
    }

    #[test]
    fn test_highlight_siblings_do_not_count_as_elements() {
        let mut doc =
            Document::parse_markup("<div>x<span>y</span><span>z</span></div>").unwrap();
        let root = doc.root();
        let nodes = texts(&doc);
        doc.wrap(nodes[0], &[]);

        let codec = Codec::new(&doc, root);
        assert_eq!(
            codec.address_of(nodes[2]).unwrap(),
            "/div[1]/span[2]/text()[1]"
        );
        assert_eq!(codec.resolve("/div[1]/span[2]/text()[1]"), Ok(nodes[2]));
        assert_eq!(codec.address_of(nodes[0]).unwrap(), "/div[1]/text()[1]");
    }

    #[test]
    fn test_resolve_reports_drift() {
        let doc = Document::parse_markup(SAMPLE).unwrap();
        let codec = Codec::new(&doc, doc.root());
        assert!(matches!(
            codec.resolve("/div[1]/p[3]/text()[1]"),
            Err(AddressError::Resolution { .. })
        ));
        assert!(matches!(
            codec.resolve("/div[1]/p[2]/text()[2]"),
            Err(AddressError::Resolution { .. })
        ));
        assert!(matches!(
            codec.resolve("/div[1]"),
            Err(AddressError::Resolution { .. })
        ));
    }
}
