//! Finders - lazy sequences of [`Range`] hits for one query subject
//!
//! Two variants implement the [`Finder`] trait:
//! - [`LiteralFinder`]: case-insensitive literal (or caller-supplied regex) matches
//!   over the flattened text, computed once at construction
//! - [`AddressRangeFinder`]: a single hit described by a mutation-independent
//!   [`AddressRange`]
//!
//! Hits are stored as global offsets, which highlighting never changes, so a finder
//! keeps working while earlier hits are being wrapped.

use regex::{Regex, RegexBuilder};

use crate::adapter::TreeAdapter;
use crate::address::{AddressError, AddressPoint, AddressRange, Codec, Target};
use crate::dom::NodeId;
use crate::index::{IndexError, TextIndex};
use crate::range::{NodeVisitor, Range};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FinderError {
    #[error(transparent)]
    Address(#[from] AddressError),
    #[error(transparent)]
    Index(#[from] IndexError),
    #[error("Invalid range: {0}")]
    InvalidRange(String),
    #[error("Invalid pattern: {0}")]
    Pattern(String),
}

/// One search subject of a query set
#[derive(Debug, Clone)]
pub enum QuerySubject {
    /// Literal text, matched case-insensitively
    Literal(String),
    /// A raw pattern for advanced callers
    Pattern(Regex),
    /// A previously captured address range
    Range(AddressRange),
}

impl From<&str> for QuerySubject {
    fn from(literal: &str) -> Self {
        QuerySubject::Literal(literal.to_string())
    }
}

impl From<AddressRange> for QuerySubject {
    fn from(range: AddressRange) -> Self {
        QuerySubject::Range(range)
    }
}

/// Produces hits until exhausted, then `None`
pub trait Finder {
    fn next(&mut self, index: &TextIndex) -> Option<Range>;
}

/// Construct the finder matching `subject`
pub fn build_finder<T: TreeAdapter>(
    subject: &QuerySubject,
    index: &TextIndex,
    tree: &T,
    root: NodeId,
) -> Result<Box<dyn Finder>, FinderError> {
    Ok(match subject {
        QuerySubject::Literal(literal) => Box::new(LiteralFinder::new(index, literal)?),
        QuerySubject::Pattern(regex) => Box::new(LiteralFinder::with_regex(index, regex)),
        QuerySubject::Range(range) => Box::new(AddressRangeFinder::new(index, tree, root, range)?),
    })
}

#[derive(Debug)]
pub struct LiteralFinder {
    /// (global start, length) in characters
    hits: std::vec::IntoIter<(usize, usize)>,
}

impl LiteralFinder {
    pub fn new(index: &TextIndex, literal: &str) -> Result<Self, FinderError> {
        let regex = RegexBuilder::new(&regex::escape(literal))
            .case_insensitive(true)
            .build()
            .map_err(|e| FinderError::Pattern(e.to_string()))?;
        Ok(Self::with_regex(index, &regex))
    }

    /// Collect every non-overlapping match of `regex` in the flattened text
    pub fn with_regex(index: &TextIndex, regex: &Regex) -> Self {
        let text = index.text();
        let mut hits = Vec::new();
        let (mut byte_pos, mut char_pos) = (0, 0);
        for m in regex.find_iter(text) {
            char_pos += text[byte_pos..m.start()].chars().count();
            let len = m.as_str().chars().count();
            hits.push((char_pos, len));
            char_pos += len;
            byte_pos = m.end();
        }
        LiteralFinder {
            hits: hits.into_iter(),
        }
    }

    /// Hits not yet returned (zero-length ones included)
    pub fn remaining(&self) -> usize {
        self.hits.len()
    }
}

impl Finder for LiteralFinder {
    fn next(&mut self, index: &TextIndex) -> Option<Range> {
        for (start, len) in self.hits.by_ref() {
            if len == 0 {
                continue;
            }
            match Range::from_offsets(index, start, start + len - 1) {
                Ok(range) => return Some(range),
                Err(e) => log::debug!("skipping literal hit at {start}: {e}"),
            }
        }
        None
    }
}

#[derive(Debug)]
pub struct AddressRangeFinder {
    /// Global start and inclusive end
    span: Option<(usize, usize)>,
}

impl AddressRangeFinder {
    /// Resolve both endpoints. An endpoint that no longer resolves (the tree
    /// drifted since the address was captured) leaves the finder empty.
    pub fn new<T: TreeAdapter>(
        index: &TextIndex,
        tree: &T,
        root: NodeId,
        range: &AddressRange,
    ) -> Result<Self, FinderError> {
        let codec = Codec::new(tree, root);
        let resolved = resolve_point(&codec, tree, root, index, &range.start).and_then(|start| {
            resolve_point(&codec, tree, root, index, &range.end).map(|end| (start, end))
        });
        let (start, end) = match resolved {
            Ok(span) => span,
            Err(FinderError::Address(e @ AddressError::Resolution { .. })) => {
                log::warn!("address range no longer resolves, no hits: {e}");
                return Ok(AddressRangeFinder { span: None });
            }
            Err(e) => return Err(e),
        };
        if start >= end {
            return Err(FinderError::InvalidRange(format!(
                "start {start} is not before end {end}"
            )));
        }
        Ok(AddressRangeFinder {
            span: Some((start, end - 1)),
        })
    }
}

impl Finder for AddressRangeFinder {
    fn next(&mut self, index: &TextIndex) -> Option<Range> {
        let (start, end) = self.span.take()?;
        Range::from_offsets(index, start, end)
            .map_err(|e| log::warn!("address range [{start}, {end}] is not indexable: {e}"))
            .ok()
    }
}

/// Global offset of an address point
fn resolve_point<T: TreeAdapter>(
    codec: &Codec<'_, T>,
    tree: &T,
    root: NodeId,
    index: &TextIndex,
    point: &AddressPoint,
) -> Result<usize, FinderError> {
    let drift = |reason: &str| {
        FinderError::Address(AddressError::Resolution {
            address: point.address.clone(),
            reason: reason.to_string(),
        })
    };

    let (node, offset) = match codec.resolve_target(&point.address)? {
        Target::TextUnit(start) => {
            if point.offset > codec.unit_len(start) {
                return Err(drift("offset lies beyond the text unit"));
            }
            let node = codec
                .first_text_in_unit(start)
                .ok_or_else(|| drift("text unit holds no text"))?;
            (node, point.offset)
        }
        Target::Element(element) => {
            // Element endpoints carry a child index. One past the last child keeps
            // the historical fallback: offset 0 of the element's own first text.
            let children = tree.children(element);
            let node = match children.get(point.offset) {
                Some(&child) => codec.first_text_within(child).or_else(|| {
                    NodeVisitor::new(child, root).next(tree).ok()
                }),
                None if point.offset == children.len() => codec.first_text_within(element),
                None => None,
            }
            .ok_or_else(|| drift("no text at element boundary"))?;
            (node, 0)
        }
    };

    let marker = index
        .find(node, 0)
        .ok_or_else(|| drift("resolved node is not indexed"))?;
    Ok(index.at(marker)?.offset + offset)
}
