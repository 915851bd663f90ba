//! Text Index - flattened text over a tree of text and element nodes
//!
//! A depth-first walk concatenates every text node into one string and records a
//! [`Marker`] per text node holding its global character offset. Searching runs
//! against the flattened string; the markers map hits back onto tree nodes.
//!
//! Highlighting splits text nodes but never changes the flattened text, so global
//! offsets computed before a split stay valid after it. [`TextIndex::truncate`] is
//! the only place where that split happens.

use crate::adapter::TreeAdapter;
use crate::dom::NodeId;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IndexError {
    #[error("Offset {offset} is outside the indexed text (length {len})")]
    OutOfRange { offset: usize, len: usize },
    #[error("Marker {index} does not exist ({count} markers)")]
    NoSuchMarker { index: usize, count: usize },
    #[error("Node {0} is not a text node")]
    NotText(NodeId),
    #[error("Cannot truncate [{start}, {end}] out of a text node of length {len}")]
    InvalidTruncation { start: usize, end: usize, len: usize },
    #[error("Index corruption: {0}")]
    Corruption(String),
}

/// Index entry associating a text node with its global character offset
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Marker {
    pub node: NodeId,
    pub offset: usize,
}

/// Outcome of [`TextIndex::truncate`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Truncation {
    /// Marker index now holding the middle slice
    pub index: usize,
    /// Markers inserted in total; later marker indices shift by this amount
    pub inserted: usize,
}

#[derive(Debug, Clone, Default)]
pub struct TextIndex {
    text: String,
    char_len: usize,
    markers: Vec<Marker>,
}

impl TextIndex {
    pub fn build<T: TreeAdapter>(tree: &T, root: NodeId) -> Result<Self, IndexError> {
        let mut index = TextIndex::default();
        index.refresh(tree, root)?;
        Ok(index)
    }

    /// Rebuild the flattened text and markers from the current tree
    pub fn refresh<T: TreeAdapter>(&mut self, tree: &T, root: NodeId) -> Result<(), IndexError> {
        self.text.clear();
        self.markers.clear();
        self.char_len = 0;

        // Pre-order walk; children pushed in reverse so they pop in document order
        let mut stack = vec![root];
        while let Some(node) = stack.pop() {
            if let Some(text) = tree.text_of(node) {
                self.markers.push(Marker {
                    node,
                    offset: self.char_len,
                });
                self.text.push_str(text);
                self.char_len += text.chars().count();
                continue;
            }
            let mut child = tree.last_child(node);
            while let Some(c) = child {
                stack.push(c);
                child = tree.prev_sibling(c);
            }
        }

        if cfg!(debug_assertions) {
            self.check(tree)?;
        }
        log::debug!(
            "text index rebuilt: {} markers, {} chars",
            self.markers.len(),
            self.char_len
        );
        Ok(())
    }

    /// The flattened text
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Length of the flattened text in characters
    pub fn char_len(&self) -> usize {
        self.char_len
    }

    pub fn markers(&self) -> &[Marker] {
        &self.markers
    }

    pub fn len(&self) -> usize {
        self.markers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.markers.is_empty()
    }

    pub fn at(&self, index: usize) -> Result<&Marker, IndexError> {
        self.markers.get(index).ok_or(IndexError::NoSuchMarker {
            index,
            count: self.markers.len(),
        })
    }

    /// Character length of the text node behind marker `index`
    pub fn marker_len(&self, index: usize) -> Result<usize, IndexError> {
        let marker = self.at(index)?;
        let end = self
            .markers
            .get(index + 1)
            .map_or(self.char_len, |next| next.offset);
        Ok(end - marker.offset)
    }

    /// Marker covering the global `offset`: the one with the greatest offset not
    /// exceeding it
    pub fn index_of(&self, offset: usize) -> Result<usize, IndexError> {
        if self.markers.is_empty() || offset >= self.char_len {
            return Err(IndexError::OutOfRange {
                offset,
                len: self.char_len,
            });
        }
        let after = self.markers.partition_point(|m| m.offset <= offset);
        if after == 0 {
            return Err(IndexError::OutOfRange {
                offset,
                len: self.char_len,
            });
        }
        Ok(after - 1)
    }

    /// Marker referencing `node`, scanning from `from`
    pub fn find(&self, node: NodeId, from: usize) -> Option<usize> {
        self.markers
            .iter()
            .enumerate()
            .skip(from)
            .find(|(_, m)| m.node == node)
            .map(|(i, _)| i)
    }

    /// Split the text node behind marker `index` into `[0, start)`, `[start, end]`
    /// and `(end, len)`.
    ///
    /// Non-empty outer pieces get their own markers; the marker at the returned
    /// index is replaced by the middle slice and the original node leaves the tree.
    /// A truncation covering the whole node is a no-op.
    pub fn truncate<T: TreeAdapter>(
        &mut self,
        tree: &mut T,
        index: usize,
        start: usize,
        end: usize,
    ) -> Result<Truncation, IndexError> {
        let marker = *self.at(index)?;
        let text = tree
            .text_of(marker.node)
            .ok_or(IndexError::NotText(marker.node))?
            .to_owned();
        let len = text.chars().count();
        if start > end || end >= len {
            return Err(IndexError::InvalidTruncation { start, end, len });
        }
        if start == 0 && end + 1 == len {
            return Ok(Truncation { index, inserted: 0 });
        }

        let head_end = char_to_byte(&text, start);
        let tail_start = char_to_byte(&text, end + 1);
        let (head, middle, tail) = (
            &text[..head_end],
            &text[head_end..tail_start],
            &text[tail_start..],
        );

        let mut at = index;
        let mut inserted = 0;
        if !head.is_empty() {
            let node = tree.insert_text_before(marker.node, head);
            self.markers.insert(
                at,
                Marker {
                    node,
                    offset: marker.offset,
                },
            );
            at += 1;
            inserted += 1;
        }

        let middle_node = tree.insert_text_before(marker.node, middle);
        self.markers[at] = Marker {
            node: middle_node,
            offset: marker.offset + start,
        };

        if !tail.is_empty() {
            let node = tree.insert_text_before(marker.node, tail);
            self.markers.insert(
                at + 1,
                Marker {
                    node,
                    offset: marker.offset + end + 1,
                },
            );
            inserted += 1;
        }

        tree.remove(marker.node);
        Ok(Truncation {
            index: at,
            inserted,
        })
    }

    /// Verify that markers are contiguous against the node texts they reference
    pub fn check<T: TreeAdapter>(&self, tree: &T) -> Result<(), IndexError> {
        let mut expected = 0;
        for (i, marker) in self.markers.iter().enumerate() {
            if marker.offset != expected {
                return Err(IndexError::Corruption(format!(
                    "marker {i} at offset {} but preceding text ends at {expected}",
                    marker.offset
                )));
            }
            let text = tree
                .text_of(marker.node)
                .ok_or(IndexError::NotText(marker.node))?;
            expected += text.chars().count();
        }
        if expected != self.char_len {
            return Err(IndexError::Corruption(format!(
                "markers cover {expected} chars, flattened text has {}",
                self.char_len
            )));
        }
        Ok(())
    }
}

/// Byte position of the `chars`-th character of `s` (or `s.len()` past the end)
pub(crate) fn char_to_byte(s: &str, chars: usize) -> usize {
    s.char_indices().nth(chars).map_or(s.len(), |(i, _)| i)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::Document;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    fn doc(markup: &str) -> Document {
        Document::parse_markup(markup).unwrap()
    }

    #[rstest]
    #[case("<p>hello</p>")]
    #[case("<div><p>the cat</p><p>the dog</p></div>")]
    #[case("<p>a<b>b<i>c</i></b>d<br></br>e</p>")]
    #[case("<p>ünï<b>cödé</b>✓</p>")]
    fn test_markers_are_contiguous(#[case] markup: &str) {
        let doc = doc(markup);
        let index = TextIndex::build(&doc, doc.root()).unwrap();

        for pair in index.markers().windows(2) {
            let len = doc.text_len(pair[0].node);
            assert_eq!(pair[1].offset, pair[0].offset + len);
        }
        assert_eq!(index.text(), doc.text_content(doc.root()));
    }

    #[test]
    fn test_index_of_picks_covering_marker() {
        let doc = doc("<p>abc<b>def</b>gh</p>");
        let index = TextIndex::build(&doc, doc.root()).unwrap();

        assert_eq!(index.index_of(0), Ok(0));
        assert_eq!(index.index_of(2), Ok(0));
        assert_eq!(index.index_of(3), Ok(1));
        assert_eq!(index.index_of(7), Ok(2));
        assert_eq!(
            index.index_of(8),
            Err(IndexError::OutOfRange { offset: 8, len: 8 })
        );
    }

    #[test]
    fn test_index_of_on_empty_tree() {
        let doc = Document::new();
        let index = TextIndex::build(&doc, doc.root()).unwrap();
        assert!(index.is_empty());
        assert!(index.index_of(0).is_err());
    }

    #[test]
    fn test_find_and_at() {
        let doc = doc("<p>abc<b>def</b></p>");
        let index = TextIndex::build(&doc, doc.root()).unwrap();
        let second = index.at(1).unwrap().node;

        assert_eq!(index.find(second, 0), Some(1));
        assert_eq!(index.find(second, 2), None);
        assert_eq!(index.find(doc.root(), 0), None);
        assert!(index.at(2).is_err());
    }

    #[test]
    fn test_truncate_splits_into_three() {
        let mut doc = doc("<p>hello</p>");
        let root = doc.root();
        let mut index = TextIndex::build(&doc, root).unwrap();

        let truncation = index.truncate(&mut doc, 0, 1, 3).unwrap();

        assert_eq!(truncation, Truncation { index: 1, inserted: 2 });
        let texts: Vec<_> = index
            .markers()
            .iter()
            .map(|m| doc.text_of(m.node).unwrap().to_string())
            .collect();
        assert_eq!(texts, vec!["h", "ell", "o"]);
        assert_eq!(
            index.markers().iter().map(|m| m.offset).collect::<Vec<_>>(),
            vec![0, 1, 4]
        );
        index.check(&doc).unwrap();
        assert_eq!(doc.text_content(root), "hello");
    }

    #[test]
    fn test_truncate_prefix_only_inserts_tail() {
        let mut doc = doc("<p>hello</p>");
        let mut index = TextIndex::build(&doc, doc.root()).unwrap();

        let truncation = index.truncate(&mut doc, 0, 0, 1).unwrap();

        assert_eq!(truncation, Truncation { index: 0, inserted: 1 });
        assert_eq!(doc.text_of(index.at(0).unwrap().node), Some("he"));
        assert_eq!(doc.text_of(index.at(1).unwrap().node), Some("llo"));
    }

    #[test]
    fn test_truncate_whole_node_is_noop() {
        let mut doc = doc("<p>hello</p>");
        let mut index = TextIndex::build(&doc, doc.root()).unwrap();
        let node = index.at(0).unwrap().node;

        let truncation = index.truncate(&mut doc, 0, 0, 4).unwrap();

        assert_eq!(truncation, Truncation { index: 0, inserted: 0 });
        assert_eq!(index.at(0).unwrap().node, node);
    }

    #[test]
    fn test_truncate_rejects_bad_bounds() {
        let mut doc = doc("<p>hi</p>");
        let mut index = TextIndex::build(&doc, doc.root()).unwrap();
        assert_eq!(
            index.truncate(&mut doc, 0, 1, 2),
            Err(IndexError::InvalidTruncation {
                start: 1,
                end: 2,
                len: 2
            })
        );
    }

    #[test]
    fn test_check_detects_drift() {
        let original = doc("<p>abc</p>");
        let index = TextIndex::build(&original, original.root()).unwrap();

        // Same arena layout, longer text behind the indexed node
        let drifted = doc("<p>abcd</p>");
        assert!(matches!(
            index.check(&drifted),
            Err(IndexError::Corruption(_))
        ));
        assert!(index.check(&original).is_ok());
    }
}
