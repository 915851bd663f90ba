//! Highlight registry
//!
//! Document-ordered list of every live highlight. Entries are keyed by the global
//! offset of the highlight's first character; equal offsets keep insertion order.

use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    #[error("Registry invariant violated: {0}")]
    InvariantViolation(String),
}

/// Opaque handle of one highlight, unique within a [`crate::Highlighter`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct HighlightId(pub u64);

impl fmt::Display for HighlightId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HighlightEntry {
    pub query_set: String,
    pub id: HighlightId,
    pub offset: usize,
}

#[derive(Debug, Clone, Default)]
pub struct HighlightRegistry {
    entries: Vec<HighlightEntry>,
}

impl HighlightRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert keeping entries ordered by offset, after any entry at the same offset
    pub fn add(&mut self, query_set: &str, id: HighlightId, offset: usize) {
        let at = self.entries.partition_point(|e| e.offset <= offset);
        self.entries.insert(
            at,
            HighlightEntry {
                query_set: query_set.to_string(),
                id,
                offset,
            },
        );
    }

    /// Drop every entry of `query_set`, returning how many were removed
    pub fn remove_all(&mut self, query_set: &str) -> usize {
        let before = self.entries.len();
        self.entries.retain(|e| e.query_set != query_set);
        before - self.entries.len()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// The `n`th (0-based) entry accepted by `accept`, in document order
    pub fn find_ordinal(
        &self,
        n: usize,
        accept: &dyn Fn(&HighlightEntry) -> bool,
    ) -> Option<&HighlightEntry> {
        self.entries.iter().filter(|e| accept(e)).nth(n)
    }

    /// Position of `id` among the entries passing `accept`
    pub fn ordinal_of(
        &self,
        id: HighlightId,
        accept: &dyn Fn(&HighlightEntry) -> bool,
    ) -> Option<usize> {
        self.entries
            .iter()
            .filter(|e| accept(e))
            .position(|e| e.id == id)
    }

    pub fn count(&self, accept: &dyn Fn(&HighlightEntry) -> bool) -> usize {
        self.entries.iter().filter(|e| accept(e)).count()
    }

    pub fn entries(&self) -> &[HighlightEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Verify ordering and that the entry count matches `expected` (the sum of
    /// query set match counts)
    pub fn check(&self, expected: usize) -> Result<(), RegistryError> {
        if let Some(pair) = self.entries.windows(2).find(|w| w[0].offset > w[1].offset) {
            return Err(RegistryError::InvariantViolation(format!(
                "highlight {} at {} precedes highlight {} at {}",
                pair[0].id, pair[0].offset, pair[1].id, pair[1].offset
            )));
        }
        if self.entries.len() != expected {
            return Err(RegistryError::InvariantViolation(format!(
                "{} entries registered, query sets account for {expected}",
                self.entries.len()
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn offsets(registry: &HighlightRegistry) -> Vec<(u64, usize)> {
        registry.entries().iter().map(|e| (e.id.0, e.offset)).collect()
    }

    #[test]
    fn test_add_keeps_document_order() {
        let mut registry = HighlightRegistry::new();
        registry.add("a", HighlightId(1), 20);
        registry.add("a", HighlightId(2), 5);
        registry.add("b", HighlightId(3), 12);
        registry.add("b", HighlightId(4), 30);
        assert_eq!(offsets(&registry), vec![(2, 5), (3, 12), (1, 20), (4, 30)]);
        assert!(registry.check(4).is_ok());
    }

    #[test]
    fn test_equal_offsets_keep_insertion_order() {
        let mut registry = HighlightRegistry::new();
        registry.add("a", HighlightId(1), 7);
        registry.add("b", HighlightId(2), 7);
        registry.add("c", HighlightId(3), 7);
        assert_eq!(offsets(&registry), vec![(1, 7), (2, 7), (3, 7)]);
    }

    #[test]
    fn test_remove_all_only_touches_one_query_set() {
        let mut registry = HighlightRegistry::new();
        registry.add("a", HighlightId(1), 0);
        registry.add("b", HighlightId(2), 3);
        registry.add("a", HighlightId(3), 6);
        assert_eq!(registry.remove_all("a"), 2);
        assert_eq!(offsets(&registry), vec![(2, 3)]);
        assert_eq!(registry.remove_all("missing"), 0);
    }

    #[test]
    fn test_find_ordinal_with_filter() {
        let mut registry = HighlightRegistry::new();
        registry.add("a", HighlightId(1), 0);
        registry.add("b", HighlightId(2), 3);
        registry.add("a", HighlightId(3), 6);

        let only_a = |e: &HighlightEntry| e.query_set == "a";
        assert_eq!(registry.find_ordinal(1, &only_a).map(|e| e.id), Some(HighlightId(3)));
        assert_eq!(registry.find_ordinal(2, &only_a), None);
        assert_eq!(registry.count(&only_a), 2);
        assert_eq!(registry.count(&|_| true), 3);
    }

    #[test]
    fn test_ordinal_of_follows_filter() {
        let mut registry = HighlightRegistry::new();
        registry.add("a", HighlightId(1), 0);
        registry.add("b", HighlightId(2), 3);
        registry.add("a", HighlightId(3), 6);

        let only_a = |e: &HighlightEntry| e.query_set == "a";
        assert_eq!(registry.ordinal_of(HighlightId(3), &|_| true), Some(2));
        assert_eq!(registry.ordinal_of(HighlightId(3), &only_a), Some(1));
        assert_eq!(registry.ordinal_of(HighlightId(2), &only_a), None);
    }

    #[test]
    fn test_check_reports_count_mismatch() {
        let mut registry = HighlightRegistry::new();
        registry.add("a", HighlightId(1), 0);
        assert!(matches!(
            registry.check(2),
            Err(RegistryError::InvariantViolation(_))
        ));
    }
}
