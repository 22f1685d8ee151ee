//! Result aggregation and selection over a comparison result.
//!
//! Holds transient selection state only; nothing here performs I/O.

use rustc_hash::FxHashSet;
use serde::Serialize;

use crate::models::{DeleteTarget, DuplicateRecord, MatchType, VariationType};

// ============================================================================
// Grouping and Stats
// ============================================================================

/// Records sharing one variation type, in comparison order.
#[derive(Debug, Clone)]
pub struct VariationGroup<'a> {
    pub variation: Option<VariationType>,
    pub records: Vec<&'a DuplicateRecord>,
}

impl VariationGroup<'_> {
    pub fn label(&self) -> &'static str {
        self.variation.map(VariationType::label).unwrap_or("Unqualified")
    }

    pub fn uris(&self) -> impl Iterator<Item = &str> + '_ {
        self.records.iter().map(|r| r.uri())
    }
}

/// Group records by variation type. Groups appear in the order their type
/// is first seen; records keep their relative order within a group.
pub fn group_by_variation(records: &[DuplicateRecord]) -> Vec<VariationGroup<'_>> {
    let mut groups: Vec<VariationGroup<'_>> = Vec::new();
    for record in records {
        match groups.iter_mut().find(|g| g.variation == record.variation_type) {
            Some(group) => group.records.push(record),
            None => groups.push(VariationGroup {
                variation: record.variation_type,
                records: vec![record],
            }),
        }
    }
    groups
}

/// Summary shown next to a comparison result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompareStats {
    pub left_total: usize,
    pub right_total: usize,
    pub duplicates_found: usize,
}

impl CompareStats {
    pub fn new(left_total: usize, right_total: usize, records: &[DuplicateRecord]) -> Self {
        Self {
            left_total,
            right_total,
            duplicates_found: records.len(),
        }
    }
}

// ============================================================================
// Selection
// ============================================================================

/// Chosen track URIs plus the playlist(s) they will be removed from.
#[derive(Debug, Clone, Default)]
pub struct Selection {
    selected: FxHashSet<String>,
    pub delete_from: DeleteTarget,
}

impl Selection {
    pub fn new(delete_from: DeleteTarget) -> Self {
        Self {
            selected: FxHashSet::default(),
            delete_from,
        }
    }

    pub fn is_selected(&self, uri: &str) -> bool {
        self.selected.contains(uri)
    }

    pub fn len(&self) -> usize {
        self.selected.len()
    }

    pub fn is_empty(&self) -> bool {
        self.selected.is_empty()
    }

    pub fn select(&mut self, uri: &str) {
        self.selected.insert(uri.to_string());
    }

    pub fn deselect(&mut self, uri: &str) {
        self.selected.remove(uri);
    }

    pub fn toggle(&mut self, uri: &str) {
        if !self.selected.remove(uri) {
            self.selected.insert(uri.to_string());
        }
    }

    /// Select every record of `variation`, or deselect them all if every one
    /// is already selected.
    pub fn toggle_variation(&mut self, records: &[DuplicateRecord], variation: Option<VariationType>) {
        let of_type: Vec<&str> = records
            .iter()
            .filter(|r| r.variation_type == variation)
            .map(|r| r.uri())
            .collect();

        if of_type.iter().all(|uri| self.selected.contains(*uri)) {
            for uri in of_type {
                self.selected.remove(uri);
            }
        } else {
            self.selected.extend(of_type.into_iter().map(str::to_string));
        }
    }

    pub fn select_match_type(&mut self, records: &[DuplicateRecord], match_type: MatchType) {
        self.selected.extend(
            records
                .iter()
                .filter(|r| r.match_type == match_type)
                .map(|r| r.uri().to_string()),
        );
    }

    pub fn select_all(&mut self, records: &[DuplicateRecord]) {
        self.selected.extend(records.iter().map(|r| r.uri().to_string()));
    }

    pub fn deselect_all(&mut self) {
        self.selected.clear();
    }

    /// Deselect everything when all records are selected, otherwise select all.
    pub fn toggle_all(&mut self, records: &[DuplicateRecord]) {
        if self.all_selected(records) {
            self.deselect_all();
        } else {
            self.select_all(records);
        }
    }

    pub fn all_selected(&self, records: &[DuplicateRecord]) -> bool {
        !records.is_empty() && records.iter().all(|r| self.selected.contains(r.uri()))
    }

    /// Selected URIs in comparison order.
    pub fn selected_uris(&self, records: &[DuplicateRecord]) -> Vec<String> {
        records
            .iter()
            .filter(|r| self.selected.contains(r.uri()))
            .map(|r| r.uri().to_string())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Track;

    fn record(uri: &str, variation: Option<VariationType>) -> DuplicateRecord {
        let track = Track {
            name: uri.to_string(),
            uri: uri.to_string(),
            ..Default::default()
        };
        match variation {
            None => DuplicateRecord::exact(track),
            Some(v) => DuplicateRecord::similar(track, Some(v)),
        }
    }

    fn sample() -> Vec<DuplicateRecord> {
        vec![
            record("a", Some(VariationType::Live)),
            record("b", None),
            record("c", Some(VariationType::Remix)),
            record("d", Some(VariationType::Live)),
            record("e", None),
        ]
    }

    #[test]
    fn test_group_by_variation_preserves_order() {
        let records = sample();
        let groups = group_by_variation(&records);

        let order: Vec<_> = groups.iter().map(|g| g.variation).collect();
        assert_eq!(
            order,
            vec![Some(VariationType::Live), None, Some(VariationType::Remix)]
        );
        assert_eq!(groups[0].uris().collect::<Vec<_>>(), vec!["a", "d"]);
        assert_eq!(groups[1].uris().collect::<Vec<_>>(), vec!["b", "e"]);
        assert_eq!(groups[0].label(), "Live");
    }

    #[test]
    fn test_group_empty() {
        assert!(group_by_variation(&[]).is_empty());
    }

    #[test]
    fn test_toggle_single() {
        let mut selection = Selection::default();
        selection.toggle("a");
        assert!(selection.is_selected("a"));
        selection.toggle("a");
        assert!(!selection.is_selected("a"));

        selection.select("b");
        selection.select("b");
        assert_eq!(selection.len(), 1);
        selection.deselect("b");
        assert!(selection.is_empty());
    }

    #[test]
    fn test_toggle_variation() {
        let records = sample();
        let mut selection = Selection::default();

        selection.toggle_variation(&records, Some(VariationType::Live));
        assert_eq!(selection.selected_uris(&records), vec!["a", "d"]);

        // Partially selected group gets completed, not cleared
        selection.deselect("d");
        selection.toggle_variation(&records, Some(VariationType::Live));
        assert_eq!(selection.selected_uris(&records), vec!["a", "d"]);

        // Fully selected group gets cleared, other selections stay
        selection.select("c");
        selection.toggle_variation(&records, Some(VariationType::Live));
        assert_eq!(selection.selected_uris(&records), vec!["c"]);
    }

    #[test]
    fn test_select_all_and_toggle_all() {
        let records = sample();
        let mut selection = Selection::new(DeleteTarget::Right);
        assert_eq!(selection.delete_from, DeleteTarget::Right);

        selection.toggle_all(&records);
        assert!(selection.all_selected(&records));
        assert_eq!(selection.len(), 5);

        selection.toggle_all(&records);
        assert!(selection.is_empty());

        selection.select_all(&records);
        selection.deselect_all();
        assert!(selection.is_empty());
        assert!(!selection.all_selected(&[]));
    }

    #[test]
    fn test_select_match_type() {
        let records = sample();
        let mut selection = Selection::default();
        selection.select_match_type(&records, MatchType::Exact);
        assert_eq!(selection.selected_uris(&records), vec!["b", "e"]);
    }

    #[test]
    fn test_stats() {
        let records = sample();
        let stats = CompareStats::new(120, 80, &records);
        assert_eq!(stats.duplicates_found, 5);
        assert_eq!(stats.left_total, 120);
        assert_eq!(stats.right_total, 80);

        let json = serde_json::to_value(stats).unwrap();
        assert_eq!(json["duplicatesFound"], 5);
        assert_eq!(json["leftTotal"], 120);
    }
}
