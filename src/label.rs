//! Hierarchical label parsing and the label-id table.
//!
//! The collector encodes a classification hierarchy as a single string, e.g.
//! `"Coffee > Dunkin > Hazelnut > Yes > No"`. `LabelPath` parses that string
//! once into an explicit ordered list; the derived fields (`category`,
//! `primary_label`, `target_label`) are pure accessors over the list, so no
//! component can drift out of sync by re-parsing differently.
//!
//! `LabelMap` is the explicit id table the tensor path persists alongside its
//! archive: ids are assigned in first-seen order, so re-running over the same
//! inputs in the same order reproduces the same ids.

use ahash::AHashMap;
use serde::Serialize;
use std::collections::BTreeMap;

/// Delimiter between hierarchy components in `sample_name`.
const HIERARCHY_DELIMITER: char = '>';

/// Separator used when re-joining components for display and provenance.
const PATH_SEPARATOR: &str = " / ";

/// Ordered hierarchy of classification labels parsed from a run's
/// `sample_name`.
///
/// Parsing is deterministic and idempotent; the component list is the only
/// stored state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelPath {
    components: Vec<String>,
}

impl LabelPath {
    /// Parse a `sample_name` string.
    ///
    /// Components are split on `>`, trimmed, and empty components dropped.
    /// An empty or whitespace-only input yields an empty path, which marks
    /// the run as unlabeled.
    pub fn parse(sample_name: &str) -> Self {
        let components: Vec<String> = sample_name
            .split(HIERARCHY_DELIMITER)
            .map(str::trim)
            .filter(|part| !part.is_empty())
            .map(str::to_string)
            .collect();
        Self { components }
    }

    /// True when the source string contained no components.
    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }

    /// Number of hierarchy components.
    pub fn len(&self) -> usize {
        self.components.len()
    }

    /// All components in order.
    pub fn components(&self) -> &[String] {
        &self.components
    }

    /// First component, or `""` for an empty path.
    pub fn category(&self) -> &str {
        self.components.first().map(String::as_str).unwrap_or("")
    }

    /// Second component, falling back to the category when the hierarchy has
    /// only one level.
    pub fn primary_label(&self) -> &str {
        self.components
            .get(1)
            .or_else(|| self.components.first())
            .map(String::as_str)
            .unwrap_or("")
    }

    /// Last component. Non-empty whenever the path is non-empty.
    pub fn target_label(&self) -> &str {
        self.components.last().map(String::as_str).unwrap_or("")
    }

    /// Components re-joined with a normalized `" / "` separator.
    pub fn joined(&self) -> String {
        self.components.join(PATH_SEPARATOR)
    }
}

/// Bidirectional mapping from `target_label` strings to stable integer ids.
///
/// Ids are assigned in first-seen order. Batch processing funnels all
/// assignments through a single sequential post-pass over runs in input
/// order, so ids are reproducible regardless of worker scheduling.
#[derive(Debug, Clone, Default)]
pub struct LabelMap {
    index: AHashMap<String, i64>,
    names: Vec<String>,
}

impl LabelMap {
    /// Create an empty label map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the id for `label`, assigning the next id on first occurrence.
    pub fn get_or_insert(&mut self, label: &str) -> i64 {
        if let Some(&id) = self.index.get(label) {
            return id;
        }
        let id = self.names.len() as i64;
        self.index.insert(label.to_string(), id);
        self.names.push(label.to_string());
        id
    }

    /// Look up an id without inserting.
    pub fn id_of(&self, label: &str) -> Option<i64> {
        self.index.get(label).copied()
    }

    /// Look up a label string by id.
    pub fn name_of(&self, id: i64) -> Option<&str> {
        usize::try_from(id)
            .ok()
            .and_then(|i| self.names.get(i))
            .map(String::as_str)
    }

    /// Number of distinct labels.
    pub fn len(&self) -> usize {
        self.names.len()
    }

    /// True when no label has been assigned yet.
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Labels in id order.
    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// Count occurrences of each label id in `labels`, keyed by label string.
    pub fn counts(&self, labels: &[i64]) -> BTreeMap<String, usize> {
        let mut counts: BTreeMap<String, usize> = BTreeMap::new();
        for (id, name) in self.names.iter().enumerate() {
            let n = labels.iter().filter(|&&l| l == id as i64).count();
            counts.insert(name.clone(), n);
        }
        counts
    }
}

impl Serialize for LabelMap {
    /// Serialized as `{label: id}` for `label_map.json`.
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        use serde::ser::SerializeMap;
        let mut map = serializer.serialize_map(Some(self.names.len()))?;
        for (id, name) in self.names.iter().enumerate() {
            map.serialize_entry(name, &(id as i64))?;
        }
        map.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_hierarchy() {
        let path = LabelPath::parse("Coffee > Dunkin > Hazelnut > Yes > No");
        assert_eq!(path.category(), "Coffee");
        assert_eq!(path.primary_label(), "Dunkin");
        assert_eq!(path.target_label(), "No");
        assert_eq!(path.joined(), "Coffee / Dunkin / Hazelnut / Yes / No");
        assert_eq!(path.len(), 5);
    }

    #[test]
    fn test_parse_single_component_falls_back() {
        let path = LabelPath::parse("LooseLabel");
        assert_eq!(path.category(), "LooseLabel");
        assert_eq!(path.primary_label(), "LooseLabel");
        assert_eq!(path.target_label(), "LooseLabel");
        assert_eq!(path.joined(), "LooseLabel");
    }

    #[test]
    fn test_parse_empty_and_whitespace() {
        assert!(LabelPath::parse("").is_empty());
        assert!(LabelPath::parse("   ").is_empty());
        assert!(LabelPath::parse(" > > ").is_empty());
        assert_eq!(LabelPath::parse("").target_label(), "");
    }

    #[test]
    fn test_parse_is_idempotent() {
        let a = LabelPath::parse("Meat > Chicken > Day3");
        let b = LabelPath::parse("Meat > Chicken > Day3");
        assert_eq!(a, b);
        assert_eq!(a.target_label(), b.target_label());
    }

    #[test]
    fn test_parse_trims_irregular_whitespace() {
        let path = LabelPath::parse("Meat>  Chicken  >Day3");
        assert_eq!(path.components(), &["Meat", "Chicken", "Day3"]);
    }

    #[test]
    fn test_label_map_first_seen_order() {
        let mut map = LabelMap::new();
        assert_eq!(map.get_or_insert("No"), 0);
        assert_eq!(map.get_or_insert("Yes"), 1);
        assert_eq!(map.get_or_insert("No"), 0);
        assert_eq!(map.len(), 2);
        assert_eq!(map.name_of(1), Some("Yes"));
        assert_eq!(map.id_of("Yes"), Some(1));
    }

    #[test]
    fn test_label_map_counts() {
        let mut map = LabelMap::new();
        map.get_or_insert("fresh");
        map.get_or_insert("aged");
        let counts = map.counts(&[0, 0, 1, 0]);
        assert_eq!(counts["fresh"], 3);
        assert_eq!(counts["aged"], 1);
    }

    #[test]
    fn test_label_map_serializes_ids() {
        let mut map = LabelMap::new();
        map.get_or_insert("b_first");
        map.get_or_insert("a_second");
        let json = serde_json::to_string(&map).unwrap();
        assert!(json.contains("\"b_first\":0"));
        assert!(json.contains("\"a_second\":1"));
    }
}
