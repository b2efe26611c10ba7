//! Split registry
//!
//! Provides [`SplitRegistry`], the mapping of split name to variant weights
//! that every assignment is computed against.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Relative weights for the variants of one split
///
/// Keyed by variant name. `BTreeMap` keeps iteration lexicographic, which the
/// variant calculator relies on for reproducible cumulative ranges.
pub type Weighting = BTreeMap<String, u32>;

/// Registry of every known split and its weighting
///
/// Fetched once from the remote authority and treated as immutable for the
/// lifetime of the visitor (or process cache) holding it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SplitRegistry {
    splits: BTreeMap<String, Weighting>,
}

impl SplitRegistry {
    /// Create an empty registry
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add (or replace) a split
    #[must_use]
    pub fn with_split<I, V>(mut self, split_name: impl Into<String>, weights: I) -> Self
    where
        I: IntoIterator<Item = (V, u32)>,
        V: Into<String>,
    {
        self.insert(split_name, weights);
        self
    }

    /// Insert (or replace) a split
    pub fn insert<I, V>(&mut self, split_name: impl Into<String>, weights: I)
    where
        I: IntoIterator<Item = (V, u32)>,
        V: Into<String>,
    {
        let weighting = weights.into_iter().map(|(v, w)| (v.into(), w)).collect();
        self.splits.insert(split_name.into(), weighting);
    }

    /// Weighting for a split, if registered
    #[inline]
    #[must_use]
    pub fn weighting(&self, split_name: &str) -> Option<&Weighting> {
        self.splits.get(split_name)
    }

    /// Weighting for a split, failing loudly when it is unknown
    ///
    /// # Errors
    /// Returns [`SplitError::UnknownSplit`] if the split is not registered
    pub fn require(&self, split_name: &str) -> Result<&Weighting, SplitError> {
        self.weighting(split_name)
            .ok_or_else(|| SplitError::UnknownSplit(split_name.to_string()))
    }

    /// Whether the split is registered
    #[inline]
    #[must_use]
    pub fn contains(&self, split_name: &str) -> bool {
        self.splits.contains_key(split_name)
    }

    /// Variant names of a split in lexicographic order
    #[must_use]
    pub fn variants(&self, split_name: &str) -> Option<Vec<&str>> {
        self.weighting(split_name)
            .map(|w| w.keys().map(String::as_str).collect())
    }

    /// Whether `variant` is defined for `split_name`
    #[inline]
    #[must_use]
    pub fn has_variant(&self, split_name: &str, variant: &str) -> bool {
        self.weighting(split_name)
            .is_some_and(|w| w.contains_key(variant))
    }

    /// Split names in lexicographic order
    pub fn split_names(&self) -> impl Iterator<Item = &str> {
        self.splits.keys().map(String::as_str)
    }

    /// Number of registered splits
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.splits.len()
    }

    /// Whether no splits are registered
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.splits.is_empty()
    }
}

impl FromIterator<(String, Weighting)> for SplitRegistry {
    fn from_iter<I: IntoIterator<Item = (String, Weighting)>>(iter: I) -> Self {
        Self {
            splits: iter.into_iter().collect(),
        }
    }
}

/// Configuration defects in split data
///
/// These indicate a misconfigured experiment upstream and are never
/// silently defaulted.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SplitError {
    /// Split is not present in the registry
    #[error("unknown split: {0}")]
    UnknownSplit(String),

    /// Split defines no variants at all
    #[error("split {0} defines no variants")]
    EmptySplit(String),

    /// Every variant of the split has weight zero
    #[error("split {0} has zero total weight")]
    ZeroWeight(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn registry() -> SplitRegistry {
        SplitRegistry::new()
            .with_split("blue_button", [("true", 50), ("false", 50)])
            .with_split("time", [("hammertime", 100), ("clobberin_time", 0)])
    }

    #[test]
    fn variants_are_lexicographic() {
        let reg = registry();
        assert_eq!(reg.variants("time"), Some(vec!["clobberin_time", "hammertime"]));
        assert_eq!(reg.variants("missing"), None);
    }

    #[test]
    fn require_unknown_split_fails() {
        let reg = registry();
        assert!(reg.require("blue_button").is_ok());
        assert_eq!(
            reg.require("nope"),
            Err(SplitError::UnknownSplit("nope".to_string()))
        );
    }

    #[test]
    fn has_variant() {
        let reg = registry();
        assert!(reg.has_variant("time", "clobberin_time"));
        assert!(!reg.has_variant("time", "waits_for_no_man"));
        assert!(!reg.has_variant("missing", "true"));
    }

    #[test]
    fn deserializes_wire_shape() {
        let json = r#"{"blue_button":{"false":50,"true":50},"time":{"hammertime":100,"clobberin_time":0}}"#;
        let reg: SplitRegistry = serde_json::from_str(json).unwrap();
        assert_eq!(reg, registry());
        assert_eq!(reg.len(), 2);
        assert_eq!(reg.split_names().collect::<Vec<_>>(), vec!["blue_button", "time"]);
    }

    #[test]
    fn insert_replaces_split() {
        let mut reg = registry();
        reg.insert("time", [("hammertime", 1)]);
        assert_eq!(reg.variants("time"), Some(vec!["hammertime"]));
    }
}
