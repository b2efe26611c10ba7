//! Visitor assignments
//!
//! An [`Assignment`] binds one visitor to one variant of one split. It is a
//! value: changing a visitor's variant replaces the registry entry.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Per-visitor assignments keyed by split name
pub type AssignmentRegistry = BTreeMap<String, Assignment>;

/// A visitor's resolved variant for one split
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Assignment {
    split_name: String,
    variant: String,
    unsynced: bool,
    new_assignment: bool,
}

impl Assignment {
    /// Assignment computed locally in this session
    ///
    /// New and unsynced: the remote authority has never seen it.
    #[inline]
    #[must_use]
    pub fn computed(split_name: impl Into<String>, variant: impl Into<String>) -> Self {
        Self {
            split_name: split_name.into(),
            variant: variant.into(),
            unsynced: true,
            new_assignment: true,
        }
    }

    /// Assignment reported by the remote authority
    #[inline]
    #[must_use]
    pub fn from_remote(
        split_name: impl Into<String>,
        variant: impl Into<String>,
        unsynced: bool,
    ) -> Self {
        Self {
            split_name: split_name.into(),
            variant: variant.into(),
            unsynced,
            new_assignment: false,
        }
    }

    /// Assignment confirmed by the remote authority
    #[inline]
    #[must_use]
    pub fn confirmed(split_name: impl Into<String>, variant: impl Into<String>) -> Self {
        Self::from_remote(split_name, variant, false)
    }

    /// Replacement carrying a different variant
    ///
    /// The replacement is unsynced; whether it counts as new is inherited.
    #[must_use]
    pub fn with_variant(&self, variant: impl Into<String>) -> Self {
        Self {
            split_name: self.split_name.clone(),
            variant: variant.into(),
            unsynced: true,
            new_assignment: self.new_assignment,
        }
    }

    /// Replacement marked as persisted by the remote authority
    #[must_use]
    pub fn synced(&self) -> Self {
        Self {
            unsynced: false,
            ..self.clone()
        }
    }

    /// Split this assignment belongs to
    #[inline]
    #[must_use]
    pub fn split_name(&self) -> &str {
        &self.split_name
    }

    /// Assigned variant
    #[inline]
    #[must_use]
    pub fn variant(&self) -> &str {
        &self.variant
    }

    /// Not yet confirmed by the remote authority
    #[inline]
    #[must_use]
    pub fn unsynced(&self) -> bool {
        self.unsynced
    }

    /// Computed locally in the current session
    #[inline]
    #[must_use]
    pub fn new_assignment(&self) -> bool {
        self.new_assignment
    }
}
