//! Visitor value types and configuration

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Stable visitor identifier
///
/// Random UUID v4 for fresh visitors, otherwise whatever the caller or the
/// remote authority supplied.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VisitorId(String);

impl VisitorId {
    /// Generate a fresh random id
    #[must_use]
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    /// Wrap an existing id
    #[inline]
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for VisitorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for VisitorId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<&str> for VisitorId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl AsRef<str> for VisitorId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl PartialEq<str> for VisitorId {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}

impl PartialEq<&str> for VisitorId {
    fn eq(&self, other: &&str) -> bool {
        self.0 == *other
    }
}

/// Visitor configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VisitorConfig {
    /// Upper bound on every remote call the visitor makes
    pub request_timeout_ms: u64,
}

impl VisitorConfig {
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// With request timeout
    #[inline]
    #[must_use]
    pub fn with_request_timeout_ms(mut self, request_timeout_ms: u64) -> Self {
        self.request_timeout_ms = request_timeout_ms;
        self
    }

    /// Request timeout
    #[inline]
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

impl Default for VisitorConfig {
    fn default() -> Self {
        Self {
            request_timeout_ms: 2_000,
        }
    }
}

/// Result of linking an identifier to a visitor
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkOutcome {
    /// Linked; the visitor now carries the canonical id and merged assignments
    Linked {
        /// Whether the canonical id differs from the visitor's previous id
        id_changed: bool,
    },
    /// Remote authority unavailable; the link was queued for retry
    Deferred,
}

impl LinkOutcome {
    #[inline]
    #[must_use]
    pub fn is_deferred(&self) -> bool {
        matches!(self, Self::Deferred)
    }
}

/// Result of pushing unsynced assignments
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncReport {
    /// Confirmed by the remote authority
    pub synced: usize,
    /// Queued for retry
    pub deferred: usize,
}

/// Identity to backfill a visitor from
///
/// `existing_id` is the id an analytics system already knows the person by;
/// it gets aliased to the canonical visitor id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackfillIdentity {
    pub identifier_type: String,
    pub identifier_value: String,
    pub existing_id: String,
}

impl BackfillIdentity {
    #[must_use]
    pub fn new(
        identifier_type: impl Into<String>,
        identifier_value: impl Into<String>,
        existing_id: impl Into<String>,
    ) -> Self {
        Self {
            identifier_type: identifier_type.into(),
            identifier_value: identifier_value.into(),
            existing_id: existing_id.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn generated_ids_are_uuids() {
        let a = VisitorId::generate();
        let b = VisitorId::generate();
        assert_ne!(a, b);
        assert!(uuid::Uuid::parse_str(a.as_str()).is_ok());
    }

    #[test]
    fn visitor_id_serializes_as_string() {
        let id = VisitorId::new("abc");
        assert_eq!(serde_json::to_string(&id).unwrap(), r#""abc""#);
        assert_eq!(id, "abc");
        assert_eq!(id.to_string(), "abc");
    }

    #[test]
    fn config_builder() {
        let config = VisitorConfig::new().with_request_timeout_ms(250);
        assert_eq!(config.request_timeout(), Duration::from_millis(250));
        assert_eq!(VisitorConfig::default().request_timeout_ms, 2_000);
    }
}
