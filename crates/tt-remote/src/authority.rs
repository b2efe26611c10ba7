//! Remote authority contract
//!
//! The remote authority is the server that durably records visitors,
//! identifiers and assignments. [`RemoteAuthority`] is the seam every client
//! talks through; [`HttpAuthority`](crate::HttpAuthority) is the production
//! implementation.

use serde::{Deserialize, Serialize};
use tt_split::{Assignment, SplitRegistry};

/// Assignment as the remote authority reports it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteAssignment {
    pub split_name: String,
    pub variant: String,
    #[serde(default)]
    pub unsynced: bool,
}

impl RemoteAssignment {
    /// Create a confirmed remote assignment
    #[inline]
    #[must_use]
    pub fn new(split_name: impl Into<String>, variant: impl Into<String>) -> Self {
        Self {
            split_name: split_name.into(),
            variant: variant.into(),
            unsynced: false,
        }
    }
}

impl From<RemoteAssignment> for Assignment {
    fn from(remote: RemoteAssignment) -> Self {
        Assignment::from_remote(remote.split_name, remote.variant, remote.unsynced)
    }
}

impl From<&Assignment> for RemoteAssignment {
    fn from(assignment: &Assignment) -> Self {
        Self {
            split_name: assignment.split_name().to_string(),
            variant: assignment.variant().to_string(),
            unsynced: assignment.unsynced(),
        }
    }
}

/// Canonical visitor state held by the remote authority
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteVisitor {
    pub id: String,
    #[serde(default)]
    pub assignments: Vec<RemoteAssignment>,
}

impl RemoteVisitor {
    /// Visitor with no assignments
    #[inline]
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            assignments: Vec::new(),
        }
    }

    /// Add an assignment
    #[must_use]
    pub fn with_assignment(mut self, assignment: RemoteAssignment) -> Self {
        self.assignments.push(assignment);
        self
    }

    /// Assignments as local, non-new values
    pub fn to_assignments(&self) -> impl Iterator<Item = Assignment> + '_ {
        self.assignments.iter().cloned().map(Assignment::from)
    }
}

/// Arguments of a create-identifier call
///
/// Also the payload of the deferred retry, so it must replay identically.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IdentifierRequest {
    pub identifier_type: String,
    pub visitor_id: String,
    pub value: String,
}

impl IdentifierRequest {
    /// Create a request
    #[inline]
    #[must_use]
    pub fn new(
        identifier_type: impl Into<String>,
        visitor_id: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        Self {
            identifier_type: identifier_type.into(),
            visitor_id: visitor_id.into(),
            value: value.into(),
        }
    }
}

/// Operations the remote authority provides
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait RemoteAuthority: Send + Sync {
    /// Fetch a visitor and its confirmed assignments
    async fn fetch_visitor(&self, id: &str) -> Result<RemoteVisitor, RemoteError>;

    /// Fetch the split registry
    async fn fetch_split_registry(&self) -> Result<SplitRegistry, RemoteError>;

    /// Link an external identifier to a visitor
    ///
    /// Returns the canonical visitor, which may have a different id if the
    /// identifier was already linked elsewhere.
    async fn create_identifier(
        &self,
        request: &IdentifierRequest,
    ) -> Result<RemoteVisitor, RemoteError>;

    /// Resolve (creating if needed) the visitor owning an identifier
    async fn resolve_visitor_by_identifier(
        &self,
        identifier_type: &str,
        identifier_value: &str,
    ) -> Result<RemoteVisitor, RemoteError>;

    /// Record an assignment for a visitor
    async fn persist_assignment(
        &self,
        visitor_id: &str,
        assignment: &Assignment,
    ) -> Result<(), RemoteError>;
}

/// Errors talking to the remote authority
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RemoteError {
    /// Call exceeded its time bound
    #[error("remote call timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    /// Connection could not be established or was lost
    #[error("remote authority unreachable: {0}")]
    Unreachable(String),

    /// Remote authority failed (5xx)
    #[error("remote authority error: status {status}")]
    Server { status: u16 },

    /// Request rejected (4xx)
    #[error("request rejected: status {status}")]
    Rejected { status: u16 },

    /// Response body did not match the expected shape
    #[error("invalid response: {0}")]
    Decode(String),

    /// Request could not be built
    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

impl RemoteError {
    /// Whether the failure is a transient communication problem
    ///
    /// Transient failures degrade gracefully (reads) or are deferred to the
    /// job queue (writes); all others are surfaced.
    #[inline]
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Timeout { .. } | Self::Unreachable(_) | Self::Server { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn transient_classification() {
        assert!(RemoteError::Timeout { timeout_ms: 10 }.is_transient());
        assert!(RemoteError::Unreachable("refused".into()).is_transient());
        assert!(RemoteError::Server { status: 503 }.is_transient());
        assert!(!RemoteError::Rejected { status: 422 }.is_transient());
        assert!(!RemoteError::Decode("bad".into()).is_transient());
    }

    #[test]
    fn remote_visitor_wire_shape() {
        let json = r#"{"id":"abc","assignments":[{"split_name":"time","variant":"hammertime","unsynced":false},{"split_name":"blue_button","variant":"true"}]}"#;
        let visitor: RemoteVisitor = serde_json::from_str(json).unwrap();
        assert_eq!(visitor.id, "abc");
        assert_eq!(visitor.assignments.len(), 2);
        assert!(!visitor.assignments[1].unsynced);

        let missing: RemoteVisitor = serde_json::from_str(r#"{"id":"x"}"#).unwrap();
        assert!(missing.assignments.is_empty());
    }

    #[test]
    fn remote_assignments_become_non_new() {
        let visitor = RemoteVisitor::new("abc")
            .with_assignment(RemoteAssignment::new("time", "hammertime"))
            .with_assignment(RemoteAssignment {
                split_name: "blue_button".into(),
                variant: "true".into(),
                unsynced: true,
            });

        let assignments: Vec<Assignment> = visitor.to_assignments().collect();
        assert_eq!(assignments[0], Assignment::confirmed("time", "hammertime"));
        assert!(assignments[1].unsynced());
        assert!(assignments.iter().all(|a| !a.new_assignment()));
    }

    #[test]
    fn assignment_to_wire() {
        let local = Assignment::computed("blue_button", "false");
        let wire = RemoteAssignment::from(&local);
        assert_eq!(wire.split_name, "blue_button");
        assert!(wire.unsynced);
    }
}
