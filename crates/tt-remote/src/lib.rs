//! TT Remote Authority Client
//!
//! Everything a visitor needs to talk to the server that durably records
//! visitors, identifiers and assignments.
//!
//! # Core Concepts
//!
//! - [`RemoteAuthority`]: async contract for the remote authority
//! - [`HttpAuthority`]: JSON-over-HTTP implementation
//! - [`CachedAuthority`]: decorator caching the split registry with a TTL
//! - [`JobQueue`] / [`Job`]: deferred retries of writes that failed transiently
//! - [`JobRunner`]: in-process worker with exponential backoff
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use tt_remote::{CachedAuthority, HttpAuthority, RemoteAuthority, RemoteConfig};
//!
//! let http = HttpAuthority::new(RemoteConfig::new("https://tt.example.com"))?;
//! let authority = CachedAuthority::new(Arc::new(http));
//! let registry = authority.fetch_split_registry().await?;
//! ```

#![warn(unreachable_pub)]
#![allow(missing_docs)]

mod authority;
mod cache;
mod config;
mod http;
mod jobs;

// Re-exports
pub use authority::{
    IdentifierRequest, RemoteAssignment, RemoteAuthority, RemoteError, RemoteVisitor,
};
pub use cache::{CachedAuthority, DEFAULT_REGISTRY_TTL};
pub use config::{RemoteConfig, RetryPolicy};
pub use http::HttpAuthority;
pub use jobs::{
    AliasSink, AuthorityJobHandler, ChannelJobQueue, Job, JobError, JobHandler, JobQueue,
    JobReceiver, JobRunner, JobStatus, QueuedJob, RunnerStats,
};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod integration_tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn channel_queue_drives_authority_handler() {
        let mut authority = authority::MockRemoteAuthority::new();
        authority
            .expect_create_identifier()
            .times(1)
            .returning(|request| Ok(RemoteVisitor::new(request.visitor_id.clone())));

        let (queue, receiver) = ChannelJobQueue::new(4);
        let handler = AuthorityJobHandler::new(Arc::new(authority));
        let runner = JobRunner::new(receiver, Arc::new(handler), RetryPolicy::default());

        queue
            .enqueue(Job::CreateIdentifier(IdentifierRequest::new(
                "myapp_user_id",
                "visitor-1",
                "444",
            )))
            .await
            .unwrap();
        drop(queue);

        let stats = runner.run().await;
        assert_eq!(stats.completed, 1);
    }
}
