//! TT Visitor
//!
//! The assignment resolution and synchronization engine: a [`Visitor`]
//! answers which variant of a split a person sees, keeps track of what the
//! remote authority has confirmed, and reconciles anonymous history with a
//! known identity.
//!
//! # Core Concepts
//!
//! - [`Visitor`]: per-request aggregate owning the assignment registry
//! - [`Visitor::vary`] / [`Visitor::ab`]: branch on the visitor's variant
//! - [`Visitor::link_identifier`]: adopt a canonical identity (server wins)
//! - [`Visitor::backfill_identity`]: start from an identity instead of an id
//! - [`Visitor::sync_assignments`]: push unsynced assignments, deferring on outage
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use tt_visitor::Visitor;
//!
//! let mut visitor = Visitor::with_id(authority, jobs, "4f7e1c3a-...");
//! let label = visitor
//!     .vary("button_color", |v| {
//!         v.when(["blue"], || "Buy now");
//!         v.default("grey", || "Purchase");
//!     })
//!     .await?;
//! visitor.sync_assignments().await?;
//! ```

#![warn(unreachable_pub)]
#![allow(missing_docs)]

mod error;
mod types;
mod visitor;

// Re-exports
pub use error::VisitorError;
pub use types::{BackfillIdentity, LinkOutcome, SyncReport, VisitorConfig, VisitorId};
pub use visitor::Visitor;

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
