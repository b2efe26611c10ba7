//! TT Split System
//!
//! Split registry, assignment values and the deterministic variant
//! calculator shared by every other crate in the workspace.
//!
//! # Core Concepts
//!
//! - [`SplitRegistry`]: split name → variant weights
//! - [`VariantCalculator`]: pure (visitor id, split, weighting) → variant
//! - [`Assignment`]: one visitor's variant for one split, with sync flags
//! - [`merge`]: server-wins reconciliation of assignment registries
//!
//! # Example
//!
//! ```rust,ignore
//! use tt_split::{SplitRegistry, VariantCalculator};
//!
//! let registry = SplitRegistry::new()
//!     .with_split("blue_button", [("false", 50), ("true", 50)]);
//!
//! let assignment = VariantCalculator::assign("visitor-1", "blue_button", &registry)?;
//! assert!(assignment.new_assignment());
//! ```

#![warn(unreachable_pub)]
#![allow(missing_docs)]

mod assignment;
mod calculator;
mod merge;
mod split;

// Re-exports
pub use assignment::{Assignment, AssignmentRegistry};
pub use calculator::{VariantCalculator, BUCKET_COUNT};
pub use merge::{fill_missing, merge};
pub use split::{SplitError, SplitRegistry, Weighting};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
