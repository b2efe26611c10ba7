//! TT Vary DSL
//!
//! Declarative per-variant behavior for a single split.
//!
//! # Core Concepts
//!
//! - [`VaryDsl`]: builder collecting `when` branches and one `default`
//! - [`Dispatch`]: which branch a resolved variant ran (matched vs. defaulted)
//! - [`vary`]: declare-validate-dispatch in one call
//! - [`AbConfiguration`] / [`ab`]: boolean wrapper for two-variant splits
//!
//! # Example
//!
//! ```rust,ignore
//! use tt_vary::{vary, VaryDsl};
//!
//! let outcome = vary("time", Some("hammertime"), None, Some(|v: &mut VaryDsl<&str>| {
//!     v.when(["clobberin_time"], || "clobber");
//!     v.default("hammertime", || "hammer");
//! }))?;
//! assert_eq!(outcome.value, "hammer");
//! ```

#![warn(unreachable_pub)]
#![allow(missing_docs)]

mod ab;
mod dsl;
mod error;

// Re-exports
pub use ab::{ab, AbConfiguration, DEFAULT_FALSE_VARIANT, DEFAULT_TRUE_VARIANT};
pub use dsl::{vary, Dispatch, VaryDsl, VaryOutcome};
pub use error::VaryError;

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
