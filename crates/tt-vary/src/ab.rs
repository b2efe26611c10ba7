//! A/B convenience wrapper
//!
//! Two-variant splits are usually consumed as a boolean. [`AbConfiguration`]
//! works out which variant means `true` and which one stands in for `false`,
//! and [`ab`] runs the equivalent vary declaration.

use crate::dsl::{vary, VaryDsl, VaryOutcome};
use crate::error::VaryError;
use tt_split::Weighting;

/// Variant treated as `true` when the caller names none
pub const DEFAULT_TRUE_VARIANT: &str = "true";

/// Variant treated as `false` when the registry cannot supply one
pub const DEFAULT_FALSE_VARIANT: &str = "false";

/// Resolved true/false variants for an A/B split
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AbConfiguration {
    split_name: String,
    true_variant: String,
    false_variant: String,
}

impl AbConfiguration {
    /// Derive the configuration from the split's registry entry
    ///
    /// The false variant is the lexicographically first registered variant
    /// other than the true variant.
    #[must_use]
    pub fn new(
        split_name: impl Into<String>,
        true_variant: Option<&str>,
        weighting: Option<&Weighting>,
    ) -> Self {
        let split_name = split_name.into();
        let true_variant = true_variant.unwrap_or(DEFAULT_TRUE_VARIANT).to_string();

        if let Some(weighting) = weighting {
            if weighting.len() > 2 {
                tracing::warn!(
                    "A/B for \"{}\" configures split with more than 2 variants",
                    split_name
                );
            }
        }

        let false_variant = weighting
            .and_then(|w| w.keys().find(|v| **v != true_variant).cloned())
            .unwrap_or_else(|| DEFAULT_FALSE_VARIANT.to_string());

        Self {
            split_name,
            true_variant,
            false_variant,
        }
    }

    /// Split name
    #[inline]
    #[must_use]
    pub fn split_name(&self) -> &str {
        &self.split_name
    }

    /// Variant that yields `true`
    #[inline]
    #[must_use]
    pub fn true_variant(&self) -> &str {
        &self.true_variant
    }

    /// Variant that yields `false`
    #[inline]
    #[must_use]
    pub fn false_variant(&self) -> &str {
        &self.false_variant
    }
}

/// Run an A/B split as a boolean vary
///
/// # Errors
/// Propagates [`VaryError`]; a well-formed configuration never produces one
pub fn ab(
    config: &AbConfiguration,
    resolved: Option<&str>,
    weighting: Option<&Weighting>,
) -> Result<VaryOutcome<bool>, VaryError> {
    vary(
        config.split_name(),
        resolved,
        weighting,
        Some(|v: &mut VaryDsl<'_, bool>| {
            v.when([config.true_variant()], || true);
            v.default(config.false_variant(), || false);
        }),
    )
}
