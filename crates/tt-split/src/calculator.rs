//! Deterministic variant calculation
//!
//! Buckets a visitor into `[0, 100)` from an MD5 digest of the split name
//! followed by the visitor id, then walks the split's variants in
//! lexicographic order until the normalized cumulative weight covers the
//! bucket. The same inputs select the same variant in every process, which
//! lets the remote authority verify locally computed assignments.

use crate::assignment::Assignment;
use crate::split::{SplitError, SplitRegistry, Weighting};
use md5::{Digest, Md5};

/// Number of buckets visitors are spread over
pub const BUCKET_COUNT: u64 = 100;

/// Pure variant calculator
///
/// Stateless; holds no I/O handles and uses no randomness beyond the digest.
#[derive(Debug, Clone, Copy, Default)]
pub struct VariantCalculator;

impl VariantCalculator {
    /// Bucket in `[0, 100)` for a visitor and split
    ///
    /// First four digest bytes, big-endian, modulo [`BUCKET_COUNT`].
    #[must_use]
    pub fn bucket(visitor_id: &str, split_name: &str) -> u64 {
        let mut hasher = Md5::new();
        hasher.update(split_name.as_bytes());
        hasher.update(visitor_id.as_bytes());
        let digest = hasher.finalize();
        let prefix = u32::from_be_bytes([digest[0], digest[1], digest[2], digest[3]]);
        u64::from(prefix) % BUCKET_COUNT
    }

    /// Select a variant from a weighting
    ///
    /// Weights are normalized over their sum, so they need not add up to 100.
    ///
    /// # Errors
    /// - [`SplitError::EmptySplit`] if the weighting has no variants
    /// - [`SplitError::ZeroWeight`] if every weight is zero
    pub fn variant<'w>(
        visitor_id: &str,
        split_name: &str,
        weighting: &'w Weighting,
    ) -> Result<&'w str, SplitError> {
        if weighting.is_empty() {
            return Err(SplitError::EmptySplit(split_name.to_string()));
        }
        let total: u64 = weighting.values().copied().map(u64::from).sum();
        if total == 0 {
            return Err(SplitError::ZeroWeight(split_name.to_string()));
        }

        let bucket = Self::bucket(visitor_id, split_name);
        let mut ceiling = 0u64;
        weighting
            .iter()
            .find(|(_, weight)| {
                ceiling += u64::from(**weight);
                // ceiling / total > bucket / 100, kept in integers
                ceiling * BUCKET_COUNT > bucket * total
            })
            .map(|(variant, _)| variant.as_str())
            .ok_or_else(|| SplitError::ZeroWeight(split_name.to_string()))
    }

    /// Compute a new local assignment from the registry
    ///
    /// # Errors
    /// Returns [`SplitError`] if the split is unknown or misconfigured
    pub fn assign(
        visitor_id: &str,
        split_name: &str,
        registry: &SplitRegistry,
    ) -> Result<Assignment, SplitError> {
        let weighting = registry.require(split_name)?;
        let variant = Self::variant(visitor_id, split_name, weighting)?;
        Ok(Assignment::computed(split_name, variant))
    }
}
