//! Assignment merging
//!
//! Reconciles local assignments with the assignments the remote authority
//! reports. Two policies exist:
//!
//! - [`merge`]: the remote side always wins. Used when adopting a canonical
//!   identity, where the server arbitrates conflicts between two histories.
//! - [`fill_missing`]: the local side always wins. Used for lazy loading,
//!   where anything resolved locally in this session is already newer.

use crate::assignment::{Assignment, AssignmentRegistry};

/// Merge remote assignments over local ones
///
/// For every split the remote side reports, its assignment replaces the local
/// one regardless of the local assignment's flags. Splits only known locally
/// are kept unchanged.
#[must_use]
pub fn merge<I>(local: AssignmentRegistry, remote: I) -> AssignmentRegistry
where
    I: IntoIterator<Item = Assignment>,
{
    let mut merged = local;
    for assignment in remote {
        merged.insert(assignment.split_name().to_string(), assignment);
    }
    merged
}

/// Add remote assignments for splits absent locally
///
/// Returns the number of assignments added.
pub fn fill_missing<I>(local: &mut AssignmentRegistry, remote: I) -> usize
where
    I: IntoIterator<Item = Assignment>,
{
    let mut added = 0;
    for assignment in remote {
        if !local.contains_key(assignment.split_name()) {
            local.insert(assignment.split_name().to_string(), assignment);
            added += 1;
        }
    }
    added
}
