//! Error types for the vary DSL
//!
//! Every variant is a structural misuse by the calling code: a bug to fix,
//! not a runtime condition to recover from.

/// Structural DSL misuse
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum VaryError {
    /// No declaration block was supplied
    #[error("must provide block to vary for {split}")]
    MissingBlock { split: String },

    /// `default` was declared more than once
    #[error("cannot provide more than one default")]
    MultipleDefaults { split: String },

    /// `default` was never declared
    #[error("must provide exactly one default")]
    MissingDefault { split: String },

    /// No `when` branch was declared
    #[error("must provide at least one when")]
    MissingWhen { split: String },

    /// A `when` branch named no variants
    #[error("must provide at least one variant")]
    EmptyWhen { split: String },
}

impl VaryError {
    /// Split whose declaration was invalid
    #[must_use]
    pub fn split(&self) -> &str {
        match self {
            Self::MissingBlock { split }
            | Self::MultipleDefaults { split }
            | Self::MissingDefault { split }
            | Self::MissingWhen { split }
            | Self::EmptyWhen { split } => split,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages() {
        let split = || "blue_button".to_string();
        assert_eq!(
            VaryError::MissingBlock { split: split() }.to_string(),
            "must provide block to vary for blue_button"
        );
        assert_eq!(
            VaryError::MultipleDefaults { split: split() }.to_string(),
            "cannot provide more than one default"
        );
        assert_eq!(
            VaryError::MissingDefault { split: split() }.to_string(),
            "must provide exactly one default"
        );
        assert_eq!(
            VaryError::MissingWhen { split: split() }.to_string(),
            "must provide at least one when"
        );
    }

    #[test]
    fn split_accessor() {
        let err = VaryError::EmptyWhen {
            split: "time".to_string(),
        };
        assert_eq!(err.split(), "time");
    }
}
