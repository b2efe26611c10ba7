//! Vary DSL
//!
//! Callers declare per-variant behavior for one split with [`VaryDsl`]:
//! one or more `when` branches and exactly one `default`. The declaration is
//! validated before anything runs, then dispatched by equality against the
//! visitor's resolved variant.
//!
//! # Example
//!
//! ```rust,ignore
//! let outcome = tt_vary::vary("blue_button", Some("true"), weighting, Some(|v: &mut VaryDsl<&str>| {
//!     v.when(["true"], || "blue");
//!     v.default("false", || "grey");
//! }))?;
//! assert_eq!(outcome.value, "blue");
//! ```

use crate::error::VaryError;
use std::collections::BTreeSet;
use tt_split::Weighting;

type Behavior<'a, R> = Box<dyn FnOnce() -> R + 'a>;

struct WhenBranch<'a, R> {
    variants: Vec<String>,
    behavior: Behavior<'a, R>,
}

struct DefaultBranch<'a, R> {
    variant: String,
    behavior: Behavior<'a, R>,
}

/// Which branch a resolved variant dispatched to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dispatch {
    /// The resolved variant had a declared branch
    Matched {
        /// Resolved variant
        variant: String,
    },

    /// The default branch ran in place of the resolved variant
    Defaulted {
        /// The default branch's variant
        variant: String,
        /// Variant that had no branch (`None` when nothing was resolved)
        resolved: Option<String>,
    },
}

impl Dispatch {
    /// Variant whose behavior ran
    #[inline]
    #[must_use]
    pub fn variant(&self) -> &str {
        match self {
            Self::Matched { variant } | Self::Defaulted { variant, .. } => variant,
        }
    }

    /// Whether the default branch stood in for the resolved variant
    #[inline]
    #[must_use]
    pub fn is_defaulted(&self) -> bool {
        matches!(self, Self::Defaulted { .. })
    }

    /// The unhandled resolved variant the default replaced
    #[inline]
    #[must_use]
    pub fn replaced(&self) -> Option<&str> {
        match self {
            Self::Defaulted {
                resolved: Some(resolved),
                ..
            } => Some(resolved),
            _ => None,
        }
    }
}

/// Result of running a vary declaration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VaryOutcome<R> {
    /// Value returned by the executed behavior
    pub value: R,
    /// Branch that produced it
    pub dispatch: Dispatch,
}

/// Builder collecting the branches of one vary declaration
pub struct VaryDsl<'a, R> {
    split_name: String,
    known_variants: Option<BTreeSet<String>>,
    whens: Vec<WhenBranch<'a, R>>,
    default: Option<DefaultBranch<'a, R>>,
    defaults_declared: usize,
    empty_when: bool,
}

impl<'a, R> VaryDsl<'a, R> {
    /// Start a declaration for `split_name`
    ///
    /// `weighting` is the split's registry entry, when available. It is only
    /// used to warn about branches that do not line up with the registry.
    #[must_use]
    pub fn new(split_name: impl Into<String>, weighting: Option<&Weighting>) -> Self {
        Self {
            split_name: split_name.into(),
            known_variants: weighting.map(|w| w.keys().cloned().collect()),
            whens: Vec::new(),
            default: None,
            defaults_declared: 0,
            empty_when: false,
        }
    }

    /// Declare behavior for one or more variants
    pub fn when<I, V, F>(&mut self, variants: I, behavior: F) -> &mut Self
    where
        I: IntoIterator<Item = V>,
        V: Into<String>,
        F: FnOnce() -> R + 'a,
    {
        let variants: Vec<String> = variants.into_iter().map(Into::into).collect();
        if variants.is_empty() {
            self.empty_when = true;
            return self;
        }
        for variant in &variants {
            self.check_declared(variant);
        }
        self.whens.push(WhenBranch {
            variants,
            behavior: Box::new(behavior),
        });
        self
    }

    /// Declare the fallback behavior
    ///
    /// Runs for `variant` itself and for any resolved variant without a
    /// `when` branch, including variants the registry gained later.
    pub fn default<F>(&mut self, variant: impl Into<String>, behavior: F) -> &mut Self
    where
        F: FnOnce() -> R + 'a,
    {
        self.defaults_declared += 1;
        if self.default.is_some() {
            return self;
        }
        let variant = variant.into();
        self.check_declared(&variant);
        self.default = Some(DefaultBranch {
            variant,
            behavior: Box::new(behavior),
        });
        self
    }

    /// Split this declaration is for
    #[inline]
    #[must_use]
    pub fn split_name(&self) -> &str {
        &self.split_name
    }

    /// Check the declaration's structure
    ///
    /// # Errors
    /// Returns the first structural problem found, in the order: multiple
    /// defaults, missing default, empty `when`, missing `when`
    pub fn validate(&self) -> Result<(), VaryError> {
        let split = || self.split_name.clone();
        if self.defaults_declared > 1 {
            return Err(VaryError::MultipleDefaults { split: split() });
        }
        if self.default.is_none() {
            return Err(VaryError::MissingDefault { split: split() });
        }
        if self.empty_when {
            return Err(VaryError::EmptyWhen { split: split() });
        }
        if self.whens.is_empty() {
            return Err(VaryError::MissingWhen { split: split() });
        }
        Ok(())
    }

    /// Validate, dispatch on `resolved` and execute the chosen behavior
    ///
    /// # Errors
    /// Returns [`VaryError`] if the declaration is structurally invalid; no
    /// behavior runs in that case
    pub fn run(self, resolved: Option<&str>) -> Result<VaryOutcome<R>, VaryError> {
        self.validate()?;
        self.warn_unconfigured();

        let Self {
            split_name,
            whens,
            default,
            ..
        } = self;
        let default = default.ok_or(VaryError::MissingDefault { split: split_name })?;

        if let Some(resolved) = resolved {
            if let Some(branch) = whens
                .into_iter()
                .find(|b| b.variants.iter().any(|v| v == resolved))
            {
                return Ok(VaryOutcome {
                    value: (branch.behavior)(),
                    dispatch: Dispatch::Matched {
                        variant: resolved.to_string(),
                    },
                });
            }
            if resolved == default.variant {
                return Ok(VaryOutcome {
                    value: (default.behavior)(),
                    dispatch: Dispatch::Matched {
                        variant: default.variant,
                    },
                });
            }
        }

        Ok(VaryOutcome {
            value: (default.behavior)(),
            dispatch: Dispatch::Defaulted {
                variant: default.variant,
                resolved: resolved.map(str::to_string),
            },
        })
    }

    fn declares(&self, variant: &str) -> bool {
        self.whens
            .iter()
            .any(|b| b.variants.iter().any(|v| v == variant))
            || self.default.as_ref().is_some_and(|d| d.variant == variant)
    }

    fn check_declared(&self, variant: &str) {
        if let Some(known) = &self.known_variants {
            if !known.contains(variant) {
                tracing::warn!(
                    "vary for \"{}\" configures unknown variant \"{}\"",
                    self.split_name,
                    variant
                );
            }
        }
        if self.declares(variant) {
            tracing::warn!(
                "vary for \"{}\" configures variant \"{}\" more than once; first declaration wins",
                self.split_name,
                variant
            );
        }
    }

    fn warn_unconfigured(&self) {
        let Some(known) = &self.known_variants else {
            return;
        };
        let missing: Vec<&str> = known
            .iter()
            .map(String::as_str)
            .filter(|v| !self.declares(v))
            .collect();
        if !missing.is_empty() {
            tracing::warn!(
                "vary for \"{}\" does not configure variants {}",
                self.split_name,
                missing.join(", ")
            );
        }
    }
}

impl<R> std::fmt::Debug for VaryDsl<'_, R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VaryDsl")
            .field("split_name", &self.split_name)
            .field(
                "whens",
                &self.whens.iter().map(|b| &b.variants).collect::<Vec<_>>(),
            )
            .field("default", &self.default.as_ref().map(|d| &d.variant))
            .finish_non_exhaustive()
    }
}

/// Declare and run a vary block in one step
///
/// `block` is the caller's declaration; `None` is a structural error.
///
/// # Errors
/// Returns [`VaryError`] if the block is missing or declares an invalid
/// set of branches
pub fn vary<'a, R, F>(
    split_name: &str,
    resolved: Option<&str>,
    weighting: Option<&Weighting>,
    block: Option<F>,
) -> Result<VaryOutcome<R>, VaryError>
where
    F: FnOnce(&mut VaryDsl<'a, R>),
{
    let block = block.ok_or_else(|| VaryError::MissingBlock {
        split: split_name.to_string(),
    })?;
    let mut dsl = VaryDsl::new(split_name, weighting);
    block(&mut dsl);
    dsl.run(resolved)
}
