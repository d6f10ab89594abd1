//! Error types shared by every translation and validation step.
//!
//! Two classes of failure exist and they never mix:
//!
//! - **Validation errors** ([`FieldError`]) are user-correctable, tagged with
//!   the wire field they concern, and always returned as a complete list.
//! - **Infrastructure errors** are collaborator or backend faults. They are
//!   opaque to the caller; their detail is logged where they occur.
//!
//! [`ReportError`] carries both. The [`ReportError::Validation`] variant is the
//! sentinel: when a function returns it, the contained list is authoritative
//! and any value the caller owns (e.g. a config merged in place) may be
//! partially updated. Any other variant means the outputs are unusable and the
//! failure must be surfaced as a generic internal failure.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::ports::CollaboratorError;

// ---------------------------------------------------------------------------
// Field names
// ---------------------------------------------------------------------------

/// Wire field names used to tag [`FieldError`]s.
pub mod fields {
    pub const REPORT: &str = "report";
    pub const NAME: &str = "name";
    pub const METRIC: &str = "metric";
    pub const METRIC_FILTER: &str = "metricFilter";
    pub const AGGREGATOR: &str = "aggregator";
    pub const ADVANCED_ANALYSIS: &str = "advancedAnalysis";
    pub const TIME_INTERVAL: &str = "timeInterval";
    pub const TIME_SETTINGS: &str = "timeSettings";
    pub const CUSTOM_TIME_RANGE: &str = "customTimeRange";
    pub const DIMENSIONS: &str = "dimensions";
    pub const FILTERS: &str = "filters";
    pub const GROUPS: &str = "groups";
    pub const LIMIT: &str = "limit";
    pub const SORT_GROUPS: &str = "sortGroups";
    pub const SORT_DIMENSIONS: &str = "sortDimensions";
    pub const RENDERER: &str = "renderer";
    pub const COMPARATIVE: &str = "displayValues";
    pub const CURRENCY: &str = "currency";
    pub const DATA_SOURCE: &str = "dataSource";
    pub const INCLUDE_CREDITS: &str = "includePromotionalCredits";
    pub const SPLITS: &str = "splits";
    pub const SPLIT_ORIGIN: &str = "origin";
    pub const SPLIT_TARGETS: &str = "targets";
}

// ---------------------------------------------------------------------------
// Validation errors
// ---------------------------------------------------------------------------

/// A user-correctable problem with one submitted field.
///
/// Errors are accumulated in evaluation order and never deduplicated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldError {
    /// Wire name of the offending field (see [`fields`]).
    pub field: String,
    /// Human-readable description, safe to show to the client.
    pub message: String,
}

impl FieldError {
    /// Creates a [`FieldError`] for `field`.
    pub fn new(field: &str, message: impl Into<String>) -> Self {
        Self {
            field: field.to_string(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for FieldError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

// ---------------------------------------------------------------------------
// Core error
// ---------------------------------------------------------------------------

/// Errors produced by the report core.
#[derive(Debug, Error)]
pub enum ReportError {
    /// One or more submitted fields are invalid.
    ///
    /// The sentinel variant: inspect the list for the real problem.
    #[error("validation failed with {} error(s)", .0.len())]
    Validation(Vec<FieldError>),

    /// A collaborator lookup failed for a reason other than "not found".
    ///
    /// The message deliberately omits the collaborator's own detail; it is
    /// available through [`std::error::Error::source`] for logging only.
    #[error("internal error while consulting {collaborator}")]
    Collaborator {
        /// Which port failed (e.g. `"metric catalog"`).
        collaborator: &'static str,
        /// The adapter's error.
        #[source]
        source: CollaboratorError,
    },

    /// The result post-processor was asked to apply an aggregator it does not
    /// know. Never silently ignored.
    #[error("unsupported aggregator: {0}")]
    UnsupportedAggregator(String),

    /// A split names a field that is not one of the result's dimensions.
    #[error("split field is not a result dimension: {0}")]
    SplitFieldMissing(String),

    /// A result row is shorter than its layout requires.
    #[error("result row {row} has {len} cells, expected {expected}")]
    ResultShape {
        row: usize,
        len: usize,
        expected: usize,
    },

    /// The ranking metric index is past the result's metric cells.
    #[error("metric {metric} is out of range for {metrics} metric(s)")]
    MetricOutOfRange { metric: usize, metrics: usize },
}

impl ReportError {
    /// Builds the infrastructure variant and logs the internal detail.
    pub fn collaborator(collaborator: &'static str, source: CollaboratorError) -> Self {
        tracing::error!(collaborator, error = %source, "collaborator lookup failed");
        Self::Collaborator {
            collaborator,
            source,
        }
    }

    /// Returns `true` for the validation sentinel.
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }

    /// Returns the field errors carried by the validation sentinel, if any.
    pub fn field_errors(&self) -> &[FieldError] {
        match self {
            Self::Validation(errors) => errors,
            _ => &[],
        }
    }

    /// Message safe to return to an API client.
    ///
    /// Infrastructure faults collapse to a generic message.
    pub fn client_message(&self) -> String {
        match self {
            Self::Validation(_) | Self::UnsupportedAggregator(_) => self.to_string(),
            Self::Collaborator { .. }
            | Self::SplitFieldMissing(_)
            | Self::ResultShape { .. }
            | Self::MetricOutOfRange { .. } => "internal error".to_string(),
        }
    }
}

/// Turns an accumulated error list into the sentinel, or `Ok(value)` when the
/// list is empty.
pub fn finish<T>(value: T, errors: Vec<FieldError>) -> Result<T, ReportError> {
    if errors.is_empty() {
        Ok(value)
    } else {
        Err(ReportError::Validation(errors))
    }
}

// ---------------------------------------------------------------------------
// Accumulation
// ---------------------------------------------------------------------------

/// Folds a sub-translation result into an accumulator.
///
/// `Ok(v)` yields `Some(v)`; the validation sentinel appends its errors and
/// yields `None`; any other error is propagated untouched. This is what lets
/// the merger attempt every field and still abort on a real fault.
pub trait CollectValidation<T> {
    /// See the trait documentation.
    fn collect_into(self, errors: &mut Vec<FieldError>) -> Result<Option<T>, ReportError>;
}

impl<T> CollectValidation<T> for Result<T, ReportError> {
    fn collect_into(self, errors: &mut Vec<FieldError>) -> Result<Option<T>, ReportError> {
        match self {
            Ok(value) => Ok(Some(value)),
            Err(ReportError::Validation(found)) => {
                errors.extend(found);
                Ok(None)
            }
            Err(other) => Err(other),
        }
    }
}

impl<T> CollectValidation<T> for Result<T, FieldError> {
    fn collect_into(self, errors: &mut Vec<FieldError>) -> Result<Option<T>, ReportError> {
        match self {
            Ok(value) => Ok(Some(value)),
            Err(found) => {
                errors.push(found);
                Ok(None)
            }
        }
    }
}

impl<T> CollectValidation<T> for Result<T, Vec<FieldError>> {
    fn collect_into(self, errors: &mut Vec<FieldError>) -> Result<Option<T>, ReportError> {
        match self {
            Ok(value) => Ok(Some(value)),
            Err(found) => {
                errors.extend(found);
                Ok(None)
            }
        }
    }
}
