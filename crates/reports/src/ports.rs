//! Collaborator port definitions.
//!
//! The report core never performs I/O. Everything it needs to know about the
//! outside world (whether a custom metric exists, which attributions a set of
//! IDs resolves to) is asked through the traits below. Infrastructure crates
//! implement them; the `catalog` crate provides a snapshot-backed
//! implementation used by the CLI.
//!
//! ## Contract
//!
//! - A lookup that finds nothing is **not** an error: it returns `Ok(false)`,
//!   `Ok(None)`, or a shorter list. The core turns misses into field errors.
//! - `Err(CollaboratorError)` means the lookup itself failed. The core turns
//!   it into [`crate::ReportError::Collaborator`] and stops.
//! - Set lookups are called once per translation with the complete,
//!   deduplicated ID set.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::Split;
use crate::{AttributionGroupId, AttributionId, CustomMetricId, CustomerId};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Failure of a collaborator lookup.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CollaboratorError {
    /// The backing service could not be reached or timed out.
    #[error("collaborator unavailable: {0}")]
    Unavailable(String),

    /// The backing service answered with data the adapter could not interpret.
    #[error("collaborator returned malformed data: {0}")]
    Malformed(String),
}

// ---------------------------------------------------------------------------
// Values returned by collaborators
// ---------------------------------------------------------------------------

/// One input of a calculated metric's formula.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomMetricVariable {
    /// Attribution whose spend feeds this variable.
    pub attribution: AttributionId,
}

/// A customer-defined calculated metric.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomMetric {
    pub id: CustomMetricId,
    pub name: String,
    /// Formula variables; each references one attribution.
    pub variables: Vec<CustomMetricVariable>,
}

impl CustomMetric {
    /// Attribution IDs referenced by the formula, in variable order.
    pub fn attribution_ids(&self) -> Vec<&AttributionId> {
        self.variables.iter().map(|v| &v.attribution).collect()
    }
}

/// An attribution as returned by [`AttributionDirectory`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attribution {
    pub id: AttributionId,
    pub name: String,
}

/// An attribution group as returned by [`AttributionGroupDirectory`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributionGroup {
    pub id: AttributionGroupId,
    pub name: String,
}

/// A structural problem found across a list of splits.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SplitIssue {
    /// Only attribution-group splits are supported.
    #[error("invalid split type: {0}")]
    InvalidType(String),

    /// Two splits share the same origin.
    #[error("split {split} origin {origin} is already used by another split")]
    OriginDuplicated { split: String, origin: String },

    /// A split lists its own origin as a target.
    #[error("split {split} uses {id} as both origin and target")]
    OriginIsTarget { split: String, id: String },

    /// Two splits redistribute into each other.
    #[error("split {split} has a circular dependency on {id}")]
    CircularDependency { split: String, id: String },
}

// ---------------------------------------------------------------------------
// Ports
// ---------------------------------------------------------------------------

/// Custom and extended metric lookups.
#[async_trait]
pub trait MetricCatalog: Send + Sync {
    /// Returns whether `id` names a custom metric visible to `customer`.
    async fn custom_metric_exists(
        &self,
        customer: &CustomerId,
        id: &CustomMetricId,
    ) -> Result<bool, CollaboratorError>;

    /// Loads a custom metric, including its formula variables.
    async fn custom_metric(
        &self,
        id: &CustomMetricId,
    ) -> Result<Option<CustomMetric>, CollaboratorError>;

    /// Keys of the globally available extended metrics.
    async fn extended_metric_keys(&self) -> Result<Vec<String>, CollaboratorError>;
}

/// Externally-sourced (DataHub) metrics registered by a tenant.
#[async_trait]
pub trait DataHubMetricRegistry: Send + Sync {
    /// Keys of every metric `customer` has registered. Empty when none.
    async fn registered_metric_keys(
        &self,
        customer: &CustomerId,
    ) -> Result<Vec<String>, CollaboratorError>;
}

/// Batched attribution existence lookup.
#[async_trait]
pub trait AttributionDirectory: Send + Sync {
    /// Returns the attributions among `ids` that exist. Order is unspecified.
    async fn find_attributions(
        &self,
        ids: &[AttributionId],
    ) -> Result<Vec<Attribution>, CollaboratorError>;
}

/// Batched attribution-group existence lookup.
#[async_trait]
pub trait AttributionGroupDirectory: Send + Sync {
    /// Returns the attribution groups among `ids` that exist. Order is unspecified.
    async fn find_attribution_groups(
        &self,
        ids: &[AttributionGroupId],
    ) -> Result<Vec<AttributionGroup>, CollaboratorError>;
}

/// Structural checks that span a whole split list.
///
/// Pure computation, so not async. [`crate::splits::StructuralSplitValidator`]
/// is the built-in implementation.
pub trait SplitValidator: Send + Sync {
    /// Returns every structural problem in `splits`; empty when valid.
    fn validate_splits(&self, splits: &[Split]) -> Vec<SplitIssue>;
}
