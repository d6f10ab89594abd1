//! Snapshot-backed collaborator adapter.
//!
//! Implements every lookup port of the [`reports`] crate from a JSON snapshot
//! held in memory. The CLI loads one snapshot per run; tests build them from
//! literals.
//!
//! ## Architectural Layer
//!
//! **Infrastructure.** File access and snapshot parsing live here. The
//! [`reports`] crate sees only the port traits.
//!
//! ## Snapshot format
//!
//! ```json
//! {
//!   "customMetrics": [
//!     { "id": "m1", "customer": "c1", "name": "Cost per user",
//!       "variables": [{ "attribution": "a1" }] }
//!   ],
//!   "extendedMetrics": ["flexsave"],
//!   "datahubMetrics": { "c1": ["events"] },
//!   "attributions": [{ "id": "a1", "name": "Production" }],
//!   "attributionGroups": [{ "id": "g1", "name": "Teams" }]
//! }
//! ```
//!
//! A custom metric without `customer` is visible to every customer. Every
//! section is optional.

use std::collections::HashMap;
use std::path::Path;

use async_trait::async_trait;
use reports::ports::{
    Attribution, AttributionDirectory, AttributionGroup, AttributionGroupDirectory,
    CollaboratorError, CustomMetric, DataHubMetricRegistry, MetricCatalog,
};
use reports::{AttributionGroupId, AttributionId, CustomMetricId, CustomerId};
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, info, instrument};

/// Errors raised while loading a snapshot.
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("failed to read catalog {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse catalog: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Deserialize)]
struct SnapshotCustomMetric {
    #[serde(default)]
    customer: Option<CustomerId>,
    #[serde(flatten)]
    metric: CustomMetric,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct Snapshot {
    custom_metrics: Vec<SnapshotCustomMetric>,
    extended_metrics: Vec<String>,
    datahub_metrics: HashMap<CustomerId, Vec<String>>,
    attributions: Vec<Attribution>,
    attribution_groups: Vec<AttributionGroup>,
}

/// In-memory catalog answering every collaborator lookup.
#[derive(Debug, Default)]
pub struct SnapshotCatalog {
    custom_metrics: HashMap<CustomMetricId, SnapshotCustomMetric>,
    extended_metrics: Vec<String>,
    datahub_metrics: HashMap<CustomerId, Vec<String>>,
    attributions: HashMap<AttributionId, Attribution>,
    attribution_groups: HashMap<AttributionGroupId, AttributionGroup>,
}

impl SnapshotCatalog {
    /// An empty catalog: every lookup misses.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Parses a snapshot document.
    pub fn from_json(text: &str) -> Result<Self, CatalogError> {
        let snapshot: Snapshot = serde_json::from_str(text)?;
        Ok(Self::from_snapshot(snapshot))
    }

    /// Reads and parses the snapshot at `path`.
    #[instrument(skip_all, fields(path = %path.as_ref().display()))]
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, CatalogError> {
        let path = path.as_ref();
        let text = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| CatalogError::Io {
                path: path.display().to_string(),
                source,
            })?;

        let catalog = Self::from_json(&text)?;
        info!(
            custom_metrics = catalog.custom_metrics.len(),
            attributions = catalog.attributions.len(),
            attribution_groups = catalog.attribution_groups.len(),
            "loaded catalog snapshot"
        );
        Ok(catalog)
    }

    fn from_snapshot(snapshot: Snapshot) -> Self {
        Self {
            custom_metrics: snapshot
                .custom_metrics
                .into_iter()
                .map(|m| (m.metric.id.clone(), m))
                .collect(),
            extended_metrics: snapshot.extended_metrics,
            datahub_metrics: snapshot.datahub_metrics,
            attributions: snapshot
                .attributions
                .into_iter()
                .map(|a| (a.id.clone(), a))
                .collect(),
            attribution_groups: snapshot
                .attribution_groups
                .into_iter()
                .map(|g| (g.id.clone(), g))
                .collect(),
        }
    }
}

#[async_trait]
impl MetricCatalog for SnapshotCatalog {
    async fn custom_metric_exists(
        &self,
        customer: &CustomerId,
        id: &CustomMetricId,
    ) -> Result<bool, CollaboratorError> {
        Ok(self
            .custom_metrics
            .get(id)
            .is_some_and(|m| m.customer.as_ref().map_or(true, |owner| owner == customer)))
    }

    async fn custom_metric(
        &self,
        id: &CustomMetricId,
    ) -> Result<Option<CustomMetric>, CollaboratorError> {
        Ok(self.custom_metrics.get(id).map(|m| m.metric.clone()))
    }

    async fn extended_metric_keys(&self) -> Result<Vec<String>, CollaboratorError> {
        Ok(self.extended_metrics.clone())
    }
}

#[async_trait]
impl DataHubMetricRegistry for SnapshotCatalog {
    async fn registered_metric_keys(
        &self,
        customer: &CustomerId,
    ) -> Result<Vec<String>, CollaboratorError> {
        Ok(self.datahub_metrics.get(customer).cloned().unwrap_or_default())
    }
}

#[async_trait]
impl AttributionDirectory for SnapshotCatalog {
    async fn find_attributions(
        &self,
        ids: &[AttributionId],
    ) -> Result<Vec<Attribution>, CollaboratorError> {
        let found: Vec<Attribution> = ids
            .iter()
            .filter_map(|id| self.attributions.get(id).cloned())
            .collect();
        debug!(requested = ids.len(), found = found.len(), "attribution lookup");
        Ok(found)
    }
}

#[async_trait]
impl AttributionGroupDirectory for SnapshotCatalog {
    async fn find_attribution_groups(
        &self,
        ids: &[AttributionGroupId],
    ) -> Result<Vec<AttributionGroup>, CollaboratorError> {
        let found: Vec<AttributionGroup> = ids
            .iter()
            .filter_map(|id| self.attribution_groups.get(id).cloned())
            .collect();
        debug!(requested = ids.len(), found = found.len(), "attribution group lookup");
        Ok(found)
    }
}
