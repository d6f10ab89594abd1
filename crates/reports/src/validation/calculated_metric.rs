use std::collections::BTreeSet;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::warn;

use super::ReportRule;
use crate::config::{MetricFilter, Report, ReportFilter};
use crate::errors::{fields, FieldError, ReportError};
use crate::ports::MetricCatalog;
use crate::types::Metric;
use crate::CustomMetricId;

/// Filter through which a calculated metric receives its attributions.
pub const ATTRIBUTION_FILTER_ID: &str = "attribution:attribution";

pub const ERR_LIMIT_BY_CUSTOM_METRIC: &str =
    "can only limit by a custom metric if the metric itself is selected as the report metric";

/// Rules for reports that use, or rank by, a calculated metric.
///
/// - the attribution filter must list exactly the attributions the metric's
///   formula reads;
/// - metric filters and top/bottom limits may use the custom metric only
///   when it is the report metric.
pub struct CalculatedMetricRule {
    catalog: Arc<dyn MetricCatalog>,
}

impl CalculatedMetricRule {
    pub fn new(catalog: Arc<dyn MetricCatalog>) -> Self {
        Self { catalog }
    }

    async fn validate_filters_with_attributions(
        &self,
        calculated: Option<&CustomMetricId>,
        filters: &[ReportFilter],
    ) -> Result<Vec<FieldError>, ReportError> {
        let Some(id) = calculated else {
            return Ok(Vec::new());
        };

        let Some(metric) = self
            .catalog
            .custom_metric(id)
            .await
            .map_err(|e| ReportError::collaborator("metric catalog", e))?
        else {
            warn!(metric = %id, "selected custom metric no longer exists");
            return Ok(vec![FieldError::new(
                fields::METRIC,
                format!("custom metric not found: {id}"),
            )]);
        };

        let required: Vec<&str> = metric.attribution_ids().into_iter().map(|a| a.as_str()).collect();
        let selected: BTreeSet<&str> = filters
            .iter()
            .find(|f| f.id == ATTRIBUTION_FILTER_ID)
            .and_then(|f| f.values.as_deref())
            .unwrap_or_default()
            .iter()
            .map(String::as_str)
            .collect();

        if selected == required.iter().copied().collect::<BTreeSet<_>>() {
            return Ok(Vec::new());
        }

        Ok(vec![FieldError::new(
            fields::FILTERS,
            format!("custom metric must filter attribution for: {}", required.join(",")),
        )])
    }
}

fn validate_limit_by_value(
    calculated: Option<&CustomMetricId>,
    metric_filters: &[MetricFilter],
) -> Vec<FieldError> {
    if calculated.is_some() {
        return Vec::new();
    }
    metric_filters
        .iter()
        .filter(|f| f.metric == Metric::Custom)
        .map(|_| FieldError::new(fields::METRIC_FILTER, ERR_LIMIT_BY_CUSTOM_METRIC))
        .collect()
}

fn validate_limit_top_bottom(
    calculated: Option<&CustomMetricId>,
    filters: &[ReportFilter],
) -> Vec<FieldError> {
    if calculated.is_some() {
        return Vec::new();
    }
    filters
        .iter()
        .filter(|f| f.limit_metric == Some(Metric::Custom))
        .map(|f| {
            FieldError::new(
                fields::FILTERS,
                format!("{ERR_LIMIT_BY_CUSTOM_METRIC}: {}", f.id),
            )
        })
        .collect()
}

#[async_trait]
impl ReportRule for CalculatedMetricRule {
    fn name(&self) -> &'static str {
        "calculated_metric"
    }

    async fn validate(&self, report: &Report) -> Result<Vec<FieldError>, ReportError> {
        let config = &report.config;
        let calculated = config
            .calculated_metric
            .as_ref()
            .filter(|_| config.metric == Metric::Custom);

        let mut errors = self
            .validate_filters_with_attributions(calculated, &config.filters)
            .await?;
        errors.extend(validate_limit_by_value(calculated, &config.metric_filters));
        errors.extend(validate_limit_top_bottom(calculated, &config.filters));
        Ok(errors)
    }
}
