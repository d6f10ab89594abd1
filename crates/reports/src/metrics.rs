//! Metric resolution between the wire and persisted forms.
//!
//! Basic metrics are mapped through static tables built once from a single
//! pair list, so the forward and reverse directions cannot drift. Custom and
//! extended metrics are checked against collaborators.

use std::collections::HashMap;
use std::sync::{Arc, LazyLock};

use tracing::{debug, instrument, warn};

use crate::config::{MetricFilter, ReportConfig};
use crate::errors::{fields, finish, CollectValidation, FieldError, ReportError};
use crate::external::{ExternalMetric, ExternalMetricFilter};
use crate::ports::{DataHubMetricRegistry, MetricCatalog};
use crate::types::{ExternalMetricType, Metric, MetricFilterOperator};
use crate::{CustomMetricId, CustomerId};

pub const ERR_METRIC_REQUIRED: &str = "metric required";
pub const ERR_EXTENDED_METRIC_REQUIRED: &str = "extended metric value required";

const BASIC_METRICS: [(&str, Metric); 3] = [
    ("cost", Metric::Cost),
    ("usage", Metric::Usage),
    ("savings", Metric::Savings),
];

const METRIC_FILTER_OPERATORS: [(&str, MetricFilterOperator); 8] = [
    ("gt", MetricFilterOperator::GreaterThan),
    ("lt", MetricFilterOperator::LessThan),
    ("lte", MetricFilterOperator::LessEqThan),
    ("gte", MetricFilterOperator::GreaterEqThan),
    ("b", MetricFilterOperator::Between),
    ("nb", MetricFilterOperator::NotBetween),
    ("e", MetricFilterOperator::Equals),
    ("ne", MetricFilterOperator::NotEquals),
];

static BASIC_TO_INTERNAL: LazyLock<HashMap<&'static str, Metric>> =
    LazyLock::new(|| BASIC_METRICS.into_iter().collect());

static BASIC_TO_EXTERNAL: LazyLock<HashMap<Metric, &'static str>> =
    LazyLock::new(|| BASIC_METRICS.into_iter().map(|(text, m)| (m, text)).collect());

static OPERATOR_TO_INTERNAL: LazyLock<HashMap<&'static str, MetricFilterOperator>> =
    LazyLock::new(|| METRIC_FILTER_OPERATORS.into_iter().collect());

static OPERATOR_TO_EXTERNAL: LazyLock<HashMap<MetricFilterOperator, &'static str>> =
    LazyLock::new(|| {
        METRIC_FILTER_OPERATORS
            .into_iter()
            .map(|(text, op)| (op, text))
            .collect()
    });

/// The persisted metric selector triple.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricParams {
    pub metric: Metric,
    pub custom_metric: Option<CustomMetricId>,
    pub extended_metric: Option<String>,
}

impl MetricParams {
    pub fn basic(metric: Metric) -> Self {
        Self {
            metric,
            custom_metric: None,
            extended_metric: None,
        }
    }

    /// The selector currently stored on `config`.
    pub fn from_config(config: &ReportConfig) -> Self {
        Self {
            metric: config.metric,
            custom_metric: config.calculated_metric.clone(),
            extended_metric: config.extended_metric.clone(),
        }
    }

    /// Writes the selector onto `config`, clearing whichever reference no
    /// longer applies.
    pub fn apply_to(self, config: &mut ReportConfig) {
        config.metric = self.metric;
        config.calculated_metric = self.custom_metric;
        config.extended_metric = self.extended_metric;
    }
}

fn metric_error(message: impl Into<String>) -> FieldError {
    FieldError::new(fields::METRIC, message)
}

/// Resolves metric references using the metric catalog and the tenant's
/// DataHub registry.
#[derive(Clone)]
pub struct MetricResolver {
    catalog: Arc<dyn MetricCatalog>,
    datahub: Arc<dyn DataHubMetricRegistry>,
}

impl MetricResolver {
    pub fn new(catalog: Arc<dyn MetricCatalog>, datahub: Arc<dyn DataHubMetricRegistry>) -> Self {
        Self { catalog, datahub }
    }

    /// Resolves an external metric reference for `customer`.
    ///
    /// A missing reference, an unknown type or value, or a metric that does
    /// not exist all produce the validation sentinel. Lookup failures produce
    /// [`ReportError::Collaborator`].
    #[instrument(skip_all, fields(customer = %customer))]
    pub async fn to_internal(
        &self,
        customer: &CustomerId,
        metric: Option<&ExternalMetric>,
    ) -> Result<MetricParams, ReportError> {
        let Some(metric) = metric else {
            return Err(ReportError::Validation(vec![metric_error(ERR_METRIC_REQUIRED)]));
        };

        let metric_type: ExternalMetricType = metric.metric_type.parse().map_err(|_| {
            ReportError::Validation(vec![metric_error(format!(
                "invalid metric type: {}",
                metric.metric_type
            ))])
        })?;

        match metric_type {
            ExternalMetricType::Basic => BASIC_TO_INTERNAL
                .get(metric.value.as_str())
                .map(|m| MetricParams::basic(*m))
                .ok_or_else(|| {
                    ReportError::Validation(vec![metric_error(format!(
                        "invalid basic metric: {}",
                        metric.value
                    ))])
                }),
            ExternalMetricType::Custom => self.resolve_custom(customer, &metric.value).await,
            ExternalMetricType::Extended => self.resolve_extended(customer, &metric.value).await,
        }
    }

    async fn resolve_custom(
        &self,
        customer: &CustomerId,
        value: &str,
    ) -> Result<MetricParams, ReportError> {
        let invalid = || {
            ReportError::Validation(vec![metric_error(format!("invalid custom metric id: {value}"))])
        };
        if value.contains('/') || value.contains(' ') {
            return Err(invalid());
        }
        let id = CustomMetricId::new(value).ok_or_else(invalid)?;

        let exists = self
            .catalog
            .custom_metric_exists(customer, &id)
            .await
            .map_err(|e| ReportError::collaborator("metric catalog", e))?;
        if !exists {
            warn!(metric = %id, "custom metric not found");
            return Err(ReportError::Validation(vec![metric_error(format!(
                "custom metric not found: {id}"
            ))]));
        }

        debug!(metric = %id, "resolved custom metric");
        Ok(MetricParams {
            metric: Metric::Custom,
            custom_metric: Some(id),
            extended_metric: None,
        })
    }

    async fn resolve_extended(
        &self,
        customer: &CustomerId,
        value: &str,
    ) -> Result<MetricParams, ReportError> {
        if value.is_empty() {
            return Err(ReportError::Validation(vec![metric_error(
                ERR_EXTENDED_METRIC_REQUIRED,
            )]));
        }

        let registered = self
            .datahub
            .registered_metric_keys(customer)
            .await
            .map_err(|e| ReportError::collaborator("datahub metric registry", e))?;
        let known = if registered.iter().any(|k| k == value) {
            true
        } else {
            self.catalog
                .extended_metric_keys()
                .await
                .map_err(|e| ReportError::collaborator("metric catalog", e))?
                .iter()
                .any(|k| k == value)
        };

        if !known {
            warn!(metric = value, "extended metric not found");
            return Err(ReportError::Validation(vec![metric_error(format!(
                "extended metric not found: {value}"
            ))]));
        }

        Ok(MetricParams {
            metric: Metric::Extended,
            custom_metric: None,
            extended_metric: Some(value.to_string()),
        })
    }

    /// Inverse of [`MetricResolver::to_internal`]. Needs no lookups.
    pub fn to_external(params: &MetricParams) -> Result<ExternalMetric, FieldError> {
        match params.metric {
            Metric::Custom => match &params.custom_metric {
                Some(id) => Ok(ExternalMetric::new(ExternalMetricType::Custom.as_str(), id.as_str())),
                None => Err(metric_error("custom metric reference missing")),
            },
            Metric::Extended => match params.extended_metric.as_deref() {
                Some(key) if !key.is_empty() => {
                    Ok(ExternalMetric::new(ExternalMetricType::Extended.as_str(), key))
                }
                _ => Err(metric_error(ERR_EXTENDED_METRIC_REQUIRED)),
            },
            basic => BASIC_TO_EXTERNAL
                .get(&basic)
                .map(|text| ExternalMetric::new(ExternalMetricType::Basic.as_str(), *text))
                .ok_or_else(|| metric_error(format!("invalid metric: {basic}"))),
        }
    }

    /// Translates the wire metric filter.
    ///
    /// The metric, the operator and the number of values are checked
    /// independently; every failure is reported.
    pub async fn filter_to_internal(
        &self,
        customer: &CustomerId,
        filter: &ExternalMetricFilter,
    ) -> Result<MetricFilter, ReportError> {
        let mut errors = Vec::new();

        let params = self
            .to_internal(customer, Some(&filter.metric))
            .await
            .collect_into(&mut errors)?;

        let operator = OPERATOR_TO_INTERNAL.get(filter.operator.as_str()).copied();
        if operator.is_none() {
            errors.push(FieldError::new(
                fields::METRIC_FILTER,
                format!("unsupported metric filter operation: {}", filter.operator),
            ));
        }

        let expected = operator.map_or(1, MetricFilterOperator::arity);
        if filter.values.len() != expected {
            errors.push(FieldError::new(
                fields::METRIC_FILTER,
                format!("invalid number of values: {}", filter.values.len()),
            ));
        }

        match (params, operator) {
            (Some(params), Some(operator)) if errors.is_empty() => Ok(MetricFilter {
                metric: params.metric,
                operator,
                values: filter.values.clone(),
            }),
            _ => Err(ReportError::Validation(errors)),
        }
    }

    /// Exports the persisted metric filters. At most one is supported.
    ///
    /// The custom and extended references of the report's metric selector
    /// are reused for the filter's metric.
    pub fn filter_to_external(config: &ReportConfig) -> Result<Option<ExternalMetricFilter>, ReportError> {
        let filter = match config.metric_filters.as_slice() {
            [] => return Ok(None),
            [filter] => filter,
            many => {
                return Err(ReportError::Validation(vec![FieldError::new(
                    fields::METRIC_FILTER,
                    format!("unsupported multiple metric filters. Number of filters: {}", many.len()),
                )]))
            }
        };

        let mut errors = Vec::new();
        let params = MetricParams {
            metric: filter.metric,
            ..MetricParams::from_config(config)
        };
        let metric = Self::to_external(&params).collect_into(&mut errors)?;

        let operator = OPERATOR_TO_EXTERNAL.get(&filter.operator).copied();
        if operator.is_none() {
            errors.push(FieldError::new(
                fields::METRIC_FILTER,
                format!("unsupported metric filter operation: {}", filter.operator),
            ));
        }

        let exported = metric.zip(operator).map(|(metric, operator)| ExternalMetricFilter {
            metric,
            operator: operator.to_string(),
            values: filter.values.clone(),
        });
        finish(exported, errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn basic_tables_are_inverse() {
        for (text, metric) in BASIC_METRICS {
            assert_eq!(BASIC_TO_INTERNAL[text], metric);
            assert_eq!(BASIC_TO_EXTERNAL[&metric], text);
        }
        for (text, op) in METRIC_FILTER_OPERATORS {
            assert_eq!(OPERATOR_TO_EXTERNAL[&OPERATOR_TO_INTERNAL[text]], text);
            assert_eq!(OPERATOR_TO_INTERNAL[OPERATOR_TO_EXTERNAL[&op]], op);
        }
    }

    #[test]
    fn margin_has_no_external_form() {
        let err = MetricResolver::to_external(&MetricParams::basic(Metric::Margin)).unwrap_err();
        assert_eq!(err, FieldError::new(fields::METRIC, "invalid metric: margin"));
    }

    #[test]
    fn custom_and_extended_are_echoed() {
        let custom = MetricParams {
            metric: Metric::Custom,
            custom_metric: CustomMetricId::new("123"),
            extended_metric: None,
        };
        assert_eq!(
            MetricResolver::to_external(&custom).unwrap(),
            ExternalMetric::new("custom", "123")
        );

        let extended = MetricParams {
            metric: Metric::Extended,
            custom_metric: None,
            extended_metric: Some("flexsave".into()),
        };
        assert_eq!(
            MetricResolver::to_external(&extended).unwrap(),
            ExternalMetric::new("extended", "flexsave")
        );
    }

    #[test]
    fn exporting_more_than_one_metric_filter_fails() {
        let mut config = ReportConfig::default();
        let filter = MetricFilter {
            metric: Metric::Cost,
            operator: MetricFilterOperator::GreaterThan,
            values: vec![100.0],
        };
        config.metric_filters = vec![filter.clone(), filter];

        let err = MetricResolver::filter_to_external(&config).unwrap_err();
        assert_eq!(
            err.field_errors()[0].message,
            "unsupported multiple metric filters. Number of filters: 2"
        );
    }

    #[test]
    fn exported_metric_filter_uses_wire_operator() {
        let mut config = ReportConfig::default();
        config.metric_filters.push(MetricFilter {
            metric: Metric::Cost,
            operator: MetricFilterOperator::GreaterThan,
            values: vec![100.0],
        });

        let exported = MetricResolver::filter_to_external(&config).unwrap().unwrap();
        assert_eq!(exported.metric, ExternalMetric::new("basic", "cost"));
        assert_eq!(exported.operator, "gt");
        assert_eq!(exported.values, vec![100.0]);
    }
}
