//! Wire-level (external) report configuration.
//!
//! Every field is optional: absent means "leave the internal value as it is"
//! when merging. List fields, when present, replace the internal list.
//! Enumerated values arrive as raw strings and are parsed during translation
//! so that an unknown value produces a [`FieldError`] quoting it.
//!
//! The self-contained field translations (those needing no collaborator)
//! live here; the orchestration is in [`crate::merge`] and [`crate::export`].

use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::{CustomTimeRange, ReportFilter, TimeSettings, TIME_SETTINGS_AMOUNT_RANGE};
use crate::errors::{fields, FieldError};
use crate::field_id::{self, FieldId, FieldType};
use crate::types::{Feature, TimeSettingsMode, TimeSettingsUnit};
use crate::ReportId;

pub const ERR_INVALID_CUSTOM_TIME_RANGE_ZERO: &str =
    "custom time range 'from' and 'to' must both be set";
pub const ERR_INVALID_CUSTOM_TIME_RANGE_ORDER: &str =
    "custom time range 'from' must not be after 'to'";
pub const ERR_FILTER_VALUES_AND_REGEXP: &str = "filter must not set both values and regexp";
pub const ERR_FILTER_NO_VALUES_OR_REGEXP: &str = "filter must set either values or regexp";

/// Parses a wire enum, producing `"invalid <label>: <text>"` on failure.
pub(crate) fn parse_wire<T: FromStr>(field: &str, label: &str, text: &str) -> Result<T, FieldError> {
    text.parse()
        .map_err(|_| FieldError::new(field, format!("invalid {label}: {text}")))
}

// ---------------------------------------------------------------------------
// Report envelope
// ---------------------------------------------------------------------------

/// A report as sent or returned by API clients.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExternalReport {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<ReportId>,
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub report_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<ExternalConfig>,
}

/// The partial, wire-level report configuration.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ExternalConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metric: Option<ExternalMetric>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metric_filter: Option<ExternalMetricFilter>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub aggregator: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub advanced_analysis: Option<AdvancedAnalysis>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time_interval: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time_settings: Option<ExternalTimeSettings>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub custom_time_range: Option<ExternalCustomTimeRange>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dimensions: Option<Vec<ExternalDimension>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub include_promotional_credits: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub include_subtotals: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sort_groups: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sort_dimensions: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filters: Option<Vec<ExternalFilter>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub groups: Option<Vec<ExternalGroup>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub renderer: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_values: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub currency: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_source: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub splits: Option<Vec<ExternalSplit>>,
}

// ---------------------------------------------------------------------------
// Metrics
// ---------------------------------------------------------------------------

/// A metric reference: a basic metric name, a custom metric ID, or an
/// extended metric key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalMetric {
    #[serde(rename = "type")]
    pub metric_type: String,
    pub value: String,
}

impl ExternalMetric {
    pub fn new(metric_type: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            metric_type: metric_type.into(),
            value: value.into(),
        }
    }
}

/// A filter on the aggregated metric value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExternalMetricFilter {
    pub metric: ExternalMetric,
    /// Wire operator: `gt`, `lt`, `lte`, `gte`, `b`, `nb`, `e`, `ne`.
    pub operator: String,
    pub values: Vec<f64>,
}

// ---------------------------------------------------------------------------
// Advanced analysis
// ---------------------------------------------------------------------------

/// Trend and forecast switches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AdvancedAnalysis {
    pub trending_up: bool,
    pub trending_down: bool,
    pub not_trending: bool,
    pub forecast: bool,
}

impl AdvancedAnalysis {
    /// Enabled switches as persisted features.
    pub fn to_internal(self) -> Vec<Feature> {
        let mut features = Vec::new();
        if self.trending_up {
            features.push(Feature::TrendingUp);
        }
        if self.trending_down {
            features.push(Feature::TrendingDown);
        }
        if self.not_trending {
            features.push(Feature::TrendingNone);
        }
        if self.forecast {
            features.push(Feature::Forecast);
        }
        features
    }

    pub fn from_internal(features: &[Feature]) -> Self {
        Self {
            trending_up: features.contains(&Feature::TrendingUp),
            trending_down: features.contains(&Feature::TrendingDown),
            not_trending: features.contains(&Feature::TrendingNone),
            forecast: features.contains(&Feature::Forecast),
        }
    }
}

// ---------------------------------------------------------------------------
// Time
// ---------------------------------------------------------------------------

/// Relative time window as sent on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExternalTimeSettings {
    pub mode: String,
    #[serde(default)]
    pub amount: i64,
    #[serde(default)]
    pub include_current: bool,
    #[serde(default)]
    pub unit: String,
}

impl ExternalTimeSettings {
    /// Validates mode, unit and amount, in that order; the first failure wins.
    pub fn to_internal(&self) -> Result<TimeSettings, FieldError> {
        let mode: TimeSettingsMode = self.mode.parse().map_err(|_| {
            FieldError::new(
                fields::TIME_SETTINGS,
                format!("invalid timeSettings mode: {}", self.mode),
            )
        })?;
        let unit: TimeSettingsUnit = self.unit.parse().map_err(|_| {
            FieldError::new(
                fields::TIME_SETTINGS,
                format!("invalid timeSettings unit: {}", self.unit),
            )
        })?;
        if !TIME_SETTINGS_AMOUNT_RANGE.contains(&self.amount) {
            return Err(FieldError::new(
                fields::TIME_SETTINGS,
                format!(
                    "invalid timeSettings amount, must be between {} and {}",
                    TIME_SETTINGS_AMOUNT_RANGE.start(),
                    TIME_SETTINGS_AMOUNT_RANGE.end()
                ),
            ));
        }

        Ok(TimeSettings {
            mode,
            amount: self.amount,
            include_current: self.include_current,
            unit,
        })
    }

    pub fn from_internal(settings: &TimeSettings) -> Self {
        Self {
            mode: settings.mode.to_string(),
            amount: settings.amount,
            include_current: settings.include_current,
            unit: settings.unit.to_string(),
        }
    }
}

/// Explicit time window as sent on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ExternalCustomTimeRange {
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}

impl ExternalCustomTimeRange {
    pub fn to_internal(&self) -> Result<CustomTimeRange, FieldError> {
        let (Some(from), Some(to)) = (self.from, self.to) else {
            return Err(FieldError::new(
                fields::CUSTOM_TIME_RANGE,
                ERR_INVALID_CUSTOM_TIME_RANGE_ZERO,
            ));
        };
        if from.timestamp() == 0 || to.timestamp() == 0 {
            return Err(FieldError::new(
                fields::CUSTOM_TIME_RANGE,
                ERR_INVALID_CUSTOM_TIME_RANGE_ZERO,
            ));
        }
        if from > to {
            return Err(FieldError::new(
                fields::CUSTOM_TIME_RANGE,
                ERR_INVALID_CUSTOM_TIME_RANGE_ORDER,
            ));
        }

        Ok(CustomTimeRange { from, to })
    }

    pub fn from_internal(range: &CustomTimeRange) -> Self {
        Self {
            from: Some(range.from),
            to: Some(range.to),
        }
    }
}

// ---------------------------------------------------------------------------
// Dimensions, groups, filters
// ---------------------------------------------------------------------------

/// Parses a wire field type and encodes the raw key, tagging failures with `field`.
fn encode_wire_field(field: &str, field_type: &str, key: &str) -> Result<String, FieldError> {
    let parsed: FieldType = field_type.parse().map_err(|_| {
        FieldError::new(field, format!("invalid metadata field type: {field_type}"))
    })?;
    field_id::encode(parsed, key).map_err(|e| FieldError::new(field, e.to_string()))
}

/// Decodes a persisted identifier for export, tagging failures with `field`.
fn decode_for_export(field: &str, id: &str) -> Result<FieldId, FieldError> {
    FieldId::decode(id).map_err(|e| FieldError::new(field, format!("{e}: {id}")))
}

/// A column dimension.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalDimension {
    /// Raw key (not base64-encoded).
    pub id: String,
    #[serde(rename = "type")]
    pub field_type: String,
}

impl ExternalDimension {
    /// Encoded column identifier.
    pub fn to_internal(&self) -> Result<String, FieldError> {
        encode_wire_field(fields::DIMENSIONS, &self.field_type, &self.id)
    }

    pub fn from_internal(id: &str) -> Result<Self, FieldError> {
        let decoded = decode_for_export(fields::DIMENSIONS, id)?;
        Ok(Self {
            id: decoded.key,
            field_type: decoded.field_type.to_string(),
        })
    }
}

/// Top/bottom limit attached to a group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalLimit {
    /// Number of rows to keep.
    pub value: i64,
    /// `desc` keeps the top rows, `asc` the bottom rows.
    pub sort: String,
    /// Metric the rows are ranked by.
    pub metric: ExternalMetric,
}

/// A row dimension, optionally limited to its top or bottom values.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalGroup {
    /// Raw key (not base64-encoded).
    pub id: String,
    #[serde(rename = "type")]
    pub field_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<ExternalLimit>,
}

impl ExternalGroup {
    /// Encoded row identifier. Also the ID of the filter holding the limit.
    pub fn to_internal(&self) -> Result<String, FieldError> {
        encode_wire_field(fields::GROUPS, &self.field_type, &self.id)
    }

    /// Rebuilds the group for `id`; the limit is attached by the exporter.
    pub fn from_internal(id: &str) -> Result<Self, FieldError> {
        let decoded = decode_for_export(fields::GROUPS, id)?;
        Ok(Self {
            id: decoded.key,
            field_type: decoded.field_type.to_string(),
            limit: None,
        })
    }
}

/// A dimension filter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExternalFilter {
    /// Raw key (not base64-encoded).
    pub id: String,
    #[serde(rename = "type")]
    pub field_type: String,
    #[serde(default)]
    pub inverse: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub values: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub regexp: Option<String>,
}

impl ExternalFilter {
    /// Translates the filter. Type and values/regexp problems are both reported.
    pub fn to_internal(&self) -> Result<ReportFilter, Vec<FieldError>> {
        let mut errors = Vec::new();

        let field_type = match self.field_type.parse::<FieldType>() {
            Ok(t) => Some(t),
            Err(_) => {
                errors.push(FieldError::new(
                    fields::FILTERS,
                    format!("invalid config filter type: {}", self.field_type),
                ));
                None
            }
        };

        match (&self.values, &self.regexp) {
            (Some(_), Some(_)) => {
                errors.push(FieldError::new(fields::FILTERS, ERR_FILTER_VALUES_AND_REGEXP))
            }
            (None, None) => {
                errors.push(FieldError::new(fields::FILTERS, ERR_FILTER_NO_VALUES_OR_REGEXP))
            }
            _ => {}
        }

        let id = field_type.and_then(|field_type| {
            field_id::encode(field_type, &self.id)
                .map_err(|e| errors.push(FieldError::new(fields::FILTERS, e.to_string())))
                .ok()
        });

        match (field_type, id) {
            (Some(field_type), Some(id)) if errors.is_empty() => Ok(ReportFilter {
                id,
                field_type: Some(field_type.persisted()),
                inverse: self.inverse,
                values: self.values.clone(),
                regexp: self.regexp.clone(),
                ..Default::default()
            }),
            _ => Err(errors),
        }
    }

    pub fn from_internal(filter: &ReportFilter) -> Result<Self, FieldError> {
        let decoded = decode_for_export(fields::FILTERS, &filter.id)?;
        Ok(Self {
            id: decoded.key,
            field_type: decoded.field_type.to_string(),
            inverse: filter.inverse,
            values: filter.values.clone(),
            regexp: filter.regexp.clone(),
        })
    }
}

// ---------------------------------------------------------------------------
// Splits
// ---------------------------------------------------------------------------

/// The attribution whose values a split redistributes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalSplitOrigin {
    pub id: String,
    #[serde(rename = "type")]
    pub field_type: String,
}

/// A split recipient. `value` is required in custom mode and forbidden otherwise.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExternalSplitTarget {
    pub id: String,
    #[serde(rename = "type")]
    pub field_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<f64>,
}

/// A split as sent on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExternalSplit {
    /// Raw attribution-group ID.
    pub id: String,
    #[serde(rename = "type")]
    pub field_type: String,
    pub mode: String,
    pub origin: ExternalSplitOrigin,
    #[serde(default)]
    pub include_origin: bool,
    pub targets: Vec<ExternalSplitTarget>,
}
