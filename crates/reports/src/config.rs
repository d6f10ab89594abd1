//! Internal (persisted) report configuration.
//!
//! This is the storage-oriented shape consumed by the query engine. It is
//! always fully populated: [`ReportConfig::default`] supplies every value an
//! external config may leave out.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::field_id::FieldType;
use crate::types::{
    Aggregator, Comparative, Currency, DataSource, Feature, LimitAggregation, LimitSort, Metric,
    MetricFilterOperator, Renderer, Sort, SplitMode, TimeInterval, TimeSettingsMode,
    TimeSettingsUnit,
};
use crate::{CustomMetricId, ReportId};

/// Name given to reports created without one.
pub const DEFAULT_REPORT_NAME: &str = "Untitled report";

/// Inclusive bounds of [`TimeSettings::amount`].
pub const TIME_SETTINGS_AMOUNT_RANGE: std::ops::RangeInclusive<i64> = 0..=5000;

pub const DATE_YEAR: &str = "datetime:year";
pub const DATE_QUARTER: &str = "datetime:quarter";
pub const DATE_MONTH: &str = "datetime:month";
pub const DATE_WEEK: &str = "datetime:week";
pub const DATE_DAY: &str = "datetime:day";
pub const DATE_HOUR: &str = "datetime:hour";

/// Column dimensions that express `interval` as a time series.
pub fn cols_for_interval(interval: TimeInterval) -> Vec<String> {
    let mut cols = vec![DATE_YEAR];

    match interval {
        TimeInterval::Hour => cols.extend([DATE_MONTH, DATE_DAY, DATE_HOUR]),
        TimeInterval::Day | TimeInterval::DayCumSum => cols.extend([DATE_MONTH, DATE_DAY]),
        TimeInterval::Week | TimeInterval::IsoWeek => cols.push(DATE_WEEK),
        TimeInterval::Month => cols.push(DATE_MONTH),
        TimeInterval::Quarter => cols.push(DATE_QUARTER),
        TimeInterval::Year | TimeInterval::WeekDay => {}
    }

    cols.into_iter().map(String::from).collect()
}

// ---------------------------------------------------------------------------
// Time
// ---------------------------------------------------------------------------

/// A relative time window.
///
/// With mode `last`, amount 2 and unit `day` on April 17th the window is the
/// 15th and 16th; with `include_current` it is the 16th and 17th.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeSettings {
    pub mode: TimeSettingsMode,
    pub amount: i64,
    pub include_current: bool,
    pub unit: TimeSettingsUnit,
}

/// An explicit time window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomTimeRange {
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Filters
// ---------------------------------------------------------------------------

/// A dimension filter, optionally carrying top/bottom limit metadata.
///
/// A filter with neither `values` nor `regexp` exists only to hold a limit;
/// such filters are created from groups and are exported as group limits.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportFilter {
    /// Encoded field identifier.
    pub id: String,
    #[serde(rename = "type")]
    pub field_type: Option<FieldType>,
    #[serde(default)]
    pub inverse: bool,
    #[serde(default)]
    pub values: Option<Vec<String>>,
    #[serde(default)]
    pub regexp: Option<String>,
    #[serde(default)]
    pub allow_null: bool,
    /// Number of rows to keep; zero means no limit.
    #[serde(default)]
    pub limit: i64,
    #[serde(default)]
    pub limit_order: Option<LimitSort>,
    #[serde(default)]
    pub limit_metric: Option<Metric>,
}

impl ReportFilter {
    /// Returns `true` when the filter carries a top/bottom limit.
    pub fn has_limit(&self) -> bool {
        self.limit > 0
    }

    /// Returns `true` when the filter holds only limit metadata.
    pub fn is_limit_only(&self) -> bool {
        self.values.is_none() && self.regexp.is_none()
    }
}

/// A filter on the aggregated metric value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricFilter {
    pub metric: Metric,
    pub operator: MetricFilterOperator,
    pub values: Vec<f64>,
}

// ---------------------------------------------------------------------------
// Splits
// ---------------------------------------------------------------------------

/// One recipient of a split.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SplitTarget {
    /// Encoded field identifier.
    pub id: String,
    #[serde(rename = "type")]
    pub field_type: FieldType,
    /// Share of the origin; only meaningful in custom mode.
    #[serde(default)]
    pub value: f64,
}

/// Redistribution of one attribution's values across other attributions of
/// the same attribution group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Split {
    /// Encoded identifier of the attribution group being split.
    pub id: String,
    #[serde(rename = "type")]
    pub field_type: FieldType,
    pub mode: SplitMode,
    /// Encoded identifier of the attribution whose values are redistributed.
    pub origin: String,
    #[serde(default)]
    pub include_origin: bool,
    pub targets: Vec<SplitTarget>,
}

// ---------------------------------------------------------------------------
// Config
// ---------------------------------------------------------------------------

/// The persisted report configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ReportConfig {
    pub metric: Metric,
    /// Set when `metric` is [`Metric::Custom`].
    pub calculated_metric: Option<CustomMetricId>,
    /// Set when `metric` is [`Metric::Extended`].
    pub extended_metric: Option<String>,
    pub metric_filters: Vec<MetricFilter>,
    pub aggregator: Aggregator,
    pub features: Vec<Feature>,
    pub time_interval: TimeInterval,
    pub time_settings: Option<TimeSettings>,
    pub custom_time_range: Option<CustomTimeRange>,
    /// Encoded column dimension IDs, in display order.
    pub cols: Vec<String>,
    /// Encoded row dimension (group) IDs, in display order.
    pub rows: Vec<String>,
    pub filters: Vec<ReportFilter>,
    pub renderer: Renderer,
    pub comparative: Option<Comparative>,
    pub currency: Currency,
    pub data_source: Option<DataSource>,
    pub row_order: Sort,
    pub col_order: Sort,
    pub include_credits: bool,
    pub include_subtotals: bool,
    pub splits: Vec<Split>,
    /// Fate of the groups cut off by row limits.
    pub limit_aggregation: LimitAggregation,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            metric: Metric::Cost,
            calculated_metric: None,
            extended_metric: None,
            metric_filters: Vec::new(),
            aggregator: Aggregator::Total,
            features: Vec::new(),
            time_interval: TimeInterval::Day,
            time_settings: Some(TimeSettings {
                mode: TimeSettingsMode::Last,
                amount: 7,
                include_current: true,
                unit: TimeSettingsUnit::Day,
            }),
            custom_time_range: None,
            cols: cols_for_interval(TimeInterval::Day),
            rows: Vec::new(),
            filters: Vec::new(),
            renderer: Renderer::StackedColumnChart,
            comparative: None,
            currency: Currency::Usd,
            data_source: None,
            row_order: Sort::Asc,
            col_order: Sort::Desc,
            include_credits: false,
            include_subtotals: false,
            splits: Vec::new(),
            limit_aggregation: LimitAggregation::Top,
        }
    }
}

impl ReportConfig {
    /// Returns `true` when `id` is used as a row, a column, or a filter.
    pub fn is_using_dimension(&self, id: &str) -> bool {
        self.rows.iter().chain(self.cols.iter()).any(|d| d == id)
            || self.filters.iter().any(|f| f.id == id)
    }

    /// Returns the filter with the given encoded ID, if any.
    pub fn filter(&self, id: &str) -> Option<&ReportFilter> {
        self.filters.iter().find(|f| f.id == id)
    }

    /// Returns `true` when `feature` is enabled.
    pub fn has_feature(&self, feature: Feature) -> bool {
        self.features.contains(&feature)
    }
}

// ---------------------------------------------------------------------------
// Report
// ---------------------------------------------------------------------------

wire_enum! {
    /// Who owns a report's definition.
    ReportType {
        Custom => "custom",
        Preset => "preset",
        Managed => "managed",
    }
}

/// A report: identity, presentation metadata, and configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Report {
    /// `None` until the report is stored.
    pub id: Option<ReportId>,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(rename = "type")]
    pub report_type: ReportType,
    #[serde(default)]
    pub config: ReportConfig,
}

impl Report {
    /// A fresh custom report with the default configuration.
    pub fn new_default() -> Self {
        Self {
            id: None,
            name: DEFAULT_REPORT_NAME.to_string(),
            description: String::new(),
            report_type: ReportType::Custom,
            config: ReportConfig::default(),
        }
    }
}
