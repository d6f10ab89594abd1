//! Shared value types for the report domain.
//!
//! Most of these are closed enumerations whose wire text is also their
//! persisted text. They are generated by `wire_enum!`, which gives every type
//! the same `as_str` / `FromStr` / `Display` surface. Wire structs carry the
//! raw string and parse it during translation, so an unknown value becomes a
//! [`crate::FieldError`] naming the offending text rather than a
//! deserialisation failure.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Returned by `FromStr` on every wire enum for text that names no variant.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown value: {0}")]
pub struct UnknownVariant(pub String);

// ---------------------------------------------------------------------------
// Aggregation and time
// ---------------------------------------------------------------------------

wire_enum! {
    /// How metric values are aggregated for display.
    ///
    /// The three percentage variants are applied by
    /// [`crate::aggregation::apply_aggregator`] after the query runs.
    Aggregator {
        Total => "total",
        PercentTotal => "percent_total",
        PercentRow => "percent_row",
        PercentCol => "percent_col",
        TotalOverTotal => "total_over_total",
        Count => "count",
    }
}

impl Default for Aggregator {
    fn default() -> Self {
        Self::Total
    }
}

wire_enum! {
    /// Granularity of the report's time series.
    TimeInterval {
        Hour => "hour",
        Day => "day",
        DayCumSum => "dayCumSum",
        Week => "week",
        IsoWeek => "isoweek",
        Month => "month",
        Quarter => "quarter",
        Year => "year",
        WeekDay => "week_day",
    }
}

wire_enum! {
    /// How the time window is anchored.
    TimeSettingsMode {
        Last => "last",
        Current => "current",
        Custom => "custom",
    }
}

wire_enum! {
    /// Unit of a relative time window.
    TimeSettingsUnit {
        Day => "day",
        Week => "week",
        Month => "month",
        Quarter => "quarter",
        Year => "year",
    }
}

// ---------------------------------------------------------------------------
// Presentation
// ---------------------------------------------------------------------------

wire_enum! {
    /// Report layout.
    Renderer {
        ColumnChart => "column_chart",
        StackedColumnChart => "stacked_column_chart",
        BarChart => "bar_chart",
        StackedBarChart => "stacked_bar_chart",
        LineChart => "line_chart",
        SplineChart => "spline_chart",
        AreaChart => "area_chart",
        AreaSplineChart => "area_spline_chart",
        StackedAreaChart => "stacked_area_chart",
        TreemapChart => "treemap_chart",
        Table => "table",
        TableHeatmap => "table_heatmap",
        TableRowHeatmap => "table_row_heatmap",
        TableColHeatmap => "table_col_heatmap",
        CsvExport => "csv_export",
        SheetsExport => "sheets_export",
    }
}

impl Renderer {
    /// Returns `true` for the tabular renderers (plain table, heatmaps, exports).
    pub fn is_table(self) -> bool {
        matches!(
            self,
            Self::Table
                | Self::TableHeatmap
                | Self::TableRowHeatmap
                | Self::TableColHeatmap
                | Self::CsvExport
                | Self::SheetsExport
        )
    }
}

impl Default for Renderer {
    fn default() -> Self {
        Self::StackedColumnChart
    }
}

wire_enum! {
    /// Internal comparative mode. Absent means "actuals only".
    Comparative {
        AbsoluteChange => "values",
        PercentageChange => "percent",
        AbsoluteAndPercentage => "both",
    }
}

wire_enum! {
    /// Wire form of the comparative mode (`displayValues`).
    ExternalComparative {
        ActualsOnly => "actuals_only",
        AbsoluteChange => "absolute_change",
        PercentageChange => "percentage_change",
        AbsoluteAndPercentage => "absolute_and_percentage",
    }
}

impl ExternalComparative {
    /// Maps to the persisted mode; actuals-only is stored as no mode at all.
    pub fn to_internal(self) -> Option<Comparative> {
        match self {
            Self::ActualsOnly => None,
            Self::AbsoluteChange => Some(Comparative::AbsoluteChange),
            Self::PercentageChange => Some(Comparative::PercentageChange),
            Self::AbsoluteAndPercentage => Some(Comparative::AbsoluteAndPercentage),
        }
    }

    /// Inverse of [`ExternalComparative::to_internal`].
    pub fn from_internal(comparative: Option<Comparative>) -> Self {
        match comparative {
            None => Self::ActualsOnly,
            Some(Comparative::AbsoluteChange) => Self::AbsoluteChange,
            Some(Comparative::PercentageChange) => Self::PercentageChange,
            Some(Comparative::AbsoluteAndPercentage) => Self::AbsoluteAndPercentage,
        }
    }
}

wire_enum! {
    /// Advanced-analysis features stored on the config.
    Feature {
        TrendingUp => "increasing",
        TrendingDown => "decreasing",
        TrendingNone => "none",
        Forecast => "forecast",
    }
}

wire_enum! {
    /// Sort order for rows (groups) or columns (dimensions).
    Sort {
        AToZ => "a_to_z",
        Asc => "asc",
        Desc => "desc",
    }
}

// ---------------------------------------------------------------------------
// Data
// ---------------------------------------------------------------------------

wire_enum! {
    /// Which billing dataset the report reads.
    DataSource {
        Billing => "billing",
        BqLens => "bqlens",
        BillingDataHub => "billing-datahub",
    }
}

wire_enum! {
    /// Supported report currencies.
    Currency {
        Usd => "USD",
        Ils => "ILS",
        Eur => "EUR",
        Gbp => "GBP",
        Aud => "AUD",
        Cad => "CAD",
        Dkk => "DKK",
        Nok => "NOK",
        Sek => "SEK",
        Brl => "BRL",
        Sgd => "SGD",
        Mxn => "MXN",
        Chf => "CHF",
        Myr => "MYR",
        Twd => "TWD",
        Egp => "EGP",
        Zar => "ZAR",
        Jpy => "JPY",
        Idr => "IDR",
    }
}

impl Default for Currency {
    fn default() -> Self {
        Self::Usd
    }
}

wire_enum! {
    /// How a split redistributes its origin across the targets.
    SplitMode {
        Even => "even",
        Custom => "custom",
        Proportional => "proportional",
    }
}

wire_enum! {
    /// Direction of a top/bottom limit: `desc` keeps the top N, `asc` the bottom N.
    LimitSort {
        Desc => "desc",
        Asc => "asc",
    }
}

wire_enum! {
    /// What happens to the groups a top/bottom limit cuts off.
    ///
    /// `none` drops them. `top` and `all` fold them into one "other" group;
    /// `top` also folds nested groups that sit under an outer "other" group.
    LimitAggregation {
        Omit => "none",
        Top => "top",
        All => "all",
    }
}

impl Default for LimitAggregation {
    fn default() -> Self {
        Self::Top
    }
}

// ---------------------------------------------------------------------------
// Metrics
// ---------------------------------------------------------------------------

/// Internal metric selector, persisted as an integer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum Metric {
    #[default]
    Cost = 0,
    Usage = 1,
    Savings = 2,
    Margin = 3,
    Custom = 4,
    Extended = 5,
}

impl Metric {
    /// Returns the metric text.
    pub fn text(self) -> &'static str {
        match self {
            Self::Cost => "cost",
            Self::Usage => "usage",
            Self::Savings => "savings",
            Self::Margin => "margin",
            Self::Custom => "custom",
            Self::Extended => "ext_metric",
        }
    }
}

impl From<Metric> for u8 {
    fn from(metric: Metric) -> Self {
        metric as u8
    }
}

impl TryFrom<u8> for Metric {
    type Error = UnknownVariant;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Cost),
            1 => Ok(Self::Usage),
            2 => Ok(Self::Savings),
            3 => Ok(Self::Margin),
            4 => Ok(Self::Custom),
            5 => Ok(Self::Extended),
            other => Err(UnknownVariant(other.to_string())),
        }
    }
}

impl std::fmt::Display for Metric {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.text())
    }
}

wire_enum! {
    /// Kind of metric reference on the wire.
    ExternalMetricType {
        Basic => "basic",
        Custom => "custom",
        Extended => "extended",
    }
}

wire_enum! {
    /// Persisted metric-filter operator.
    MetricFilterOperator {
        GreaterThan => ">",
        LessThan => "<",
        LessEqThan => "<=",
        GreaterEqThan => ">=",
        Between => "between",
        NotBetween => "not_between",
        Equals => "=",
        NotEquals => "!=",
    }
}

impl MetricFilterOperator {
    /// Number of numeric bounds the operator takes.
    pub fn arity(self) -> usize {
        match self {
            Self::Between | Self::NotBetween => 2,
            _ => 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn wire_enums_parse_their_own_text() {
        for aggregator in Aggregator::ALL {
            assert_eq!(Aggregator::from_str(aggregator.as_str()).unwrap(), *aggregator);
        }
        assert_eq!(
            TimeInterval::from_str("INVALID").unwrap_err(),
            UnknownVariant("INVALID".into())
        );
    }

    #[test]
    fn wire_enums_serialise_as_wire_text() {
        assert_eq!(
            serde_json::to_string(&DataSource::BillingDataHub).unwrap(),
            "\"billing-datahub\""
        );
        let interval: TimeInterval = serde_json::from_str("\"dayCumSum\"").unwrap();
        assert_eq!(interval, TimeInterval::DayCumSum);
    }

    #[test]
    fn metric_is_persisted_as_integer() {
        assert_eq!(serde_json::to_string(&Metric::Custom).unwrap(), "4");
        let metric: Metric = serde_json::from_str("2").unwrap();
        assert_eq!(metric, Metric::Savings);
        assert!(serde_json::from_str::<Metric>("9").is_err());
    }

    #[test]
    fn comparative_round_trips_through_wire_form() {
        for external in ExternalComparative::ALL {
            assert_eq!(
                ExternalComparative::from_internal(external.to_internal()),
                *external
            );
        }
    }

    #[test]
    fn table_family_excludes_charts() {
        assert!(Renderer::CsvExport.is_table());
        assert!(!Renderer::TreemapChart.is_table());
    }
}
