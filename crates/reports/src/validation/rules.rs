use async_trait::async_trait;

use super::ReportRule;
use crate::config::{
    Report, DATE_DAY, DATE_HOUR, DATE_MONTH, DATE_QUARTER, DATE_WEEK, DATE_YEAR,
};
use crate::errors::{fields, FieldError, ReportError};
use crate::types::{
    Aggregator, Comparative, Feature, Renderer, Sort, TimeInterval, TimeSettingsMode,
};

pub const ERR_PROMOTIONAL_CREDITS_INTERVAL: &str =
    "promotional credits can only be included with a monthly, quarterly or yearly time interval";
pub const ERR_TREEMAP_AGGREGATOR: &str = "treemap renderer requires the total aggregator";
pub const ERR_TREEMAP_FEATURES: &str = "treemap renderer does not support trend or forecast analysis";
pub const ERR_TREEMAP_DIMENSIONS: &str =
    "treemap renderer only supports year, month and day dimensions";
pub const ERR_TREEMAP_COMPARATIVE: &str = "treemap renderer does not support comparative display values";
pub const ERR_COMPARATIVE_AGGREGATOR: &str = "comparative display values require the total aggregator";
pub const ERR_COMPARATIVE_FORECAST: &str = "comparative display values do not support forecast";
pub const ERR_COMPARATIVE_DIMENSIONS: &str =
    "comparative display values require time series dimensions matching the time interval";
pub const ERR_COMPARATIVE_SORT: &str = "comparative display values require ascending dimension sort";
pub const ERR_COMPARATIVE_BOTH_RENDERER: &str =
    "absolute and percentage display values are only supported by table renderers";
pub const ERR_CUSTOM_TIME_RANGE_MODE: &str =
    "custom time range requires time settings mode custom";
pub const ERR_CUSTOM_MODE_RANGE: &str = "time settings mode custom requires a custom time range";

/// Top/bottom limits must be on a field that is grouped by.
#[derive(Debug, Clone, Copy, Default)]
pub struct LimitTopBottomRule;

#[async_trait]
impl ReportRule for LimitTopBottomRule {
    fn name(&self) -> &'static str {
        "limit_top_bottom"
    }

    async fn validate(&self, report: &Report) -> Result<Vec<FieldError>, ReportError> {
        let config = &report.config;
        Ok(config
            .filters
            .iter()
            .filter(|f| f.has_limit() && !config.rows.contains(&f.id))
            .map(|f| {
                FieldError::new(
                    fields::FILTERS,
                    format!("can only limit by a field that is used as a group: {}", f.id),
                )
            })
            .collect())
    }
}

/// Promotional credits are reported per month or coarser.
#[derive(Debug, Clone, Copy, Default)]
pub struct PromotionalCreditsRule;

#[async_trait]
impl ReportRule for PromotionalCreditsRule {
    fn name(&self) -> &'static str {
        "promotional_credits"
    }

    async fn validate(&self, report: &Report) -> Result<Vec<FieldError>, ReportError> {
        let config = &report.config;
        let coarse = matches!(
            config.time_interval,
            TimeInterval::Month | TimeInterval::Quarter | TimeInterval::Year
        );
        if config.include_credits && !coarse {
            return Ok(vec![FieldError::new(
                fields::INCLUDE_CREDITS,
                ERR_PROMOTIONAL_CREDITS_INTERVAL,
            )]);
        }
        Ok(Vec::new())
    }
}

/// Treemaps show one total per group.
#[derive(Debug, Clone, Copy, Default)]
pub struct TreemapRule;

#[async_trait]
impl ReportRule for TreemapRule {
    fn name(&self) -> &'static str {
        "treemap"
    }

    async fn validate(&self, report: &Report) -> Result<Vec<FieldError>, ReportError> {
        let config = &report.config;
        let mut errors = Vec::new();
        if config.renderer != Renderer::TreemapChart {
            return Ok(errors);
        }

        if config.aggregator != Aggregator::Total {
            errors.push(FieldError::new(fields::AGGREGATOR, ERR_TREEMAP_AGGREGATOR));
        }
        if !config.features.is_empty() {
            errors.push(FieldError::new(fields::ADVANCED_ANALYSIS, ERR_TREEMAP_FEATURES));
        }
        if config
            .cols
            .iter()
            .any(|c| ![DATE_YEAR, DATE_MONTH, DATE_DAY].contains(&c.as_str()))
        {
            errors.push(FieldError::new(fields::DIMENSIONS, ERR_TREEMAP_DIMENSIONS));
        }
        if config.comparative.is_some() {
            errors.push(FieldError::new(fields::COMPARATIVE, ERR_TREEMAP_COMPARATIVE));
        }

        Ok(errors)
    }
}

/// Column sequences a comparative report may use for each time interval.
const COMPARATIVE_DIMENSIONS: &[(TimeInterval, &[&[&str]])] = &[
    (TimeInterval::Hour, &[&[DATE_YEAR, DATE_MONTH, DATE_DAY, DATE_HOUR]]),
    (TimeInterval::Day, &[&[DATE_YEAR, DATE_MONTH, DATE_DAY]]),
    (TimeInterval::DayCumSum, &[&[DATE_YEAR, DATE_MONTH, DATE_DAY]]),
    (TimeInterval::Week, &[&[DATE_YEAR, DATE_WEEK]]),
    (TimeInterval::IsoWeek, &[&[DATE_YEAR, DATE_WEEK]]),
    (
        TimeInterval::Month,
        &[&[DATE_YEAR, DATE_MONTH], &[DATE_YEAR, DATE_QUARTER, DATE_MONTH]],
    ),
    (TimeInterval::Quarter, &[&[DATE_YEAR, DATE_QUARTER]]),
    (TimeInterval::Year, &[&[DATE_YEAR]]),
];

fn is_comparative_time_series(interval: TimeInterval, cols: &[String]) -> bool {
    COMPARATIVE_DIMENSIONS
        .iter()
        .filter(|(i, _)| *i == interval)
        .flat_map(|(_, shapes)| shapes.iter())
        .any(|shape| shape.iter().copied().eq(cols.iter().map(String::as_str)))
}

/// Comparative display needs a plain time series to compare along.
#[derive(Debug, Clone, Copy, Default)]
pub struct ComparativeRule;

#[async_trait]
impl ReportRule for ComparativeRule {
    fn name(&self) -> &'static str {
        "comparative"
    }

    async fn validate(&self, report: &Report) -> Result<Vec<FieldError>, ReportError> {
        let config = &report.config;
        let mut errors = Vec::new();
        let Some(comparative) = config.comparative else {
            return Ok(errors);
        };

        if config.aggregator != Aggregator::Total {
            errors.push(FieldError::new(fields::AGGREGATOR, ERR_COMPARATIVE_AGGREGATOR));
        }
        if config.has_feature(Feature::Forecast) {
            errors.push(FieldError::new(fields::ADVANCED_ANALYSIS, ERR_COMPARATIVE_FORECAST));
        }
        if !is_comparative_time_series(config.time_interval, &config.cols) {
            errors.push(FieldError::new(fields::DIMENSIONS, ERR_COMPARATIVE_DIMENSIONS));
        }
        if config.col_order != Sort::Asc {
            errors.push(FieldError::new(fields::SORT_DIMENSIONS, ERR_COMPARATIVE_SORT));
        }
        if comparative == Comparative::AbsoluteAndPercentage && !config.renderer.is_table() {
            errors.push(FieldError::new(fields::COMPARATIVE, ERR_COMPARATIVE_BOTH_RENDERER));
        }

        Ok(errors)
    }
}

/// A split only applies to a grouped attribution group.
#[derive(Debug, Clone, Copy, Default)]
pub struct SplitRule;

#[async_trait]
impl ReportRule for SplitRule {
    fn name(&self) -> &'static str {
        "split"
    }

    async fn validate(&self, report: &Report) -> Result<Vec<FieldError>, ReportError> {
        let config = &report.config;
        Ok(config
            .splits
            .iter()
            .filter(|s| !config.rows.contains(&s.id))
            .map(|s| {
                FieldError::new(
                    fields::SPLITS,
                    format!("split attribution group must be used as a group: {}", s.id),
                )
            })
            .collect())
    }
}

/// A custom time range and time settings mode custom go together.
#[derive(Debug, Clone, Copy, Default)]
pub struct CustomTimeRangeRule;

#[async_trait]
impl ReportRule for CustomTimeRangeRule {
    fn name(&self) -> &'static str {
        "custom_time_range"
    }

    async fn validate(&self, report: &Report) -> Result<Vec<FieldError>, ReportError> {
        let config = &report.config;
        let custom_mode = config
            .time_settings
            .as_ref()
            .is_some_and(|s| s.mode == TimeSettingsMode::Custom);

        Ok(match (config.custom_time_range.is_some(), custom_mode) {
            (true, false) => vec![FieldError::new(fields::CUSTOM_TIME_RANGE, ERR_CUSTOM_TIME_RANGE_MODE)],
            (false, true) => vec![FieldError::new(fields::TIME_SETTINGS, ERR_CUSTOM_MODE_RANGE)],
            _ => Vec::new(),
        })
    }
}
