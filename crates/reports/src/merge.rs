//! Merging a partial external configuration into a persisted one.
//!
//! Each field present on the external config is translated on its own; a
//! failure is recorded and the merge moves on, so the caller sees every
//! problem in one pass. The config is mutated in place and stays visible to
//! the caller when the validation sentinel is returned.

use std::collections::BTreeSet;
use std::sync::Arc;

use tracing::{debug, instrument};

use crate::config::{Report, ReportConfig, ReportFilter};
use crate::errors::{fields, finish, CollectValidation, FieldError, ReportError};
use crate::external::{parse_wire, ExternalConfig, ExternalGroup, ExternalLimit, ExternalReport};
use crate::field_id::FieldType;
use crate::metrics::MetricResolver;
use crate::ports::DataHubMetricRegistry;
use crate::splits::SplitTranslator;
use crate::types::{
    Aggregator, Currency, DataSource, ExternalComparative, LimitSort, Renderer, Sort, TimeInterval,
};
use crate::CustomerId;

pub const ERR_INVALID_REPORT_NAME: &str = "report name must not be empty";

/// Translates external reports and configurations into their persisted form.
#[derive(Clone)]
pub struct ReportTranslator {
    metrics: MetricResolver,
    splits: SplitTranslator,
    datahub: Arc<dyn DataHubMetricRegistry>,
}

impl ReportTranslator {
    pub fn new(
        metrics: MetricResolver,
        splits: SplitTranslator,
        datahub: Arc<dyn DataHubMetricRegistry>,
    ) -> Self {
        Self {
            metrics,
            splits,
            datahub,
        }
    }

    /// Applies `external` to `report`.
    ///
    /// An empty name is rejected; the description is copied when present and
    /// the config is merged with [`ReportTranslator::merge_config`]. Errors
    /// from the envelope and the config are returned together.
    #[instrument(skip_all, fields(customer = %customer))]
    pub async fn update_report_with_external(
        &self,
        customer: &CustomerId,
        report: &mut Report,
        external: &ExternalReport,
    ) -> Result<(), ReportError> {
        let mut errors = Vec::new();

        if external.name.is_empty() {
            errors.push(FieldError::new(fields::NAME, ERR_INVALID_REPORT_NAME));
        } else {
            report.name = external.name.clone();
        }

        if let Some(description) = &external.description {
            report.description = description.clone();
        }

        if let Some(config) = &external.config {
            self.merge_config(customer, &mut report.config, config)
                .await
                .collect_into(&mut errors)?;
        }

        finish((), errors)
    }

    /// Merges every field present on `external` into `config`.
    #[instrument(skip_all, fields(customer = %customer))]
    pub async fn merge_config(
        &self,
        customer: &CustomerId,
        config: &mut ReportConfig,
        external: &ExternalConfig,
    ) -> Result<(), ReportError> {
        let mut errors = Vec::new();

        if let Some(metric) = &external.metric {
            if let Some(params) = self
                .metrics
                .to_internal(customer, Some(metric))
                .await
                .collect_into(&mut errors)?
            {
                params.apply_to(config);
            }
        }

        if let Some(metric_filter) = &external.metric_filter {
            config.metric_filters.clear();
            if let Some(filter) = self
                .metrics
                .filter_to_internal(customer, metric_filter)
                .await
                .collect_into(&mut errors)?
            {
                config.metric_filters.push(filter);
            }
        }

        if let Some(aggregator) = &external.aggregator {
            if let Some(a) = parse_wire::<Aggregator>(fields::AGGREGATOR, "aggregator", aggregator)
                .collect_into(&mut errors)?
            {
                config.aggregator = a;
            }
        }

        if let Some(analysis) = external.advanced_analysis {
            config.features = analysis.to_internal();
        }

        if let Some(interval) = &external.time_interval {
            if let Some(i) =
                parse_wire::<TimeInterval>(fields::TIME_INTERVAL, "time interval", interval)
                    .collect_into(&mut errors)?
            {
                config.time_interval = i;
            }
        }

        if let Some(settings) = &external.time_settings {
            if let Some(s) = settings.to_internal().collect_into(&mut errors)? {
                config.time_settings = Some(s);
            }
        }

        if let Some(range) = &external.custom_time_range {
            if let Some(r) = range.to_internal().collect_into(&mut errors)? {
                config.custom_time_range = Some(r);
            }
        }

        if let Some(dimensions) = &external.dimensions {
            config.cols.clear();
            for dimension in dimensions {
                if let Some(col) = dimension.to_internal().collect_into(&mut errors)? {
                    config.cols.push(col);
                }
            }
        }

        if let Some(include) = external.include_promotional_credits {
            config.include_credits = include;
        }

        if let Some(include) = external.include_subtotals {
            config.include_subtotals = include;
        }

        if let Some(sort) = &external.sort_groups {
            if let Some(s) = parse_wire::<Sort>(fields::SORT_GROUPS, "sort groups value", sort)
                .collect_into(&mut errors)?
            {
                config.row_order = s;
            }
        }

        if let Some(sort) = &external.sort_dimensions {
            if let Some(s) =
                parse_wire::<Sort>(fields::SORT_DIMENSIONS, "sort dimensions value", sort)
                    .collect_into(&mut errors)?
            {
                config.col_order = s;
            }
        }

        if let Some(filters) = &external.filters {
            config.filters.clear();
            for filter in filters {
                if let Some(f) = filter.to_internal().collect_into(&mut errors)? {
                    config.filters.push(f);
                }
            }
        }

        if let Some(groups) = &external.groups {
            self.merge_groups(customer, config, groups, &mut errors).await?;
        }

        if let Some(renderer) = &external.renderer {
            if let Some(r) = parse_wire::<Renderer>(fields::RENDERER, "renderer", renderer)
                .collect_into(&mut errors)?
            {
                config.renderer = r;
            }
        }

        match &external.data_source {
            Some(source) => {
                if let Some(s) = parse_wire::<DataSource>(fields::DATA_SOURCE, "data source", source)
                    .collect_into(&mut errors)?
                {
                    config.data_source = Some(s);
                }
            }
            None => {
                config.data_source = Some(self.default_data_source(customer).await?);
            }
        }

        if let Some(display) = &external.display_values {
            if let Some(c) =
                parse_wire::<ExternalComparative>(fields::COMPARATIVE, "displayValues", display)
                    .collect_into(&mut errors)?
            {
                config.comparative = c.to_internal();
            }
        }

        if let Some(currency) = &external.currency {
            if let Some(c) = parse_wire::<Currency>(fields::CURRENCY, "currency", currency)
                .collect_into(&mut errors)?
            {
                config.currency = c;
            }
        }

        if let Some(splits) = &external.splits {
            if let Some(s) = self.splits.to_internal(splits).await.collect_into(&mut errors)? {
                config.splits = s;
            }
        }

        debug!(errors = errors.len(), "merged external config");
        finish((), errors)
    }

    /// Datasource used when none is set: DataHub-backed billing when the
    /// tenant has registered at least one DataHub metric, plain billing
    /// otherwise.
    pub async fn default_data_source(&self, customer: &CustomerId) -> Result<DataSource, ReportError> {
        let registered = self
            .datahub
            .registered_metric_keys(customer)
            .await
            .map_err(|e| ReportError::collaborator("datahub metric registry", e))?;

        Ok(if registered.is_empty() {
            DataSource::Billing
        } else {
            DataSource::BillingDataHub
        })
    }

    /// Replaces the rows and reconciles group limits with the filter list.
    ///
    /// Limits belong to the groups list: limits on fields no longer limited
    /// are cleared and filters that only held such a limit are dropped.
    async fn merge_groups(
        &self,
        customer: &CustomerId,
        config: &mut ReportConfig,
        groups: &[ExternalGroup],
        errors: &mut Vec<FieldError>,
    ) -> Result<(), ReportError> {
        config.rows.clear();

        let mut limited = Vec::new();
        for group in groups {
            if let Some(row) = group.to_internal().collect_into(errors)? {
                if let Some(limit) = &group.limit {
                    limited.push((row.clone(), group, limit));
                }
                config.rows.push(row);
            }
        }

        let keep: BTreeSet<&str> = limited.iter().map(|(row, _, _)| row.as_str()).collect();
        config
            .filters
            .retain(|f| keep.contains(f.id.as_str()) || !f.is_limit_only());
        for filter in config.filters.iter_mut().filter(|f| !keep.contains(f.id.as_str())) {
            clear_limit(filter);
        }

        for (row, group, limit) in limited {
            self.apply_group_limit(customer, &mut config.filters, row, group, limit, errors)
                .await?;
        }

        Ok(())
    }

    /// Writes a group's limit onto the filter keyed by the group's ID,
    /// creating a limit-only filter when none exists.
    async fn apply_group_limit(
        &self,
        customer: &CustomerId,
        filters: &mut Vec<ReportFilter>,
        row: String,
        group: &ExternalGroup,
        limit: &ExternalLimit,
        errors: &mut Vec<FieldError>,
    ) -> Result<(), ReportError> {
        let before = errors.len();

        let metric = self
            .metrics
            .to_internal(customer, Some(&limit.metric))
            .await
            .collect_into(errors)?;
        let order = parse_wire::<LimitSort>(fields::LIMIT, "limit sort", &limit.sort)
            .collect_into(errors)?;
        if limit.value < 0 {
            errors.push(FieldError::new(
                fields::LIMIT,
                format!("invalid limit value: {}", limit.value),
            ));
        }

        let (Some(metric), Some(order)) = (metric, order) else {
            return Ok(());
        };
        if errors.len() > before {
            return Ok(());
        }

        let filter = match filters.iter().position(|f| f.id == row) {
            Some(index) => &mut filters[index],
            None => {
                let field_type = group.field_type.parse::<FieldType>().ok().map(FieldType::persisted);
                filters.push(ReportFilter {
                    id: row,
                    field_type,
                    ..Default::default()
                });
                let last = filters.len() - 1;
                &mut filters[last]
            }
        };

        filter.limit = limit.value;
        filter.limit_order = Some(order);
        filter.limit_metric = Some(metric.metric);
        debug!(filter = %filter.id, limit = filter.limit, "applied group limit");
        Ok(())
    }
}

fn clear_limit(filter: &mut ReportFilter) {
    filter.limit = 0;
    filter.limit_order = None;
    filter.limit_metric = None;
}
