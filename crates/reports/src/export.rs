//! Export of a persisted report into its complete external form.

use tracing::instrument;

use crate::config::Report;
use crate::errors::{finish, CollectValidation, ReportError};
use crate::external::{
    AdvancedAnalysis, ExternalConfig, ExternalCustomTimeRange, ExternalDimension, ExternalFilter,
    ExternalGroup, ExternalLimit, ExternalReport, ExternalTimeSettings,
};
use crate::merge::ReportTranslator;
use crate::metrics::{MetricParams, MetricResolver};
use crate::splits::split_to_external;
use crate::types::{ExternalComparative, LimitSort};
use crate::CustomerId;

impl ReportTranslator {
    /// Builds the external form of `report`. Every field is populated.
    ///
    /// Group limits are read back from the filter sharing the group's ID;
    /// filters that only carry a limit are therefore not exported as filters.
    /// An unset datasource is computed as it would be on merge.
    #[instrument(skip_all, fields(customer = %customer))]
    pub async fn report_to_external(
        &self,
        customer: &CustomerId,
        report: &Report,
    ) -> Result<ExternalReport, ReportError> {
        let config = &report.config;
        let mut errors = Vec::new();
        let params = MetricParams::from_config(config);

        let data_source = match config.data_source {
            Some(source) => source,
            None => self.default_data_source(customer).await?,
        };

        let mut dimensions = Vec::with_capacity(config.cols.len());
        for col in &config.cols {
            if let Some(d) = ExternalDimension::from_internal(col).collect_into(&mut errors)? {
                dimensions.push(d);
            }
        }

        let mut groups = Vec::with_capacity(config.rows.len());
        for row in &config.rows {
            let Some(mut group) = ExternalGroup::from_internal(row).collect_into(&mut errors)? else {
                continue;
            };
            if let Some(filter) = config.filter(row).filter(|f| f.has_limit()) {
                let limit_params = MetricParams {
                    metric: filter.limit_metric.unwrap_or(config.metric),
                    ..params.clone()
                };
                if let Some(metric) =
                    MetricResolver::to_external(&limit_params).collect_into(&mut errors)?
                {
                    group.limit = Some(ExternalLimit {
                        value: filter.limit,
                        sort: filter.limit_order.unwrap_or(LimitSort::Desc).to_string(),
                        metric,
                    });
                }
            }
            groups.push(group);
        }

        let mut filters = Vec::with_capacity(config.filters.len());
        for filter in config.filters.iter().filter(|f| !f.is_limit_only()) {
            if let Some(f) = ExternalFilter::from_internal(filter).collect_into(&mut errors)? {
                filters.push(f);
            }
        }

        let mut splits = Vec::with_capacity(config.splits.len());
        for split in &config.splits {
            if let Some(s) = split_to_external(split).collect_into(&mut errors)? {
                splits.push(s);
            }
        }

        let external = ExternalConfig {
            metric: MetricResolver::to_external(&params).collect_into(&mut errors)?,
            metric_filter: MetricResolver::filter_to_external(config)
                .collect_into(&mut errors)?
                .flatten(),
            aggregator: Some(config.aggregator.to_string()),
            advanced_analysis: Some(AdvancedAnalysis::from_internal(&config.features)),
            time_interval: Some(config.time_interval.to_string()),
            time_settings: config.time_settings.as_ref().map(ExternalTimeSettings::from_internal),
            custom_time_range: config
                .custom_time_range
                .as_ref()
                .map(ExternalCustomTimeRange::from_internal),
            dimensions: Some(dimensions),
            include_promotional_credits: Some(config.include_credits),
            include_subtotals: Some(config.include_subtotals),
            sort_groups: Some(config.row_order.to_string()),
            sort_dimensions: Some(config.col_order.to_string()),
            filters: Some(filters),
            groups: Some(groups),
            renderer: Some(config.renderer.to_string()),
            display_values: Some(ExternalComparative::from_internal(config.comparative).to_string()),
            currency: Some(config.currency.to_string()),
            data_source: Some(data_source.to_string()),
            splits: Some(splits),
        };

        finish(
            ExternalReport {
                id: report.id.clone(),
                name: report.name.clone(),
                description: Some(report.description.clone()),
                report_type: Some(report.report_type.to_string()),
                config: Some(external),
            },
            errors,
        )
    }
}
