//! Cross-field business rules evaluated against an assembled report.
//!
//! A [`ReportValidator`] holds an ordered list of independent
//! [`ReportRule`]s. Every rule runs; their field errors are concatenated in
//! rule order. A rule that fails with anything other than the validation
//! sentinel stops the pipeline and its error is returned unchanged.

mod calculated_metric;
mod rules;

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, instrument};

use crate::config::Report;
use crate::errors::{finish, CollectValidation, FieldError, ReportError};
use crate::ports::MetricCatalog;

pub use calculated_metric::{CalculatedMetricRule, ATTRIBUTION_FILTER_ID};
pub use rules::{
    ComparativeRule, CustomTimeRangeRule, LimitTopBottomRule, PromotionalCreditsRule, SplitRule,
    TreemapRule,
};

/// One business rule.
#[async_trait]
pub trait ReportRule: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// Returns every violation found in `report`; empty when it complies.
    async fn validate(&self, report: &Report) -> Result<Vec<FieldError>, ReportError>;
}

/// Ordered rule pipeline.
pub struct ReportValidator {
    rules: Vec<Box<dyn ReportRule>>,
}

impl ReportValidator {
    /// A pipeline with no rules.
    pub fn empty() -> Self {
        Self { rules: Vec::new() }
    }

    /// The standard rule set, in evaluation order.
    pub fn with_default_rules(catalog: Arc<dyn MetricCatalog>) -> Self {
        Self::empty()
            .with_rule(LimitTopBottomRule)
            .with_rule(PromotionalCreditsRule)
            .with_rule(CalculatedMetricRule::new(catalog))
            .with_rule(TreemapRule)
            .with_rule(ComparativeRule)
            .with_rule(SplitRule)
            .with_rule(CustomTimeRangeRule)
    }

    /// Appends `rule` to the end of the pipeline.
    pub fn with_rule(mut self, rule: impl ReportRule + 'static) -> Self {
        self.rules.push(Box::new(rule));
        self
    }

    pub fn rule_names(&self) -> Vec<&'static str> {
        self.rules.iter().map(|r| r.name()).collect()
    }

    /// Runs every rule against `report`.
    #[instrument(skip_all, fields(report = %report.name, rules = self.rules.len()))]
    pub async fn validate(&self, report: &Report) -> Result<(), ReportError> {
        let mut errors = Vec::new();

        for rule in &self.rules {
            let found = rule.validate(report).await.collect_into(&mut errors)?;
            if let Some(found) = found {
                if !found.is_empty() {
                    debug!(rule = rule.name(), errors = found.len(), "rule violated");
                }
                errors.extend(found);
            }
        }

        finish((), errors)
    }
}
