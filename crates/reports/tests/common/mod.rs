//! Shared fakes for integration tests.
//!
//! [`FakeCollaborators`] implements every port from in-memory data and counts
//! calls so batching can be asserted.

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use reports::metrics::MetricResolver;
use reports::ports::{
    Attribution, AttributionDirectory, AttributionGroup, AttributionGroupDirectory,
    CollaboratorError, CustomMetric, CustomMetricVariable, DataHubMetricRegistry, MetricCatalog,
};
use reports::splits::{SplitTranslator, StructuralSplitValidator};
use reports::{
    AttributionGroupId, AttributionId, CustomMetricId, CustomerId, ReportTranslator,
    ReportValidator,
};

pub const CUSTOMER: &str = "customer-1";
pub const CUSTOM_METRIC: &str = "MyCustomMetricID";
pub const EXTENDED_METRIC: &str = "flexsave";

#[derive(Default)]
pub struct FakeCollaborators {
    pub custom_metrics: Vec<CustomMetric>,
    pub extended_metrics: Vec<String>,
    pub datahub_metrics: Vec<String>,
    pub attributions: Vec<AttributionId>,
    pub groups: Vec<AttributionGroupId>,
    pub fail_lookups: AtomicBool,
    pub attribution_calls: AtomicUsize,
    pub group_calls: AtomicUsize,
    pub metric_calls: AtomicUsize,
}

impl FakeCollaborators {
    /// One custom metric over attributions `222` and `333`, attribution
    /// group `111`, and the `flexsave` extended metric.
    pub fn standard() -> Self {
        Self {
            custom_metrics: vec![CustomMetric {
                id: id(CUSTOM_METRIC),
                name: "Cost per user".into(),
                variables: vec![
                    CustomMetricVariable { attribution: id("222") },
                    CustomMetricVariable { attribution: id("333") },
                ],
            }],
            extended_metrics: vec![EXTENDED_METRIC.into()],
            attributions: vec![id("222"), id("333"), id("444")],
            groups: vec![id("111")],
            ..Default::default()
        }
    }

    pub fn with_datahub_metrics(mut self, keys: &[&str]) -> Self {
        self.datahub_metrics = keys.iter().map(|k| k.to_string()).collect();
        self
    }

    pub fn failing(self) -> Self {
        self.fail_lookups.store(true, Ordering::SeqCst);
        self
    }

    fn check(&self) -> Result<(), CollaboratorError> {
        if self.fail_lookups.load(Ordering::SeqCst) {
            Err(CollaboratorError::Unavailable("backend offline".into()))
        } else {
            Ok(())
        }
    }
}

/// Builds an identifier, panicking on empty input.
pub fn id<T: FromNonEmpty>(value: &str) -> T {
    T::from_non_empty(value)
}

pub trait FromNonEmpty {
    fn from_non_empty(value: &str) -> Self;
}

macro_rules! from_non_empty {
    ($($t:ty),+) => {
        $(impl FromNonEmpty for $t {
            fn from_non_empty(value: &str) -> Self {
                <$t>::new(value).expect("test identifiers are non-empty")
            }
        })+
    };
}

from_non_empty!(AttributionId, AttributionGroupId, CustomMetricId, CustomerId);

pub fn customer() -> CustomerId {
    id(CUSTOMER)
}

#[async_trait]
impl MetricCatalog for FakeCollaborators {
    async fn custom_metric_exists(
        &self,
        _customer: &CustomerId,
        metric: &CustomMetricId,
    ) -> Result<bool, CollaboratorError> {
        self.metric_calls.fetch_add(1, Ordering::SeqCst);
        self.check()?;
        Ok(self.custom_metrics.iter().any(|m| &m.id == metric))
    }

    async fn custom_metric(
        &self,
        metric: &CustomMetricId,
    ) -> Result<Option<CustomMetric>, CollaboratorError> {
        self.metric_calls.fetch_add(1, Ordering::SeqCst);
        self.check()?;
        Ok(self.custom_metrics.iter().find(|m| &m.id == metric).cloned())
    }

    async fn extended_metric_keys(&self) -> Result<Vec<String>, CollaboratorError> {
        self.check()?;
        Ok(self.extended_metrics.clone())
    }
}

#[async_trait]
impl DataHubMetricRegistry for FakeCollaborators {
    async fn registered_metric_keys(
        &self,
        _customer: &CustomerId,
    ) -> Result<Vec<String>, CollaboratorError> {
        self.check()?;
        Ok(self.datahub_metrics.clone())
    }
}

#[async_trait]
impl AttributionDirectory for FakeCollaborators {
    async fn find_attributions(
        &self,
        ids: &[AttributionId],
    ) -> Result<Vec<Attribution>, CollaboratorError> {
        self.attribution_calls.fetch_add(1, Ordering::SeqCst);
        self.check()?;
        Ok(ids
            .iter()
            .filter(|i| self.attributions.contains(i))
            .map(|i| Attribution {
                id: i.clone(),
                name: format!("attribution {i}"),
            })
            .collect())
    }
}

#[async_trait]
impl AttributionGroupDirectory for FakeCollaborators {
    async fn find_attribution_groups(
        &self,
        ids: &[AttributionGroupId],
    ) -> Result<Vec<AttributionGroup>, CollaboratorError> {
        self.group_calls.fetch_add(1, Ordering::SeqCst);
        self.check()?;
        Ok(ids
            .iter()
            .filter(|i| self.groups.contains(i))
            .map(|i| AttributionGroup {
                id: i.clone(),
                name: format!("group {i}"),
            })
            .collect())
    }
}

pub fn resolver(fakes: &Arc<FakeCollaborators>) -> MetricResolver {
    MetricResolver::new(fakes.clone(), fakes.clone())
}

pub fn split_translator(fakes: &Arc<FakeCollaborators>) -> SplitTranslator {
    SplitTranslator::new(fakes.clone(), fakes.clone(), Arc::new(StructuralSplitValidator))
}

pub fn translator(fakes: &Arc<FakeCollaborators>) -> ReportTranslator {
    ReportTranslator::new(resolver(fakes), split_translator(fakes), fakes.clone())
}

pub fn validator(fakes: &Arc<FakeCollaborators>) -> ReportValidator {
    ReportValidator::with_default_rules(fakes.clone())
}
