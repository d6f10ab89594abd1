//! Rule pipeline tests against the shared fakes.

mod common;

use std::sync::Arc;

use common::{customer, translator, validator, FakeCollaborators, CUSTOM_METRIC};
use reports::config::ReportFilter;
use reports::errors::fields;
use reports::external::{ExternalConfig, ExternalDimension, ExternalMetric, ExternalReport};
use reports::field_id::FieldType;
use reports::types::{Comparative, Feature, Metric, Renderer};
use reports::validation::ATTRIBUTION_FILTER_ID;
use reports::{CustomMetricId, Report, ReportError};

fn custom_metric_report(attributions: &[&str]) -> Report {
    let mut report = Report::new_default();
    report.config.metric = Metric::Custom;
    report.config.calculated_metric = CustomMetricId::new(CUSTOM_METRIC);
    report.config.filters.push(ReportFilter {
        id: ATTRIBUTION_FILTER_ID.into(),
        field_type: Some(FieldType::Attribution),
        values: Some(attributions.iter().map(|a| a.to_string()).collect()),
        ..Default::default()
    });
    report
}

#[tokio::test]
async fn default_report_is_valid() {
    let fakes = Arc::new(FakeCollaborators::standard());
    validator(&fakes).validate(&Report::new_default()).await.unwrap();
}

#[tokio::test]
async fn default_rules_run_in_order() {
    let fakes = Arc::new(FakeCollaborators::standard());
    assert_eq!(
        validator(&fakes).rule_names(),
        vec![
            "limit_top_bottom",
            "promotional_credits",
            "calculated_metric",
            "treemap",
            "comparative",
            "split",
            "custom_time_range",
        ]
    );
}

#[tokio::test]
async fn violations_from_several_rules_are_concatenated() {
    let fakes = Arc::new(FakeCollaborators::standard());
    let mut report = Report::new_default();
    report.config.renderer = Renderer::TreemapChart;
    report.config.features = vec![Feature::Forecast];
    report.config.cols.push("fixed:service_description".into());
    report.config.comparative = Some(Comparative::PercentageChange);

    let err = validator(&fakes).validate(&report).await.unwrap_err();

    let tagged: Vec<&str> = err.field_errors().iter().map(|e| e.field.as_str()).collect();
    assert_eq!(
        tagged,
        vec![
            // treemap
            fields::ADVANCED_ANALYSIS,
            fields::DIMENSIONS,
            fields::COMPARATIVE,
            // comparative
            fields::ADVANCED_ANALYSIS,
            fields::DIMENSIONS,
            fields::SORT_DIMENSIONS,
        ]
    );
}

#[tokio::test]
async fn calculated_metric_requires_its_attributions() {
    let fakes = Arc::new(FakeCollaborators::standard());

    validator(&fakes)
        .validate(&custom_metric_report(&["333", "222"]))
        .await
        .unwrap();

    let err = validator(&fakes)
        .validate(&custom_metric_report(&["222"]))
        .await
        .unwrap_err();
    assert_eq!(err.field_errors().len(), 1);
    assert_eq!(err.field_errors()[0].field, fields::FILTERS);
    assert_eq!(
        err.field_errors()[0].message,
        "custom metric must filter attribution for: 222,333"
    );
}

#[tokio::test]
async fn deleted_calculated_metric_is_reported() {
    let fakes = Arc::new(FakeCollaborators::standard());
    let mut report = custom_metric_report(&["222", "333"]);
    report.config.calculated_metric = CustomMetricId::new("gone");

    let err = validator(&fakes).validate(&report).await.unwrap_err();
    assert_eq!(err.field_errors()[0].message, "custom metric not found: gone");
}

#[tokio::test]
async fn catalog_failure_aborts_the_pipeline() {
    let fakes = Arc::new(FakeCollaborators::standard().failing());
    let mut report = custom_metric_report(&["222", "333"]);
    report.config.include_credits = true;

    let err = validator(&fakes).validate(&report).await.unwrap_err();
    assert!(matches!(
        err,
        ReportError::Collaborator {
            collaborator: "metric catalog",
            ..
        }
    ));
}

#[tokio::test]
async fn merged_report_is_validated_as_a_whole() {
    let fakes = Arc::new(FakeCollaborators::standard());
    let translator = translator(&fakes);
    let mut report = Report::new_default();

    let external = ExternalReport {
        name: "Cost per user".into(),
        config: Some(ExternalConfig {
            metric: Some(ExternalMetric::new("custom", CUSTOM_METRIC)),
            renderer: Some("treemap_chart".into()),
            dimensions: Some(vec![ExternalDimension {
                id: "year".into(),
                field_type: "datetime".into(),
            }]),
            data_source: Some("billing".into()),
            ..Default::default()
        }),
        ..Default::default()
    };

    translator
        .update_report_with_external(&customer(), &mut report, &external)
        .await
        .unwrap();

    let err = validator(&fakes).validate(&report).await.unwrap_err();
    let messages: Vec<&str> = err.field_errors().iter().map(|e| e.message.as_str()).collect();
    assert_eq!(messages, vec!["custom metric must filter attribution for: 222,333"]);
}
