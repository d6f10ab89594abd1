//! Integration tests for split translation and its cross-reference checks.

mod common;

use std::sync::atomic::Ordering;
use std::sync::Arc;

use common::{split_translator, FakeCollaborators};
use reports::errors::fields;
use reports::external::{ExternalSplit, ExternalSplitOrigin, ExternalSplitTarget};
use reports::types::SplitMode;
use reports::ReportError;

fn split(group: &str, origin: &str, targets: &[(&str, Option<f64>)], mode: &str) -> ExternalSplit {
    ExternalSplit {
        id: group.into(),
        field_type: "attribution_group".into(),
        mode: mode.into(),
        origin: ExternalSplitOrigin {
            id: origin.into(),
            field_type: "attribution".into(),
        },
        include_origin: true,
        targets: targets
            .iter()
            .map(|(id, value)| ExternalSplitTarget {
                id: id.to_string(),
                field_type: "attribution".into(),
                value: *value,
            })
            .collect(),
    }
}

#[tokio::test]
async fn lookups_are_batched_across_all_splits() {
    let fakes = Arc::new(FakeCollaborators::standard());
    let splits = vec![
        split("111", "333", &[("222", Some(0.7)), ("444", Some(0.3))], "custom"),
        split("111", "222", &[("444", None)], "even"),
    ];

    let translated = split_translator(&fakes).to_internal(&splits).await.unwrap();

    assert_eq!(translated.len(), 2);
    assert_eq!(translated[0].mode, SplitMode::Custom);
    assert_eq!(translated[0].origin, "attribution:333");
    assert!(translated[0].include_origin);
    assert_eq!(fakes.attribution_calls.load(Ordering::SeqCst), 1);
    assert_eq!(fakes.group_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn structural_errors_skip_existence_checks() {
    let fakes = Arc::new(FakeCollaborators::standard());
    let splits = vec![
        split("111", "333", &[("222", Some(0.7)), ("444", Some(0.1))], "custom"),
        split("111", "222", &[("444", Some(0.5))], "proportional"),
        split("111", "444", &[("222", None)], "INVALID"),
    ];

    let err = split_translator(&fakes).to_internal(&splits).await.unwrap_err();

    let messages: Vec<&str> = err.field_errors().iter().map(|e| e.message.as_str()).collect();
    assert_eq!(
        messages,
        vec![
            "invalid target total: 0.80. Target values must sum to 1",
            "invalid target value of target id: 444. Not compatible with mode: proportional",
            "invalid split mode: INVALID",
        ]
    );
    assert_eq!(fakes.attribution_calls.load(Ordering::SeqCst), 0);
    assert_eq!(fakes.group_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn missing_references_become_field_errors() {
    let fakes = Arc::new(FakeCollaborators::standard());
    let splits = vec![split("999", "333", &[("nope", None)], "even")];

    let err = split_translator(&fakes).to_internal(&splits).await.unwrap_err();

    assert!(err.is_validation());
    let messages: Vec<&str> = err.field_errors().iter().map(|e| e.message.as_str()).collect();
    assert_eq!(
        messages,
        vec!["attribution not found: nope", "attribution group not found: 999"]
    );
    assert!(err.field_errors().iter().all(|e| e.field == fields::SPLITS));
}

#[tokio::test]
async fn structural_validator_runs_after_lookups() {
    let fakes = Arc::new(FakeCollaborators::standard());
    let splits = vec![
        split("111", "333", &[("222", None)], "even"),
        split("111", "222", &[("333", None)], "even"),
    ];

    let err = split_translator(&fakes).to_internal(&splits).await.unwrap_err();

    assert_eq!(err.field_errors().len(), 1);
    assert!(err.field_errors()[0].message.contains("circular dependency"));
    assert_eq!(fakes.attribution_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn lookup_failure_is_an_infrastructure_error() {
    let fakes = Arc::new(FakeCollaborators::standard().failing());
    let splits = vec![split("111", "333", &[("222", None)], "even")];

    let err = split_translator(&fakes).to_internal(&splits).await.unwrap_err();

    assert!(matches!(
        err,
        ReportError::Collaborator {
            collaborator: "attribution directory",
            ..
        }
    ));
}

#[tokio::test]
async fn empty_split_list_needs_no_lookups() {
    let fakes = Arc::new(FakeCollaborators::standard());
    let translated = split_translator(&fakes).to_internal(&[]).await.unwrap();
    assert!(translated.is_empty());
    assert_eq!(fakes.attribution_calls.load(Ordering::SeqCst), 0);
}
