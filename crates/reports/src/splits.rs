//! Split translation and structural validation.
//!
//! Every split is checked on its own first. Only when the whole list is
//! structurally sound are the cross-references checked: one attribution
//! lookup and one attribution-group lookup for the complete list, followed by
//! the [`SplitValidator`].

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use tracing::{debug, instrument, warn};

use crate::config::{Split, SplitTarget};
use crate::errors::{fields, finish, FieldError, ReportError};
use crate::external::{ExternalSplit, ExternalSplitOrigin, ExternalSplitTarget};
use crate::field_id::{self, FieldType};
use crate::ports::{AttributionDirectory, AttributionGroupDirectory, SplitIssue, SplitValidator};
use crate::types::SplitMode;
use crate::{AttributionGroupId, AttributionId};

/// Custom-mode target values must sum to 1 within this absolute tolerance.
pub const SPLIT_TARGET_SUM_TOLERANCE: f64 = 0.01;

fn split_error(message: impl Into<String>) -> FieldError {
    FieldError::new(fields::SPLITS, message)
}

fn target_error(message: impl Into<String>) -> FieldError {
    FieldError::new(fields::SPLIT_TARGETS, message)
}

/// Raw IDs referenced by a split list.
#[derive(Debug, Default)]
struct References {
    attributions: BTreeSet<AttributionId>,
    groups: BTreeSet<AttributionGroupId>,
}

/// Translates external splits and checks their cross-references.
#[derive(Clone)]
pub struct SplitTranslator {
    attributions: Arc<dyn AttributionDirectory>,
    groups: Arc<dyn AttributionGroupDirectory>,
    validator: Arc<dyn SplitValidator>,
}

impl SplitTranslator {
    pub fn new(
        attributions: Arc<dyn AttributionDirectory>,
        groups: Arc<dyn AttributionGroupDirectory>,
        validator: Arc<dyn SplitValidator>,
    ) -> Self {
        Self {
            attributions,
            groups,
            validator,
        }
    }

    /// Translates `splits` into their persisted form.
    #[instrument(skip_all, fields(splits = splits.len()))]
    pub async fn to_internal(&self, splits: &[ExternalSplit]) -> Result<Vec<Split>, ReportError> {
        let mut errors = Vec::new();
        let mut references = References::default();
        let mut translated = Vec::with_capacity(splits.len());

        for split in splits {
            match translate_split(split, &mut references) {
                Ok(s) => translated.push(s),
                Err(found) => errors.extend(found),
            }
        }

        if !errors.is_empty() {
            return Err(ReportError::Validation(errors));
        }

        self.check_references(&references, &mut errors).await?;

        errors.extend(
            self.validator
                .validate_splits(&translated)
                .iter()
                .map(|issue: &SplitIssue| split_error(issue.to_string())),
        );

        finish(translated, errors)
    }

    async fn check_references(
        &self,
        references: &References,
        errors: &mut Vec<FieldError>,
    ) -> Result<(), ReportError> {
        if !references.attributions.is_empty() {
            let ids: Vec<AttributionId> = references.attributions.iter().cloned().collect();
            let found: BTreeSet<AttributionId> = self
                .attributions
                .find_attributions(&ids)
                .await
                .map_err(|e| ReportError::collaborator("attribution directory", e))?
                .into_iter()
                .map(|a| a.id)
                .collect();

            for missing in references.attributions.difference(&found) {
                warn!(attribution = %missing, "split references unknown attribution");
                errors.push(split_error(format!("attribution not found: {missing}")));
            }
        }

        if !references.groups.is_empty() {
            let ids: Vec<AttributionGroupId> = references.groups.iter().cloned().collect();
            let found: BTreeSet<AttributionGroupId> = self
                .groups
                .find_attribution_groups(&ids)
                .await
                .map_err(|e| ReportError::collaborator("attribution group directory", e))?
                .into_iter()
                .map(|g| g.id)
                .collect();

            for missing in references.groups.difference(&found) {
                warn!(attribution_group = %missing, "split references unknown attribution group");
                errors.push(split_error(format!("attribution group not found: {missing}")));
            }
        }

        Ok(())
    }
}

fn parse_attribution_ref(
    field: &str,
    role: &str,
    id: &str,
    field_type: &str,
) -> Result<(AttributionId, String), FieldError> {
    let parsed: FieldType = field_type.parse().map_err(|_| {
        FieldError::new(field, format!("invalid metadata field type: {field_type}"))
    })?;
    if parsed != FieldType::Attribution {
        return Err(FieldError::new(
            field,
            format!("invalid {role} type: {field_type}. Must be attribution"),
        ));
    }
    let id =
        AttributionId::new(id).ok_or_else(|| FieldError::new(field, format!("{role} id required")))?;
    let encoded = field_id::encode(FieldType::Attribution, id.as_str())
        .map_err(|e| FieldError::new(field, e.to_string()))?;
    Ok((id, encoded))
}

/// Checks one split in isolation, recording the IDs it references.
fn translate_split(
    split: &ExternalSplit,
    references: &mut References,
) -> Result<Split, Vec<FieldError>> {
    let mut errors = Vec::new();

    let field_type = split
        .field_type
        .parse::<FieldType>()
        .map_err(|_| errors.push(split_error(format!("invalid metadata field type: {}", split.field_type))))
        .ok();
    let mode = split
        .mode
        .parse::<SplitMode>()
        .map_err(|_| errors.push(split_error(format!("invalid split mode: {}", split.mode))))
        .ok();
    let group = AttributionGroupId::new(split.id.as_str());
    if group.is_none() {
        errors.push(split_error("split id required"));
    }

    let origin = parse_attribution_ref(
        fields::SPLIT_ORIGIN,
        "origin",
        &split.origin.id,
        &split.origin.field_type,
    )
    .map_err(|e| errors.push(e))
    .ok();

    if split.targets.is_empty() {
        errors.push(target_error(format!("split {} has no targets", split.id)));
    }

    let mut targets = Vec::with_capacity(split.targets.len());
    let mut total = 0.0;
    for target in &split.targets {
        let Ok((id, encoded)) = parse_attribution_ref(fields::SPLIT_TARGETS, "target", &target.id, &target.field_type)
            .map_err(|e| errors.push(e))
        else {
            continue;
        };

        match (mode, target.value) {
            (Some(SplitMode::Custom), None) => errors.push(target_error(format!(
                "missing target value of target id: {}. Required by mode: custom",
                target.id
            ))),
            (Some(m @ (SplitMode::Even | SplitMode::Proportional)), Some(_)) => {
                errors.push(target_error(format!(
                    "invalid target value of target id: {}. Not compatible with mode: {m}",
                    target.id
                )))
            }
            _ => {}
        }

        let value = target.value.unwrap_or_default();
        total += value;
        targets.push(SplitTarget {
            id: encoded,
            field_type: FieldType::Attribution,
            value,
        });
        references.attributions.insert(id);
    }

    // A rejected target would make the total meaningless.
    if mode == Some(SplitMode::Custom)
        && targets.len() == split.targets.len()
        && split.targets.iter().all(|t| t.value.is_some())
        && (1.0 - total).abs() >= SPLIT_TARGET_SUM_TOLERANCE
    {
        errors.push(target_error(format!(
            "invalid target total: {total:.2}. Target values must sum to 1"
        )));
    }

    if let Some((origin, _)) = &origin {
        references.attributions.insert(origin.clone());
    }
    if let Some(group) = &group {
        references.groups.insert(group.clone());
    }

    let split_id = match (field_type, &group) {
        (Some(field_type), Some(group)) => field_id::encode(field_type, group.as_str())
            .map_err(|e| errors.push(split_error(e.to_string())))
            .ok(),
        _ => None,
    };

    match (field_type, mode, origin, group, split_id) {
        (Some(field_type), Some(mode), Some((_, origin)), Some(group), Some(split_id))
            if errors.is_empty() =>
        {
            debug!(split = %group, %mode, targets = targets.len(), "translated split");
            Ok(Split {
                id: split_id,
                field_type,
                mode,
                origin,
                include_origin: split.include_origin,
                targets,
            })
        }
        _ => Err(errors),
    }
}

/// Exports a persisted split.
pub fn split_to_external(split: &Split) -> Result<ExternalSplit, FieldError> {
    let group = field_id::attribution_group_key(&split.id)
        .ok_or_else(|| split_error(format!("invalid attribution group id: {}", split.id)))?;
    let origin = field_id::attribution_key(&split.origin).ok_or_else(|| {
        FieldError::new(
            fields::SPLIT_ORIGIN,
            format!("invalid attribution id: {}", split.origin),
        )
    })?;

    let targets = split
        .targets
        .iter()
        .map(|target| -> Result<ExternalSplitTarget, FieldError> {
            let id = field_id::attribution_key(&target.id).ok_or_else(|| {
                target_error(format!("invalid attribution id: {}", target.id))
            })?;
            Ok(ExternalSplitTarget {
                id: id.to_string(),
                field_type: FieldType::Attribution.to_string(),
                value: (split.mode == SplitMode::Custom).then_some(target.value),
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

    Ok(ExternalSplit {
        id: group.to_string(),
        field_type: split.field_type.to_string(),
        mode: split.mode.to_string(),
        origin: ExternalSplitOrigin {
            id: origin.to_string(),
            field_type: FieldType::Attribution.to_string(),
        },
        include_origin: split.include_origin,
        targets,
    })
}

// ---------------------------------------------------------------------------
// Structural validator
// ---------------------------------------------------------------------------

/// Built-in [`SplitValidator`].
///
/// Rejects non-attribution-group splits, origins shared by two splits,
/// targets equal to their own origin, and pairs of splits that redistribute
/// into each other.
#[derive(Debug, Clone, Copy, Default)]
pub struct StructuralSplitValidator;

impl SplitValidator for StructuralSplitValidator {
    fn validate_splits(&self, splits: &[Split]) -> Vec<SplitIssue> {
        let mut issues = Vec::new();
        // origin -> (owning split, targets)
        let mut edges: BTreeMap<&str, (&str, BTreeSet<&str>)> = BTreeMap::new();

        for split in splits {
            if split.field_type != FieldType::AttributionGroup {
                issues.push(SplitIssue::InvalidType(split.field_type.to_string()));
                return issues;
            }

            if edges.contains_key(split.origin.as_str()) {
                issues.push(SplitIssue::OriginDuplicated {
                    split: split.id.clone(),
                    origin: split.origin.clone(),
                });
            }
            let entry = edges
                .entry(split.origin.as_str())
                .or_insert_with(|| (split.id.as_str(), BTreeSet::new()));
            entry.1.clear();

            for target in &split.targets {
                if target.id == split.origin {
                    issues.push(SplitIssue::OriginIsTarget {
                        split: entry.0.to_string(),
                        id: split.origin.clone(),
                    });
                }
                entry.1.insert(target.id.as_str());
            }
        }

        for (origin, (split, targets)) in &edges {
            for target in targets {
                let reverse = edges
                    .get(target)
                    .is_some_and(|(_, back)| back.contains(origin));
                if reverse && origin < target {
                    issues.push(SplitIssue::CircularDependency {
                        split: split.to_string(),
                        id: target.to_string(),
                    });
                }
            }
        }

        issues
    }
}
