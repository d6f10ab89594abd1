//! Top/bottom limits on row dimensions, applied to query results.
//!
//! Every row dimension that carries a filter is a level; so is the unfiltered
//! row dimension just before it. At each level rows are grouped by the
//! level's cell and groups are ordered by the summed limit metric, largest
//! first unless the filter sorts ascending. A level with a limit keeps only
//! its first `limit` groups. Deeper levels are applied within each group.
//!
//! Groups cut off by a limit are dropped or folded into one
//! `"∑ Other <plural>"` group, depending on the report's
//! [`LimitAggregation`]. Rows that end up with identical dimension cells are
//! merged by summing their metrics.

use std::collections::HashMap;

use tracing::debug;

use crate::aggregation::{group_key, Cell, ResultLayout};
use crate::config::ReportConfig;
use crate::errors::ReportError;
use crate::field_id;
use crate::ports::AttributionGroup;
use crate::types::{LimitAggregation, LimitSort};

/// Prefix of the label given to folded groups.
pub const OTHER_LABEL_PREFIX: &str = "\u{2211} Other ";

/// Plural nouns used in folded-group labels, by field key.
const PLURALS: &[(&str, &str)] = &[
    ("year", "years"),
    ("quarter", "quarters"),
    ("month", "months"),
    ("week", "weeks"),
    ("day", "days"),
    ("hour", "hours"),
    ("week_day", "weekdays"),
    ("cloud_provider", "cloud providers"),
    ("billing_account_id", "billing accounts"),
    ("project_ancestry_names", "folders"),
    ("project_id", "Project/Account ids"),
    ("project_number", "Project/Account numbers"),
    ("project_name", "Project/Account names"),
    ("service_description", "services"),
    ("sku_description", "SKUs"),
    ("service_id", "service ids"),
    ("sku_id", "SKU ids"),
    ("operation", "Operations"),
    ("resource_id", "Resources"),
    ("country", "countries"),
    ("region", "regions"),
    ("zone", "zones"),
    ("cost_type", "cost types"),
    ("pricing_unit", "pricing units"),
    ("credit", "credits"),
    ("invoice_month", "invoice months"),
    ("kubernetes_cluster_name", "GKE Clusters"),
    ("kubernetes_namespace", "GKE Namespaces"),
];

struct Level {
    position: usize,
    /// Zero keeps every group.
    limit: usize,
    ascending: bool,
    plural: String,
}

#[derive(Default)]
struct Group {
    sum: f64,
    rows: Vec<Vec<Cell>>,
}

/// Applies the row limits of `config` to `rows`.
///
/// `metric` is the index, among the metric cells, of the value groups are
/// ranked by. Attribution-group rows take their plural label from `groups`.
/// Rows come back unchanged when no row dimension has a limit.
pub fn apply_limits(
    config: &ReportConfig,
    layout: &ResultLayout,
    metric: usize,
    groups: &[AttributionGroup],
    rows: Vec<Vec<Cell>>,
) -> Result<Vec<Vec<Cell>>, ReportError> {
    layout.check(&rows)?;
    if metric >= layout.metrics {
        return Err(ReportError::MetricOutOfRange {
            metric,
            metrics: layout.metrics,
        });
    }

    let limited = layout
        .rows
        .iter()
        .any(|id| config.filter(id).is_some_and(|f| f.has_limit()));
    if !limited {
        return Ok(rows);
    }

    let levels = levels(config, layout, groups);
    let before = rows.len();
    let rows = limit_level(
        rows,
        &levels,
        0,
        config.limit_aggregation,
        layout.dimensions() + metric,
    );
    let rows = merge_duplicates(rows, layout);

    debug!(
        levels = levels.len(),
        aggregation = %config.limit_aggregation,
        before,
        after = rows.len(),
        "applied limits"
    );
    Ok(rows)
}

fn other_label(plural: &str) -> String {
    format!("{OTHER_LABEL_PREFIX}{plural}")
}

fn plural(id: &str, groups: &[AttributionGroup]) -> String {
    if let Some(key) = field_id::attribution_group_key(id) {
        return groups
            .iter()
            .find(|g| g.id.as_str() == key)
            .map(|g| g.name.clone())
            .unwrap_or_default();
    }

    let key = id.split_once(':').map_or(id, |(_, key)| key);
    PLURALS
        .iter()
        .find(|(field, _)| *field == key)
        .map(|(_, plural)| plural.to_string())
        .unwrap_or_default()
}

fn levels(config: &ReportConfig, layout: &ResultLayout, groups: &[AttributionGroup]) -> Vec<Level> {
    let mut levels = Vec::new();
    for (position, id) in layout.rows.iter().enumerate() {
        let previous = position.checked_sub(1).map(|p| &layout.rows[p]);
        // The origin column of a split repeats its dimension.
        if previous == Some(id) {
            continue;
        }
        let Some(filter) = config.filter(id) else {
            continue;
        };

        if let Some(previous) = previous.filter(|p| config.filter(p).is_none()) {
            levels.push(Level {
                position: position - 1,
                limit: 0,
                ascending: false,
                plural: plural(previous, groups),
            });
        }
        levels.push(Level {
            position,
            limit: usize::try_from(filter.limit).unwrap_or(0),
            ascending: filter.limit_order == Some(LimitSort::Asc),
            plural: plural(id, groups),
        });
    }
    levels
}

/// Groups rows by the cell at `position`, in order of first appearance.
fn group_rows(rows: Vec<Vec<Cell>>, position: usize, metric: usize) -> Vec<Group> {
    let mut index: HashMap<String, usize> = HashMap::new();
    let mut groups: Vec<Group> = Vec::new();
    for row in rows {
        let slot = *index.entry(row[position].as_string()).or_insert_with(|| {
            groups.push(Group::default());
            groups.len() - 1
        });
        groups[slot].sum += row[metric].as_float();
        groups[slot].rows.push(row);
    }
    groups
}

fn limit_level(
    rows: Vec<Vec<Cell>>,
    levels: &[Level],
    depth: usize,
    aggregation: LimitAggregation,
    metric: usize,
) -> Vec<Vec<Cell>> {
    let Some(level) = levels.get(depth) else {
        return rows;
    };

    let mut groups = group_rows(rows, level.position, metric);
    if level.ascending {
        groups.sort_by(|a, b| a.sum.total_cmp(&b.sum));
    } else {
        groups.sort_by(|a, b| b.sum.total_cmp(&a.sum));
    }

    let keep = level.limit.min(groups.len());
    if keep > 0 {
        let other = match aggregation {
            LimitAggregation::Omit => None,
            LimitAggregation::Top | LimitAggregation::All => {
                Some(fold_others(&mut groups, keep, levels, depth, aggregation))
            }
        };
        groups.truncate(keep);
        groups.extend(other);
    }

    groups
        .into_iter()
        .flat_map(|group| limit_level(group.rows, levels, depth + 1, aggregation, metric))
        .collect()
}

/// Relabels the groups past `keep` into one "other" group.
///
/// With [`LimitAggregation::Top`] below the first level, rows under an outer
/// "other" group are relabelled too, and cut-off rows move under the outer
/// "other" groups.
fn fold_others(
    groups: &mut [Group],
    keep: usize,
    levels: &[Level],
    depth: usize,
    aggregation: LimitAggregation,
) -> Group {
    let level = &levels[depth];
    let label = Cell::Text(other_label(&level.plural));
    let nested = aggregation == LimitAggregation::Top && depth > 0;

    if nested {
        let outer = Cell::Text(other_label(&levels[depth - 1].plural));
        if let Some(parent) = level.position.checked_sub(1) {
            for row in groups[..keep].iter_mut().flat_map(|g| g.rows.iter_mut()) {
                if row[parent] == outer {
                    row[level.position] = label.clone();
                }
            }
        }
    }

    let outer_labels: Vec<Cell> = levels[..depth]
        .iter()
        .rev()
        .filter(|l| !l.plural.is_empty())
        .map(|l| Cell::Text(other_label(&l.plural)))
        .collect();

    let mut other = Group::default();
    for group in &mut groups[keep..] {
        other.sum += group.sum;
        for row in &mut group.rows {
            row[level.position] = label.clone();
            if nested {
                for (k, outer) in outer_labels.iter().enumerate() {
                    if let Some(p) = level.position.checked_sub(k + 1) {
                        row[p] = outer.clone();
                    }
                }
            }
        }
        other.rows.append(&mut group.rows);
    }
    other
}

/// Sums the metrics of rows with identical dimension cells into the first.
fn merge_duplicates(rows: Vec<Vec<Cell>>, layout: &ResultLayout) -> Vec<Vec<Cell>> {
    let dimensions = 0..layout.dimensions();
    let mut index: HashMap<String, usize> = HashMap::new();
    let mut merged: Vec<Vec<Cell>> = Vec::with_capacity(rows.len());
    for row in rows {
        let key = group_key(&row, &dimensions).unwrap_or_default();
        match index.get(&key) {
            Some(&first) => {
                for cell in layout.metric_range() {
                    merged[first][cell] =
                        Cell::Float(merged[first][cell].as_float() + row[cell].as_float());
                }
            }
            None => {
                index.insert(key, merged.len());
                merged.push(row);
            }
        }
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ReportFilter;
    use crate::AttributionGroupId;

    const COUNTRY: &str = "fixed:country";
    const SERVICE: &str = "fixed:service_description";

    fn text(s: &str) -> Cell {
        Cell::Text(s.to_string())
    }

    fn limit_filter(id: &str, limit: i64, order: Option<LimitSort>) -> ReportFilter {
        ReportFilter {
            id: id.into(),
            limit,
            limit_order: order,
            ..Default::default()
        }
    }

    fn config(rows: &[&str], filters: Vec<ReportFilter>, aggregation: LimitAggregation) -> ReportConfig {
        ReportConfig {
            rows: rows.iter().map(|r| r.to_string()).collect(),
            cols: vec!["datetime:year".into()],
            filters,
            limit_aggregation: aggregation,
            ..Default::default()
        }
    }

    fn one_level(values: &[(&str, f64)]) -> Vec<Vec<Cell>> {
        values
            .iter()
            .map(|(s, v)| vec![text(s), text("2024"), Cell::Float(*v)])
            .collect()
    }

    fn two_levels(values: &[(&str, &str, f64)]) -> Vec<Vec<Cell>> {
        values
            .iter()
            .map(|(c, s, v)| vec![text(c), text(s), text("2024"), Cell::Float(*v)])
            .collect()
    }

    fn run(config: &ReportConfig, rows: Vec<Vec<Cell>>) -> Vec<Vec<Cell>> {
        let layout = ResultLayout::for_config(config, 1);
        apply_limits(config, &layout, 0, &[], rows).unwrap()
    }

    const SERVICES: [(&str, f64); 4] = [("s1", 6.0), ("s2", 15.0), ("s3", 24.0), ("s4", 1.0)];

    #[test]
    fn top_groups_are_kept_largest_first() {
        let config = config(
            &[SERVICE],
            vec![limit_filter(SERVICE, 2, Some(LimitSort::Desc))],
            LimitAggregation::Omit,
        );
        assert_eq!(run(&config, one_level(&SERVICES)), one_level(&[("s3", 24.0), ("s2", 15.0)]));
    }

    #[test]
    fn ascending_limit_keeps_the_bottom_groups() {
        let config = config(
            &[SERVICE],
            vec![limit_filter(SERVICE, 2, Some(LimitSort::Asc))],
            LimitAggregation::Omit,
        );
        assert_eq!(run(&config, one_level(&SERVICES)), one_level(&[("s4", 1.0), ("s1", 6.0)]));
    }

    #[test]
    fn cut_off_groups_fold_into_other() {
        let config = config(
            &[SERVICE],
            vec![limit_filter(SERVICE, 2, None)],
            LimitAggregation::Top,
        );
        assert_eq!(
            run(&config, one_level(&SERVICES)),
            one_level(&[("s3", 24.0), ("s2", 15.0), ("\u{2211} Other services", 7.0)])
        );
    }

    const NESTED: [(&str, &str, f64); 5] = [
        ("US", "s1", 10.0),
        ("US", "s2", 5.0),
        ("UK", "s1", 1.0),
        ("UK", "s3", 2.0),
        ("DE", "s2", 3.0),
    ];

    fn nested_config(aggregation: LimitAggregation) -> ReportConfig {
        config(
            &[COUNTRY, SERVICE],
            vec![limit_filter(COUNTRY, 1, None), limit_filter(SERVICE, 1, None)],
            aggregation,
        )
    }

    #[test]
    fn top_aggregation_gathers_nested_others_under_outer_other() {
        let rows = run(&nested_config(LimitAggregation::Top), two_levels(&NESTED));
        assert_eq!(
            rows,
            two_levels(&[
                ("US", "s1", 10.0),
                ("\u{2211} Other countries", "\u{2211} Other services", 11.0),
            ])
        );
    }

    #[test]
    fn all_aggregation_keeps_one_other_per_group() {
        let rows = run(&nested_config(LimitAggregation::All), two_levels(&NESTED));
        assert_eq!(
            rows,
            two_levels(&[
                ("US", "s1", 10.0),
                ("US", "\u{2211} Other services", 5.0),
                ("\u{2211} Other countries", "s2", 3.0),
                ("\u{2211} Other countries", "\u{2211} Other services", 3.0),
            ])
        );
    }

    #[test]
    fn omitted_aggregation_drops_cut_off_rows() {
        let rows = run(&nested_config(LimitAggregation::Omit), two_levels(&NESTED));
        assert_eq!(rows, two_levels(&[("US", "s1", 10.0)]));
    }

    #[test]
    fn unfiltered_parent_row_orders_the_groups() {
        let config = config(
            &["fixed:project_id", SERVICE],
            vec![limit_filter(SERVICE, 1, None)],
            LimitAggregation::Omit,
        );
        let rows = run(
            &config,
            two_levels(&[("p1", "s1", 1.0), ("p1", "s2", 4.0), ("p2", "s1", 7.0)]),
        );
        assert_eq!(rows, two_levels(&[("p2", "s1", 7.0), ("p1", "s2", 4.0)]));
    }

    #[test]
    fn attribution_group_other_uses_the_group_name() {
        let group = "attribution_group:111";
        let config = config(&[group], vec![limit_filter(group, 1, None)], LimitAggregation::Top);
        let layout = ResultLayout::for_config(&config, 1);
        let groups = [AttributionGroup {
            id: AttributionGroupId::new("111").unwrap(),
            name: "Teams".into(),
        }];

        let rows = apply_limits(
            &config,
            &layout,
            0,
            &groups,
            one_level(&[("a", 2.0), ("b", 1.0)]),
        )
        .unwrap();
        assert_eq!(rows, one_level(&[("a", 2.0), ("\u{2211} Other Teams", 1.0)]));
    }

    #[test]
    fn rows_without_limits_are_untouched() {
        let config = config(&[SERVICE], Vec::new(), LimitAggregation::Top);
        assert_eq!(run(&config, one_level(&SERVICES)), one_level(&SERVICES));
    }

    #[test]
    fn metric_must_be_in_the_layout() {
        let config = config(&[SERVICE], vec![limit_filter(SERVICE, 1, None)], LimitAggregation::Top);
        let layout = ResultLayout::for_config(&config, 1);
        let err = apply_limits(&config, &layout, 1, &[], one_level(&SERVICES)).unwrap_err();
        assert!(matches!(err, ReportError::MetricOutOfRange { metric: 1, metrics: 1 }));
    }
}
