//! Redistribution of query results according to a report's splits.
//!
//! A split moves the metric values of its origin attribution onto the target
//! attributions of the same attribution group. Rows are matched on every
//! dimension except the split column: an origin row's share lands on the
//! target row with the same remaining cells, or on a new row when the target
//! has none.
//!
//! Shares per [`SplitMode`]:
//!
//! - `even`: every target receives `1 / n`.
//! - `custom`: the stored target values. When every value is zero, or the
//!   values sum above 1, the split falls back to `1 / n`.
//! - `proportional`: each target's part of the targets' combined value,
//!   computed per metric and per set of column cells.
//!
//! Targets with no row anywhere in the result take no part in the split. An
//! origin row left with no metric above [`ORIGIN_RESIDUE`] is removed.

use std::collections::HashMap;

use tracing::debug;

use crate::aggregation::{group_key, Cell, ResultLayout};
use crate::config::Split;
use crate::errors::ReportError;
use crate::field_id;
use crate::ports::Attribution;
use crate::types::SplitMode;

/// Label of rows whose attribution-group cell is null.
pub const UNALLOCATED: &str = "Unallocated";

/// Origin rows with every metric at or below this value are dropped.
pub const ORIGIN_RESIDUE: f64 = 0.01;

/// Applies `splits` in order, rewriting `rows` in place.
///
/// Result cells name attributions by their display name; `attributions`
/// supplies the names, and an attribution missing from it is matched by its
/// raw ID.
pub fn apply_splits(
    splits: &[Split],
    layout: &ResultLayout,
    attributions: &[Attribution],
    rows: &mut Vec<Vec<Cell>>,
) -> Result<(), ReportError> {
    layout.check(rows)?;
    let names: HashMap<&str, &str> = attributions
        .iter()
        .map(|a| (a.id.as_str(), a.name.as_str()))
        .collect();

    for split in splits {
        let column = layout
            .position(&split.id)
            .ok_or_else(|| ReportError::SplitFieldMissing(split.id.clone()))?;
        apply_split(split, column, layout, &names, rows);
    }
    Ok(())
}

struct Recipient {
    label: String,
    value: f64,
}

/// Share of an origin value owed to each target.
enum Shares {
    /// One share per target, used for every metric.
    Fixed(Vec<f64>),
    /// Column key -> target -> metric -> share.
    Proportional(HashMap<String, Vec<Vec<f64>>>),
}

impl Shares {
    fn get(&self, target: usize, column_key: &str, metric: usize) -> f64 {
        match self {
            Self::Fixed(shares) => shares[target],
            Self::Proportional(by_column) => by_column
                .get(column_key)
                .map_or(0.0, |targets| targets[target][metric]),
        }
    }
}

fn result_label(id: &str, names: &HashMap<&str, &str>) -> String {
    let key = field_id::attribution_key(id).unwrap_or(id);
    names.get(key).copied().unwrap_or(key).to_string()
}

fn split_label(cell: &Cell) -> Option<&str> {
    match cell {
        Cell::Text(label) => Some(label.as_str()),
        Cell::Null => Some(UNALLOCATED),
        _ => None,
    }
}

/// Every dimension cell except the split column.
fn row_key(row: &[Cell], column: usize, dimensions: usize) -> String {
    let before = group_key(row, &(0..column)).unwrap_or_default();
    let after = group_key(row, &(column + 1..dimensions)).unwrap_or_default();
    before + &after
}

fn fixed_shares(targets: &[Recipient]) -> Vec<f64> {
    let even = 1.0 / targets.len() as f64;
    let all_zero = targets.iter().all(|t| t.value <= 0.0);
    let total: f64 = targets.iter().map(|t| t.value).sum();
    if all_zero || total > 1.0 {
        vec![even; targets.len()]
    } else {
        targets.iter().map(|t| t.value).collect()
    }
}

fn proportional_shares(
    targets: &[Recipient],
    column: usize,
    layout: &ResultLayout,
    rows: &[Vec<Cell>],
) -> HashMap<String, Vec<Vec<f64>>> {
    let mut by_column: HashMap<String, Vec<Vec<f64>>> = HashMap::new();
    for row in rows {
        let Some(target) = split_label(&row[column])
            .and_then(|label| targets.iter().position(|t| t.label == label))
        else {
            continue;
        };
        let key = group_key(row, &layout.col_range()).unwrap_or_default();
        let values = by_column
            .entry(key)
            .or_insert_with(|| vec![vec![0.0; layout.metrics]; targets.len()]);
        for (metric, cell) in row[layout.metric_range()].iter().enumerate() {
            values[target][metric] += cell.as_float();
        }
    }

    for values in by_column.values_mut() {
        for metric in 0..layout.metrics {
            let total: f64 = values.iter().map(|v| v[metric]).sum();
            for target in values.iter_mut() {
                target[metric] = if total == 0.0 { 0.0 } else { target[metric] / total };
            }
        }
    }
    by_column
}

fn move_values(rows: &mut [Vec<Cell>], from: usize, to: usize, start: usize, amounts: &[f64]) {
    for (offset, amount) in amounts.iter().enumerate() {
        let cell = start + offset;
        rows[to][cell] = Cell::Float(rows[to][cell].as_float() + amount);
        rows[from][cell] = Cell::Float(rows[from][cell].as_float() - amount);
    }
}

fn apply_split(
    split: &Split,
    column: usize,
    layout: &ResultLayout,
    names: &HashMap<&str, &str>,
    rows: &mut Vec<Vec<Cell>>,
) {
    let dimensions = layout.dimensions();
    let origin = result_label(&split.origin, names);
    let mut targets: Vec<Recipient> = split
        .targets
        .iter()
        .map(|t| Recipient {
            label: result_label(&t.id, names),
            value: t.value,
        })
        .collect();

    // label -> row key -> row index
    let mut index: HashMap<String, HashMap<String, usize>> = HashMap::new();
    index.insert(origin.clone(), HashMap::new());
    for target in &targets {
        index.insert(target.label.clone(), HashMap::new());
    }
    for (i, row) in rows.iter().enumerate() {
        if let Some(keyed) = split_label(&row[column]).and_then(|label| index.get_mut(label)) {
            keyed.insert(row_key(row, column, dimensions), i);
        }
    }

    targets.retain(|t| index.get(&t.label).is_some_and(|keyed| !keyed.is_empty()));
    let mut origin_rows: Vec<(&String, usize)> = match index.get(&origin) {
        Some(keyed) if !targets.is_empty() => keyed.iter().map(|(k, i)| (k, *i)).collect(),
        _ => return,
    };
    origin_rows.sort_by_key(|(_, i)| *i);

    let shares = match split.mode {
        SplitMode::Even | SplitMode::Custom => Shares::Fixed(fixed_shares(&targets)),
        SplitMode::Proportional => {
            Shares::Proportional(proportional_shares(&targets, column, layout, rows))
        }
    };

    let metrics = layout.metric_range();
    let mut drained = Vec::new();
    let mut created = 0;
    for (key, origin_row) in origin_rows {
        let initial: Vec<f64> = rows[origin_row][metrics.clone()]
            .iter()
            .map(Cell::as_float)
            .collect();
        let column_key = group_key(&rows[origin_row], &layout.col_range()).unwrap_or_default();

        for (t, target) in targets.iter().enumerate() {
            let amounts: Vec<f64> = initial
                .iter()
                .enumerate()
                .map(|(metric, value)| value * shares.get(t, &column_key, metric))
                .collect();

            let existing = index.get(&target.label).and_then(|keyed| keyed.get(key)).copied();
            let recipient = match existing {
                Some(row) if !split.include_origin => row,
                _ => {
                    let mut row = rows[origin_row].clone();
                    for cell in &mut row[metrics.clone()] {
                        *cell = Cell::Float(0.0);
                    }
                    row[column] = Cell::Text(target.label.clone());
                    if existing.is_some() && column + 1 < dimensions {
                        row[column + 1] = Cell::Text(origin.clone());
                    }
                    rows.push(row);
                    created += 1;
                    rows.len() - 1
                }
            };
            move_values(rows, origin_row, recipient, metrics.start, &amounts);
        }

        if rows[origin_row][metrics.clone()]
            .iter()
            .all(|cell| cell.as_float() <= ORIGIN_RESIDUE)
        {
            drained.push(origin_row);
        }
    }

    debug!(
        split = %split.id,
        mode = %split.mode,
        created,
        removed = drained.len(),
        "applied split"
    );
    for row in drained.into_iter().rev() {
        rows.remove(row);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SplitTarget;
    use crate::field_id::FieldType;
    use crate::AttributionId;

    const GROUP: &str = "attribution_group:111";

    fn text(s: &str) -> Cell {
        Cell::Text(s.to_string())
    }

    fn layout() -> ResultLayout {
        ResultLayout {
            rows: vec![GROUP.into()],
            cols: vec!["datetime:year".into()],
            metrics: 1,
        }
    }

    fn attributions() -> Vec<Attribution> {
        [("333", "Shared"), ("222", "Team A"), ("444", "Team B")]
            .iter()
            .map(|(id, name)| Attribution {
                id: AttributionId::new(*id).unwrap(),
                name: name.to_string(),
            })
            .collect()
    }

    fn split(mode: SplitMode, values: &[f64]) -> Split {
        Split {
            id: GROUP.into(),
            field_type: FieldType::AttributionGroup,
            mode,
            origin: "attribution:333".into(),
            include_origin: false,
            targets: ["222", "444"]
                .iter()
                .zip(values)
                .map(|(id, value)| SplitTarget {
                    id: format!("attribution:{id}"),
                    field_type: FieldType::Attribution,
                    value: *value,
                })
                .collect(),
        }
    }

    fn matrix(values: &[(&str, &str, f64)]) -> Vec<Vec<Cell>> {
        values
            .iter()
            .map(|(team, year, v)| vec![text(team), text(year), Cell::Float(*v)])
            .collect()
    }

    fn apply(split: Split, mut rows: Vec<Vec<Cell>>) -> Vec<Vec<Cell>> {
        apply_splits(&[split], &layout(), &attributions(), &mut rows).unwrap();
        rows
    }

    #[test]
    fn even_split_fills_existing_rows_and_creates_missing_ones() {
        let rows = apply(
            split(SplitMode::Even, &[0.0, 0.0]),
            matrix(&[
                ("Shared", "2024", 100.0),
                ("Team A", "2024", 10.0),
                ("Team B", "2025", 20.0),
                ("Shared", "2025", 40.0),
            ]),
        );

        assert_eq!(
            rows,
            matrix(&[
                ("Team A", "2024", 60.0),
                ("Team B", "2025", 40.0),
                ("Team B", "2024", 50.0),
                ("Team A", "2025", 20.0),
            ])
        );
    }

    #[test]
    fn partial_custom_split_keeps_the_origin_remainder() {
        let rows = apply(
            split(SplitMode::Custom, &[0.25, 0.5]),
            matrix(&[
                ("Shared", "2024", 100.0),
                ("Team A", "2024", 0.0),
                ("Team B", "2024", 0.0),
            ]),
        );

        assert_eq!(
            rows,
            matrix(&[
                ("Shared", "2024", 25.0),
                ("Team A", "2024", 25.0),
                ("Team B", "2024", 50.0),
            ])
        );
    }

    #[test]
    fn custom_values_above_one_split_evenly() {
        let targets = [
            Recipient { label: "a".into(), value: 0.8 },
            Recipient { label: "b".into(), value: 0.6 },
        ];
        assert_eq!(fixed_shares(&targets), vec![0.5, 0.5]);
    }

    #[test]
    fn proportional_split_follows_each_column() {
        let rows = apply(
            split(SplitMode::Proportional, &[0.0, 0.0]),
            matrix(&[
                ("Shared", "2024", 100.0),
                ("Team A", "2024", 30.0),
                ("Team B", "2024", 10.0),
                ("Shared", "2025", 50.0),
                ("Team A", "2025", 0.0),
                ("Team B", "2025", 5.0),
            ]),
        );

        assert_eq!(
            rows,
            matrix(&[
                ("Team A", "2024", 105.0),
                ("Team B", "2024", 35.0),
                ("Team A", "2025", 0.0),
                ("Team B", "2025", 55.0),
            ])
        );
    }

    #[test]
    fn null_group_cells_are_unallocated() {
        let mut split = split(SplitMode::Even, &[0.0]);
        split.origin = format!("attribution:{UNALLOCATED}");
        let mut rows = vec![
            vec![Cell::Null, text("2024"), Cell::Float(8.0)],
            vec![text("Team A"), text("2024"), Cell::Float(1.0)],
        ];

        apply_splits(&[split], &layout(), &attributions(), &mut rows).unwrap();
        assert_eq!(rows, matrix(&[("Team A", "2024", 9.0)]));
    }

    #[test]
    fn targets_absent_from_the_result_take_no_share() {
        let rows = apply(
            split(SplitMode::Even, &[0.0, 0.0]),
            matrix(&[("Shared", "2024", 10.0), ("Team A", "2024", 1.0)]),
        );
        assert_eq!(rows, matrix(&[("Team A", "2024", 11.0)]));
    }

    #[test]
    fn included_origin_is_recorded_on_new_rows() {
        let mut split = split(SplitMode::Even, &[0.0, 0.0]);
        split.include_origin = true;
        let layout = ResultLayout {
            rows: vec![GROUP.into(), GROUP.into()],
            cols: vec!["datetime:year".into()],
            metrics: 1,
        };
        let mut rows = vec![
            vec![text("Shared"), Cell::Null, text("2024"), Cell::Float(100.0)],
            vec![text("Team A"), Cell::Null, text("2024"), Cell::Float(10.0)],
            vec![text("Team B"), Cell::Null, text("2025"), Cell::Float(1.0)],
        ];

        apply_splits(&[split], &layout, &attributions(), &mut rows).unwrap();

        assert_eq!(
            rows,
            vec![
                vec![text("Team A"), Cell::Null, text("2024"), Cell::Float(10.0)],
                vec![text("Team B"), Cell::Null, text("2025"), Cell::Float(1.0)],
                vec![text("Team A"), text("Shared"), text("2024"), Cell::Float(50.0)],
                vec![text("Team B"), Cell::Null, text("2024"), Cell::Float(50.0)],
            ]
        );
    }

    #[test]
    fn split_outside_the_layout_is_an_error() {
        let mut split = split(SplitMode::Even, &[0.0]);
        split.id = "attribution_group:999".into();
        let mut rows = matrix(&[("Shared", "2024", 1.0)]);

        let err = apply_splits(&[split], &layout(), &attributions(), &mut rows).unwrap_err();
        assert!(matches!(err, ReportError::SplitFieldMissing(id) if id == "attribution_group:999"));
        assert_eq!(rows, matrix(&[("Shared", "2024", 1.0)]));
    }

    #[test]
    fn short_rows_are_rejected_before_any_change() {
        let mut rows = vec![vec![text("Shared"), text("2024")]];
        let err = apply_splits(
            &[split(SplitMode::Even, &[0.0])],
            &layout(),
            &attributions(),
            &mut rows,
        )
        .unwrap_err();
        assert!(matches!(
            err,
            ReportError::ResultShape { row: 0, len: 2, expected: 3 }
        ));
    }
}
