#![forbid(unsafe_code)]

use std::collections::{BTreeSet, HashMap, HashSet};
use std::fmt;

use kr_frame::{Dataset, Record};
use kr_runtime::{DecisionAction, EvidenceLedger, RuntimePolicy};
use kr_types::{DType, KeyComparison, KeyValue};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    Left,
    Right,
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Left => "left",
            Self::Right => "right",
        })
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DuplicateKeyPolicy {
    /// One right row per key: the last one scanned. Earlier right rows with
    /// the same key are shadowed and reported nowhere.
    #[default]
    LastWins,
    /// Every right row sharing a key is merged with each matching left row.
    AllPairs,
}

impl fmt::Display for DuplicateKeyPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::LastWins => "last_wins",
            Self::AllPairs => "all_pairs",
        })
    }
}

/// What a keyless row (null, NaN or absent key) means for right-only
/// membership. Keyless rows are never merged under either policy.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MissingKeyPolicy {
    /// Absence is itself a key for membership: a keyless right row is kept
    /// out of `only_in_right` whenever some left row is keyless too.
    #[default]
    SharedAbsence,
    /// Keyless right rows always go to `only_in_right`.
    NeverMatch,
}

impl fmt::Display for MissingKeyPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::SharedAbsence => "shared_absence",
            Self::NeverMatch => "never_match",
        })
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconcileOptions {
    pub key_comparison: KeyComparison,
    pub duplicates: DuplicateKeyPolicy,
    pub missing_keys: MissingKeyPolicy,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ReconcileError {
    #[error("{side} key column name is empty")]
    EmptyKeyName { side: Side },
    #[error(
        "{side} dataset {dataset:?} has no column {column:?} (available: {})",
        .available.join(", ")
    )]
    MissingKeyColumn {
        side: Side,
        dataset: String,
        column: String,
        available: Vec<String>,
    },
    #[error("row cap exceeded: {rows} rows offered against a cap of {cap}")]
    RowCapExceeded { rows: usize, cap: usize },
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconcileSummary {
    pub left_rows: usize,
    pub right_rows: usize,
    pub matched: usize,
    pub only_in_left: usize,
    pub only_in_right: usize,
    pub left_rows_without_key: usize,
    pub right_rows_without_key: usize,
    /// Keyed rows whose key already appeared earlier on the same side.
    pub left_duplicate_rows: usize,
    pub right_duplicate_rows: usize,
    /// Right rows dropped by [`DuplicateKeyPolicy::LastWins`]: neither merged
    /// nor reported as right-only.
    pub shadowed_right_rows: usize,
    /// Keyless right rows kept out of `only_in_right` by
    /// [`MissingKeyPolicy::SharedAbsence`].
    pub absorbed_right_rows: usize,
}

impl ReconcileSummary {
    #[must_use]
    pub fn is_fully_reconciled(&self) -> bool {
        self.only_in_left == 0 && self.only_in_right == 0
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Reconciliation {
    summary: ReconcileSummary,
    pub matches: Vec<Record>,
    pub only_in_left: Vec<Record>,
    pub only_in_right: Vec<Record>,
}

impl Reconciliation {
    /// Counts describing the run that produced this result.
    #[must_use]
    pub fn summary(&self) -> ReconcileSummary {
        self.summary
    }
}

/// Reconcile two record slices with default options under a strict policy.
pub fn reconcile(
    left: &[Record],
    left_key: &str,
    right: &[Record],
    right_key: &str,
) -> Result<Reconciliation, ReconcileError> {
    let mut ledger = EvidenceLedger::new();
    reconcile_with_options(
        left,
        left_key,
        right,
        right_key,
        &ReconcileOptions::default(),
        &RuntimePolicy::strict(),
        &mut ledger,
    )
}

/// Reconcile two record slices. Records lacking the key column are keyless.
pub fn reconcile_with_options(
    left: &[Record],
    left_key: &str,
    right: &[Record],
    right_key: &str,
    options: &ReconcileOptions,
    policy: &RuntimePolicy,
    ledger: &mut EvidenceLedger,
) -> Result<Reconciliation, ReconcileError> {
    require_key_name(Side::Left, left_key)?;
    require_key_name(Side::Right, right_key)?;
    admit_rows(left.len() + right.len(), policy, ledger)?;

    let plan = JoinPlan {
        left_subject: format!("left.{left_key}"),
        right_subject: format!("right.{right_key}"),
        left_column: Some(left_key),
        right_column: Some(right_key),
    };
    Ok(join_records(left, right, &plan, options, policy, ledger))
}

/// Reconcile two datasets, checking each key against its dataset's header.
/// A dataset with no rows and no header accepts any key.
///
/// A key column absent from a header is rejected under
/// [`RuntimeMode::Strict`](kr_runtime::RuntimeMode::Strict); under
/// `Hardened` every row of that side is treated as keyless.
pub fn reconcile_datasets(
    left: &Dataset,
    left_key: &str,
    right: &Dataset,
    right_key: &str,
    options: &ReconcileOptions,
    policy: &RuntimePolicy,
    ledger: &mut EvidenceLedger,
) -> Result<Reconciliation, ReconcileError> {
    require_key_name(Side::Left, left_key)?;
    require_key_name(Side::Right, right_key)?;

    let left_column = resolve_key_column(Side::Left, left, left_key, policy, ledger)?;
    let right_column = resolve_key_column(Side::Right, right, right_key, policy, ledger)?;
    admit_rows(left.len() + right.len(), policy, ledger)?;

    let plan = JoinPlan {
        left_subject: format!("left.{left_key}"),
        right_subject: format!("right.{right_key}"),
        left_column,
        right_column,
    };
    Ok(join_records(
        left.records(),
        right.records(),
        &plan,
        options,
        policy,
        ledger,
    ))
}

struct JoinPlan<'k> {
    left_subject: String,
    right_subject: String,
    left_column: Option<&'k str>,
    right_column: Option<&'k str>,
}

fn require_key_name(side: Side, key: &str) -> Result<(), ReconcileError> {
    if key.trim().is_empty() {
        return Err(ReconcileError::EmptyKeyName { side });
    }
    Ok(())
}

fn admit_rows(
    rows: usize,
    policy: &RuntimePolicy,
    ledger: &mut EvidenceLedger,
) -> Result<(), ReconcileError> {
    match policy.decide_row_admission(rows, ledger) {
        DecisionAction::Reject => Err(ReconcileError::RowCapExceeded {
            rows,
            cap: policy.row_cap.unwrap_or(rows),
        }),
        DecisionAction::Allow | DecisionAction::Repair => Ok(()),
    }
}

fn resolve_key_column<'k>(
    side: Side,
    dataset: &Dataset,
    key: &'k str,
    policy: &RuntimePolicy,
    ledger: &mut EvidenceLedger,
) -> Result<Option<&'k str>, ReconcileError> {
    // An empty dataset with no declared columns has nothing to check against.
    if dataset.has_column(key) || (dataset.is_empty() && dataset.header().is_empty()) {
        return Ok(Some(key));
    }

    match policy.decide_missing_key_column(format!("{side}.{key}"), key, ledger) {
        DecisionAction::Reject => Err(ReconcileError::MissingKeyColumn {
            side,
            dataset: dataset.name().to_owned(),
            column: key.to_owned(),
            available: dataset.header().to_vec(),
        }),
        DecisionAction::Allow | DecisionAction::Repair => {
            #[cfg(feature = "tracing")]
            tracing::warn!(%side, column = key, "key column absent; side treated as keyless");
            Ok(None)
        }
    }
}

fn extract_keys<'a>(
    records: &'a [Record],
    column: Option<&str>,
    comparison: KeyComparison,
) -> Vec<Option<KeyValue<'a>>> {
    match column {
        Some(column) => records
            .iter()
            .map(|record| record.key_value(column, comparison))
            .collect(),
        None => vec![None; records.len()],
    }
}

fn join_records(
    left: &[Record],
    right: &[Record],
    plan: &JoinPlan<'_>,
    options: &ReconcileOptions,
    policy: &RuntimePolicy,
    ledger: &mut EvidenceLedger,
) -> Reconciliation {
    let left_keys = extract_keys(left, plan.left_column, options.key_comparison);
    let right_keys = extract_keys(right, plan.right_column, options.key_comparison);

    // Pass 1: right index. Positions stay in scan order so the last entry is
    // the last-write-wins representative.
    let mut right_index = HashMap::<&KeyValue<'_>, Vec<usize>>::with_capacity(right.len());
    for (pos, key) in right_keys.iter().enumerate() {
        if let Some(key) = key {
            right_index.entry(key).or_default().push(pos);
        }
    }

    #[cfg(feature = "tracing")]
    tracing::debug!(
        right_rows = right.len(),
        distinct_right_keys = right_index.len(),
        "built right key index"
    );

    // Pass 2: probe with the left side in its original order.
    let mut matches = Vec::new();
    let mut only_in_left = Vec::new();
    for (record, key) in left.iter().zip(&left_keys) {
        let hits = key.as_ref().and_then(|key| right_index.get(key));
        match (hits, options.duplicates) {
            (Some(positions), DuplicateKeyPolicy::LastWins) => {
                if let Some(&last) = positions.last() {
                    matches.push(record.merged_with(&right[last]));
                }
            }
            (Some(positions), DuplicateKeyPolicy::AllPairs) => {
                matches.extend(positions.iter().map(|&pos| record.merged_with(&right[pos])));
            }
            (None, _) => only_in_left.push(record.clone()),
        }
    }

    // Pass 3: left key membership. "In both" is decided by key, not by which
    // right row was picked as representative in pass 2.
    let left_index = left_keys.iter().flatten().collect::<HashSet<_>>();
    let keyless_on_left = match options.missing_keys {
        MissingKeyPolicy::SharedAbsence => left_keys.iter().any(Option::is_none),
        MissingKeyPolicy::NeverMatch => false,
    };

    // Pass 4: right rows with no left counterpart, in right order.
    let mut absorbed_right_rows = 0;
    let mut only_in_right = Vec::new();
    for (record, key) in right.iter().zip(&right_keys) {
        let in_left = match key {
            Some(key) => left_index.contains(key),
            None => keyless_on_left,
        };
        if !in_left {
            only_in_right.push(record.clone());
        } else if key.is_none() {
            absorbed_right_rows += 1;
        }
    }

    let left_keyed = left_keys.iter().flatten().count();
    let right_keyed = right_keys.iter().flatten().count();
    let shadowed_right_rows = match options.duplicates {
        DuplicateKeyPolicy::LastWins => right_index
            .iter()
            .filter(|(key, _)| left_index.contains(**key))
            .map(|(_, positions)| positions.len() - 1)
            .sum(),
        DuplicateKeyPolicy::AllPairs => 0,
    };

    let summary = ReconcileSummary {
        left_rows: left.len(),
        right_rows: right.len(),
        matched: matches.len(),
        only_in_left: only_in_left.len(),
        only_in_right: only_in_right.len(),
        left_rows_without_key: left.len() - left_keyed,
        right_rows_without_key: right.len() - right_keyed,
        left_duplicate_rows: left_keyed - left_index.len(),
        right_duplicate_rows: right_keyed - right_index.len(),
        shadowed_right_rows,
        absorbed_right_rows,
    };

    record_evidence(left, right, plan, options, policy, &summary, ledger);

    #[cfg(feature = "tracing")]
    tracing::info!(
        matched = summary.matched,
        only_in_left = summary.only_in_left,
        only_in_right = summary.only_in_right,
        shadowed_right_rows = summary.shadowed_right_rows,
        "reconciliation complete"
    );

    Reconciliation {
        summary,
        matches,
        only_in_left,
        only_in_right,
    }
}

fn record_evidence(
    left: &[Record],
    right: &[Record],
    plan: &JoinPlan<'_>,
    options: &ReconcileOptions,
    policy: &RuntimePolicy,
    summary: &ReconcileSummary,
    ledger: &mut EvidenceLedger,
) {
    // A side whose key column was dropped by a hardened repair already has a
    // decision on record.
    if plan.left_column.is_some() && summary.left_rows_without_key > 0 {
        policy.note_missing_key_values(&*plan.left_subject, summary.left_rows_without_key, ledger);
    }
    if plan.right_column.is_some() && summary.right_rows_without_key > 0 {
        policy.note_missing_key_values(
            &*plan.right_subject,
            summary.right_rows_without_key,
            ledger,
        );
    }
    if summary.absorbed_right_rows > 0 {
        policy.note_absorbed_keyless_rows(
            &*plan.right_subject,
            summary.absorbed_right_rows,
            ledger,
        );
    }
    if summary.left_duplicate_rows > 0 {
        policy.note_duplicate_keys(
            &*plan.left_subject,
            summary.left_duplicate_rows,
            &format!("policy={}", options.duplicates),
            ledger,
        );
    }
    if summary.right_duplicate_rows > 0 {
        policy.note_duplicate_keys(
            &*plan.right_subject,
            summary.right_duplicate_rows,
            &format!(
                "policy={} shadowed={}",
                options.duplicates, summary.shadowed_right_rows
            ),
            ledger,
        );
    }

    if options.key_comparison != KeyComparison::Scalar {
        return;
    }
    let left_types = key_dtypes(left, plan.left_column);
    let right_types = key_dtypes(right, plan.right_column);
    if left_types.len() > 1 {
        policy.note_mixed_key_types(&*plan.left_subject, &join_dtypes(&left_types), ledger);
    }
    if right_types.len() > 1 {
        policy.note_mixed_key_types(&*plan.right_subject, &join_dtypes(&right_types), ledger);
    }
    if !left_types.is_empty()
        && !right_types.is_empty()
        && left_types.is_disjoint(&right_types)
    {
        policy.note_mixed_key_types(
            format!("{}~{}", plan.left_subject, plan.right_subject),
            &format!(
                "left: {}; right: {}",
                join_dtypes(&left_types),
                join_dtypes(&right_types)
            ),
            ledger,
        );
    }
}

fn key_dtypes(records: &[Record], column: Option<&str>) -> BTreeSet<DType> {
    let Some(column) = column else {
        return BTreeSet::new();
    };
    records
        .iter()
        .filter_map(|record| record.get(column))
        .filter(|value| !value.is_missing())
        .map(|value| value.dtype())
        .collect()
}

fn join_dtypes(dtypes: &BTreeSet<DType>) -> String {
    dtypes
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use kr_frame::{Dataset, Record};
    use kr_runtime::{DecisionAction, EvidenceLedger, IssueKind, RuntimePolicy};
    use kr_types::{KeyComparison, Scalar};

    use super::{
        DuplicateKeyPolicy, MissingKeyPolicy, ReconcileError, ReconcileOptions, Side, reconcile,
        reconcile_datasets, reconcile_with_options,
    };

    fn id(value: i64) -> Record {
        Record::from_pairs([("id", value)])
    }

    fn run(
        left: &[Record],
        left_key: &str,
        right: &[Record],
        right_key: &str,
        options: ReconcileOptions,
    ) -> (super::Reconciliation, EvidenceLedger) {
        let mut ledger = EvidenceLedger::new();
        let out = reconcile_with_options(
            left,
            left_key,
            right,
            right_key,
            &options,
            &RuntimePolicy::strict(),
            &mut ledger,
        )
        .expect("reconcile");
        (out, ledger)
    }

    #[test]
    fn no_overlap_splits_everything() {
        let out = reconcile(&[id(1)], "id", &[id(2)], "id").expect("reconcile");
        assert!(out.matches.is_empty());
        assert_eq!(out.only_in_left, vec![id(1)]);
        assert_eq!(out.only_in_right, vec![id(2)]);
    }

    #[test]
    fn right_side_wins_column_collisions() {
        let left = [Record::from_pairs([("id", Scalar::Int64(1)), ("name", "x".into())])];
        let right = [Record::from_pairs([("id", Scalar::Int64(1)), ("name", "y".into())])];

        let out = reconcile(&left, "id", &right, "id").expect("reconcile");
        assert_eq!(
            out.matches,
            vec![Record::from_pairs([("id", Scalar::Int64(1)), ("name", "y".into())])]
        );
        assert!(out.only_in_left.is_empty());
        assert!(out.only_in_right.is_empty());
        assert!(out.summary().is_fully_reconciled());
    }

    #[test]
    fn last_right_duplicate_shadows_earlier_ones() {
        let left = [Record::from_pairs([("k", 1_i64)])];
        let right = [
            Record::from_pairs([("k", Scalar::Int64(1)), ("x", "first".into())]),
            Record::from_pairs([("k", Scalar::Int64(1)), ("x", "second".into())]),
        ];

        let (out, ledger) = run(&left, "k", &right, "k", ReconcileOptions::default());
        assert_eq!(
            out.matches,
            vec![Record::from_pairs([("k", Scalar::Int64(1)), ("x", "second".into())])]
        );
        assert!(out.only_in_right.is_empty(), "first duplicate is dropped");
        assert_eq!(out.summary().shadowed_right_rows, 1);
        assert_eq!(out.summary().right_duplicate_rows, 1);

        let duplicate = ledger
            .of_kind(IssueKind::DuplicateKeys)
            .next()
            .expect("duplicate decision");
        assert_eq!(duplicate.issue.subject, "right.k");
        assert!(duplicate.issue.detail.contains("shadowed=1"));
    }

    #[test]
    fn all_pairs_reports_every_duplicate_in_right_order() {
        let left = [
            Record::from_pairs([("k", Scalar::Int64(1)), ("a", "l1".into())]),
            Record::from_pairs([("k", Scalar::Int64(1)), ("a", "l2".into())]),
        ];
        let right = [
            Record::from_pairs([("k", Scalar::Int64(1)), ("x", "first".into())]),
            Record::from_pairs([("k", Scalar::Int64(1)), ("x", "second".into())]),
        ];
        let options = ReconcileOptions {
            duplicates: DuplicateKeyPolicy::AllPairs,
            ..ReconcileOptions::default()
        };

        let (out, _) = run(&left, "k", &right, "k", options);
        let pairs = out
            .matches
            .iter()
            .map(|record| {
                (
                    record.get("a").cloned().expect("a"),
                    record.get("x").cloned().expect("x"),
                )
            })
            .collect::<Vec<_>>();
        assert_eq!(
            pairs,
            vec![
                (Scalar::from("l1"), Scalar::from("first")),
                (Scalar::from("l1"), Scalar::from("second")),
                (Scalar::from("l2"), Scalar::from("first")),
                (Scalar::from("l2"), Scalar::from("second")),
            ]
        );
        assert_eq!(out.summary().shadowed_right_rows, 0);
        assert_eq!(out.summary().left_duplicate_rows, 1);
    }

    #[test]
    fn duplicates_without_left_counterpart_stay_right_only() {
        let right = [id(9), id(9)];
        let out = reconcile(&[id(1)], "id", &right, "id").expect("reconcile");
        assert_eq!(out.only_in_right, vec![id(9), id(9)]);
        assert_eq!(out.summary().shadowed_right_rows, 0);
    }

    #[test]
    fn key_names_may_differ_per_side() {
        let left = [Record::from_pairs([("employee_id", Scalar::Int64(7)), ("a", "x".into())])];
        let right = [Record::from_pairs([("emp_id", Scalar::Int64(7)), ("b", "y".into())])];

        let out = reconcile(&left, "employee_id", &right, "emp_id").expect("reconcile");
        assert_eq!(out.matches.len(), 1);
        assert_eq!(
            out.matches[0].columns().collect::<Vec<_>>(),
            vec!["employee_id", "a", "emp_id", "b"]
        );
    }

    #[test]
    fn partitions_preserve_source_order() {
        let left = [id(5), id(1), id(4), id(2)];
        let right = [id(8), id(2), id(7), id(5), id(6)];

        let out = reconcile(&left, "id", &right, "id").expect("reconcile");
        assert_eq!(out.matches, vec![id(5), id(2)]);
        assert_eq!(out.only_in_left, vec![id(1), id(4)]);
        assert_eq!(out.only_in_right, vec![id(8), id(7), id(6)]);
    }

    #[test]
    fn empty_inputs_produce_empty_outputs() {
        let out = reconcile(&[], "id", &[], "id").expect("reconcile");
        assert!(out.matches.is_empty());
        assert!(out.only_in_left.is_empty());
        assert!(out.only_in_right.is_empty());
        assert_eq!(out.summary(), super::ReconcileSummary::default());
    }

    #[test]
    fn null_and_nan_keys_are_never_merged() {
        let left = [
            Record::from_pairs([("id", Scalar::null())]),
            Record::from_pairs([("id", Scalar::Float64(f64::NAN))]),
        ];
        let right = [
            Record::from_pairs([("id", Scalar::null())]),
            Record::new(),
        ];

        let (out, ledger) = run(&left, "id", &right, "id", ReconcileOptions::default());
        assert!(out.matches.is_empty());
        assert_eq!(out.only_in_left.len(), 2);
        assert_eq!(out.summary().left_rows_without_key, 2);
        assert_eq!(out.summary().right_rows_without_key, 2);
        assert_eq!(ledger.of_kind(IssueKind::MissingKeyValues).count(), 2);
    }

    #[test]
    fn keyless_right_rows_are_absorbed_when_left_has_keyless_rows() {
        let left = [
            Record::from_pairs([("id", Scalar::null()), ("a", "l".into())]),
            Record::from_pairs([("id", Scalar::Int64(1)), ("a", "k".into())]),
        ];
        let right = [
            Record::from_pairs([("id", Scalar::null()), ("b", "r".into())]),
            Record::from_pairs([("b", Scalar::from("absent"))]),
            Record::from_pairs([("id", Scalar::Int64(2)), ("b", "keyed".into())]),
        ];

        let (out, ledger) = run(&left, "id", &right, "id", ReconcileOptions::default());
        assert!(out.matches.is_empty());
        assert_eq!(out.only_in_left, left.to_vec());
        assert_eq!(out.only_in_right, vec![right[2].clone()]);
        assert_eq!(out.summary().absorbed_right_rows, 2);
        let absorbed = ledger
            .of_kind(IssueKind::AbsorbedKeylessRows)
            .next()
            .expect("absorbed decision");
        assert_eq!(absorbed.issue.subject, "right.id");
        assert_eq!(absorbed.issue.detail, "absorbed_rows=2");

        let isolated = ReconcileOptions {
            missing_keys: MissingKeyPolicy::NeverMatch,
            ..ReconcileOptions::default()
        };
        let (out, ledger) = run(&left, "id", &right, "id", isolated);
        assert_eq!(out.only_in_right, right.to_vec());
        assert_eq!(out.summary().absorbed_right_rows, 0);
        assert_eq!(ledger.of_kind(IssueKind::AbsorbedKeylessRows).count(), 0);
    }

    #[test]
    fn keyless_right_rows_stay_right_only_when_every_left_row_is_keyed() {
        let right = [Record::from_pairs([("id", Scalar::null())]), id(1)];
        let out = reconcile(&[id(1)], "id", &right, "id").expect("reconcile");
        assert_eq!(out.only_in_right, vec![right[0].clone()]);
        assert_eq!(out.summary().absorbed_right_rows, 0);
    }

    #[test]
    fn number_and_text_keys_differ_unless_compared_as_text() {
        let left = [Record::from_pairs([("id", 1_i64)])];
        let right = [Record::from_pairs([("id", "1")])];

        let (strict, ledger) = run(&left, "id", &right, "id", ReconcileOptions::default());
        assert!(strict.matches.is_empty());
        let mixed = ledger
            .of_kind(IssueKind::MixedKeyTypes)
            .next()
            .expect("cross-side dtype hint");
        assert_eq!(mixed.issue.subject, "left.id~right.id");

        let text = ReconcileOptions {
            key_comparison: KeyComparison::Text,
            ..ReconcileOptions::default()
        };
        let (loose, ledger) = run(&left, "id", &right, "id", text);
        assert_eq!(loose.matches.len(), 1);
        assert_eq!(ledger.of_kind(IssueKind::MixedKeyTypes).count(), 0);
    }

    #[test]
    fn blank_key_name_is_a_usage_error() {
        let err = reconcile(&[id(1)], " ", &[id(1)], "id").expect_err("blank key");
        assert_eq!(err, ReconcileError::EmptyKeyName { side: Side::Left });
        let err = reconcile(&[id(1)], "id", &[id(1)], "").expect_err("empty key");
        assert_eq!(err, ReconcileError::EmptyKeyName { side: Side::Right });
    }

    #[test]
    fn strict_datasets_reject_unknown_key_column() {
        let left = Dataset::from_records("a.csv", vec![id(1)]);
        let right = Dataset::from_records("b.csv", vec![id(1)]);
        let mut ledger = EvidenceLedger::new();

        let err = reconcile_datasets(
            &left,
            "id",
            &right,
            "emp_id",
            &ReconcileOptions::default(),
            &RuntimePolicy::strict(),
            &mut ledger,
        )
        .expect_err("strict must reject");
        assert_eq!(
            err.to_string(),
            "right dataset \"b.csv\" has no column \"emp_id\" (available: id)"
        );
        assert_eq!(ledger.records()[0].action, DecisionAction::Reject);
    }

    #[test]
    fn hardened_datasets_treat_unknown_key_column_as_keyless() {
        let left = Dataset::from_records("a.csv", vec![id(1), id(2)]);
        let right = Dataset::from_records("b.csv", vec![id(1)]);
        let mut ledger = EvidenceLedger::new();

        let out = reconcile_datasets(
            &left,
            "employee_id",
            &right,
            "id",
            &ReconcileOptions::default(),
            &RuntimePolicy::hardened(None),
            &mut ledger,
        )
        .expect("hardened repairs");
        assert!(out.matches.is_empty());
        assert_eq!(out.only_in_left.len(), 2);
        assert_eq!(out.only_in_right, vec![id(1)]);
        assert_eq!(ledger.records()[0].action, DecisionAction::Repair);
        assert_eq!(ledger.of_kind(IssueKind::MissingKeyValues).count(), 0);
    }

    #[test]
    fn headerless_empty_dataset_accepts_any_key() {
        let left = Dataset::from_records("a.json", Vec::new());
        let right = Dataset::from_records("b.json", vec![id(1)]);
        let mut ledger = EvidenceLedger::new();

        let out = reconcile_datasets(
            &left,
            "employee_id",
            &right,
            "id",
            &ReconcileOptions::default(),
            &RuntimePolicy::strict(),
            &mut ledger,
        )
        .expect("empty side is not a usage error");
        assert_eq!(out.only_in_right, vec![id(1)]);
        assert!(ledger.is_empty());
    }

    #[test]
    fn row_cap_rejects_oversized_runs() {
        let mut ledger = EvidenceLedger::new();
        let err = reconcile_with_options(
            &[id(1), id(2)],
            "id",
            &[id(3)],
            "id",
            &ReconcileOptions::default(),
            &RuntimePolicy::hardened(Some(2)),
            &mut ledger,
        )
        .expect_err("cap");
        assert_eq!(err, ReconcileError::RowCapExceeded { rows: 3, cap: 2 });
    }

    #[test]
    fn inputs_are_left_untouched_and_reruns_are_identical() {
        let left = vec![id(3), id(1)];
        let right = vec![id(1), id(2)];
        let before = (left.clone(), right.clone());

        let first = reconcile(&left, "id", &right, "id").expect("first");
        let second = reconcile(&left, "id", &right, "id").expect("second");
        assert_eq!(first, second);
        assert_eq!(
            serde_json::to_string(&first).expect("json"),
            serde_json::to_string(&second).expect("json")
        );
        assert_eq!((left, right), before);
    }

    #[test]
    fn options_deserialize_from_partial_json() {
        let options: ReconcileOptions =
            serde_json::from_str(r#"{"duplicates":"all_pairs"}"#).expect("parse");
        assert_eq!(options.duplicates, DuplicateKeyPolicy::AllPairs);
        assert_eq!(options.key_comparison, KeyComparison::Scalar);
        assert_eq!(options.missing_keys, MissingKeyPolicy::SharedAbsence);

        let options: ReconcileOptions =
            serde_json::from_str(r#"{"missing_keys":"never_match"}"#).expect("parse");
        assert_eq!(options.missing_keys, MissingKeyPolicy::NeverMatch);
    }
}
