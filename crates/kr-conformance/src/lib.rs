#![forbid(unsafe_code)]

use std::fs;
use std::path::{Path, PathBuf};

use kr_frame::{Dataset, FrameError, Record};
use kr_io::{IoError, read_json_value, record_to_json, write_csv_string};
use kr_join::{ReconcileError, ReconcileOptions, Reconciliation, reconcile_datasets};
use kr_runtime::{EvidenceLedger, IssueKind, RuntimeMode, RuntimePolicy};
use kr_types::Scalar;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Clone)]
pub struct HarnessConfig {
    pub fixture_root: PathBuf,
    /// Row cap for hardened cases that do not set their own.
    pub hardened_row_cap: Option<usize>,
}

impl HarnessConfig {
    #[must_use]
    pub fn default_paths() -> Self {
        let manifest_dir = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
        Self {
            fixture_root: manifest_dir.join("fixtures"),
            hardened_row_cap: Some(100_000),
        }
    }

    #[must_use]
    pub fn case_fixture_root(&self) -> PathBuf {
        self.fixture_root.join("cases")
    }
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self::default_paths()
    }
}

#[derive(Debug, Error)]
pub enum HarnessError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Load(#[from] IoError),
    #[error(transparent)]
    Frame(#[from] FrameError),
    #[error("fixture format error: {0}")]
    FixtureFormat(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FixtureSide {
    pub key: String,
    /// Plain JSON objects, loaded the same way a `.json` input file is.
    pub rows: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FixtureExpected {
    pub matches: Vec<Value>,
    pub only_in_left: Vec<Value>,
    pub only_in_right: Vec<Value>,
    #[serde(default)]
    pub shadowed_right_rows: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FixtureCase {
    pub case_id: String,
    #[serde(default)]
    pub mode: RuntimeMode,
    #[serde(default)]
    pub row_cap: Option<usize>,
    #[serde(default)]
    pub options: ReconcileOptions,
    pub left: FixtureSide,
    pub right: FixtureSide,
    #[serde(default)]
    pub expected: Option<FixtureExpected>,
    /// Substring of the rendered error the case must fail with.
    #[serde(default)]
    pub expected_error: Option<String>,
    /// Issue kinds the ledger must hold, in order.
    #[serde(default)]
    pub expected_issues: Option<Vec<IssueKind>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaseStatus {
    Pass,
    Fail,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaseResult {
    pub case_id: String,
    pub mode: RuntimeMode,
    pub status: CaseStatus,
    pub mismatch: Option<String>,
    pub evidence_records: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SuiteReport {
    pub suite: String,
    pub fixture_count: usize,
    pub passed: usize,
    pub failed: usize,
    pub results: Vec<CaseResult>,
}

impl SuiteReport {
    #[must_use]
    pub fn is_green(&self) -> bool {
        self.failed == 0 && self.fixture_count > 0
    }
}

pub fn run_fixture_suite(config: &HarnessConfig) -> Result<SuiteReport, HarnessError> {
    run_fixture_suite_filtered(config, None)
}

/// Run every case, or only `case_filter` when given.
pub fn run_fixture_suite_filtered(
    config: &HarnessConfig,
    case_filter: Option<&str>,
) -> Result<SuiteReport, HarnessError> {
    let cases = load_fixtures(config, case_filter)?;
    let mut results = Vec::with_capacity(cases.len());
    for case in &cases {
        results.push(run_case(config, case)?);
    }

    let failed = results
        .iter()
        .filter(|result| result.status == CaseStatus::Fail)
        .count();
    let passed = results.len().saturating_sub(failed);

    Ok(SuiteReport {
        suite: "reconcile_cases".to_owned(),
        fixture_count: results.len(),
        passed,
        failed,
        results,
    })
}

pub fn run_case(config: &HarnessConfig, case: &FixtureCase) -> Result<CaseResult, HarnessError> {
    let left = read_json_value(&format!("{}.left", case.case_id), case.left.rows.clone())?;
    let right = read_json_value(&format!("{}.right", case.case_id), case.right.rows.clone())?;

    let policy = match case.mode {
        RuntimeMode::Strict => RuntimePolicy::strict().with_row_cap(case.row_cap),
        RuntimeMode::Hardened => RuntimePolicy::hardened(case.row_cap.or(config.hardened_row_cap)),
    };

    let mut ledger = EvidenceLedger::new();
    let outcome = reconcile_datasets(
        &left,
        &case.left.key,
        &right,
        &case.right.key,
        &case.options,
        &policy,
        &mut ledger,
    );
    let mismatch = check_outcome(case, outcome, &ledger).err();

    #[cfg(feature = "tracing")]
    tracing::debug!(case_id = %case.case_id, passed = mismatch.is_none(), "fixture case");

    Ok(CaseResult {
        case_id: case.case_id.clone(),
        mode: case.mode,
        status: if mismatch.is_none() {
            CaseStatus::Pass
        } else {
            CaseStatus::Fail
        },
        mismatch,
        evidence_records: ledger.len(),
    })
}

fn check_outcome(
    case: &FixtureCase,
    outcome: Result<Reconciliation, ReconcileError>,
    ledger: &EvidenceLedger,
) -> Result<(), String> {
    match (outcome, case.expected_error.as_deref()) {
        (Err(err), Some(needle)) => {
            let rendered = err.to_string();
            if !rendered.contains(needle) {
                return Err(format!(
                    "error mismatch: actual={rendered:?}, expected to contain {needle:?}"
                ));
            }
        }
        (Err(err), None) => return Err(format!("unexpected error: {err}")),
        (Ok(_), Some(needle)) => {
            return Err(format!("expected an error containing {needle:?}, run succeeded"));
        }
        (Ok(result), None) => {
            if let Some(expected) = &case.expected {
                compare_result(&result, expected)?;
            }
        }
    }

    if let Some(expected_issues) = &case.expected_issues {
        let actual = ledger
            .records()
            .iter()
            .map(|record| record.issue.kind)
            .collect::<Vec<_>>();
        if &actual != expected_issues {
            return Err(format!(
                "ledger mismatch: actual={actual:?}, expected={expected_issues:?}"
            ));
        }
    }
    Ok(())
}

fn compare_result(actual: &Reconciliation, expected: &FixtureExpected) -> Result<(), String> {
    compare_partition("matches", &actual.matches, &expected.matches)?;
    compare_partition("only_in_left", &actual.only_in_left, &expected.only_in_left)?;
    compare_partition("only_in_right", &actual.only_in_right, &expected.only_in_right)?;

    if let Some(shadowed) = expected.shadowed_right_rows {
        let actual_shadowed = actual.summary().shadowed_right_rows;
        if actual_shadowed != shadowed {
            return Err(format!(
                "shadowed_right_rows mismatch: actual={actual_shadowed}, expected={shadowed}"
            ));
        }
    }
    Ok(())
}

fn compare_partition(label: &str, actual: &[Record], expected: &[Value]) -> Result<(), String> {
    if actual.len() != expected.len() {
        return Err(format!(
            "{label} length mismatch: actual={}, expected={}",
            actual.len(),
            expected.len()
        ));
    }

    for (idx, (record, want)) in actual.iter().zip(expected).enumerate() {
        let got = record_to_json(record);
        let same_columns = match (&got, want) {
            (Value::Object(a), Value::Object(b)) => a.keys().eq(b.keys()),
            _ => false,
        };
        if got != *want || !same_columns {
            return Err(format!(
                "{label} mismatch at idx={idx}: actual={got}, expected={want}"
            ));
        }
    }
    Ok(())
}

fn load_fixtures(
    config: &HarnessConfig,
    case_filter: Option<&str>,
) -> Result<Vec<FixtureCase>, HarnessError> {
    let fixture_files = list_fixture_files(&config.case_fixture_root())?;
    let mut cases = Vec::with_capacity(fixture_files.len());

    for fixture_path in fixture_files {
        let case = load_fixture(&fixture_path)?;
        if case_filter.is_none_or(|case_id| case.case_id == case_id) {
            cases.push(case);
        }
    }
    cases.sort_by(|a, b| a.case_id.cmp(&b.case_id));
    Ok(cases)
}

pub fn load_fixture(path: &Path) -> Result<FixtureCase, HarnessError> {
    let body = fs::read_to_string(path)?;
    let case: FixtureCase = serde_json::from_str(&body)?;
    if case.expected.is_some() == case.expected_error.is_some() {
        return Err(HarnessError::FixtureFormat(format!(
            "{}: exactly one of `expected` and `expected_error` must be set",
            path.display()
        )));
    }
    Ok(case)
}

fn list_fixture_files(root: &Path) -> Result<Vec<PathBuf>, HarnessError> {
    if !root.exists() {
        return Ok(Vec::new());
    }

    let mut files = Vec::new();
    let mut stack = vec![root.to_path_buf()];

    while let Some(current) = stack.pop() {
        for entry in fs::read_dir(current)? {
            let entry = entry?;
            let path = entry.path();
            if path.is_dir() {
                stack.push(path);
            } else if path.extension().is_some_and(|ext| ext == "json") {
                files.push(path);
            }
        }
    }

    files.sort();
    Ok(files)
}

/// Shape of the employee demo pair: a main file keyed by `employee_id` and a
/// lookup file keyed by `emp_id`, overlapping on the first `matched` ids.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DemoSpec {
    pub left_key: String,
    pub right_key: String,
    pub matched: usize,
    pub left_only: usize,
    pub right_only: usize,
    pub filler_columns: usize,
    pub seed: u64,
}

impl Default for DemoSpec {
    fn default() -> Self {
        Self {
            left_key: "employee_id".to_owned(),
            right_key: "emp_id".to_owned(),
            matched: 500,
            left_only: 100,
            right_only: 50,
            filler_columns: 20,
            seed: 0x5EED,
        }
    }
}

/// Build the demo pair. Ids are text, as they would be after a CSV load:
/// left holds `1..=matched + left_only`, right holds `1..=matched` followed
/// by ids past the end of left.
pub fn generate_demo_datasets(spec: &DemoSpec) -> Result<(Dataset, Dataset), HarnessError> {
    let mut filler = FillerRng(spec.seed);
    let left_last = spec.matched + spec.left_only;

    let left_ids = 1..=left_last;
    let right_ids = (1..=spec.matched).chain(left_last + 1..=left_last + spec.right_only);

    let left = demo_dataset("file_A.csv", &spec.left_key, "a_data", spec, left_ids, &mut filler)?;
    let right = demo_dataset("file_B.csv", &spec.right_key, "b_data", spec, right_ids, &mut filler)?;

    #[cfg(feature = "tracing")]
    tracing::info!(left_rows = left.len(), right_rows = right.len(), "generated demo datasets");

    Ok((left, right))
}

/// Write the demo pair as `file_A.csv` and `file_B.csv` under `dir`.
pub fn write_demo_csv(spec: &DemoSpec, dir: &Path) -> Result<(PathBuf, PathBuf), HarnessError> {
    let (left, right) = generate_demo_datasets(spec)?;
    fs::create_dir_all(dir)?;

    let left_path = dir.join(left.name());
    let right_path = dir.join(right.name());
    fs::write(&left_path, write_csv_string(left.records())?)?;
    fs::write(&right_path, write_csv_string(right.records())?)?;
    Ok((left_path, right_path))
}

fn demo_dataset(
    name: &str,
    key: &str,
    filler_prefix: &str,
    spec: &DemoSpec,
    ids: impl Iterator<Item = usize>,
    filler: &mut FillerRng,
) -> Result<Dataset, HarnessError> {
    let mut header = Vec::with_capacity(spec.filler_columns + 1);
    header.push(key.to_owned());
    header.extend((1..=spec.filler_columns).map(|i| format!("{filler_prefix}_{i}")));

    let records = ids
        .map(|id| {
            let mut record = Record::with_capacity(header.len());
            record.insert(key, Scalar::Utf8(id.to_string()));
            for column in &header[1..] {
                record.insert(column.clone(), Scalar::Utf8(filler.next_hex()));
            }
            record
        })
        .collect();

    Ok(Dataset::new(name, header, records)?)
}

/// splitmix64; eight hex digits per cell.
struct FillerRng(u64);

impl FillerRng {
    fn next_hex(&mut self) -> String {
        self.0 = self.0.wrapping_add(0x9E37_79B9_7F4A_7C15);
        let mut z = self.0;
        z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
        z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
        z ^= z >> 31;
        format!("{:08x}", z >> 32)
    }
}
