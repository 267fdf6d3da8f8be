#![forbid(unsafe_code)]

//! Two-dataset key reconciliation.
//!
//! Load two datasets, name a key column for each, and split the rows into
//! merged matches plus the rows found on one side only.
//!
//! ```
//! use keyrecon::{Record, reconcile};
//!
//! let left = [Record::from_pairs([("employee_id", 1_i64)])];
//! let right = [Record::from_pairs([("emp_id", 2_i64)])];
//!
//! let result = reconcile(&left, "employee_id", &right, "emp_id").expect("reconcile");
//! assert!(result.matches.is_empty());
//! assert_eq!(result.only_in_left.len(), 1);
//! assert_eq!(result.only_in_right.len(), 1);
//! ```

pub use kr_frame::{Dataset, FrameError, Record};
pub use kr_io::{
    DataFormat, IoError, read_csv_str, read_json_str, read_json_value, read_jsonl_str, read_path,
    read_str, record_to_json, write_csv_string, write_reconciliation_json, write_records_json,
};
pub use kr_join::{
    DuplicateKeyPolicy, MissingKeyPolicy, ReconcileError, ReconcileOptions, ReconcileSummary,
    Reconciliation, Side, reconcile, reconcile_datasets, reconcile_with_options,
};
pub use kr_runtime::{
    CompatibilityIssue, DecisionAction, DecisionRecord, EvidenceLedger, IssueKind, RuntimeMode,
    RuntimePolicy,
};
pub use kr_types::{DType, KeyComparison, KeyValue, NullKind, Scalar};
