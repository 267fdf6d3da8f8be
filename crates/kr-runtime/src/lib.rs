#![forbid(unsafe_code)]

use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuntimeMode {
    /// Fail closed on usage problems.
    #[default]
    Strict,
    /// Repair usage problems where a defined fallback exists, and record it.
    Hardened,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionAction {
    Allow,
    Reject,
    Repair,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueKind {
    MissingKeyColumn,
    MissingKeyValues,
    AbsorbedKeylessRows,
    DuplicateKeys,
    MixedKeyTypes,
    RowCap,
}

impl fmt::Display for IssueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::MissingKeyColumn => "missing_key_column",
            Self::MissingKeyValues => "missing_key_values",
            Self::AbsorbedKeylessRows => "absorbed_keyless_rows",
            Self::DuplicateKeys => "duplicate_keys",
            Self::MixedKeyTypes => "mixed_key_types",
            Self::RowCap => "row_cap",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompatibilityIssue {
    pub kind: IssueKind,
    pub subject: String,
    pub detail: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecisionRecord {
    pub mode: RuntimeMode,
    pub action: DecisionAction,
    pub issue: CompatibilityIssue,
}

impl DecisionRecord {
    #[must_use]
    pub fn render_plain(&self) -> String {
        format!(
            "[{}::{:?}] {} ({})",
            self.issue.subject, self.action, self.issue.kind, self.issue.detail
        )
    }
}

/// Ordered log of the decisions taken during one run. Carries no clock so
/// two runs over the same input produce identical ledgers.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvidenceLedger {
    records: Vec<DecisionRecord>,
}

impl EvidenceLedger {
    #[must_use]
    pub fn new() -> Self {
        Self {
            records: Vec::new(),
        }
    }

    pub fn push(&mut self, record: DecisionRecord) {
        self.records.push(record);
    }

    #[must_use]
    pub fn records(&self) -> &[DecisionRecord] {
        &self.records
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn of_kind(&self, kind: IssueKind) -> impl Iterator<Item = &DecisionRecord> {
        self.records
            .iter()
            .filter(move |record| record.issue.kind == kind)
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuntimePolicy {
    #[serde(default)]
    pub mode: RuntimeMode,
    /// Upper bound on `|left| + |right|` admitted into one run.
    #[serde(default)]
    pub row_cap: Option<usize>,
}

impl RuntimePolicy {
    #[must_use]
    pub fn strict() -> Self {
        Self {
            mode: RuntimeMode::Strict,
            row_cap: None,
        }
    }

    #[must_use]
    pub fn hardened(row_cap: Option<usize>) -> Self {
        Self {
            mode: RuntimeMode::Hardened,
            row_cap,
        }
    }

    #[must_use]
    pub fn with_row_cap(mut self, row_cap: Option<usize>) -> Self {
        self.row_cap = row_cap;
        self
    }

    /// A chosen key column is not in the dataset's header. Strict rejects;
    /// hardened treats every row as keyless.
    pub fn decide_missing_key_column(
        &self,
        subject: impl Into<String>,
        column: &str,
        ledger: &mut EvidenceLedger,
    ) -> DecisionAction {
        let action = match self.mode {
            RuntimeMode::Strict => DecisionAction::Reject,
            RuntimeMode::Hardened => DecisionAction::Repair,
        };
        let outcome = match action {
            DecisionAction::Reject => "run rejected",
            DecisionAction::Allow | DecisionAction::Repair => "rows treated as keyless",
        };
        self.record(
            IssueKind::MissingKeyColumn,
            subject,
            format!("column={column:?} absent from header; {outcome}"),
            action,
            ledger,
        )
    }

    pub fn decide_row_admission(&self, rows: usize, ledger: &mut EvidenceLedger) -> DecisionAction {
        let Some(cap) = self.row_cap else {
            return DecisionAction::Allow;
        };

        let action = if rows > cap {
            DecisionAction::Reject
        } else {
            DecisionAction::Allow
        };
        self.record(
            IssueKind::RowCap,
            "admission",
            format!("rows={rows} cap={cap}"),
            action,
            ledger,
        )
    }

    pub fn note_missing_key_values(
        &self,
        subject: impl Into<String>,
        rows: usize,
        ledger: &mut EvidenceLedger,
    ) {
        self.record(
            IssueKind::MissingKeyValues,
            subject,
            format!("rows_without_key={rows}"),
            DecisionAction::Allow,
            ledger,
        );
    }

    /// Keyless right rows counted as present on the left because the left
    /// side has keyless rows too.
    pub fn note_absorbed_keyless_rows(
        &self,
        subject: impl Into<String>,
        rows: usize,
        ledger: &mut EvidenceLedger,
    ) {
        self.record(
            IssueKind::AbsorbedKeylessRows,
            subject,
            format!("absorbed_rows={rows}"),
            DecisionAction::Allow,
            ledger,
        );
    }

    pub fn note_duplicate_keys(
        &self,
        subject: impl Into<String>,
        duplicate_rows: usize,
        detail: &str,
        ledger: &mut EvidenceLedger,
    ) {
        self.record(
            IssueKind::DuplicateKeys,
            subject,
            format!("duplicate_rows={duplicate_rows} {detail}"),
            DecisionAction::Allow,
            ledger,
        );
    }

    pub fn note_mixed_key_types(
        &self,
        subject: impl Into<String>,
        dtypes: &str,
        ledger: &mut EvidenceLedger,
    ) {
        self.record(
            IssueKind::MixedKeyTypes,
            subject,
            format!("dtypes=[{dtypes}]"),
            DecisionAction::Allow,
            ledger,
        );
    }

    fn record(
        &self,
        kind: IssueKind,
        subject: impl Into<String>,
        detail: String,
        action: DecisionAction,
        ledger: &mut EvidenceLedger,
    ) -> DecisionAction {
        ledger.push(DecisionRecord {
            mode: self.mode,
            action,
            issue: CompatibilityIssue {
                kind,
                subject: subject.into(),
                detail,
            },
        });
        action
    }
}
