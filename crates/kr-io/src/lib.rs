#![forbid(unsafe_code)]

use std::path::Path;

use csv::{ReaderBuilder, WriterBuilder};
use indexmap::IndexSet;
use kr_frame::{Dataset, FrameError, Record};
use kr_join::Reconciliation;
use kr_types::Scalar;
use serde_json::{Map, Number, Value};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum IoError {
    #[error("csv input has no headers")]
    MissingHeaders,
    #[error("csv row {row} has {found} fields but the header has {expected}")]
    RaggedRow {
        row: usize,
        expected: usize,
        found: usize,
    },
    #[error("json input must be an array of objects")]
    NotAnArray,
    #[error("json row {row} is not an object")]
    NotAnObject { row: usize },
    #[error("json row {row} column {column:?} holds a nested array or object")]
    UnsupportedValue { row: usize, column: String },
    #[error("unsupported input format for {0:?} (expected .json, .jsonl, .ndjson or .csv)")]
    UnsupportedFormat(String),
    #[error(transparent)]
    Csv(#[from] csv::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Utf8(#[from] std::string::FromUtf8Error),
    #[error(transparent)]
    Frame(#[from] FrameError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataFormat {
    Json,
    Jsonl,
    Csv,
}

impl DataFormat {
    /// Pick a format from the file extension, case-insensitively.
    pub fn from_path(path: &Path) -> Result<Self, IoError> {
        let extension = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(str::to_ascii_lowercase);
        match extension.as_deref() {
            Some("json") => Ok(Self::Json),
            Some("jsonl" | "ndjson") => Ok(Self::Jsonl),
            Some("csv") => Ok(Self::Csv),
            _ => Err(IoError::UnsupportedFormat(path.display().to_string())),
        }
    }
}

pub fn read_str(format: DataFormat, name: &str, input: &str) -> Result<Dataset, IoError> {
    match format {
        DataFormat::Json => read_json_str(name, input),
        DataFormat::Jsonl => read_jsonl_str(name, input),
        DataFormat::Csv => read_csv_str(name, input),
    }
}

/// Load a dataset from disk. The dataset is named after the file.
pub fn read_path(path: &Path) -> Result<Dataset, IoError> {
    let format = DataFormat::from_path(path)?;
    let input = std::fs::read_to_string(path)?;
    let name = path
        .file_name()
        .map_or_else(|| path.display().to_string(), |name| name.to_string_lossy().into_owned());
    read_str(format, &name, &input)
}

/// A JSON array of flat objects. Values keep their JSON types; strings are
/// never re-typed.
pub fn read_json_str(name: &str, input: &str) -> Result<Dataset, IoError> {
    read_json_value(name, serde_json::from_str(input)?)
}

/// Same as [`read_json_str`] for an already parsed document.
pub fn read_json_value(name: &str, value: Value) -> Result<Dataset, IoError> {
    let Value::Array(rows) = value else {
        return Err(IoError::NotAnArray);
    };

    let records = rows
        .into_iter()
        .enumerate()
        .map(|(row, value)| record_from_json(row, value))
        .collect::<Result<Vec<_>, _>>()?;
    finish_dataset(name, records)
}

/// One JSON object per line. Blank lines are skipped; row numbers count
/// only non-blank lines.
pub fn read_jsonl_str(name: &str, input: &str) -> Result<Dataset, IoError> {
    let records = input
        .lines()
        .filter(|line| !line.trim().is_empty())
        .enumerate()
        .map(|(row, line)| record_from_json(row, serde_json::from_str(line)?))
        .collect::<Result<Vec<_>, _>>()?;
    finish_dataset(name, records)
}

/// Every non-empty cell is read as text and empty cells as null. Lexing is
/// left to the `csv` crate, which also skips empty lines.
pub fn read_csv_str(name: &str, input: &str) -> Result<Dataset, IoError> {
    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(input.as_bytes());

    let headers = reader.headers().cloned()?;
    if headers.is_empty() {
        return Err(IoError::MissingHeaders);
    }
    let header = headers.iter().map(str::to_owned).collect::<Vec<_>>();

    let mut records = Vec::new();
    for (row, result) in reader.records().enumerate() {
        let fields = result?;
        if fields.len() > header.len() {
            return Err(IoError::RaggedRow {
                row,
                expected: header.len(),
                found: fields.len(),
            });
        }

        let mut record = Record::with_capacity(header.len());
        for (idx, column) in header.iter().enumerate() {
            let cell = match fields.get(idx) {
                Some(field) if !field.is_empty() => Scalar::Utf8(field.to_owned()),
                _ => Scalar::null(),
            };
            record.insert(column.clone(), cell);
        }
        records.push(record);
    }

    #[cfg(feature = "tracing")]
    tracing::debug!(dataset = name, rows = records.len(), columns = header.len(), "loaded csv");

    Ok(Dataset::new(name, header, records)?)
}

pub fn write_records_json(records: &[Record]) -> Result<String, IoError> {
    let rows = records.iter().map(record_to_json).collect::<Vec<_>>();
    Ok(serde_json::to_string_pretty(&rows)?)
}

/// Pretty JSON with the summary first, then the three partitions as plain
/// objects.
pub fn write_reconciliation_json(result: &Reconciliation) -> Result<String, IoError> {
    let mut out = Map::new();
    out.insert("summary".to_owned(), serde_json::to_value(result.summary())?);
    for (label, records) in [
        ("matches", &result.matches),
        ("only_in_left", &result.only_in_left),
        ("only_in_right", &result.only_in_right),
    ] {
        out.insert(
            label.to_owned(),
            Value::Array(records.iter().map(record_to_json).collect()),
        );
    }
    Ok(serde_json::to_string_pretty(&Value::Object(out))?)
}

/// Header is the first-seen union of columns; absent cells are written empty.
pub fn write_csv_string(records: &[Record]) -> Result<String, IoError> {
    let mut headers = IndexSet::<&str>::new();
    for record in records {
        headers.extend(record.columns());
    }

    let mut writer = WriterBuilder::new().from_writer(Vec::new());
    if !headers.is_empty() {
        writer.write_record(&headers)?;
    }

    for record in records {
        let row = headers
            .iter()
            .map(|column| record.get(column).map_or_else(String::new, scalar_to_csv))
            .collect::<Vec<_>>();
        writer.write_record(&row)?;
    }

    let bytes = writer.into_inner().map_err(|err| err.into_error())?;
    Ok(String::from_utf8(bytes)?)
}

fn finish_dataset(name: &str, records: Vec<Record>) -> Result<Dataset, IoError> {
    // from_records pads ragged objects; new re-checks the derived header.
    let padded = Dataset::from_records(name, records);
    let header = padded.header().to_vec();

    #[cfg(feature = "tracing")]
    tracing::debug!(dataset = name, rows = padded.len(), columns = header.len(), "loaded json");

    Ok(Dataset::new(name, header, padded.into_records())?)
}

fn record_from_json(row: usize, value: Value) -> Result<Record, IoError> {
    let Value::Object(object) = value else {
        return Err(IoError::NotAnObject { row });
    };

    let mut record = Record::with_capacity(object.len());
    for (column, value) in object {
        let cell = match value {
            Value::Null => Scalar::null(),
            Value::Bool(v) => Scalar::Bool(v),
            Value::Number(n) => number_to_scalar(&n),
            Value::String(v) => Scalar::Utf8(v),
            Value::Array(_) | Value::Object(_) => {
                return Err(IoError::UnsupportedValue { row, column });
            }
        };
        record.insert(column, cell);
    }
    Ok(record)
}

fn number_to_scalar(n: &Number) -> Scalar {
    if let Some(v) = n.as_i64() {
        return Scalar::Int64(v);
    }
    n.as_f64().map_or_else(Scalar::null, Scalar::Float64)
}

fn scalar_to_json(scalar: &Scalar) -> Value {
    match scalar {
        Scalar::Null(_) => Value::Null,
        Scalar::Bool(v) => Value::Bool(*v),
        Scalar::Int64(v) => Value::Number((*v).into()),
        Scalar::Float64(v) => Number::from_f64(*v).map_or(Value::Null, Value::Number),
        Scalar::Utf8(v) => Value::String(v.clone()),
    }
}

/// Plain JSON object for one record. NaN and infinities become `null`.
#[must_use]
pub fn record_to_json(record: &Record) -> Value {
    Value::Object(
        record
            .iter()
            .map(|(column, value)| (column.clone(), scalar_to_json(value)))
            .collect(),
    )
}

fn scalar_to_csv(scalar: &Scalar) -> String {
    match scalar {
        Scalar::Null(_) => String::new(),
        Scalar::Bool(v) => v.to_string(),
        Scalar::Int64(v) => v.to_string(),
        Scalar::Float64(v) => {
            if v.is_nan() {
                String::new()
            } else {
                v.to_string()
            }
        }
        Scalar::Utf8(v) => v.clone(),
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;
    use std::path::Path;

    use kr_frame::{FrameError, Record};
    use kr_join::reconcile;
    use kr_types::Scalar;

    use super::{
        DataFormat, IoError, read_csv_str, read_json_str, read_jsonl_str, read_path,
        write_csv_string, write_reconciliation_json, write_records_json,
    };

    #[test]
    fn csv_cells_stay_text_and_empty_cells_are_null() {
        let input = "employee_id,score\n1,10\n\n2,\n 3 ,3.5\n";
        let dataset = read_csv_str("a.csv", input).expect("read");

        assert_eq!(dataset.header(), &["employee_id".to_owned(), "score".to_owned()]);
        assert_eq!(dataset.len(), 3, "blank line skipped");
        assert_eq!(dataset.records()[0].get("employee_id"), Some(&Scalar::from("1")));
        assert_eq!(dataset.records()[1].get("score"), Some(&Scalar::null()));
        assert_eq!(dataset.records()[2].get("employee_id"), Some(&Scalar::from(" 3 ")));
    }

    #[test]
    fn csv_short_rows_are_padded_and_long_rows_rejected() {
        let dataset = read_csv_str("a.csv", "id,name\n1\n").expect("short row");
        assert_eq!(dataset.records()[0].get("name"), Some(&Scalar::null()));

        let err = read_csv_str("a.csv", "id\n1,2\n").expect_err("long row");
        assert!(matches!(
            err,
            IoError::RaggedRow {
                row: 0,
                expected: 1,
                found: 2
            }
        ));
    }

    #[test]
    fn csv_requires_unique_headers() {
        assert!(matches!(read_csv_str("a.csv", ""), Err(IoError::MissingHeaders)));
        let err = read_csv_str("a.csv", "id,id\n1,2\n").expect_err("duplicate");
        assert!(matches!(err, IoError::Frame(FrameError::DuplicateHeader { .. })));
    }

    #[test]
    fn json_keeps_native_types_and_pads_absent_cells() {
        let input = r#"[{"id": 1, "ok": true, "w": 2.5}, {"id": "2", "extra": null}]"#;
        let dataset = read_json_str("b.json", input).expect("read");

        assert_eq!(
            dataset.header(),
            &["id".to_owned(), "ok".to_owned(), "w".to_owned(), "extra".to_owned()]
        );
        let first = &dataset.records()[0];
        assert_eq!(first.get("id"), Some(&Scalar::Int64(1)));
        assert_eq!(first.get("ok"), Some(&Scalar::Bool(true)));
        assert_eq!(first.get("w"), Some(&Scalar::Float64(2.5)));
        assert_eq!(first.get("extra"), Some(&Scalar::null()));
        assert_eq!(dataset.records()[1].get("id"), Some(&Scalar::from("2")));
    }

    #[test]
    fn json_shape_errors_are_reported() {
        assert!(matches!(read_json_str("x", r#"{"id":1}"#), Err(IoError::NotAnArray)));
        assert!(matches!(
            read_json_str("x", "[1]"),
            Err(IoError::NotAnObject { row: 0 })
        ));
        let err = read_json_str("x", r#"[{"id":1},{"id":[1]}]"#).expect_err("nested");
        assert!(matches!(err, IoError::UnsupportedValue { row: 1, ref column } if column == "id"));
        assert!(matches!(read_json_str("x", "[{"), Err(IoError::Json(_))));
    }

    #[test]
    fn jsonl_skips_blank_lines() {
        let dataset = read_jsonl_str("c.jsonl", "{\"k\":1}\n\n  \n{\"k\":2}\n").expect("read");
        assert_eq!(dataset.len(), 2);
        assert_eq!(dataset.records()[1].get("k"), Some(&Scalar::Int64(2)));
    }

    #[test]
    fn format_follows_extension() {
        assert_eq!(DataFormat::from_path(Path::new("a.JSON")).expect("json"), DataFormat::Json);
        assert_eq!(DataFormat::from_path(Path::new("a.ndjson")).expect("ndjson"), DataFormat::Jsonl);
        assert_eq!(DataFormat::from_path(Path::new("a.csv")).expect("csv"), DataFormat::Csv);
        assert!(matches!(
            DataFormat::from_path(Path::new("a.xlsx")),
            Err(IoError::UnsupportedFormat(_))
        ));
    }

    #[test]
    fn read_path_names_dataset_after_file() {
        let mut file = tempfile::Builder::new()
            .suffix(".csv")
            .tempfile()
            .expect("tempfile");
        writeln!(file, "emp_id,b_data_1").expect("write");
        writeln!(file, "7,x").expect("write");

        let dataset = read_path(file.path()).expect("read");
        let expected_name = file
            .path()
            .file_name()
            .expect("file name")
            .to_string_lossy()
            .into_owned();
        assert_eq!(dataset.name(), expected_name);
        assert_eq!(dataset.records()[0].get("emp_id"), Some(&Scalar::from("7")));
    }

    #[test]
    fn reconciliation_json_uses_plain_values() {
        let left = [Record::from_pairs([("id", Scalar::Int64(1)), ("w", Scalar::Float64(f64::NAN))])];
        let right = [Record::from_pairs([("id", 2_i64)])];
        let result = reconcile(&left, "id", &right, "id").expect("reconcile");

        let json = write_reconciliation_json(&result).expect("json");
        let value: serde_json::Value = serde_json::from_str(&json).expect("parse");
        assert_eq!(value["summary"]["only_in_left"], 1);
        assert_eq!(value["only_in_left"][0]["id"], 1);
        assert!(value["only_in_left"][0]["w"].is_null());
        assert_eq!(value["only_in_right"][0]["id"], 2);
        assert!(json.find("\"summary\"") < json.find("\"matches\""));
    }

    #[test]
    fn records_json_preserves_column_order() {
        let records = [Record::from_pairs([("z", 1_i64), ("a", 2_i64)])];
        let json = write_records_json(&records).expect("json");
        assert!(json.find("\"z\"") < json.find("\"a\""));
    }

    #[test]
    fn csv_writer_unions_columns_in_first_seen_order() {
        let records = [
            Record::from_pairs([("id", Scalar::Int64(1)), ("a", "x".into())]),
            Record::from_pairs([("id", Scalar::Int64(2)), ("b", Scalar::Bool(false))]),
        ];
        let out = write_csv_string(&records).expect("write");
        assert_eq!(out, "id,a,b\n1,x,\n2,,false\n");
        assert_eq!(write_csv_string(&[]).expect("empty"), "");
    }
}
