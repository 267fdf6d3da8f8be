#![forbid(unsafe_code)]

use std::collections::HashSet;

use indexmap::{IndexMap, IndexSet};
use indexmap::map::Iter;
use kr_types::{KeyComparison, KeyValue, Scalar};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FrameError {
    #[error("dataset {dataset:?}: header column {column:?} appears more than once")]
    DuplicateHeader { dataset: String, column: String },
    #[error("dataset {dataset:?}: header column at position {position} has an empty name")]
    EmptyHeaderName { dataset: String, position: usize },
    #[error("dataset {dataset:?}: row {row} has no value for column {column:?}")]
    MissingCell {
        dataset: String,
        row: usize,
        column: String,
    },
    #[error("dataset {dataset:?}: row {row} carries column {column:?} which is not in the header")]
    UnexpectedColumn {
        dataset: String,
        row: usize,
        column: String,
    },
}

/// One row: column name to cell, in insertion order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Record {
    fields: IndexMap<String, Scalar>,
}

impl Record {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            fields: IndexMap::with_capacity(capacity),
        }
    }

    pub fn from_pairs<K, V, I>(pairs: I) -> Self
    where
        K: Into<String>,
        V: Into<Scalar>,
        I: IntoIterator<Item = (K, V)>,
    {
        pairs.into_iter().collect()
    }

    /// Set a cell. An existing column keeps its position.
    pub fn insert(&mut self, column: impl Into<String>, value: impl Into<Scalar>) {
        self.fields.insert(column.into(), value.into());
    }

    #[must_use]
    pub fn get(&self, column: &str) -> Option<&Scalar> {
        self.fields.get(column)
    }

    #[must_use]
    pub fn contains_column(&self, column: &str) -> bool {
        self.fields.contains_key(column)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    pub fn iter(&self) -> Iter<'_, String, Scalar> {
        self.fields.iter()
    }

    /// Join identity of this row under `column`. An absent column behaves
    /// exactly like a null cell.
    #[must_use]
    pub fn key_value(&self, column: &str, comparison: KeyComparison) -> Option<KeyValue<'_>> {
        self.get(column)
            .and_then(|value| KeyValue::from_scalar(value, comparison))
    }

    /// Shallow merge: `self`'s columns first, then `other`'s. On a name
    /// collision the column stays where `self` had it and takes `other`'s
    /// value.
    #[must_use]
    pub fn merged_with(&self, other: &Self) -> Self {
        let mut fields = IndexMap::with_capacity(self.fields.len() + other.fields.len());
        for (column, value) in &self.fields {
            fields.insert(column.clone(), value.clone());
        }
        for (column, value) in &other.fields {
            fields.insert(column.clone(), value.clone());
        }
        Self { fields }
    }
}

impl<K: Into<String>, V: Into<Scalar>> FromIterator<(K, V)> for Record {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            fields: iter
                .into_iter()
                .map(|(column, value)| (column.into(), value.into()))
                .collect(),
        }
    }
}

impl<'a> IntoIterator for &'a Record {
    type Item = (&'a String, &'a Scalar);
    type IntoIter = Iter<'a, String, Scalar>;

    fn into_iter(self) -> Self::IntoIter {
        self.fields.iter()
    }
}

/// Rows sharing one header, as handed over by a loader.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dataset {
    name: String,
    header: Vec<String>,
    records: Vec<Record>,
}

impl Dataset {
    /// Build a dataset whose rows carry exactly the header's columns.
    pub fn new(
        name: impl Into<String>,
        header: Vec<String>,
        records: Vec<Record>,
    ) -> Result<Self, FrameError> {
        let name = name.into();
        validate_header(&name, &header)?;

        for (row, record) in records.iter().enumerate() {
            if let Some(column) = header.iter().find(|column| !record.contains_column(column)) {
                return Err(FrameError::MissingCell {
                    dataset: name,
                    row,
                    column: column.clone(),
                });
            }
            if record.len() != header.len() {
                let known = header.iter().map(String::as_str).collect::<HashSet<_>>();
                if let Some(column) = record.columns().find(|column| !known.contains(column)) {
                    return Err(FrameError::UnexpectedColumn {
                        dataset: name,
                        row,
                        column: column.to_owned(),
                    });
                }
            }
        }

        Ok(Self {
            name,
            header,
            records,
        })
    }

    /// Derive the header from first-seen column order and pad every row with
    /// nulls for the columns it lacks. Rows are reordered to header order.
    #[must_use]
    pub fn from_records(name: impl Into<String>, records: Vec<Record>) -> Self {
        let mut header = IndexSet::<String>::new();
        for record in &records {
            for column in record.columns() {
                if !header.contains(column) {
                    header.insert(column.to_owned());
                }
            }
        }
        let header = header.into_iter().collect::<Vec<_>>();

        let records = records
            .into_iter()
            .map(|record| {
                if record.columns().eq(header.iter().map(String::as_str)) {
                    return record;
                }
                let mut padded = Record::with_capacity(header.len());
                for column in &header {
                    padded.insert(
                        column.clone(),
                        record.get(column).cloned().unwrap_or_else(Scalar::null),
                    );
                }
                padded
            })
            .collect();

        Self {
            name: name.into(),
            header,
            records,
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn header(&self) -> &[String] {
        &self.header
    }

    #[must_use]
    pub fn has_column(&self, column: &str) -> bool {
        self.header.iter().any(|name| name == column)
    }

    #[must_use]
    pub fn records(&self) -> &[Record] {
        &self.records
    }

    #[must_use]
    pub fn into_records(self) -> Vec<Record> {
        self.records
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

fn validate_header(dataset: &str, header: &[String]) -> Result<(), FrameError> {
    let mut seen = HashSet::with_capacity(header.len());
    for (position, column) in header.iter().enumerate() {
        if column.trim().is_empty() {
            return Err(FrameError::EmptyHeaderName {
                dataset: dataset.to_owned(),
                position,
            });
        }
        if !seen.insert(column.as_str()) {
            return Err(FrameError::DuplicateHeader {
                dataset: dataset.to_owned(),
                column: column.clone(),
            });
        }
    }
    Ok(())
}
