#![forbid(unsafe_code)]

use std::borrow::Cow;
use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DType {
    Null,
    Bool,
    Int64,
    Float64,
    Utf8,
}

impl fmt::Display for DType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Null => "null",
            Self::Bool => "bool",
            Self::Int64 => "int64",
            Self::Float64 => "float64",
            Self::Utf8 => "utf8",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NullKind {
    Null,
    NaN,
}

/// A single typed cell value.
///
/// Typing is decided by whoever produced the record; nothing in this crate
/// re-types text into numbers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Scalar {
    Null(NullKind),
    Bool(bool),
    Int64(i64),
    Float64(f64),
    Utf8(String),
}

impl Scalar {
    #[must_use]
    pub fn null() -> Self {
        Self::Null(NullKind::Null)
    }

    #[must_use]
    pub fn dtype(&self) -> DType {
        match self {
            Self::Null(_) => DType::Null,
            Self::Bool(_) => DType::Bool,
            Self::Int64(_) => DType::Int64,
            Self::Float64(_) => DType::Float64,
            Self::Utf8(_) => DType::Utf8,
        }
    }

    #[must_use]
    pub fn is_missing(&self) -> bool {
        match self {
            Self::Null(_) => true,
            Self::Float64(v) => v.is_nan(),
            _ => false,
        }
    }

    /// Canonical text form used by [`KeyComparison::Text`].
    ///
    /// Integral floats render without a fractional part so that `1.0` and `1`
    /// agree. Missing values have no text form.
    #[must_use]
    pub fn render_text(&self) -> Option<Cow<'_, str>> {
        match self {
            Self::Null(_) => None,
            Self::Bool(v) => Some(Cow::Borrowed(if *v { "true" } else { "false" })),
            Self::Int64(v) => Some(Cow::Owned(v.to_string())),
            Self::Float64(v) => {
                if v.is_nan() {
                    None
                } else if v.is_finite() && v.fract() == 0.0 && v.abs() < MAX_EXACT_FLOAT_INT {
                    Some(Cow::Owned((*v as i64).to_string()))
                } else {
                    Some(Cow::Owned(v.to_string()))
                }
            }
            Self::Utf8(v) => Some(Cow::Borrowed(v.as_str())),
        }
    }
}

// 2^53: beyond this not every integer is representable as f64.
const MAX_EXACT_FLOAT_INT: f64 = 9_007_199_254_740_992.0;

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null(NullKind::Null) => f.write_str("null"),
            Self::Null(NullKind::NaN) => f.write_str("NaN"),
            Self::Bool(v) => write!(f, "{v}"),
            Self::Int64(v) => write!(f, "{v}"),
            Self::Float64(v) => write!(f, "{v}"),
            Self::Utf8(v) => write!(f, "{v:?}"),
        }
    }
}

impl From<bool> for Scalar {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for Scalar {
    fn from(value: i64) -> Self {
        Self::Int64(value)
    }
}

impl From<f64> for Scalar {
    fn from(value: f64) -> Self {
        Self::Float64(value)
    }
}

impl From<&str> for Scalar {
    fn from(value: &str) -> Self {
        Self::Utf8(value.to_owned())
    }
}

impl From<String> for Scalar {
    fn from(value: String) -> Self {
        Self::Utf8(value)
    }
}

impl<T: Into<Scalar>> From<Option<T>> for Scalar {
    fn from(value: Option<T>) -> Self {
        value.map_or_else(Self::null, Into::into)
    }
}

/// How two key cells are compared when probing the join index.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyComparison {
    /// Exact type and value: `Int64(1)` and `Utf8("1")` are different keys.
    #[default]
    Scalar,
    /// Both sides are rendered with [`Scalar::render_text`] first.
    Text,
}

/// Hashable join identity extracted from a key cell.
///
/// Borrows string data from the record it was taken from so building an
/// index does not clone key text.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum KeyValue<'a> {
    Bool(bool),
    Int64(i64),
    FloatBits(u64),
    Utf8(Cow<'a, str>),
}

impl<'a> KeyValue<'a> {
    /// Project a cell onto a join identity. Missing cells (null or NaN) have
    /// none and therefore never match anything.
    #[must_use]
    pub fn from_scalar(value: &'a Scalar, comparison: KeyComparison) -> Option<Self> {
        if value.is_missing() {
            return None;
        }

        match comparison {
            KeyComparison::Text => value.render_text().map(Self::Utf8),
            KeyComparison::Scalar => match value {
                Scalar::Null(_) => None,
                Scalar::Bool(v) => Some(Self::Bool(*v)),
                Scalar::Int64(v) => Some(Self::Int64(*v)),
                // -0.0 and 0.0 compare equal as floats, so they share a key.
                Scalar::Float64(v) if *v == 0.0 => Some(Self::FloatBits(0.0_f64.to_bits())),
                Scalar::Float64(v) => Some(Self::FloatBits(v.to_bits())),
                Scalar::Utf8(v) => Some(Self::Utf8(Cow::Borrowed(v.as_str()))),
            },
        }
    }

}

impl fmt::Display for KeyValue<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(v) => write!(f, "{v}"),
            Self::Int64(v) => write!(f, "{v}"),
            Self::FloatBits(bits) => write!(f, "{}", f64::from_bits(*bits)),
            Self::Utf8(v) => write!(f, "{v:?}"),
        }
    }
}
