//! Field values as seen by merge policies

use chrono::{DateTime, FixedOffset, Local, NaiveDateTime, TimeZone, Utc};

/// Zone assumed for timestamps stored without one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AssumedZone {
    Utc,
    #[default]
    Local,
}

/// A single field read out of a record.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    /// Timestamp with a known offset
    Zoned(DateTime<FixedOffset>),
    /// Timestamp without zone information
    Unzoned(NaiveDateTime),
    Bytes(Vec<u8>),
}

impl FieldValue {
    pub fn is_null(&self) -> bool {
        matches!(self, FieldValue::Null)
    }

    /// Numeric view used by step policies. Non-numeric values have none.
    pub fn numeric(&self) -> Option<f64> {
        match self {
            FieldValue::Int(v) => Some(*v as f64),
            FieldValue::Float(v) if !v.is_nan() => Some(*v),
            _ => None,
        }
    }

    /// Absolute instant in UTC. Unzoned values take `assumed` first.
    ///
    /// Returns `None` for non-temporal values and for local times that do
    /// not exist (skipped by a daylight-saving transition).
    pub fn instant(&self, assumed: AssumedZone) -> Option<DateTime<Utc>> {
        match self {
            FieldValue::Zoned(dt) => Some(dt.with_timezone(&Utc)),
            FieldValue::Unzoned(naive) => match assumed {
                AssumedZone::Utc => Some(Utc.from_utc_datetime(naive)),
                AssumedZone::Local => Local
                    .from_local_datetime(naive)
                    .earliest()
                    .map(|dt| dt.with_timezone(&Utc)),
            },
            _ => None,
        }
    }
}

impl From<bool> for FieldValue {
    fn from(v: bool) -> Self {
        FieldValue::Bool(v)
    }
}

impl From<i32> for FieldValue {
    fn from(v: i32) -> Self {
        FieldValue::Int(v.into())
    }
}

impl From<i64> for FieldValue {
    fn from(v: i64) -> Self {
        FieldValue::Int(v)
    }
}

impl From<f64> for FieldValue {
    fn from(v: f64) -> Self {
        FieldValue::Float(v)
    }
}

impl From<String> for FieldValue {
    fn from(v: String) -> Self {
        FieldValue::Text(v)
    }
}

impl From<&str> for FieldValue {
    fn from(v: &str) -> Self {
        FieldValue::Text(v.to_string())
    }
}

impl From<Vec<u8>> for FieldValue {
    fn from(v: Vec<u8>) -> Self {
        FieldValue::Bytes(v)
    }
}

impl From<DateTime<FixedOffset>> for FieldValue {
    fn from(v: DateTime<FixedOffset>) -> Self {
        FieldValue::Zoned(v)
    }
}

impl From<DateTime<Utc>> for FieldValue {
    fn from(v: DateTime<Utc>) -> Self {
        FieldValue::Zoned(v.fixed_offset())
    }
}

impl From<NaiveDateTime> for FieldValue {
    fn from(v: NaiveDateTime) -> Self {
        FieldValue::Unzoned(v)
    }
}

impl<T: Into<FieldValue>> From<Option<T>> for FieldValue {
    fn from(v: Option<T>) -> Self {
        v.map_or(FieldValue::Null, Into::into)
    }
}
