use std::fmt;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use serde::Serialize;

use crate::ibase::{
    SQL_BLOB, SQL_BOOLEAN, SQL_DOUBLE, SQL_FLOAT, SQL_INT64, SQL_LONG, SQL_SHORT, SQL_TEXT, SQL_TIMESTAMP,
    SQL_TYPE_DATE, SQL_TYPE_TIME, SQL_VARYING,
};

/// Values decoded from a row or bound as statement parameters.
///
/// ```rust
/// use isc_binding::prelude::*;
///
/// let params = vec![
///     Value::from("Euro"),
///     Value::from("Real"),
///     Value::Float(0.5),
/// ];
/// # let _ = params;
/// ```
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Value {
    /// NULL value
    Null,
    /// Fixed or variable length text
    Text(String),
    /// Integer value (SMALLINT, INTEGER, BIGINT with scale 0)
    Int(i64),
    /// Floating point value, also used for scaled integers
    Float(f64),
    Bool(bool),
    Date(NaiveDate),
    Time(NaiveTime),
    Timestamp(NaiveDateTime),
    /// Contents of a binary blob (`BLOB SUB_TYPE 0`)
    Binary(Vec<u8>),
    /// Slot contents of a type this layer does not interpret (arrays, quads, ...)
    Raw { sql_type: i16, bytes: Vec<u8> },
}

impl Value {
    /// Check if this value is NULL
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        if let Value::Text(value) = self {
            Some(value)
        } else {
            None
        }
    }

    #[must_use]
    pub fn as_int(&self) -> Option<i64> {
        if let Value::Int(value) = self {
            Some(*value)
        } else {
            None
        }
    }

    #[must_use]
    pub fn as_float(&self) -> Option<f64> {
        match self {
            Value::Float(value) => Some(*value),
            #[allow(clippy::cast_precision_loss)]
            Value::Int(value) => Some(*value as f64),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        if let Value::Bool(value) = self {
            Some(*value)
        } else {
            None
        }
    }

    #[must_use]
    pub fn as_date(&self) -> Option<NaiveDate> {
        match self {
            Value::Date(value) => Some(*value),
            Value::Timestamp(value) => Some(value.date()),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_time(&self) -> Option<NaiveTime> {
        match self {
            Value::Time(value) => Some(*value),
            Value::Timestamp(value) => Some(value.time()),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_timestamp(&self) -> Option<NaiveDateTime> {
        if let Value::Timestamp(value) = self {
            Some(*value)
        } else {
            None
        }
    }

    #[must_use]
    pub fn as_binary(&self) -> Option<&[u8]> {
        if let Value::Binary(bytes) = self {
            Some(bytes)
        } else {
            None
        }
    }

    #[must_use]
    pub fn as_raw(&self) -> Option<(i16, &[u8])> {
        if let Value::Raw { sql_type, bytes } = self {
            Some((*sql_type, bytes))
        } else {
            None
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("(null)"),
            Value::Text(s) => f.write_str(s),
            Value::Int(i) => write!(f, "{i}"),
            Value::Float(x) => write!(f, "{x}"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Date(d) => write!(f, "{d}"),
            Value::Time(t) => write!(f, "{t}"),
            Value::Timestamp(ts) => write!(f, "{ts}"),
            Value::Binary(bytes) => write!(f, "<{} bytes>", bytes.len()),
            Value::Raw { sql_type, bytes } => write!(f, "<type {sql_type}, {} bytes>", bytes.len()),
        }
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Self::Text(value.to_owned())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Self::Int(value.into())
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<f32> for Value {
    fn from(value: f32) -> Self {
        Self::Float(value.into())
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<NaiveDate> for Value {
    fn from(value: NaiveDate) -> Self {
        Self::Date(value)
    }
}

impl From<NaiveTime> for Value {
    fn from(value: NaiveTime) -> Self {
        Self::Time(value)
    }
}

impl From<NaiveDateTime> for Value {
    fn from(value: NaiveDateTime) -> Self {
        Self::Timestamp(value)
    }
}

impl From<Vec<u8>> for Value {
    fn from(value: Vec<u8>) -> Self {
        Self::Binary(value)
    }
}

impl From<&[u8]> for Value {
    fn from(value: &[u8]) -> Self {
        Self::Binary(value.to_vec())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Null, Into::into)
    }
}

/// Closed set of slot types, decoded from the descriptor's type tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum SqlType {
    /// CHAR: fixed length, space padded
    Text,
    /// VARCHAR: length prefixed
    VarText,
    Short,
    Long,
    Int64,
    /// 32-bit IEEE-754
    Float,
    /// 64-bit IEEE-754
    Double,
    Date,
    Time,
    Timestamp,
    Boolean,
    /// Blob id; the contents are read through the blob calls
    Blob,
    /// Any other tag (array, quad, ...), nullable bit removed
    Unknown(i16),
}

impl SqlType {
    /// Map a descriptor type tag, ignoring the nullable bit.
    #[must_use]
    pub fn from_tag(tag: i16) -> Self {
        match tag & !1 {
            SQL_TEXT => SqlType::Text,
            SQL_VARYING => SqlType::VarText,
            SQL_SHORT => SqlType::Short,
            SQL_LONG => SqlType::Long,
            SQL_INT64 => SqlType::Int64,
            SQL_FLOAT => SqlType::Float,
            SQL_DOUBLE => SqlType::Double,
            SQL_TYPE_DATE => SqlType::Date,
            SQL_TYPE_TIME => SqlType::Time,
            SQL_TIMESTAMP => SqlType::Timestamp,
            SQL_BOOLEAN => SqlType::Boolean,
            SQL_BLOB => SqlType::Blob,
            other => SqlType::Unknown(other),
        }
    }

    /// Type tag without the nullable bit.
    #[must_use]
    pub fn tag(self) -> i16 {
        match self {
            SqlType::Text => SQL_TEXT,
            SqlType::VarText => SQL_VARYING,
            SqlType::Short => SQL_SHORT,
            SqlType::Long => SQL_LONG,
            SqlType::Int64 => SQL_INT64,
            SqlType::Float => SQL_FLOAT,
            SqlType::Double => SQL_DOUBLE,
            SqlType::Date => SQL_TYPE_DATE,
            SqlType::Time => SQL_TYPE_TIME,
            SqlType::Timestamp => SQL_TIMESTAMP,
            SqlType::Boolean => SQL_BOOLEAN,
            SqlType::Blob => SQL_BLOB,
            SqlType::Unknown(tag) => tag,
        }
    }
}

/// Shape of one output column as reported by describe.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ColumnInfo {
    pub name: String,
    pub relation: String,
    pub sql_type: SqlType,
    /// Blob sub type (1 is text); zero for other types
    pub sub_type: i16,
    pub length: i16,
    pub scale: i16,
    pub nullable: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ibase::SQL_ARRAY;

    #[test]
    fn tags_ignore_the_nullable_bit() {
        assert_eq!(SqlType::from_tag(SQL_VARYING + 1), SqlType::VarText);
        assert_eq!(SqlType::from_tag(SQL_FLOAT), SqlType::Float);
        assert_eq!(SqlType::from_tag(SQL_TYPE_DATE + 1), SqlType::Date);
        assert_eq!(SqlType::from_tag(SQL_BLOB + 1), SqlType::Blob);
        assert_eq!(SqlType::from_tag(SQL_ARRAY + 1), SqlType::Unknown(SQL_ARRAY));
        assert_eq!(SqlType::Unknown(SQL_ARRAY).tag(), SQL_ARRAY);
        assert_eq!(SqlType::from_tag(SqlType::Timestamp.tag()), SqlType::Timestamp);
    }

    #[test]
    fn conversions_and_accessors() {
        assert_eq!(Value::from("Dollar").as_text(), Some("Dollar"));
        assert_eq!(Value::from(10).as_int(), Some(10));
        assert_eq!(Value::from(10).as_float(), Some(10.0));
        assert_eq!(Value::from(None::<i64>), Value::Null);
        assert!(Value::Null.is_null());
        assert_eq!(Value::from(true).as_bool(), Some(true));

        let day = NaiveDate::from_ymd_opt(2020, 2, 29).unwrap();
        assert_eq!(Value::from(day).as_date(), Some(day));
        assert_eq!(Value::Text("x".into()).as_date(), None);
    }

    #[test]
    fn display_is_plain() {
        assert_eq!(Value::Null.to_string(), "(null)");
        assert_eq!(Value::Float(10.0).to_string(), "10");
        assert_eq!(
            Value::Raw {
                sql_type: SQL_ARRAY,
                bytes: vec![0; 8]
            }
            .to_string(),
            "<type 540, 8 bytes>"
        );
        assert_eq!(Value::from(vec![1u8, 2, 3]).to_string(), "<3 bytes>");
        assert_eq!(Value::from(&b"ab"[..]).as_binary(), Some(&b"ab"[..]));
    }
}
