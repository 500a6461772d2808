//! Tables and typed cells of the memory server.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};

use super::messages::Fault;
use crate::charset::Charset;
use crate::ibase::{
    BLOB_SUB_TYPE_TEXT, ISC_BAD_SEGSTR_ID, ISC_NOT_VALID, ISC_TRANSLITERATION_FAILED, QuadId,
    SQL_BLOB, Xsqlvar,
};
use crate::types::{SqlType, Value};

/// Column of a memory table.
///
/// Names given to the constructors are upper-cased, like unquoted identifiers in DDL.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnDef {
    pub name: String,
    pub sql_type: SqlType,
    /// Declared byte length (characters for text columns)
    pub length: i16,
    pub scale: i16,
    /// Blob sub type, 1 for text
    pub sub_type: i16,
    pub nullable: bool,
}

impl ColumnDef {
    fn new(name: impl Into<String>, sql_type: SqlType, length: i16) -> Self {
        Self {
            name: name.into().to_ascii_uppercase(),
            sql_type,
            length,
            scale: 0,
            sub_type: 0,
            nullable: true,
        }
    }

    #[must_use]
    pub fn varchar(name: impl Into<String>, length: i16) -> Self {
        Self::new(name, SqlType::VarText, length)
    }

    #[must_use]
    pub fn char(name: impl Into<String>, length: i16) -> Self {
        Self::new(name, SqlType::Text, length)
    }

    #[must_use]
    pub fn smallint(name: impl Into<String>) -> Self {
        Self::new(name, SqlType::Short, 2)
    }

    #[must_use]
    pub fn integer(name: impl Into<String>) -> Self {
        Self::new(name, SqlType::Long, 4)
    }

    #[must_use]
    pub fn bigint(name: impl Into<String>) -> Self {
        Self::new(name, SqlType::Int64, 8)
    }

    /// Exact numeric stored as a 64-bit integer with `digits` decimal places.
    #[must_use]
    pub fn numeric(name: impl Into<String>, digits: i16) -> Self {
        Self {
            scale: -digits,
            ..Self::new(name, SqlType::Int64, 8)
        }
    }

    #[must_use]
    pub fn float(name: impl Into<String>) -> Self {
        Self::new(name, SqlType::Float, 4)
    }

    #[must_use]
    pub fn double(name: impl Into<String>) -> Self {
        Self::new(name, SqlType::Double, 8)
    }

    #[must_use]
    pub fn date(name: impl Into<String>) -> Self {
        Self::new(name, SqlType::Date, 4)
    }

    #[must_use]
    pub fn time(name: impl Into<String>) -> Self {
        Self::new(name, SqlType::Time, 4)
    }

    #[must_use]
    pub fn timestamp(name: impl Into<String>) -> Self {
        Self::new(name, SqlType::Timestamp, 8)
    }

    #[must_use]
    pub fn boolean(name: impl Into<String>) -> Self {
        Self::new(name, SqlType::Boolean, 1)
    }

    /// Binary blob; rows store its id.
    #[must_use]
    pub fn blob(name: impl Into<String>) -> Self {
        Self::new(name, SqlType::Blob, 8)
    }

    /// Text blob, kept in the attachment's character set.
    #[must_use]
    pub fn text_blob(name: impl Into<String>) -> Self {
        Self {
            sub_type: BLOB_SUB_TYPE_TEXT,
            ..Self::new(name, SqlType::Blob, 8)
        }
    }

    #[must_use]
    pub fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }

    /// Descriptor slot for this column, labelled `label` and owned by `relation`.
    pub(super) fn slot(&self, label: &str, relation: &str) -> Xsqlvar {
        Xsqlvar {
            sqltype: self.sql_type.tag() | i16::from(self.nullable),
            sqlscale: self.scale,
            sqlsubtype: self.sub_type,
            sqllen: self.length,
            sqlind: 0,
            sqlname: self.name.clone(),
            relname: relation.to_string(),
            ownname: String::new(),
            aliasname: label.to_string(),
            data: Vec::new(),
        }
    }

    /// Convert `value` to this column's type, enforcing length and nullability.
    #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation)]
    pub(super) fn coerce(&self, value: Value) -> Result<Value, Fault> {
        if value.is_null() {
            return if self.nullable {
                Ok(Value::Null)
            } else {
                Err(Fault::new(ISC_NOT_VALID)
                    .arg(self.name.clone())
                    .arg("*** null ***"))
            };
        }

        let len = usize::try_from(self.length).unwrap_or(0);
        match self.sql_type {
            SqlType::VarText | SqlType::Text => {
                let text = match value {
                    Value::Text(s) => s,
                    Value::Raw { .. } | Value::Binary(_) => return Err(mismatch(&value)),
                    other => other.to_string(),
                };
                if text.chars().count() > len {
                    return Err(Fault::truncation());
                }
                if self.sql_type == SqlType::Text {
                    Ok(Value::Text(format!("{text:<len$}")))
                } else {
                    Ok(Value::Text(text))
                }
            }
            SqlType::Short | SqlType::Long | SqlType::Int64 => {
                let (min, max) = match self.sql_type {
                    SqlType::Short => (i64::from(i16::MIN), i64::from(i16::MAX)),
                    SqlType::Long => (i64::from(i32::MIN), i64::from(i32::MAX)),
                    _ => (i64::MIN, i64::MAX),
                };
                let factor = 10f64.powi(-i32::from(self.scale));
                let logical = match &value {
                    Value::Int(i) if self.scale == 0 => return in_range(*i, min, max),
                    Value::Int(i) => *i as f64,
                    Value::Float(f) => *f,
                    Value::Text(s) => s.trim().parse::<f64>().map_err(|_| mismatch(&value))?,
                    _ => return Err(mismatch(&value)),
                };
                let raw = (logical * factor).round();
                if !raw.is_finite() || raw < min as f64 || raw > max as f64 {
                    return Err(Fault::new(crate::ibase::ISC_ARITH_EXCEPT));
                }
                if self.scale == 0 {
                    Ok(Value::Int(raw as i64))
                } else {
                    Ok(Value::Float(raw / factor))
                }
            }
            SqlType::Float | SqlType::Double => {
                let f = match &value {
                    Value::Int(i) => *i as f64,
                    Value::Float(f) => *f,
                    Value::Text(s) => s.trim().parse::<f64>().map_err(|_| mismatch(&value))?,
                    _ => return Err(mismatch(&value)),
                };
                if self.sql_type == SqlType::Float {
                    Ok(Value::Float(f64::from(f as f32)))
                } else {
                    Ok(Value::Float(f))
                }
            }
            SqlType::Date => match value {
                Value::Date(d) => Ok(Value::Date(d)),
                Value::Timestamp(ts) => Ok(Value::Date(ts.date())),
                Value::Text(ref s) => NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
                    .map(Value::Date)
                    .map_err(|_| mismatch(&value)),
                other => Err(mismatch(&other)),
            },
            SqlType::Time => match value {
                Value::Time(t) => Ok(Value::Time(t)),
                Value::Timestamp(ts) => Ok(Value::Time(ts.time())),
                Value::Text(ref s) => NaiveTime::parse_from_str(s.trim(), "%H:%M:%S%.f")
                    .map(Value::Time)
                    .map_err(|_| mismatch(&value)),
                other => Err(mismatch(&other)),
            },
            SqlType::Timestamp => match value {
                Value::Timestamp(ts) => Ok(Value::Timestamp(ts)),
                Value::Date(d) => Ok(Value::Timestamp(d.and_time(NaiveTime::MIN))),
                Value::Text(ref s) => {
                    let s = s.trim();
                    NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f")
                        .or_else(|_| {
                            NaiveDate::parse_from_str(s, "%Y-%m-%d")
                                .map(|d| d.and_time(NaiveTime::MIN))
                        })
                        .map(Value::Timestamp)
                        .map_err(|_| mismatch(&value))
                }
                other => Err(mismatch(&other)),
            },
            SqlType::Boolean => match value {
                Value::Bool(b) => Ok(Value::Bool(b)),
                Value::Int(i) => Ok(Value::Bool(i != 0)),
                Value::Text(ref s) => match s.trim().to_ascii_uppercase().as_str() {
                    "TRUE" => Ok(Value::Bool(true)),
                    "FALSE" => Ok(Value::Bool(false)),
                    _ => Err(mismatch(&value)),
                },
                other => Err(mismatch(&other)),
            },
            // contents are resolved against the database's blob store
            SqlType::Blob => match value {
                Value::Text(_) | Value::Binary(_) | Value::Raw { .. } => Ok(value),
                other => Err(mismatch(&other)),
            },
            SqlType::Unknown(_) => Ok(value),
        }
    }
}

fn in_range(i: i64, min: i64, max: i64) -> Result<Value, Fault> {
    if (min..=max).contains(&i) {
        Ok(Value::Int(i))
    } else {
        Err(Fault::new(crate::ibase::ISC_ARITH_EXCEPT))
    }
}

fn mismatch(value: &Value) -> Fault {
    Fault::conversion(value.to_string())
}

/// Order two stored values of the same column; `None` when either is NULL.
pub(super) fn compare(left: &Value, right: &Value) -> Option<Ordering> {
    match (left, right) {
        (Value::Null, _) | (_, Value::Null) => None,
        (Value::Text(a), Value::Text(b)) => Some(a.trim_end().cmp(b.trim_end())),
        (Value::Int(a), Value::Int(b)) => Some(a.cmp(b)),
        (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
        (Value::Date(a), Value::Date(b)) => Some(a.cmp(b)),
        (Value::Time(a), Value::Time(b)) => Some(a.cmp(b)),
        (Value::Timestamp(a), Value::Timestamp(b)) => Some(a.cmp(b)),
        (a, b) => a.as_float()?.partial_cmp(&b.as_float()?),
    }
}

#[derive(Debug, Clone, PartialEq)]
pub(super) struct Table {
    pub name: String,
    pub columns: Vec<ColumnDef>,
    pub rows: Vec<Vec<Value>>,
}

impl Table {
    pub(super) fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }
}

pub(super) const DEFAULT_PAGE_SIZE: u32 = 8192;

/// Every table of one database, keyed by name, and the blobs its rows refer to.
#[derive(Debug, Clone, PartialEq)]
pub(super) struct Database {
    pub tables: BTreeMap<String, Table>,
    pub blobs: BTreeMap<u64, Vec<u8>>,
    pub(super) next_blob: u64,
    pub page_size: u32,
}

impl Default for Database {
    fn default() -> Self {
        Self {
            tables: BTreeMap::new(),
            blobs: BTreeMap::new(),
            next_blob: 0,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

impl Database {
    /// Reserve an id for a blob that is still being written.
    pub(super) fn new_blob_id(&mut self) -> QuadId {
        self.next_blob += 1;
        self.next_blob.to_le_bytes()
    }

    pub(super) fn blob(&self, id: &QuadId) -> Option<&Vec<u8>> {
        self.blobs.get(&u64::from_le_bytes(*id))
    }

    /// The id a blob column stores for `value`: text and bytes become a new blob, an id
    /// must name an existing one.
    pub(super) fn keep_blob(&mut self, value: Value, charset: &Charset) -> Result<Value, Fault> {
        let contents = match value {
            Value::Null => return Ok(Value::Null),
            Value::Raw { ref bytes, .. } => {
                let id: QuadId = bytes
                    .as_slice()
                    .try_into()
                    .map_err(|_| Fault::new(ISC_BAD_SEGSTR_ID))?;
                if self.blob(&id).is_none() {
                    return Err(Fault::new(ISC_BAD_SEGSTR_ID));
                }
                return Ok(value);
            }
            Value::Text(text) => charset
                .encode(&text)
                .map_err(|_| Fault::new(ISC_TRANSLITERATION_FAILED))?,
            Value::Binary(bytes) => bytes,
            other => return Err(mismatch(&other)),
        };
        let id = self.new_blob_id();
        self.blobs.insert(u64::from_le_bytes(id), contents);
        Ok(Value::Raw {
            sql_type: SQL_BLOB,
            bytes: id.to_vec(),
        })
    }
}
