//! Encoding of [`Value`]s into input slots.
//!
//! Every bound slot takes the natural type of its value; the server converts to the
//! declared parameter type on execute.

use crate::charset::Charset;
use crate::date_time::{encode_date, encode_time, encode_timestamp};
use crate::error::{IscError, Result};
use crate::ibase::{
    MAX_TEXT_LENGTH, SQL_BOOLEAN, SQL_DOUBLE, SQL_INT64, SQL_TIMESTAMP, SQL_TYPE_DATE,
    SQL_TYPE_TIME, SQL_VARYING, Xsqlda, Xsqlvar,
};
use crate::status::{Diagnostics, SQLCODE_SQLDA};
use crate::types::Value;

/// Server code for string truncation and transliteration failures.
pub(crate) const SQLCODE_TRUNCATION: i32 = -802;

/// Encode `value` into `var`, replacing its type, length and buffer.
///
/// # Arguments
/// * `var` - a described input slot; only its nullable bit and base type survive a NULL.
/// * `value` - the parameter. Text is encoded with `charset`; binary data is sent as
///   VARYING bytes.
/// * `charset` - connection charset.
///
/// # Errors
/// Returns [`IscError::Bind`] when text cannot be encoded or exceeds the maximum VARYING
/// length, or when raw bytes do not fit a slot of their type.
pub fn bind_value(var: &mut Xsqlvar, value: &Value, charset: &Charset) -> Result<()> {
    let (tag, data) = match value {
        Value::Null => {
            var.sqltype = var.base_type() | 1;
            var.allocate();
            var.sqlind = -1;
            return Ok(());
        }
        Value::Text(s) => {
            let bytes = charset.encode(s).map_err(|e| {
                IscError::Bind(Diagnostics::client(
                    SQLCODE_TRUNCATION,
                    format!("Cannot transliterate character to {charset}: {e}"),
                ))
            })?;
            (SQL_VARYING, varying(&bytes)?)
        }
        Value::Binary(bytes) => (SQL_VARYING, varying(bytes)?),
        Value::Int(i) => (SQL_INT64, i.to_ne_bytes().to_vec()),
        Value::Float(f) => (SQL_DOUBLE, f.to_ne_bytes().to_vec()),
        Value::Bool(b) => (SQL_BOOLEAN, vec![u8::from(*b)]),
        Value::Date(d) => (SQL_TYPE_DATE, encode_date(*d).to_ne_bytes().to_vec()),
        Value::Time(t) => (SQL_TYPE_TIME, encode_time(*t).to_ne_bytes().to_vec()),
        Value::Timestamp(ts) => {
            let (days, ticks) = encode_timestamp(*ts);
            let mut data = days.to_ne_bytes().to_vec();
            data.extend_from_slice(&ticks.to_ne_bytes());
            (SQL_TIMESTAMP, data)
        }
        Value::Raw { sql_type, bytes } => {
            let tag = *sql_type & !1;
            if tag == SQL_VARYING {
                check_prefix(bytes)?;
            }
            (tag, bytes.clone())
        }
    };

    // VARYING slots declare the payload length, without the 2-byte prefix
    let payload = if tag == SQL_VARYING {
        data.len().saturating_sub(2)
    } else {
        data.len()
    };
    var.sqllen = i16::try_from(payload).map_err(|_| {
        IscError::Bind(Diagnostics::client(
            SQLCODE_SQLDA,
            format!("parameter of {payload} bytes does not fit a slot"),
        ))
    })?;
    var.sqltype = tag | 1;
    var.sqlscale = 0;
    var.sqlind = 0;
    var.data = data;
    Ok(())
}

/// Length-prefixed VARYING buffer for `bytes`.
fn varying(bytes: &[u8]) -> Result<Vec<u8>> {
    if bytes.len() > MAX_TEXT_LENGTH {
        return Err(IscError::Bind(Diagnostics::client(
            SQLCODE_TRUNCATION,
            format!(
                "string right truncation: {} bytes exceeds the limit of {MAX_TEXT_LENGTH}",
                bytes.len()
            ),
        )));
    }
    let prefix = u16::try_from(bytes.len()).unwrap_or(u16::MAX);
    let mut data = Vec::with_capacity(bytes.len() + 2);
    data.extend_from_slice(&prefix.to_ne_bytes());
    data.extend_from_slice(bytes);
    Ok(data)
}

/// A raw VARYING buffer must carry its own prefix, matching the payload that follows.
fn check_prefix(data: &[u8]) -> Result<()> {
    let malformed = |detail: String| {
        IscError::Bind(Diagnostics::client(
            SQLCODE_SQLDA,
            format!("raw VARYING parameter {detail}"),
        ))
    };
    let Some(prefix) = data.get(..2) else {
        return Err(malformed(format!(
            "of {} bytes has no length prefix",
            data.len()
        )));
    };
    let declared = usize::from(u16::from_ne_bytes([prefix[0], prefix[1]]));
    let payload = data.len() - 2;
    if declared != payload {
        return Err(malformed(format!(
            "declares {declared} bytes but carries {payload}"
        )));
    }
    Ok(())
}

/// Encode `values` into a copy of the described input descriptor.
///
/// The count must match the declared parameters exactly.
///
/// # Errors
/// Returns [`IscError::Bind`] on a count mismatch or when a value cannot be encoded.
pub fn bind_all(described: &Xsqlda, values: &[Value], charset: &Charset) -> Result<Xsqlda> {
    let declared = described.len();
    if values.len() != declared {
        return Err(IscError::Bind(Diagnostics::client(
            SQLCODE_SQLDA,
            format!(
                "statement declares {declared} parameters but {} were supplied",
                values.len()
            ),
        )));
    }

    let mut input = described.clone();
    for (var, value) in input.vars_mut().iter_mut().zip(values) {
        bind_value(var, value, charset)?;
    }
    Ok(input)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decode::decode_var;
    use crate::ibase::SQL_FLOAT;
    use chrono::NaiveDate;

    fn described(types: &[i16]) -> Xsqlda {
        let mut da = Xsqlda::new(i16::try_from(types.len()).unwrap());
        da.sqld = da.sqln;
        for (var, tag) in da.sqlvar.iter_mut().zip(types) {
            var.sqltype = *tag;
            var.sqllen = 4;
        }
        da
    }

    #[test]
    fn bound_values_decode_back() {
        let day = NaiveDate::from_ymd_opt(1999, 12, 31).unwrap();
        let values = [
            Value::from("Dollar"),
            Value::Float(0.25),
            Value::Int(-7),
            Value::Date(day),
            Value::Bool(false),
        ];
        let input = bind_all(
            &described(&[SQL_VARYING + 1, SQL_FLOAT, SQL_INT64, SQL_TYPE_DATE, SQL_BOOLEAN]),
            &values,
            &Charset::UTF8,
        )
        .unwrap();
        let decoded: Vec<Value> = input
            .vars()
            .iter()
            .map(|v| decode_var(v, &Charset::UTF8).unwrap())
            .collect();
        assert_eq!(decoded, values);
        assert_eq!(input.vars()[0].sqllen, 6);
        assert_eq!(input.vars()[1].base_type(), SQL_DOUBLE);
    }

    #[test]
    fn null_keeps_declared_type_and_sets_indicator() {
        let input = bind_all(&described(&[SQL_FLOAT]), &[Value::Null], &Charset::UTF8).unwrap();
        let var = &input.vars()[0];
        assert!(var.is_null());
        assert!(var.is_nullable());
        assert_eq!(var.base_type(), SQL_FLOAT);
    }

    #[test]
    fn count_mismatch_fails() {
        let err = bind_all(
            &described(&[SQL_FLOAT, SQL_FLOAT]),
            &[Value::Float(1.0)],
            &Charset::UTF8,
        )
        .unwrap_err();
        assert!(matches!(err, IscError::Bind(_)));
        assert_eq!(err.code(), Some(SQLCODE_SQLDA));
    }

    #[test]
    fn oversized_text_fails() {
        let long = "x".repeat(MAX_TEXT_LENGTH + 1);
        let err = bind_all(&described(&[SQL_VARYING]), &[Value::Text(long)], &Charset::UTF8)
            .unwrap_err();
        assert_eq!(err.code(), Some(SQLCODE_TRUNCATION));
    }

    #[test]
    fn raw_varying_without_a_valid_prefix_fails() {
        let mut var = Xsqlvar::default();
        for bytes in [vec![], vec![3], vec![9, 0, b'a']] {
            let raw = Value::Raw {
                sql_type: SQL_VARYING + 1,
                bytes,
            };
            let err = bind_value(&mut var, &raw, &Charset::UTF8).unwrap_err();
            assert!(matches!(err, IscError::Bind(_)));
            assert_eq!(err.code(), Some(SQLCODE_SQLDA));
        }

        let mut good = 2u16.to_ne_bytes().to_vec();
        good.extend_from_slice(b"ok");
        let raw = Value::Raw {
            sql_type: SQL_VARYING,
            bytes: good,
        };
        bind_value(&mut var, &raw, &Charset::UTF8).unwrap();
        assert_eq!(var.sqllen, 2);
        assert_eq!(decode_var(&var, &Charset::UTF8).unwrap(), Value::from("ok"));
    }

    #[test]
    fn text_is_encoded_with_the_connection_charset() {
        let latin1 = Charset::from_name("ISO8859_1").unwrap();
        let input = bind_all(&described(&[SQL_VARYING]), &[Value::from("São")], &latin1).unwrap();
        let var = &input.vars()[0];
        assert_eq!(var.sqllen, 3);
        assert_eq!(&var.data[2..], b"S\xe3o");

        let err = bind_all(&described(&[SQL_VARYING]), &[Value::from("€")], &latin1).unwrap_err();
        assert_eq!(err.code(), Some(SQLCODE_TRUNCATION));
    }

    #[test]
    fn binary_values_travel_as_varying_bytes() {
        let input = bind_all(
            &described(&[SQL_VARYING]),
            &[Value::Binary(vec![0, 159, 255])],
            &Charset::UTF8,
        )
        .unwrap();
        let var = &input.vars()[0];
        assert_eq!(var.base_type(), SQL_VARYING);
        assert_eq!(var.sqllen, 3);
        assert_eq!(&var.data[2..], &[0, 159, 255]);
    }
}
