//! Decoding of output slots into [`Value`]s.

use crate::charset::Charset;
use crate::date_time::{decode_date, decode_time, decode_timestamp};
use crate::error::{IscError, Result};
use crate::ibase::{SQL_BLOB, Xsqlvar};
use crate::types::{SqlType, Value};

/// Decode one slot after a fetch.
///
/// A negative null indicator yields [`Value::Null`] whatever the buffer holds. Blob
/// columns decode to their 8-byte id as [`Value::Raw`]; the statement layer reads the
/// contents.
///
/// # Arguments
/// * `var` - the output slot, as filled by the last fetch.
/// * `charset` - connection charset used for CHAR and VARCHAR slots.
///
/// # Returns
/// The typed value of the slot.
///
/// # Errors
/// Returns [`IscError::Decode`] when the buffer is shorter than its type requires, when a
/// VARYING length prefix points past the buffer, or when text is not valid in `charset`.
pub fn decode_var(var: &Xsqlvar, charset: &Charset) -> Result<Value> {
    if var.is_null() {
        return Ok(Value::Null);
    }

    let data = var.data.as_slice();
    match SqlType::from_tag(var.sqltype) {
        SqlType::VarText => {
            let len = usize::from(u16::from_ne_bytes(take::<2>(data, var)?));
            let payload = data.get(2..2 + len).ok_or_else(|| {
                IscError::Decode(format!(
                    "column {}: length prefix {len} exceeds buffer of {} bytes",
                    var.name(),
                    data.len().saturating_sub(2)
                ))
            })?;
            text(payload, var, charset)
        }
        SqlType::Text => {
            let len = var.buffer_len().min(data.len());
            text(&data[..len], var, charset)
        }
        SqlType::Short => Ok(scaled(i16::from_ne_bytes(take::<2>(data, var)?).into(), var)),
        SqlType::Long => Ok(scaled(i32::from_ne_bytes(take::<4>(data, var)?).into(), var)),
        SqlType::Int64 => Ok(scaled(i64::from_ne_bytes(take::<8>(data, var)?), var)),
        SqlType::Float => Ok(Value::Float(
            f32::from_ne_bytes(take::<4>(data, var)?).into(),
        )),
        SqlType::Double => Ok(Value::Float(f64::from_ne_bytes(take::<8>(data, var)?))),
        SqlType::Date => {
            let days = i32::from_ne_bytes(take::<4>(data, var)?);
            decode_date(days)
                .map(Value::Date)
                .ok_or_else(|| out_of_range(var, i64::from(days)))
        }
        SqlType::Time => {
            let ticks = u32::from_ne_bytes(take::<4>(data, var)?);
            decode_time(ticks)
                .map(Value::Time)
                .ok_or_else(|| out_of_range(var, i64::from(ticks)))
        }
        SqlType::Timestamp => {
            let raw = take::<8>(data, var)?;
            let days = i32::from_ne_bytes([raw[0], raw[1], raw[2], raw[3]]);
            let ticks = u32::from_ne_bytes([raw[4], raw[5], raw[6], raw[7]]);
            decode_timestamp(days, ticks)
                .map(Value::Timestamp)
                .ok_or_else(|| out_of_range(var, i64::from(days)))
        }
        SqlType::Boolean => Ok(Value::Bool(take::<1>(data, var)?[0] != 0)),
        SqlType::Blob => Ok(Value::Raw {
            sql_type: SQL_BLOB,
            bytes: take::<8>(data, var)?.to_vec(),
        }),
        SqlType::Unknown(sql_type) => Ok(Value::Raw {
            sql_type,
            bytes: data.to_vec(),
        }),
    }
}

/// Decode every reported slot of a descriptor, appending to `out`.
pub(crate) fn decode_row(
    vars: &[Xsqlvar],
    out: &mut Vec<Value>,
    charset: &Charset,
) -> Result<()> {
    out.clear();
    for var in vars {
        out.push(decode_var(var, charset)?);
    }
    Ok(())
}

fn take<const N: usize>(data: &[u8], var: &Xsqlvar) -> Result<[u8; N]> {
    data.get(..N)
        .and_then(|bytes| bytes.try_into().ok())
        .ok_or_else(|| {
            IscError::Decode(format!(
                "column {}: expected {N} bytes, buffer holds {}",
                var.name(),
                data.len()
            ))
        })
}

fn text(bytes: &[u8], var: &Xsqlvar, charset: &Charset) -> Result<Value> {
    charset.decode(bytes).map(Value::Text).map_err(|e| {
        IscError::Decode(format!("column {} ({charset}): {e}", var.name()))
    })
}

#[allow(clippy::cast_precision_loss)]
fn scaled(raw: i64, var: &Xsqlvar) -> Value {
    if var.sqlscale == 0 {
        Value::Int(raw)
    } else {
        Value::Float(raw as f64 * 10f64.powi(i32::from(var.sqlscale)))
    }
}

fn out_of_range(var: &Xsqlvar, raw: i64) -> IscError {
    IscError::Decode(format!("column {}: value {raw} is out of range", var.name()))
}
