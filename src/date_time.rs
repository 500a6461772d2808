//! Packed date/time formats of the client API.
//!
//! Dates are day numbers counted from 1858-11-17 (the Modified Julian Day origin),
//! times are 1/10 000 second ticks since midnight.

use chrono::{Datelike, NaiveDate, NaiveDateTime, NaiveTime, Timelike};

use crate::ibase::ISC_TIME_SECONDS_PRECISION;

/// `num_days_from_ce` of 1858-11-17.
const BASE_DAY_FROM_CE: i32 = 678_576;

const NANOS_PER_TICK: u32 = 1_000_000_000 / ISC_TIME_SECONDS_PRECISION;

/// Day number to calendar date. `None` when outside chrono's range.
#[must_use]
pub fn decode_date(days: i32) -> Option<NaiveDate> {
    NaiveDate::from_num_days_from_ce_opt(BASE_DAY_FROM_CE.checked_add(days)?)
}

#[must_use]
pub fn encode_date(date: NaiveDate) -> i32 {
    date.num_days_from_ce() - BASE_DAY_FROM_CE
}

/// Tick count to time of day. `None` for values past midnight.
#[must_use]
pub fn decode_time(ticks: u32) -> Option<NaiveTime> {
    let seconds = ticks / ISC_TIME_SECONDS_PRECISION;
    let fraction = ticks % ISC_TIME_SECONDS_PRECISION;
    NaiveTime::from_num_seconds_from_midnight_opt(seconds, fraction * NANOS_PER_TICK)
}

#[must_use]
pub fn encode_time(time: NaiveTime) -> u32 {
    // leap seconds report nanos >= 1e9
    let fraction = (time.nanosecond() / NANOS_PER_TICK).min(ISC_TIME_SECONDS_PRECISION - 1);
    time.num_seconds_from_midnight() * ISC_TIME_SECONDS_PRECISION + fraction
}

#[must_use]
pub fn decode_timestamp(days: i32, ticks: u32) -> Option<NaiveDateTime> {
    Some(decode_date(days)?.and_time(decode_time(ticks)?))
}

#[must_use]
pub fn encode_timestamp(ts: NaiveDateTime) -> (i32, u32) {
    (encode_date(ts.date()), encode_time(ts.time()))
}
