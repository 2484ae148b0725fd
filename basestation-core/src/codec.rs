//! Canonical BaseStation text encoding.
//!
//! One message per line, 22 comma-separated fields:
//!
//! ```text
//!  1 message type     7 generated date   13 ground speed    19 squawk changed
//!  2 transmission     8 generated time   14 track           20 emergency
//!  3 session id       9 logged date      15 latitude        21 ident active
//!  4 aircraft id     10 logged time      16 longitude       22 on ground
//!  5 ICAO24          11 callsign/status  17 vertical rate
//!  6 flight id       12 altitude         18 squawk
//! ```
//!
//! The format never escapes commas. Decimal points are always `.`, dates are
//! `yyyy/MM/dd` and times `HH:mm:ss.fff`. Tri-state flags are `-1` (true),
//! `0` (false) or empty (not reported).

use std::fmt::Write;
use std::str::FromStr;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime, Timelike};
use thiserror::Error;

use crate::enums::{MessageType, StatusCode, TransmissionType};
use crate::message::{BaseStationMessage, MessageBuilder};
use crate::round;

/// Number of fields on every BaseStation line.
pub const FIELD_COUNT: usize = 22;

/// Terminator appended by line-oriented rebroadcast formats.
pub const LINE_TERMINATOR: &str = "\r\n";

const DATE_FORMAT: &str = "%Y/%m/%d";
const TIME_FORMAT: &str = "%H:%M:%S%.3f";
const TIME_PARSE_FORMAT: &str = "%H:%M:%S%.f";

const FIELD_NAMES: [&str; FIELD_COUNT] = [
    "message type",
    "transmission type",
    "session id",
    "aircraft id",
    "icao24",
    "flight id",
    "generated date",
    "generated time",
    "logged date",
    "logged time",
    "callsign",
    "altitude",
    "ground speed",
    "track",
    "latitude",
    "longitude",
    "vertical rate",
    "squawk",
    "squawk changed",
    "emergency",
    "ident active",
    "on ground",
];

/// A BaseStation line that could not be decoded.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("expected {FIELD_COUNT} fields, found {found}")]
    FieldCount { found: usize },
    #[error("field {index} ({name}) is invalid: {value:?}")]
    InvalidField {
        /// 1-based field position on the line.
        index: usize,
        name: &'static str,
        value: String,
    },
}

impl ParseError {
    /// 1-based index of the offending field. For a wrong field count this is
    /// the number of fields that were found.
    pub fn field_index(&self) -> usize {
        match self {
            ParseError::FieldCount { found } => *found,
            ParseError::InvalidField { index, .. } => *index,
        }
    }

    fn invalid(index: usize, value: &str) -> Self {
        ParseError::InvalidField {
            index,
            name: FIELD_NAMES[index - 1],
            value: value.to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// Encoding
// ---------------------------------------------------------------------------

/// Encode a message as a BaseStation line, without a line terminator.
pub fn encode(msg: &BaseStationMessage) -> String {
    let mut line = String::with_capacity(128);
    // Writing to a String cannot fail.
    let _ = write_line(&mut line, msg);
    line
}

fn write_line(out: &mut String, msg: &BaseStationMessage) -> std::fmt::Result {
    let transmission = if *msg.message_type() == MessageType::Transmission {
        msg.transmission_type().token()
    } else {
        ""
    };
    let slot11 = if *msg.message_type() == MessageType::StatusChange {
        msg.status_code().token()
    } else {
        msg.callsign().unwrap_or("")
    };

    write!(out, "{},{},", msg.message_type().token(), transmission)?;
    write!(
        out,
        "{},{},{},{},",
        msg.session_id(),
        msg.aircraft_id(),
        msg.icao24(),
        msg.flight_id()
    )?;
    write!(
        out,
        "{},{},{},{},",
        msg.generated().format(DATE_FORMAT),
        msg.generated().format(TIME_FORMAT),
        msg.logged().format(DATE_FORMAT),
        msg.logged().format(TIME_FORMAT)
    )?;
    write!(out, "{slot11},")?;
    write_optional(out, msg.altitude())?;
    write_optional(out, round::ground_speed(msg.ground_speed()))?;
    write_optional(out, round::track(msg.track()))?;
    write_optional(out, round::coordinate(msg.latitude()))?;
    write_optional(out, round::coordinate(msg.longitude()))?;
    write_optional(out, msg.vertical_rate())?;
    write_optional(out, msg.squawk())?;
    write!(
        out,
        "{},{},{},{}",
        tri_state(msg.squawk_has_changed()),
        tri_state(msg.emergency()),
        tri_state(msg.ident_active()),
        tri_state(msg.on_ground())
    )
}

fn write_optional<T: std::fmt::Display>(out: &mut String, value: Option<T>) -> std::fmt::Result {
    match value {
        Some(v) => write!(out, "{v},"),
        None => out.write_char(','),
    }
}

fn tri_state(flag: Option<bool>) -> &'static str {
    match flag {
        None => "",
        Some(true) => "-1",
        Some(false) => "0",
    }
}

// ---------------------------------------------------------------------------
// Decoding
// ---------------------------------------------------------------------------

/// Decode one BaseStation line.
///
/// A trailing `\r` / `\n` is ignored. Fractional fields are normalised to
/// wire precision (the same rounding `encode` applies) and timestamps are
/// truncated to milliseconds, so decoding is idempotent across re-encoding.
pub fn decode(line: &str) -> Result<BaseStationMessage, ParseError> {
    let line = line.trim_end_matches(['\r', '\n']);
    let fields: Vec<&str> = line.split(',').collect();
    if fields.len() != FIELD_COUNT {
        return Err(ParseError::FieldCount {
            found: fields.len(),
        });
    }
    // 1-based accessor, matching the field numbering used in errors.
    let field = |index: usize| fields[index - 1];

    let message_type = MessageType::from_token(field(1));
    let generated = parse_timestamp(field(7), 7, field(8), 8)?;
    let logged = parse_timestamp(field(9), 9, field(10), 10)?;

    let mut builder = MessageBuilder::new(message_type.clone(), field(5), generated, logged)
        .transmission_type(TransmissionType::from_token(field(2)))
        .session_id(parse_id(field(3), 3)?)
        .aircraft_id(parse_id(field(4), 4)?)
        .flight_id(parse_id(field(6), 6)?);

    builder = if message_type == MessageType::StatusChange {
        builder.status_code(StatusCode::from_token(field(11)))
    } else {
        builder.callsign(non_empty(field(11)).map(str::to_string))
    };

    let msg = builder
        .altitude(parse_optional(field(12), 12)?)
        .ground_speed(round::ground_speed(parse_optional(field(13), 13)?))
        .track(round::track(parse_optional(field(14), 14)?))
        .position(
            round::coordinate(parse_optional(field(15), 15)?),
            round::coordinate(parse_optional(field(16), 16)?),
        )
        .vertical_rate(parse_optional(field(17), 17)?)
        .squawk(parse_optional(field(18), 18)?)
        .squawk_has_changed(parse_tri_state(field(19), 19)?)
        .emergency(parse_tri_state(field(20), 20)?)
        .ident_active(parse_tri_state(field(21), 21)?)
        .on_ground(parse_tri_state(field(22), 22)?)
        .build();

    Ok(msg)
}

fn non_empty(value: &str) -> Option<&str> {
    if value.is_empty() {
        None
    } else {
        Some(value)
    }
}

/// Session, aircraft and flight ids. Some feeds leave them blank; blank
/// means 0 ("unknown").
fn parse_id(value: &str, index: usize) -> Result<i32, ParseError> {
    Ok(parse_optional(value, index)?.unwrap_or(0))
}

fn parse_optional<T: FromStr>(value: &str, index: usize) -> Result<Option<T>, ParseError> {
    match non_empty(value.trim()) {
        None => Ok(None),
        Some(v) => v
            .parse::<T>()
            .map(Some)
            .map_err(|_| ParseError::invalid(index, value)),
    }
}

fn parse_tri_state(value: &str, index: usize) -> Result<Option<bool>, ParseError> {
    match value.trim() {
        "" => Ok(None),
        "-1" | "1" => Ok(Some(true)),
        "0" => Ok(Some(false)),
        _ => Err(ParseError::invalid(index, value)),
    }
}

fn parse_timestamp(
    date: &str,
    date_index: usize,
    time: &str,
    time_index: usize,
) -> Result<NaiveDateTime, ParseError> {
    let date = NaiveDate::parse_from_str(date.trim(), DATE_FORMAT)
        .map_err(|_| ParseError::invalid(date_index, date))?;
    let time = NaiveTime::parse_from_str(time.trim(), TIME_PARSE_FORMAT)
        .map_err(|_| ParseError::invalid(time_index, time))?;
    let millis = time.nanosecond() / 1_000_000 * 1_000_000;
    let time = time
        .with_nanosecond(millis)
        .ok_or_else(|| ParseError::invalid(time_index, &time.to_string()))?;
    Ok(date.and_time(time))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
