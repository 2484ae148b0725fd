//! CompressedVRS: a compact binary analog of the BaseStation line.
//!
//! Packet layout (little-endian, `zz` = zigzag LEB128 varint):
//!
//! ```text
//! varint   body length (bytes after this prefix)
//! u8       message type code                  [0xFF: token follows]
//! u8       transmission type (MSG) / status code (STA) / 0
//!                                             [0xFF: token follows]
//! u16      presence mask (PRESENT_* bits)
//! u8       tri-state pairs, flag i: bit 2i present, bit 2i+1 value
//! ICAO     3 bytes if PRESENT_ICAO_PACKED, else token
//! zz       session id, aircraft id, flight id
//! zz       generated, milliseconds since the Unix epoch
//! zz       logged minus generated, milliseconds
//! ...      optional fields, in presence-bit order
//! ```
//!
//! A token is a varint byte length followed by UTF-8. Ground speed and track
//! are carried in tenths, coordinates in millionths of a degree: exactly the
//! precision of the text line. A fractional value with no such integer form
//! (NaN, infinite, beyond `i64`) is written as absent.

use chrono::{DateTime, NaiveDateTime};
use thiserror::Error;

use crate::enums::{MessageType, StatusCode, TransmissionType, UNKNOWN_CODE};
use crate::message::{BaseStationMessage, MessageBuilder};
use crate::round;
use crate::types::{icao_from_hex, icao_to_string};

pub const PRESENT_CALLSIGN: u16 = 1 << 0;
pub const PRESENT_ALTITUDE: u16 = 1 << 1;
pub const PRESENT_GROUND_SPEED: u16 = 1 << 2;
pub const PRESENT_TRACK: u16 = 1 << 3;
pub const PRESENT_LATITUDE: u16 = 1 << 4;
pub const PRESENT_LONGITUDE: u16 = 1 << 5;
pub const PRESENT_VERTICAL_RATE: u16 = 1 << 6;
pub const PRESENT_SQUAWK: u16 = 1 << 7;
pub const PRESENT_ICAO_PACKED: u16 = 1 << 8;

const MAX_VARINT_BYTES: usize = 10;

/// A CompressedVRS packet that could not be decoded.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CompressedError {
    #[error("packet truncated")]
    Truncated,
    #[error("declared body length {declared} but fields used {used}")]
    LengthMismatch { declared: usize, used: usize },
    #[error("varint longer than {MAX_VARINT_BYTES} bytes")]
    VarintOverflow,
    #[error("token is not valid UTF-8")]
    InvalidUtf8,
    #[error("timestamp out of range: {0} ms")]
    InvalidTimestamp(i64),
    #[error("{field} value {value} out of range")]
    ValueOutOfRange { field: &'static str, value: i64 },
}

// ---------------------------------------------------------------------------
// Encoding
// ---------------------------------------------------------------------------

/// Encode a message as one CompressedVRS packet.
pub fn encode(msg: &BaseStationMessage) -> Vec<u8> {
    let mut body = Vec::with_capacity(48);

    write_code(&mut body, msg.message_type().code(), msg.message_type().token());
    match msg.message_type() {
        MessageType::Transmission => write_code(
            &mut body,
            msg.transmission_type().code(),
            msg.transmission_type().token(),
        ),
        MessageType::StatusChange => {
            write_code(&mut body, msg.status_code().code(), msg.status_code().token())
        }
        _ => body.push(0),
    }

    let packed_icao = icao_from_hex(msg.icao24());
    let ground_speed = units(msg.ground_speed(), round::GROUND_SPEED_PLACES);
    let track = units(msg.track(), round::TRACK_PLACES);
    let latitude = units(msg.latitude(), round::COORDINATE_PLACES);
    let longitude = units(msg.longitude(), round::COORDINATE_PLACES);

    let mut mask = 0u16;
    let presence = [
        (msg.callsign().is_some(), PRESENT_CALLSIGN),
        (msg.altitude().is_some(), PRESENT_ALTITUDE),
        (ground_speed.is_some(), PRESENT_GROUND_SPEED),
        (track.is_some(), PRESENT_TRACK),
        (latitude.is_some(), PRESENT_LATITUDE),
        (longitude.is_some(), PRESENT_LONGITUDE),
        (msg.vertical_rate().is_some(), PRESENT_VERTICAL_RATE),
        (msg.squawk().is_some(), PRESENT_SQUAWK),
        (packed_icao.is_some(), PRESENT_ICAO_PACKED),
    ];
    for (present, bit) in presence {
        if present {
            mask |= bit;
        }
    }
    body.extend_from_slice(&mask.to_le_bytes());
    body.push(pack_flags([
        msg.squawk_has_changed(),
        msg.emergency(),
        msg.ident_active(),
        msg.on_ground(),
    ]));

    match packed_icao {
        Some(icao) => body.extend_from_slice(&icao),
        None => write_token(&mut body, msg.icao24()),
    }

    write_signed(&mut body, msg.session_id().into());
    write_signed(&mut body, msg.aircraft_id().into());
    write_signed(&mut body, msg.flight_id().into());
    let generated = millis(msg.generated());
    write_signed(&mut body, generated);
    write_signed(&mut body, millis(msg.logged()).wrapping_sub(generated));

    if let Some(callsign) = msg.callsign() {
        write_token(&mut body, callsign);
    }
    if let Some(altitude) = msg.altitude() {
        write_signed(&mut body, altitude.into());
    }
    if let Some(v) = ground_speed {
        write_signed(&mut body, v);
    }
    if let Some(v) = track {
        write_signed(&mut body, v);
    }
    if let Some(v) = latitude {
        write_signed(&mut body, v);
    }
    if let Some(v) = longitude {
        write_signed(&mut body, v);
    }
    if let Some(rate) = msg.vertical_rate() {
        write_signed(&mut body, rate.into());
    }
    if let Some(squawk) = msg.squawk() {
        write_signed(&mut body, squawk.into());
    }

    let mut packet = Vec::with_capacity(body.len() + 2);
    write_unsigned(&mut packet, body.len() as u64);
    packet.extend_from_slice(&body);
    packet
}

/// Wire units for a fractional field. Values with no integer form (NaN,
/// infinities, out of `i64` range) are left out of the packet.
fn units(value: Option<f64>, places: i32) -> Option<i64> {
    value.and_then(|v| round::to_units(v, places))
}

fn millis(at: NaiveDateTime) -> i64 {
    at.and_utc().timestamp_millis()
}

fn write_code(out: &mut Vec<u8>, code: u8, token: &str) {
    out.push(code);
    if code == UNKNOWN_CODE {
        write_token(out, token);
    }
}

fn write_token(out: &mut Vec<u8>, token: &str) {
    write_unsigned(out, token.len() as u64);
    out.extend_from_slice(token.as_bytes());
}

fn write_signed(out: &mut Vec<u8>, value: i64) {
    write_unsigned(out, ((value << 1) ^ (value >> 63)) as u64);
}

fn write_unsigned(out: &mut Vec<u8>, mut value: u64) {
    loop {
        let byte = (value & 0x7F) as u8;
        value >>= 7;
        if value == 0 {
            out.push(byte);
            return;
        }
        out.push(byte | 0x80);
    }
}

fn pack_flags(flags: [Option<bool>; 4]) -> u8 {
    flags
        .iter()
        .enumerate()
        .fold(0u8, |acc, (i, flag)| match flag {
            None => acc,
            Some(value) => acc | (1 << (2 * i)) | ((*value as u8) << (2 * i + 1)),
        })
}

fn unpack_flag(byte: u8, index: usize) -> Option<bool> {
    if byte & (1 << (2 * index)) == 0 {
        None
    } else {
        Some(byte & (1 << (2 * index + 1)) != 0)
    }
}

// ---------------------------------------------------------------------------
// Decoding
// ---------------------------------------------------------------------------

/// Decode one packet from the front of `data`.
///
/// Returns the message and the number of bytes consumed, so packets read from
/// a stream can be decoded back-to-back.
pub fn decode(data: &[u8]) -> Result<(BaseStationMessage, usize), CompressedError> {
    let mut prefix = Reader::new(data);
    let declared = prefix.unsigned()? as usize;
    let start = prefix.pos;
    let end = start
        .checked_add(declared)
        .filter(|end| *end <= data.len())
        .ok_or(CompressedError::Truncated)?;

    let mut r = Reader::new(&data[start..end]);
    let msg = read_body(&mut r)?;
    if r.pos != declared {
        return Err(CompressedError::LengthMismatch {
            declared,
            used: r.pos,
        });
    }
    Ok((msg, end))
}

/// Decode every packet in a buffer.
pub fn decode_all(mut data: &[u8]) -> Result<Vec<BaseStationMessage>, CompressedError> {
    let mut messages = Vec::new();
    while !data.is_empty() {
        let (msg, used) = decode(data)?;
        messages.push(msg);
        data = &data[used..];
    }
    Ok(messages)
}

fn read_body(r: &mut Reader<'_>) -> Result<BaseStationMessage, CompressedError> {
    let type_code = r.byte()?;
    let message_type = if type_code == UNKNOWN_CODE {
        MessageType::Unknown(r.token()?)
    } else {
        MessageType::from_code(type_code)
    };
    let sub_code = r.byte()?;
    let sub_token = if sub_code == UNKNOWN_CODE {
        Some(r.token()?)
    } else {
        None
    };

    let mask = u16::from_le_bytes([r.byte()?, r.byte()?]);
    let flags = r.byte()?;
    let has = |bit: u16| mask & bit != 0;

    let icao24 = if has(PRESENT_ICAO_PACKED) {
        let bytes = r.take(3)?;
        icao_to_string(&[bytes[0], bytes[1], bytes[2]])
    } else {
        r.token()?
    };

    let session_id = r.signed_i32("session id")?;
    let aircraft_id = r.signed_i32("aircraft id")?;
    let flight_id = r.signed_i32("flight id")?;
    let generated_ms = r.signed()?;
    let logged_ms = generated_ms.wrapping_add(r.signed()?);

    let mut builder =
        MessageBuilder::new(message_type.clone(), icao24, timestamp(generated_ms)?, timestamp(logged_ms)?)
            .session_id(session_id)
            .aircraft_id(aircraft_id)
            .flight_id(flight_id);

    builder = match (&message_type, sub_token) {
        (MessageType::Transmission, Some(token)) => {
            builder.transmission_type(TransmissionType::Unknown(token))
        }
        (MessageType::Transmission, None) => {
            builder.transmission_type(TransmissionType::from_code(sub_code))
        }
        (MessageType::StatusChange, Some(token)) => builder.status_code(StatusCode::Unknown(token)),
        (MessageType::StatusChange, None) => builder.status_code(StatusCode::from_code(sub_code)),
        _ => builder,
    };

    if has(PRESENT_CALLSIGN) {
        builder = builder.callsign(Some(r.token()?));
    }
    if has(PRESENT_ALTITUDE) {
        builder = builder.altitude(Some(r.signed_i32("altitude")?));
    }
    if has(PRESENT_GROUND_SPEED) {
        let units = r.signed()?;
        builder = builder.ground_speed(Some(round::from_units(units, round::GROUND_SPEED_PLACES)));
    }
    if has(PRESENT_TRACK) {
        let units = r.signed()?;
        builder = builder.track(Some(round::from_units(units, round::TRACK_PLACES)));
    }
    let latitude = if has(PRESENT_LATITUDE) {
        Some(round::from_units(r.signed()?, round::COORDINATE_PLACES))
    } else {
        None
    };
    let longitude = if has(PRESENT_LONGITUDE) {
        Some(round::from_units(r.signed()?, round::COORDINATE_PLACES))
    } else {
        None
    };
    builder = builder.position(latitude, longitude);
    if has(PRESENT_VERTICAL_RATE) {
        builder = builder.vertical_rate(Some(r.signed_i32("vertical rate")?));
    }
    if has(PRESENT_SQUAWK) {
        builder = builder.squawk(Some(r.signed_i32("squawk")?));
    }

    Ok(builder
        .squawk_has_changed(unpack_flag(flags, 0))
        .emergency(unpack_flag(flags, 1))
        .ident_active(unpack_flag(flags, 2))
        .on_ground(unpack_flag(flags, 3))
        .build())
}

fn timestamp(ms: i64) -> Result<NaiveDateTime, CompressedError> {
    DateTime::from_timestamp_millis(ms)
        .map(|at| at.naive_utc())
        .ok_or(CompressedError::InvalidTimestamp(ms))
}

struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Reader { data, pos: 0 }
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], CompressedError> {
        let end = self
            .pos
            .checked_add(n)
            .filter(|end| *end <= self.data.len())
            .ok_or(CompressedError::Truncated)?;
        let slice = &self.data[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn byte(&mut self) -> Result<u8, CompressedError> {
        Ok(self.take(1)?[0])
    }

    fn unsigned(&mut self) -> Result<u64, CompressedError> {
        let mut value = 0u64;
        for i in 0..MAX_VARINT_BYTES {
            let byte = self.byte()?;
            value |= u64::from(byte & 0x7F) << (7 * i);
            if byte & 0x80 == 0 {
                return Ok(value);
            }
        }
        Err(CompressedError::VarintOverflow)
    }

    fn signed(&mut self) -> Result<i64, CompressedError> {
        let raw = self.unsigned()?;
        Ok(((raw >> 1) as i64) ^ -((raw & 1) as i64))
    }

    fn signed_i32(&mut self, field: &'static str) -> Result<i32, CompressedError> {
        let value = self.signed()?;
        i32::try_from(value).map_err(|_| CompressedError::ValueOutOfRange { field, value })
    }

    fn token(&mut self) -> Result<String, CompressedError> {
        let len = self.unsigned()? as usize;
        let bytes = self.take(len)?;
        String::from_utf8(bytes.to_vec()).map_err(|_| CompressedError::InvalidUtf8)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
