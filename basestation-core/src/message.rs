//! The BaseStation message model.
//!
//! A [`BaseStationMessage`] is an immutable value: it is built once, by the
//! codecs or through [`MessageBuilder`], and then only read. The same
//! instance can be handed to every rebroadcast sink at once.

use std::fmt;

use chrono::NaiveDateTime;
use serde::Serialize;

use crate::enums::{MessageType, StatusCode, TransmissionType};

/// Speed type reported by a velocity message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SpeedType {
    Ground,
    IAS,
    TAS,
}

impl fmt::Display for SpeedType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SpeedType::Ground => write!(f, "ground"),
            SpeedType::IAS => write!(f, "IAS"),
            SpeedType::TAS => write!(f, "TAS"),
        }
    }
}

/// Extra decode detail from a raw Mode-S / ADS-B message.
///
/// Never written to either wire format. May be absent even for messages
/// produced by a full raw decoder.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Supplementary {
    pub speed_type: Option<SpeedType>,
    /// Track is the aircraft heading rather than its ground track.
    pub track_is_heading: Option<bool>,
    /// Vertical rate came from GNSS rather than barometric altitude.
    pub vertical_rate_is_geometric: Option<bool>,
    pub callsign_is_suspect: Option<bool>,
    pub target_altitude: Option<i32>,
    pub target_heading: Option<f64>,
}

/// One event reported by one receiver.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BaseStationMessage {
    receiver_id: i32,
    signal_level: Option<i32>,
    message_type: MessageType,
    transmission_type: TransmissionType,
    status_code: StatusCode,
    icao24: String,
    session_id: i32,
    aircraft_id: i32,
    flight_id: i32,
    generated: NaiveDateTime,
    logged: NaiveDateTime,
    callsign: Option<String>,
    altitude: Option<i32>,
    ground_speed: Option<f64>,
    track: Option<f64>,
    latitude: Option<f64>,
    longitude: Option<f64>,
    vertical_rate: Option<i32>,
    squawk: Option<i32>,
    squawk_has_changed: Option<bool>,
    emergency: Option<bool>,
    ident_active: Option<bool>,
    on_ground: Option<bool>,
    message_number: i32,
    supplementary: Option<Supplementary>,
}

impl BaseStationMessage {
    /// Start building a message of the given type for an aircraft.
    pub fn builder(
        message_type: MessageType,
        icao24: impl Into<String>,
        generated: NaiveDateTime,
        logged: NaiveDateTime,
    ) -> MessageBuilder {
        MessageBuilder::new(message_type, icao24, generated, logged)
    }

    /// Receiver that picked up the message, 0 if unknown.
    pub fn receiver_id(&self) -> i32 {
        self.receiver_id
    }

    pub fn signal_level(&self) -> Option<i32> {
        self.signal_level
    }

    pub fn message_type(&self) -> &MessageType {
        &self.message_type
    }

    /// `TransmissionType::None` unless this is a `MSG` line.
    pub fn transmission_type(&self) -> &TransmissionType {
        &self.transmission_type
    }

    /// `StatusCode::None` unless this is an `STA` line.
    pub fn status_code(&self) -> &StatusCode {
        &self.status_code
    }

    pub fn icao24(&self) -> &str {
        &self.icao24
    }

    pub fn session_id(&self) -> i32 {
        self.session_id
    }

    pub fn aircraft_id(&self) -> i32 {
        self.aircraft_id
    }

    pub fn flight_id(&self) -> i32 {
        self.flight_id
    }

    pub fn generated(&self) -> NaiveDateTime {
        self.generated
    }

    pub fn logged(&self) -> NaiveDateTime {
        self.logged
    }

    pub fn callsign(&self) -> Option<&str> {
        self.callsign.as_deref()
    }

    /// Barometric altitude in feet.
    pub fn altitude(&self) -> Option<i32> {
        self.altitude
    }

    /// Ground speed in knots.
    pub fn ground_speed(&self) -> Option<f64> {
        self.ground_speed
    }

    /// Track angle in degrees.
    pub fn track(&self) -> Option<f64> {
        self.track
    }

    pub fn latitude(&self) -> Option<f64> {
        self.latitude
    }

    pub fn longitude(&self) -> Option<f64> {
        self.longitude
    }

    /// Vertical rate in feet per minute.
    pub fn vertical_rate(&self) -> Option<i32> {
        self.vertical_rate
    }

    pub fn squawk(&self) -> Option<i32> {
        self.squawk
    }

    pub fn squawk_has_changed(&self) -> Option<bool> {
        self.squawk_has_changed
    }

    pub fn emergency(&self) -> Option<bool> {
        self.emergency
    }

    pub fn ident_active(&self) -> Option<bool> {
        self.ident_active
    }

    pub fn on_ground(&self) -> Option<bool> {
        self.on_ground
    }

    /// Sequence number of an archived message. Always 0 for live traffic.
    pub fn message_number(&self) -> i32 {
        self.message_number
    }

    pub fn supplementary(&self) -> Option<&Supplementary> {
        self.supplementary.as_ref()
    }

    /// True if both coordinates are present.
    pub fn has_position(&self) -> bool {
        self.latitude.is_some() && self.longitude.is_some()
    }
}

/// Fluent builder for [`BaseStationMessage`].
///
/// The ICAO address and message type are fixed when the builder is created.
/// `build()` clears fields that the message type makes meaningless.
#[derive(Debug, Clone)]
pub struct MessageBuilder {
    msg: BaseStationMessage,
}

impl MessageBuilder {
    pub fn new(
        message_type: MessageType,
        icao24: impl Into<String>,
        generated: NaiveDateTime,
        logged: NaiveDateTime,
    ) -> Self {
        MessageBuilder {
            msg: BaseStationMessage {
                receiver_id: 0,
                signal_level: None,
                message_type,
                transmission_type: TransmissionType::None,
                status_code: StatusCode::None,
                icao24: icao24.into(),
                session_id: 0,
                aircraft_id: 0,
                flight_id: 0,
                generated,
                logged,
                callsign: None,
                altitude: None,
                ground_speed: None,
                track: None,
                latitude: None,
                longitude: None,
                vertical_rate: None,
                squawk: None,
                squawk_has_changed: None,
                emergency: None,
                ident_active: None,
                on_ground: None,
                message_number: 0,
                supplementary: None,
            },
        }
    }

    /// Shorthand for a `MSG` line of the given transmission type.
    pub fn transmission(
        transmission_type: TransmissionType,
        icao24: impl Into<String>,
        generated: NaiveDateTime,
        logged: NaiveDateTime,
    ) -> Self {
        MessageBuilder::new(MessageType::Transmission, icao24, generated, logged)
            .transmission_type(transmission_type)
    }

    /// Shorthand for an `STA` line carrying a status code.
    pub fn status_change(
        status_code: StatusCode,
        icao24: impl Into<String>,
        generated: NaiveDateTime,
        logged: NaiveDateTime,
    ) -> Self {
        MessageBuilder::new(MessageType::StatusChange, icao24, generated, logged)
            .status_code(status_code)
    }

    pub fn receiver_id(mut self, id: i32) -> Self {
        self.msg.receiver_id = id;
        self
    }

    pub fn signal_level(mut self, level: Option<i32>) -> Self {
        self.msg.signal_level = level;
        self
    }

    pub fn transmission_type(mut self, transmission_type: TransmissionType) -> Self {
        self.msg.transmission_type = transmission_type;
        self
    }

    pub fn status_code(mut self, status_code: StatusCode) -> Self {
        self.msg.status_code = status_code;
        self
    }

    pub fn session_id(mut self, id: i32) -> Self {
        self.msg.session_id = id;
        self
    }

    pub fn aircraft_id(mut self, id: i32) -> Self {
        self.msg.aircraft_id = id;
        self
    }

    pub fn flight_id(mut self, id: i32) -> Self {
        self.msg.flight_id = id;
        self
    }

    pub fn callsign(mut self, callsign: Option<impl Into<String>>) -> Self {
        self.msg.callsign = callsign.map(Into::into);
        self
    }

    pub fn altitude(mut self, feet: Option<i32>) -> Self {
        self.msg.altitude = feet;
        self
    }

    pub fn ground_speed(mut self, knots: Option<f64>) -> Self {
        self.msg.ground_speed = knots;
        self
    }

    pub fn track(mut self, degrees: Option<f64>) -> Self {
        self.msg.track = degrees;
        self
    }

    pub fn position(mut self, latitude: Option<f64>, longitude: Option<f64>) -> Self {
        self.msg.latitude = latitude;
        self.msg.longitude = longitude;
        self
    }

    pub fn vertical_rate(mut self, feet_per_minute: Option<i32>) -> Self {
        self.msg.vertical_rate = feet_per_minute;
        self
    }

    pub fn squawk(mut self, squawk: Option<i32>) -> Self {
        self.msg.squawk = squawk;
        self
    }

    pub fn squawk_has_changed(mut self, flag: Option<bool>) -> Self {
        self.msg.squawk_has_changed = flag;
        self
    }

    pub fn emergency(mut self, flag: Option<bool>) -> Self {
        self.msg.emergency = flag;
        self
    }

    pub fn ident_active(mut self, flag: Option<bool>) -> Self {
        self.msg.ident_active = flag;
        self
    }

    pub fn on_ground(mut self, flag: Option<bool>) -> Self {
        self.msg.on_ground = flag;
        self
    }

    pub fn message_number(mut self, number: i32) -> Self {
        self.msg.message_number = number;
        self
    }

    pub fn supplementary(mut self, supplementary: Option<Supplementary>) -> Self {
        self.msg.supplementary = supplementary;
        self
    }

    pub fn build(self) -> BaseStationMessage {
        let mut msg = self.msg;
        if msg.message_type != MessageType::Transmission {
            msg.transmission_type = TransmissionType::None;
        }
        if msg.message_type == MessageType::StatusChange {
            // Field 11 carries the status code on STA lines.
            msg.callsign = None;
        } else {
            msg.status_code = StatusCode::None;
        }
        msg
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
