//! Translators between the closed BaseStation vocabularies and their wire
//! tokens and numeric codes.
//!
//! Every enumeration is total in both directions. Tokens or codes that are not
//! recognised decode to an `Unknown` variant that keeps the raw value, so a
//! newer producer never breaks an older consumer.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Numeric code written for any `Unknown` variant by the binary codec.
pub const UNKNOWN_CODE: u8 = 0xFF;

// ---------------------------------------------------------------------------
// Message type
// ---------------------------------------------------------------------------

/// The first field of a BaseStation line.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub enum MessageType {
    SelectionChange,
    NewIdentifier,
    NewAircraft,
    StatusChange,
    UserClicked,
    Transmission,
    Unknown(String),
}

impl MessageType {
    pub fn token(&self) -> &str {
        match self {
            MessageType::SelectionChange => "SEL",
            MessageType::NewIdentifier => "ID",
            MessageType::NewAircraft => "AIR",
            MessageType::StatusChange => "STA",
            MessageType::UserClicked => "CLK",
            MessageType::Transmission => "MSG",
            MessageType::Unknown(raw) => raw,
        }
    }

    pub fn from_token(token: &str) -> Self {
        match token {
            "SEL" => MessageType::SelectionChange,
            "ID" => MessageType::NewIdentifier,
            "AIR" => MessageType::NewAircraft,
            "STA" => MessageType::StatusChange,
            "CLK" => MessageType::UserClicked,
            "MSG" => MessageType::Transmission,
            other => MessageType::Unknown(other.to_string()),
        }
    }

    pub fn code(&self) -> u8 {
        match self {
            MessageType::SelectionChange => 1,
            MessageType::NewIdentifier => 2,
            MessageType::NewAircraft => 3,
            MessageType::StatusChange => 4,
            MessageType::UserClicked => 5,
            MessageType::Transmission => 6,
            MessageType::Unknown(_) => UNKNOWN_CODE,
        }
    }

    pub fn from_code(code: u8) -> Self {
        match code {
            1 => MessageType::SelectionChange,
            2 => MessageType::NewIdentifier,
            3 => MessageType::NewAircraft,
            4 => MessageType::StatusChange,
            5 => MessageType::UserClicked,
            6 => MessageType::Transmission,
            other => MessageType::Unknown(other.to_string()),
        }
    }

    pub fn is_unknown(&self) -> bool {
        matches!(self, MessageType::Unknown(_))
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.token())
    }
}

// ---------------------------------------------------------------------------
// Transmission type
// ---------------------------------------------------------------------------

/// Which subset of fields a `MSG` line populates.
///
/// The token is the decimal transmission number, so `code()` and the token
/// always agree.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub enum TransmissionType {
    None,
    IdentificationAndCategory,
    SurfacePosition,
    AirbornePosition,
    AirborneVelocity,
    SurveillanceAlt,
    SurveillanceId,
    AirToAir,
    AllCallReply,
    Unknown(String),
}

impl TransmissionType {
    pub fn token(&self) -> &str {
        match self {
            TransmissionType::None => "",
            TransmissionType::IdentificationAndCategory => "1",
            TransmissionType::SurfacePosition => "2",
            TransmissionType::AirbornePosition => "3",
            TransmissionType::AirborneVelocity => "4",
            TransmissionType::SurveillanceAlt => "5",
            TransmissionType::SurveillanceId => "6",
            TransmissionType::AirToAir => "7",
            TransmissionType::AllCallReply => "8",
            TransmissionType::Unknown(raw) => raw,
        }
    }

    pub fn from_token(token: &str) -> Self {
        match token {
            "" => TransmissionType::None,
            "1" => TransmissionType::IdentificationAndCategory,
            "2" => TransmissionType::SurfacePosition,
            "3" => TransmissionType::AirbornePosition,
            "4" => TransmissionType::AirborneVelocity,
            "5" => TransmissionType::SurveillanceAlt,
            "6" => TransmissionType::SurveillanceId,
            "7" => TransmissionType::AirToAir,
            "8" => TransmissionType::AllCallReply,
            other => TransmissionType::Unknown(other.to_string()),
        }
    }

    pub fn code(&self) -> u8 {
        match self {
            TransmissionType::None => 0,
            TransmissionType::IdentificationAndCategory => 1,
            TransmissionType::SurfacePosition => 2,
            TransmissionType::AirbornePosition => 3,
            TransmissionType::AirborneVelocity => 4,
            TransmissionType::SurveillanceAlt => 5,
            TransmissionType::SurveillanceId => 6,
            TransmissionType::AirToAir => 7,
            TransmissionType::AllCallReply => 8,
            TransmissionType::Unknown(_) => UNKNOWN_CODE,
        }
    }

    pub fn from_code(code: u8) -> Self {
        match code {
            0 => TransmissionType::None,
            1..=8 => TransmissionType::from_token(&code.to_string()),
            other => TransmissionType::Unknown(other.to_string()),
        }
    }
}

impl fmt::Display for TransmissionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.token())
    }
}

// ---------------------------------------------------------------------------
// Status code
// ---------------------------------------------------------------------------

/// Status carried in field 11 of an `STA` line.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub enum StatusCode {
    None,
    PositionLost,
    SignalLost,
    Remove,
    Delete,
    Ok,
    Unknown(String),
}

impl StatusCode {
    pub fn token(&self) -> &str {
        match self {
            StatusCode::None => "",
            StatusCode::PositionLost => "PL",
            StatusCode::SignalLost => "SL",
            StatusCode::Remove => "RM",
            StatusCode::Delete => "AD",
            StatusCode::Ok => "OK",
            StatusCode::Unknown(raw) => raw,
        }
    }

    pub fn from_token(token: &str) -> Self {
        match token {
            "" => StatusCode::None,
            "PL" => StatusCode::PositionLost,
            "SL" => StatusCode::SignalLost,
            "RM" => StatusCode::Remove,
            "AD" => StatusCode::Delete,
            "OK" => StatusCode::Ok,
            other => StatusCode::Unknown(other.to_string()),
        }
    }

    pub fn code(&self) -> u8 {
        match self {
            StatusCode::None => 0,
            StatusCode::PositionLost => 1,
            StatusCode::SignalLost => 2,
            StatusCode::Remove => 3,
            StatusCode::Delete => 4,
            StatusCode::Ok => 5,
            StatusCode::Unknown(_) => UNKNOWN_CODE,
        }
    }

    pub fn from_code(code: u8) -> Self {
        match code {
            0 => StatusCode::None,
            1 => StatusCode::PositionLost,
            2 => StatusCode::SignalLost,
            3 => StatusCode::Remove,
            4 => StatusCode::Delete,
            5 => StatusCode::Ok,
            other => StatusCode::Unknown(other.to_string()),
        }
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.token())
    }
}

// ---------------------------------------------------------------------------
// Rebroadcast format
// ---------------------------------------------------------------------------

/// Output format selected per rebroadcast sink.
///
/// Serialised in configuration files as its token, e.g. `"CompressedVRS"`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum RebroadcastFormat {
    None,
    Port30003,
    Avr,
    Passthrough,
    CompressedVrs,
    Unknown(String),
}

impl RebroadcastFormat {
    /// Every selectable format, in presentation order.
    pub const ALL: [RebroadcastFormat; 5] = [
        RebroadcastFormat::Port30003,
        RebroadcastFormat::Avr,
        RebroadcastFormat::Passthrough,
        RebroadcastFormat::CompressedVrs,
        RebroadcastFormat::None,
    ];

    pub fn token(&self) -> &str {
        match self {
            RebroadcastFormat::None => "None",
            RebroadcastFormat::Port30003 => "Port30003",
            RebroadcastFormat::Avr => "Avr",
            RebroadcastFormat::Passthrough => "Passthrough",
            RebroadcastFormat::CompressedVrs => "CompressedVRS",
            RebroadcastFormat::Unknown(raw) => raw,
        }
    }

    pub fn from_token(token: &str) -> Self {
        match token {
            "None" => RebroadcastFormat::None,
            "Port30003" => RebroadcastFormat::Port30003,
            "Avr" => RebroadcastFormat::Avr,
            "Passthrough" => RebroadcastFormat::Passthrough,
            "CompressedVRS" => RebroadcastFormat::CompressedVrs,
            other => RebroadcastFormat::Unknown(other.to_string()),
        }
    }

    pub fn code(&self) -> u8 {
        match self {
            RebroadcastFormat::None => 0,
            RebroadcastFormat::Port30003 => 1,
            RebroadcastFormat::Avr => 2,
            RebroadcastFormat::Passthrough => 3,
            RebroadcastFormat::CompressedVrs => 4,
            RebroadcastFormat::Unknown(_) => UNKNOWN_CODE,
        }
    }

    pub fn from_code(code: u8) -> Self {
        match code {
            0 => RebroadcastFormat::None,
            1 => RebroadcastFormat::Port30003,
            2 => RebroadcastFormat::Avr,
            3 => RebroadcastFormat::Passthrough,
            4 => RebroadcastFormat::CompressedVrs,
            other => RebroadcastFormat::Unknown(other.to_string()),
        }
    }

    /// Human-readable description for listings.
    pub fn description(&self) -> &'static str {
        match self {
            RebroadcastFormat::None => "None",
            RebroadcastFormat::Port30003 => "BaseStation (port 30003)",
            RebroadcastFormat::Avr => "AVR raw frames",
            RebroadcastFormat::Passthrough => "Passthrough",
            RebroadcastFormat::CompressedVrs => "Compressed BaseStation",
            RebroadcastFormat::Unknown(_) => "Unrecognised format",
        }
    }

    /// True if this format needs the original receiver bytes.
    pub fn needs_raw_frame(&self) -> bool {
        matches!(self, RebroadcastFormat::Avr | RebroadcastFormat::Passthrough)
    }
}

impl fmt::Display for RebroadcastFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.token())
    }
}

impl From<String> for RebroadcastFormat {
    fn from(token: String) -> Self {
        RebroadcastFormat::from_token(&token)
    }
}

impl From<RebroadcastFormat> for String {
    fn from(format: RebroadcastFormat) -> Self {
        format.token().to_string()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
