//! Shared error enum, Downlink Format metadata, and hex/ICAO helpers.

use thiserror::Error;

/// Frame, config and I/O errors. The codecs and formatters report through
/// their own error types (`ParseError`, `CompressedError`,
/// `FormatUnavailable`), which are handled per message.
#[derive(Debug, Error)]
pub enum BaseStationError {
    #[error("invalid raw frame length: expected 7 or 14 bytes, got {0}")]
    InvalidFrameLength(usize),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("config error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, BaseStationError>;

// ---------------------------------------------------------------------------
// Downlink Format metadata
// ---------------------------------------------------------------------------

/// Known Downlink Formats and their human-readable names.
pub const DF_TABLE: &[(u8, &str)] = &[
    (0, "Short air-air surveillance"),
    (4, "Surveillance altitude reply"),
    (5, "Surveillance identity reply"),
    (11, "All-call reply"),
    (16, "Long air-air surveillance"),
    (17, "ADS-B extended squitter"),
    (18, "TIS-B / ADS-R"),
    (19, "Military extended squitter"),
    (20, "Comm-B altitude reply"),
    (21, "Comm-B identity reply"),
    (24, "Comm-D extended length message"),
];

/// Look up a DF name. Returns `None` for unrecognized DFs.
pub fn df_name(df: u8) -> Option<&'static str> {
    DF_TABLE
        .iter()
        .find(|(d, _)| *d == df)
        .map(|(_, name)| *name)
}

// ---------------------------------------------------------------------------
// ICAO address helpers
// ---------------------------------------------------------------------------

/// 3-byte ICAO address.
pub type Icao = [u8; 3];

/// Format ICAO address as 6-char uppercase hex string.
pub fn icao_to_string(icao: &Icao) -> String {
    hex_encode(icao)
}

/// Parse a 6-char hex string into an ICAO address.
///
/// Only the canonical uppercase form is accepted, so that
/// `icao_to_string(&icao_from_hex(s)?) == s` always holds.
pub fn icao_from_hex(hex: &str) -> Option<Icao> {
    if hex.len() != 6
        || !hex
            .bytes()
            .all(|c| c.is_ascii_digit() || (b'A'..=b'F').contains(&c))
    {
        return None;
    }
    match hex_decode(hex)?.as_slice() {
        &[a, b, c] => Some([a, b, c]),
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// Hex utilities
// ---------------------------------------------------------------------------

/// Decode a hex string into bytes. Case-insensitive, must be even length.
pub fn hex_decode(hex: &str) -> Option<Vec<u8>> {
    let hex = hex.trim();
    if !hex.len().is_multiple_of(2) {
        return None;
    }
    let mut bytes = Vec::with_capacity(hex.len() / 2);
    for chunk in hex.as_bytes().chunks(2) {
        let high = hex_digit(chunk[0])?;
        let low = hex_digit(chunk[1])?;
        bytes.push((high << 4) | low);
    }
    Some(bytes)
}

/// Encode bytes as uppercase hex string.
pub fn hex_encode(data: &[u8]) -> String {
    let mut s = String::with_capacity(data.len() * 2);
    for &b in data {
        s.push(HEX_CHARS[(b >> 4) as usize] as char);
        s.push(HEX_CHARS[(b & 0x0F) as usize] as char);
    }
    s
}

const HEX_CHARS: &[u8; 16] = b"0123456789ABCDEF";

fn hex_digit(c: u8) -> Option<u8> {
    match c {
        b'0'..=b'9' => Some(c - b'0'),
        b'a'..=b'f' => Some(c - b'a' + 10),
        b'A'..=b'F' => Some(c - b'A' + 10),
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_icao_roundtrip() {
        let icao = icao_from_hex("4840D6").unwrap();
        assert_eq!(icao, [0x48, 0x40, 0xD6]);
        assert_eq!(icao_to_string(&icao), "4840D6");
    }

    #[test]
    fn test_icao_rejects_non_canonical() {
        assert!(icao_from_hex("4840d6").is_none());
        assert!(icao_from_hex("4840D").is_none());
        assert!(icao_from_hex("~4840D").is_none());
    }

    #[test]
    fn test_icao_rejects_padding() {
        assert!(icao_from_hex("  4840").is_none());
        assert!(icao_from_hex("4840  ").is_none());
        assert!(icao_from_hex(" 4840D").is_none());
        assert!(icao_from_hex("4840D6\n").is_none());
    }

    #[test]
    fn test_hex_decode() {
        assert_eq!(hex_decode("4840D6"), Some(vec![0x48, 0x40, 0xD6]));
        assert_eq!(hex_decode("4840d6"), Some(vec![0x48, 0x40, 0xD6]));
        assert_eq!(hex_decode("odd"), None); // odd length
        assert_eq!(hex_decode("ZZZZ"), None); // invalid chars
    }

    #[test]
    fn test_hex_encode() {
        assert_eq!(hex_encode(&[0x48, 0x40, 0xD6]), "4840D6");
        assert_eq!(hex_encode(&[]), "");
    }

    #[test]
    fn test_error_messages() {
        let err = BaseStationError::InvalidFrameLength(9);
        assert_eq!(err.to_string(), "invalid raw frame length: expected 7 or 14 bytes, got 9");

        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err: BaseStationError = io.into();
        assert!(matches!(err, BaseStationError::Io(_)));
        assert_eq!(err.to_string(), "IO error: gone");
    }

    #[test]
    fn test_df_name() {
        assert_eq!(df_name(17), Some("ADS-B extended squitter"));
        assert!(df_name(3).is_none());
    }
}
