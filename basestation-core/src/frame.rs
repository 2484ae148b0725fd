//! Raw receiver bytes carried alongside a decoded message.
//!
//! Responsibilities:
//! - Hold a Mode S / ADS-B frame (56 or 112 bits) for AVR rebroadcast
//! - Hold arbitrary receiver bytes for Passthrough rebroadcast
//! - Parse AVR text lines (`*hex;`, MLAT `@timestamp hex;`, bare hex)

use crate::types::{df_name, hex_decode, BaseStationError, Icao, Result};

// DFs where the ICAO address is explicit in bytes 1-3
const DF_EXPLICIT_ICAO: &[u8] = &[11, 17, 18];

// Hex digits of the 48-bit timestamp in an MLAT AVR line
const MLAT_TIMESTAMP_DIGITS: usize = 12;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Kind {
    ModeS,
    Opaque,
}

/// The original bytes a receiver produced for one message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawFrame {
    bytes: Vec<u8>,
    kind: Kind,
}

impl RawFrame {
    /// Wrap a Mode S frame. Must be 7 (short) or 14 (long) bytes.
    pub fn mode_s(bytes: Vec<u8>) -> Result<Self> {
        if bytes.len() != 7 && bytes.len() != 14 {
            return Err(BaseStationError::InvalidFrameLength(bytes.len()));
        }
        Ok(RawFrame {
            bytes,
            kind: Kind::ModeS,
        })
    }

    /// Wrap bytes that are not a Mode S frame, e.g. the BaseStation line a
    /// receiver sent. Only usable for Passthrough.
    pub fn opaque(bytes: impl Into<Vec<u8>>) -> Self {
        RawFrame {
            bytes: bytes.into(),
            kind: Kind::Opaque,
        }
    }

    /// Parse one AVR line into a Mode S frame.
    ///
    /// Handles `*8D4840D6202CC371C32CE0576098;`, the MLAT variant
    /// `@0123456789AB8D4840D6...;`, and bare hex. Returns `None` for comments,
    /// blank lines and anything that is not a 56/112-bit frame.
    pub fn from_avr(line: &str) -> Option<Self> {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            return None;
        }

        let hex = if let Some(inner) = line.strip_prefix('*') {
            inner.strip_suffix(';')?
        } else if let Some(inner) = line.strip_prefix('@') {
            inner.strip_suffix(';')?.get(MLAT_TIMESTAMP_DIGITS..)?
        } else {
            line
        };

        if hex.len() != 14 && hex.len() != 28 {
            return None;
        }
        RawFrame::mode_s(hex_decode(hex)?).ok()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// The frame bytes, if this is a Mode S frame.
    pub fn mode_s_bytes(&self) -> Option<&[u8]> {
        match self.kind {
            Kind::ModeS => Some(&self.bytes),
            Kind::Opaque => None,
        }
    }

    pub fn is_mode_s(&self) -> bool {
        self.kind == Kind::ModeS
    }

    /// Downlink Format (first 5 bits). None for opaque bytes.
    pub fn df(&self) -> Option<u8> {
        self.mode_s_bytes().map(|b| (b[0] >> 3) & 0x1F)
    }

    /// Human-readable Downlink Format name.
    pub fn df_name(&self) -> &'static str {
        self.df().and_then(df_name).unwrap_or("Unknown")
    }

    /// True if this is a 112-bit (long) Mode S frame.
    pub fn is_long(&self) -> bool {
        self.mode_s_bytes().is_some_and(|b| b.len() == 14)
    }

    /// ICAO address for DFs that carry it in the clear (DF11/17/18).
    pub fn icao(&self) -> Option<Icao> {
        let df = self.df()?;
        if !DF_EXPLICIT_ICAO.contains(&df) {
            return None;
        }
        let b = self.mode_s_bytes()?;
        Some([b[1], b[2], b[3]])
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::icao_to_string;

    #[test]
    fn test_parse_avr_line() {
        let frame = RawFrame::from_avr("*8D4840D6202CC371C32CE0576098;").unwrap();
        assert!(frame.is_mode_s());
        assert_eq!(frame.df(), Some(17));
        assert_eq!(frame.df_name(), "ADS-B extended squitter");
        assert!(frame.is_long());
        assert_eq!(icao_to_string(&frame.icao().unwrap()), "4840D6");
    }

    #[test]
    fn test_parse_mlat_and_bare_hex() {
        let mlat = RawFrame::from_avr("@0123456789AB8D4840D6202CC371C32CE0576098;").unwrap();
        let bare = RawFrame::from_avr("8d4840d6202cc371c32ce0576098").unwrap();
        assert_eq!(mlat, bare);
    }

    #[test]
    fn test_parse_short_frame() {
        let frame = RawFrame::from_avr("*5D4840D6A39C5B;").unwrap();
        assert_eq!(frame.df(), Some(11));
        assert!(!frame.is_long());
        assert_eq!(frame.len(), 7);
    }

    #[test]
    fn test_parse_rejects_bad_lines() {
        assert!(RawFrame::from_avr("").is_none());
        assert!(RawFrame::from_avr("# comment").is_none());
        assert!(RawFrame::from_avr("*8D4840D6;").is_none());
        assert!(RawFrame::from_avr("*8D4840D6202CC371C32CE0576098").is_none());
        assert!(RawFrame::from_avr("*ZZ4840D6202CC371C32CE0576098;").is_none());
    }

    #[test]
    fn test_mode_s_length_validation() {
        assert!(RawFrame::mode_s(vec![0; 7]).is_ok());
        assert!(RawFrame::mode_s(vec![0; 14]).is_ok());
        assert!(matches!(
            RawFrame::mode_s(vec![0; 9]),
            Err(BaseStationError::InvalidFrameLength(9))
        ));
    }

    #[test]
    fn test_opaque_frame() {
        let frame = RawFrame::opaque(b"MSG,8,,,4840D6".to_vec());
        assert!(!frame.is_mode_s());
        assert!(frame.mode_s_bytes().is_none());
        assert_eq!(frame.df(), None);
        assert_eq!(frame.df_name(), "Unknown");
        assert!(frame.icao().is_none());
        assert_eq!(frame.as_bytes(), b"MSG,8,,,4840D6");
    }

    #[test]
    fn test_icao_only_for_explicit_dfs() {
        // DF4 surveillance altitude reply: address is in the parity field
        let frame = RawFrame::from_avr("*20001838CA3804;").unwrap();
        assert_eq!(frame.df(), Some(4));
        assert!(frame.icao().is_none());
    }
}
