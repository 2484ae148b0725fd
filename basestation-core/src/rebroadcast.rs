//! Rebroadcast formatters: turn one message into the bytes a client receives.
//!
//! Each sink picks its [`Formatter`] once, through [`formatter_for`], when it
//! is configured. Formatters hold no state, so one decoded message can be
//! offered to every sink's formatter at the same time.

use std::fmt::Debug;
use std::sync::Arc;

use thiserror::Error;
use tracing::warn;

use crate::codec::{self, LINE_TERMINATOR};
use crate::compressed;
use crate::enums::RebroadcastFormat;
use crate::frame::RawFrame;
use crate::message::BaseStationMessage;
use crate::types::hex_encode;

/// A format that cannot be produced for this particular message, usually
/// because the receiver bytes it needs were not supplied.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{format} output unavailable: {reason}")]
pub struct FormatUnavailable {
    pub format: RebroadcastFormat,
    pub reason: &'static str,
}

/// Produces rebroadcast bytes for one output format.
pub trait Formatter: Send + Sync + Debug {
    /// The format this formatter emits.
    fn format(&self) -> RebroadcastFormat;

    /// Bytes to send for `message`, or `Ok(None)` when the sink should
    /// receive nothing at all.
    fn produce(
        &self,
        message: &BaseStationMessage,
        raw: Option<&RawFrame>,
    ) -> Result<Option<Vec<u8>>, FormatUnavailable>;
}

/// Pick the formatter for a configured format.
///
/// `None` and unrecognised formats get a formatter that never emits.
pub fn formatter_for(format: &RebroadcastFormat) -> Arc<dyn Formatter> {
    match format {
        RebroadcastFormat::Port30003 => Arc::new(Port30003Formatter),
        RebroadcastFormat::Avr => Arc::new(AvrFormatter),
        RebroadcastFormat::Passthrough => Arc::new(PassthroughFormatter),
        RebroadcastFormat::CompressedVrs => Arc::new(CompressedVrsFormatter),
        RebroadcastFormat::None => Arc::new(DisabledFormatter {
            format: RebroadcastFormat::None,
        }),
        RebroadcastFormat::Unknown(token) => {
            warn!(format = %token, "unrecognised rebroadcast format, sink disabled");
            Arc::new(DisabledFormatter {
                format: format.clone(),
            })
        }
    }
}

/// BaseStation text lines.
#[derive(Debug, Clone, Copy, Default)]
pub struct Port30003Formatter;

impl Formatter for Port30003Formatter {
    fn format(&self) -> RebroadcastFormat {
        RebroadcastFormat::Port30003
    }

    fn produce(
        &self,
        message: &BaseStationMessage,
        _raw: Option<&RawFrame>,
    ) -> Result<Option<Vec<u8>>, FormatUnavailable> {
        let mut line = codec::encode(message);
        line.push_str(LINE_TERMINATOR);
        Ok(Some(line.into_bytes()))
    }
}

/// `*HEX;` lines of the original Mode S frame.
#[derive(Debug, Clone, Copy, Default)]
pub struct AvrFormatter;

impl AvrFormatter {
    /// Format a Mode S frame as one AVR line, terminator included.
    pub fn line(frame: &[u8]) -> String {
        let mut line = String::with_capacity(frame.len() * 2 + 4);
        line.push('*');
        line.push_str(&hex_encode(frame));
        line.push(';');
        line.push_str(LINE_TERMINATOR);
        line
    }
}

impl Formatter for AvrFormatter {
    fn format(&self) -> RebroadcastFormat {
        RebroadcastFormat::Avr
    }

    fn produce(
        &self,
        _message: &BaseStationMessage,
        raw: Option<&RawFrame>,
    ) -> Result<Option<Vec<u8>>, FormatUnavailable> {
        let frame = raw.ok_or(FormatUnavailable {
            format: RebroadcastFormat::Avr,
            reason: "no raw frame",
        })?;
        let bytes = frame.mode_s_bytes().ok_or(FormatUnavailable {
            format: RebroadcastFormat::Avr,
            reason: "raw bytes are not a Mode S frame",
        })?;
        Ok(Some(AvrFormatter::line(bytes).into_bytes()))
    }
}

/// The receiver's own bytes, unmodified.
#[derive(Debug, Clone, Copy, Default)]
pub struct PassthroughFormatter;

impl Formatter for PassthroughFormatter {
    fn format(&self) -> RebroadcastFormat {
        RebroadcastFormat::Passthrough
    }

    fn produce(
        &self,
        _message: &BaseStationMessage,
        raw: Option<&RawFrame>,
    ) -> Result<Option<Vec<u8>>, FormatUnavailable> {
        raw.map(|frame| Some(frame.as_bytes().to_vec()))
            .ok_or(FormatUnavailable {
                format: RebroadcastFormat::Passthrough,
                reason: "no raw bytes",
            })
    }
}

/// CompressedVRS binary packets.
#[derive(Debug, Clone, Copy, Default)]
pub struct CompressedVrsFormatter;

impl Formatter for CompressedVrsFormatter {
    fn format(&self) -> RebroadcastFormat {
        RebroadcastFormat::CompressedVrs
    }

    fn produce(
        &self,
        message: &BaseStationMessage,
        _raw: Option<&RawFrame>,
    ) -> Result<Option<Vec<u8>>, FormatUnavailable> {
        Ok(Some(compressed::encode(message)))
    }
}

/// Emits nothing. Used for the `None` format and unrecognised selectors.
#[derive(Debug, Clone)]
pub struct DisabledFormatter {
    format: RebroadcastFormat,
}

impl Formatter for DisabledFormatter {
    fn format(&self) -> RebroadcastFormat {
        self.format.clone()
    }

    fn produce(
        &self,
        _message: &BaseStationMessage,
        _raw: Option<&RawFrame>,
    ) -> Result<Option<Vec<u8>>, FormatUnavailable> {
        Ok(None)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
