//! basestation-core: BaseStation (port 30003) message model, codecs and
//! rebroadcast fan-out.
//!
//! No sockets, no runtime. This crate is the shared core used by the
//! `bsrelay` binary, which owns the network side.

pub mod codec;
pub mod compressed;
pub mod config;
pub mod dispatch;
pub mod enums;
pub mod frame;
pub mod message;
pub mod rebroadcast;
pub mod round;
pub mod types;

// Re-export commonly used types at crate root
pub use codec::ParseError;
pub use dispatch::{DispatchReport, Dispatcher, SinkChannel, SinkError};
pub use enums::{MessageType, RebroadcastFormat, StatusCode, TransmissionType};
pub use frame::RawFrame;
pub use message::{BaseStationMessage, MessageBuilder, SpeedType, Supplementary};
pub use rebroadcast::{formatter_for, FormatUnavailable, Formatter};
pub use types::*;
