//! Fan-out of decoded messages to independently configured rebroadcast sinks.
//!
//! The sink table sits behind a `RwLock`: `dispatch` takes the read lock, so
//! any number of producers can fan out at once, while `add_sink` and
//! `remove_sink` take the write lock. Output channels never block: a full or
//! closed channel costs that sink the message and nothing else.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, info, trace, warn};

use crate::enums::RebroadcastFormat;
use crate::frame::RawFrame;
use crate::message::BaseStationMessage;
use crate::rebroadcast::{formatter_for, Formatter};

/// Why bytes could not be handed to a sink's channel.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SinkError {
    #[error("sink queue full")]
    Full,
    #[error("sink channel closed")]
    Closed,
    #[error("sink write failed: {0}")]
    Failed(String),
}

/// Non-blocking hand-off to the transport that serves one sink.
pub trait SinkChannel: Send + Sync {
    fn offer(&self, bytes: Vec<u8>) -> Result<(), SinkError>;
}

/// Bounded queue, drop-new when full.
impl SinkChannel for mpsc::Sender<Vec<u8>> {
    fn offer(&self, bytes: Vec<u8>) -> Result<(), SinkError> {
        self.try_send(bytes).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => SinkError::Full,
            mpsc::error::TrySendError::Closed(_) => SinkError::Closed,
        })
    }
}

/// Per-sink delivery counters.
#[derive(Debug, Default)]
struct SinkStats {
    delivered: AtomicU64,
    failed: AtomicU64,
    unavailable: AtomicU64,
}

/// Point-in-time copy of a sink's counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SinkStatsSnapshot {
    pub delivered: u64,
    pub failed: u64,
    pub unavailable: u64,
}

struct Sink {
    formatter: Arc<dyn Formatter>,
    channel: Box<dyn SinkChannel>,
    stats: SinkStats,
}

impl fmt::Debug for Sink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Sink")
            .field("formatter", &self.formatter)
            .field("stats", &self.stats)
            .finish()
    }
}

/// Outcome of offering one message to every sink.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchReport {
    /// Sinks that accepted the bytes.
    pub delivered: usize,
    /// Sinks whose channel was full, closed or failing.
    pub failed: usize,
    /// Sinks whose format could not be produced for this message.
    pub unavailable: usize,
    /// Sinks configured to receive nothing.
    pub disabled: usize,
}

/// Routes each message to every registered sink in that sink's format.
#[derive(Debug, Default)]
pub struct Dispatcher {
    sinks: RwLock<HashMap<String, Sink>>,
}

impl Dispatcher {
    pub fn new() -> Self {
        Dispatcher::default()
    }

    /// Register a sink. A sink with the same name is replaced, and its
    /// channel dropped.
    pub fn add_sink(
        &self,
        name: impl Into<String>,
        format: &RebroadcastFormat,
        channel: impl SinkChannel + 'static,
    ) {
        let name = name.into();
        let sink = Sink {
            formatter: formatter_for(format),
            channel: Box::new(channel),
            stats: SinkStats::default(),
        };
        if self.write().insert(name.clone(), sink).is_some() {
            info!(sink = %name, %format, "rebroadcast sink replaced");
        } else {
            info!(sink = %name, %format, "rebroadcast sink added");
        }
    }

    /// Remove a sink. Nothing further is offered to it; bytes already queued
    /// stay with the receiving side, which may still drain them. Removing an
    /// unknown sink is a no-op; returns whether anything was removed.
    pub fn remove_sink(&self, name: &str) -> bool {
        let removed = self.write().remove(name).is_some();
        if removed {
            info!(sink = %name, "rebroadcast sink removed");
        }
        removed
    }

    pub fn contains(&self, name: &str) -> bool {
        self.read().contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    /// Registered sink names, sorted.
    pub fn sink_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// Format a sink is bound to.
    pub fn sink_format(&self, name: &str) -> Option<RebroadcastFormat> {
        self.read().get(name).map(|sink| sink.formatter.format())
    }

    pub fn stats(&self, name: &str) -> Option<SinkStatsSnapshot> {
        self.read().get(name).map(|sink| SinkStatsSnapshot {
            delivered: sink.stats.delivered.load(Ordering::Relaxed),
            failed: sink.stats.failed.load(Ordering::Relaxed),
            unavailable: sink.stats.unavailable.load(Ordering::Relaxed),
        })
    }

    /// Offer one message to every sink.
    ///
    /// `raw` is the receiver's original bytes, when available; AVR and
    /// Passthrough sinks skip the message without it.
    pub fn dispatch(&self, message: &BaseStationMessage, raw: Option<&RawFrame>) -> DispatchReport {
        let sinks = self.read();
        let mut report = DispatchReport::default();

        for (name, sink) in sinks.iter() {
            match sink.formatter.produce(message, raw) {
                Ok(Some(bytes)) => match sink.channel.offer(bytes) {
                    Ok(()) => {
                        sink.stats.delivered.fetch_add(1, Ordering::Relaxed);
                        report.delivered += 1;
                    }
                    Err(e) => {
                        sink.stats.failed.fetch_add(1, Ordering::Relaxed);
                        report.failed += 1;
                        match e {
                            SinkError::Full => debug!(sink = %name, "queue full, message dropped"),
                            _ => warn!(sink = %name, error = %e, "message dropped"),
                        }
                    }
                },
                Ok(None) => report.disabled += 1,
                Err(e) => {
                    sink.stats.unavailable.fetch_add(1, Ordering::Relaxed);
                    report.unavailable += 1;
                    trace!(sink = %name, reason = e.reason, "format unavailable for message");
                }
            }
        }

        report
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, Sink>> {
        // Sinks are only inserted or removed whole, so a poisoned table is
        // still consistent.
        self.sinks.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, Sink>> {
        self.sinks.write().unwrap_or_else(|e| e.into_inner())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec;
    use crate::enums::TransmissionType;
    use crate::message::MessageBuilder;
    use chrono::{NaiveDate, NaiveDateTime};
    use std::sync::Mutex;

    fn ts() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, 9)
            .unwrap()
            .and_hms_milli_opt(14, 5, 7, 250)
            .unwrap()
    }

    fn message() -> BaseStationMessage {
        MessageBuilder::transmission(TransmissionType::AirbornePosition, "4840D6", ts(), ts())
            .altitude(Some(35000))
            .build()
    }

    /// Channel whose writes always fail.
    struct FailingChannel;

    impl SinkChannel for FailingChannel {
        fn offer(&self, _bytes: Vec<u8>) -> Result<(), SinkError> {
            Err(SinkError::Failed("connection reset".into()))
        }
    }

    /// Channel that records everything it is offered.
    #[derive(Clone, Default)]
    struct CollectorChannel(Arc<Mutex<Vec<Vec<u8>>>>);

    impl CollectorChannel {
        fn received(&self) -> Vec<Vec<u8>> {
            self.0.lock().unwrap().clone()
        }
    }

    impl SinkChannel for CollectorChannel {
        fn offer(&self, bytes: Vec<u8>) -> Result<(), SinkError> {
            self.0.lock().unwrap().push(bytes);
            Ok(())
        }
    }

    #[test]
    fn test_failing_sink_does_not_block_others() {
        let dispatcher = Dispatcher::new();
        let good = CollectorChannel::default();
        dispatcher.add_sink("broken", &RebroadcastFormat::Port30003, FailingChannel);
        dispatcher.add_sink("good", &RebroadcastFormat::Port30003, good.clone());

        let report = dispatcher.dispatch(&message(), None);
        assert_eq!(report.delivered, 1);
        assert_eq!(report.failed, 1);

        let received = good.received();
        assert_eq!(received.len(), 1);
        assert_eq!(received[0], format!("{}\r\n", codec::encode(&message())).into_bytes());
        assert_eq!(dispatcher.stats("broken").unwrap().failed, 1);
        assert_eq!(dispatcher.stats("good").unwrap().delivered, 1);
    }

    #[test]
    fn test_each_sink_gets_its_own_format() {
        let dispatcher = Dispatcher::new();
        let text = CollectorChannel::default();
        let binary = CollectorChannel::default();
        let avr = CollectorChannel::default();
        dispatcher.add_sink("text", &RebroadcastFormat::Port30003, text.clone());
        dispatcher.add_sink("binary", &RebroadcastFormat::CompressedVrs, binary.clone());
        dispatcher.add_sink("avr", &RebroadcastFormat::Avr, avr.clone());

        let frame = RawFrame::from_avr("*8D4840D6202CC371C32CE0576098;").unwrap();
        let report = dispatcher.dispatch(&message(), Some(&frame));
        assert_eq!(report.delivered, 3);

        assert!(text.received()[0].starts_with(b"MSG,3,"));
        let (decoded, _) = crate::compressed::decode(&binary.received()[0]).unwrap();
        assert_eq!(decoded.altitude(), Some(35000));
        assert_eq!(avr.received()[0], b"*8D4840D6202CC371C32CE0576098;\r\n");
    }

    #[test]
    fn test_missing_raw_frame_skips_only_that_sink() {
        let dispatcher = Dispatcher::new();
        let text = CollectorChannel::default();
        let avr = CollectorChannel::default();
        dispatcher.add_sink("text", &RebroadcastFormat::Port30003, text.clone());
        dispatcher.add_sink("avr", &RebroadcastFormat::Avr, avr.clone());

        let report = dispatcher.dispatch(&message(), None);
        assert_eq!(report.delivered, 1);
        assert_eq!(report.unavailable, 1);
        assert_eq!(text.received().len(), 1);
        assert!(avr.received().is_empty());
        assert_eq!(dispatcher.stats("avr").unwrap().unavailable, 1);
    }

    #[test]
    fn test_none_format_receives_nothing() {
        let dispatcher = Dispatcher::new();
        let sink = CollectorChannel::default();
        dispatcher.add_sink("off", &RebroadcastFormat::None, sink.clone());

        let report = dispatcher.dispatch(&message(), None);
        assert_eq!(report.disabled, 1);
        assert!(sink.received().is_empty());
    }

    #[test]
    fn test_remove_sink_is_immediate_and_idempotent() {
        let dispatcher = Dispatcher::new();
        let sink = CollectorChannel::default();
        dispatcher.add_sink("a", &RebroadcastFormat::Port30003, sink.clone());
        dispatcher.dispatch(&message(), None);

        assert!(dispatcher.remove_sink("a"));
        assert!(!dispatcher.remove_sink("a"));
        assert!(!dispatcher.remove_sink("never-added"));
        assert!(dispatcher.is_empty());

        dispatcher.dispatch(&message(), None);
        assert_eq!(sink.received().len(), 1);
        assert!(dispatcher.stats("a").is_none());
    }

    #[test]
    fn test_removed_sink_queue_drains_then_closes() {
        let dispatcher = Dispatcher::new();
        let (tx, mut rx) = mpsc::channel::<Vec<u8>>(4);
        dispatcher.add_sink("a", &RebroadcastFormat::Port30003, tx);
        dispatcher.dispatch(&message(), None);

        dispatcher.remove_sink("a");
        dispatcher.dispatch(&message(), None);

        assert!(rx.try_recv().is_ok());
        assert_eq!(
            rx.try_recv().unwrap_err(),
            mpsc::error::TryRecvError::Disconnected
        );
    }

    #[test]
    fn test_padded_icao_reaches_compressed_sink() {
        let dispatcher = Dispatcher::new();
        let binary = CollectorChannel::default();
        let text = CollectorChannel::default();
        dispatcher.add_sink("binary", &RebroadcastFormat::CompressedVrs, binary.clone());
        dispatcher.add_sink("text", &RebroadcastFormat::Port30003, text.clone());

        for icao in ["  4840", "4840  "] {
            let line = format!(
                "MSG,3,1,1,{icao},1,2024/03/09,14:05:07.250,2024/03/09,14:05:07.250,,35000,,,,,,,,,,0"
            );
            let msg = codec::decode(&line).unwrap();
            let report = dispatcher.dispatch(&msg, None);
            assert_eq!(report.delivered, 2);
        }

        let received = binary.received();
        assert_eq!(received.len(), 2);
        let (first, _) = crate::compressed::decode(&received[0]).unwrap();
        assert_eq!(first.icao24(), "  4840");
        assert_eq!(text.received().len(), 2);
    }

    #[test]
    fn test_add_sink_replaces_same_name() {
        let dispatcher = Dispatcher::new();
        dispatcher.add_sink("a", &RebroadcastFormat::Port30003, CollectorChannel::default());
        dispatcher.add_sink("a", &RebroadcastFormat::Avr, CollectorChannel::default());
        dispatcher.add_sink("b", &RebroadcastFormat::Passthrough, CollectorChannel::default());
        assert_eq!(dispatcher.len(), 2);
        assert_eq!(dispatcher.sink_format("a"), Some(RebroadcastFormat::Avr));
        assert_eq!(dispatcher.sink_names(), vec!["a".to_string(), "b".to_string()]);
        assert!(dispatcher.contains("b"));
    }

    #[test]
    fn test_full_queue_drops_without_blocking() {
        let dispatcher = Dispatcher::new();
        let (tx, mut rx) = mpsc::channel::<Vec<u8>>(1);
        let other = CollectorChannel::default();
        dispatcher.add_sink("slow", &RebroadcastFormat::Port30003, tx);
        dispatcher.add_sink("fast", &RebroadcastFormat::Port30003, other.clone());

        for _ in 0..3 {
            dispatcher.dispatch(&message(), None);
        }

        assert_eq!(other.received().len(), 3);
        let stats = dispatcher.stats("slow").unwrap();
        assert_eq!(stats.delivered, 1);
        assert_eq!(stats.failed, 2);
        assert!(rx.try_recv().is_ok());
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_closed_channel_counts_as_failure() {
        let dispatcher = Dispatcher::new();
        let (tx, rx) = mpsc::channel::<Vec<u8>>(4);
        drop(rx);
        dispatcher.add_sink("gone", &RebroadcastFormat::Port30003, tx);
        let report = dispatcher.dispatch(&message(), None);
        assert_eq!(report.failed, 1);
    }

    #[test]
    fn test_concurrent_dispatch() {
        let dispatcher = Arc::new(Dispatcher::new());
        let sink = CollectorChannel::default();
        dispatcher.add_sink("a", &RebroadcastFormat::CompressedVrs, sink.clone());

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let dispatcher = Arc::clone(&dispatcher);
                std::thread::spawn(move || {
                    let msg = message();
                    for _ in 0..25 {
                        dispatcher.dispatch(&msg, None);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(sink.received().len(), 100);
    }
}
