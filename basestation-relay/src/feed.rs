//! BaseStation feed input: a TCP source with reconnect, or a replayed file.
//!
//! Every line is decoded and offered to the dispatcher together with the
//! line itself as the raw frame, so Passthrough sinks see exactly what the
//! source sent.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio::net::TcpStream;
use tracing::{debug, info, warn};

use basestation_core::codec::{self, LINE_TERMINATOR};
use basestation_core::{Dispatcher, RawFrame};

/// Running totals for one feed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FeedStats {
    pub lines: u64,
    pub decoded: u64,
    pub malformed: u64,
}

/// Decode one feed line and dispatch it. Blank lines are ignored.
///
/// The raw frame is the line as received, terminator included; a line that
/// arrived without one gets `\r\n`.
pub fn process_line(dispatcher: &Dispatcher, line: &str, stats: &mut FeedStats) {
    let text = line.trim_end_matches(['\r', '\n']);
    if text.trim().is_empty() {
        return;
    }
    stats.lines += 1;

    match codec::decode(text) {
        Ok(message) => {
            stats.decoded += 1;
            let raw = if text.len() == line.len() {
                RawFrame::opaque(format!("{line}{LINE_TERMINATOR}"))
            } else {
                RawFrame::opaque(line)
            };
            dispatcher.dispatch(&message, Some(&raw));
        }
        Err(e) => {
            stats.malformed += 1;
            debug!(field = e.field_index(), error = %e, "malformed feed line");
        }
    }
}

/// Same as [`process_line`] for bytes straight off the wire. A line that is
/// not UTF-8 counts as malformed.
pub fn process_bytes(dispatcher: &Dispatcher, bytes: &[u8], stats: &mut FeedStats) {
    match std::str::from_utf8(bytes) {
        Ok(line) => process_line(dispatcher, line, stats),
        Err(e) => {
            stats.lines += 1;
            stats.malformed += 1;
            debug!(error = %e, "feed line is not UTF-8");
        }
    }
}

/// Read one `\n`-terminated line into `buf`. False at end of input.
async fn read_line<R>(reader: &mut R, buf: &mut Vec<u8>) -> std::io::Result<bool>
where
    R: AsyncBufRead + Unpin,
{
    buf.clear();
    Ok(reader.read_until(b'\n', buf).await? > 0)
}

/// Dispatch every line from `reader` until end of input.
pub async fn pump<R>(mut reader: R, dispatcher: &Dispatcher, stats: &mut FeedStats) -> Result<()>
where
    R: AsyncBufRead + Unpin,
{
    let mut buf = Vec::new();
    while read_line(&mut reader, &mut buf).await? {
        process_bytes(dispatcher, &buf, stats);
    }
    Ok(())
}

/// Replay a file of BaseStation lines, optionally pacing them.
pub async fn replay_file(path: &Path, pace: Duration, dispatcher: Arc<Dispatcher>) -> Result<FeedStats> {
    let file = tokio::fs::File::open(path)
        .await
        .with_context(|| format!("opening replay file {}", path.display()))?;
    let mut reader = BufReader::new(file);
    let mut buf = Vec::new();
    let mut stats = FeedStats::default();

    while read_line(&mut reader, &mut buf).await? {
        process_bytes(&dispatcher, &buf, &mut stats);
        if !pace.is_zero() {
            tokio::time::sleep(pace).await;
        }
    }

    info!(
        path = %path.display(),
        lines = stats.lines,
        decoded = stats.decoded,
        malformed = stats.malformed,
        "replay finished"
    );
    Ok(stats)
}

/// Read the BaseStation feed at `address` forever, reconnecting after
/// `reconnect` whenever the connection fails or closes.
pub async fn run_source(address: String, reconnect: Duration, dispatcher: Arc<Dispatcher>) {
    let mut stats = FeedStats::default();
    loop {
        match TcpStream::connect(&address).await {
            Ok(stream) => {
                info!(%address, "connected to feed");
                match pump(BufReader::new(stream), &dispatcher, &mut stats).await {
                    Ok(()) => warn!(%address, "feed closed by source"),
                    Err(e) => warn!(%address, error = %e, "feed read failed"),
                }
                info!(
                    lines = stats.lines,
                    decoded = stats.decoded,
                    malformed = stats.malformed,
                    "feed totals"
                );
            }
            Err(e) => warn!(%address, error = %e, "cannot connect to feed"),
        }
        tokio::time::sleep(reconnect).await;
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
