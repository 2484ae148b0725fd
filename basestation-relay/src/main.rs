//! bsrelay: CLI + TCP rebroadcast relay for BaseStation feeds.

use std::collections::HashMap;
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use comfy_table::{Cell, Table};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use basestation_core::codec;
use basestation_core::config::{self, load_config, load_config_from, save_config};
use basestation_core::rebroadcast::AvrFormatter;
use basestation_core::{BaseStationMessage, Dispatcher, Formatter, RawFrame, RebroadcastFormat};

mod feed;
mod net;

#[derive(Parser)]
#[command(name = "bsrelay", version, about = "BaseStation feed decoder and rebroadcast relay")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Decode BaseStation lines from a file and print aircraft table
    Decode {
        /// Path to file containing BaseStation lines, or `-` for stdin
        file: PathBuf,

        /// Print each decoded message as JSON instead of the summary table
        #[arg(short, long)]
        raw: bool,
    },

    /// Re-emit a BaseStation (or AVR) file in a rebroadcast format on stdout
    Translate {
        /// Path to input file, or `-` for stdin
        file: PathBuf,

        /// Output format: Port30003, Avr, Passthrough, CompressedVRS.
        /// Passthrough copies each input line byte for byte.
        #[arg(short, long, value_parser = parse_format)]
        format: RebroadcastFormat,
    },

    /// Run the rebroadcast relay
    Relay {
        /// Config file (default: ~/.basestation-relay/config.toml)
        #[arg(long, env = "BSRELAY_CONFIG")]
        config: Option<PathBuf>,

        /// BaseStation feed address, overrides the config file
        #[arg(long, env = "BSRELAY_SOURCE")]
        source: Option<String>,

        /// Replay a file of BaseStation lines instead of connecting to a feed
        #[arg(long)]
        replay: Option<PathBuf>,

        /// Milliseconds between replayed lines
        #[arg(long, default_value = "0")]
        pace_ms: u64,
    },

    /// Write the default config file
    InitConfig {
        /// Overwrite an existing config file
        #[arg(long)]
        force: bool,
    },

    /// List the rebroadcast formats
    Formats,
}

fn parse_format(token: &str) -> Result<RebroadcastFormat, String> {
    match RebroadcastFormat::from_token(token) {
        RebroadcastFormat::Unknown(_) | RebroadcastFormat::None => {
            let names: Vec<String> = RebroadcastFormat::ALL
                .into_iter()
                .filter(|f| *f != RebroadcastFormat::None)
                .map(String::from)
                .collect();
            Err(format!("unknown format {token:?}, expected one of {}", names.join(", ")))
        }
        format => Ok(format),
    }
}

/// Accumulated aircraft state from decoded messages.
struct AircraftState {
    icao: String,
    callsign: Option<String>,
    squawk: Option<i32>,
    altitude_ft: Option<i32>,
    speed_kts: Option<f64>,
    track_deg: Option<f64>,
    vertical_rate: Option<i32>,
    lat: Option<f64>,
    lon: Option<f64>,
    on_ground: Option<bool>,
    messages: u32,
}

impl AircraftState {
    fn new(icao: &str) -> Self {
        AircraftState {
            icao: icao.to_string(),
            callsign: None,
            squawk: None,
            altitude_ft: None,
            speed_kts: None,
            track_deg: None,
            vertical_rate: None,
            lat: None,
            lon: None,
            on_ground: None,
            messages: 0,
        }
    }

    fn update(&mut self, msg: &BaseStationMessage) {
        self.messages += 1;
        if let Some(callsign) = msg.callsign() {
            let callsign = callsign.trim();
            if !callsign.is_empty() {
                self.callsign = Some(callsign.to_string());
            }
        }
        self.squawk = msg.squawk().or(self.squawk);
        self.altitude_ft = msg.altitude().or(self.altitude_ft);
        self.speed_kts = msg.ground_speed().or(self.speed_kts);
        self.track_deg = msg.track().or(self.track_deg);
        self.vertical_rate = msg.vertical_rate().or(self.vertical_rate);
        self.on_ground = msg.on_ground().or(self.on_ground);
        if msg.has_position() {
            self.lat = msg.latitude();
            self.lon = msg.longitude();
        }
    }
}

/// What one input line became after translation.
#[derive(Debug, PartialEq)]
enum Translated {
    Bytes(Vec<u8>),
    Unavailable,
    Malformed,
    Skipped,
}

/// Translate one input line, given exactly as read (terminator included).
/// Passthrough output is those bytes unchanged.
fn translate_line(formatter: &dyn Formatter, input: &[u8]) -> Translated {
    let Ok(text) = std::str::from_utf8(input) else {
        debug!("line is not UTF-8");
        return Translated::Malformed;
    };
    let line = text.trim_end_matches(['\r', '\n']);
    if line.trim().is_empty() || line.starts_with('#') {
        return Translated::Skipped;
    }

    // AVR input carries no BaseStation fields, only the frame itself
    if let Some(frame) = RawFrame::from_avr(line) {
        return match (formatter.format(), frame.mode_s_bytes()) {
            (RebroadcastFormat::Avr, Some(bytes)) => {
                Translated::Bytes(AvrFormatter::line(bytes).into_bytes())
            }
            (RebroadcastFormat::Passthrough, _) => Translated::Bytes(input.to_vec()),
            _ => Translated::Unavailable,
        };
    }

    let message = match codec::decode(line) {
        Ok(m) => m,
        Err(e) => {
            debug!(field = e.field_index(), error = %e, "malformed line");
            return Translated::Malformed;
        }
    };
    let raw = RawFrame::opaque(input);
    match formatter.produce(&message, Some(&raw)) {
        Ok(Some(bytes)) => Translated::Bytes(bytes),
        Ok(None) => Translated::Skipped,
        Err(e) => {
            debug!(error = %e, "format unavailable");
            Translated::Unavailable
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_writer(io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Decode { file, raw } => cmd_decode(&file, raw),
        Commands::Translate { file, format } => cmd_translate(&file, &format),
        Commands::Relay {
            config,
            source,
            replay,
            pace_ms,
        } => cmd_relay(config, source, replay, pace_ms).await,
        Commands::InitConfig { force } => cmd_init_config(force),
        Commands::Formats => {
            cmd_formats();
            Ok(())
        }
    }
}

fn open_input(file: &Path) -> Result<Box<dyn BufRead>> {
    if file.to_str() == Some("-") {
        return Ok(Box::new(io::stdin().lock()));
    }
    let f = std::fs::File::open(file).with_context(|| format!("opening {}", file.display()))?;
    Ok(Box::new(io::BufReader::new(f)))
}

fn cmd_decode(file: &Path, raw: bool) -> Result<()> {
    let reader = open_input(file)?;

    let mut aircraft: HashMap<String, AircraftState> = HashMap::new();
    let mut total_lines = 0u64;
    let mut decoded_lines = 0u64;
    let mut malformed_lines = 0u64;
    let stdout = io::stdout();
    let mut out = stdout.lock();

    for (n, line) in reader.lines().enumerate() {
        let line = line.with_context(|| format!("reading {}", file.display()))?;
        if line.trim().is_empty() {
            continue;
        }
        total_lines += 1;

        let msg = match codec::decode(&line) {
            Ok(m) => m,
            Err(e) => {
                malformed_lines += 1;
                debug!(line = n + 1, field = e.field_index(), error = %e, "malformed line");
                continue;
            }
        };
        decoded_lines += 1;

        if raw {
            serde_json::to_writer(&mut out, &msg)?;
            writeln!(out)?;
        }

        aircraft
            .entry(msg.icao24().to_string())
            .or_insert_with(|| AircraftState::new(msg.icao24()))
            .update(&msg);
    }

    if !raw {
        print_summary(&aircraft, total_lines, decoded_lines, malformed_lines);
    }
    Ok(())
}

fn cmd_translate(file: &Path, format: &RebroadcastFormat) -> Result<()> {
    let mut reader = open_input(file)?;
    let formatter = basestation_core::formatter_for(format);
    let stdout = io::stdout();
    let mut out = io::BufWriter::new(stdout.lock());

    let (mut emitted, mut unavailable, mut malformed) = (0u64, 0u64, 0u64);
    let mut buf = Vec::new();
    loop {
        buf.clear();
        let read = reader
            .read_until(b'\n', &mut buf)
            .with_context(|| format!("reading {}", file.display()))?;
        if read == 0 {
            break;
        }
        match translate_line(formatter.as_ref(), &buf) {
            Translated::Bytes(bytes) => {
                out.write_all(&bytes)?;
                emitted += 1;
            }
            Translated::Unavailable => unavailable += 1,
            Translated::Malformed => malformed += 1,
            Translated::Skipped => {}
        }
    }
    out.flush()?;

    eprintln!("{format}: {emitted} emitted, {unavailable} unavailable, {malformed} malformed");
    Ok(())
}

async fn cmd_relay(
    config_path: Option<PathBuf>,
    source: Option<String>,
    replay: Option<PathBuf>,
    pace_ms: u64,
) -> Result<()> {
    let mut config = match &config_path {
        Some(path) => load_config_from(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => load_config(),
    };
    if let Some(address) = source {
        config.source.address = address;
    }
    config.validate()?;
    if config.sinks.is_empty() {
        bail!("no sinks configured");
    }

    let dispatcher = Arc::new(Dispatcher::new());
    let sinks = net::bind_sinks(&config.sinks, config.queue_depth, &dispatcher).await?;

    let feed = {
        let dispatcher = Arc::clone(&dispatcher);
        let address = config.source.address.clone();
        let reconnect = Duration::from_secs(config.source.reconnect_secs.max(1));
        async move {
            match replay {
                Some(path) => feed::replay_file(&path, Duration::from_millis(pace_ms), dispatcher)
                    .await
                    .map(|_| ()),
                None => {
                    feed::run_source(address, reconnect, dispatcher).await;
                    Ok(())
                }
            }
        }
    };

    tokio::select! {
        result = feed => {
            result?;
            info!("feed finished, serving connected clients until Ctrl-C");
            tokio::signal::ctrl_c().await?;
        }
        signal = tokio::signal::ctrl_c() => {
            signal?;
        }
    }
    info!("shutting down");

    for sink in &sinks {
        if let Some(stats) = dispatcher.stats(&sink.name) {
            info!(
                sink = %sink.name,
                addr = %sink.local_addr,
                delivered = stats.delivered,
                failed = stats.failed,
                unavailable = stats.unavailable,
                "sink totals"
            );
        }
        dispatcher.remove_sink(&sink.name);
        sink.task.abort();
    }
    Ok(())
}

fn cmd_init_config(force: bool) -> Result<()> {
    let path = config::config_file();
    if path.exists() && !force {
        bail!("{} already exists (use --force to overwrite)", path.display());
    }
    let path = save_config(&config::Config::default())?;
    println!("Wrote {}", path.display());
    Ok(())
}

fn cmd_formats() {
    let mut table = Table::new();
    table.set_header(vec!["Format", "Description", "Needs raw frame"]);
    for format in RebroadcastFormat::ALL {
        table.add_row(vec![
            Cell::new(format.token()),
            Cell::new(format.description()),
            Cell::new(if format.needs_raw_frame() { "yes" } else { "no" }),
        ]);
    }
    println!("{table}");
}

fn print_summary(
    aircraft: &HashMap<String, AircraftState>,
    total_lines: u64,
    decoded_lines: u64,
    malformed_lines: u64,
) {
    println!();
    println!(
        "Lines: {total_lines} read, {decoded_lines} decoded, {malformed_lines} malformed, {} aircraft",
        aircraft.len()
    );
    println!();

    if aircraft.is_empty() {
        return;
    }

    let mut table = Table::new();
    table.set_header(vec![
        "ICAO", "Callsign", "Squawk", "Alt (ft)", "Speed (kts)", "Track", "VRate", "Lat", "Lon",
        "Gnd", "Msgs",
    ]);

    let mut sorted: Vec<_> = aircraft.values().collect();
    sorted.sort_by_key(|a| std::cmp::Reverse(a.messages));

    for ac in sorted {
        table.add_row(vec![
            Cell::new(&ac.icao),
            Cell::new(ac.callsign.as_deref().unwrap_or("-")),
            Cell::new(ac.squawk.map(|s| format!("{s:04}")).unwrap_or("-".into())),
            Cell::new(
                ac.altitude_ft
                    .map(|a| a.to_string())
                    .unwrap_or("-".into()),
            ),
            Cell::new(
                ac.speed_kts
                    .map(|s| format!("{s:.0}"))
                    .unwrap_or("-".into()),
            ),
            Cell::new(
                ac.track_deg
                    .map(|h| format!("{h:.1}"))
                    .unwrap_or("-".into()),
            ),
            Cell::new(
                ac.vertical_rate
                    .map(|v| format!("{v:+}"))
                    .unwrap_or("-".into()),
            ),
            Cell::new(ac.lat.map(|l| format!("{l:.4}")).unwrap_or("-".into())),
            Cell::new(ac.lon.map(|l| format!("{l:.4}")).unwrap_or("-".into())),
            Cell::new(match ac.on_ground {
                Some(true) => "yes",
                Some(false) => "no",
                None => "-",
            }),
            Cell::new(ac.messages),
        ]);
    }

    println!("{table}");
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use basestation_core::formatter_for;

    const POSITION: &str = "MSG,3,1,2,4840D6,3,2024/03/09,14:05:07.250,2024/03/09,14:05:07.250,,35000,450.4,271.1,51.4775,-0.461389,,,,,,0";
    const IDENT: &str = "MSG,1,1,2,4840D6,3,2024/03/09,14:05:08.000,2024/03/09,14:05:08.000,BAW123  ,,,,,,,,,,,0";

    #[test]
    fn test_parse_format() {
        assert_eq!(parse_format("CompressedVRS"), Ok(RebroadcastFormat::CompressedVrs));
        assert_eq!(parse_format("Avr"), Ok(RebroadcastFormat::Avr));
        assert!(parse_format("None").is_err());
        assert!(parse_format("sbs").unwrap_err().contains("Port30003"));
    }

    #[test]
    fn test_aircraft_state_accumulates() {
        let mut state = AircraftState::new("4840D6");
        state.update(&codec::decode(POSITION).unwrap());
        state.update(&codec::decode(IDENT).unwrap());

        assert_eq!(state.messages, 2);
        assert_eq!(state.callsign.as_deref(), Some("BAW123"));
        assert_eq!(state.altitude_ft, Some(35000));
        assert_eq!(state.lat, Some(51.4775));
        assert_eq!(state.on_ground, Some(false));
    }

    #[test]
    fn test_translate_port30003() {
        let formatter = formatter_for(&RebroadcastFormat::Port30003);
        assert_eq!(
            translate_line(formatter.as_ref(), POSITION.as_bytes()),
            Translated::Bytes(format!("{POSITION}\r\n").into_bytes())
        );
        assert_eq!(translate_line(formatter.as_ref(), b"MSG,3"), Translated::Malformed);
        assert_eq!(translate_line(formatter.as_ref(), b""), Translated::Skipped);
    }

    #[test]
    fn test_translate_avr_needs_frames() {
        let formatter = formatter_for(&RebroadcastFormat::Avr);
        assert_eq!(translate_line(formatter.as_ref(), POSITION.as_bytes()), Translated::Unavailable);
        assert_eq!(
            translate_line(formatter.as_ref(), b"*8d4840d6202cc371c32ce0576098;\n"),
            Translated::Bytes(b"*8D4840D6202CC371C32CE0576098;\r\n".to_vec())
        );
    }

    #[test]
    fn test_translate_avr_input_to_text_unavailable() {
        let formatter = formatter_for(&RebroadcastFormat::Port30003);
        assert_eq!(
            translate_line(formatter.as_ref(), b"*8D4840D6202CC371C32CE0576098;\n"),
            Translated::Unavailable
        );
    }

    #[test]
    fn test_translate_passthrough_keeps_line() {
        let formatter = formatter_for(&RebroadcastFormat::Passthrough);
        let line = format!("{POSITION}\n");
        assert_eq!(
            translate_line(formatter.as_ref(), line.as_bytes()),
            Translated::Bytes(line.into_bytes())
        );

        let avr = b"  *8D4840D6202CC371C32CE0576098; \r\n";
        assert_eq!(
            translate_line(formatter.as_ref(), avr),
            Translated::Bytes(avr.to_vec())
        );
    }

    #[test]
    fn test_translate_invalid_utf8_is_malformed() {
        let formatter = formatter_for(&RebroadcastFormat::Port30003);
        assert_eq!(translate_line(formatter.as_ref(), b"MSG,\xff\n"), Translated::Malformed);
    }

    #[test]
    fn test_translate_compressed_decodes() {
        let formatter = formatter_for(&RebroadcastFormat::CompressedVrs);
        let Translated::Bytes(bytes) = translate_line(formatter.as_ref(), POSITION.as_bytes()) else {
            panic!("expected bytes");
        };
        let (msg, used) = basestation_core::compressed::decode(&bytes).unwrap();
        assert_eq!(used, bytes.len());
        assert_eq!(msg, codec::decode(POSITION).unwrap());
    }
}
