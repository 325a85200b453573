//! demovox-extract - writes one WAV file per speaker from a captured
//! voice packet log.
//!
//! The log is produced by an external recording parser: JSON lines,
//! one voice packet per line, payloads base64-encoded. Every speaker
//! found in the log comes out as `<speaker_id>.wav` in the output
//! directory, time-aligned to the recording start so the files stay in
//! sync when played together.

use std::io::{BufRead, BufReader};
use std::path::PathBuf;
use std::time::Instant;

use anyhow::{Context, Result};
use clap::Parser;
use demovox_audio::{ExtractConfig, Extractor, SyncMode, VoicePacket};

/// Extract per-speaker voice audio from a match packet log.
#[derive(Parser, Debug)]
#[command(name = "demovox-extract")]
#[command(about = "Extract per-speaker voice audio from a match packet log")]
#[command(version)]
struct Args {
    /// Packet log file (JSON lines, one voice packet per line)
    packets: PathBuf,

    /// Output directory for per-speaker WAV files
    #[arg(short, long, default_value = "output")]
    out: PathBuf,

    /// Anchor mode: elapsed (wall clock, default) or frame
    #[arg(long, default_value = "elapsed")]
    sync: SyncMode,

    /// Match tick rate in frames per second
    #[arg(long, default_value_t = 64)]
    tick_rate: u32,

    /// Output sample rate in Hz
    #[arg(long, default_value_t = 48_000)]
    sample_rate: u32,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let level = if args.verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .init();

    let started = Instant::now();

    let packets = read_packet_log(&args.packets)?;
    tracing::info!(
        packets = packets.len(),
        path = %args.packets.display(),
        "packet log loaded"
    );

    std::fs::create_dir_all(&args.out)
        .with_context(|| format!("creating output directory {}", args.out.display()))?;

    let config = ExtractConfig {
        sample_rate: args.sample_rate,
        tick_rate: args.tick_rate,
        sync: args.sync,
        output_dir: args.out.clone(),
    };

    let reports = Extractor::new(config).run(packets).await;
    tracing::info!(elapsed = ?started.elapsed(), "extraction finished");

    let mut failed = 0usize;
    println!("=== Speakers ({}) ===", reports.len());
    for report in &reports {
        match &report.outcome {
            Ok(file) => println!(
                "  {:<20} {:>6} packets  {:>12} samples  {:>10.1?}  {}",
                report.speaker,
                report.packets,
                file.samples,
                file.duration,
                file.path.display()
            ),
            Err(e) => {
                failed += 1;
                println!(
                    "  {:<20} {:>6} packets  FAILED: {}",
                    report.speaker, report.packets, e
                );
            }
        }
    }

    if failed > 0 {
        anyhow::bail!("{} of {} speakers failed", failed, reports.len());
    }
    Ok(())
}

/// Reads a JSON-lines packet log, keeping the recording's order.
fn read_packet_log(path: &PathBuf) -> Result<Vec<VoicePacket>> {
    let file = std::fs::File::open(path)
        .with_context(|| format!("opening packet log {}", path.display()))?;

    let mut packets = Vec::new();
    for (lineno, line) in BufReader::new(file).lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let packet: VoicePacket = serde_json::from_str(&line)
            .with_context(|| format!("{}:{}: malformed packet", path.display(), lineno + 1))?;
        packets.push(packet);
    }
    Ok(packets)
}
