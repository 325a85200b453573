//! Batch extraction: demultiplex, reconstruct, write.
//!
//! Speakers are fully independent once demultiplexed, so each one is
//! reconstructed on its own blocking worker with exclusive ownership
//! of its packets, decoder, and timeline. One speaker failing never
//! aborts the batch; every outcome lands in a [`SpeakerReport`].

use crate::codec::{self, CodecError};
use crate::packet::{demux, SpeakerId, VoiceFormat, VoicePacket};
use crate::sink::{SampleSink, SinkError, WavSink};
use crate::timeline::{reconstruct, SyncMode, TimelineError};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{error, info};

/// Extraction settings.
#[derive(Debug, Clone)]
pub struct ExtractConfig {
    /// Output sample rate in Hz.
    pub sample_rate: u32,
    /// Match tick rate (frames per second of the recording).
    pub tick_rate: u32,
    /// How packet anchors map onto the timeline.
    pub sync: SyncMode,
    /// Directory receiving one WAV per speaker.
    pub output_dir: PathBuf,
}

impl Default for ExtractConfig {
    fn default() -> Self {
        Self {
            sample_rate: 48_000,
            tick_rate: 64,
            sync: SyncMode::Elapsed,
            output_dir: PathBuf::from("output"),
        }
    }
}

impl ExtractConfig {
    /// Output samples spanned by one match frame (750 for 48kHz / 64).
    pub fn samples_per_frame(&self) -> u64 {
        (self.sample_rate / self.tick_rate) as u64
    }
}

/// Why one speaker's extraction failed. Never fatal to the batch.
#[derive(Debug, Error)]
pub enum SpeakerError {
    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error(transparent)]
    Timeline(#[from] TimelineError),

    #[error(transparent)]
    Sink(#[from] SinkError),

    #[error("speaker worker failed: {0}")]
    Worker(String),
}

/// File written for one speaker.
#[derive(Debug, Clone)]
pub struct WrittenFile {
    pub path: PathBuf,
    pub samples: u64,
    pub duration: Duration,
}

/// Outcome of one speaker's extraction.
#[derive(Debug)]
pub struct SpeakerReport {
    pub speaker: SpeakerId,
    /// Packets the recording carried for this speaker.
    pub packets: usize,
    pub outcome: Result<WrittenFile, SpeakerError>,
}

/// Batch extractor: one run over a complete packet log.
pub struct Extractor {
    config: ExtractConfig,
    sink: Arc<dyn SampleSink>,
}

impl Extractor {
    /// Creates an extractor writing WAV files into the configured
    /// output directory.
    pub fn new(config: ExtractConfig) -> Self {
        let sink = Arc::new(WavSink::new(&config.output_dir));
        Self { config, sink }
    }

    /// Creates an extractor with a custom sink.
    pub fn with_sink(config: ExtractConfig, sink: Arc<dyn SampleSink>) -> Self {
        Self { config, sink }
    }

    /// Extracts every speaker found in the packet log.
    ///
    /// Reports come back in speaker order regardless of worker
    /// scheduling.
    pub async fn run(&self, packets: Vec<VoicePacket>) -> Vec<SpeakerReport> {
        let groups = demux(packets);
        info!(speakers = groups.len(), "demultiplexed packet log");

        let mut workers = Vec::with_capacity(groups.len());
        for (speaker, group) in groups {
            let config = self.config.clone();
            let sink = Arc::clone(&self.sink);
            let handle = tokio::task::spawn_blocking(move || {
                extract_speaker(speaker, group, &config, sink.as_ref())
            });
            workers.push((speaker, handle));
        }

        let mut reports = Vec::with_capacity(workers.len());
        for (speaker, handle) in workers {
            let report = match handle.await {
                Ok(report) => report,
                Err(e) => SpeakerReport {
                    speaker,
                    packets: 0,
                    outcome: Err(SpeakerError::Worker(e.to_string())),
                },
            };
            reports.push(report);
        }
        reports
    }
}

/// Runs one speaker end to end: pick a decoder from the declared
/// format, reconstruct the timeline, hand it to the sink once.
fn extract_speaker(
    speaker: SpeakerId,
    packets: Vec<VoicePacket>,
    config: &ExtractConfig,
    sink: &dyn SampleSink,
) -> SpeakerReport {
    let packet_count = packets.len();

    let outcome: Result<WrittenFile, SpeakerError> = (|| {
        let format = packets
            .first()
            .map(|p| p.format.clone())
            .unwrap_or(VoiceFormat::Opus);
        let mut decoder = codec::for_format(&format, config.sample_rate)?;

        let timeline = reconstruct(
            speaker,
            &packets,
            decoder.as_mut(),
            config.sync,
            config.sample_rate,
            config.samples_per_frame(),
        )?;

        let samples = timeline.len();
        let duration = timeline.duration();
        let path = sink.write(speaker, &timeline)?;

        info!(
            speaker = %speaker,
            packets = packet_count,
            samples,
            duration = ?duration,
            path = %path.display(),
            "speaker extracted"
        );

        Ok(WrittenFile {
            path,
            samples,
            duration,
        })
    })();

    if let Err(e) = &outcome {
        error!(speaker = %speaker, error = %e, "speaker extraction failed");
    }

    SpeakerReport {
        speaker,
        packets: packet_count,
        outcome,
    }
}
