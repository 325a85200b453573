//! Sample sinks for finished timelines.

use crate::packet::SpeakerId;
use crate::timeline::Timeline;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Sink error.
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("sink: io: {0}")]
    Io(#[from] io::Error),

    #[error("sink: wav: {0}")]
    Wav(String),
}

impl From<hound::Error> for SinkError {
    fn from(e: hound::Error) -> Self {
        match e {
            hound::Error::IoError(e) => Self::Io(e),
            other => Self::Wav(other.to_string()),
        }
    }
}

/// Destination for one speaker's finished timeline.
///
/// `write` is invoked exactly once per speaker, after reconstruction
/// completes. Returns where the audio landed.
pub trait SampleSink: Send + Sync {
    fn write(&self, speaker: SpeakerId, timeline: &Timeline) -> Result<PathBuf, SinkError>;
}

/// Writes each speaker's timeline as `<speaker_id>.wav` in one
/// directory: mono, 32-bit integer PCM at the timeline's rate.
pub struct WavSink {
    dir: PathBuf,
}

impl WavSink {
    /// Creates a sink writing into `dir`. The directory must exist.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Returns the deterministic output path for a speaker.
    pub fn path_for(&self, speaker: SpeakerId) -> PathBuf {
        self.dir.join(format!("{}.wav", speaker.as_u64()))
    }

    /// Returns the output directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl SampleSink for WavSink {
    fn write(&self, speaker: SpeakerId, timeline: &Timeline) -> Result<PathBuf, SinkError> {
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: timeline.sample_rate(),
            bits_per_sample: 32,
            sample_format: hound::SampleFormat::Int,
        };

        let path = self.path_for(speaker);
        let mut writer = hound::WavWriter::create(&path, spec)?;
        for &s in timeline.samples() {
            writer.write_sample(s)?;
        }
        writer.finalize()?;

        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_dir(tag: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "demovox-sink-{}-{}",
            tag,
            std::process::id()
        ));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn test_wav_roundtrip() {
        let dir = temp_dir("roundtrip");
        let sink = WavSink::new(&dir);

        let mut timeline = Timeline::new(48_000);
        timeline.extend_silence(100);
        timeline.append(&[1000; 50]);

        let speaker = SpeakerId(76561198000000001);
        let path = sink.write(speaker, &timeline).unwrap();
        assert_eq!(path.file_name().unwrap(), "76561198000000001.wav");

        let mut reader = hound::WavReader::open(&path).unwrap();
        let spec = reader.spec();
        assert_eq!(spec.channels, 1);
        assert_eq!(spec.sample_rate, 48_000);
        assert_eq!(spec.bits_per_sample, 32);

        let samples: Vec<i32> = reader.samples::<i32>().map(|s| s.unwrap()).collect();
        assert_eq!(samples.len(), 150);
        assert!(samples[..100].iter().all(|&s| s == 0));
        assert!(samples[100..].iter().all(|&s| s == 1000 << 16));

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_missing_directory_is_io_error() {
        let sink = WavSink::new("/nonexistent/demovox");
        let timeline = Timeline::new(48_000);
        let err = sink.write(SpeakerId(1), &timeline).unwrap_err();
        assert!(matches!(err, SinkError::Io(_)));
    }
}
