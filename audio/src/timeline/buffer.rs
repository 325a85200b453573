//! Append-only sample buffer backing one speaker's timeline.

use std::time::Duration;

/// Left shift widening decoded 16-bit PCM to the 32-bit output width.
const WIDEN_SHIFT: u32 = 16;

/// One speaker's dense, fixed-rate waveform.
///
/// Samples are indexed by absolute position from the recording start.
/// The buffer only ever grows: silence is appended by extending the
/// length with zeros, audio by appending decoded samples at the
/// current end. Nothing is ever written before the current end, so
/// placed audio can never be overwritten.
#[derive(Debug, Clone)]
pub struct Timeline {
    samples: Vec<i32>,
    sample_rate: u32,
}

impl Timeline {
    /// Creates an empty timeline at the given output rate.
    pub fn new(sample_rate: u32) -> Self {
        Self {
            samples: Vec::new(),
            sample_rate,
        }
    }

    /// Creates an empty timeline with pre-sized backing storage.
    pub fn with_capacity(sample_rate: u32, capacity: usize) -> Self {
        Self {
            samples: Vec::with_capacity(capacity),
            sample_rate,
        }
    }

    /// Returns the output sample rate in Hz.
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Returns the current length in samples. This is also the write
    /// cursor: the absolute position the next sample will land on.
    pub fn len(&self) -> u64 {
        self.samples.len() as u64
    }

    /// Returns true if nothing has been placed yet.
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Returns the covered span as wall-clock time.
    pub fn duration(&self) -> Duration {
        Duration::from_nanos(
            (self.samples.len() as u128 * 1_000_000_000 / self.sample_rate as u128) as u64,
        )
    }

    /// Extends the timeline with `count` silent samples.
    pub fn extend_silence(&mut self, count: u64) {
        let new_len = self.samples.len() + count as usize;
        self.samples.resize(new_len, 0);
    }

    /// Appends decoded 16-bit samples, widened to the output width.
    pub fn append(&mut self, pcm: &[i16]) {
        self.samples.reserve(pcm.len());
        self.samples
            .extend(pcm.iter().map(|&s| (s as i32) << WIDEN_SHIFT));
    }

    /// Returns the placed samples.
    pub fn samples(&self) -> &[i32] {
        &self.samples
    }

    /// Consumes the timeline and returns the sample buffer.
    pub fn into_samples(self) -> Vec<i32> {
        self.samples
    }
}
