//! Opus decoder adapter.

use super::{CodecError, VoiceDecoder};
use audiopus::coder::Decoder;
use audiopus::{Channels, SampleRate, TryFrom};

/// Longest legal Opus frame is 120ms.
const MAX_FRAME_MS: usize = 120;

/// Stateful mono Opus decoder producing PCM at a fixed output rate.
///
/// libopus resamples internally, so the output rate does not have to
/// match the rate the stream was encoded at.
pub struct OpusDecoder {
    inner: Decoder,
    sample_rate: u32,
}

impl OpusDecoder {
    /// Creates a decoder emitting mono PCM at `sample_rate`.
    pub fn new(sample_rate: u32) -> Result<Self, CodecError> {
        let rate = <SampleRate as TryFrom<i32>>::try_from(sample_rate as i32)
            .map_err(|e| CodecError::Opus(e.to_string()))?;
        let inner =
            Decoder::new(rate, Channels::Mono).map_err(|e| CodecError::Opus(e.to_string()))?;
        Ok(Self { inner, sample_rate })
    }

    /// Returns the output sample rate in Hz.
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Decodes one raw Opus frame.
    pub(crate) fn decode_frame(&mut self, frame: &[u8]) -> Result<Vec<i16>, CodecError> {
        let max_samples = self.sample_rate as usize * MAX_FRAME_MS / 1000;
        let mut pcm = vec![0i16; max_samples];

        let n = self
            .inner
            .decode(Some(frame), &mut pcm, false)
            .map_err(|e| CodecError::Opus(e.to_string()))?;

        pcm.truncate(n);
        Ok(pcm)
    }
}

impl VoiceDecoder for OpusDecoder {
    fn decode(&mut self, payload: &[u8]) -> Result<Vec<i16>, CodecError> {
        if payload.is_empty() {
            // Silence-only packet: nothing to place.
            return Ok(Vec::new());
        }
        self.decode_frame(payload)
    }
}
