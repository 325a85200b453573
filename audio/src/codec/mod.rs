//! Voice payload decoders.
//!
//! Codec state persists packet to packet within one speaker's stream,
//! so a decoder is constructed once per speaker from the declared
//! [`VoiceFormat`](crate::packet::VoiceFormat) and never shared.

pub(crate) mod opus;
mod steam;

pub use opus::OpusDecoder;
pub use steam::SteamDecoder;

use crate::packet::VoiceFormat;
use thiserror::Error;

/// Decoder error.
#[derive(Debug, Error)]
pub enum CodecError {
    /// The recording declared a format this crate cannot decode.
    #[error("codec: unsupported voice format: {0}")]
    Unsupported(String),

    /// libopus rejected the payload or the decoder configuration.
    #[error("codec: opus: {0}")]
    Opus(String),

    /// Malformed legacy Steam voice container.
    #[error("codec: steam container: {0}")]
    Container(String),

    /// Steam voice container checksum mismatch.
    #[error("codec: steam container checksum mismatch")]
    Checksum,
}

/// Stateful per-speaker payload decoder.
pub trait VoiceDecoder: Send {
    /// Decodes one packet's payload into mono PCM at the output rate.
    /// An empty result is valid: the payload encoded silence only.
    fn decode(&mut self, payload: &[u8]) -> Result<Vec<i16>, CodecError>;
}

/// Creates the decoder for a speaker's declared format.
pub fn for_format(
    format: &VoiceFormat,
    sample_rate: u32,
) -> Result<Box<dyn VoiceDecoder>, CodecError> {
    match format {
        VoiceFormat::Opus => Ok(Box::new(OpusDecoder::new(sample_rate)?)),
        VoiceFormat::Steam => Ok(Box::new(SteamDecoder::new(sample_rate)?)),
        VoiceFormat::Other(name) => Err(CodecError::Unsupported(name.clone())),
    }
}
