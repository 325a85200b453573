//! Legacy Steam voice container decoder.
//!
//! Older recordings wrap voice data in the Steam voice container
//! instead of raw Opus frames. A payload is little-endian throughout:
//!
//! ```text
//! +----------------+-----------------------------+-----------+
//! | speaker id u64 | opcode stream               | crc32 u32 |
//! +----------------+-----------------------------+-----------+
//! ```
//!
//! Opcodes:
//! - `0x0B <u16 rate>`: sample rate the voice data was captured at
//! - `0x06 <u16 len> <data>`: Opus data; a sequence of sub-frames,
//!   each `<u16 len> <frame>`, where a length of `0xFFFF` resets the
//!   codec state and ends the block
//! - `0x00 <u16 samples>`: silence, counted at the declared rate
//!
//! The CRC covers everything before the trailer. Silence counts are
//! rescaled from the declared rate to the output rate; Opus data is
//! decoded straight to the output rate since libopus resamples
//! internally.

use super::opus::OpusDecoder;
use super::{CodecError, VoiceDecoder};

const OP_SILENCE: u8 = 0x00;
const OP_OPUS_DATA: u8 = 0x06;
const OP_SAMPLE_RATE: u8 = 0x0B;

/// Sub-frame length marking a codec reset / end of data block.
const FRAME_RESET: u16 = 0xFFFF;

/// Rate assumed until the container declares one. Every recording
/// observed so far uses 24kHz.
const DEFAULT_DECLARED_RATE: u32 = 24_000;

/// Decoder for Steam voice container payloads.
pub struct SteamDecoder {
    opus: OpusDecoder,
    output_rate: u32,
    declared_rate: u32,
}

impl SteamDecoder {
    /// Creates a decoder emitting mono PCM at `output_rate`.
    pub fn new(output_rate: u32) -> Result<Self, CodecError> {
        Ok(Self {
            opus: OpusDecoder::new(output_rate)?,
            output_rate,
            declared_rate: DEFAULT_DECLARED_RATE,
        })
    }

    /// Decodes one data block: `<u16 len><frame>` sub-frames.
    fn decode_block(&mut self, block: &[u8], pcm: &mut Vec<i16>) -> Result<(), CodecError> {
        let mut r = Reader::new(block);
        while r.remaining() > 0 {
            let len = r.u16()?;
            if len == FRAME_RESET {
                self.opus = OpusDecoder::new(self.output_rate)?;
                break;
            }
            let frame = r.bytes(len as usize)?;
            pcm.extend(self.opus.decode_frame(frame)?);
        }
        Ok(())
    }
}

impl VoiceDecoder for SteamDecoder {
    fn decode(&mut self, payload: &[u8]) -> Result<Vec<i16>, CodecError> {
        // Smallest possible payload: id, one opcode with operand, crc.
        if payload.len() < 8 + 3 + 4 {
            return Err(CodecError::Container("payload too short".to_string()));
        }

        let (body, trailer) = payload.split_at(payload.len() - 4);
        let declared = u32::from_le_bytes([trailer[0], trailer[1], trailer[2], trailer[3]]);
        if crc32(body) != declared {
            return Err(CodecError::Checksum);
        }

        let mut pcm = Vec::new();
        let mut r = Reader::new(&body[8..]); // skip the embedded speaker id

        while r.remaining() > 0 {
            match r.u8()? {
                OP_SAMPLE_RATE => {
                    self.declared_rate = r.u16()? as u32;
                }
                OP_OPUS_DATA => {
                    let len = r.u16()? as usize;
                    let block = r.bytes(len)?;
                    self.decode_block(block, &mut pcm)?;
                }
                OP_SILENCE => {
                    let samples = r.u16()? as u64;
                    let scaled = samples * self.output_rate as u64 / self.declared_rate as u64;
                    pcm.extend(std::iter::repeat_n(0i16, scaled as usize));
                }
                op => {
                    return Err(CodecError::Container(format!("unknown opcode {:#04x}", op)));
                }
            }
        }

        Ok(pcm)
    }
}

/// Little-endian cursor over a container body.
struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    fn u8(&mut self) -> Result<u8, CodecError> {
        let b = self.bytes(1)?;
        Ok(b[0])
    }

    fn u16(&mut self) -> Result<u16, CodecError> {
        let b = self.bytes(2)?;
        Ok(u16::from_le_bytes([b[0], b[1]]))
    }

    fn bytes(&mut self, n: usize) -> Result<&'a [u8], CodecError> {
        if self.remaining() < n {
            return Err(CodecError::Container("truncated payload".to_string()));
        }
        let out = &self.data[self.pos..self.pos + n];
        self.pos += n;
        Ok(out)
    }
}

/// CRC-32 (reflected IEEE polynomial) over the container body.
fn crc32(data: &[u8]) -> u32 {
    let mut crc = 0xFFFF_FFFFu32;
    for &byte in data {
        crc ^= byte as u32;
        for _ in 0..8 {
            let mask = (crc & 1).wrapping_neg();
            crc = (crc >> 1) ^ (0xEDB8_8320 & mask);
        }
    }
    !crc
}
