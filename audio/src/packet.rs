//! Voice packet model and per-speaker demultiplexing.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

/// Stable numeric identity of a transmitting player (a SteamID64 in
/// practice).
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(transparent)]
pub struct SpeakerId(pub u64);

impl SpeakerId {
    /// Returns the raw 64-bit identity.
    pub const fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for SpeakerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(&self.0.to_string())
    }
}

impl From<u64> for SpeakerId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

/// Encoding declared by the recording for a speaker's voice payloads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VoiceFormat {
    /// Raw Opus frames, one per packet.
    Opus,
    /// Legacy Steam voice container (opcode stream with a CRC trailer).
    Steam,
    /// A format name this crate does not understand.
    Other(String),
}

impl VoiceFormat {
    /// Maps a format name as it appears in recordings onto a variant.
    pub fn from_name(name: &str) -> Self {
        match name {
            "VOICEDATA_FORMAT_OPUS" | "opus" => Self::Opus,
            "VOICEDATA_FORMAT_STEAM" | "steam" => Self::Steam,
            other => Self::Other(other.to_string()),
        }
    }
}

impl fmt::Display for VoiceFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Opus => write!(f, "opus"),
            Self::Steam => write!(f, "steam"),
            Self::Other(name) => write!(f, "{}", name),
        }
    }
}

/// One voice packet captured from a match recording.
///
/// Within a speaker's stream, `frame` and `elapsed` are non-decreasing
/// in arrival order; the reconstruction engine validates this rather
/// than assuming it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VoicePacket {
    /// Who transmitted.
    pub speaker: SpeakerId,
    /// Recording frame during which the packet was captured.
    pub frame: u32,
    /// Wall-clock offset from the start of the recording.
    #[serde(with = "elapsed_secs")]
    pub elapsed: Duration,
    /// Declared payload encoding.
    pub format: VoiceFormat,
    /// Opaque compressed voice data.
    #[serde(with = "payload_base64")]
    pub payload: Vec<u8>,
}

/// Serializes `elapsed` as fractional seconds, the way recording
/// parsers report match time.
mod elapsed_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_f64(d.as_secs_f64())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(d)?;
        if !secs.is_finite() || secs < 0.0 {
            return Err(serde::de::Error::custom("elapsed must be non-negative"));
        }
        Ok(Duration::from_secs_f64(secs))
    }
}

/// Serializes payload bytes as standard base64.
mod payload_base64 {
    use base64::Engine;
    use base64::engine::general_purpose::STANDARD;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<u8>, D::Error> {
        let text = String::deserialize(d)?;
        STANDARD.decode(text).map_err(serde::de::Error::custom)
    }
}

/// Groups an ordered packet stream by speaker.
///
/// Arrival order is preserved within each group; nothing is reordered,
/// filtered, or deduplicated. The map iterates speakers in a
/// deterministic order.
pub fn demux<I>(packets: I) -> BTreeMap<SpeakerId, Vec<VoicePacket>>
where
    I: IntoIterator<Item = VoicePacket>,
{
    let mut groups: BTreeMap<SpeakerId, Vec<VoicePacket>> = BTreeMap::new();
    for packet in packets {
        groups.entry(packet.speaker).or_default().push(packet);
    }
    groups
}

#[cfg(test)]
mod tests {
    use super::*;

    fn packet(speaker: u64, frame: u32, payload: u8) -> VoicePacket {
        VoicePacket {
            speaker: SpeakerId(speaker),
            frame,
            elapsed: Duration::from_millis(frame as u64 * 15),
            format: VoiceFormat::Opus,
            payload: vec![payload],
        }
    }

    #[test]
    fn test_demux_preserves_arrival_order() {
        let packets = vec![
            packet(7, 0, 0),
            packet(9, 1, 1),
            packet(7, 2, 2),
            packet(9, 3, 3),
            packet(7, 5, 4),
        ];

        let groups = demux(packets);
        assert_eq!(groups.len(), 2);

        let a = &groups[&SpeakerId(7)];
        assert_eq!(a.iter().map(|p| p.frame).collect::<Vec<_>>(), vec![0, 2, 5]);

        let b = &groups[&SpeakerId(9)];
        assert_eq!(b.iter().map(|p| p.frame).collect::<Vec<_>>(), vec![1, 3]);
    }

    #[test]
    fn test_demux_empty() {
        let groups = demux(Vec::new());
        assert!(groups.is_empty());
    }

    #[test]
    fn test_format_from_name() {
        assert_eq!(
            VoiceFormat::from_name("VOICEDATA_FORMAT_OPUS"),
            VoiceFormat::Opus
        );
        assert_eq!(
            VoiceFormat::from_name("VOICEDATA_FORMAT_STEAM"),
            VoiceFormat::Steam
        );
        assert_eq!(
            VoiceFormat::from_name("VOICEDATA_FORMAT_SPEEX"),
            VoiceFormat::Other("VOICEDATA_FORMAT_SPEEX".to_string())
        );
    }

    #[test]
    fn test_packet_json_roundtrip() {
        let p = VoicePacket {
            speaker: SpeakerId(76561198000000001),
            frame: 420,
            elapsed: Duration::from_millis(6562),
            format: VoiceFormat::Opus,
            payload: vec![0x48, 0x01, 0xfe],
        };

        let json = serde_json::to_string(&p).unwrap();
        assert!(json.contains("\"payload\":\"SAH+\""));

        let back: VoicePacket = serde_json::from_str(&json).unwrap();
        assert_eq!(back.speaker, p.speaker);
        assert_eq!(back.frame, p.frame);
        assert_eq!(back.payload, p.payload);
        assert!((back.elapsed.as_secs_f64() - 6.562).abs() < 1e-9);
    }
}
