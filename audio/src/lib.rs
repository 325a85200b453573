//! Voice extraction from match recordings.
//!
//! A match recording carries voice packets only while a speaker is
//! transmitting; there is no data at all during silence. This crate
//! rebuilds each speaker's transmissions into one dense, fixed-rate
//! waveform whose silent stretches are exactly as long as the real
//! gaps between transmissions, so every speaker's file shares the same
//! absolute time origin and they stay in sync when played together.
//!
//! - [`packet`]: voice packet model and per-speaker demultiplexing
//! - [`codec`]: per-speaker payload decoders (Opus, legacy Steam voice)
//! - [`timeline`]: the reconstruction engine and its sample buffer
//! - [`sink`]: writing finished timelines out as WAV files
//! - [`extract`]: batch orchestration across all speakers

pub mod codec;
pub mod extract;
pub mod packet;
pub mod sink;
pub mod timeline;

pub use extract::{ExtractConfig, Extractor, SpeakerReport};
pub use packet::{demux, SpeakerId, VoiceFormat, VoicePacket};
pub use timeline::{Reconstructor, SyncMode, Timeline};
