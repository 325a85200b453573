//! Timeline reconstruction: dense waveforms from sparse packet streams.
//!
//! Voice packets carry audio only while a speaker transmits, so the
//! stream itself says nothing about silence. The engine here replays
//! one speaker's ordered packets against a write cursor: each packet's
//! anchor is converted to an absolute sample position, any shortfall
//! between the cursor and that position becomes zero samples, and the
//! decoded audio is appended after them. The cursor then advances by
//! the real decoded length, never by anchor-to-anchor deltas, so
//! rounding error cannot compound across a long recording.

mod buffer;

pub use buffer::Timeline;

use crate::codec::VoiceDecoder;
use crate::packet::{SpeakerId, VoicePacket};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;
use tracing::warn;

/// Tolerance for anchors that land slightly behind the cursor, in
/// milliseconds. 2ms is smaller than the shortest Opus frame (2.5ms),
/// so genuine reordering is never mistaken for jitter.
const ANCHOR_EPSILON_MS: u64 = 2;

/// How packet anchors are mapped onto the output timeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncMode {
    /// Wall-clock anchors. Primary mode; the most accurate.
    #[default]
    Elapsed,
    /// Frame-index anchors. Degraded fallback for recordings that
    /// carry no usable wall clock.
    Frame,
}

impl FromStr for SyncMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "elapsed" | "time" => Ok(Self::Elapsed),
            "frame" => Ok(Self::Frame),
            other => Err(format!("unknown sync mode: {}", other)),
        }
    }
}

/// Timeline reconstruction error.
#[derive(Debug, Error)]
pub enum TimelineError {
    /// A packet's anchor stepped backwards past the tolerance. The
    /// stream is corrupt for this speaker; continuing would mis-place
    /// every later chunk.
    #[error(
        "timeline: packet out of order at frame {frame} ({elapsed:?}): \
         anchor resolves to sample {anchor}, cursor already at {cursor}"
    )]
    OutOfOrder {
        frame: u32,
        elapsed: Duration,
        anchor: u64,
        cursor: u64,
    },
}

/// Single-pass reconstruction engine for one speaker's packet group.
///
/// Strictly sequential: each chunk's placement depends on the cursor
/// state left by the previous one. One instance per speaker.
pub struct Reconstructor {
    mode: SyncMode,
    samples_per_frame: u64,
    /// Negative-gap tolerance in samples.
    epsilon: u64,
    timeline: Timeline,
    /// Frame index of the last placed chunk (frame mode).
    last_frame: u32,
    /// Samples accumulated within `last_frame` (frame mode).
    frame_samples: u64,
    started: bool,
}

impl Reconstructor {
    /// Creates an engine producing output at `sample_rate`, with
    /// `samples_per_frame` output samples spanned by one match frame.
    pub fn new(mode: SyncMode, sample_rate: u32, samples_per_frame: u64) -> Self {
        Self::with_capacity(mode, sample_rate, samples_per_frame, 0)
    }

    /// Like [`new`](Self::new), but pre-sizes the backing buffer.
    /// Gap sizes are only known as packets arrive, so callers that
    /// have the whole group in hand pass the last anchor's position to
    /// avoid repeated reallocation over a long recording.
    pub fn with_capacity(
        mode: SyncMode,
        sample_rate: u32,
        samples_per_frame: u64,
        capacity: u64,
    ) -> Self {
        Self {
            mode,
            samples_per_frame,
            epsilon: sample_rate as u64 * ANCHOR_EPSILON_MS / 1000,
            timeline: Timeline::with_capacity(sample_rate, capacity as usize),
            last_frame: 0,
            frame_samples: 0,
            started: false,
        }
    }

    /// Absolute sample position of an elapsed anchor, rounded half-up.
    /// The one rounding rule of the whole run; it never accumulates
    /// because every anchor is converted from the origin, not from the
    /// previous anchor.
    fn position(&self, elapsed: Duration) -> u64 {
        let ns = elapsed.as_nanos();
        ((ns * self.timeline.sample_rate() as u128 + 500_000_000) / 1_000_000_000) as u64
    }

    /// Places one decoded chunk at its anchor.
    ///
    /// Inserts silence for any positive gap, concatenates on a zero or
    /// tolerably negative gap, and rejects anchors that would require
    /// writing before already-placed audio.
    pub fn push(&mut self, frame: u32, elapsed: Duration, pcm: &[i16]) -> Result<(), TimelineError> {
        match self.mode {
            SyncMode::Elapsed => self.push_elapsed(frame, elapsed, pcm),
            SyncMode::Frame => self.push_frame(frame, elapsed, pcm),
        }
    }

    fn push_elapsed(
        &mut self,
        frame: u32,
        elapsed: Duration,
        pcm: &[i16],
    ) -> Result<(), TimelineError> {
        let target = self.position(elapsed);
        let cursor = self.timeline.len();

        if target > cursor {
            // Real silence between the end of placed audio and this
            // transmission. The first packet lands here too: with the
            // cursor at zero its whole anchor becomes leading silence,
            // which aligns every speaker to the recording start.
            self.timeline.extend_silence(target - cursor);
        } else if cursor - target > self.epsilon {
            return Err(TimelineError::OutOfOrder {
                frame,
                elapsed,
                anchor: target,
                cursor,
            });
        }

        self.timeline.append(pcm);
        self.started = true;
        Ok(())
    }

    fn push_frame(
        &mut self,
        frame: u32,
        elapsed: Duration,
        pcm: &[i16],
    ) -> Result<(), TimelineError> {
        if !self.started {
            // Pre-roll: align the first transmission to the absolute
            // origin.
            self.timeline.extend_silence(frame as u64 * self.samples_per_frame);
            self.timeline.append(pcm);
            self.last_frame = frame;
            self.frame_samples = pcm.len() as u64;
            self.started = true;
            return Ok(());
        }

        if frame < self.last_frame {
            return Err(TimelineError::OutOfOrder {
                frame,
                elapsed,
                anchor: frame as u64 * self.samples_per_frame,
                cursor: self.timeline.len(),
            });
        }

        let delta = (frame - self.last_frame) as u64;
        if delta == 0 {
            // Same frame: concatenate.
            self.timeline.append(pcm);
            self.frame_samples += pcm.len() as u64;
            return Ok(());
        }

        if delta > 1 {
            // Whole skipped frames, plus whatever the previous frame
            // fell short of a full frame interval.
            let shortfall = self.samples_per_frame.saturating_sub(self.frame_samples);
            self.timeline
                .extend_silence((delta - 1) * self.samples_per_frame + shortfall);
        }

        self.timeline.append(pcm);
        self.last_frame = frame;
        self.frame_samples = pcm.len() as u64;
        Ok(())
    }

    /// Finalizes the run and hands over the dense timeline.
    pub fn finish(self) -> Timeline {
        self.timeline
    }
}

/// Reconstructs one speaker's dense timeline from its ordered packets.
///
/// A chunk that fails to decode is dropped with a warning; its region
/// stays silent and the next anchor re-synchronizes the cursor, so one
/// bad payload never shifts the rest of the file. An ordering
/// violation aborts this speaker's run.
pub fn reconstruct(
    speaker: SpeakerId,
    packets: &[VoicePacket],
    decoder: &mut dyn VoiceDecoder,
    mode: SyncMode,
    sample_rate: u32,
    samples_per_frame: u64,
) -> Result<Timeline, TimelineError> {
    // The last anchor bounds the whole run bar its final chunk.
    let capacity = packets
        .last()
        .map(|p| match mode {
            SyncMode::Elapsed => {
                (p.elapsed.as_nanos() * sample_rate as u128 / 1_000_000_000) as u64
            }
            SyncMode::Frame => (p.frame as u64 + 1) * samples_per_frame,
        })
        .unwrap_or(0);
    let mut engine = Reconstructor::with_capacity(mode, sample_rate, samples_per_frame, capacity);

    for packet in packets {
        let pcm = match decoder.decode(&packet.payload) {
            Ok(pcm) => pcm,
            Err(e) => {
                warn!(
                    speaker = %speaker,
                    frame = packet.frame,
                    elapsed = ?packet.elapsed,
                    error = %e,
                    "dropping undecodable chunk"
                );
                Vec::new()
            }
        };
        engine.push(packet.frame, packet.elapsed, &pcm)?;
    }

    Ok(engine.finish())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::CodecError;
    use crate::packet::VoiceFormat;

    const RATE: u32 = 48_000;
    const SPF: u64 = 750;

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    fn tone(len: usize) -> Vec<i16> {
        vec![1000; len]
    }

    fn zeros_in(t: &Timeline, range: std::ops::Range<usize>) -> bool {
        t.samples()[range].iter().all(|&s| s == 0)
    }

    fn audio_in(t: &Timeline, range: std::ops::Range<usize>) -> bool {
        t.samples()[range].iter().all(|&s| s != 0)
    }

    #[test]
    fn test_three_bursts_exact_boundaries() {
        // Packets at 0ms, 100ms, 250ms, each decoding to 50ms (2400
        // samples) of audio.
        let mut r = Reconstructor::new(SyncMode::Elapsed, RATE, SPF);
        r.push(0, ms(0), &tone(2400)).unwrap();
        r.push(6, ms(100), &tone(2400)).unwrap();
        r.push(16, ms(250), &tone(2400)).unwrap();
        let t = r.finish();

        assert_eq!(t.len(), 14_400); // 300ms
        assert!(audio_in(&t, 0..2400));
        assert!(zeros_in(&t, 2400..4800));
        assert!(audio_in(&t, 4800..7200));
        assert!(zeros_in(&t, 7200..12_000));
        assert!(audio_in(&t, 12_000..14_400));
    }

    #[test]
    fn test_no_gap_is_pure_concatenation() {
        let mut r = Reconstructor::new(SyncMode::Elapsed, RATE, SPF);
        r.push(0, ms(0), &tone(2400)).unwrap();
        r.push(3, ms(50), &tone(2400)).unwrap();
        r.push(6, ms(100), &tone(2400)).unwrap();
        let t = r.finish();

        assert_eq!(t.len(), 7200);
        assert!(audio_in(&t, 0..7200));
    }

    #[test]
    fn test_leading_preroll() {
        let mut r = Reconstructor::new(SyncMode::Elapsed, RATE, SPF);
        r.push(64, ms(1000), &tone(960)).unwrap();
        let t = r.finish();

        assert_eq!(t.len(), 48_960);
        assert!(zeros_in(&t, 0..48_000));
        assert!(audio_in(&t, 48_000..48_960));
    }

    #[test]
    fn test_gap_accuracy_single_sample() {
        // Gap of 10.5ms = 504 samples exactly.
        let mut r = Reconstructor::new(SyncMode::Elapsed, RATE, SPF);
        r.push(0, ms(0), &tone(960)).unwrap();
        r.push(2, Duration::from_micros(30_500), &tone(960)).unwrap();
        let t = r.finish();

        assert_eq!(t.len(), 960 + 504 + 960);
        assert!(zeros_in(&t, 960..1464));
    }

    #[test]
    fn test_rounds_half_up() {
        // 31_250ns at 48kHz is exactly 1.5 samples; half-up gives 2.
        let mut r = Reconstructor::new(SyncMode::Elapsed, RATE, SPF);
        r.push(0, Duration::from_nanos(31_250), &[]).unwrap();
        assert_eq!(r.finish().len(), 2);
    }

    #[test]
    fn test_small_backwards_jitter_tolerated() {
        let mut r = Reconstructor::new(SyncMode::Elapsed, RATE, SPF);
        // 100ms of audio at anchor 0, next anchor 1ms early: within
        // the 2ms tolerance, concatenated without error.
        r.push(0, ms(0), &tone(4800)).unwrap();
        r.push(6, ms(99), &tone(960)).unwrap();
        let t = r.finish();
        assert_eq!(t.len(), 5760);
    }

    #[test]
    fn test_regression_beyond_epsilon_rejected() {
        let mut r = Reconstructor::new(SyncMode::Elapsed, RATE, SPF);
        r.push(0, ms(0), &tone(4800)).unwrap();
        let err = r.push(6, ms(90), &tone(960)).unwrap_err();
        match err {
            TimelineError::OutOfOrder { anchor, cursor, .. } => {
                assert_eq!(anchor, 4320);
                assert_eq!(cursor, 4800);
            }
        }
    }

    #[test]
    fn test_no_drift_over_long_run() {
        // 10_000 back-to-back 20ms chunks; every anchor resolves to an
        // exact multiple of 960, so no silence is ever inserted and no
        // rounding error accumulates.
        let mut r = Reconstructor::new(SyncMode::Elapsed, RATE, SPF);
        for i in 0..10_000u64 {
            r.push(i as u32, ms(i * 20), &tone(960)).unwrap();
        }
        let t = r.finish();
        assert_eq!(t.len(), 9_600_000);
        assert!(audio_in(&t, 0..9_600_000));
    }

    #[test]
    fn test_frame_mode_same_frame_concatenates() {
        let mut r = Reconstructor::new(SyncMode::Frame, RATE, SPF);
        r.push(0, ms(0), &tone(300)).unwrap();
        r.push(0, ms(0), &tone(300)).unwrap();
        let t = r.finish();
        assert_eq!(t.len(), 600);
        assert!(audio_in(&t, 0..600));
    }

    #[test]
    fn test_frame_mode_adjacent_frame_no_gap() {
        let mut r = Reconstructor::new(SyncMode::Frame, RATE, SPF);
        r.push(0, ms(0), &tone(750)).unwrap();
        r.push(1, ms(0), &tone(750)).unwrap();
        let t = r.finish();
        assert_eq!(t.len(), 1500);
        assert!(audio_in(&t, 0..1500));
    }

    #[test]
    fn test_frame_mode_gap_with_shortfall() {
        // Frame 0 holds only 300 of its 750 samples; next packet at
        // frame 5 means 4 whole silent frames plus the 450 shortfall.
        let mut r = Reconstructor::new(SyncMode::Frame, RATE, SPF);
        r.push(0, ms(0), &tone(300)).unwrap();
        r.push(5, ms(0), &tone(750)).unwrap();
        let t = r.finish();

        let silence = 4 * 750 + 450;
        assert_eq!(t.len(), 300 + silence + 750);
        assert!(audio_in(&t, 0..300));
        assert!(zeros_in(&t, 300..300 + silence as usize));
        assert!(audio_in(&t, 300 + silence as usize..t.len() as usize));
    }

    #[test]
    fn test_frame_mode_preroll() {
        let mut r = Reconstructor::new(SyncMode::Frame, RATE, SPF);
        r.push(10, ms(0), &tone(750)).unwrap();
        let t = r.finish();
        assert_eq!(t.len(), 10 * 750 + 750);
        assert!(zeros_in(&t, 0..7500));
    }

    #[test]
    fn test_frame_mode_rejects_decreasing_frame() {
        let mut r = Reconstructor::new(SyncMode::Frame, RATE, SPF);
        r.push(10, ms(0), &tone(750)).unwrap();
        assert!(r.push(9, ms(0), &tone(750)).is_err());
    }

    /// Test decoder: payloads decode to a constant tone whose length
    /// is the first payload byte times 100; a payload of `[0xff]`
    /// fails to decode.
    struct StubDecoder;

    impl VoiceDecoder for StubDecoder {
        fn decode(&mut self, payload: &[u8]) -> Result<Vec<i16>, CodecError> {
            match payload.first() {
                Some(&0xff) => Err(CodecError::Opus("corrupt payload".to_string())),
                Some(&n) => Ok(vec![1000; n as usize * 100]),
                None => Ok(Vec::new()),
            }
        }
    }

    fn stub_packet(frame: u32, elapsed: Duration, payload: Vec<u8>) -> VoicePacket {
        VoicePacket {
            speaker: SpeakerId(42),
            frame,
            elapsed,
            format: VoiceFormat::Opus,
            payload,
        }
    }

    #[test]
    fn test_reconstruct_skips_failed_decode() {
        // Bursts of 900 samples (18.75ms) anchored at 0/30/60ms; the
        // middle payload is corrupt.
        let packets = vec![
            stub_packet(0, ms(0), vec![9]),
            stub_packet(2, ms(30), vec![0xff]),
            stub_packet(4, ms(60), vec![9]),
        ];

        let mut dec = StubDecoder;
        let t = reconstruct(SpeakerId(42), &packets, &mut dec, SyncMode::Elapsed, RATE, SPF)
            .unwrap();

        // 60ms anchor = sample 2880, plus 900 samples of audio.
        assert_eq!(t.len(), 2880 + 900);
        assert!(audio_in(&t, 0..900));
        // The failed chunk's whole region stays silent.
        assert!(zeros_in(&t, 900..2880));
        assert!(audio_in(&t, 2880..3780));
    }

    #[test]
    fn test_reconstruct_ordering_violation_is_fatal() {
        let packets = vec![
            stub_packet(4, ms(60), vec![9]),
            stub_packet(0, ms(0), vec![9]),
        ];

        let mut dec = StubDecoder;
        let err = reconstruct(SpeakerId(42), &packets, &mut dec, SyncMode::Elapsed, RATE, SPF)
            .unwrap_err();
        assert!(matches!(err, TimelineError::OutOfOrder { .. }));
    }

    #[test]
    fn test_sync_mode_from_str() {
        assert_eq!(SyncMode::from_str("elapsed").unwrap(), SyncMode::Elapsed);
        assert_eq!(SyncMode::from_str("time").unwrap(), SyncMode::Elapsed);
        assert_eq!(SyncMode::from_str("frame").unwrap(), SyncMode::Frame);
        assert!(SyncMode::from_str("tick").is_err());
    }
}
