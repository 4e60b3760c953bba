//! Tone generation and the audio sample hand-off.
//!
//! ## Components
//!
//! - **Pulse / Triangle / Noise**: phase-accumulator oscillators
//! - **Envelope**: ADSR amplitude shaping
//! - **ToneParams**: decodes a guest `tone` call and renders it to PCM
//! - **AudioSampleBridge**: stages rendered runs on the simulation side and
//!   publishes them once per tick to an independently clocked consumer
//!
//! All sample data is signed 16-bit PCM at [`SAMPLE_RATE`].

pub mod bridge;
pub mod envelope;
pub mod noise;
pub mod pulse;
pub mod tone;
pub mod triangle;

pub use bridge::{AudioConsumer, AudioSampleBridge, StereoChunk};
pub use envelope::Envelope;
pub use noise::NoiseOscillator;
pub use pulse::PulseOscillator;
pub use tone::{Pan, ToneParams, Waveform};
pub use triangle::TriangleOscillator;

/// Output sample rate in Hz.
pub const SAMPLE_RATE: u32 = 44_100;
/// Simulation ticks per second.
pub const TICK_RATE: u32 = 60;
/// Samples rendered per simulation tick.
pub const SAMPLES_PER_TICK: usize = (SAMPLE_RATE / TICK_RATE) as usize;
/// Slice size drained by the real-time consumer per pull.
pub const CONSUMER_SLICE: usize = 128;

/// Phase increment per sample for a 32-bit accumulator at `hz`.
pub(crate) fn phase_step(hz: u32) -> u32 {
    let step = ((hz as u64) << 32) / SAMPLE_RATE as u64;
    step.min(u32::MAX as u64) as u32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tick_length() {
        assert_eq!(SAMPLES_PER_TICK, 735);
    }

    #[test]
    fn phase_step_saturates() {
        assert_eq!(phase_step(0), 0);
        assert_eq!(phase_step(SAMPLE_RATE / 2), 1 << 31);
        assert_eq!(phase_step(u32::MAX), u32::MAX);
    }
}
