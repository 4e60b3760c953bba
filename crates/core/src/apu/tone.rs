//! Tone parameter decoding and synthesis.
//!
//! Guests describe a tone with four packed integers:
//!
//! | argument    | layout                                                        |
//! |-------------|---------------------------------------------------------------|
//! | `frequency` | low 16 bits start Hz, high 16 bits end Hz (0 = no slide)       |
//! | `duration`  | bytes low to high: sustain, release, decay, attack (in ticks) |
//! | `volume`    | low byte sustain %, high byte peak % (0 = 100)                 |
//! | `flags`     | bits 0-1 channel, bits 2-3 duty, bits 4-5 pan                  |

use super::envelope::{Envelope, FULL_SCALE};
use super::noise::NoiseOscillator;
use super::pulse::PulseOscillator;
use super::triangle::{TriangleOscillator, TRIANGLE_FULL_SCALE};
use super::SAMPLES_PER_TICK;

/// Waveform selected by the low two flag bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Waveform {
    Pulse1,
    Pulse2,
    Triangle,
    Noise,
}

/// Which output channels receive a tone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pan {
    Both,
    Left,
    Right,
}

/// A decoded `tone` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ToneParams {
    pub start_frequency: u16,
    pub end_frequency: u16,
    pub waveform: Waveform,
    /// Pulse duty cycle (0-3)
    pub duty: u8,
    pub pan: Pan,
    /// Envelope with segment lengths in samples.
    pub envelope: Envelope,
}

enum Oscillator {
    Pulse(PulseOscillator),
    Triangle(TriangleOscillator),
    Noise(NoiseOscillator),
}

impl Oscillator {
    fn set_frequency(&mut self, hz: u32) {
        match self {
            Oscillator::Pulse(osc) => osc.set_frequency(hz),
            Oscillator::Triangle(osc) => osc.set_frequency(hz),
            Oscillator::Noise(osc) => osc.set_frequency(hz),
        }
    }

    /// Next sample scaled by `amplitude`.
    fn sample(&mut self, amplitude: i32) -> i32 {
        match self {
            Oscillator::Pulse(osc) => osc.next() * amplitude,
            Oscillator::Triangle(osc) => osc.next() * amplitude / TRIANGLE_FULL_SCALE,
            Oscillator::Noise(osc) => osc.next() * amplitude,
        }
    }
}

impl ToneParams {
    /// Unpack the guest's `tone` arguments.
    pub fn decode(frequency: u32, duration: u32, volume: u32, flags: u32) -> Self {
        let ticks = |shift: u32| ((duration >> shift) & 0xFF) * SAMPLES_PER_TICK as u32;

        let sustain_volume = (volume & 0xFF).min(100) as u8;
        let peak_volume = match (volume >> 8) & 0xFF {
            0 => 100,
            v => v.min(100) as u8,
        };

        let waveform = match flags & 0x03 {
            0 => Waveform::Pulse1,
            1 => Waveform::Pulse2,
            2 => Waveform::Triangle,
            _ => Waveform::Noise,
        };
        let pan = match (flags >> 4) & 0x03 {
            1 => Pan::Left,
            2 => Pan::Right,
            _ => Pan::Both,
        };

        Self {
            start_frequency: frequency as u16,
            end_frequency: (frequency >> 16) as u16,
            waveform,
            duty: ((flags >> 2) & 0x03) as u8,
            pan,
            envelope: Envelope {
                attack: ticks(24),
                decay: ticks(16),
                sustain: ticks(0),
                release: ticks(8),
                peak: peak_volume,
                sustain_volume,
            },
        }
    }

    /// Length of the synthesized run in samples.
    pub fn len(&self) -> usize {
        self.envelope.len() as usize
    }

    pub fn is_empty(&self) -> bool {
        self.envelope.is_empty()
    }

    fn frequency_at(&self, t: u32) -> u32 {
        let start = self.start_frequency as i64;
        if self.end_frequency == 0 {
            return start as u32;
        }
        let end = self.end_frequency as i64;
        (start + (end - start) * t as i64 / self.envelope.len().max(1) as i64) as u32
    }

    /// Render the tone as mono PCM.
    pub fn synthesize(&self) -> Vec<i16> {
        let mut oscillator = match self.waveform {
            Waveform::Pulse1 | Waveform::Pulse2 => {
                Oscillator::Pulse(PulseOscillator::new(self.duty))
            }
            Waveform::Triangle => Oscillator::Triangle(TriangleOscillator::new()),
            Waveform::Noise => Oscillator::Noise(NoiseOscillator::new()),
        };

        let len = self.envelope.len();
        let mut out = Vec::with_capacity(len as usize);
        for t in 0..len {
            oscillator.set_frequency(self.frequency_at(t));
            let sample = oscillator.sample(self.envelope.amplitude(t));
            out.push(sample.clamp(-FULL_SCALE, FULL_SCALE) as i16);
        }
        out
    }
}
