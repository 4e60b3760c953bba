//! ADSR volume envelope.
//!
//! Segment lengths are in samples. Volumes are percentages (0-100) and the
//! envelope returns amplitudes scaled to the 16-bit sample range.

/// Amplitude of a 100% volume sample.
pub const FULL_SCALE: i32 = 32767;

/// Attack-decay-sustain-release envelope.
///
/// Attack ramps from silence to `peak`, decay ramps from `peak` to
/// `sustain_volume`, sustain holds, and release ramps back to silence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Envelope {
    pub attack: u32,
    pub decay: u32,
    pub sustain: u32,
    pub release: u32,
    /// Peak volume percent
    pub peak: u8,
    /// Sustain volume percent
    pub sustain_volume: u8,
}

fn ramp(from: i64, to: i64, pos: u32, len: u32) -> i64 {
    from + (to - from) * pos as i64 / len as i64
}

impl Envelope {
    /// Total envelope length in samples.
    pub fn len(&self) -> u32 {
        self.attack
            .saturating_add(self.decay)
            .saturating_add(self.sustain)
            .saturating_add(self.release)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Amplitude at sample `t`, in `[0, FULL_SCALE]`.
    pub fn amplitude(&self, t: u32) -> i32 {
        let peak = self.peak.min(100) as i64;
        let sustain = self.sustain_volume.min(100) as i64;

        let mut t = t;
        let percent = if t < self.attack {
            ramp(0, peak, t, self.attack)
        } else {
            t -= self.attack;
            if t < self.decay {
                ramp(peak, sustain, t, self.decay)
            } else {
                t -= self.decay;
                if t < self.sustain {
                    sustain
                } else {
                    t -= self.sustain;
                    if t < self.release {
                        ramp(sustain, 0, t, self.release)
                    } else {
                        0
                    }
                }
            }
        };

        // percent is in 0..=100, so the product fits the sample range.
        (percent * FULL_SCALE as i64 / 100) as i32
    }
}
