//! Noise oscillator driven by a 15-bit Linear Feedback Shift Register.
//!
//! The register is clocked once each time the phase accumulator wraps, so
//! the tone frequency sets the noise rate.

use super::phase_step;

#[derive(Debug, Clone)]
pub struct NoiseOscillator {
    phase: u32,
    step: u32,
    /// 15-bit LFSR, never zero
    shift_register: u16,
}

impl NoiseOscillator {
    pub fn new() -> Self {
        Self {
            phase: 0,
            step: 0,
            shift_register: 1,
        }
    }

    pub fn set_frequency(&mut self, hz: u32) {
        self.step = phase_step(hz);
    }

    fn clock_lfsr(&mut self) {
        // Feedback from bits 0 and 1 (long period, white noise)
        let feedback = (self.shift_register ^ (self.shift_register >> 1)) & 1;
        self.shift_register >>= 1;
        self.shift_register |= feedback << 14;
    }

    /// Produce one sample in {-1, +1}.
    pub fn next(&mut self) -> i32 {
        let out = if self.shift_register & 1 == 0 { 1 } else { -1 };
        let (phase, wrapped) = self.phase.overflowing_add(self.step);
        self.phase = phase;
        if wrapped {
            self.clock_lfsr();
        }
        out
    }
}

impl Default for NoiseOscillator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lfsr_has_full_period() {
        let mut noise = NoiseOscillator::new();
        let start = noise.shift_register;
        let mut period = 0;
        loop {
            noise.clock_lfsr();
            period += 1;
            if noise.shift_register == start {
                break;
            }
        }
        assert_eq!(period, 32767);
    }

    #[test]
    fn frequency_sets_clock_rate() {
        let mut slow = NoiseOscillator::new();
        slow.set_frequency(100);
        let mut fast = NoiseOscillator::new();
        fast.set_frequency(10_000);
        for _ in 0..1000 {
            slow.next();
            fast.next();
        }
        assert_ne!(slow.shift_register, fast.shift_register);
    }

    #[test]
    fn output_is_bipolar() {
        let mut noise = NoiseOscillator::new();
        noise.set_frequency(20_000);
        let samples: Vec<i32> = (0..2000).map(|_| noise.next()).collect();
        assert!(samples.contains(&1));
        assert!(samples.contains(&-1));
    }
}
