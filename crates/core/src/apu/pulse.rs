//! Pulse wave oscillator.

use super::phase_step;

/// Square wave with four selectable duty cycles.
///
/// The 32-bit phase accumulator is split into 8 steps by its top three bits,
/// and each duty cycle is a fixed on/off pattern over those steps.
#[derive(Debug, Clone)]
pub struct PulseOscillator {
    /// Duty cycle (0-3): 12.5%, 25%, 50%, 75%
    pub duty: u8,
    phase: u32,
    step: u32,
}

impl PulseOscillator {
    pub fn new(duty: u8) -> Self {
        Self {
            duty: duty & 3,
            phase: 0,
            step: 0,
        }
    }

    /// Set the output frequency in Hz.
    pub fn set_frequency(&mut self, hz: u32) {
        self.step = phase_step(hz);
    }

    /// Whether the current phase is in the high part of the duty pattern.
    pub fn duty_output(&self) -> bool {
        // 0: 0 1 0 0 0 0 0 0 (12.5%)
        // 1: 0 1 1 0 0 0 0 0 (25%)
        // 2: 0 1 1 1 1 0 0 0 (50%)
        // 3: 1 0 0 1 1 1 1 1 (75%)
        const TABLE: [[bool; 8]; 4] = [
            [false, true, false, false, false, false, false, false],
            [false, true, true, false, false, false, false, false],
            [false, true, true, true, true, false, false, false],
            [true, false, false, true, true, true, true, true],
        ];
        TABLE[(self.duty & 3) as usize][(self.phase >> 29) as usize]
    }

    /// Produce one sample in {-1, +1} and advance the phase.
    pub fn next(&mut self) -> i32 {
        let out = if self.duty_output() { 1 } else { -1 };
        self.phase = self.phase.wrapping_add(self.step);
        out
    }
}
