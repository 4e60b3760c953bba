//! Triangle wave oscillator.
//!
//! Produces a quantized triangle with 32 steps per period.

use super::phase_step;

// 15, 14, ..., 0, 0, 1, ..., 15
const TRIANGLE_TABLE: [u8; 32] = [
    15, 14, 13, 12, 11, 10, 9, 8, 7, 6, 5, 4, 3, 2, 1, 0, 0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11,
    12, 13, 14, 15,
];

/// Full-scale output of [`TriangleOscillator::next`].
pub const TRIANGLE_FULL_SCALE: i32 = 15;

#[derive(Debug, Clone, Default)]
pub struct TriangleOscillator {
    phase: u32,
    step: u32,
}

impl TriangleOscillator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_frequency(&mut self, hz: u32) {
        self.step = phase_step(hz);
    }

    /// Produce one sample in `[-15, 15]` and advance the phase.
    pub fn next(&mut self) -> i32 {
        let value = TRIANGLE_TABLE[(self.phase >> 27) as usize] as i32;
        self.phase = self.phase.wrapping_add(self.step);
        2 * value - TRIANGLE_FULL_SCALE
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_at_positive_peak() {
        let mut tri = TriangleOscillator::new();
        assert_eq!(tri.next(), 15);
    }

    #[test]
    fn stays_in_range_and_reaches_trough() {
        let mut tri = TriangleOscillator::new();
        tri.set_frequency(1000);
        let samples: Vec<i32> = (0..441).map(|_| tri.next()).collect();
        assert!(samples.iter().all(|s| (-15..=15).contains(s)));
        assert_eq!(samples.iter().copied().min(), Some(-15));
        assert_eq!(samples.iter().copied().max(), Some(15));
    }
}
