//! Producer/consumer hand-off between the tick loop and the audio device.
//!
//! Tone runs are staged on the simulation side without locking. Once per tick
//! [`AudioSampleBridge::flush`] moves the staged samples into queues shared
//! with any number of [`AudioConsumer`] handles. The lock is held only for the
//! append or the drain, so neither side waits on the other's work.
//!
//! Both queues always advance together: every append adds the same number of
//! samples to left and right, and every drain removes the same number.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::logging::{log, LogCategory, LogLevel};

use super::tone::{Pan, ToneParams};

#[derive(Debug, Default)]
struct SampleQueues {
    left: VecDeque<i16>,
    right: VecDeque<i16>,
}

type SharedQueues = Arc<Mutex<SampleQueues>>;

fn lock(queues: &SharedQueues) -> MutexGuard<'_, SampleQueues> {
    queues.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// A drained slice of stereo samples. Both channels have equal length.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StereoChunk {
    pub left: Vec<i16>,
    pub right: Vec<i16>,
}

impl StereoChunk {
    pub fn len(&self) -> usize {
        self.left.len()
    }

    pub fn is_empty(&self) -> bool {
        self.left.is_empty()
    }

    /// Left/right interleaved frames.
    pub fn interleaved(&self) -> Vec<i16> {
        self.left
            .iter()
            .zip(&self.right)
            .flat_map(|(&l, &r)| [l, r])
            .collect()
    }

    /// Pad with silence up to `count` frames.
    pub fn pad_to(&mut self, count: usize) {
        if self.len() < count {
            self.left.resize(count, 0);
            self.right.resize(count, 0);
        }
    }
}

/// Consumer-side handle, safe to move to an audio thread.
#[derive(Debug, Clone)]
pub struct AudioConsumer {
    queues: SharedQueues,
}

impl AudioConsumer {
    /// Remove up to `count` samples per channel in FIFO order. Returns fewer
    /// when the queues run short; padding is the caller's decision.
    pub fn consume(&self, count: usize) -> StereoChunk {
        let mut queues = lock(&self.queues);
        let n = count.min(queues.left.len()).min(queues.right.len());
        StereoChunk {
            left: queues.left.drain(..n).collect(),
            right: queues.right.drain(..n).collect(),
        }
    }

    /// Published samples waiting per channel.
    pub fn queued(&self) -> usize {
        lock(&self.queues).left.len()
    }

    /// Drop everything published so far.
    pub fn reset(&self) {
        let mut queues = lock(&self.queues);
        queues.left.clear();
        queues.right.clear();
    }
}

/// Simulation-side owner of the sample queues.
#[derive(Debug, Default)]
pub struct AudioSampleBridge {
    staged_left: Vec<i16>,
    staged_right: Vec<i16>,
    queues: SharedQueues,
    ticks: u64,
}

impl AudioSampleBridge {
    pub fn new() -> Self {
        Self::default()
    }

    /// Synthesize a guest `tone` call and stage it.
    pub fn tone(&mut self, frequency: u32, duration: u32, volume: u32, flags: u32) {
        let params = ToneParams::decode(frequency, duration, volume, flags);
        log(LogCategory::Audio, LogLevel::Trace, || {
            format!(
                "tone {:?} {}->{} Hz, {} samples, {:?}",
                params.waveform,
                params.start_frequency,
                params.end_frequency,
                params.len(),
                params.pan
            )
        });
        let run = params.synthesize();
        self.stage(&run, params.pan);
    }

    /// Stage a mono run. The channel panned away gets silence of equal length.
    pub fn stage(&mut self, run: &[i16], pan: Pan) {
        let silence = std::iter::repeat(0).take(run.len());
        match pan {
            Pan::Both => {
                self.staged_left.extend_from_slice(run);
                self.staged_right.extend_from_slice(run);
            }
            Pan::Left => {
                self.staged_left.extend_from_slice(run);
                self.staged_right.extend(silence);
            }
            Pan::Right => {
                self.staged_left.extend(silence);
                self.staged_right.extend_from_slice(run);
            }
        }
    }

    /// Publish staged samples to the consumer. Never waits on the consumer
    /// beyond the append itself.
    pub fn flush(&mut self) {
        self.ticks += 1;
        if self.staged_left.is_empty() {
            return;
        }
        let mut queues = lock(&self.queues);
        queues.left.extend(self.staged_left.drain(..));
        queues.right.extend(self.staged_right.drain(..));
        log(LogCategory::Audio, LogLevel::Trace, || {
            format!("tick {}: {} samples queued", self.ticks, queues.left.len())
        });
    }

    /// Drain published samples. See [`AudioConsumer::consume`].
    pub fn consume(&self, count: usize) -> StereoChunk {
        self.consumer().consume(count)
    }

    /// A handle for the audio render context.
    pub fn consumer(&self) -> AudioConsumer {
        AudioConsumer {
            queues: Arc::clone(&self.queues),
        }
    }

    /// Clear staged and published samples.
    pub fn reset(&mut self) {
        self.staged_left.clear();
        self.staged_right.clear();
        self.consumer().reset();
    }

    /// Samples staged since the last flush, per channel.
    pub fn staged(&self) -> usize {
        self.staged_left.len()
    }

    /// Published samples not yet consumed, per channel.
    pub fn queued(&self) -> usize {
        lock(&self.queues).left.len()
    }

    /// Number of flushes so far.
    pub fn ticks(&self) -> u64 {
        self.ticks
    }
}
