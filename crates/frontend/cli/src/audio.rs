//! Audio render context: drains the sample bridge on its own thread at the
//! device pull rate, independent of the tick loop.

use badge_core::apu::{AudioConsumer, CONSUMER_SLICE, SAMPLE_RATE};
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DrainStats {
    /// Frames drained from the bridge.
    pub frames: usize,
    /// Pulls that came back short.
    pub underruns: usize,
}

pub struct AudioDrain {
    stop: Arc<AtomicBool>,
    handle: JoinHandle<io::Result<DrainStats>>,
}

impl AudioDrain {
    /// Start pulling `CONSUMER_SLICE` frames once per slice period, whether
    /// or not the bridge has samples queued. Drained audio is
    /// appended to `sink` as interleaved little-endian i16 when given.
    pub fn spawn(consumer: AudioConsumer, sink: Option<File>) -> io::Result<Self> {
        let stop = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&stop);
        let pull_interval =
            Duration::from_nanos(CONSUMER_SLICE as u64 * 1_000_000_000 / SAMPLE_RATE as u64);

        let handle = thread::Builder::new()
            .name("audio-drain".to_string())
            .spawn(move || {
                let mut sink = sink.map(BufWriter::new);
                let mut stats = DrainStats::default();
                loop {
                    let stopping = flag.load(Ordering::Relaxed);
                    let chunk = consumer.consume(CONSUMER_SLICE);
                    stats.frames += chunk.len();
                    if let Some(out) = sink.as_mut() {
                        for sample in chunk.interleaved() {
                            out.write_all(&sample.to_le_bytes())?;
                        }
                    }
                    if chunk.len() < CONSUMER_SLICE {
                        if stopping {
                            break;
                        }
                        stats.underruns += 1;
                    }
                    thread::sleep(pull_interval);
                }
                if let Some(mut out) = sink {
                    out.flush()?;
                }
                Ok(stats)
            })?;

        Ok(Self { stop, handle })
    }

    /// Drain whatever is left, then stop the thread.
    pub fn finish(self) -> io::Result<DrainStats> {
        self.stop.store(true, Ordering::Relaxed);
        self.handle
            .join()
            .map_err(|_| io::Error::new(io::ErrorKind::Other, "audio thread panicked"))?
    }
}
