//! Core console primitives: the shared memory map, the software rasterizer,
//! flash storage, tone synthesis and the tick clock.

pub mod apu;
pub mod clock;
pub mod flash;
pub mod framebuffer;
pub mod graphics;
pub mod logging;
pub mod memory_map;

pub mod types {
    use serde::{Deserialize, Serialize};

    use crate::graphics::Rgb565;

    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct Frame {
        pub width: u32,
        pub height: u32,
        /// ARGB8888 pixels, row-major
        pub pixels: Vec<u32>,
    }

    impl Frame {
        pub fn new(width: u32, height: u32) -> Self {
            Self {
                width,
                height,
                pixels: vec![0; (width * height) as usize],
            }
        }

        /// Expand packed little-endian RGB565 pixel bytes. Missing trailing
        /// pixels stay black.
        pub fn from_rgb565_le(width: u32, height: u32, bytes: &[u8]) -> Self {
            let mut frame = Self::new(width, height);
            for (dst, src) in frame.pixels.iter_mut().zip(bytes.chunks_exact(2)) {
                *dst = Rgb565::to_argb(u16::from_le_bytes([src[0], src[1]]));
            }
            frame
        }
    }

    /// Result of handing the framebuffer to a display.
    #[derive(Debug, Clone)]
    pub struct Composite {
        pub frame: Frame,
        /// Pixel touches since the previous composite.
        pub pixels_changed: usize,
        /// Simulated panel refresh time in milliseconds.
        pub update_ms: f64,
    }

    pub type AudioSample = i16;
}

use memory_map::Controls;

/// A hosted console that runs one cartridge at a time.
pub trait Console {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Instantiate a cartridge image, running its initialization exports.
    fn load(&mut self, cart: &[u8]) -> Result<(), Self::Error>;

    /// Run the cartridge's `start` export, if it has one.
    fn start(&mut self) -> Result<(), Self::Error>;

    /// Advance one tick.
    fn update(&mut self) -> Result<(), Self::Error>;

    /// Clear the crashed state, optionally zeroing memory.
    fn reset(&mut self, zero_memory: bool);

    /// Write the input register read by the next update.
    fn set_controls(&mut self, controls: Controls);

    /// Hand the framebuffer to a display and drain the dirty counter.
    fn composite(&mut self) -> types::Composite;

    /// Raw save state. Cartridge code is not included.
    fn save_state(&self) -> Vec<u8>;

    /// Restore a state produced by [`Console::save_state`].
    fn load_state(&mut self, data: &[u8]) -> Result<(), Self::Error>;

    fn supports_save_states(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fmt;

    #[test]
    fn frame_initialization() {
        let f = types::Frame::new(10, 10);
        assert_eq!(f.pixels.len(), 100);
        assert_eq!(f.width, 10);
        assert_eq!(f.height, 10);
    }

    #[test]
    fn frame_from_rgb565() {
        let f = types::Frame::from_rgb565_le(2, 2, &[0x00, 0xF8, 0xFF, 0xFF, 0x1F]);
        assert_eq!(f.pixels, vec![0xFFFF0000, 0xFFFFFFFF, 0, 0]);
    }

    #[derive(Debug)]
    struct MockError;

    impl fmt::Display for MockError {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("mock")
        }
    }

    impl std::error::Error for MockError {}

    #[derive(Default)]
    struct MockConsole {
        loaded: bool,
        ticks: u32,
        controls: Controls,
    }

    impl Console for MockConsole {
        type Error = MockError;

        fn load(&mut self, cart: &[u8]) -> Result<(), Self::Error> {
            if cart.starts_with(b"\0asm") {
                self.loaded = true;
                Ok(())
            } else {
                Err(MockError)
            }
        }

        fn start(&mut self) -> Result<(), Self::Error> {
            Ok(())
        }

        fn update(&mut self) -> Result<(), Self::Error> {
            if self.loaded {
                self.ticks += 1;
            }
            Ok(())
        }

        fn reset(&mut self, _zero_memory: bool) {
            self.ticks = 0;
        }

        fn set_controls(&mut self, controls: Controls) {
            self.controls = controls;
        }

        fn composite(&mut self) -> types::Composite {
            types::Composite {
                frame: types::Frame::new(2, 2),
                pixels_changed: 0,
                update_ms: 0.0,
            }
        }

        fn save_state(&self) -> Vec<u8> {
            self.ticks.to_le_bytes().to_vec()
        }

        fn load_state(&mut self, data: &[u8]) -> Result<(), Self::Error> {
            let bytes: [u8; 4] = data.try_into().map_err(|_| MockError)?;
            self.ticks = u32::from_le_bytes(bytes);
            Ok(())
        }
    }

    #[test]
    fn mock_console_lifecycle() {
        let mut console = MockConsole::default();
        assert!(console.load(b"junk").is_err());
        console.load(b"\0asm\x01\0\0\0").unwrap();
        console.set_controls(Controls::A | Controls::START);
        console.update().unwrap();
        console.update().unwrap();
        assert_eq!(console.ticks, 2);
        assert_eq!(console.controls.bits(), 5);

        let state = console.save_state();
        console.reset(true);
        assert_eq!(console.ticks, 0);
        console.load_state(&state).unwrap();
        assert_eq!(console.ticks, 2);
        assert!(console.load_state(&[1, 2]).is_err());
    }

    #[test]
    fn save_states_are_opt_in() {
        let console = MockConsole::default();
        assert!(!console.supports_save_states());
    }
}
