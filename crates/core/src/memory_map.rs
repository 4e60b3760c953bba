//! Fixed memory layout shared between the host and guest cartridges.
//!
//! Carts are compiled against these offsets, so they must never change.
//! All multi-byte registers are little-endian, matching wasm linear memory.

use bitflags::bitflags;

/// Screen width in pixels.
pub const WIDTH: usize = 160;
/// Screen height in pixels.
pub const HEIGHT: usize = 128;
/// Number of pixel cells in the framebuffer.
pub const PIXEL_COUNT: usize = WIDTH * HEIGHT;
/// Framebuffer size in bytes (RGB565, two bytes per pixel).
pub const FRAMEBUFFER_SIZE: usize = PIXEL_COUNT * 2;

/// Size of one wasm page.
pub const WASM_PAGE_SIZE: usize = 1 << 16;
/// Linear memory size in wasm pages. Minimum and maximum are equal.
pub const MEMORY_PAGES: u32 = 64;
/// Linear memory size in bytes (4 MiB).
pub const MEMORY_SIZE: usize = MEMORY_PAGES as usize * WASM_PAGE_SIZE;

pub const ADDR_CONTROLS: usize = 0x04;
pub const ADDR_LIGHT_LEVEL: usize = 0x06;
pub const ADDR_NEOPIXELS: usize = 0x08;
pub const ADDR_RED_LED: usize = 0x1c;
pub const ADDR_BATTERY_LEVEL: usize = 0x1e;
pub const ADDR_FRAMEBUFFER: usize = 0x20;

/// One past the last framebuffer byte.
pub const FRAMEBUFFER_END: usize = ADDR_FRAMEBUFFER + FRAMEBUFFER_SIZE;

/// Number of addressable LEDs in the neopixel strip.
pub const NEOPIXEL_COUNT: usize = 5;
/// Only the low 24 bits (RGB) of a neopixel word are meaningful.
pub const NEOPIXEL_MASK: u32 = 0x00FF_FFFF;

/// Sentinel for "no color" in stroke/fill and palette slots.
pub const OPTIONAL_COLOR_NONE: i32 = -1;

bitflags! {
    /// Button bits in the controls register.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct Controls: u16 {
        const START = 1;
        const SELECT = 2;
        const A = 4;
        const B = 8;
        const CLICK = 16;
        const UP = 32;
        const DOWN = 64;
        const LEFT = 128;
        const RIGHT = 256;
    }
}

/// Decode a guest-supplied color argument, mapping the sentinel to `None`.
#[inline]
pub fn optional_color(raw: i32) -> Option<u16> {
    if raw == OPTIONAL_COLOR_NONE {
        None
    } else {
        Some(raw as u16)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn framebuffer_fits_in_memory() {
        assert!(FRAMEBUFFER_END <= MEMORY_SIZE);
        assert!(ADDR_BATTERY_LEVEL + 2 <= ADDR_FRAMEBUFFER);
        assert_eq!(ADDR_NEOPIXELS + NEOPIXEL_COUNT * 4, 0x1c);
    }

    #[test]
    fn optional_color_sentinel() {
        assert_eq!(optional_color(-1), None);
        assert_eq!(optional_color(0), Some(0));
        assert_eq!(optional_color(0xFFFF), Some(0xFFFF));
        assert_eq!(optional_color(0x1_2345), Some(0x2345));
    }

    #[test]
    fn controls_bits() {
        let c = Controls::A | Controls::RIGHT;
        assert_eq!(c.bits(), 260);
        assert!(Controls::from_bits_truncate(0xFFFF).contains(Controls::CLICK));
    }
}
