//! RGB565 color helpers.
//!
//! The framebuffer stores 16-bit colors packed as `RRRRRGGG GGGBBBBB`.
//! Display-side code expands them to ARGB8888 (0xAARRGGBB).

/// Color operation utilities for packed 5-6-5 colors
pub struct Rgb565;

impl Rgb565 {
    /// Pack 5-bit red, 6-bit green and 5-bit blue channels.
    ///
    /// Out-of-range channel values are masked to their field width.
    ///
    /// ```
    /// use badge_core::graphics::Rgb565;
    ///
    /// assert_eq!(Rgb565::pack(31, 63, 31), 0xFFFF);
    /// assert_eq!(Rgb565::pack(5, 10, 5), 0x2945);
    /// ```
    #[inline]
    pub fn pack(red: u8, green: u8, blue: u8) -> u16 {
        ((red as u16 & 0x1F) << 11) | ((green as u16 & 0x3F) << 5) | (blue as u16 & 0x1F)
    }

    /// Split a packed color into its raw (red, green, blue) fields.
    #[inline]
    pub fn unpack(color: u16) -> (u8, u8, u8) {
        (
            (color >> 11) as u8,
            ((color >> 5) & 0x3F) as u8,
            (color & 0x1F) as u8,
        )
    }

    /// Expand to 8-bit channels, replicating high bits into the low bits so
    /// that full intensity maps to 255.
    #[inline]
    pub fn to_rgb888(color: u16) -> (u8, u8, u8) {
        let (r, g, b) = Self::unpack(color);
        ((r << 3) | (r >> 2), (g << 2) | (g >> 4), (b << 3) | (b >> 2))
    }

    /// Expand to ARGB8888 with full alpha
    #[inline]
    pub fn to_argb(color: u16) -> u32 {
        let (r, g, b) = Self::to_rgb888(color);
        0xFF00_0000 | ((r as u32) << 16) | ((g as u32) << 8) | (b as u32)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pack_unpack() {
        let c = Rgb565::pack(25, 50, 25);
        assert_eq!(Rgb565::unpack(c), (25, 50, 25));
        assert_eq!(Rgb565::pack(0xFF, 0xFF, 0xFF), 0xFFFF);
    }

    #[test]
    fn test_to_argb_extremes() {
        assert_eq!(Rgb565::to_argb(0x0000), 0xFF000000);
        assert_eq!(Rgb565::to_argb(0xFFFF), 0xFFFFFFFF);
        // Pure red
        assert_eq!(Rgb565::to_argb(0xF800), 0xFFFF0000);
        // Pure green
        assert_eq!(Rgb565::to_argb(0x07E0), 0xFF00FF00);
    }

    #[test]
    fn test_to_rgb888_midtones() {
        let (r, g, b) = Rgb565::to_rgb888(Rgb565::pack(16, 32, 8));
        assert_eq!(r, 132);
        assert_eq!(g, 130);
        assert_eq!(b, 66);
    }
}
