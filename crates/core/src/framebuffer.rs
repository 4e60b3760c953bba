//! Software rasterizer for the console framebuffer.
//!
//! The pixel array lives inside guest linear memory at [`ADDR_FRAMEBUFFER`], so
//! the rasterizer never owns pixels. [`Framebuffer`] owns only the dirty-pixel
//! counter and hands out a [`Canvas`] that borrows the memory for the duration
//! of one drawing call.
//!
//! Every primitive clips to the screen. Out-of-bounds or degenerate geometry
//! draws nothing and is never an error.

use bitflags::bitflags;

use crate::graphics::font::{self, FONT, GLYPH_SIZE};
use crate::memory_map::{ADDR_FRAMEBUFFER, FRAMEBUFFER_END, HEIGHT, PIXEL_COUNT, WIDTH};

const W: i64 = WIDTH as i64;
const H: i64 = HEIGHT as i64;

bitflags! {
    /// Sprite transform bits, as passed by guests to `blit`.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct BlitFlags: u32 {
        const FLIP_X = 1;
        const FLIP_Y = 2;
        const ROTATE = 4;
    }
}

/// Geometry of a sprite blit: destination position, size, and where to sample
/// in the source bitmap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BlitRegion {
    pub dst_x: i32,
    pub dst_y: i32,
    pub width: i32,
    pub height: i32,
    pub src_x: i32,
    pub src_y: i32,
    /// Source row length in pixels.
    pub src_stride: i32,
}

impl BlitRegion {
    /// A region that copies a whole `width` x `height` sprite to `(x, y)`.
    pub fn sprite(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self {
            dst_x: x,
            dst_y: y,
            width,
            height,
            src_x: 0,
            src_y: 0,
            src_stride: width,
        }
    }
}

/// Dirty-pixel bookkeeping for the framebuffer region of linear memory.
#[derive(Debug, Default, Clone)]
pub struct Framebuffer {
    pixels_changed: usize,
}

impl Framebuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Borrow `memory` for drawing.
    ///
    /// # Panics
    ///
    /// If `memory` is too short to contain the framebuffer region.
    pub fn canvas<'a>(&'a mut self, memory: &'a mut [u8]) -> Canvas<'a> {
        assert!(
            memory.len() >= FRAMEBUFFER_END,
            "linear memory too small for framebuffer: {} < {}",
            memory.len(),
            FRAMEBUFFER_END
        );
        Canvas {
            memory,
            pixels_changed: &mut self.pixels_changed,
        }
    }

    /// Pixel touches accumulated since the last drain.
    pub fn pixels_changed(&self) -> usize {
        self.pixels_changed
    }

    /// Drain the dirty counter.
    pub fn count_changed_pixels_and_reset(&mut self) -> usize {
        std::mem::take(&mut self.pixels_changed)
    }

    /// The packed little-endian pixel bytes within `memory`.
    pub fn pixel_bytes(memory: &[u8]) -> Option<&[u8]> {
        memory.get(ADDR_FRAMEBUFFER..FRAMEBUFFER_END)
    }

    /// Read one pixel from `memory`, if `(x, y)` is on screen.
    pub fn pixel(memory: &[u8], x: i32, y: i32) -> Option<u16> {
        let index = pixel_index(x as i64, y as i64)?;
        let offset = ADDR_FRAMEBUFFER + index * 2;
        let cell = memory.get(offset..offset + 2)?;
        Some(u16::from_le_bytes([cell[0], cell[1]]))
    }
}

#[inline]
fn pixel_index(x: i64, y: i64) -> Option<usize> {
    if (0..W).contains(&x) && (0..H).contains(&y) {
        Some((y * W + x) as usize)
    } else {
        None
    }
}

/// Calls `visit(tx, ty, sx, sy)` for every on-screen destination pixel of a
/// blit, where `(sx, sy)` is the source pixel it samples.
///
/// Rotation swaps the traversal axes and toggles the horizontal flip, so the
/// clip rectangle is computed against the swapped screen dimensions.
fn walk_blit(region: &BlitRegion, flags: BlitFlags, mut visit: impl FnMut(i64, i64, i64, i64)) {
    let dst_x = region.dst_x as i64;
    let dst_y = region.dst_y as i64;
    let width = region.width as i64;
    let height = region.height as i64;
    let src_x = region.src_x as i64;
    let src_y = region.src_y as i64;

    let rotate = flags.contains(BlitFlags::ROTATE);
    let flip_x = flags.contains(BlitFlags::FLIP_X) != rotate;
    let flip_y = flags.contains(BlitFlags::FLIP_Y);

    let (clip_x_min, clip_y_min, clip_x_max, clip_y_max) = if rotate {
        (
            dst_y.max(0) - dst_y,
            dst_x.max(0) - dst_x,
            width.min(H - dst_y),
            height.min(W - dst_x),
        )
    } else {
        (
            dst_x.max(0) - dst_x,
            dst_y.max(0) - dst_y,
            width.min(W - dst_x),
            height.min(H - dst_y),
        )
    };

    for y in clip_y_min..clip_y_max {
        for x in clip_x_min..clip_x_max {
            let (tx, ty) = if rotate {
                (dst_x + y, dst_y + x)
            } else {
                (dst_x + x, dst_y + y)
            };
            let sx = src_x + if flip_x { width - x - 1 } else { x };
            let sy = src_y + if flip_y { height - y - 1 } else { y };
            visit(tx, ty, sx, sy);
        }
    }
}

/// Drawing surface over the framebuffer region of linear memory.
pub struct Canvas<'a> {
    memory: &'a mut [u8],
    pixels_changed: &'a mut usize,
}

impl Canvas<'_> {
    #[inline]
    fn put(&mut self, color: u16, index: usize) {
        let offset = ADDR_FRAMEBUFFER + index * 2;
        if let Some(cell) = self.memory.get_mut(offset..offset + 2) {
            cell.copy_from_slice(&color.to_le_bytes());
        }
    }

    /// Read back one pixel.
    pub fn pixel(&self, x: i32, y: i32) -> Option<u16> {
        Framebuffer::pixel(self.memory, x, y)
    }

    /// Pixel touches accumulated so far.
    pub fn pixels_changed(&self) -> usize {
        *self.pixels_changed
    }

    pub fn fill_screen(&mut self, color: u16) {
        let bytes = color.to_le_bytes();
        for cell in self.memory[ADDR_FRAMEBUFFER..FRAMEBUFFER_END].chunks_exact_mut(2) {
            cell.copy_from_slice(&bytes);
        }
        *self.pixels_changed += PIXEL_COUNT;
    }

    /// Write a pixel the caller already knows is on screen. Counts one touch.
    #[inline]
    pub fn draw_point(&mut self, color: u16, x: i32, y: i32) {
        debug_assert!(pixel_index(x as i64, y as i64).is_some());
        self.plot(color, x as i64, y as i64);
    }

    #[inline]
    fn plot(&mut self, color: u16, x: i64, y: i64) {
        if let Some(index) = pixel_index(x, y) {
            self.put(color, index);
        }
        *self.pixels_changed += 1;
    }

    /// Write a pixel if it is on screen. Off-screen points are not counted.
    #[inline]
    pub fn draw_point_clipped(&mut self, color: u16, x: i32, y: i32) {
        self.plot_clipped(color, x as i64, y as i64);
    }

    #[inline]
    fn plot_clipped(&mut self, color: u16, x: i64, y: i64) {
        if let Some(index) = pixel_index(x, y) {
            self.put(color, index);
            *self.pixels_changed += 1;
        }
    }

    /// Fill `[start_x, end_x)` on an on-screen row.
    fn span(&mut self, color: u16, start_x: i64, y: i64, end_x: i64) {
        if start_x >= end_x {
            return;
        }
        let row = (y * W) as usize;
        for x in start_x..end_x {
            self.put(color, row + x as usize);
        }
        *self.pixels_changed += (end_x - start_x) as usize;
    }

    /// Fill `[start_x, end_x)` on row `y`, clipped to the screen.
    fn span_clipped(&mut self, color: u16, start_x: i64, y: i64, end_x: i64) {
        if !(0..H).contains(&y) || end_x <= 0 || start_x >= W {
            return;
        }
        self.span(color, start_x.max(0), y, end_x.min(W));
    }

    pub fn draw_hline(&mut self, color: u16, x: i32, y: i32, len: i32) {
        let start_x = x as i64;
        self.span_clipped(color, start_x, y as i64, start_x + len as i64);
    }

    pub fn draw_vline(&mut self, color: u16, x: i32, y: i32, len: i32) {
        let (x, y) = (x as i64, y as i64);
        let end_y = y + len as i64;
        if end_y <= 0 || !(0..W).contains(&x) {
            return;
        }
        for row in y.max(0)..end_y.min(H) {
            self.plot(color, x, row);
        }
    }

    /// Fill then stroke an axis-aligned rectangle. Each edge clips on its own.
    pub fn draw_rect(
        &mut self,
        stroke: Option<u16>,
        fill: Option<u16>,
        x: i32,
        y: i32,
        width: i32,
        height: i32,
    ) {
        if (stroke.is_none() && fill.is_none()) || width <= 0 || height <= 0 {
            return;
        }
        let (x, y) = (x as i64, y as i64);
        let right = x + width as i64;
        let bottom = y + height as i64;

        let start_x = x.max(0);
        let start_y = y.max(0);
        let end_x = right.min(W);
        let end_y = bottom.min(H);

        if let Some(fill) = fill {
            for row in start_y..end_y {
                self.span(fill, start_x, row, end_x);
            }
        }

        if let Some(stroke) = stroke {
            if (0..W).contains(&x) {
                for row in start_y..end_y {
                    self.plot(stroke, x, row);
                }
            }
            if right > 0 && right <= W {
                for row in start_y..end_y {
                    self.plot(stroke, right - 1, row);
                }
            }
            if (0..H).contains(&y) {
                self.span(stroke, start_x, y, end_x);
            }
            if bottom > 0 && bottom <= H {
                self.span(stroke, start_x, bottom - 1, end_x);
            }
        }
    }

    /// Midpoint ellipse inscribed in the `width` x `height` box at `(x, y)`.
    ///
    /// One quadrant is traced and mirrored. For even heights the south row
    /// starts one above the north row so the shared center row is not drawn
    /// twice. The vertical step is tested before the horizontal step and both
    /// may fire in one iteration; pixel output depends on that order.
    pub fn draw_oval(
        &mut self,
        stroke: Option<u16>,
        fill: Option<u16>,
        x: i32,
        y: i32,
        width: i32,
        height: i32,
    ) {
        if (stroke.is_none() && fill.is_none()) || width <= 0 || height <= 0 {
            return;
        }
        // Decision terms grow with the square of the size.
        let mut a = width as i128 - 1;
        let b = height as i128 - 1;
        let mut b1 = b % 2;

        let mut north = y as i64 + (height / 2) as i64;
        let mut west = x as i64;
        let mut east = x as i64 + width as i64 - 1;
        let mut south = north - b1 as i64;

        let a2 = a * a;
        let b2 = b * b;
        let mut dx = 4 * (1 - a) * b2;
        let mut dy = 4 * (b1 + 1) * a2;
        let mut err = dx + dy + b1 * a2;

        a = 8 * a2;
        b1 = 8 * b2;

        loop {
            if let Some(stroke) = stroke {
                self.plot_clipped(stroke, east, north);
                self.plot_clipped(stroke, west, north);
                self.plot_clipped(stroke, west, south);
                self.plot_clipped(stroke, east, south);
            }

            let start = west + 1;
            if let Some(fill) = fill {
                if east - start > 0 {
                    self.span_clipped(fill, start, north, east);
                    self.span_clipped(fill, start, south, east);
                }
            }

            let err2 = 2 * err;
            if err2 <= dy {
                north += 1;
                south -= 1;
                dy += a;
                err += dy;
            }
            if err2 >= dx || err2 > dy {
                west += 1;
                east -= 1;
                dx += b1;
                err += dx;
            }

            if west > east {
                break;
            }
        }

        // Finish the caps of thin ellipses.
        if let Some(stroke) = stroke {
            while north - south < height as i64 {
                self.plot_clipped(stroke, west - 1, north);
                self.plot_clipped(stroke, east + 1, north);
                north += 1;
                self.plot_clipped(stroke, west - 1, south);
                self.plot_clipped(stroke, east + 1, south);
                south -= 1;
            }
        }
    }

    /// Bresenham line, always walked top to bottom so both directions paint
    /// the same pixels.
    pub fn draw_line(&mut self, color: u16, x1: i32, y1: i32, x2: i32, y2: i32) {
        let (mut x1, mut y1, mut x2, mut y2) = (x1 as i64, y1 as i64, x2 as i64, y2 as i64);
        if y1 > y2 {
            std::mem::swap(&mut x1, &mut x2);
            std::mem::swap(&mut y1, &mut y2);
        }

        let dx = (x2 - x1).abs();
        let sx = if x1 < x2 { 1 } else { -1 };
        let dy = y2 - y1;

        // Error term kept doubled so the half-step start is exact.
        let mut err = if dx > dy { dx } else { -dy };

        loop {
            self.plot_clipped(color, x1, y1);
            if x1 == x2 && y1 == y2 {
                break;
            }
            let e2 = err;
            if e2 > -2 * dx {
                err -= 2 * dy;
                x1 += sx;
            }
            if e2 < 2 * dy {
                err += 2 * dx;
                y1 += 1;
            }
        }
    }

    /// Draw bytes with the built-in font. `\n` starts a new line at `x`; codes
    /// below 32 leave a blank cell.
    pub fn draw_text(
        &mut self,
        text_color: Option<u16>,
        background: Option<u16>,
        text: &[u8],
        x: i32,
        y: i32,
    ) {
        let palette = [text_color, background];
        let mut cursor_x = x;
        let mut cursor_y = y;

        for &code in text {
            if code == b'\n' {
                cursor_y = cursor_y.saturating_add(GLYPH_SIZE);
                cursor_x = x;
                continue;
            }
            if let Some(row) = font::glyph_row(code) {
                let region = BlitRegion {
                    dst_x: cursor_x,
                    dst_y: cursor_y,
                    width: GLYPH_SIZE,
                    height: GLYPH_SIZE,
                    src_x: 0,
                    src_y: row,
                    src_stride: GLYPH_SIZE,
                };
                self.blit_palette(&palette, &FONT, &region, BlitFlags::empty());
            }
            cursor_x = cursor_x.saturating_add(GLYPH_SIZE);
        }
    }

    /// Blit a 1bpp (2 colors) or 2bpp (4 colors) packed bitmap.
    ///
    /// Pixels are packed MSB-first. A `None` palette slot is transparent.
    /// Source indices outside `sprite` read as color index 0.
    pub fn blit_palette(
        &mut self,
        colors: &[Option<u16>],
        sprite: &[u8],
        region: &BlitRegion,
        flags: BlitFlags,
    ) {
        let two_bpp = colors.len() == 4;
        let stride = region.src_stride as i64;

        walk_blit(region, flags, |tx, ty, sx, sy| {
            let bit_index = sy * stride + sx;
            let color_index = if bit_index < 0 {
                0
            } else if two_bpp {
                let byte = sprite.get((bit_index >> 2) as usize).copied().unwrap_or(0);
                let shift = 6 - ((bit_index & 0x03) << 1);
                (byte >> shift) & 0x03
            } else {
                let byte = sprite.get((bit_index >> 3) as usize).copied().unwrap_or(0);
                let shift = 7 - (bit_index & 0x07);
                (byte >> shift) & 0x01
            };

            if let Some(Some(color)) = colors.get(color_index as usize) {
                self.plot(*color, tx, ty);
            }
        });
    }

    /// Blit 16-bit pixels from a host-side sprite.
    pub fn blit(&mut self, sprite: &[u16], region: &BlitRegion, flags: BlitFlags) {
        let stride = region.src_stride as i64;
        walk_blit(region, flags, |tx, ty, sx, sy| {
            let index = sy * stride + sx;
            let color = if index < 0 {
                0
            } else {
                sprite.get(index as usize).copied().unwrap_or(0)
            };
            self.plot(color, tx, ty);
        });
    }

    /// Blit 16-bit little-endian pixels stored in linear memory at
    /// `sprite_offset`. Samples outside memory read as 0.
    pub fn blit_from_memory(&mut self, sprite_offset: usize, region: &BlitRegion, flags: BlitFlags) {
        let stride = region.src_stride as i64;
        walk_blit(region, flags, |tx, ty, sx, sy| {
            let index = sy * stride + sx;
            let color = if index < 0 {
                0
            } else {
                let offset = sprite_offset.saturating_add(index as usize * 2);
                match self.memory.get(offset..offset.saturating_add(2)) {
                    Some([lo, hi]) => u16::from_le_bytes([*lo, *hi]),
                    _ => 0,
                }
            };
            self.plot(color, tx, ty);
        });
    }
}
