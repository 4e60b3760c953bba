//! Graphics building blocks for the console framebuffer
//!
//! Color packing and the built-in font live here; the rasterizer itself is in
//! [`crate::framebuffer`].

pub mod color;
pub mod font;

pub use color::Rgb565;
pub use font::FONT;
