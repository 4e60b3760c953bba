use anyhow::Result;
use badge_core::types::Frame;
use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

/// Strip ARGB pixels down to packed RGB bytes.
pub fn rgb_bytes(frame: &Frame) -> Vec<u8> {
    frame
        .pixels
        .iter()
        .flat_map(|&argb| [(argb >> 16) as u8, (argb >> 8) as u8, argb as u8])
        .collect()
}

pub fn write_png(frame: &Frame, path: &Path) -> Result<()> {
    let file = BufWriter::new(File::create(path)?);
    let mut encoder = png::Encoder::new(file, frame.width, frame.height);
    encoder.set_color(png::ColorType::Rgb);
    encoder.set_depth(png::BitDepth::Eight);
    let mut writer = encoder.write_header()?;
    writer.write_image_data(&rgb_bytes(frame))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drops_alpha() {
        let mut frame = Frame::new(2, 1);
        frame.pixels = vec![0xFF112233, 0xFFFFFFFF];
        assert_eq!(rgb_bytes(&frame), vec![0x11, 0x22, 0x33, 0xFF, 0xFF, 0xFF]);
    }
}
