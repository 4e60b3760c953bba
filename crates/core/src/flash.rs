//! Page-addressed persistent storage for cartridges.

use thiserror::Error;

use crate::logging::{log, LogCategory, LogLevel};

/// Bytes per flash page.
pub const FLASH_PAGE_SIZE: usize = 256;
/// Number of flash pages.
pub const FLASH_PAGE_COUNT: usize = 8000;
/// Total flash size in bytes.
pub const FLASH_SIZE: usize = FLASH_PAGE_SIZE * FLASH_PAGE_COUNT;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum FlashError {
    #[error("flash page {page} is out of range (0..{})", FLASH_PAGE_COUNT)]
    PageOutOfRange { page: u32 },
    #[error("flash page data must be {} bytes, got {len}", FLASH_PAGE_SIZE)]
    PageSize { len: usize },
    #[error("flash image must be {} bytes, got {len}", FLASH_SIZE)]
    ImageSize { len: usize },
}

/// The flash region, allocated once at full size.
#[derive(Clone)]
pub struct FlashStore {
    bytes: Box<[u8]>,
}

impl std::fmt::Debug for FlashStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FlashStore")
            .field("used_pages", &self.used_pages())
            .finish()
    }
}

impl Default for FlashStore {
    fn default() -> Self {
        Self::new()
    }
}

impl FlashStore {
    /// Blank (all zero) flash.
    pub fn new() -> Self {
        Self {
            bytes: vec![0u8; FLASH_SIZE].into_boxed_slice(),
        }
    }

    /// Wrap an existing flash image, e.g. one loaded from disk.
    pub fn from_bytes(image: &[u8]) -> Result<Self, FlashError> {
        let mut flash = Self::new();
        flash.replace(image)?;
        Ok(flash)
    }

    /// Copy up to `dst.len()` bytes starting at `offset` into `dst`.
    ///
    /// Returns the number of bytes copied, which is short when the read runs
    /// past the end of flash and zero when `offset` is beyond it.
    pub fn read(&self, offset: usize, dst: &mut [u8]) -> usize {
        let available = self.bytes.len().saturating_sub(offset);
        let n = dst.len().min(available);
        if n > 0 {
            dst[..n].copy_from_slice(&self.bytes[offset..offset + n]);
        }
        log(LogCategory::Flash, LogLevel::Trace, || {
            format!("read {n} bytes at {offset:#x}")
        });
        n
    }

    /// Overwrite one page.
    pub fn write_page(&mut self, page: u32, data: &[u8]) -> Result<(), FlashError> {
        let start = Self::page_offset(page)?;
        if data.len() != FLASH_PAGE_SIZE {
            return Err(FlashError::PageSize { len: data.len() });
        }
        self.bytes[start..start + FLASH_PAGE_SIZE].copy_from_slice(data);
        log(LogCategory::Flash, LogLevel::Debug, || format!("wrote page {page}"));
        Ok(())
    }

    /// Borrow one page.
    pub fn page(&self, page: u32) -> Result<&[u8], FlashError> {
        let start = Self::page_offset(page)?;
        Ok(&self.bytes[start..start + FLASH_PAGE_SIZE])
    }

    fn page_offset(page: u32) -> Result<usize, FlashError> {
        let index = page as usize;
        if index >= FLASH_PAGE_COUNT {
            return Err(FlashError::PageOutOfRange { page });
        }
        Ok(index * FLASH_PAGE_SIZE)
    }

    /// Replace the whole flash contents.
    pub fn replace(&mut self, image: &[u8]) -> Result<(), FlashError> {
        if image.len() != FLASH_SIZE {
            return Err(FlashError::ImageSize { len: image.len() });
        }
        self.bytes.copy_from_slice(image);
        Ok(())
    }

    /// The full flash image.
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Pages holding any non-zero byte.
    pub fn used_pages(&self) -> usize {
        self.bytes
            .chunks_exact(FLASH_PAGE_SIZE)
            .filter(|page| page.iter().any(|&b| b != 0))
            .count()
    }

    /// Zero every page.
    pub fn erase(&mut self) {
        self.bytes.fill(0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allocated_at_full_size() {
        let flash = FlashStore::new();
        assert_eq!(flash.as_bytes().len(), 2_048_000);
        assert_eq!(flash.used_pages(), 0);
    }

    #[test]
    fn page_write_then_read() {
        let mut flash = FlashStore::new();
        let data: Vec<u8> = (0..=255).collect();
        flash.write_page(3, &data).unwrap();

        let mut dst = [0u8; 256];
        assert_eq!(flash.read(3 * FLASH_PAGE_SIZE, &mut dst), 256);
        assert_eq!(&dst[..], &data[..]);
        assert_eq!(flash.used_pages(), 1);
        assert_eq!(flash.page(3).unwrap()[255], 255);
    }

    #[test]
    fn last_page_is_writable() {
        let mut flash = FlashStore::new();
        flash.write_page(7999, &[0xAB; 256]).unwrap();
        assert_eq!(flash.as_bytes()[FLASH_SIZE - 1], 0xAB);
    }

    #[test]
    fn out_of_range_page_is_rejected() {
        let mut flash = FlashStore::new();
        assert_eq!(
            flash.write_page(8000, &[0; 256]),
            Err(FlashError::PageOutOfRange { page: 8000 })
        );
        assert_eq!(
            flash.write_page(u32::MAX, &[0; 256]),
            Err(FlashError::PageOutOfRange { page: u32::MAX })
        );
        assert_eq!(flash.used_pages(), 0);
    }

    #[test]
    fn short_page_data_is_rejected() {
        let mut flash = FlashStore::new();
        assert_eq!(
            flash.write_page(0, &[1; 10]),
            Err(FlashError::PageSize { len: 10 })
        );
    }

    #[test]
    fn reads_are_bounded_by_flash_size() {
        let mut flash = FlashStore::new();
        flash.write_page(7999, &[7; 256]).unwrap();

        let mut dst = [0u8; 100];
        assert_eq!(flash.read(FLASH_SIZE - 10, &mut dst), 10);
        assert_eq!(&dst[..10], &[7; 10]);
        assert_eq!(dst[10], 0);

        assert_eq!(flash.read(FLASH_SIZE, &mut dst), 0);
        assert_eq!(flash.read(usize::MAX, &mut dst), 0);
    }

    #[test]
    fn image_replace_checks_size() {
        let mut flash = FlashStore::new();
        assert_eq!(flash.replace(&[0; 5]), Err(FlashError::ImageSize { len: 5 }));
        let image = vec![1u8; FLASH_SIZE];
        let restored = FlashStore::from_bytes(&image).unwrap();
        assert_eq!(restored.used_pages(), FLASH_PAGE_COUNT);
        flash.replace(restored.as_bytes()).unwrap();
        flash.erase();
        assert_eq!(flash.used_pages(), 0);
    }
}
