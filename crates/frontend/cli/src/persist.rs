//! Flash images and snapshots on disk.

use anyhow::{Context, Result};
use badge_core::flash::FLASH_SIZE;
use badge_system::{Runtime, StateSnapshot};
use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};

/// SHA256 of the cart image, hex encoded.
pub fn cart_hash(cart: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(cart);
    format!("{:x}", hasher.finalize())
}

/// Default flash file for a cart: `saves/<hash>.flash` next to the
/// executable.
pub fn default_flash_path(cart: &[u8]) -> PathBuf {
    let mut path = std::env::current_exe()
        .ok()
        .and_then(|p| p.parent().map(|p| p.to_path_buf()))
        .unwrap_or_else(|| PathBuf::from("."));
    path.push("saves");
    path.push(format!("{}.flash", cart_hash(cart)));
    path
}

/// Load a flash image into the runtime. A missing file leaves flash blank.
pub fn load_flash(runtime: &mut Runtime, path: &Path) -> Result<bool> {
    let image = match fs::read(path) {
        Ok(image) => image,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(false),
        Err(e) => return Err(e).with_context(|| format!("reading {}", path.display())),
    };
    if image.len() != FLASH_SIZE {
        log::warn!(
            "{} is {} bytes, expected {}; ignoring it",
            path.display(),
            image.len(),
            FLASH_SIZE
        );
        return Ok(false);
    }
    runtime.load_flash(&image)?;
    Ok(true)
}

pub fn save_flash(runtime: &Runtime, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, runtime.flash().as_bytes())
        .with_context(|| format!("writing {}", path.display()))
}

pub fn write_snapshot(runtime: &Runtime, path: &Path) -> Result<()> {
    let bytes = StateSnapshot::capture(runtime).to_bytes();
    fs::write(path, bytes).with_context(|| format!("writing {}", path.display()))
}

pub fn read_snapshot(path: &Path) -> Result<StateSnapshot> {
    let bytes = fs::read(path).with_context(|| format!("reading {}", path.display()))?;
    Ok(StateSnapshot::from_bytes(&bytes)?)
}
