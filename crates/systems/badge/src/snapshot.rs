//! Whole-machine snapshots: linear memory followed by flash, no header.

use std::fmt;

use badge_core::flash::FLASH_SIZE;
use badge_core::memory_map::MEMORY_SIZE;
use thiserror::Error;

use crate::{BadgeError, Runtime};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SnapshotError {
    #[error("snapshot must be {expected} bytes, got {actual}")]
    Size { expected: usize, actual: usize },
}

/// An owned copy of a runtime's memory and flash.
#[derive(Clone, PartialEq, Eq)]
pub struct StateSnapshot {
    memory: Box<[u8]>,
    flash: Box<[u8]>,
}

impl fmt::Debug for StateSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StateSnapshot")
            .field("memory", &self.memory.len())
            .field("flash", &self.flash.len())
            .finish()
    }
}

impl StateSnapshot {
    /// Serialized length.
    pub const SIZE: usize = MEMORY_SIZE + FLASH_SIZE;

    pub fn capture(runtime: &Runtime) -> Self {
        Self {
            memory: runtime.memory_bytes().into_boxed_slice(),
            flash: runtime.flash().as_bytes().into(),
        }
    }

    /// Overwrite the runtime's memory and flash with this snapshot.
    pub fn restore(&self, runtime: &mut Runtime) -> Result<(), BadgeError> {
        runtime.restore_raw(&self.memory, &self.flash)
    }

    pub fn memory(&self) -> &[u8] {
        &self.memory
    }

    pub fn flash(&self) -> &[u8] {
        &self.flash
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(Self::SIZE);
        out.extend_from_slice(&self.memory);
        out.extend_from_slice(&self.flash);
        out
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, SnapshotError> {
        if bytes.len() != Self::SIZE {
            return Err(SnapshotError::Size {
                expected: Self::SIZE,
                actual: bytes.len(),
            });
        }
        let (memory, flash) = bytes.split_at(MEMORY_SIZE);
        Ok(Self {
            memory: memory.into(),
            flash: flash.into(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serialized_layout_is_memory_then_flash() {
        let mut bytes = vec![0u8; StateSnapshot::SIZE];
        bytes[0] = 1;
        bytes[MEMORY_SIZE - 1] = 2;
        bytes[MEMORY_SIZE] = 3;
        let snapshot = StateSnapshot::from_bytes(&bytes).unwrap();
        assert_eq!(snapshot.memory().len(), MEMORY_SIZE);
        assert_eq!(snapshot.flash().len(), FLASH_SIZE);
        assert_eq!(snapshot.memory()[0], 1);
        assert_eq!(snapshot.memory()[MEMORY_SIZE - 1], 2);
        assert_eq!(snapshot.flash()[0], 3);
        assert_eq!(snapshot.to_bytes(), bytes);
    }

    #[test]
    fn wrong_length_is_rejected() {
        assert_eq!(
            StateSnapshot::from_bytes(&[0; 16]),
            Err(SnapshotError::Size {
                expected: StateSnapshot::SIZE,
                actual: 16
            })
        );
        let long = vec![0u8; StateSnapshot::SIZE + 1];
        assert!(StateSnapshot::from_bytes(&long).is_err());
    }

    #[test]
    fn size_matches_the_fixed_layout() {
        assert_eq!(StateSnapshot::SIZE, 4 * 1024 * 1024 + 2_048_000);
    }
}
