use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Carts larger than this still load but get a one-time warning.
pub const DEFAULT_CART_SIZE_LIMIT: usize = 1 << 16;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    pub cart_size_limit: usize,
    pub warn_on_oversize: bool,
    /// Title shown in the crash screen header.
    pub crash_title: String,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            cart_size_limit: DEFAULT_CART_SIZE_LIMIT,
            warn_on_oversize: true,
            crash_title: "SYCL BADGE SIM".to_string(),
        }
    }
}

impl RuntimeConfig {
    pub fn from_json(contents: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(contents)
    }

    /// Read a JSON config file. Missing keys take their defaults.
    pub fn load(path: impl AsRef<Path>) -> std::io::Result<Self> {
        let contents = fs::read_to_string(path)?;
        Self::from_json(&contents)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = RuntimeConfig::default();
        assert_eq!(config.cart_size_limit, 65536);
        assert!(config.warn_on_oversize);
        assert_eq!(config.crash_title, "SYCL BADGE SIM");
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let config = RuntimeConfig::from_json(r#"{ "crash_title": "OOPS" }"#).unwrap();
        assert_eq!(config.crash_title, "OOPS");
        assert_eq!(config.cart_size_limit, DEFAULT_CART_SIZE_LIMIT);
    }

    #[test]
    fn round_trips_through_json() {
        let config = RuntimeConfig {
            cart_size_limit: 10,
            warn_on_oversize: false,
            crash_title: "X".into(),
        };
        let text = serde_json::to_string(&config).unwrap();
        assert_eq!(RuntimeConfig::from_json(&text).unwrap(), config);
    }

    #[test]
    fn rejects_wrong_types() {
        assert!(RuntimeConfig::from_json(r#"{ "cart_size_limit": "big" }"#).is_err());
    }
}
