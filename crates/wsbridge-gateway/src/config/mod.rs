//! Bridge config loader (strict parsing).

pub mod schema;

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use wsbridge_core::error::{BridgeError, Result};

pub use schema::{BridgeConfig, GatewaySection, OriginPolicy, SessionSection};

/// Default per-user config location: `<config_dir>/wsbridge/config.yml`.
pub fn default_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("wsbridge").join("config.yml"))
}

pub fn load_from_file(path: impl AsRef<Path>) -> Result<BridgeConfig> {
    let path = path.as_ref();
    let s = fs::read_to_string(path).map_err(|e| {
        BridgeError::Internal(format!("read config {} failed: {e}", path.display()))
    })?;
    load_from_str(&s)
}

/// Load `path` if it exists, otherwise fall back to defaults.
pub fn load_or_default(path: impl AsRef<Path>) -> Result<BridgeConfig> {
    let path = path.as_ref();
    match fs::read_to_string(path) {
        Ok(s) => load_from_str(&s),
        Err(e) if e.kind() == ErrorKind::NotFound => {
            tracing::debug!(path = %path.display(), "no config file, using defaults");
            Ok(BridgeConfig::default())
        }
        Err(e) => Err(BridgeError::Internal(format!(
            "read config {} failed: {e}",
            path.display()
        ))),
    }
}

pub fn load_from_str(s: &str) -> Result<BridgeConfig> {
    let cfg: BridgeConfig = serde_yaml::from_str(s)
        .map_err(|e| BridgeError::InvalidRequest(format!("bad config: invalid yaml: {e}")))?;
    cfg.validate()?;
    Ok(cfg)
}
