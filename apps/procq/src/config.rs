//! # Application Configuration
//!
//! Optional `procq.toml` configuration file, merged under CLI flags.
//! Every field has a default, so the file may name only what it changes:
//!
//! ```toml
//! host = "127.0.0.1"
//! port = 8080
//! debounce_ms = 250
//! engine_timeout_ms = 30000
//! dataset = "events.json"
//! ```

use procq_core::ProcqError;
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Maximum config file size (1 MB). A config larger than this is a mistake.
const MAX_CONFIG_FILE_SIZE: u64 = 1024 * 1024;

// =============================================================================
// CONFIG STRUCTURE
// =============================================================================

/// Application configuration, loaded from `procq.toml` when present.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AppConfig {
    /// Host the HTTP server binds to.
    pub host: String,
    /// Port the HTTP server binds to.
    pub port: u16,
    /// Debounce window before an evaluation round starts.
    pub debounce_ms: u64,
    /// Defensive timeout per engine submission.
    pub engine_timeout_ms: u64,
    /// Event log the local engine evaluates against, if any.
    pub dataset: Option<PathBuf>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
            debounce_ms: 250,
            engine_timeout_ms: 30_000,
            dataset: None,
        }
    }
}

impl AppConfig {
    /// Load configuration from a TOML file, or defaults if the path is
    /// `None` or the file does not exist. A present-but-malformed file is
    /// an error rather than a silent fallback.
    pub fn load(path: Option<&Path>) -> Result<Self, ProcqError> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        if !path.exists() {
            tracing::debug!("No config file at {:?}, using defaults", path);
            return Ok(Self::default());
        }

        let metadata = std::fs::metadata(path)
            .map_err(|e| ProcqError::IoError(format!("Cannot read config metadata: {}", e)))?;
        if metadata.len() > MAX_CONFIG_FILE_SIZE {
            return Err(ProcqError::IoError(format!(
                "Config file size {} bytes exceeds maximum {} bytes",
                metadata.len(),
                MAX_CONFIG_FILE_SIZE
            )));
        }

        let contents = std::fs::read_to_string(path)
            .map_err(|e| ProcqError::IoError(format!("Read config: {}", e)))?;
        let config: AppConfig = toml::from_str(&contents)
            .map_err(|e| ProcqError::SerializationError(format!("Parse config: {}", e)))?;

        tracing::info!("Loaded configuration from {:?}", path);
        Ok(config)
    }
}

// =============================================================================
// TESTS
// =============================================================================
