//! ---
//! udm_section: "01-core-functionality"
//! udm_subsection: "module"
//! udm_type: "source"
//! udm_scope: "code"
//! udm_description: "Shared runtime utilities: configuration and logging."
//! udm_version: "v0.0.0-prealpha"
//! udm_owner: "tbd"
//! ---
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DurationSeconds};
use tracing::debug;
use udm_api::types::CommandType;

use crate::logging::LogFormat;

fn default_reboot_enabled() -> bool {
    true
}

fn default_reboot_after() -> Duration {
    Duration::from_secs(30)
}

fn default_phase_timeout() -> Duration {
    Duration::from_secs(600)
}

fn default_owner_consent_timeout() -> Duration {
    Duration::from_secs(1800)
}

fn default_logging_directory() -> PathBuf {
    PathBuf::from("target/logs")
}

fn default_log_format() -> LogFormat {
    LogFormat::StructuredJson
}

/// Primary configuration object for the update manager runtime.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateManagerConfig {
    /// Orchestration timeouts, consent gating, and reboot policy.
    #[serde(default)]
    pub orchestration: OrchestrationConfig,
    /// Logging destination and format.
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Metadata describing where an [`UpdateManagerConfig`] was loaded from.
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    /// The parsed configuration.
    pub config: UpdateManagerConfig,
    /// Path of the file the configuration was read from.
    pub source: PathBuf,
}

impl UpdateManagerConfig {
    /// Environment variable overriding the configuration file path.
    pub const ENV_CONFIG_PATH: &str = "UDM_CONFIG";

    /// Load configuration from disk, respecting the `UDM_CONFIG` override.
    pub fn load<P: AsRef<Path>>(candidates: &[P]) -> Result<Self> {
        Ok(Self::load_with_source(candidates)?.config)
    }

    /// Load configuration from disk together with the effective source path.
    pub fn load_with_source<P: AsRef<Path>>(candidates: &[P]) -> Result<LoadedConfig> {
        if let Ok(env_path) = std::env::var(Self::ENV_CONFIG_PATH) {
            if !env_path.trim().is_empty() {
                let path = PathBuf::from(env_path);
                let config = Self::from_path(&path)?;
                return Ok(LoadedConfig {
                    config,
                    source: path,
                });
            }
        }

        for candidate in candidates {
            if candidate.as_ref().exists() {
                let path = candidate.as_ref().to_path_buf();
                let config = Self::from_path(&path)?;
                return Ok(LoadedConfig {
                    config,
                    source: path,
                });
            }
        }

        Err(anyhow!(
            "no configuration files found. inspected: {}",
            candidates
                .iter()
                .map(|p| p.as_ref().display().to_string())
                .collect::<Vec<_>>()
                .join(", ")
        ))
    }

    fn from_path(path: &Path) -> Result<Self> {
        debug!(path = %path.display(), "loading configuration");
        let raw = fs::read_to_string(path)
            .with_context(|| format!("failed to read configuration file {}", path.display()))?;
        toml::from_str(&raw)
            .with_context(|| format!("failed to parse configuration file {}", path.display()))
    }
}

/// Orchestration policy options recognised by the core.
#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestrationConfig {
    /// Whether a reboot-requiring update may actually reboot the device.
    #[serde(default = "default_reboot_enabled")]
    pub reboot_enabled: bool,
    /// Delay between the final feedback emission and the reboot call.
    #[serde_as(as = "DurationSeconds<u64>")]
    #[serde(default = "default_reboot_after")]
    pub reboot_after: Duration,
    /// Maximum wall time a single phase may take before it fails.
    #[serde_as(as = "DurationSeconds<u64>")]
    #[serde(default = "default_phase_timeout")]
    pub phase_timeout: Duration,
    /// Commands that require an owner-consent decision before dispatch.
    #[serde(default)]
    pub owner_consent_commands: Vec<CommandType>,
    /// Maximum wall time to await an owner decision.
    #[serde_as(as = "DurationSeconds<u64>")]
    #[serde(default = "default_owner_consent_timeout")]
    pub owner_consent_timeout: Duration,
}

impl Default for OrchestrationConfig {
    fn default() -> Self {
        Self {
            reboot_enabled: default_reboot_enabled(),
            reboot_after: default_reboot_after(),
            phase_timeout: default_phase_timeout(),
            owner_consent_commands: Vec::new(),
            owner_consent_timeout: default_owner_consent_timeout(),
        }
    }
}

/// Logging destination and format options.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Directory receiving the rolling log files.
    #[serde(default = "default_logging_directory")]
    pub directory: PathBuf,
    /// Optional file prefix; defaults to the service name.
    #[serde(default)]
    pub file_prefix: Option<String>,
    /// Stdout log format.
    #[serde(default = "default_log_format")]
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            directory: default_logging_directory(),
            file_prefix: None,
            format: default_log_format(),
        }
    }
}
