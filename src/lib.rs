//! GoalNet
//!
//! Client-side engine for a personal goal graph:
//! - Optimistic state synchronization against a remote CRUD store
//!   (apply now, confirm or compensate)
//! - Deterministic activation diffusion through weighted directed links
//! - Local append-only ledger of daily commit deltas
//! - Typed synchronous event bus decoupling state from presentation

pub mod activation;
pub mod error;
pub mod events;
pub mod graph;
pub mod history;
pub mod remote;

use anyhow::Result;
use serde::Deserialize;
use std::path::{Path, PathBuf};

use activation::ActivationConfig;
use graph::scheduler::DEFAULT_DEBOUNCE_MS;

// ============================================================================
// YAML config structs (deserialization targets)
// ============================================================================

/// Top-level YAML configuration file structure
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct YamlConfig {
    pub api: ApiYamlConfig,
    pub sync: SyncYamlConfig,
    pub activation: ActivationConfig,
}

/// Remote API section
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ApiYamlConfig {
    pub base_url: String,
    /// Bearer token. Usually supplied via `GOALNET_TOKEN` instead.
    pub token: String,
}

impl Default for ApiYamlConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8080".into(),
            token: String::new(),
        }
    }
}

/// Sync tuning section
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SyncYamlConfig {
    /// Quiet window for the position batch scheduler, in milliseconds.
    pub debounce_ms: u64,
    /// Path of the local history ledger file. Empty means the platform
    /// data dir.
    pub ledger_path: String,
}

impl Default for SyncYamlConfig {
    fn default() -> Self {
        Self {
            debounce_ms: DEFAULT_DEBOUNCE_MS,
            ledger_path: String::new(),
        }
    }
}

// ============================================================================
// Runtime config (what the application actually uses)
// ============================================================================

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub api_base_url: String,
    pub api_token: String,
    pub debounce_ms: u64,
    pub ledger_path: PathBuf,
    pub activation: ActivationConfig,
}

impl Config {
    /// Load configuration from environment variables only.
    /// Equivalent to from_yaml_and_env(None).
    pub fn from_env() -> Result<Self> {
        Self::from_yaml_and_env(None)
    }

    /// Load configuration from an optional YAML file, then override with
    /// env vars.
    ///
    /// Priority: env var > YAML > default
    ///
    /// If `yaml_path` is None, tries "goalnet.yaml" in CWD. If the file
    /// doesn't exist, falls back to pure env var / defaults.
    pub fn from_yaml_and_env(yaml_path: Option<&Path>) -> Result<Self> {
        let yaml = Self::load_yaml(yaml_path);

        let ledger_path = std::env::var("GOALNET_LEDGER_PATH")
            .ok()
            .filter(|s| !s.is_empty())
            .or_else(|| Some(yaml.sync.ledger_path.clone()).filter(|s| !s.is_empty()))
            .map(PathBuf::from)
            .unwrap_or_else(default_ledger_path);

        Ok(Self {
            api_base_url: std::env::var("GOALNET_API_URL").unwrap_or(yaml.api.base_url),
            api_token: std::env::var("GOALNET_TOKEN").unwrap_or(yaml.api.token),
            debounce_ms: std::env::var("GOALNET_DEBOUNCE_MS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(yaml.sync.debounce_ms),
            ledger_path,
            activation: yaml.activation,
        })
    }

    /// Try to load and parse a YAML config file. Returns defaults on any
    /// failure.
    fn load_yaml(yaml_path: Option<&Path>) -> YamlConfig {
        let default_path = Path::new("goalnet.yaml");
        let path = yaml_path.unwrap_or(default_path);

        match std::fs::read_to_string(path) {
            Ok(contents) => match serde_yaml::from_str(&contents) {
                Ok(config) => {
                    tracing::info!("Loaded config from {}", path.display());
                    config
                }
                Err(e) => {
                    tracing::warn!("Failed to parse {}: {}. Using defaults.", path.display(), e);
                    YamlConfig::default()
                }
            },
            Err(_) => YamlConfig::default(),
        }
    }
}

fn default_ledger_path() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("goalnet")
        .join("commit_history.json")
}
