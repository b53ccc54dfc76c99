//! BotFleet configuration system.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{FleetError, Result};

/// Root configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FleetConfig {
    #[serde(default = "default_db_path")]
    pub db_path: String,
    #[serde(default)]
    pub queue: QueueConfig,
    #[serde(default)]
    pub cadence: CadenceConfig,
    #[serde(default)]
    pub buffer: BufferConfig,
    #[serde(default)]
    pub generation: GenerationConfig,
}

fn default_db_path() -> String {
    FleetConfig::home_dir()
        .join("fleet.db")
        .to_string_lossy()
        .into_owned()
}

impl Default for FleetConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            queue: QueueConfig::default(),
            cadence: CadenceConfig::default(),
            buffer: BufferConfig::default(),
            generation: GenerationConfig::default(),
        }
    }
}

impl FleetConfig {
    /// Load config from the default path (~/.botfleet/config.toml).
    pub fn load() -> Result<Self> {
        let path = Self::default_path();
        if path.exists() {
            Self::load_from(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load config from a specific path.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| FleetError::Config(format!("Failed to read config: {e}")))?;
        let config: Self = toml::from_str(&content)
            .map_err(|e| FleetError::Config(format!("Failed to parse config: {e}")))?;
        Ok(config)
    }

    /// Save config to the default path.
    pub fn save(&self) -> Result<()> {
        let path = Self::default_path();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| FleetError::Config(format!("Failed to serialize config: {e}")))?;
        std::fs::write(&path, content)?;
        Ok(())
    }

    /// Get the default config path.
    pub fn default_path() -> PathBuf {
        Self::home_dir().join("config.toml")
    }

    /// Get the BotFleet home directory.
    pub fn home_dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".botfleet")
    }
}

/// Job queue tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueConfig {
    /// Seconds between worker ticks.
    #[serde(default = "default_tick_secs")]
    pub tick_secs: u64,
    /// Max jobs a single tick may claim.
    #[serde(default = "default_claim_batch")]
    pub claim_batch: usize,
    /// Failures before a job is dead-lettered.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Base retry delay in seconds; doubles per attempt.
    #[serde(default = "default_backoff_base_secs")]
    pub backoff_base_secs: u64,
    /// Ceiling on a single retry delay, seconds.
    #[serde(default = "default_backoff_cap_secs")]
    pub backoff_cap_secs: u64,
    /// Fleet-wide in-flight cap for agent-cycle jobs.
    #[serde(default = "default_type_cap")]
    pub agent_cycle_cap: usize,
    /// Fleet-wide in-flight cap for crew-interaction jobs.
    #[serde(default = "default_type_cap")]
    pub crew_interaction_cap: usize,
    /// InProgress rows older than this are treated as orphaned (worker
    /// died mid-run) and returned to Pending.
    #[serde(default = "default_stale_after_secs")]
    pub stale_after_secs: u64,
}

fn default_tick_secs() -> u64 { 60 }
fn default_claim_batch() -> usize { 10 }
fn default_max_attempts() -> u32 { 5 }
fn default_backoff_base_secs() -> u64 { 120 }
fn default_backoff_cap_secs() -> u64 { 3600 }
fn default_type_cap() -> usize { 2 }
fn default_stale_after_secs() -> u64 { 1800 }

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            tick_secs: default_tick_secs(),
            claim_batch: default_claim_batch(),
            max_attempts: default_max_attempts(),
            backoff_base_secs: default_backoff_base_secs(),
            backoff_cap_secs: default_backoff_cap_secs(),
            agent_cycle_cap: default_type_cap(),
            crew_interaction_cap: default_type_cap(),
            stale_after_secs: default_stale_after_secs(),
        }
    }
}

/// Cadence scheduling tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CadenceConfig {
    /// Retry horizon after a failed run, seconds.
    #[serde(default = "default_failure_retry_secs")]
    pub failure_retry_secs: u64,
    /// Active window start hour (UTC) for agents without their own.
    #[serde(default = "default_window_start")]
    pub default_window_start: u8,
    /// Active window end hour (UTC) for agents without their own.
    #[serde(default = "default_window_end")]
    pub default_window_end: u8,
}

fn default_failure_retry_secs() -> u64 { 600 }
fn default_window_start() -> u8 { 7 }
fn default_window_end() -> u8 { 23 }

impl Default for CadenceConfig {
    fn default() -> Self {
        Self {
            failure_retry_secs: default_failure_retry_secs(),
            default_window_start: default_window_start(),
            default_window_end: default_window_end(),
        }
    }
}

/// Content buffer tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BufferConfig {
    /// Max Ready entries held per agent.
    #[serde(default = "default_buffer_cap")]
    pub per_agent_cap: usize,
    /// Entry time-to-live, hours.
    #[serde(default = "default_ttl_hours")]
    pub ttl_hours: u64,
    /// Max agents topped up per fill pass.
    #[serde(default = "default_fill_agents")]
    pub fill_agents_per_run: usize,
    /// Seconds between fill passes when running the built-in driver.
    #[serde(default = "default_fill_interval_secs")]
    pub fill_interval_secs: u64,
    /// Seconds between expiry sweeps.
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
}

fn default_buffer_cap() -> usize { 3 }
fn default_ttl_hours() -> u64 { 48 }
fn default_fill_agents() -> usize { 25 }
fn default_fill_interval_secs() -> u64 { 6 * 3600 }
fn default_sweep_interval_secs() -> u64 { 3600 }

impl Default for BufferConfig {
    fn default() -> Self {
        Self {
            per_agent_cap: default_buffer_cap(),
            ttl_hours: default_ttl_hours(),
            fill_agents_per_run: default_fill_agents(),
            fill_interval_secs: default_fill_interval_secs(),
            sweep_interval_secs: default_sweep_interval_secs(),
        }
    }
}

/// External generation pipeline endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationConfig {
    #[serde(default = "default_gen_endpoint")]
    pub endpoint: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_gen_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_gen_endpoint() -> String { "http://127.0.0.1:8700/generate".into() }
fn default_gen_timeout_secs() -> u64 { 120 }

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            endpoint: default_gen_endpoint(),
            api_key: String::new(),
            timeout_secs: default_gen_timeout_secs(),
        }
    }
}
