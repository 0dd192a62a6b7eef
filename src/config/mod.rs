//! Configuration system (layered: defaults < config file < env).

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumIter, EnumString};

use crate::error::{EncoreError, Result};
use crate::model::ollama::DEFAULT_BASE_URL;
use crate::prompt::DEFAULT_PERSONA;

/// Engine configuration.
///
/// Resolution order:
/// 1. Built-in defaults
/// 2. `~/.encore/config.toml` (or an explicit file)
/// 3. Environment variables (a `.env` file is loaded first if present)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EncoreConfig {
    pub model: String,
    pub ollama_base_url: String,
    pub temperature: f64,
    /// Reference chunks retrieved per exchange.
    pub retrieval_k: usize,
    pub retrieval_timeout_ms: u64,
    /// Capacity of each exchange's event queue.
    pub event_queue_capacity: usize,
    /// Idle time after which a session is evicted.
    pub session_max_age_secs: u64,
    pub sweep_interval_secs: u64,
    pub persona: String,
}

impl Default for EncoreConfig {
    fn default() -> Self {
        Self {
            model: "qwen2.5:32b".to_string(),
            ollama_base_url: DEFAULT_BASE_URL.to_string(),
            temperature: 0.7,
            retrieval_k: 5,
            retrieval_timeout_ms: 10_000,
            event_queue_capacity: crate::bridge::DEFAULT_CAPACITY,
            session_max_age_secs: 3600,
            sweep_interval_secs: 300,
            persona: DEFAULT_PERSONA.to_string(),
        }
    }
}

type EnvSetter = fn(&mut EncoreConfig, &str, String) -> Result<()>;

/// Environment variables and how each one applies. Later entries win.
const ENV_SETTERS: [(&str, EnvSetter); 10] = [
    ("LLM_MODEL", |c, _, raw| {
        c.model = raw;
        Ok(())
    }),
    ("ENCORE_MODEL", |c, _, raw| {
        c.model = raw;
        Ok(())
    }),
    ("OLLAMA_HOST", |c, _, raw| {
        c.ollama_base_url = normalize_host(&raw);
        Ok(())
    }),
    ("TEMPERATURE", |c, var, raw| {
        c.temperature = parse_env(var, &raw)?;
        Ok(())
    }),
    ("RAG_RESULTS", |c, var, raw| {
        c.retrieval_k = parse_env(var, &raw)?;
        Ok(())
    }),
    ("ENCORE_RETRIEVAL_TIMEOUT_MS", |c, var, raw| {
        c.retrieval_timeout_ms = parse_env(var, &raw)?;
        Ok(())
    }),
    ("ENCORE_EVENT_QUEUE", |c, var, raw| {
        c.event_queue_capacity = parse_env(var, &raw)?;
        Ok(())
    }),
    ("ENCORE_SESSION_MAX_AGE", |c, var, raw| {
        c.session_max_age_secs = parse_env(var, &raw)?;
        Ok(())
    }),
    ("ENCORE_SWEEP_INTERVAL", |c, var, raw| {
        c.sweep_interval_secs = parse_env(var, &raw)?;
        Ok(())
    }),
    ("ENCORE_PERSONA", |c, _, raw| {
        c.persona = raw;
        Ok(())
    }),
];

fn parse_env<T: std::str::FromStr>(var: &str, raw: &str) -> Result<T> {
    raw.trim()
        .parse()
        .map_err(|_| EncoreError::Configuration(format!("{var} has invalid value '{raw}'")))
}

impl EncoreConfig {
    /// Defaults overlaid with the process environment.
    pub fn from_env() -> Result<Self> {
        let _ = dotenvy::dotenv();
        let mut config = Self::default();
        config.apply_env_with(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Full layered load from the default config file and the environment.
    pub fn load() -> Result<Self> {
        Self::load_from(&default_config_path())
    }

    /// Layered load from an explicit config file and the environment.
    pub fn load_from(path: &Path) -> Result<Self> {
        let _ = dotenvy::dotenv();
        let mut config = Self::from_file(path)?;
        config.apply_env_with(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Read a TOML config file. A missing file yields the defaults.
    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = match fs::read_to_string(path) {
            Ok(data) => data,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(err) => return Err(EncoreError::Io(err)),
        };
        toml::from_str(&raw).map_err(|e| {
            EncoreError::Configuration(format!("invalid config file {}: {e}", path.display()))
        })
    }

    /// Apply environment overrides using `lookup` to resolve variables.
    pub fn apply_env_with(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        for (var, apply) in ENV_SETTERS {
            if let Some(raw) = lookup(var) {
                apply(self, var, raw)?;
            }
        }
        Ok(())
    }

    /// Reject values the engine cannot run with.
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(EncoreError::Configuration(format!(
                "temperature must be within 0.0..=2.0, got {}",
                self.temperature
            )));
        }
        if self.event_queue_capacity == 0 {
            return Err(EncoreError::Configuration(
                "event_queue_capacity must be at least 1".into(),
            ));
        }
        if self.sweep_interval_secs == 0 {
            return Err(EncoreError::Configuration(
                "sweep_interval_secs must be at least 1".into(),
            ));
        }
        if self.model.trim().is_empty() {
            return Err(EncoreError::Configuration("model must not be empty".into()));
        }
        Ok(())
    }

    pub fn retrieval_timeout(&self) -> Duration {
        Duration::from_millis(self.retrieval_timeout_ms)
    }

    pub fn session_max_age(&self) -> Duration {
        Duration::from_secs(self.session_max_age_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}

/// `OLLAMA_HOST` is often given without a scheme.
fn normalize_host(raw: &str) -> String {
    let trimmed = raw.trim().trim_end_matches('/');
    if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
        trimmed.to_string()
    } else {
        format!("http://{trimmed}")
    }
}

pub fn default_config_path() -> PathBuf {
    directories::UserDirs::new()
        .map(|dirs| dirs.home_dir().join(".encore"))
        .unwrap_or_else(|| PathBuf::from(".encore"))
        .join("config.toml")
}

/// User-facing sampling preset.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Display, EnumString, AsRefStr, EnumIter, Serialize, Deserialize,
)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
#[serde(rename_all = "lowercase")]
pub enum Creativity {
    Precise,
    #[default]
    Balanced,
    Creative,
}

impl Creativity {
    pub fn temperature(self) -> f64 {
        match self {
            Self::Precise => 0.3,
            Self::Balanced => 0.7,
            Self::Creative => 1.1,
        }
    }
}
