//! Lightweight configuration loader and path helpers.
//!
//! Uses Figment to merge `config.toml` + `config.<env>.toml` + `APP_*` env vars
//! (nested keys separated by `__`, e.g. `APP_PERSONA__DRIFT_THRESHOLD`).
//! Provides helpers to expand `~` and `${VAR}` and to resolve relative paths
//! against a known base directory.

use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::types::{ChannelWeights, DEFAULT_CHANNEL_WEIGHTS};

pub struct Config {
    figment: Figment,
}

impl Config {
    pub fn load() -> anyhow::Result<Self> {
        let env_name = env::var("RUST_ENV").unwrap_or_else(|_| "dev".to_string());

        let mut figment = Figment::new().merge(Toml::file("config.toml"));
        match env_name.as_str() {
            "dev" | "development" => figment = figment.merge(Toml::file("config.dev.toml")),
            "prod" | "production" => figment = figment.merge(Toml::file("config.prod.toml")),
            "test" | "testing" => figment = figment.merge(Toml::file("config.test.toml")),
            _ => {}
        }
        figment = figment.merge(Env::prefixed("APP_").split("__"));

        Ok(Self { figment })
    }

    /// Build from an explicit figment, e.g. a single TOML string in tests.
    pub fn from_figment(figment: Figment) -> Self {
        Self { figment }
    }

    pub fn get<T>(&self, key: &str) -> anyhow::Result<T>
    where
        T: serde::de::DeserializeOwned,
    {
        self.figment
            .extract_inner(key)
            .map_err(|e| anyhow::anyhow!("Failed to get '{}': {}", key, e))
    }

    /// The `persona` section, defaulted and validated. A missing section
    /// yields the defaults.
    pub fn persona(&self) -> anyhow::Result<PersonaConfig> {
        let cfg = if self.figment.contains("persona") {
            self.get::<PersonaConfig>("persona")?
        } else {
            PersonaConfig::default()
        };
        cfg.validate()?;
        Ok(cfg)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PersonaConfig {
    pub name: String,
    pub embedding_model: String,
    pub vector_dimension: usize,
    /// Estimated-token ceiling per chunk.
    pub chunk_size: usize,
    pub drift_threshold: f32,
    pub default_top_k: usize,
    pub channel_weights: ChannelWeights,
    pub embedder: EmbedderSettings,
}

impl Default for PersonaConfig {
    fn default() -> Self {
        Self {
            name: "jenny".to_string(),
            embedding_model: "hashing-v1".to_string(),
            vector_dimension: 1536,
            chunk_size: 250,
            drift_threshold: 0.78,
            default_top_k: 5,
            channel_weights: DEFAULT_CHANNEL_WEIGHTS,
            embedder: EmbedderSettings::default(),
        }
    }
}

impl PersonaConfig {
    pub fn named(name: impl Into<String>) -> Self {
        Self { name: name.into(), ..Self::default() }
    }

    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.drift_threshold) {
            return Err(Error::InvalidConfig(format!(
                "drift_threshold must lie in [0, 1], got {}",
                self.drift_threshold
            )));
        }
        if self.vector_dimension == 0 {
            return Err(Error::InvalidConfig("vector_dimension must be > 0".into()));
        }
        if self.chunk_size == 0 {
            return Err(Error::InvalidConfig("chunk_size must be > 0".into()));
        }
        if self.default_top_k == 0 {
            return Err(Error::InvalidConfig("default_top_k must be > 0".into()));
        }
        validate_channel_weights(&self.channel_weights)?;
        self.embedder.validate()
    }
}

pub fn validate_channel_weights(weights: &ChannelWeights) -> Result<()> {
    for (channel, w) in weights.iter() {
        if !w.is_finite() || *w < 0.0 {
            return Err(Error::InvalidConfig(format!(
                "channel weight for {channel} must be finite and non-negative, got {w}"
            )));
        }
    }
    if weights.iter().all(|(_, w)| *w == 0.0) {
        return Err(Error::InvalidConfig("at least one channel weight must be > 0".into()));
    }
    Ok(())
}

/// Provider selection plus the retry/timeout policy wrapped around it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbedderSettings {
    pub provider: String,
    pub max_retries: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
    /// Per-call timeout; 0 disables it.
    pub timeout_ms: u64,
}

impl Default for EmbedderSettings {
    fn default() -> Self {
        Self {
            provider: "hashing".to_string(),
            max_retries: 2,
            initial_backoff_ms: 50,
            max_backoff_ms: 1000,
            timeout_ms: 30_000,
        }
    }
}

impl EmbedderSettings {
    pub fn validate(&self) -> Result<()> {
        if self.provider.trim().is_empty() {
            return Err(Error::InvalidConfig("embedder.provider must not be empty".into()));
        }
        if self.initial_backoff_ms > self.max_backoff_ms {
            return Err(Error::InvalidConfig(
                "embedder.initial_backoff_ms must not exceed embedder.max_backoff_ms".into(),
            ));
        }
        Ok(())
    }
}

/// Expand a user-provided path string:
/// - Expands leading '~' to the user's home directory
/// - Expands ${VAR} and $VAR environment variables
/// - Returns a PathBuf without attempting to canonicalize
pub fn expand_path<S: AsRef<str>>(input: S) -> PathBuf {
    let s = input.as_ref();
    let expanded_env = shellexpand::env(s).unwrap_or(std::borrow::Cow::Borrowed(s));
    let expanded = shellexpand::tilde(&expanded_env);
    PathBuf::from(expanded.as_ref())
}

/// Resolve a possibly relative path against a given base directory after expansion.
/// If `p` is absolute, it's returned as-is; otherwise `base.join(p)` is returned.
pub fn resolve_with_base<S: AsRef<str>>(base: &Path, p: S) -> PathBuf {
    let p = expand_path(p);
    if p.is_absolute() { p } else { base.join(p) }
}
