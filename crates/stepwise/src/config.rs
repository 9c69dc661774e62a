//! Agent configuration.
//!
//! Layers, lowest priority first: built-in defaults, the JSON file managed by
//! [`ConfigStore`], then `STEPWISE_*` environment overrides.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{AgentError, AgentResult};

/// Which source powers the `financial_data` and `commodity_price` tools.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum QuoteSourceKind {
    #[default]
    Static,
    Yahoo,
}

impl std::str::FromStr for QuoteSourceKind {
    type Err = AgentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "static" => Ok(Self::Static),
            "yahoo" => Ok(Self::Yahoo),
            other => Err(AgentError::Config(format!("unknown quote source: {other}"))),
        }
    }
}

/// Which backend powers the `search` tool.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SearchBackendKind {
    #[default]
    Static,
    DuckDuckGo,
}

impl std::str::FromStr for SearchBackendKind {
    type Err = AgentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "static" => Ok(Self::Static),
            "duckduckgo" | "ddg" => Ok(Self::DuckDuckGo),
            other => Err(AgentError::Config(format!("unknown search backend: {other}"))),
        }
    }
}

impl std::fmt::Display for SearchBackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SearchBackendKind::Static => write!(f, "static"),
            SearchBackendKind::DuckDuckGo => write!(f, "duckduckgo"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Upper bound on the number of steps a plan may contain.
    pub max_plan_steps: usize,
    /// How many times an invalid model plan is sent back for repair.
    pub max_repair_attempts: u32,
    /// Per-tool time limit in seconds. `None` or `0` disables it.
    pub tool_timeout_secs: Option<u64>,
    pub validate_results: bool,
    pub max_request_chars: usize,
    pub search_max_results: usize,
    pub search_backend: SearchBackendKind,
    pub quote_source: QuoteSourceKind,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_plan_steps: 10,
            max_repair_attempts: 1,
            tool_timeout_secs: Some(30),
            validate_results: true,
            max_request_chars: 4000,
            search_max_results: 5,
            search_backend: SearchBackendKind::Static,
            quote_source: QuoteSourceKind::Static,
        }
    }
}

impl AgentConfig {
    /// Defaults overlaid with the process environment.
    pub fn from_env() -> AgentResult<Self> {
        let mut config = Self::default();
        config.apply_lookup(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// File at the default location overlaid with the process environment.
    pub fn load() -> AgentResult<Self> {
        let mut config = ConfigStore::default_location().load()?;
        config.apply_lookup(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Apply `STEPWISE_*` overrides from an arbitrary key lookup.
    /// Empty values are ignored; unparsable values are a configuration error.
    pub fn apply_lookup<F>(&mut self, lookup: F) -> AgentResult<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        if let Some(value) = get("STEPWISE_MAX_PLAN_STEPS") {
            self.max_plan_steps = parse_value("STEPWISE_MAX_PLAN_STEPS", &value)?;
        }
        if let Some(value) = get("STEPWISE_MAX_REPAIR_ATTEMPTS") {
            self.max_repair_attempts = parse_value("STEPWISE_MAX_REPAIR_ATTEMPTS", &value)?;
        }
        if let Some(value) = get("STEPWISE_TOOL_TIMEOUT_SECS") {
            let secs: u64 = parse_value("STEPWISE_TOOL_TIMEOUT_SECS", &value)?;
            self.tool_timeout_secs = (secs > 0).then_some(secs);
        }
        if let Some(value) = get("STEPWISE_VALIDATE_RESULTS") {
            self.validate_results = parse_bool("STEPWISE_VALIDATE_RESULTS", &value)?;
        }
        if let Some(value) = get("STEPWISE_MAX_REQUEST_CHARS") {
            self.max_request_chars = parse_value("STEPWISE_MAX_REQUEST_CHARS", &value)?;
        }
        if let Some(value) = get("STEPWISE_SEARCH_MAX_RESULTS") {
            self.search_max_results = parse_value("STEPWISE_SEARCH_MAX_RESULTS", &value)?;
        }
        if let Some(value) = get("STEPWISE_SEARCH_BACKEND") {
            self.search_backend = value.parse()?;
        }
        if let Some(value) = get("STEPWISE_QUOTE_SOURCE") {
            self.quote_source = value.parse()?;
        }
        Ok(())
    }

    pub fn tool_timeout(&self) -> Option<Duration> {
        self.tool_timeout_secs
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
    }
}

fn parse_value<T: std::str::FromStr>(key: &str, value: &str) -> AgentResult<T> {
    value
        .trim()
        .parse()
        .map_err(|_| AgentError::Config(format!("invalid value for {key}: {value}")))
}

fn parse_bool(key: &str, value: &str) -> AgentResult<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(AgentError::Config(format!("invalid value for {key}: {value}"))),
    }
}

/// JSON file holding an [`AgentConfig`].
#[derive(Debug, Clone)]
pub struct ConfigStore {
    path: PathBuf,
}

impl ConfigStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    /// Uses `STEPWISE_CONFIG_PATH` or falls back to the platform config directory.
    pub fn default_location() -> Self {
        let path = std::env::var("STEPWISE_CONFIG_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| {
                dirs::config_dir()
                    .unwrap_or_else(|| PathBuf::from("."))
                    .join("stepwise")
                    .join("config.json")
            });
        Self::new(path)
    }

    /// Load the config, returning defaults if the file does not exist.
    pub fn load(&self) -> AgentResult<AgentConfig> {
        if !self.path.exists() {
            return Ok(AgentConfig::default());
        }
        let data = fs::read_to_string(&self.path)
            .map_err(|e| AgentError::Config(format!("{}: {e}", self.path.display())))?;
        serde_json::from_str(&data)
            .map_err(|e| AgentError::Config(format!("{}: {e}", self.path.display())))
    }

    pub fn save(&self, config: &AgentConfig) -> AgentResult<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|e| AgentError::Config(e.to_string()))?;
        }
        let data =
            serde_json::to_string_pretty(config).map_err(|e| AgentError::Config(e.to_string()))?;
        fs::write(&self.path, data).map_err(|e| AgentError::Config(e.to_string()))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}
