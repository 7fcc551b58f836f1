//! Settings Models
//!
//! Agent configuration loaded from `texpilot.toml`.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use texpilot_llm::{PlannerClientConfig, ProviderConfig};

use crate::utils::error::{AppError, AppResult};

/// Environment variable that overrides `provider.api_key`
pub const API_KEY_ENV: &str = "TEXPILOT_API_KEY";

/// Planner transport settings (`[planner]`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlannerSettings {
    /// Retries after the first failed attempt
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Per-attempt timeout in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
    /// Read planner text incrementally
    #[serde(default)]
    pub streaming: bool,
    /// Negotiate operations through native tool calling
    #[serde(default)]
    pub native_operations: bool,
}

fn default_max_retries() -> u32 {
    3
}

fn default_request_timeout() -> u64 {
    120
}

impl Default for PlannerSettings {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            request_timeout_secs: default_request_timeout(),
            streaming: false,
            native_operations: false,
        }
    }
}

/// Iteration governor settings (`[governor]`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GovernorSettings {
    /// Turns allowed before the operator is asked to continue
    #[serde(default = "default_iteration_cap")]
    pub iteration_cap: u32,
    /// Turns added each time the operator says yes
    #[serde(default = "default_cap_increment")]
    pub cap_increment: u32,
}

fn default_iteration_cap() -> u32 {
    25
}

fn default_cap_increment() -> u32 {
    10
}

impl Default for GovernorSettings {
    fn default() -> Self {
        Self {
            iteration_cap: default_iteration_cap(),
            cap_increment: default_cap_increment(),
        }
    }
}

/// Prompt context settings (`[context]`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextSettings {
    /// Characters of each known file included in the prompt
    #[serde(default = "default_max_file_chars")]
    pub max_file_chars: usize,
    /// History entries shown in the prompt
    #[serde(default = "default_history_display_limit")]
    pub history_display_limit: usize,
}

fn default_max_file_chars() -> usize {
    12_000
}

fn default_history_display_limit() -> usize {
    20
}

impl Default for ContextSettings {
    fn default() -> Self {
        Self {
            max_file_chars: default_max_file_chars(),
            history_display_limit: default_history_display_limit(),
        }
    }
}

/// Complete agent configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AgentConfig {
    #[serde(default)]
    pub provider: ProviderConfig,
    #[serde(default)]
    pub planner: PlannerSettings,
    #[serde(default)]
    pub governor: GovernorSettings,
    #[serde(default)]
    pub context: ContextSettings,
}

impl AgentConfig {
    /// Parse and validate a TOML document.
    pub fn from_toml_str(content: &str) -> AppResult<Self> {
        let config: AgentConfig = toml::from_str(content)?;
        config.validate().map_err(AppError::validation)?;
        Ok(config)
    }

    /// Load from a file, then apply environment overrides and validate.
    pub fn load(path: &Path) -> AppResult<Self> {
        let content = std::fs::read_to_string(path)?;
        let mut config: AgentConfig = toml::from_str(&content)?;
        config.apply_env(std::env::var(API_KEY_ENV).ok());
        config.validate().map_err(AppError::validation)?;
        Ok(config)
    }

    /// Apply an API key taken from the environment. Empty values are ignored.
    pub fn apply_env(&mut self, api_key: Option<String>) {
        if let Some(key) = api_key.filter(|k| !k.trim().is_empty()) {
            self.provider.api_key = Some(key);
        }
    }

    /// Validate the configuration. Returns the first problem found.
    pub fn validate(&self) -> Result<(), String> {
        if self.provider.model.trim().is_empty() {
            return Err("provider.model must not be empty".to_string());
        }
        if self.provider.max_tokens == 0 {
            return Err("provider.max_tokens must be greater than 0".to_string());
        }
        if !(0.0..=2.0).contains(&self.provider.temperature) {
            return Err(format!(
                "provider.temperature must be between 0.0 and 2.0, got {}",
                self.provider.temperature
            ));
        }
        if self.planner.request_timeout_secs == 0 {
            return Err("planner.request_timeout_secs must be greater than 0".to_string());
        }
        if self.planner.max_retries > 10 {
            return Err(format!(
                "planner.max_retries must be at most 10, got {}",
                self.planner.max_retries
            ));
        }
        if self.governor.iteration_cap == 0 {
            return Err("governor.iteration_cap must be greater than 0".to_string());
        }
        if self.governor.cap_increment == 0 {
            return Err("governor.cap_increment must be greater than 0".to_string());
        }
        if self.context.max_file_chars == 0 {
            return Err("context.max_file_chars must be greater than 0".to_string());
        }
        Ok(())
    }

    pub fn planner_client_config(&self) -> PlannerClientConfig {
        PlannerClientConfig {
            max_retries: self.planner.max_retries,
            request_timeout: Duration::from_secs(self.planner.request_timeout_secs),
            streaming: self.planner.streaming,
            native_operations: self.planner.native_operations,
        }
    }
}
