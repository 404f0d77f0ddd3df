//! Configuration system for the mapping engine.
//!
//! Uses `figment` for layered configuration: defaults -> config file -> environment -> overrides.
//! Configuration is loaded from `~/.config/fieldmap/config.toml` and/or `.fieldmap/config.toml`
//! in the workspace directory.

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::ConfigError;

/// Top-level configuration for the mapping engine.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub expression: ExpressionConfig,
    #[serde(default)]
    pub template: TemplateConfig,
    #[serde(default)]
    pub automap: AutoMapConfig,
    #[serde(default)]
    pub resolution: ResolutionConfig,
}

/// Evaluation budget for the expression language.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExpressionConfig {
    /// Maximum nodes visited plus function calls per field.
    pub max_steps: u64,
    /// Maximum call nesting accepted by the parser.
    pub max_depth: usize,
    /// Wall-clock budget per field, in milliseconds. `0` disables the clock check.
    pub timeout_ms: u64,
}

impl Default for ExpressionConfig {
    fn default() -> Self {
        Self {
            max_steps: 10_000,
            max_depth: 32,
            timeout_ms: 100,
        }
    }
}

impl ExpressionConfig {
    pub fn timeout(&self) -> Option<Duration> {
        (self.timeout_ms > 0).then(|| Duration::from_millis(self.timeout_ms))
    }
}

/// Template interpolation behaviour.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TemplateConfig {
    /// Fail the whole field on any unresolved token unless the mapping says otherwise.
    pub strict: bool,
}

/// Bounds for the auto-mapper's traversal of upstream outputs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AutoMapConfig {
    /// Deepest nesting level flattened.
    pub max_depth: usize,
    /// Number of leading array elements sampled.
    pub max_samples: usize,
    /// Shortest name considered for substring matches.
    pub min_substring_len: usize,
}

impl Default for AutoMapConfig {
    fn default() -> Self {
        Self {
            max_depth: 6,
            max_samples: 3,
            min_substring_len: 3,
        }
    }
}

/// Settings for whole resolution passes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolutionConfig {
    /// Per-field timeout used by concurrent resolution, in milliseconds.
    pub field_timeout_ms: u64,
}

impl Default for ResolutionConfig {
    fn default() -> Self {
        Self {
            field_timeout_ms: 1_000,
        }
    }
}

impl ResolutionConfig {
    pub fn field_timeout(&self) -> Duration {
        Duration::from_millis(self.field_timeout_ms)
    }
}

impl EngineConfig {
    /// Reject settings that would make the engine unusable.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.expression.max_steps == 0 {
            return Err(ConfigError::InvalidValue {
                field: "expression.max_steps".into(),
                reason: "must be greater than zero".into(),
            });
        }
        if self.expression.max_depth == 0 {
            return Err(ConfigError::InvalidValue {
                field: "expression.max_depth".into(),
                reason: "must be greater than zero".into(),
            });
        }
        if self.automap.max_depth == 0 {
            return Err(ConfigError::InvalidValue {
                field: "automap.max_depth".into(),
                reason: "must be greater than zero".into(),
            });
        }
        if self.resolution.field_timeout_ms == 0 {
            return Err(ConfigError::InvalidValue {
                field: "resolution.field_timeout_ms".into(),
                reason: "must be greater than zero".into(),
            });
        }
        Ok(())
    }

    /// Serialize to TOML, as written by `config init`.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::Serialize {
            message: e.to_string(),
        })
    }
}

/// Path of the user-level config file, if a home directory is known.
pub fn user_config_path() -> Option<PathBuf> {
    directories::ProjectDirs::from("dev", "fieldmap", "fieldmap")
        .map(|dirs| dirs.config_dir().join("config.toml"))
}

/// Path of the workspace-level config file.
pub fn workspace_config_path(workspace: &Path) -> PathBuf {
    workspace.join(".fieldmap").join("config.toml")
}

/// Load configuration from layered sources.
///
/// Priority (highest to lowest):
/// 1. Explicit overrides (passed as argument)
/// 2. Environment variables (prefixed with `FIELDMAP_`)
/// 3. Workspace-local config (`.fieldmap/config.toml`)
/// 4. User config (`~/.config/fieldmap/config.toml`)
/// 5. Built-in defaults
pub fn load_config(
    workspace: Option<&Path>,
    overrides: Option<&EngineConfig>,
) -> Result<EngineConfig, ConfigError> {
    let mut figment = Figment::from(Serialized::defaults(EngineConfig::default()));

    if let Some(user_config) = user_config_path() {
        if user_config.exists() {
            figment = figment.merge(Toml::file(&user_config));
        }
    }

    if let Some(ws) = workspace {
        let ws_config = workspace_config_path(ws);
        if ws_config.exists() {
            figment = figment.merge(Toml::file(&ws_config));
        }
    }

    // FIELDMAP_EXPRESSION__MAX_STEPS, FIELDMAP_TEMPLATE__STRICT, ...
    figment = figment.merge(Env::prefixed("FIELDMAP_").split("__"));

    if let Some(overrides) = overrides {
        figment = figment.merge(Serialized::defaults(overrides));
    }

    figment
        .extract()
        .map_err(|e| ConfigError::Load(Box::new(e)))
}

/// Check whether any config file exists (user-level or workspace-level).
pub fn config_exists(workspace: Option<&Path>) -> bool {
    if user_config_path().is_some_and(|p| p.exists()) {
        return true;
    }
    workspace.is_some_and(|ws| workspace_config_path(ws).exists())
}
