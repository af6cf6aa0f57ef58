//! §4.K Configuration. A typed [`EngineConfig`] mirrors the plain-object
//! configuration documented in §6; `Default` supplies every documented
//! default. Loading layers, highest priority first: explicit host overrides,
//! then `CTXPRUNE_*` process environment variables, then an optional TOML
//! file discovered via XDG config-home — the same existing-env-wins /
//! dotenv-second / XDG-last precedence rule the `config` crate already uses
//! for env/config loading elsewhere in this codebase family.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const MAX_TOOL_CACHE_SIZE: usize = 1000;
pub const MAX_TOKEN_CACHE_SIZE: usize = 500;

fn default_protected_tools() -> Vec<String> {
    vec![
        "task".to_string(),
        "todowrite".to_string(),
        "write".to_string(),
        "edit".to_string(),
    ]
}

fn default_truncation_target_tools() -> Vec<String> {
    vec![
        "read".to_string(),
        "grep".to_string(),
        "glob".to_string(),
        "bash".to_string(),
    ]
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DeduplicationConfig {
    pub enabled: bool,
    pub protected_tools: Vec<String>,
}

impl Default for DeduplicationConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            protected_tools: default_protected_tools(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PurgeErrorsConfig {
    pub enabled: bool,
    pub turns: u32,
    pub protected_tools: Vec<String>,
}

impl Default for PurgeErrorsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            turns: 4,
            protected_tools: default_protected_tools(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TruncationConfig {
    pub enabled: bool,
    pub max_tokens: usize,
    pub head_ratio: f64,
    pub tail_ratio: f64,
    pub min_turns_old: u32,
    pub target_tools: Vec<String>,
}

impl Default for TruncationConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            max_tokens: 2000,
            head_ratio: 0.4,
            tail_ratio: 0.4,
            min_turns_old: 2,
            target_tools: default_truncation_target_tools(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AggressivePruningConfig {
    pub hash: bool,
    pub file: bool,
    pub todo: bool,
    pub url: bool,
    pub state_query: bool,
    pub snapshot: bool,
    pub retry: bool,
    pub step_markers: bool,
    pub tool_inputs: bool,
}

impl Default for AggressivePruningConfig {
    fn default() -> Self {
        Self {
            hash: true,
            file: true,
            todo: true,
            url: true,
            state_query: true,
            snapshot: true,
            retry: true,
            step_markers: true,
            tool_inputs: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StrategiesConfig {
    pub deduplication: DeduplicationConfig,
    pub purge_errors: PurgeErrorsConfig,
    pub truncation: TruncationConfig,
    pub aggressive_pruning: AggressivePruningConfig,
}

impl Default for StrategiesConfig {
    fn default() -> Self {
        Self {
            deduplication: DeduplicationConfig::default(),
            purge_errors: PurgeErrorsConfig::default(),
            truncation: TruncationConfig::default(),
            aggressive_pruning: AggressivePruningConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolsSettingsConfig {
    pub protected_tools: Vec<String>,
}

impl Default for ToolsSettingsConfig {
    fn default() -> Self {
        Self {
            protected_tools: default_protected_tools(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscardConfig {
    pub fully_forget: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DistillConfig {
    pub show_distillation: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolsConfig {
    pub settings: ToolsSettingsConfig,
    pub discard: DiscardConfig,
    pub distill: DistillConfig,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            settings: ToolsSettingsConfig::default(),
            discard: DiscardConfig::default(),
            distill: DistillConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TodoReminderConfig {
    pub enabled: bool,
    pub stuck_task_turns: i64,
}

impl Default for TodoReminderConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            stuck_task_turns: 12,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TurnProtectionConfig {
    pub enabled: bool,
    pub turns: u32,
}

impl Default for TurnProtectionConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            turns: 3,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationMode {
    Minimal,
    Detailed,
    Off,
}

impl Default for NotificationMode {
    fn default() -> Self {
        NotificationMode::Minimal
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub enabled: bool,
    pub auto_prune_after_tool: bool,
    pub strategies: StrategiesConfig,
    pub tools: ToolsConfig,
    pub protected_file_patterns: Vec<String>,
    pub turn_protection: TurnProtectionConfig,
    pub todo_reminder: TodoReminderConfig,
    pub prune_notification: NotificationMode,
    pub max_tool_cache_size: usize,
    pub max_token_cache_size: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            auto_prune_after_tool: false,
            strategies: StrategiesConfig::default(),
            tools: ToolsConfig::default(),
            protected_file_patterns: Vec::new(),
            turn_protection: TurnProtectionConfig::default(),
            todo_reminder: TodoReminderConfig::default(),
            prune_notification: NotificationMode::default(),
            max_tool_cache_size: MAX_TOOL_CACHE_SIZE,
            max_token_cache_size: MAX_TOKEN_CACHE_SIZE,
        }
    }
}

impl EngineConfig {
    pub fn protected_tools(&self) -> &[String] {
        &self.tools.settings.protected_tools
    }

    pub fn is_protected_tool(&self, tool: &str) -> bool {
        self.tools
            .settings
            .protected_tools
            .iter()
            .any(|t| t == tool)
    }

    /// Glob-ish match: `*` matches any run of characters, everything else is literal.
    pub fn is_protected_file(&self, path: &str) -> bool {
        self.protected_file_patterns
            .iter()
            .any(|pattern| glob_match(pattern, path))
    }
}

fn glob_match(pattern: &str, text: &str) -> bool {
    fn helper(p: &[u8], t: &[u8]) -> bool {
        match (p.first(), t.first()) {
            (None, None) => true,
            (Some(b'*'), _) => {
                (0..=t.len()).any(|i| helper(&p[1..], &t[i..]))
            }
            (Some(pc), Some(tc)) if pc == tc => helper(&p[1..], &t[1..]),
            _ => false,
        }
    }
    helper(pattern.as_bytes(), text.as_bytes())
}

#[derive(Debug, Error)]
pub enum ConfigLoadError {
    #[error("reading config file {path:?}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("parsing config file {path:?}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
}

/// Loads [`EngineConfig`] by layering (highest priority first): `overrides`,
/// then `CTXPRUNE_*` env vars, then `<XDG_CONFIG_HOME>/<app_name>/ctxprune.toml`.
///
/// A malformed TOML file is a hard [`ConfigLoadError`] — the engine never
/// silently guesses at malformed config, matching §4.K.
pub fn load(app_name: &str, overrides: Option<EngineConfig>) -> Result<EngineConfig, ConfigLoadError> {
    if let Some(cfg) = overrides {
        return Ok(cfg);
    }

    let mut cfg = load_from_xdg_toml(app_name)?;
    apply_env_overrides(&mut cfg);
    Ok(cfg)
}

fn load_from_xdg_toml(app_name: &str) -> Result<EngineConfig, ConfigLoadError> {
    let Ok(base) = cross_xdg::BaseDirs::new() else {
        return Ok(EngineConfig::default());
    };
    let path = base.config_home().join(app_name).join("ctxprune.toml");
    if !path.exists() {
        return Ok(EngineConfig::default());
    }
    let content = std::fs::read_to_string(&path).map_err(|source| ConfigLoadError::Read {
        path: path.clone(),
        source,
    })?;
    toml::from_str(&content).map_err(|source| ConfigLoadError::Parse { path, source })
}

fn apply_env_overrides(cfg: &mut EngineConfig) {
    if let Ok(v) = std::env::var("CTXPRUNE_ENABLED") {
        cfg.enabled = parse_bool(&v, cfg.enabled);
    }
    if let Ok(v) = std::env::var("CTXPRUNE_AUTO_PRUNE_AFTER_TOOL") {
        cfg.auto_prune_after_tool = parse_bool(&v, cfg.auto_prune_after_tool);
    }
    if let Ok(v) = std::env::var("CTXPRUNE_PRUNE_NOTIFICATION") {
        cfg.prune_notification = match v.as_str() {
            "minimal" => NotificationMode::Minimal,
            "detailed" => NotificationMode::Detailed,
            "off" => NotificationMode::Off,
            _ => cfg.prune_notification,
        };
    }
    if let Ok(v) = std::env::var("CTXPRUNE_MAX_TOOL_CACHE_SIZE") {
        if let Ok(n) = v.parse() {
            cfg.max_tool_cache_size = n;
        }
    }
    if let Ok(v) = std::env::var("CTXPRUNE_MAX_TOKEN_CACHE_SIZE") {
        if let Ok(n) = v.parse() {
            cfg.max_token_cache_size = n;
        }
    }
}

fn parse_bool(v: &str, default: bool) -> bool {
    match v.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => true,
        "0" | "false" | "no" | "off" => false,
        _ => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec_table() {
        let cfg = EngineConfig::default();
        assert!(cfg.enabled);
        assert!(!cfg.auto_prune_after_tool);
        assert_eq!(cfg.strategies.purge_errors.turns, 4);
        assert_eq!(cfg.strategies.truncation.max_tokens, 2000);
        assert_eq!(cfg.protected_tools(), default_protected_tools().as_slice());
        assert!(cfg.todo_reminder.enabled);
        assert_eq!(cfg.todo_reminder.stuck_task_turns, 12);
    }

    #[test]
    fn malformed_toml_is_a_typed_error_not_a_panic() {
        let dir = tempfile::tempdir().unwrap();
        let app_dir = dir.path().join("ctxprune-config-test");
        std::fs::create_dir_all(&app_dir).unwrap();
        std::fs::write(app_dir.join("ctxprune.toml"), "not [[[ valid").unwrap();

        let prev = std::env::var("XDG_CONFIG_HOME").ok();
        std::env::set_var("XDG_CONFIG_HOME", dir.path());
        let result = load_from_xdg_toml("ctxprune-config-test");
        match prev {
            Some(v) => std::env::set_var("XDG_CONFIG_HOME", v),
            None => std::env::remove_var("XDG_CONFIG_HOME"),
        }

        assert!(matches!(result, Err(ConfigLoadError::Parse { .. })));
    }

    #[test]
    fn glob_match_supports_star() {
        assert!(glob_match("*.secret.json", "config.secret.json"));
        assert!(!glob_match("*.secret.json", "config.json"));
        assert!(glob_match("/etc/*", "/etc/passwd"));
    }
}
