use dirs::config_dir;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use crate::error::{Result, SorterError};

/// Environment variable holding the console API token
pub const API_TOKEN_VAR: &str = "API_TOKEN";
/// Environment variable holding the console base URL
pub const CONSOLE_URL_VAR: &str = "CONSOLE_URL";
/// Environment variable selecting the run mode (`local` or `prod`)
pub const RUN_MODE_VAR: &str = "ENV";
/// Environment variable holding the log retention window in days
pub const RETENTION_DAYS_VAR: &str = "RETENTION_LOGS_DAYS";

/// Group rule file contents
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Config {
    /// Group naming the site agents are sorted out of
    #[serde(default = "default_site")]
    pub default_site: String,

    /// Directory receiving daily log files in prod mode
    #[serde(default = "default_logs_dir")]
    pub logs_dir: String,

    /// Console API settings
    #[serde(default)]
    pub api: ApiConfig,

    /// Groups in matching order
    #[serde(default)]
    pub groups: Vec<GroupConfig>,
}

/// One group and the patterns routing agents into it
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct GroupConfig {
    /// Site name as shown in the console
    pub name: String,

    /// Regex patterns, tried in order; empty means the group never auto-matches
    #[serde(default)]
    pub patterns: Vec<String>,
}

/// Console API settings
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ApiConfig {
    /// Timeout for each request in seconds
    #[serde(default = "default_timeout")]
    pub timeout: u64,

    /// Page size for site and agent listings
    #[serde(default = "default_page_size")]
    pub page_size: u32,
}

fn default_site() -> String {
    "Default site".to_string()
}
fn default_logs_dir() -> String {
    "logs".to_string()
}
fn default_timeout() -> u64 {
    30
}
fn default_page_size() -> u32 {
    1000
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            timeout: default_timeout(),
            page_size: default_page_size(),
        }
    }
}

impl Config {
    /// Load the rule file from the default location
    pub fn load_default() -> Result<Self> {
        let config_path = Self::default_config_path()?;

        if !config_path.exists() {
            return Err(SorterError::config(format!(
                "rule file not found at {}. Run: sitesorter init",
                config_path.display()
            )));
        }

        Self::load(&config_path)
    }

    /// Load the rule file from a specific path
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            SorterError::config(format!(
                "failed to read rule file {}: {}",
                path.display(),
                e
            ))
        })?;

        let mut config = Self::from_yaml(&content).map_err(|e| match e {
            SorterError::Config(msg) => {
                SorterError::config(format!("{} ({})", msg, path.display()))
            }
            other => other,
        })?;

        config.expand_paths()?;

        Ok(config)
    }

    /// Parse and validate rule file contents
    pub fn from_yaml(content: &str) -> Result<Self> {
        let config: Config = serde_yaml::from_str(content)
            .map_err(|e| SorterError::config(format!("failed to parse rule file: {}", e)))?;

        config.validate()?;
        Ok(config)
    }

    /// Save the rule file
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = serde_yaml::to_string(self)
            .map_err(|e| SorterError::config(format!("failed to serialize rule file: {}", e)))?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, content)?;

        Ok(())
    }

    /// Default rule file path (XDG compliant)
    pub fn default_config_path() -> Result<PathBuf> {
        let config_dir = config_dir()
            .ok_or_else(|| SorterError::config("failed to get user config directory"))?;

        Ok(config_dir.join("sitesorter").join("rules.yml"))
    }

    /// Expand `~` and environment variables in configured paths
    pub fn expand_paths(&mut self) -> Result<()> {
        self.logs_dir = shellexpand::full(&self.logs_dir)
            .map_err(|e| SorterError::config(format!("failed to expand logs_dir: {}", e)))?
            .into_owned();

        Ok(())
    }

    /// Check group names and the default site reference
    pub fn validate(&self) -> Result<()> {
        if self.groups.is_empty() {
            return Err(SorterError::config("rule file declares no groups"));
        }

        let mut seen = HashSet::new();
        for group in &self.groups {
            if group.name.trim().is_empty() {
                return Err(SorterError::config("group names must not be empty"));
            }
            if !seen.insert(group.name.as_str()) {
                return Err(SorterError::config(format!(
                    "group '{}' is declared more than once",
                    group.name
                )));
            }
        }

        if !seen.contains(self.default_site.as_str()) {
            return Err(SorterError::config(format!(
                "default_site '{}' must be one of the configured groups",
                self.default_site
            )));
        }

        if self.api.timeout == 0 {
            return Err(SorterError::config("api.timeout must be at least 1 second"));
        }
        if self.api.page_size == 0 {
            return Err(SorterError::config("api.page_size must be at least 1"));
        }

        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.api.timeout)
    }

    pub fn logs_path(&self) -> PathBuf {
        PathBuf::from(&self.logs_dir)
    }
}

impl Default for Config {
    fn default() -> Self {
        let group = |name: &str, patterns: &[&str]| GroupConfig {
            name: name.to_string(),
            patterns: patterns.iter().map(|p| p.to_string()).collect(),
        };

        Self {
            default_site: default_site(),
            logs_dir: default_logs_dir(),
            api: ApiConfig::default(),
            groups: vec![
                group("France", &["(?i)(C|S|V)FR.+"]),
                group("Germany", &["(?i)(C|S|V)DE.+"]),
                group("Shared Services", &["(?i)AZ.+"]),
                group("Default site", &[]),
            ],
        }
    }
}

/// How the run talks to its operator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    /// Interactive: terminal output and confirmation prompt
    Local,
    /// Unattended: daily log files, no prompt
    Prod,
}

impl RunMode {
    pub fn is_interactive(self) -> bool {
        matches!(self, RunMode::Local)
    }
}

impl FromStr for RunMode {
    type Err = SorterError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "local" => Ok(RunMode::Local),
            "prod" => Ok(RunMode::Prod),
            other => Err(SorterError::config(format!(
                "unknown {} value '{}'. Please use local|prod values",
                RUN_MODE_VAR, other
            ))),
        }
    }
}

impl fmt::Display for RunMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunMode::Local => write!(f, "local"),
            RunMode::Prod => write!(f, "prod"),
        }
    }
}

/// Values sourced from the process environment
#[derive(Clone)]
pub struct EnvSettings {
    pub api_token: String,
    pub console_url: String,
    pub mode: RunMode,
    pub retention_days: u64,
}

impl fmt::Debug for EnvSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EnvSettings")
            .field("api_token", &"<redacted>")
            .field("console_url", &self.console_url)
            .field("mode", &self.mode)
            .field("retention_days", &self.retention_days)
            .finish()
    }
}

impl EnvSettings {
    /// Read settings from the process environment
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read settings through an arbitrary lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |key: &str| -> Result<String> {
            match lookup(key) {
                Some(value) if !value.trim().is_empty() => Ok(value.trim().to_string()),
                _ => Err(SorterError::config(format!(
                    "{} environment variable is not set",
                    key
                ))),
            }
        };

        // Mode first so an unknown mode is reported even when other values are missing
        let mode: RunMode = required(RUN_MODE_VAR)?.parse()?;
        let api_token = required(API_TOKEN_VAR)?;
        let console_url = parse_console_url(&required(CONSOLE_URL_VAR)?)?;

        let retention_raw = required(RETENTION_DAYS_VAR)?;
        let retention_days = retention_raw.parse::<u64>().map_err(|_| {
            SorterError::config(format!(
                "{} must be a whole number of days, got '{}'",
                RETENTION_DAYS_VAR, retention_raw
            ))
        })?;

        Ok(Self {
            api_token,
            console_url,
            mode,
            retention_days,
        })
    }
}

fn parse_console_url(raw: &str) -> Result<String> {
    let url = reqwest::Url::parse(raw).map_err(|e| {
        SorterError::config(format!("{} is not a valid URL ({}): {}", CONSOLE_URL_VAR, raw, e))
    })?;

    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(SorterError::config(format!(
            "{} must use http or https, got '{}'",
            CONSOLE_URL_VAR,
            url.scheme()
        )));
    }

    Ok(raw.trim_end_matches('/').to_string())
}

/// Everything a run needs, resolved once at startup
#[derive(Debug, Clone)]
pub struct Settings {
    pub rules: Config,
    pub env: EnvSettings,
}

impl Settings {
    pub fn new(rules: Config, env: EnvSettings) -> Self {
        Self { rules, env }
    }
}
