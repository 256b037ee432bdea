use std::fmt;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

const CONFIG_FILE: &str = "config.toml";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Warning,
    Error,
}

/// One problem found in a loaded configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigIssue {
    pub severity: Severity,
    pub field: &'static str,
    pub message: String,
}

impl fmt::Display for ConfigIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Issues collected by [`Config::validate`]. Warnings never block loading.
#[derive(Debug, Clone, Default)]
pub struct ValidationResult {
    pub issues: Vec<ConfigIssue>,
}

impl ValidationResult {
    pub fn is_valid(&self) -> bool {
        self.errors().next().is_none()
    }

    pub fn errors(&self) -> impl Iterator<Item = &ConfigIssue> {
        self.issues.iter().filter(|i| i.severity == Severity::Error)
    }

    pub fn warnings(&self) -> impl Iterator<Item = &ConfigIssue> {
        self.issues.iter().filter(|i| i.severity == Severity::Warning)
    }

    fn push(&mut self, severity: Severity, field: &'static str, message: impl Into<String>) {
        self.issues.push(ConfigIssue {
            severity,
            field,
            message: message.into(),
        });
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Application configuration directory
    pub config_dir: PathBuf,

    /// Google OAuth client settings
    #[serde(default)]
    pub google: GoogleConfig,

    /// Reconciliation settings
    #[serde(default)]
    pub sync: SyncConfig,

    /// Organization naming convention
    #[serde(default)]
    pub organizations: OrganizationsConfig,
}

/// Google OAuth configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GoogleConfig {
    /// OAuth client ID from the Google Cloud console
    pub client_id: String,
    /// OAuth client secret
    pub client_secret: String,
    /// Loopback port for the consent callback
    #[serde(default = "default_callback_port")]
    pub callback_port: u16,
}

fn default_callback_port() -> u16 {
    8080
}

impl GoogleConfig {
    /// Check if credentials are configured (not placeholders)
    pub fn is_configured(&self) -> bool {
        !self.client_id.is_empty()
            && !self.client_secret.is_empty()
            && !self.client_id.starts_with("YOUR_")
            && !self.client_secret.starts_with("YOUR_")
    }
}

impl Default for GoogleConfig {
    fn default() -> Self {
        Self {
            client_id: "YOUR_GOOGLE_CLIENT_ID".to_string(),
            client_secret: "YOUR_GOOGLE_CLIENT_SECRET".to_string(),
            callback_port: default_callback_port(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Background refresh interval in minutes (driven by the host)
    #[serde(default = "default_refresh_minutes")]
    pub refresh_minutes: u32,

    /// Page size for the calendar list (single page is read)
    #[serde(default = "default_calendar_page_size")]
    pub calendar_page_size: u32,

    /// Page size for event lists (single page is read)
    #[serde(default = "default_event_page_size")]
    pub event_page_size: u32,

    /// IANA zone used to turn timed events into calendar dates.
    /// Falls back to the host local zone when unset.
    #[serde(default)]
    pub time_zone: Option<String>,
}

fn default_refresh_minutes() -> u32 {
    15
}

fn default_calendar_page_size() -> u32 {
    250
}

fn default_event_page_size() -> u32 {
    2500
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            refresh_minutes: default_refresh_minutes(),
            calendar_page_size: default_calendar_page_size(),
            event_page_size: default_event_page_size(),
            time_zone: None,
        }
    }
}

impl SyncConfig {
    /// Parsed time zone, `None` when unset or unknown.
    pub fn tz(&self) -> Option<chrono_tz::Tz> {
        self.time_zone.as_deref().and_then(|name| name.parse().ok())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrganizationsConfig {
    /// Reserved prefix on remote calendar names that marks an organization calendar
    #[serde(default = "default_label_prefix")]
    pub label_prefix: String,
}

fn default_label_prefix() -> String {
    "MultiappOrg · ".to_string()
}

impl Default for OrganizationsConfig {
    fn default() -> Self {
        Self {
            label_prefix: default_label_prefix(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        let config_dir = dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("orgcal");

        Self {
            config_dir,
            google: GoogleConfig::default(),
            sync: SyncConfig::default(),
            organizations: OrganizationsConfig::default(),
        }
    }
}

impl Config {
    /// Load and validate `<config_dir>/orgcal/config.toml`, writing the
    /// defaults on first run.
    pub fn load() -> Result<Self> {
        let dir = dirs::config_dir()
            .context("Failed to get config directory")?
            .join("orgcal");
        Self::load_from(&dir)
    }

    /// Same as [`Config::load`] for an explicit directory.
    pub fn load_from(dir: &Path) -> Result<Self> {
        let path = dir.join(CONFIG_FILE);

        let config = if path.exists() {
            let contents = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            let mut config: Config = toml::from_str(&contents)
                .with_context(|| format!("Failed to parse {}", path.display()))?;
            config.config_dir = dir.to_path_buf();
            config
        } else {
            let config = Self {
                config_dir: dir.to_path_buf(),
                ..Self::default()
            };
            config.save()?;
            tracing::info!("Wrote default configuration to {}", path.display());
            config
        };

        let validation = config.validate();
        for warning in validation.warnings() {
            tracing::warn!("Config warning: {}", warning);
        }
        if !validation.is_valid() {
            let errors: Vec<String> = validation.errors().map(ToString::to_string).collect();
            anyhow::bail!("Invalid configuration: {}", errors.join("; "));
        }

        Ok(config)
    }

    pub fn validate(&self) -> ValidationResult {
        let mut result = ValidationResult::default();

        if !self.google.is_configured() {
            result.push(
                Severity::Warning,
                "google",
                "Google client not configured, sign-in is unavailable",
            );
        }
        if self.google.callback_port == 0 {
            result.push(Severity::Error, "google.callback_port", "Port cannot be 0");
        }

        if self.sync.refresh_minutes == 0 {
            result.push(
                Severity::Warning,
                "sync.refresh_minutes",
                "Background refresh disabled",
            );
        }
        if !(1..=250).contains(&self.sync.calendar_page_size) {
            result.push(
                Severity::Error,
                "sync.calendar_page_size",
                "Must be between 1 and 250",
            );
        }
        if !(1..=2500).contains(&self.sync.event_page_size) {
            result.push(
                Severity::Error,
                "sync.event_page_size",
                "Must be between 1 and 2500",
            );
        }
        if let Some(zone) = self.sync.time_zone.as_deref() {
            if self.sync.tz().is_none() {
                result.push(
                    Severity::Error,
                    "sync.time_zone",
                    format!("Unknown time zone {}", zone),
                );
            }
        }

        if self.organizations.label_prefix.trim().is_empty() {
            result.push(
                Severity::Error,
                "organizations.label_prefix",
                "Label prefix must not be empty",
            );
        }

        result
    }

    /// Write the configuration to `<config_dir>/config.toml`.
    pub fn save(&self) -> Result<()> {
        std::fs::create_dir_all(&self.config_dir)
            .with_context(|| format!("Failed to create {}", self.config_dir.display()))?;
        let contents = toml::to_string_pretty(self).context("Failed to serialize config")?;
        std::fs::write(self.config_dir.join(CONFIG_FILE), contents)
            .context("Failed to write config file")?;
        Ok(())
    }

    /// Path of the SQLite key-value database under the config directory.
    pub fn state_db_path(&self) -> PathBuf {
        self.config_dir.join("state.db")
    }
}
