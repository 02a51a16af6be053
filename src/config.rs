use crate::error::{Error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_BASE_URL: &str = "https://dadosabertos.camara.leg.br/api/v2";
pub const STATE_FILE_NAME: &str = "estado.json";
pub const DATABASE_FILE_NAME: &str = "monitor_pl.db";
pub const OUTBOX_FILE_NAME: &str = "outbox.jsonl";

/// Settings for talking to the open data API
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ApiSettings {
    pub base_url: String,
    /// Per-request deadline, in seconds
    pub timeout_secs: u64,
    /// Total attempts for a request failing with a transient error
    pub max_attempts: u32,
    /// Backoff base: attempt `n` waits `multiplier * 2^(n-1)` seconds
    pub backoff_multiplier_secs: u64,
    pub backoff_max_secs: u64,
    /// Sleep `pause_for_secs` after every `pause_every` requests (0 disables)
    pub pause_every: u64,
    pub pause_for_secs: u64,
}

impl Default for ApiSettings {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout_secs: 15,
            max_attempts: 3,
            backoff_multiplier_secs: 1,
            backoff_max_secs: 10,
            pause_every: 100,
            pause_for_secs: 60,
        }
    }
}

impl ApiSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn pause_for(&self) -> Duration {
        Duration::from_secs(self.pause_for_secs)
    }
}

/// Per-entity knobs of an incremental tracker run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrackerSettings {
    /// How far back the listing goes. Unused by decrees, which list by year.
    pub window_days: i64,
    pub page_size: usize,
    /// Only this many listed items get their details fetched
    pub detail_limit: usize,
    pub retention_days: i64,
    pub min_importance: u8,
    pub max_posts_per_day: usize,
    /// Importance below this is never posted, whatever was selected
    pub posting_floor: u8,
}

impl TrackerSettings {
    pub fn bills() -> Self {
        Self {
            window_days: 7,
            page_size: 30,
            detail_limit: 10,
            retention_days: 30,
            min_importance: 3,
            max_posts_per_day: 3,
            posting_floor: 2,
        }
    }

    pub fn votes() -> Self {
        Self {
            page_size: 20,
            ..Self::bills()
        }
    }

    pub fn decrees() -> Self {
        Self {
            window_days: 0,
            page_size: 50,
            detail_limit: 10,
            retention_days: 120,
            min_importance: 3,
            max_posts_per_day: 2,
            posting_floor: 2,
        }
    }

    fn validate(&self, name: &str) -> Result<()> {
        if self.page_size == 0 {
            return Err(Error::Config(format!("{}: page_size must be positive", name)));
        }
        if !(1..=5).contains(&self.min_importance) {
            return Err(Error::Config(format!(
                "{}: min_importance must be between 1 and 5, got {}",
                name, self.min_importance
            )));
        }
        if self.retention_days < 0 {
            return Err(Error::Config(format!(
                "{}: retention_days cannot be negative",
                name
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ExpenseSettings {
    /// Months summarized per legislator, counting the current one
    pub months: u32,
    pub page_size: usize,
}

impl Default for ExpenseSettings {
    fn default() -> Self {
        Self {
            months: 3,
            page_size: 100,
        }
    }
}

/// Tracker keys given in the config file; absent ones keep the entity default
#[derive(Debug, Clone, Copy, Default, Deserialize)]
#[serde(default)]
struct TrackerOverrides {
    window_days: Option<i64>,
    page_size: Option<usize>,
    detail_limit: Option<usize>,
    retention_days: Option<i64>,
    min_importance: Option<u8>,
    max_posts_per_day: Option<usize>,
    posting_floor: Option<u8>,
}

impl TrackerOverrides {
    fn apply(self, base: TrackerSettings) -> TrackerSettings {
        TrackerSettings {
            window_days: self.window_days.unwrap_or(base.window_days),
            page_size: self.page_size.unwrap_or(base.page_size),
            detail_limit: self.detail_limit.unwrap_or(base.detail_limit),
            retention_days: self.retention_days.unwrap_or(base.retention_days),
            min_importance: self.min_importance.unwrap_or(base.min_importance),
            max_posts_per_day: self.max_posts_per_day.unwrap_or(base.max_posts_per_day),
            posting_floor: self.posting_floor.unwrap_or(base.posting_floor),
        }
    }
}

/// Shape of the optional `camarabot.yml`
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
struct ConfigFile {
    data_dir: Option<PathBuf>,
    api: ApiSettings,
    bills: TrackerOverrides,
    votes: TrackerOverrides,
    decrees: TrackerOverrides,
    expenses: ExpenseSettings,
}

/// Configuration for every command of the monitor
#[derive(Debug, Clone)]
pub struct Config {
    pub data_dir: PathBuf,
    pub api: ApiSettings,
    pub bills: TrackerSettings,
    pub votes: TrackerSettings,
    pub decrees: TrackerSettings,
    pub expenses: ExpenseSettings,
}

impl Config {
    /// Create a new default configuration
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            api: ApiSettings::default(),
            bills: TrackerSettings::bills(),
            votes: TrackerSettings::votes(),
            decrees: TrackerSettings::decrees(),
            expenses: ExpenseSettings::default(),
        }
    }

    /// Load a YAML config file. Missing keys keep their defaults. The data
    /// directory is `data_dir`, then the file's `data_dir`, then `fallback`.
    pub fn from_yaml_file(
        path: &Path,
        data_dir: Option<PathBuf>,
        fallback: Option<PathBuf>,
    ) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&content, data_dir, fallback)
    }

    pub fn from_yaml_str(
        content: &str,
        data_dir: Option<PathBuf>,
        fallback: Option<PathBuf>,
    ) -> Result<Self> {
        let file: ConfigFile = serde_yaml::from_str(content)?;
        let data_dir = data_dir
            .or(file.data_dir)
            .or(fallback)
            .ok_or_else(|| Error::Config("no data directory configured".to_string()))?;

        let config = Self {
            data_dir,
            api: file.api,
            bills: file.bills.apply(TrackerSettings::bills()),
            votes: file.votes.apply(TrackerSettings::votes()),
            decrees: file.decrees.apply(TrackerSettings::decrees()),
            expenses: file.expenses,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn state_path(&self) -> PathBuf {
        self.data_dir.join(STATE_FILE_NAME)
    }

    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join(DATABASE_FILE_NAME)
    }

    pub fn outbox_path(&self) -> PathBuf {
        self.data_dir.join(OUTBOX_FILE_NAME)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.api.base_url.trim().is_empty() {
            return Err(Error::Config("api.base_url cannot be empty".to_string()));
        }
        if self.api.max_attempts == 0 {
            return Err(Error::Config(
                "api.max_attempts must be at least 1".to_string(),
            ));
        }
        if self.data_dir.exists() && !self.data_dir.is_dir() {
            return Err(Error::Config(format!(
                "Data directory is not a directory: {}",
                self.data_dir.display()
            )));
        }
        self.bills.validate("bills")?;
        self.votes.validate("votes")?;
        self.decrees.validate("decrees")?;
        if self.expenses.page_size == 0 {
            return Err(Error::Config(
                "expenses: page_size must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

/// Builder for creating configurations
#[derive(Debug, Clone)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Create a new builder with default settings
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            config: Config::new(data_dir),
        }
    }

    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.config.api.base_url = url.into();
        self
    }

    pub fn timeout_secs(mut self, secs: u64) -> Self {
        self.config.api.timeout_secs = secs;
        self
    }

    /// Set attempts and backoff for transient failures
    pub fn retry(mut self, max_attempts: u32, multiplier_secs: u64, max_secs: u64) -> Self {
        self.config.api.max_attempts = max_attempts;
        self.config.api.backoff_multiplier_secs = multiplier_secs;
        self.config.api.backoff_max_secs = max_secs;
        self
    }

    /// Set the cooperative throttle. `every == 0` disables it.
    pub fn throttle(mut self, every: u64, pause_secs: u64) -> Self {
        self.config.api.pause_every = every;
        self.config.api.pause_for_secs = pause_secs;
        self
    }

    pub fn bills(mut self, settings: TrackerSettings) -> Self {
        self.config.bills = settings;
        self
    }

    pub fn votes(mut self, settings: TrackerSettings) -> Self {
        self.config.votes = settings;
        self
    }

    pub fn decrees(mut self, settings: TrackerSettings) -> Self {
        self.config.decrees = settings;
        self
    }

    pub fn expenses(mut self, settings: ExpenseSettings) -> Self {
        self.config.expenses = settings;
        self
    }

    /// Build the configuration
    pub fn build(self) -> Result<Config> {
        self.config.validate()?;
        Ok(self.config)
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new(".")
    }
}
