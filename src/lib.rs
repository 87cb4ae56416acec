use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::env;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

pub mod aggregate;
pub mod calendar;
pub mod color;
pub mod fence;
mod metrics;
pub mod panel;
pub mod render;
pub mod session;

/// Result type used throughout this crate.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// The error type returned by all fallible operations within this crate.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error("config error: {0}")]
    Config(#[from] config::ConfigError),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("prometheus error: {0}")]
    Prometheus(#[from] prometheus::Error),
    #[error("Google Calendar error: {0}")]
    GoogleCalendar(#[from] calendar::google::ClientError),
}

/// Calendar configuration.
#[derive(Deserialize, Serialize, Clone, Debug)]
#[serde(default)]
pub struct CalendarConfig {
    /// Source for calendar events.
    pub event_source: calendar::EventSourceKind,
    /// How events are grouped into categories.
    pub mode: aggregate::CategoryMode,
    /// OAuth access token for the Google Calendar API, obtained elsewhere.
    pub access_token: Option<String>,
    /// Calendars to summarize. The primary calendar is used if empty.
    pub calendar_ids: Vec<String>,
    /// Events of the static event source.
    pub events: Vec<calendar::Event>,
    /// Color definitions of the static event source.
    pub colors: calendar::ColorTable,
}

impl Default for CalendarConfig {
    fn default() -> Self {
        CalendarConfig {
            event_source: calendar::EventSourceKind::GoogleCalendar,
            mode: aggregate::CategoryMode::Api,
            access_token: None,
            calendar_ids: Vec::new(),
            events: Vec::new(),
            colors: calendar::ColorTable::new(),
        }
    }
}

/// Panel configuration.
#[derive(Deserialize, Serialize, Clone, Debug)]
#[serde(default)]
pub struct PanelConfig {
    /// Minimum distance between the panel and the viewport edges.
    pub padding: f64,
    /// Position used until the panel was moved for the first time.
    pub initial_position: fence::Position,
    /// File the panel state is persisted in.
    pub state_file: PathBuf,
}

impl Default for PanelConfig {
    fn default() -> Self {
        PanelConfig {
            padding: fence::DEFAULT_PADDING,
            initial_position: fence::Position::new(100.0, 100.0),
            state_file: PathBuf::from("supercal-state.json"),
        }
    }
}

/// Global application configuration.
#[derive(Deserialize, Serialize, Clone, Debug, Default)]
#[serde(default)]
pub struct AppConfig {
    /// Calendar configuration section.
    pub calendar: CalendarConfig,
    /// Panel configuration section.
    pub panel: PanelConfig,
}

impl AppConfig {
    /// Loads the application configuration from files in the `config/` directory and environment
    /// variables.
    pub fn load() -> Result<AppConfig> {
        let app_env = env::var("APP_ENV").unwrap_or_else(|_| "development".into());

        log::debug!("loading configuration using {} environment", app_env);

        let config: AppConfig = Config::builder()
            // Configuration defaults from `config/default.toml`.
            .add_source(File::with_name("config/default").required(false))
            // Optional environment specific config overrides, e.g. `config/production.toml`.
            .add_source(File::with_name(&format!("config/{}", app_env)).required(false))
            // Optional local config overrides from `config/local.toml` (on .gitignore).
            .add_source(File::with_name("config/local").required(false))
            // Config from environment variables prefixed with `SUPERCAL_`.
            .add_source(
                Environment::with_prefix("SUPERCAL")
                    .prefix_separator("_")
                    .separator("__"),
            )
            .build()?
            .try_deserialize()?;

        // The access token is a secret, keep it out of the logs.
        log::debug!(
            "loaded configuration: event source {:?}, mode {}, {} calendars, panel {:?}",
            config.calendar.event_source,
            config.calendar.mode,
            config.calendar.calendar_ids.len(),
            config.panel
        );

        Ok(config)
    }
}
