use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

use crate::error::{ForecastError, Result};

pub const ENV_PREFIX: &str = "FORECAST";
pub const DEFAULT_CONFIG_FILE: &str = "forecast.toml";
/// Upper bound on the quote TTL (one year).
pub const MAX_CACHE_TTL_SECS: u64 = 365 * 24 * 60 * 60;

/// Process-wide settings, built once at startup and handed to each component.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub app: AppSettings,
    pub models: ModelSettings,
    pub realtime: RealtimeSettings,
    pub tracker: TrackerSettings,
    pub logging: LoggingSettings,
}

impl Settings {
    /// Layer defaults, an optional TOML file and `FORECAST__*` environment variables.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        dotenvy::dotenv().ok();

        let file = path
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));

        let settings: Settings = config::Config::builder()
            .add_source(config::Config::try_from(&Settings::default())?)
            .add_source(config::File::from(file.clone()).required(path.is_some()))
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            // Older deployments export the quote API key without a prefix
            .set_override_option("realtime.api_key", std::env::var("REALTIME_API_KEY").ok())?
            .build()?
            .try_deserialize()?;

        if let Err(errors) = settings.validate() {
            return Err(ForecastError::Config(errors.join(", ")));
        }

        info!("Settings loaded ({} environment, config file {})",
              settings.app.environment, file.display());
        Ok(settings)
    }

    pub fn validate(&self) -> std::result::Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if self.realtime.cache_ttl_secs == 0 {
            errors.push("realtime.cache_ttl_secs must be > 0".to_string());
        } else if self.realtime.cache_ttl_secs > MAX_CACHE_TTL_SECS {
            errors.push(format!("realtime.cache_ttl_secs must be <= {}", MAX_CACHE_TTL_SECS));
        }
        if self.realtime.request_timeout_ms == 0 {
            errors.push("realtime.request_timeout_ms must be > 0".to_string());
        }
        if self.realtime.max_requests_per_minute == 0 {
            errors.push("realtime.max_requests_per_minute must be > 0".to_string());
        }
        if self.realtime.api_base_url.trim().is_empty() {
            errors.push("realtime.api_base_url must not be empty".to_string());
        }
        if self.tracker.database_url.trim().is_empty() {
            errors.push("tracker.database_url must not be empty".to_string());
        }
        for (name, file) in self.models.artifact_files() {
            if file.trim().is_empty() {
                errors.push(format!("models.{} must not be empty", name));
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppSettings {
    pub name: String,
    pub environment: String,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            name: "Stock Price Prediction Core".to_string(),
            environment: "development".to_string(),
        }
    }
}

/// Artifact locations. File names are resolved against `dir`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelSettings {
    pub dir: PathBuf,
    pub lstm_file: String,
    pub arima_file: String,
    pub sarima_file: String,
    pub lightgbm_file: String,
    pub scaler_file: String,
    pub risk_model_file: String,
    pub event_model_file: String,
}

impl Default for ModelSettings {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("models"),
            lstm_file: "lstm_model.json".to_string(),
            arima_file: "arima_model.json".to_string(),
            sarima_file: "sarima_model.json".to_string(),
            lightgbm_file: "lightgbm_model.json".to_string(),
            scaler_file: "scaler.json".to_string(),
            risk_model_file: "risk_model.json".to_string(),
            event_model_file: "event_impact_model.json".to_string(),
        }
    }
}

impl ModelSettings {
    fn artifact_files(&self) -> [(&'static str, &str); 7] {
        [
            ("lstm_file", &self.lstm_file),
            ("arima_file", &self.arima_file),
            ("sarima_file", &self.sarima_file),
            ("lightgbm_file", &self.lightgbm_file),
            ("scaler_file", &self.scaler_file),
            ("risk_model_file", &self.risk_model_file),
            ("event_model_file", &self.event_model_file),
        ]
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RealtimeSettings {
    pub cache_path: PathBuf,
    pub cache_ttl_secs: u64,
    pub api_base_url: String,
    pub api_key: Option<String>,
    pub request_timeout_ms: u64,
    pub max_requests_per_minute: u32,
}

impl Default for RealtimeSettings {
    fn default() -> Self {
        Self {
            cache_path: PathBuf::from("data/realtime_cache"),
            cache_ttl_secs: 60,
            api_base_url: "https://finnhub.io/api/v1".to_string(),
            api_key: None,
            request_timeout_ms: 5_000,
            max_requests_per_minute: 60,
        }
    }
}

impl RealtimeSettings {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn cache_ttl(&self) -> Result<chrono::Duration> {
        i64::try_from(self.cache_ttl_secs)
            .ok()
            .and_then(chrono::Duration::try_seconds)
            .ok_or_else(|| {
                ForecastError::Config(format!("realtime.cache_ttl_secs out of range: {}", self.cache_ttl_secs))
            })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerSettings {
    pub database_url: String,
}

impl Default for TrackerSettings {
    fn default() -> Self {
        Self {
            database_url: "sqlite:./data/prediction_tracker.db".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    pub level: String,
    pub json: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}
