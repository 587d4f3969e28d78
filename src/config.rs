use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Result;
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};

/// Environment variable prefix, e.g. `CHANNEL_ANALYTICS__API__PORT=9000`
pub const ENV_PREFIX: &str = "CHANNEL_ANALYTICS";

/// Default keyword vocabulary for product mention reports
pub const DEFAULT_KEYWORDS: [&str; 21] = [
    "paracetamol",
    "ibuprofen",
    "aspirin",
    "amoxicillin",
    "omeprazole",
    "metformin",
    "insulin",
    "vitamin",
    "antibiotic",
    "painkiller",
    "medicine",
    "tablet",
    "capsule",
    "syrup",
    "injection",
    "vaccine",
    "pharmacy",
    "prescription",
    "dosage",
    "treatment",
    "therapy",
];

/// Application configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub logging: LoggingConfig,
    pub api: ApiConfig,
    pub ingestion: IngestionConfig,
    pub detection: DetectionConfig,
    pub analytics: AnalyticsConfig,
}

/// Warehouse location and pool settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Main warehouse file; attached schemas live next to it
    pub path: String,
    pub max_connections: u32,
    pub connection_timeout_secs: u64,
}

/// Log level, format and optional file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    pub file_path: Option<String>,
    pub format: String, // "json" or "text"
}

/// HTTP bind address
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    pub host: String,
    pub port: u16,
}

/// Channel scraping and the raw/media/image directories
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestionConfig {
    /// Channel references; the last path segment is the channel name
    pub channels: Vec<String>,
    pub message_limit: usize,
    pub raw_dir: String,
    pub media_dir: String,
    pub image_dir: String,
    pub client: ClientConfig,
}

/// Client bridge connection
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    pub base_url: String,
    pub api_token: Option<String>,
    pub timeout_secs: u64,
}

/// Detector command and output
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectionConfig {
    /// Detector executable; receives the image path as its last argument
    pub command: String,
    pub args: Vec<String>,
    pub output_path: String,
    pub extensions: Vec<String>,
}

/// Report vocabulary
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyticsConfig {
    pub keywords: Vec<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig {
                path: "data/warehouse.db".to_string(),
                max_connections: 8,
                connection_timeout_secs: 30,
            },
            logging: LoggingConfig {
                level: "info".to_string(),
                file_path: None,
                format: "text".to_string(),
            },
            api: ApiConfig {
                host: "0.0.0.0".to_string(),
                port: 8000,
            },
            ingestion: IngestionConfig {
                channels: vec![
                    "https://t.me/lobelia4cosmetics".to_string(),
                    "https://t.me/tikvahpharma".to_string(),
                    "https://t.me/CheMed123".to_string(),
                ],
                message_limit: 200,
                raw_dir: "data/raw/telegram_messages".to_string(),
                media_dir: "data/raw/media".to_string(),
                image_dir: "data/raw/images".to_string(),
                client: ClientConfig {
                    base_url: "http://127.0.0.1:8081".to_string(),
                    api_token: None,
                    timeout_secs: 30,
                },
            },
            detection: DetectionConfig {
                command: "yolo-detect".to_string(),
                args: vec!["--model".to_string(), "yolov8n.pt".to_string()],
                output_path: "data/enriched/detections.json".to_string(),
                extensions: ["jpg", "jpeg", "png", "bmp", "tiff"]
                    .iter()
                    .map(ToString::to_string)
                    .collect(),
            },
            analytics: AnalyticsConfig {
                keywords: DEFAULT_KEYWORDS.iter().map(ToString::to_string).collect(),
            },
        }
    }
}

impl AppConfig {
    /// Load configuration from multiple sources with precedence
    pub fn load() -> Result<Self> {
        Self::load_from(None)
    }

    /// Load configuration, layering an explicit file over the default locations
    pub fn load_from(path: Option<&Path>) -> Result<Self> {
        let defaults = Config::try_from(&Self::default())
            .map_err(|e| anyhow::anyhow!("Failed to serialize default configuration: {}", e))?;

        let mut builder = Config::builder()
            // Start with default values
            .add_source(defaults)
            // Add config files if they exist
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name("config/local").required(false));

        if let Some(path) = path {
            builder = builder.add_source(File::from(path).required(true));
        }

        let config = builder
            // Add environment variables with prefix
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("ingestion.channels")
                    .with_list_parse_key("detection.args")
                    .with_list_parse_key("detection.extensions")
                    .with_list_parse_key("analytics.keywords")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| anyhow::anyhow!("Failed to load configuration: {}", e))?;

        let app_config: Self = config
            .try_deserialize()
            .map_err(|e| anyhow::anyhow!("Failed to deserialize configuration: {}", e))?;

        // Validate configuration
        app_config.validate()?;

        Ok(app_config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        // Validate database config
        if self.database.path.trim().is_empty() {
            return Err(anyhow::anyhow!("database.path cannot be empty"));
        }
        if self.database.max_connections == 0 {
            return Err(anyhow::anyhow!("max_connections must be greater than 0"));
        }
        if self.database.connection_timeout_secs == 0 {
            return Err(anyhow::anyhow!("connection_timeout_secs must be greater than 0"));
        }

        // Validate logging config
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.as_str()) {
            return Err(anyhow::anyhow!(
                "Invalid log level: {}. Must be one of: {:?}",
                self.logging.level,
                valid_levels
            ));
        }

        let valid_formats = ["text", "json"];
        if !valid_formats.contains(&self.logging.format.as_str()) {
            return Err(anyhow::anyhow!(
                "Invalid log format: {}. Must be one of: {:?}",
                self.logging.format,
                valid_formats
            ));
        }

        // Validate API config
        if self.api.port == 0 {
            return Err(anyhow::anyhow!("api.port must be greater than 0"));
        }

        // Validate ingestion config
        if self.ingestion.message_limit == 0 {
            return Err(anyhow::anyhow!("message_limit must be greater than 0"));
        }
        if self.ingestion.message_limit > 10_000 {
            return Err(anyhow::anyhow!("message_limit too large (max 10,000)"));
        }
        if self.ingestion.client.timeout_secs == 0 {
            return Err(anyhow::anyhow!("client.timeout_secs must be greater than 0"));
        }
        if !self.ingestion.client.base_url.starts_with("http://")
            && !self.ingestion.client.base_url.starts_with("https://")
        {
            return Err(anyhow::anyhow!(
                "client.base_url must be an http(s) URL: {}",
                self.ingestion.client.base_url
            ));
        }

        // Validate detection config
        if self.detection.command.trim().is_empty() {
            return Err(anyhow::anyhow!("detection.command cannot be empty"));
        }
        if self.detection.extensions.is_empty() {
            return Err(anyhow::anyhow!("detection.extensions cannot be empty"));
        }

        // Validate analytics config
        if self.analytics.keywords.iter().all(|k| k.trim().is_empty()) {
            return Err(anyhow::anyhow!("analytics.keywords must contain at least one term"));
        }

        Ok(())
    }

    /// Get log level from environment or config
    #[must_use]
    pub fn get_log_level(&self) -> String {
        std::env::var("RUST_LOG").unwrap_or_else(|_| self.logging.level.clone())
    }

    /// Socket address the API binds to
    #[must_use]
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.api.host, self.api.port)
    }

    #[must_use]
    pub fn database_path(&self) -> PathBuf {
        PathBuf::from(&self.database.path)
    }

    #[must_use]
    pub fn connection_timeout(&self) -> Duration {
        Duration::from_secs(self.database.connection_timeout_secs)
    }

    #[must_use]
    pub fn log_file(&self) -> Option<PathBuf> {
        self.logging.file_path.as_ref().map(PathBuf::from)
    }
}
