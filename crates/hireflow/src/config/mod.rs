use std::env;
use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;

use crate::applications::intake::IntakeProfile;

const DEFAULT_MAX_BODY_BYTES: usize = 32 * 1024 * 1024;

/// Distinguishes runtime behavior for different stages of the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppEnvironment {
    Development,
    Test,
    Production,
}

impl AppEnvironment {
    fn from_str(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "prod" | "production" => Self::Production,
            "test" | "ci" => Self::Test,
            _ => Self::Development,
        }
    }
}

/// Top-level configuration for the application.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub environment: AppEnvironment,
    pub server: ServerConfig,
    pub telemetry: TelemetryConfig,
    pub storage: StorageConfig,
    pub intake: IntakeConfig,
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let environment = AppEnvironment::from_str(
            &env::var("APP_ENV").unwrap_or_else(|_| "development".to_string()),
        );

        let host = env::var("APP_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port = env::var("APP_PORT")
            .unwrap_or_else(|_| "3000".to_string())
            .parse::<u16>()
            .map_err(|_| ConfigError::InvalidPort)?;
        let max_body_bytes = match env::var("APP_MAX_BODY_BYTES") {
            Ok(raw) => raw
                .trim()
                .parse::<usize>()
                .map_err(|_| ConfigError::InvalidBodyLimit)?,
            Err(_) => DEFAULT_MAX_BODY_BYTES,
        };

        let log_level = env::var("APP_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());
        let log_format = match env::var("APP_LOG_FORMAT") {
            Ok(raw) => LogFormat::parse(&raw).ok_or(ConfigError::InvalidLogFormat(raw))?,
            Err(_) => LogFormat::Compact,
        };

        let database_path =
            env::var("APP_DATABASE_PATH").unwrap_or_else(|_| "data/hireflow.db".to_string());
        let upload_dir = PathBuf::from(
            env::var("APP_UPLOAD_DIR").unwrap_or_else(|_| "uploads".to_string()),
        );

        let profile = match env::var("APP_INTAKE_PROFILE") {
            Ok(raw) => IntakeProfile::parse(&raw).ok_or(ConfigError::InvalidIntakeProfile(raw))?,
            Err(_) => IntakeProfile::Standard,
        };
        let allow_images = match env::var("APP_ALLOW_IMAGE_UPLOADS") {
            Ok(raw) => parse_flag(&raw).ok_or(ConfigError::InvalidFlag {
                name: "APP_ALLOW_IMAGE_UPLOADS",
                value: raw,
            })?,
            Err(_) => false,
        };

        Ok(Self {
            environment,
            server: ServerConfig {
                host,
                port,
                max_body_bytes,
            },
            telemetry: TelemetryConfig {
                log_level,
                log_format,
            },
            storage: StorageConfig {
                database_path,
                upload_dir,
            },
            intake: IntakeConfig {
                profile,
                allow_images,
            },
        })
    }
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Settings controlling the HTTP server binding.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub max_body_bytes: usize,
}

impl ServerConfig {
    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        if self.host.eq_ignore_ascii_case("localhost") {
            return Ok(SocketAddr::new(IpAddr::from([127, 0, 0, 1]), self.port));
        }

        let ip: IpAddr = self
            .host
            .parse()
            .map_err(|source| ConfigError::InvalidHost { source })?;

        Ok(SocketAddr::new(ip, self.port))
    }
}

/// Tracing and metrics controls.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub log_level: String,
    pub log_format: LogFormat,
}

/// Output shape of the fmt subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Compact,
    Json,
}

impl LogFormat {
    fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" | "text" => Some(Self::Compact),
            "json" => Some(Self::Json),
            _ => None,
        }
    }
}

/// Where application rows and uploaded documents live.
#[derive(Debug, Clone)]
pub struct StorageConfig {
    /// SQLite file path, or `:memory:` for a throwaway database.
    pub database_path: String,
    pub upload_dir: PathBuf,
}

impl StorageConfig {
    pub fn is_in_memory(&self) -> bool {
        self.database_path.trim() == ":memory:"
    }
}

#[derive(Debug, Clone)]
pub struct IntakeConfig {
    pub profile: IntakeProfile,
    pub allow_images: bool,
}

#[derive(Debug)]
pub enum ConfigError {
    InvalidPort,
    InvalidBodyLimit,
    InvalidHost { source: std::net::AddrParseError },
    InvalidIntakeProfile(String),
    InvalidLogFormat(String),
    InvalidFlag { name: &'static str, value: String },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidPort => write!(f, "APP_PORT must be a valid u16"),
            ConfigError::InvalidBodyLimit => {
                write!(f, "APP_MAX_BODY_BYTES must be a positive byte count")
            }
            ConfigError::InvalidHost { .. } => {
                write!(f, "APP_HOST must parse to an IPv4 or IPv6 address")
            }
            ConfigError::InvalidIntakeProfile(value) => write!(
                f,
                "APP_INTAKE_PROFILE must be 'standard' or 'extended' (found '{value}')"
            ),
            ConfigError::InvalidLogFormat(value) => {
                write!(f, "APP_LOG_FORMAT must be 'compact' or 'json' (found '{value}')")
            }
            ConfigError::InvalidFlag { name, value } => {
                write!(f, "{name} must be a boolean flag (found '{value}')")
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::InvalidHost { source } => Some(source),
            ConfigError::InvalidPort
            | ConfigError::InvalidBodyLimit
            | ConfigError::InvalidIntakeProfile(_)
            | ConfigError::InvalidLogFormat(_)
            | ConfigError::InvalidFlag { .. } => None,
        }
    }
}
