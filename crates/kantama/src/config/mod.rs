use std::env;
use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

const DEFAULT_FRONTEND_URL: &str = "http://localhost:5173";
const DEFAULT_ADMIN_EMAIL: &str = "myynti@kantama.fi";
const DEFAULT_REGISTRY_URL: &str = "https://avoindata.prh.fi/opendata-ytj-api/v3";
const DEVELOPMENT_TOKEN_SECRET: &str = "kantama-development-token-secret";
const MIN_PRODUCTION_SECRET_BYTES: usize = 32;

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

/// Output shape of the log lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Compact,
    Json,
}

impl LogFormat {
    fn parse(value: &str) -> Result<Self, ConfigError> {
        match value.trim().to_ascii_lowercase().as_str() {
            "" | "compact" | "text" => Ok(Self::Compact),
            "json" => Ok(Self::Json),
            _ => Err(ConfigError::InvalidLogFormat {
                value: value.to_string(),
            }),
        }
    }
}

/// Top-level configuration for the application.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub environment: AppEnvironment,
    pub server: ServerConfig,
    pub telemetry: TelemetryConfig,
    pub workflow: WorkflowConfig,
    pub uploads: UploadConfig,
    pub auth: AuthConfig,
    pub registry: RegistryConfig,
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

        let log_level = env::var("APP_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());
        let log_format = match env::var("APP_LOG_FORMAT") {
            Ok(value) => LogFormat::parse(&value)?,
            Err(_) if environment == AppEnvironment::Production => LogFormat::Json,
            Err(_) => LogFormat::Compact,
        };

        let workflow = WorkflowConfig {
            frontend_url: env::var("KANTAMA_FRONTEND_URL")
                .unwrap_or_else(|_| DEFAULT_FRONTEND_URL.to_string()),
            admin_email: env::var("KANTAMA_ADMIN_EMAIL")
                .unwrap_or_else(|_| DEFAULT_ADMIN_EMAIL.to_string()),
        };

        let uploads = UploadConfig {
            directory: PathBuf::from(
                env::var("KANTAMA_UPLOAD_DIR").unwrap_or_else(|_| "./uploads".to_string()),
            ),
            max_upload_bytes: parse_number("KANTAMA_MAX_UPLOAD_BYTES", 10 * 1024 * 1024)?,
            max_logo_bytes: parse_number("KANTAMA_MAX_LOGO_BYTES", 5 * 1024 * 1024)?,
        };

        let token_secret = match env::var("KANTAMA_TOKEN_SECRET") {
            Ok(secret) => secret,
            Err(_) if environment != AppEnvironment::Production => {
                DEVELOPMENT_TOKEN_SECRET.to_string()
            }
            Err(_) => return Err(ConfigError::WeakTokenSecret),
        };
        if environment == AppEnvironment::Production
            && token_secret.len() < MIN_PRODUCTION_SECRET_BYTES
        {
            return Err(ConfigError::WeakTokenSecret);
        }
        let auth = AuthConfig {
            token_secret,
            token_ttl_minutes: parse_number("KANTAMA_TOKEN_TTL_MINUTES", 24 * 60)?,
        };

        let registry = RegistryConfig {
            base_url: env::var("KANTAMA_REGISTRY_URL")
                .unwrap_or_else(|_| DEFAULT_REGISTRY_URL.to_string()),
            timeout_secs: parse_number("KANTAMA_REGISTRY_TIMEOUT_SECS", 10)?,
        };

        Ok(Self {
            environment,
            server: ServerConfig { host, port },
            telemetry: TelemetryConfig {
                log_level,
                format: log_format,
            },
            workflow,
            uploads,
            auth,
            registry,
        })
    }
}

fn parse_number<T: std::str::FromStr>(var: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(var) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|_| ConfigError::InvalidNumber { var }),
        Err(_) => Ok(default),
    }
}

/// Settings controlling the HTTP server binding.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
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
    pub format: LogFormat,
}

/// Addresses used when building notification links and staff e-mails.
#[derive(Debug, Clone)]
pub struct WorkflowConfig {
    pub frontend_url: String,
    pub admin_email: String,
}

#[derive(Debug, Clone)]
pub struct UploadConfig {
    pub directory: PathBuf,
    pub max_upload_bytes: usize,
    pub max_logo_bytes: usize,
}

#[derive(Debug, Clone)]
pub struct AuthConfig {
    pub token_secret: String,
    pub token_ttl_minutes: i64,
}

/// Company registry (YTJ) endpoint settings.
#[derive(Debug, Clone)]
pub struct RegistryConfig {
    pub base_url: String,
    pub timeout_secs: u64,
}

impl RegistryConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug)]
pub enum ConfigError {
    InvalidPort,
    InvalidHost { source: std::net::AddrParseError },
    InvalidNumber { var: &'static str },
    InvalidLogFormat { value: String },
    WeakTokenSecret,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidPort => write!(f, "APP_PORT must be a valid u16"),
            ConfigError::InvalidHost { .. } => {
                write!(f, "APP_HOST must parse to an IPv4 or IPv6 address")
            }
            ConfigError::InvalidNumber { var } => write!(f, "{var} must be a positive number"),
            ConfigError::InvalidLogFormat { value } => {
                write!(f, "APP_LOG_FORMAT must be 'compact' or 'json', got '{value}'")
            }
            ConfigError::WeakTokenSecret => write!(
                f,
                "KANTAMA_TOKEN_SECRET must be set to at least {MIN_PRODUCTION_SECRET_BYTES} bytes in production"
            ),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::InvalidHost { source } => Some(source),
            ConfigError::InvalidPort
            | ConfigError::InvalidNumber { .. }
            | ConfigError::InvalidLogFormat { .. }
            | ConfigError::WeakTokenSecret => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use std::sync::{Mutex, OnceLock};

    fn env_guard() -> &'static Mutex<()> {
        static GUARD: OnceLock<Mutex<()>> = OnceLock::new();
        GUARD.get_or_init(|| Mutex::new(()))
    }

    fn reset_env() {
        for var in [
            "APP_ENV",
            "APP_HOST",
            "APP_PORT",
            "APP_LOG_LEVEL",
            "APP_LOG_FORMAT",
            "KANTAMA_FRONTEND_URL",
            "KANTAMA_ADMIN_EMAIL",
            "KANTAMA_UPLOAD_DIR",
            "KANTAMA_MAX_UPLOAD_BYTES",
            "KANTAMA_MAX_LOGO_BYTES",
            "KANTAMA_TOKEN_SECRET",
            "KANTAMA_TOKEN_TTL_MINUTES",
            "KANTAMA_REGISTRY_URL",
            "KANTAMA_REGISTRY_TIMEOUT_SECS",
        ] {
            env::remove_var(var);
        }
    }

    #[test]
    fn load_uses_defaults_when_env_missing() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        let config = AppConfig::load().expect("config loads with defaults");
        assert_eq!(config.environment, AppEnvironment::Development);
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 3000);
        assert_eq!(config.telemetry.log_level, "info");
        assert_eq!(config.telemetry.format, LogFormat::Compact);
        assert_eq!(config.workflow.admin_email, "myynti@kantama.fi");
        assert_eq!(config.uploads.max_upload_bytes, 10 * 1024 * 1024);
        assert_eq!(config.uploads.max_logo_bytes, 5 * 1024 * 1024);
        assert_eq!(config.auth.token_ttl_minutes, 1440);
        assert_eq!(config.registry.timeout(), Duration::from_secs(10));
    }

    #[test]
    fn accepts_localhost_host() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        env::set_var("APP_HOST", "localhost");
        let config = AppConfig::load().expect("config loads");
        let addr = config.server.socket_addr().expect("localhost resolves");
        assert_eq!(addr, SocketAddr::new(IpAddr::from([127, 0, 0, 1]), 3000));
        reset_env();
    }

    #[test]
    fn production_requires_strong_secret() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        env::set_var("APP_ENV", "production");
        assert!(matches!(
            AppConfig::load(),
            Err(ConfigError::WeakTokenSecret)
        ));

        env::set_var("KANTAMA_TOKEN_SECRET", "short");
        assert!(matches!(
            AppConfig::load(),
            Err(ConfigError::WeakTokenSecret)
        ));

        env::set_var("KANTAMA_TOKEN_SECRET", "x".repeat(48));
        let config = AppConfig::load().expect("strong secret accepted");
        assert_eq!(config.environment, AppEnvironment::Production);
        assert_eq!(config.telemetry.format, LogFormat::Json);
        reset_env();
    }

    #[test]
    fn rejects_non_numeric_limits() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        env::set_var("KANTAMA_MAX_UPLOAD_BYTES", "ten megabytes");
        let error = AppConfig::load().expect_err("limit must be numeric");
        assert!(error.to_string().contains("KANTAMA_MAX_UPLOAD_BYTES"));
        reset_env();
    }

    #[test]
    fn log_format_is_validated() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        env::set_var("APP_LOG_FORMAT", "JSON");
        let config = AppConfig::load().expect("json format accepted");
        assert_eq!(config.telemetry.format, LogFormat::Json);

        env::set_var("APP_LOG_FORMAT", "xml");
        let error = AppConfig::load().expect_err("unknown format rejected");
        assert!(error.to_string().contains("xml"));
        reset_env();
    }
}
