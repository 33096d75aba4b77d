use std::env;
use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;

const DEFAULT_SERVICE_NAME: &str = "membership-sync";
const DEFAULT_DATABASE_PATH: &str = "data/membership.db";
const DEFAULT_ELIGIBLE_ROLES: &str = "teacher";
const DEFAULT_INITIAL_STATUS: &str = "pending";

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
    pub service_name: String,
    pub server: ServerConfig,
    pub telemetry: TelemetryConfig,
    pub database: DatabaseConfig,
    pub membership: MembershipConfig,
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let environment = AppEnvironment::from_str(
            &env::var("APP_ENV").unwrap_or_else(|_| "development".to_string()),
        );

        let service_name =
            env::var("APP_SERVICE_NAME").unwrap_or_else(|_| DEFAULT_SERVICE_NAME.to_string());

        let host = env::var("APP_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port = env::var("APP_PORT")
            .unwrap_or_else(|_| "3000".to_string())
            .parse::<u16>()
            .map_err(|_| ConfigError::InvalidPort)?;

        let log_level = env::var("APP_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        let database_path = env::var("APP_DATABASE_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_DATABASE_PATH));

        let eligible_roles = parse_roles(
            &env::var("APP_ELIGIBLE_ROLES").unwrap_or_else(|_| DEFAULT_ELIGIBLE_ROLES.to_string()),
        )?;

        let initial_status = env::var("APP_INITIAL_STATUS")
            .unwrap_or_else(|_| DEFAULT_INITIAL_STATUS.to_string())
            .trim()
            .to_string();
        if initial_status.is_empty() {
            return Err(ConfigError::EmptyInitialStatus);
        }

        Ok(Self {
            environment,
            service_name,
            server: ServerConfig { host, port },
            telemetry: TelemetryConfig { log_level },
            database: DatabaseConfig {
                path: database_path,
            },
            membership: MembershipConfig {
                eligible_roles,
                initial_status,
            },
        })
    }
}

fn parse_roles(raw: &str) -> Result<Vec<String>, ConfigError> {
    let roles: Vec<String> = raw
        .split(',')
        .map(|role| role.trim().to_ascii_lowercase())
        .filter(|role| !role.is_empty())
        .collect();

    if roles.is_empty() {
        return Err(ConfigError::NoEligibleRoles);
    }
    Ok(roles)
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
}

/// Location of the embedded SQLite database holding both tables.
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub path: PathBuf,
}

/// Knobs for the reconciliation pass.
#[derive(Debug, Clone)]
pub struct MembershipConfig {
    pub eligible_roles: Vec<String>,
    pub initial_status: String,
}

#[derive(Debug)]
pub enum ConfigError {
    InvalidPort,
    InvalidHost { source: std::net::AddrParseError },
    NoEligibleRoles,
    EmptyInitialStatus,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidPort => write!(f, "APP_PORT must be a valid u16"),
            ConfigError::InvalidHost { .. } => {
                write!(f, "APP_HOST must parse to an IPv4 or IPv6 address")
            }
            ConfigError::NoEligibleRoles => {
                write!(f, "APP_ELIGIBLE_ROLES must name at least one role")
            }
            ConfigError::EmptyInitialStatus => {
                write!(f, "APP_INITIAL_STATUS must not be blank")
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::InvalidHost { source } => Some(source),
            ConfigError::InvalidPort
            | ConfigError::NoEligibleRoles
            | ConfigError::EmptyInitialStatus => None,
        }
    }
}
