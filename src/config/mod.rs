use std::env;
use std::path::PathBuf;

use crate::error::AppError;

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    pub generator: GeneratorConfig,
    pub database: DatabaseConfig,
    pub logging: LoggingConfig,
    pub request: RequestConfig,
    pub webhooks: WebhookConfig,
    pub notifications: NotificationConfig,
    pub scoring: ScoringConfig,
    pub detection: DetectionConfig,
    pub access: AccessConfig,
}

/// Content generator (Langbase pipe) configuration
#[derive(Debug, Clone)]
pub struct GeneratorConfig {
    pub api_key: String,
    pub base_url: String,
    pub pipe: String,
}

/// Database configuration
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub path: PathBuf,
    pub max_connections: u32,
}

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

/// Log output format
#[derive(Debug, Clone, PartialEq)]
pub enum LogFormat {
    Pretty,
    Json,
}

/// HTTP request configuration for the content generator
#[derive(Debug, Clone)]
pub struct RequestConfig {
    pub timeout_ms: u64,
    pub max_retries: u32,
    pub retry_delay_ms: u64,
}

/// Post-commit webhook targets
#[derive(Debug, Clone)]
pub struct WebhookConfig {
    pub urls: Vec<String>,
    pub timeout_ms: u64,
    pub max_concurrency: usize,
}

/// Notification delivery configuration
#[derive(Debug, Clone)]
pub struct NotificationConfig {
    pub max_retries: u32,
    pub retry_delay_ms: u64,
    pub timeout_ms: u64,
    pub broadcast_concurrency: usize,
}

/// Checklist scoring policy
#[derive(Debug, Clone, PartialEq)]
pub struct ScoringConfig {
    /// Score credited to the free-text half of a mixed question when filled in.
    pub mixed_text_credit: f64,
}

/// Special-note rule source
#[derive(Debug, Clone, Default)]
pub struct DetectionConfig {
    /// JSON rule file; the built-in rules apply when unset.
    pub rules_path: Option<PathBuf>,
}

/// Capability configuration for the default access policy
#[derive(Debug, Clone, Default)]
pub struct AccessConfig {
    pub admin_user_ids: Vec<String>,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, AppError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let generator = GeneratorConfig {
            api_key: env::var("GENERATOR_API_KEY").map_err(|_| AppError::Config {
                message: "GENERATOR_API_KEY is required".to_string(),
            })?,
            base_url: env::var("GENERATOR_BASE_URL")
                .unwrap_or_else(|_| "https://api.langbase.com".to_string()),
            pipe: env::var("GENERATOR_PIPE").unwrap_or_else(|_| "care-report-v1".to_string()),
        };

        let database = DatabaseConfig {
            path: PathBuf::from(
                env::var("DATABASE_PATH").unwrap_or_else(|_| "./data/care.db".to_string()),
            ),
            max_connections: parse_env("DATABASE_MAX_CONNECTIONS", 5),
        };

        let logging = LoggingConfig {
            level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            format: match env::var("LOG_FORMAT")
                .unwrap_or_else(|_| "pretty".to_string())
                .to_lowercase()
                .as_str()
            {
                "json" => LogFormat::Json,
                _ => LogFormat::Pretty,
            },
        };

        let defaults = RequestConfig::default();
        let request = RequestConfig {
            timeout_ms: parse_env("REQUEST_TIMEOUT_MS", defaults.timeout_ms),
            max_retries: parse_env("MAX_RETRIES", defaults.max_retries),
            retry_delay_ms: parse_env("RETRY_DELAY_MS", defaults.retry_delay_ms),
        };

        let defaults = WebhookConfig::default();
        let webhooks = WebhookConfig {
            urls: parse_list("WEBHOOK_URLS"),
            timeout_ms: parse_env("WEBHOOK_TIMEOUT_MS", defaults.timeout_ms),
            max_concurrency: parse_env("WEBHOOK_MAX_CONCURRENCY", defaults.max_concurrency),
        };

        let defaults = NotificationConfig::default();
        let notifications = NotificationConfig {
            max_retries: parse_env("NOTIFY_MAX_RETRIES", defaults.max_retries),
            retry_delay_ms: parse_env("NOTIFY_RETRY_DELAY_MS", defaults.retry_delay_ms),
            timeout_ms: parse_env("NOTIFY_TIMEOUT_MS", defaults.timeout_ms),
            broadcast_concurrency: parse_env(
                "BROADCAST_MAX_CONCURRENCY",
                defaults.broadcast_concurrency,
            ),
        };

        let scoring = ScoringConfig {
            mixed_text_credit: parse_env("MIXED_TEXT_CREDIT", 0.0),
        };

        let detection = DetectionConfig {
            rules_path: env::var("NOTE_RULES_PATH")
                .ok()
                .filter(|s| !s.trim().is_empty())
                .map(PathBuf::from),
        };

        let access = AccessConfig {
            admin_user_ids: parse_list("ADMIN_USER_IDS"),
        };

        Ok(Config {
            generator,
            database,
            logging,
            request,
            webhooks,
            notifications,
            scoring,
            detection,
            access,
        })
    }
}

/// Exponential backoff before retry number `retry` (1-based), saturating at `u64::MAX`.
pub fn backoff_delay_ms(base_ms: u64, retry: u32) -> u64 {
    let factor = 2u64.checked_pow(retry.saturating_sub(1)).unwrap_or(u64::MAX);
    base_ms.saturating_mul(factor)
}

fn parse_env<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|s| s.trim().parse().ok())
        .unwrap_or(default)
}

fn parse_list(key: &str) -> Vec<String> {
    env::var(key)
        .map(|raw| {
            raw.split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from)
                .collect()
        })
        .unwrap_or_default()
}

impl Default for RequestConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 30000,
            max_retries: 3,
            retry_delay_ms: 1000,
        }
    }
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            urls: Vec::new(),
            timeout_ms: 10000,
            max_concurrency: 4,
        }
    }
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            max_retries: 2,
            retry_delay_ms: 200,
            timeout_ms: 5000,
            broadcast_concurrency: 8,
        }
    }
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            mixed_text_credit: 0.0,
        }
    }
}
