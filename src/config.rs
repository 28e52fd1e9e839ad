//! Configuration types, built from environment variables.

use std::time::Duration;

use secrecy::SecretString;

use crate::error::ConfigError;

/// Parse an env var, falling back to `default` when unset or malformed.
fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|s| s.trim().parse().ok())
        .unwrap_or(default)
}

/// Mailbox poller settings.
#[derive(Debug, Clone)]
pub struct PollerConfig {
    /// Sleep between fetch cycles.
    pub poll_interval: Duration,
    /// Max unread items listed per cycle.
    pub batch_size: usize,
    /// Consecutive failed cycles before the cooldown kicks in.
    pub max_consecutive_errors: u32,
    /// Pause after hitting `max_consecutive_errors`.
    pub cooldown: Duration,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(60),
            batch_size: 10,
            max_consecutive_errors: 5,
            cooldown: Duration::from_secs(300), // 5 minutes
        }
    }
}

impl PollerConfig {
    pub fn from_env() -> Self {
        let d = Self::default();
        Self {
            poll_interval: Duration::from_secs(env_parse(
                "MAILBOX_POLL_INTERVAL_SECS",
                d.poll_interval.as_secs(),
            )),
            batch_size: env_parse("MAILBOX_BATCH_SIZE", d.batch_size).max(1),
            max_consecutive_errors: env_parse(
                "MAILBOX_MAX_CONSECUTIVE_ERRORS",
                d.max_consecutive_errors,
            )
            .max(1),
            cooldown: Duration::from_secs(env_parse("MAILBOX_COOLDOWN_SECS", d.cooldown.as_secs())),
        }
    }
}

/// Workflow coordinator settings.
#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    /// How long a suspended workflow waits for a human decision.
    pub approval_timeout: Duration,
    /// Upper bound on pipeline stages running at once on the blocking pool.
    pub max_blocking_stages: usize,
    /// Recipient used when an item carries no `To` header.
    pub default_recipient: String,
    /// Body characters shown in a notification preview.
    pub preview_chars: usize,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            approval_timeout: Duration::from_secs(600),
            max_blocking_stages: 16,
            default_recipient: "you@company.com".to_string(),
            preview_chars: 500,
        }
    }
}

impl CoordinatorConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let d = Self::default();
        let approval_timeout = Duration::from_secs(env_parse(
            "INBOX_HITL_APPROVAL_TIMEOUT_SECS",
            d.approval_timeout.as_secs(),
        ));
        if approval_timeout.is_zero() {
            return Err(ConfigError::InvalidValue {
                key: "INBOX_HITL_APPROVAL_TIMEOUT_SECS".into(),
                message: "must be greater than zero".into(),
            });
        }
        Ok(Self {
            approval_timeout,
            max_blocking_stages: env_parse("INBOX_HITL_MAX_BLOCKING_STAGES", d.max_blocking_stages)
                .max(1),
            default_recipient: std::env::var("INBOX_HITL_DEFAULT_RECIPIENT")
                .unwrap_or(d.default_recipient),
            preview_chars: env_parse("INBOX_HITL_PREVIEW_CHARS", d.preview_chars),
        })
    }
}

/// HTTP / WebSocket server settings.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub port: u16,
    pub db_path: String,
    /// Directory for rolling log files (stderr only when unset).
    pub log_dir: Option<String>,
}

impl ServerConfig {
    pub fn from_env() -> Self {
        Self {
            port: env_parse("INBOX_HITL_PORT", 8000),
            db_path: std::env::var("INBOX_HITL_DB_PATH")
                .unwrap_or_else(|_| "./data/inbox-hitl.db".to_string()),
            log_dir: std::env::var("INBOX_HITL_LOG_DIR").ok(),
        }
    }
}

/// IMAP mailbox settings.
#[derive(Debug, Clone)]
pub struct MailboxConfig {
    pub imap_host: String,
    pub imap_port: u16,
    pub username: String,
    pub password: SecretString,
    pub folder: String,
}

impl MailboxConfig {
    /// `Ok(None)` if `MAILBOX_IMAP_HOST` is not set (poller disabled).
    /// Once a host is given, credentials are required.
    pub fn from_env() -> Result<Option<Self>, ConfigError> {
        let Ok(imap_host) = std::env::var("MAILBOX_IMAP_HOST") else {
            return Ok(None);
        };
        let required = |key: &str| {
            std::env::var(key).map_err(|_| ConfigError::MissingEnvVar(key.to_string()))
        };
        Ok(Some(Self {
            imap_host,
            imap_port: env_parse("MAILBOX_IMAP_PORT", 993),
            username: required("MAILBOX_USERNAME")?,
            password: SecretString::from(required("MAILBOX_PASSWORD")?),
            folder: std::env::var("MAILBOX_FOLDER").unwrap_or_else(|_| "INBOX".to_string()),
        }))
    }
}

/// SMTP settings for the default pipeline's execution stage.
#[derive(Debug, Clone)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: SecretString,
    pub from_address: String,
}

impl SmtpConfig {
    /// Returns `None` if `SMTP_HOST` is not set (execution runs dry).
    pub fn from_env() -> Option<Self> {
        let host = std::env::var("SMTP_HOST").ok()?;
        let username = std::env::var("SMTP_USERNAME").unwrap_or_default();
        Some(Self {
            host,
            port: env_parse("SMTP_PORT", 587),
            from_address: std::env::var("SMTP_FROM_ADDRESS").unwrap_or_else(|_| username.clone()),
            username,
            password: SecretString::from(std::env::var("SMTP_PASSWORD").unwrap_or_default()),
        })
    }
}
