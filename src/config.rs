use std::env;
use std::str::FromStr;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("{key} has an invalid value: {value:?}")]
    Invalid { key: &'static str, value: String },
}

/// Outbound mail gateway. Without one, mail is written to the log.
#[derive(Clone, Debug)]
pub struct MailConfig {
    pub api_url: Option<String>,
    pub api_key: Option<String>,
    pub from: String,
}

#[derive(Clone, Debug)]
pub struct Config {
    pub database_url: String,
    pub rust_log: String,
    pub bind_addr: String,
    pub secret_key: String,
    pub payment_webhook_secret: String,
    pub mail: MailConfig,
    pub admin_email: Option<String>,
    pub admin_password: Option<String>,
    pub job_interval_secs: u64,
    pub reminder_lead_hours: i64,
    pub secure_cookies: bool,
    pub church_name: String,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        // A missing .env file is fine; real deployments use the environment.
        let _ = dotenvy::dotenv();

        Ok(Self {
            database_url: required("DATABASE_URL")?,
            rust_log: env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
            bind_addr: env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".into()),
            secret_key: required("SECRET_KEY")?,
            payment_webhook_secret: required("PAYMENT_WEBHOOK_SECRET")?,
            mail: MailConfig {
                api_url: optional("MAIL_API_URL"),
                api_key: optional("MAIL_API_KEY"),
                from: env::var("MAIL_FROM").unwrap_or_else(|_| "office@localhost".into()),
            },
            admin_email: optional("ADMIN_EMAIL"),
            admin_password: optional("ADMIN_PASSWORD"),
            job_interval_secs: parsed("JOB_INTERVAL_SECS", 300)?,
            reminder_lead_hours: parsed("REMINDER_LEAD_HOURS", 24)?,
            secure_cookies: parsed("SECURE_COOKIES", false)?,
            church_name: env::var("CHURCH_NAME").unwrap_or_else(|_| "Our Church".into()),
        })
    }
}

fn required(key: &'static str) -> Result<String, ConfigError> {
    optional(key).ok_or(ConfigError::Missing(key))
}

fn optional(key: &'static str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn parsed<T: FromStr>(key: &'static str, default: T) -> Result<T, ConfigError> {
    match optional(key) {
        Some(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { key, value }),
        None => Ok(default),
    }
}
