use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use chrono::FixedOffset;

use harmonia_core::RetryPolicy;
use harmonia_core::audit::DEFAULT_QUEUE_CAPACITY;

/// Runtime settings, read from `HARMONIA_*` environment variables.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// SQLite journal. Without it the store lives in memory only.
    pub db_path: Option<PathBuf>,
    /// Audit endpoint. Without it events go to the log.
    pub audit_url: Option<String>,
    pub audit_policy: RetryPolicy,
    /// Events buffered for the sink before new ones are dropped.
    pub audit_queue_capacity: usize,
    /// Comma-separated terms. Take precedence over the wordlist file.
    pub moderation_terms: Option<Vec<String>>,
    pub moderation_wordlist: Option<PathBuf>,
    /// JSON object of thread id to display names.
    pub threads_path: Option<PathBuf>,
    pub export_offset: FixedOffset,
}

impl ServerConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let var = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let host = var("HARMONIA_HOST").unwrap_or_else(|| "0.0.0.0".into());
        let port = match var("HARMONIA_PORT") {
            Some(v) => v.parse().with_context(|| format!("invalid HARMONIA_PORT: {}", v))?,
            None => 3000,
        };

        let defaults = RetryPolicy::default();
        let audit_policy = RetryPolicy {
            retries: parse_or(var("HARMONIA_AUDIT_RETRIES"), "HARMONIA_AUDIT_RETRIES", defaults.retries)?
                .max(1),
            timeout: Duration::from_millis(parse_or(
                var("HARMONIA_AUDIT_TIMEOUT_MS"),
                "HARMONIA_AUDIT_TIMEOUT_MS",
                defaults.timeout.as_millis() as u64,
            )?),
            backoff: Duration::from_millis(parse_or(
                var("HARMONIA_AUDIT_BACKOFF_MS"),
                "HARMONIA_AUDIT_BACKOFF_MS",
                defaults.backoff.as_millis() as u64,
            )?),
        };

        let audit_queue_capacity = parse_or(
            var("HARMONIA_AUDIT_QUEUE_CAPACITY"),
            "HARMONIA_AUDIT_QUEUE_CAPACITY",
            DEFAULT_QUEUE_CAPACITY,
        )?
        .max(1);

        let moderation_terms = var("HARMONIA_MODERATION_TERMS").map(|v| {
            v.split(',')
                .map(str::trim)
                .filter(|t| !t.is_empty())
                .map(String::from)
                .collect()
        });

        let export_offset = match var("HARMONIA_EXPORT_UTC_OFFSET") {
            Some(v) => parse_offset(&v)?,
            None => parse_offset("-03:00")?,
        };

        Ok(Self {
            host,
            port,
            db_path: var("HARMONIA_DB_PATH").map(PathBuf::from),
            audit_url: var("HARMONIA_AUDIT_URL"),
            audit_policy,
            audit_queue_capacity,
            moderation_terms,
            moderation_wordlist: var("HARMONIA_MODERATION_WORDLIST").map(PathBuf::from),
            threads_path: var("HARMONIA_THREADS_PATH").map(PathBuf::from),
            export_offset,
        })
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn parse_or<T: std::str::FromStr>(value: Option<String>, key: &str, default: T) -> Result<T> {
    match value {
        Some(v) => v
            .parse()
            .map_err(|_| anyhow::anyhow!("invalid {}: {}", key, v)),
        None => Ok(default),
    }
}

/// Accepts `Z`, `+HH:MM` or `-HH:MM`.
pub fn parse_offset(value: &str) -> Result<FixedOffset> {
    if value.eq_ignore_ascii_case("z") {
        return FixedOffset::east_opt(0).context("zero offset");
    }

    let (sign, rest) = match value.split_at_checked(1) {
        Some(("+", rest)) => (1, rest),
        Some(("-", rest)) => (-1, rest),
        _ => bail!("invalid UTC offset {:?}: expected +HH:MM or -HH:MM", value),
    };
    let Some((hours, minutes)) = rest.split_once(':') else {
        bail!("invalid UTC offset {:?}: expected +HH:MM or -HH:MM", value);
    };
    let hours: i32 = hours
        .parse()
        .with_context(|| format!("invalid UTC offset hours in {:?}", value))?;
    let minutes: i32 = minutes
        .parse()
        .with_context(|| format!("invalid UTC offset minutes in {:?}", value))?;
    if !(0..60).contains(&minutes) {
        bail!("invalid UTC offset minutes in {:?}", value);
    }

    FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60))
        .with_context(|| format!("UTC offset out of range: {:?}", value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> Result<ServerConfig> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        ServerConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults() {
        let cfg = config(&[]).unwrap();
        assert_eq!(cfg.addr(), "0.0.0.0:3000");
        assert!(cfg.db_path.is_none());
        assert!(cfg.audit_url.is_none());
        assert_eq!(cfg.audit_policy.retries, 2);
        assert_eq!(cfg.audit_policy.timeout, Duration::from_millis(2000));
        assert_eq!(cfg.audit_policy.backoff, Duration::from_millis(250));
        assert_eq!(cfg.audit_queue_capacity, 1024);
        assert!(cfg.moderation_terms.is_none());
        assert_eq!(cfg.export_offset.local_minus_utc(), -3 * 3600);
    }

    #[test]
    fn overrides() {
        let cfg = config(&[
            ("HARMONIA_PORT", "8080"),
            ("HARMONIA_DB_PATH", "/var/lib/harmonia.db"),
            ("HARMONIA_AUDIT_URL", "http://audit.local/events"),
            ("HARMONIA_AUDIT_RETRIES", "5"),
            ("HARMONIA_AUDIT_QUEUE_CAPACITY", "16"),
            ("HARMONIA_MODERATION_TERMS", "bobo, chato,,"),
            ("HARMONIA_EXPORT_UTC_OFFSET", "+05:30"),
        ])
        .unwrap();
        assert_eq!(cfg.port, 8080);
        assert_eq!(cfg.db_path, Some(PathBuf::from("/var/lib/harmonia.db")));
        assert_eq!(cfg.audit_url.as_deref(), Some("http://audit.local/events"));
        assert_eq!(cfg.audit_policy.retries, 5);
        assert_eq!(cfg.audit_queue_capacity, 16);
        assert_eq!(cfg.moderation_terms, Some(vec!["bobo".into(), "chato".into()]));
        assert_eq!(cfg.export_offset.local_minus_utc(), 5 * 3600 + 30 * 60);
    }

    #[test]
    fn retries_have_a_floor_of_one() {
        let cfg = config(&[("HARMONIA_AUDIT_RETRIES", "0")]).unwrap();
        assert_eq!(cfg.audit_policy.retries, 1);
    }

    #[test]
    fn blank_values_count_as_unset() {
        let cfg = config(&[("HARMONIA_DB_PATH", "  "), ("HARMONIA_PORT", "")]).unwrap();
        assert!(cfg.db_path.is_none());
        assert_eq!(cfg.port, 3000);
    }

    #[test]
    fn bad_values_are_rejected() {
        assert!(config(&[("HARMONIA_PORT", "http")]).is_err());
        assert!(config(&[("HARMONIA_AUDIT_TIMEOUT_MS", "-1")]).is_err());
        assert!(config(&[("HARMONIA_EXPORT_UTC_OFFSET", "0300")]).is_err());
    }

    #[test]
    fn offsets() {
        assert_eq!(parse_offset("Z").unwrap().local_minus_utc(), 0);
        assert_eq!(parse_offset("+00:00").unwrap().local_minus_utc(), 0);
        assert_eq!(parse_offset("-03:00").unwrap().local_minus_utc(), -10800);
        assert!(parse_offset("+03:75").is_err());
        assert!(parse_offset("+30:00").is_err());
    }
}
