//! Runtime settings, read from `TRISYNC_*` environment variables
//!
//! Everything has a conservative default except the link-signing secret,
//! which must be provided. Mail settings are all-or-none: when absent the
//! engine records conflicts without sending notifications.

use std::ops::RangeInclusive;
use std::time::Duration;

use chrono::{FixedOffset, NaiveTime};

/// Configuration failure, reported before anything starts
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} is not set")]
    Missing(&'static str),
    #[error("{name}: {message}")]
    Invalid { name: &'static str, message: String },
}

/// Shared secret whose Debug output stays out of logs
#[derive(Clone)]
pub struct Secret(String);

impl Secret {
    #[must_use]
    pub fn reveal(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for Secret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Secret(***)")
    }
}

/// Timer and cron triggers
#[derive(Debug, Clone, Copy)]
pub struct ScheduleSettings {
    pub enabled: bool,
    pub fixed_delay: Duration,
    pub daily_at: NaiveTime,
    pub utc_offset: FixedOffset,
}

/// Conflict notification delivery; absent means log-only operation
#[derive(Debug, Clone)]
pub struct MailSettings {
    pub from: String,
    pub admin_to: String,
    /// Admin identity bound into resolution links
    pub admin_user: String,
    pub view_base_url: String,
}

/// Top-level settings for the synchronization service
#[derive(Debug, Clone)]
pub struct SyncSettings {
    /// Gates the realtime loop; `run_now` style triggers work regardless
    pub enabled: bool,
    pub poll_interval: Duration,
    pub batch_size: usize,
    pub schedule: ScheduleSettings,
    pub link_secret: Secret,
    pub link_issuer: String,
    pub mail: Option<MailSettings>,
}

impl SyncSettings {
    /// Read settings from the process environment
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Read settings through an arbitrary lookup (useful for testing)
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |name: &str| {
            lookup(name).and_then(|v| {
                let v = v.trim().to_string();
                (!v.is_empty()).then_some(v)
            })
        };

        let secret = get("TRISYNC_LINK_SECRET").ok_or(ConfigError::Missing("TRISYNC_LINK_SECRET"))?;
        if secret.len() < 32 {
            return Err(ConfigError::Invalid {
                name: "TRISYNC_LINK_SECRET",
                message: "must be at least 32 bytes".to_string(),
            });
        }

        let daily_at_raw = get("TRISYNC_DAILY_AT").unwrap_or_else(|| "02:00".to_string());
        let daily_at = NaiveTime::parse_from_str(&daily_at_raw, "%H:%M").map_err(|e| {
            ConfigError::Invalid {
                name: "TRISYNC_DAILY_AT",
                message: e.to_string(),
            }
        })?;

        let offset_raw = get("TRISYNC_UTC_OFFSET").unwrap_or_else(|| "+08:00".to_string());
        let utc_offset = offset_raw
            .parse::<FixedOffset>()
            .map_err(|e| ConfigError::Invalid {
                name: "TRISYNC_UTC_OFFSET",
                message: e.to_string(),
            })?;

        Ok(Self {
            enabled: flag("TRISYNC_ENABLED", get("TRISYNC_ENABLED"), false)?,
            poll_interval: Duration::from_millis(ranged(
                "TRISYNC_POLL_INTERVAL_MS",
                get("TRISYNC_POLL_INTERVAL_MS"),
                1000,
                100..=60_000,
            )?),
            batch_size: ranged("TRISYNC_BATCH_SIZE", get("TRISYNC_BATCH_SIZE"), 200, 1..=10_000)?,
            schedule: ScheduleSettings {
                enabled: flag(
                    "TRISYNC_SCHEDULED_ENABLED",
                    get("TRISYNC_SCHEDULED_ENABLED"),
                    false,
                )?,
                fixed_delay: Duration::from_millis(ranged(
                    "TRISYNC_FIXED_DELAY_MS",
                    get("TRISYNC_FIXED_DELAY_MS"),
                    10_000,
                    1000..=3_600_000,
                )?),
                daily_at,
                utc_offset,
            },
            link_secret: Secret(secret),
            link_issuer: get("TRISYNC_LINK_ISSUER").unwrap_or_else(|| "trisync".to_string()),
            mail: mail_settings(&get)?,
        })
    }
}

fn flag(name: &'static str, raw: Option<String>, default: bool) -> Result<bool, ConfigError> {
    let Some(raw) = raw else {
        return Ok(default);
    };
    match raw.to_ascii_lowercase().as_str() {
        "true" | "1" => Ok(true),
        "false" | "0" => Ok(false),
        other => Err(ConfigError::Invalid {
            name,
            message: format!("expected true or false, got {other:?}"),
        }),
    }
}

fn ranged<T>(
    name: &'static str,
    raw: Option<String>,
    default: T,
    range: RangeInclusive<T>,
) -> Result<T, ConfigError>
where
    T: std::str::FromStr + PartialOrd + std::fmt::Display + Copy,
{
    let Some(raw) = raw else {
        return Ok(default);
    };
    let value = raw.parse::<T>().map_err(|_| ConfigError::Invalid {
        name,
        message: format!("expected an integer, got {raw:?}"),
    })?;
    if !range.contains(&value) {
        return Err(ConfigError::Invalid {
            name,
            message: format!("must be between {} and {}", range.start(), range.end()),
        });
    }
    Ok(value)
}

fn mail_settings(
    get: &impl Fn(&str) -> Option<String>,
) -> Result<Option<MailSettings>, ConfigError> {
    let from = get("TRISYNC_MAIL_FROM");
    let admin_to = get("TRISYNC_MAIL_ADMIN_TO");
    let base_url = get("TRISYNC_CONFLICT_VIEW_BASE_URL");
    match (from, admin_to, base_url) {
        (None, None, None) => Ok(None),
        (Some(from), Some(admin_to), Some(view_base_url)) => Ok(Some(MailSettings {
            from,
            admin_to,
            admin_user: get("TRISYNC_MAIL_ADMIN_USER").unwrap_or_else(|| "admin".to_string()),
            view_base_url,
        })),
        _ => Err(ConfigError::Invalid {
            name: "TRISYNC_MAIL_FROM",
            message: "TRISYNC_MAIL_FROM, TRISYNC_MAIL_ADMIN_TO and \
                      TRISYNC_CONFLICT_VIEW_BASE_URL must be set together"
                .to_string(),
        }),
    }
}
