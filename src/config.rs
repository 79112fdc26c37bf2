use std::time::Duration;

use anyhow::{Context, Result, bail};

/// Default poll interval when `POLL_INTERVAL` is unset.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

pub const ADMIN_VAR: &str = "TG_ADMIN";
pub const APP_ID_VAR: &str = "TG_APP_ID";
pub const APP_HASH_VAR: &str = "TG_API_HASH";
pub const SESSION_VAR: &str = "TG_SESSION";
pub const POLL_INTERVAL_VAR: &str = "POLL_INTERVAL";
pub const AUTO_UPGRADE_VAR: &str = "AUTO_UPGRADE";

/// Application config sourced from the process environment.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Username of the operator who receives new-gift notifications.
    pub admin: String,
    pub app_id: i32,
    pub app_hash: String,
    /// Exported session string. Absent until `--auth` has been run once.
    pub session: Option<String>,
    pub poll_interval: Duration,
    /// Queue an upgrade sweep after every successful purchase.
    pub auto_upgrade: bool,
}

impl AppConfig {
    /// Load config from `.env` (if present) and the process environment.
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load config through an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let require = |key: &str| get(key).with_context(|| format!("{key} not set"));

        let admin = require(ADMIN_VAR)?;
        let app_id = require(APP_ID_VAR)?
            .trim()
            .parse::<i32>()
            .with_context(|| format!("{APP_ID_VAR} must be a 32-bit integer"))?;
        let app_hash = require(APP_HASH_VAR)?;
        let session = get(SESSION_VAR);

        let poll_interval = match get(POLL_INTERVAL_VAR) {
            Some(raw) => parse_duration(&raw)
                .with_context(|| format!("invalid {POLL_INTERVAL_VAR} {raw:?}"))?,
            None => DEFAULT_POLL_INTERVAL,
        };
        if poll_interval.is_zero() {
            bail!("{POLL_INTERVAL_VAR} must be greater than zero");
        }

        let auto_upgrade = match get(AUTO_UPGRADE_VAR) {
            Some(raw) => parse_bool(&raw)
                .with_context(|| format!("invalid {AUTO_UPGRADE_VAR} {raw:?}"))?,
            None => false,
        };

        Ok(Self {
            admin,
            app_id,
            app_hash,
            session,
            poll_interval,
            auto_upgrade,
        })
    }
}

/// Parse a duration such as `500ms`, `1s`, `2m`, `1h` or `1m30s`.
/// A bare integer is read as seconds.
pub fn parse_duration(raw: &str) -> Result<Duration> {
    let s = raw.trim();
    if s.is_empty() {
        bail!("empty duration");
    }
    if let Ok(secs) = s.parse::<u64>() {
        return Ok(Duration::from_secs(secs));
    }

    let mut total = Duration::ZERO;
    let mut rest = s;
    while !rest.is_empty() {
        let digits = rest
            .find(|c: char| !c.is_ascii_digit())
            .context("missing unit")?;
        if digits == 0 {
            bail!("expected a number before the unit");
        }
        let value: u64 = rest[..digits].parse()?;
        rest = &rest[digits..];

        let unit_len = rest
            .find(|c: char| c.is_ascii_digit())
            .unwrap_or(rest.len());
        let unit = &rest[..unit_len];
        rest = &rest[unit_len..];

        let part = match unit {
            "ms" => Some(Duration::from_millis(value)),
            "s" => Some(Duration::from_secs(value)),
            "m" => value.checked_mul(60).map(Duration::from_secs),
            "h" => value.checked_mul(3600).map(Duration::from_secs),
            other => bail!("unknown unit {other:?}"),
        }
        .context("duration too large")?;
        total = total.checked_add(part).context("duration too large")?;
    }
    Ok(total)
}

fn parse_bool(raw: &str) -> Result<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => bail!("expected a boolean, got {other:?}"),
    }
}
