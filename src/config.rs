//! Runtime configuration read from the environment.

use std::path::PathBuf;
use std::time::Duration;

use chrono::FixedOffset;

use crate::models::utc_offset;

/// Default number of days an activity feed looks back when no start is given.
pub const DEFAULT_ACTIVITY_DAYS: u32 = 30;

#[derive(Debug, Clone)]
pub struct Config {
    /// SQLite file. `None` means the platform data directory.
    pub database_path: Option<PathBuf>,
    /// How long a store call may wait on a locked database.
    pub store_timeout: Duration,
    pub activity_days: u32,
    /// Offset used to cut activity feeds into days.
    pub time_zone: FixedOffset,
}

impl Config {
    /// Read `TRELLIS_*` variables. Unset or malformed values fall back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let database_path = lookup("TRELLIS_DATABASE")
            .filter(|s| !s.trim().is_empty())
            .map(PathBuf::from);

        let store_timeout = lookup("TRELLIS_STORE_TIMEOUT_MS")
            .and_then(|s| parse_or_warn::<u64>("TRELLIS_STORE_TIMEOUT_MS", &s))
            .map(Duration::from_millis)
            .unwrap_or(crate::db::DEFAULT_BUSY_TIMEOUT);

        let activity_days = lookup("TRELLIS_ACTIVITY_DAYS")
            .and_then(|s| parse_or_warn::<u32>("TRELLIS_ACTIVITY_DAYS", &s))
            .unwrap_or(DEFAULT_ACTIVITY_DAYS);

        let time_zone = lookup("TRELLIS_UTC_OFFSET")
            .and_then(|s| {
                let parsed = parse_utc_offset(&s);
                if parsed.is_none() {
                    tracing::warn!("Ignoring TRELLIS_UTC_OFFSET={:?}: expected +HH:MM", s);
                }
                parsed
            })
            .unwrap_or_else(utc_offset);

        Self {
            database_path,
            store_timeout,
            activity_days,
            time_zone,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::from_lookup(|_| None)
    }
}

fn parse_or_warn<T: std::str::FromStr>(key: &str, value: &str) -> Option<T> {
    let parsed = value.trim().parse::<T>().ok();
    if parsed.is_none() {
        tracing::warn!("Ignoring {}={:?}: not a valid number", key, value);
    }
    parsed
}

/// Parse `+HH:MM`, `-HH:MM`, `+HHMM`, `Z` or `UTC`.
pub fn parse_utc_offset(s: &str) -> Option<FixedOffset> {
    let s = s.trim();
    if s.eq_ignore_ascii_case("z") || s.eq_ignore_ascii_case("utc") {
        return Some(utc_offset());
    }

    let (sign, rest) = match s.as_bytes().first()? {
        b'+' => (1, &s[1..]),
        b'-' => (-1, &s[1..]),
        _ => return None,
    };
    let digits: String = rest.chars().filter(|c| *c != ':').collect();
    if digits.len() != 4 || !digits.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }

    let hours: i32 = digits[..2].parse().ok()?;
    let minutes: i32 = digits[2..].parse().ok()?;
    if hours > 23 || minutes > 59 {
        return None;
    }
    FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60))
}
