//! Process settings from environment (and `.env` when present). Every key is optional.

use crate::config::LoanPolicy;
use std::ops::RangeInclusive;
use std::str::FromStr;

const MAX_FINE_CENTS: i64 = 10_000_000;
const MAX_HOLD_DAYS: i64 = 365;

/// Which store backs the service layer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StorageBackend {
    Postgres,
    Memory,
}

impl FromStr for StorageBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "postgres" | "postgresql" | "pg" => Ok(StorageBackend::Postgres),
            "memory" | "mem" => Ok(StorageBackend::Memory),
            other => Err(format!("unknown storage backend: {}", other)),
        }
    }
}

#[derive(Clone, Debug)]
pub struct Settings {
    pub database_url: String,
    pub max_connections: u32,
    pub storage: StorageBackend,
    pub bind_addr: String,
    /// When set, mutating routes require a matching `X-API-Key` header.
    pub secret_key: Option<String>,
    pub body_limit_bytes: usize,
    pub policy: LoanPolicy,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            database_url: "postgres://localhost/library".into(),
            max_connections: 5,
            storage: StorageBackend::Postgres,
            bind_addr: "0.0.0.0:3000".into(),
            secret_key: None,
            body_limit_bytes: 1024 * 1024,
            policy: LoanPolicy::default(),
        }
    }
}

impl Settings {
    /// Load `.env` (if any) and read settings from the process environment.
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build settings from an arbitrary key lookup. Unset or unparsable keys keep their defaults.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let d = Settings::default();
        let policy = LoanPolicy {
            max_renewals: parse_or(&lookup, "MAX_RENEWALS", d.policy.max_renewals),
            min_credit_score: parse_or(&lookup, "MIN_CREDIT_SCORE", d.policy.min_credit_score),
            daily_fine_cents: parse_clamped(
                &lookup,
                "DAILY_FINE_CENTS",
                d.policy.daily_fine_cents,
                0..=MAX_FINE_CENTS,
            ),
            lost_fine_cents: parse_clamped(
                &lookup,
                "LOST_FINE_CENTS",
                d.policy.lost_fine_cents,
                0..=MAX_FINE_CENTS,
            ),
            max_active_reservations: parse_or(
                &lookup,
                "MAX_ACTIVE_RESERVATIONS",
                d.policy.max_active_reservations,
            ),
            reservation_hold_days: parse_clamped(
                &lookup,
                "RESERVATION_HOLD_DAYS",
                d.policy.reservation_hold_days,
                1..=MAX_HOLD_DAYS,
            ),
        };
        Settings {
            database_url: lookup("DATABASE_URL")
                .filter(|s| !s.trim().is_empty())
                .unwrap_or(d.database_url),
            max_connections: parse_or(&lookup, "DATABASE_MAX_CONNECTIONS", d.max_connections),
            storage: parse_or(&lookup, "STORAGE_BACKEND", d.storage),
            bind_addr: lookup("BIND_ADDR")
                .filter(|s| !s.trim().is_empty())
                .unwrap_or(d.bind_addr),
            secret_key: lookup("SECRET_KEY").filter(|s| !s.is_empty()),
            body_limit_bytes: parse_or(&lookup, "BODY_LIMIT_BYTES", d.body_limit_bytes),
            policy,
        }
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> T
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(key) {
        None => default,
        Some(raw) => match raw.trim().parse() {
            Ok(v) => v,
            Err(_) => {
                tracing::warn!(key, value = %raw, "unparsable setting, using default");
                default
            }
        },
    }
}

/// Like `parse_or`, but values outside `range` are pulled to its nearest bound.
fn parse_clamped<F>(lookup: &F, key: &str, default: i64, range: RangeInclusive<i64>) -> i64
where
    F: Fn(&str) -> Option<String>,
{
    let value = parse_or(lookup, key, default);
    let clamped = value.clamp(*range.start(), *range.end());
    if clamped != value {
        tracing::warn!(key, value, clamped, "setting out of range, clamped");
    }
    clamped
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |k| map.get(k).cloned()
    }

    #[test]
    fn empty_environment_gives_defaults() {
        let s = Settings::from_lookup(|_| None);
        assert_eq!(s.database_url, "postgres://localhost/library");
        assert_eq!(s.max_connections, 5);
        assert_eq!(s.storage, StorageBackend::Postgres);
        assert!(s.secret_key.is_none());
        assert_eq!(s.policy, LoanPolicy::default());
    }

    #[test]
    fn values_are_read_and_coerced() {
        let s = Settings::from_lookup(lookup_from(&[
            ("DATABASE_URL", "postgres://db/lib"),
            ("DATABASE_MAX_CONNECTIONS", "12"),
            ("STORAGE_BACKEND", "memory"),
            ("SECRET_KEY", "s3cret"),
            ("MAX_RENEWALS", "4"),
        ]));
        assert_eq!(s.database_url, "postgres://db/lib");
        assert_eq!(s.max_connections, 12);
        assert_eq!(s.storage, StorageBackend::Memory);
        assert_eq!(s.secret_key.as_deref(), Some("s3cret"));
        assert_eq!(s.policy.max_renewals, 4);
    }

    #[test]
    fn garbage_falls_back_silently() {
        let s = Settings::from_lookup(lookup_from(&[
            ("DATABASE_MAX_CONNECTIONS", "lots"),
            ("STORAGE_BACKEND", "floppy"),
            ("DAILY_FINE_CENTS", "-x"),
        ]));
        assert_eq!(s.max_connections, 5);
        assert_eq!(s.storage, StorageBackend::Postgres);
        assert_eq!(s.policy.daily_fine_cents, 100);
    }

    #[test]
    fn fines_and_hold_days_are_clamped() {
        let s = Settings::from_lookup(lookup_from(&[
            ("DAILY_FINE_CENTS", "9223372036854775807"),
            ("LOST_FINE_CENTS", "-5"),
            ("RESERVATION_HOLD_DAYS", "9223372036854775807"),
        ]));
        assert_eq!(s.policy.daily_fine_cents, MAX_FINE_CENTS);
        assert_eq!(s.policy.lost_fine_cents, 0);
        assert_eq!(s.policy.reservation_hold_days, MAX_HOLD_DAYS);

        let s = Settings::from_lookup(lookup_from(&[("RESERVATION_HOLD_DAYS", "0")]));
        assert_eq!(s.policy.reservation_hold_days, 1);
    }
}
