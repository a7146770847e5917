use std::str::FromStr;
use std::time::Duration;

use crate::domain::money::Money;
use crate::domain::order::{ContactPhone, Fees, TerminalPaymentPolicy};
use crate::utils::RetryConfig;

// ============================================================================
// Configuration - environment variables, with `.env` support
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} is not set")]
    Missing(&'static str),

    #[error("{key} has an invalid value {value:?}: {reason}")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub metrics_port: u16,
    pub default_fees: Fees,
    pub placeholder_phone: ContactPhone,
    pub terminal_payment_policy: TerminalPaymentPolicy,
    pub monitor_interval: Duration,
    pub retry: RetryConfig,
}

impl AppConfig {
    /// Load `.env` if present, then read the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        if let Ok(path) = dotenvy::dotenv() {
            tracing::debug!(path = %path.display(), "Loaded .env");
        }
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let database_url = lookup("DATABASE_URL")
            .filter(|v| !v.trim().is_empty())
            .ok_or(ConfigError::Missing("DATABASE_URL"))?;

        let metrics_port = parse_or(&lookup, "METRICS_PORT", 9090u16)?;

        let default_fees = Fees {
            delivery_fee: money_or(&lookup, "DEFAULT_DELIVERY_FEE", 500)?,
            service_charge: money_or(&lookup, "DEFAULT_SERVICE_CHARGE", 100)?,
        };
        default_fees.validate().map_err(|e| ConfigError::Invalid {
            key: "DEFAULT_DELIVERY_FEE/DEFAULT_SERVICE_CHARGE",
            value: format!("{}/{}", default_fees.delivery_fee, default_fees.service_charge),
            reason: e.to_string(),
        })?;

        let raw_phone = lookup("PLACEHOLDER_PHONE").unwrap_or_else(|| "0000000000".to_string());
        let placeholder_phone = ContactPhone::parse(&raw_phone).map_err(|e| ConfigError::Invalid {
            key: "PLACEHOLDER_PHONE",
            value: raw_phone.clone(),
            reason: e.to_string(),
        })?;

        let terminal_payment_policy = parse_or(&lookup, "TERMINAL_PAYMENT_POLICY", TerminalPaymentPolicy::Ignore)?;
        let monitor_interval = Duration::from_secs(parse_or(&lookup, "MONITOR_INTERVAL_SECS", 300u64)?.max(1));
        let max_attempts = parse_or(&lookup, "RETRY_MAX_ATTEMPTS", 3u32)?;

        Ok(Self {
            database_url,
            metrics_port,
            default_fees,
            placeholder_phone,
            terminal_payment_policy,
            monitor_interval,
            retry: RetryConfig::default().with_max_attempts(max_attempts),
        })
    }
}

fn parse_or<F, T>(lookup: &F, key: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        None => Ok(default),
        Some(raw) => raw.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
            key,
            value: raw.clone(),
            reason: e.to_string(),
        }),
    }
}

/// Whole naira amount, rejected when it overflows minor units.
fn money_or<F>(lookup: &F, key: &'static str, default_major: i64) -> Result<Money, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let major = parse_or(lookup, key, default_major)?;
    Money::checked_from_major(major).ok_or_else(|| ConfigError::Invalid {
        key,
        value: major.to_string(),
        reason: "amount out of range".to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = AppConfig::from_lookup(lookup(&[("DATABASE_URL", "postgres://localhost/food")])).unwrap();
        assert_eq!(config.metrics_port, 9090);
        assert_eq!(config.default_fees, Fees::default());
        assert_eq!(config.placeholder_phone.as_str(), "0000000000");
        assert_eq!(config.terminal_payment_policy, TerminalPaymentPolicy::Ignore);
        assert_eq!(config.monitor_interval, Duration::from_secs(300));
        assert_eq!(config.retry.max_attempts, 3);
    }

    #[test]
    fn test_database_url_required() {
        let err = AppConfig::from_lookup(lookup(&[])).unwrap_err();
        assert!(matches!(err, ConfigError::Missing("DATABASE_URL")));
    }

    #[test]
    fn test_overrides_and_bad_values() {
        let config = AppConfig::from_lookup(lookup(&[
            ("DATABASE_URL", "postgres://localhost/food"),
            ("TERMINAL_PAYMENT_POLICY", "reopen"),
            ("RETRY_MAX_ATTEMPTS", "5"),
        ]))
        .unwrap();
        assert_eq!(config.terminal_payment_policy, TerminalPaymentPolicy::Reopen);
        assert_eq!(config.retry.max_attempts, 5);

        let err = AppConfig::from_lookup(lookup(&[
            ("DATABASE_URL", "postgres://localhost/food"),
            ("PLACEHOLDER_PHONE", "12"),
        ]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: "PLACEHOLDER_PHONE", .. }));

        let err = AppConfig::from_lookup(lookup(&[
            ("DATABASE_URL", "postgres://localhost/food"),
            ("DEFAULT_DELIVERY_FEE", "50000"),
        ]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { .. }));
    }

    #[test]
    fn test_overflowing_fee_is_rejected() {
        let err = AppConfig::from_lookup(lookup(&[
            ("DATABASE_URL", "postgres://localhost/food"),
            ("DEFAULT_DELIVERY_FEE", "184467440737095517"),
        ]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: "DEFAULT_DELIVERY_FEE", .. }));

        let err = AppConfig::from_lookup(lookup(&[
            ("DATABASE_URL", "postgres://localhost/food"),
            ("DEFAULT_SERVICE_CHARGE", "-92233720368547759"),
        ]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: "DEFAULT_SERVICE_CHARGE", .. }));
    }
}
