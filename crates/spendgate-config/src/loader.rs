// SPDX-FileCopyrightText: 2026 Spendgate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration loader using Figment for layered config merging.
//!
//! Supports XDG hierarchy: `./spendgate.toml` > `~/.config/spendgate/spendgate.toml`
//! > `/etc/spendgate/spendgate.toml` with environment variable overrides via
//! the `SPENDGATE_` prefix.
//!
//! The five pricing multipliers have dedicated variables that are parsed
//! leniently: a missing or unparsable value keeps the configured one instead
//! of failing startup. Pricing must always produce an answer.

#![allow(clippy::result_large_err)] // figment::Error is external and cannot be boxed without wrapper

use std::path::Path;
use std::str::FromStr;

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use rust_decimal::Decimal;
use spendgate_core::PowerMode;
use tracing::{debug, warn};

use crate::model::{PricingConfig, SpendgateConfig};

/// Env var carrying the profit margin override.
pub const PROFIT_MARGIN_ENV: &str = "SPENDGATE_PROFIT_MARGIN";
/// Env var carrying the BYOK routing fee override (USD per million tokens).
pub const BYOK_ROUTING_FEE_ENV: &str = "SPENDGATE_BYOK_ROUTING_FEE_PER_1M";

/// Env vars carrying per-mode surcharge overrides.
const SURCHARGE_ENV: [(PowerMode, &str); 3] = [
    (PowerMode::Fast, "SPENDGATE_POWER_SURCHARGE_FAST"),
    (PowerMode::Balanced, "SPENDGATE_POWER_SURCHARGE_BALANCED"),
    (PowerMode::Max, "SPENDGATE_POWER_SURCHARGE_MAX"),
];

/// Load configuration from the standard XDG hierarchy with env var overrides.
///
/// Merge order (later overrides earlier):
/// 1. Compiled defaults
/// 2. `/etc/spendgate/spendgate.toml` (system-wide)
/// 3. `~/.config/spendgate/spendgate.toml` (user XDG config)
/// 4. `./spendgate.toml` (local directory)
/// 5. `SPENDGATE_*` environment variables
/// 6. Lenient pricing multiplier variables
pub fn load_config() -> Result<SpendgateConfig, figment::Error> {
    let mut config: SpendgateConfig = build_figment().extract()?;
    apply_pricing_env_overrides(&mut config.pricing, |key| std::env::var(key).ok());
    Ok(config)
}

/// Load configuration from a TOML string only (no XDG lookup, no env).
///
/// Used for testing and explicit configuration.
pub fn load_config_from_str(toml_content: &str) -> Result<SpendgateConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(SpendgateConfig::default()))
        .merge(Toml::string(toml_content))
        .extract()
}

/// Load configuration from a specific file path with env var overrides.
pub fn load_config_from_path(path: &Path) -> Result<SpendgateConfig, figment::Error> {
    let mut config: SpendgateConfig = Figment::new()
        .merge(Serialized::defaults(SpendgateConfig::default()))
        .merge(Toml::file(path))
        .merge(env_provider())
        .extract()?;
    apply_pricing_env_overrides(&mut config.pricing, |key| std::env::var(key).ok());
    Ok(config)
}

/// Build the Figment used internally for config loading (exposed for diagnostic use).
///
/// The lenient pricing variables are not part of the Figment.
pub fn build_figment() -> Figment {
    Figment::new()
        .merge(Serialized::defaults(SpendgateConfig::default()))
        .merge(Toml::file("/etc/spendgate/spendgate.toml"))
        .merge(Toml::file(
            dirs::config_dir()
                .map(|d| d.join("spendgate/spendgate.toml"))
                .unwrap_or_default(),
        ))
        .merge(Toml::file("spendgate.toml"))
        .merge(env_provider())
}

/// Apply the pricing multiplier overrides field by field.
///
/// `lookup` returns the raw value of an environment variable. Absent or
/// blank values are ignored; unparsable values are logged and ignored.
pub fn apply_pricing_env_overrides<F>(pricing: &mut PricingConfig, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(v) = decimal_override(&lookup, PROFIT_MARGIN_ENV) {
        pricing.profit_margin = v;
    }
    if let Some(v) = decimal_override(&lookup, BYOK_ROUTING_FEE_ENV) {
        pricing.byok_routing_fee_per_mtok = v;
    }
    for (mode, key) in SURCHARGE_ENV {
        if let Some(v) = decimal_override(&lookup, key) {
            pricing.power_surcharge.set(mode, v);
        }
    }
}

fn decimal_override<F>(lookup: &F, key: &str) -> Option<Decimal>
where
    F: Fn(&str) -> Option<String>,
{
    let raw = lookup(key)?;
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    match Decimal::from_str(raw).or_else(|_| Decimal::from_scientific(raw)) {
        Ok(value) => {
            debug!(key, %value, "pricing override from environment");
            Some(value)
        }
        Err(_) => {
            warn!(key, value = raw, "ignoring unparsable pricing override");
            None
        }
    }
}

/// Whether an env key (prefix stripped, lowercased) belongs to the lenient
/// pricing set and must stay out of the strict Figment layer.
fn is_lenient_pricing_key(key: &str) -> bool {
    let full = format!("SPENDGATE_{}", key.to_ascii_uppercase());
    full == PROFIT_MARGIN_ENV
        || full == BYOK_ROUTING_FEE_ENV
        || SURCHARGE_ENV.iter().any(|(_, k)| *k == full)
}

/// Create the environment variable provider using explicit `map()` for section-to-dot mapping.
///
/// Uses `Env::map()` NOT `Env::split("_")` because keys contain underscores:
/// `SPENDGATE_BUDGET_LOOKUP_TIMEOUT_MS` must map to `budget.lookup_timeout_ms`.
fn env_provider() -> Env {
    Env::prefixed("SPENDGATE_")
        .filter(|key| !is_lenient_pricing_key(key.as_str()))
        .map(|key| {
            key.as_str()
                .replacen("budget_", "budget.", 1)
                .replacen("pricing_", "pricing.", 1)
                .into()
        })
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use rust_decimal_macros::dec;
    use tracing_test::traced_test;

    use super::*;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn overrides_apply_field_by_field() {
        let mut pricing = PricingConfig::default();
        apply_pricing_env_overrides(
            &mut pricing,
            lookup(&[
                (PROFIT_MARGIN_ENV, "2.0"),
                ("SPENDGATE_POWER_SURCHARGE_MAX", " 1.5 "),
            ]),
        );
        assert_eq!(pricing.profit_margin, dec!(2.0));
        assert_eq!(pricing.power_surcharge.max, dec!(1.5));
        // Untouched fields keep their defaults.
        assert_eq!(pricing.byok_routing_fee_per_mtok, dec!(0.25));
        assert_eq!(pricing.power_surcharge.balanced, dec!(1.12));
    }

    #[test]
    #[traced_test]
    fn unparsable_override_keeps_default() {
        let mut pricing = PricingConfig::default();
        apply_pricing_env_overrides(
            &mut pricing,
            lookup(&[(PROFIT_MARGIN_ENV, "lots"), (BYOK_ROUTING_FEE_ENV, "")]),
        );
        assert_eq!(pricing.profit_margin, dec!(1.50));
        assert_eq!(pricing.byok_routing_fee_per_mtok, dec!(0.25));
        assert!(logs_contain("ignoring unparsable pricing override"));
    }

    #[test]
    fn scientific_notation_is_accepted() {
        let mut pricing = PricingConfig::default();
        apply_pricing_env_overrides(&mut pricing, lookup(&[(BYOK_ROUTING_FEE_ENV, "5e-1")]));
        assert_eq!(pricing.byok_routing_fee_per_mtok, dec!(0.5));
    }

    #[test]
    fn lenient_keys_are_recognized() {
        assert!(is_lenient_pricing_key("profit_margin"));
        assert!(is_lenient_pricing_key("byok_routing_fee_per_1m"));
        assert!(is_lenient_pricing_key("power_surcharge_balanced"));
        assert!(!is_lenient_pricing_key("budget_warning_threshold"));
    }
}
