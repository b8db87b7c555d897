// SPDX-FileCopyrightText: 2026 Spendgate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Post-deserialization validation for configuration values.
//!
//! Validates semantic constraints that cannot be expressed via serde attributes,
//! such as non-negative multipliers and provider table keys.

use rust_decimal::Decimal;
use tracing::warn;

use crate::diagnostic::ConfigError;
use crate::model::{canonical_provider, SpendgateConfig};

/// Validate a deserialized configuration for semantic correctness.
///
/// Returns `Ok(())` if all validations pass, or `Err(Vec<ConfigError>)` with
/// all collected validation errors (does not fail fast).
///
/// Multipliers below 1.0 are accepted with a warning: billing still never
/// drops below raw cost, but the margin is gone.
pub fn validate_config(config: &SpendgateConfig) -> Result<(), Vec<ConfigError>> {
    let mut errors = Vec::new();
    let pricing = &config.pricing;

    non_negative(&mut errors, "pricing.profit_margin", pricing.profit_margin);
    non_negative(
        &mut errors,
        "pricing.byok_routing_fee_per_mtok",
        pricing.byok_routing_fee_per_mtok,
    );
    for (mode, value) in [
        ("fast", pricing.power_surcharge.fast),
        ("balanced", pricing.power_surcharge.balanced),
        ("max", pricing.power_surcharge.max),
    ] {
        let key = format!("pricing.power_surcharge.{mode}");
        non_negative(&mut errors, &key, value);
        if value >= Decimal::ZERO && value < Decimal::ONE {
            warn!(key = %key, %value, "power surcharge below 1.0; no-loss floor will apply");
        }
    }
    if pricing.profit_margin >= Decimal::ZERO && pricing.profit_margin < Decimal::ONE {
        warn!(
            profit_margin = %pricing.profit_margin,
            "profit margin below 1.0; no-loss floor will apply"
        );
    }

    if pricing.default_max_tokens_hint == 0 {
        errors.push(ConfigError::Validation {
            message: "pricing.default_max_tokens_hint must be greater than 0".to_string(),
        });
    }

    for (key, table) in &pricing.providers {
        if canonical_provider(key).is_none() {
            errors.push(ConfigError::Validation {
                message: format!(
                    "pricing.providers.{key} is not a provider; expected one of \
                     claude, openai, gemini, grok, ollama"
                ),
            });
            continue;
        }
        let entries = std::iter::once(("default".to_string(), table.default))
            .chain(table.models.iter().map(|(m, p)| (format!("models.{m}"), *p)));
        for (name, price) in entries {
            non_negative(
                &mut errors,
                &format!("pricing.providers.{key}.{name}.input_per_mtok"),
                price.input_per_mtok,
            );
            non_negative(
                &mut errors,
                &format!("pricing.providers.{key}.{name}.output_per_mtok"),
                price.output_per_mtok,
            );
        }
    }

    let threshold = config.budget.warning_threshold;
    if threshold <= Decimal::ZERO || threshold > Decimal::ONE {
        errors.push(ConfigError::Validation {
            message: format!("budget.warning_threshold must be in (0, 1], got {threshold}"),
        });
    }

    if config.budget.lookup_timeout_ms == Some(0) {
        errors.push(ConfigError::Validation {
            message: "budget.lookup_timeout_ms must be greater than 0 when set".to_string(),
        });
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn non_negative(errors: &mut Vec<ConfigError>, key: &str, value: Decimal) {
    if value < Decimal::ZERO {
        errors.push(ConfigError::Validation {
            message: format!("{key} must be non-negative, got {value}"),
        });
    }
}
