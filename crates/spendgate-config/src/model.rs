// SPDX-FileCopyrightText: 2026 Spendgate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration model structs for Spendgate.
//!
//! All structs use `#[serde(deny_unknown_fields)]` to reject unrecognized
//! config keys at startup, providing actionable error messages.

use std::collections::BTreeMap;

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use spendgate_core::{PowerMode, Provider};

/// Top-level Spendgate configuration.
///
/// Built once at process start and never mutated afterwards. The pricing
/// section is handed to the pricing engine by value.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct SpendgateConfig {
    /// Provider price tables and billing multipliers.
    #[serde(default)]
    pub pricing: PricingConfig,

    /// Budget enforcement settings.
    #[serde(default)]
    pub budget: BudgetConfig,
}

/// Price of one model in USD per million tokens.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ModelPricing {
    pub input_per_mtok: Decimal,
    pub output_per_mtok: Decimal,
}

impl ModelPricing {
    pub const FREE: ModelPricing = ModelPricing {
        input_per_mtok: Decimal::ZERO,
        output_per_mtok: Decimal::ZERO,
    };

    pub const fn new(input_per_mtok: Decimal, output_per_mtok: Decimal) -> Self {
        Self {
            input_per_mtok,
            output_per_mtok,
        }
    }
}

/// Price table for one provider. Unknown or unspecified models use `default`.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ProviderPricing {
    pub default: ModelPricing,

    #[serde(default)]
    pub models: BTreeMap<String, ModelPricing>,
}

impl ProviderPricing {
    /// Pricing for `model`, or the provider default when the model is
    /// empty or not listed.
    pub fn for_model(&self, model: &str) -> ModelPricing {
        let model = model.trim();
        if model.is_empty() {
            return self.default;
        }
        self.models.get(model).copied().unwrap_or(self.default)
    }
}

/// Surcharge multiplier applied per power mode.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct PowerSurcharge {
    #[serde(default = "default_surcharge_fast")]
    pub fast: Decimal,

    #[serde(default = "default_surcharge_balanced")]
    pub balanced: Decimal,

    #[serde(default = "default_surcharge_max")]
    pub max: Decimal,
}

impl PowerSurcharge {
    pub fn get(&self, mode: PowerMode) -> Decimal {
        match mode {
            PowerMode::Fast => self.fast,
            PowerMode::Balanced => self.balanced,
            PowerMode::Max => self.max,
        }
    }

    pub fn set(&mut self, mode: PowerMode, value: Decimal) {
        match mode {
            PowerMode::Fast => self.fast = value,
            PowerMode::Balanced => self.balanced = value,
            PowerMode::Max => self.max = value,
        }
    }
}

impl Default for PowerSurcharge {
    fn default() -> Self {
        Self {
            fast: default_surcharge_fast(),
            balanced: default_surcharge_balanced(),
            max: default_surcharge_max(),
        }
    }
}

fn default_surcharge_fast() -> Decimal {
    dec!(1.00)
}

fn default_surcharge_balanced() -> Decimal {
    dec!(1.12)
}

fn default_surcharge_max() -> Decimal {
    dec!(1.25)
}

/// Pricing engine configuration.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct PricingConfig {
    /// Multiplier on raw provider cost (1.5 = 50% markup).
    #[serde(default = "default_profit_margin")]
    pub profit_margin: Decimal,

    /// Flat fee per million tokens charged on bring-your-own-key calls.
    #[serde(default = "default_byok_routing_fee")]
    pub byok_routing_fee_per_mtok: Decimal,

    /// Mode used when a caller passes an empty or unknown power mode.
    #[serde(default)]
    pub default_power_mode: PowerMode,

    /// Output-token ceiling assumed by estimates when the caller sets none.
    #[serde(default = "default_max_tokens_hint")]
    pub default_max_tokens_hint: u32,

    #[serde(default)]
    pub power_surcharge: PowerSurcharge,

    /// Provider price tables keyed by canonical provider name (`claude`,
    /// `openai`, `gemini`, `grok`, `ollama`). Entries given in TOML merge
    /// over the built-in table.
    #[serde(default = "default_providers")]
    pub providers: BTreeMap<String, ProviderPricing>,
}

impl Default for PricingConfig {
    fn default() -> Self {
        Self {
            profit_margin: default_profit_margin(),
            byok_routing_fee_per_mtok: default_byok_routing_fee(),
            default_power_mode: PowerMode::default(),
            default_max_tokens_hint: default_max_tokens_hint(),
            power_surcharge: PowerSurcharge::default(),
            providers: default_providers(),
        }
    }
}

impl PricingConfig {
    /// Price tables resolved to providers. Keys that are not a canonical
    /// provider name are skipped; validation reports them.
    pub fn resolved_providers(&self) -> BTreeMap<Provider, ProviderPricing> {
        self.providers
            .iter()
            .filter_map(|(key, pricing)| canonical_provider(key).map(|p| (p, pricing.clone())))
            .collect()
    }
}

/// The provider named by `key`, only if `key` is its canonical spelling.
pub fn canonical_provider(key: &str) -> Option<Provider> {
    Provider::parse(key).filter(|p| p.to_string() == key)
}

fn default_profit_margin() -> Decimal {
    dec!(1.50)
}

fn default_byok_routing_fee() -> Decimal {
    dec!(0.25)
}

fn default_max_tokens_hint() -> u32 {
    2000
}

fn provider(
    default: ModelPricing,
    models: &[(&str, Decimal, Decimal)],
) -> ProviderPricing {
    ProviderPricing {
        default,
        models: models
            .iter()
            .map(|(name, input, output)| (name.to_string(), ModelPricing::new(*input, *output)))
            .collect(),
    }
}

/// Published per-million-token prices for each provider.
fn default_providers() -> BTreeMap<String, ProviderPricing> {
    [
        (
            Provider::Claude,
            provider(
                ModelPricing::new(dec!(3.00), dec!(15.00)),
                &[
                    ("claude-opus-4-6", dec!(15.00), dec!(75.00)),
                    ("claude-sonnet-4-5-20250929", dec!(3.00), dec!(15.00)),
                    ("claude-haiku-4-5-20251001", dec!(0.25), dec!(1.25)),
                ],
            ),
        ),
        (
            Provider::OpenAi,
            provider(
                ModelPricing::new(dec!(5.00), dec!(15.00)),
                &[
                    ("gpt-5.2-codex", dec!(8.00), dec!(24.00)),
                    ("gpt-5", dec!(5.00), dec!(15.00)),
                    ("gpt-4o-mini", dec!(0.15), dec!(0.60)),
                ],
            ),
        ),
        (
            Provider::Gemini,
            provider(
                ModelPricing::new(dec!(0.50), dec!(1.50)),
                &[
                    ("gemini-3-pro-preview", dec!(2.00), dec!(6.00)),
                    ("gemini-3-flash-preview", dec!(0.50), dec!(1.50)),
                    ("gemini-2.5-flash-lite", dec!(0.075), dec!(0.30)),
                ],
            ),
        ),
        (
            Provider::Grok,
            provider(
                ModelPricing::new(dec!(0.20), dec!(0.50)),
                &[
                    ("grok-4-heavy", dec!(2.00), dec!(10.00)),
                    ("grok-4.1-thinking", dec!(0.30), dec!(0.50)),
                    ("grok-4.1", dec!(0.30), dec!(0.50)),
                    ("grok-4-fast", dec!(0.20), dec!(0.50)),
                ],
            ),
        ),
        (Provider::Ollama, provider(ModelPricing::FREE, &[])),
    ]
    .into_iter()
    .map(|(p, pricing)| (p.to_string(), pricing))
    .collect()
}

/// Budget enforcement configuration.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct BudgetConfig {
    /// Projected/limit ratio above which an allowed charge carries a warning.
    #[serde(default = "default_warning_threshold")]
    pub warning_threshold: Decimal,

    /// Upper bound on each cap store or spend tracker call, in milliseconds.
    /// `None` waits indefinitely.
    #[serde(default)]
    pub lookup_timeout_ms: Option<u64>,

    /// Serialize pre-authorizations per user when callers use the exclusive
    /// entry point.
    #[serde(default)]
    pub serialize_per_user: bool,
}

impl Default for BudgetConfig {
    fn default() -> Self {
        Self {
            warning_threshold: default_warning_threshold(),
            lookup_timeout_ms: None,
            serialize_per_user: false,
        }
    }
}

fn default_warning_threshold() -> Decimal {
    dec!(0.80)
}
