// SPDX-FileCopyrightText: 2026 Spendgate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Provider pricing and billed-cost calculation.
//!
//! ```text
//! raw    = input/1M × input_price + output/1M × output_price
//! billed = max(round(raw × profit_margin × power_surcharge), raw)
//! ```
//!
//! Self-hosted (`ollama`) calls are free. Bring-your-own-key calls ignore
//! the price tables and pay only `(input + output)/1M × routing_fee`.
//!
//! All amounts are USD rounded to 6 decimal places, ties to even.
//!
//! The floor in `billed` is the no-loss guarantee: however the margin or
//! surcharges are overridden, a user is never billed less than the provider
//! charges for the same call.

use std::collections::HashMap;

use rust_decimal::{Decimal, RoundingStrategy};
use rust_decimal_macros::dec;
use spendgate_config::{ModelPricing, PowerSurcharge, PricingConfig, ProviderPricing};
use spendgate_core::{PowerMode, Provider};
use tracing::{debug, warn};

/// Decimal places kept on every USD amount.
pub const USD_SCALE: u32 = 6;

const TOKENS_PER_MTOK: Decimal = dec!(1000000);

/// Characters per token assumed when estimating prompt size.
const CHARS_PER_TOKEN: u64 = 3;
/// Safety buffer on estimated input tokens, in percent.
const INPUT_BUFFER_PCT: u64 = 115;
/// Fixed allowance for message framing and formatting.
const INPUT_OVERHEAD_TOKENS: u64 = 32;

/// Round a USD amount to [`USD_SCALE`] places using banker's rounding.
pub fn round_usd(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(USD_SCALE, RoundingStrategy::MidpointNearestEven)
}

/// Raw and billed cost of the same usage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PricedUsage {
    /// What the provider charges.
    pub raw_usd: Decimal,
    /// What the user is charged. Always `>= raw_usd`.
    pub billed_usd: Decimal,
}

/// Computes raw, billed, and estimated costs.
///
/// Built once from a [`PricingConfig`] and immutable afterwards, so a single
/// instance can be shared across threads behind an `Arc` without locking.
/// No method performs I/O or fails: unknown providers, models, and power
/// modes fall back to defaults.
#[derive(Debug, Clone)]
pub struct PricingEngine {
    providers: HashMap<Provider, ProviderPricing>,
    profit_margin: Decimal,
    power_surcharge: PowerSurcharge,
    byok_routing_fee_per_mtok: Decimal,
    default_power_mode: PowerMode,
    default_max_tokens_hint: u32,
}

impl PricingEngine {
    pub fn new(config: &PricingConfig) -> Self {
        Self {
            providers: config.resolved_providers().into_iter().collect(),
            profit_margin: config.profit_margin,
            power_surcharge: config.power_surcharge,
            byok_routing_fee_per_mtok: config.byok_routing_fee_per_mtok,
            default_power_mode: config.default_power_mode,
            default_max_tokens_hint: config.default_max_tokens_hint,
        }
    }

    /// What the provider charges for the given usage.
    ///
    /// `model` falls back to the provider default when empty or unknown.
    /// An unrecognized provider prices at zero.
    pub fn raw_cost(
        &self,
        provider: &str,
        model: &str,
        input_tokens: u64,
        output_tokens: u64,
    ) -> Decimal {
        let pricing = self.model_pricing(Provider::parse(provider), provider, model);
        raw_from_pricing(&pricing, input_tokens, output_tokens)
    }

    /// What the user is charged for the given usage.
    pub fn billed_cost(
        &self,
        provider: &str,
        model: &str,
        input_tokens: u64,
        output_tokens: u64,
        power_mode: &str,
        is_byok: bool,
    ) -> Decimal {
        self.price_usage(provider, model, input_tokens, output_tokens, power_mode, is_byok)
            .billed_usd
    }

    /// Raw and billed cost in one pass, for callers that record both.
    ///
    /// Raw cost is zero for free providers and for BYOK calls, since the
    /// platform pays the provider nothing in either case.
    pub fn price_usage(
        &self,
        provider: &str,
        model: &str,
        input_tokens: u64,
        output_tokens: u64,
        power_mode: &str,
        is_byok: bool,
    ) -> PricedUsage {
        let resolved = Provider::parse(provider);
        if resolved.is_some_and(Provider::is_free) {
            return PricedUsage {
                raw_usd: Decimal::ZERO,
                billed_usd: Decimal::ZERO,
            };
        }

        if is_byok {
            let total = Decimal::from(input_tokens) + Decimal::from(output_tokens);
            let billed = match total.checked_mul(self.byok_routing_fee_per_mtok) {
                Some(fee) => round_usd(fee / TOKENS_PER_MTOK),
                None => {
                    warn!(%total, "routing fee overflowed; saturating");
                    Decimal::MAX
                }
            };
            return PricedUsage {
                raw_usd: Decimal::ZERO,
                billed_usd: billed,
            };
        }

        let pricing = self.model_pricing(resolved, provider, model);
        let raw = raw_from_pricing(&pricing, input_tokens, output_tokens);
        let surcharge = self.power_multiplier(power_mode);
        let billed = match raw
            .checked_mul(self.profit_margin)
            .and_then(|v| v.checked_mul(surcharge))
        {
            Some(billed) => round_usd(billed),
            None => {
                warn!(
                    provider,
                    model,
                    %raw,
                    profit_margin = %self.profit_margin,
                    %surcharge,
                    "billed cost overflowed; billing at raw cost"
                );
                raw
            }
        };

        if billed < raw {
            debug!(
                provider,
                model,
                %raw,
                %billed,
                "billed cost below raw cost; applying no-loss floor"
            );
            return PricedUsage {
                raw_usd: raw,
                billed_usd: raw,
            };
        }
        PricedUsage {
            raw_usd: raw,
            billed_usd: billed,
        }
    }

    /// Conservative billed-cost estimate used before usage is known.
    ///
    /// Input tokens are derived from the prompt length with a safety
    /// buffer (see [`estimate_input_tokens`](Self::estimate_input_tokens)).
    /// Output is assumed to hit `max_tokens`, or the configured hint when
    /// `max_tokens` is unset or zero.
    pub fn estimate_cost(
        &self,
        provider: &str,
        model: &str,
        prompt_chars: usize,
        max_tokens: Option<u32>,
        power_mode: &str,
        is_byok: bool,
    ) -> Decimal {
        let output_tokens = match max_tokens {
            Some(n) if n > 0 => n,
            _ => self.default_max_tokens_hint,
        };
        let input_tokens = Self::estimate_input_tokens(prompt_chars);
        self.billed_cost(
            provider,
            model,
            input_tokens,
            u64::from(output_tokens),
            power_mode,
            is_byok,
        )
    }

    /// `ceil(ceil(chars / 3) × 1.15) + 32`, or 0 for an empty prompt.
    pub fn estimate_input_tokens(prompt_chars: usize) -> u64 {
        if prompt_chars == 0 {
            return 0;
        }
        let base = (prompt_chars as u64).div_ceil(CHARS_PER_TOKEN);
        let buffered = (u128::from(base) * u128::from(INPUT_BUFFER_PCT)).div_ceil(100);
        u64::try_from(buffered)
            .unwrap_or(u64::MAX)
            .saturating_add(INPUT_OVERHEAD_TOKENS)
    }

    /// Model used when the caller has not chosen one. `None` for providers
    /// without a routing table (unknown names and self-hosted).
    pub fn default_model(&self, provider: &str, power_mode: &str) -> Option<&'static str> {
        let mode = self.normalize_power_mode(power_mode);
        let model = match (Provider::parse(provider)?, mode) {
            (Provider::Claude, PowerMode::Max) => "claude-opus-4-6",
            (Provider::Claude, PowerMode::Balanced) => "claude-sonnet-4-5-20250929",
            (Provider::Claude, PowerMode::Fast) => "claude-haiku-4-5-20251001",
            (Provider::OpenAi, PowerMode::Max) => "gpt-5.2-codex",
            (Provider::OpenAi, PowerMode::Balanced) => "gpt-5",
            (Provider::OpenAi, PowerMode::Fast) => "gpt-4o-mini",
            (Provider::Gemini, PowerMode::Max) => "gemini-3-pro-preview",
            (Provider::Gemini, PowerMode::Balanced) => "gemini-3-flash-preview",
            (Provider::Gemini, PowerMode::Fast) => "gemini-2.5-flash-lite",
            (Provider::Grok, PowerMode::Max) => "grok-4-heavy",
            (Provider::Grok, PowerMode::Balanced) => "grok-4.1-thinking",
            (Provider::Grok, PowerMode::Fast) => "grok-4-fast",
            (Provider::Ollama, _) => return None,
        };
        Some(model)
    }

    /// The configured profit margin multiplier.
    pub fn profit_margin(&self) -> Decimal {
        self.profit_margin
    }

    /// The surcharge applied for `power_mode` after normalization.
    pub fn power_multiplier(&self, power_mode: &str) -> Decimal {
        self.power_surcharge.get(self.normalize_power_mode(power_mode))
    }

    /// Canonical power mode for free-form input, falling back to the
    /// configured default.
    pub fn normalize_power_mode(&self, power_mode: &str) -> PowerMode {
        PowerMode::normalize(power_mode, self.default_power_mode)
    }

    fn model_pricing(&self, resolved: Option<Provider>, raw_name: &str, model: &str) -> ModelPricing {
        let Some(provider) = resolved else {
            warn!(provider = raw_name, "unknown provider; pricing at zero");
            return ModelPricing::FREE;
        };
        match self.providers.get(&provider) {
            Some(table) => table.for_model(model),
            None => {
                warn!(%provider, "provider has no price table; pricing at zero");
                ModelPricing::FREE
            }
        }
    }
}

/// Saturates at `Decimal::MAX` when a configured price is large enough to
/// overflow.
fn raw_from_pricing(pricing: &ModelPricing, input_tokens: u64, output_tokens: u64) -> Decimal {
    let input = Decimal::from(input_tokens).checked_mul(pricing.input_per_mtok);
    let output = Decimal::from(output_tokens).checked_mul(pricing.output_per_mtok);
    match input.zip(output).and_then(|(i, o)| i.checked_add(o)) {
        Some(total) => round_usd(total / TOKENS_PER_MTOK),
        None => {
            warn!(input_tokens, output_tokens, "raw cost overflowed; saturating");
            Decimal::MAX
        }
    }
}
