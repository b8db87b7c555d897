// SPDX-FileCopyrightText: 2026 Spendgate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration system for Spendgate.
//!
//! Provides TOML configuration parsing with strict validation (`deny_unknown_fields`),
//! XDG file hierarchy lookup, environment variable overrides, and Elm-style diagnostic
//! error rendering with typo suggestions.
//!
//! Configuration is loaded once at process start. The resulting
//! [`SpendgateConfig`] is immutable; its `pricing` section is handed to the
//! pricing engine and its `budget` section to the budget enforcer.
//!
//! # Usage
//!
//! ```no_run
//! use spendgate_config::load_and_validate;
//!
//! let config = load_and_validate().expect("config errors");
//! println!("profit margin: {}", config.pricing.profit_margin);
//! ```

pub mod diagnostic;
pub mod loader;
pub mod model;
pub mod validation;

pub use diagnostic::{ConfigError, render_errors};
pub use loader::{apply_pricing_env_overrides, load_config, load_config_from_path, load_config_from_str};
pub use model::{
    BudgetConfig, ModelPricing, PowerSurcharge, PricingConfig, ProviderPricing, SpendgateConfig,
};

/// Load configuration from the XDG hierarchy and validate it.
///
/// 1. Loads config from TOML files + env vars via Figment
/// 2. Applies the lenient pricing overrides
/// 3. Runs post-deserialization validation
///
/// Figment errors become miette diagnostics with typo suggestions.
pub fn load_and_validate() -> Result<SpendgateConfig, Vec<ConfigError>> {
    match loader::load_config() {
        Ok(config) => {
            validation::validate_config(&config)?;
            Ok(config)
        }
        Err(err) => {
            let toml_sources = collect_toml_sources();
            Err(diagnostic::figment_to_config_errors(err, &toml_sources))
        }
    }
}

/// Load configuration from a specific TOML string and validate it.
///
/// Useful for testing and explicit configuration. No env overrides apply.
pub fn load_and_validate_str(toml_content: &str) -> Result<SpendgateConfig, Vec<ConfigError>> {
    match loader::load_config_from_str(toml_content) {
        Ok(config) => {
            validation::validate_config(&config)?;
            Ok(config)
        }
        Err(err) => {
            let sources = vec![("<inline>".to_string(), toml_content.to_string())];
            Err(diagnostic::figment_to_config_errors(err, &sources))
        }
    }
}

/// Collect TOML source file contents for error span resolution.
fn collect_toml_sources() -> Vec<(String, String)> {
    let mut candidates = vec![std::path::PathBuf::from("/etc/spendgate/spendgate.toml")];
    if let Some(config_dir) = dirs::config_dir() {
        candidates.push(config_dir.join("spendgate/spendgate.toml"));
    }
    if let Ok(cwd) = std::env::current_dir() {
        candidates.push(cwd.join("spendgate.toml"));
    }

    candidates
        .into_iter()
        .filter_map(|path| {
            std::fs::read_to_string(&path)
                .ok()
                .map(|content| (path.display().to_string(), content))
        })
        .collect()
}
