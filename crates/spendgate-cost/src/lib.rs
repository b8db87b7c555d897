// SPDX-FileCopyrightText: 2026 Spendgate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Pricing and budget enforcement for Spendgate.
//!
//! This crate provides:
//! - **Pricing**: Raw, billed, and estimated USD cost per provider and model,
//!   with profit margin, power-mode surcharge, BYOK routing fee, and the
//!   no-loss floor
//! - **Budget enforcer**: Admission checks against user-configured daily,
//!   monthly, and per-build caps, plus cap create/update/delete
//! - **Spend permits**: Optional per-user serialization of admission checks

pub mod budget;
pub mod permit;
pub mod pricing;

pub use budget::BudgetEnforcer;
pub use permit::SpendPermit;
pub use pricing::{PricedUsage, PricingEngine, USD_SCALE, round_usd};
