// SPDX-FileCopyrightText: 2026 Spendgate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core library for Spendgate.
//!
//! This crate provides the error type, the domain types, and the
//! collaborator traits shared by the pricing engine and the budget
//! enforcer. It performs no I/O.

pub mod error;
pub mod traits;
pub mod types;

// Re-export key items at crate root for ergonomic imports.
pub use error::SpendgateError;
pub use traits::{CapStore, SpendTracker};
pub use types::{
    BudgetCap, BuildId, CapAction, CapFields, CapId, CapKey, CapStanding, CapState, CapType,
    PowerMode, PreAuthorization, ProjectId, Provider, UserId,
};
