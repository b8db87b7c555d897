// SPDX-FileCopyrightText: 2026 Spendgate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Collaborator traits the budget enforcer depends on.
//!
//! Both collaborators sit in front of persistence the core does not own.
//! They use `#[async_trait]` so implementations can be held as trait
//! objects behind an `Arc`.

pub mod caps;
pub mod spend;

pub use caps::CapStore;
pub use spend::SpendTracker;
