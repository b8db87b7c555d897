// SPDX-FileCopyrightText: 2026 Spendgate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test utilities for Spendgate integration tests.
//!
//! Provides in-memory collaborators and a test harness for fast,
//! deterministic tests without a database.
//!
//! # Components
//!
//! - [`MockCapStore`] - In-memory cap store with failure injection
//! - [`MockSpendTracker`] - Scripted spend totals with call counting
//! - [`TestHarness`] - Pricing engine and budget enforcer wired to the mocks

pub mod harness;
pub mod mock_cap_store;
pub mod mock_spend_tracker;

pub use harness::{TEST_USER, TestHarness};
pub use mock_cap_store::MockCapStore;
pub use mock_spend_tracker::MockSpendTracker;
