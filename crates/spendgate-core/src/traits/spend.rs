// SPDX-FileCopyrightText: 2026 Spendgate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Spend oracle trait.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use crate::error::SpendgateError;
use crate::types::{BuildId, UserId};

/// Answers "how much has been billed so far" for one spend dimension.
///
/// Totals are billed (user-facing) USD. A failed lookup must surface as an
/// error; returning zero on failure would silently bypass caps.
#[async_trait]
pub trait SpendTracker: Send + Sync {
    /// Billed spend for `user` on the UTC day containing `as_of`.
    async fn daily_spend(&self, user: UserId, as_of: DateTime<Utc>)
    -> Result<Decimal, SpendgateError>;

    /// Billed spend for `user` in the UTC month containing `as_of`.
    async fn monthly_spend(
        &self,
        user: UserId,
        as_of: DateTime<Utc>,
    ) -> Result<Decimal, SpendgateError>;

    /// Billed spend attributed to one build.
    async fn build_spend(&self, build: &BuildId) -> Result<Decimal, SpendgateError>;
}
