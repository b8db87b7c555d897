// SPDX-FileCopyrightText: 2026 Spendgate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Scripted spend tracker for deterministic testing.
//!
//! `MockSpendTracker` returns fixed totals per dimension, counts how often
//! each dimension is queried, and can be told to fail or stall.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tokio::sync::Mutex;

use spendgate_core::traits::spend::SpendTracker;
use spendgate_core::types::{BuildId, CapType, UserId};
use spendgate_core::SpendgateError;

#[derive(Debug, Default)]
struct Script {
    daily: Decimal,
    monthly: Decimal,
    builds: HashMap<BuildId, Decimal>,
    failing: HashSet<CapType>,
    delay: Option<Duration>,
}

/// A spend tracker that answers from a script.
///
/// Totals are the same for every user and every `as_of`; unknown builds
/// report zero.
#[derive(Debug, Default)]
pub struct MockSpendTracker {
    script: Mutex<Script>,
    daily_calls: AtomicUsize,
    monthly_calls: AtomicUsize,
    build_calls: AtomicUsize,
}

impl MockSpendTracker {
    /// Create a tracker reporting zero spend everywhere.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the daily total.
    pub fn with_daily(mut self, usd: Decimal) -> Self {
        self.script.get_mut().daily = usd;
        self
    }

    /// Set the monthly total.
    pub fn with_monthly(mut self, usd: Decimal) -> Self {
        self.script.get_mut().monthly = usd;
        self
    }

    /// Set the total for one build.
    pub fn with_build(mut self, build: impl Into<String>, usd: Decimal) -> Self {
        self.script
            .get_mut()
            .builds
            .insert(BuildId(build.into()), usd);
        self
    }

    /// Make every query for `dimension` fail.
    pub fn failing(mut self, dimension: CapType) -> Self {
        self.script.get_mut().failing.insert(dimension);
        self
    }

    /// Stall every query for `delay` before answering.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.script.get_mut().delay = Some(delay);
        self
    }

    /// Change the daily total after construction.
    pub async fn set_daily(&self, usd: Decimal) {
        self.script.lock().await.daily = usd;
    }

    /// Change the monthly total after construction.
    pub async fn set_monthly(&self, usd: Decimal) {
        self.script.lock().await.monthly = usd;
    }

    /// How many times `dimension` has been queried.
    pub fn calls(&self, dimension: CapType) -> usize {
        self.counter(dimension).load(Ordering::SeqCst)
    }

    /// Total queries across all dimensions.
    pub fn total_calls(&self) -> usize {
        self.calls(CapType::Daily) + self.calls(CapType::Monthly) + self.calls(CapType::PerBuild)
    }

    fn counter(&self, dimension: CapType) -> &AtomicUsize {
        match dimension {
            CapType::Daily => &self.daily_calls,
            CapType::Monthly => &self.monthly_calls,
            CapType::PerBuild => &self.build_calls,
        }
    }

    async fn answer(
        &self,
        dimension: CapType,
        pick: impl FnOnce(&Script) -> Decimal,
    ) -> Result<Decimal, SpendgateError> {
        self.counter(dimension).fetch_add(1, Ordering::SeqCst);
        let (delay, result) = {
            let script = self.script.lock().await;
            let result = if script.failing.contains(&dimension) {
                Err(SpendgateError::Storage {
                    source: Box::new(std::io::Error::other(format!(
                        "{dimension} spend unavailable"
                    ))),
                })
            } else {
                Ok(pick(&script))
            };
            (script.delay, result)
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        result
    }
}

#[async_trait]
impl SpendTracker for MockSpendTracker {
    async fn daily_spend(
        &self,
        _user: UserId,
        _as_of: DateTime<Utc>,
    ) -> Result<Decimal, SpendgateError> {
        self.answer(CapType::Daily, |s| s.daily).await
    }

    async fn monthly_spend(
        &self,
        _user: UserId,
        _as_of: DateTime<Utc>,
    ) -> Result<Decimal, SpendgateError> {
        self.answer(CapType::Monthly, |s| s.monthly).await
    }

    async fn build_spend(&self, build: &BuildId) -> Result<Decimal, SpendgateError> {
        self.answer(CapType::PerBuild, |s| {
            s.builds.get(build).copied().unwrap_or_default()
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal_macros::dec;

    use super::*;

    #[tokio::test]
    async fn answers_from_script_and_counts_calls() {
        let tracker = MockSpendTracker::new()
            .with_daily(dec!(8))
            .with_build("b-1", dec!(2.5));

        let now = Utc::now();
        assert_eq!(tracker.daily_spend(UserId(1), now).await.unwrap(), dec!(8));
        assert_eq!(tracker.monthly_spend(UserId(1), now).await.unwrap(), dec!(0));
        assert_eq!(
            tracker.build_spend(&BuildId("b-1".into())).await.unwrap(),
            dec!(2.5)
        );
        assert_eq!(
            tracker.build_spend(&BuildId("other".into())).await.unwrap(),
            dec!(0)
        );
        assert_eq!(tracker.calls(CapType::PerBuild), 2);
        assert_eq!(tracker.total_calls(), 4);
    }

    #[tokio::test]
    async fn failing_dimension_errors() {
        let tracker = MockSpendTracker::new().failing(CapType::Monthly);
        let err = tracker
            .monthly_spend(UserId(1), Utc::now())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("monthly spend unavailable"));
        assert!(tracker.daily_spend(UserId(1), Utc::now()).await.is_ok());
    }
}
