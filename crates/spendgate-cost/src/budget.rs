// SPDX-FileCopyrightText: 2026 Spendgate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Budget enforcement against user-configured spending caps.
//!
//! The enforcer owns no spend totals. For each admission check it loads
//! the user's active caps from the [`CapStore`], asks the [`SpendTracker`]
//! for the current total of every dimension a cap needs (at most once per
//! dimension), and applies one policy across all caps: the first exceeded
//! `stop` cap denies, otherwise the single highest warning is reported.
//!
//! Collaborator failures propagate as errors. They are never read as zero
//! spend or as permission to proceed.
//!
//! `pre_authorize` takes no lock, so concurrent checks for one user may
//! jointly overrun a cap. Callers that need a hard limit use
//! [`BudgetEnforcer::pre_authorize_exclusive`] and hold the returned
//! [`SpendPermit`] until the spend is recorded.

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use spendgate_config::BudgetConfig;
use spendgate_core::{
    BudgetCap, BuildId, CapAction, CapFields, CapId, CapKey, CapStanding, CapStore, CapType,
    PreAuthorization, ProjectId, SpendTracker, SpendgateError, UserId,
};
use tracing::{debug, info, warn};

use crate::permit::{SpendPermit, UserLocks};

/// Decimal places kept on `warning_pct`.
const WARNING_PCT_SCALE: u32 = 6;

/// Spend totals fetched during one evaluation, keyed by dimension.
#[derive(Debug, Default)]
struct SpendCache {
    totals: BTreeMap<CapType, Decimal>,
}

/// Admission control over a user's budget caps.
pub struct BudgetEnforcer {
    caps: Arc<dyn CapStore>,
    spend: Arc<dyn SpendTracker>,
    warning_threshold: Decimal,
    lookup_timeout: Option<Duration>,
    serialize_per_user: bool,
    locks: UserLocks,
}

impl BudgetEnforcer {
    pub fn new(
        caps: Arc<dyn CapStore>,
        spend: Arc<dyn SpendTracker>,
        config: &BudgetConfig,
    ) -> Self {
        Self {
            caps,
            spend,
            warning_threshold: config.warning_threshold,
            lookup_timeout: config.lookup_timeout_ms.map(Duration::from_millis),
            serialize_per_user: config.serialize_per_user,
            locks: UserLocks::default(),
        }
    }

    /// Decide whether `user` may incur `estimated_usd` more spend.
    ///
    /// `build` identifies the unit of work for `per_build` caps; without
    /// one those caps see zero current spend. A negative estimate is
    /// treated as zero. Caps are evaluated in (type, project, id) order.
    pub async fn pre_authorize(
        &self,
        user: UserId,
        build: Option<&BuildId>,
        estimated_usd: Decimal,
    ) -> Result<PreAuthorization, SpendgateError> {
        let estimated = estimated_usd.max(Decimal::ZERO);
        let caps = self.load_caps(user).await?;
        if caps.is_empty() {
            return Ok(PreAuthorization::allow());
        }

        let build = build.filter(|b| !b.is_blank());
        let as_of = Utc::now();
        let mut cache = SpendCache::default();
        let mut worst: Option<(Decimal, CapStanding)> = None;

        for cap in &caps {
            let current = self
                .current_spend(&mut cache, cap.cap_type, user, build, as_of)
                .await?;
            // An unrepresentable projection is over any limit.
            let projected = current.checked_add(estimated);
            let standing = CapStanding {
                cap_type: cap.cap_type,
                limit_usd: cap.limit_usd,
                current_usd: current,
                remaining_usd: cap
                    .limit_usd
                    .checked_sub(current)
                    .unwrap_or(Decimal::MAX)
                    .max(Decimal::ZERO),
            };

            if projected.is_none_or(|p| p > cap.limit_usd) {
                match cap.action {
                    CapAction::Stop => {
                        let reason = format!(
                            "{} budget cap of ${:.2} exceeded (current: ${:.6}, estimated: ${:.6})",
                            cap.cap_type,
                            cap.limit_usd.round_dp(2),
                            current.round_dp(6),
                            estimated.round_dp(6)
                        );
                        warn!(
                            user = %user,
                            cap_id = %cap.id,
                            cap_type = %cap.cap_type,
                            limit = %cap.limit_usd,
                            current = %current,
                            estimated = %estimated,
                            "pre-authorization denied by budget cap"
                        );
                        return Ok(PreAuthorization::deny(reason, standing));
                    }
                    CapAction::Warn => {
                        warn!(
                            user = %user,
                            cap_id = %cap.id,
                            cap_type = %cap.cap_type,
                            limit = %cap.limit_usd,
                            current = %current,
                            estimated = %estimated,
                            "warn-only budget cap exceeded"
                        );
                        record_warning(&mut worst, Decimal::ONE, standing);
                        continue;
                    }
                }
            }

            // Limits are positive for every cap written through `set_cap`;
            // a zero-limit row from elsewhere cannot warn.
            let Some(pct) = projected.and_then(|p| p.checked_div(cap.limit_usd)) else {
                continue;
            };
            if pct > self.warning_threshold {
                record_warning(&mut worst, pct, standing);
            }
        }

        match worst {
            Some((pct, standing)) => {
                let pct = pct.round_dp(WARNING_PCT_SCALE);
                warn!(
                    user = %user,
                    cap_type = %standing.cap_type,
                    warning_pct = %pct,
                    remaining = %standing.remaining_usd,
                    "approaching budget cap"
                );
                Ok(PreAuthorization::allow_with_warning(pct, standing))
            }
            None => Ok(PreAuthorization::allow()),
        }
    }

    /// [`pre_authorize`](Self::pre_authorize) under the user's spend lock.
    ///
    /// When per-user serialization is disabled the permit holds nothing and
    /// this behaves exactly like `pre_authorize`.
    pub async fn pre_authorize_exclusive(
        &self,
        user: UserId,
        build: Option<&BuildId>,
        estimated_usd: Decimal,
    ) -> Result<(PreAuthorization, SpendPermit), SpendgateError> {
        let permit = if self.serialize_per_user {
            self.locks.acquire(user).await
        } else {
            SpendPermit::unlocked(user)
        };
        let result = self.pre_authorize(user, build, estimated_usd).await?;
        Ok((result, permit))
    }

    /// Current standing without gating a new charge.
    pub async fn check_budget(
        &self,
        user: UserId,
        build: Option<&BuildId>,
    ) -> Result<PreAuthorization, SpendgateError> {
        self.pre_authorize(user, build, Decimal::ZERO).await
    }

    /// Active caps for `user`, ordered by cap type.
    pub async fn get_caps(&self, user: UserId) -> Result<Vec<BudgetCap>, SpendgateError> {
        self.load_caps(user).await
    }

    /// Create or update the cap for `(user, cap_type, project)`.
    ///
    /// `cap_type` must be `daily`, `monthly` or `per_build`. An empty
    /// `action` means `stop`. Nothing is written when validation fails.
    pub async fn set_cap(
        &self,
        user: UserId,
        cap_type: &str,
        project: Option<ProjectId>,
        limit_usd: Decimal,
        action: &str,
    ) -> Result<BudgetCap, SpendgateError> {
        let cap_type: CapType = cap_type.trim().parse().map_err(|_| SpendgateError::Validation {
            message: format!(
                "unknown cap type `{cap_type}`; expected daily, monthly or per_build"
            ),
        })?;
        if limit_usd <= Decimal::ZERO {
            return Err(SpendgateError::Validation {
                message: format!("limit_usd must be greater than 0, got {limit_usd}"),
            });
        }
        let action = match action.trim() {
            "" => CapAction::default(),
            other => other.parse().map_err(|_| SpendgateError::Validation {
                message: format!("unknown cap action `{other}`; expected stop or warn"),
            })?,
        };

        let key = CapKey {
            user_id: user,
            cap_type,
            project_id: project,
        };
        let fields = CapFields { limit_usd, action };
        let (cap, created) = self
            .bounded(async {
                self.caps
                    .upsert_cap(&key, &fields)
                    .await
                    .map_err(|e| SpendgateError::collaborator("failed to save budget cap", e))
            })
            .await?;

        info!(
            user = %user,
            cap_id = %cap.id,
            cap_type = %cap_type,
            limit = %limit_usd,
            action = %action,
            created,
            "budget cap {}",
            if created { "created" } else { "updated" }
        );
        Ok(cap)
    }

    /// Soft-delete a cap owned by `user`.
    ///
    /// A missing cap, an already-deleted cap and another user's cap all
    /// yield the same [`SpendgateError::CapNotFound`].
    pub async fn delete_cap(&self, cap_id: CapId, user: UserId) -> Result<(), SpendgateError> {
        let found = self
            .bounded(async {
                self.caps
                    .find_cap_by_id_and_owner(cap_id, user)
                    .await
                    .map_err(|e| SpendgateError::collaborator("failed to look up budget cap", e))
            })
            .await?;
        let mut cap = match found {
            Some(cap) if !cap.is_deleted() => cap,
            _ => return Err(SpendgateError::CapNotFound { cap_id }),
        };

        cap.soft_delete(Utc::now());
        self.bounded(async {
            self.caps
                .save(&cap)
                .await
                .map_err(|e| SpendgateError::collaborator("failed to delete budget cap", e))
        })
        .await?;

        info!(user = %user, cap_id = %cap_id, cap_type = %cap.cap_type, "budget cap deleted");
        Ok(())
    }

    /// Ratio of projected spend to limit above which a warning is raised.
    pub fn warning_threshold(&self) -> Decimal {
        self.warning_threshold
    }

    async fn load_caps(&self, user: UserId) -> Result<Vec<BudgetCap>, SpendgateError> {
        let mut caps = self
            .bounded(async {
                self.caps
                    .find_active_caps(user)
                    .await
                    .map_err(|e| SpendgateError::collaborator("failed to load budget caps", e))
            })
            .await?;
        caps.retain(BudgetCap::is_active);
        caps.sort_by_key(|c| (c.cap_type, c.project_id, c.id));
        Ok(caps)
    }

    async fn current_spend(
        &self,
        cache: &mut SpendCache,
        dimension: CapType,
        user: UserId,
        build: Option<&BuildId>,
        as_of: DateTime<Utc>,
    ) -> Result<Decimal, SpendgateError> {
        if let Some(total) = cache.totals.get(&dimension) {
            return Ok(*total);
        }

        let total = match (dimension, build) {
            (CapType::PerBuild, None) => Decimal::ZERO,
            (CapType::PerBuild, Some(build)) => {
                self.bounded(async {
                    self.spend
                        .build_spend(build)
                        .await
                        .map_err(|e| SpendgateError::collaborator("failed to fetch build spend", e))
                })
                .await?
            }
            (CapType::Daily, _) => {
                self.bounded(async {
                    self.spend
                        .daily_spend(user, as_of)
                        .await
                        .map_err(|e| SpendgateError::collaborator("failed to fetch daily spend", e))
                })
                .await?
            }
            (CapType::Monthly, _) => {
                self.bounded(async {
                    self.spend.monthly_spend(user, as_of).await.map_err(|e| {
                        SpendgateError::collaborator("failed to fetch monthly spend", e)
                    })
                })
                .await?
            }
        };

        debug!(user = %user, dimension = %dimension, total = %total, "resolved current spend");
        cache.totals.insert(dimension, total);
        Ok(total)
    }

    /// Run a collaborator call under the configured lookup timeout.
    async fn bounded<T, F>(&self, call: F) -> Result<T, SpendgateError>
    where
        F: Future<Output = Result<T, SpendgateError>>,
    {
        let Some(limit) = self.lookup_timeout else {
            return call.await;
        };
        match tokio::time::timeout(limit, call).await {
            Ok(result) => result,
            Err(_elapsed) => {
                warn!(timeout_ms = limit.as_millis() as u64, "budget collaborator call timed out");
                Err(SpendgateError::Timeout { duration: limit })
            }
        }
    }
}

fn record_warning(worst: &mut Option<(Decimal, CapStanding)>, pct: Decimal, standing: CapStanding) {
    if worst.as_ref().is_none_or(|(current, _)| pct > *current) {
        *worst = Some((pct, standing));
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use rust_decimal_macros::dec;
    use spendgate_core::CapState;
    use spendgate_test_utils::{MockCapStore, MockSpendTracker};
    use tracing_test::traced_test;

    use super::*;

    fn cap(id: i64, user: i64, cap_type: CapType, limit: Decimal, action: CapAction) -> BudgetCap {
        let now = Utc::now();
        BudgetCap {
            id: CapId(id),
            user_id: UserId(user),
            cap_type,
            project_id: None,
            limit_usd: limit,
            action,
            state: CapState::Active,
            created_at: now,
            updated_at: now,
        }
    }

    fn enforcer_with(
        caps: Vec<BudgetCap>,
        spend: MockSpendTracker,
    ) -> (BudgetEnforcer, Arc<MockCapStore>, Arc<MockSpendTracker>) {
        enforcer_with_config(caps, spend, &BudgetConfig::default())
    }

    fn enforcer_with_config(
        caps: Vec<BudgetCap>,
        spend: MockSpendTracker,
        config: &BudgetConfig,
    ) -> (BudgetEnforcer, Arc<MockCapStore>, Arc<MockSpendTracker>) {
        let caps = Arc::new(MockCapStore::with_rows(caps));
        let spend = Arc::new(spend);
        let enforcer = BudgetEnforcer::new(caps.clone(), spend.clone(), config);
        (enforcer, caps, spend)
    }

    #[tokio::test]
    async fn no_caps_always_allowed() {
        let (enforcer, _, spend) = enforcer_with(vec![], MockSpendTracker::new());
        let result = enforcer
            .pre_authorize(UserId(1), None, dec!(5.00))
            .await
            .unwrap();
        assert_eq!(result, PreAuthorization::allow());
        assert_eq!(spend.total_calls(), 0);
    }

    #[tokio::test]
    #[traced_test]
    async fn stop_cap_denies_with_reason() {
        let (enforcer, _, _) = enforcer_with(
            vec![cap(1, 1, CapType::Daily, dec!(10.00), CapAction::Stop)],
            MockSpendTracker::new().with_daily(dec!(8.00)),
        );
        let result = enforcer
            .pre_authorize(UserId(1), None, dec!(3.00))
            .await
            .unwrap();
        assert!(!result.allowed);
        assert_eq!(
            result.reason.as_deref(),
            Some(
                "daily budget cap of $10.00 exceeded (current: $8.000000, estimated: $3.000000)"
            )
        );
        assert_eq!(result.cap_type, Some(CapType::Daily));
        assert_eq!(result.current_usd, Some(dec!(8.00)));
        assert_eq!(result.remaining_usd, Some(dec!(2.00)));
        assert!(result.warning_pct.is_none());
        assert!(logs_contain("pre-authorization denied by budget cap"));
    }

    #[tokio::test]
    async fn denial_reason_rounds_amounts() {
        let (enforcer, _, _) = enforcer_with(
            vec![cap(1, 1, CapType::Monthly, dec!(10.009), CapAction::Stop)],
            MockSpendTracker::new().with_monthly(dec!(9.9999996)),
        );
        let result = enforcer
            .pre_authorize(UserId(1), None, dec!(0.0000007))
            .await
            .unwrap();
        assert!(result.allowed);

        let result = enforcer
            .pre_authorize(UserId(1), None, dec!(0.1234567))
            .await
            .unwrap();
        assert_eq!(
            result.reason.as_deref(),
            Some(
                "monthly budget cap of $10.01 exceeded (current: $10.000000, estimated: $0.123457)"
            )
        );
    }

    #[tokio::test]
    async fn warn_cap_above_threshold_reports_ratio() {
        let (enforcer, _, _) = enforcer_with(
            vec![cap(1, 1, CapType::Monthly, dec!(100.00), CapAction::Warn)],
            MockSpendTracker::new().with_monthly(dec!(85.00)),
        );
        let result = enforcer
            .pre_authorize(UserId(1), None, dec!(3.00))
            .await
            .unwrap();
        assert!(result.allowed);
        assert!(result.reason.is_none());
        assert_eq!(result.warning_pct, Some(dec!(0.88)));
        assert_eq!(result.cap_type, Some(CapType::Monthly));
        assert_eq!(result.remaining_usd, Some(dec!(15.00)));
    }

    #[tokio::test]
    async fn exceeded_warn_cap_reports_full_severity() {
        let (enforcer, _, _) = enforcer_with(
            vec![
                cap(1, 1, CapType::Daily, dec!(10), CapAction::Warn),
                cap(2, 1, CapType::Monthly, dec!(100), CapAction::Stop),
            ],
            MockSpendTracker::new()
                .with_daily(dec!(12))
                .with_monthly(dec!(90)),
        );
        let result = enforcer
            .pre_authorize(UserId(1), None, dec!(1))
            .await
            .unwrap();
        assert!(result.allowed);
        assert_eq!(result.warning_pct, Some(Decimal::ONE));
        assert_eq!(result.cap_type, Some(CapType::Daily));
        assert_eq!(result.remaining_usd, Some(Decimal::ZERO));
    }

    #[tokio::test]
    async fn stop_wins_over_earlier_warning() {
        let (enforcer, _, _) = enforcer_with(
            vec![
                cap(1, 1, CapType::Daily, dec!(10), CapAction::Warn),
                cap(2, 1, CapType::Monthly, dec!(50), CapAction::Stop),
            ],
            MockSpendTracker::new()
                .with_daily(dec!(9))
                .with_monthly(dec!(49.5)),
        );
        let result = enforcer
            .pre_authorize(UserId(1), None, dec!(1))
            .await
            .unwrap();
        assert!(!result.allowed);
        assert_eq!(result.cap_type, Some(CapType::Monthly));
    }

    #[tokio::test]
    async fn below_threshold_reports_nothing() {
        let (enforcer, _, _) = enforcer_with(
            vec![cap(1, 1, CapType::Daily, dec!(10), CapAction::Stop)],
            MockSpendTracker::new().with_daily(dec!(7)),
        );
        let result = enforcer
            .pre_authorize(UserId(1), None, dec!(1))
            .await
            .unwrap();
        assert_eq!(result, PreAuthorization::allow());
    }

    #[tokio::test]
    async fn projected_equal_to_limit_is_allowed() {
        let (enforcer, _, _) = enforcer_with(
            vec![cap(1, 1, CapType::Daily, dec!(10), CapAction::Stop)],
            MockSpendTracker::new().with_daily(dec!(7)),
        );
        let result = enforcer
            .pre_authorize(UserId(1), None, dec!(3))
            .await
            .unwrap();
        assert!(result.allowed);
        assert_eq!(result.warning_pct, Some(Decimal::ONE));
    }

    #[tokio::test]
    async fn overflowing_estimate_denies_stop_cap() {
        let (enforcer, _, _) = enforcer_with(
            vec![cap(1, 1, CapType::Daily, dec!(10), CapAction::Stop)],
            MockSpendTracker::new().with_daily(dec!(1)),
        );
        let result = enforcer
            .pre_authorize(UserId(1), None, Decimal::MAX)
            .await
            .unwrap();
        assert!(!result.allowed);
        assert_eq!(result.remaining_usd, Some(dec!(9)));
    }

    #[tokio::test]
    async fn overflowing_estimate_warns_at_full_severity() {
        let (enforcer, _, _) = enforcer_with(
            vec![cap(1, 1, CapType::Monthly, dec!(10), CapAction::Warn)],
            MockSpendTracker::new().with_monthly(dec!(1)),
        );
        let result = enforcer
            .pre_authorize(UserId(1), None, Decimal::MAX)
            .await
            .unwrap();
        assert!(result.allowed);
        assert_eq!(result.warning_pct, Some(Decimal::ONE));
    }

    #[tokio::test]
    async fn extreme_spend_totals_do_not_overflow_remaining() {
        let (enforcer, _, _) = enforcer_with(
            vec![cap(1, 1, CapType::Daily, dec!(10), CapAction::Warn)],
            MockSpendTracker::new().with_daily(Decimal::MIN),
        );
        let result = enforcer.check_budget(UserId(1), None).await.unwrap();
        assert_eq!(result, PreAuthorization::allow());
    }

    #[tokio::test]
    async fn each_dimension_fetched_once() {
        let mut project_cap = cap(3, 1, CapType::Daily, dec!(20), CapAction::Warn);
        project_cap.project_id = Some(ProjectId(4));
        let (enforcer, _, spend) = enforcer_with(
            vec![
                cap(1, 1, CapType::Daily, dec!(10), CapAction::Warn),
                cap(2, 1, CapType::Monthly, dec!(100), CapAction::Warn),
                project_cap,
            ],
            MockSpendTracker::new(),
        );
        enforcer
            .pre_authorize(UserId(1), None, dec!(1))
            .await
            .unwrap();
        assert_eq!(spend.calls(CapType::Daily), 1);
        assert_eq!(spend.calls(CapType::Monthly), 1);
    }

    #[tokio::test]
    async fn per_build_cap_without_build_skips_lookup() {
        let (enforcer, _, spend) = enforcer_with(
            vec![cap(1, 1, CapType::PerBuild, dec!(1), CapAction::Stop)],
            MockSpendTracker::new().with_build("b-7", dec!(100)),
        );
        let blank = BuildId("  ".into());
        let result = enforcer
            .pre_authorize(UserId(1), Some(&blank), dec!(0.5))
            .await
            .unwrap();
        assert!(result.allowed);
        assert_eq!(spend.total_calls(), 0);

        let build = BuildId("b-7".into());
        let result = enforcer
            .pre_authorize(UserId(1), Some(&build), dec!(0.5))
            .await
            .unwrap();
        assert!(!result.allowed);
        assert_eq!(spend.calls(CapType::PerBuild), 1);
    }

    #[tokio::test]
    async fn negative_estimate_is_clamped() {
        let (enforcer, _, _) = enforcer_with(
            vec![cap(1, 1, CapType::Daily, dec!(10), CapAction::Stop)],
            MockSpendTracker::new().with_daily(dec!(11)),
        );
        let result = enforcer
            .pre_authorize(UserId(1), None, dec!(-5))
            .await
            .unwrap();
        assert!(!result.allowed);
        assert!(result.reason.unwrap().contains("estimated: $0.000000"));
    }

    #[tokio::test]
    async fn spend_failure_aborts_evaluation() {
        let (enforcer, _, _) = enforcer_with(
            vec![cap(1, 1, CapType::Monthly, dec!(10), CapAction::Stop)],
            MockSpendTracker::new().failing(CapType::Monthly),
        );
        let err = enforcer
            .pre_authorize(UserId(1), None, dec!(1))
            .await
            .unwrap_err();
        match err {
            SpendgateError::Collaborator { context, .. } => {
                assert_eq!(context, "failed to fetch monthly spend");
            }
            other => panic!("expected collaborator error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn cap_store_failure_is_wrapped() {
        let (enforcer, caps, _) = enforcer_with(vec![], MockSpendTracker::new());
        caps.set_failing(true);
        let err = enforcer.check_budget(UserId(1), None).await.unwrap_err();
        assert!(
            err.to_string()
                .starts_with("unable to evaluate budget: failed to load budget caps")
        );
    }

    #[tokio::test(start_paused = true)]
    async fn slow_lookup_times_out() {
        let config = BudgetConfig {
            lookup_timeout_ms: Some(100),
            ..BudgetConfig::default()
        };
        let (enforcer, _, _) = enforcer_with_config(
            vec![cap(1, 1, CapType::Daily, dec!(10), CapAction::Stop)],
            MockSpendTracker::new().with_delay(Duration::from_secs(5)),
            &config,
        );
        let err = enforcer
            .pre_authorize(UserId(1), None, dec!(1))
            .await
            .unwrap_err();
        assert!(
            matches!(err, SpendgateError::Timeout { duration } if duration == Duration::from_millis(100))
        );
    }

    #[tokio::test]
    async fn custom_threshold_applies() {
        let config = BudgetConfig {
            warning_threshold: dec!(0.5),
            ..BudgetConfig::default()
        };
        let (enforcer, _, _) = enforcer_with_config(
            vec![cap(1, 1, CapType::Daily, dec!(10), CapAction::Stop)],
            MockSpendTracker::new().with_daily(dec!(5)),
            &config,
        );
        let result = enforcer.check_budget(UserId(1), None).await.unwrap();
        assert!(result.warning_pct.is_none());
        let result = enforcer
            .pre_authorize(UserId(1), None, dec!(1))
            .await
            .unwrap();
        assert_eq!(result.warning_pct, Some(dec!(0.6)));
    }

    #[tokio::test]
    async fn set_cap_validates_input() {
        let (enforcer, caps, _) = enforcer_with(vec![], MockSpendTracker::new());
        for (cap_type, limit, action) in [
            ("weekly", dec!(5), "stop"),
            ("daily", dec!(0), "stop"),
            ("daily", dec!(-1), ""),
            ("daily", dec!(5), "block"),
        ] {
            let err = enforcer
                .set_cap(UserId(1), cap_type, None, limit, action)
                .await
                .unwrap_err();
            assert!(
                matches!(err, SpendgateError::Validation { .. }),
                "{cap_type}/{limit}/{action}"
            );
        }
        assert!(caps.rows().await.is_empty());
        assert_eq!(caps.write_count(), 0);
    }

    #[tokio::test]
    #[traced_test]
    async fn set_cap_defaults_action_and_is_idempotent() {
        let (enforcer, caps, _) = enforcer_with(vec![], MockSpendTracker::new());
        let first = enforcer
            .set_cap(UserId(1), "daily", None, dec!(5), "")
            .await
            .unwrap();
        assert_eq!(first.action, CapAction::Stop);
        assert!(logs_contain("budget cap created"));

        let second = enforcer
            .set_cap(UserId(1), "daily", None, dec!(8), "stop")
            .await
            .unwrap();
        assert_eq!(second.id, first.id);
        assert_eq!(second.limit_usd, dec!(8));
        assert!(logs_contain("budget cap updated"));
        assert_eq!(caps.rows().await.len(), 1);
    }

    #[tokio::test]
    async fn set_cap_after_seeded_rows_gets_fresh_id() {
        let (enforcer, _, _) = enforcer_with(
            vec![cap(7, 1, CapType::Daily, dec!(10), CapAction::Stop)],
            MockSpendTracker::new(),
        );
        let created = enforcer
            .set_cap(UserId(1), "monthly", None, dec!(50), "warn")
            .await
            .unwrap();
        assert_eq!(created.id, CapId(8));
    }

    #[tokio::test]
    async fn get_caps_orders_by_type() {
        let (enforcer, caps, _) = enforcer_with(
            vec![
                cap(1, 1, CapType::PerBuild, dec!(1), CapAction::Stop),
                cap(2, 1, CapType::Monthly, dec!(100), CapAction::Stop),
                cap(3, 2, CapType::Daily, dec!(10), CapAction::Stop),
            ],
            MockSpendTracker::new(),
        );
        caps.insert(cap(0, 1, CapType::Daily, dec!(10), CapAction::Stop))
            .await;
        let mut inactive = cap(0, 1, CapType::Daily, dec!(5), CapAction::Warn);
        inactive.state = CapState::Inactive;
        caps.insert(inactive).await;

        let listed: Vec<_> = enforcer
            .get_caps(UserId(1))
            .await
            .unwrap()
            .into_iter()
            .map(|c| c.cap_type)
            .collect();
        assert_eq!(
            listed,
            vec![CapType::Daily, CapType::Monthly, CapType::PerBuild]
        );
    }

    #[tokio::test]
    async fn delete_cap_soft_deletes_owned_cap() {
        let (enforcer, caps, _) = enforcer_with(
            vec![cap(1, 1, CapType::Daily, dec!(10), CapAction::Stop)],
            MockSpendTracker::new(),
        );

        let err = enforcer.delete_cap(CapId(1), UserId(2)).await.unwrap_err();
        assert!(matches!(err, SpendgateError::CapNotFound { cap_id } if cap_id == CapId(1)));
        assert!(caps.row(CapId(1)).await.unwrap().is_active());

        enforcer.delete_cap(CapId(1), UserId(1)).await.unwrap();
        let rows = caps.rows().await;
        assert_eq!(rows.len(), 1);
        assert!(rows[0].is_deleted());
        assert!(!rows[0].is_active());
        assert!(rows[0].deleted_at().is_some());

        let again = enforcer.delete_cap(CapId(1), UserId(1)).await.unwrap_err();
        assert!(matches!(again, SpendgateError::CapNotFound { .. }));
        assert!(enforcer.get_caps(UserId(1)).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn exclusive_permit_follows_config() {
        let (enforcer, _, _) = enforcer_with(vec![], MockSpendTracker::new());
        let (_, permit) = enforcer
            .pre_authorize_exclusive(UserId(1), None, dec!(1))
            .await
            .unwrap();
        assert!(!permit.is_exclusive());

        let config = BudgetConfig {
            serialize_per_user: true,
            ..BudgetConfig::default()
        };
        let (enforcer, _, _) = enforcer_with_config(vec![], MockSpendTracker::new(), &config);
        let (result, permit) = enforcer
            .pre_authorize_exclusive(UserId(1), None, dec!(1))
            .await
            .unwrap();
        assert!(result.allowed);
        assert!(permit.is_exclusive());
        assert_eq!(permit.user(), UserId(1));
    }
}
