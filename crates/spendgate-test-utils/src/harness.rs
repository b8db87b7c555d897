// SPDX-FileCopyrightText: 2026 Spendgate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test harness for end-to-end enforcement testing.
//!
//! `TestHarness` wires a `PricingEngine` and a `BudgetEnforcer` to the
//! in-memory collaborators and seeds caps for one user. `authorize_call()`
//! drives the full estimate-then-pre-authorize path a request handler runs.

use std::sync::Arc;

use rust_decimal::Decimal;
use spendgate_config::model::{BudgetConfig, PricingConfig, SpendgateConfig};
use spendgate_core::types::{
    BudgetCap, BuildId, CapAction, CapFields, CapKey, CapType, PreAuthorization, ProjectId, UserId,
};
use spendgate_core::{CapStore, SpendgateError};
use spendgate_cost::{BudgetEnforcer, PricingEngine};

use crate::mock_cap_store::MockCapStore;
use crate::mock_spend_tracker::MockSpendTracker;

/// The user every harness operates on unless told otherwise.
pub const TEST_USER: UserId = UserId(1);

struct SeedCap {
    cap_type: CapType,
    project_id: Option<ProjectId>,
    limit_usd: Decimal,
    action: CapAction,
}

/// Builder for creating test environments with configurable options.
pub struct TestHarnessBuilder {
    user: UserId,
    caps: Vec<SeedCap>,
    spend: MockSpendTracker,
    config: SpendgateConfig,
}

impl TestHarnessBuilder {
    fn new() -> Self {
        Self {
            user: TEST_USER,
            caps: Vec::new(),
            spend: MockSpendTracker::new(),
            config: SpendgateConfig::default(),
        }
    }

    /// Operate on a different user.
    pub fn with_user(mut self, user: UserId) -> Self {
        self.user = user;
        self
    }

    /// Seed an account-wide cap for the harness user.
    pub fn with_cap(mut self, cap_type: CapType, limit_usd: Decimal, action: CapAction) -> Self {
        self.caps.push(SeedCap {
            cap_type,
            project_id: None,
            limit_usd,
            action,
        });
        self
    }

    /// Seed a project-scoped cap for the harness user.
    pub fn with_project_cap(
        mut self,
        cap_type: CapType,
        project: ProjectId,
        limit_usd: Decimal,
        action: CapAction,
    ) -> Self {
        self.caps.push(SeedCap {
            cap_type,
            project_id: Some(project),
            limit_usd,
            action,
        });
        self
    }

    /// Replace the spend tracker script.
    pub fn with_spend(mut self, spend: MockSpendTracker) -> Self {
        self.spend = spend;
        self
    }

    /// Replace the pricing section.
    pub fn with_pricing(mut self, pricing: PricingConfig) -> Self {
        self.config.pricing = pricing;
        self
    }

    /// Replace the budget section.
    pub fn with_budget(mut self, budget: BudgetConfig) -> Self {
        self.config.budget = budget;
        self
    }

    /// Build the test harness, seeding caps through the store.
    pub async fn build(self) -> Result<TestHarness, SpendgateError> {
        let caps = Arc::new(MockCapStore::new());
        for seed in &self.caps {
            let key = CapKey {
                user_id: self.user,
                cap_type: seed.cap_type,
                project_id: seed.project_id,
            };
            let fields = CapFields {
                limit_usd: seed.limit_usd,
                action: seed.action,
            };
            caps.upsert_cap(&key, &fields).await?;
        }

        let spend = Arc::new(self.spend);
        let pricing = PricingEngine::new(&self.config.pricing);
        let enforcer = BudgetEnforcer::new(caps.clone(), spend.clone(), &self.config.budget);

        Ok(TestHarness {
            user: self.user,
            caps,
            spend,
            pricing,
            enforcer,
            config: self.config,
        })
    }
}

/// A complete enforcement environment over in-memory collaborators.
pub struct TestHarness {
    /// The user seeded caps belong to.
    pub user: UserId,
    /// Cap store shared with the enforcer.
    pub caps: Arc<MockCapStore>,
    /// Spend tracker shared with the enforcer.
    pub spend: Arc<MockSpendTracker>,
    /// Pricing engine built from `config.pricing`.
    pub pricing: PricingEngine,
    /// Budget enforcer built from `config.budget`.
    pub enforcer: BudgetEnforcer,
    /// Configuration the harness was built with.
    pub config: SpendgateConfig,
}

impl TestHarness {
    /// Create a new builder for configuring the test harness.
    pub fn builder() -> TestHarnessBuilder {
        TestHarnessBuilder::new()
    }

    /// Estimate a call and pre-authorize it for the harness user.
    #[allow(clippy::too_many_arguments)]
    pub async fn authorize_call(
        &self,
        provider: &str,
        model: &str,
        prompt_chars: usize,
        max_tokens: Option<u32>,
        power_mode: &str,
        is_byok: bool,
        build: Option<&BuildId>,
    ) -> Result<(Decimal, PreAuthorization), SpendgateError> {
        let estimate = self.pricing.estimate_cost(
            provider,
            model,
            prompt_chars,
            max_tokens,
            power_mode,
            is_byok,
        );
        let result = self.enforcer.pre_authorize(self.user, build, estimate).await?;
        Ok((estimate, result))
    }

    /// Every cap row for the harness user, in id order.
    pub async fn cap_rows(&self) -> Vec<BudgetCap> {
        let mut rows: Vec<_> = self
            .caps
            .rows()
            .await
            .into_iter()
            .filter(|r| r.user_id == self.user)
            .collect();
        rows.sort_by_key(|r| r.id);
        rows
    }
}
