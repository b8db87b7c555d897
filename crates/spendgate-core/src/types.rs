// SPDX-FileCopyrightText: 2026 Spendgate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Domain types shared by the pricing engine, the budget enforcer, and the
//! collaborator traits.

use std::fmt;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString};

/// Identifier of the user who owns caps and spend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct UserId(pub i64);

/// Identifier of a persisted budget cap, assigned by the cap store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CapId(pub i64);

/// Identifier of a project a cap may be scoped to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ProjectId(pub i64);

/// Identifier of one unit of paid work (a build).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BuildId(pub String);

impl BuildId {
    /// Returns `true` when the id carries no build (empty or whitespace).
    pub fn is_blank(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for CapId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for ProjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for BuildId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Upstream AI provider family.
///
/// Parsing is case-insensitive and accepts a few alternate names for the
/// same family (`anthropic`, `gpt4`, `google`, `xai`, `local`).
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Display,
    EnumString,
    EnumIter,
    Serialize,
    Deserialize,
)]
#[strum(ascii_case_insensitive)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    #[strum(to_string = "claude", serialize = "anthropic")]
    #[serde(alias = "anthropic")]
    Claude,
    #[strum(to_string = "openai", serialize = "gpt4", serialize = "gpt")]
    #[serde(alias = "gpt4", alias = "gpt")]
    OpenAi,
    #[strum(to_string = "gemini", serialize = "google")]
    #[serde(alias = "google")]
    Gemini,
    #[strum(to_string = "grok", serialize = "xai")]
    #[serde(alias = "xai")]
    Grok,
    /// Self-hosted models. Never billed.
    #[strum(to_string = "ollama", serialize = "local")]
    #[serde(alias = "local")]
    Ollama,
}

impl Provider {
    /// Resolve a free-form provider name. Returns `None` for names that
    /// match no known family.
    pub fn parse(input: &str) -> Option<Self> {
        input.trim().parse().ok()
    }

    /// Whether calls routed to this provider cost nothing.
    pub fn is_free(self) -> bool {
        matches!(self, Self::Ollama)
    }
}

/// Orchestration tier selecting model strength and carrying a surcharge.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Display,
    EnumString,
    EnumIter,
    Serialize,
    Deserialize,
)]
#[strum(ascii_case_insensitive)]
#[serde(rename_all = "lowercase")]
pub enum PowerMode {
    #[default]
    #[strum(to_string = "fast", serialize = "cheap", serialize = "economy")]
    #[serde(alias = "cheap", alias = "economy")]
    Fast,
    #[strum(to_string = "balanced", serialize = "balance")]
    #[serde(alias = "balance")]
    Balanced,
    #[strum(to_string = "max", serialize = "power", serialize = "maximum")]
    #[serde(alias = "power", alias = "maximum")]
    Max,
}

impl PowerMode {
    /// Resolve a free-form power mode name, falling back to `fallback` for
    /// empty or unrecognized input. Never fails.
    pub fn normalize(input: &str, fallback: PowerMode) -> PowerMode {
        input.trim().parse().unwrap_or(fallback)
    }
}

/// Spend dimension a cap limits.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Display,
    EnumString,
    EnumIter,
    Serialize,
    Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum CapType {
    /// Spend over the current UTC day.
    Daily,
    /// Spend over the current UTC month.
    Monthly,
    /// Spend attributed to a single build.
    PerBuild,
}

/// What happens when a cap would be exceeded.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Hash,
    Display,
    EnumString,
    Serialize,
    Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum CapAction {
    /// Deny the charge.
    #[default]
    Stop,
    /// Allow the charge and report a warning.
    Warn,
}

/// Lifecycle state of a cap record.
///
/// Storage keeps this as an `is_active` flag plus a nullable `deleted_at`
/// timestamp; in memory the combination is a single state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum CapState {
    Active,
    /// Disabled without being deleted.
    Inactive,
    /// Soft-deleted. Never active again.
    Deleted { at: DateTime<Utc> },
}

/// A spending limit configured by a user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BudgetCap {
    pub id: CapId,
    pub user_id: UserId,
    pub cap_type: CapType,
    /// `None` means the cap is account-wide.
    pub project_id: Option<ProjectId>,
    pub limit_usd: Decimal,
    pub action: CapAction,
    pub state: CapState,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl BudgetCap {
    pub fn is_active(&self) -> bool {
        matches!(self.state, CapState::Active)
    }

    pub fn is_deleted(&self) -> bool {
        matches!(self.state, CapState::Deleted { .. })
    }

    pub fn deleted_at(&self) -> Option<DateTime<Utc>> {
        match self.state {
            CapState::Deleted { at } => Some(at),
            _ => None,
        }
    }

    /// The upsert key this record occupies.
    pub fn key(&self) -> CapKey {
        CapKey {
            user_id: self.user_id,
            cap_type: self.cap_type,
            project_id: self.project_id,
        }
    }

    /// Mark the record deleted at `at`. The row itself is kept.
    pub fn soft_delete(&mut self, at: DateTime<Utc>) {
        self.state = CapState::Deleted { at };
        self.updated_at = at;
    }
}

/// Upsert key: at most one live cap exists per key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CapKey {
    pub user_id: UserId,
    pub cap_type: CapType,
    pub project_id: Option<ProjectId>,
}

/// Values written by an upsert.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CapFields {
    pub limit_usd: Decimal,
    pub action: CapAction,
}

/// Outcome of one admission check. Produced per call, never stored.
///
/// `reason` is present only on denial. `warning_pct` is present only when a
/// warning threshold was crossed on an allowed charge. The cap fields
/// describe the cap that caused the denial or the highest warning.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PreAuthorization {
    pub allowed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cap_type: Option<CapType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit_usd: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_usd: Option<Decimal>,
    /// Headroom left under the cap before this charge, never negative.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remaining_usd: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub warning_pct: Option<Decimal>,
}

/// Where a user stands against one cap.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CapStanding {
    pub cap_type: CapType,
    pub limit_usd: Decimal,
    pub current_usd: Decimal,
    pub remaining_usd: Decimal,
}

impl PreAuthorization {
    /// Allowed with nothing to report.
    pub fn allow() -> Self {
        Self {
            allowed: true,
            ..Self::default()
        }
    }

    /// Allowed, with the highest-severity warning observed.
    pub fn allow_with_warning(warning_pct: Decimal, standing: CapStanding) -> Self {
        Self {
            warning_pct: Some(warning_pct),
            ..Self::with_standing(true, standing)
        }
    }

    /// Denied by a stop cap.
    pub fn deny(reason: String, standing: CapStanding) -> Self {
        Self {
            reason: Some(reason),
            ..Self::with_standing(false, standing)
        }
    }

    fn with_standing(allowed: bool, standing: CapStanding) -> Self {
        Self {
            allowed,
            reason: None,
            cap_type: Some(standing.cap_type),
            limit_usd: Some(standing.limit_usd),
            current_usd: Some(standing.current_usd),
            remaining_usd: Some(standing.remaining_usd),
            warning_pct: None,
        }
    }
}
