// SPDX-FileCopyrightText: 2026 Spendgate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Cap persistence trait.

use async_trait::async_trait;

use crate::error::SpendgateError;
use crate::types::{BudgetCap, CapFields, CapId, CapKey, UserId};

/// Owns persisted [`BudgetCap`] records.
///
/// Every write must be a single atomic row operation so that an abandoned
/// call either fully applies or leaves the record untouched.
#[async_trait]
pub trait CapStore: Send + Sync {
    /// Active, non-deleted caps owned by `user`.
    async fn find_active_caps(&self, user: UserId) -> Result<Vec<BudgetCap>, SpendgateError>;

    /// Insert or overwrite the live cap matching `key`.
    ///
    /// Matching ignores deleted rows and treats `project_id` null-safely: an
    /// account-wide key only matches account-wide rows. A matched row gets
    /// `fields` applied and is reactivated. Returns the stored record and
    /// whether it was newly created.
    async fn upsert_cap(
        &self,
        key: &CapKey,
        fields: &CapFields,
    ) -> Result<(BudgetCap, bool), SpendgateError>;

    /// The non-deleted cap with `id` if and only if `user` owns it.
    async fn find_cap_by_id_and_owner(
        &self,
        id: CapId,
        user: UserId,
    ) -> Result<Option<BudgetCap>, SpendgateError>;

    /// Persist every field of an existing record.
    async fn save(&self, cap: &BudgetCap) -> Result<(), SpendgateError>;
}
