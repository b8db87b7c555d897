// SPDX-FileCopyrightText: 2026 Spendgate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! In-memory cap store for deterministic testing.
//!
//! `MockCapStore` implements `CapStore` over a `Vec` of rows and keeps every
//! row it ever wrote, so tests can assert on soft-deleted records too.

use std::sync::atomic::{AtomicBool, AtomicI64, AtomicUsize, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Mutex;

use spendgate_core::traits::caps::CapStore;
use spendgate_core::types::{BudgetCap, CapFields, CapId, CapKey, CapState, UserId};
use spendgate_core::SpendgateError;

/// A cap store backed by an in-memory row list.
///
/// Ids are assigned sequentially from 1. When failing mode is on, every
/// call returns a storage error without touching the rows.
#[derive(Debug, Default)]
pub struct MockCapStore {
    rows: Mutex<Vec<BudgetCap>>,
    next_id: AtomicI64,
    failing: AtomicBool,
    writes: AtomicUsize,
}

impl MockCapStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store pre-loaded with the given rows, as-is.
    ///
    /// Rows may be inactive or deleted; the id counter continues after the
    /// highest seeded id.
    pub fn with_rows(rows: Vec<BudgetCap>) -> Self {
        let max_id = rows.iter().map(|r| r.id.0).max().unwrap_or(0);
        Self {
            rows: Mutex::new(rows),
            next_id: AtomicI64::new(max_id),
            ..Self::default()
        }
    }

    /// Insert a raw row and return its assigned id.
    pub async fn insert(&self, mut cap: BudgetCap) -> CapId {
        cap.id = self.allocate_id();
        let id = cap.id;
        self.rows.lock().await.push(cap);
        id
    }

    /// Snapshot of every row, including inactive and deleted ones.
    pub async fn rows(&self) -> Vec<BudgetCap> {
        self.rows.lock().await.clone()
    }

    /// The row with `id`, regardless of state.
    pub async fn row(&self, id: CapId) -> Option<BudgetCap> {
        self.rows.lock().await.iter().find(|r| r.id == id).cloned()
    }

    /// Toggle failing mode.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Number of upsert and save calls that reached the rows.
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    fn allocate_id(&self) -> CapId {
        CapId(self.next_id.fetch_add(1, Ordering::SeqCst) + 1)
    }

    fn check_failing(&self) -> Result<(), SpendgateError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(SpendgateError::Storage {
                source: Box::new(std::io::Error::other("cap store unavailable")),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl CapStore for MockCapStore {
    async fn find_active_caps(&self, user: UserId) -> Result<Vec<BudgetCap>, SpendgateError> {
        self.check_failing()?;
        Ok(self
            .rows
            .lock()
            .await
            .iter()
            .filter(|r| r.user_id == user && r.is_active())
            .cloned()
            .collect())
    }

    async fn upsert_cap(
        &self,
        key: &CapKey,
        fields: &CapFields,
    ) -> Result<(BudgetCap, bool), SpendgateError> {
        self.check_failing()?;
        let now = Utc::now();
        let mut rows = self.rows.lock().await;
        self.writes.fetch_add(1, Ordering::SeqCst);

        if let Some(row) = rows
            .iter_mut()
            .find(|r| !r.is_deleted() && r.key() == *key)
        {
            row.limit_usd = fields.limit_usd;
            row.action = fields.action;
            row.state = CapState::Active;
            row.updated_at = now;
            return Ok((row.clone(), false));
        }

        let cap = BudgetCap {
            id: self.allocate_id(),
            user_id: key.user_id,
            cap_type: key.cap_type,
            project_id: key.project_id,
            limit_usd: fields.limit_usd,
            action: fields.action,
            state: CapState::Active,
            created_at: now,
            updated_at: now,
        };
        rows.push(cap.clone());
        Ok((cap, true))
    }

    async fn find_cap_by_id_and_owner(
        &self,
        id: CapId,
        user: UserId,
    ) -> Result<Option<BudgetCap>, SpendgateError> {
        self.check_failing()?;
        Ok(self
            .rows
            .lock()
            .await
            .iter()
            .find(|r| r.id == id && r.user_id == user && !r.is_deleted())
            .cloned())
    }

    async fn save(&self, cap: &BudgetCap) -> Result<(), SpendgateError> {
        self.check_failing()?;
        let mut rows = self.rows.lock().await;
        let row = rows
            .iter_mut()
            .find(|r| r.id == cap.id)
            .ok_or_else(|| SpendgateError::Storage {
                source: Box::new(std::io::Error::other(format!("no cap row with id {}", cap.id))),
            })?;
        *row = cap.clone();
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
