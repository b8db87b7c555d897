// SPDX-FileCopyrightText: 2026 Spendgate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types for Spendgate.

use thiserror::Error;

use crate::types::CapId;

/// The error type shared by the pricing engine, the budget enforcer, and
/// every collaborator implementation.
///
/// A denied pre-authorization is *not* an error; it is a successful
/// [`PreAuthorization`](crate::PreAuthorization) with `allowed == false`.
#[derive(Debug, Error)]
pub enum SpendgateError {
    /// A cap mutation was rejected before anything was written.
    #[error("invalid budget cap: {message}")]
    Validation { message: String },

    /// The cap does not exist, is already deleted, or belongs to someone
    /// else. The three cases are indistinguishable on purpose.
    #[error("budget cap {cap_id} not found")]
    CapNotFound { cap_id: CapId },

    /// A cap store or spend tracker call failed. `context` names the
    /// operation or spend dimension that was being resolved.
    #[error("unable to evaluate budget: {context}: {source}")]
    Collaborator {
        context: String,
        source: Box<SpendgateError>,
    },

    /// Storage backend errors raised by collaborator implementations.
    #[error("storage error: {source}")]
    Storage {
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// A collaborator call exceeded the configured lookup timeout.
    #[error("operation timed out after {duration:?}")]
    Timeout { duration: std::time::Duration },
}

impl SpendgateError {
    /// Wrap a collaborator failure with the operation that triggered it.
    pub fn collaborator(context: impl Into<String>, source: SpendgateError) -> Self {
        Self::Collaborator {
            context: context.into(),
            source: Box::new(source),
        }
    }

    /// Returns `true` for errors caused by caller input rather than by
    /// infrastructure (validation and not-found).
    pub fn is_client_error(&self) -> bool {
        matches!(self, Self::Validation { .. } | Self::CapNotFound { .. })
    }
}
