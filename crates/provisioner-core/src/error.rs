// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Error taxonomy for the persistence boundary.
//!
//! Every session and service method fails with one of exactly two kinds:
//! [`DbError::NotFound`] (the requested aggregate, or the row targeted by an
//! update/delete, does not exist) or [`DbError::Internal`] (everything else:
//! connection failures, constraint violations, failed begin/commit). Callers
//! branch on [`DbError::kind`] instead of matching message strings.

use std::fmt;

/// Result type using DbError.
pub type DbResult<T> = std::result::Result<T, DbError>;

/// Discriminant of a [`DbError`], for callers that only care about the kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DbErrorKind {
    /// The requested row or aggregate does not exist.
    NotFound,
    /// Any lower-level failure: driver errors, constraint violations,
    /// transaction begin/commit/rollback failures.
    Internal,
}

/// Error returned by session and service operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DbError {
    /// The requested aggregate does not exist. Also covers UPDATE/DELETE
    /// statements that matched zero rows, which is deliberately distinguished
    /// from a successful no-op.
    NotFound {
        /// Human-readable context identifying the missing entity.
        context: String,
    },

    /// A lower-level failure occurred.
    Internal {
        /// Human-readable context describing the failure.
        context: String,
    },
}

impl DbError {
    /// Build a NotFound error with the given context.
    pub fn not_found(context: impl Into<String>) -> Self {
        Self::NotFound {
            context: context.into(),
        }
    }

    /// Build an Internal error with the given context.
    pub fn internal(context: impl Into<String>) -> Self {
        Self::Internal {
            context: context.into(),
        }
    }

    /// The kind of this error.
    pub fn kind(&self) -> DbErrorKind {
        match self {
            Self::NotFound { .. } => DbErrorKind::NotFound,
            Self::Internal { .. } => DbErrorKind::Internal,
        }
    }

    /// Whether this is a NotFound error.
    pub fn is_not_found(&self) -> bool {
        self.kind() == DbErrorKind::NotFound
    }

    /// Prepend workflow-level context, preserving the error kind.
    ///
    /// The orchestrator wraps session errors with context about the workflow
    /// that failed but never reclassifies NotFound as Internal or vice versa.
    pub fn append(self, context: &str) -> Self {
        match self {
            Self::NotFound { context: inner } => Self::NotFound {
                context: format!("{context}: {inner}"),
            },
            Self::Internal { context: inner } => Self::Internal {
                context: format!("{context}: {inner}"),
            },
        }
    }
}

impl fmt::Display for DbError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound { context } => write!(f, "not found: {context}"),
            Self::Internal { context } => write!(f, "internal error: {context}"),
        }
    }
}

impl std::error::Error for DbError {}

impl From<sqlx::Error> for DbError {
    fn from(err: sqlx::Error) -> Self {
        DbError::Internal {
            context: err.to_string(),
        }
    }
}
