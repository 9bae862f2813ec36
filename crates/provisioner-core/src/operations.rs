// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Operation-completion surface used by the actuator loop.
//!
//! Terminal transitions are idempotent for the same target only: marking an
//! already-Succeeded operation as succeeded returns the stored row
//! unchanged, while flipping between Succeeded and Failed is an Internal
//! error. At the store level only rows still in progress match the update,
//! so terminal states are monotonic even when two actuators race.

use std::sync::Arc;

use chrono::Utc;
use tracing::info;

use crate::error::DbError;
use crate::model::{Operation, OperationState};
use crate::session::SessionFactory;

/// Message stored when an operation succeeds.
pub const OPERATION_SUCCEEDED_MESSAGE: &str = "Operation succeeded.";

/// Lookup and terminal-transition service for operations.
#[derive(Clone)]
pub struct OperationService {
    factory: Arc<dyn SessionFactory>,
}

impl OperationService {
    /// Create a service over the given session factory.
    pub fn new(factory: Arc<dyn SessionFactory>) -> Self {
        Self { factory }
    }

    /// Fetch one operation by ID.
    pub async fn get(&self, operation_id: &str) -> Result<Operation, DbError> {
        self.factory
            .new_read_session()
            .get_operation(operation_id)
            .await
            .map_err(|e| e.append("failed to get operation"))
    }

    /// Mark an operation as succeeded with the fixed success message.
    pub async fn set_as_succeeded(&self, operation_id: &str) -> Result<Operation, DbError> {
        self.transition(operation_id, OperationState::Succeeded, OPERATION_SUCCEEDED_MESSAGE)
            .await
            .map_err(|e| e.append("failed to set operation as succeeded"))
    }

    /// Mark an operation as failed with the caller-supplied message.
    pub async fn set_as_failed(
        &self,
        operation_id: &str,
        message: &str,
    ) -> Result<Operation, DbError> {
        self.transition(operation_id, OperationState::Failed, message)
            .await
            .map_err(|e| e.append("failed to set operation as failed"))
    }

    async fn transition(
        &self,
        operation_id: &str,
        target: OperationState,
        message: &str,
    ) -> Result<Operation, DbError> {
        let read = self.factory.new_read_session();

        let operation = read.get_operation(operation_id).await?;
        if let Some(resolved) = Self::resolve_terminal(&operation, target)? {
            return Ok(resolved);
        }

        let mut write = self.factory.new_write_session();
        let result = write
            .update_operation_state(operation_id, message, target, Some(Utc::now()))
            .await;

        if let Err(e) = result {
            // A concurrent actuator may have won the race to the terminal
            // state between our read and write. Re-read and apply the same
            // policy; anything else propagates.
            if !e.is_not_found() {
                return Err(e);
            }
            let operation = read.get_operation(operation_id).await?;
            return match Self::resolve_terminal(&operation, target)? {
                Some(resolved) => Ok(resolved),
                None => Err(e),
            };
        }

        info!(
            operation_id = %operation_id,
            state = %target,
            "operation reached terminal state"
        );
        read.get_operation(operation_id).await
    }

    /// Apply the terminal-transition policy to an already-read operation:
    /// same target is idempotent, conflicting terminal state is an error,
    /// in-progress means proceed.
    fn resolve_terminal(
        operation: &Operation,
        target: OperationState,
    ) -> Result<Option<Operation>, DbError> {
        if operation.state == target {
            return Ok(Some(operation.clone()));
        }
        if operation.state.is_terminal() {
            return Err(DbError::internal(format!(
                "operation '{}' is already {}, cannot transition to {}",
                operation.id, operation.state, target
            )));
        }
        Ok(None)
    }
}
