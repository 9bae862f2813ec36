// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! One-shot corrective rewrite for operations stuck with a legacy message.
//!
//! An earlier release recorded provisioning operations with a message that
//! later tooling treats as a distinct, dead processing stage. This helper
//! rewrites those rows to the current message. It is a data migration, not
//! part of the steady-state workflow: run it once at deploy time. Running it
//! again is a no-op because no row carries the legacy message anymore.

use std::time::Duration;

use tokio::time::sleep;
use tracing::{info, warn};

use crate::error::DbError;
use crate::model::OperationState;
use crate::service::PROVISIONING_STARTED_MESSAGE;
use crate::session::SessionFactory;

/// Message written by the legacy release that left operations stuck.
pub const LEGACY_STUCK_MESSAGE: &str = "Waiting for installation";

/// Per-row write attempts before giving up on the whole run.
const MAX_ATTEMPTS: u32 = 5;

/// Delay between attempts on the same row.
const RETRY_DELAY: Duration = Duration::from_millis(200);

/// Rewrite every in-progress operation still carrying the legacy message.
///
/// Returns the number of rows rewritten. Rows that reach a terminal state
/// while the run is in flight are skipped; each remaining row is retried up
/// to a bounded number of attempts before the run fails.
pub async fn repair_stuck_operations(factory: &dyn SessionFactory) -> Result<usize, DbError> {
    let read = factory.new_read_session();

    let stuck: Vec<_> = read
        .list_in_progress_operations()
        .await
        .map_err(|e| e.append("failed to repair stuck operations"))?
        .into_iter()
        .filter(|op| op.message == LEGACY_STUCK_MESSAGE)
        .collect();

    if stuck.is_empty() {
        info!("no stuck operations found, nothing to repair");
        return Ok(0);
    }

    info!(count = stuck.len(), "repairing stuck operations");

    let mut write = factory.new_write_session();
    let mut repaired = 0;

    for operation in &stuck {
        let mut attempt = 1;
        loop {
            let result = write
                .update_operation_state(
                    &operation.id,
                    PROVISIONING_STARTED_MESSAGE,
                    OperationState::InProgress,
                    None,
                )
                .await;

            match result {
                Ok(()) => {
                    repaired += 1;
                    break;
                }
                // The operation reached a terminal state since we listed it.
                Err(e) if e.is_not_found() => {
                    info!(operation_id = %operation.id, "operation no longer in progress, skipping");
                    break;
                }
                Err(e) if attempt < MAX_ATTEMPTS => {
                    warn!(
                        operation_id = %operation.id,
                        attempt = attempt,
                        error = %e,
                        "repair write failed, retrying"
                    );
                    attempt += 1;
                    sleep(RETRY_DELAY).await;
                }
                Err(e) => {
                    return Err(e.append(&format!(
                        "failed to repair operation '{}' after {MAX_ATTEMPTS} attempts",
                        operation.id
                    )));
                }
            }
        }
    }

    info!(repaired = repaired, "stuck operation repair finished");
    Ok(repaired)
}
