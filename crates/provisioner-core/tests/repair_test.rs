// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Integration tests for the stuck-operation repair helper.

mod common;

use common::*;
use provisioner_core::model::{Operation, OperationState, OperationType};
use provisioner_core::repair::{LEGACY_STUCK_MESSAGE, repair_stuck_operations};
use provisioner_core::service::PROVISIONING_STARTED_MESSAGE;
use provisioner_core::session::SessionFactory;

async fn insert_stuck_operation(ctx: &TestContext, id: &str, cluster_id: &str) {
    let mut session = ctx.factory.new_write_session();
    session
        .insert_operation(&Operation {
            id: id.to_string(),
            operation_type: OperationType::Provision,
            state: OperationState::InProgress,
            message: LEGACY_STUCK_MESSAGE.to_string(),
            start_timestamp: chrono::Utc::now(),
            end_timestamp: None,
            cluster_id: cluster_id.to_string(),
        })
        .await
        .unwrap();
}

#[tokio::test]
async fn repair_rewrites_stuck_operations_and_is_idempotent() {
    let ctx = TestContext::new().await;

    ctx.runtime_service
        .set_provisioning_started("rt-1", gcp_runtime_config())
        .await
        .unwrap();
    insert_stuck_operation(&ctx, "stuck-op", "rt-1").await;

    let repaired = repair_stuck_operations(ctx.factory.as_ref()).await.unwrap();
    assert_eq!(repaired, 1);

    let operation = ctx.operation_service.get("stuck-op").await.unwrap();
    assert_eq!(operation.message, PROVISIONING_STARTED_MESSAGE);
    assert_eq!(operation.state, OperationState::InProgress);
    assert!(operation.end_timestamp.is_none());

    // Second run finds nothing left to rewrite.
    let repaired = repair_stuck_operations(ctx.factory.as_ref()).await.unwrap();
    assert_eq!(repaired, 0);
}

#[tokio::test]
async fn repair_leaves_healthy_and_terminal_operations_alone() {
    let ctx = TestContext::new().await;

    let healthy = ctx
        .runtime_service
        .set_provisioning_started("rt-1", gardener_runtime_config())
        .await
        .unwrap();

    // A terminal operation carrying the legacy message must not be touched.
    insert_stuck_operation(&ctx, "old-terminal", "rt-1").await;
    ctx.operation_service
        .set_as_failed("old-terminal", "cluster never came up")
        .await
        .unwrap();

    let repaired = repair_stuck_operations(ctx.factory.as_ref()).await.unwrap();
    assert_eq!(repaired, 0);

    let untouched = ctx.operation_service.get(&healthy.id).await.unwrap();
    assert_eq!(untouched.message, healthy.message);

    let terminal = ctx.operation_service.get("old-terminal").await.unwrap();
    assert_eq!(terminal.state, OperationState::Failed);
    assert_eq!(terminal.message, "cluster never came up");
}
