// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Integration tests for the provisioning workflow and status reconstruction.

mod common;

use std::collections::HashSet;

use common::*;
use provisioner_core::error::DbErrorKind;
use provisioner_core::model::{
    ClusterConfig, EMPTY_TERRAFORM_STATE, OperationState, OperationType,
};
use provisioner_core::service::PROVISIONING_STARTED_MESSAGE;

#[tokio::test]
async fn provisioning_persists_the_full_row_graph() {
    let ctx = TestContext::new().await;

    let operation = ctx
        .runtime_service
        .set_provisioning_started("rt-1", gardener_runtime_config())
        .await
        .unwrap();

    assert_eq!(operation.operation_type, OperationType::Provision);
    assert_eq!(operation.state, OperationState::InProgress);
    assert_eq!(operation.message, PROVISIONING_STARTED_MESSAGE);
    assert_eq!(operation.cluster_id, "rt-1");
    assert!(operation.end_timestamp.is_none());

    let status = ctx.runtime_service.get_status("rt-1").await.unwrap();
    assert_eq!(status.last_operation_status, operation);

    let config = &status.runtime_configuration;
    assert_eq!(config.kubeconfig, None);
    assert_eq!(config.credentials_secret_name, "test-credentials");

    let ClusterConfig::Gardener(gardener) = &config.cluster_config else {
        panic!("expected a gardener config");
    };
    assert_eq!(gardener.cluster_id, "rt-1");
    assert_eq!(gardener.name, "test-shoot");
    assert_eq!(gardener.seed, "gcp-eu1");
    assert!(!gardener.id.is_empty());

    // Module order is irrelevant; the set must round-trip.
    let modules: HashSet<_> = config
        .kyma_config
        .modules
        .iter()
        .map(|m| m.module.as_str())
        .collect();
    assert_eq!(modules, HashSet::from(["core", "monitoring"]));
    assert_eq!(config.kyma_config.cluster_id, "rt-1");
    assert_eq!(config.kyma_config.version, "1.5");

    let cluster = ctx.runtime_service.get_cluster_data("rt-1").await.unwrap();
    assert_eq!(cluster.terraform_state, EMPTY_TERRAFORM_STATE);
    assert_eq!(cluster.creation_timestamp, operation.start_timestamp);
}

#[tokio::test]
async fn provisioning_with_gcp_config_returns_the_gcp_variant() {
    let ctx = TestContext::new().await;

    ctx.runtime_service
        .set_provisioning_started("rt-gcp", gcp_runtime_config())
        .await
        .unwrap();

    let status = ctx.runtime_service.get_status("rt-gcp").await.unwrap();
    let ClusterConfig::Gcp(gcp) = &status.runtime_configuration.cluster_config else {
        panic!("expected a gcp config");
    };
    assert_eq!(gcp.cluster_id, "rt-gcp");
    assert_eq!(gcp.zone, "europe-west1-b");
}

#[tokio::test]
async fn failed_provisioning_leaves_no_partial_rows() {
    let ctx = TestContext::new().await;

    // Sabotage the last insert of the workflow so everything before it must
    // be rolled back.
    sqlx::query("DROP TABLE kyma_config_module")
        .execute(ctx.factory.pool())
        .await
        .unwrap();

    let err = ctx
        .runtime_service
        .set_provisioning_started("rt-1", gardener_runtime_config())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), DbErrorKind::Internal);

    let err = ctx.runtime_service.get_cluster_data("rt-1").await.unwrap_err();
    assert!(err.is_not_found());
    let err = ctx.runtime_service.get_last_operation("rt-1").await.unwrap_err();
    assert!(err.is_not_found());
}

#[tokio::test]
async fn provisioning_the_same_runtime_twice_fails_and_keeps_the_first() {
    let ctx = TestContext::new().await;

    let first = ctx
        .runtime_service
        .set_provisioning_started("rt-1", gardener_runtime_config())
        .await
        .unwrap();

    // The primary key constraint resolves the race; the loser sees Internal.
    let err = ctx
        .runtime_service
        .set_provisioning_started("rt-1", gcp_runtime_config())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), DbErrorKind::Internal);

    let status = ctx.runtime_service.get_status("rt-1").await.unwrap();
    assert_eq!(status.last_operation_status, first);
    assert!(matches!(
        status.runtime_configuration.cluster_config,
        ClusterConfig::Gardener(_)
    ));
}

#[tokio::test]
async fn update_stores_kubeconfig_and_terraform_state() {
    let ctx = TestContext::new().await;

    ctx.runtime_service
        .set_provisioning_started("rt-1", gcp_runtime_config())
        .await
        .unwrap();

    ctx.runtime_service
        .update("rt-1", "kubeconfig-content", r#"{"resources":[]}"#)
        .await
        .unwrap();

    let cluster = ctx.runtime_service.get_cluster_data("rt-1").await.unwrap();
    assert_eq!(cluster.kubeconfig.as_deref(), Some("kubeconfig-content"));
    assert_eq!(cluster.terraform_state, r#"{"resources":[]}"#);

    let status = ctx.runtime_service.get_status("rt-1").await.unwrap();
    assert_eq!(
        status.runtime_configuration.kubeconfig.as_deref(),
        Some("kubeconfig-content")
    );
}

#[tokio::test]
async fn update_of_unknown_runtime_is_not_found() {
    let ctx = TestContext::new().await;

    let err = ctx
        .runtime_service
        .update("no-such-runtime", "kubeconfig", "{}")
        .await
        .unwrap_err();
    assert!(err.is_not_found());
}

#[tokio::test]
async fn cleanup_removes_the_whole_aggregate() {
    let ctx = TestContext::new().await;

    ctx.runtime_service
        .set_provisioning_started("rt-1", gardener_runtime_config())
        .await
        .unwrap();
    ctx.runtime_service.cleanup_cluster_data("rt-1").await.unwrap();

    let err = ctx.runtime_service.get_cluster_data("rt-1").await.unwrap_err();
    assert!(err.is_not_found());

    // Operations and configs cascade with the cluster row.
    let err = ctx.runtime_service.get_last_operation("rt-1").await.unwrap_err();
    assert!(err.is_not_found());
    let err = ctx.runtime_service.get_status("rt-1").await.unwrap_err();
    assert!(err.is_not_found());
}

#[tokio::test]
async fn cleanup_of_unknown_runtime_is_not_found() {
    let ctx = TestContext::new().await;

    let err = ctx
        .runtime_service
        .cleanup_cluster_data("no-such-runtime")
        .await
        .unwrap_err();
    assert!(err.is_not_found());
}

#[tokio::test]
async fn status_of_unknown_runtime_is_not_found() {
    let ctx = TestContext::new().await;

    let err = ctx.runtime_service.get_status("no-such-runtime").await.unwrap_err();
    assert!(err.is_not_found());
}
