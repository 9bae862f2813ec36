// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Common test infrastructure for provisioner-core integration tests.
//!
//! Provides a TestContext over a tempfile-backed SQLite database so the
//! tests run without external services. PostgreSQL coverage lives in the
//! smoke test gated on TEST_DATABASE_URL.

#![allow(dead_code)]

use std::sync::Arc;

use tempfile::TempDir;

use provisioner_core::model::{
    ClusterConfig, GardenerConfig, GcpConfig, KymaConfig, KymaConfigModule, RuntimeConfig,
};
use provisioner_core::operations::OperationService;
use provisioner_core::service::RuntimeService;
use provisioner_core::session::SqliteSessionFactory;
use provisioner_core::uuid::RandomUuidGenerator;

/// Test context over a fresh, migrated SQLite database.
pub struct TestContext {
    // Held so the database file outlives the pool.
    _dir: TempDir,
    pub factory: Arc<SqliteSessionFactory>,
    pub runtime_service: RuntimeService,
    pub operation_service: OperationService,
}

impl TestContext {
    /// Create a new test context with its own database file.
    pub async fn new() -> Self {
        // Honors RUST_LOG when debugging a failing test; ignores the error
        // when another test already installed a subscriber.
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .try_init();

        let dir = tempfile::tempdir().expect("failed to create temp dir");
        let factory = Arc::new(
            SqliteSessionFactory::from_path(dir.path().join("provisioner.db"))
                .await
                .expect("failed to initialize sqlite database"),
        );

        let runtime_service = RuntimeService::new(factory.clone(), Arc::new(RandomUuidGenerator));
        let operation_service = OperationService::new(factory.clone());

        Self {
            _dir: dir,
            factory,
            runtime_service,
            operation_service,
        }
    }
}

/// A provisioning input with a Gardener backend config.
pub fn gardener_runtime_config() -> RuntimeConfig {
    RuntimeConfig {
        cluster_config: ClusterConfig::Gardener(GardenerConfig {
            id: String::new(),
            cluster_id: String::new(),
            name: "test-shoot".to_string(),
            project_name: "test-project".to_string(),
            kubernetes_version: "1.16".to_string(),
            node_count: 3,
            volume_size_gb: 50,
            disk_type: "standard".to_string(),
            machine_type: "n1-standard-4".to_string(),
            provider: "GCP".to_string(),
            seed: "gcp-eu1".to_string(),
            target_secret: "test-secret".to_string(),
            worker_cidr: "10.250.0.0/19".to_string(),
            region: "europe-west1".to_string(),
            auto_scaler_min: 1,
            auto_scaler_max: 5,
            max_surge: 1,
            max_unavailable: 2,
            provider_specific_config: r#"{"zone":"europe-west1-b"}"#.to_string(),
        }),
        kyma_config: kyma_config(),
        credentials_secret_name: "test-credentials".to_string(),
    }
}

/// A provisioning input with a GCP backend config.
pub fn gcp_runtime_config() -> RuntimeConfig {
    RuntimeConfig {
        cluster_config: ClusterConfig::Gcp(GcpConfig {
            id: String::new(),
            cluster_id: String::new(),
            name: "test-cluster".to_string(),
            project_name: "test-project".to_string(),
            kubernetes_version: "1.16".to_string(),
            number_of_nodes: 3,
            boot_disk_size_gb: 30,
            machine_type: "n1-standard-4".to_string(),
            region: "europe-west1".to_string(),
            zone: "europe-west1-b".to_string(),
        }),
        kyma_config: kyma_config(),
        credentials_secret_name: "test-credentials".to_string(),
    }
}

fn kyma_config() -> KymaConfig {
    KymaConfig {
        id: String::new(),
        version: "1.5".to_string(),
        cluster_id: String::new(),
        modules: vec![
            KymaConfigModule {
                id: String::new(),
                module: "core".to_string(),
                kyma_config_id: String::new(),
            },
            KymaConfigModule {
                id: String::new(),
                module: "monitoring".to_string(),
                kyma_config_id: String::new(),
            },
        ],
    }
}

/// Helper macro to skip tests if TEST_DATABASE_URL is not set.
#[macro_export]
macro_rules! skip_if_no_db {
    () => {
        if std::env::var("TEST_DATABASE_URL").is_err() {
            eprintln!("Skipping test: TEST_DATABASE_URL not set");
            return;
        }
    };
}
