// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Runtime persistence service, the workflow layer over sessions.
//!
//! [`RuntimeService`] owns no state beyond a [`SessionFactory`] and an ID
//! generator; every call opens request-scoped sessions and discards them.
//! The only multi-statement workflow is [`RuntimeService::set_provisioning_started`],
//! which inserts the whole cluster row graph inside one transaction.

use std::sync::Arc;

use chrono::Utc;
use tracing::{error, info};

use crate::error::DbError;
use crate::model::{
    Cluster, ClusterConfig, EMPTY_TERRAFORM_STATE, Operation, OperationState, OperationType,
    RuntimeConfig, RuntimeConfiguration, RuntimeStatus,
};
use crate::session::{SessionFactory, TransactionalWriteSession};
use crate::uuid::UuidGenerator;

/// Message stored on a freshly created provisioning operation.
pub const PROVISIONING_STARTED_MESSAGE: &str = "Provisioning started";
/// Message stored on a freshly created deprovisioning operation.
pub const DEPROVISIONING_STARTED_MESSAGE: &str = "Deprovisioning started";
/// Message stored on a freshly created upgrade operation.
pub const UPGRADE_STARTED_MESSAGE: &str = "Upgrade started";

/// Persistence-backed runtime lifecycle service.
#[derive(Clone)]
pub struct RuntimeService {
    factory: Arc<dyn SessionFactory>,
    ids: Arc<dyn UuidGenerator>,
}

impl RuntimeService {
    /// Create a service over the given session factory and ID generator.
    pub fn new(factory: Arc<dyn SessionFactory>, ids: Arc<dyn UuidGenerator>) -> Self {
        Self { factory, ids }
    }

    /// Reconstruct the authoritative status of a runtime.
    ///
    /// Fans out to the last operation, backend config, Kyma config, and
    /// cluster row. The first failing sub-read aborts the whole call; the
    /// result is never partially populated.
    pub async fn get_status(&self, runtime_id: &str) -> Result<RuntimeStatus, DbError> {
        let session = self.factory.new_read_session();

        let last_operation = session
            .get_last_operation(runtime_id)
            .await
            .map_err(|e| e.append("failed to get status"))?;
        let cluster_config = session
            .get_cluster_config(runtime_id)
            .await
            .map_err(|e| e.append("failed to get status"))?;
        let kyma_config = session
            .get_kyma_config(runtime_id)
            .await
            .map_err(|e| e.append("failed to get status"))?;
        let cluster = session
            .get_cluster(runtime_id)
            .await
            .map_err(|e| e.append("failed to get status"))?;

        Ok(RuntimeStatus {
            last_operation_status: last_operation,
            runtime_configuration: RuntimeConfiguration {
                cluster_config,
                kyma_config,
                kubeconfig: cluster.kubeconfig,
                credentials_secret_name: cluster.credentials_secret_name,
            },
        })
    }

    /// Record the start of provisioning: cluster row, exactly one backend
    /// config, Kyma config with modules, and the Provision operation, all in
    /// one transaction.
    ///
    /// Any failure rolls the transaction back; the caller observes either
    /// the fully formed row graph or nothing at all.
    pub async fn set_provisioning_started(
        &self,
        runtime_id: &str,
        config: RuntimeConfig,
    ) -> Result<Operation, DbError> {
        let mut session = self
            .factory
            .new_session_within_transaction()
            .await
            .map_err(|e| e.append("failed to set provisioning started"))?;

        match self
            .insert_provisioning_graph(session.as_mut(), runtime_id, config)
            .await
        {
            Ok(operation) => {
                session
                    .commit()
                    .await
                    .map_err(|e| e.append("failed to set provisioning started"))?;
                info!(
                    runtime_id = %runtime_id,
                    operation_id = %operation.id,
                    "provisioning started"
                );
                Ok(operation)
            }
            Err(e) => {
                session.rollback_unless_committed().await;
                error!(runtime_id = %runtime_id, error = %e, "provisioning start rolled back");
                Err(e.append("failed to set provisioning started"))
            }
        }
    }

    async fn insert_provisioning_graph(
        &self,
        session: &mut dyn TransactionalWriteSession,
        runtime_id: &str,
        config: RuntimeConfig,
    ) -> Result<Operation, DbError> {
        let now = Utc::now();

        let cluster = Cluster {
            id: runtime_id.to_string(),
            creation_timestamp: now,
            terraform_state: EMPTY_TERRAFORM_STATE.to_string(),
            kubeconfig: None,
            credentials_secret_name: config.credentials_secret_name,
            provider: config.cluster_config.provider(),
        };
        session.insert_cluster(&cluster).await?;

        match config.cluster_config {
            ClusterConfig::Gardener(mut gardener) => {
                gardener.id = self.ids.new_uuid();
                gardener.cluster_id = runtime_id.to_string();
                session.insert_gardener_config(&gardener).await?;
            }
            ClusterConfig::Gcp(mut gcp) => {
                gcp.id = self.ids.new_uuid();
                gcp.cluster_id = runtime_id.to_string();
                session.insert_gcp_config(&gcp).await?;
            }
        }

        let mut kyma = config.kyma_config;
        kyma.id = self.ids.new_uuid();
        kyma.cluster_id = runtime_id.to_string();
        for module in &mut kyma.modules {
            module.id = self.ids.new_uuid();
            module.kyma_config_id = kyma.id.clone();
        }
        session.insert_kyma_config(&kyma).await?;

        let operation = Operation {
            id: self.ids.new_uuid(),
            operation_type: OperationType::Provision,
            state: OperationState::InProgress,
            message: PROVISIONING_STARTED_MESSAGE.to_string(),
            start_timestamp: now,
            end_timestamp: None,
            cluster_id: runtime_id.to_string(),
        };
        session.insert_operation(&operation).await?;

        Ok(operation)
    }

    /// Record the start of deprovisioning. A single-row insert, no
    /// transaction needed.
    pub async fn set_deprovisioning_started(
        &self,
        runtime_id: &str,
    ) -> Result<Operation, DbError> {
        self.start_operation(
            runtime_id,
            OperationType::Deprovision,
            DEPROVISIONING_STARTED_MESSAGE,
        )
        .await
        .map_err(|e| e.append("failed to set deprovisioning started"))
    }

    /// Record the start of an upgrade. A single-row insert, no transaction
    /// needed.
    pub async fn set_upgrade_started(&self, runtime_id: &str) -> Result<Operation, DbError> {
        self.start_operation(runtime_id, OperationType::Upgrade, UPGRADE_STARTED_MESSAGE)
            .await
            .map_err(|e| e.append("failed to set upgrade started"))
    }

    async fn start_operation(
        &self,
        runtime_id: &str,
        operation_type: OperationType,
        message: &str,
    ) -> Result<Operation, DbError> {
        let operation = Operation {
            id: self.ids.new_uuid(),
            operation_type,
            state: OperationState::InProgress,
            message: message.to_string(),
            start_timestamp: Utc::now(),
            end_timestamp: None,
            cluster_id: runtime_id.to_string(),
        };

        let mut session = self.factory.new_write_session();
        session.insert_operation(&operation).await?;

        info!(
            runtime_id = %runtime_id,
            operation_id = %operation.id,
            operation_type = %operation_type,
            "operation started"
        );
        Ok(operation)
    }

    /// The operation with the latest start timestamp for a runtime.
    pub async fn get_last_operation(&self, runtime_id: &str) -> Result<Operation, DbError> {
        self.factory
            .new_read_session()
            .get_last_operation(runtime_id)
            .await
            .map_err(|e| e.append("failed to get last operation"))
    }

    /// Store the kubeconfig and terraform state reported by the actuator.
    pub async fn update(
        &self,
        runtime_id: &str,
        kubeconfig: &str,
        terraform_state: &str,
    ) -> Result<(), DbError> {
        self.factory
            .new_write_session()
            .update_cluster(runtime_id, kubeconfig, terraform_state)
            .await
            .map_err(|e| e.append("failed to update cluster data"))
    }

    /// Delete the cluster row and, via cascading foreign keys, its whole
    /// aggregate.
    pub async fn cleanup_cluster_data(&self, runtime_id: &str) -> Result<(), DbError> {
        self.factory
            .new_write_session()
            .delete_cluster(runtime_id)
            .await
            .map_err(|e| e.append("failed to clean up cluster data"))?;

        info!(runtime_id = %runtime_id, "cluster data removed");
        Ok(())
    }

    /// The stored cluster row for a runtime.
    pub async fn get_cluster_data(&self, runtime_id: &str) -> Result<Cluster, DbError> {
        self.factory
            .new_read_session()
            .get_cluster(runtime_id)
            .await
            .map_err(|e| e.append("failed to get cluster data"))
    }
}
