// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Domain model for clusters, backend configurations, and operations.
//!
//! One [`Cluster`] row exists per runtime, joined by `cluster_id` to exactly
//! one backend configuration ([`GardenerConfig`] or [`GcpConfig`]), one
//! [`KymaConfig`] with its modules, and one [`Operation`] row per lifecycle
//! event. The backend variant is a tagged enum at this boundary and a
//! `provider` discriminator column in the store.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::DbError;

/// Serialized empty-object literal used to initialize `terraform_state`.
pub const EMPTY_TERRAFORM_STATE: &str = "{}";

/// One managed runtime. The `id` (runtime ID) is the join key for every
/// other entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cluster {
    /// Runtime identifier.
    pub id: String,
    /// When the provisioning transaction created this row.
    pub creation_timestamp: DateTime<Utc>,
    /// Opaque serialized infrastructure state blob, `{}` until the actuator
    /// reports progress.
    pub terraform_state: String,
    /// Kubeconfig for the cluster, set once provisioning succeeds.
    pub kubeconfig: Option<String>,
    /// Reference to an externally owned credentials secret.
    pub credentials_secret_name: String,
    /// Which backend configuration variant this cluster uses.
    pub provider: ProviderKind,
}

/// Infrastructure provider discriminator stored on the cluster row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProviderKind {
    /// Gardener-managed cluster.
    Gardener,
    /// Plain GCP cluster.
    Gcp,
}

impl ProviderKind {
    /// Storage representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Gardener => "gardener",
            Self::Gcp => "gcp",
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderKind {
    type Err = DbError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "gardener" => Ok(Self::Gardener),
            "gcp" => Ok(Self::Gcp),
            other => Err(DbError::internal(format!(
                "unknown provider kind '{other}' in store"
            ))),
        }
    }
}

/// Gardener backend configuration. Created once per cluster, immutable
/// thereafter; re-provisioning implies a new cluster.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct GardenerConfig {
    /// Config row identifier.
    pub id: String,
    /// Owning cluster (runtime ID).
    pub cluster_id: String,
    /// Shoot cluster name.
    pub name: String,
    /// Gardener project name.
    pub project_name: String,
    /// Kubernetes version to install.
    pub kubernetes_version: String,
    /// Number of worker nodes.
    pub node_count: i32,
    /// Worker volume size in GB.
    pub volume_size_gb: i32,
    /// Disk type for worker volumes.
    pub disk_type: String,
    /// Worker machine type.
    pub machine_type: String,
    /// Target infrastructure provider (e.g. "GCP", "AWS", "Azure").
    pub provider: String,
    /// Gardener seed the shoot is scheduled onto.
    pub seed: String,
    /// Secret with target-provider credentials.
    pub target_secret: String,
    /// CIDR for worker nodes.
    pub worker_cidr: String,
    /// Target region.
    pub region: String,
    /// Autoscaler lower bound.
    pub auto_scaler_min: i32,
    /// Autoscaler upper bound.
    pub auto_scaler_max: i32,
    /// Maximum surge during rolling updates.
    pub max_surge: i32,
    /// Maximum unavailable nodes during rolling updates.
    pub max_unavailable: i32,
    /// Serialized provider-specific payload (JSON), opaque to this core.
    pub provider_specific_config: String,
}

/// Plain GCP backend configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct GcpConfig {
    /// Config row identifier.
    pub id: String,
    /// Owning cluster (runtime ID).
    pub cluster_id: String,
    /// Cluster name.
    pub name: String,
    /// GCP project name.
    pub project_name: String,
    /// Kubernetes version to install.
    pub kubernetes_version: String,
    /// Number of nodes.
    pub number_of_nodes: i32,
    /// Boot disk size in GB.
    pub boot_disk_size_gb: i32,
    /// Machine type.
    pub machine_type: String,
    /// Target region.
    pub region: String,
    /// Target zone.
    pub zone: String,
}

/// Backend configuration, exactly one variant per cluster.
///
/// The variant is chosen by the caller's input, never inferred from stored
/// data; the store carries a matching `provider` discriminator so reads are
/// a single keyed lookup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ClusterConfig {
    /// Gardener-managed cluster configuration.
    Gardener(GardenerConfig),
    /// Plain GCP cluster configuration.
    Gcp(GcpConfig),
}

impl ClusterConfig {
    /// Discriminator for this variant.
    pub fn provider(&self) -> ProviderKind {
        match self {
            Self::Gardener(_) => ProviderKind::Gardener,
            Self::Gcp(_) => ProviderKind::Gcp,
        }
    }
}

/// Kyma/add-on configuration, created atomically with its cluster.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KymaConfig {
    /// Config row identifier.
    pub id: String,
    /// Kyma version to install.
    pub version: String,
    /// Owning cluster (runtime ID).
    pub cluster_id: String,
    /// Modules to install. Order is irrelevant.
    pub modules: Vec<KymaConfigModule>,
}

/// One module entry of a [`KymaConfig`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KymaConfigModule {
    /// Module row identifier.
    pub id: String,
    /// Module name (e.g. "core", "monitoring").
    pub module: String,
    /// Owning Kyma config.
    pub kyma_config_id: String,
}

/// Lifecycle event type of an [`Operation`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OperationType {
    /// Initial cluster bring-up.
    Provision,
    /// Version or configuration upgrade.
    Upgrade,
    /// Cluster tear-down.
    Deprovision,
}

impl OperationType {
    /// Storage representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Provision => "provision",
            Self::Upgrade => "upgrade",
            Self::Deprovision => "deprovision",
        }
    }
}

impl fmt::Display for OperationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OperationType {
    type Err = DbError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "provision" => Ok(Self::Provision),
            "upgrade" => Ok(Self::Upgrade),
            "deprovision" => Ok(Self::Deprovision),
            other => Err(DbError::internal(format!(
                "unknown operation type '{other}' in store"
            ))),
        }
    }
}

/// State of an [`Operation`].
///
/// `InProgress` is the initial state, set exactly once at operation
/// creation. `Succeeded` and `Failed` are terminal; no transition is
/// defined out of a terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OperationState {
    /// The actuator is still driving this operation.
    InProgress,
    /// Terminal success.
    Succeeded,
    /// Terminal failure.
    Failed,
}

impl OperationState {
    /// Storage representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InProgress => "in_progress",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
        }
    }

    /// Whether this state admits no further transitions.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed)
    }
}

impl fmt::Display for OperationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OperationState {
    type Err = DbError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "in_progress" => Ok(Self::InProgress),
            "succeeded" => Ok(Self::Succeeded),
            "failed" => Ok(Self::Failed),
            other => Err(DbError::internal(format!(
                "unknown operation state '{other}' in store"
            ))),
        }
    }
}

/// One lifecycle event of a cluster. Multiple operations may exist per
/// cluster over its lifetime; "the last operation" is derived from the
/// maximum `start_timestamp` (ties broken by `id`), never stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Operation {
    /// Operation identifier.
    pub id: String,
    /// Lifecycle event type.
    pub operation_type: OperationType,
    /// Current state.
    pub state: OperationState,
    /// Human-readable status text, overwritten on terminal transition.
    pub message: String,
    /// When the operation was recorded.
    pub start_timestamp: DateTime<Utc>,
    /// Set on terminal transition.
    pub end_timestamp: Option<DateTime<Utc>>,
    /// Owning cluster (runtime ID).
    pub cluster_id: String,
}

/// Desired configuration for a new runtime, carried into
/// `set_provisioning_started`. Exactly one backend variant is present.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuntimeConfig {
    /// Backend configuration variant to provision with.
    pub cluster_config: ClusterConfig,
    /// Kyma/add-on configuration to install.
    pub kyma_config: KymaConfig,
    /// Reference to the externally owned credentials secret.
    pub credentials_secret_name: String,
}

/// Stored configuration of a runtime, reassembled on status reads.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuntimeConfiguration {
    /// Backend configuration variant.
    pub cluster_config: ClusterConfig,
    /// Kyma/add-on configuration.
    pub kyma_config: KymaConfig,
    /// Kubeconfig, if provisioning has succeeded.
    pub kubeconfig: Option<String>,
    /// Reference to the externally owned credentials secret.
    pub credentials_secret_name: String,
}

/// Authoritative runtime status, reconstructed from partial, polymorphic
/// data by fanning out to several independent sub-queries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuntimeStatus {
    /// The operation with the latest start timestamp.
    pub last_operation_status: Operation,
    /// The stored configuration of the runtime.
    pub runtime_configuration: RuntimeConfiguration,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn operation_state_round_trips_through_storage_form() {
        for state in [
            OperationState::InProgress,
            OperationState::Succeeded,
            OperationState::Failed,
        ] {
            assert_eq!(state.as_str().parse::<OperationState>().unwrap(), state);
        }
        assert!("bogus".parse::<OperationState>().is_err());
    }

    #[test]
    fn operation_type_round_trips_through_storage_form() {
        for op_type in [
            OperationType::Provision,
            OperationType::Upgrade,
            OperationType::Deprovision,
        ] {
            assert_eq!(op_type.as_str().parse::<OperationType>().unwrap(), op_type);
        }
        assert!("bogus".parse::<OperationType>().is_err());
    }

    #[test]
    fn terminal_states() {
        assert!(!OperationState::InProgress.is_terminal());
        assert!(OperationState::Succeeded.is_terminal());
        assert!(OperationState::Failed.is_terminal());
    }

    #[test]
    fn cluster_config_discriminator_matches_variant() {
        let gcp = ClusterConfig::Gcp(GcpConfig {
            id: String::new(),
            cluster_id: String::new(),
            name: "name".into(),
            project_name: "project".into(),
            kubernetes_version: "1.16".into(),
            number_of_nodes: 3,
            boot_disk_size_gb: 30,
            machine_type: "n1-standard-4".into(),
            region: "europe-west1".into(),
            zone: "europe-west1-b".into(),
        });
        assert_eq!(gcp.provider(), ProviderKind::Gcp);
        assert_eq!(ProviderKind::Gcp.as_str().parse::<ProviderKind>().unwrap(), ProviderKind::Gcp);
    }

    #[test]
    fn cluster_config_serde_round_trip_keeps_the_variant() {
        let config = ClusterConfig::Gcp(GcpConfig {
            id: "cfg-1".into(),
            cluster_id: "rt-1".into(),
            name: "name".into(),
            project_name: "project".into(),
            kubernetes_version: "1.16".into(),
            number_of_nodes: 3,
            boot_disk_size_gb: 30,
            machine_type: "n1-standard-4".into(),
            region: "europe-west1".into(),
            zone: "europe-west1-b".into(),
        });

        let json = serde_json::to_string(&config).unwrap();
        let back: ClusterConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back, config);
        assert_eq!(back.provider(), ProviderKind::Gcp);
    }
}
