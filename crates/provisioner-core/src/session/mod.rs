//! Database sessions and the factory that creates them.
//!
//! A session is a request-scoped object wrapping either a connection pool or
//! one open transaction. Read sessions are stateless query objects; write
//! sessions expose single-statement insert/update/delete primitives; the
//! transactional write session binds every primitive to one open transaction
//! that must be explicitly committed or rolled back.
//!
//! Both backends implement the same traits: [`postgres`] for production and
//! [`sqlite`] for embedded use and tests.

pub mod postgres;
pub mod sqlite;

pub use self::postgres::PostgresSessionFactory;
pub use self::sqlite::SqliteSessionFactory;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::DbError;
use crate::model::{
    Cluster, ClusterConfig, GardenerConfig, GcpConfig, KymaConfig, KymaConfigModule, Operation,
    OperationState,
};

/// Stateless read-only session.
///
/// Every method fails with NotFound when the queried aggregate does not
/// exist and Internal on any lower-level failure.
#[async_trait]
pub trait ReadSession: Send + Sync {
    /// Fetch the cluster row for a runtime.
    async fn get_cluster(&self, runtime_id: &str) -> Result<Cluster, DbError>;

    /// Fetch the backend configuration for a runtime. The `provider`
    /// discriminator on the cluster row selects which config table is
    /// joined, so exactly one variant is ever returned.
    async fn get_cluster_config(&self, runtime_id: &str) -> Result<ClusterConfig, DbError>;

    /// Fetch the Kyma configuration for a runtime, reconstructing the
    /// module list from the flattened join rows. Zero joined rows is
    /// NotFound.
    async fn get_kyma_config(&self, runtime_id: &str) -> Result<KymaConfig, DbError>;

    /// Fetch one operation by ID.
    async fn get_operation(&self, operation_id: &str) -> Result<Operation, DbError>;

    /// Fetch the operation with the maximum start timestamp for a runtime.
    /// Ties are broken by descending ID so repeated calls are
    /// deterministic. NotFound if the cluster has no operations.
    async fn get_last_operation(&self, runtime_id: &str) -> Result<Operation, DbError>;

    /// List every operation still in progress, across all clusters.
    async fn list_in_progress_operations(&self) -> Result<Vec<Operation>, DbError>;
}

/// Write session. Each method wraps one INSERT/UPDATE/DELETE against either
/// the plain connection or, for a transactional session, the open
/// transaction.
#[async_trait]
pub trait WriteSession: Send {
    /// Insert a cluster row.
    async fn insert_cluster(&mut self, cluster: &Cluster) -> Result<(), DbError>;

    /// Insert a Gardener backend config row.
    async fn insert_gardener_config(&mut self, config: &GardenerConfig) -> Result<(), DbError>;

    /// Insert a GCP backend config row.
    async fn insert_gcp_config(&mut self, config: &GcpConfig) -> Result<(), DbError>;

    /// Insert a Kyma config row and, as a sub-step, every one of its
    /// modules. If any module insert fails the whole call fails; callers
    /// rely on this for all-or-nothing semantics even before the outer
    /// transaction commits.
    async fn insert_kyma_config(&mut self, config: &KymaConfig) -> Result<(), DbError>;

    /// Insert an operation row.
    async fn insert_operation(&mut self, operation: &Operation) -> Result<(), DbError>;

    /// Overwrite state and message of an operation that is still in
    /// progress. Matching zero rows (unknown ID, or the operation already
    /// reached a terminal state) fails with NotFound rather than silently
    /// succeeding, which also makes terminal states monotonic under races.
    async fn update_operation_state(
        &mut self,
        operation_id: &str,
        message: &str,
        state: OperationState,
        end_timestamp: Option<DateTime<Utc>>,
    ) -> Result<(), DbError>;

    /// Store the kubeconfig and terraform state reported by the actuator.
    /// Zero affected rows fails with NotFound.
    async fn update_cluster(
        &mut self,
        runtime_id: &str,
        kubeconfig: &str,
        terraform_state: &str,
    ) -> Result<(), DbError>;

    /// Delete a cluster row and, via cascading foreign keys, its configs
    /// and operations. Zero affected rows fails with NotFound.
    async fn delete_cluster(&mut self, runtime_id: &str) -> Result<(), DbError>;
}

/// Write session bound to one open database transaction.
///
/// Writes are invisible to other sessions until [`commit`] is called.
/// Dropping the session without committing rolls the transaction back, so
/// early returns and panics leave no partial rows behind.
///
/// [`commit`]: TransactionalWriteSession::commit
#[async_trait]
pub trait TransactionalWriteSession: WriteSession {
    /// Commit the transaction. The session is unusable afterwards.
    async fn commit(&mut self) -> Result<(), DbError>;

    /// Roll back the transaction unless it was already committed, in which
    /// case this is a no-op. Safe to call unconditionally on every exit
    /// path.
    async fn rollback_unless_committed(&mut self);
}

/// Creates read sessions, auto-committing write sessions, and transactional
/// write sessions.
#[async_trait]
pub trait SessionFactory: Send + Sync {
    /// Create a stateless read session.
    fn new_read_session(&self) -> Box<dyn ReadSession>;

    /// Create a write session whose statements commit individually.
    fn new_write_session(&self) -> Box<dyn WriteSession>;

    /// Open a database transaction and return a session bound to it.
    /// Fails with Internal if the connection cannot begin a transaction.
    async fn new_session_within_transaction(
        &self,
    ) -> Result<Box<dyn TransactionalWriteSession>, DbError>;
}

// ============================================================================
// Row types shared by both backends
// ============================================================================

#[derive(sqlx::FromRow)]
pub(crate) struct ClusterRow {
    pub id: String,
    pub creation_timestamp: DateTime<Utc>,
    pub terraform_state: String,
    pub kubeconfig: Option<String>,
    pub credentials_secret_name: String,
    pub provider: String,
}

impl ClusterRow {
    pub(crate) fn into_cluster(self) -> Result<Cluster, DbError> {
        Ok(Cluster {
            provider: self.provider.parse()?,
            id: self.id,
            creation_timestamp: self.creation_timestamp,
            terraform_state: self.terraform_state,
            kubeconfig: self.kubeconfig,
            credentials_secret_name: self.credentials_secret_name,
        })
    }
}

#[derive(sqlx::FromRow)]
pub(crate) struct OperationRow {
    pub id: String,
    #[sqlx(rename = "type")]
    pub operation_type: String,
    pub state: String,
    pub message: String,
    pub start_timestamp: DateTime<Utc>,
    pub end_timestamp: Option<DateTime<Utc>>,
    pub cluster_id: String,
}

impl OperationRow {
    pub(crate) fn into_operation(self) -> Result<Operation, DbError> {
        Ok(Operation {
            operation_type: self.operation_type.parse()?,
            state: self.state.parse()?,
            id: self.id,
            message: self.message,
            start_timestamp: self.start_timestamp,
            end_timestamp: self.end_timestamp,
            cluster_id: self.cluster_id,
        })
    }
}

/// One row of the cluster → kyma_config → kyma_config_module join.
#[derive(sqlx::FromRow)]
pub(crate) struct KymaConfigJoinRow {
    pub kyma_config_id: String,
    pub version: String,
    pub cluster_id: String,
    pub module_id: String,
    pub module: String,
}

/// Reassemble a [`KymaConfig`] from the flattened join row set.
///
/// The caller has already established that `rows` is non-empty; all rows
/// belong to the same config because `kyma_config.cluster_id` is unique.
pub(crate) fn assemble_kyma_config(rows: Vec<KymaConfigJoinRow>) -> KymaConfig {
    let mut modules = Vec::with_capacity(rows.len());
    let mut config = KymaConfig {
        id: String::new(),
        version: String::new(),
        cluster_id: String::new(),
        modules: Vec::new(),
    };
    for row in rows {
        config.id = row.kyma_config_id;
        config.version = row.version;
        config.cluster_id = row.cluster_id;
        modules.push(KymaConfigModule {
            id: row.module_id,
            module: row.module,
            kyma_config_id: config.id.clone(),
        });
    }
    config.modules = modules;
    config
}
