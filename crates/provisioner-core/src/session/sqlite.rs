//! SQLite-backed session implementations, for embedded use and tests.

use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Sqlite, SqlitePool, Transaction};
use tracing::error;

use crate::error::DbError;
use crate::model::{
    Cluster, ClusterConfig, GardenerConfig, GcpConfig, KymaConfig, Operation, OperationState,
    ProviderKind,
};

use super::{
    ClusterRow, KymaConfigJoinRow, OperationRow, ReadSession, SessionFactory,
    TransactionalWriteSession, WriteSession, assemble_kyma_config,
};

/// Session factory backed by a SQLite connection pool.
#[derive(Clone)]
pub struct SqliteSessionFactory {
    pool: SqlitePool,
}

impl SqliteSessionFactory {
    /// Create a factory from an existing pool.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Create and initialize a factory from a database file path.
    ///
    /// Creates parent directories and the database file if missing, enables
    /// foreign keys, and runs all migrations.
    pub async fn from_path(path: impl AsRef<Path>) -> Result<Self, DbError> {
        let path = path.as_ref();

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(|e| {
                DbError::internal(format!("failed to create directory {parent:?}: {e}"))
            })?;
        }

        let options = SqliteConnectOptions::from_str(&format!(
            "sqlite:{}",
            path.to_string_lossy()
        ))
        .map_err(|e| DbError::internal(format!("invalid database path {path:?}: {e}")))?
        .create_if_missing(true)
        .foreign_keys(true)
        .busy_timeout(Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .map_err(|e| {
                DbError::internal(format!("failed to connect to sqlite at {path:?}: {e}"))
            })?;

        crate::migrations::run_sqlite(&pool)
            .await
            .map_err(|e| DbError::internal(format!("failed to run migrations: {e}")))?;

        Ok(Self::new(pool))
    }

    /// The underlying pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

#[async_trait]
impl SessionFactory for SqliteSessionFactory {
    fn new_read_session(&self) -> Box<dyn ReadSession> {
        Box::new(SqliteReadSession {
            pool: self.pool.clone(),
        })
    }

    fn new_write_session(&self) -> Box<dyn WriteSession> {
        Box::new(SqliteWriteSession {
            pool: self.pool.clone(),
        })
    }

    async fn new_session_within_transaction(
        &self,
    ) -> Result<Box<dyn TransactionalWriteSession>, DbError> {
        let tx = self
            .pool
            .begin()
            .await
            .map_err(|e| DbError::internal(format!("failed to begin transaction: {e}")))?;
        Ok(Box::new(SqliteTransactionalWriteSession { tx: Some(tx) }))
    }
}

/// Read-only session over the pool.
struct SqliteReadSession {
    pool: SqlitePool,
}

#[async_trait]
impl ReadSession for SqliteReadSession {
    async fn get_cluster(&self, runtime_id: &str) -> Result<Cluster, DbError> {
        let row = sqlx::query_as::<_, ClusterRow>(
            r#"
            SELECT id, creation_timestamp, terraform_state, kubeconfig,
                   credentials_secret_name, provider
            FROM cluster
            WHERE id = $1
            "#,
        )
        .bind(runtime_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| DbError::internal(format!("failed to get cluster: {e}")))?;

        match row {
            Some(row) => row.into_cluster(),
            None => Err(DbError::not_found(format!(
                "cannot find cluster for runtime '{runtime_id}'"
            ))),
        }
    }

    async fn get_cluster_config(&self, runtime_id: &str) -> Result<ClusterConfig, DbError> {
        let provider: Option<String> =
            sqlx::query_scalar(r#"SELECT provider FROM cluster WHERE id = $1"#)
                .bind(runtime_id)
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| DbError::internal(format!("failed to get cluster provider: {e}")))?;

        let provider: ProviderKind = provider
            .ok_or_else(|| {
                DbError::not_found(format!("cannot find cluster for runtime '{runtime_id}'"))
            })?
            .parse()?;

        match provider {
            ProviderKind::Gardener => {
                let config = sqlx::query_as::<_, GardenerConfig>(
                    r#"
                    SELECT id, cluster_id, name, project_name, kubernetes_version,
                           node_count, volume_size_gb, disk_type, machine_type,
                           provider, seed, target_secret, worker_cidr, region,
                           auto_scaler_min, auto_scaler_max, max_surge,
                           max_unavailable, provider_specific_config
                    FROM gardener_config
                    WHERE cluster_id = $1
                    "#,
                )
                .bind(runtime_id)
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| DbError::internal(format!("failed to get gardener config: {e}")))?;

                config.map(ClusterConfig::Gardener).ok_or_else(|| {
                    DbError::not_found(format!(
                        "cluster configuration not found for runtime '{runtime_id}'"
                    ))
                })
            }
            ProviderKind::Gcp => {
                let config = sqlx::query_as::<_, GcpConfig>(
                    r#"
                    SELECT id, cluster_id, name, project_name, kubernetes_version,
                           number_of_nodes, boot_disk_size_gb, machine_type,
                           region, zone
                    FROM gcp_config
                    WHERE cluster_id = $1
                    "#,
                )
                .bind(runtime_id)
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| DbError::internal(format!("failed to get gcp config: {e}")))?;

                config.map(ClusterConfig::Gcp).ok_or_else(|| {
                    DbError::not_found(format!(
                        "cluster configuration not found for runtime '{runtime_id}'"
                    ))
                })
            }
        }
    }

    async fn get_kyma_config(&self, runtime_id: &str) -> Result<KymaConfig, DbError> {
        let rows = sqlx::query_as::<_, KymaConfigJoinRow>(
            r#"
            SELECT kyma_config.id AS kyma_config_id, kyma_config.version,
                   kyma_config.cluster_id,
                   kyma_config_module.id AS module_id, kyma_config_module.module
            FROM cluster
            JOIN kyma_config ON cluster.id = kyma_config.cluster_id
            JOIN kyma_config_module ON kyma_config.id = kyma_config_module.kyma_config_id
            WHERE cluster.id = $1
            "#,
        )
        .bind(runtime_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| DbError::internal(format!("failed to get kyma config: {e}")))?;

        if rows.is_empty() {
            return Err(DbError::not_found(format!(
                "cannot find kyma config for runtime '{runtime_id}'"
            )));
        }

        Ok(assemble_kyma_config(rows))
    }

    async fn get_operation(&self, operation_id: &str) -> Result<Operation, DbError> {
        let row = sqlx::query_as::<_, OperationRow>(
            r#"
            SELECT id, type, state, message, start_timestamp, end_timestamp, cluster_id
            FROM operation
            WHERE id = $1
            "#,
        )
        .bind(operation_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| DbError::internal(format!("failed to get operation '{operation_id}': {e}")))?;

        match row {
            Some(row) => row.into_operation(),
            None => Err(DbError::not_found(format!(
                "operation not found for id '{operation_id}'"
            ))),
        }
    }

    async fn get_last_operation(&self, runtime_id: &str) -> Result<Operation, DbError> {
        let row = sqlx::query_as::<_, OperationRow>(
            r#"
            SELECT id, type, state, message, start_timestamp, end_timestamp, cluster_id
            FROM operation
            WHERE cluster_id = $1
            ORDER BY start_timestamp DESC, id DESC
            LIMIT 1
            "#,
        )
        .bind(runtime_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| DbError::internal(format!("failed to get last operation: {e}")))?;

        match row {
            Some(row) => row.into_operation(),
            None => Err(DbError::not_found(format!(
                "last operation not found for runtime '{runtime_id}'"
            ))),
        }
    }

    async fn list_in_progress_operations(&self) -> Result<Vec<Operation>, DbError> {
        let rows = sqlx::query_as::<_, OperationRow>(
            r#"
            SELECT id, type, state, message, start_timestamp, end_timestamp, cluster_id
            FROM operation
            WHERE state = $1
            "#,
        )
        .bind(OperationState::InProgress.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| DbError::internal(format!("failed to list in-progress operations: {e}")))?;

        rows.into_iter().map(OperationRow::into_operation).collect()
    }
}

/// Auto-committing write session over the pool.
struct SqliteWriteSession {
    pool: SqlitePool,
}

#[async_trait]
impl WriteSession for SqliteWriteSession {
    async fn insert_cluster(&mut self, cluster: &Cluster) -> Result<(), DbError> {
        insert_cluster(&self.pool, cluster).await
    }

    async fn insert_gardener_config(&mut self, config: &GardenerConfig) -> Result<(), DbError> {
        insert_gardener_config(&self.pool, config).await
    }

    async fn insert_gcp_config(&mut self, config: &GcpConfig) -> Result<(), DbError> {
        insert_gcp_config(&self.pool, config).await
    }

    async fn insert_kyma_config(&mut self, config: &KymaConfig) -> Result<(), DbError> {
        insert_kyma_config(&self.pool, config).await
    }

    async fn insert_operation(&mut self, operation: &Operation) -> Result<(), DbError> {
        insert_operation(&self.pool, operation).await
    }

    async fn update_operation_state(
        &mut self,
        operation_id: &str,
        message: &str,
        state: OperationState,
        end_timestamp: Option<DateTime<Utc>>,
    ) -> Result<(), DbError> {
        update_operation_state(&self.pool, operation_id, message, state, end_timestamp).await
    }

    async fn update_cluster(
        &mut self,
        runtime_id: &str,
        kubeconfig: &str,
        terraform_state: &str,
    ) -> Result<(), DbError> {
        update_cluster(&self.pool, runtime_id, kubeconfig, terraform_state).await
    }

    async fn delete_cluster(&mut self, runtime_id: &str) -> Result<(), DbError> {
        delete_cluster(&self.pool, runtime_id).await
    }
}

/// Write session bound to one open transaction.
struct SqliteTransactionalWriteSession {
    tx: Option<Transaction<'static, Sqlite>>,
}

impl SqliteTransactionalWriteSession {
    fn tx(&mut self) -> Result<&mut Transaction<'static, Sqlite>, DbError> {
        self.tx
            .as_mut()
            .ok_or_else(|| DbError::internal("transaction already closed"))
    }
}

#[async_trait]
impl WriteSession for SqliteTransactionalWriteSession {
    async fn insert_cluster(&mut self, cluster: &Cluster) -> Result<(), DbError> {
        insert_cluster(&mut **self.tx()?, cluster).await
    }

    async fn insert_gardener_config(&mut self, config: &GardenerConfig) -> Result<(), DbError> {
        insert_gardener_config(&mut **self.tx()?, config).await
    }

    async fn insert_gcp_config(&mut self, config: &GcpConfig) -> Result<(), DbError> {
        insert_gcp_config(&mut **self.tx()?, config).await
    }

    async fn insert_kyma_config(&mut self, config: &KymaConfig) -> Result<(), DbError> {
        let tx = self.tx()?;
        insert_kyma_config_tx(tx, config).await
    }

    async fn insert_operation(&mut self, operation: &Operation) -> Result<(), DbError> {
        insert_operation(&mut **self.tx()?, operation).await
    }

    async fn update_operation_state(
        &mut self,
        operation_id: &str,
        message: &str,
        state: OperationState,
        end_timestamp: Option<DateTime<Utc>>,
    ) -> Result<(), DbError> {
        update_operation_state(&mut **self.tx()?, operation_id, message, state, end_timestamp)
            .await
    }

    async fn update_cluster(
        &mut self,
        runtime_id: &str,
        kubeconfig: &str,
        terraform_state: &str,
    ) -> Result<(), DbError> {
        update_cluster(&mut **self.tx()?, runtime_id, kubeconfig, terraform_state).await
    }

    async fn delete_cluster(&mut self, runtime_id: &str) -> Result<(), DbError> {
        delete_cluster(&mut **self.tx()?, runtime_id).await
    }
}

#[async_trait]
impl TransactionalWriteSession for SqliteTransactionalWriteSession {
    async fn commit(&mut self) -> Result<(), DbError> {
        match self.tx.take() {
            Some(tx) => tx
                .commit()
                .await
                .map_err(|e| DbError::internal(format!("failed to commit transaction: {e}"))),
            None => Err(DbError::internal("transaction already closed")),
        }
    }

    async fn rollback_unless_committed(&mut self) {
        if let Some(tx) = self.tx.take()
            && let Err(e) = tx.rollback().await
        {
            error!(error = %e, "failed to roll back transaction");
        }
    }
}

// ============================================================================
// Statements, shared between the pool-backed and transactional sessions
// ============================================================================

async fn insert_cluster<'c, E>(executor: E, cluster: &Cluster) -> Result<(), DbError>
where
    E: sqlx::sqlite::SqliteExecutor<'c>,
{
    sqlx::query(
        r#"
        INSERT INTO cluster (id, creation_timestamp, terraform_state, kubeconfig,
                             credentials_secret_name, provider)
        VALUES ($1, $2, $3, $4, $5, $6)
        "#,
    )
    .bind(&cluster.id)
    .bind(cluster.creation_timestamp)
    .bind(&cluster.terraform_state)
    .bind(&cluster.kubeconfig)
    .bind(&cluster.credentials_secret_name)
    .bind(cluster.provider.as_str())
    .execute(executor)
    .await
    .map_err(|e| DbError::internal(format!("failed to insert cluster '{}': {e}", cluster.id)))?;

    Ok(())
}

async fn insert_gardener_config<'c, E>(executor: E, config: &GardenerConfig) -> Result<(), DbError>
where
    E: sqlx::sqlite::SqliteExecutor<'c>,
{
    sqlx::query(
        r#"
        INSERT INTO gardener_config (id, cluster_id, name, project_name,
                                     kubernetes_version, node_count, volume_size_gb,
                                     disk_type, machine_type, provider, seed,
                                     target_secret, worker_cidr, region,
                                     auto_scaler_min, auto_scaler_max, max_surge,
                                     max_unavailable, provider_specific_config)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18, $19)
        "#,
    )
    .bind(&config.id)
    .bind(&config.cluster_id)
    .bind(&config.name)
    .bind(&config.project_name)
    .bind(&config.kubernetes_version)
    .bind(config.node_count)
    .bind(config.volume_size_gb)
    .bind(&config.disk_type)
    .bind(&config.machine_type)
    .bind(&config.provider)
    .bind(&config.seed)
    .bind(&config.target_secret)
    .bind(&config.worker_cidr)
    .bind(&config.region)
    .bind(config.auto_scaler_min)
    .bind(config.auto_scaler_max)
    .bind(config.max_surge)
    .bind(config.max_unavailable)
    .bind(&config.provider_specific_config)
    .execute(executor)
    .await
    .map_err(|e| DbError::internal(format!("failed to insert gardener config: {e}")))?;

    Ok(())
}

async fn insert_gcp_config<'c, E>(executor: E, config: &GcpConfig) -> Result<(), DbError>
where
    E: sqlx::sqlite::SqliteExecutor<'c>,
{
    sqlx::query(
        r#"
        INSERT INTO gcp_config (id, cluster_id, name, project_name, kubernetes_version,
                                number_of_nodes, boot_disk_size_gb, machine_type,
                                region, zone)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
        "#,
    )
    .bind(&config.id)
    .bind(&config.cluster_id)
    .bind(&config.name)
    .bind(&config.project_name)
    .bind(&config.kubernetes_version)
    .bind(config.number_of_nodes)
    .bind(config.boot_disk_size_gb)
    .bind(&config.machine_type)
    .bind(&config.region)
    .bind(&config.zone)
    .execute(executor)
    .await
    .map_err(|e| DbError::internal(format!("failed to insert gcp config: {e}")))?;

    Ok(())
}

async fn insert_kyma_config_row<'c, E>(executor: E, config: &KymaConfig) -> Result<(), DbError>
where
    E: sqlx::sqlite::SqliteExecutor<'c>,
{
    sqlx::query(
        r#"
        INSERT INTO kyma_config (id, version, cluster_id)
        VALUES ($1, $2, $3)
        "#,
    )
    .bind(&config.id)
    .bind(&config.version)
    .bind(&config.cluster_id)
    .execute(executor)
    .await
    .map_err(|e| DbError::internal(format!("failed to insert kyma config: {e}")))?;

    Ok(())
}

async fn insert_kyma_config_module<'c, E>(
    executor: E,
    module_id: &str,
    module: &str,
    kyma_config_id: &str,
) -> Result<(), DbError>
where
    E: sqlx::sqlite::SqliteExecutor<'c>,
{
    sqlx::query(
        r#"
        INSERT INTO kyma_config_module (id, module, kyma_config_id)
        VALUES ($1, $2, $3)
        "#,
    )
    .bind(module_id)
    .bind(module)
    .bind(kyma_config_id)
    .execute(executor)
    .await
    .map_err(|e| {
        DbError::internal(format!("failed to insert kyma config module '{module}': {e}"))
    })?;

    Ok(())
}

/// Insert the config row and all module rows over the pool, in a short
/// transaction of their own to keep the all-or-nothing contract outside an
/// outer transaction.
async fn insert_kyma_config(pool: &SqlitePool, config: &KymaConfig) -> Result<(), DbError> {
    let mut tx = pool
        .begin()
        .await
        .map_err(|e| DbError::internal(format!("failed to begin transaction: {e}")))?;
    insert_kyma_config_tx(&mut tx, config).await?;
    tx.commit()
        .await
        .map_err(|e| DbError::internal(format!("failed to commit transaction: {e}")))?;
    Ok(())
}

async fn insert_kyma_config_tx(
    tx: &mut Transaction<'static, Sqlite>,
    config: &KymaConfig,
) -> Result<(), DbError> {
    insert_kyma_config_row(&mut **tx, config).await?;
    for module in &config.modules {
        insert_kyma_config_module(&mut **tx, &module.id, &module.module, &module.kyma_config_id)
            .await?;
    }
    Ok(())
}

async fn insert_operation<'c, E>(executor: E, operation: &Operation) -> Result<(), DbError>
where
    E: sqlx::sqlite::SqliteExecutor<'c>,
{
    sqlx::query(
        r#"
        INSERT INTO operation (id, type, state, message, start_timestamp,
                               end_timestamp, cluster_id)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        "#,
    )
    .bind(&operation.id)
    .bind(operation.operation_type.as_str())
    .bind(operation.state.as_str())
    .bind(&operation.message)
    .bind(operation.start_timestamp)
    .bind(operation.end_timestamp)
    .bind(&operation.cluster_id)
    .execute(executor)
    .await
    .map_err(|e| {
        DbError::internal(format!("failed to insert operation '{}': {e}", operation.id))
    })?;

    Ok(())
}

async fn update_operation_state<'c, E>(
    executor: E,
    operation_id: &str,
    message: &str,
    state: OperationState,
    end_timestamp: Option<DateTime<Utc>>,
) -> Result<(), DbError>
where
    E: sqlx::sqlite::SqliteExecutor<'c>,
{
    let result = sqlx::query(
        r#"
        UPDATE operation
        SET state = $2, message = $3, end_timestamp = COALESCE($4, end_timestamp)
        WHERE id = $1 AND state = $5
        "#,
    )
    .bind(operation_id)
    .bind(state.as_str())
    .bind(message)
    .bind(end_timestamp)
    .bind(OperationState::InProgress.as_str())
    .execute(executor)
    .await
    .map_err(|e| {
        DbError::internal(format!("failed to update operation '{operation_id}': {e}"))
    })?;

    if result.rows_affected() == 0 {
        return Err(DbError::not_found(format!(
            "operation '{operation_id}' not found or already in a terminal state"
        )));
    }

    Ok(())
}

async fn update_cluster<'c, E>(
    executor: E,
    runtime_id: &str,
    kubeconfig: &str,
    terraform_state: &str,
) -> Result<(), DbError>
where
    E: sqlx::sqlite::SqliteExecutor<'c>,
{
    let result = sqlx::query(
        r#"
        UPDATE cluster
        SET kubeconfig = $2, terraform_state = $3
        WHERE id = $1
        "#,
    )
    .bind(runtime_id)
    .bind(kubeconfig)
    .bind(terraform_state)
    .execute(executor)
    .await
    .map_err(|e| DbError::internal(format!("failed to update cluster '{runtime_id}': {e}")))?;

    if result.rows_affected() == 0 {
        return Err(DbError::not_found(format!(
            "cannot find cluster for runtime '{runtime_id}'"
        )));
    }

    Ok(())
}

async fn delete_cluster<'c, E>(executor: E, runtime_id: &str) -> Result<(), DbError>
where
    E: sqlx::sqlite::SqliteExecutor<'c>,
{
    let result = sqlx::query(r#"DELETE FROM cluster WHERE id = $1"#)
        .bind(runtime_id)
        .execute(executor)
        .await
        .map_err(|e| DbError::internal(format!("failed to delete cluster '{runtime_id}': {e}")))?;

    if result.rows_affected() == 0 {
        return Err(DbError::not_found(format!(
            "cannot find cluster for runtime '{runtime_id}'"
        )));
    }

    Ok(())
}
