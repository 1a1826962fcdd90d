//! PostgreSQL-backed policy store.
//!
//! Opens a single-connection pool against a live database. Statements go
//! over the simple query protocol, so function bodies with `$$` quoting and
//! multi-statement text are sent as written.

use async_trait::async_trait;
use sqlx::postgres::{PgConnectOptions, PgPoolOptions, PgRow, PgSslMode};
use sqlx::{Column, PgPool, Row as _, TypeInfo, ValueRef};
use std::str::FromStr;
use tracing::{debug, info, warn};

use crate::config::{SslMode, StoreConfig};
use crate::error::{PolicyError, PolicyResult};
use crate::store::{PolicyStore, Row, StoreConnector};

/// Live PostgreSQL session.
///
/// # Example
///
/// ```rust,no_run
/// use storage_policy_engine::config::StoreConfig;
/// use storage_policy_engine::postgres::PgConnector;
/// use storage_policy_engine::store::StoreConnector;
///
/// async fn example() -> Result<(), Box<dyn std::error::Error>> {
///     let mut store = PgConnector.connect(&StoreConfig::from_env()).await?;
///     store.execute("ALTER TABLE storage.objects ENABLE ROW LEVEL SECURITY;").await?;
///     store.close().await?;
///     Ok(())
/// }
/// ```
pub struct PgPolicyStore {
    /// `None` once closed.
    pool: Option<PgPool>,
}

impl PgPolicyStore {
    fn pool(&self) -> PolicyResult<&PgPool> {
        self.pool.as_ref().ok_or(PolicyError::ConnectionClosed)
    }
}

#[async_trait]
impl PolicyStore for PgPolicyStore {
    async fn execute(&mut self, statement: &str) -> PolicyResult<()> {
        let pool = self.pool()?;
        sqlx::raw_sql(statement)
            .execute(pool)
            .await
            .map_err(statement_error)?;
        Ok(())
    }

    async fn query(&mut self, sql: &str) -> PolicyResult<Vec<Row>> {
        let pool = self.pool()?;
        let rows = sqlx::query(sql)
            .fetch_all(pool)
            .await
            .map_err(|e| PolicyError::QueryFailed(e.to_string()))?;

        rows.iter().map(decode_row).collect()
    }

    async fn close(&mut self) -> PolicyResult<()> {
        if let Some(pool) = self.pool.take() {
            pool.close().await;
            debug!("PostgreSQL session closed");
        }
        Ok(())
    }
}

/// Opens [`PgPolicyStore`] sessions.
#[derive(Debug, Default, Clone, Copy)]
pub struct PgConnector;

#[async_trait]
impl StoreConnector for PgConnector {
    async fn connect(&self, config: &StoreConfig) -> PolicyResult<Box<dyn PolicyStore>> {
        config.validate()?;
        info!(target_db = %config.display_target(), "Connecting to PostgreSQL");

        let pool = PgPoolOptions::new()
            .max_connections(1)
            .acquire_timeout(config.connect_timeout())
            .connect_with(connect_options(config)?)
            .await
            .map_err(|e| {
                warn!(error = %e, "Failed to connect to PostgreSQL");
                PolicyError::ConnectionFailed(e.to_string())
            })?;

        Ok(Box::new(PgPolicyStore { pool: Some(pool) }))
    }

    fn backend(&self) -> &'static str {
        "postgres"
    }
}

fn connect_options(config: &StoreConfig) -> PolicyResult<PgConnectOptions> {
    if let Some(url) = &config.database_url {
        return PgConnectOptions::from_str(url)
            .map_err(|e| PolicyError::ConnectionFailed(format!("invalid database URL: {}", e)));
    }

    let mut options = PgConnectOptions::new()
        .host(&config.host)
        .port(config.port)
        .database(&config.database)
        .username(&config.user)
        .ssl_mode(ssl_mode(config.ssl_mode));
    if let Some(password) = &config.password {
        options = options.password(password);
    }
    Ok(options)
}

fn ssl_mode(mode: SslMode) -> PgSslMode {
    match mode {
        SslMode::Disable => PgSslMode::Disable,
        SslMode::Prefer => PgSslMode::Prefer,
        SslMode::Require => PgSslMode::Require,
        SslMode::VerifyCa => PgSslMode::VerifyCa,
        SslMode::VerifyFull => PgSslMode::VerifyFull,
    }
}

fn statement_error(e: sqlx::Error) -> PolicyError {
    match e.as_database_error() {
        Some(db) => PolicyError::StatementRejected {
            message: db.message().to_string(),
            sql_state: db.code().map(|code| code.into_owned()),
        },
        None => PolicyError::StatementRejected {
            message: e.to_string(),
            sql_state: None,
        },
    }
}

fn decode_row(row: &PgRow) -> PolicyResult<Row> {
    row.columns()
        .iter()
        .map(|column| {
            let index = column.ordinal();
            let is_null = row
                .try_get_raw(index)
                .map(|raw| raw.is_null())
                .map_err(|e| PolicyError::QueryFailed(e.to_string()))?;
            if is_null {
                return Ok(serde_json::Value::Null);
            }

            let value = match column.type_info().name() {
                "BOOL" => row.try_get::<bool, _>(index).map(serde_json::Value::from),
                "INT2" => row.try_get::<i16, _>(index).map(serde_json::Value::from),
                "INT4" => row.try_get::<i32, _>(index).map(serde_json::Value::from),
                "INT8" => row.try_get::<i64, _>(index).map(serde_json::Value::from),
                _ => row.try_get::<String, _>(index).map(serde_json::Value::from),
            };
            value.map_err(|e| {
                PolicyError::VerificationFailed(format!(
                    "cannot decode column `{}`: {}",
                    column.name(),
                    e
                ))
            })
        })
        .collect()
}
