// III-IV
// Copyright 2023 Julio Merino
//
// Licensed under the Apache License, Version 2.0 (the "License"); you may not
// use this file except in compliance with the License.  You may obtain a copy
// of the License at:
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS, WITHOUT
// WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.  See the
// License for the specific language governing permissions and limitations
// under the License.

//! PostgreSQL backend, used by the production service.

use crate::db::sql::SqlValue;
use crate::db::{Db, DbError, DbResult, Executor, TxExecutor};
use crate::env::{get_optional_var, get_required_var};
use async_trait::async_trait;
use derivative::Derivative;
use log::warn;
use sqlx::Transaction;
use sqlx::pool::PoolConnection;
use sqlx::postgres::{
    PgArguments, PgConnectOptions, PgConnection, PgDatabaseError, PgPool, PgPoolOptions, Postgres,
};
use sqlx::query::Query;
use std::future::Future;
use std::time::Duration;

/// How many times to retry acquiring a connection when `<prefix>_MAX_RETRIES` is not set.
const DEFAULT_MAX_RETRIES: u16 = 60;

/// How long to wait for a pooled connection before considering the database unavailable.
const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(2);

/// SQLSTATE raised when a foreign key points to a missing row.
const FOREIGN_KEY_VIOLATION: &str = "23503";

/// SQLSTATE raised when a write collides with a unique index.
const UNIQUE_VIOLATION: &str = "23505";

/// SQLSTATE raised when the server refuses new connections.
const TOO_MANY_CONNECTIONS: &str = "53300";

/// Classifies a `sqlx` error raised by PostgreSQL.
pub fn map_sqlx_error(e: sqlx::Error) -> DbError {
    match e {
        sqlx::Error::Database(e) => {
            let code = e.downcast_ref::<PgDatabaseError>().code();
            match code {
                FOREIGN_KEY_VIOLATION => DbError::NotFound,
                UNIQUE_VIOLATION => DbError::AlreadyExists,
                TOO_MANY_CONNECTIONS => DbError::Unavailable,
                _ => DbError::BackendError(format!("PostgreSQL error {}: {}", code, e)),
            }
        }
        sqlx::Error::ColumnDecode { index, source } => {
            DbError::DataIntegrityError(format!("Cannot decode column {}: {}", index, source))
        }
        sqlx::Error::RowNotFound => DbError::NotFound,
        sqlx::Error::PoolTimedOut => DbError::Unavailable,
        e => DbError::BackendError(e.to_string()),
    }
}

/// Connection settings for a PostgreSQL server.
#[derive(Derivative)]
#[derivative(Debug, Default)]
#[cfg_attr(test, derivative(PartialEq))]
pub struct PostgresOptions {
    /// Server host name.
    pub host: String,

    /// Server port.
    pub port: u16,

    /// Name of the database holding the Tourbook tables.
    pub database: String,

    /// Role to log in as.
    pub username: String,

    /// Secret of `username`.
    #[derivative(Debug = "ignore")]
    pub password: String,

    /// Connections kept open even when idle.  Uses the `sqlx` default if not set.
    pub min_connections: Option<u32>,

    /// Upper bound on open connections.  Uses the `sqlx` default if not set.
    pub max_connections: Option<u32>,

    /// How many times to retry acquiring a connection while the server is unavailable.
    pub max_retries: u16,
}

impl PostgresOptions {
    /// Reads the connection settings from `<prefix>_HOST`, `<prefix>_PORT`,
    /// `<prefix>_DATABASE`, `<prefix>_USERNAME` and `<prefix>_PASSWORD`, plus the optional
    /// pool tuning in `<prefix>_MIN_CONNECTIONS`, `<prefix>_MAX_CONNECTIONS` and
    /// `<prefix>_MAX_RETRIES`.
    pub fn from_env(prefix: &str) -> Result<Self, String> {
        let max_retries =
            get_optional_var::<u16>(prefix, "MAX_RETRIES")?.unwrap_or(DEFAULT_MAX_RETRIES);
        Ok(Self {
            host: get_required_var::<String>(prefix, "HOST")?,
            port: get_required_var::<u16>(prefix, "PORT")?,
            database: get_required_var::<String>(prefix, "DATABASE")?,
            username: get_required_var::<String>(prefix, "USERNAME")?,
            password: get_required_var::<String>(prefix, "PASSWORD")?,
            min_connections: get_optional_var::<u32>(prefix, "MIN_CONNECTIONS")?,
            max_connections: get_optional_var::<u32>(prefix, "MAX_CONNECTIONS")?,
            max_retries,
        })
    }

    /// Builds the pool settings described by these options.
    fn pool_options(&self) -> PgPoolOptions {
        let mut pool = PgPoolOptions::new().acquire_timeout(ACQUIRE_TIMEOUT);
        if let Some(min) = self.min_connections {
            pool = pool.min_connections(min);
        }
        if let Some(max) = self.max_connections {
            pool = pool.max_connections(max);
        }
        pool
    }

    /// Builds the per-connection settings described by these options.
    fn connect_options(&self) -> PgConnectOptions {
        PgConnectOptions::new()
            .host(&self.host)
            .port(self.port)
            .database(&self.database)
            .username(&self.username)
            .password(&self.password)
    }
}

/// Executor for PostgreSQL statements.
#[derive(Debug)]
pub enum PostgresExecutor {
    /// A connection checked out of the pool, with every statement committed on its own.
    PoolExec(PoolConnection<Postgres>),

    /// An open transaction.
    TxExec(Transaction<'static, Postgres>),
}

impl PostgresExecutor {
    /// Gives access to the connection underneath, as needed by `sqlx` queries.
    pub fn conn(&mut self) -> &mut PgConnection {
        match self {
            PostgresExecutor::PoolExec(conn) => &mut **conn,
            PostgresExecutor::TxExec(tx) => &mut **tx,
        }
    }

    /// Commits the transaction.  Panics when called on a pooled connection.
    pub(super) async fn commit(self) -> DbResult<()> {
        match self {
            PostgresExecutor::PoolExec(_) => {
                unreachable!("Pooled connections are not transactions")
            }
            PostgresExecutor::TxExec(tx) => tx.commit().await.map_err(map_sqlx_error),
        }
    }
}

/// Randomized, growing delays between attempts to reach an unavailable server.
struct Backoff {
    /// Delay before the next attempt.
    delay: Duration,
}

impl Backoff {
    /// Delays stop growing once they reach this value.
    const CAP: Duration = Duration::from_secs(5);

    /// Starts with a delay between 100ms and 1s.
    fn new() -> Self {
        Self { delay: Duration::from_millis(100 + u64::from(rand::random::<u16>() % 900)) }
    }

    /// Returns the delay to wait for now and grows the next one by up to 1s.
    fn next_delay(&mut self) -> Duration {
        let current = self.delay;
        if self.delay < Self::CAP {
            self.delay += Duration::from_millis(u64::from(rand::random::<u16>() % 1000));
        }
        current
    }
}

/// Runs `op` until it stops failing with `DbError::Unavailable` or `retries` run out.
async fn retry<Op, OpFut, T>(op: Op, retries: u16) -> DbResult<T>
where
    Op: Fn() -> OpFut,
    OpFut: Future<Output = Result<T, sqlx::Error>>,
{
    let mut backoff = Backoff::new();
    let mut left = retries;
    loop {
        match op().await.map_err(map_sqlx_error) {
            Err(DbError::Unavailable) if left > 0 => {
                left -= 1;
                let delay = backoff.next_delay();
                warn!(
                    "PostgreSQL unavailable; retrying in {}ms ({} attempts left)",
                    delay.as_millis(),
                    left
                );
                tokio::time::sleep(delay).await;
            }
            result => return result,
        }
    }
}

/// Pool of connections to a PostgreSQL server.
pub struct PostgresDb {
    /// Connections shared by all concurrent requests.
    pool: PgPool,

    /// How many times to retry acquiring a connection while the server is unavailable.
    max_retries: u16,
}

impl Drop for PostgresDb {
    fn drop(&mut self) {
        if !self.pool.is_closed() {
            warn!("PostgreSQL pool dropped while open; call close() on shutdown");
        }
    }
}

impl PostgresDb {
    /// Sets up a pool for the server in `opts`.  Connections are opened on first use.
    pub fn connect(opts: PostgresOptions) -> DbResult<Self> {
        let pool = opts.pool_options().connect_lazy_with(opts.connect_options());
        Ok(Self { pool, max_retries: opts.max_retries })
    }

    /// Checks out a connection without wrapping it in the generic `Executor`.
    pub async fn typed_ex(&self) -> DbResult<PostgresExecutor> {
        let conn = retry(|| self.pool.acquire(), self.max_retries).await?;
        Ok(PostgresExecutor::PoolExec(conn))
    }
}

#[async_trait]
impl Db for PostgresDb {
    async fn ex(&self) -> DbResult<Executor> {
        Ok(Executor::Postgres(self.typed_ex().await?))
    }

    async fn begin(&self) -> DbResult<TxExecutor> {
        let tx = retry(|| self.pool.begin(), self.max_retries).await?;
        Ok(TxExecutor(Executor::Postgres(PostgresExecutor::TxExec(tx))))
    }

    async fn close(&self) {
        self.pool.close().await;
    }
}

/// Applies the statements in `schema`, which may contain more than one.
pub async fn run_schema(e: &mut PostgresExecutor, schema: &str) -> DbResult<()> {
    sqlx::raw_sql(schema).execute(e.conn()).await.map_err(map_sqlx_error)?;
    Ok(())
}

/// Binds the `values` produced by rendering a statement to its `query`.
pub fn bind_values<'q>(
    mut query: Query<'q, Postgres, PgArguments>,
    values: &[SqlValue],
) -> Query<'q, Postgres, PgArguments> {
    for value in values {
        query = match value {
            SqlValue::Bool(b) => query.bind(*b),
            SqlValue::Integer(i) => query.bind(*i),
            SqlValue::Real(f) => query.bind(*f),
            SqlValue::Text(s) => query.bind(s.clone()),
            SqlValue::Timestamp(ts) => query.bind(*ts),
        };
    }
    query
}

/// Test utilities for the PostgreSQL backend.
#[cfg(any(feature = "testutils", test))]
pub mod testutils {
    use super::*;

    /// Connects to the database described by the `PGSQL_TEST_*` variables.
    ///
    /// Tables go into the `pg_temp` schema so that they vanish when the connection closes.  This
    /// only works if the pool holds exactly one connection, which is what this configures.
    pub async fn setup() -> PostgresDb {
        let _can_fail = env_logger::builder().is_test(true).try_init();

        let opts = PostgresOptions {
            min_connections: Some(1),
            max_connections: Some(1),
            ..PostgresOptions::from_env("PGSQL_TEST").unwrap()
        };
        let db = PostgresDb::connect(opts).unwrap();

        let mut ex = db.typed_ex().await.unwrap();
        sqlx::query("SET search_path TO pg_temp").execute(ex.conn()).await.unwrap();
        db
    }
}
