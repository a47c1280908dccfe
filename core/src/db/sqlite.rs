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

//! SQLite backend, used by tests and local runs.
//!
//! SQLite has no native timestamp type, so tables store each timestamp as a pair of integer
//! columns holding the seconds and nanoseconds since the epoch.  The helpers in here convert
//! between the two representations.

use crate::db::sql::SqlValue;
use crate::db::{Db, DbError, DbResult, Executor, TxExecutor};
use async_trait::async_trait;
use log::warn;
use sqlx::Transaction;
use sqlx::pool::PoolConnection;
use sqlx::query::Query;
use sqlx::sqlite::{Sqlite, SqliteArguments, SqliteConnection, SqlitePool};
use time::OffsetDateTime;

/// Classifies a `sqlx` error raised by SQLite.
///
/// SQLite reports constraint violations with generic error codes, so this looks at the message.
pub fn map_sqlx_error(e: sqlx::Error) -> DbError {
    match e {
        sqlx::Error::Database(e) => {
            let message = e.message();
            if message.contains("UNIQUE constraint failed") {
                DbError::AlreadyExists
            } else if message.contains("FOREIGN KEY constraint failed") {
                DbError::NotFound
            } else {
                DbError::BackendError(format!("SQLite error: {}", message))
            }
        }
        sqlx::Error::ColumnDecode { index, source } => {
            DbError::DataIntegrityError(format!("Cannot decode column {}: {}", index, source))
        }
        sqlx::Error::RowNotFound => DbError::NotFound,
        e => DbError::BackendError(e.to_string()),
    }
}

/// Opens a pool for the database at `conn_str`, such as `:memory:`.
pub async fn connect(conn_str: &str) -> DbResult<SqliteDb> {
    let pool = SqlitePool::connect(conn_str).await.map_err(map_sqlx_error)?;
    Ok(SqliteDb { pool })
}

/// Executor for SQLite statements.
#[derive(Debug)]
pub enum SqliteExecutor {
    /// A connection checked out of the pool, with every statement committed on its own.
    PoolExec(PoolConnection<Sqlite>),

    /// An open transaction.
    TxExec(Transaction<'static, Sqlite>),
}

impl SqliteExecutor {
    /// Gives access to the connection underneath, as needed by `sqlx` queries.
    pub fn conn(&mut self) -> &mut SqliteConnection {
        match self {
            SqliteExecutor::PoolExec(conn) => &mut **conn,
            SqliteExecutor::TxExec(tx) => &mut **tx,
        }
    }

    /// Commits the transaction.  Panics when called on a pooled connection.
    pub(super) async fn commit(self) -> DbResult<()> {
        match self {
            SqliteExecutor::PoolExec(_) => {
                unreachable!("Pooled connections are not transactions")
            }
            SqliteExecutor::TxExec(tx) => tx.commit().await.map_err(map_sqlx_error),
        }
    }
}

/// Pool of connections to an SQLite database.
pub struct SqliteDb {
    /// Connections shared by all concurrent requests.
    pool: SqlitePool,
}

impl Drop for SqliteDb {
    fn drop(&mut self) {
        if !self.pool.is_closed() {
            warn!("SQLite pool dropped while open; call close() on shutdown");
        }
    }
}

#[async_trait]
impl Db for SqliteDb {
    async fn ex(&self) -> DbResult<Executor> {
        let conn = self.pool.acquire().await.map_err(map_sqlx_error)?;
        Ok(Executor::Sqlite(SqliteExecutor::PoolExec(conn)))
    }

    async fn begin(&self) -> DbResult<TxExecutor> {
        let tx = self.pool.begin().await.map_err(map_sqlx_error)?;
        Ok(TxExecutor(Executor::Sqlite(SqliteExecutor::TxExec(tx))))
    }

    async fn close(&self) {
        self.pool.close().await;
    }
}

/// Applies the statements in `schema`, which may contain more than one.
pub async fn run_schema(e: &mut SqliteExecutor, schema: &str) -> DbResult<()> {
    sqlx::raw_sql(schema).execute(e.conn()).await.map_err(map_sqlx_error)?;
    Ok(())
}

/// Binds the `values` produced by rendering a statement to its `query`.
///
/// Timestamps must have been split into their seconds and nanoseconds by the renderer; a
/// timestamp that reaches this point is bound as its seconds only.
pub fn bind_values<'q>(
    mut query: Query<'q, Sqlite, SqliteArguments<'q>>,
    values: &[SqlValue],
) -> Query<'q, Sqlite, SqliteArguments<'q>> {
    for value in values {
        query = match value {
            SqlValue::Bool(b) => query.bind(*b),
            SqlValue::Integer(i) => query.bind(*i),
            SqlValue::Real(f) => query.bind(*f),
            SqlValue::Text(s) => query.bind(s.clone()),
            SqlValue::Timestamp(ts) => query.bind(ts.unix_timestamp()),
        };
    }
    query
}

/// Rebuilds a timestamp from the `<column>_secs` and `<column>_nsecs` values of a row.
///
/// The seconds may be negative for instants before the epoch.  The nanoseconds always count
/// forward from the seconds, as written by `unpack_timestamp`.
pub fn build_timestamp(secs: i64, nsecs: i64) -> DbResult<OffsetDateTime> {
    if !(0..1_000_000_000).contains(&nsecs) {
        return Err(DbError::DataIntegrityError(format!(
            "Timestamp nanoseconds out of range: secs={}, nsecs={}",
            secs, nsecs
        )));
    }

    let nanos = i128::from(secs) * 1_000_000_000 + i128::from(nsecs);
    OffsetDateTime::from_unix_timestamp_nanos(nanos)
        .map_err(|e| DbError::DataIntegrityError(format!("Invalid timestamp: {}", e)))
}

/// Same as `build_timestamp` but for nullable column pairs.  Both columns must be either set or
/// unset; `name` identifies the pair in error messages.
pub fn build_optional_timestamp(
    name: &str,
    timestamp_sec: Option<i64>,
    timestamp_nsec: Option<i64>,
) -> DbResult<Option<OffsetDateTime>> {
    match (timestamp_sec, timestamp_nsec) {
        (Some(secs), Some(nsecs)) => Ok(Some(build_timestamp(secs, nsecs)?)),
        (None, None) => Ok(None),
        (_, _) => Err(DbError::DataIntegrityError(format!("Inconsistent values for {}", name))),
    }
}

/// Splits a timestamp into the `<column>_secs` and `<column>_nsecs` values of a row.
pub fn unpack_timestamp(ts: OffsetDateTime) -> (i64, i64) {
    let nanos = ts.unix_timestamp_nanos();
    // The range of `OffsetDateTime` keeps the seconds well within an `i64`.
    let secs = nanos.div_euclid(1_000_000_000) as i64;
    let nsecs = nanos.rem_euclid(1_000_000_000) as i64;
    (secs, nsecs)
}

/// Test utilities for the SQLite connection.
#[cfg(any(feature = "testutils", test))]
pub mod testutils {
    use super::*;

    /// Initializes the test database.
    pub async fn setup() -> SqliteDb {
        let _can_fail = env_logger::builder().is_test(true).try_init();
        connect(":memory:").await.unwrap()
    }
}
