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

//! Storage abstraction shared by all services.
//!
//! Services talk to the database through an `Executor`, which wraps either a pooled connection
//! or an open transaction of one of the compiled-in backends.  PostgreSQL backs the production
//! service.  SQLite backs unit tests and local runs, which is why every query in the services
//! comes in two flavors.

use crate::model::ModelError;
use async_trait::async_trait;

#[cfg(feature = "postgres")]
pub mod postgres;
pub mod sql;
#[cfg(feature = "sqlite")]
pub mod sqlite;

/// Errors raised by the storage layer.
///
/// Backends classify the constraint violations that services rely on (unique keys and foreign
/// keys) and report anything else as `BackendError`.
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum DbError {
    /// A unique constraint rejected the write.
    #[error("Already exists")]
    AlreadyExists,

    /// Unclassified failure reported by the backend.
    #[error("Database error: {0}")]
    BackendError(String),

    /// A stored row could not be turned back into a model object.
    #[error("Data integrity error: {0}")]
    DataIntegrityError(String),

    /// The row does not exist or a foreign key points nowhere.
    #[error("Entity not found")]
    NotFound,

    /// The database did not hand out a connection in time.
    #[error("Unavailable")]
    Unavailable,
}

impl From<ModelError> for DbError {
    fn from(e: ModelError) -> Self {
        DbError::DataIntegrityError(e.to_string())
    }
}

/// Result type for this module.
pub type DbResult<T> = Result<T, DbError>;

/// Typed access to one of the compiled-in backends.
///
/// `sqlx` checks queries against a concrete database type, so callers match on this enum and
/// issue the query written for each backend.  The executor may sit on top of a pooled connection
/// or of a transaction and callers cannot tell the difference.
pub enum Executor {
    /// Access to PostgreSQL.
    #[cfg(feature = "postgres")]
    Postgres(postgres::PostgresExecutor),

    /// Access to SQLite.
    #[cfg(feature = "sqlite")]
    Sqlite(sqlite::SqliteExecutor),
}

/// An `Executor` bound to a transaction that rolls back unless committed.
pub struct TxExecutor(Executor);

impl TxExecutor {
    /// Borrows the executor to run statements within the transaction.
    pub fn ex(&mut self) -> &mut Executor {
        &mut self.0
    }

    /// Makes the statements run so far durable.
    pub async fn commit(self) -> DbResult<()> {
        match self.0 {
            #[cfg(feature = "postgres")]
            Executor::Postgres(e) => e.commit().await,

            #[cfg(feature = "sqlite")]
            Executor::Sqlite(e) => e.commit().await,
        }
    }
}

/// Handle to a database connection pool.
#[async_trait]
pub trait Db {
    /// Checks out a connection from the pool.
    async fn ex(&self) -> DbResult<Executor>;

    /// Opens a transaction, which rolls back when dropped without a `commit`.
    async fn begin(&self) -> DbResult<TxExecutor>;

    /// Closes the pool once in-flight statements are done.
    async fn close(&self);
}

/// Macros to run the same database tests against every backend.
#[cfg(any(test, feature = "testutils"))]
pub mod testutils {
    pub use paste::paste;

    /// Defines test `name` that calls `module::name` with the database returned by `setup`,
    /// optionally tagged with the `extra` attribute.
    #[macro_export]
    macro_rules! generate_one_test [
        ( $name:ident, $setup:expr, $module:path $(, #[$extra:meta] )? ) => {
            #[tokio::test]
            $(#[$extra])?
            async fn $name() {
                $crate::db::testutils::paste! {
                    $module :: [< $name >]($setup).await;
                }
            }
        }
    ];

    pub use generate_one_test;

    /// Defines one test per `name` in `module`, all against the database returned by `setup`.
    ///
    /// `setup` must yield a database that already has the schema the tests expect.  Backends
    /// that need external configuration pass an `#[ignore]` as `extra`.
    #[macro_export]
    macro_rules! generate_tests [
        ( #[$extra:meta], $setup:expr, $module:path $(, $name:ident)+ ) => {
            $(
                $crate::db::testutils::generate_one_test!($name, $setup, $module, #[$extra]);
            )+
        };

        ( $setup:expr, $module:path $(, $name:ident)+ ) => {
            $(
                $crate::db::testutils::generate_one_test!($name, $setup, $module);
            )+
        };
    ];

    pub use generate_tests;
}
