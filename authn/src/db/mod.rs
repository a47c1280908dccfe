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

//! Database abstraction to manipulate users.
//!
//! Accounts that have been deactivated are invisible to most operations, so the functions in
//! here spell out whether they consider all users or only the active ones.

use crate::model::{HashedPassword, ResetTokenHash, Role, User};
#[cfg(feature = "postgres")]
use sqlx::postgres::PgRow;
#[cfg(any(feature = "sqlite", test))]
use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use std::str::FromStr;
use time::OffsetDateTime;
#[cfg(feature = "postgres")]
use tourbook_core::db::postgres;
#[cfg(any(feature = "sqlite", test))]
use tourbook_core::db::sqlite::{self, build_optional_timestamp, unpack_timestamp};
use tourbook_core::db::sql::{Dialect, Select};
use tourbook_core::db::{DbError, DbResult, Executor};
use tourbook_core::model::{EmailAddress, Id};
use tourbook_core::query::{FieldKind, FieldSpec, ListQuery};


/// Fields of a user that can be used in list queries.
pub const USER_FIELDS: &[FieldSpec] = &[
    FieldSpec::new("name", "name", FieldKind::Text),
    FieldSpec::new("email", "email", FieldKind::Text),
    FieldSpec::new("photo", "photo", FieldKind::Text),
    FieldSpec::new("role", "role", FieldKind::Text).repeatable(),
];

/// Query that lists all active users.
const ACTIVE_USERS: Select<'static> =
    Select { columns: "*", from: "users", id_column: "id", conditions: &["active = TRUE"] };

/// Initializes the database schema.
pub async fn init_schema(ex: &mut Executor) -> DbResult<()> {
    match ex {
        #[cfg(feature = "postgres")]
        Executor::Postgres(ex) => postgres::run_schema(ex, include_str!("postgres.sql")).await,

        #[cfg(any(feature = "sqlite", test))]
        Executor::Sqlite(ex) => sqlite::run_schema(ex, include_str!("sqlite.sql")).await,

        #[allow(unused)]
        _ => unreachable!(),
    }
}

/// Assembles a `User` from the raw values of a row.
#[allow(clippy::too_many_arguments)]
fn build_user(
    id: String,
    name: String,
    email: String,
    photo: String,
    role: String,
    password: String,
    password_changed_at: Option<OffsetDateTime>,
    password_reset_hash: Option<String>,
    password_reset_expires: Option<OffsetDateTime>,
    active: bool,
) -> DbResult<User> {
    let password_reset = match (password_reset_hash, password_reset_expires) {
        (Some(hash), Some(expires)) => Some((ResetTokenHash::new(hash), expires)),
        (None, None) => None,
        (_, _) => {
            return Err(DbError::DataIntegrityError(
                "Inconsistent values for password_reset".to_owned(),
            ));
        }
    };

    Ok(User::new(Id::parse(id)?, name, EmailAddress::new(email)?, HashedPassword::new(password))
        .with_photo(photo)
        .with_role(Role::from_str(&role)?)
        .with_password_changed_at(password_changed_at)
        .with_password_reset(password_reset)
        .with_active(active))
}

#[cfg(feature = "postgres")]
impl TryFrom<PgRow> for User {
    type Error = DbError;

    fn try_from(row: PgRow) -> DbResult<Self> {
        let id: String = row.try_get("id").map_err(postgres::map_sqlx_error)?;
        let name: String = row.try_get("name").map_err(postgres::map_sqlx_error)?;
        let email: String = row.try_get("email").map_err(postgres::map_sqlx_error)?;
        let photo: String = row.try_get("photo").map_err(postgres::map_sqlx_error)?;
        let role: String = row.try_get("role").map_err(postgres::map_sqlx_error)?;
        let password: String = row.try_get("password").map_err(postgres::map_sqlx_error)?;
        let password_changed_at: Option<OffsetDateTime> =
            row.try_get("password_changed_at").map_err(postgres::map_sqlx_error)?;
        let password_reset_hash: Option<String> =
            row.try_get("password_reset_hash").map_err(postgres::map_sqlx_error)?;
        let password_reset_expires: Option<OffsetDateTime> =
            row.try_get("password_reset_expires").map_err(postgres::map_sqlx_error)?;
        let active: bool = row.try_get("active").map_err(postgres::map_sqlx_error)?;

        build_user(
            id,
            name,
            email,
            photo,
            role,
            password,
            password_changed_at,
            password_reset_hash,
            password_reset_expires,
            active,
        )
    }
}

#[cfg(any(feature = "sqlite", test))]
impl TryFrom<SqliteRow> for User {
    type Error = DbError;

    fn try_from(row: SqliteRow) -> DbResult<Self> {
        let id: String = row.try_get("id").map_err(sqlite::map_sqlx_error)?;
        let name: String = row.try_get("name").map_err(sqlite::map_sqlx_error)?;
        let email: String = row.try_get("email").map_err(sqlite::map_sqlx_error)?;
        let photo: String = row.try_get("photo").map_err(sqlite::map_sqlx_error)?;
        let role: String = row.try_get("role").map_err(sqlite::map_sqlx_error)?;
        let password: String = row.try_get("password").map_err(sqlite::map_sqlx_error)?;
        let password_changed_at_secs: Option<i64> =
            row.try_get("password_changed_at_secs").map_err(sqlite::map_sqlx_error)?;
        let password_changed_at_nsecs: Option<i64> =
            row.try_get("password_changed_at_nsecs").map_err(sqlite::map_sqlx_error)?;
        let password_reset_hash: Option<String> =
            row.try_get("password_reset_hash").map_err(sqlite::map_sqlx_error)?;
        let password_reset_expires_secs: Option<i64> =
            row.try_get("password_reset_expires_secs").map_err(sqlite::map_sqlx_error)?;
        let password_reset_expires_nsecs: Option<i64> =
            row.try_get("password_reset_expires_nsecs").map_err(sqlite::map_sqlx_error)?;
        let active: bool = row.try_get("active").map_err(sqlite::map_sqlx_error)?;

        let password_changed_at = build_optional_timestamp(
            "password_changed_at",
            password_changed_at_secs,
            password_changed_at_nsecs,
        )?;
        let password_reset_expires = build_optional_timestamp(
            "password_reset_expires",
            password_reset_expires_secs,
            password_reset_expires_nsecs,
        )?;

        build_user(
            id,
            name,
            email,
            photo,
            role,
            password,
            password_changed_at,
            password_reset_hash,
            password_reset_expires,
            active,
        )
    }
}

/// Splits an optional timestamp into the optional pair of columns used by SQLite.
#[cfg(any(feature = "sqlite", test))]
fn unpack_optional_timestamp(ts: Option<OffsetDateTime>) -> (Option<i64>, Option<i64>) {
    match ts {
        Some(ts) => {
            let (secs, nsecs) = unpack_timestamp(ts);
            (Some(secs), Some(nsecs))
        }
        None => (None, None),
    }
}

/// Creates a new `user`.  Fails with `AlreadyExists` if the email address is taken.
pub(crate) async fn create_user(ex: &mut Executor, user: &User) -> DbResult<()> {
    let reset_hash = user.password_reset().map(|(hash, _)| hash.as_str().to_owned());
    let reset_expires = user.password_reset().map(|(_, expires)| *expires);

    let rows_affected = match ex {
        #[cfg(feature = "postgres")]
        Executor::Postgres(ex) => {
            let query_str = "
                INSERT INTO users (
                    id, name, email, photo, role, password, password_changed_at,
                    password_reset_hash, password_reset_expires, active
                ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)";
            let done = sqlx::query(query_str)
                .bind(user.id().to_db())
                .bind(user.name())
                .bind(user.email().as_str())
                .bind(user.photo())
                .bind(user.role().as_str())
                .bind(user.password().as_str())
                .bind(user.password_changed_at())
                .bind(reset_hash)
                .bind(reset_expires)
                .bind(user.active())
                .execute(ex.conn())
                .await
                .map_err(postgres::map_sqlx_error)?;
            done.rows_affected()
        }

        #[cfg(any(feature = "sqlite", test))]
        Executor::Sqlite(ex) => {
            let (changed_secs, changed_nsecs) =
                unpack_optional_timestamp(user.password_changed_at());
            let (expires_secs, expires_nsecs) = unpack_optional_timestamp(reset_expires);

            let query_str = "
                INSERT INTO users (
                    id, name, email, photo, role, password,
                    password_changed_at_secs, password_changed_at_nsecs,
                    password_reset_hash, password_reset_expires_secs,
                    password_reset_expires_nsecs, active
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)";
            let done = sqlx::query(query_str)
                .bind(user.id().to_db())
                .bind(user.name())
                .bind(user.email().as_str())
                .bind(user.photo())
                .bind(user.role().as_str())
                .bind(user.password().as_str())
                .bind(changed_secs)
                .bind(changed_nsecs)
                .bind(reset_hash)
                .bind(expires_secs)
                .bind(expires_nsecs)
                .bind(user.active())
                .execute(ex.conn())
                .await
                .map_err(sqlite::map_sqlx_error)?;
            done.rows_affected()
        }

        #[allow(unused)]
        _ => unreachable!(),
    };

    if rows_affected != 1 {
        return Err(DbError::BackendError("Insertion affected more than one row".to_owned()));
    }
    Ok(())
}

/// Fetches the single user that matches a condition.
///
/// The condition is given once per backend, `pg_where` and `sqlite_where`, because placeholders
/// differ.  Each must have one placeholder per value in `binds`.
async fn get_one_user(
    ex: &mut Executor,
    pg_where: &str,
    sqlite_where: &str,
    binds: &[&str],
) -> DbResult<User> {
    match ex {
        #[cfg(feature = "postgres")]
        Executor::Postgres(ex) => {
            let query_str = format!("SELECT * FROM users WHERE {}", pg_where);
            let mut query = sqlx::query(&query_str);
            for bind in binds {
                query = query.bind(*bind);
            }
            let raw_user =
                query.fetch_one(ex.conn()).await.map_err(postgres::map_sqlx_error)?;
            User::try_from(raw_user)
        }

        #[cfg(any(feature = "sqlite", test))]
        Executor::Sqlite(ex) => {
            let query_str = format!("SELECT * FROM users WHERE {}", sqlite_where);
            let mut query = sqlx::query(&query_str);
            for bind in binds {
                query = query.bind(*bind);
            }
            let raw_user = query.fetch_one(ex.conn()).await.map_err(sqlite::map_sqlx_error)?;
            User::try_from(raw_user)
        }

        #[allow(unused)]
        _ => unreachable!(),
    }
}

/// Gets a user by `id` regardless of whether their account is active.
pub(crate) async fn get_user(ex: &mut Executor, id: Id) -> DbResult<User> {
    get_one_user(ex, "id = $1", "id = ?", &[id.to_db().as_str()]).await
}

/// Gets a user by `id` only if their account is active.
pub(crate) async fn get_active_user(ex: &mut Executor, id: Id) -> DbResult<User> {
    let id = id.to_db();
    get_one_user(ex, "id = $1 AND active = TRUE", "id = ? AND active = TRUE", &[id.as_str()]).await
}

/// Gets an active user by their `email` address.
pub(crate) async fn get_active_user_by_email(
    ex: &mut Executor,
    email: &EmailAddress,
) -> DbResult<User> {
    let (pg_where, sqlite_where) = ("email = $1 AND active = TRUE", "email = ? AND active = TRUE");
    get_one_user(ex, pg_where, sqlite_where, &[email.as_str()]).await
}

/// Gets the active user with a pending password reset whose token hashes to `hash` and that has
/// not expired as of `now`.
pub(crate) async fn get_active_user_by_reset_token(
    ex: &mut Executor,
    hash: &ResetTokenHash,
    now: OffsetDateTime,
) -> DbResult<User> {
    match ex {
        #[cfg(feature = "postgres")]
        Executor::Postgres(ex) => {
            let query_str = "
                SELECT * FROM users
                WHERE password_reset_hash = $1 AND password_reset_expires > $2 AND active = TRUE";
            let raw_user = sqlx::query(query_str)
                .bind(hash.as_str())
                .bind(now)
                .fetch_one(ex.conn())
                .await
                .map_err(postgres::map_sqlx_error)?;
            User::try_from(raw_user)
        }

        #[cfg(any(feature = "sqlite", test))]
        Executor::Sqlite(ex) => {
            let (now_secs, now_nsecs) = unpack_timestamp(now);

            let query_str = "
                SELECT * FROM users
                WHERE
                    password_reset_hash = ? AND
                    (password_reset_expires_secs, password_reset_expires_nsecs) > (?, ?) AND
                    active = TRUE";
            let raw_user = sqlx::query(query_str)
                .bind(hash.as_str())
                .bind(now_secs)
                .bind(now_nsecs)
                .fetch_one(ex.conn())
                .await
                .map_err(sqlite::map_sqlx_error)?;
            User::try_from(raw_user)
        }

        #[allow(unused)]
        _ => unreachable!(),
    }
}

/// Lists the active users that match `query`.
pub(crate) async fn list_active_users(
    ex: &mut Executor,
    query: &ListQuery,
) -> DbResult<Vec<User>> {
    let mut users = vec![];
    match ex {
        #[cfg(feature = "postgres")]
        Executor::Postgres(ex) => {
            let (query_str, values) = ACTIVE_USERS.render(Dialect::Postgres, query);
            let rows = postgres::bind_values(sqlx::query(&query_str), &values)
                .fetch_all(ex.conn())
                .await
                .map_err(postgres::map_sqlx_error)?;
            for row in rows {
                users.push(User::try_from(row)?);
            }
        }

        #[cfg(any(feature = "sqlite", test))]
        Executor::Sqlite(ex) => {
            let (query_str, values) = ACTIVE_USERS.render(Dialect::Sqlite, query);
            let rows = sqlite::bind_values(sqlx::query(&query_str), &values)
                .fetch_all(ex.conn())
                .await
                .map_err(sqlite::map_sqlx_error)?;
            for row in rows {
                users.push(User::try_from(row)?);
            }
        }

        #[allow(unused)]
        _ => unreachable!(),
    }
    Ok(users)
}

/// Persists all mutable fields of an existing `user`.
pub(crate) async fn update_user(ex: &mut Executor, user: &User) -> DbResult<()> {
    let reset_hash = user.password_reset().map(|(hash, _)| hash.as_str().to_owned());
    let reset_expires = user.password_reset().map(|(_, expires)| *expires);

    let rows_affected = match ex {
        #[cfg(feature = "postgres")]
        Executor::Postgres(ex) => {
            let query_str = "
                UPDATE users
                SET
                    name = $1, email = $2, photo = $3, role = $4, password = $5,
                    password_changed_at = $6, password_reset_hash = $7,
                    password_reset_expires = $8, active = $9
                WHERE id = $10";
            let done = sqlx::query(query_str)
                .bind(user.name())
                .bind(user.email().as_str())
                .bind(user.photo())
                .bind(user.role().as_str())
                .bind(user.password().as_str())
                .bind(user.password_changed_at())
                .bind(reset_hash)
                .bind(reset_expires)
                .bind(user.active())
                .bind(user.id().to_db())
                .execute(ex.conn())
                .await
                .map_err(postgres::map_sqlx_error)?;
            done.rows_affected()
        }

        #[cfg(any(feature = "sqlite", test))]
        Executor::Sqlite(ex) => {
            let (changed_secs, changed_nsecs) =
                unpack_optional_timestamp(user.password_changed_at());
            let (expires_secs, expires_nsecs) = unpack_optional_timestamp(reset_expires);

            let query_str = "
                UPDATE users
                SET
                    name = ?, email = ?, photo = ?, role = ?, password = ?,
                    password_changed_at_secs = ?, password_changed_at_nsecs = ?,
                    password_reset_hash = ?, password_reset_expires_secs = ?,
                    password_reset_expires_nsecs = ?, active = ?
                WHERE id = ?";
            let done = sqlx::query(query_str)
                .bind(user.name())
                .bind(user.email().as_str())
                .bind(user.photo())
                .bind(user.role().as_str())
                .bind(user.password().as_str())
                .bind(changed_secs)
                .bind(changed_nsecs)
                .bind(reset_hash)
                .bind(expires_secs)
                .bind(expires_nsecs)
                .bind(user.active())
                .bind(user.id().to_db())
                .execute(ex.conn())
                .await
                .map_err(sqlite::map_sqlx_error)?;
            done.rows_affected()
        }

        #[allow(unused)]
        _ => unreachable!(),
    };

    match rows_affected {
        0 => Err(DbError::NotFound),
        1 => Ok(()),
        _ => Err(DbError::BackendError("Update affected more than one row".to_owned())),
    }
}

/// Deletes the user identified by `id` from storage.
pub(crate) async fn delete_user(ex: &mut Executor, id: Id) -> DbResult<()> {
    let rows_affected = match ex {
        #[cfg(feature = "postgres")]
        Executor::Postgres(ex) => {
            let done = sqlx::query("DELETE FROM users WHERE id = $1")
                .bind(id.to_db())
                .execute(ex.conn())
                .await
                .map_err(postgres::map_sqlx_error)?;
            done.rows_affected()
        }

        #[cfg(any(feature = "sqlite", test))]
        Executor::Sqlite(ex) => {
            let done = sqlx::query("DELETE FROM users WHERE id = ?")
                .bind(id.to_db())
                .execute(ex.conn())
                .await
                .map_err(sqlite::map_sqlx_error)?;
            done.rows_affected()
        }

        #[allow(unused)]
        _ => unreachable!(),
    };

    match rows_affected {
        0 => Err(DbError::NotFound),
        1 => Ok(()),
        _ => Err(DbError::BackendError("Delete affected more than one row".to_owned())),
    }
}
