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

//! Error vocabulary of the business layer.
//!
//! Service drivers are cheap to clone and their operations take `self` by value.  An operation
//! owns its transaction from `begin` to `commit`, so running two of them requires an explicit
//! clone at the call site:
//!
//! ```rust
//! use std::sync::Arc;
//! use tourbook_core::clocks::Clock;
//! use tourbook_core::db::Db;
//!
//! #[derive(Clone)]
//! pub struct BookingsDriver {
//!     /// Where bookings are stored.
//!     db: Arc<dyn Db + Send + Sync>,
//!
//!     /// Source of creation timestamps.
//!     clock: Arc<dyn Clock + Send + Sync>,
//! }
//! ```

use crate::db::DbError;
use crate::model::ModelError;

/// Failures of a business operation.  The payload is the message shown to the caller.
#[derive(Debug, PartialEq, thiserror::Error)]
pub enum DriverError {
    /// The entity collides with an existing one.
    #[error("{0}")]
    AlreadyExists(String),

    /// The storage layer failed in an unexpected way.
    #[error("{0}")]
    BackendError(String),

    /// The request carried invalid data.
    #[error("{0}")]
    InvalidInput(String),

    /// The entity does not exist.
    #[error("{0}")]
    NotFound(String),

    /// The credentials are missing, wrong or stale.
    #[error("{0}")]
    Unauthorized(String),
}

impl From<DbError> for DriverError {
    fn from(e: DbError) -> Self {
        match e {
            DbError::AlreadyExists => DriverError::AlreadyExists(e.to_string()),
            DbError::NotFound => DriverError::NotFound(e.to_string()),
            DbError::BackendError(_) | DbError::DataIntegrityError(_) | DbError::Unavailable => {
                DriverError::BackendError(e.to_string())
            }
        }
    }
}

impl From<ModelError> for DriverError {
    fn from(e: ModelError) -> Self {
        DriverError::InvalidInput(e.0)
    }
}

/// Result type for this module.
pub type DriverResult<T> = Result<T, DriverError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_db_error() {
        assert_eq!(
            DriverError::AlreadyExists("Already exists".to_owned()),
            DriverError::from(DbError::AlreadyExists)
        );
        assert_eq!(
            DriverError::NotFound("Entity not found".to_owned()),
            DriverError::from(DbError::NotFound)
        );
        assert_eq!(
            DriverError::BackendError("Data integrity error: bad row".to_owned()),
            DriverError::from(DbError::DataIntegrityError("bad row".to_owned()))
        );
        assert_eq!(
            DriverError::BackendError("Unavailable".to_owned()),
            DriverError::from(DbError::Unavailable)
        );
    }

    #[test]
    fn test_from_model_error_keeps_message() {
        assert_eq!(
            DriverError::InvalidInput("Rating must be between 1 and 5".to_owned()),
            DriverError::from(ModelError("Rating must be between 1 and 5".to_owned()))
        );
    }
}
