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

//! The `Password` and `HashedPassword` data types.

use serde::{Deserialize, Serialize};
use std::fmt;
use tourbook_core::model::{ModelError, ModelResult};

/// Minimum number of characters in a password.
const MIN_LENGTH: usize = 8;

/// Maximum number of bytes in a password.  bcrypt ignores anything past this.
const MAX_BYTES: usize = 72;

/// An opaque type to hold a password, protecting it from leaking into logs.
#[derive(Deserialize, PartialEq, Serialize)]
#[serde(try_from = "String")]
#[cfg_attr(any(test, feature = "testutils"), derive(Clone))]
pub struct Password(String);

impl Password {
    /// Creates a new password from a literal string.
    pub fn new<S: Into<String>>(s: S) -> ModelResult<Self> {
        let s = s.into();
        if s.len() > MAX_BYTES {
            return Err(ModelError("Password is too long".to_owned()));
        }
        Ok(Password(s))
    }

    /// Returns a string view of the password.
    #[cfg(any(test, feature = "testutils"))]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Checks that `confirm` repeats this password, as typed twice by a user.
    pub fn confirm(&self, confirm: &Password) -> ModelResult<()> {
        if self.0 != confirm.0 {
            return Err(ModelError("Passwords are not the same!".to_owned()));
        }
        Ok(())
    }

    /// Hashes the password with the bcrypt work factor `cost` after validating that it is long
    /// enough.  Consumes the password because there is no context in which keeping the password
    /// alive once we have generated its hash is correct.
    pub fn validate_and_hash(self, cost: u32) -> ModelResult<HashedPassword> {
        if self.0.chars().count() < MIN_LENGTH {
            return Err(ModelError(format!(
                "Password must be at least {} characters long",
                MIN_LENGTH
            )));
        }
        let hashed =
            bcrypt::hash(self.0, cost).map_err(|e| ModelError(format!("Password error: {}", e)))?;
        Ok(HashedPassword::new(hashed))
    }

    /// Verifies if this password matches a given `hash`.
    pub fn verify(self, hash: &HashedPassword) -> ModelResult<bool> {
        bcrypt::verify(self.0, hash.as_str())
            .map_err(|e| ModelError(format!("Password error: {}", e)))
    }
}

impl TryFrom<String> for Password {
    type Error = ModelError;

    fn try_from(s: String) -> ModelResult<Self> {
        Password::new(s)
    }
}

#[cfg(any(test, feature = "testutils"))]
impl From<&'static str> for Password {
    /// Creates a new password from a hardcoded string, which must be valid.
    fn from(s: &'static str) -> Self {
        Password::new(s).expect("Hardcoded passwords must be valid")
    }
}

impl fmt::Debug for Password {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("scrubbed password")
    }
}

/// An opaque type to hold a hashed password, protecting it from leaking into logs.
#[derive(Clone, PartialEq)]
pub struct HashedPassword(String);

impl HashedPassword {
    /// Creates a new hashed password from a literal string.
    pub fn new<S: Into<String>>(s: S) -> Self {
        HashedPassword(s.into())
    }

    /// Returns a string view of the hash.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for HashedPassword {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("scrubbed hash")
    }
}
