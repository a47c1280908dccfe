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

//! Credentials handed out to users: access tokens and password reset tokens.

use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use tourbook_core::model::{Id, ModelError, ModelResult};

/// Number of random bytes in a reset token.
const RESET_TOKEN_BYTES: usize = 32;

/// Contents of an access token.
#[derive(Debug, Deserialize, PartialEq, Serialize)]
pub struct Claims {
    /// Identifier of the user the token was issued to.
    pub sub: Id,

    /// Issue time, in seconds since the epoch.
    pub iat: i64,

    /// Expiration time, in seconds since the epoch.
    pub exp: i64,
}

impl Claims {
    /// Signs these claims with `secret`, producing a token that can be handed to the user.
    pub fn sign(&self, secret: &[u8]) -> ModelResult<AccessToken> {
        let key = EncodingKey::from_secret(secret);
        jsonwebtoken::encode(&Header::new(Algorithm::HS256), self, &key)
            .map(AccessToken)
            .map_err(|e| ModelError(format!("Cannot sign token: {}", e)))
    }
}

/// A signed access token (a JWT).
#[derive(Clone, Deserialize, PartialEq, Serialize)]
#[serde(transparent)]
pub struct AccessToken(String);

impl AccessToken {
    /// Wraps a token as received from a user.  The token is not validated until `verify`.
    pub fn new<S: Into<String>>(token: S) -> Self {
        Self(token.into())
    }

    /// Returns the string representation of the token.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Checks the signature of the token against `secret` and returns its claims.
    ///
    /// The expiration time is not checked here so that the caller can compare it against its own
    /// clock.
    pub fn verify(&self, secret: &[u8]) -> ModelResult<Claims> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = false;
        jsonwebtoken::decode::<Claims>(&self.0, &DecodingKey::from_secret(secret), &validation)
            .map(|data| data.claims)
            .map_err(|e| ModelError(format!("Invalid token: {}", e)))
    }
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("scrubbed access token")
    }
}

/// A single-use token that authorizes a password reset.  Only its hash is ever stored.
#[derive(Clone, PartialEq)]
pub struct ResetToken(String);

impl ResetToken {
    /// Generates a new random token.
    pub fn generate() -> Self {
        let bytes = rand::random::<[u8; RESET_TOKEN_BYTES]>();
        Self(hex::encode(bytes))
    }

    /// Wraps a token as received from a user.
    pub fn new<S: Into<String>>(token: S) -> Self {
        Self(token.into())
    }

    /// Returns the string representation of the token.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Computes the one-way hash of the token, which is what gets persisted.
    pub fn hash(&self) -> ResetTokenHash {
        ResetTokenHash(hex::encode(Sha256::digest(self.0.as_bytes())))
    }
}

impl fmt::Debug for ResetToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("scrubbed reset token")
    }
}

/// The SHA-256 hash of a `ResetToken`, hex-encoded.
#[derive(Clone, Debug, PartialEq)]
pub struct ResetTokenHash(String);

impl ResetTokenHash {
    /// Creates a hash from its stored representation.
    pub fn new<S: Into<String>>(hash: S) -> Self {
        Self(hash.into())
    }

    /// Returns the stored representation of the hash.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}
