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

//! Business logic for users and their authentication.

use crate::db;
use crate::model::{AccessToken, Claims, User};
use async_trait::async_trait;
use derivative::Derivative;
use log::debug;
use std::sync::Arc;
use std::time::Duration;
use time::OffsetDateTime;
use tourbook_core::clocks::Clock;
use tourbook_core::db::{Db, DbError, Executor};
use tourbook_core::driver::{DriverError, DriverResult};
use tourbook_core::env::{get_optional_var, get_required_var};
use tourbook_core::model::Id;
use tourbook_smtp::driver::SmtpMailer;
use tourbook_smtp::model::Mailbox;
use url::Url;

pub(crate) mod email;
mod me;
mod password;
pub(crate) mod signup;
#[cfg(any(test, feature = "testutils"))]
pub mod testutils;
mod users;
pub use users::{NewUser, UserUpdate};

/// Default lifetime of access tokens.
const DEFAULT_JWT_EXPIRES_IN: Duration = Duration::from_secs(90 * 24 * 60 * 60);

/// Default lifetime of the cookie that carries access tokens.
const DEFAULT_COOKIE_EXPIRES_IN: Duration = Duration::from_secs(90 * 24 * 60 * 60);

/// Default lifetime of password reset tokens.
const DEFAULT_RESET_TOKEN_TTL: Duration = Duration::from_secs(10 * 60);

/// Default bcrypt work factor.
const DEFAULT_BCRYPT_COST: u32 = 12;

/// Amount of time by which password changes are backdated.
///
/// Tokens issued right after a password change carry an issue time that can round down to the
/// same second as the change, and they must not be considered stale.
const PASSWORD_CHANGE_BACKDATE: Duration = Duration::from_secs(1);

/// Configuration options for the authentication driver.
#[derive(Clone, Derivative)]
#[derivative(Debug)]
#[cfg_attr(test, derive(PartialEq))]
pub struct AuthnOptions {
    /// Secret used to sign and verify access tokens.
    #[derivative(Debug = "ignore")]
    pub jwt_secret: String,

    /// Lifetime of access tokens.
    pub jwt_expires_in: Duration,

    /// Lifetime of the cookie that carries access tokens.
    pub cookie_expires_in: Duration,

    /// Lifetime of password reset tokens.
    pub reset_token_ttl: Duration,

    /// Sender of the emails sent to users.
    pub email_from: Mailbox,

    /// Public base URL of the service, used to build links in emails.
    pub public_url: Url,

    /// bcrypt work factor for password hashes.
    pub bcrypt_cost: u32,

    /// Whether to mark cookies as only valid over HTTPS.  Not read from the environment: the
    /// server decides based on its mode.
    pub secure_cookies: bool,
}

impl AuthnOptions {
    /// Creates a new set of options from environment variables whose name is prefixed with
    /// `prefix`.
    pub fn from_env(prefix: &str) -> Result<Self, String> {
        let email_from = get_required_var::<String>(prefix, "EMAIL_FROM")?;
        let email_from = email_from
            .parse::<Mailbox>()
            .map_err(|e| format!("Invalid mailbox in {}_EMAIL_FROM: {}", prefix, e))?;

        Ok(Self {
            jwt_secret: get_required_var::<String>(prefix, "JWT_SECRET")?,
            jwt_expires_in: get_optional_var::<Duration>(prefix, "JWT_EXPIRES_IN")?
                .unwrap_or(DEFAULT_JWT_EXPIRES_IN),
            cookie_expires_in: get_optional_var::<Duration>(prefix, "COOKIE_EXPIRES_IN")?
                .unwrap_or(DEFAULT_COOKIE_EXPIRES_IN),
            reset_token_ttl: get_optional_var::<Duration>(prefix, "RESET_TOKEN_TTL")?
                .unwrap_or(DEFAULT_RESET_TOKEN_TTL),
            email_from,
            public_url: get_required_var::<Url>(prefix, "PUBLIC_URL")?,
            bcrypt_cost: get_optional_var::<u32>(prefix, "BCRYPT_COST")?
                .unwrap_or(DEFAULT_BCRYPT_COST),
            secure_cookies: false,
        })
    }
}

/// Result of an operation that authenticates a user.
#[derive(Debug)]
pub struct LoginResponse {
    /// Token that the user must present in subsequent requests.
    pub access_token: AccessToken,

    /// The authenticated user.
    pub user: User,
}

/// Cleanup that other services must run when a user goes away.
///
/// Hooks run in registration order within the transaction that deletes the user and before the
/// user's row is removed.  An error from any hook aborts the deletion.
#[async_trait]
pub trait UserDeletionHook {
    /// Removes or fixes up any data derived from `user` using the transaction in `ex`.
    async fn before_delete_user(&self, ex: &mut Executor, user: Id) -> DriverResult<()>;
}

/// Business logic.
///
/// The public operations exposed by the driver are all "one shot": they start and commit a
/// transaction, so it's incorrect for the caller to use two separate calls.  For this reason,
/// these operations consume the driver in an attempt to minimize the possibility of executing
/// two operations.
#[derive(Clone)]
pub struct AuthnDriver {
    /// The database that the driver uses for persistence.
    db: Arc<dyn Db + Send + Sync>,

    /// Clock instance to obtain the current time.
    clock: Arc<dyn Clock + Send + Sync>,

    /// Service to send email notifications with.
    mailer: Arc<dyn SmtpMailer + Send + Sync>,

    /// Options for the authentication driver.
    opts: Arc<AuthnOptions>,

    /// Hooks to run before deleting a user.
    deletion_hooks: Vec<Arc<dyn UserDeletionHook + Send + Sync>>,
}

impl AuthnDriver {
    /// Creates a new driver backed by the given dependencies.
    pub fn new(
        db: Arc<dyn Db + Send + Sync>,
        clock: Arc<dyn Clock + Send + Sync>,
        mailer: Arc<dyn SmtpMailer + Send + Sync>,
        opts: AuthnOptions,
    ) -> Self {
        Self { db, clock, mailer, opts: Arc::from(opts), deletion_hooks: vec![] }
    }

    /// Registers `hook` to run whenever a user is deleted.
    pub fn with_deletion_hook(mut self, hook: Arc<dyn UserDeletionHook + Send + Sync>) -> Self {
        self.deletion_hooks.push(hook);
        self
    }

    /// Returns the authentication options provided at creation time.
    pub(crate) fn opts(&self) -> Arc<AuthnOptions> {
        self.opts.clone()
    }

    /// Returns the time to record for a password change happening now.
    fn password_changed_at(&self) -> OffsetDateTime {
        self.clock.now_utc() - PASSWORD_CHANGE_BACKDATE
    }

    /// Issues a new access token for `user`.
    fn issue_token(&self, user: User) -> DriverResult<LoginResponse> {
        let iat = self.clock.now_utc().unix_timestamp();
        let lifetime = i64::try_from(self.opts.jwt_expires_in.as_secs()).unwrap_or(i64::MAX);
        let exp = iat.saturating_add(lifetime);
        let claims = Claims { sub: user.id(), iat, exp };
        let access_token = claims
            .sign(self.opts.jwt_secret.as_bytes())
            .map_err(|e| DriverError::BackendError(e.to_string()))?;
        Ok(LoginResponse { access_token, user })
    }

    /// Validates `token` and returns the user it belongs to.
    ///
    /// The token must carry a valid signature, must not have expired, must belong to an active
    /// user, and must have been issued after the user's last password change.
    pub async fn authenticate(self, token: AccessToken) -> DriverResult<User> {
        let claims = match token.verify(self.opts.jwt_secret.as_bytes()) {
            Ok(claims) => claims,
            Err(e) => {
                debug!("Rejecting access token: {}", e);
                return Err(DriverError::Unauthorized(
                    "Invalid token. Please log in again!".to_owned(),
                ));
            }
        };

        if claims.exp <= self.clock.now_utc().unix_timestamp() {
            debug!("Rejecting expired access token for {}", claims.sub);
            return Err(DriverError::Unauthorized(
                "Your token has expired! Please log in again.".to_owned(),
            ));
        }

        let mut ex = self.db.ex().await?;
        let user = match db::get_active_user(&mut ex, claims.sub).await {
            Ok(user) => user,
            Err(DbError::NotFound) => {
                debug!("Rejecting access token for unknown user {}", claims.sub);
                return Err(DriverError::Unauthorized(
                    "The user belonging to this token does no longer exist.".to_owned(),
                ));
            }
            Err(e) => return Err(e.into()),
        };

        if user.changed_password_after(claims.iat) {
            debug!("Rejecting access token for {} issued before a password change", claims.sub);
            return Err(DriverError::Unauthorized(
                "User recently changed password! Please log in again.".to_owned(),
            ));
        }

        Ok(user)
    }
}
