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

//! Extends the driver with the `signup` and `login` methods.

use crate::db;
use crate::driver::email::send_welcome;
use crate::driver::{AuthnDriver, LoginResponse};
use crate::model::{Password, User, validate_name};
use log::warn;
use tourbook_core::db::DbError;
use tourbook_core::driver::{DriverError, DriverResult};
use tourbook_core::model::{EmailAddress, Id};

/// Message returned for any login failure, so that callers cannot tell which part was wrong.
pub(crate) const BAD_CREDENTIALS_MESSAGE: &str = "Incorrect email or password";

impl AuthnDriver {
    /// Creates a new account for a user with the regular role and logs them in.
    ///
    /// A welcome message is sent once the account exists.  Failing to deliver it does not undo
    /// the signup.
    pub async fn signup(
        self,
        name: String,
        email: EmailAddress,
        password: Password,
        password_confirm: Password,
    ) -> DriverResult<LoginResponse> {
        let name = validate_name(name)?;
        password.confirm(&password_confirm)?;
        let password = password.validate_and_hash(self.opts.bcrypt_cost)?;

        let user = User::new(Id::generate(), name, email, password);

        let mut tx = self.db.begin().await?;
        match db::create_user(tx.ex(), &user).await {
            Ok(()) => (),
            Err(DbError::AlreadyExists) => {
                return Err(DriverError::AlreadyExists(
                    "Email address is already registered".to_owned(),
                ));
            }
            Err(e) => return Err(e.into()),
        }
        tx.commit().await?;

        if let Err(e) = send_welcome(self.mailer.as_ref(), &self.opts, &user).await {
            warn!("Failed to send welcome email to {}: {}", user.email().as_str(), e);
        }

        self.issue_token(user)
    }

    /// Logs in the active user with `email` and `password`.
    pub async fn login(
        self,
        email: EmailAddress,
        password: Password,
    ) -> DriverResult<LoginResponse> {
        let mut ex = self.db.ex().await?;

        let user = match db::get_active_user_by_email(&mut ex, &email).await {
            Ok(user) => user,
            Err(DbError::NotFound) => {
                return Err(DriverError::Unauthorized(BAD_CREDENTIALS_MESSAGE.to_owned()));
            }
            Err(e) => return Err(e.into()),
        };

        if !password.verify(user.password())? {
            return Err(DriverError::Unauthorized(BAD_CREDENTIALS_MESSAGE.to_owned()));
        }

        self.issue_token(user)
    }
}
