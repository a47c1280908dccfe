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

//! Extends the driver with the methods that users run on their own account.

use crate::db;
use crate::driver::AuthnDriver;
use crate::model::{User, validate_name};
use tourbook_core::db::DbError;
use tourbook_core::driver::{DriverError, DriverResult};
use tourbook_core::model::{EmailAddress, Id};

impl AuthnDriver {
    /// Updates the profile of the user `id`.  Only the name and the email address can be changed
    /// this way; fields set to `None` are left untouched.
    pub async fn update_me(
        self,
        id: Id,
        name: Option<String>,
        email: Option<EmailAddress>,
    ) -> DriverResult<User> {
        let mut tx = self.db.begin().await?;

        let mut user = db::get_active_user(tx.ex(), id).await?;
        if let Some(name) = name {
            user = user.with_name(validate_name(name)?);
        }
        if let Some(email) = email {
            user = user.with_email(email);
        }

        match db::update_user(tx.ex(), &user).await {
            Ok(()) => (),
            Err(DbError::AlreadyExists) => {
                return Err(DriverError::AlreadyExists(
                    "Email address is already registered".to_owned(),
                ));
            }
            Err(e) => return Err(e.into()),
        }
        tx.commit().await?;
        Ok(user)
    }

    /// Deactivates the account of the user `id`.  The record is kept but the user can no longer
    /// log in and their tokens stop working.
    pub async fn delete_me(self, id: Id) -> DriverResult<()> {
        let mut tx = self.db.begin().await?;
        let user = db::get_active_user(tx.ex(), id).await?.with_active(false);
        db::update_user(tx.ex(), &user).await?;
        tx.commit().await?;
        Ok(())
    }
}
