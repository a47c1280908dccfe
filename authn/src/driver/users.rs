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

//! Extends the driver with the administrative operations on users.

use crate::db;
use crate::driver::AuthnDriver;
use crate::model::{Password, Role, User, validate_name};
use serde::Deserialize;
use tourbook_core::db::DbError;
use tourbook_core::driver::{DriverError, DriverResult};
use tourbook_core::model::{EmailAddress, Id};
use tourbook_core::query::ListQuery;

/// Details of a user created by an administrator.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewUser {
    /// Display name of the user.
    pub name: String,

    /// Email of the user.
    pub email: EmailAddress,

    /// Initial password of the user.
    pub password: Password,

    /// Repetition of `password`.
    pub password_confirm: Password,

    /// Role of the user.  Regular users if not specified.
    #[serde(default)]
    pub role: Option<Role>,

    /// Reference to the profile photo of the user.
    #[serde(default)]
    pub photo: Option<String>,
}

/// Changes to apply to a user, as requested by an administrator.  Passwords cannot be changed
/// this way.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserUpdate {
    /// New display name.
    #[serde(default)]
    pub name: Option<String>,

    /// New email address.
    #[serde(default)]
    pub email: Option<EmailAddress>,

    /// New profile photo reference.
    #[serde(default)]
    pub photo: Option<String>,

    /// New role.
    #[serde(default)]
    pub role: Option<Role>,

    /// Whether the account is active.
    #[serde(default)]
    pub active: Option<bool>,
}

/// Converts a storage error on a write into the error to report to the caller.
fn map_write_error(e: DbError) -> DriverError {
    match e {
        DbError::AlreadyExists => {
            DriverError::AlreadyExists("Email address is already registered".to_owned())
        }
        e => e.into(),
    }
}

impl AuthnDriver {
    /// Creates a user on behalf of an administrator.
    pub async fn create_user(self, new: NewUser) -> DriverResult<User> {
        let name = validate_name(new.name)?;
        new.password.confirm(&new.password_confirm)?;
        let password = new.password.validate_and_hash(self.opts.bcrypt_cost)?;

        let mut user = User::new(Id::generate(), name, new.email, password)
            .with_role(new.role.unwrap_or_default());
        if let Some(photo) = new.photo {
            user = user.with_photo(photo);
        }

        let mut tx = self.db.begin().await?;
        db::create_user(tx.ex(), &user).await.map_err(map_write_error)?;
        tx.commit().await?;
        Ok(user)
    }

    /// Gets the active user `id`.
    pub async fn get_user(self, id: Id) -> DriverResult<User> {
        let mut ex = self.db.ex().await?;
        Ok(db::get_active_user(&mut ex, id).await?)
    }

    /// Lists the active users that match `query`.
    pub async fn list_users(self, query: ListQuery) -> DriverResult<Vec<User>> {
        let mut ex = self.db.ex().await?;
        Ok(db::list_active_users(&mut ex, &query).await?)
    }

    /// Applies `update` to the user `id`, whether their account is active or not.
    pub async fn update_user(self, id: Id, update: UserUpdate) -> DriverResult<User> {
        let mut tx = self.db.begin().await?;

        let mut user = db::get_user(tx.ex(), id).await?;
        if let Some(name) = update.name {
            user = user.with_name(validate_name(name)?);
        }
        if let Some(email) = update.email {
            user = user.with_email(email);
        }
        if let Some(photo) = update.photo {
            user = user.with_photo(photo);
        }
        if let Some(role) = update.role {
            user = user.with_role(role);
        }
        if let Some(active) = update.active {
            user = user.with_active(active);
        }

        db::update_user(tx.ex(), &user).await.map_err(map_write_error)?;
        tx.commit().await?;
        Ok(user)
    }

    /// Removes the user `id` from storage, whether their account is active or not.
    ///
    /// The registered deletion hooks run first, within the same transaction.
    pub async fn delete_user(self, id: Id) -> DriverResult<()> {
        let mut tx = self.db.begin().await?;
        db::get_user(tx.ex(), id).await?;
        for hook in &self.deletion_hooks {
            hook.before_delete_user(tx.ex(), id).await?;
        }
        db::delete_user(tx.ex(), id).await?;
        tx.commit().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::USER_FIELDS;
    use crate::driver::UserDeletionHook;
    use crate::driver::testutils::*;
    use async_trait::async_trait;
    use std::sync::{Arc, Mutex};
    use tourbook_core::db::Executor;

    fn new_user(name: &str, email: &str) -> NewUser {
        NewUser {
            name: name.to_owned(),
            email: EmailAddress::new(email).unwrap(),
            password: Password::from("pass1234"),
            password_confirm: Password::from("pass1234"),
            role: None,
            photo: None,
        }
    }

    #[tokio::test]
    async fn test_create_user_ok() {
        let context = TestContext::setup().await;

        let new = NewUser {
            role: Some(Role::LeadGuide),
            photo: Some("lead.jpg".to_owned()),
            ..new_user("Lead", "lead@example.com")
        };
        let user = context.driver().create_user(new).await.unwrap();
        assert_eq!(Role::LeadGuide, user.role());
        assert_eq!("lead.jpg", user.photo());
        assert_eq!(user, context.driver().get_user(user.id()).await.unwrap());

        let user = context.driver().create_user(new_user("Reg", "reg@example.com")).await.unwrap();
        assert_eq!(Role::User, user.role());
        assert_eq!("default.jpg", user.photo());
    }

    #[tokio::test]
    async fn test_create_user_duplicate() {
        let context = TestContext::setup().await;
        context.driver().create_user(new_user("A", "a@example.com")).await.unwrap();

        match context.driver().create_user(new_user("B", "a@example.com")).await {
            Err(DriverError::AlreadyExists(msg)) => assert!(msg.contains("already registered")),
            e => panic!("{:?}", e),
        }
    }

    #[tokio::test]
    async fn test_get_user_hides_inactive() {
        let context = TestContext::setup().await;
        let created = context.create_user("Jane", Role::User).await;
        context.driver().delete_me(created.user.id()).await.unwrap();

        match context.driver().get_user(created.user.id()).await {
            Err(DriverError::NotFound(_)) => (),
            e => panic!("{:?}", e),
        }
    }

    #[tokio::test]
    async fn test_list_users() {
        let context = TestContext::setup().await;
        let jane = context.create_user("Jane", Role::Guide).await;
        let john = context.create_user("John", Role::User).await;
        let gone = context.create_user("Gone", Role::Guide).await;
        context.driver().delete_me(gone.user.id()).await.unwrap();

        let query = ListQuery::parse(&[("sort".to_owned(), "name".to_owned())], USER_FIELDS)
            .unwrap();
        let users = context.driver().list_users(query).await.unwrap();
        assert_eq!(vec![jane.user.clone(), john.user], users);

        let query = ListQuery::parse(&[("role".to_owned(), "guide".to_owned())], USER_FIELDS)
            .unwrap();
        let users = context.driver().list_users(query).await.unwrap();
        assert_eq!(vec![jane.user], users);
    }

    #[tokio::test]
    async fn test_update_user_idempotent() {
        let context = TestContext::setup().await;
        let created = context.create_user("Jane", Role::User).await;

        let update = || UserUpdate {
            name: Some("Jane Roe".to_owned()),
            role: Some(Role::Guide),
            ..Default::default()
        };
        let user1 = context.driver().update_user(created.user.id(), update()).await.unwrap();
        let user2 = context.driver().update_user(created.user.id(), update()).await.unwrap();
        assert_eq!(user1, user2);
        assert_eq!("Jane Roe", user2.name());
        assert_eq!(Role::Guide, user2.role());
        assert_eq!(created.user.password(), user2.password());
    }

    #[tokio::test]
    async fn test_update_user_reactivates() {
        let context = TestContext::setup().await;
        let created = context.create_user("Jane", Role::User).await;
        context.driver().delete_me(created.user.id()).await.unwrap();

        let update = UserUpdate { active: Some(true), ..Default::default() };
        let user = context.driver().update_user(created.user.id(), update).await.unwrap();
        assert!(user.active());
        context.driver().authenticate(created.access_token).await.unwrap();
    }

    #[tokio::test]
    async fn test_update_user_not_found() {
        let context = TestContext::setup().await;

        match context.driver().update_user(Id::generate(), UserUpdate::default()).await {
            Err(DriverError::NotFound(_)) => (),
            e => panic!("{:?}", e),
        }
    }

    #[tokio::test]
    async fn test_delete_user_removes_record() {
        let context = TestContext::setup().await;
        let created = context.create_user("Jane", Role::User).await;

        context.driver().delete_user(created.user.id()).await.unwrap();
        assert_eq!(
            DbError::NotFound,
            db::get_user(&mut context.ex().await, created.user.id()).await.unwrap_err()
        );
        match context.driver().delete_user(created.user.id()).await {
            Err(DriverError::NotFound(_)) => (),
            e => panic!("{:?}", e),
        }
    }

    /// Deletion hook that records the users it sees and optionally fails.
    #[derive(Default)]
    struct RecordingHook {
        seen: Mutex<Vec<Id>>,
        fail: bool,
    }

    #[async_trait]
    impl UserDeletionHook for RecordingHook {
        async fn before_delete_user(&self, ex: &mut Executor, user: Id) -> DriverResult<()> {
            db::get_user(ex, user).await?;
            self.seen.lock().unwrap().push(user);
            if self.fail {
                return Err(DriverError::BackendError("Cleanup failed".to_owned()));
            }
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_delete_user_runs_hooks_before_removal() {
        let context = TestContext::setup().await;
        let created = context.create_user("Jane", Role::User).await;
        let hook = Arc::new(RecordingHook::default());

        let driver = context.driver().with_deletion_hook(hook.clone());
        driver.delete_user(created.user.id()).await.unwrap();
        assert_eq!(vec![created.user.id()], *hook.seen.lock().unwrap());
        assert_eq!(0, context.count_users().await);
    }

    #[tokio::test]
    async fn test_delete_user_hook_failure_keeps_user() {
        let context = TestContext::setup().await;
        let created = context.create_user("Jane", Role::User).await;
        let hook = Arc::new(RecordingHook { fail: true, ..Default::default() });

        let driver = context.driver().with_deletion_hook(hook.clone());
        match driver.delete_user(created.user.id()).await {
            Err(DriverError::BackendError(msg)) => assert_eq!("Cleanup failed", msg),
            e => panic!("{:?}", e),
        }
        assert_eq!(1, hook.seen.lock().unwrap().len());
        assert_eq!(1, context.count_users().await);
    }

    #[tokio::test]
    async fn test_delete_user_not_found_skips_hooks() {
        let context = TestContext::setup().await;
        let hook = Arc::new(RecordingHook::default());

        let driver = context.driver().with_deletion_hook(hook.clone());
        match driver.delete_user(Id::generate()).await {
            Err(DriverError::NotFound(_)) => (),
            e => panic!("{:?}", e),
        }
        assert!(hook.seen.lock().unwrap().is_empty());
    }
}
