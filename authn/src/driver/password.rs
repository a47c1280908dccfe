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

//! Extends the driver with the password management methods.

use crate::db;
use crate::driver::email::send_reset_token;
use crate::driver::{AuthnDriver, LoginResponse};
use crate::model::{Password, ResetToken, ResetTokenHash};
use log::{debug, warn};
use tourbook_core::db::DbError;
use tourbook_core::driver::{DriverError, DriverResult};
use tourbook_core::model::{EmailAddress, Id};

impl AuthnDriver {
    /// Starts a password reset for the active user with `email` by sending them a reset token.
    ///
    /// The token is committed before contacting the mail server so that no transaction stays
    /// open during delivery.  If delivery fails, the token is withdrawn in a separate transaction.
    pub async fn forgot_password(self, email: EmailAddress) -> DriverResult<()> {
        let mut tx = self.db.begin().await?;
        let now = self.clock.now_utc();

        let user = match db::get_active_user_by_email(tx.ex(), &email).await {
            Ok(user) => user,
            Err(DbError::NotFound) => {
                return Err(DriverError::NotFound(
                    "There is no user with that email address.".to_owned(),
                ));
            }
            Err(e) => return Err(e.into()),
        };

        let token = ResetToken::generate();
        let user = user.with_password_reset(Some((token.hash(), now + self.opts.reset_token_ttl)));
        db::update_user(tx.ex(), &user).await?;
        tx.commit().await?;

        if let Err(e) = send_reset_token(self.mailer.as_ref(), &self.opts, &user, &token).await {
            warn!("Failed to send reset token to {}: {}", user.email().as_str(), e);
            if let Err(e) = self.withdraw_reset_token(user.id(), &token.hash()).await {
                warn!("Failed to withdraw reset token of {}: {}", user.id(), e);
            }
            return Err(DriverError::BackendError(
                "There was an error sending the email. Try again later!".to_owned(),
            ));
        }

        Ok(())
    }

    /// Clears the pending password reset of user `id` if it still matches `hash`.
    ///
    /// A different hash means that a later reset request replaced ours and must be kept.
    async fn withdraw_reset_token(&self, id: Id, hash: &ResetTokenHash) -> DriverResult<()> {
        let mut tx = self.db.begin().await?;
        let user = db::get_user(tx.ex(), id).await?;
        match user.password_reset() {
            Some((current, _)) if current == hash => {
                let user = user.with_password_reset(None);
                db::update_user(tx.ex(), &user).await?;
                tx.commit().await?;
            }
            _ => debug!("Reset token of {} was already replaced", id),
        }
        Ok(())
    }

    /// Replaces the password of the user that owns the reset `token` and logs them in.
    ///
    /// Tokens are single use and only valid until their expiration time.
    pub async fn reset_password(
        self,
        token: ResetToken,
        password: Password,
        password_confirm: Password,
    ) -> DriverResult<LoginResponse> {
        let mut tx = self.db.begin().await?;
        let now = self.clock.now_utc();

        let user = match db::get_active_user_by_reset_token(tx.ex(), &token.hash(), now).await {
            Ok(user) => user,
            Err(DbError::NotFound) => {
                return Err(DriverError::InvalidInput(
                    "Token is invalid or has expired".to_owned(),
                ));
            }
            Err(e) => return Err(e.into()),
        };

        password.confirm(&password_confirm)?;
        let password = password.validate_and_hash(self.opts.bcrypt_cost)?;
        let user = user.with_password(password, self.password_changed_at());
        db::update_user(tx.ex(), &user).await?;
        tx.commit().await?;

        self.issue_token(user)
    }

    /// Changes the password of the user `id` after checking that they know the `current` one.
    pub async fn update_password(
        self,
        id: Id,
        current: Password,
        password: Password,
        password_confirm: Password,
    ) -> DriverResult<LoginResponse> {
        let mut tx = self.db.begin().await?;

        let user = db::get_active_user(tx.ex(), id).await?;
        if !current.verify(user.password())? {
            return Err(DriverError::Unauthorized("Your current password is wrong.".to_owned()));
        }

        password.confirm(&password_confirm)?;
        let password = password.validate_and_hash(self.opts.bcrypt_cost)?;
        let user = user.with_password(password, self.password_changed_at());
        db::update_user(tx.ex(), &user).await?;
        tx.commit().await?;

        self.issue_token(user)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::testutils::*;
    use crate::model::Role;
    use async_trait::async_trait;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;
    use tourbook_core::clocks::Clock;
    use tourbook_core::clocks::testutils::{SettableClock, utc_datetime};
    use tourbook_core::db::Db;
    use tourbook_smtp::driver::SmtpMailer;
    use tourbook_smtp::model::Message;

    #[tokio::test]
    async fn test_forgot_password_ok() {
        let context = TestContext::setup().await;
        let created = context.create_user("Jane", Role::User).await;

        context.driver().forgot_password(created.user.email().clone()).await.unwrap();

        let token = context.get_latest_reset_token(created.user.email()).await.unwrap();
        let user = db::get_user(&mut context.ex().await, created.user.id()).await.unwrap();
        let (hash, expires) = user.password_reset().unwrap();
        assert_eq!(&token.hash(), hash);
        assert_eq!(context.clock.now_utc() + Duration::from_secs(600), *expires);
    }

    #[tokio::test]
    async fn test_forgot_password_unknown_email() {
        let context = TestContext::setup().await;

        match context.driver().forgot_password(EmailAddress::from("nobody@example.com")).await {
            Err(DriverError::NotFound(msg)) => assert!(msg.contains("no user with that email")),
            e => panic!("{:?}", e),
        }
        context.mailer.expect_no_messages().await;
    }

    #[tokio::test]
    async fn test_forgot_password_email_failure_withdraws_token() {
        let context = TestContext::setup().await;
        let created = context.create_user("Jane", Role::User).await;
        context.mailer.fail_deliveries_to(created.user.email().clone()).await;

        match context.driver().forgot_password(created.user.email().clone()).await {
            Err(DriverError::BackendError(msg)) => {
                assert_eq!("There was an error sending the email. Try again later!", msg)
            }
            e => panic!("{:?}", e),
        }

        let user = db::get_user(&mut context.ex().await, created.user.id()).await.unwrap();
        assert!(user.password_reset().is_none());
    }

    /// Mailer that reads the recipient's pending reset from the database during delivery.
    struct ResetObservingMailer {
        db: Arc<dyn Db + Send + Sync>,
        email: EmailAddress,
        observed: Mutex<Option<bool>>,
    }

    #[async_trait]
    impl SmtpMailer for ResetObservingMailer {
        async fn send(&self, _message: Message) -> DriverResult<()> {
            let mut ex = self.db.ex().await?;
            let user = db::get_active_user_by_email(&mut ex, &self.email).await?;
            *self.observed.lock().unwrap() = Some(user.password_reset().is_some());
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_forgot_password_commits_before_delivery() {
        let db: Arc<dyn Db + Send + Sync> =
            Arc::from(tourbook_core::db::sqlite::testutils::setup().await);
        let clock = Arc::from(SettableClock::new(utc_datetime(2023, 5, 12, 8, 30, 0)));
        let context = TestContext::setup_with(db.clone(), clock.clone(), test_opts()).await;
        let created = context.create_user("Jane", Role::User).await;

        let mailer = Arc::from(ResetObservingMailer {
            db: db.clone(),
            email: created.user.email().clone(),
            observed: Mutex::default(),
        });
        let driver = AuthnDriver::new(db, clock, mailer.clone(), test_opts());
        driver.forgot_password(created.user.email().clone()).await.unwrap();

        assert_eq!(Some(true), *mailer.observed.lock().unwrap());
    }

    #[tokio::test]
    async fn test_forgot_password_failure_keeps_newer_token() {
        let context = TestContext::setup().await;
        let created = context.create_user("Jane", Role::User).await;
        context.driver().forgot_password(created.user.email().clone()).await.unwrap();
        let user = db::get_user(&mut context.ex().await, created.user.id()).await.unwrap();
        let (hash, _) = user.password_reset().unwrap().clone();

        let other = ResetToken::generate().hash();
        context.driver().withdraw_reset_token(created.user.id(), &other).await.unwrap();
        let user = db::get_user(&mut context.ex().await, created.user.id()).await.unwrap();
        assert_eq!(Some(&hash), user.password_reset().map(|(hash, _)| hash));

        context.driver().withdraw_reset_token(created.user.id(), &hash).await.unwrap();
        let user = db::get_user(&mut context.ex().await, created.user.id()).await.unwrap();
        assert!(user.password_reset().is_none());
    }

    #[tokio::test]
    async fn test_reset_password_ok() {
        let context = TestContext::setup().await;
        let created = context.create_user("Jane", Role::User).await;
        context.driver().forgot_password(created.user.email().clone()).await.unwrap();
        let token = context.get_latest_reset_token(created.user.email()).await.unwrap();

        context.clock.advance(Duration::from_secs(60));
        let response = context
            .driver()
            .reset_password(token, Password::from("new password"), Password::from("new password"))
            .await
            .unwrap();
        assert!(response.user.password_reset().is_none());
        assert_eq!(
            Some(context.clock.now_utc() - Duration::from_secs(1)),
            response.user.password_changed_at()
        );

        context.driver().authenticate(response.access_token).await.unwrap();
        context
            .driver()
            .login(created.user.email().clone(), Password::from("new password"))
            .await
            .unwrap();
        context
            .driver()
            .login(created.user.email().clone(), Password::from(TEST_PASSWORD))
            .await
            .unwrap_err();
    }

    #[tokio::test]
    async fn test_reset_password_single_use() {
        let context = TestContext::setup().await;
        let created = context.create_user("Jane", Role::User).await;
        context.driver().forgot_password(created.user.email().clone()).await.unwrap();
        let token = context.get_latest_reset_token(created.user.email()).await.unwrap();

        context
            .driver()
            .reset_password(token.clone(), Password::from("password1"), Password::from("password1"))
            .await
            .unwrap();

        match context
            .driver()
            .reset_password(token, Password::from("password2"), Password::from("password2"))
            .await
        {
            Err(DriverError::InvalidInput(msg)) => {
                assert_eq!("Token is invalid or has expired", msg)
            }
            e => panic!("{:?}", e),
        }
    }

    #[tokio::test]
    async fn test_reset_password_expired() {
        let context = TestContext::setup().await;
        let created = context.create_user("Jane", Role::User).await;
        context.driver().forgot_password(created.user.email().clone()).await.unwrap();
        let token = context.get_latest_reset_token(created.user.email()).await.unwrap();

        context.clock.advance(Duration::from_secs(600));
        match context
            .driver()
            .reset_password(token, Password::from("password1"), Password::from("password1"))
            .await
        {
            Err(DriverError::InvalidInput(msg)) => {
                assert_eq!("Token is invalid or has expired", msg)
            }
            e => panic!("{:?}", e),
        }
    }

    #[tokio::test]
    async fn test_reset_password_confirmation_mismatch_keeps_token() {
        let context = TestContext::setup().await;
        let created = context.create_user("Jane", Role::User).await;
        context.driver().forgot_password(created.user.email().clone()).await.unwrap();
        let token = context.get_latest_reset_token(created.user.email()).await.unwrap();

        match context
            .driver()
            .reset_password(token.clone(), Password::from("password1"), Password::from("password2"))
            .await
        {
            Err(DriverError::InvalidInput(msg)) => assert_eq!("Passwords are not the same!", msg),
            e => panic!("{:?}", e),
        }

        context
            .driver()
            .reset_password(token, Password::from("password1"), Password::from("password1"))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_update_password_ok() {
        let context = TestContext::setup().await;
        let created = context.create_user("Jane", Role::User).await;

        let response = context
            .driver()
            .update_password(
                created.user.id(),
                Password::from(TEST_PASSWORD),
                Password::from("new password"),
                Password::from("new password"),
            )
            .await
            .unwrap();

        context.driver().authenticate(response.access_token).await.unwrap();
        context
            .driver()
            .login(created.user.email().clone(), Password::from("new password"))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_update_password_wrong_current() {
        let context = TestContext::setup().await;
        let created = context.create_user("Jane", Role::User).await;

        match context
            .driver()
            .update_password(
                created.user.id(),
                Password::from("not my password"),
                Password::from("new password"),
                Password::from("new password"),
            )
            .await
        {
            Err(DriverError::Unauthorized(msg)) => {
                assert_eq!("Your current password is wrong.", msg)
            }
            e => panic!("{:?}", e),
        }

        context
            .driver()
            .login(created.user.email().clone(), Password::from(TEST_PASSWORD))
            .await
            .unwrap();
    }
}
