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

//! Utilities to help testing services that integrate with the `authn` features.

use crate::db;
use crate::driver::email::testutils::get_latest_reset_token;
use crate::driver::{AuthnDriver, AuthnOptions, LoginResponse, NewUser, UserDeletionHook};
use crate::model::{Password, ResetToken, Role};
use std::sync::Arc;
use std::time::Duration;
use tourbook_core::clocks::testutils::SettableClock;
use tourbook_core::db::{Db, Executor};
use tourbook_core::model::EmailAddress;
use tourbook_smtp::driver::testutils::RecorderSmtpMailer;

/// Password assigned to all users created via `TestContext::create_user`.
pub const TEST_PASSWORD: &str = "test0password";

/// Creates a set of options suitable for tests.
///
/// The bcrypt cost is the minimum allowed so that tests don't spend most of their time hashing.
pub fn test_opts() -> AuthnOptions {
    AuthnOptions {
        jwt_secret: "test-secret".to_owned(),
        jwt_expires_in: Duration::from_secs(90 * 24 * 60 * 60),
        cookie_expires_in: Duration::from_secs(90 * 24 * 60 * 60),
        reset_token_ttl: Duration::from_secs(10 * 60),
        email_from: "Tourbook <noreply@example.com>".parse().unwrap(),
        public_url: "http://localhost:3000/".parse().unwrap(),
        bcrypt_cost: 4,
        secure_cookies: false,
    }
}

/// State of a running test.
pub struct TestContext {
    /// The clock that the driver uses, which tests can move at will.
    pub clock: Arc<SettableClock>,

    /// The SMTP mailer to capture outgoing messages.
    pub mailer: Arc<RecorderSmtpMailer>,

    /// The database backing the driver.
    db: Arc<dyn Db + Send + Sync>,

    /// The driver to handle authentication flows.
    driver: AuthnDriver,
}

impl TestContext {
    /// Initializes the driver using an in-memory database, a settable clock and a mock
    /// mailer that captures outgoing messages.
    #[cfg(test)]
    pub(crate) async fn setup() -> Self {
        let db = Arc::from(tourbook_core::db::sqlite::testutils::setup().await);
        let clock = Arc::from(SettableClock::new(
            tourbook_core::clocks::testutils::utc_datetime(2023, 5, 12, 8, 30, 0),
        ));
        Self::setup_with(db, clock, test_opts()).await
    }

    /// Initializes the test context using the given already-initialized objects.
    pub async fn setup_with(
        db: Arc<dyn Db + Send + Sync>,
        clock: Arc<SettableClock>,
        opts: AuthnOptions,
    ) -> Self {
        db::init_schema(&mut db.ex().await.unwrap()).await.unwrap();
        let mailer = Arc::from(RecorderSmtpMailer::default());
        let driver = AuthnDriver::new(db.clone(), clock.clone(), mailer.clone(), opts);
        Self { clock, mailer, db, driver }
    }

    /// Registers `hook` to run whenever the driver deletes a user.
    pub fn add_deletion_hook(&mut self, hook: Arc<dyn UserDeletionHook + Send + Sync>) {
        self.driver = self.driver.clone().with_deletion_hook(hook);
    }

    /// Returns a copy of the driver to issue a single operation with.
    pub fn driver(&self) -> AuthnDriver {
        self.driver.clone()
    }

    /// Returns a direct executor against the database.
    pub async fn ex(&self) -> Executor {
        self.db.ex().await.unwrap()
    }

    /// Creates an active user named `name` with `role` and logs them in.
    ///
    /// The email address of the user is derived from their name and their password is
    /// `TEST_PASSWORD`.
    pub async fn create_user(&self, name: &str, role: Role) -> LoginResponse {
        let email = EmailAddress::new(format!("{}@example.com", name.to_lowercase())).unwrap();
        let new = NewUser {
            name: name.to_owned(),
            email: email.clone(),
            password: Password::from(TEST_PASSWORD),
            password_confirm: Password::from(TEST_PASSWORD),
            role: Some(role),
            photo: None,
        };
        self.driver().create_user(new).await.unwrap();
        self.driver().login(email, Password::from(TEST_PASSWORD)).await.unwrap()
    }

    /// Counts all users in the database, whether active or not.
    pub async fn count_users(&self) -> i64 {
        match self.ex().await {
            #[cfg(feature = "postgres")]
            Executor::Postgres(mut ex) => sqlx::query_scalar("SELECT COUNT(*) FROM users")
                .fetch_one(ex.conn())
                .await
                .unwrap(),

            #[cfg(any(feature = "sqlite", test))]
            Executor::Sqlite(mut ex) => sqlx::query_scalar("SELECT COUNT(*) FROM users")
                .fetch_one(ex.conn())
                .await
                .unwrap(),
        }
    }

    /// Gets the latest password reset token sent to `to`, if any.
    pub async fn get_latest_reset_token(&self, to: &EmailAddress) -> Option<ResetToken> {
        get_latest_reset_token(&self.mailer, to).await
    }
}
