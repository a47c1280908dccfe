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

//! Utilities to help testing the REST interface.

use crate::driver::{AuthnOptions, LoginResponse};
use crate::driver::testutils::{TestContext as DriverTestContext, test_opts};
use crate::model::{ResetToken, Role};
use crate::rest::app;
use axum::Router;
use std::sync::Arc;
use std::time::Duration;
use tourbook_core::clocks::testutils::{SettableClock, utc_datetime};
use tourbook_core::db::Executor;
use tourbook_core::model::EmailAddress;
use tourbook_smtp::driver::testutils::RecorderSmtpMailer;

/// State of a running test.
pub(crate) struct TestContext {
    /// Test state of the underlying driver.
    authn: DriverTestContext,

    /// The router serving the users collection under `/api/v1/users`.
    app: Router,
}

impl TestContext {
    /// Gets a clone of the app router.
    pub(crate) fn app(&self) -> Router {
        self.app.clone()
    }

    /// Moves the clock forward by `secs` seconds.
    pub(crate) fn advance_clock(&self, secs: u64) {
        self.authn.clock.advance(Duration::from_secs(secs));
    }

    /// Returns the mailer that captures outgoing messages.
    pub(crate) fn mailer(&self) -> &RecorderSmtpMailer {
        &self.authn.mailer
    }

    /// Returns a direct executor against the database.
    pub(crate) async fn ex(&self) -> Executor {
        self.authn.ex().await
    }

    /// Creates an active user named `name` with `role` and logs them in.
    pub(crate) async fn create_user(&self, name: &str, role: Role) -> LoginResponse {
        self.authn.create_user(name, role).await
    }

    /// Counts all users in the database, whether active or not.
    pub(crate) async fn count_users(&self) -> i64 {
        self.authn.count_users().await
    }

    /// Gets the latest password reset token sent to `to`, if any.
    pub(crate) async fn get_latest_reset_token(&self, to: &EmailAddress) -> Option<ResetToken> {
        self.authn.get_latest_reset_token(to).await
    }
}

/// Builder pattern for the test context.
#[must_use]
pub(crate) struct TestContextBuilder {
    /// Whether the auth cookie should be marked as secure.
    secure_cookies: bool,
}

impl TestContextBuilder {
    /// Initializes a new builder with the default test settings.
    pub(crate) fn new() -> Self {
        Self { secure_cookies: false }
    }

    /// Marks the auth cookie as only valid over HTTPS.
    pub(crate) fn with_secure_cookies(mut self) -> Self {
        self.secure_cookies = true;
        self
    }

    /// Sets up the test environment with the configured settings.
    pub(crate) async fn build(self) -> TestContext {
        let db = Arc::from(tourbook_core::db::sqlite::testutils::setup().await);
        let clock = Arc::from(SettableClock::new(utc_datetime(2023, 5, 12, 8, 30, 0)));
        let opts = AuthnOptions { secure_cookies: self.secure_cookies, ..test_opts() };
        let authn = DriverTestContext::setup_with(db, clock, opts).await;
        let app = Router::new().nest("/api/v1/users", app(authn.driver()));
        TestContext { authn, app }
    }
}
