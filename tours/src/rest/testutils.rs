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

use crate::driver::testutils::TestContext as DriverTestContext;
use crate::model::{NewTour, ReviewWithAuthor, Tour};
use crate::rest::app;
use axum::Router;
use tourbook_authn::driver::LoginResponse;
use tourbook_authn::model::Role;
use tourbook_core::model::Id;

/// State of a running test.
pub(crate) struct TestContext {
    /// Test state of the underlying driver.
    tours: DriverTestContext,

    /// The router serving the whole API.
    app: Router,
}

impl TestContext {
    /// Gets a clone of the app router.
    pub(crate) fn app(&self) -> Router {
        self.app.clone()
    }

    /// Creates an active user named `name` with `role` and logs them in.
    pub(crate) async fn create_user(&self, name: &str, role: Role) -> LoginResponse {
        self.tours.create_user(name, role).await
    }

    /// Creates a public tour named `name` with default details and the given `price`.
    pub(crate) async fn create_tour(&self, name: &str, price: f64) -> Tour {
        self.tours.create_tour(name, price).await
    }

    /// Creates a tour with the given details.
    pub(crate) async fn create_tour_from(&self, new: NewTour) -> Tour {
        self.tours.driver().create_tour(new).await.unwrap()
    }

    /// Gets the tour `id` directly from the database, whether it is secret or not.
    pub(crate) async fn get_tour(&self, id: Id) -> Tour {
        self.tours.get_tour(id).await
    }

    /// Counts all tours in the database, whether they are secret or not.
    pub(crate) async fn count_tours(&self) -> i64 {
        self.tours.count_tours().await
    }

    /// Creates a review on `tour` by `user` with `rating`.
    pub(crate) async fn create_review(&self, tour: Id, user: Id, rating: u8) -> ReviewWithAuthor {
        self.tours.create_review(tour, user, rating).await
    }
}

/// Builder pattern for the test context.
#[must_use]
pub(crate) struct TestContextBuilder {}

impl TestContextBuilder {
    /// Initializes a new builder with the default test settings.
    pub(crate) fn new() -> Self {
        Self {}
    }

    /// Sets up the test environment with the configured settings.
    pub(crate) async fn build(self) -> TestContext {
        let tours = DriverTestContext::setup().await;
        let app = app(tours.driver(), tours.authn().driver());
        TestContext { tours, app }
    }
}
