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

//! Utilities to help testing the tours driver.

use crate::db;
use crate::driver::ToursDriver;
use crate::model::{NewReview, ReviewWithAuthor, Tour, new_tour};
use std::sync::Arc;
use tourbook_authn::driver::LoginResponse;
use tourbook_authn::driver::testutils::{TestContext as AuthnTestContext, test_opts};
use tourbook_authn::model::Role;
use tourbook_core::clocks::testutils::SettableClock;
use tourbook_core::db::{Db, Executor};
use tourbook_core::model::Id;

/// State of a running test.
pub(crate) struct TestContext {
    /// The clock that the driver uses, which tests can move at will.
    pub(crate) clock: Arc<SettableClock>,

    /// The database backing the driver.
    db: Arc<dyn Db + Send + Sync>,

    /// The driver to handle tours and reviews.
    driver: ToursDriver,

    /// Context to manipulate the users that author reviews.
    authn: AuthnTestContext,
}

impl TestContext {
    /// Initializes the driver using an in-memory database and a settable clock.
    pub(crate) async fn setup() -> Self {
        let db: Arc<dyn Db + Send + Sync> =
            Arc::from(tourbook_core::db::sqlite::testutils::setup().await);
        let clock = Arc::from(SettableClock::new(
            tourbook_core::clocks::testutils::utc_datetime(2023, 5, 12, 8, 30, 0),
        ));
        Self::setup_with(db, clock).await
    }

    /// Initializes the test context using the given already-initialized objects.
    pub(crate) async fn setup_with(
        db: Arc<dyn Db + Send + Sync>,
        clock: Arc<SettableClock>,
    ) -> Self {
        let mut authn =
            AuthnTestContext::setup_with(db.clone(), clock.clone(), test_opts()).await;
        db::init_schema(&mut db.ex().await.unwrap()).await.unwrap();
        let driver = ToursDriver::new(db.clone(), clock.clone());
        authn.add_deletion_hook(Arc::new(driver.clone()));
        Self { clock, db, driver, authn }
    }

    /// Returns a copy of the driver to issue a single operation with.
    pub(crate) fn driver(&self) -> ToursDriver {
        self.driver.clone()
    }

    /// Returns the context to manipulate users.
    pub(crate) fn authn(&self) -> &AuthnTestContext {
        &self.authn
    }

    /// Returns a direct executor against the database.
    pub(crate) async fn ex(&self) -> Executor {
        self.db.ex().await.unwrap()
    }

    /// Creates a public tour named `name` with default details and the given `price`.
    pub(crate) async fn create_tour(&self, name: &str, price: f64) -> Tour {
        self.driver().create_tour(new_tour(name, price)).await.unwrap()
    }

    /// Gets the tour `id` directly from the database, whether it is secret or not.
    pub(crate) async fn get_tour(&self, id: Id) -> Tour {
        db::get_tour(&mut self.ex().await, id).await.unwrap()
    }

    /// Counts all tours in the database, whether they are secret or not.
    pub(crate) async fn count_tours(&self) -> i64 {
        match self.ex().await {
            #[cfg(feature = "postgres")]
            Executor::Postgres(mut ex) => sqlx::query_scalar("SELECT COUNT(*) FROM tours")
                .fetch_one(ex.conn())
                .await
                .unwrap(),

            Executor::Sqlite(mut ex) => sqlx::query_scalar("SELECT COUNT(*) FROM tours")
                .fetch_one(ex.conn())
                .await
                .unwrap(),
        }
    }

    /// Creates an active user named `name` with `role` and logs them in.
    pub(crate) async fn create_user(&self, name: &str, role: Role) -> LoginResponse {
        self.authn.create_user(name, role).await
    }

    /// Creates a review on `tour` by `user` with `rating`.
    pub(crate) async fn create_review(&self, tour: Id, user: Id, rating: u8) -> ReviewWithAuthor {
        let new = NewReview {
            review: Some(format!("Worth {} stars", rating)),
            rating: Some(rating),
            tour: Some(tour),
            user: Some(user),
        };
        self.driver().create_review(new).await.unwrap()
    }
}
