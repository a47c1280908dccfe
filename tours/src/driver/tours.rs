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

//! Extends the driver with the operations on tours.

use crate::db;
use crate::driver::ToursDriver;
use crate::model::{NewTour, Tour, TourDetails, TourUpdate};
use tourbook_core::db::DbError;
use tourbook_core::driver::{DriverError, DriverResult};
use tourbook_core::model::Id;
use tourbook_core::query::ListQuery;

/// Converts a storage error on a write into the error to report to the caller.
fn map_write_error(e: DbError) -> DriverError {
    match e {
        DbError::AlreadyExists => DriverError::AlreadyExists(
            "Duplicate field value: name. Please use another value!".to_owned(),
        ),
        e => e.into(),
    }
}

impl ToursDriver {
    /// Creates a new tour from the client-supplied details in `new`.
    pub async fn create_tour(self, new: NewTour) -> DriverResult<Tour> {
        let tour = Tour::new(Id::generate(), self.clock.now_utc(), new)?;

        let mut tx = self.db.begin().await?;
        db::create_tour(tx.ex(), &tour).await.map_err(map_write_error)?;
        tx.commit().await?;
        Ok(tour)
    }

    /// Gets the public tour `id` along with all of its reviews.
    pub async fn get_tour(self, id: Id) -> DriverResult<TourDetails> {
        let mut tx = self.db.begin().await?;
        let tour = db::get_public_tour(tx.ex(), id).await?;
        let reviews = db::list_tour_reviews_with_author(tx.ex(), id).await?;
        tx.commit().await?;
        Ok(TourDetails { tour, reviews: Some(reviews) })
    }

    /// Lists the public tours that match `query`.
    pub async fn list_tours(self, query: ListQuery) -> DriverResult<Vec<Tour>> {
        let mut ex = self.db.ex().await?;
        Ok(db::list_public_tours(&mut ex, &query).await?)
    }

    /// Applies `update` to the public tour `id`.
    ///
    /// The rating aggregates cannot be modified this way.  Secret tours are not found, same as
    /// for reads.
    pub async fn update_tour(self, id: Id, update: TourUpdate) -> DriverResult<Tour> {
        let mut tx = self.db.begin().await?;
        let tour = db::get_public_tour(tx.ex(), id).await?.apply(update)?;
        db::update_tour(tx.ex(), &tour).await.map_err(map_write_error)?;
        tx.commit().await?;
        Ok(tour)
    }

    /// Deletes the public tour `id` and all of its reviews.
    pub async fn delete_tour(self, id: Id) -> DriverResult<()> {
        let mut tx = self.db.begin().await?;
        db::get_public_tour(tx.ex(), id).await?;
        db::delete_tour(tx.ex(), id).await?;
        tx.commit().await?;
        Ok(())
    }
}
