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

//! The reviews collection, also reachable under each tour.

use crate::db::{REVIEW_FIELDS, REVIEW_TOUR_FIELD};
use crate::driver::ToursDriver;
use crate::model::{NewReview, ReviewUpdate, ReviewWithAuthor};
use async_trait::async_trait;
use tourbook_core::driver::DriverResult;
use tourbook_core::model::Id;
use tourbook_core::query::{FieldSpec, ListQuery};
use tourbook_core::rest::crud::{Nested, Resource};

/// The reviews collection.
pub(crate) struct Reviews;

#[async_trait]
impl Resource for Reviews {
    type Driver = ToursDriver;
    type Entity = ReviewWithAuthor;
    type Create = NewReview;
    type Update = ReviewUpdate;

    const SINGULAR: &'static str = "review";
    const PLURAL: &'static str = "reviews";
    const FIELDS: &'static [FieldSpec] = REVIEW_FIELDS;

    async fn create(driver: ToursDriver, input: NewReview) -> DriverResult<ReviewWithAuthor> {
        driver.create_review(input).await
    }

    async fn get(driver: ToursDriver, id: Id) -> DriverResult<ReviewWithAuthor> {
        driver.get_review(id).await
    }

    async fn list(driver: ToursDriver, query: ListQuery) -> DriverResult<Vec<ReviewWithAuthor>> {
        driver.list_reviews(query).await
    }

    async fn update(
        driver: ToursDriver,
        id: Id,
        input: ReviewUpdate,
    ) -> DriverResult<ReviewWithAuthor> {
        driver.update_review(id, input).await
    }

    async fn delete(driver: ToursDriver, id: Id) -> DriverResult<()> {
        driver.delete_review(id).await
    }
}

impl Nested for Reviews {
    const PARENT: &'static FieldSpec = REVIEW_TOUR_FIELD;
}
