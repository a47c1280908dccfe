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

//! Data types for tours and their reviews.

mod difficulty;
pub use difficulty::Difficulty;
mod location;
pub use location::{DistanceUnit, GeoPoint, Location};
mod reports;
pub use reports::{DifficultyStats, MonthlyPlan, TourDistance};
mod review;
pub use review::{Author, NewReview, Review, ReviewUpdate, ReviewWithAuthor, validate_rating};
pub(crate) mod timestamps;
mod tour;
#[cfg(test)]
pub(crate) use tour::testutils::new_tour;
pub use tour::{
    DEFAULT_RATINGS_AVERAGE, NewTour, Slug, Tour, TourDetails, TourUpdate, validate_ratings,
};
