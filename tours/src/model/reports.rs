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

//! Read-only summaries computed over the tours collection.

use serde::{Deserialize, Serialize};
use tourbook_core::model::Id;

/// Statistics of the tours that share a difficulty level.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DifficultyStats {
    /// Difficulty level, upper-cased.
    pub difficulty: String,

    /// Number of tours in the group.
    pub num_tours: i64,

    /// Total number of reviews across the tours in the group.
    pub num_ratings: i64,

    /// Mean of the rating averages of the tours in the group.
    pub avg_rating: f64,

    /// Mean price of the tours in the group.
    pub avg_price: f64,

    /// Lowest price in the group.
    pub min_price: f64,

    /// Highest price in the group.
    pub max_price: f64,
}

/// Tours starting during one month.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MonthlyPlan {
    /// Month of the year, starting at 1 for January.
    pub month: u8,

    /// Number of tour starts in the month.  A tour that starts more than once counts once per
    /// start date.
    pub num_tour_starts: usize,

    /// Names of the tours that start in the month, once per start date.
    pub tours: Vec<String>,
}

/// Distance from a reference point to the start of a tour.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct TourDistance {
    /// Identifier of the tour.
    pub id: Id,

    /// Name of the tour.
    pub name: String,

    /// Distance in the unit requested by the client.
    pub distance: f64,
}
