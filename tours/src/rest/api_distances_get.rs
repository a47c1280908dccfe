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

//! API to compute how far every tour starts from a point.

use crate::driver::ToursDriver;
use crate::model::{DistanceUnit, GeoPoint, TourDistance};
use axum::extract::{Path, State};
use tourbook_core::rest::{EmptyBody, Envelope, RestResult};

/// GET handler for this API.
pub(crate) async fn handler(
    State(driver): State<ToursDriver>,
    Path((latlng, unit)): Path<(String, String)>,
    _: EmptyBody,
) -> RestResult<Envelope<Vec<TourDistance>>> {
    let center = GeoPoint::parse_lat_lng(&latlng)?;
    let distances = driver.tour_distances(center, DistanceUnit::from_path(&unit)).await?;
    Ok(Envelope::many("distances", distances))
}
