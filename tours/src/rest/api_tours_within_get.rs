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

//! API to find the tours that start near a point.

use crate::driver::ToursDriver;
use crate::model::{DistanceUnit, GeoPoint, Tour};
use axum::extract::{Path, State};
use tourbook_core::rest::{EmptyBody, Envelope, RestError, RestResult};

/// GET handler for this API.
pub(crate) async fn handler(
    State(driver): State<ToursDriver>,
    Path((distance, latlng, unit)): Path<(String, String, String)>,
    _: EmptyBody,
) -> RestResult<Envelope<Vec<Tour>>> {
    let distance = distance
        .parse::<f64>()
        .map_err(|_| RestError::InvalidRequest(format!("Invalid distance: {}", distance)))?;
    let center = GeoPoint::parse_lat_lng(&latlng)?;
    let unit = DistanceUnit::from_path(&unit);

    let tours = driver.tours_within(distance, center, unit).await?;
    Ok(Envelope::many("tours", tours))
}
