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

//! Extends the driver with queries based on the start location of tours.

use crate::db;
use crate::driver::ToursDriver;
use crate::model::{DistanceUnit, GeoPoint, Tour, TourDistance};
use tourbook_core::driver::{DriverError, DriverResult};

impl ToursDriver {
    /// Lists the public tours that start within `distance` of `center`, where `distance` is
    /// expressed in `unit`.
    pub async fn tours_within(
        self,
        distance: f64,
        center: GeoPoint,
        unit: DistanceUnit,
    ) -> DriverResult<Vec<Tour>> {
        if !distance.is_finite() || distance < 0.0 {
            return Err(DriverError::InvalidInput(format!("Invalid distance: {}", distance)));
        }
        let max_angle = distance / unit.earth_radius();

        let mut ex = self.db.ex().await?;
        let tours = db::list_located_public_tours(&mut ex).await?;
        Ok(tours
            .into_iter()
            .filter(|tour| match &tour.start_location {
                Some(location) => center.angle_to(&location.point) <= max_angle,
                None => false,
            })
            .collect())
    }

    /// Computes the distance from `center` to the start of every located public tour, nearest
    /// first.
    pub async fn tour_distances(
        self,
        center: GeoPoint,
        unit: DistanceUnit,
    ) -> DriverResult<Vec<TourDistance>> {
        let mut ex = self.db.ex().await?;
        let tours = db::list_located_public_tours(&mut ex).await?;

        let mut distances: Vec<TourDistance> = tours
            .into_iter()
            .filter_map(|tour| {
                let location = tour.start_location?;
                let distance = unit.from_meters(center.meters_to(&location.point));
                Some(TourDistance { id: tour.id, name: tour.name, distance })
            })
            .collect();
        distances.sort_by(|a, b| a.distance.total_cmp(&b.distance));
        Ok(distances)
    }
}
