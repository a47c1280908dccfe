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

//! Geographic locations and distances between them.
//!
//! Distances are computed on a sphere with the equatorial radius of the Earth, which is precise
//! enough to answer "which tours start near here" questions.

use serde::{Deserialize, Serialize};
use tourbook_core::model::{ModelError, ModelResult};

/// Radius of the Earth in meters.
const EARTH_RADIUS_METERS: f64 = 6_378_100.0;

/// Radius of the Earth in miles.
const EARTH_RADIUS_MILES: f64 = 3_963.2;

/// Conversion factor from meters to miles.
const METERS_TO_MILES: f64 = 0.000_621_371;

/// Conversion factor from meters to kilometers.
const METERS_TO_KILOMETERS: f64 = 0.001;

/// Unit in which clients express and receive distances.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum DistanceUnit {
    /// Statute miles.
    Miles,

    /// Kilometers.
    Kilometers,
}

impl DistanceUnit {
    /// Interprets the unit given in a request path.  Anything other than `mi` means kilometers.
    pub fn from_path(raw: &str) -> Self {
        if raw == "mi" { DistanceUnit::Miles } else { DistanceUnit::Kilometers }
    }

    /// Returns the radius of the Earth in this unit.
    pub fn earth_radius(self) -> f64 {
        match self {
            DistanceUnit::Miles => EARTH_RADIUS_MILES,
            DistanceUnit::Kilometers => EARTH_RADIUS_METERS * METERS_TO_KILOMETERS,
        }
    }

    /// Converts a distance in `meters` into this unit.
    pub fn from_meters(self, meters: f64) -> f64 {
        match self {
            DistanceUnit::Miles => meters * METERS_TO_MILES,
            DistanceUnit::Kilometers => meters * METERS_TO_KILOMETERS,
        }
    }
}

/// A point on the surface of the Earth.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GeoPoint {
    /// Latitude in degrees, in the range [-90, 90].
    lat: f64,

    /// Longitude in degrees, in the range [-180, 180].
    lng: f64,
}

impl GeoPoint {
    /// Creates a new point after validating its coordinates.
    pub fn new(lat: f64, lng: f64) -> ModelResult<Self> {
        if !lat.is_finite() || !(-90.0..=90.0).contains(&lat) {
            return Err(ModelError(format!("Invalid latitude: {}", lat)));
        }
        if !lng.is_finite() || !(-180.0..=180.0).contains(&lng) {
            return Err(ModelError(format!("Invalid longitude: {}", lng)));
        }
        Ok(Self { lat, lng })
    }

    /// Parses a point given as `lat,lng`.
    pub fn parse_lat_lng(raw: &str) -> ModelResult<Self> {
        let invalid = || {
            ModelError("Please provide latitude and longitude in the format lat,lng.".to_owned())
        };
        let (lat, lng) = raw.split_once(',').ok_or_else(invalid)?;
        let lat = lat.trim().parse::<f64>().map_err(|_| invalid())?;
        let lng = lng.trim().parse::<f64>().map_err(|_| invalid())?;
        Self::new(lat, lng)
    }

    /// Returns the latitude of the point.
    pub fn lat(&self) -> f64 {
        self.lat
    }

    /// Returns the longitude of the point.
    pub fn lng(&self) -> f64 {
        self.lng
    }

    /// Computes the central angle, in radians, between this point and `other`.
    pub fn angle_to(&self, other: &GeoPoint) -> f64 {
        let (lat1, lat2) = (self.lat.to_radians(), other.lat.to_radians());
        let dlat = lat2 - lat1;
        let dlng = (other.lng - self.lng).to_radians();
        let h = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlng / 2.0).sin().powi(2);
        2.0 * h.sqrt().min(1.0).asin()
    }

    /// Computes the distance in meters between this point and `other`.
    pub fn meters_to(&self, other: &GeoPoint) -> f64 {
        self.angle_to(other) * EARTH_RADIUS_METERS
    }
}

/// Wire representation of a `Location`, which follows the GeoJSON point layout.
#[derive(Clone, Deserialize, Serialize)]
struct RawLocation {
    /// Kind of geometry.  Only `Point` is supported.
    #[serde(rename = "type", default = "RawLocation::point")]
    kind: String,

    /// Longitude and latitude, in this order.
    coordinates: [f64; 2],

    /// Street address of the location.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    address: Option<String>,

    /// Free-form description of the location.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    description: Option<String>,
}

impl RawLocation {
    /// Default geometry kind for locations that don't specify one.
    fn point() -> String {
        "Point".to_owned()
    }
}

/// A named point where a tour starts.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(try_from = "RawLocation", into = "RawLocation")]
pub struct Location {
    /// Coordinates of the location.
    pub point: GeoPoint,

    /// Street address of the location.
    pub address: Option<String>,

    /// Free-form description of the location.
    pub description: Option<String>,
}

impl TryFrom<RawLocation> for Location {
    type Error = ModelError;

    fn try_from(raw: RawLocation) -> ModelResult<Self> {
        if raw.kind != "Point" {
            return Err(ModelError(format!("Unsupported location type: {}", raw.kind)));
        }
        let [lng, lat] = raw.coordinates;
        let point = GeoPoint::new(lat, lng)?;
        Ok(Self { point, address: raw.address, description: raw.description })
    }
}

impl From<Location> for RawLocation {
    fn from(location: Location) -> Self {
        Self {
            kind: RawLocation::point(),
            coordinates: [location.point.lng, location.point.lat],
            address: location.address,
            description: location.description,
        }
    }
}
