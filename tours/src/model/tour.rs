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

//! The `Tour` data type and its validation rules.

use crate::model::timestamps;
use crate::model::{Difficulty, Location, ReviewWithAuthor};
use derive_more::Display;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use tourbook_core::model::{Id, ModelError, ModelResult};

/// Rating average of tours without reviews.
pub const DEFAULT_RATINGS_AVERAGE: f64 = 4.5;

/// Minimum length of a tour name, in characters.
const MIN_NAME_LENGTH: usize = 10;

/// Maximum length of a tour name, in characters.
const MAX_NAME_LENGTH: usize = 40;

/// URL-safe version of a tour name.
#[derive(Clone, Debug, Deserialize, Display, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Slug(String);

impl Slug {
    /// Derives the slug of a tour `name`: lowercase alphanumeric words joined by dashes.
    pub fn from_name(name: &str) -> Self {
        let mut slug = String::with_capacity(name.len());
        for word in name.split(|c: char| !c.is_alphanumeric()).filter(|w| !w.is_empty()) {
            if !slug.is_empty() {
                slug.push('-');
            }
            slug.extend(word.chars().flat_map(char::to_lowercase));
        }
        Slug(slug)
    }

    /// Wraps a slug read back from storage.
    pub(crate) fn from_db(slug: String) -> Self {
        Slug(slug)
    }

    /// Returns the slug as a string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Validates and normalizes the `name` of a tour.
fn validate_name(name: String) -> ModelResult<String> {
    let name = name.trim();
    let length = name.chars().count();
    if length == 0 {
        return Err(ModelError("A tour must have a name".to_owned()));
    } else if length > MAX_NAME_LENGTH {
        return Err(ModelError(format!(
            "A tour name must have less or equal then {} characters",
            MAX_NAME_LENGTH
        )));
    } else if length < MIN_NAME_LENGTH {
        return Err(ModelError(format!(
            "A tour name must have more or equal then {} characters",
            MIN_NAME_LENGTH
        )));
    }
    Ok(name.to_owned())
}

/// Trims `text` and ensures it is not empty, returning `missing` as the error otherwise.
fn validate_text(text: String, missing: &str) -> ModelResult<String> {
    let text = text.trim();
    if text.is_empty() {
        return Err(ModelError(missing.to_owned()));
    }
    Ok(text.to_owned())
}

/// Ensures that `rating`, an average of review ratings, is within the valid range.
pub fn validate_ratings(average: f64) -> ModelResult<f64> {
    if average.is_nan() || average < 1.0 {
        Err(ModelError("Rating must be above 1.0".to_owned()))
    } else if average > 5.0 {
        Err(ModelError("Rating must be below 5.0".to_owned()))
    } else {
        Ok(average)
    }
}

/// Unwraps a required field, returning `missing` as the error if it is absent.
fn required<T>(value: Option<T>, missing: &str) -> ModelResult<T> {
    value.ok_or_else(|| ModelError(missing.to_owned()))
}

/// A tour that customers can book.
///
/// Instances are only built by `Tour::new` and `Tour::apply`, which enforce all validation rules,
/// or when reading them back from the database.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Tour {
    /// Identifier of the tour.
    pub id: Id,

    /// Unique name of the tour.
    pub name: String,

    /// URL-safe version of `name`.
    pub slug: Slug,

    /// Length of the tour in days.
    pub duration: u32,

    /// Maximum number of people per group.
    pub max_group_size: u32,

    /// How demanding the tour is.
    pub difficulty: Difficulty,

    /// Regular price.
    pub price: f64,

    /// Discounted price, always below `price`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price_discount: Option<f64>,

    /// One-line description.
    pub summary: String,

    /// Long description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Reference to the cover image.
    pub image_cover: String,

    /// References to the gallery images.
    pub images: Vec<String>,

    /// Average of the ratings of all reviews, or the default if there are none.
    pub ratings_average: f64,

    /// Number of reviews.
    pub ratings_quantity: u32,

    /// Time when the tour was created.
    #[serde(with = "timestamps")]
    pub created_at: OffsetDateTime,

    /// Dates on which the tour starts.
    #[serde(with = "timestamps::vec")]
    pub start_dates: Vec<OffsetDateTime>,

    /// Whether the tour is hidden from public queries.
    #[serde(rename = "secretTour")]
    pub secret: bool,

    /// Where the tour starts.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_location: Option<Location>,
}

/// Details of a tour to create.
///
/// All fields are optional so that missing ones can be reported with a meaningful message.
/// Rating aggregates are not part of this type: clients cannot set them.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewTour {
    /// Unique name of the tour.
    #[serde(default)]
    pub name: Option<String>,

    /// Length of the tour in days.
    #[serde(default)]
    pub duration: Option<u32>,

    /// Maximum number of people per group.
    #[serde(default)]
    pub max_group_size: Option<u32>,

    /// How demanding the tour is.
    #[serde(default)]
    pub difficulty: Option<Difficulty>,

    /// Regular price.
    #[serde(default)]
    pub price: Option<f64>,

    /// Discounted price.
    #[serde(default)]
    pub price_discount: Option<f64>,

    /// One-line description.
    #[serde(default)]
    pub summary: Option<String>,

    /// Long description.
    #[serde(default)]
    pub description: Option<String>,

    /// Reference to the cover image.
    #[serde(default)]
    pub image_cover: Option<String>,

    /// References to the gallery images.
    #[serde(default)]
    pub images: Option<Vec<String>>,

    /// Dates on which the tour starts.
    #[serde(default, deserialize_with = "timestamps::option_vec::deserialize")]
    pub start_dates: Option<Vec<OffsetDateTime>>,

    /// Whether the tour is hidden from public queries.
    #[serde(default, rename = "secretTour")]
    pub secret: Option<bool>,

    /// Where the tour starts.
    #[serde(default)]
    pub start_location: Option<Location>,
}

/// Changes to apply to a tour.  Fields that are not present are left untouched.
pub type TourUpdate = NewTour;

impl Tour {
    /// Creates a new tour with identifier `id` from the client-supplied details in `new`.
    ///
    /// The rating aggregates start at their defaults.
    pub fn new(id: Id, created_at: OffsetDateTime, new: NewTour) -> ModelResult<Self> {
        let name = validate_name(required(new.name, "A tour must have a name")?)?;
        let tour = Tour {
            id,
            slug: Slug::from_name(&name),
            name,
            duration: required(new.duration, "A tour must have a duration")?,
            max_group_size: required(new.max_group_size, "A tour must have a group size")?,
            difficulty: required(new.difficulty, "A tour must have a difficulty")?,
            price: required(new.price, "A tour must have a price")?,
            price_discount: new.price_discount,
            summary: required(new.summary, "A tour must have a summary")?,
            description: new.description,
            image_cover: required(new.image_cover, "A tour must have a cover image")?,
            images: new.images.unwrap_or_default(),
            ratings_average: DEFAULT_RATINGS_AVERAGE,
            ratings_quantity: 0,
            created_at,
            start_dates: new.start_dates.unwrap_or_default(),
            secret: new.secret.unwrap_or(false),
            start_location: new.start_location,
        };
        tour.validate()
    }

    /// Applies the changes in `update` and returns the validated result.
    ///
    /// The slug follows the name if the latter changes.
    pub fn apply(mut self, update: TourUpdate) -> ModelResult<Self> {
        if let Some(name) = update.name {
            self.name = validate_name(name)?;
            self.slug = Slug::from_name(&self.name);
        }
        if let Some(duration) = update.duration {
            self.duration = duration;
        }
        if let Some(max_group_size) = update.max_group_size {
            self.max_group_size = max_group_size;
        }
        if let Some(difficulty) = update.difficulty {
            self.difficulty = difficulty;
        }
        if let Some(price) = update.price {
            self.price = price;
        }
        if let Some(price_discount) = update.price_discount {
            self.price_discount = Some(price_discount);
        }
        if let Some(summary) = update.summary {
            self.summary = summary;
        }
        if let Some(description) = update.description {
            self.description = Some(description);
        }
        if let Some(image_cover) = update.image_cover {
            self.image_cover = image_cover;
        }
        if let Some(images) = update.images {
            self.images = images;
        }
        if let Some(start_dates) = update.start_dates {
            self.start_dates = start_dates;
        }
        if let Some(secret) = update.secret {
            self.secret = secret;
        }
        if let Some(start_location) = update.start_location {
            self.start_location = Some(start_location);
        }
        self.validate()
    }

    /// Checks all validation rules and normalizes free-form text.
    fn validate(mut self) -> ModelResult<Self> {
        if self.duration == 0 {
            return Err(ModelError("A tour must last at least one day".to_owned()));
        }
        if self.max_group_size == 0 {
            return Err(ModelError("A tour group must have at least one person".to_owned()));
        }
        if !self.price.is_finite() || self.price < 0.0 {
            return Err(ModelError(format!("Invalid price: {}", self.price)));
        }
        if let Some(discount) = self.price_discount {
            if !discount.is_finite() || discount < 0.0 {
                return Err(ModelError(format!("Invalid discount price: {}", discount)));
            }
            if discount >= self.price {
                return Err(ModelError(format!(
                    "Discount price ({}) should be below regular price",
                    discount
                )));
            }
        }
        self.summary = validate_text(self.summary, "A tour must have a summary")?;
        self.description = match self.description {
            Some(description) => Some(description.trim().to_owned()),
            None => None,
        };
        self.image_cover = validate_text(self.image_cover, "A tour must have a cover image")?;
        validate_ratings(self.ratings_average)?;
        Ok(self)
    }

    /// Returns a copy of this tour with new rating aggregates, validating their range.
    pub fn with_ratings(mut self, average: f64, quantity: u32) -> ModelResult<Self> {
        self.ratings_average = validate_ratings(average)?;
        self.ratings_quantity = quantity;
        Ok(self)
    }
}

/// A tour along with its reviews, as returned when fetching a single tour.
#[derive(Debug, Deserialize, PartialEq, Serialize)]
pub struct TourDetails {
    /// The tour.
    #[serde(flatten)]
    pub tour: Tour,

    /// Reviews of the tour, if they were requested.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reviews: Option<Vec<ReviewWithAuthor>>,
}
