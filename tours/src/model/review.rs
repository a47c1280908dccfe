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

//! The `Review` data type.

use crate::model::timestamps;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use tourbook_core::model::{Id, ModelError, ModelResult};

/// Ensures that a review `rating` is within the valid range.
pub fn validate_rating(rating: u8) -> ModelResult<u8> {
    if (1..=5).contains(&rating) {
        Ok(rating)
    } else {
        Err(ModelError(format!("Rating must be between 1 and 5 but got {}", rating)))
    }
}

/// Trims the text of a review and ensures it is not empty.
fn validate_text(text: String) -> ModelResult<String> {
    let text = text.trim();
    if text.is_empty() {
        return Err(ModelError("Review can not be empty!".to_owned()));
    }
    Ok(text.to_owned())
}

/// A review of a tour written by a user.
#[derive(Clone, Debug, PartialEq)]
pub struct Review {
    /// Identifier of the review.
    pub id: Id,

    /// Text of the review.
    pub review: String,

    /// Rating given to the tour, if any.
    pub rating: Option<u8>,

    /// Time when the review was written.
    pub created_at: OffsetDateTime,

    /// Tour being reviewed.
    pub tour: Id,

    /// Author of the review.
    pub user: Id,
}

impl Review {
    /// Creates a new review after validating its contents.
    pub fn new(
        id: Id,
        created_at: OffsetDateTime,
        tour: Id,
        user: Id,
        review: String,
        rating: Option<u8>,
    ) -> ModelResult<Self> {
        let review = validate_text(review)?;
        let rating = rating.map(validate_rating).transpose()?;
        Ok(Self { id, review, rating, created_at, tour, user })
    }

    /// Applies the changes in `update` and returns the validated result.
    pub fn apply(mut self, update: ReviewUpdate) -> ModelResult<Self> {
        if let Some(review) = update.review {
            self.review = validate_text(review)?;
        }
        if let Some(rating) = update.rating {
            self.rating = Some(validate_rating(rating)?);
        }
        Ok(self)
    }
}

/// Public details of the author of a review.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct Author {
    /// Identifier of the user.
    pub id: Id,

    /// Display name of the user.
    pub name: String,

    /// Reference to the profile photo of the user.
    pub photo: String,
}

/// A review along with the public details of its author, as returned to clients.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewWithAuthor {
    /// Identifier of the review.
    pub id: Id,

    /// Text of the review.
    pub review: String,

    /// Rating given to the tour, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rating: Option<u8>,

    /// Time when the review was written.
    #[serde(with = "timestamps")]
    pub created_at: OffsetDateTime,

    /// Tour being reviewed.
    pub tour: Id,

    /// Author of the review.
    pub user: Author,
}

impl ReviewWithAuthor {
    /// Attaches the details of its `author` to `review`.
    pub fn new(review: Review, author: Author) -> Self {
        Self {
            id: review.id,
            review: review.review,
            rating: review.rating,
            created_at: review.created_at,
            tour: review.tour,
            user: author,
        }
    }
}

/// Details of a review to create.
///
/// The tour and the author are usually implied by the request: the tour by the path and the
/// author by the caller.  They can also be given explicitly.
#[derive(Debug, Default, Deserialize)]
pub struct NewReview {
    /// Text of the review.
    #[serde(default)]
    pub review: Option<String>,

    /// Rating given to the tour.
    #[serde(default)]
    pub rating: Option<u8>,

    /// Tour being reviewed.
    #[serde(default)]
    pub tour: Option<Id>,

    /// Author of the review.
    #[serde(default)]
    pub user: Option<Id>,
}

/// Changes to apply to a review.
#[derive(Debug, Default, Deserialize)]
pub struct ReviewUpdate {
    /// New text of the review.
    #[serde(default)]
    pub review: Option<String>,

    /// New rating.
    #[serde(default)]
    pub rating: Option<u8>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use time::macros::datetime;

    fn review(rating: Option<u8>) -> ModelResult<Review> {
        let now = datetime!(2023-05-12 08:30:00 UTC);
        let (tour, user) = (Id::generate(), Id::generate());
        Review::new(Id::generate(), now, tour, user, " Great! ".to_owned(), rating)
    }

    #[test]
    fn test_validate_rating_bounds() {
        for rating in 1..=5 {
            assert_eq!(Ok(rating), validate_rating(rating));
        }
        assert_eq!(
            "Rating must be between 1 and 5 but got 0",
            validate_rating(0).unwrap_err().0
        );
        assert_eq!(
            "Rating must be between 1 and 5 but got 6",
            validate_rating(6).unwrap_err().0
        );
    }

    #[test]
    fn test_review_new() {
        let review = review(Some(4)).unwrap();
        assert_eq!("Great!", review.review);
        assert_eq!(Some(4), review.rating);

        assert_eq!(None, self::review(None).unwrap().rating);
        self::review(Some(6)).unwrap_err();
    }

    #[test]
    fn test_review_new_empty_text() {
        let err = Review::new(
            Id::generate(),
            datetime!(2023-05-12 08:30:00 UTC),
            Id::generate(),
            Id::generate(),
            "  ".to_owned(),
            Some(3),
        )
        .unwrap_err();
        assert_eq!("Review can not be empty!", err.0);
    }

    #[test]
    fn test_review_apply() {
        let original = review(Some(4)).unwrap();

        let update = ReviewUpdate { review: None, rating: Some(2) };
        let updated = original.clone().apply(update).unwrap();
        assert_eq!(Some(2), updated.rating);
        assert_eq!(original.review, updated.review);

        original.clone().apply(ReviewUpdate { review: None, rating: Some(0) }).unwrap_err();
        original.apply(ReviewUpdate { review: Some("".to_owned()), rating: None }).unwrap_err();
    }

    #[test]
    fn test_review_with_author_json() {
        let review = review(Some(5)).unwrap();
        let author =
            Author { id: review.user, name: "Jane".to_owned(), photo: "jane.jpg".to_owned() };
        let value = serde_json::to_value(ReviewWithAuthor::new(review.clone(), author)).unwrap();
        assert_eq!(
            json!({
                "id": review.id.to_string(),
                "review": "Great!",
                "rating": 5,
                "createdAt": "2023-05-12T08:30:00Z",
                "tour": review.tour.to_string(),
                "user": {"id": review.user.to_string(), "name": "Jane", "photo": "jane.jpg"},
            }),
            value
        );
    }
}
