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

//! Extends the driver with the operations on reviews and the maintenance of the rating
//! aggregates of their tours.

use crate::db;
use crate::driver::ToursDriver;
use crate::model::{
    DEFAULT_RATINGS_AVERAGE, NewReview, Review, ReviewUpdate, ReviewWithAuthor, validate_ratings,
};
use async_trait::async_trait;
use log::debug;
use tourbook_authn::driver::UserDeletionHook;
use tourbook_core::db::{DbError, Executor};
use tourbook_core::driver::{DriverError, DriverResult};
use tourbook_core::model::{Id, ModelError};
use tourbook_core::query::ListQuery;

/// Recomputes the rating aggregates of the tour `tour` from all of its current reviews.
///
/// This must run within the same transaction as the review write that invalidated the
/// aggregates.  A tour without reviews goes back to the default aggregates.
pub(crate) async fn recompute_tour_rating(ex: &mut Executor, tour: Id) -> DriverResult<()> {
    let (quantity, average) = db::get_rating_aggregate(ex, tour).await?;
    let average = match (quantity, average) {
        (0, _) | (_, None) => DEFAULT_RATINGS_AVERAGE,
        (_, Some(average)) => validate_ratings(average)?,
    };
    debug!("Ratings for tour {} are now {} over {} reviews", tour, average, quantity);
    db::set_tour_ratings(ex, tour, average, quantity).await?;
    Ok(())
}

#[async_trait]
impl UserDeletionHook for ToursDriver {
    /// Drops the reviews written by `user` and refreshes the rating aggregates of their tours.
    async fn before_delete_user(&self, ex: &mut Executor, user: Id) -> DriverResult<()> {
        let tours = db::delete_user_reviews(ex, user).await?;
        debug!("Deleted {} reviews by user {}", tours.len(), user);
        for tour in tours {
            recompute_tour_rating(ex, tour).await?;
        }
        Ok(())
    }
}

impl ToursDriver {
    /// Creates a new review and updates the rating aggregates of the reviewed tour.
    ///
    /// Both the tour and the author must be known by the time this is called.  Secret tours
    /// cannot be reviewed.
    pub async fn create_review(self, new: NewReview) -> DriverResult<ReviewWithAuthor> {
        let tour = new.tour.ok_or_else(|| ModelError("Review must belong to a tour.".to_owned()))?;
        let user = new.user.ok_or_else(|| ModelError("Review must belong to a user".to_owned()))?;
        let text = new.review.unwrap_or_default();
        let review =
            Review::new(Id::generate(), self.clock.now_utc(), tour, user, text, new.rating)?;

        let mut tx = self.db.begin().await?;
        match db::get_public_tour(tx.ex(), tour).await {
            Ok(_) => (),
            Err(DbError::NotFound) => {
                return Err(DriverError::NotFound("No tour found with that ID".to_owned()));
            }
            Err(e) => return Err(e.into()),
        }
        match db::create_review(tx.ex(), &review).await {
            Ok(()) => (),
            Err(DbError::AlreadyExists) => {
                return Err(DriverError::AlreadyExists(
                    "You have already reviewed this tour".to_owned(),
                ));
            }
            Err(DbError::NotFound) => {
                return Err(DriverError::NotFound("No user found with that ID".to_owned()));
            }
            Err(e) => return Err(e.into()),
        }
        recompute_tour_rating(tx.ex(), tour).await?;
        let review = db::get_review_with_author(tx.ex(), review.id).await?;
        tx.commit().await?;
        Ok(review)
    }

    /// Gets the review `id` along with the public details of its author.
    pub async fn get_review(self, id: Id) -> DriverResult<ReviewWithAuthor> {
        let mut ex = self.db.ex().await?;
        Ok(db::get_review_with_author(&mut ex, id).await?)
    }

    /// Lists the reviews that match `query` along with the public details of their authors.
    pub async fn list_reviews(self, query: ListQuery) -> DriverResult<Vec<ReviewWithAuthor>> {
        let mut ex = self.db.ex().await?;
        Ok(db::list_reviews_with_author(&mut ex, &query).await?)
    }

    /// Applies `update` to the review `id` and updates the rating aggregates of its tour.
    pub async fn update_review(
        self,
        id: Id,
        update: ReviewUpdate,
    ) -> DriverResult<ReviewWithAuthor> {
        let mut tx = self.db.begin().await?;
        let review = db::get_review(tx.ex(), id).await?.apply(update)?;
        db::update_review(tx.ex(), &review).await?;
        recompute_tour_rating(tx.ex(), review.tour).await?;
        let review = db::get_review_with_author(tx.ex(), id).await?;
        tx.commit().await?;
        Ok(review)
    }

    /// Deletes the review `id` and updates the rating aggregates of its tour.
    pub async fn delete_review(self, id: Id) -> DriverResult<()> {
        let mut tx = self.db.begin().await?;
        let review = db::get_review(tx.ex(), id).await?;
        db::delete_review(tx.ex(), id).await?;
        recompute_tour_rating(tx.ex(), review.tour).await?;
        tx.commit().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::testutils::*;
    use crate::model::new_tour;
    use tourbook_authn::model::Role;

    /// Details of a review by `user` on `tour` with the given `rating`.
    fn new_review(tour: Id, user: Id, rating: Option<u8>) -> NewReview {
        NewReview {
            review: Some("What an experience".to_owned()),
            rating,
            tour: Some(tour),
            user: Some(user),
        }
    }

    #[tokio::test]
    async fn test_create_review_ok() {
        let context = TestContext::setup().await;
        let tour = context.create_tour("The Forest Hiker", 397.0).await;
        let jane = context.create_user("Jane", Role::User).await;

        let review = context
            .driver()
            .create_review(new_review(tour.id, jane.user.id(), Some(4)))
            .await
            .unwrap();
        assert_eq!("What an experience", review.review);
        assert_eq!(Some(4), review.rating);
        assert_eq!(tour.id, review.tour);
        assert_eq!(jane.user.id(), review.user.id);
        assert_eq!("Jane", review.user.name);
        assert_eq!(review, context.driver().get_review(review.id).await.unwrap());
    }

    #[tokio::test]
    async fn test_create_review_missing_references() {
        let context = TestContext::setup().await;
        let tour = context.create_tour("The Forest Hiker", 397.0).await;
        let jane = context.create_user("Jane", Role::User).await;

        let new = NewReview { tour: None, ..new_review(tour.id, jane.user.id(), None) };
        match context.driver().create_review(new).await {
            Err(DriverError::InvalidInput(msg)) => assert!(msg.contains("belong to a tour")),
            e => panic!("{:?}", e),
        }

        let new = NewReview { user: None, ..new_review(tour.id, jane.user.id(), None) };
        match context.driver().create_review(new).await {
            Err(DriverError::InvalidInput(msg)) => assert!(msg.contains("belong to a user")),
            e => panic!("{:?}", e),
        }

        let new = new_review(Id::generate(), jane.user.id(), None);
        match context.driver().create_review(new).await {
            Err(DriverError::NotFound(msg)) => assert!(msg.contains("No tour")),
            e => panic!("{:?}", e),
        }

        let new = new_review(tour.id, Id::generate(), None);
        match context.driver().create_review(new).await {
            Err(DriverError::NotFound(msg)) => assert!(msg.contains("No user")),
            e => panic!("{:?}", e),
        }
    }

    #[tokio::test]
    async fn test_create_review_secret_tour() {
        let context = TestContext::setup().await;
        let mut new = new_tour("The Secret Getaway", 397.0);
        new.secret = Some(true);
        let tour = context.driver().create_tour(new).await.unwrap();
        let jane = context.create_user("Jane", Role::User).await;

        match context.driver().create_review(new_review(tour.id, jane.user.id(), Some(5))).await {
            Err(DriverError::NotFound(msg)) => assert!(msg.contains("No tour")),
            e => panic!("{:?}", e),
        }
        assert_eq!(0, context.get_tour(tour.id).await.ratings_quantity);
    }

    #[tokio::test]
    async fn test_create_review_invalid() {
        let context = TestContext::setup().await;
        let tour = context.create_tour("The Forest Hiker", 397.0).await;
        let jane = context.create_user("Jane", Role::User).await;

        match context.driver().create_review(new_review(tour.id, jane.user.id(), Some(6))).await {
            Err(DriverError::InvalidInput(msg)) => assert!(msg.contains("between 1 and 5")),
            e => panic!("{:?}", e),
        }

        let new = NewReview { review: None, ..new_review(tour.id, jane.user.id(), None) };
        match context.driver().create_review(new).await {
            Err(DriverError::InvalidInput(msg)) => assert!(msg.contains("can not be empty")),
            e => panic!("{:?}", e),
        }
    }

    #[tokio::test]
    async fn test_create_review_duplicate() {
        let context = TestContext::setup().await;
        let tour = context.create_tour("The Forest Hiker", 397.0).await;
        let jane = context.create_user("Jane", Role::User).await;
        context.create_review(tour.id, jane.user.id(), 5).await;

        match context.driver().create_review(new_review(tour.id, jane.user.id(), Some(1))).await {
            Err(DriverError::AlreadyExists(msg)) => assert!(msg.contains("already reviewed")),
            e => panic!("{:?}", e),
        }
        let tour = context.get_tour(tour.id).await;
        assert_eq!((5.0, 1), (tour.ratings_average, tour.ratings_quantity));
    }

    #[tokio::test]
    async fn test_rating_aggregates_follow_reviews() {
        let context = TestContext::setup().await;
        let tour = context.create_tour("Mountain Trek Adventure", 1000.0).await;
        let jane = context.create_user("Jane", Role::User).await;
        let john = context.create_user("John", Role::User).await;

        let first = context.create_review(tour.id, jane.user.id(), 5).await;
        let tour_now = context.get_tour(tour.id).await;
        assert_eq!((5.0, 1), (tour_now.ratings_average, tour_now.ratings_quantity));

        let second = context.create_review(tour.id, john.user.id(), 3).await;
        let tour_now = context.get_tour(tour.id).await;
        assert_eq!((4.0, 2), (tour_now.ratings_average, tour_now.ratings_quantity));

        context.driver().delete_review(first.id).await.unwrap();
        let tour_now = context.get_tour(tour.id).await;
        assert_eq!((3.0, 1), (tour_now.ratings_average, tour_now.ratings_quantity));

        let update = ReviewUpdate { review: None, rating: Some(2) };
        context.driver().update_review(second.id, update).await.unwrap();
        let tour_now = context.get_tour(tour.id).await;
        assert_eq!((2.0, 1), (tour_now.ratings_average, tour_now.ratings_quantity));

        context.driver().delete_review(second.id).await.unwrap();
        let tour_now = context.get_tour(tour.id).await;
        assert_eq!(
            (DEFAULT_RATINGS_AVERAGE, 0),
            (tour_now.ratings_average, tour_now.ratings_quantity)
        );
    }

    #[tokio::test]
    async fn test_rating_aggregates_ignore_unrated_reviews_in_average() {
        let context = TestContext::setup().await;
        let tour = context.create_tour("The Forest Hiker", 397.0).await;
        let jane = context.create_user("Jane", Role::User).await;
        let john = context.create_user("John", Role::User).await;

        context.driver().create_review(new_review(tour.id, jane.user.id(), None)).await.unwrap();
        let tour_now = context.get_tour(tour.id).await;
        assert_eq!(
            (DEFAULT_RATINGS_AVERAGE, 1),
            (tour_now.ratings_average, tour_now.ratings_quantity)
        );

        context.create_review(tour.id, john.user.id(), 2).await;
        let tour_now = context.get_tour(tour.id).await;
        assert_eq!((2.0, 2), (tour_now.ratings_average, tour_now.ratings_quantity));
    }

    #[tokio::test]
    async fn test_update_review_idempotent() {
        let context = TestContext::setup().await;
        let tour = context.create_tour("The Forest Hiker", 397.0).await;
        let jane = context.create_user("Jane", Role::User).await;
        let review = context.create_review(tour.id, jane.user.id(), 5).await;

        let update =
            || ReviewUpdate { review: Some("Changed my mind".to_owned()), rating: Some(3) };
        let review1 = context.driver().update_review(review.id, update()).await.unwrap();
        let review2 = context.driver().update_review(review.id, update()).await.unwrap();
        assert_eq!(review1, review2);
        assert_eq!("Changed my mind", review2.review);
        assert_eq!(review.created_at, review2.created_at);
    }

    #[tokio::test]
    async fn test_update_review_invalid() {
        let context = TestContext::setup().await;
        let tour = context.create_tour("The Forest Hiker", 397.0).await;
        let jane = context.create_user("Jane", Role::User).await;
        let review = context.create_review(tour.id, jane.user.id(), 5).await;

        let update = ReviewUpdate { review: None, rating: Some(0) };
        match context.driver().update_review(review.id, update).await {
            Err(DriverError::InvalidInput(msg)) => assert!(msg.contains("between 1 and 5")),
            e => panic!("{:?}", e),
        }
        assert_eq!(review, context.driver().get_review(review.id).await.unwrap());
    }

    #[tokio::test]
    async fn test_review_not_found() {
        let context = TestContext::setup().await;

        match context.driver().get_review(Id::generate()).await {
            Err(DriverError::NotFound(_)) => (),
            e => panic!("{:?}", e),
        }
        match context.driver().update_review(Id::generate(), ReviewUpdate::default()).await {
            Err(DriverError::NotFound(_)) => (),
            e => panic!("{:?}", e),
        }
        match context.driver().delete_review(Id::generate()).await {
            Err(DriverError::NotFound(_)) => (),
            e => panic!("{:?}", e),
        }
    }

    #[tokio::test]
    async fn test_list_reviews_by_tour() {
        let context = TestContext::setup().await;
        let tour1 = context.create_tour("The Forest Hiker", 397.0).await;
        let tour2 = context.create_tour("The Sea Explorer", 497.0).await;
        let jane = context.create_user("Jane", Role::User).await;
        let review1 = context.create_review(tour1.id, jane.user.id(), 5).await;
        let review2 = context.create_review(tour2.id, jane.user.id(), 4).await;

        let query = ListQuery::parse(&[], db::REVIEW_FIELDS).unwrap();
        assert_eq!(2, context.driver().list_reviews(query.clone()).await.unwrap().len());

        let query = query.scoped_to(db::REVIEW_TOUR_FIELD, tour2.id);
        assert_eq!(vec![review2], context.driver().list_reviews(query).await.unwrap());
        assert_ne!(review1.tour, tour2.id);
    }

    #[tokio::test]
    async fn test_deleting_author_refreshes_rating_aggregates() {
        let context = TestContext::setup().await;
        let tour1 = context.create_tour("The Forest Hiker", 397.0).await;
        let tour2 = context.create_tour("The Sea Explorer", 497.0).await;
        let jane = context.create_user("Jane", Role::User).await;
        let john = context.create_user("John", Role::User).await;
        context.create_review(tour1.id, jane.user.id(), 5).await;
        context.create_review(tour2.id, jane.user.id(), 1).await;
        let kept = context.create_review(tour2.id, john.user.id(), 4).await;

        context.authn().driver().delete_user(jane.user.id()).await.unwrap();

        let tour_now = context.get_tour(tour1.id).await;
        assert_eq!(
            (DEFAULT_RATINGS_AVERAGE, 0),
            (tour_now.ratings_average, tour_now.ratings_quantity)
        );
        let tour_now = context.get_tour(tour2.id).await;
        assert_eq!((4.0, 1), (tour_now.ratings_average, tour_now.ratings_quantity));

        let query = ListQuery::parse(&[], db::REVIEW_FIELDS).unwrap();
        assert_eq!(vec![kept], context.driver().list_reviews(query).await.unwrap());
    }
}
