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

//! API to review a tour.
//!
//! Reviews can be posted to the reviews collection, naming the tour in the body, or under the
//! tour they belong to, in which case the path wins over the body.  The author is always the
//! caller.

use crate::driver::ToursDriver;
use crate::model::{NewReview, ReviewWithAuthor};
use crate::rest::policies::Reviewers;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use tourbook_authn::rest::Caller;
use tourbook_core::model::Id;
use tourbook_core::rest::{Envelope, JsonBody, RestResult};

/// Binds `new` to the caller and to `tour`, if known, and creates the review.
async fn create(
    driver: ToursDriver,
    caller: Caller<Reviewers>,
    tour: Option<Id>,
    mut new: NewReview,
) -> RestResult<(StatusCode, Envelope<ReviewWithAuthor>)> {
    if tour.is_some() {
        new.tour = tour;
    }
    new.user = Some(caller.user().id());
    let review = driver.create_review(new).await?;
    Ok((StatusCode::CREATED, Envelope::one("review", review)))
}

/// POST handler for the reviews collection.
pub(crate) async fn handler(
    caller: Caller<Reviewers>,
    State(driver): State<ToursDriver>,
    JsonBody(new): JsonBody<NewReview>,
) -> RestResult<(StatusCode, Envelope<ReviewWithAuthor>)> {
    create(driver, caller, None, new).await
}

/// POST handler for the reviews of a single tour.
pub(crate) async fn nested_handler(
    caller: Caller<Reviewers>,
    State(driver): State<ToursDriver>,
    Path(tour): Path<String>,
    JsonBody(new): JsonBody<NewReview>,
) -> RestResult<(StatusCode, Envelope<ReviewWithAuthor>)> {
    let tour = Id::parse(tour)?;
    create(driver, caller, Some(tour), new).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rest::testutils::*;
    use axum::http;
    use serde_json::json;
    use tourbook_authn::model::Role;
    use tourbook_core::rest::testutils::OneShotBuilder;

    fn route() -> (http::Method, String) {
        (http::Method::POST, "/api/v1/reviews".to_owned())
    }

    fn nested_route(tour: Id) -> (http::Method, String) {
        (http::Method::POST, format!("/api/v1/tours/{}/reviews", tour))
    }

    #[tokio::test]
    async fn test_nested_ok() {
        let context = TestContextBuilder::new().build().await;
        let jane = context.create_user("Jane", Role::User).await;
        let tour = context.create_tour("The Forest Hiker", 397.0).await;

        let review = OneShotBuilder::new(context.app(), nested_route(tour.id))
            .with_bearer_auth(jane.access_token.as_str())
            .send_json(json!({"review": "  Loved it  ", "rating": 4}))
            .await
            .expect_status(http::StatusCode::CREATED)
            .expect_data::<ReviewWithAuthor>("review")
            .await;
        assert_eq!("Loved it", review.review);
        assert_eq!(Some(4), review.rating);
        assert_eq!(tour.id, review.tour);
        assert_eq!(jane.user.id(), review.user.id);
        assert_eq!("Jane", review.user.name);

        let tour = context.get_tour(tour.id).await;
        assert_eq!((4.0, 1), (tour.ratings_average, tour.ratings_quantity));
    }

    #[tokio::test]
    async fn test_collection_ok_with_explicit_tour() {
        let context = TestContextBuilder::new().build().await;
        let jane = context.create_user("Jane", Role::User).await;
        let tour = context.create_tour("The Forest Hiker", 397.0).await;

        let review = OneShotBuilder::new(context.app(), route())
            .with_cookie("jwt", jane.access_token.as_str())
            .send_json(json!({"review": "Fine", "rating": 3, "tour": tour.id}))
            .await
            .expect_status(http::StatusCode::CREATED)
            .expect_data::<ReviewWithAuthor>("review")
            .await;
        assert_eq!(tour.id, review.tour);
        assert_eq!(jane.user.id(), review.user.id);
    }

    #[tokio::test]
    async fn test_author_is_always_the_caller() {
        let context = TestContextBuilder::new().build().await;
        let jane = context.create_user("Jane", Role::User).await;
        let john = context.create_user("John", Role::User).await;
        let tour = context.create_tour("The Forest Hiker", 397.0).await;

        let review = OneShotBuilder::new(context.app(), route())
            .with_bearer_auth(jane.access_token.as_str())
            .send_json(json!({
                "review": "Fine",
                "rating": 1,
                "tour": tour.id,
                "user": john.user.id()
            }))
            .await
            .expect_status(http::StatusCode::CREATED)
            .expect_data::<ReviewWithAuthor>("review")
            .await;
        assert_eq!(jane.user.id(), review.user.id);

        let review = OneShotBuilder::new(context.app(), nested_route(tour.id))
            .with_bearer_auth(john.access_token.as_str())
            .send_json(json!({"review": "Great", "rating": 5, "user": jane.user.id()}))
            .await
            .expect_status(http::StatusCode::CREATED)
            .expect_data::<ReviewWithAuthor>("review")
            .await;
        assert_eq!(john.user.id(), review.user.id);
    }

    #[tokio::test]
    async fn test_nested_path_overrides_body_tour() {
        let context = TestContextBuilder::new().build().await;
        let jane = context.create_user("Jane", Role::User).await;
        let tour1 = context.create_tour("The Forest Hiker", 397.0).await;
        let tour2 = context.create_tour("The Sea Explorer", 497.0).await;

        let review = OneShotBuilder::new(context.app(), nested_route(tour1.id))
            .with_bearer_auth(jane.access_token.as_str())
            .send_json(json!({"review": "Fine", "rating": 2, "tour": tour2.id}))
            .await
            .expect_status(http::StatusCode::CREATED)
            .expect_data::<ReviewWithAuthor>("review")
            .await;
        assert_eq!(tour1.id, review.tour);
        assert_eq!(0, context.get_tour(tour2.id).await.ratings_quantity);
    }

    #[tokio::test]
    async fn test_collection_requires_tour() {
        let context = TestContextBuilder::new().build().await;
        let jane = context.create_user("Jane", Role::User).await;

        OneShotBuilder::new(context.app(), route())
            .with_bearer_auth(jane.access_token.as_str())
            .send_json(json!({"review": "Fine", "rating": 3}))
            .await
            .expect_status(http::StatusCode::BAD_REQUEST)
            .expect_error("Review must belong to a tour")
            .await;
    }

    #[tokio::test]
    async fn test_only_users_can_review() {
        let context = TestContextBuilder::new().build().await;
        let tour = context.create_tour("The Forest Hiker", 397.0).await;

        OneShotBuilder::new(context.app(), nested_route(tour.id))
            .send_json(json!({"review": "Fine", "rating": 3}))
            .await
            .expect_status(http::StatusCode::UNAUTHORIZED)
            .expect_error("You are not logged in")
            .await;

        for role in [Role::Guide, Role::LeadGuide, Role::Admin] {
            let caller = context.create_user(&format!("Caller-{}", role), role).await;
            OneShotBuilder::new(context.app(), nested_route(tour.id))
                .with_bearer_auth(caller.access_token.as_str())
                .send_json(json!({"review": "Fine", "rating": 3}))
                .await
                .expect_status(http::StatusCode::FORBIDDEN)
                .expect_error("You do not have permission")
                .await;
        }
    }

    #[tokio::test]
    async fn test_duplicate_review() {
        let context = TestContextBuilder::new().build().await;
        let jane = context.create_user("Jane", Role::User).await;
        let tour = context.create_tour("The Forest Hiker", 397.0).await;
        context.create_review(tour.id, jane.user.id(), 5).await;

        OneShotBuilder::new(context.app(), nested_route(tour.id))
            .with_bearer_auth(jane.access_token.as_str())
            .send_json(json!({"review": "Again", "rating": 1}))
            .await
            .expect_status(http::StatusCode::BAD_REQUEST)
            .expect_error("You have already reviewed this tour")
            .await;

        let tour = context.get_tour(tour.id).await;
        assert_eq!((5.0, 1), (tour.ratings_average, tour.ratings_quantity));
    }

    #[tokio::test]
    async fn test_unknown_tour() {
        let context = TestContextBuilder::new().build().await;
        let jane = context.create_user("Jane", Role::User).await;

        OneShotBuilder::new(context.app(), nested_route(Id::generate()))
            .with_bearer_auth(jane.access_token.as_str())
            .send_json(json!({"review": "Fine", "rating": 3}))
            .await
            .expect_status(http::StatusCode::NOT_FOUND)
            .expect_error("No tour found with that ID")
            .await;

        OneShotBuilder::new(context.app(), (http::Method::POST, "/api/v1/tours/xyz/reviews"))
            .with_bearer_auth(jane.access_token.as_str())
            .send_json(json!({"review": "Fine", "rating": 3}))
            .await
            .expect_status(http::StatusCode::BAD_REQUEST)
            .expect_error("Invalid id: xyz")
            .await;
    }

    #[tokio::test]
    async fn test_validation_errors() {
        let context = TestContextBuilder::new().build().await;
        let jane = context.create_user("Jane", Role::User).await;
        let tour = context.create_tour("The Forest Hiker", 397.0).await;

        for (body, error) in [
            (json!({"rating": 3}), "Review can not be empty!"),
            (json!({"review": "Fine", "rating": 0}), "Rating must be between 1 and 5"),
        ] {
            OneShotBuilder::new(context.app(), nested_route(tour.id))
                .with_bearer_auth(jane.access_token.as_str())
                .send_json(body)
                .await
                .expect_status(http::StatusCode::BAD_REQUEST)
                .expect_error(error)
                .await;
        }
        assert_eq!(0, context.get_tour(tour.id).await.ratings_quantity);
    }

    #[tokio::test]
    async fn test_payload_must_be_json() {
        let context = TestContextBuilder::new().build().await;
        let jane = context.create_user("Jane", Role::User).await;

        OneShotBuilder::new(context.app(), route())
            .with_bearer_auth(jane.access_token.as_str())
            .send_text("this is not json")
            .await
            .expect_status(http::StatusCode::BAD_REQUEST)
            .expect_error("Content-Type")
            .await;
    }
}
