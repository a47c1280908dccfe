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

//! The tours collection.

use crate::db::TOUR_FIELDS;
use crate::driver::ToursDriver;
use crate::model::{NewTour, TourDetails, TourUpdate};
use async_trait::async_trait;
use tourbook_core::driver::DriverResult;
use tourbook_core::model::Id;
use tourbook_core::query::{FieldSpec, ListQuery};
use tourbook_core::rest::crud::Resource;

/// The tours collection.  Single tours are returned along with their reviews.
pub(crate) struct Tours;

#[async_trait]
impl Resource for Tours {
    type Driver = ToursDriver;
    type Entity = TourDetails;
    type Create = NewTour;
    type Update = TourUpdate;

    const SINGULAR: &'static str = "tour";
    const PLURAL: &'static str = "tours";
    const FIELDS: &'static [FieldSpec] = TOUR_FIELDS;

    async fn create(driver: ToursDriver, input: NewTour) -> DriverResult<TourDetails> {
        let tour = driver.create_tour(input).await?;
        Ok(TourDetails { tour, reviews: None })
    }

    async fn get(driver: ToursDriver, id: Id) -> DriverResult<TourDetails> {
        driver.get_tour(id).await
    }

    async fn list(driver: ToursDriver, query: ListQuery) -> DriverResult<Vec<TourDetails>> {
        let tours = driver.list_tours(query).await?;
        Ok(tours.into_iter().map(|tour| TourDetails { tour, reviews: None }).collect())
    }

    async fn update(driver: ToursDriver, id: Id, input: TourUpdate) -> DriverResult<TourDetails> {
        let tour = driver.update_tour(id, input).await?;
        Ok(TourDetails { tour, reviews: None })
    }

    async fn delete(driver: ToursDriver, id: Id) -> DriverResult<()> {
        driver.delete_tour(id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Tour;
    use crate::rest::testutils::*;
    use axum::http;
    use serde_json::json;
    use tourbook_authn::model::Role;
    use tourbook_core::rest::Envelope;
    use tourbook_core::rest::testutils::OneShotBuilder;

    fn collection() -> &'static str {
        "/api/v1/tours"
    }

    fn item(id: Id) -> String {
        format!("/api/v1/tours/{}", id)
    }

    /// Body of a valid request to create a tour named `name`.
    fn new_tour_json(name: &str, price: f64) -> serde_json::Value {
        json!({
            "name": name,
            "duration": 5,
            "maxGroupSize": 25,
            "difficulty": "easy",
            "price": price,
            "summary": "Breathtaking hike through the Canadian Banff National Park",
            "imageCover": "tour-1-cover.jpg",
            "startDates": ["2024-04-25T09:00:00Z", "2024-07-20"],
        })
    }

    #[tokio::test]
    async fn test_create_requires_editor() {
        let context = TestContextBuilder::new().build().await;

        OneShotBuilder::new(context.app(), (http::Method::POST, collection()))
            .send_json(new_tour_json("The Forest Hiker", 397.0))
            .await
            .expect_status(http::StatusCode::UNAUTHORIZED)
            .expect_error("You are not logged in")
            .await;

        for role in [Role::User, Role::Guide] {
            let caller = context.create_user(&format!("Caller-{}", role), role).await;
            OneShotBuilder::new(context.app(), (http::Method::POST, collection()))
                .with_bearer_auth(caller.access_token.as_str())
                .send_json(new_tour_json("The Forest Hiker", 397.0))
                .await
                .expect_status(http::StatusCode::FORBIDDEN)
                .expect_error("You do not have permission")
                .await;
        }
        assert_eq!(0, context.count_tours().await);
    }

    #[tokio::test]
    async fn test_create_and_get() {
        let context = TestContextBuilder::new().build().await;
        let lead = context.create_user("Lead", Role::LeadGuide).await;

        let tour = OneShotBuilder::new(context.app(), (http::Method::POST, collection()))
            .with_bearer_auth(lead.access_token.as_str())
            .send_json(new_tour_json("The Forest Hiker", 397.0))
            .await
            .expect_status(http::StatusCode::CREATED)
            .expect_data::<Tour>("tour")
            .await;
        assert_eq!("the-forest-hiker", tour.slug.as_str());
        assert_eq!(2, tour.start_dates.len());

        let details = OneShotBuilder::new(context.app(), (http::Method::GET, item(tour.id)))
            .send_empty()
            .await
            .expect_data::<TourDetails>("tour")
            .await;
        assert_eq!(tour, details.tour);
        assert_eq!(Some(vec![]), details.reviews);
    }

    #[tokio::test]
    async fn test_create_validation_errors() {
        let context = TestContextBuilder::new().build().await;
        let admin = context.create_user("Admin", Role::Admin).await;

        let mut body = new_tour_json("The Forest Hiker", 397.0);
        body["priceDiscount"] = json!(400);
        OneShotBuilder::new(context.app(), (http::Method::POST, collection()))
            .with_bearer_auth(admin.access_token.as_str())
            .send_json(body)
            .await
            .expect_status(http::StatusCode::BAD_REQUEST)
            .expect_error("Discount price \\(400\\) should be below regular price")
            .await;

        let mut body = new_tour_json("The Forest Hiker", 397.0);
        body["difficulty"] = json!("extreme");
        OneShotBuilder::new(context.app(), (http::Method::POST, collection()))
            .with_bearer_auth(admin.access_token.as_str())
            .send_json(body)
            .await
            .expect_status(http::StatusCode::BAD_REQUEST)
            .expect_error("Difficulty is either")
            .await;

        context.create_tour("The Forest Hiker", 100.0).await;
        OneShotBuilder::new(context.app(), (http::Method::POST, collection()))
            .with_bearer_auth(admin.access_token.as_str())
            .send_json(new_tour_json("The Forest Hiker", 397.0))
            .await
            .expect_status(http::StatusCode::BAD_REQUEST)
            .expect_error("Duplicate field value")
            .await;
    }

    #[tokio::test]
    async fn test_get_not_found_and_bad_id() {
        let context = TestContextBuilder::new().build().await;

        OneShotBuilder::new(context.app(), (http::Method::GET, item(Id::generate())))
            .send_empty()
            .await
            .expect_status(http::StatusCode::NOT_FOUND)
            .expect_error("No tour found with that ID")
            .await;

        OneShotBuilder::new(context.app(), (http::Method::GET, "/api/v1/tours/not-an-id"))
            .send_empty()
            .await
            .expect_status(http::StatusCode::BAD_REQUEST)
            .expect_error("Invalid id: not-an-id")
            .await;
    }

    #[tokio::test]
    async fn test_list_with_query() {
        let context = TestContextBuilder::new().build().await;
        context.create_tour("The Park Camper", 397.0).await;
        let mid = context.create_tour("The Wine Taster", 1997.0).await;
        let pricey = context.create_tour("The Star Gazer", 2997.0).await;

        let envelope = OneShotBuilder::new(context.app(), (http::Method::GET, collection()))
            .with_query([("price[gte]", "1000"), ("sort", "-price"), ("fields", "name")])
            .send_empty()
            .await
            .expect_json::<Envelope<Vec<serde_json::Value>>>()
            .await;
        assert_eq!(Some(2), envelope.results);
        assert_eq!(
            vec![
                json!({"id": pricey.id, "name": "The Star Gazer"}),
                json!({"id": mid.id, "name": "The Wine Taster"}),
            ],
            envelope.take("tours").unwrap()
        );
    }

    #[tokio::test]
    async fn test_list_pagination_out_of_range() {
        let context = TestContextBuilder::new().build().await;
        context.create_tour("The Park Camper", 397.0).await;
        let second = context.create_tour("The Wine Taster", 1997.0).await;

        let tours = OneShotBuilder::new(context.app(), (http::Method::GET, collection()))
            .with_query([("sort", "price"), ("page", "2"), ("limit", "1")])
            .send_empty()
            .await
            .expect_status(http::StatusCode::OK)
            .expect_data::<Vec<Tour>>("tours")
            .await;
        assert_eq!(vec![second.id], tours.into_iter().map(|t| t.id).collect::<Vec<_>>());

        for (page, limit) in [("4294967295", "4294967295"), ("4294967295", "1"), ("3", "1")] {
            let tours = OneShotBuilder::new(context.app(), (http::Method::GET, collection()))
                .with_query([("page", page), ("limit", limit)])
                .send_empty()
                .await
                .expect_status(http::StatusCode::OK)
                .expect_data::<Vec<Tour>>("tours")
                .await;
            assert!(tours.is_empty());
        }
    }

    #[tokio::test]
    async fn test_list_hides_secret() {
        let context = TestContextBuilder::new().build().await;
        let admin = context.create_user("Admin", Role::Admin).await;

        let mut body = new_tour_json("The Secret Getaway", 397.0);
        body["secretTour"] = json!(true);
        OneShotBuilder::new(context.app(), (http::Method::POST, collection()))
            .with_bearer_auth(admin.access_token.as_str())
            .send_json(body)
            .await
            .expect_status(http::StatusCode::CREATED)
            .take_response()
            .await;

        let tours = OneShotBuilder::new(context.app(), (http::Method::GET, collection()))
            .send_empty()
            .await
            .expect_data::<Vec<Tour>>("tours")
            .await;
        assert!(tours.is_empty());
        assert_eq!(1, context.count_tours().await);
    }

    #[tokio::test]
    async fn test_secret_tour_not_found_for_writes() {
        let context = TestContextBuilder::new().build().await;
        let admin = context.create_user("Admin", Role::Admin).await;

        let mut body = new_tour_json("The Secret Getaway", 397.0);
        body["secretTour"] = json!(true);
        let tour = OneShotBuilder::new(context.app(), (http::Method::POST, collection()))
            .with_bearer_auth(admin.access_token.as_str())
            .send_json(body)
            .await
            .expect_status(http::StatusCode::CREATED)
            .expect_data::<Tour>("tour")
            .await;

        OneShotBuilder::new(context.app(), (http::Method::PATCH, item(tour.id)))
            .with_bearer_auth(admin.access_token.as_str())
            .send_json(json!({"price": 500}))
            .await
            .expect_status(http::StatusCode::NOT_FOUND)
            .expect_error("No tour found with that ID")
            .await;

        OneShotBuilder::new(context.app(), (http::Method::DELETE, item(tour.id)))
            .with_bearer_auth(admin.access_token.as_str())
            .send_empty()
            .await
            .expect_status(http::StatusCode::NOT_FOUND)
            .expect_error("No tour found with that ID")
            .await;

        assert_eq!(397.0, context.get_tour(tour.id).await.price);
    }

    #[tokio::test]
    async fn test_update_idempotent() {
        let context = TestContextBuilder::new().build().await;
        let admin = context.create_user("Admin", Role::Admin).await;
        let tour = context.create_tour("The Forest Hiker", 397.0).await;

        let mut responses = vec![];
        for _ in 0..2 {
            let response = OneShotBuilder::new(context.app(), (http::Method::PATCH, item(tour.id)))
                .with_bearer_auth(admin.access_token.as_str())
                .send_json(json!({"name": "The Forest Walker", "ratingsAverage": 1.0}))
                .await
                .expect_data::<Tour>("tour")
                .await;
            responses.push(response);
        }
        assert_eq!(responses[0], responses[1]);
        assert_eq!("the-forest-walker", responses[1].slug.as_str());
        assert_eq!(4.5, responses[1].ratings_average);
    }

    #[tokio::test]
    async fn test_update_and_delete_require_editor() {
        let context = TestContextBuilder::new().build().await;
        let guide = context.create_user("Guide", Role::Guide).await;
        let tour = context.create_tour("The Forest Hiker", 397.0).await;

        OneShotBuilder::new(context.app(), (http::Method::PATCH, item(tour.id)))
            .with_bearer_auth(guide.access_token.as_str())
            .send_json(json!({"price": 1}))
            .await
            .expect_status(http::StatusCode::FORBIDDEN)
            .expect_error("You do not have permission")
            .await;

        OneShotBuilder::new(context.app(), (http::Method::DELETE, item(tour.id)))
            .with_bearer_auth(guide.access_token.as_str())
            .send_empty()
            .await
            .expect_status(http::StatusCode::FORBIDDEN)
            .expect_error("You do not have permission")
            .await;

        assert_eq!(1, context.count_tours().await);
    }

    #[tokio::test]
    async fn test_delete() {
        let context = TestContextBuilder::new().build().await;
        let lead = context.create_user("Lead", Role::LeadGuide).await;
        let tour = context.create_tour("The Forest Hiker", 397.0).await;

        OneShotBuilder::new(context.app(), (http::Method::DELETE, item(tour.id)))
            .with_bearer_auth(lead.access_token.as_str())
            .send_empty()
            .await
            .expect_status(http::StatusCode::NO_CONTENT)
            .expect_empty()
            .await;
        assert_eq!(0, context.count_tours().await);

        OneShotBuilder::new(context.app(), (http::Method::DELETE, item(tour.id)))
            .with_bearer_auth(lead.access_token.as_str())
            .send_empty()
            .await
            .expect_status(http::StatusCode::NOT_FOUND)
            .expect_error("No tour found with that ID")
            .await;
    }
}
