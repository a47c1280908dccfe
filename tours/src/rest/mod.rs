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

//! REST interface for tours and reviews.
//!
//! The router returned by `app` serves the whole public API, including the users collection
//! provided by the `authn` crate.

use crate::driver::ToursDriver;
use axum::Router;
use axum::extract::FromRef;
use tourbook_authn::driver::AuthnDriver;
use tourbook_authn::rest::Caller;
use tourbook_core::rest::crud;

mod api_distances_get;
mod api_monthly_plan_get;
mod api_review_post;
mod api_top_cheap_get;
mod api_tour_stats_get;
mod api_tours_within_get;
mod policies;
mod reviews;
#[cfg(test)]
mod testutils;
mod tours;

use policies::{ReviewEditors, TourEditors};
use reviews::Reviews;
use tours::Tours;

/// State shared by all handlers.
#[derive(Clone)]
pub(crate) struct AppState {
    /// Driver for the operations on tours and reviews.
    tours: ToursDriver,

    /// Driver used to authenticate callers.
    authn: AuthnDriver,
}

impl FromRef<AppState> for ToursDriver {
    fn from_ref(state: &AppState) -> Self {
        state.tours.clone()
    }
}

impl FromRef<AppState> for AuthnDriver {
    fn from_ref(state: &AppState) -> Self {
        state.authn.clone()
    }
}

/// Creates the router for the application.
pub fn app(tours: ToursDriver, authn: AuthnDriver) -> Router {
    use axum::routing::{get, post};

    let users = tourbook_authn::rest::app(authn.clone());

    let api = Router::new()
        .route(
            "/tours",
            get(crud::get_all::<Tours, ()>).post(crud::create_one::<Tours, Caller<TourEditors>>),
        )
        .route("/tours/top-5-cheap", get(api_top_cheap_get::handler))
        .route("/tours/tour-stats", get(api_tour_stats_get::handler))
        .route("/tours/monthly-plan/:year", get(api_monthly_plan_get::handler))
        .route(
            "/tours/tours-within/:distance/center/:latlng/unit/:unit",
            get(api_tours_within_get::handler),
        )
        .route("/tours/distances/:latlng/unit/:unit", get(api_distances_get::handler))
        .route(
            "/tours/:id",
            get(crud::get_one::<Tours, ()>)
                .patch(crud::update_one::<Tours, Caller<TourEditors>>)
                .delete(crud::delete_one::<Tours, Caller<TourEditors>>),
        )
        .route(
            "/tours/:id/reviews",
            get(crud::get_all_nested::<Reviews, ()>).post(api_review_post::nested_handler),
        )
        .route("/reviews", get(crud::get_all::<Reviews, ()>).post(api_review_post::handler))
        .route(
            "/reviews/:id",
            get(crud::get_one::<Reviews, ()>)
                .patch(crud::update_one::<Reviews, Caller<ReviewEditors>>)
                .delete(crud::delete_one::<Reviews, Caller<ReviewEditors>>),
        )
        .with_state(AppState { tours, authn });

    Router::new().nest("/api/v1", api).nest("/api/v1/users", users)
}
