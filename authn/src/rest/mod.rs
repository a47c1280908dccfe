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

//! REST interface for user accounts and authentication.

use crate::driver::{AuthnDriver, AuthnOptions, LoginResponse};
use crate::model::{AccessToken, PublicUser};
use axum::Json;
use axum::Router;
use axum::http::StatusCode;
use axum::http::header::SET_COOKIE;
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};
use tourbook_core::rest::RestResult;
use tourbook_core::rest::crud;

mod api_delete_me_delete;
mod api_forgot_password_post;
mod api_login_post;
mod api_logout_get;
mod api_me_get;
mod api_reset_password_patch;
mod api_signup_post;
mod api_update_me_patch;
mod api_update_my_password_patch;
mod caller;
mod httputils;
#[cfg(test)]
mod testutils;
mod users;

pub use caller::{Admins, AnyRole, Caller, Policy, authorize};
pub use httputils::{AUTH_COOKIE, get_access_token};
use users::Users;

/// Body of the responses that hand out an access token.
#[derive(Debug, Deserialize, Serialize)]
pub struct TokenResponse {
    /// Always `success`.
    pub status: String,

    /// The access token, also set in the auth cookie.
    pub token: AccessToken,

    /// Payload of the response.
    pub data: TokenData,
}

/// Payload of a `TokenResponse`.
#[derive(Debug, Deserialize, Serialize)]
pub struct TokenData {
    /// The authenticated user.
    pub user: PublicUser,
}

/// Body of the responses that only carry a message.
#[derive(Debug, Deserialize, Serialize)]
pub struct MessageResponse {
    /// Always `success`.
    pub status: String,

    /// Human-readable description of the outcome.
    pub message: String,
}

impl MessageResponse {
    /// Creates a successful response with `message`.
    fn success<M: Into<String>>(message: M) -> Self {
        Self { status: "success".to_owned(), message: message.into() }
    }
}

/// Builds the response for an operation that logged a user in.
fn token_response(
    opts: &AuthnOptions,
    status: StatusCode,
    login: LoginResponse,
) -> RestResult<Response> {
    let cookie = httputils::auth_cookie(opts, &login.access_token)?;
    let body = TokenResponse {
        status: "success".to_owned(),
        token: login.access_token,
        data: TokenData { user: login.user.to_public() },
    };
    Ok((status, [(SET_COOKIE, cookie)], Json(body)).into_response())
}

/// Creates the router for the user endpoints, to be nested under the users collection path.
pub fn app(driver: AuthnDriver) -> Router {
    use axum::routing::{delete, get, patch, post};

    Router::new()
        .route("/signup", post(api_signup_post::handler))
        .route("/login", post(api_login_post::handler))
        .route("/logout", get(api_logout_get::handler))
        .route("/forgotPassword", post(api_forgot_password_post::handler))
        .route("/resetPassword/:token", patch(api_reset_password_patch::handler))
        .route("/updateMyPassword", patch(api_update_my_password_patch::handler))
        .route("/me", get(api_me_get::handler))
        .route("/updateMe", patch(api_update_me_patch::handler))
        .route("/deleteMe", delete(api_delete_me_delete::handler))
        .route(
            "/",
            get(crud::get_all::<Users, Caller<Admins>>)
                .post(crud::create_one::<Users, Caller<Admins>>),
        )
        .route(
            "/:id",
            get(crud::get_one::<Users, Caller<Admins>>)
                .patch(crud::update_one::<Users, Caller<Admins>>)
                .delete(crud::delete_one::<Users, Caller<Admins>>),
        )
        .with_state(driver)
}
