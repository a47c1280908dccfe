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

//! API to change the password of the caller.

use crate::driver::AuthnDriver;
use crate::model::Password;
use crate::rest::{Caller, token_response};
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::Response;
use serde::Deserialize;
#[cfg(test)]
use serde::Serialize;
use tourbook_core::rest::{JsonBody, RestResult};

/// Message sent to the server to change a password.
#[derive(Deserialize)]
#[cfg_attr(test, derive(Serialize))]
#[serde(rename_all = "camelCase")]
pub(crate) struct UpdateMyPasswordRequest {
    /// The password currently in use, as proof of identity.
    pub(crate) password_current: Password,

    /// The new password.
    pub(crate) password: Password,

    /// Repetition of the new password.
    pub(crate) password_confirm: Password,
}

/// PATCH handler for this API.
pub(crate) async fn handler(
    caller: Caller,
    State(driver): State<AuthnDriver>,
    JsonBody(request): JsonBody<UpdateMyPasswordRequest>,
) -> RestResult<Response> {
    let opts = driver.opts();
    let login = driver
        .update_password(
            caller.user().id(),
            request.password_current,
            request.password,
            request.password_confirm,
        )
        .await?;
    token_response(&opts, StatusCode::OK, login)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::testutils::TEST_PASSWORD;
    use crate::model::Role;
    use crate::rest::TokenResponse;
    use crate::rest::testutils::*;
    use axum::http;
    use tourbook_core::rest::testutils::OneShotBuilder;

    fn route() -> (http::Method, String) {
        (http::Method::PATCH, "/api/v1/users/updateMyPassword".to_owned())
    }

    fn request(current: &'static str, new: &'static str) -> UpdateMyPasswordRequest {
        UpdateMyPasswordRequest {
            password_current: Password::from(current),
            password: Password::from(new),
            password_confirm: Password::from(new),
        }
    }

    #[tokio::test]
    async fn test_ok() {
        let context = TestContextBuilder::new().build().await;
        let created = context.create_user("Jane", Role::User).await;

        context.advance_clock(5);
        let response = OneShotBuilder::new(context.app(), route())
            .with_bearer_auth(created.access_token.as_str())
            .send_json(request(TEST_PASSWORD, "the new password"))
            .await
            .expect_json::<TokenResponse>()
            .await;

        OneShotBuilder::new(context.app(), (http::Method::GET, "/api/v1/users/me"))
            .with_bearer_auth(response.token.as_str())
            .send_empty()
            .await
            .expect_data::<serde_json::Value>("user")
            .await;
    }

    #[tokio::test]
    async fn test_wrong_current_password() {
        let context = TestContextBuilder::new().build().await;
        let created = context.create_user("Jane", Role::User).await;

        OneShotBuilder::new(context.app(), route())
            .with_bearer_auth(created.access_token.as_str())
            .send_json(request("not my password", "the new password"))
            .await
            .expect_status(http::StatusCode::UNAUTHORIZED)
            .expect_error("Your current password is wrong")
            .await;
    }

    #[tokio::test]
    async fn test_not_logged_in() {
        let context = TestContextBuilder::new().build().await;

        OneShotBuilder::new(context.app(), route())
            .send_json(request(TEST_PASSWORD, "the new password"))
            .await
            .expect_status(http::StatusCode::UNAUTHORIZED)
            .expect_error("You are not logged in")
            .await;
    }
}
