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

//! API to log into an existing account.

use crate::driver::AuthnDriver;
use crate::driver::signup::BAD_CREDENTIALS_MESSAGE;
use crate::model::Password;
use crate::rest::token_response;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::Response;
use serde::Deserialize;
#[cfg(test)]
use serde::Serialize;
use tourbook_core::model::EmailAddress;
use tourbook_core::rest::{JsonBody, RestError, RestResult};

/// Message sent to the server to log in.
///
/// The fields are plain strings so that malformed credentials are reported like wrong ones.
#[derive(Deserialize)]
#[cfg_attr(test, derive(Serialize))]
pub(crate) struct LoginRequest {
    /// Email address of the user.
    #[serde(default)]
    pub(crate) email: Option<String>,

    /// Password of the user.
    #[serde(default)]
    pub(crate) password: Option<String>,
}

/// POST handler for this API.
pub(crate) async fn handler(
    State(driver): State<AuthnDriver>,
    JsonBody(request): JsonBody<LoginRequest>,
) -> RestResult<Response> {
    let (email, password) = match (request.email, request.password) {
        (Some(email), Some(password)) => (email, password),
        _ => {
            return Err(RestError::InvalidRequest(
                "Please provide email and password!".to_owned(),
            ));
        }
    };
    let bad_credentials = |_| RestError::Unauthorized(BAD_CREDENTIALS_MESSAGE.to_owned());
    let email = EmailAddress::new(email).map_err(bad_credentials)?;
    let password = Password::new(password).map_err(bad_credentials)?;

    let opts = driver.opts();
    let login = driver.login(email, password).await?;
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
    use tourbook_core::test_payload_must_be_json;

    fn route() -> (http::Method, String) {
        (http::Method::POST, "/api/v1/users/login".to_owned())
    }

    fn request(email: &str, password: &str) -> LoginRequest {
        LoginRequest { email: Some(email.to_owned()), password: Some(password.to_owned()) }
    }

    #[tokio::test]
    async fn test_ok() {
        let context = TestContextBuilder::new().build().await;
        let created = context.create_user("Jane", Role::Guide).await;

        let checker = OneShotBuilder::new(context.app(), route())
            .send_json(request("JANE@example.com", TEST_PASSWORD))
            .await;
        let cookie = checker.cookie("jwt").unwrap();
        let response = checker.expect_json::<TokenResponse>().await;
        assert_eq!("success", response.status);
        assert_eq!(created.user.to_public(), response.data.user);
        assert!(cookie.starts_with(&format!("jwt={};", response.token.as_str())));
    }

    #[tokio::test]
    async fn test_bad_credentials() {
        let context = TestContextBuilder::new().build().await;
        context.create_user("Jane", Role::User).await;

        for request in [
            request("jane@example.com", "wrong password"),
            request("john@example.com", TEST_PASSWORD),
            request("not an email", TEST_PASSWORD),
        ] {
            OneShotBuilder::new(context.app(), route())
                .send_json(request)
                .await
                .expect_status(http::StatusCode::UNAUTHORIZED)
                .expect_error("^Incorrect email or password$")
                .await;
        }
    }

    #[tokio::test]
    async fn test_missing_fields() {
        let context = TestContextBuilder::new().build().await;

        for request in [
            LoginRequest { email: None, password: Some("x".to_owned()) },
            LoginRequest { email: Some("jane@example.com".to_owned()), password: None },
        ] {
            OneShotBuilder::new(context.app(), route())
                .send_json(request)
                .await
                .expect_status(http::StatusCode::BAD_REQUEST)
                .expect_error("Please provide email and password")
                .await;
        }
    }

    test_payload_must_be_json!(TestContextBuilder::new().build().await.app(), route());
}
