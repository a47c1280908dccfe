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

//! API to create a new account.

use crate::driver::AuthnDriver;
use crate::model::Password;
use crate::rest::token_response;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::Response;
use serde::Deserialize;
#[cfg(test)]
use serde::Serialize;
use tourbook_core::model::EmailAddress;
use tourbook_core::rest::{JsonBody, RestResult};

/// Message sent to the server to create a new account.
#[derive(Deserialize)]
#[cfg_attr(test, derive(Serialize))]
#[serde(rename_all = "camelCase")]
pub(crate) struct SignupRequest {
    /// Display name of the new user.
    pub(crate) name: String,

    /// Email address of the new user.
    pub(crate) email: EmailAddress,

    /// Password for the new user.
    pub(crate) password: Password,

    /// Repetition of the password.
    pub(crate) password_confirm: Password,
}

/// POST handler for this API.
pub(crate) async fn handler(
    State(driver): State<AuthnDriver>,
    JsonBody(request): JsonBody<SignupRequest>,
) -> RestResult<Response> {
    let opts = driver.opts();
    let login = driver
        .signup(request.name, request.email, request.password, request.password_confirm)
        .await?;
    token_response(&opts, StatusCode::CREATED, login)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Role;
    use crate::rest::TokenResponse;
    use crate::rest::testutils::*;
    use axum::http;
    use serde_json::json;
    use tourbook_core::rest::testutils::OneShotBuilder;
    use tourbook_core::test_payload_must_be_json;

    fn route() -> (http::Method, String) {
        (http::Method::POST, "/api/v1/users/signup".to_owned())
    }

    fn request(password: &'static str, password_confirm: &'static str) -> SignupRequest {
        SignupRequest {
            name: "Jane Doe".to_owned(),
            email: EmailAddress::from("jane@example.com"),
            password: Password::from(password),
            password_confirm: Password::from(password_confirm),
        }
    }

    #[tokio::test]
    async fn test_ok() {
        let context = TestContextBuilder::new().build().await;

        let checker = OneShotBuilder::new(context.app(), route())
            .send_json(request("pass1234", "pass1234"))
            .await
            .expect_status(http::StatusCode::CREATED);
        let cookie = checker.cookie("jwt").unwrap();
        let response = checker.expect_json::<serde_json::Value>().await;

        let token = response["token"].as_str().unwrap();
        assert!(cookie.starts_with(&format!("jwt={}; ", token)));
        assert!(cookie.contains("HttpOnly"));
        assert!(!cookie.contains("Secure"));
        assert_eq!("success", response["status"]);
        assert_eq!("Jane Doe", response["data"]["user"]["name"]);
        assert_eq!("user", response["data"]["user"]["role"]);
        assert!(response["data"]["user"].get("password").is_none());
        assert!(!response.to_string().contains("pass1234"));

        assert_eq!(1, context.count_users().await);
        context.mailer().expect_one_message(&EmailAddress::from("jane@example.com")).await;
    }

    #[tokio::test]
    async fn test_secure_cookie() {
        let context = TestContextBuilder::new().with_secure_cookies().build().await;

        let checker = OneShotBuilder::new(context.app(), route())
            .send_json(request("pass1234", "pass1234"))
            .await
            .expect_status(http::StatusCode::CREATED);
        assert!(checker.cookie("jwt").unwrap().ends_with("; Secure"));
        checker.expect_json::<TokenResponse>().await;
    }

    #[tokio::test]
    async fn test_passwords_differ() {
        let context = TestContextBuilder::new().build().await;

        OneShotBuilder::new(context.app(), route())
            .send_json(request("pass1234", "pass5678"))
            .await
            .expect_status(http::StatusCode::BAD_REQUEST)
            .expect_error("Passwords are not the same")
            .await;

        assert_eq!(0, context.count_users().await);
    }

    #[tokio::test]
    async fn test_bad_email() {
        let context = TestContextBuilder::new().build().await;

        OneShotBuilder::new(context.app(), route())
            .send_json(json!({
                "name": "Jane",
                "email": "not an email",
                "password": "pass1234",
                "passwordConfirm": "pass1234",
            }))
            .await
            .expect_status(http::StatusCode::BAD_REQUEST)
            .expect_error("Please provide a valid email")
            .await;
    }

    #[tokio::test]
    async fn test_duplicate_email() {
        let context = TestContextBuilder::new().build().await;
        context.create_user("Jane", Role::User).await;

        OneShotBuilder::new(context.app(), route())
            .send_json(request("pass1234", "pass1234"))
            .await
            .expect_status(http::StatusCode::BAD_REQUEST)
            .expect_error("already registered")
            .await;

        assert_eq!(1, context.count_users().await);
    }

    test_payload_must_be_json!(TestContextBuilder::new().build().await.app(), route());
}
