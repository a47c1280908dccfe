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

//! API to drop the auth cookie from the client.

use crate::driver::AuthnDriver;
use crate::rest::MessageResponse;
use crate::rest::httputils::logout_cookie;
use axum::Json;
use axum::extract::State;
use axum::http::header::SET_COOKIE;
use axum::response::{IntoResponse, Response};
use tourbook_core::rest::RestResult;

/// GET handler for this API.
///
/// Tokens are stateless so there is nothing to revoke: the cookie is replaced by a short-lived
/// dummy value instead.
pub(crate) async fn handler(State(driver): State<AuthnDriver>) -> RestResult<Response> {
    let cookie = logout_cookie(&driver.opts())?;
    Ok(([(SET_COOKIE, cookie)], Json(MessageResponse::success("Logged out"))).into_response())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rest::testutils::*;
    use axum::http;
    use tourbook_core::rest::testutils::OneShotBuilder;

    fn route() -> (http::Method, String) {
        (http::Method::GET, "/api/v1/users/logout".to_owned())
    }

    #[tokio::test]
    async fn test_ok() {
        let context = TestContextBuilder::new().build().await;

        let checker = OneShotBuilder::new(context.app(), route()).send_empty().await;
        assert_eq!(
            "jwt=loggedout; Max-Age=10; Path=/; HttpOnly",
            checker.cookie("jwt").unwrap()
        );
        let response = checker.expect_json::<MessageResponse>().await;
        assert_eq!("success", response.status);
    }

    #[tokio::test]
    async fn test_dummy_cookie_is_rejected() {
        let context = TestContextBuilder::new().build().await;

        OneShotBuilder::new(context.app(), (http::Method::GET, "/api/v1/users/me"))
            .with_cookie("jwt", "loggedout")
            .send_empty()
            .await
            .expect_status(http::StatusCode::UNAUTHORIZED)
            .expect_error("Invalid token")
            .await;
    }
}
