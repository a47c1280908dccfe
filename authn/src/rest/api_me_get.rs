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

//! API to get the profile of the caller.

use crate::model::PublicUser;
use crate::rest::Caller;
use tourbook_core::rest::Envelope;

/// GET handler for this API.
pub(crate) async fn handler(caller: Caller) -> Envelope<PublicUser> {
    Envelope::one("user", caller.user().to_public())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Role;
    use crate::rest::testutils::*;
    use axum::http;
    use tourbook_core::rest::testutils::OneShotBuilder;

    fn route() -> (http::Method, String) {
        (http::Method::GET, "/api/v1/users/me".to_owned())
    }

    #[tokio::test]
    async fn test_bearer_and_cookie() {
        let context = TestContextBuilder::new().build().await;
        let created = context.create_user("Jane", Role::LeadGuide).await;

        let user = OneShotBuilder::new(context.app(), route())
            .with_bearer_auth(created.access_token.as_str())
            .send_empty()
            .await
            .expect_data::<PublicUser>("user")
            .await;
        assert_eq!(created.user.to_public(), user);

        let user = OneShotBuilder::new(context.app(), route())
            .with_cookie("jwt", created.access_token.as_str())
            .send_empty()
            .await
            .expect_data::<PublicUser>("user")
            .await;
        assert_eq!(created.user.to_public(), user);
    }

    #[tokio::test]
    async fn test_not_logged_in() {
        let context = TestContextBuilder::new().build().await;

        let response = OneShotBuilder::new(context.app(), route())
            .send_empty()
            .await
            .expect_status(http::StatusCode::UNAUTHORIZED)
            .take_response()
            .await;
        assert_eq!("Bearer", response.headers().get("WWW-Authenticate").unwrap());
    }

    #[tokio::test]
    async fn test_expired_token() {
        let context = TestContextBuilder::new().build().await;
        let created = context.create_user("Jane", Role::User).await;

        context.advance_clock(90 * 24 * 60 * 60);
        OneShotBuilder::new(context.app(), route())
            .with_bearer_auth(created.access_token.as_str())
            .send_empty()
            .await
            .expect_status(http::StatusCode::UNAUTHORIZED)
            .expect_error("Your token has expired")
            .await;
    }
}
