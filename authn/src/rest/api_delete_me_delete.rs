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

//! API to deactivate the account of the caller.

use crate::driver::AuthnDriver;
use crate::rest::Caller;
use axum::extract::State;
use axum::http::StatusCode;
use tourbook_core::rest::{EmptyBody, RestResult};

/// DELETE handler for this API.
pub(crate) async fn handler(
    caller: Caller,
    State(driver): State<AuthnDriver>,
    _: EmptyBody,
) -> RestResult<StatusCode> {
    driver.delete_me(caller.user().id()).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use crate::model::Role;
    use crate::rest::testutils::*;
    use axum::http;
    use tourbook_core::rest::testutils::OneShotBuilder;

    fn route() -> (http::Method, String) {
        (http::Method::DELETE, "/api/v1/users/deleteMe".to_owned())
    }

    #[tokio::test]
    async fn test_ok() {
        let context = TestContextBuilder::new().build().await;
        let created = context.create_user("Jane", Role::User).await;

        OneShotBuilder::new(context.app(), route())
            .with_bearer_auth(created.access_token.as_str())
            .send_empty()
            .await
            .expect_status(http::StatusCode::NO_CONTENT)
            .expect_empty()
            .await;

        let user = db::get_user(&mut context.ex().await, created.user.id()).await.unwrap();
        assert!(!user.active());
        assert_eq!(1, context.count_users().await);
    }

    #[tokio::test]
    async fn test_payload_must_be_empty() {
        let context = TestContextBuilder::new().build().await;
        let created = context.create_user("Jane", Role::User).await;

        OneShotBuilder::new(context.app(), route())
            .with_bearer_auth(created.access_token.as_str())
            .send_text("should not be here")
            .await
            .expect_status(http::StatusCode::PAYLOAD_TOO_LARGE)
            .expect_error("should be empty")
            .await;
    }
}
