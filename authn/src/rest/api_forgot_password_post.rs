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

//! API to request a password reset token by email.

use crate::driver::AuthnDriver;
use crate::rest::MessageResponse;
use axum::Json;
use axum::extract::State;
use serde::Deserialize;
#[cfg(test)]
use serde::Serialize;
use tourbook_core::model::EmailAddress;
use tourbook_core::rest::{JsonBody, RestResult};

/// Message sent to the server to request a reset token.
#[derive(Deserialize)]
#[cfg_attr(test, derive(Serialize))]
pub(crate) struct ForgotPasswordRequest {
    /// Email address of the account to reset.
    pub(crate) email: EmailAddress,
}

/// POST handler for this API.
pub(crate) async fn handler(
    State(driver): State<AuthnDriver>,
    JsonBody(request): JsonBody<ForgotPasswordRequest>,
) -> RestResult<Json<MessageResponse>> {
    driver.forgot_password(request.email).await?;
    Ok(Json(MessageResponse::success("Token sent to email!")))
}
