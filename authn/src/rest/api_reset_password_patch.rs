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

//! API to set a new password using a reset token.

use crate::driver::AuthnDriver;
use crate::model::{Password, ResetToken};
use crate::rest::token_response;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::Response;
use serde::Deserialize;
#[cfg(test)]
use serde::Serialize;
use tourbook_core::rest::{JsonBody, RestResult};

/// Message sent to the server to reset a password.
#[derive(Deserialize)]
#[cfg_attr(test, derive(Serialize))]
#[serde(rename_all = "camelCase")]
pub(crate) struct ResetPasswordRequest {
    /// The new password.
    pub(crate) password: Password,

    /// Repetition of the new password.
    pub(crate) password_confirm: Password,
}

/// PATCH handler for this API.
pub(crate) async fn handler(
    State(driver): State<AuthnDriver>,
    Path(token): Path<String>,
    JsonBody(request): JsonBody<ResetPasswordRequest>,
) -> RestResult<Response> {
    let opts = driver.opts();
    let login = driver
        .reset_password(ResetToken::new(token), request.password, request.password_confirm)
        .await?;
    token_response(&opts, StatusCode::OK, login)
}
