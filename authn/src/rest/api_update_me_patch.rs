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

//! API to update the profile of the caller.

use crate::driver::AuthnDriver;
use crate::model::PublicUser;
use crate::rest::Caller;
use axum::extract::State;
use serde::Deserialize;
#[cfg(test)]
use serde::Serialize;
use tourbook_core::model::EmailAddress;
use tourbook_core::rest::{Envelope, JsonBody, RestError, RestResult};

/// Message sent to the server to update a profile.
///
/// Password fields are accepted only to reject them with a helpful message.
#[derive(Default, Deserialize)]
#[cfg_attr(test, derive(Serialize))]
#[serde(rename_all = "camelCase")]
pub(crate) struct UpdateMeRequest {
    /// New display name.
    #[serde(default)]
    pub(crate) name: Option<String>,

    /// New email address.
    #[serde(default)]
    pub(crate) email: Option<EmailAddress>,

    /// Rejected if present.
    #[serde(default)]
    pub(crate) password: Option<serde_json::Value>,

    /// Rejected if present.
    #[serde(default)]
    pub(crate) password_confirm: Option<serde_json::Value>,
}

/// PATCH handler for this API.
pub(crate) async fn handler(
    caller: Caller,
    State(driver): State<AuthnDriver>,
    JsonBody(request): JsonBody<UpdateMeRequest>,
) -> RestResult<Envelope<PublicUser>> {
    if request.password.is_some() || request.password_confirm.is_some() {
        return Err(RestError::InvalidRequest(
            "This route is not for password updates. Please use /updateMyPassword.".to_owned(),
        ));
    }

    let user = driver.update_me(caller.user().id(), request.name, request.email).await?;
    Ok(Envelope::one("user", user.to_public()))
}
