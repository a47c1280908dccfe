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

//! Authentication and authorization of API callers.
//!
//! Every protected API takes a `Caller<P>` argument.  Extracting it authenticates the request
//! and then checks the caller's role against the policy `P`, which lists the roles allowed to
//! invoke the API.  Services declare their policies next to their routes so that all access
//! rules are visible in one place.

use crate::driver::AuthnDriver;
use crate::model::{Role, User};
use crate::rest::httputils::get_access_token;
use async_trait::async_trait;
use axum::extract::{FromRef, FromRequestParts};
use axum::http::request::Parts;
use log::debug;
use std::marker::PhantomData;
use tourbook_core::rest::{RestError, RestResult};

/// Set of roles allowed to perform an operation.
pub trait Policy: Send + Sync + 'static {
    /// Roles that pass the check.
    const ALLOWED: &'static [Role];
}

/// Policy that admits any authenticated user.
pub struct AnyRole;

impl Policy for AnyRole {
    const ALLOWED: &'static [Role] = &[Role::User, Role::Guide, Role::LeadGuide, Role::Admin];
}

/// Policy that only admits administrators.
pub struct Admins;

impl Policy for Admins {
    const ALLOWED: &'static [Role] = &[Role::Admin];
}

/// Checks whether `user` may perform an operation restricted to the `allowed` roles.
pub fn authorize(user: &User, allowed: &[Role]) -> RestResult<()> {
    if allowed.contains(&user.role()) {
        Ok(())
    } else {
        debug!("Denying access to {} with role {}", user.id(), user.role());
        Err(RestError::Forbidden)
    }
}

/// An authenticated caller whose role satisfies the policy `P`.
pub struct Caller<P: Policy = AnyRole> {
    /// The user making the request.
    user: User,

    /// Marker for the policy that admitted the caller.
    _policy: PhantomData<P>,
}

impl<P: Policy> Caller<P> {
    /// Returns the user making the request.
    pub fn user(&self) -> &User {
        &self.user
    }

    /// Consumes the caller and returns the user making the request.
    pub fn into_user(self) -> User {
        self.user
    }
}

#[async_trait]
impl<S, P> FromRequestParts<S> for Caller<P>
where
    S: Send + Sync,
    P: Policy,
    AuthnDriver: FromRef<S>,
{
    type Rejection = RestError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let token = get_access_token(&parts.headers)?;
        let user = AuthnDriver::from_ref(state).authenticate(token).await?;
        authorize(&user, P::ALLOWED)?;
        Ok(Self { user, _policy: PhantomData })
    }
}
