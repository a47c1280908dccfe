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

//! Utilities to deal with HTTP authentication.

use crate::driver::AuthnOptions;
use crate::model::AccessToken;
use axum::http::header::{AUTHORIZATION, COOKIE};
use axum::http::{HeaderMap, HeaderValue};
use tourbook_core::rest::{RestError, RestResult, get_unique_header};

/// Name of the cookie that carries the access token.
pub const AUTH_COOKIE: &str = "jwt";

/// Value stored in the auth cookie after logging out.
const LOGGED_OUT_VALUE: &str = "loggedout";

/// Lifetime in seconds of the dummy cookie set on logout.
const LOGGED_OUT_MAX_AGE: u64 = 10;

/// Message returned when a request carries no credentials at all.
const NOT_LOGGED_IN_MESSAGE: &str = "You are not logged in! Please log in to get access.";

/// Extracts the bearer token from the `Authorization` header, if any.
fn get_bearer_token(headers: &HeaderMap) -> RestResult<Option<&str>> {
    let authz = match get_unique_header(headers, &AUTHORIZATION) {
        Ok(Some(value)) => value,
        Ok(None) => return Ok(None),
        Err(e) => return Err(RestError::Unauthorized(e.to_string())),
    };

    let authz = authz.to_str().map_err(|e| {
        RestError::Unauthorized(format!("Bad encoding in Authorization header: {}", e))
    })?;

    match authz.split_once(' ') {
        Some(("Bearer", token)) if !token.trim().is_empty() => Ok(Some(token.trim())),
        _ => Ok(None),
    }
}

/// Extracts the value of the cookie `name` from the `Cookie` headers, if any.
fn get_cookie<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, _)| *key == name)
        .map(|(_, value)| value)
}

/// Obtains the access token presented by the client.
///
/// The `Authorization` header takes precedence.  The auth cookie is only consulted when the
/// header does not carry a bearer token.
pub fn get_access_token(headers: &HeaderMap) -> RestResult<AccessToken> {
    if let Some(token) = get_bearer_token(headers)? {
        return Ok(AccessToken::new(token));
    }
    match get_cookie(headers, AUTH_COOKIE) {
        Some(token) if !token.is_empty() => Ok(AccessToken::new(token)),
        _ => Err(RestError::Unauthorized(NOT_LOGGED_IN_MESSAGE.to_owned())),
    }
}

/// Formats a `Set-Cookie` value that stores `value` in the auth cookie for `max_age` seconds.
fn format_cookie(value: &str, max_age: u64, secure: bool) -> RestResult<HeaderValue> {
    let mut cookie = format!("{}={}; Max-Age={}; Path=/; HttpOnly", AUTH_COOKIE, value, max_age);
    if secure {
        cookie.push_str("; Secure");
    }
    HeaderValue::from_str(&cookie)
        .map_err(|e| RestError::InternalError(format!("Cannot format cookie: {}", e)))
}

/// Builds the `Set-Cookie` value that hands `token` to the client.
pub fn auth_cookie(opts: &AuthnOptions, token: &AccessToken) -> RestResult<HeaderValue> {
    format_cookie(token.as_str(), opts.cookie_expires_in.as_secs(), opts.secure_cookies)
}

/// Builds the `Set-Cookie` value that overwrites the auth cookie on logout.
pub fn logout_cookie(opts: &AuthnOptions) -> RestResult<HeaderValue> {
    format_cookie(LOGGED_OUT_VALUE, LOGGED_OUT_MAX_AGE, opts.secure_cookies)
}
