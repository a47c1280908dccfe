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

//! Generic code for REST handlers.
//!
//! All services should implement an `app` function in this module that returns the `Router` for the
//! application.
//!
//! Every API should be put in its own `.rs` file, using a name like `<entity>_<method>.rs`.  This
//! may seem overkill, but putting every API in its own file makes it easy to ensure all the
//! integration tests for the given API truly belong to that API.
//!
//! More specifically, the `tests` module within an API should define a `route` method that
//! returns the HTTP method and the API path under test.  All integration tests within the module
//! then rely on `route` to obtain this information, ensuring that they all test the desired API.
//!
//! All responses are JSON envelopes.  Successful responses carry a `status` of `success` and the
//! payload under `data`, keyed by the name of the entity.  Failed responses carry a `status` of
//! `fail` for client errors or `error` for server errors, and a human-readable `message`.

use crate::driver::DriverError;
use crate::model::ModelError;
use async_trait::async_trait;
use axum::Json;
use axum::body::HttpBody;
use axum::extract::rejection::JsonRejection;
use axum::extract::{FromRequest, Request};
use axum::http::header::AsHeaderName;
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use log::error;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub mod crud;
pub mod rate_limit;

/// Message returned to clients that lack the role required by an API.
pub const FORBIDDEN_MESSAGE: &str = "You do not have permission to perform this action";

/// Message that replaces the details of server errors when running in production.
pub const HIDDEN_ERROR_MESSAGE: &str = "Something went very wrong!";

/// Frontend errors.  These are the errors that are visible to the user on failed requests.
#[derive(Debug, PartialEq, thiserror::Error)]
pub enum RestError {
    /// Indicates an authorization problem: the caller is known but lacks privileges.
    #[error("{msg}", msg = FORBIDDEN_MESSAGE)]
    Forbidden,

    /// Catch-all error type for all unexpected errors.
    #[error("{0}")]
    InternalError(String),

    /// Indicates an error in the contents of the request.
    #[error("{0}")]
    InvalidRequest(String),

    /// Indicates that a requested entity does not exist.
    #[error("{0}")]
    NotFound(String),

    /// Indicates that a request that should have empty content did not.
    #[error("Content should be empty")]
    PayloadNotEmpty,

    /// Indicates that the request body exceeds the configured limit.
    #[error("Request body is too large")]
    PayloadTooLarge,

    /// Indicates that the caller exhausted its request budget.
    #[error("{0}")]
    TooManyRequests(String),

    /// Indicates an authentication problem.
    #[error("{0}")]
    Unauthorized(String),
}

impl RestError {
    /// Returns the HTTP status code that represents this error.
    pub fn status(&self) -> StatusCode {
        match self {
            RestError::Forbidden => StatusCode::FORBIDDEN,
            RestError::InternalError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            RestError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            RestError::NotFound(_) => StatusCode::NOT_FOUND,
            RestError::PayloadNotEmpty => StatusCode::PAYLOAD_TOO_LARGE,
            RestError::PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            RestError::TooManyRequests(_) => StatusCode::TOO_MANY_REQUESTS,
            RestError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
        }
    }
}

impl From<DriverError> for RestError {
    fn from(e: DriverError) -> Self {
        match e {
            DriverError::AlreadyExists(msg) => RestError::InvalidRequest(msg),
            DriverError::BackendError(msg) => RestError::InternalError(msg),
            DriverError::InvalidInput(msg) => RestError::InvalidRequest(msg),
            DriverError::NotFound(msg) => RestError::NotFound(msg),
            DriverError::Unauthorized(msg) => RestError::Unauthorized(msg),
        }
    }
}

impl From<ModelError> for RestError {
    fn from(e: ModelError) -> Self {
        RestError::InvalidRequest(e.0)
    }
}

impl IntoResponse for RestError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!("Request failed with internal error: {}", self);
        }

        let mut headers = HeaderMap::new();
        if status == StatusCode::UNAUTHORIZED {
            headers.insert("WWW-Authenticate", HeaderValue::from_static("Bearer"));
        }

        (status, headers, Json(ErrorResponse::new(status, self.to_string()))).into_response()
    }
}

/// Result type for this module.
pub type RestResult<T> = Result<T, RestError>;

/// Representation of the details of an error response.
#[derive(Debug, Deserialize, PartialEq, Serialize)]
pub struct ErrorResponse {
    /// Either `fail` for client errors or `error` for server errors.
    pub status: String,

    /// Textual representation of the error message.
    pub message: String,
}

impl ErrorResponse {
    /// Creates the body of a failed response with HTTP `status` and `message`.
    pub fn new<M: Into<String>>(status: StatusCode, message: M) -> Self {
        let status = if status.is_server_error() { "error" } else { "fail" };
        Self { status: status.to_owned(), message: message.into() }
    }
}

/// Envelope for successful responses.
///
/// The payload lives in `data` under a single key that names the returned entity or entities.
/// Responses that carry a list also report its length in `results`.
#[derive(Debug, Deserialize, PartialEq, Serialize)]
pub struct Envelope<T> {
    /// Always `success`.
    pub status: String,

    /// Number of records in a list response.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub results: Option<usize>,

    /// The payload of the response.
    pub data: BTreeMap<String, T>,
}

impl<T> Envelope<T> {
    /// Wraps a single `value` under `key`.
    pub fn one<K: Into<String>>(key: K, value: T) -> Self {
        let mut data = BTreeMap::default();
        data.insert(key.into(), value);
        Self { status: "success".to_owned(), results: None, data }
    }

    /// Extracts the payload stored under `key`, if any.
    pub fn take(mut self, key: &str) -> Option<T> {
        self.data.remove(key)
    }
}

impl<T> Envelope<Vec<T>> {
    /// Wraps a list of `values` under `key` and records their count.
    pub fn many<K: Into<String>>(key: K, values: Vec<T>) -> Self {
        let results = values.len();
        let mut envelope = Self::one(key, values);
        envelope.results = Some(results);
        envelope
    }
}

impl<T: Serialize> IntoResponse for Envelope<T> {
    fn into_response(self) -> Response {
        Json(self).into_response()
    }
}

/// Response transformer that hides the details of server errors from clients.
///
/// The original details have already been logged when the error was converted into a response.
pub async fn hide_internal_errors(response: Response) -> Response {
    let status = response.status();
    if !status.is_server_error() {
        return response;
    }
    (status, Json(ErrorResponse::new(status, HIDDEN_ERROR_MESSAGE))).into_response()
}

/// A request body extractor for JSON payloads whose rejections use the failure envelope.
pub struct JsonBody<T>(pub T);

#[async_trait]
impl<S, T> FromRequest<S> for JsonBody<T>
where
    S: Send + Sync,
    T: DeserializeOwned,
{
    type Rejection = RestError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => Ok(JsonBody(value)),
            Err(e) => Err(json_rejection_to_error(e)),
        }
    }
}

/// Converts a rejection from the JSON extractor into our error type.
fn json_rejection_to_error(e: JsonRejection) -> RestError {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        RestError::PayloadTooLarge
    } else {
        RestError::InvalidRequest(e.body_text())
    }
}

/// A request body extractor that forbids any content.
///
/// Any API that doesn't expect a body should use this to ensure we don't get garbage data that we
/// don't care about.  This future-proofs the service.
pub struct EmptyBody {}

#[async_trait]
impl<S> FromRequest<S> for EmptyBody
where
    S: Send + Sync,
{
    type Rejection = RestError;

    async fn from_request(req: Request, _state: &S) -> Result<Self, Self::Rejection> {
        if req.into_body().is_end_stream() {
            Ok(EmptyBody {})
        } else {
            Err(RestError::PayloadNotEmpty)
        }
    }
}

/// Extracts the header `name` from `headers` and ensures it has at most one value.
pub fn get_unique_header<K: AsHeaderName + Copy>(
    headers: &HeaderMap,
    name: K,
) -> RestResult<Option<&HeaderValue>> {
    let mut iter = headers.get_all(name).iter();
    let value = iter.next();
    if iter.next().is_some() {
        return Err(RestError::InvalidRequest(format!(
            "Header {} cannot have more than one value",
            name.as_str()
        )));
    }
    Ok(value)
}

/// Common test code for the REST server.
#[cfg(any(test, feature = "testutils"))]
pub mod testutils {
    use super::*;
    use axum::Router;
    use axum::extract::ConnectInfo;
    use axum::http::{self, HeaderName};
    use serde::Serialize;
    use std::fmt;
    use std::net::SocketAddr;
    use tower::util::ServiceExt;

    /// Maximum body size for testing purposes.
    const MAX_BODY_SIZE: usize = 1024 * 1024;

    /// Builder for a single request to the API server.
    #[must_use]
    pub struct OneShotBuilder {
        /// The router for the app being tested.
        app: Router,

        /// Builder for the request that will be sent to the app.
        builder: axum::http::request::Builder,
    }

    impl OneShotBuilder {
        /// Creates a new request against a given `method`/`uri` pair served by an `app` router.
        pub fn new<U: AsRef<str>>(app: Router, (method, uri): (http::Method, U)) -> Self {
            let builder = Request::builder().method(method).uri(uri.as_ref());
            Self { app, builder }
        }

        /// Extends the URI in the request with a `query`.
        pub fn with_query<Q: Serialize>(mut self, query: Q) -> Self {
            let uri = self.builder.uri_ref().unwrap().to_string();
            assert!(!uri.contains('?'), "URI already contains a query: {}", uri);
            assert!(!uri.contains('#'), "URI contains a fragment: {}", uri);
            self.builder = self.builder.uri(format!(
                "{}?{}",
                uri,
                serde_urlencoded::to_string(query).unwrap()
            ));
            self
        }

        /// Adds bearer authentication to the request.
        pub fn with_bearer_auth<T>(mut self, token: T) -> Self
        where
            T: fmt::Display,
        {
            let value = format!("Bearer {}", token);
            self.builder = self.builder.header(http::header::AUTHORIZATION, value);
            self
        }

        /// Adds a cookie called `name` with `value` to the request.
        pub fn with_cookie<N, V>(mut self, name: N, value: V) -> Self
        where
            N: fmt::Display,
            V: fmt::Display,
        {
            let value = format!("{}={}", name, value);
            self.builder = self.builder.header(http::header::COOKIE, value);
            self
        }

        /// Makes the request look like it came from the peer at `addr`.
        pub fn with_peer(mut self, addr: SocketAddr) -> Self {
            self.builder = self.builder.extension(ConnectInfo(addr));
            self
        }

        /// Sets the header `name` to `value` in the outgoing request.
        pub fn with_header<K, V>(mut self, name: K, value: V) -> Self
        where
            HeaderName: TryFrom<K>,
            <HeaderName as TryFrom<K>>::Error: Into<http::Error>,
            HeaderValue: TryFrom<V>,
            <HeaderValue as TryFrom<V>>::Error: Into<http::Error>,
        {
            self.builder = self.builder.header(name, value);
            self
        }

        /// Finishes building the request and sends it with an empty payload.
        pub async fn send_empty(self) -> ResponseChecker {
            let request = self.builder.body(axum::body::Body::empty()).unwrap();
            ResponseChecker::from(self.app.oneshot(request).await.unwrap())
        }

        /// Finishes building the request and sends it with a text payload.
        pub async fn send_text<T: Into<String>>(self, text: T) -> ResponseChecker {
            let request = self
                .builder
                .header(http::header::CONTENT_TYPE, mime::TEXT_PLAIN.as_ref())
                .body(axum::body::Body::from(text.into()))
                .unwrap();
            ResponseChecker::from(self.app.oneshot(request).await.unwrap())
        }

        /// Finishes building the request and sends it with a JSON payload.
        pub async fn send_json<T: Serialize>(self, request: T) -> ResponseChecker {
            let request = self
                .builder
                .header(http::header::CONTENT_TYPE, mime::APPLICATION_JSON.as_ref())
                .body(axum::body::Body::from(serde_json::to_vec(&request).unwrap()))
                .unwrap();
            ResponseChecker::from(self.app.oneshot(request).await.unwrap())
        }
    }

    /// Type alias for the complex type returned by the `oneshot` function.
    type HttpResponse = hyper::Response<axum::body::Body>;

    /// Validator for the outcome of a request sent by a `OneShotBuilder`.
    #[must_use]
    pub struct ResponseChecker {
        /// Actual response that we received from the app.
        response: HttpResponse,

        /// Expected HTTP status code in the response above.
        exp_status: http::StatusCode,
    }

    impl From<HttpResponse> for ResponseChecker {
        fn from(response: HttpResponse) -> Self {
            Self { response, exp_status: http::StatusCode::OK }
        }
    }

    impl ResponseChecker {
        /// Sets the expected exit HTTP status to `status`.
        pub fn expect_status(mut self, status: http::StatusCode) -> Self {
            self.exp_status = status;
            self
        }

        /// Performs common validation operations on the response.
        pub fn verify(&self) {
            assert_eq!(self.exp_status, self.response.status());
        }

        /// Returns the value of the `Set-Cookie` header that sets the cookie `name`, if any.
        pub fn cookie(&self, name: &str) -> Option<String> {
            let prefix = format!("{}=", name);
            self.response
                .headers()
                .get_all(http::header::SET_COOKIE)
                .iter()
                .map(|v| v.to_str().unwrap().to_owned())
                .find(|v| v.starts_with(&prefix))
        }

        /// Returns the value of the header `name` as a string, if present.
        pub fn header(&self, name: &str) -> Option<String> {
            self.response.headers().get(name).map(|v| v.to_str().unwrap().to_owned())
        }

        /// Finishes checking the response and expects it to contain an empty body.
        pub async fn expect_empty(self) {
            self.verify();

            let body =
                axum::body::to_bytes(self.response.into_body(), MAX_BODY_SIZE).await.unwrap();
            let body = String::from_utf8(body.to_vec()).unwrap();
            assert!(body.is_empty(), "Body not empty; got {}", body);
        }

        /// Finishes checking the response and expects its body to be an `ErrorResponse` that
        /// matches `exp_re`.
        pub async fn expect_error(self, exp_re: &str) {
            self.verify();
            let exp_status = if self.exp_status.is_server_error() { "error" } else { "fail" };

            let body =
                axum::body::to_bytes(self.response.into_body(), MAX_BODY_SIZE).await.unwrap();
            let response: ErrorResponse = match serde_json::from_slice(&body) {
                Ok(response) => response,
                Err(e) => {
                    let body = String::from_utf8(body.to_vec()).unwrap();
                    panic!("Invalid error response due to {}; content was {}", e, body);
                }
            };
            assert_eq!(exp_status, response.status);
            let re = regex::Regex::new(exp_re).unwrap();
            assert!(
                re.is_match(&response.message),
                "Response content '{:?}' does not match re '{}'",
                response,
                exp_re
            );
        }

        /// Finishes checking the response and expects it to contain a valid JSON object of
        /// type `T`.
        pub async fn expect_json<T: DeserializeOwned>(self) -> T {
            self.verify();

            let body =
                axum::body::to_bytes(self.response.into_body(), MAX_BODY_SIZE).await.unwrap();
            match serde_json::from_slice::<T>(&body) {
                Ok(value) => value,
                Err(e) => {
                    let body = String::from_utf8(body.to_vec()).unwrap();
                    panic!("Invalid JSON response due to {}; content was {}", e, body);
                }
            }
        }

        /// Finishes checking the response and expects it to be a success envelope carrying a
        /// value of type `T` under `key`.
        pub async fn expect_data<T: DeserializeOwned>(self, key: &str) -> T {
            let envelope = self.expect_json::<Envelope<T>>().await;
            assert_eq!("success", envelope.status);
            envelope.take(key).unwrap_or_else(|| panic!("No {} in response data", key))
        }

        /// Finishes checking the response and returns the response itself for out of band
        /// validation of properties not supported by the `ResponseChecker`.
        pub async fn take_response(self) -> HttpResponse {
            self.verify();

            self.response
        }
    }

    /// Generates a test to verify that an API that expects JSON fails when it gets something else.
    #[macro_export]
    macro_rules! test_payload_must_be_json {
        ( $app:expr, $route:expr ) => {
            #[tokio::test]
            async fn test_payload_must_be_json() {
                $crate::rest::testutils::OneShotBuilder::new($app, $route)
                    .send_text("this is not json")
                    .await
                    .expect_status(axum::http::StatusCode::BAD_REQUEST)
                    .expect_error("Content-Type")
                    .await;

                $crate::rest::testutils::OneShotBuilder::new($app, $route)
                    .with_header(axum::http::header::CONTENT_TYPE, "application/json")
                    .send_text("this is not json")
                    .await
                    .expect_status(axum::http::StatusCode::BAD_REQUEST)
                    .expect_error("expected ident")
                    .await;
            }
        };
    }

    pub use test_payload_must_be_json;

    /// Generates a test to verify that an API that does not expect a payload fails as necessary.
    #[macro_export]
    macro_rules! test_payload_must_be_empty {
        ( $app:expr, $route:expr ) => {
            #[tokio::test]
            async fn test_payload_must_be_empty() {
                $crate::rest::testutils::OneShotBuilder::new($app, $route)
                    .send_text("should not be here")
                    .await
                    .expect_status(axum::http::StatusCode::PAYLOAD_TOO_LARGE)
                    .expect_error("should be empty")
                    .await;
            }
        };
    }

    pub use test_payload_must_be_empty;
}
