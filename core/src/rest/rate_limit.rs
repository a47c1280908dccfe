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

//! Fixed-window rate limiting of requests per client address.

use crate::clocks::Clock;
use crate::env::get_optional_var;
use crate::rest::RestError;
use axum::extract::{ConnectInfo, Request, State};
use axum::http::HeaderValue;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use derivative::Derivative;
use futures::lock::Mutex;
use log::debug;
use lru_time_cache::LruCache;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use time::OffsetDateTime;

/// Default number of requests that a client can issue per window.
const DEFAULT_MAX_REQUESTS: u32 = 100;

/// Default length of the window.
const DEFAULT_WINDOW: Duration = Duration::from_secs(60 * 60);

/// Default number of clients to track.  The least recently seen clients are forgotten first.
const DEFAULT_CAPACITY: usize = 10 * 1024;

/// Message returned to clients that exceed their budget.
pub const TOO_MANY_REQUESTS_MESSAGE: &str =
    "Too many requests from this IP, please try again in an hour!";

/// Options to configure a `RateLimiter`.
#[derive(Clone, Derivative)]
#[derivative(Debug, PartialEq)]
pub struct RateLimiterOptions {
    /// Number of requests that a client can issue per window.
    pub max_requests: u32,

    /// Length of the window.
    pub window: Duration,

    /// Maximum number of clients to track.
    pub capacity: usize,
}

impl Default for RateLimiterOptions {
    fn default() -> Self {
        Self {
            max_requests: DEFAULT_MAX_REQUESTS,
            window: DEFAULT_WINDOW,
            capacity: DEFAULT_CAPACITY,
        }
    }
}

impl RateLimiterOptions {
    /// Creates a set of options from environment variables whose name is prefixed with the
    /// given `prefix`.
    ///
    /// This will use variables such as `<prefix>_MAX`, `<prefix>_WINDOW` and `<prefix>_CAPACITY`.
    pub fn from_env(prefix: &str) -> Result<Self, String> {
        Ok(Self {
            max_requests: get_optional_var::<u32>(prefix, "MAX")?.unwrap_or(DEFAULT_MAX_REQUESTS),
            window: get_optional_var::<Duration>(prefix, "WINDOW")?.unwrap_or(DEFAULT_WINDOW),
            capacity: get_optional_var::<usize>(prefix, "CAPACITY")?.unwrap_or(DEFAULT_CAPACITY),
        })
    }
}

/// Requests seen from a client during its current window.
#[derive(Clone, Copy)]
struct Window {
    /// Time of the first request in the window.
    start: OffsetDateTime,

    /// Number of requests in the window, including the first.
    count: u32,
}

/// Tracker of request budgets per client.
#[derive(Clone)]
pub struct RateLimiter {
    /// Clock to obtain the current time from.
    clock: Arc<dyn Clock + Send + Sync>,

    /// Number of requests that a client can issue per window.
    max_requests: u32,

    /// Length of the window.
    window: Duration,

    /// Current window of every tracked client.
    windows: Arc<Mutex<LruCache<String, Window>>>,
}

impl RateLimiter {
    /// Creates a new rate limiter configured with `opts` and backed by `clock`.
    pub fn new(opts: RateLimiterOptions, clock: Arc<dyn Clock + Send + Sync>) -> Self {
        let windows = LruCache::with_capacity(opts.capacity);
        Self {
            clock,
            max_requests: opts.max_requests,
            window: opts.window,
            windows: Arc::from(Mutex::from(windows)),
        }
    }

    /// Accounts for a request from `client`.
    ///
    /// Returns the number of requests the client has left in its window, or `None` if the
    /// request exceeds the budget.
    pub async fn account(&self, client: &str) -> Option<u32> {
        let now = self.clock.now_utc();

        let key = client.to_owned();
        let mut windows = self.windows.lock().await;
        let window = match windows.get(&key).copied() {
            Some(window) if now < window.start + self.window => {
                Window { start: window.start, count: window.count.saturating_add(1) }
            }
            _ => Window { start: now, count: 1 },
        };
        windows.insert(key, window);

        if window.count > self.max_requests {
            None
        } else {
            Some(self.max_requests - window.count)
        }
    }
}

/// Middleware that rejects requests from clients that exceeded their budget.
///
/// Clients are identified by the IP address of the peer, which requires the server to expose
/// `ConnectInfo`.  Requests without peer information share a single budget.
pub async fn rate_limit(
    State(limiter): State<RateLimiter>,
    request: Request,
    next: Next,
) -> Response {
    let client = match request.extensions().get::<ConnectInfo<SocketAddr>>() {
        Some(ConnectInfo(addr)) => addr.ip().to_string(),
        None => "unknown".to_owned(),
    };

    let (mut response, remaining) = match limiter.account(&client).await {
        Some(remaining) => (next.run(request).await, remaining),
        None => {
            debug!("Rejecting request from {} due to rate limiting", client);
            let response =
                RestError::TooManyRequests(TOO_MANY_REQUESTS_MESSAGE.to_owned()).into_response();
            (response, 0)
        }
    };

    let headers = response.headers_mut();
    headers.insert("X-RateLimit-Limit", HeaderValue::from(limiter.max_requests));
    headers.insert("X-RateLimit-Remaining", HeaderValue::from(remaining));
    response
}
