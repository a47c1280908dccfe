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

//! Tours, reviews and the server that exposes them along with user accounts.
//!
//! Tours carry aggregates of the ratings given in their reviews.  These aggregates are
//! recomputed in the same transaction as every review write so that readers never observe a
//! rating that disagrees with the stored reviews.

// Keep these in sync with other top-level files.
#![warn(anonymous_parameters, bad_style, clippy::missing_docs_in_private_items, missing_docs)]
#![warn(unused, unused_extern_crates, unused_import_braces, unused_qualifications)]
#![warn(unsafe_code)]

use axum::Router;
use axum::extract::{DefaultBodyLimit, Request};
use axum::middleware::{self, Next};
use axum::response::Response;
use derive_more::Display;
use log::info;
use std::error::Error;
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Instant;
use tokio::net::TcpListener;
use tourbook_authn::driver::{AuthnDriver, AuthnOptions};
use tourbook_core::clocks::{Clock, SystemClock};
use tourbook_core::db::Db;
use tourbook_core::env::get_optional_var;
use tourbook_core::rest::hide_internal_errors;
use tourbook_core::rest::rate_limit::{RateLimiter, RateLimiterOptions, rate_limit};
use tourbook_smtp::driver::SmtpMailer;
use tower_http::cors::CorsLayer;

pub mod db;
pub mod driver;
use driver::ToursDriver;
pub mod model;
mod rest;
use rest::app;

/// Default port to listen on.
const DEFAULT_PORT: u16 = 3000;

/// Default maximum size of a request body, in bytes.
const DEFAULT_BODY_LIMIT: usize = 10 * 1024;

/// Deployment mode of the server.
#[derive(Clone, Copy, Debug, Display, PartialEq)]
pub enum Mode {
    /// Details of internal errors are returned to clients and requests are logged.
    #[display("development")]
    Development,

    /// Details of internal errors are only logged.
    #[display("production")]
    Production,
}

impl TryFrom<String> for Mode {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        match value.as_str() {
            "development" => Ok(Mode::Development),
            "production" => Ok(Mode::Production),
            _ => Err(format!("Invalid mode '{}': must be development or production", value)),
        }
    }
}

/// Options to configure the server.
#[derive(Clone, Debug, PartialEq)]
pub struct ServerOptions {
    /// Port to listen on, on all interfaces.
    pub port: u16,

    /// Deployment mode.
    pub mode: Mode,

    /// Maximum size of a request body, in bytes.
    pub body_limit: usize,

    /// Budget of requests per client.
    pub rate_limit: RateLimiterOptions,
}

impl ServerOptions {
    /// Creates a set of options from environment variables whose name is prefixed with the
    /// given `prefix`.
    ///
    /// This will use variables such as `<prefix>_PORT`, `<prefix>_MODE`, `<prefix>_BODY_LIMIT`
    /// and the `<prefix>_RATE_LIMIT_*` family.
    pub fn from_env(prefix: &str) -> Result<Self, String> {
        let mode = match get_optional_var::<String>(prefix, "MODE")? {
            Some(mode) => Mode::try_from(mode)?,
            None => Mode::Development,
        };
        Ok(Self {
            port: get_optional_var::<u16>(prefix, "PORT")?.unwrap_or(DEFAULT_PORT),
            mode,
            body_limit: get_optional_var::<usize>(prefix, "BODY_LIMIT")?
                .unwrap_or(DEFAULT_BODY_LIMIT),
            rate_limit: RateLimiterOptions::from_env(&format!("{}_RATE_LIMIT", prefix))?,
        })
    }
}

/// Middleware that logs every request along with its outcome.
async fn log_request(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let uri = request.uri().clone();
    let start = Instant::now();
    let response = next.run(request).await;
    info!("{} {} {} {}ms", method, uri, response.status().as_u16(), start.elapsed().as_millis());
    response
}

/// Wraps the application routes with the layers that apply to every request.
fn router(
    opts: &ServerOptions,
    tours: ToursDriver,
    authn: AuthnDriver,
    clock: Arc<dyn Clock + Send + Sync>,
) -> Router {
    let limiter = RateLimiter::new(opts.rate_limit.clone(), clock);
    let router = app(tours, authn)
        .layer(DefaultBodyLimit::max(opts.body_limit))
        .layer(middleware::from_fn_with_state(limiter, rate_limit))
        .layer(CorsLayer::permissive());
    match opts.mode {
        Mode::Development => router.layer(middleware::from_fn(log_request)),
        Mode::Production => router.layer(middleware::map_response(hide_internal_errors)),
    }
}

/// Instantiates all resources to serve the application as configured in `opts`.
///
/// The database schemas must have been initialized before calling this.
pub async fn serve(
    opts: ServerOptions,
    db: Arc<dyn Db + Send + Sync>,
    mailer: Arc<dyn SmtpMailer + Send + Sync>,
    authn_opts: AuthnOptions,
) -> Result<(), Box<dyn Error>> {
    let clock: Arc<dyn Clock + Send + Sync> = Arc::from(SystemClock::default());
    let tours = ToursDriver::new(db.clone(), clock.clone());
    let authn = AuthnDriver::new(db, clock.clone(), mailer, authn_opts)
        .with_deletion_hook(Arc::new(tours.clone()));
    let app = router(&opts, tours, authn, clock);

    let listener = TcpListener::bind((Ipv4Addr::UNSPECIFIED, opts.port)).await?;
    info!("Listening on port {} in {} mode", opts.port, opts.mode);
    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>()).await?;
    Ok(())
}
