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

//! Shared building blocks of the Tourbook services.
//!
//! Each service crate is split in the same layers, from the bottom up:
//!
//! 1.  `model`: validated data types.  Constructing a model object is proof that its contents
//!     are well-formed, so the layers above never re-check them.
//!
//! 1.  `db`: free functions that take an `Executor` and run the statements for each backend.
//!     Reads that skip records (inactive users, secret tours) get their own function so that
//!     call sites make the filtering visible.
//!
//! 1.  `driver`: the business operations.  A service-specific driver owns the database handle,
//!     the clock and any collaborator such as the mailer, and runs each operation in its own
//!     transaction.
//!
//! 1.  `rest`: the axum routers.  Handlers translate HTTP into driver calls and back.  Plain
//!     collections implement `rest::crud::Resource` and reuse the generic handlers, which
//!     understand the list query language in `query`.
//!
//! Every layer has its own error type and converts the one below with `From`, so `?` carries a
//! failure up to `rest::RestError`, the single place that turns it into a response.

// Keep these in sync with other top-level files.
#![warn(anonymous_parameters, bad_style, clippy::missing_docs_in_private_items, missing_docs)]
#![warn(unused, unused_extern_crates, unused_import_braces, unused_qualifications)]
#![warn(unsafe_code)]

pub mod clocks;
pub mod db;
pub mod driver;
pub mod env;
pub mod model;
pub mod query;
pub mod rest;
