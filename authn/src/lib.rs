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

//! Users, authentication and authorization.
//!
//! Callers present a signed JSON Web Token either in the `Authorization: Bearer` header or in the
//! `jwt` cookie.  Tokens carry the user identifier and their issue time, and are only honored
//! while the user is active and has not changed their password after the token was issued.
//!
//! Access to APIs is decided by the policies in `rest::caller`, which map each protected group
//! of operations to the roles allowed to run them.

// Keep these in sync with other top-level files.
#![warn(anonymous_parameters, bad_style, clippy::missing_docs_in_private_items, missing_docs)]
#![warn(unused, unused_extern_crates, unused_import_braces, unused_qualifications)]
#![warn(unsafe_code)]

pub mod db;
pub mod driver;
pub mod model;
pub mod rest;
