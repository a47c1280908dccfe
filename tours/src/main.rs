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

//! Entry point to the tour booking service.

// Keep these in sync with other top-level files.
#![warn(anonymous_parameters, bad_style, clippy::missing_docs_in_private_items, missing_docs)]
#![warn(unused, unused_extern_crates, unused_import_braces, unused_qualifications)]
#![warn(unsafe_code)]

use std::error::Error;
use std::sync::Arc;
use tourbook_authn::driver::AuthnOptions;
use tourbook_core::db::Db;
use tourbook_core::db::postgres::{PostgresDb, PostgresOptions};
use tourbook_smtp::driver::{LettreSmtpMailer, SmtpOptions};
use tourbook_tours::{Mode, ServerOptions, serve};

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    env_logger::init();

    let opts = ServerOptions::from_env("TOURBOOK")?;

    let db_opts = PostgresOptions::from_env("PGSQL_PROD")?;
    let db: Arc<dyn Db + Send + Sync> = Arc::from(PostgresDb::connect(db_opts)?);
    let mut ex = db.ex().await?;
    tourbook_authn::db::init_schema(&mut ex).await?;
    tourbook_tours::db::init_schema(&mut ex).await?;
    drop(ex);

    let mailer = Arc::from(LettreSmtpMailer::connect(SmtpOptions::from_env("SMTP")?)?);

    let mut authn_opts = AuthnOptions::from_env("AUTHN")?;
    authn_opts.secure_cookies = opts.mode == Mode::Production;

    serve(opts, db, mailer, authn_opts).await
}
