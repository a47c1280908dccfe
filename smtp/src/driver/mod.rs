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

//! Delivery of outgoing email.

use crate::model::Message;
use async_trait::async_trait;
use derivative::Derivative;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Tokio1Executor};
use log::{debug, warn};
use tourbook_core::driver::{DriverError, DriverResult};
use tourbook_core::env::{get_optional_var, get_required_var};

#[cfg(any(test, feature = "testutils"))]
pub mod testutils;

/// Settings of the SMTP relay that delivers account emails.
#[derive(Derivative)]
#[derivative(Debug)]
#[cfg_attr(test, derivative(PartialEq))]
pub struct SmtpOptions {
    /// Host name of the relay.
    pub relay: String,

    /// Port of the relay, if not the standard submission port over TLS.
    pub port: Option<u16>,

    /// Account to authenticate as.
    pub username: String,

    /// Secret of `username`.
    #[derivative(Debug = "ignore")]
    pub password: String,
}

impl SmtpOptions {
    /// Reads the relay settings from `<prefix>_RELAY`, `<prefix>_PORT`, `<prefix>_USERNAME` and
    /// `<prefix>_PASSWORD`.  Only the port is optional.
    pub fn from_env(prefix: &str) -> Result<Self, String> {
        Ok(Self {
            relay: get_required_var::<String>(prefix, "RELAY")?,
            port: get_optional_var::<u16>(prefix, "PORT")?,
            username: get_required_var::<String>(prefix, "USERNAME")?,
            password: get_required_var::<String>(prefix, "PASSWORD")?,
        })
    }
}

/// Seam between the services and the mail transport.
#[async_trait]
pub trait SmtpMailer {
    /// Hands `message` to the transport, failing if it was not accepted.
    async fn send(&self, message: Message) -> DriverResult<()>;
}

/// Mailer that relays messages through a real SMTP server.
#[derive(Clone)]
pub struct LettreSmtpMailer {
    /// Pooled connections to the relay.
    transport: AsyncSmtpTransport<Tokio1Executor>,
}

impl LettreSmtpMailer {
    /// Prepares a transport for the relay in `opts`.  No connection is opened until the first
    /// message goes out.
    pub fn connect(opts: SmtpOptions) -> Result<Self, String> {
        let mut builder = AsyncSmtpTransport::<Tokio1Executor>::relay(&opts.relay)
            .map_err(|e| format!("Invalid SMTP relay {}: {}", opts.relay, e))?
            .credentials(Credentials::new(opts.username, opts.password));
        if let Some(port) = opts.port {
            builder = builder.port(port);
        }
        Ok(Self { transport: builder.build() })
    }
}

#[async_trait]
impl SmtpMailer for LettreSmtpMailer {
    async fn send(&self, message: Message) -> DriverResult<()> {
        let recipients = message.envelope().to().len();
        match self.transport.send(message).await {
            Ok(response) => {
                debug!("SMTP relay accepted message for {} recipients: {:?}", recipients, response);
                Ok(())
            }
            Err(e) => {
                warn!("SMTP delivery failed: {}", e);
                Err(DriverError::BackendError(format!("SMTP delivery failed: {}", e)))
            }
        }
    }
}
