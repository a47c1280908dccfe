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

//! Test utilities for email handling.

use crate::driver::SmtpMailer;
use async_trait::async_trait;
use futures::lock::Mutex;
use lettre::Message;
use std::collections::HashSet;
use std::sync::Arc;
use tourbook_core::driver::{DriverError, DriverResult};
use tourbook_core::model::EmailAddress;

/// Messages accepted by a `RecorderSmtpMailer` and the recipients it refuses to deliver to.
#[derive(Default)]
struct Outbox {
    /// Delivered messages along with their recipient, in delivery order.
    sent: Vec<(EmailAddress, Message)>,

    /// Recipients whose deliveries fail.
    unreachable: HashSet<EmailAddress>,
}

/// Mailer that records outgoing messages instead of delivering them.
#[derive(Clone, Default)]
pub struct RecorderSmtpMailer {
    /// Shared state of the recorder so that clones observe the same messages.
    outbox: Arc<Mutex<Outbox>>,
}

impl RecorderSmtpMailer {
    /// Makes any later delivery to `email` fail.
    pub async fn fail_deliveries_to<E: Into<EmailAddress>>(&self, email: E) {
        let mut outbox = self.outbox.lock().await;
        outbox.unreachable.insert(email.into());
    }

    /// Returns all messages sent to `to`, in the order in which they were sent.
    pub async fn messages_to(&self, to: &EmailAddress) -> Vec<Message> {
        let outbox = self.outbox.lock().await;
        outbox.sent.iter().filter(|(rcpt, _)| rcpt == to).map(|(_, m)| m.clone()).collect()
    }

    /// Expects that no messages were sent.
    pub async fn expect_no_messages(&self) {
        let outbox = self.outbox.lock().await;
        let recipients: Vec<&str> = outbox.sent.iter().map(|(rcpt, _)| rcpt.as_str()).collect();
        assert!(recipients.is_empty(), "Expected no messages but some went to {:?}", recipients);
    }

    /// Expects that exactly one message was sent, that it went to `exp_to`, and returns it.
    pub async fn expect_one_message(&self, exp_to: &EmailAddress) -> Message {
        let mut outbox = self.outbox.lock().await;
        assert_eq!(1, outbox.sent.len(), "Expected exactly one message to {}", exp_to.as_str());
        let (to, message) = outbox.sent.pop().unwrap();
        assert_eq!(exp_to, &to);
        message
    }
}

#[async_trait]
impl SmtpMailer for RecorderSmtpMailer {
    async fn send(&self, message: Message) -> DriverResult<()> {
        let to = EmailAddress::from(
            message.headers().get_raw("To").expect("To header must have been present"),
        );

        let mut outbox = self.outbox.lock().await;
        if outbox.unreachable.contains(&to) {
            return Err(DriverError::BackendError(format!("Cannot deliver to {}", to.as_str())));
        }
        outbox.sent.push((to, message));
        Ok(())
    }
}
