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

//! Data types to interact with email messages.

use lettre::message::Body;
use lettre::message::header::ContentTransferEncoding;
pub use lettre::message::{Mailbox, Message};
use tourbook_core::model::{EmailAddress, ModelError, ModelResult};

/// Expands the `%key%` placeholders in `input` with the values in `replacements`.
///
/// A literal `%` is written as `%%`.  Values are inserted verbatim so they are never expanded
/// themselves.
fn expand(input: &str, replacements: &[(&str, &str)]) -> ModelResult<String> {
    let mut output = String::with_capacity(input.len());
    let mut rest = input;
    while let Some(start) = rest.find('%') {
        output.push_str(&rest[..start]);
        let after = &rest[start + 1..];
        let Some(end) = after.find('%') else {
            return Err(ModelError(format!("Unterminated placeholder in template: {}", input)));
        };
        let key = &after[..end];
        if key.is_empty() {
            output.push('%');
        } else {
            match replacements.iter().find(|(candidate, _)| *candidate == key) {
                Some((_, value)) => output.push_str(value),
                None => return Err(ModelError(format!("No value for placeholder %{}%", key))),
            }
        }
        rest = &after[end + 1..];
    }
    output.push_str(rest);
    Ok(output)
}

/// A template for an email message.
pub struct EmailTemplate {
    /// Who the message comes from.
    pub from: Mailbox,

    /// Subject of the message.
    pub subject_template: &'static str,

    /// Body of the message.
    pub body_template: &'static str,
}

impl EmailTemplate {
    /// Creates a message sent to `to` based on the template by applying the collection of
    /// `replacements` to its `%key%` placeholders.
    pub fn apply(&self, to: &EmailAddress, replacements: &[(&str, &str)]) -> ModelResult<Message> {
        let to = to
            .as_str()
            .parse::<Mailbox>()
            .map_err(|e| ModelError(format!("Cannot parse email address {}: {}", to.as_str(), e)))?;

        let subject = expand(self.subject_template, replacements)?;

        let body = Body::new_with_encoding(
            expand(self.body_template, replacements)?,
            ContentTransferEncoding::QuotedPrintable,
        )
        .map_err(|e| ModelError(format!("Failed to encode message: {:?}", e)))?;

        Message::builder()
            .from(self.from.clone())
            .to(to)
            .subject(subject)
            .body(body)
            .map_err(|e| ModelError(format!("Failed to encode message: {:?}", e)))
    }
}

/// Utilities to inspect messages captured during tests.
#[cfg(any(test, feature = "testutils"))]
pub mod testutils {
    use super::*;
    use std::collections::HashMap;

    /// Splits the wire form of `message` into its headers, keyed by name, and its decoded body.
    ///
    /// Panics if the message is malformed or repeats a header.
    pub fn parse_message(message: &Message) -> (HashMap<String, String>, String) {
        let text = String::from_utf8(message.formatted()).expect("Messages are UTF-8");
        let Some((head, encoded_body)) = text.split_once("\r\n\r\n") else {
            panic!("No separator between headers and body in: {}", text);
        };

        let mut headers = HashMap::default();
        for line in head.split("\r\n") {
            let Some((name, value)) = line.split_once(": ") else {
                panic!("Malformed header line: {}", line);
            };
            if headers.insert(name.to_owned(), value.to_owned()).is_some() {
                panic!("Header {} appears more than once", name);
            }
        }

        let body = quoted_printable::decode(encoded_body, quoted_printable::ParseMode::Strict)
            .expect("Bodies are quoted-printable");
        let body = String::from_utf8(body).expect("Bodies are UTF-8").replace("\r\n", "\n");

        (headers, body)
    }
}
