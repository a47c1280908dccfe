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

//! Utilities to send canned messages to users over email.

use crate::driver::AuthnOptions;
use crate::model::{ResetToken, User};
use tourbook_core::driver::{DriverError, DriverResult};
use tourbook_smtp::driver::SmtpMailer;
use tourbook_smtp::model::EmailTemplate;
use url::Url;

/// Path, relative to the public URL, of the API to reset a password given a token.
const RESET_PASSWORD_PATH: &str = "api/v1/users/resetPassword/";

/// Template for the message sent to new users.
const WELCOME_SUBJECT: &str = "Welcome to the Tourbook family!";

/// Body of the message sent to new users.
const WELCOME_BODY: &str = "Hi %name%,

Welcome to Tourbook, we're glad to have you!

You can review your account details at any time here: %account_url%

Happy travels!
";

/// Subject of the message that carries a password reset token.
const RESET_SUBJECT: &str = "Your password reset token (valid for %minutes% min)";

/// Body of the message that carries a password reset token.
const RESET_BODY: &str = "Hi %name%,

Forgot your password? Submit a PATCH request with your new password and passwordConfirm to:

%reset_url%

If you didn't forget your password, please ignore this email!
";

/// Computes `path` relative to the public URL in `opts`.
fn public_url(opts: &AuthnOptions, path: &str) -> DriverResult<Url> {
    opts.public_url
        .join(path)
        .map_err(|e| DriverError::BackendError(format!("Cannot build URL for {}: {}", path, e)))
}

/// Sends the welcome message to a newly-registered `user`.
pub(super) async fn send_welcome(
    mailer: &(dyn SmtpMailer + Send + Sync),
    opts: &AuthnOptions,
    user: &User,
) -> DriverResult<()> {
    let template = EmailTemplate {
        from: opts.email_from.clone(),
        subject_template: WELCOME_SUBJECT,
        body_template: WELCOME_BODY,
    };

    let account_url = public_url(opts, "me")?;
    let replacements = [("name", user.name()), ("account_url", account_url.as_str())];
    let message = template.apply(user.email(), &replacements)?;

    mailer.send(message).await
}

/// Sends the password reset `token` to `user`.
pub(super) async fn send_reset_token(
    mailer: &(dyn SmtpMailer + Send + Sync),
    opts: &AuthnOptions,
    user: &User,
    token: &ResetToken,
) -> DriverResult<()> {
    let template = EmailTemplate {
        from: opts.email_from.clone(),
        subject_template: RESET_SUBJECT,
        body_template: RESET_BODY,
    };

    let reset_url = public_url(opts, &format!("{}{}", RESET_PASSWORD_PATH, token.as_str()))?;
    let minutes = (opts.reset_token_ttl.as_secs() / 60).to_string();
    let replacements =
        [("name", user.name()), ("reset_url", reset_url.as_str()), ("minutes", minutes.as_str())];
    let message = template.apply(user.email(), &replacements)?;

    mailer.send(message).await
}

#[cfg(any(test, feature = "testutils"))]
pub(crate) mod testutils {
    use super::*;
    use tourbook_core::model::EmailAddress;
    use tourbook_smtp::driver::testutils::RecorderSmtpMailer;
    use tourbook_smtp::model::testutils::parse_message;

    /// Gets the latest password reset token sent to `to`, if any.
    pub(crate) async fn get_latest_reset_token(
        mailer: &RecorderSmtpMailer,
        to: &EmailAddress,
    ) -> Option<ResetToken> {
        let messages = mailer.messages_to(to).await;
        messages.iter().rev().find_map(|message| {
            let (headers, body) = parse_message(message);
            let subject = headers.get("Subject").expect("Messages must have a subject");
            if !subject.starts_with("Your password reset token") {
                return None;
            }
            let line = body
                .lines()
                .find(|line| line.contains(RESET_PASSWORD_PATH))
                .expect("Reset messages must contain the reset URL");
            let (_, token) = line.rsplit_once('/').expect("Reset URL must end in the token");
            Some(ResetToken::new(token.trim()))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::testutils::*;
    use super::*;
    use crate::driver::testutils::test_opts;
    use crate::model::HashedPassword;
    use tourbook_core::model::{EmailAddress, Id};
    use tourbook_smtp::driver::testutils::RecorderSmtpMailer;
    use tourbook_smtp::model::testutils::parse_message;

    fn new_user() -> User {
        User::new(
            Id::generate(),
            "Jane Doe".to_owned(),
            EmailAddress::from("jane@example.com"),
            HashedPassword::new("hash"),
        )
    }

    #[tokio::test]
    async fn test_send_welcome() {
        let mailer = RecorderSmtpMailer::default();
        let user = new_user();

        send_welcome(&mailer, &test_opts(), &user).await.unwrap();

        let message = mailer.expect_one_message(user.email()).await;
        let (headers, body) = parse_message(&message);
        assert_eq!("jane@example.com", headers.get("To").unwrap());
        assert_eq!(WELCOME_SUBJECT, headers.get("Subject").unwrap());
        assert!(body.starts_with("Hi Jane Doe,\n"));
        assert!(body.contains("here: http://localhost:3000/me\n"));
    }

    #[tokio::test]
    async fn test_send_reset_token() {
        let mailer = RecorderSmtpMailer::default();
        let user = new_user();
        let token = ResetToken::generate();

        send_reset_token(&mailer, &test_opts(), &user, &token).await.unwrap();

        let message = mailer.expect_one_message(user.email()).await;
        let (headers, body) = parse_message(&message);
        assert_eq!("Your password reset token (valid for 10 min)", headers.get("Subject").unwrap());
        assert!(body.contains(&format!(
            "http://localhost:3000/api/v1/users/resetPassword/{}",
            token.as_str()
        )));

        assert!(token == get_latest_reset_token(&mailer, user.email()).await.unwrap());
    }

    #[tokio::test]
    async fn test_send_propagates_errors() {
        let mailer = RecorderSmtpMailer::default();
        let user = new_user();
        mailer.fail_deliveries_to(user.email().clone()).await;

        let err = send_reset_token(&mailer, &test_opts(), &user, &ResetToken::generate())
            .await
            .unwrap_err();
        assert!(matches!(err, DriverError::BackendError(_)));
        mailer.expect_no_messages().await;
    }
}
