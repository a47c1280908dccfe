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

//! The `User` data type.

use crate::model::{HashedPassword, ResetTokenHash, Role};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use tourbook_core::model::{EmailAddress, Id, ModelError, ModelResult};

/// Photo assigned to users that have not uploaded their own.
pub(crate) const DEFAULT_PHOTO: &str = "default.jpg";

/// Maximum length of a user's display name.
const MAX_NAME_LENGTH: usize = 100;

/// Validates and normalizes the display name of a user.
pub fn validate_name<S: AsRef<str>>(name: S) -> ModelResult<String> {
    let name = name.as_ref().trim();
    if name.is_empty() {
        return Err(ModelError("Please tell us your name!".to_owned()));
    }
    if name.chars().count() > MAX_NAME_LENGTH {
        return Err(ModelError(format!(
            "A user name must have less or equal than {} characters",
            MAX_NAME_LENGTH
        )));
    }
    Ok(name.to_owned())
}

/// Representation of a user's information.
#[derive(Clone, Debug, PartialEq)]
pub struct User {
    /// Identifier of the user.
    id: Id,

    /// Display name of the user.
    name: String,

    /// Email of the user.  Unique across all users.
    email: EmailAddress,

    /// Reference to the profile photo of the user.
    photo: String,

    /// Role of the user.
    role: Role,

    /// Hashed password.
    password: HashedPassword,

    /// Time of the last password change.  None if the password was set on creation and never
    /// changed.
    password_changed_at: Option<OffsetDateTime>,

    /// Hash of the pending password reset token and its expiration time.
    password_reset: Option<(ResetTokenHash, OffsetDateTime)>,

    /// Whether the account is active.  Inactive accounts behave as if they did not exist.
    active: bool,
}

impl User {
    /// Creates a new active user with the given fields and default settings.
    pub(crate) fn new(id: Id, name: String, email: EmailAddress, password: HashedPassword) -> Self {
        Self {
            id,
            name,
            email,
            photo: DEFAULT_PHOTO.to_owned(),
            role: Role::default(),
            password,
            password_changed_at: None,
            password_reset: None,
            active: true,
        }
    }

    /// Modifies a user to change their display name.
    pub(crate) fn with_name(mut self, name: String) -> Self {
        self.name = name;
        self
    }

    /// Modifies a user to change their email address.
    pub(crate) fn with_email(mut self, email: EmailAddress) -> Self {
        self.email = email;
        self
    }

    /// Modifies a user to change their profile photo.
    pub(crate) fn with_photo(mut self, photo: String) -> Self {
        self.photo = photo;
        self
    }

    /// Modifies a user to change their role.
    pub(crate) fn with_role(mut self, role: Role) -> Self {
        self.role = role;
        self
    }

    /// Modifies a user to replace their password, recording when it happened.
    ///
    /// Any pending password reset is discarded.
    pub(crate) fn with_password(
        mut self,
        password: HashedPassword,
        changed_at: OffsetDateTime,
    ) -> Self {
        self.password = password;
        self.password_changed_at = Some(changed_at);
        self.password_reset = None;
        self
    }

    /// Modifies a user to set the time of the last password change as loaded from storage.
    pub(crate) fn with_password_changed_at(mut self, changed_at: Option<OffsetDateTime>) -> Self {
        self.password_changed_at = changed_at;
        self
    }

    /// Modifies a user to set or clear their pending password reset.
    pub(crate) fn with_password_reset(
        mut self,
        reset: Option<(ResetTokenHash, OffsetDateTime)>,
    ) -> Self {
        self.password_reset = reset;
        self
    }

    /// Modifies a user to activate or deactivate their account.
    pub(crate) fn with_active(mut self, active: bool) -> Self {
        self.active = active;
        self
    }

    /// Gets the user's identifier.
    pub fn id(&self) -> Id {
        self.id
    }

    /// Gets the user's display name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Gets the user's email address.
    pub fn email(&self) -> &EmailAddress {
        &self.email
    }

    /// Gets the user's profile photo reference.
    pub fn photo(&self) -> &str {
        &self.photo
    }

    /// Gets the user's role.
    pub fn role(&self) -> Role {
        self.role
    }

    /// Gets the user's password as a hash.
    pub fn password(&self) -> &HashedPassword {
        &self.password
    }

    /// Gets the time of the user's last password change.
    pub fn password_changed_at(&self) -> Option<OffsetDateTime> {
        self.password_changed_at
    }

    /// Gets the user's pending password reset, if any.
    pub fn password_reset(&self) -> Option<&(ResetTokenHash, OffsetDateTime)> {
        self.password_reset.as_ref()
    }

    /// Gets whether the user's account is active.
    pub fn active(&self) -> bool {
        self.active
    }

    /// Returns true if the password was changed after `iat`, given in seconds since the epoch.
    ///
    /// Tokens carry their issue time with second precision so the comparison happens at that
    /// precision too.
    pub fn changed_password_after(&self, iat: i64) -> bool {
        match self.password_changed_at {
            Some(changed_at) => changed_at.unix_timestamp() > iat,
            None => false,
        }
    }

    /// Returns the fields of the user that can be shown to API callers.
    pub fn to_public(&self) -> PublicUser {
        PublicUser {
            id: self.id,
            name: self.name.clone(),
            email: self.email.clone(),
            photo: self.photo.clone(),
            role: self.role,
        }
    }
}

/// The view of a user returned by the REST API.  Never carries credentials.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct PublicUser {
    /// Identifier of the user.
    pub id: Id,

    /// Display name of the user.
    pub name: String,

    /// Email of the user.
    pub email: EmailAddress,

    /// Reference to the profile photo of the user.
    pub photo: String,

    /// Role of the user.
    pub role: Role,
}
