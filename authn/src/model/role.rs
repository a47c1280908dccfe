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

//! The `Role` data type.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tourbook_core::model::ModelError;

/// Role of a user, which determines the operations they can run.
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, Hash, PartialEq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Role {
    /// A regular customer.  Can book tours and write reviews.
    #[default]
    User,

    /// A tour guide.
    Guide,

    /// A guide that leads tours and manages them.
    LeadGuide,

    /// An administrator with access to everything.
    Admin,
}

impl Role {
    /// Returns the textual representation of the role, as used in storage and in the API.
    pub fn as_str(self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Guide => "guide",
            Role::LeadGuide => "lead-guide",
            Role::Admin => "admin",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(Role::User),
            "guide" => Ok(Role::Guide),
            "lead-guide" => Ok(Role::LeadGuide),
            "admin" => Ok(Role::Admin),
            _ => Err(ModelError(format!("Invalid role: {}", s))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_test::{Token, assert_de_tokens_error, assert_tokens};

    #[test]
    fn test_role_text_roundtrip() {
        for role in [Role::User, Role::Guide, Role::LeadGuide, Role::Admin] {
            assert_eq!(role, Role::from_str(role.as_str()).unwrap());
            assert_eq!(role.as_str(), role.to_string());
        }
    }

    #[test]
    fn test_role_from_str_error() {
        assert_eq!(
            ModelError("Invalid role: superuser".to_owned()),
            Role::from_str("superuser").unwrap_err()
        );
    }

    #[test]
    fn test_role_ser_de() {
        assert_tokens(
            &Role::LeadGuide,
            &[Token::UnitVariant { name: "Role", variant: "lead-guide" }],
        );
        assert_de_tokens_error::<Role>(
            &[Token::UnitVariant { name: "Role", variant: "root" }],
            "unknown variant `root`, expected one of `user`, `guide`, `lead-guide`, `admin`",
        );
    }
}
