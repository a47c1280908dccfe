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

//! The `Difficulty` data type.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tourbook_core::model::ModelError;

/// How demanding a tour is.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
#[serde(try_from = "String", rename_all = "lowercase")]
pub enum Difficulty {
    /// Suitable for anyone.
    Easy,

    /// Requires some fitness.
    Medium,

    /// Only for experienced hikers.
    Difficult,
}

impl Difficulty {
    /// Returns the textual representation of the difficulty, as used in storage and in the API.
    pub fn as_str(self) -> &'static str {
        match self {
            Difficulty::Easy => "easy",
            Difficulty::Medium => "medium",
            Difficulty::Difficult => "difficult",
        }
    }
}

impl fmt::Display for Difficulty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Difficulty {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "easy" => Ok(Difficulty::Easy),
            "medium" => Ok(Difficulty::Medium),
            "difficult" => Ok(Difficulty::Difficult),
            _ => Err(ModelError("Difficulty is either: easy, medium, difficult".to_owned())),
        }
    }
}

impl TryFrom<String> for Difficulty {
    type Error = ModelError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Difficulty::from_str(&s)
    }
}
