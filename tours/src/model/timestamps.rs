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

//! Serde helpers to represent timestamps as RFC 3339 strings.
//!
//! Incoming values may also be plain `YYYY-MM-DD` dates, which are taken as midnight UTC.

use serde::de::Error as _;
use serde::ser::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use tourbook_core::query::parse_timestamp;

/// Formats `ts` as an RFC 3339 string.
fn format(ts: &OffsetDateTime) -> Result<String, time::error::Format> {
    ts.format(&Rfc3339)
}

/// Parses a textual timestamp or reports which value was invalid.
fn parse(raw: &str) -> Result<OffsetDateTime, String> {
    parse_timestamp(raw).ok_or_else(|| format!("Invalid timestamp: {}", raw))
}

/// Serializes a single timestamp.
pub(crate) fn serialize<S: Serializer>(ts: &OffsetDateTime, ser: S) -> Result<S::Ok, S::Error> {
    format(ts).map_err(S::Error::custom)?.serialize(ser)
}

/// Deserializes a single timestamp.
pub(crate) fn deserialize<'de, D: Deserializer<'de>>(de: D) -> Result<OffsetDateTime, D::Error> {
    let raw = String::deserialize(de)?;
    parse(&raw).map_err(D::Error::custom)
}

/// Same as the parent module but for lists of timestamps.
pub(crate) mod vec {
    use super::*;

    /// Serializes a list of timestamps.
    pub(crate) fn serialize<S: Serializer>(
        tss: &[OffsetDateTime],
        ser: S,
    ) -> Result<S::Ok, S::Error> {
        let mut raw = Vec::with_capacity(tss.len());
        for ts in tss {
            raw.push(format(ts).map_err(S::Error::custom)?);
        }
        raw.serialize(ser)
    }

    /// Deserializes a list of timestamps.
    pub(crate) fn deserialize<'de, D: Deserializer<'de>>(
        de: D,
    ) -> Result<Vec<OffsetDateTime>, D::Error> {
        let raw = Vec::<String>::deserialize(de)?;
        raw.iter().map(|s| parse(s).map_err(D::Error::custom)).collect()
    }
}

/// Same as the parent module but for optional lists of timestamps.
pub(crate) mod option_vec {
    use super::*;

    /// Deserializes an optional list of timestamps.
    pub(crate) fn deserialize<'de, D: Deserializer<'de>>(
        de: D,
    ) -> Result<Option<Vec<OffsetDateTime>>, D::Error> {
        match Option::<Vec<String>>::deserialize(de)? {
            Some(raw) => {
                let tss: Result<Vec<_>, _> =
                    raw.iter().map(|s| parse(s).map_err(D::Error::custom)).collect();
                Ok(Some(tss?))
            }
            None => Ok(None),
        }
    }
}

/// Encodes a list of timestamps as the JSON array stored in the database.
pub(crate) fn to_json(tss: &[OffsetDateTime]) -> Result<String, String> {
    let mut raw = Vec::with_capacity(tss.len());
    for ts in tss {
        raw.push(format(ts).map_err(|e| e.to_string())?);
    }
    serde_json::to_string(&raw).map_err(|e| e.to_string())
}

/// Decodes a list of timestamps from the JSON array stored in the database.
pub(crate) fn from_json(json: &str) -> Result<Vec<OffsetDateTime>, String> {
    let raw: Vec<String> = serde_json::from_str(json).map_err(|e| e.to_string())?;
    raw.iter().map(|s| parse(s)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use time::macros::datetime;

    #[derive(Debug, Deserialize, PartialEq, Serialize)]
    struct Sample {
        #[serde(with = "super")]
        one: OffsetDateTime,

        #[serde(with = "super::vec")]
        many: Vec<OffsetDateTime>,
    }

    #[test]
    fn test_serde() {
        let sample = Sample {
            one: datetime!(2021-04-25 09:00:00 UTC),
            many: vec![datetime!(2021-07-20 09:00:00 UTC), datetime!(2021-07-21 00:00:00 UTC)],
        };
        let value = json!({
            "one": "2021-04-25T09:00:00Z",
            "many": ["2021-07-20T09:00:00Z", "2021-07-21T00:00:00Z"],
        });
        assert_eq!(value, serde_json::to_value(&sample).unwrap());

        let input = json!({
            "one": "2021-04-25T11:00:00+02:00",
            "many": ["2021-07-20T09:00:00Z", "2021-07-21"],
        });
        assert_eq!(sample, serde_json::from_value::<Sample>(input).unwrap());
    }

    #[test]
    fn test_deserialize_invalid() {
        let err = serde_json::from_value::<Sample>(json!({"one": "yesterday", "many": []}))
            .unwrap_err();
        assert!(err.to_string().contains("Invalid timestamp: yesterday"));
    }

    #[test]
    fn test_json_column() {
        let tss = vec![datetime!(2021-06-19 09:00:00 UTC), datetime!(2021-07-20 09:00:00 UTC)];
        let json = to_json(&tss).unwrap();
        assert_eq!(r#"["2021-06-19T09:00:00Z","2021-07-20T09:00:00Z"]"#, json);
        assert_eq!(tss, from_json(&json).unwrap());
        from_json("not json").unwrap_err();
    }
}
