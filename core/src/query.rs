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

//! Translation of list query strings into structured queries.
//!
//! List endpoints accept a small query language in their query string:
//!
//! *   `<field>=<value>` filters by equality, and `<field>[gte|gt|lte|lt]=<value>` filters by
//!     comparison.
//! *   `sort=<field>[,-<field>...]` orders the results, with `-` meaning descending.
//! *   `fields=<field>[,<field>...]` restricts the returned fields.
//! *   `page=<n>` and `limit=<n>` paginate the results.  Limits above `MAX_LIMIT` are clamped.
//!
//! Every collection publishes the list of fields that can be used in these expressions as a
//! static slice of `FieldSpec`s.  Keys that name fields outside of that list are ignored.
//!
//! Each stage is exposed as a separate function so that callers can compose them as needed, and
//! `ListQuery::parse` runs all of them.

use crate::model::{Id, ModelError, ModelResult};
use log::debug;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

/// Query string keys that configure the query instead of filtering it.
const RESERVED_KEYS: &[&str] = &["page", "sort", "limit", "fields"];

/// Page returned when none is requested.
pub const DEFAULT_PAGE: u32 = 1;

/// Number of records per page when no limit is requested.
pub const DEFAULT_LIMIT: u32 = 100;

/// Largest number of records that a single page can hold.
pub const MAX_LIMIT: u32 = 1000;

/// Name of the field used for the default sort order, if the collection has it.
const DEFAULT_SORT_FIELD: &str = "createdAt";

/// Type of the values held by a field.  Determines how filter values are parsed.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum FieldKind {
    /// A boolean, spelled `true` or `false`.
    Bool,

    /// A reference to another entity.
    Id,

    /// A signed integer.
    Integer,

    /// A floating point number.
    Real,

    /// Free-form text.
    Text,

    /// A point in time, spelled in RFC 3339 format or as a `YYYY-MM-DD` date.
    Timestamp,
}

/// Description of a field that can be used in filters, sorts and projections.
#[derive(Debug, PartialEq)]
pub struct FieldSpec {
    /// Name of the field as exposed in the JSON representation of the entity.
    pub name: &'static str,

    /// Column in the database that backs this field.
    pub column: &'static str,

    /// Type of the values held by this field.
    pub kind: FieldKind,

    /// Whether repeating an equality filter on this field means "any of these values".  For all
    /// other fields, the last value wins.
    pub repeatable: bool,
}

impl FieldSpec {
    /// Creates a new field named `name` backed by `column`.
    pub const fn new(name: &'static str, column: &'static str, kind: FieldKind) -> Self {
        Self { name, column, kind, repeatable: false }
    }

    /// Marks the field as accepting repeated equality filters.
    pub const fn repeatable(self) -> Self {
        Self { repeatable: true, ..self }
    }

    /// Parses a raw filter `value` for this field.
    pub fn parse_value(&self, value: &str) -> ModelResult<Value> {
        let invalid = || ModelError(format!("Invalid {}: {}", self.name, value));
        match self.kind {
            FieldKind::Bool => match value {
                "true" => Ok(Value::Bool(true)),
                "false" => Ok(Value::Bool(false)),
                _ => Err(invalid()),
            },
            FieldKind::Id => Id::parse(value).map(Value::Id).map_err(|_| invalid()),
            FieldKind::Integer => value.parse::<i64>().map(Value::Integer).map_err(|_| invalid()),
            FieldKind::Real => match value.parse::<f64>() {
                Ok(f) if f.is_finite() => Ok(Value::Real(f)),
                _ => Err(invalid()),
            },
            FieldKind::Text => Ok(Value::Text(value.to_owned())),
            FieldKind::Timestamp => {
                parse_timestamp(value).map(Value::Timestamp).ok_or_else(invalid)
            }
        }
    }
}

/// Parses a timestamp given either in RFC 3339 format or as a plain date at midnight UTC.
pub fn parse_timestamp(value: &str) -> Option<OffsetDateTime> {
    if let Ok(ts) = OffsetDateTime::parse(value, &Rfc3339) {
        return Some(ts);
    }
    let format = time::format_description::parse("[year]-[month]-[day]").ok()?;
    let date = time::Date::parse(value, &format).ok()?;
    Some(date.midnight().assume_utc())
}

/// A typed filter value.
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    /// A boolean value.
    Bool(bool),

    /// An entity identifier.
    Id(Id),

    /// An integer value.
    Integer(i64),

    /// A floating point value.
    Real(f64),

    /// A text value.
    Text(String),

    /// A timestamp value.
    Timestamp(OffsetDateTime),
}

/// Comparison operators supported in filters.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Comparison {
    /// Equal to.
    Eq,

    /// Strictly greater than.
    Gt,

    /// Greater than or equal to.
    Gte,

    /// Strictly less than.
    Lt,

    /// Less than or equal to.
    Lte,
}

impl Comparison {
    /// Parses the operator given within brackets in a query string key.
    fn from_bracket(op: &str) -> Option<Self> {
        match op {
            "gt" => Some(Comparison::Gt),
            "gte" => Some(Comparison::Gte),
            "lt" => Some(Comparison::Lt),
            "lte" => Some(Comparison::Lte),
            _ => None,
        }
    }
}

/// A constraint applied to a single field.
#[derive(Clone, Debug, PartialEq)]
pub enum Constraint {
    /// The field must compare to the value according to the operator.
    Compare(Comparison, Value),

    /// The field must be equal to any of the values.
    AnyOf(Vec<Value>),

    /// No record can match.  Produced by keys with an unknown operator.
    Unsatisfiable,
}

/// A constraint bound to the field it applies to.
#[derive(Clone, Debug, PartialEq)]
pub struct Filter {
    /// The field being constrained.
    pub field: &'static FieldSpec,

    /// The constraint on the field.
    pub constraint: Constraint,
}

/// A sort criterion.
#[derive(Clone, Debug, PartialEq)]
pub struct SortKey {
    /// The field to sort by.
    pub field: &'static FieldSpec,

    /// Whether the sort is in descending order.
    pub descending: bool,
}

/// Pagination settings of a list query.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Pagination {
    /// One-based page number.
    pub page: u32,

    /// Maximum number of records per page.
    pub limit: u32,
}

impl Default for Pagination {
    fn default() -> Self {
        Self { page: DEFAULT_PAGE, limit: DEFAULT_LIMIT }
    }
}

impl Pagination {
    /// Number of records to skip to reach the first record of the page.
    ///
    /// Saturates at the largest offset that databases accept, which yields an empty page.
    pub fn skip(&self) -> i64 {
        i64::from(self.page.saturating_sub(1))
            .checked_mul(i64::from(self.limit))
            .unwrap_or(i64::MAX)
    }
}

/// Splits a query string key of the form `name[op]` into its components.
fn split_key(key: &str) -> (&str, Option<&str>) {
    match (key.find('['), key.strip_suffix(']')) {
        (Some(open), Some(inner)) if open > 0 => (&key[..open], Some(&inner[open + 1..])),
        _ => (key, None),
    }
}

/// Looks up the field called `name` in `fields`.
fn find_field(fields: &'static [FieldSpec], name: &str) -> Option<&'static FieldSpec> {
    fields.iter().find(|f| f.name == name)
}

/// Returns the last value given for the reserved `key` in `params`.
fn last_value<'a>(params: &'a [(String, String)], key: &str) -> Option<&'a str> {
    params.iter().rev().find(|(k, _)| k == key).map(|(_, v)| v.as_str())
}

/// Parses the filtering stage of a list query.
///
/// Keys are matched against `fields` and unknown ones are dropped.  Values must be valid for
/// the type of the field they apply to.
pub fn parse_filters(
    params: &[(String, String)],
    fields: &'static [FieldSpec],
) -> ModelResult<Vec<Filter>> {
    let mut filters = vec![];
    let mut equalities: Vec<(&'static FieldSpec, Vec<Value>)> = vec![];
    for (key, raw_value) in params {
        if RESERVED_KEYS.iter().any(|reserved| reserved == key) {
            continue;
        }

        let (name, op) = split_key(key);
        let Some(field) = find_field(fields, name) else {
            debug!("Ignoring filter on unknown field {}", key);
            continue;
        };

        match op {
            None => {
                let value = field.parse_value(raw_value)?;
                match equalities.iter_mut().find(|(f, _)| *f == field) {
                    Some((_, values)) => values.push(value),
                    None => equalities.push((field, vec![value])),
                }
            }
            Some(op) => match Comparison::from_bracket(op) {
                Some(comparison) => {
                    let value = field.parse_value(raw_value)?;
                    let constraint = Constraint::Compare(comparison, value);
                    filters.push(Filter { field, constraint });
                }
                None => filters.push(Filter { field, constraint: Constraint::Unsatisfiable }),
            },
        }
    }

    for (field, mut values) in equalities {
        let constraint = if field.repeatable && values.len() > 1 {
            values.dedup();
            Constraint::AnyOf(values)
        } else {
            let last = values.pop().expect("Equality groups are never empty");
            Constraint::Compare(Comparison::Eq, last)
        };
        filters.push(Filter { field, constraint });
    }

    Ok(filters)
}

/// Parses the sorting stage of a list query.
///
/// Returns the default order, newest first, if there are no valid sort keys and the collection
/// has a creation timestamp.
pub fn parse_sort(params: &[(String, String)], fields: &'static [FieldSpec]) -> Vec<SortKey> {
    let mut keys = vec![];
    if let Some(raw) = last_value(params, "sort") {
        for name in raw.split(',').map(str::trim) {
            let (name, descending) = match name.strip_prefix('-') {
                Some(name) => (name, true),
                None => (name, false),
            };
            match find_field(fields, name) {
                Some(field) => keys.push(SortKey { field, descending }),
                None => debug!("Ignoring sort on unknown field {}", name),
            }
        }
    }

    if keys.is_empty() {
        if let Some(field) = find_field(fields, DEFAULT_SORT_FIELD) {
            keys.push(SortKey { field, descending: true });
        }
    }
    keys
}

/// Parses the projection stage of a list query.
///
/// Returns `None` if all fields should be returned.
pub fn parse_projection(
    params: &[(String, String)],
    fields: &'static [FieldSpec],
) -> Option<Vec<&'static str>> {
    let raw = last_value(params, "fields")?;
    let mut names = vec![];
    for name in raw.split(',').map(str::trim) {
        if let Some(field) = find_field(fields, name) {
            if !names.contains(&field.name) {
                names.push(field.name);
            }
        }
    }
    if names.is_empty() { None } else { Some(names) }
}

/// Parses the pagination stage of a list query.
///
/// Values that are not positive integers fall back to the defaults, and limits are clamped to
/// `MAX_LIMIT`.
pub fn parse_pagination(params: &[(String, String)]) -> Pagination {
    let positive = |key| {
        last_value(params, key).and_then(|v| v.parse::<u32>().ok()).filter(|n| *n > 0)
    };
    Pagination {
        page: positive("page").unwrap_or(DEFAULT_PAGE),
        limit: positive("limit").unwrap_or(DEFAULT_LIMIT).min(MAX_LIMIT),
    }
}

/// A fully-parsed list query.
#[derive(Clone, Debug, PartialEq)]
pub struct ListQuery {
    /// Constraints that all returned records must satisfy.
    pub filters: Vec<Filter>,

    /// Sort criteria, in order of precedence.
    pub sort: Vec<SortKey>,

    /// Fields to return, or all fields if `None`.
    pub projection: Option<Vec<&'static str>>,

    /// Page to return.
    pub pagination: Pagination,
}

impl ListQuery {
    /// Runs all stages of the translation on the query string `params`.
    pub fn parse(params: &[(String, String)], fields: &'static [FieldSpec]) -> ModelResult<Self> {
        Ok(Self {
            filters: parse_filters(params, fields)?,
            sort: parse_sort(params, fields),
            projection: parse_projection(params, fields),
            pagination: parse_pagination(params),
        })
    }

    /// Parses a raw query string, as found in a URI, into a list query.
    pub fn from_query_string(raw: &str, fields: &'static [FieldSpec]) -> ModelResult<Self> {
        let params = serde_urlencoded::from_str::<Vec<(String, String)>>(raw)
            .map_err(|e| ModelError(format!("Invalid query string: {}", e)))?;
        Self::parse(&params, fields)
    }

    /// Restricts the query to records whose `field` references the `parent` entity.
    ///
    /// The constraint is evaluated before any user-supplied filter.
    pub fn scoped_to(mut self, field: &'static FieldSpec, parent: Id) -> Self {
        let constraint = Constraint::Compare(Comparison::Eq, Value::Id(parent));
        self.filters.insert(0, Filter { field, constraint });
        self
    }

    /// Applies the projection of this query to the JSON representation of a record.
    ///
    /// The `id` of the record is always kept.
    pub fn project(&self, value: serde_json::Value) -> serde_json::Value {
        match (&self.projection, value) {
            (Some(names), serde_json::Value::Object(mut map)) => {
                map.retain(|k, _| k == "id" || names.iter().any(|name| name == k));
                serde_json::Value::Object(map)
            }
            (_, value) => value,
        }
    }
}
