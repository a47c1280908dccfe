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

//! Rendering of list queries into SQL statements.
//!
//! The rendering is backend-agnostic except for the few details captured by `Dialect`: the
//! placeholder syntax and the representation of timestamps.  PostgreSQL stores timestamps in
//! native columns whereas SQLite stores them as a pair of `<column>_secs` and `<column>_nsecs`
//! integer columns.

use crate::query::{Comparison, Constraint, FieldKind, Filter, ListQuery, Value};
use time::OffsetDateTime;

/// SQL dialect to render statements for.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Dialect {
    /// PostgreSQL, with `$n` placeholders and native timestamps.
    Postgres,

    /// SQLite, with `?` placeholders and split timestamps.
    Sqlite,
}

/// A value to bind to a placeholder in a rendered statement.
#[derive(Clone, Debug, PartialEq)]
pub enum SqlValue {
    /// A boolean.
    Bool(bool),

    /// An integer.
    Integer(i64),

    /// A floating point number.
    Real(f64),

    /// A string.
    Text(String),

    /// A timestamp.  Only produced for dialects with native timestamps.
    Timestamp(OffsetDateTime),
}

/// Splits a timestamp into the seconds and nanoseconds pair stored by SQLite.
fn split_timestamp(ts: OffsetDateTime) -> (i64, i64) {
    let nanos = ts.unix_timestamp_nanos();
    let secs = nanos.div_euclid(1_000_000_000) as i64;
    let nsecs = nanos.rem_euclid(1_000_000_000) as i64;
    (secs, nsecs)
}

/// Accumulates the values of a statement and hands out their placeholders.
struct Binder {
    /// Dialect that determines the placeholder syntax.
    dialect: Dialect,

    /// Values bound so far, in placeholder order.
    values: Vec<SqlValue>,
}

impl Binder {
    /// Records `value` and returns the placeholder that refers to it.
    fn push(&mut self, value: SqlValue) -> String {
        self.values.push(value);
        match self.dialect {
            Dialect::Postgres => format!("${}", self.values.len()),
            Dialect::Sqlite => "?".to_owned(),
        }
    }

    /// Renders the comparison of `column` (of type `kind`) against `value` using `op`.
    fn compare(&mut self, column: &str, kind: FieldKind, op: &str, value: &Value) -> String {
        let sql_value = match value {
            Value::Bool(b) => SqlValue::Bool(*b),
            Value::Id(id) => SqlValue::Text(id.to_db()),
            Value::Integer(i) => SqlValue::Integer(*i),
            Value::Real(f) => SqlValue::Real(*f),
            Value::Text(s) => SqlValue::Text(s.clone()),
            Value::Timestamp(ts) => match (self.dialect, kind) {
                (Dialect::Sqlite, FieldKind::Timestamp) => {
                    let (secs, nsecs) = split_timestamp(*ts);
                    let secs = self.push(SqlValue::Integer(secs));
                    let nsecs = self.push(SqlValue::Integer(nsecs));
                    return format!("({c}_secs, {c}_nsecs) {op} ({secs}, {nsecs})", c = column);
                }
                _ => SqlValue::Timestamp(*ts),
            },
        };
        let placeholder = self.push(sql_value);
        format!("{} {} {}", column, op, placeholder)
    }

    /// Renders a single filter as a boolean SQL expression.
    fn filter(&mut self, filter: &Filter) -> String {
        let column = filter.field.column;
        let kind = filter.field.kind;
        match &filter.constraint {
            Constraint::Compare(comparison, value) => {
                let op = match comparison {
                    Comparison::Eq => "=",
                    Comparison::Gt => ">",
                    Comparison::Gte => ">=",
                    Comparison::Lt => "<",
                    Comparison::Lte => "<=",
                };
                self.compare(column, kind, op, value)
            }
            Constraint::AnyOf(values) => {
                let terms: Vec<String> =
                    values.iter().map(|v| self.compare(column, kind, "=", v)).collect();
                format!("({})", terms.join(" OR "))
            }
            Constraint::Unsatisfiable => "1 = 0".to_owned(),
        }
    }
}

/// Shape of a `SELECT` statement on which to apply a `ListQuery`.
pub struct Select<'a> {
    /// Expressions to return, such as `tours.*`.
    pub columns: &'a str,

    /// Source of the rows, including any joins.
    pub from: &'a str,

    /// Column that uniquely identifies each row.  Used to make the order of results stable.
    pub id_column: &'a str,

    /// Fixed conditions that always apply, regardless of the user query.
    pub conditions: &'a [&'a str],
}

impl Select<'_> {
    /// Renders the statement for `query` in `dialect`.
    ///
    /// Returns the SQL text and the values to bind to its placeholders, in order.
    pub fn render(&self, dialect: Dialect, query: &ListQuery) -> (String, Vec<SqlValue>) {
        let mut binder = Binder { dialect, values: vec![] };

        let mut conditions: Vec<String> = self.conditions.iter().map(|c| (*c).to_owned()).collect();
        for filter in &query.filters {
            conditions.push(binder.filter(filter));
        }

        let mut sql = format!("SELECT {} FROM {}", self.columns, self.from);
        if !conditions.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&conditions.join(" AND "));
        }

        let mut order = vec![];
        for key in &query.sort {
            let direction = if key.descending { "DESC" } else { "ASC" };
            match (dialect, key.field.kind) {
                (Dialect::Sqlite, FieldKind::Timestamp) => {
                    order.push(format!("{}_secs {}", key.field.column, direction));
                    order.push(format!("{}_nsecs {}", key.field.column, direction));
                }
                _ => order.push(format!("{} {}", key.field.column, direction)),
            }
        }
        order.push(format!("{} ASC", self.id_column));
        sql.push_str(" ORDER BY ");
        sql.push_str(&order.join(", "));

        sql.push_str(&format!(
            " LIMIT {} OFFSET {}",
            query.pagination.limit,
            query.pagination.skip()
        ));

        (sql, binder.values)
    }
}
