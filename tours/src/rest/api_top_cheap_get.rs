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

//! API to list the five best-rated cheap tours.

use crate::db::TOUR_FIELDS;
use crate::driver::ToursDriver;
use crate::rest::tours::Tours;
use axum::extract::{RawQuery, State};
use tourbook_core::model::ModelError;
use tourbook_core::query::ListQuery;
use tourbook_core::rest::crud;
use tourbook_core::rest::{Envelope, RestResult};

/// Query parameters that this API sets, overriding whatever the client provided.
const PRESET: &[(&str, &str)] = &[
    ("limit", "5"),
    ("sort", "-ratingsAverage,price"),
    ("fields", "name,price,ratingsAverage,summary,difficulty"),
];

/// Merges the `PRESET` parameters into the client-supplied `raw` query string.
fn preset_params(raw: &str) -> RestResult<Vec<(String, String)>> {
    let mut params = serde_urlencoded::from_str::<Vec<(String, String)>>(raw)
        .map_err(|e| ModelError(format!("Invalid query string: {}", e)))?;
    params.retain(|(key, _)| !PRESET.iter().any(|(preset, _)| key == preset));
    params.extend(PRESET.iter().map(|(k, v)| ((*k).to_owned(), (*v).to_owned())));
    Ok(params)
}

/// GET handler for this API.
pub(crate) async fn handler(
    State(driver): State<ToursDriver>,
    RawQuery(raw): RawQuery,
) -> RestResult<Envelope<Vec<serde_json::Value>>> {
    let params = preset_params(raw.as_deref().unwrap_or(""))?;
    let query = ListQuery::parse(&params, TOUR_FIELDS)?;
    crud::list_all::<Tours>(driver, query).await
}
