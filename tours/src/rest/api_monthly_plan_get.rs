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

//! API to get the busiest months of a year.

use crate::driver::ToursDriver;
use crate::model::MonthlyPlan;
use crate::rest::policies::TourPlanners;
use axum::extract::{Path, State};
use tourbook_authn::rest::Caller;
use tourbook_core::rest::{EmptyBody, Envelope, RestError, RestResult};

/// GET handler for this API.
pub(crate) async fn handler(
    _caller: Caller<TourPlanners>,
    State(driver): State<ToursDriver>,
    Path(year): Path<String>,
    _: EmptyBody,
) -> RestResult<Envelope<Vec<MonthlyPlan>>> {
    let year = year
        .parse::<i32>()
        .map_err(|_| RestError::InvalidRequest(format!("Invalid year: {}", year)))?;
    let plan = driver.monthly_plan(year).await?;
    Ok(Envelope::one("plan", plan))
}
