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

//! Extends the driver with read-only summaries over the public tours.

use crate::db;
use crate::driver::{STATS_MIN_RATING, ToursDriver};
use crate::model::{DifficultyStats, MonthlyPlan};
use std::collections::BTreeMap;
use time::OffsetDateTime;
use tourbook_core::driver::DriverResult;

/// Maximum number of months returned by a monthly plan.
const MAX_PLAN_MONTHS: usize = 12;

/// Groups the start dates in `schedules` that fall within `year` by month.
///
/// Months with more starts come first and ties are broken by month.
fn build_monthly_plan(
    year: i32,
    schedules: Vec<(String, Vec<OffsetDateTime>)>,
) -> Vec<MonthlyPlan> {
    let mut months: BTreeMap<u8, Vec<String>> = BTreeMap::new();
    for (name, start_dates) in schedules {
        for start in start_dates {
            if start.year() == year {
                months.entry(u8::from(start.month())).or_default().push(name.clone());
            }
        }
    }

    let mut plan: Vec<MonthlyPlan> = months
        .into_iter()
        .map(|(month, tours)| MonthlyPlan { month, num_tour_starts: tours.len(), tours })
        .collect();
    plan.sort_by(|a, b| b.num_tour_starts.cmp(&a.num_tour_starts).then(a.month.cmp(&b.month)));
    plan.truncate(MAX_PLAN_MONTHS);
    plan
}

impl ToursDriver {
    /// Computes per-difficulty statistics over the public tours with high ratings.
    pub async fn tour_stats(self) -> DriverResult<Vec<DifficultyStats>> {
        let mut ex = self.db.ex().await?;
        Ok(db::get_tour_stats(&mut ex, STATS_MIN_RATING).await?)
    }

    /// Computes how many public tours start in each month of `year`.
    pub async fn monthly_plan(self, year: i32) -> DriverResult<Vec<MonthlyPlan>> {
        let mut ex = self.db.ex().await?;
        let schedules = db::list_public_schedules(&mut ex).await?;
        Ok(build_monthly_plan(year, schedules))
    }
}
