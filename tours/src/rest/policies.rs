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

//! Roles allowed to invoke the protected tour and review APIs.
//!
//! Reads are public.  Every write names one of these policies in its route.

use tourbook_authn::model::Role;
use tourbook_authn::rest::Policy;

/// Staff who curate the catalog of tours.
pub(crate) struct TourEditors;

impl Policy for TourEditors {
    const ALLOWED: &'static [Role] = &[Role::Admin, Role::LeadGuide];
}

/// Staff who plan when tours run.
pub(crate) struct TourPlanners;

impl Policy for TourPlanners {
    const ALLOWED: &'static [Role] = &[Role::Admin, Role::LeadGuide, Role::Guide];
}

/// Customers who can write reviews.
pub(crate) struct Reviewers;

impl Policy for Reviewers {
    const ALLOWED: &'static [Role] = &[Role::User];
}

/// Users who can modify or remove existing reviews.
pub(crate) struct ReviewEditors;

impl Policy for ReviewEditors {
    const ALLOWED: &'static [Role] = &[Role::User, Role::Admin];
}
