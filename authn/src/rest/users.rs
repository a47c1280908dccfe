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

//! Administrative access to the users collection.

use crate::db::USER_FIELDS;
use crate::driver::{AuthnDriver, NewUser, UserUpdate};
use crate::model::PublicUser;
use async_trait::async_trait;
use tourbook_core::driver::DriverResult;
use tourbook_core::model::Id;
use tourbook_core::query::{FieldSpec, ListQuery};
use tourbook_core::rest::crud::Resource;

/// The users collection as seen by administrators.
pub(crate) struct Users;

#[async_trait]
impl Resource for Users {
    type Driver = AuthnDriver;
    type Entity = PublicUser;
    type Create = NewUser;
    type Update = UserUpdate;

    const SINGULAR: &'static str = "user";
    const PLURAL: &'static str = "users";
    const FIELDS: &'static [FieldSpec] = USER_FIELDS;

    async fn create(driver: AuthnDriver, input: NewUser) -> DriverResult<PublicUser> {
        Ok(driver.create_user(input).await?.to_public())
    }

    async fn get(driver: AuthnDriver, id: Id) -> DriverResult<PublicUser> {
        Ok(driver.get_user(id).await?.to_public())
    }

    async fn list(driver: AuthnDriver, query: ListQuery) -> DriverResult<Vec<PublicUser>> {
        let users = driver.list_users(query).await?;
        Ok(users.iter().map(|user| user.to_public()).collect())
    }

    async fn update(driver: AuthnDriver, id: Id, input: UserUpdate) -> DriverResult<PublicUser> {
        Ok(driver.update_user(id, input).await?.to_public())
    }

    async fn delete(driver: AuthnDriver, id: Id) -> DriverResult<()> {
        driver.delete_user(id).await
    }
}
