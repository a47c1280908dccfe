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

//! Generic create/read/update/delete handlers.
//!
//! Collections that only need the standard operations implement `Resource` and then route to the
//! handlers in this module, instantiated for the resource and for a guard type.  The guard is any
//! extractor that must succeed before the operation runs: `()` for public operations or an
//! authorization extractor for protected ones.  For example:
//!
//! ```ignore
//! Router::new()
//!     .route("/tours", get(crud::get_all::<Tours, ()>).post(crud::create_one::<Tours, Admins>))
//! ```

use crate::driver::{DriverError, DriverResult};
use crate::model::Id;
use crate::query::{FieldSpec, ListQuery};
use crate::rest::{Envelope, JsonBody, RestError, RestResult};
use async_trait::async_trait;
use axum::extract::{Path, RawQuery, State};
use axum::http::StatusCode;
use serde::Serialize;
use serde::de::DeserializeOwned;

/// A collection of entities exposed through the generic handlers.
#[async_trait]
pub trait Resource: Send + Sync + 'static {
    /// State that the operations need to access the collection.
    type Driver: Clone + Send + Sync + 'static;

    /// Representation of a stored entity as returned to clients.
    type Entity: Serialize + Send + 'static;

    /// Request body to create a new entity.
    type Create: DeserializeOwned + Send + 'static;

    /// Request body to partially update an existing entity.
    type Update: DeserializeOwned + Send + 'static;

    /// Key under which a single entity is returned.
    const SINGULAR: &'static str;

    /// Key under which a list of entities is returned.
    const PLURAL: &'static str;

    /// Fields that clients can use to filter, sort and project lists.
    const FIELDS: &'static [FieldSpec];

    /// Validates and persists a new entity.
    async fn create(driver: Self::Driver, input: Self::Create) -> DriverResult<Self::Entity>;

    /// Fetches the entity identified by `id`.
    async fn get(driver: Self::Driver, id: Id) -> DriverResult<Self::Entity>;

    /// Fetches the page of entities selected by `query`.  The projection is applied by the caller.
    async fn list(driver: Self::Driver, query: ListQuery) -> DriverResult<Vec<Self::Entity>>;

    /// Applies `input` to the entity identified by `id` and returns the result.
    async fn update(driver: Self::Driver, id: Id, input: Self::Update)
    -> DriverResult<Self::Entity>;

    /// Deletes the entity identified by `id`.
    async fn delete(driver: Self::Driver, id: Id) -> DriverResult<()>;
}

/// A resource that can also be listed under a parent entity, as in `/parents/:id/children`.
pub trait Nested: Resource {
    /// Field that references the parent entity.
    const PARENT: &'static FieldSpec;
}

/// Converts a driver error into a REST error, naming the resource in "not found" conditions.
fn map_error<R: Resource>(e: DriverError) -> RestError {
    match e {
        DriverError::NotFound(_) => {
            RestError::NotFound(format!("No {} found with that ID", R::SINGULAR))
        }
        e => e.into(),
    }
}

/// Runs `query` against the resource `R` and wraps the projected results in an envelope.
///
/// This is exposed so that handlers for canned queries can share the list representation.
pub async fn list_all<R: Resource>(
    driver: R::Driver,
    query: ListQuery,
) -> RestResult<Envelope<Vec<serde_json::Value>>> {
    let entities = R::list(driver, query.clone()).await.map_err(map_error::<R>)?;

    let mut values = Vec::with_capacity(entities.len());
    for entity in entities {
        let value = serde_json::to_value(entity)
            .map_err(|e| RestError::InternalError(format!("Cannot serialize entity: {}", e)))?;
        values.push(query.project(value));
    }
    Ok(Envelope::many(R::PLURAL, values))
}

/// Handler to create a new entity from the JSON body.
pub async fn create_one<R: Resource, G>(
    _guard: G,
    State(driver): State<R::Driver>,
    JsonBody(input): JsonBody<R::Create>,
) -> RestResult<(StatusCode, Envelope<R::Entity>)> {
    let entity = R::create(driver, input).await.map_err(map_error::<R>)?;
    Ok((StatusCode::CREATED, Envelope::one(R::SINGULAR, entity)))
}

/// Handler to fetch a single entity by its identifier.
pub async fn get_one<R: Resource, G>(
    _guard: G,
    State(driver): State<R::Driver>,
    Path(id): Path<String>,
) -> RestResult<Envelope<R::Entity>> {
    let id = Id::parse(id)?;
    let entity = R::get(driver, id).await.map_err(map_error::<R>)?;
    Ok(Envelope::one(R::SINGULAR, entity))
}

/// Handler to list entities according to the query string.
pub async fn get_all<R: Resource, G>(
    _guard: G,
    State(driver): State<R::Driver>,
    RawQuery(raw): RawQuery,
) -> RestResult<Envelope<Vec<serde_json::Value>>> {
    let query = ListQuery::from_query_string(raw.as_deref().unwrap_or(""), R::FIELDS)?;
    list_all::<R>(driver, query).await
}

/// Handler to list the entities that belong to the parent given in the path.
pub async fn get_all_nested<R: Nested, G>(
    _guard: G,
    State(driver): State<R::Driver>,
    Path(parent): Path<String>,
    RawQuery(raw): RawQuery,
) -> RestResult<Envelope<Vec<serde_json::Value>>> {
    let parent = Id::parse(parent)?;
    let query = ListQuery::from_query_string(raw.as_deref().unwrap_or(""), R::FIELDS)?
        .scoped_to(R::PARENT, parent);
    list_all::<R>(driver, query).await
}

/// Handler to partially update an entity with the JSON body.
pub async fn update_one<R: Resource, G>(
    _guard: G,
    State(driver): State<R::Driver>,
    Path(id): Path<String>,
    JsonBody(input): JsonBody<R::Update>,
) -> RestResult<Envelope<R::Entity>> {
    let id = Id::parse(id)?;
    let entity = R::update(driver, id, input).await.map_err(map_error::<R>)?;
    Ok(Envelope::one(R::SINGULAR, entity))
}

/// Handler to delete an entity.
pub async fn delete_one<R: Resource, G>(
    _guard: G,
    State(driver): State<R::Driver>,
    Path(id): Path<String>,
) -> RestResult<StatusCode> {
    let id = Id::parse(id)?;
    R::delete(driver, id).await.map_err(map_error::<R>)?;
    Ok(StatusCode::NO_CONTENT)
}
