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

//! Database abstraction to manipulate tours and reviews.
//!
//! Secret tours are hidden from the public, so the functions that serve anonymous reads say so
//! in their names.  Reviews are always read along with the public details of their author.

use crate::model::timestamps;
use crate::model::{
    Author, DifficultyStats, GeoPoint, Location, Review, ReviewWithAuthor, Slug, Tour,
};
#[cfg(feature = "postgres")]
use sqlx::postgres::PgRow;
#[cfg(any(feature = "sqlite", test))]
use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use std::str::FromStr;
use time::OffsetDateTime;
#[cfg(feature = "postgres")]
use tourbook_core::db::postgres;
#[cfg(any(feature = "sqlite", test))]
use tourbook_core::db::sqlite::{self, build_timestamp, unpack_timestamp};
use tourbook_core::db::sql::{Dialect, Select};
use tourbook_core::db::{DbError, DbResult, Executor};
use tourbook_core::model::Id;
use tourbook_core::query::{FieldKind, FieldSpec, ListQuery};


/// Fields of a tour that can be used in list queries.
pub const TOUR_FIELDS: &[FieldSpec] = &[
    FieldSpec::new("name", "name", FieldKind::Text),
    FieldSpec::new("slug", "slug", FieldKind::Text),
    FieldSpec::new("duration", "duration", FieldKind::Integer).repeatable(),
    FieldSpec::new("maxGroupSize", "max_group_size", FieldKind::Integer),
    FieldSpec::new("difficulty", "difficulty", FieldKind::Text).repeatable(),
    FieldSpec::new("price", "price", FieldKind::Real),
    FieldSpec::new("priceDiscount", "price_discount", FieldKind::Real),
    FieldSpec::new("summary", "summary", FieldKind::Text),
    FieldSpec::new("description", "description", FieldKind::Text),
    FieldSpec::new("imageCover", "image_cover", FieldKind::Text),
    FieldSpec::new("ratingsAverage", "ratings_average", FieldKind::Real),
    FieldSpec::new("ratingsQuantity", "ratings_quantity", FieldKind::Integer),
    FieldSpec::new("createdAt", "created_at", FieldKind::Timestamp),
];

/// Fields of a review that can be used in list queries.
pub const REVIEW_FIELDS: &[FieldSpec] = &[
    FieldSpec::new("review", "r.review", FieldKind::Text),
    FieldSpec::new("rating", "r.rating", FieldKind::Integer).repeatable(),
    FieldSpec::new("createdAt", "r.created_at", FieldKind::Timestamp),
    FieldSpec::new("tour", "r.tour_id", FieldKind::Id),
    FieldSpec::new("user", "r.user_id", FieldKind::Id),
];

/// Field of a review that references the reviewed tour.
pub const REVIEW_TOUR_FIELD: &FieldSpec = &REVIEW_FIELDS[3];

/// Query that lists the tours visible to the public.
const PUBLIC_TOURS: Select<'static> =
    Select { columns: "*", from: "tours", id_column: "id", conditions: &["secret = FALSE"] };

/// Query that lists reviews along with the details of their authors.
const REVIEWS_WITH_AUTHOR: Select<'static> = Select {
    columns: "r.*, u.name AS user_name, u.photo AS user_photo",
    from: "reviews r JOIN users u ON u.id = r.user_id",
    id_column: "r.id",
    conditions: &[],
};

/// Initializes the database schema.
///
/// The schema of the `authn` crate must have been initialized first because reviews reference
/// their authors.
pub async fn init_schema(ex: &mut Executor) -> DbResult<()> {
    match ex {
        #[cfg(feature = "postgres")]
        Executor::Postgres(ex) => postgres::run_schema(ex, include_str!("postgres.sql")).await,

        #[cfg(any(feature = "sqlite", test))]
        Executor::Sqlite(ex) => sqlite::run_schema(ex, include_str!("sqlite.sql")).await,

        #[allow(unused)]
        _ => unreachable!(),
    }
}

/// Converts the number of rows touched by a statement that must affect exactly one row into a
/// result.  `what` names the statement in errors.
fn expect_one_row(rows_affected: u64, what: &str) -> DbResult<()> {
    match rows_affected {
        0 => Err(DbError::NotFound),
        1 => Ok(()),
        _ => Err(DbError::BackendError(format!("{} affected more than one row", what))),
    }
}

/// Converts a counter read from the database into its in-memory representation.
fn to_u32(name: &str, value: i64) -> DbResult<u32> {
    u32::try_from(value)
        .map_err(|_| DbError::DataIntegrityError(format!("Invalid {}: {}", name, value)))
}

/// Raw values of a tour row, regardless of the backend they come from.
struct TourRow {
    /// Value of the `id` column.
    id: String,

    /// Value of the `name` column.
    name: String,

    /// Value of the `slug` column.
    slug: String,

    /// Value of the `duration` column.
    duration: i64,

    /// Value of the `max_group_size` column.
    max_group_size: i64,

    /// Value of the `difficulty` column.
    difficulty: String,

    /// Value of the `price` column.
    price: f64,

    /// Value of the `price_discount` column.
    price_discount: Option<f64>,

    /// Value of the `summary` column.
    summary: String,

    /// Value of the `description` column.
    description: Option<String>,

    /// Value of the `image_cover` column.
    image_cover: String,

    /// Value of the `images` column, a JSON array.
    images: String,

    /// Value of the `start_dates` column, a JSON array.
    start_dates: String,

    /// Value of the `ratings_average` column.
    ratings_average: f64,

    /// Value of the `ratings_quantity` column.
    ratings_quantity: i64,

    /// Creation time, already decoded from the backend-specific columns.
    created_at: OffsetDateTime,

    /// Value of the `secret` column.
    secret: bool,

    /// Value of the `start_lat` column.
    start_lat: Option<f64>,

    /// Value of the `start_lng` column.
    start_lng: Option<f64>,

    /// Value of the `start_address` column.
    start_address: Option<String>,

    /// Value of the `start_description` column.
    start_description: Option<String>,
}

/// Reads the columns of a tour from `$row` except for the creation time, which is given as
/// `$created_at` because its representation differs across backends.
macro_rules! tour_row [
    ( $row:expr, $map_err:path, $created_at:expr ) => {
        TourRow {
            id: $row.try_get("id").map_err($map_err)?,
            name: $row.try_get("name").map_err($map_err)?,
            slug: $row.try_get("slug").map_err($map_err)?,
            duration: $row.try_get("duration").map_err($map_err)?,
            max_group_size: $row.try_get("max_group_size").map_err($map_err)?,
            difficulty: $row.try_get("difficulty").map_err($map_err)?,
            price: $row.try_get("price").map_err($map_err)?,
            price_discount: $row.try_get("price_discount").map_err($map_err)?,
            summary: $row.try_get("summary").map_err($map_err)?,
            description: $row.try_get("description").map_err($map_err)?,
            image_cover: $row.try_get("image_cover").map_err($map_err)?,
            images: $row.try_get("images").map_err($map_err)?,
            start_dates: $row.try_get("start_dates").map_err($map_err)?,
            ratings_average: $row.try_get("ratings_average").map_err($map_err)?,
            ratings_quantity: $row.try_get("ratings_quantity").map_err($map_err)?,
            created_at: $created_at,
            secret: $row.try_get("secret").map_err($map_err)?,
            start_lat: $row.try_get("start_lat").map_err($map_err)?,
            start_lng: $row.try_get("start_lng").map_err($map_err)?,
            start_address: $row.try_get("start_address").map_err($map_err)?,
            start_description: $row.try_get("start_description").map_err($map_err)?,
        }
    }
];

impl TourRow {
    /// Validates the raw values and assembles a `Tour` from them.
    fn into_tour(self) -> DbResult<Tour> {
        let start_location = match (self.start_lat, self.start_lng) {
            (Some(lat), Some(lng)) => Some(Location {
                point: GeoPoint::new(lat, lng)?,
                address: self.start_address,
                description: self.start_description,
            }),
            (None, None) => None,
            (_, _) => {
                return Err(DbError::DataIntegrityError(
                    "Inconsistent values for start_location".to_owned(),
                ));
            }
        };

        let images = serde_json::from_str::<Vec<String>>(&self.images)
            .map_err(|e| DbError::DataIntegrityError(format!("Invalid images: {}", e)))?;
        let start_dates = timestamps::from_json(&self.start_dates)
            .map_err(|e| DbError::DataIntegrityError(format!("Invalid start_dates: {}", e)))?;

        Ok(Tour {
            id: Id::parse(self.id)?,
            name: self.name,
            slug: Slug::from_db(self.slug),
            duration: to_u32("duration", self.duration)?,
            max_group_size: to_u32("max_group_size", self.max_group_size)?,
            difficulty: FromStr::from_str(&self.difficulty)?,
            price: self.price,
            price_discount: self.price_discount,
            summary: self.summary,
            description: self.description,
            image_cover: self.image_cover,
            images,
            ratings_average: self.ratings_average,
            ratings_quantity: to_u32("ratings_quantity", self.ratings_quantity)?,
            created_at: self.created_at,
            start_dates,
            secret: self.secret,
            start_location,
        })
    }
}

#[cfg(feature = "postgres")]
impl TryFrom<PgRow> for Tour {
    type Error = DbError;

    fn try_from(row: PgRow) -> DbResult<Self> {
        let created_at: OffsetDateTime =
            row.try_get("created_at").map_err(postgres::map_sqlx_error)?;
        tour_row!(row, postgres::map_sqlx_error, created_at).into_tour()
    }
}

#[cfg(any(feature = "sqlite", test))]
impl TryFrom<SqliteRow> for Tour {
    type Error = DbError;

    fn try_from(row: SqliteRow) -> DbResult<Self> {
        let created_at_secs: i64 = row.try_get("created_at_secs").map_err(sqlite::map_sqlx_error)?;
        let created_at_nsecs: i64 =
            row.try_get("created_at_nsecs").map_err(sqlite::map_sqlx_error)?;
        let created_at = build_timestamp(created_at_secs, created_at_nsecs)?;
        tour_row!(row, sqlite::map_sqlx_error, created_at).into_tour()
    }
}

/// Serialized forms of the tour fields that are stored as JSON.
fn encode_tour_lists(tour: &Tour) -> DbResult<(String, String)> {
    let images = serde_json::to_string(&tour.images)
        .map_err(|e| DbError::BackendError(format!("Cannot encode images: {}", e)))?;
    let start_dates = timestamps::to_json(&tour.start_dates)
        .map_err(|e| DbError::BackendError(format!("Cannot encode start dates: {}", e)))?;
    Ok((images, start_dates))
}

/// Persists a new `tour`.  Fails with `AlreadyExists` if the name is taken.
pub(crate) async fn create_tour(ex: &mut Executor, tour: &Tour) -> DbResult<()> {
    let (images, start_dates) = encode_tour_lists(tour)?;
    let location = tour.start_location.as_ref();

    let rows_affected = match ex {
        #[cfg(feature = "postgres")]
        Executor::Postgres(ex) => {
            let query_str = "
                INSERT INTO tours (
                    id, name, slug, duration, max_group_size, difficulty, price, price_discount,
                    summary, description, image_cover, images, start_dates, ratings_average,
                    ratings_quantity, created_at, secret, start_lat, start_lng, start_address,
                    start_description
                ) VALUES (
                    $1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17,
                    $18, $19, $20, $21
                )";
            let done = sqlx::query(query_str)
                .bind(tour.id.to_db())
                .bind(&tour.name)
                .bind(tour.slug.as_str())
                .bind(i64::from(tour.duration))
                .bind(i64::from(tour.max_group_size))
                .bind(tour.difficulty.as_str())
                .bind(tour.price)
                .bind(tour.price_discount)
                .bind(&tour.summary)
                .bind(tour.description.as_deref())
                .bind(&tour.image_cover)
                .bind(images)
                .bind(start_dates)
                .bind(tour.ratings_average)
                .bind(i64::from(tour.ratings_quantity))
                .bind(tour.created_at)
                .bind(tour.secret)
                .bind(location.map(|l| l.point.lat()))
                .bind(location.map(|l| l.point.lng()))
                .bind(location.and_then(|l| l.address.as_deref()))
                .bind(location.and_then(|l| l.description.as_deref()))
                .execute(ex.conn())
                .await
                .map_err(postgres::map_sqlx_error)?;
            done.rows_affected()
        }

        #[cfg(any(feature = "sqlite", test))]
        Executor::Sqlite(ex) => {
            let (created_at_secs, created_at_nsecs) = unpack_timestamp(tour.created_at);

            let query_str = "
                INSERT INTO tours (
                    id, name, slug, duration, max_group_size, difficulty, price, price_discount,
                    summary, description, image_cover, images, start_dates, ratings_average,
                    ratings_quantity, created_at_secs, created_at_nsecs, secret, start_lat,
                    start_lng, start_address, start_description
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)";
            let done = sqlx::query(query_str)
                .bind(tour.id.to_db())
                .bind(&tour.name)
                .bind(tour.slug.as_str())
                .bind(i64::from(tour.duration))
                .bind(i64::from(tour.max_group_size))
                .bind(tour.difficulty.as_str())
                .bind(tour.price)
                .bind(tour.price_discount)
                .bind(&tour.summary)
                .bind(tour.description.as_deref())
                .bind(&tour.image_cover)
                .bind(images)
                .bind(start_dates)
                .bind(tour.ratings_average)
                .bind(i64::from(tour.ratings_quantity))
                .bind(created_at_secs)
                .bind(created_at_nsecs)
                .bind(tour.secret)
                .bind(location.map(|l| l.point.lat()))
                .bind(location.map(|l| l.point.lng()))
                .bind(location.and_then(|l| l.address.as_deref()))
                .bind(location.and_then(|l| l.description.as_deref()))
                .execute(ex.conn())
                .await
                .map_err(sqlite::map_sqlx_error)?;
            done.rows_affected()
        }

        #[allow(unused)]
        _ => unreachable!(),
    };

    expect_one_row(rows_affected, "Insertion")
}

/// Fetches the single tour that matches a condition.
///
/// The condition is given once per backend, `pg_where` and `sqlite_where`, because placeholders
/// differ.  Each must have a single placeholder for `id`.
async fn get_one_tour(
    ex: &mut Executor,
    pg_where: &str,
    sqlite_where: &str,
    id: Id,
) -> DbResult<Tour> {
    match ex {
        #[cfg(feature = "postgres")]
        Executor::Postgres(ex) => {
            let query_str = format!("SELECT * FROM tours WHERE {}", pg_where);
            let row = sqlx::query(&query_str)
                .bind(id.to_db())
                .fetch_one(ex.conn())
                .await
                .map_err(postgres::map_sqlx_error)?;
            Tour::try_from(row)
        }

        #[cfg(any(feature = "sqlite", test))]
        Executor::Sqlite(ex) => {
            let query_str = format!("SELECT * FROM tours WHERE {}", sqlite_where);
            let row = sqlx::query(&query_str)
                .bind(id.to_db())
                .fetch_one(ex.conn())
                .await
                .map_err(sqlite::map_sqlx_error)?;
            Tour::try_from(row)
        }

        #[allow(unused)]
        _ => unreachable!(),
    }
}

/// Gets a tour by `id`, whether it is secret or not.
pub(crate) async fn get_tour(ex: &mut Executor, id: Id) -> DbResult<Tour> {
    get_one_tour(ex, "id = $1", "id = ?", id).await
}

/// Gets a tour by `id` only if it is visible to the public.
pub(crate) async fn get_public_tour(ex: &mut Executor, id: Id) -> DbResult<Tour> {
    get_one_tour(ex, "id = $1 AND secret = FALSE", "id = ? AND secret = FALSE", id).await
}

/// Lists the public tours that match `query`.
pub(crate) async fn list_public_tours(
    ex: &mut Executor,
    query: &ListQuery,
) -> DbResult<Vec<Tour>> {
    let mut tours = vec![];
    match ex {
        #[cfg(feature = "postgres")]
        Executor::Postgres(ex) => {
            let (query_str, values) = PUBLIC_TOURS.render(Dialect::Postgres, query);
            let rows = postgres::bind_values(sqlx::query(&query_str), &values)
                .fetch_all(ex.conn())
                .await
                .map_err(postgres::map_sqlx_error)?;
            for row in rows {
                tours.push(Tour::try_from(row)?);
            }
        }

        #[cfg(any(feature = "sqlite", test))]
        Executor::Sqlite(ex) => {
            let (query_str, values) = PUBLIC_TOURS.render(Dialect::Sqlite, query);
            let rows = sqlite::bind_values(sqlx::query(&query_str), &values)
                .fetch_all(ex.conn())
                .await
                .map_err(sqlite::map_sqlx_error)?;
            for row in rows {
                tours.push(Tour::try_from(row)?);
            }
        }

        #[allow(unused)]
        _ => unreachable!(),
    }
    Ok(tours)
}

/// Lists all public tours that have a start location.
pub(crate) async fn list_located_public_tours(ex: &mut Executor) -> DbResult<Vec<Tour>> {
    let query_str = "
        SELECT * FROM tours
        WHERE secret = FALSE AND start_lat IS NOT NULL AND start_lng IS NOT NULL
        ORDER BY id";

    let mut tours = vec![];
    match ex {
        #[cfg(feature = "postgres")]
        Executor::Postgres(ex) => {
            let rows = sqlx::query(query_str)
                .fetch_all(ex.conn())
                .await
                .map_err(postgres::map_sqlx_error)?;
            for row in rows {
                tours.push(Tour::try_from(row)?);
            }
        }

        #[cfg(any(feature = "sqlite", test))]
        Executor::Sqlite(ex) => {
            let rows =
                sqlx::query(query_str).fetch_all(ex.conn()).await.map_err(sqlite::map_sqlx_error)?;
            for row in rows {
                tours.push(Tour::try_from(row)?);
            }
        }

        #[allow(unused)]
        _ => unreachable!(),
    }
    Ok(tours)
}

/// Lists the name and start dates of every public tour.
pub(crate) async fn list_public_schedules(
    ex: &mut Executor,
) -> DbResult<Vec<(String, Vec<OffsetDateTime>)>> {
    let query_str = "SELECT name, start_dates FROM tours WHERE secret = FALSE ORDER BY name";

    let raw: Vec<(String, String)> = match ex {
        #[cfg(feature = "postgres")]
        Executor::Postgres(ex) => sqlx::query_as(query_str)
            .fetch_all(ex.conn())
            .await
            .map_err(postgres::map_sqlx_error)?,

        #[cfg(any(feature = "sqlite", test))]
        Executor::Sqlite(ex) => sqlx::query_as(query_str)
            .fetch_all(ex.conn())
            .await
            .map_err(sqlite::map_sqlx_error)?,

        #[allow(unused)]
        _ => unreachable!(),
    };

    let mut schedules = Vec::with_capacity(raw.len());
    for (name, start_dates) in raw {
        let start_dates = timestamps::from_json(&start_dates)
            .map_err(|e| DbError::DataIntegrityError(format!("Invalid start_dates: {}", e)))?;
        schedules.push((name, start_dates));
    }
    Ok(schedules)
}

/// Computes per-difficulty statistics over the public tours rated at least `min_rating`.
pub(crate) async fn get_tour_stats(
    ex: &mut Executor,
    min_rating: f64,
) -> DbResult<Vec<DifficultyStats>> {
    let mut stats = vec![];
    match ex {
        #[cfg(feature = "postgres")]
        Executor::Postgres(ex) => {
            let query_str = "
                SELECT
                    UPPER(difficulty) AS difficulty,
                    COUNT(*) AS num_tours,
                    SUM(ratings_quantity)::BIGINT AS num_ratings,
                    AVG(ratings_average) AS avg_rating,
                    AVG(price) AS avg_price,
                    MIN(price) AS min_price,
                    MAX(price) AS max_price
                FROM tours
                WHERE secret = FALSE AND ratings_average >= $1
                GROUP BY UPPER(difficulty)
                ORDER BY avg_price ASC, difficulty ASC";
            let rows = sqlx::query(query_str)
                .bind(min_rating)
                .fetch_all(ex.conn())
                .await
                .map_err(postgres::map_sqlx_error)?;
            for row in rows {
                stats.push(DifficultyStats {
                    difficulty: row.try_get("difficulty").map_err(postgres::map_sqlx_error)?,
                    num_tours: row.try_get("num_tours").map_err(postgres::map_sqlx_error)?,
                    num_ratings: row.try_get("num_ratings").map_err(postgres::map_sqlx_error)?,
                    avg_rating: row.try_get("avg_rating").map_err(postgres::map_sqlx_error)?,
                    avg_price: row.try_get("avg_price").map_err(postgres::map_sqlx_error)?,
                    min_price: row.try_get("min_price").map_err(postgres::map_sqlx_error)?,
                    max_price: row.try_get("max_price").map_err(postgres::map_sqlx_error)?,
                });
            }
        }

        #[cfg(any(feature = "sqlite", test))]
        Executor::Sqlite(ex) => {
            let query_str = "
                SELECT
                    UPPER(difficulty) AS difficulty,
                    COUNT(*) AS num_tours,
                    SUM(ratings_quantity) AS num_ratings,
                    AVG(ratings_average) AS avg_rating,
                    AVG(price) AS avg_price,
                    MIN(price) AS min_price,
                    MAX(price) AS max_price
                FROM tours
                WHERE secret = FALSE AND ratings_average >= ?
                GROUP BY UPPER(difficulty)
                ORDER BY avg_price ASC, difficulty ASC";
            let rows = sqlx::query(query_str)
                .bind(min_rating)
                .fetch_all(ex.conn())
                .await
                .map_err(sqlite::map_sqlx_error)?;
            for row in rows {
                stats.push(DifficultyStats {
                    difficulty: row.try_get("difficulty").map_err(sqlite::map_sqlx_error)?,
                    num_tours: row.try_get("num_tours").map_err(sqlite::map_sqlx_error)?,
                    num_ratings: row.try_get("num_ratings").map_err(sqlite::map_sqlx_error)?,
                    avg_rating: row.try_get("avg_rating").map_err(sqlite::map_sqlx_error)?,
                    avg_price: row.try_get("avg_price").map_err(sqlite::map_sqlx_error)?,
                    min_price: row.try_get("min_price").map_err(sqlite::map_sqlx_error)?,
                    max_price: row.try_get("max_price").map_err(sqlite::map_sqlx_error)?,
                });
            }
        }

        #[allow(unused)]
        _ => unreachable!(),
    }
    Ok(stats)
}

/// Updates an existing `tour` with new contents.
///
/// The rating aggregates and the creation time are not touched: see `set_tour_ratings`.
pub(crate) async fn update_tour(ex: &mut Executor, tour: &Tour) -> DbResult<()> {
    let (images, start_dates) = encode_tour_lists(tour)?;
    let location = tour.start_location.as_ref();

    let rows_affected = match ex {
        #[cfg(feature = "postgres")]
        Executor::Postgres(ex) => {
            let query_str = "
                UPDATE tours
                SET
                    name = $1, slug = $2, duration = $3, max_group_size = $4, difficulty = $5,
                    price = $6, price_discount = $7, summary = $8, description = $9,
                    image_cover = $10, images = $11, start_dates = $12, secret = $13,
                    start_lat = $14, start_lng = $15, start_address = $16,
                    start_description = $17
                WHERE id = $18";
            let done = sqlx::query(query_str)
                .bind(&tour.name)
                .bind(tour.slug.as_str())
                .bind(i64::from(tour.duration))
                .bind(i64::from(tour.max_group_size))
                .bind(tour.difficulty.as_str())
                .bind(tour.price)
                .bind(tour.price_discount)
                .bind(&tour.summary)
                .bind(tour.description.as_deref())
                .bind(&tour.image_cover)
                .bind(images)
                .bind(start_dates)
                .bind(tour.secret)
                .bind(location.map(|l| l.point.lat()))
                .bind(location.map(|l| l.point.lng()))
                .bind(location.and_then(|l| l.address.as_deref()))
                .bind(location.and_then(|l| l.description.as_deref()))
                .bind(tour.id.to_db())
                .execute(ex.conn())
                .await
                .map_err(postgres::map_sqlx_error)?;
            done.rows_affected()
        }

        #[cfg(any(feature = "sqlite", test))]
        Executor::Sqlite(ex) => {
            let query_str = "
                UPDATE tours
                SET
                    name = ?, slug = ?, duration = ?, max_group_size = ?, difficulty = ?,
                    price = ?, price_discount = ?, summary = ?, description = ?,
                    image_cover = ?, images = ?, start_dates = ?, secret = ?,
                    start_lat = ?, start_lng = ?, start_address = ?, start_description = ?
                WHERE id = ?";
            let done = sqlx::query(query_str)
                .bind(&tour.name)
                .bind(tour.slug.as_str())
                .bind(i64::from(tour.duration))
                .bind(i64::from(tour.max_group_size))
                .bind(tour.difficulty.as_str())
                .bind(tour.price)
                .bind(tour.price_discount)
                .bind(&tour.summary)
                .bind(tour.description.as_deref())
                .bind(&tour.image_cover)
                .bind(images)
                .bind(start_dates)
                .bind(tour.secret)
                .bind(location.map(|l| l.point.lat()))
                .bind(location.map(|l| l.point.lng()))
                .bind(location.and_then(|l| l.address.as_deref()))
                .bind(location.and_then(|l| l.description.as_deref()))
                .bind(tour.id.to_db())
                .execute(ex.conn())
                .await
                .map_err(sqlite::map_sqlx_error)?;
            done.rows_affected()
        }

        #[allow(unused)]
        _ => unreachable!(),
    };

    expect_one_row(rows_affected, "Update")
}

/// Overwrites the rating aggregates of the tour `id`.
pub(crate) async fn set_tour_ratings(
    ex: &mut Executor,
    id: Id,
    average: f64,
    quantity: u32,
) -> DbResult<()> {
    let rows_affected = match ex {
        #[cfg(feature = "postgres")]
        Executor::Postgres(ex) => {
            let query_str =
                "UPDATE tours SET ratings_average = $1, ratings_quantity = $2 WHERE id = $3";
            let done = sqlx::query(query_str)
                .bind(average)
                .bind(i64::from(quantity))
                .bind(id.to_db())
                .execute(ex.conn())
                .await
                .map_err(postgres::map_sqlx_error)?;
            done.rows_affected()
        }

        #[cfg(any(feature = "sqlite", test))]
        Executor::Sqlite(ex) => {
            let query_str =
                "UPDATE tours SET ratings_average = ?, ratings_quantity = ? WHERE id = ?";
            let done = sqlx::query(query_str)
                .bind(average)
                .bind(i64::from(quantity))
                .bind(id.to_db())
                .execute(ex.conn())
                .await
                .map_err(sqlite::map_sqlx_error)?;
            done.rows_affected()
        }

        #[allow(unused)]
        _ => unreachable!(),
    };

    expect_one_row(rows_affected, "Update")
}

/// Deletes the tour `id` along with all of its reviews.
pub(crate) async fn delete_tour(ex: &mut Executor, id: Id) -> DbResult<()> {
    let rows_affected = match ex {
        #[cfg(feature = "postgres")]
        Executor::Postgres(ex) => {
            let done = sqlx::query("DELETE FROM tours WHERE id = $1")
                .bind(id.to_db())
                .execute(ex.conn())
                .await
                .map_err(postgres::map_sqlx_error)?;
            done.rows_affected()
        }

        #[cfg(any(feature = "sqlite", test))]
        Executor::Sqlite(ex) => {
            let done = sqlx::query("DELETE FROM tours WHERE id = ?")
                .bind(id.to_db())
                .execute(ex.conn())
                .await
                .map_err(sqlite::map_sqlx_error)?;
            done.rows_affected()
        }

        #[allow(unused)]
        _ => unreachable!(),
    };

    expect_one_row(rows_affected, "Delete")
}

/// Raw values of a review row, regardless of the backend they come from.
struct ReviewRow {
    /// Value of the `id` column.
    id: String,

    /// Value of the `review` column.
    review: String,

    /// Value of the `rating` column.
    rating: Option<i64>,

    /// Creation time, already decoded from the backend-specific columns.
    created_at: OffsetDateTime,

    /// Value of the `tour_id` column.
    tour_id: String,

    /// Value of the `user_id` column.
    user_id: String,
}

/// Reads the columns of a review from `$row` except for the creation time, which is given as
/// `$created_at` because its representation differs across backends.
macro_rules! review_row [
    ( $row:expr, $map_err:path, $created_at:expr ) => {
        ReviewRow {
            id: $row.try_get("id").map_err($map_err)?,
            review: $row.try_get("review").map_err($map_err)?,
            rating: $row.try_get("rating").map_err($map_err)?,
            created_at: $created_at,
            tour_id: $row.try_get("tour_id").map_err($map_err)?,
            user_id: $row.try_get("user_id").map_err($map_err)?,
        }
    }
];

impl ReviewRow {
    /// Validates the raw values and assembles a `Review` from them.
    fn into_review(self) -> DbResult<Review> {
        let rating = match self.rating {
            Some(rating) => Some(u8::try_from(rating).map_err(|_| {
                DbError::DataIntegrityError(format!("Invalid rating: {}", rating))
            })?),
            None => None,
        };
        Ok(Review::new(
            Id::parse(self.id)?,
            self.created_at,
            Id::parse(self.tour_id)?,
            Id::parse(self.user_id)?,
            self.review,
            rating,
        )?)
    }
}

#[cfg(feature = "postgres")]
impl TryFrom<PgRow> for Review {
    type Error = DbError;

    fn try_from(row: PgRow) -> DbResult<Self> {
        let created_at: OffsetDateTime =
            row.try_get("created_at").map_err(postgres::map_sqlx_error)?;
        review_row!(row, postgres::map_sqlx_error, created_at).into_review()
    }
}

#[cfg(any(feature = "sqlite", test))]
impl TryFrom<SqliteRow> for Review {
    type Error = DbError;

    fn try_from(row: SqliteRow) -> DbResult<Self> {
        let created_at_secs: i64 = row.try_get("created_at_secs").map_err(sqlite::map_sqlx_error)?;
        let created_at_nsecs: i64 =
            row.try_get("created_at_nsecs").map_err(sqlite::map_sqlx_error)?;
        let created_at = build_timestamp(created_at_secs, created_at_nsecs)?;
        review_row!(row, sqlite::map_sqlx_error, created_at).into_review()
    }
}

#[cfg(feature = "postgres")]
impl TryFrom<PgRow> for ReviewWithAuthor {
    type Error = DbError;

    fn try_from(row: PgRow) -> DbResult<Self> {
        let name: String = row.try_get("user_name").map_err(postgres::map_sqlx_error)?;
        let photo: String = row.try_get("user_photo").map_err(postgres::map_sqlx_error)?;
        let review = Review::try_from(row)?;
        let author = Author { id: review.user, name, photo };
        Ok(ReviewWithAuthor::new(review, author))
    }
}

#[cfg(any(feature = "sqlite", test))]
impl TryFrom<SqliteRow> for ReviewWithAuthor {
    type Error = DbError;

    fn try_from(row: SqliteRow) -> DbResult<Self> {
        let name: String = row.try_get("user_name").map_err(sqlite::map_sqlx_error)?;
        let photo: String = row.try_get("user_photo").map_err(sqlite::map_sqlx_error)?;
        let review = Review::try_from(row)?;
        let author = Author { id: review.user, name, photo };
        Ok(ReviewWithAuthor::new(review, author))
    }
}

/// Persists a new `review`.
///
/// Fails with `AlreadyExists` if the author already reviewed the tour, or with `NotFound` if
/// the tour or the author do not exist.
pub(crate) async fn create_review(ex: &mut Executor, review: &Review) -> DbResult<()> {
    let rating = review.rating.map(i64::from);

    let rows_affected = match ex {
        #[cfg(feature = "postgres")]
        Executor::Postgres(ex) => {
            let query_str = "
                INSERT INTO reviews (id, review, rating, created_at, tour_id, user_id)
                VALUES ($1, $2, $3, $4, $5, $6)";
            let done = sqlx::query(query_str)
                .bind(review.id.to_db())
                .bind(&review.review)
                .bind(rating)
                .bind(review.created_at)
                .bind(review.tour.to_db())
                .bind(review.user.to_db())
                .execute(ex.conn())
                .await
                .map_err(postgres::map_sqlx_error)?;
            done.rows_affected()
        }

        #[cfg(any(feature = "sqlite", test))]
        Executor::Sqlite(ex) => {
            let (created_at_secs, created_at_nsecs) = unpack_timestamp(review.created_at);

            let query_str = "
                INSERT INTO reviews (
                    id, review, rating, created_at_secs, created_at_nsecs, tour_id, user_id
                ) VALUES (?, ?, ?, ?, ?, ?, ?)";
            let done = sqlx::query(query_str)
                .bind(review.id.to_db())
                .bind(&review.review)
                .bind(rating)
                .bind(created_at_secs)
                .bind(created_at_nsecs)
                .bind(review.tour.to_db())
                .bind(review.user.to_db())
                .execute(ex.conn())
                .await
                .map_err(sqlite::map_sqlx_error)?;
            done.rows_affected()
        }

        #[allow(unused)]
        _ => unreachable!(),
    };

    expect_one_row(rows_affected, "Insertion")
}

/// Gets the review `id` without the details of its author.
pub(crate) async fn get_review(ex: &mut Executor, id: Id) -> DbResult<Review> {
    match ex {
        #[cfg(feature = "postgres")]
        Executor::Postgres(ex) => {
            let row = sqlx::query("SELECT * FROM reviews WHERE id = $1")
                .bind(id.to_db())
                .fetch_one(ex.conn())
                .await
                .map_err(postgres::map_sqlx_error)?;
            Review::try_from(row)
        }

        #[cfg(any(feature = "sqlite", test))]
        Executor::Sqlite(ex) => {
            let row = sqlx::query("SELECT * FROM reviews WHERE id = ?")
                .bind(id.to_db())
                .fetch_one(ex.conn())
                .await
                .map_err(sqlite::map_sqlx_error)?;
            Review::try_from(row)
        }

        #[allow(unused)]
        _ => unreachable!(),
    }
}

/// Gets the review `id` along with the details of its author.
pub(crate) async fn get_review_with_author(
    ex: &mut Executor,
    id: Id,
) -> DbResult<ReviewWithAuthor> {
    match ex {
        #[cfg(feature = "postgres")]
        Executor::Postgres(ex) => {
            let query_str = format!(
                "SELECT {} FROM {} WHERE r.id = $1",
                REVIEWS_WITH_AUTHOR.columns, REVIEWS_WITH_AUTHOR.from
            );
            let row = sqlx::query(&query_str)
                .bind(id.to_db())
                .fetch_one(ex.conn())
                .await
                .map_err(postgres::map_sqlx_error)?;
            ReviewWithAuthor::try_from(row)
        }

        #[cfg(any(feature = "sqlite", test))]
        Executor::Sqlite(ex) => {
            let query_str = format!(
                "SELECT {} FROM {} WHERE r.id = ?",
                REVIEWS_WITH_AUTHOR.columns, REVIEWS_WITH_AUTHOR.from
            );
            let row = sqlx::query(&query_str)
                .bind(id.to_db())
                .fetch_one(ex.conn())
                .await
                .map_err(sqlite::map_sqlx_error)?;
            ReviewWithAuthor::try_from(row)
        }

        #[allow(unused)]
        _ => unreachable!(),
    }
}

/// Lists the reviews that match `query` along with the details of their authors.
pub(crate) async fn list_reviews_with_author(
    ex: &mut Executor,
    query: &ListQuery,
) -> DbResult<Vec<ReviewWithAuthor>> {
    let mut reviews = vec![];
    match ex {
        #[cfg(feature = "postgres")]
        Executor::Postgres(ex) => {
            let (query_str, values) = REVIEWS_WITH_AUTHOR.render(Dialect::Postgres, query);
            let rows = postgres::bind_values(sqlx::query(&query_str), &values)
                .fetch_all(ex.conn())
                .await
                .map_err(postgres::map_sqlx_error)?;
            for row in rows {
                reviews.push(ReviewWithAuthor::try_from(row)?);
            }
        }

        #[cfg(any(feature = "sqlite", test))]
        Executor::Sqlite(ex) => {
            let (query_str, values) = REVIEWS_WITH_AUTHOR.render(Dialect::Sqlite, query);
            let rows = sqlite::bind_values(sqlx::query(&query_str), &values)
                .fetch_all(ex.conn())
                .await
                .map_err(sqlite::map_sqlx_error)?;
            for row in rows {
                reviews.push(ReviewWithAuthor::try_from(row)?);
            }
        }

        #[allow(unused)]
        _ => unreachable!(),
    }
    Ok(reviews)
}

/// Lists all reviews of the tour `tour_id` along with the details of their authors, newest
/// first.
///
/// Unlike `list_reviews_with_author`, this is not paginated.
pub(crate) async fn list_tour_reviews_with_author(
    ex: &mut Executor,
    tour_id: Id,
) -> DbResult<Vec<ReviewWithAuthor>> {
    let mut reviews = vec![];
    match ex {
        #[cfg(feature = "postgres")]
        Executor::Postgres(ex) => {
            let query_str = format!(
                "SELECT {} FROM {} WHERE r.tour_id = $1 ORDER BY r.created_at DESC, r.id ASC",
                REVIEWS_WITH_AUTHOR.columns, REVIEWS_WITH_AUTHOR.from
            );
            let rows = sqlx::query(&query_str)
                .bind(tour_id.to_db())
                .fetch_all(ex.conn())
                .await
                .map_err(postgres::map_sqlx_error)?;
            for row in rows {
                reviews.push(ReviewWithAuthor::try_from(row)?);
            }
        }

        #[cfg(any(feature = "sqlite", test))]
        Executor::Sqlite(ex) => {
            let query_str = format!(
                "SELECT {} FROM {} WHERE r.tour_id = ?
                ORDER BY r.created_at_secs DESC, r.created_at_nsecs DESC, r.id ASC",
                REVIEWS_WITH_AUTHOR.columns, REVIEWS_WITH_AUTHOR.from
            );
            let rows = sqlx::query(&query_str)
                .bind(tour_id.to_db())
                .fetch_all(ex.conn())
                .await
                .map_err(sqlite::map_sqlx_error)?;
            for row in rows {
                reviews.push(ReviewWithAuthor::try_from(row)?);
            }
        }

        #[allow(unused)]
        _ => unreachable!(),
    }
    Ok(reviews)
}

/// Updates the text and rating of an existing `review`.
pub(crate) async fn update_review(ex: &mut Executor, review: &Review) -> DbResult<()> {
    let rating = review.rating.map(i64::from);

    let rows_affected = match ex {
        #[cfg(feature = "postgres")]
        Executor::Postgres(ex) => {
            let done = sqlx::query("UPDATE reviews SET review = $1, rating = $2 WHERE id = $3")
                .bind(&review.review)
                .bind(rating)
                .bind(review.id.to_db())
                .execute(ex.conn())
                .await
                .map_err(postgres::map_sqlx_error)?;
            done.rows_affected()
        }

        #[cfg(any(feature = "sqlite", test))]
        Executor::Sqlite(ex) => {
            let done = sqlx::query("UPDATE reviews SET review = ?, rating = ? WHERE id = ?")
                .bind(&review.review)
                .bind(rating)
                .bind(review.id.to_db())
                .execute(ex.conn())
                .await
                .map_err(sqlite::map_sqlx_error)?;
            done.rows_affected()
        }

        #[allow(unused)]
        _ => unreachable!(),
    };

    expect_one_row(rows_affected, "Update")
}

/// Deletes the review `id`.
pub(crate) async fn delete_review(ex: &mut Executor, id: Id) -> DbResult<()> {
    let rows_affected = match ex {
        #[cfg(feature = "postgres")]
        Executor::Postgres(ex) => {
            let done = sqlx::query("DELETE FROM reviews WHERE id = $1")
                .bind(id.to_db())
                .execute(ex.conn())
                .await
                .map_err(postgres::map_sqlx_error)?;
            done.rows_affected()
        }

        #[cfg(any(feature = "sqlite", test))]
        Executor::Sqlite(ex) => {
            let done = sqlx::query("DELETE FROM reviews WHERE id = ?")
                .bind(id.to_db())
                .execute(ex.conn())
                .await
                .map_err(sqlite::map_sqlx_error)?;
            done.rows_affected()
        }

        #[allow(unused)]
        _ => unreachable!(),
    };

    expect_one_row(rows_affected, "Delete")
}

/// Deletes all reviews written by `user_id` and returns the tours they belonged to.
pub(crate) async fn delete_user_reviews(ex: &mut Executor, user_id: Id) -> DbResult<Vec<Id>> {
    let tour_ids: Vec<String> = match ex {
        #[cfg(feature = "postgres")]
        Executor::Postgres(ex) => {
            let tour_ids = sqlx::query_scalar("SELECT tour_id FROM reviews WHERE user_id = $1")
                .bind(user_id.to_db())
                .fetch_all(ex.conn())
                .await
                .map_err(postgres::map_sqlx_error)?;
            sqlx::query("DELETE FROM reviews WHERE user_id = $1")
                .bind(user_id.to_db())
                .execute(ex.conn())
                .await
                .map_err(postgres::map_sqlx_error)?;
            tour_ids
        }

        #[cfg(any(feature = "sqlite", test))]
        Executor::Sqlite(ex) => {
            let tour_ids = sqlx::query_scalar("SELECT tour_id FROM reviews WHERE user_id = ?")
                .bind(user_id.to_db())
                .fetch_all(ex.conn())
                .await
                .map_err(sqlite::map_sqlx_error)?;
            sqlx::query("DELETE FROM reviews WHERE user_id = ?")
                .bind(user_id.to_db())
                .execute(ex.conn())
                .await
                .map_err(sqlite::map_sqlx_error)?;
            tour_ids
        }

        #[allow(unused)]
        _ => unreachable!(),
    };

    let mut tours = Vec::with_capacity(tour_ids.len());
    for tour_id in tour_ids {
        tours.push(Id::parse(tour_id)?);
    }
    Ok(tours)
}

/// Aggregates the reviews of the tour `tour_id`.
///
/// Returns the number of reviews and the mean of their ratings.  The mean is `None` if no review
/// carries a rating.
pub(crate) async fn get_rating_aggregate(
    ex: &mut Executor,
    tour_id: Id,
) -> DbResult<(u32, Option<f64>)> {
    let (quantity, average): (i64, Option<f64>) = match ex {
        #[cfg(feature = "postgres")]
        Executor::Postgres(ex) => {
            let query_str = "
                SELECT COUNT(*), AVG(rating)::DOUBLE PRECISION
                FROM reviews WHERE tour_id = $1";
            sqlx::query_as(query_str)
                .bind(tour_id.to_db())
                .fetch_one(ex.conn())
                .await
                .map_err(postgres::map_sqlx_error)?
        }

        #[cfg(any(feature = "sqlite", test))]
        Executor::Sqlite(ex) => {
            let query_str = "SELECT COUNT(*), AVG(rating) FROM reviews WHERE tour_id = ?";
            sqlx::query_as(query_str)
                .bind(tour_id.to_db())
                .fetch_one(ex.conn())
                .await
                .map_err(sqlite::map_sqlx_error)?
        }

        #[allow(unused)]
        _ => unreachable!(),
    };

    Ok((to_u32("ratings_quantity", quantity)?, average))
}
