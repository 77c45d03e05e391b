//! Favorites collection.
//!
//! One row per story id. Writes surface every failure; reads come in two
//! flavours: `try_*` returns the store error, the plain variant degrades to
//! an empty/false answer.

use super::connection::Store;
use super::timestamp_column;
use crate::Error;
use crate::model::{Favorite, Story, format_timestamp};
use chrono::Utc;
use tokio_rusqlite::rusqlite::{self, ErrorCode, Row};
use tokio_rusqlite::params;

const FAVORITE_COLUMNS: &str = "id, name, description, photo_url, lat, lon, created_at, favorited_at";

/// Field to order favorites by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FavoriteSort {
    #[default]
    CreatedAt,
    FavoritedAt,
    Name,
}

impl FavoriteSort {
    fn column(self) -> &'static str {
        match self {
            FavoriteSort::CreatedAt => "created_at",
            FavoriteSort::FavoritedAt => "favorited_at",
            FavoriteSort::Name => "name",
        }
    }
}

impl std::str::FromStr for FavoriteSort {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "createdAt" | "created_at" => Ok(FavoriteSort::CreatedAt),
            "favoritedAt" | "favorited_at" => Ok(FavoriteSort::FavoritedAt),
            "name" => Ok(FavoriteSort::Name),
            other => Err(Error::InvalidInput(format!("unknown sort field: {other}"))),
        }
    }
}

/// Sort direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortOrder {
    Asc,
    #[default]
    Desc,
}

impl SortOrder {
    fn keyword(self) -> &'static str {
        match self {
            SortOrder::Asc => "ASC",
            SortOrder::Desc => "DESC",
        }
    }
}

impl std::str::FromStr for SortOrder {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "asc" => Ok(SortOrder::Asc),
            "desc" => Ok(SortOrder::Desc),
            other => Err(Error::InvalidInput(format!("unknown sort order: {other}"))),
        }
    }
}

fn favorite_from_row(row: &Row<'_>) -> rusqlite::Result<Favorite> {
    Ok(Favorite {
        story: Story {
            id: row.get(0)?,
            name: row.get(1)?,
            description: row.get(2)?,
            photo_url: row.get(3)?,
            lat: row.get(4)?,
            lon: row.get(5)?,
            created_at: timestamp_column(row, 6)?,
        },
        favorited_at: timestamp_column(row, 7)?,
    })
}

fn is_constraint_violation(err: &rusqlite::Error) -> bool {
    matches!(err, rusqlite::Error::SqliteFailure(e, _) if e.code == ErrorCode::ConstraintViolation)
}

impl Store {
    /// Store `story` as a favorite, stamping `favorited_at` with the current time.
    ///
    /// # Errors
    ///
    /// Returns `Error::FavoriteExists` if the story id is already a favorite;
    /// the existing record is left unchanged.
    pub async fn add_favorite(&self, story: &Story) -> Result<Favorite, Error> {
        let favorite = Favorite { story: story.clone(), favorited_at: Utc::now() };
        let row = favorite.clone();
        self.conn
            .call(move |conn| -> Result<(), Error> {
                let inserted = conn.execute(
                    &format!("INSERT INTO favorites ({FAVORITE_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)"),
                    params![
                        &row.story.id,
                        &row.story.name,
                        &row.story.description,
                        &row.story.photo_url,
                        &row.story.lat,
                        &row.story.lon,
                        format_timestamp(&row.story.created_at),
                        format_timestamp(&row.favorited_at),
                    ],
                );
                match inserted {
                    Ok(_) => Ok(()),
                    Err(e) if is_constraint_violation(&e) => Err(Error::FavoriteExists(row.story.id.clone())),
                    Err(e) => Err(e.into()),
                }
            })
            .await
            .map_err(Error::from)?;

        tracing::debug!(id = %favorite.story.id, "added favorite");
        Ok(favorite)
    }

    /// Remove a favorite. Removing an id that is not stored is a no-op.
    pub async fn remove_favorite(&self, id: &str) -> Result<(), Error> {
        let id = id.to_string();
        self.conn
            .call(move |conn| -> Result<(), Error> {
                conn.execute("DELETE FROM favorites WHERE id = ?1", params![id])?;
                Ok(())
            })
            .await
            .map_err(Error::from)
    }

    /// All favorites, oldest favorited first.
    pub async fn try_list_favorites(&self) -> Result<Vec<Favorite>, Error> {
        let sql = format!("SELECT {FAVORITE_COLUMNS} FROM favorites ORDER BY favorited_at ASC, id ASC");
        self.query_favorites(sql).await
    }

    /// All favorites; any store failure yields an empty list.
    pub async fn list_favorites(&self) -> Vec<Favorite> {
        self.try_list_favorites().await.unwrap_or_else(|e| {
            tracing::warn!(error = %e, "listing favorites failed; returning empty list");
            Vec::new()
        })
    }

    /// Whether `id` is a favorite, surfacing store failures.
    pub async fn try_is_favorite(&self, id: &str) -> Result<bool, Error> {
        let id = id.to_string();
        self.conn
            .call(move |conn| -> Result<bool, Error> {
                let exists: bool =
                    conn.query_row("SELECT EXISTS(SELECT 1 FROM favorites WHERE id = ?1)", params![id], |row| {
                        row.get(0)
                    })?;
                Ok(exists)
            })
            .await
            .map_err(Error::from)
    }

    /// Whether `id` is a favorite; any store failure yields `false`.
    pub async fn is_favorite(&self, id: &str) -> bool {
        self.try_is_favorite(id).await.unwrap_or_else(|e| {
            tracing::warn!(error = %e, id, "favorite lookup failed; reporting not favorite");
            false
        })
    }

    /// Favorites whose name or description contains `query`, case-insensitively.
    ///
    /// Matching is a plain Unicode substring test; `%` and `_` are literal.
    pub async fn search_favorites(&self, query: &str) -> Vec<Favorite> {
        let needle = query.to_lowercase();
        match self.try_list_favorites().await {
            Ok(favorites) => favorites
                .into_iter()
                .filter(|f| {
                    f.story.name.to_lowercase().contains(&needle) || f.story.description.to_lowercase().contains(&needle)
                })
                .collect(),
            Err(e) => {
                tracing::warn!(error = %e, "searching favorites failed; returning empty list");
                Vec::new()
            }
        }
    }

    /// Favorites ordered by `sort` in `order`.
    pub async fn sorted_favorites(&self, sort: FavoriteSort, order: SortOrder) -> Vec<Favorite> {
        let sql = format!(
            "SELECT {FAVORITE_COLUMNS} FROM favorites ORDER BY {} {}, id {}",
            sort.column(),
            order.keyword(),
            order.keyword()
        );
        self.query_favorites(sql).await.unwrap_or_else(|e| {
            tracing::warn!(error = %e, "sorting favorites failed; returning empty list");
            Vec::new()
        })
    }

    async fn query_favorites(&self, sql: String) -> Result<Vec<Favorite>, Error> {
        self.conn
            .call(move |conn| -> Result<Vec<Favorite>, Error> {
                let mut stmt = conn.prepare(&sql)?;
                let favorites = stmt
                    .query_map([], favorite_from_row)?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                Ok(favorites)
            })
            .await
            .map_err(Error::from)
    }
}
