use anyhow::{Context, Result};
use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
    Pool, Row, Sqlite,
};
use std::{
    collections::HashSet,
    fs,
    path::{Path, PathBuf},
    str::FromStr,
};
use tracing::warn;

use shared::domain::{Trip, TripId};

/// Key holding the serialized array of locally persisted trips.
pub const TRIPS_KEY: &str = "guest_trips";

#[derive(Clone)]
pub struct Storage {
    pool: Pool<Sqlite>,
}

impl Storage {
    pub async fn new(database_url: &str) -> Result<Self> {
        ensure_sqlite_parent_dir_exists(database_url)?;

        let connect_options = SqliteConnectOptions::from_str(database_url)
            .with_context(|| format!("invalid sqlite url '{database_url}'"))?
            .create_if_missing(true);
        // Every connection to `sqlite::memory:` opens its own database, so the
        // in-memory store must stay on one long-lived connection.
        let pool_options = if is_in_memory(database_url) {
            SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            SqlitePoolOptions::new().max_connections(5)
        };
        let pool = pool_options.connect_with(connect_options).await?;
        sqlx::migrate!("./migrations").run(&pool).await?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }

    pub async fn health_check(&self) -> Result<()> {
        let _: i64 = sqlx::query_scalar("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .context("sqlite ping failed")?;
        Ok(())
    }

    pub async fn read_raw(&self, key: &str) -> Result<Option<String>> {
        let row = sqlx::query("SELECT value FROM kv_store WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await
            .with_context(|| format!("failed to read key '{key}'"))?;
        Ok(row.map(|r| r.get::<String, _>(0)))
    }

    pub async fn write_raw(&self, key: &str, value: &str) -> Result<()> {
        sqlx::query(
            "INSERT INTO kv_store (key, value, updated_at) VALUES (?, ?, CURRENT_TIMESTAMP)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = CURRENT_TIMESTAMP",
        )
        .bind(key)
        .bind(value)
        .execute(&self.pool)
        .await
        .with_context(|| format!("failed to write key '{key}'"))?;
        Ok(())
    }

    pub async fn delete_raw(&self, key: &str) -> Result<()> {
        sqlx::query("DELETE FROM kv_store WHERE key = ?")
            .bind(key)
            .execute(&self.pool)
            .await
            .with_context(|| format!("failed to delete key '{key}'"))?;
        Ok(())
    }

    /// Locally persisted trips. Unreadable or corrupt data yields an empty list.
    pub async fn load_trips(&self) -> Vec<Trip> {
        match self.try_load_trips().await {
            Ok(trips) => trips,
            Err(err) => {
                warn!(error = %err, "storage: local trip list unreadable, treating as empty");
                Vec::new()
            }
        }
    }

    /// Like [`Storage::load_trips`], but database failures are returned. Corrupt
    /// JSON is still recovered as an empty list.
    pub async fn try_load_trips(&self) -> Result<Vec<Trip>> {
        let Some(raw) = self.read_raw(TRIPS_KEY).await? else {
            return Ok(Vec::new());
        };

        match serde_json::from_str::<Vec<Trip>>(&raw) {
            Ok(trips) => Ok(trips),
            Err(err) => {
                warn!(
                    error = %err,
                    bytes = raw.len(),
                    "storage: local trip list is corrupt, treating as empty"
                );
                Ok(Vec::new())
            }
        }
    }

    pub async fn save_trips(&self, trips: &[Trip]) -> Result<()> {
        let raw = serde_json::to_string(trips).context("failed to serialize trip list")?;
        self.write_raw(TRIPS_KEY, &raw).await
    }

    /// Replaces the trip with the same id, or appends it.
    pub async fn upsert_trip(&self, trip: &Trip) -> Result<()> {
        let mut trips = self.try_load_trips().await?;
        match trips.iter_mut().find(|existing| existing.id == trip.id) {
            Some(existing) => *existing = trip.clone(),
            None => trips.push(trip.clone()),
        }
        self.save_trips(&trips).await
    }

    pub async fn remove_trip(&self, trip_id: &TripId) -> Result<bool> {
        let mut trips = self.try_load_trips().await?;
        let before = trips.len();
        trips.retain(|trip| &trip.id != trip_id);
        if trips.len() == before {
            return Ok(false);
        }
        self.save_trips(&trips).await?;
        Ok(true)
    }

    /// Removes every trip whose id is in `trip_ids`, leaving trips written since untouched.
    pub async fn remove_trips(&self, trip_ids: &HashSet<TripId>) -> Result<usize> {
        let mut trips = self.try_load_trips().await?;
        let before = trips.len();
        trips.retain(|trip| !trip_ids.contains(&trip.id));
        let removed = before - trips.len();
        if removed == 0 {
            return Ok(0);
        }
        if trips.is_empty() {
            self.clear_trips().await?;
        } else {
            self.save_trips(&trips).await?;
        }
        Ok(removed)
    }

    pub async fn clear_trips(&self) -> Result<()> {
        self.delete_raw(TRIPS_KEY).await
    }
}

fn is_in_memory(database_url: &str) -> bool {
    database_url.starts_with("sqlite::memory:") || database_url.contains("mode=memory")
}

fn ensure_sqlite_parent_dir_exists(database_url: &str) -> Result<()> {
    let Some(path) = sqlite_path(database_url) else {
        return Ok(());
    };

    let Some(parent) = path.parent() else {
        return Ok(());
    };

    fs::create_dir_all(parent).with_context(|| {
        format!(
            "failed to create parent directory '{}' for database url '{database_url}'",
            parent.display()
        )
    })?;

    Ok(())
}

fn sqlite_path(database_url: &str) -> Option<PathBuf> {
    if is_in_memory(database_url) || !database_url.starts_with("sqlite:") {
        return None;
    }

    let path = database_url
        .trim_start_matches("sqlite://")
        .trim_start_matches("sqlite:")
        .split('?')
        .next()
        .unwrap_or_default();

    if path.is_empty() {
        return None;
    }

    Some(Path::new(path).to_path_buf())
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
