use super::migrations::{applied_versions, apply_migrations, rollback_migration};
use super::ListingStore;
use crate::{ListingRecord, Price, Result};
use async_trait::async_trait;
use chrono::NaiveDate;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::{FromRow, Row};
use std::path::{Path, PathBuf};
use tracing::info;

/// The listing set in a SQLite database, one `listings` table.
#[derive(Clone, Debug)]
pub struct SqliteStore {
    pool: SqlitePool,
    path: PathBuf,
}

impl SqliteStore {
    pub async fn open(db_path: impl AsRef<Path>) -> Result<Self> {
        let path = db_path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let options = SqliteConnectOptions::new()
            .filename(&path)
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;
        apply_migrations(&pool).await?;

        Ok(Self { pool, path })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn migration_versions(&self) -> Result<Vec<i32>> {
        Ok(applied_versions(&self.pool).await?)
    }

    /// Reverts the latest applied migration. The next `open` applies it again.
    pub async fn rollback(&self, version: i32) -> Result<()> {
        rollback_migration(&self.pool, version).await?;
        info!("Rolled back migration {} on {}", version, self.path.display());
        Ok(())
    }
}

impl<'r> FromRow<'r, SqliteRow> for ListingRecord {
    fn from_row(row: &'r SqliteRow) -> std::result::Result<Self, sqlx::Error> {
        let price_at_first_find: Option<String> = row.try_get("price_at_first_find")?;
        let price_last_updated: String = row.try_get("price_last_updated")?;
        let date_first_found: Option<NaiveDate> = row.try_get("date_first_found")?;

        Ok(ListingRecord {
            title: row.try_get("title")?,
            location_text: row.try_get("location_text")?,
            price_at_first_find: price_at_first_find.map(|p| p.parse().unwrap_or(Price::Unknown)),
            date_first_found,
            date_last_updated: row.try_get("date_last_updated")?,
            price_last_updated: price_last_updated.parse().unwrap_or(Price::Unknown),
            distance_km: row.try_get("distance_km")?,
            active: row.try_get("active")?,
            link: row.try_get("link")?,
            latitude: row.try_get("latitude")?,
            longitude: row.try_get("longitude")?,
        })
    }
}

#[async_trait]
impl ListingStore for SqliteStore {
    async fn load_all(&self) -> Result<Vec<ListingRecord>> {
        let records = sqlx::query_as::<_, ListingRecord>("SELECT * FROM listings ORDER BY id")
            .fetch_all(&self.pool)
            .await?;
        Ok(records)
    }

    async fn save_all(&self, records: &[ListingRecord]) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM listings").execute(&mut *tx).await?;

        for record in records {
            sqlx::query(
                r#"
                INSERT INTO listings (
                    link, title, location_text, price_at_first_find,
                    date_first_found, date_last_updated, price_last_updated,
                    distance_km, active, latitude, longitude
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&record.link)
            .bind(&record.title)
            .bind(&record.location_text)
            .bind(record.price_at_first_find.as_ref().map(Price::to_string))
            .bind(record.date_first_found)
            .bind(record.date_last_updated)
            .bind(record.price_last_updated.to_string())
            .bind(record.distance_km)
            .bind(record.active)
            .bind(record.latitude)
            .bind(record.longitude)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        info!("Saved {} listings to {}", records.len(), self.path.display());
        Ok(())
    }

    fn describe(&self) -> String {
        format!("SQLite database {}", self.path.display())
    }
}
