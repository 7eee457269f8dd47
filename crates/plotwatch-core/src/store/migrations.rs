use sqlx::sqlite::SqlitePool;
use std::fmt;

#[derive(Clone, Debug)]
pub struct Migration {
    version: i32,
    up: &'static str,
    down: &'static str,
}

impl Migration {
    pub const fn new(version: i32, up: &'static str, down: &'static str) -> Self {
        Self { version, up, down }
    }

    pub fn version(&self) -> i32 {
        self.version
    }
}

impl fmt::Display for Migration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Migration {}", self.version)
    }
}

pub const MIGRATIONS: &[Migration] = &[
    Migration::new(
        1,
        r#"
        CREATE TABLE IF NOT EXISTS listings (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            link TEXT NOT NULL,
            title TEXT NOT NULL,
            location_text TEXT NOT NULL,
            price_at_first_find TEXT,
            date_first_found TEXT,
            date_last_updated TEXT NOT NULL,
            price_last_updated TEXT NOT NULL,
            distance_km REAL,
            active BOOLEAN NOT NULL DEFAULT 1,
            latitude REAL,
            longitude REAL
        )
        "#,
        "DROP TABLE IF EXISTS listings",
    ),
    Migration::new(
        2,
        "CREATE INDEX IF NOT EXISTS idx_listings_link ON listings (link)",
        "DROP INDEX IF EXISTS idx_listings_link",
    ),
];

pub async fn apply_migrations(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    sqlx::query(
        "CREATE TABLE IF NOT EXISTS migrations (
            version INTEGER PRIMARY KEY,
            applied_at DATETIME NOT NULL
        )",
    )
    .execute(pool)
    .await?;

    let applied_versions = applied_versions(pool).await?;

    for migration in MIGRATIONS {
        if !applied_versions.contains(&migration.version) {
            let mut tx = pool.begin().await?;
            sqlx::query(migration.up).execute(&mut *tx).await?;
            sqlx::query("INSERT INTO migrations (version, applied_at) VALUES (?, ?)")
                .bind(migration.version)
                .bind(chrono::Utc::now())
                .execute(&mut *tx)
                .await?;
            tx.commit().await?;
        }
    }

    Ok(())
}

/// Reverts `version`, which must be the latest applied migration.
pub async fn rollback_migration(pool: &SqlitePool, version: i32) -> Result<(), sqlx::Error> {
    let migration = MIGRATIONS
        .iter()
        .find(|m| m.version == version)
        .ok_or_else(|| sqlx::Error::Decode("Migration not found".into()))?;
    if applied_versions(pool).await?.last() != Some(&version) {
        return Err(sqlx::Error::Decode(
            format!("{} is not the latest applied migration", migration).into(),
        ));
    }

    let mut tx = pool.begin().await?;
    sqlx::query(migration.down).execute(&mut *tx).await?;
    sqlx::query("DELETE FROM migrations WHERE version = ?")
        .bind(version)
        .execute(&mut *tx)
        .await?;
    tx.commit().await?;

    Ok(())
}

pub async fn applied_versions(pool: &SqlitePool) -> Result<Vec<i32>, sqlx::Error> {
    sqlx::query_scalar("SELECT version FROM migrations ORDER BY version")
        .fetch_all(pool)
        .await
}
