//! MySQL document backend
//!
//! Each video id owns one row holding the serialized [`GeofenceDocument`].

use super::GeofenceStore;
use crate::error::{Error, Result};
use crate::geofence::{validate_video_id, GeofenceDocument, Polygon};
use async_trait::async_trait;
use sqlx::{MySqlPool, Row};

/// MySQL-backed geofence store
#[derive(Clone)]
pub struct MySqlGeofenceStore {
    pool: MySqlPool,
}

impl MySqlGeofenceStore {
    /// Create store and make sure the table exists
    pub async fn new(pool: MySqlPool) -> Result<Self> {
        let store = Self { pool };
        store.ensure_schema().await?;
        Ok(store)
    }

    async fn ensure_schema(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS geofences (
                video_id VARCHAR(255) NOT NULL PRIMARY KEY,
                document LONGTEXT NOT NULL,
                updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
                    ON UPDATE CURRENT_TIMESTAMP
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(storage_err)?;
        Ok(())
    }
}

fn storage_err(e: sqlx::Error) -> Error {
    Error::Storage(format!("geofence table: {}", e))
}

#[async_trait]
impl GeofenceStore for MySqlGeofenceStore {
    async fn save(&self, video_id: &str, polygons: Vec<Polygon>) -> Result<()> {
        validate_video_id(video_id)?;
        let document = serde_json::to_string(&GeofenceDocument::new(video_id, &polygons))?;

        sqlx::query(
            r#"
            INSERT INTO geofences (video_id, document) VALUES (?, ?)
            ON DUPLICATE KEY UPDATE document = VALUES(document)
            "#,
        )
        .bind(video_id)
        .bind(&document)
        .execute(&self.pool)
        .await
        .map_err(storage_err)?;

        tracing::debug!(video_id = %video_id, polygons = polygons.len(), "Geofence saved");
        Ok(())
    }

    async fn get(&self, video_id: &str) -> Result<Vec<Polygon>> {
        let row = sqlx::query("SELECT document FROM geofences WHERE video_id = ?")
            .bind(video_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(storage_err)?;

        match row {
            Some(row) => {
                let raw: String = row.try_get("document").map_err(storage_err)?;
                Ok(GeofenceDocument::decode(video_id, &raw)?.into_polygons())
            }
            None => Ok(Vec::new()),
        }
    }

    async fn delete(&self, video_id: &str) -> Result<()> {
        sqlx::query("DELETE FROM geofences WHERE video_id = ?")
            .bind(video_id)
            .execute(&self.pool)
            .await
            .map_err(storage_err)?;
        Ok(())
    }

    fn backend(&self) -> &'static str {
        "mysql"
    }
}
