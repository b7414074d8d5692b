//! GeofenceStore - Per-Video Forbidden Zone Persistence
//!
//! ## Responsibilities
//!
//! - `save` replaces a video's whole polygon set in one step
//! - `get` returns the current set, empty when none exists
//! - `delete` removes the entry, succeeding when nothing was stored
//!
//! ## Backends
//!
//! - [`MemoryGeofenceStore`] - process-local map
//! - [`FileGeofenceStore`] - one JSON document per video id
//! - [`MySqlGeofenceStore`] - document table keyed by video id
//!
//! Readers always observe a complete prior write: the memory store swaps
//! the whole `Vec` under a lock, the file store renames a finished temp
//! file over the old one, the MySQL store writes one row per statement.

mod file;
mod mysql;

pub use file::FileGeofenceStore;
pub use mysql::MySqlGeofenceStore;

use crate::error::Result;
use crate::geofence::{validate_video_id, Polygon};
use async_trait::async_trait;
use std::collections::HashMap;
use std::str::FromStr;
use tokio::sync::RwLock;

/// Storage capability for geofence sets
#[async_trait]
pub trait GeofenceStore: Send + Sync {
    /// Replace the polygon set for `video_id`
    async fn save(&self, video_id: &str, polygons: Vec<Polygon>) -> Result<()>;

    /// Current polygon set, empty if none was saved
    async fn get(&self, video_id: &str) -> Result<Vec<Polygon>>;

    /// Remove the polygon set
    async fn delete(&self, video_id: &str) -> Result<()>;

    /// Backend name for logs and diagnostics
    fn backend(&self) -> &'static str;
}

/// Backend selector read from configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GeofenceBackend {
    Memory,
    File,
    MySql,
}

impl FromStr for GeofenceBackend {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "memory" => Ok(Self::Memory),
            "file" | "json" => Ok(Self::File),
            "mysql" | "db" => Ok(Self::MySql),
            other => Err(format!("unknown geofence backend: {}", other)),
        }
    }
}

/// In-memory store
#[derive(Default)]
pub struct MemoryGeofenceStore {
    fences: RwLock<HashMap<String, Vec<Polygon>>>,
}

impl MemoryGeofenceStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl GeofenceStore for MemoryGeofenceStore {
    async fn save(&self, video_id: &str, polygons: Vec<Polygon>) -> Result<()> {
        validate_video_id(video_id)?;
        self.fences
            .write()
            .await
            .insert(video_id.to_string(), polygons);
        Ok(())
    }

    async fn get(&self, video_id: &str) -> Result<Vec<Polygon>> {
        Ok(self
            .fences
            .read()
            .await
            .get(video_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn delete(&self, video_id: &str) -> Result<()> {
        self.fences.write().await.remove(video_id);
        Ok(())
    }

    fn backend(&self) -> &'static str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn triangle(offset: f64) -> Polygon {
        Polygon::from(vec![
            (offset, offset),
            (offset + 10.0, offset),
            (offset + 5.0, offset + 10.0),
        ])
    }

    #[test]
    fn test_backend_from_str() {
        assert_eq!("file".parse::<GeofenceBackend>().unwrap(), GeofenceBackend::File);
        assert_eq!("MySQL".parse::<GeofenceBackend>().unwrap(), GeofenceBackend::MySql);
        assert_eq!(" memory ".parse::<GeofenceBackend>().unwrap(), GeofenceBackend::Memory);
        assert!("firestore".parse::<GeofenceBackend>().is_err());
    }

    #[tokio::test]
    async fn test_memory_round_trip() {
        let store = MemoryGeofenceStore::new();
        let polys = vec![triangle(0.0), triangle(50.0)];
        store.save("gate.mp4", polys.clone()).await.unwrap();
        assert_eq!(store.get("gate.mp4").await.unwrap(), polys);
    }

    #[tokio::test]
    async fn test_memory_unknown_is_empty() {
        let store = MemoryGeofenceStore::new();
        assert!(store.get("nothing").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_memory_overwrite_and_delete() {
        let store = MemoryGeofenceStore::new();
        store.save("a", vec![triangle(0.0), triangle(1.0)]).await.unwrap();
        store.save("a", vec![triangle(7.0)]).await.unwrap();
        assert_eq!(store.get("a").await.unwrap(), vec![triangle(7.0)]);

        store.delete("a").await.unwrap();
        assert!(store.get("a").await.unwrap().is_empty());
        // deleting again is fine
        store.delete("a").await.unwrap();
    }
}
