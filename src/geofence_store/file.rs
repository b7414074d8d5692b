//! Flat JSON file backend
//!
//! Layout: `<data_dir>/<video_id>.json`, one [`GeofenceDocument`] each.

use super::GeofenceStore;
use crate::error::{Error, Result};
use crate::geofence::{validate_video_id, GeofenceDocument, Polygon};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::fs;

/// File-backed geofence store
pub struct FileGeofenceStore {
    data_dir: PathBuf,
}

impl FileGeofenceStore {
    /// Create store, making `data_dir` if needed
    pub async fn new(data_dir: impl Into<PathBuf>) -> Result<Self> {
        let data_dir = data_dir.into();
        fs::create_dir_all(&data_dir).await.map_err(|e| {
            Error::Storage(format!(
                "cannot create polygon dir {}: {}",
                data_dir.display(),
                e
            ))
        })?;
        Ok(Self { data_dir })
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    fn document_path(&self, video_id: &str) -> PathBuf {
        self.data_dir.join(format!("{}.json", video_id))
    }
}

#[async_trait]
impl GeofenceStore for FileGeofenceStore {
    async fn save(&self, video_id: &str, polygons: Vec<Polygon>) -> Result<()> {
        validate_video_id(video_id)?;
        let doc = GeofenceDocument::new(video_id, &polygons);
        let body = serde_json::to_vec_pretty(&doc)?;

        let path = self.document_path(video_id);
        let tmp = self
            .data_dir
            .join(format!(".{}.{}.tmp", video_id, uuid::Uuid::new_v4()));

        fs::write(&tmp, &body)
            .await
            .map_err(|e| Error::Storage(format!("write {}: {}", tmp.display(), e)))?;
        if let Err(e) = fs::rename(&tmp, &path).await {
            let _ = fs::remove_file(&tmp).await;
            return Err(Error::Storage(format!("replace {}: {}", path.display(), e)));
        }

        tracing::debug!(
            video_id = %video_id,
            polygons = polygons.len(),
            path = %path.display(),
            "Geofence saved"
        );
        Ok(())
    }

    async fn get(&self, video_id: &str) -> Result<Vec<Polygon>> {
        validate_video_id(video_id)?;
        let path = self.document_path(video_id);

        let raw = match fs::read_to_string(&path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(Error::Storage(format!("read {}: {}", path.display(), e)));
            }
        };

        Ok(GeofenceDocument::decode(video_id, &raw)?.into_polygons())
    }

    async fn delete(&self, video_id: &str) -> Result<()> {
        validate_video_id(video_id)?;
        let path = self.document_path(video_id);
        match fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Error::Storage(format!("delete {}: {}", path.display(), e))),
        }
    }

    fn backend(&self) -> &'static str {
        "file"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square(size: f64) -> Polygon {
        Polygon::from(vec![(0.0, 0.0), (size, 0.0), (size, size), (0.0, size)])
    }

    #[tokio::test]
    async fn test_round_trip_preserves_order() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileGeofenceStore::new(dir.path()).await.unwrap();

        let polys = vec![
            square(10.0),
            Polygon::from(vec![(3.5, 1.25), (9.0, 2.0), (4.0, 8.75)]),
        ];
        store.save("dock.mp4", polys.clone()).await.unwrap();

        assert_eq!(store.get("dock.mp4").await.unwrap(), polys);
        assert!(dir.path().join("dock.mp4.json").exists());
    }

    #[tokio::test]
    async fn test_missing_is_empty_and_delete_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileGeofenceStore::new(dir.path()).await.unwrap();

        assert!(store.get("nope").await.unwrap().is_empty());
        store.delete("nope").await.unwrap();

        store.save("nope", vec![square(1.0)]).await.unwrap();
        store.delete("nope").await.unwrap();
        assert!(store.get("nope").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_overwrite_leaves_no_temp_files() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileGeofenceStore::new(dir.path()).await.unwrap();

        store.save("v", vec![square(1.0), square(2.0)]).await.unwrap();
        store.save("v", vec![square(3.0)]).await.unwrap();
        assert_eq!(store.get("v").await.unwrap(), vec![square(3.0)]);

        let names: Vec<String> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["v.json".to_string()]);
    }

    #[tokio::test]
    async fn test_reads_legacy_document() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("legacy.json"),
            r#"{"video_name":"legacy","polygons":[{"points":[{"x":1,"y":1},{"x":5,"y":1},{"x":3,"y":4}]}]}"#,
        )
        .unwrap();
        let store = FileGeofenceStore::new(dir.path()).await.unwrap();

        let polys = store.get("legacy").await.unwrap();
        assert_eq!(polys.len(), 1);
        assert_eq!(polys[0].points[2].y, 4.0);
    }

    #[tokio::test]
    async fn test_corrupt_document_is_malformed() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("bad.json"), "{\"polygons\": 3").unwrap();
        let store = FileGeofenceStore::new(dir.path()).await.unwrap();

        let err = store.get("bad").await.unwrap_err();
        assert!(matches!(err, Error::MalformedGeofence { .. }));
    }

    #[tokio::test]
    async fn test_rejects_path_like_ids() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileGeofenceStore::new(dir.path()).await.unwrap();
        let err = store.save("../escape", vec![square(1.0)]).await.unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }
}
