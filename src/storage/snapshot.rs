//! On-disk vector index snapshots
//!
//! A snapshot is two blobs (zstd-compressed f32 vectors and a JSON id list)
//! bound together by `manifest.json`. Every file is written to a temp path,
//! synced, then renamed into place, and the manifest goes last: until its
//! rename lands, readers keep resolving the previous generation's pair.
//! Writers in separate processes are serialized by an exclusive lock on
//! `write.lock` in the snapshot directory.

use chrono::Utc;
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;
use uuid::Uuid;

/// Manifest layout version
pub const SNAPSHOT_FORMAT_VERSION: u32 = 1;

const MANIFEST_FILE: &str = "manifest.json";
const LOCK_FILE: &str = "write.lock";

#[derive(Error, Debug)]
pub enum SnapshotError {
    #[error("No snapshot at {0}")]
    Missing(PathBuf),

    #[error("Corrupt snapshot: {0}")]
    Corrupt(String),

    #[error("IO error: {context}: {source}")]
    Io {
        source: std::io::Error,
        context: String,
    },
}

/// Describes the blob pair of one persisted generation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotManifest {
    pub format_version: u32,
    pub generation: u64,
    pub model: String,
    pub dimension: usize,
    pub count: usize,
    pub vectors_file: String,
    pub ids_file: String,
    /// BLAKE3 of the vectors blob as written
    pub vectors_hash: String,
    /// BLAKE3 of the ids blob as written
    pub ids_hash: String,
    pub created_at: String,
}

/// Raw snapshot contents, as read from or written to disk
#[derive(Debug, Clone, PartialEq)]
pub struct SnapshotData {
    pub model: String,
    pub dimension: usize,
    pub ids: Vec<i64>,
    pub vectors: Vec<Vec<f32>>,
}

/// Directory-backed snapshot storage
pub struct SnapshotStore {
    dir: PathBuf,
}

impl SnapshotStore {
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn manifest_path(&self) -> PathBuf {
        self.dir.join(MANIFEST_FILE)
    }

    /// Block until this process holds the directory's writer lock
    ///
    /// The lock is released when the returned file is dropped.
    fn lock_writer(&self) -> Result<fs::File, SnapshotError> {
        let path = self.dir.join(LOCK_FILE);
        let file = fs::OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&path)
            .map_err(|e| SnapshotError::Io {
                source: e,
                context: format!("Failed to open lock file: {}", path.display()),
            })?;
        file.lock_exclusive().map_err(|e| SnapshotError::Io {
            source: e,
            context: format!("Failed to lock {}", path.display()),
        })?;
        Ok(file)
    }

    /// Check whether a manifest has been committed
    pub fn exists(&self) -> bool {
        self.manifest_path().exists()
    }

    /// Read the committed manifest, if any
    pub fn manifest(&self) -> Result<Option<SnapshotManifest>, SnapshotError> {
        let path = self.manifest_path();
        if !path.exists() {
            return Ok(None);
        }

        let bytes = read_file(&path)?;
        let manifest: SnapshotManifest = serde_json::from_slice(&bytes)
            .map_err(|e| SnapshotError::Corrupt(format!("unreadable manifest: {}", e)))?;

        if manifest.format_version != SNAPSHOT_FORMAT_VERSION {
            return Err(SnapshotError::Corrupt(format!(
                "unsupported format version {}",
                manifest.format_version
            )));
        }

        Ok(Some(manifest))
    }

    /// Persist a snapshot as a new generation
    ///
    /// Returns the committed manifest. On error the previous manifest and its
    /// blobs are left untouched.
    pub fn write(&self, data: &SnapshotData) -> Result<SnapshotManifest, SnapshotError> {
        if data.ids.len() != data.vectors.len() {
            return Err(SnapshotError::Corrupt(format!(
                "{} ids for {} vectors",
                data.ids.len(),
                data.vectors.len()
            )));
        }

        fs::create_dir_all(&self.dir).map_err(|e| SnapshotError::Io {
            source: e,
            context: format!("Failed to create index directory: {}", self.dir.display()),
        })?;

        let _lock = self.lock_writer()?;

        // A corrupt manifest must not block a rebuild
        let previous = self.manifest().ok().flatten();
        let generation = previous.as_ref().map(|m| m.generation + 1).unwrap_or(1);

        let vectors_bytes = encode_vectors(&data.vectors, data.dimension)?;
        let ids_bytes = serde_json::to_vec(&data.ids)
            .map_err(|e| SnapshotError::Corrupt(format!("Failed to encode ids: {}", e)))?;

        let vectors_file = format!("vectors-{}.bin", generation);
        let ids_file = format!("ids-{}.json", generation);

        write_atomic(&self.dir.join(&vectors_file), &vectors_bytes)?;
        write_atomic(&self.dir.join(&ids_file), &ids_bytes)?;

        let manifest = SnapshotManifest {
            format_version: SNAPSHOT_FORMAT_VERSION,
            generation,
            model: data.model.clone(),
            dimension: data.dimension,
            count: data.ids.len(),
            vectors_file,
            ids_file,
            vectors_hash: blake3::hash(&vectors_bytes).to_hex().to_string(),
            ids_hash: blake3::hash(&ids_bytes).to_hex().to_string(),
            created_at: Utc::now().to_rfc3339(),
        };

        let manifest_bytes = serde_json::to_vec_pretty(&manifest)
            .map_err(|e| SnapshotError::Corrupt(format!("Failed to encode manifest: {}", e)))?;
        write_atomic(&self.manifest_path(), &manifest_bytes)?;

        self.remove_stale_generations(generation);

        tracing::debug!(
            "Committed snapshot generation {} ({} vectors) in {}",
            generation,
            manifest.count,
            self.dir.display()
        );

        Ok(manifest)
    }

    /// Read and verify the committed snapshot
    pub fn read(&self) -> Result<SnapshotData, SnapshotError> {
        let manifest = self
            .manifest()?
            .ok_or_else(|| SnapshotError::Missing(self.dir.clone()))?;

        let vectors_bytes = read_file(&self.dir.join(&manifest.vectors_file))?;
        let ids_bytes = read_file(&self.dir.join(&manifest.ids_file))?;

        if blake3::hash(&vectors_bytes).to_hex().as_str() != manifest.vectors_hash {
            return Err(SnapshotError::Corrupt(format!(
                "checksum mismatch for {}",
                manifest.vectors_file
            )));
        }
        if blake3::hash(&ids_bytes).to_hex().as_str() != manifest.ids_hash {
            return Err(SnapshotError::Corrupt(format!(
                "checksum mismatch for {}",
                manifest.ids_file
            )));
        }

        let ids: Vec<i64> = serde_json::from_slice(&ids_bytes)
            .map_err(|e| SnapshotError::Corrupt(format!("unreadable id list: {}", e)))?;
        let vectors = decode_vectors(&vectors_bytes, manifest.dimension)?;

        if ids.len() != manifest.count || vectors.len() != manifest.count {
            return Err(SnapshotError::Corrupt(format!(
                "manifest lists {} entries, found {} ids and {} vectors",
                manifest.count,
                ids.len(),
                vectors.len()
            )));
        }

        let mut seen = HashSet::with_capacity(ids.len());
        if let Some(dup) = ids.iter().find(|id| !seen.insert(**id)) {
            return Err(SnapshotError::Corrupt(format!("duplicate id {}", dup)));
        }

        Ok(SnapshotData {
            model: manifest.model,
            dimension: manifest.dimension,
            ids,
            vectors,
        })
    }

    /// Remove blob files that belong to neither the current nor the previous generation
    ///
    /// Runs under the writer lock, so any temp file left is from a writer that died.
    fn remove_stale_generations(&self, current: u64) {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) => {
                tracing::warn!("Failed to list index directory for cleanup: {}", e);
                return;
            }
        };

        for entry in entries.flatten() {
            let name = entry.file_name();
            let Some(name_str) = name.to_str() else {
                continue;
            };

            let stale = if name_str.ends_with(".tmp") {
                true
            } else {
                match blob_generation(name_str) {
                    Some(generation) => generation + 1 < current,
                    None => false,
                }
            };

            if stale {
                if let Err(e) = fs::remove_file(entry.path()) {
                    tracing::warn!("Failed to remove stale snapshot file {:?}: {}", name, e);
                }
            }
        }
    }
}

/// Parse the generation out of `vectors-<n>.bin` / `ids-<n>.json`
fn blob_generation(name: &str) -> Option<u64> {
    let rest = name
        .strip_prefix("vectors-")
        .and_then(|r| r.strip_suffix(".bin"))
        .or_else(|| name.strip_prefix("ids-").and_then(|r| r.strip_suffix(".json")))?;
    rest.parse().ok()
}

fn encode_vectors(vectors: &[Vec<f32>], dimension: usize) -> Result<Vec<u8>, SnapshotError> {
    let mut raw = Vec::with_capacity(vectors.len() * dimension * 4);
    for (row, vector) in vectors.iter().enumerate() {
        if vector.len() != dimension {
            return Err(SnapshotError::Corrupt(format!(
                "vector {} has {} dimensions, expected {}",
                row,
                vector.len(),
                dimension
            )));
        }
        for value in vector {
            raw.extend_from_slice(&value.to_le_bytes());
        }
    }

    zstd::encode_all(&raw[..], 3).map_err(|e| SnapshotError::Io {
        source: e,
        context: "Failed to compress vectors".to_string(),
    })
}

fn decode_vectors(bytes: &[u8], dimension: usize) -> Result<Vec<Vec<f32>>, SnapshotError> {
    if dimension == 0 {
        return Err(SnapshotError::Corrupt("zero dimension".to_string()));
    }

    let raw = zstd::decode_all(bytes)
        .map_err(|e| SnapshotError::Corrupt(format!("undecodable vectors blob: {}", e)))?;

    let row_bytes = dimension
        .checked_mul(4)
        .ok_or_else(|| SnapshotError::Corrupt(format!("dimension {} out of range", dimension)))?;
    if raw.len() % row_bytes != 0 {
        return Err(SnapshotError::Corrupt(format!(
            "vectors blob of {} bytes is not a whole number of {}-dimension rows",
            raw.len(),
            dimension
        )));
    }

    Ok(raw
        .chunks_exact(row_bytes)
        .map(|row| {
            row.chunks_exact(4)
                .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
                .collect()
        })
        .collect())
}

fn read_file(path: &Path) -> Result<Vec<u8>, SnapshotError> {
    fs::read(path).map_err(|e| SnapshotError::Io {
        source: e,
        context: format!("Failed to read {}", path.display()),
    })
}

/// Write to a uniquely named sibling temp file, sync, then rename over `path`
fn write_atomic(path: &Path, data: &[u8]) -> Result<(), SnapshotError> {
    let mut temp_name = path.as_os_str().to_owned();
    temp_name.push(format!(".{}.tmp", Uuid::new_v4().simple()));
    let temp_path = PathBuf::from(temp_name);

    let result = write_and_rename(&temp_path, path, data);
    if result.is_err() {
        let _ = fs::remove_file(&temp_path);
    }
    result
}

fn write_and_rename(temp_path: &Path, path: &Path, data: &[u8]) -> Result<(), SnapshotError> {
    let mut file = fs::File::create(&temp_path).map_err(|e| SnapshotError::Io {
        source: e,
        context: format!("Failed to create temp file: {}", temp_path.display()),
    })?;
    file.write_all(data).map_err(|e| SnapshotError::Io {
        source: e,
        context: format!("Failed to write temp file: {}", temp_path.display()),
    })?;
    file.sync_all().map_err(|e| SnapshotError::Io {
        source: e,
        context: format!("Failed to sync temp file: {}", temp_path.display()),
    })?;
    drop(file);

    fs::rename(temp_path, path).map_err(|e| SnapshotError::Io {
        source: e,
        context: format!(
            "Failed to rename {} -> {}",
            temp_path.display(),
            path.display()
        ),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn sample(model: &str) -> SnapshotData {
        SnapshotData {
            model: model.to_string(),
            dimension: 3,
            ids: vec![10, 20, 30],
            vectors: vec![
                vec![1.0, 0.0, 0.0],
                vec![0.25, -0.5, 0.125],
                vec![f32::MIN_POSITIVE, 3.5, -7.0],
            ],
        }
    }

    #[test]
    fn test_round_trip_is_exact() {
        let temp = TempDir::new().unwrap();
        let store = SnapshotStore::new(temp.path().join("index"));

        let data = sample("test-model");
        let manifest = store.write(&data).unwrap();
        assert_eq!(manifest.generation, 1);
        assert_eq!(manifest.count, 3);

        let loaded = SnapshotStore::new(temp.path().join("index")).read().unwrap();
        assert_eq!(loaded, data);
    }

    #[test]
    fn test_missing_snapshot() {
        let temp = TempDir::new().unwrap();
        let store = SnapshotStore::new(temp.path().join("index"));

        assert!(!store.exists());
        assert!(store.manifest().unwrap().is_none());
        assert!(matches!(store.read(), Err(SnapshotError::Missing(_))));
    }

    #[test]
    fn test_length_mismatch_rejected_on_write() {
        let temp = TempDir::new().unwrap();
        let store = SnapshotStore::new(temp.path().to_path_buf());

        let mut data = sample("test-model");
        data.ids.pop();
        assert!(store.write(&data).is_err());
        assert!(!store.exists());
    }

    #[test]
    fn test_tampered_blob_detected() {
        let temp = TempDir::new().unwrap();
        let store = SnapshotStore::new(temp.path().to_path_buf());
        let manifest = store.write(&sample("test-model")).unwrap();

        fs::write(temp.path().join(&manifest.ids_file), b"[10,20]").unwrap();

        assert!(matches!(store.read(), Err(SnapshotError::Corrupt(_))));
    }

    #[test]
    fn test_garbage_manifest_is_corrupt() {
        let temp = TempDir::new().unwrap();
        let store = SnapshotStore::new(temp.path().to_path_buf());
        fs::write(temp.path().join(MANIFEST_FILE), b"not json").unwrap();

        assert!(matches!(store.read(), Err(SnapshotError::Corrupt(_))));

        // A rebuild still goes through and replaces it
        store.write(&sample("test-model")).unwrap();
        assert_eq!(store.read().unwrap().ids, vec![10, 20, 30]);
    }

    #[test]
    fn test_new_generation_replaces_old() {
        let temp = TempDir::new().unwrap();
        let store = SnapshotStore::new(temp.path().to_path_buf());

        store.write(&sample("test-model")).unwrap();
        let second = SnapshotData {
            model: "test-model".to_string(),
            dimension: 3,
            ids: vec![5],
            vectors: vec![vec![0.0, 1.0, 0.0]],
        };
        let manifest = store.write(&second).unwrap();

        assert_eq!(manifest.generation, 2);
        assert_eq!(store.read().unwrap(), second);
    }

    #[test]
    fn test_stale_generations_removed() {
        let temp = TempDir::new().unwrap();
        let store = SnapshotStore::new(temp.path().to_path_buf());

        for _ in 0..4 {
            store.write(&sample("test-model")).unwrap();
        }

        assert!(!temp.path().join("vectors-1.bin").exists());
        assert!(!temp.path().join("ids-2.json").exists());
        assert!(temp.path().join("vectors-3.bin").exists());
        assert!(temp.path().join("ids-4.json").exists());
        let leftovers: Vec<_> = fs::read_dir(temp.path())
            .unwrap()
            .flatten()
            .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[test]
    fn test_failed_write_keeps_previous_generation() {
        let temp = TempDir::new().unwrap();
        let store = SnapshotStore::new(temp.path().to_path_buf());
        let first = sample("test-model");
        store.write(&first).unwrap();

        // Renaming the generation 2 vectors blob into place now fails
        fs::create_dir(temp.path().join("vectors-2.bin")).unwrap();

        let second = SnapshotData {
            model: "test-model".to_string(),
            dimension: 3,
            ids: vec![5],
            vectors: vec![vec![0.0, 1.0, 0.0]],
        };
        assert!(matches!(store.write(&second), Err(SnapshotError::Io { .. })));

        assert_eq!(store.manifest().unwrap().unwrap().generation, 1);
        assert_eq!(store.read().unwrap(), first);
    }

    #[test]
    fn test_oversized_manifest_dimension_is_corrupt() {
        let temp = TempDir::new().unwrap();
        let store = SnapshotStore::new(temp.path().to_path_buf());
        let mut manifest = store.write(&sample("test-model")).unwrap();

        manifest.dimension = usize::MAX / 4 + 1;
        fs::write(
            temp.path().join(MANIFEST_FILE),
            serde_json::to_vec(&manifest).unwrap(),
        )
        .unwrap();

        assert!(matches!(store.read(), Err(SnapshotError::Corrupt(_))));
    }

    #[test]
    fn test_concurrent_writers_commit_whole_generations() {
        let temp = TempDir::new().unwrap();
        let dir = temp.path().join("index");

        let writers: Vec<_> = (0..4)
            .map(|w| {
                let dir = dir.clone();
                std::thread::spawn(move || {
                    // Separate stores open separate lock handles, as separate processes do
                    let store = SnapshotStore::new(dir);
                    for _ in 0..5 {
                        let data = SnapshotData {
                            model: "test-model".to_string(),
                            dimension: 2,
                            ids: vec![w],
                            vectors: vec![vec![w as f32, 1.0]],
                        };
                        store.write(&data).unwrap();
                    }
                })
            })
            .collect();
        for writer in writers {
            writer.join().unwrap();
        }

        let store = SnapshotStore::new(dir);
        assert_eq!(store.manifest().unwrap().unwrap().generation, 20);
        let data = store.read().unwrap();
        assert_eq!(data.vectors, vec![vec![data.ids[0] as f32, 1.0]]);
    }

    #[test]
    fn test_blob_generation_parsing() {
        assert_eq!(blob_generation("vectors-12.bin"), Some(12));
        assert_eq!(blob_generation("ids-3.json"), Some(3));
        assert_eq!(blob_generation("manifest.json"), None);
        assert_eq!(blob_generation("vectors-x.bin"), None);
    }
}
