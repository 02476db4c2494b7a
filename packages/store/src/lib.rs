#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! On-disk dataset cache.
//!
//! Two scopes share one root directory: `anonymous/` holds datasets saved
//! before login, keyed by a hash of the dataset name, and `cloud/<owner>/`
//! mirrors the owner's server-side datasets, keyed by dataset id. A single
//! `mapping.json` at the root remembers the last attribute mapping the user
//! asked to keep.
//!
//! Layout:
//!
//! ```text
//! <root>/anonymous/<sha256(name)[..16]>.json
//! <root>/cloud/<owner_id>/<dataset_id>.json
//! <root>/mapping.json
//! ```
//!
//! Every write goes to a temp path first and is renamed into place, so an
//! interrupted write never leaves a half-written entry. Reads are lenient:
//! an entry that fails to parse is logged and skipped rather than failing
//! the whole listing.

use std::path::{Path, PathBuf};

use field_sync_models::{CacheEntry, StoredMapping};
use serde::Serialize;
use serde::de::DeserializeOwned;
use sha2::{Digest, Sha256};

/// Errors from cache store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// I/O error reading or writing the cache directory.
    #[error("I/O error at {path}: {source}")]
    Io {
        /// Path that caused the error.
        path: String,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// JSON encode/decode error.
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

/// Derives the file stem for an anonymous entry from its dataset name.
///
/// Dataset names are user-supplied and may contain anything; the first 16
/// hex characters of their SHA-256 keep file names safe and collisions
/// vanishingly unlikely at cache scale.
#[must_use]
pub fn hashed_name(name: &str) -> String {
    let digest = Sha256::digest(name.as_bytes());
    hex::encode(digest)[..16].to_string()
}

/// File-backed cache of dataset snapshots.
pub struct CacheStore {
    root: PathBuf,
}

impl CacheStore {
    /// Creates a store rooted at `root`. Directories are created lazily on
    /// first write.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// The store's root directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn anonymous_dir(&self) -> PathBuf {
        self.root.join("anonymous")
    }

    fn anonymous_path(&self, name: &str) -> PathBuf {
        self.anonymous_dir().join(format!("{}.json", hashed_name(name)))
    }

    fn cloud_dir(&self, owner_id: &str) -> PathBuf {
        self.root.join("cloud").join(owner_id)
    }

    fn mapping_path(&self) -> PathBuf {
        self.root.join("mapping.json")
    }

    // ── Anonymous scope ──────────────────────────────────────────────────────

    /// Writes (or overwrites) an anonymous entry, keyed by its name.
    ///
    /// # Errors
    ///
    /// Returns an error if the entry cannot be serialized or written.
    pub async fn put_anonymous(&self, entry: &CacheEntry) -> Result<(), StoreError> {
        write_json(&self.anonymous_path(&entry.name), entry).await
    }

    /// Reads the anonymous entry stored under `name`, if any.
    ///
    /// # Errors
    ///
    /// Returns an error if the entry exists but cannot be read or parsed.
    pub async fn get_anonymous(&self, name: &str) -> Result<Option<CacheEntry>, StoreError> {
        read_json_opt(&self.anonymous_path(name)).await
    }

    /// Lists every readable anonymous entry, sorted by name.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory exists but cannot be read.
    pub async fn list_anonymous(&self) -> Result<Vec<CacheEntry>, StoreError> {
        list_entries(&self.anonymous_dir()).await
    }

    /// Removes the anonymous entry stored under `name`. Removing an entry
    /// that does not exist is not an error.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be removed.
    pub async fn remove_anonymous(&self, name: &str) -> Result<(), StoreError> {
        remove_file_if_present(&self.anonymous_path(name)).await
    }

    // ── Cloud scope ──────────────────────────────────────────────────────────

    /// Replaces the owner's entire cloud-scope snapshot with `entries`.
    ///
    /// The new snapshot is staged in a sibling directory and swapped in
    /// only once every entry has been written, so a failure mid-write
    /// leaves the previous snapshot intact.
    ///
    /// # Errors
    ///
    /// Returns an error if staging, writing, or the final swap fails.
    pub async fn replace_cloud_snapshot(
        &self,
        owner_id: &str,
        entries: &[CacheEntry],
    ) -> Result<(), StoreError> {
        let dir = self.cloud_dir(owner_id);
        let staging = self.root.join("cloud").join(format!("{owner_id}.staging"));

        remove_dir_if_present(&staging).await?;
        tokio::fs::create_dir_all(&staging)
            .await
            .map_err(|e| StoreError::Io {
                path: staging.display().to_string(),
                source: e,
            })?;

        for entry in entries {
            let path = staging.join(format!("{}.json", entry.id));
            let json = serde_json::to_string(entry)?;
            tokio::fs::write(&path, &json)
                .await
                .map_err(|e| StoreError::Io {
                    path: path.display().to_string(),
                    source: e,
                })?;
        }

        remove_dir_if_present(&dir).await?;
        tokio::fs::rename(&staging, &dir)
            .await
            .map_err(|e| StoreError::Io {
                path: dir.display().to_string(),
                source: e,
            })?;

        log::debug!(
            "replaced cloud snapshot for owner {owner_id} ({} entries)",
            entries.len()
        );
        Ok(())
    }

    /// Lists every readable entry in the owner's cloud scope, sorted by
    /// name.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory exists but cannot be read.
    pub async fn list_cloud(&self, owner_id: &str) -> Result<Vec<CacheEntry>, StoreError> {
        list_entries(&self.cloud_dir(owner_id)).await
    }

    /// Removes the owner's entire cloud scope. Used at logout; a missing
    /// scope is not an error.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory exists but cannot be removed.
    pub async fn clear_cloud_snapshot(&self, owner_id: &str) -> Result<(), StoreError> {
        remove_dir_if_present(&self.cloud_dir(owner_id)).await
    }

    // ── Remembered mapping ───────────────────────────────────────────────────

    /// Loads the remembered attribute mapping, if one was saved.
    ///
    /// A record that fails to parse is logged and treated as absent; a
    /// stale mapping file must never block an upload.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read.
    pub async fn load_mapping(&self) -> Result<Option<StoredMapping>, StoreError> {
        let path = self.mapping_path();
        let json = match tokio::fs::read_to_string(&path).await {
            Ok(json) => json,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(StoreError::Io {
                    path: path.display().to_string(),
                    source: e,
                });
            }
        };

        match serde_json::from_str(&json) {
            Ok(mapping) => Ok(Some(mapping)),
            Err(e) => {
                log::warn!("Ignoring unreadable mapping record at {}: {e}", path.display());
                Ok(None)
            }
        }
    }

    /// Saves the remembered attribute mapping.
    ///
    /// # Errors
    ///
    /// Returns an error if the record cannot be serialized or written.
    pub async fn save_mapping(&self, mapping: &StoredMapping) -> Result<(), StoreError> {
        write_json(&self.mapping_path(), mapping).await
    }

    /// Removes the remembered attribute mapping, if any.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be removed.
    pub async fn clear_mapping(&self) -> Result<(), StoreError> {
        remove_file_if_present(&self.mapping_path()).await
    }
}

/// Serializes `value` and writes it atomically (temp file, then rename).
async fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), StoreError> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| StoreError::Io {
                path: parent.display().to_string(),
                source: e,
            })?;
    }

    let json = serde_json::to_string(value)?;
    let tmp = path.with_extension("json.tmp");

    tokio::fs::write(&tmp, &json)
        .await
        .map_err(|e| StoreError::Io {
            path: tmp.display().to_string(),
            source: e,
        })?;

    // Atomic rename
    tokio::fs::rename(&tmp, path)
        .await
        .map_err(|e| StoreError::Io {
            path: path.display().to_string(),
            source: e,
        })
}

/// Reads and parses a JSON file, mapping "not found" to `None`.
async fn read_json_opt<T: DeserializeOwned>(path: &Path) -> Result<Option<T>, StoreError> {
    let json = match tokio::fs::read_to_string(path).await {
        Ok(json) => json,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => {
            return Err(StoreError::Io {
                path: path.display().to_string(),
                source: e,
            });
        }
    };
    Ok(Some(serde_json::from_str(&json)?))
}

/// Lists every readable `.json` entry under `dir`, sorted by name. A
/// missing directory is an empty listing; a corrupt entry is logged and
/// skipped.
async fn list_entries(dir: &Path) -> Result<Vec<CacheEntry>, StoreError> {
    let mut reader = match tokio::fs::read_dir(dir).await {
        Ok(reader) => reader,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => {
            return Err(StoreError::Io {
                path: dir.display().to_string(),
                source: e,
            });
        }
    };

    let mut entries = Vec::new();
    loop {
        let dirent = reader.next_entry().await.map_err(|e| StoreError::Io {
            path: dir.display().to_string(),
            source: e,
        })?;
        let Some(dirent) = dirent else { break };

        let path = dirent.path();
        if path.extension().is_none_or(|ext| ext != "json") {
            continue;
        }

        match read_json_opt::<CacheEntry>(&path).await {
            Ok(Some(entry)) => entries.push(entry),
            Ok(None) => {}
            Err(e) => {
                log::warn!("Skipping unreadable cache entry {}: {e}", path.display());
            }
        }
    }

    entries.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(entries)
}

/// Removes a file, tolerating "not found".
async fn remove_file_if_present(path: &Path) -> Result<(), StoreError> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(StoreError::Io {
            path: path.display().to_string(),
            source: e,
        }),
    }
}

/// Removes a directory tree, tolerating "not found".
async fn remove_dir_if_present(path: &Path) -> Result<(), StoreError> {
    match tokio::fs::remove_dir_all(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(StoreError::Io {
            path: path.display().to_string(),
            source: e,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use field_sync_models::FieldMapping;
    use geojson::FeatureCollection;
    use std::fs;

    fn temp_store(name: &str) -> (CacheStore, PathBuf) {
        let root = std::env::temp_dir().join(format!("field_sync_store_{name}"));
        let _ = fs::remove_dir_all(&root);
        (CacheStore::new(&root), root)
    }

    fn entry(id: &str, name: &str) -> CacheEntry {
        CacheEntry {
            id: id.to_string(),
            name: name.to_string(),
            geojson: FeatureCollection {
                bbox: None,
                features: Vec::new(),
                foreign_members: None,
            },
            updated_at: Utc::now(),
            feature_count: 0,
        }
    }

    #[test]
    fn hashed_names_are_stable_and_short() {
        assert_eq!(hashed_name("Smith Farm"), hashed_name("Smith Farm"));
        assert_ne!(hashed_name("Smith Farm"), hashed_name("smith farm"));
        assert_eq!(hashed_name("anything").len(), 16);
    }

    #[tokio::test]
    async fn anonymous_entries_roundtrip() {
        let (store, root) = temp_store("anon_roundtrip");

        store.put_anonymous(&entry("a", "Smith Farm")).await.unwrap();
        store.put_anonymous(&entry("b", "Jones Ranch")).await.unwrap();

        let found = store.get_anonymous("Smith Farm").await.unwrap().unwrap();
        assert_eq!(found.id, "a");
        assert!(store.get_anonymous("Unknown").await.unwrap().is_none());

        let listed = store.list_anonymous().await.unwrap();
        assert_eq!(
            listed.iter().map(|e| e.name.as_str()).collect::<Vec<_>>(),
            ["Jones Ranch", "Smith Farm"]
        );

        let _ = fs::remove_dir_all(&root);
    }

    #[tokio::test]
    async fn put_overwrites_same_name() {
        let (store, root) = temp_store("anon_overwrite");

        store.put_anonymous(&entry("a", "Smith Farm")).await.unwrap();
        store.put_anonymous(&entry("b", "Smith Farm")).await.unwrap();

        let listed = store.list_anonymous().await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, "b");

        let _ = fs::remove_dir_all(&root);
    }

    #[tokio::test]
    async fn remove_is_idempotent() {
        let (store, root) = temp_store("anon_remove");

        store.put_anonymous(&entry("a", "Smith Farm")).await.unwrap();
        store.remove_anonymous("Smith Farm").await.unwrap();
        store.remove_anonymous("Smith Farm").await.unwrap();
        assert!(store.list_anonymous().await.unwrap().is_empty());

        let _ = fs::remove_dir_all(&root);
    }

    #[tokio::test]
    async fn listing_skips_corrupt_entries() {
        let (store, root) = temp_store("anon_corrupt");

        store.put_anonymous(&entry("a", "Good")).await.unwrap();
        fs::write(root.join("anonymous").join("bad.json"), "not json").unwrap();
        fs::write(root.join("anonymous").join("notes.txt"), "ignored").unwrap();

        let listed = store.list_anonymous().await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].name, "Good");

        let _ = fs::remove_dir_all(&root);
    }

    #[tokio::test]
    async fn missing_directories_list_empty() {
        let (store, root) = temp_store("never_written");

        assert!(store.list_anonymous().await.unwrap().is_empty());
        assert!(store.list_cloud("owner").await.unwrap().is_empty());

        let _ = fs::remove_dir_all(&root);
    }

    #[tokio::test]
    async fn replacing_cloud_snapshot_clears_previous_entries() {
        let (store, root) = temp_store("cloud_replace");

        store
            .replace_cloud_snapshot("owner-1", &[entry("d1", "First"), entry("d2", "Second")])
            .await
            .unwrap();
        assert_eq!(store.list_cloud("owner-1").await.unwrap().len(), 2);

        store
            .replace_cloud_snapshot("owner-1", &[entry("d3", "Third")])
            .await
            .unwrap();

        let listed = store.list_cloud("owner-1").await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, "d3");

        let _ = fs::remove_dir_all(&root);
    }

    #[tokio::test]
    async fn cloud_scopes_are_isolated_per_owner() {
        let (store, root) = temp_store("cloud_owners");

        store
            .replace_cloud_snapshot("owner-1", &[entry("d1", "Mine")])
            .await
            .unwrap();
        store
            .replace_cloud_snapshot("owner-2", &[entry("d2", "Theirs")])
            .await
            .unwrap();

        assert_eq!(store.list_cloud("owner-1").await.unwrap()[0].name, "Mine");
        assert_eq!(store.list_cloud("owner-2").await.unwrap()[0].name, "Theirs");

        store.clear_cloud_snapshot("owner-1").await.unwrap();
        assert!(store.list_cloud("owner-1").await.unwrap().is_empty());
        assert_eq!(store.list_cloud("owner-2").await.unwrap().len(), 1);

        let _ = fs::remove_dir_all(&root);
    }

    #[tokio::test]
    async fn clearing_missing_cloud_scope_is_fine() {
        let (store, root) = temp_store("cloud_clear_missing");
        store.clear_cloud_snapshot("owner-1").await.unwrap();
        let _ = fs::remove_dir_all(&root);
    }

    #[tokio::test]
    async fn mapping_record_roundtrips() {
        let (store, root) = temp_store("mapping_roundtrip");

        assert!(store.load_mapping().await.unwrap().is_none());

        let record = StoredMapping {
            mapping: FieldMapping {
                grower: "Client".to_string(),
                farm: "Ranch".to_string(),
                field: "Paddock".to_string(),
                crop: None,
            },
            remember: true,
        };
        store.save_mapping(&record).await.unwrap();
        assert_eq!(store.load_mapping().await.unwrap().unwrap(), record);

        store.clear_mapping().await.unwrap();
        assert!(store.load_mapping().await.unwrap().is_none());

        let _ = fs::remove_dir_all(&root);
    }

    #[tokio::test]
    async fn corrupt_mapping_record_is_treated_as_absent() {
        let (store, root) = temp_store("mapping_corrupt");

        fs::create_dir_all(&root).unwrap();
        fs::write(root.join("mapping.json"), "{ broken").unwrap();
        assert!(store.load_mapping().await.unwrap().is_none());

        let _ = fs::remove_dir_all(&root);
    }
}
