//! File-backed default action records
//!
//! Records are kept in memory for readers and written through to a
//! MessagePack file on every `put`:
//! - Versioned payload with an integrity checksum
//! - Crash-safe saves by writing a temporary file and renaming it into place
//! - The previous file is kept as `.bak` and used when the main file is corrupted
//! - Writers are serialized; readers only take a short read lock

use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use directories::ProjectDirs;
use indexmap::IndexMap;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tokio::fs;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::error::{DefaultsError, DefaultsResult};
use crate::store::{DefaultRecord, DefaultsStore, validate_record};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistenceConfig {
    /// Validate checksums on load
    pub validate_checksums: bool,

    /// Keep the previous file as a backup before overwriting
    pub create_backups: bool,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            validate_checksums: true,
            create_backups: true,
        }
    }
}

/// Persisted defaults with versioning
#[derive(Debug, Serialize, Deserialize)]
struct PersistedDefaults {
    version: u32,

    modified_at: u64,

    records: Vec<DefaultRecord>,

    checksum: Option<u64>,
}

pub struct FileDefaults {
    file_path: PathBuf,

    temp_path: PathBuf,

    backup_path: PathBuf,

    config: PersistenceConfig,

    /// Snapshot served to readers; replaced only after a successful save.
    records: RwLock<IndexMap<String, String>>,

    /// Single-writer discipline for `put`.
    write_lock: Mutex<()>,
}

impl FileDefaults {
    /// Current persistence file format version
    const CURRENT_VERSION: u32 = 1;

    /// Open (or create on first write) the defaults file at `file_path`.
    pub async fn open(file_path: PathBuf, config: PersistenceConfig) -> DefaultsResult<Self> {
        let temp_path = file_path.with_extension("tmp");
        let backup_path = file_path.with_extension("bak");

        if let Some(parent) = file_path.parent()
            && !parent.as_os_str().is_empty()
            && !parent.exists()
        {
            fs::create_dir_all(parent).await.map_err(|e| {
                DefaultsError::persistence_error(format!("Failed to create directory: {e}"))
            })?;
        }

        let store = Self {
            file_path,
            temp_path,
            backup_path,
            config,
            records: RwLock::new(IndexMap::new()),
            write_lock: Mutex::new(()),
        };

        let loaded = store.load_records().await?;
        debug!(
            "Loaded {} default action records from {}",
            loaded.len(),
            store.file_path.display()
        );
        *store.records.write() = loaded;

        Ok(store)
    }

    /// `$XDG_DATA_HOME/contentaction/defaults.mpk` or the platform equivalent.
    pub fn default_path() -> DefaultsResult<PathBuf> {
        let proj_dirs = ProjectDirs::from("org", "contentaction", "contentaction")
            .ok_or(DefaultsError::NoDataDirectory)?;
        Ok(proj_dirs.data_dir().join("defaults.mpk"))
    }

    pub fn path(&self) -> &Path {
        &self.file_path
    }

    /// Load records, falling back to the backup when the main file is damaged.
    async fn load_records(&self) -> DefaultsResult<IndexMap<String, String>> {
        match self.try_load_from_file(&self.file_path).await {
            Ok(records) => Ok(records),

            Err(e) if e.is_persistence_error() => {
                if self.backup_path.exists() {
                    warn!("Defaults file corrupted, trying backup: {}", e);
                    Ok(self
                        .try_load_from_file(&self.backup_path)
                        .await
                        .unwrap_or_default())
                } else {
                    warn!("Defaults file corrupted and no backup exists: {}", e);
                    Ok(IndexMap::new())
                }
            }

            Err(e) => Err(e),
        }
    }

    async fn try_load_from_file(&self, path: &Path) -> DefaultsResult<IndexMap<String, String>> {
        if !path.exists() {
            return Ok(IndexMap::new());
        }

        let data = fs::read(path)
            .await
            .map_err(|e| DefaultsError::persistence_error(format!("Failed to read file: {e}")))?;

        self.deserialize_records(&data, path)
    }

    fn deserialize_records(
        &self,
        data: &[u8],
        path: &Path,
    ) -> DefaultsResult<IndexMap<String, String>> {
        let persisted: PersistedDefaults = rmp_serde::from_slice(data)?;

        if persisted.version > Self::CURRENT_VERSION {
            return Err(DefaultsError::PersistenceVersionMismatch {
                expected: Self::CURRENT_VERSION,
                found: persisted.version,
            });
        }

        if self.config.validate_checksums
            && let Some(stored) = persisted.checksum
            && stored != checksum(&persisted.records)
        {
            return Err(DefaultsError::persistence_corrupted(path));
        }

        Ok(persisted
            .records
            .into_iter()
            .map(|r| (r.key, r.action_id))
            .collect())
    }

    fn serialize_records(&self, records: &IndexMap<String, String>) -> DefaultsResult<Vec<u8>> {
        let records: Vec<DefaultRecord> = records
            .iter()
            .map(|(key, action_id)| DefaultRecord {
                key: key.clone(),
                action_id: action_id.clone(),
            })
            .collect();

        let modified_at = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or_default();

        let checksum = self.config.validate_checksums.then(|| checksum(&records));

        let persisted = PersistedDefaults {
            version: Self::CURRENT_VERSION,
            modified_at,
            records,
            checksum,
        };

        Ok(rmp_serde::to_vec(&persisted)?)
    }

    async fn create_backup(&self) -> DefaultsResult<()> {
        if self.file_path.exists() {
            fs::copy(&self.file_path, &self.backup_path)
                .await
                .map_err(|e| {
                    DefaultsError::persistence_error(format!("Failed to create backup: {e}"))
                })?;
        }
        Ok(())
    }

    async fn atomic_save(&self, data: &[u8]) -> DefaultsResult<()> {
        fs::write(&self.temp_path, data).await.map_err(|e| {
            DefaultsError::atomic_save_error(format!("Failed to write temp file: {e}"))
        })?;

        fs::rename(&self.temp_path, &self.file_path)
            .await
            .map_err(|e| {
                DefaultsError::atomic_save_error(format!("Failed to rename temp file: {e}"))
            })?;

        Ok(())
    }
}

#[async_trait]
impl DefaultsStore for FileDefaults {
    async fn get(&self, key: &str) -> DefaultsResult<Option<String>> {
        Ok(self.records.read().get(key).cloned())
    }

    async fn put(&self, key: &str, action_id: &str) -> DefaultsResult<()> {
        validate_record(key, action_id)?;

        let _writer = self.write_lock.lock().await;

        let mut next: IndexMap<String, String> = self.records.read().clone();
        next.insert(key.to_string(), action_id.to_string());

        let data = self.serialize_records(&next)?;

        if self.config.create_backups {
            self.create_backup().await?;
        }
        self.atomic_save(&data).await?;

        *self.records.write() = next;

        info!("Default action for '{}' set to '{}'", key, action_id);
        Ok(())
    }

    async fn entries(&self) -> DefaultsResult<Vec<DefaultRecord>> {
        Ok(self
            .records
            .read()
            .iter()
            .map(|(key, action_id)| DefaultRecord {
                key: key.clone(),
                action_id: action_id.clone(),
            })
            .collect())
    }
}

/// FNV-1a over every record; stable across toolchains, unlike `DefaultHasher`.
fn checksum(records: &[DefaultRecord]) -> u64 {
    const OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
    const PRIME: u64 = 0x0000_0100_0000_01b3;

    let mut hash = OFFSET;
    let mut feed = |bytes: &[u8]| {
        for b in bytes {
            hash ^= u64::from(*b);
            hash = hash.wrapping_mul(PRIME);
        }
    };

    feed(&(records.len() as u64).to_le_bytes());
    for record in records {
        feed(record.key.as_bytes());
        feed(&[0]);
        feed(record.action_id.as_bytes());
        feed(&[0]);
    }

    hash
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    async fn open_in(dir: &TempDir) -> FileDefaults {
        FileDefaults::open(dir.path().join("defaults.mpk"), PersistenceConfig::default())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_records_survive_reopen() {
        let dir = TempDir::new().unwrap();

        {
            let store = open_in(&dir).await;
            store.put("image/*", "gallery").await.unwrap();
            store.put("x-scheme/mailto", "mailer").await.unwrap();
        }

        let reopened = open_in(&dir).await;
        assert_eq!(
            reopened.get("image/*").await.unwrap().as_deref(),
            Some("gallery")
        );
        assert_eq!(
            reopened.get("x-scheme/mailto").await.unwrap().as_deref(),
            Some("mailer")
        );
    }

    #[tokio::test]
    async fn test_save_leaves_only_data_and_backup() {
        let dir = TempDir::new().unwrap();
        let store = open_in(&dir).await;

        // A temp file left by an interrupted save is simply overwritten.
        std::fs::write(dir.path().join("defaults.tmp"), b"stale").unwrap();

        store.put("image/*", "gallery").await.unwrap();
        store.put("image/*", "viewer").await.unwrap();

        let mut names: Vec<String> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        assert_eq!(names, vec!["defaults.bak", "defaults.mpk"]);
    }

    #[tokio::test]
    async fn test_overwrite_keeps_single_record() {
        let dir = TempDir::new().unwrap();
        let store = open_in(&dir).await;

        store.put("image/*", "gallery").await.unwrap();
        store.put("image/*", "viewer").await.unwrap();

        let entries = store.entries().await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].action_id, "viewer");
    }

    #[tokio::test]
    async fn test_corrupted_file_falls_back_to_backup() {
        let dir = TempDir::new().unwrap();

        {
            let store = open_in(&dir).await;
            store.put("image/*", "gallery").await.unwrap();
            // Second save copies the first file to `.bak`.
            store.put("text/plain", "editor").await.unwrap();
        }

        std::fs::write(dir.path().join("defaults.mpk"), b"not messagepack").unwrap();

        let reopened = open_in(&dir).await;
        assert_eq!(
            reopened.get("image/*").await.unwrap().as_deref(),
            Some("gallery")
        );
    }

    #[tokio::test]
    async fn test_checksum_mismatch_is_corruption() {
        let dir = TempDir::new().unwrap();
        let store = open_in(&dir).await;

        let records = vec![DefaultRecord {
            key: "image/*".into(),
            action_id: "gallery".into(),
        }];
        let tampered = PersistedDefaults {
            version: 1,
            modified_at: 0,
            records,
            checksum: Some(42),
        };
        let data = rmp_serde::to_vec(&tampered).unwrap();

        let err = store
            .deserialize_records(&data, store.path())
            .unwrap_err();
        assert!(matches!(err, DefaultsError::PersistenceCorrupted { .. }));
    }

    #[tokio::test]
    async fn test_newer_version_rejected() {
        let dir = TempDir::new().unwrap();
        let store = open_in(&dir).await;

        let future = PersistedDefaults {
            version: 99,
            modified_at: 0,
            records: Vec::new(),
            checksum: None,
        };
        let data = rmp_serde::to_vec(&future).unwrap();

        let err = store.deserialize_records(&data, store.path()).unwrap_err();
        assert!(matches!(
            err,
            DefaultsError::PersistenceVersionMismatch { found: 99, .. }
        ));
    }
}
