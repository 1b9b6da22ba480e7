//! Process-local defaults, used by tests and when persistence is disabled.

use async_trait::async_trait;
use indexmap::IndexMap;
use parking_lot::RwLock;

use crate::error::DefaultsResult;
use crate::store::{DefaultRecord, DefaultsStore, validate_record};

#[derive(Debug, Default)]
pub struct MemoryDefaults {
    records: RwLock<IndexMap<String, String>>,
}

impl MemoryDefaults {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the store with `(key, action_id)` pairs.
    pub fn with_records<I, K, V>(records: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let map: IndexMap<String, String> = records
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();

        Self {
            records: RwLock::new(map),
        }
    }

    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }
}

#[async_trait]
impl DefaultsStore for MemoryDefaults {
    async fn get(&self, key: &str) -> DefaultsResult<Option<String>> {
        Ok(self.records.read().get(key).cloned())
    }

    async fn put(&self, key: &str, action_id: &str) -> DefaultsResult<()> {
        validate_record(key, action_id)?;
        self.records
            .write()
            .insert(key.to_string(), action_id.to_string());
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
