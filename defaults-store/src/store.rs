//! The durable key-value contract used for default action records.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{DefaultsError, DefaultsResult};

/// One persisted association key -> action id mapping.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DefaultRecord {
    pub key: String,

    pub action_id: String,
}

/// Durable mapping from association key to preferred action id.
///
/// Absence of a record means "no default", never an error. A stored id may
/// name an action that is no longer installed; callers resolve it lazily.
#[async_trait]
pub trait DefaultsStore: Send + Sync {
    /// Look up the recorded action id for `key`.
    async fn get(&self, key: &str) -> DefaultsResult<Option<String>>;

    /// Record `action_id` for `key`, replacing any previous record. The
    /// record is durable once this returns `Ok`.
    async fn put(&self, key: &str, action_id: &str) -> DefaultsResult<()>;

    /// All records in insertion order.
    async fn entries(&self) -> DefaultsResult<Vec<DefaultRecord>>;
}

pub(crate) fn validate_record(key: &str, action_id: &str) -> DefaultsResult<()> {
    if key.trim().is_empty() {
        return Err(DefaultsError::InvalidRecord("empty association key".into()));
    }

    if action_id.trim().is_empty() {
        return Err(DefaultsError::InvalidRecord(
            format!("empty action id for key '{key}'").into(),
        ));
    }

    Ok(())
}
