//! src/resolve/resolver.rs
//! ============================================================================
//! # Resolver: Keys -> Actions, and Default Action Records
//!
//! Every query pins one descriptor snapshot for its whole duration, so a
//! reload in the middle of a resolution can not mix two registries.
//!
//! Default records are looked up key by key in classification order; a
//! record naming an action that is no longer installed is stale and skipped.

use std::sync::Arc;

use defaults_store::DefaultsStore;
use tracing::{debug, info};

use super::classifier::Classifier;
use crate::error::{ActionError, ActionResult};
use crate::model::{ActionDescriptor, AssociationKey, Target};
use crate::registry::{DescriptorStore, Snapshot};

pub struct Resolver {
    store: Arc<DescriptorStore>,

    classifier: Classifier,

    defaults: Arc<dyn DefaultsStore>,
}

impl Resolver {
    pub fn new(
        store: Arc<DescriptorStore>,
        classifier: Classifier,
        defaults: Arc<dyn DefaultsStore>,
    ) -> Self {
        Self {
            store,
            classifier,
            defaults,
        }
    }

    pub fn store(&self) -> &Arc<DescriptorStore> {
        &self.store
    }

    /// Association keys of `target`, most specific first.
    pub async fn classes_of(&self, target: &Target) -> Vec<String> {
        let snapshot = self.store.snapshot();
        self.classifier.classify(&snapshot, target).await
    }

    /// Applicable actions, first-seen order across keys, no duplicate ids.
    pub async fn actions_for(&self, target: &Target) -> Vec<Arc<ActionDescriptor>> {
        let snapshot = self.store.snapshot();
        self.actions_in(&snapshot, target).await
    }

    pub(crate) async fn actions_in(
        &self,
        snapshot: &Snapshot,
        target: &Target,
    ) -> Vec<Arc<ActionDescriptor>> {
        let keys = self.classifier.classify(snapshot, target).await;
        snapshot.actions_for_keys(&keys)
    }

    /// Actions applicable to every target, ordered as for the first target.
    pub async fn resolve_all(&self, targets: &[Target]) -> Vec<Arc<ActionDescriptor>> {
        let snapshot = self.store.snapshot();
        self.common_actions(&snapshot, targets).await
    }

    async fn common_actions(
        &self,
        snapshot: &Snapshot,
        targets: &[Target],
    ) -> Vec<Arc<ActionDescriptor>> {
        let Some((first, rest)) = targets.split_first() else {
            return Vec::new();
        };

        let mut actions = self.actions_in(snapshot, first).await;
        for target in rest {
            if actions.is_empty() {
                break;
            }
            let other = self.actions_in(snapshot, target).await;
            actions.retain(|a| other.iter().any(|o| o.id == a.id));
        }

        actions
    }

    /// Live default for the most specific key of `target` that has one.
    pub async fn default_for(
        &self,
        target: &Target,
    ) -> ActionResult<Option<Arc<ActionDescriptor>>> {
        let snapshot = self.store.snapshot();
        let keys = self.classifier.classify(&snapshot, target).await;
        self.first_live_default(&snapshot, &keys).await
    }

    async fn first_live_default(
        &self,
        snapshot: &Snapshot,
        keys: &[String],
    ) -> ActionResult<Option<Arc<ActionDescriptor>>> {
        for key in keys {
            let Some(id) = self.defaults.get(key).await? else {
                continue;
            };

            match snapshot.by_id(&id) {
                Some(action) => {
                    debug!("Default for {} is {}", key, id);
                    return Ok(Some(action));
                }
                None => debug!("Skipping stale default {} for {}", id, key),
            }
        }

        Ok(None)
    }

    /// Default of the first target, provided it applies to all of them.
    pub async fn default_for_all(
        &self,
        targets: &[Target],
    ) -> ActionResult<Option<Arc<ActionDescriptor>>> {
        let Some(first) = targets.first() else {
            return Ok(None);
        };

        let snapshot = self.store.snapshot();
        let keys = self.classifier.classify(&snapshot, first).await;
        let Some(default) = self.first_live_default(&snapshot, &keys).await? else {
            return Ok(None);
        };

        let common = self.common_actions(&snapshot, targets).await;
        Ok(common
            .iter()
            .any(|a| a.id == default.id)
            .then_some(default))
    }

    /// Record `action_id` as the default for `key`, replacing any previous
    /// record for that key.
    pub async fn set_default(&self, key: &str, action_id: &str) -> ActionResult<()> {
        let key = normalize_key(key)?;

        if self.store.by_id(action_id).is_none() {
            return Err(ActionError::UnknownAction(action_id.to_string()));
        }

        self.defaults.put(&key, action_id).await?;
        info!("Default action for {} is now {}", key, action_id);
        Ok(())
    }

    /// The raw default record for `key`, stale or not.
    pub async fn default_for_key(&self, key: &str) -> ActionResult<Option<String>> {
        let key = normalize_key(key)?;
        Ok(self.defaults.get(&key).await?)
    }
}

fn normalize_key(key: &str) -> ActionResult<String> {
    AssociationKey::parse(key)
        .map(|k| k.to_string())
        .ok_or_else(|| {
            ActionError::invalid_input("key", format!("malformed association key '{key}'"))
        })
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use defaults_store::MemoryDefaults;

    use super::*;
    use crate::model::{DescriptorBatch, DescriptorEntry};
    use crate::testing::{StaticConditions, StaticDiscovery, StaticSniffer};

    fn exec_entry(id: &str, keys: &[&str]) -> DescriptorEntry {
        DescriptorEntry {
            id: id.to_string(),
            keys: keys.iter().map(|k| k.to_string()).collect(),
            exec: Some(format!("/usr/bin/{id}")),
            ..Default::default()
        }
    }

    fn resolver(actions: Vec<DescriptorEntry>) -> (Resolver, Arc<MemoryDefaults>) {
        let store = Arc::new(DescriptorStore::new());
        store.load(
            DescriptorBatch {
                actions,
                ..Default::default()
            },
            &StaticDiscovery::default(),
        );

        let sniffer = StaticSniffer::with([
            ("file:///a.jpg", "image/jpeg"),
            ("file:///b.png", "image/png"),
            ("file:///c.txt", "text/plain"),
        ]);
        let classifier = Classifier::new(
            Arc::new(sniffer),
            Arc::new(StaticConditions::default()),
            Duration::from_millis(100),
        );
        let defaults = Arc::new(MemoryDefaults::new());

        (Resolver::new(store, classifier, defaults.clone()), defaults)
    }

    fn ids(actions: &[Arc<ActionDescriptor>]) -> Vec<&str> {
        actions.iter().map(|a| a.id.as_str()).collect()
    }

    #[tokio::test]
    async fn test_actions_for_specific_before_wildcard() {
        let (r, _) = resolver(vec![
            exec_entry("any", &["*"]),
            exec_entry("images", &["image/*"]),
            exec_entry("jpeg", &["image/jpeg", "image/*"]),
        ]);

        let actions = r.actions_for(&Target::content("file:///a.jpg")).await;
        assert_eq!(ids(&actions), vec!["jpeg", "images", "any"]);
    }

    #[tokio::test]
    async fn test_no_match_is_empty_not_error() {
        let (r, _) = resolver(vec![exec_entry("images", &["image/*"])]);
        assert!(r.actions_for(&Target::content("file:///c.txt")).await.is_empty());
        assert!(r
            .default_for(&Target::content("file:///c.txt"))
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_most_specific_live_default_wins() {
        let (r, _) = resolver(vec![
            exec_entry("gallery", &["image/*"]),
            exec_entry("viewer", &["image/jpeg"]),
        ]);
        let jpeg = Target::content("file:///a.jpg");

        r.set_default("image/*", "gallery").await.unwrap();
        assert_eq!(r.default_for(&jpeg).await.unwrap().unwrap().id, "gallery");

        r.set_default("image/jpeg", "viewer").await.unwrap();
        assert_eq!(r.default_for(&jpeg).await.unwrap().unwrap().id, "viewer");
    }

    #[tokio::test]
    async fn test_stale_default_skipped() {
        let (r, defaults) = resolver(vec![exec_entry("gallery", &["image/*"])]);

        defaults.put("image/jpeg", "uninstalled").await.unwrap();
        defaults.put("image/*", "gallery").await.unwrap();

        let d = r.default_for(&Target::content("file:///a.jpg")).await.unwrap();
        assert_eq!(d.unwrap().id, "gallery");
        assert_eq!(
            r.default_for_key("image/jpeg").await.unwrap().as_deref(),
            Some("uninstalled")
        );
    }

    #[tokio::test]
    async fn test_set_default_unknown_action_leaves_store_unchanged() {
        let (r, defaults) = resolver(vec![exec_entry("gallery", &["image/*"])]);

        let err = r.set_default("image/*", "nonexistent").await.unwrap_err();
        assert!(matches!(err, ActionError::UnknownAction(ref id) if id == "nonexistent"));
        assert!(defaults.is_empty());
    }

    #[tokio::test]
    async fn test_set_default_normalizes_key() {
        let (r, defaults) = resolver(vec![exec_entry("mailer", &["x-scheme/mailto"])]);

        r.set_default("x-maemo-urischeme/MAILTO", "mailer").await.unwrap();
        assert_eq!(
            defaults.get("x-scheme/mailto").await.unwrap().as_deref(),
            Some("mailer")
        );

        assert!(matches!(
            r.set_default("not a key", "mailer").await,
            Err(ActionError::InvalidInput { .. })
        ));
    }

    #[tokio::test]
    async fn test_resolve_all_intersects() {
        let (r, _) = resolver(vec![
            exec_entry("jpeg-only", &["image/jpeg"]),
            exec_entry("images", &["image/*"]),
            exec_entry("any", &["*"]),
        ]);
        let targets = vec![
            Target::content("file:///a.jpg"),
            Target::content("file:///b.png"),
        ];

        assert_eq!(ids(&r.resolve_all(&targets).await), vec!["images", "any"]);
        assert!(r.resolve_all(&[]).await.is_empty());

        r.set_default("image/jpeg", "jpeg-only").await.unwrap();
        assert!(r.default_for_all(&targets).await.unwrap().is_none());

        r.set_default("image/*", "images").await.unwrap();
        assert!(r.default_for_all(&targets[1..]).await.unwrap().is_some());
    }
}
