//! src/resolve/classifier.rs
//! ============================================================================
//! # Classifier: Target -> Association Keys
//!
//! Keys are emitted most specific first:
//! - content: `type/subtype`, `type/*`, `*/subtype`, `*/*`, `*`
//! - object: every holding `x-condition/<name>` in registration order, then
//!   `x-scheme/<scheme>`
//! - fragment: `x-highlight/<pattern>`
//!
//! Condition evaluation crosses a process boundary; each evaluation is
//! bounded by a timeout and a failed or timed out condition simply does not
//! hold.

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use tracing::{debug, warn};

use crate::model::{AssociationKey, Target};
use crate::registry::Snapshot;
use crate::sources::{ConditionEvaluator, MimeSniffer};

pub struct Classifier {
    sniffer: Arc<dyn MimeSniffer>,

    evaluator: Arc<dyn ConditionEvaluator>,

    condition_timeout: Duration,
}

impl Classifier {
    pub fn new(
        sniffer: Arc<dyn MimeSniffer>,
        evaluator: Arc<dyn ConditionEvaluator>,
        condition_timeout: Duration,
    ) -> Self {
        Self {
            sniffer,
            evaluator,
            condition_timeout,
        }
    }

    /// Association keys applying to `target` against `snapshot`.
    pub async fn classify(&self, snapshot: &Snapshot, target: &Target) -> Vec<String> {
        let keys: Vec<String> = match target {
            Target::Content { uri } => match self.sniffer.mime_type(uri).await {
                Some(mime) => mime_keys(&mime),
                None => {
                    debug!("No mime type for {}", uri);
                    Vec::new()
                }
            },

            Target::Object { uri } => {
                let mut keys = self.holding_conditions(snapshot, uri).await;
                if let Some(scheme) = target.scheme() {
                    keys.push(AssociationKey::scheme(&scheme));
                }
                keys
            }

            Target::Fragment { pattern, .. } => vec![AssociationKey::highlight(pattern)],
        };

        debug!("classify({}) -> {:?}", target.value(), keys);
        keys
    }

    async fn holding_conditions(&self, snapshot: &Snapshot, uri: &str) -> Vec<String> {
        let evaluations = snapshot.conditions().map(|condition| async move {
            let outcome = tokio::time::timeout(
                self.condition_timeout,
                self.evaluator.evaluate(condition, uri),
            )
            .await;

            let holds = match outcome {
                Ok(Ok(holds)) => holds,
                Ok(Err(e)) => {
                    warn!("{}", e);
                    false
                }
                Err(_) => {
                    warn!(
                        "Condition '{}' timed out for {} after {:?}",
                        condition.name, uri, self.condition_timeout
                    );
                    false
                }
            };

            holds.then(|| condition.key())
        });

        // join_all keeps input order, so keys follow registration order.
        join_all(evaluations).await.into_iter().flatten().collect()
    }
}

/// `image/jpeg` -> `image/jpeg`, `image/*`, `*/jpeg`, `*/*`, `*`.
/// Parameters are stripped and duplicates removed.
pub fn mime_keys(mime: &str) -> Vec<String> {
    let mime = mime
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();

    let candidates: Vec<String> = match mime.split_once('/') {
        Some((major, minor)) if !major.is_empty() && !minor.is_empty() => vec![
            format!("{major}/{minor}"),
            format!("{major}/*"),
            format!("*/{minor}"),
            "*/*".to_string(),
            "*".to_string(),
        ],
        _ => vec!["*".to_string()],
    };

    let mut keys: Vec<String> = Vec::with_capacity(candidates.len());
    for key in candidates {
        if !keys.contains(&key) {
            keys.push(key);
        }
    }
    keys
}
