//! src/registry/store.rs
//! ============================================================================
//! # DescriptorStore: Immutable Snapshots Behind an Atomic Pointer
//!
//! The store indexes action descriptors by association key. Every load builds
//! a brand-new [`Snapshot`] and publishes it with a single
//! [`ArcSwap`](https://docs.rs/arc-swap) store, so readers never lock and an
//! in-flight lookup keeps observing the snapshot it started with, even if a
//! reload happens meanwhile.
//!
//! Invalid entries are dropped with a [`LoadError`] diagnostic; they never
//! abort the load of the remaining entries.

use std::collections::HashMap;
use std::sync::Arc;

use arc_swap::ArcSwap;
use indexmap::IndexMap;
use regex::Regex;
use smallvec::SmallVec;
use tracing::{debug, info, warn};

use crate::dispatch::ServiceDiscovery;
use crate::error::{LoadError, LoadErrorKind};
use crate::model::{ActionDescriptor, AssociationKey, Condition, DescriptorBatch};

/// A compiled, named highlight pattern.
#[derive(Debug, Clone)]
pub struct HighlightPattern {
    pub name: String,

    pub regex: Regex,
}

impl HighlightPattern {
    pub fn key(&self) -> String {
        AssociationKey::highlight(&self.name)
    }
}

/// One consistent, read-only view of the registry.
#[derive(Debug, Default)]
pub struct Snapshot {
    /// Descriptors in load order.
    descriptors: Vec<Arc<ActionDescriptor>>,

    by_id: HashMap<String, usize>,

    /// Association key -> indices into `descriptors`, ascending.
    by_key: HashMap<String, SmallVec<[usize; 4]>>,

    /// Semantic conditions in registration order.
    conditions: IndexMap<String, Condition>,

    /// Highlight patterns in registration order.
    highlights: Vec<HighlightPattern>,
}

impl Snapshot {
    /// Validate `batch` and index what survives. Rejected entries are returned
    /// alongside the snapshot.
    pub fn build(
        batch: DescriptorBatch,
        discovery: &dyn ServiceDiscovery,
    ) -> (Self, Vec<LoadError>) {
        let mut snapshot = Self::default();
        let mut rejected: Vec<LoadError> = Vec::new();

        for def in batch.conditions {
            let name = def.name.trim().to_string();
            let origin = format!("condition:{name}");

            if name.is_empty() {
                rejected.push(LoadError::new(origin, LoadErrorKind::EmptyName));
                continue;
            }
            if snapshot.conditions.contains_key(&name) {
                rejected.push(LoadError::new(origin, LoadErrorKind::DuplicateId));
                continue;
            }

            snapshot.conditions.insert(
                name.clone(),
                Condition {
                    name,
                    sparql: def.sparql,
                },
            );
        }

        for def in batch.highlights {
            let name = def.name.trim().to_string();
            let origin = format!("highlight:{name}");

            if name.is_empty() {
                rejected.push(LoadError::new(origin, LoadErrorKind::EmptyName));
                continue;
            }
            if snapshot.highlights.iter().any(|h| h.name == name) {
                rejected.push(LoadError::new(origin, LoadErrorKind::DuplicateId));
                continue;
            }

            match Regex::new(&def.regexp) {
                Ok(regex) => snapshot.highlights.push(HighlightPattern { name, regex }),
                Err(e) => rejected.push(LoadError::new(
                    origin,
                    LoadErrorKind::InvalidPattern(e.to_string()),
                )),
            }
        }

        for entry in batch.actions {
            let origin = if entry.id.trim().is_empty() {
                "<unnamed action>".to_string()
            } else {
                entry.id.trim().to_string()
            };

            let descriptor = match entry.validate(discovery) {
                Ok(descriptor) => descriptor,
                Err(kind) => {
                    rejected.push(LoadError::new(origin, kind));
                    continue;
                }
            };

            if snapshot.by_id.contains_key(&descriptor.id) {
                rejected.push(LoadError::new(origin, LoadErrorKind::DuplicateId));
                continue;
            }

            let index = snapshot.descriptors.len();
            for key in &descriptor.keys {
                snapshot.by_key.entry(key.clone()).or_default().push(index);
            }
            snapshot.by_id.insert(descriptor.id.clone(), index);
            snapshot.descriptors.push(Arc::new(descriptor));
        }

        (snapshot, rejected)
    }

    /// Descriptors declaring exactly `key`, in load order.
    pub fn lookup(&self, key: &str) -> Vec<Arc<ActionDescriptor>> {
        self.by_key
            .get(key)
            .map(|indices| {
                indices
                    .iter()
                    .map(|&i| Arc::clone(&self.descriptors[i]))
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn by_id(&self, id: &str) -> Option<Arc<ActionDescriptor>> {
        self.by_id
            .get(id)
            .map(|&i| Arc::clone(&self.descriptors[i]))
    }

    /// Concatenate `lookup` over `keys`, dropping repeated ids (first wins).
    pub fn actions_for_keys<S: AsRef<str>>(&self, keys: &[S]) -> Vec<Arc<ActionDescriptor>> {
        let mut seen: SmallVec<[usize; 16]> = SmallVec::new();
        let mut actions: Vec<Arc<ActionDescriptor>> = Vec::new();

        for key in keys {
            let Some(indices) = self.by_key.get(key.as_ref()) else {
                continue;
            };

            for &i in indices {
                if !seen.contains(&i) {
                    seen.push(i);
                    actions.push(Arc::clone(&self.descriptors[i]));
                }
            }
        }

        actions
    }

    pub fn descriptors(&self) -> &[Arc<ActionDescriptor>] {
        &self.descriptors
    }

    pub fn conditions(&self) -> impl Iterator<Item = &Condition> {
        self.conditions.values()
    }

    pub fn highlights(&self) -> &[HighlightPattern] {
        &self.highlights
    }

    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }
}

/// Outcome of one load: how much was installed and what was dropped.
#[derive(Debug, Clone, Default)]
pub struct LoadReport {
    pub actions: usize,

    pub conditions: usize,

    pub highlights: usize,

    pub rejected: Vec<LoadError>,
}

impl LoadReport {
    pub fn is_clean(&self) -> bool {
        self.rejected.is_empty()
    }
}

/// Read-mostly descriptor index; see the module docs.
pub struct DescriptorStore {
    current: ArcSwap<Snapshot>,
}

impl Default for DescriptorStore {
    fn default() -> Self {
        Self::new()
    }
}

impl DescriptorStore {
    /// An empty store.
    pub fn new() -> Self {
        Self {
            current: ArcSwap::from_pointee(Snapshot::default()),
        }
    }

    /// A store serving a prebuilt snapshot.
    pub fn from_snapshot(snapshot: Snapshot) -> Self {
        Self {
            current: ArcSwap::from_pointee(snapshot),
        }
    }

    /// Replace the whole index with the valid entries of `batch`.
    pub fn load(&self, batch: DescriptorBatch, discovery: &dyn ServiceDiscovery) -> LoadReport {
        let (snapshot, rejected) = Snapshot::build(batch, discovery);

        for err in &rejected {
            warn!("Dropping registry entry {}", err);
        }

        let report = LoadReport {
            actions: snapshot.len(),
            conditions: snapshot.conditions.len(),
            highlights: snapshot.highlights.len(),
            rejected,
        };

        // Older snapshots stay alive for readers still holding them.
        self.current.store(Arc::new(snapshot));

        info!(
            "Descriptor store loaded: {} actions, {} conditions, {} highlight patterns ({} rejected)",
            report.actions,
            report.conditions,
            report.highlights,
            report.rejected.len()
        );

        report
    }

    /// The snapshot current at the time of the call.
    pub fn snapshot(&self) -> Arc<Snapshot> {
        self.current.load_full()
    }

    pub fn lookup(&self, key: &str) -> Vec<Arc<ActionDescriptor>> {
        let actions = self.current.load().lookup(key);
        debug!("lookup({}) -> {} actions", key, actions.len());
        actions
    }

    pub fn by_id(&self, id: &str) -> Option<Arc<ActionDescriptor>> {
        self.current.load().by_id(id)
    }
}
