//! In-memory stand-ins for the external collaborators.
//!
//! Used by the unit tests, the scenario tests and by embedders that want to
//! drive [`ContentActions`](crate::ContentActions) without a message bus,
//! a semantic store or a mime database.

use std::collections::{HashMap, HashSet};
use std::io;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::dispatch::{BusCall, IpcTransport, ProcessSpawner, ServiceDiscovery};
use crate::error::{ActionError, ActionResult};
use crate::model::Condition;
use crate::sources::{ConditionEvaluator, MimeSniffer};

/// Fixed interface -> service table.
#[derive(Debug, Default, Clone)]
pub struct StaticDiscovery {
    implementors: HashMap<String, String>,
}

impl StaticDiscovery {
    pub fn with<I, S1, S2>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (S1, S2)>,
        S1: Into<String>,
        S2: Into<String>,
    {
        Self {
            implementors: pairs
                .into_iter()
                .map(|(i, s)| (i.into(), s.into()))
                .collect(),
        }
    }
}

impl ServiceDiscovery for StaticDiscovery {
    fn implementor(&self, interface: &str) -> Option<String> {
        self.implementors.get(interface).cloned()
    }
}

/// Fixed uri -> mime table.
#[derive(Debug, Default, Clone)]
pub struct StaticSniffer {
    types: HashMap<String, String>,
}

impl StaticSniffer {
    pub fn with<I, S1, S2>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (S1, S2)>,
        S1: Into<String>,
        S2: Into<String>,
    {
        Self {
            types: pairs
                .into_iter()
                .map(|(u, m)| (u.into(), m.into()))
                .collect(),
        }
    }
}

#[async_trait]
impl MimeSniffer for StaticSniffer {
    async fn mime_type(&self, uri: &str) -> Option<String> {
        self.types.get(uri).cloned()
    }
}

/// Conditions that hold for a fixed set of `(condition, uri)` pairs.
/// Conditions listed in `failing` return an evaluation error instead.
#[derive(Debug, Default)]
pub struct StaticConditions {
    holds: HashSet<(String, String)>,

    failing: HashSet<String>,

    stall: Option<Duration>,

    evaluated: Mutex<Vec<(String, String)>>,
}

impl StaticConditions {
    pub fn with<I, S1, S2>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (S1, S2)>,
        S1: Into<String>,
        S2: Into<String>,
    {
        Self {
            holds: pairs
                .into_iter()
                .map(|(c, u)| (c.into(), u.into()))
                .collect(),
            ..Default::default()
        }
    }

    /// Make `condition` fail to evaluate.
    pub fn failing<S: Into<String>>(mut self, condition: S) -> Self {
        self.failing.insert(condition.into());
        self
    }

    /// Delay every evaluation by `delay`.
    pub fn stalling(mut self, delay: Duration) -> Self {
        self.stall = Some(delay);
        self
    }

    /// `(condition, uri)` pairs evaluated so far.
    pub fn evaluated(&self) -> Vec<(String, String)> {
        self.evaluated.lock().clone()
    }
}

#[async_trait]
impl ConditionEvaluator for StaticConditions {
    async fn evaluate(&self, condition: &Condition, uri: &str) -> ActionResult<bool> {
        self.evaluated
            .lock()
            .push((condition.name.clone(), uri.to_string()));

        if let Some(delay) = self.stall {
            tokio::time::sleep(delay).await;
        }

        if self.failing.contains(&condition.name) {
            return Err(ActionError::condition(
                &condition.name,
                uri,
                "backend unavailable",
            ));
        }

        Ok(self
            .holds
            .contains(&(condition.name.clone(), uri.to_string())))
    }
}

/// Records every call; optionally fails or stalls.
#[derive(Debug, Default)]
pub struct RecordingTransport {
    calls: Mutex<Vec<BusCall>>,

    failure: Mutex<Option<String>>,

    stall: Mutex<Option<Duration>>,
}

impl RecordingTransport {
    pub fn calls(&self) -> Vec<BusCall> {
        self.calls.lock().clone()
    }

    pub fn fail_with<S: Into<String>>(&self, reason: S) {
        *self.failure.lock() = Some(reason.into());
    }

    pub fn stall_for(&self, delay: Duration) {
        *self.stall.lock() = Some(delay);
    }
}

#[async_trait]
impl IpcTransport for RecordingTransport {
    async fn call(&self, call: &BusCall) -> ActionResult<()> {
        self.calls.lock().push(call.clone());

        let stall: Option<Duration> = *self.stall.lock();
        if let Some(delay) = stall {
            tokio::time::sleep(delay).await;
        }

        let failure: Option<String> = self.failure.lock().clone();
        match failure {
            Some(reason) => Err(ActionError::dispatch(call.member(), reason)),
            None => Ok(()),
        }
    }
}

/// Records every argv instead of starting a process.
#[derive(Debug, Default)]
pub struct RecordingSpawner {
    spawned: Mutex<Vec<Vec<String>>>,

    failure: Mutex<Option<String>>,
}

impl RecordingSpawner {
    pub fn spawned(&self) -> Vec<Vec<String>> {
        self.spawned.lock().clone()
    }

    pub fn fail_with<S: Into<String>>(&self, reason: S) {
        *self.failure.lock() = Some(reason.into());
    }
}

impl ProcessSpawner for RecordingSpawner {
    fn spawn(&self, argv: &[String]) -> io::Result<()> {
        if let Some(reason) = self.failure.lock().clone() {
            return Err(io::Error::new(io::ErrorKind::NotFound, reason));
        }

        self.spawned.lock().push(argv.to_vec());
        Ok(())
    }
}
