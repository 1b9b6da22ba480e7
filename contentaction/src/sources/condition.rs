//! Semantic condition evaluation.
//!
//! A condition is a SPARQL graph pattern over `?uri`. It holds for a URI when
//!
//! ```sparql
//! SELECT 1 { <pattern> FILTER(?uri = <URI>) }
//! ```
//!
//! returns at least one row.

use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

use crate::error::{ActionError, ActionResult};
use crate::model::Condition;

/// Boolean predicate service for semantic conditions.
#[async_trait]
pub trait ConditionEvaluator: Send + Sync {
    async fn evaluate(&self, condition: &Condition, uri: &str) -> ActionResult<bool>;
}

/// Evaluator for setups without a semantic store: nothing ever holds.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoConditions;

#[async_trait]
impl ConditionEvaluator for NoConditions {
    async fn evaluate(&self, _condition: &Condition, _uri: &str) -> ActionResult<bool> {
        Ok(false)
    }
}

pub const DEFAULT_QUERY_COMMAND: &[&str] = &[
    "tracker3",
    "sparql",
    "--dbus-service",
    "org.freedesktop.Tracker3.Miner.Files",
    "-q",
];

/// Runs the condition query through an external SPARQL command line tool.
/// The query is passed as the last argument.
#[derive(Debug, Clone)]
pub struct SparqlConditionEvaluator {
    command: Vec<String>,

    timeout: Duration,
}

impl SparqlConditionEvaluator {
    pub fn new(timeout: Duration) -> Self {
        Self {
            command: DEFAULT_QUERY_COMMAND.iter().map(|s| s.to_string()).collect(),
            timeout,
        }
    }

    pub fn with_command(mut self, command: Vec<String>) -> Self {
        self.command = command;
        self
    }

    /// Fails for URIs that would break out of the IRI reference.
    pub fn query(condition: &Condition, uri: &str) -> ActionResult<String> {
        if uri.is_empty()
            || uri
                .chars()
                .any(|c| c.is_whitespace() || matches!(c, '<' | '>' | '"' | '{' | '}' | '\\'))
        {
            return Err(ActionError::condition(
                &condition.name,
                uri,
                "URI can not be used as an IRI",
            ));
        }

        Ok(format!(
            "SELECT 1 {{ {} FILTER(?uri = <{}>) }}",
            condition.sparql.trim(),
            uri
        ))
    }
}

#[async_trait]
impl ConditionEvaluator for SparqlConditionEvaluator {
    async fn evaluate(&self, condition: &Condition, uri: &str) -> ActionResult<bool> {
        let query = Self::query(condition, uri)?;

        let Some((program, args)) = self.command.split_first() else {
            return Err(ActionError::condition(
                &condition.name,
                uri,
                "no query command configured",
            ));
        };

        let output = Command::new(program)
            .args(args)
            .arg(&query)
            .kill_on_drop(true)
            .output();

        let output = tokio::time::timeout(self.timeout, output)
            .await
            .map_err(|_| ActionError::condition(&condition.name, uri, "query timed out"))?
            .map_err(|e| ActionError::condition(&condition.name, uri, format!("{program}: {e}")))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ActionError::condition(
                &condition.name,
                uri,
                stderr.trim().to_string(),
            ));
        }

        let holds = has_rows(&String::from_utf8_lossy(&output.stdout));
        debug!("Condition {} for {}: {}", condition.name, uri, holds);
        Ok(holds)
    }
}

/// Whether command line query output contains any result row. The tool
/// prints a `Results:` header followed by one indented line per row, or
/// `No results found...` when empty.
fn has_rows(stdout: &str) -> bool {
    let mut lines = stdout
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty());

    match lines.next() {
        None => false,
        Some(first) if first.to_ascii_lowercase().starts_with("no results") => false,
        Some(first) if first.ends_with(':') => lines.next().is_some(),
        Some(_) => true,
    }
}
