//! src/error.rs
//! ============================================================================
//! # `ActionError`: Unified Error Type for Action Resolution and Dispatch
//!
//! Every fallible operation of the crate returns [`ActionResult`]. Load
//! problems are reported per descriptor through [`LoadError`] and never abort
//! a whole registry load. Empty resolution results and stale default records
//! are not errors at all; they surface as empty vectors and `None`.

use std::{io, path::PathBuf};

use defaults_store::DefaultsError;
use thiserror::Error;

/// Why a single descriptor, condition or highlight pattern was rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LoadErrorKind {
    #[error("missing action id")]
    MissingId,

    #[error("duplicate id, first definition wins")]
    DuplicateId,

    #[error("no association keys declared")]
    NoKeys,

    #[error("malformed association key '{0}'")]
    MalformedKey(String),

    #[error("no invocation method declared")]
    NoInvocation,

    #[error("conflicting invocation methods: {0}")]
    ConflictingInvocation(String),

    #[error("method '{0}' is not of the form interface.method")]
    MalformedMethod(String),

    #[error("no service given and no implementor found for interface '{0}'")]
    NoImplementor(String),

    #[error("invalid exec command: {0}")]
    InvalidExec(String),

    #[error("invalid highlight regexp: {0}")]
    InvalidPattern(String),

    #[error("empty name")]
    EmptyName,

    #[error("malformed entry: {0}")]
    Malformed(String),

    #[error("unreadable registry file: {0}")]
    Unreadable(String),
}

/// A rejected registry entry together with where it came from.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{origin}: {kind}")]
pub struct LoadError {
    /// Entry identifier (action id, `condition:<name>`, `highlight:<name>`,
    /// a file path, or `<file>#<table>[<index>]` for an entry that did not
    /// parse).
    pub origin: String,

    pub kind: LoadErrorKind,
}

impl LoadError {
    pub fn new<S: Into<String>>(origin: S, kind: LoadErrorKind) -> Self {
        Self {
            origin: origin.into(),
            kind,
        }
    }
}

#[derive(Debug, Error)]
pub enum ActionError {
    /// `set_default` named an action that is not installed.
    #[error("Unknown action: {0}")]
    UnknownAction(String),

    /// No reachable implementor, or the call could not be delivered.
    #[error("Dispatch of '{action}' failed: {reason}")]
    Dispatch { action: String, reason: String },

    /// The action's process could not be started.
    #[error("Failed to spawn '{action}': {reason}")]
    Spawn { action: String, reason: String },

    /// A semantic condition could not be evaluated. The classifier treats
    /// this as "condition does not hold".
    #[error("Condition '{condition}' could not be evaluated for {uri}: {reason}")]
    Condition {
        condition: String,
        uri: String,
        reason: String,
    },

    /// Input validation errors
    #[error("Invalid input: {field} - {message}")]
    InvalidInput { field: String, message: String },

    /// TOML config or registry parsing error.
    #[error("Config parse error: {0}")]
    Config(#[from] toml::de::Error),

    /// Config file I/O error with path.
    #[error("Failed to read config file {path:?}: {source}")]
    ConfigIo {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Default action persistence failure.
    #[error("Default action store error: {0}")]
    Defaults(#[from] DefaultsError),
}

impl ActionError {
    pub fn dispatch<S1: Into<String>, S2: Into<String>>(action: S1, reason: S2) -> Self {
        Self::Dispatch {
            action: action.into(),
            reason: reason.into(),
        }
    }

    pub fn spawn<S1: Into<String>, S2: Into<String>>(action: S1, reason: S2) -> Self {
        Self::Spawn {
            action: action.into(),
            reason: reason.into(),
        }
    }

    pub fn condition<S1, S2, S3>(condition: S1, uri: S2, reason: S3) -> Self
    where
        S1: Into<String>,
        S2: Into<String>,
        S3: Into<String>,
    {
        Self::Condition {
            condition: condition.into(),
            uri: uri.into(),
            reason: reason.into(),
        }
    }

    pub fn invalid_input<S1: Into<String>, S2: Into<String>>(field: S1, message: S2) -> Self {
        Self::InvalidInput {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// Result type alias using [`ActionError`].
pub type ActionResult<T> = Result<T, ActionError>;
