//! src/model/descriptor.rs
//! ============================================================================
//! # Action descriptors and association keys
//!
//! An [`ActionDescriptor`] is the validated, immutable form of one installed
//! handler. Registry files deliver the loose [`DescriptorEntry`] form, which
//! mirrors desktop-entry keys; [`DescriptorEntry::validate`] turns it into a
//! descriptor or explains why it was rejected.

use std::fmt;

use serde::Deserialize;

use crate::dispatch::{ServiceDiscovery, exec};
use crate::error::LoadErrorKind;

pub const CONDITION_PREFIX: &str = "x-condition/";
pub const HIGHLIGHT_PREFIX: &str = "x-highlight/";
pub const SCHEME_PREFIX: &str = "x-scheme/";

/// Older registry files use these spellings for the same buckets.
const LEGACY_PREFIXES: [(&str, &str); 3] = [
    ("x-maemo-nepomuk/", CONDITION_PREFIX),
    ("x-maemo-highlight/", HIGHLIGHT_PREFIX),
    ("x-maemo-urischeme/", SCHEME_PREFIX),
];

/// The four association mechanisms.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum AssociationKey {
    /// `type/subtype`, either part may be `*`; a lone `*` matches anything.
    Mime(String),

    Condition(String),

    Highlight(String),

    Scheme(String),
}

impl AssociationKey {
    /// Parse and normalize a raw key. Returns `None` for malformed keys.
    pub fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim();

        let mut normalized: String = raw.to_string();
        for (legacy, current) in LEGACY_PREFIXES {
            if let Some(rest) = raw.strip_prefix(legacy) {
                normalized = format!("{current}{rest}");
                break;
            }
        }

        if let Some(name) = normalized.strip_prefix(CONDITION_PREFIX) {
            return valid_name(name).then(|| Self::Condition(name.to_string()));
        }

        if let Some(name) = normalized.strip_prefix(HIGHLIGHT_PREFIX) {
            return valid_name(name).then(|| Self::Highlight(name.to_string()));
        }

        if let Some(scheme) = normalized.strip_prefix(SCHEME_PREFIX) {
            return valid_name(scheme).then(|| Self::Scheme(scheme.to_ascii_lowercase()));
        }

        let mime = normalized.to_ascii_lowercase();
        if mime == "*" {
            return Some(Self::Mime(mime));
        }

        let (major, minor) = mime.split_once('/')?;
        let well_formed = |part: &str| {
            !part.is_empty()
                && !part.contains('/')
                && !part.chars().any(|c| c.is_whitespace() || c == ';')
        };

        (well_formed(major) && well_formed(minor)).then_some(Self::Mime(mime))
    }

    pub fn condition(name: &str) -> String {
        format!("{CONDITION_PREFIX}{name}")
    }

    pub fn highlight(name: &str) -> String {
        format!("{HIGHLIGHT_PREFIX}{name}")
    }

    pub fn scheme(scheme: &str) -> String {
        format!("{SCHEME_PREFIX}{}", scheme.to_ascii_lowercase())
    }
}

impl fmt::Display for AssociationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Mime(mime) => f.write_str(mime),
            Self::Condition(name) => write!(f, "{CONDITION_PREFIX}{name}"),
            Self::Highlight(name) => write!(f, "{HIGHLIGHT_PREFIX}{name}"),
            Self::Scheme(scheme) => write!(f, "{SCHEME_PREFIX}{scheme}"),
        }
    }
}

fn valid_name(name: &str) -> bool {
    !name.is_empty() && !name.chars().any(char::is_whitespace)
}

/// How an action is triggered. Exactly one per descriptor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Invocation {
    /// Call the standard application-launch method on `service`.
    AppLaunch { service: String },

    /// Call `interface.method` at `object_path`; without a service the
    /// destination is the first discovered implementor of `interface`.
    MethodCall {
        service: Option<String>,
        interface: String,
        method: String,
        object_path: String,
        fixed_args: Vec<String>,
    },

    /// Spawn a process from a desktop-entry style command template.
    Exec { command: String },

    /// Deprecated single-purpose opener method.
    LegacyOpen { service: String },
}

impl Invocation {
    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::AppLaunch { .. } => "app-launch",
            Self::MethodCall { .. } => "method-call",
            Self::Exec { .. } => "exec",
            Self::LegacyOpen { .. } => "legacy-open",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionDescriptor {
    /// Unique, stable identifier.
    pub id: String,

    pub display_name: String,

    /// Normalized association keys in declaration order, without duplicates.
    pub keys: Vec<String>,

    pub invocation: Invocation,
}

impl ActionDescriptor {
    pub fn declares(&self, key: &str) -> bool {
        self.keys.iter().any(|k| k == key)
    }
}

/// A named semantic condition: a SPARQL graph pattern over `?uri`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Condition {
    pub name: String,

    pub sparql: String,
}

impl Condition {
    pub fn key(&self) -> String {
        AssociationKey::condition(&self.name)
    }
}

/// Raw action entry as found in registry files.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DescriptorEntry {
    #[serde(default)]
    pub id: String,

    #[serde(default)]
    pub name: Option<String>,

    #[serde(default)]
    pub keys: Vec<String>,

    /// With `method`: destination of the call. Alone: application launch.
    #[serde(default)]
    pub service: Option<String>,

    /// `interface.method`
    #[serde(default)]
    pub method: Option<String>,

    #[serde(default)]
    pub object_path: Option<String>,

    #[serde(default)]
    pub fixed_args: Vec<String>,

    #[serde(default)]
    pub exec: Option<String>,

    #[serde(default)]
    pub legacy_service: Option<String>,
}

impl DescriptorEntry {
    /// Check the descriptor invariants and build the immutable descriptor.
    pub fn validate(
        self,
        discovery: &dyn ServiceDiscovery,
    ) -> Result<ActionDescriptor, LoadErrorKind> {
        let id = self.id.trim().to_string();
        if id.is_empty() {
            return Err(LoadErrorKind::MissingId);
        }

        let mut keys: Vec<String> = Vec::with_capacity(self.keys.len());
        for raw in &self.keys {
            let key = AssociationKey::parse(raw)
                .ok_or_else(|| LoadErrorKind::MalformedKey(raw.clone()))?
                .to_string();
            if !keys.contains(&key) {
                keys.push(key);
            }
        }
        if keys.is_empty() {
            return Err(LoadErrorKind::NoKeys);
        }

        let invocation = self.invocation(discovery)?;
        let display_name = self
            .name
            .filter(|n| !n.trim().is_empty())
            .unwrap_or_else(|| id.clone());

        Ok(ActionDescriptor {
            id,
            display_name,
            keys,
            invocation,
        })
    }

    fn invocation(&self, discovery: &dyn ServiceDiscovery) -> Result<Invocation, LoadErrorKind> {
        let service = non_empty(&self.service);
        let method = non_empty(&self.method);
        let exec = non_empty(&self.exec);
        let legacy = non_empty(&self.legacy_service);

        let mut declared: Vec<&'static str> = Vec::new();
        if method.is_some() {
            declared.push("method");
        } else if service.is_some() {
            declared.push("service");
        }
        if exec.is_some() {
            declared.push("exec");
        }
        if legacy.is_some() {
            declared.push("legacy_service");
        }

        match declared.len() {
            0 => return Err(LoadErrorKind::NoInvocation),
            1 => {}
            _ => return Err(LoadErrorKind::ConflictingInvocation(declared.join(", "))),
        }

        if let Some(full) = method {
            let (interface, name) = full
                .rsplit_once('.')
                .filter(|(i, m)| !i.is_empty() && !m.is_empty())
                .ok_or_else(|| LoadErrorKind::MalformedMethod(full.to_string()))?;

            if service.is_none() && discovery.implementor(interface).is_none() {
                return Err(LoadErrorKind::NoImplementor(interface.to_string()));
            }

            return Ok(Invocation::MethodCall {
                service: service.map(str::to_string),
                interface: interface.to_string(),
                method: name.to_string(),
                object_path: non_empty(&self.object_path).unwrap_or("/").to_string(),
                fixed_args: self.fixed_args.clone(),
            });
        }

        if let Some(service) = service {
            return Ok(Invocation::AppLaunch {
                service: service.to_string(),
            });
        }

        if let Some(command) = exec {
            exec::tokenize(command).map_err(LoadErrorKind::InvalidExec)?;
            return Ok(Invocation::Exec {
                command: command.to_string(),
            });
        }

        match legacy {
            Some(service) => Ok(Invocation::LegacyOpen {
                service: service.to_string(),
            }),
            None => Err(LoadErrorKind::NoInvocation),
        }
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConditionDef {
    pub name: String,

    pub sparql: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HighlightDef {
    pub name: String,

    pub regexp: String,
}

/// Everything one registry load delivers, in registration order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct DescriptorBatch {
    #[serde(default, rename = "action")]
    pub actions: Vec<DescriptorEntry>,

    #[serde(default, rename = "condition")]
    pub conditions: Vec<ConditionDef>,

    #[serde(default, rename = "highlight")]
    pub highlights: Vec<HighlightDef>,
}

impl DescriptorBatch {
    /// Append another batch, keeping registration order.
    pub fn extend(&mut self, other: DescriptorBatch) {
        self.actions.extend(other.actions);
        self.conditions.extend(other.conditions);
        self.highlights.extend(other.highlights);
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty() && self.conditions.is_empty() && self.highlights.is_empty()
    }
}
