//! Registry files: TOML documents declaring actions, conditions and
//! highlight patterns.
//!
//! ```toml
//! [[action]]
//! id = "gallery"
//! name = "Gallery"
//! keys = ["image/*"]
//! service = "org.x.gallery"
//!
//! [[condition]]
//! name = "image"
//! sparql = "{ ?uri a nfo:Image . }"
//!
//! [[highlight]]
//! name = "phone"
//! regexp = '\+?\d+'
//! ```
//!
//! Files are read in sorted path order so registration order, and with it
//! duplicate-id resolution, is deterministic.

use std::path::{Path, PathBuf};

use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::error::{LoadError, LoadErrorKind};
use crate::model::DescriptorBatch;

/// A registry document with its table entries still undecoded, so one bad
/// entry does not take the rest of its file down with it.
#[derive(Debug, Default, Deserialize)]
struct RawRegistry {
    #[serde(default)]
    action: Vec<toml::Value>,

    #[serde(default)]
    condition: Vec<toml::Value>,

    #[serde(default)]
    highlight: Vec<toml::Value>,
}

/// Strict parse: any malformed entry fails the whole document.
pub fn parse_str(contents: &str) -> Result<DescriptorBatch, toml::de::Error> {
    toml::from_str(contents)
}

/// Parse a registry document entry by entry. Entries that do not decode are
/// reported against `origin` and skipped. Only a document that is not valid
/// TOML fails as a whole.
pub fn parse_entries(
    contents: &str,
    origin: &str,
) -> Result<(DescriptorBatch, Vec<LoadError>), toml::de::Error> {
    let raw: RawRegistry = toml::from_str(contents)?;

    let mut batch = DescriptorBatch::default();
    let mut errors: Vec<LoadError> = Vec::new();

    decode_table(raw.action, "action", origin, &mut batch.actions, &mut errors);
    decode_table(raw.condition, "condition", origin, &mut batch.conditions, &mut errors);
    decode_table(raw.highlight, "highlight", origin, &mut batch.highlights, &mut errors);

    Ok((batch, errors))
}

fn decode_table<T: DeserializeOwned>(
    entries: Vec<toml::Value>,
    table: &str,
    origin: &str,
    decoded: &mut Vec<T>,
    errors: &mut Vec<LoadError>,
) {
    for (index, entry) in entries.into_iter().enumerate() {
        let label = entry
            .get("id")
            .or_else(|| entry.get("name"))
            .and_then(toml::Value::as_str)
            .filter(|l| !l.is_empty())
            .map(str::to_string);

        match entry.try_into::<T>() {
            Ok(value) => decoded.push(value),
            Err(e) => {
                let at = match label {
                    Some(label) => format!("{origin}#{table}:{label}"),
                    None => format!("{origin}#{table}[{index}]"),
                };
                let kind = LoadErrorKind::Malformed(e.message().to_string());
                errors.push(LoadError::new(at, kind));
            }
        }
    }
}

/// Every `*.toml` file directly inside `dirs`, sorted per directory.
pub fn registry_files(dirs: &[PathBuf]) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = Vec::new();

    for dir in dirs {
        let mut in_dir: Vec<PathBuf> = WalkDir::new(dir)
            .max_depth(1)
            .follow_links(true)
            .into_iter()
            .filter_map(Result::ok)
            .filter(|e| e.file_type().is_file())
            .map(|e| e.into_path())
            .filter(|p| p.extension().is_some_and(|ext| ext == "toml"))
            .collect();
        in_dir.sort();
        files.extend(in_dir);
    }

    files
}

/// Read one registry file. The file fails as a whole only when it cannot be
/// read or is not TOML; malformed entries come back alongside the batch.
pub fn load_file(path: &Path) -> Result<(DescriptorBatch, Vec<LoadError>), LoadError> {
    let origin = path.display().to_string();
    let unreadable =
        |reason: String| LoadError::new(origin.clone(), LoadErrorKind::Unreadable(reason));

    let contents = std::fs::read_to_string(path).map_err(|e| unreadable(e.to_string()))?;
    parse_entries(&contents, &origin).map_err(|e| unreadable(e.message().to_string()))
}

/// Merge every registry file found in `dirs`. Unreadable files and
/// malformed entries are skipped and reported.
pub fn load_dirs(dirs: &[PathBuf]) -> (DescriptorBatch, Vec<LoadError>) {
    let mut batch = DescriptorBatch::default();
    let mut errors: Vec<LoadError> = Vec::new();

    for path in registry_files(dirs) {
        match load_file(&path) {
            Ok((file_batch, malformed)) => {
                debug!(
                    "Registry file {}: {} actions, {} conditions, {} highlights",
                    path.display(),
                    file_batch.actions.len(),
                    file_batch.conditions.len(),
                    file_batch.highlights.len()
                );
                for e in &malformed {
                    warn!("Skipping registry entry: {}", e);
                }
                batch.extend(file_batch);
                errors.extend(malformed);
            }
            Err(e) => {
                warn!("Skipping registry file: {}", e);
                errors.push(e);
            }
        }
    }

    (batch, errors)
}
