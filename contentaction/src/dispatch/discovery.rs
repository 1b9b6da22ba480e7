//! Interface implementor discovery from D-Bus `.service` files.
//!
//! A service file looks like:
//!
//! ```text
//! [D-BUS Service]
//! Name=com.example.viewer
//! Exec=/usr/bin/viewer
//! Interface=com.example.ImageIf;com.example.PrintIf
//! ```

use std::path::PathBuf;

use indexmap::IndexMap;
use parking_lot::RwLock;
use tracing::{debug, warn};
use walkdir::WalkDir;

/// Finds the service implementing an interface.
pub trait ServiceDiscovery: Send + Sync {
    /// First known implementor of `interface`, if any.
    fn implementor(&self, interface: &str) -> Option<String>;
}

/// Index of `Interface=` declarations found in service files.
#[derive(Debug, Default)]
pub struct ServiceFileDiscovery {
    dirs: Vec<PathBuf>,

    /// interface -> service, first declaration in sorted path order wins
    implementors: RwLock<IndexMap<String, String>>,
}

impl ServiceFileDiscovery {
    /// Scan `dirs` for `*.service` files. Missing directories are ignored.
    pub fn scan(dirs: Vec<PathBuf>) -> Self {
        let discovery = Self {
            dirs,
            implementors: RwLock::new(IndexMap::new()),
        };
        discovery.refresh();
        discovery
    }

    /// Re-read every service file, replacing the index.
    pub fn refresh(&self) {
        let mut files: Vec<PathBuf> = Vec::new();
        for dir in &self.dirs {
            files.extend(
                WalkDir::new(dir)
                    .follow_links(true)
                    .into_iter()
                    .filter_map(Result::ok)
                    .filter(|e| e.file_type().is_file())
                    .map(|e| e.into_path())
                    .filter(|p| p.extension().is_some_and(|ext| ext == "service")),
            );
        }
        files.sort();

        let mut implementors: IndexMap<String, String> = IndexMap::new();
        for path in &files {
            let contents = match std::fs::read_to_string(path) {
                Ok(contents) => contents,
                Err(e) => {
                    warn!("Skipping unreadable service file {}: {}", path.display(), e);
                    continue;
                }
            };

            let Some((service, interfaces)) = parse_service_file(&contents) else {
                continue;
            };

            for interface in interfaces {
                implementors.entry(interface).or_insert_with(|| service.clone());
            }
        }

        debug!(
            "Discovered {} interface implementors in {} service files",
            implementors.len(),
            files.len()
        );
        *self.implementors.write() = implementors;
    }

    pub fn dirs(&self) -> &[PathBuf] {
        &self.dirs
    }

    pub fn len(&self) -> usize {
        self.implementors.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.implementors.read().is_empty()
    }
}

impl ServiceDiscovery for ServiceFileDiscovery {
    fn implementor(&self, interface: &str) -> Option<String> {
        self.implementors.read().get(interface).cloned()
    }
}

/// `(Name, [Interface...])` of a service file, if it declares both.
fn parse_service_file(contents: &str) -> Option<(String, Vec<String>)> {
    let mut name: Option<String> = None;
    let mut interfaces: Vec<String> = Vec::new();

    for line in contents.lines().map(str::trim) {
        if let Some(value) = line.strip_prefix("Name=") {
            name = Some(value.trim().to_string());
        } else if let Some(value) = line.strip_prefix("Interface=") {
            interfaces.extend(
                value
                    .split(';')
                    .map(str::trim)
                    .filter(|i| !i.is_empty())
                    .map(str::to_string),
            );
        }
    }

    let name = name.filter(|n| !n.is_empty())?;
    (!interfaces.is_empty()).then_some((name, interfaces))
}
