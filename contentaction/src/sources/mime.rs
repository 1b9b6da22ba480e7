//! Mime type detection for content URIs.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, warn};
use url::Url;

/// Resolves the mime type of a content URI.
#[async_trait]
pub trait MimeSniffer: Send + Sync {
    async fn mime_type(&self, uri: &str) -> Option<String>;
}

const BUILTIN_TYPES: &[(&str, &str)] = &[
    ("txt", "text/plain"),
    ("html", "text/html"),
    ("htm", "text/html"),
    ("csv", "text/csv"),
    ("vcf", "text/vcard"),
    ("ics", "text/calendar"),
    ("jpg", "image/jpeg"),
    ("jpeg", "image/jpeg"),
    ("png", "image/png"),
    ("gif", "image/gif"),
    ("svg", "image/svg+xml"),
    ("webp", "image/webp"),
    ("mp3", "audio/mpeg"),
    ("ogg", "audio/ogg"),
    ("wav", "audio/x-wav"),
    ("mp4", "video/mp4"),
    ("mkv", "video/x-matroska"),
    ("avi", "video/x-msvideo"),
    ("pdf", "application/pdf"),
    ("zip", "application/zip"),
    ("json", "application/json"),
    ("xml", "application/xml"),
];

/// Guesses the mime type from the file extension.
#[derive(Debug, Clone)]
pub struct ExtensionSniffer {
    by_extension: HashMap<String, String>,
}

impl Default for ExtensionSniffer {
    fn default() -> Self {
        Self::builtin()
    }
}

impl ExtensionSniffer {
    /// The small built-in table only.
    pub fn builtin() -> Self {
        Self {
            by_extension: BUILTIN_TYPES
                .iter()
                .map(|(ext, mime)| (ext.to_string(), mime.to_string()))
                .collect(),
        }
    }

    /// Built-in table extended with `/etc/mime.types`, when readable.
    pub fn system() -> Self {
        let mut sniffer = Self::builtin();
        match std::fs::read_to_string("/etc/mime.types") {
            Ok(contents) => sniffer.add_mime_types(&contents),
            Err(e) => debug!("/etc/mime.types not loaded: {}", e),
        }
        sniffer
    }

    /// Merge a `mime.types` style table (`type/subtype ext1 ext2 ...`).
    /// Later entries override earlier ones for the same extension.
    pub fn add_mime_types(&mut self, contents: &str) {
        for line in contents.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let mut fields = line.split_whitespace();
            let Some(mime) = fields.next().filter(|m| m.contains('/')) else {
                continue;
            };

            for ext in fields {
                self.by_extension
                    .insert(ext.to_ascii_lowercase(), mime.to_ascii_lowercase());
            }
        }
    }

    pub fn for_path(&self, path: &Path) -> Option<String> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        self.by_extension.get(&ext).cloned()
    }

    /// Extension of the URI's path component, whatever the scheme.
    pub fn for_uri(&self, uri: &str) -> Option<String> {
        match Url::parse(uri) {
            Ok(url) => {
                let last = url.path_segments()?.next_back()?.to_string();
                self.for_path(Path::new(&last))
            }
            Err(_) => self.for_path(Path::new(uri)),
        }
    }
}

#[async_trait]
impl MimeSniffer for ExtensionSniffer {
    async fn mime_type(&self, uri: &str) -> Option<String> {
        self.for_uri(uri)
    }
}

/// Local path for `file://` URIs and absolute paths.
pub fn local_path(uri: &str) -> Option<PathBuf> {
    if Path::new(uri).is_absolute() {
        return Some(PathBuf::from(uri));
    }

    let url = Url::parse(uri).ok()?;
    if url.scheme() != "file" {
        return None;
    }
    url.to_file_path().ok()
}

/// Asks `file --brief --mime-type` for local files, falling back to the
/// extension table when the command is missing, fails or times out.
#[derive(Debug, Clone)]
pub struct FileCommandSniffer {
    fallback: ExtensionSniffer,

    timeout: Duration,

    program: String,
}

impl FileCommandSniffer {
    pub fn new(timeout: Duration) -> Self {
        Self {
            fallback: ExtensionSniffer::system(),
            timeout,
            program: "file".to_string(),
        }
    }

    pub fn with_fallback(mut self, fallback: ExtensionSniffer) -> Self {
        self.fallback = fallback;
        self
    }

    pub fn with_program<S: Into<String>>(mut self, program: S) -> Self {
        self.program = program.into();
        self
    }

    async fn run_file_command(&self, path: &Path) -> Option<String> {
        let output = Command::new(&self.program)
            .arg("--brief")
            .arg("--mime-type")
            .arg("--")
            .arg(path)
            .kill_on_drop(true)
            .output();

        let output = match tokio::time::timeout(self.timeout, output).await {
            Ok(Ok(output)) if output.status.success() => output,
            Ok(Ok(output)) => {
                debug!("{} exited with {} for {}", self.program, output.status, path.display());
                return None;
            }
            Ok(Err(e)) => {
                debug!("{} unavailable: {}", self.program, e);
                return None;
            }
            Err(_) => {
                warn!("{} timed out for {}", self.program, path.display());
                return None;
            }
        };

        let mime = String::from_utf8_lossy(&output.stdout).trim().to_ascii_lowercase();
        // `file` answers generic types for unknown content; prefer the extension then.
        match mime.as_str() {
            "" | "application/octet-stream" | "inode/x-empty" => None,
            m if m.contains('/') => Some(mime),
            _ => None,
        }
    }
}

#[async_trait]
impl MimeSniffer for FileCommandSniffer {
    async fn mime_type(&self, uri: &str) -> Option<String> {
        if let Some(path) = local_path(uri)
            && path.exists()
            && let Some(mime) = self.run_file_command(&path).await
        {
            return Some(mime);
        }

        self.fallback.for_uri(uri)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_table_is_case_insensitive() {
        let sniffer = ExtensionSniffer::builtin();
        assert_eq!(
            sniffer.for_path(Path::new("/tmp/PHOTO.JPG")).as_deref(),
            Some("image/jpeg")
        );
        assert_eq!(sniffer.for_path(Path::new("/tmp/noext")), None);
    }

    #[test]
    fn test_mime_types_file_overrides() {
        let mut sniffer = ExtensionSniffer::builtin();
        sniffer.add_mime_types(
            "# comment\napplication/x-custom  cst custom\n\nnot-a-type foo\ntext/x-log log\n",
        );

        assert_eq!(
            sniffer.for_path(Path::new("a.cst")).as_deref(),
            Some("application/x-custom")
        );
        assert_eq!(sniffer.for_path(Path::new("a.log")).as_deref(), Some("text/x-log"));
        assert_eq!(sniffer.for_path(Path::new("a.foo")), None);
    }

    #[test]
    fn test_for_uri_uses_last_path_segment() {
        let sniffer = ExtensionSniffer::builtin();
        assert_eq!(
            sniffer.for_uri("file:///home/user/a%20b.png").as_deref(),
            Some("image/png")
        );
        assert_eq!(
            sniffer.for_uri("http://example.com/doc.pdf?x=1").as_deref(),
            Some("application/pdf")
        );
    }

    #[test]
    fn test_local_path() {
        assert_eq!(local_path("/tmp/a.txt"), Some(PathBuf::from("/tmp/a.txt")));
        assert_eq!(
            local_path("file:///tmp/a%20b.txt"),
            Some(PathBuf::from("/tmp/a b.txt"))
        );
        assert_eq!(local_path("http://example.com/a.txt"), None);
    }

    #[tokio::test]
    async fn test_missing_file_command_falls_back_to_extension() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("song.mp3");
        std::fs::write(&path, b"not really audio").unwrap();

        let sniffer = FileCommandSniffer::new(Duration::from_secs(1))
            .with_fallback(ExtensionSniffer::builtin())
            .with_program("/nonexistent/file-for-tests");

        assert_eq!(
            sniffer.mime_type(path.to_str().unwrap()).await.as_deref(),
            Some("audio/mpeg")
        );
    }
}
