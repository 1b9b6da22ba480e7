//! Things actions can be resolved for.

use std::path::Path;

use url::Url;

/// The three target variants the classifier understands.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Target {
    /// A file or content URI; classified by its mime type.
    Content { uri: String },

    /// A typed object URI (e.g. a semantic-store resource); classified by the
    /// semantic conditions it satisfies and by its URI scheme.
    Object { uri: String },

    /// A span of free text found by the highlight pattern `pattern`.
    Fragment { text: String, pattern: String },
}

impl Target {
    pub fn content<S: Into<String>>(uri: S) -> Self {
        Self::Content { uri: uri.into() }
    }

    pub fn object<S: Into<String>>(uri: S) -> Self {
        Self::Object { uri: uri.into() }
    }

    pub fn fragment<S1: Into<String>, S2: Into<String>>(text: S1, pattern: S2) -> Self {
        Self::Fragment {
            text: text.into(),
            pattern: pattern.into(),
        }
    }

    /// Interpret a command-line argument: `file:` URIs and absolute paths
    /// are content, everything else is an object URI.
    pub fn from_arg(arg: &str) -> Self {
        if Path::new(arg).is_absolute()
            && let Ok(url) = Url::from_file_path(arg)
        {
            return Self::content(url.to_string());
        }

        match scheme_of(arg) {
            Some(scheme) if scheme == "file" => Self::content(arg),
            _ => Self::object(arg),
        }
    }

    /// The string handed to the action when it is triggered.
    pub fn value(&self) -> &str {
        match self {
            Self::Content { uri } | Self::Object { uri } => uri,
            Self::Fragment { text, .. } => text,
        }
    }

    pub fn scheme(&self) -> Option<String> {
        match self {
            Self::Content { uri } | Self::Object { uri } => scheme_of(uri),
            Self::Fragment { .. } => None,
        }
    }
}

/// Lowercased URI scheme, if `uri` has a syntactically valid one.
pub fn scheme_of(uri: &str) -> Option<String> {
    if let Ok(url) = Url::parse(uri) {
        return Some(url.scheme().to_string());
    }

    let (scheme, _) = uri.split_once(':')?;
    let mut chars = scheme.chars();
    let valid = chars.next().is_some_and(|c| c.is_ascii_alphabetic())
        && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'));

    valid.then(|| scheme.to_ascii_lowercase())
}
