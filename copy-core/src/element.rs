use chrono::{DateTime, Utc};
use std::fmt;
use std::path::{Path, PathBuf};

/// Address of one element: the container it lives in and its leaf name.
///
/// For folder-based backends the location is a directory and the name a
/// file name. For the mail backend the location is a message lookup key and
/// the name an attachment name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ElementRef {
    pub location: String,
    pub name: String,
}

impl ElementRef {
    pub fn new(location: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            location: location.into(),
            name: name.into(),
        }
    }

    /// Same leaf name in another container.
    pub fn relocate(&self, location: impl Into<String>) -> Self {
        Self::new(location, self.name.clone())
    }

    /// Native path for the local filesystem.
    pub fn local_path(&self) -> PathBuf {
        Path::new(&self.location).join(&self.name)
    }

    /// Slash-separated path for FTP/SFTP servers.
    pub fn remote_path(&self) -> String {
        join_remote(&self.location, &self.name)
    }

    /// Both references name the same element, ignoring separator style and
    /// trailing slashes on the location.
    pub fn same_target(&self, other: &ElementRef) -> bool {
        self.name == other.name
            && normalized_location(&self.location) == normalized_location(&other.location)
    }
}

fn normalized_location(location: &str) -> String {
    let posix = as_posix_path(location);
    match posix.trim_end_matches('/') {
        "" if posix.starts_with('/') => "/".to_string(),
        trimmed => trimmed.to_string(),
    }
}

impl fmt::Display for ElementRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", join_remote(&self.location, &self.name))
    }
}

/// Normalise a path to forward slashes.
pub fn as_posix_path(path: &str) -> String {
    path.replace('\\', "/")
}

/// Join a remote directory and a leaf name with exactly one slash between.
pub fn join_remote(location: &str, name: &str) -> String {
    let location = as_posix_path(location);
    let trimmed = location.trim_end_matches('/');
    if trimmed.is_empty() {
        if location.starts_with('/') {
            format!("/{name}")
        } else {
            name.to_string()
        }
    } else {
        format!("{trimmed}/{name}")
    }
}

/// Every ancestor of a remote directory, root first, `/` itself excluded.
pub fn remote_ancestors(path: &str) -> Vec<String> {
    let path = as_posix_path(path);
    let mut dirs: Vec<String> = Path::new(&path)
        .ancestors()
        .filter(|p| !p.as_os_str().is_empty() && p.as_os_str() != "/")
        .map(|p| p.to_string_lossy().into_owned())
        .collect();
    dirs.reverse();
    dirs
}

/// Metadata a backend reports for a listed element. Fields a backend cannot
/// supply are `None` and make the matching filter predicate pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElementMeta {
    pub name: String,
    pub owner: Option<String>,
    pub created: Option<DateTime<Utc>>,
    pub size: u64,
}

impl ElementMeta {
    pub fn new(name: impl Into<String>, size: u64) -> Self {
        Self {
            name: name.into(),
            owner: None,
            created: None,
            size,
        }
    }

    pub fn with_owner(mut self, owner: impl Into<String>) -> Self {
        self.owner = Some(owner.into());
        self
    }

    pub fn with_created(mut self, created: DateTime<Utc>) -> Self {
        self.created = Some(created);
        self
    }
}
