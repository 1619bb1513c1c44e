//! Local filesystem backend.

use crate::client::{ElementReader, StorageClient};
use crate::config::Credential;
use crate::element::{ElementMeta, ElementRef};
use crate::error::CopyError;
use crate::filter::ElementFilter;
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::fs::Metadata;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::{AsyncRead, AsyncWriteExt};
use tracing::{debug, info, warn};

pub struct LocalClient {
    credential: Credential,
}

impl LocalClient {
    pub fn new(credential: Credential) -> Self {
        info!("local client {:?} ready", credential.name);
        Self { credential }
    }

    async fn is_dir(path: &Path) -> bool {
        fs::metadata(path).await.map(|m| m.is_dir()).unwrap_or(false)
    }

    async fn is_file(path: &Path) -> bool {
        fs::metadata(path).await.map(|m| m.is_file()).unwrap_or(false)
    }

    async fn require_container(location: &str) -> Result<()> {
        if !Self::is_dir(Path::new(location)).await {
            return Err(CopyError::ContainerNotFound(location.to_string()).logged());
        }
        Ok(())
    }

    async fn ensure_container(location: &str) -> Result<()> {
        let dir = Path::new(location);
        if !Self::is_dir(dir).await {
            warn!("directory {} does not exist, creating", dir.display());
            fs::create_dir_all(dir)
                .await
                .with_context(|| format!("create directory {}", dir.display()))?;
        }
        Ok(())
    }

    /// Source checks shared by move and copy. Returns both native paths, or
    /// `None` when they name the same file and there is nothing to do.
    async fn prepare_transfer(
        source: &ElementRef,
        destination: &ElementRef,
    ) -> Result<Option<(PathBuf, PathBuf)>> {
        let from = source.local_path();
        let to = destination.local_path();
        if !Self::is_file(&from).await {
            return Err(CopyError::ElementNotFound(from.display().to_string()).logged());
        }
        if source.same_target(destination) || Self::same_file(&from, &to).await {
            warn!("{} is its own destination, leaving it in place", from.display());
            return Ok(None);
        }
        Self::ensure_container(&destination.location).await?;
        if Self::is_file(&to).await {
            warn!("file {} already exists, overwriting", to.display());
        }
        Ok(Some((from, to)))
    }

    /// Resolves links and `..` so that aliases of one file compare equal.
    async fn same_file(a: &Path, b: &Path) -> bool {
        match (fs::canonicalize(a).await, fs::canonicalize(b).await) {
            (Ok(a), Ok(b)) => a == b,
            _ => false,
        }
    }
}

fn created_time(meta: &Metadata) -> Option<DateTime<Utc>> {
    meta.created()
        .or_else(|_| meta.modified())
        .ok()
        .map(DateTime::<Utc>::from)
}

#[cfg(unix)]
fn resolve_owner(path: &Path, meta: &Metadata) -> Result<String> {
    use std::os::unix::fs::MetadataExt;

    user_name(meta.uid())
        .ok_or_else(|| CopyError::OwnerResolutionFailed(path.display().to_string()).logged())
}

#[cfg(not(unix))]
fn resolve_owner(path: &Path, _meta: &Metadata) -> Result<String> {
    Err(CopyError::OwnerResolutionFailed(path.display().to_string()).logged())
}

#[cfg(unix)]
fn user_name(uid: u32) -> Option<String> {
    use std::ffi::CStr;

    let mut buf = vec![0 as libc::c_char; 4096];
    // SAFETY: `passwd` is plain data, zeroed is a valid initial state.
    let mut pwd: libc::passwd = unsafe { std::mem::zeroed() };
    let mut result: *mut libc::passwd = std::ptr::null_mut();
    // SAFETY: every pointer references a live local and `buf.len()` is the
    // real buffer size.
    let rc = unsafe { libc::getpwuid_r(uid, &mut pwd, buf.as_mut_ptr(), buf.len(), &mut result) };
    if rc != 0 || result.is_null() || pwd.pw_name.is_null() {
        return None;
    }
    // SAFETY: on success `pw_name` points into `buf`, which is still alive.
    let name = unsafe { CStr::from_ptr(pwd.pw_name) };
    Some(name.to_string_lossy().into_owned())
}

#[async_trait]
impl StorageClient for LocalClient {
    fn credential(&self) -> &Credential {
        &self.credential
    }

    async fn exists(&self, element: &ElementRef) -> Result<bool> {
        Ok(Self::is_file(&element.local_path()).await)
    }

    async fn list(&self, location: &str, filter: &ElementFilter) -> Result<Vec<ElementRef>> {
        Self::require_container(location).await?;

        let mut entries = fs::read_dir(location)
            .await
            .with_context(|| format!("read directory {location}"))?;
        let mut files = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            // follow symlinks, like a plain open would
            let meta = match fs::metadata(&path).await {
                Ok(meta) if meta.is_file() => meta,
                _ => continue,
            };
            files.push((entry.file_name().to_string_lossy().into_owned(), path, meta));
        }
        files.sort_by(|a, b| a.0.cmp(&b.0));

        let label = format!("local client {:?}", self.credential.name);
        let mut listing = filter.begin_listing(&label);
        let mut selected = Vec::new();
        for (name, path, meta) in files {
            let mut element = ElementMeta::new(name.clone(), meta.len());
            if let Some(created) = created_time(&meta) {
                element = element.with_created(created);
            }
            if filter.needs_owner() {
                element = element.with_owner(resolve_owner(&path, &meta)?);
            }
            if listing.check(&element) {
                selected.push(ElementRef::new(location, name));
            } else {
                debug!("{} filtered out", path.display());
            }
        }
        Ok(selected)
    }

    async fn read(&self, element: &ElementRef) -> Result<ElementReader> {
        Self::require_container(&element.location).await?;
        let path = element.local_path();
        if !Self::is_file(&path).await {
            return Err(CopyError::ElementNotFound(path.display().to_string()).logged());
        }
        let file = fs::File::open(&path)
            .await
            .with_context(|| format!("open {}", path.display()))?;
        Ok(Box::new(file))
    }

    async fn write(
        &self,
        element: &ElementRef,
        data: &mut (dyn AsyncRead + Send + Unpin),
    ) -> Result<()> {
        Self::ensure_container(&element.location).await?;
        let path = element.local_path();
        if Self::is_file(&path).await {
            warn!("file {} already exists, overwriting", path.display());
        }
        let mut file = fs::File::create(&path)
            .await
            .with_context(|| format!("create {}", path.display()))?;
        let written = tokio::io::copy(data, &mut file)
            .await
            .with_context(|| format!("write {}", path.display()))?;
        file.flush().await?;
        debug!("wrote {} bytes to {}", written, path.display());
        Ok(())
    }

    async fn move_within(&self, source: &ElementRef, destination: &ElementRef) -> Result<()> {
        let Some((from, to)) = Self::prepare_transfer(source, destination).await? else {
            return Ok(());
        };
        if let Err(err) = fs::rename(&from, &to).await {
            // rename cannot cross filesystems
            debug!("rename {} failed ({err}), copying instead", from.display());
            fs::copy(&from, &to)
                .await
                .with_context(|| format!("copy {} to {}", from.display(), to.display()))?;
            fs::remove_file(&from)
                .await
                .with_context(|| format!("remove {}", from.display()))?;
        }
        Ok(())
    }

    async fn copy_within(&self, source: &ElementRef, destination: &ElementRef) -> Result<()> {
        let Some((from, to)) = Self::prepare_transfer(source, destination).await? else {
            return Ok(());
        };
        fs::copy(&from, &to)
            .await
            .with_context(|| format!("copy {} to {}", from.display(), to.display()))?;
        Ok(())
    }

    async fn delete(&self, element: &ElementRef) -> Result<()> {
        Self::require_container(&element.location).await?;
        let path = element.local_path();
        if !Self::is_file(&path).await {
            warn!("file {} does not exist, nothing to delete", path.display());
            return Ok(());
        }
        fs::remove_file(&path)
            .await
            .with_context(|| format!("remove {}", path.display()))
    }

    async fn release(&self) -> Result<()> {
        debug!("local client {:?} released", self.credential.name);
        Ok(())
    }
}
