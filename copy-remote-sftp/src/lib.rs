//! SFTP backend for Copy.

mod ssh_client;
mod utils;

use crate::utils::create_dir_all;
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use copy_core::{
    CopyError, Credential, ElementFilter, ElementMeta, ElementReader, ElementRef, StorageClient,
};
use russh::client::{AuthResult, Handle};
use russh::keys::{PrivateKey, PrivateKeyWithHashAlg};
use russh::Disconnect;
use russh_sftp::client::SftpSession;
use ssh_client::HostKeyCheck;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWriteExt};
use tracing::{debug, info, warn};

pub struct SftpClient {
    credential: Credential,
    session: Handle<HostKeyCheck>,
    sftp: SftpSession,
    released: AtomicBool,
}

impl SftpClient {
    pub async fn connect(credential: Credential) -> Result<Self> {
        let host = credential.host.clone();
        let port = credential.effective_port();

        let config = russh::client::Config::default();
        let handler = HostKeyCheck {
            pinned: credential.fingerprint.clone(),
        };
        let mut session = russh::client::connect(Arc::new(config), (host.as_str(), port), handler)
            .await
            .with_context(|| format!("connect to {host}:{port}"))?;

        let res = match &credential.private_key {
            Some(key) => {
                let key = load_private_key(key)?;
                let hash_alg = session.best_supported_rsa_hash().await?.flatten();
                session
                    .authenticate_publickey(
                        credential.username(),
                        PrivateKeyWithHashAlg::new(Arc::new(key), hash_alg),
                    )
                    .await?
            }
            None => {
                session
                    .authenticate_password(credential.username(), credential.password())
                    .await?
            }
        };
        if let AuthResult::Failure {
            remaining_methods,
            partial_success,
        } = res
        {
            return Err(anyhow!(
                "Authentication failed, remaining_methods: {:?}, partial_success: {}",
                remaining_methods,
                partial_success
            ));
        }

        let channel = session.channel_open_session().await?;
        channel.request_subsystem(true, "sftp").await?;
        let sftp = SftpSession::new(channel.into_stream()).await?;
        info!(
            "sftp client {:?} connected, current path: {:?}",
            credential.name,
            sftp.canonicalize(".").await?
        );
        Ok(Self {
            credential,
            session,
            sftp,
            released: AtomicBool::new(false),
        })
    }

    fn ensure_open(&self) -> Result<()> {
        if self.released.load(Ordering::Acquire) {
            return Err(CopyError::ClientReleased(self.credential.name.clone()).logged());
        }
        Ok(())
    }

    async fn is_dir(&self, path: &str) -> bool {
        self.sftp
            .metadata(path)
            .await
            .map(|m| m.is_dir())
            .unwrap_or(false)
    }

    async fn is_file(&self, path: &str) -> bool {
        self.sftp
            .metadata(path)
            .await
            .map(|m| !m.is_dir())
            .unwrap_or(false)
    }

    async fn require_container(&self, location: &str) -> Result<()> {
        if !self.is_dir(location).await {
            return Err(CopyError::ContainerNotFound(location.to_string()).logged());
        }
        Ok(())
    }

    async fn ensure_container(&self, location: &str) -> Result<()> {
        if !self.is_dir(location).await {
            warn!("directory {} does not exist, creating", location);
            create_dir_all(&self.sftp, location).await?;
        }
        Ok(())
    }

    async fn require_element(&self, element: &ElementRef) -> Result<String> {
        let path = element.remote_path();
        if !self.is_file(&path).await {
            return Err(CopyError::ElementNotFound(path).logged());
        }
        Ok(path)
    }

    /// Prepares the destination of a write/copy/move: container present,
    /// pre-existing element removed with a warning.
    async fn prepare_destination(&self, element: &ElementRef) -> Result<String> {
        self.ensure_container(&element.location).await?;
        let path = element.remote_path();
        if self.is_file(&path).await {
            warn!("file {} already exists, overwriting", path);
            self.sftp.remove_file(path.clone()).await?;
        }
        Ok(path)
    }

    /// Source and destination paths of a move/copy, or `None` when both
    /// resolve to the same file on the server.
    async fn transfer_paths(
        &self,
        source: &ElementRef,
        destination: &ElementRef,
    ) -> Result<Option<(String, String)>> {
        let from = self.require_element(source).await?;
        if source.same_target(destination) || self.same_file(&from, destination).await {
            warn!("{} is its own destination, leaving it in place", from);
            return Ok(None);
        }
        let to = self.prepare_destination(destination).await?;
        Ok(Some((from, to)))
    }

    async fn same_file(&self, from: &str, destination: &ElementRef) -> bool {
        let to = destination.remote_path();
        if !self.is_file(&to).await {
            return false;
        }
        match (
            self.sftp.canonicalize(from.to_string()).await,
            self.sftp.canonicalize(to).await,
        ) {
            (Ok(a), Ok(b)) => a == b,
            _ => false,
        }
    }
}

fn load_private_key(key: &str) -> Result<PrivateKey> {
    if key.trim_start().starts_with("-----BEGIN") {
        russh::keys::decode_secret_key(key, None).context("decode private key")
    } else {
        russh::keys::load_secret_key(key, None).with_context(|| format!("load private key {key}"))
    }
}

fn mtime(secs: Option<u32>) -> Option<DateTime<Utc>> {
    secs.and_then(|s| DateTime::<Utc>::from_timestamp(i64::from(s), 0))
}

#[async_trait]
impl StorageClient for SftpClient {
    fn credential(&self) -> &Credential {
        &self.credential
    }

    async fn exists(&self, element: &ElementRef) -> Result<bool> {
        self.ensure_open()?;
        Ok(self.is_file(&element.remote_path()).await)
    }

    async fn list(&self, location: &str, filter: &ElementFilter) -> Result<Vec<ElementRef>> {
        self.ensure_open()?;
        self.require_container(location).await?;

        let mut files: Vec<(String, russh_sftp::client::fs::Metadata)> = self
            .sftp
            .read_dir(location)
            .await?
            .filter(|entry| {
                let name = entry.file_name();
                name != "." && name != ".." && !entry.metadata().is_dir()
            })
            .map(|entry| (entry.file_name(), entry.metadata()))
            .collect();
        files.sort_by(|a, b| a.0.cmp(&b.0));

        let label = format!("sftp client {:?}", self.credential.name);
        let mut listing = filter.begin_listing(&label);
        let mut selected = Vec::new();
        for (name, meta) in files {
            // SFTP v3 carries no owner name, so the author predicate is skipped
            let mut element = ElementMeta::new(name.clone(), meta.size.unwrap_or(0));
            if let Some(modified) = mtime(meta.mtime) {
                element = element.with_created(modified);
            }
            if listing.check(&element) {
                selected.push(ElementRef::new(location, name));
            } else {
                debug!("{}/{} filtered out", location, name);
            }
        }
        Ok(selected)
    }

    async fn read(&self, element: &ElementRef) -> Result<ElementReader> {
        self.ensure_open()?;
        self.require_container(&element.location).await?;
        let path = self.require_element(element).await?;
        let file = self
            .sftp
            .open(path.clone())
            .await
            .with_context(|| format!("open {path}"))?;
        Ok(Box::new(file))
    }

    async fn write(
        &self,
        element: &ElementRef,
        data: &mut (dyn AsyncRead + Send + Unpin),
    ) -> Result<()> {
        self.ensure_open()?;
        let path = self.prepare_destination(element).await?;
        let mut remote_file = self.sftp.create(path.clone()).await?;
        let written = tokio::io::copy(data, &mut remote_file)
            .await
            .with_context(|| format!("upload {path}"))?;
        remote_file.shutdown().await?;
        debug!("uploaded {} bytes to {}", written, path);
        Ok(())
    }

    async fn move_within(&self, source: &ElementRef, destination: &ElementRef) -> Result<()> {
        self.ensure_open()?;
        let Some((from, to)) = self.transfer_paths(source, destination).await? else {
            return Ok(());
        };
        self.sftp
            .rename(from.clone(), to.clone())
            .await
            .with_context(|| format!("rename {from} to {to}"))?;
        Ok(())
    }

    async fn copy_within(&self, source: &ElementRef, destination: &ElementRef) -> Result<()> {
        self.ensure_open()?;
        let Some((from, to)) = self.transfer_paths(source, destination).await? else {
            return Ok(());
        };
        // SFTP v3 has no server-side copy
        let mut reader = self.sftp.open(from.clone()).await?;
        let mut writer = self.sftp.create(to.clone()).await?;
        tokio::io::copy(&mut reader, &mut writer)
            .await
            .with_context(|| format!("copy {from} to {to}"))?;
        writer.shutdown().await?;
        Ok(())
    }

    async fn delete(&self, element: &ElementRef) -> Result<()> {
        self.ensure_open()?;
        self.require_container(&element.location).await?;
        let path = element.remote_path();
        if !self.is_file(&path).await {
            warn!("file {} does not exist, nothing to delete", path);
            return Ok(());
        }
        self.sftp
            .remove_file(path.clone())
            .await
            .with_context(|| format!("remove {path}"))
    }

    async fn release(&self) -> Result<()> {
        if self.released.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        self.sftp.close().await?;
        self.session
            .disconnect(Disconnect::ByApplication, "", "en")
            .await?;
        info!("sftp client {:?} disconnected", self.credential.name);
        Ok(())
    }
}
