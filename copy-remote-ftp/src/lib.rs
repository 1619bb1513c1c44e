//! FTP backend for Copy.
//!
//! The FTP session is blocking, so every command runs on the blocking pool
//! while the session itself sits behind a mutex. Sessions upgrade to TLS
//! with `AUTH TLS` when the server offers it.

mod listing;
mod tls;

use crate::listing::parse_entry;
use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use copy_core::{
    remote_ancestors, CopyError, Credential, ElementFilter, ElementMeta, ElementReader, ElementRef,
    StorageClient,
};
use std::io::Cursor;
use std::sync::{Arc, Mutex};
use suppaftp::types::FileType;
use suppaftp::{NativeTlsConnector, NativeTlsFtpStream};
use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::{debug, info, warn};

pub struct FtpClient {
    credential: Credential,
    stream: Arc<Mutex<Option<NativeTlsFtpStream>>>,
}

impl FtpClient {
    pub async fn connect(credential: Credential) -> Result<Self> {
        let pin = credential
            .fingerprint
            .as_deref()
            .map(tls::parse_fingerprint)
            .transpose()?;
        let host = credential.host.clone();
        let port = credential.effective_port();
        let username = credential.username().to_string();
        let password = credential.password().to_string();

        let stream = tokio::task::spawn_blocking(move || -> Result<NativeTlsFtpStream> {
            let mut ftp = open_session(&host, port, pin)?;
            ftp.login(&username, &password)
                .with_context(|| format!("login to {host}:{port} as {username:?}"))?;
            ftp.transfer_type(FileType::Binary)?;
            Ok(ftp)
        })
        .await??;

        info!("ftp client {:?} connected", credential.name);
        Ok(Self {
            credential,
            stream: Arc::new(Mutex::new(Some(stream))),
        })
    }

    /// Run `op` against the live session on the blocking pool.
    async fn with_stream<T, F>(&self, op: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut NativeTlsFtpStream) -> Result<T> + Send + 'static,
    {
        let stream = Arc::clone(&self.stream);
        let name = self.credential.name.clone();
        tokio::task::spawn_blocking(move || {
            let mut guard = stream
                .lock()
                .map_err(|_| anyhow!("ftp session of {name:?} is poisoned"))?;
            let ftp = guard
                .as_mut()
                .ok_or_else(|| CopyError::ClientReleased(name.clone()).logged())?;
            op(ftp)
        })
        .await?
    }
}

/// Control connection upgraded with `AUTH TLS`. With a pinned fingerprint
/// the server certificate must match it and TLS is mandatory. Without one,
/// a server that cannot do TLS gets a plain session and a warning.
fn open_session(host: &str, port: u16, pin: Option<[u8; 32]>) -> Result<NativeTlsFtpStream> {
    if let Some(expected) = pin {
        let der = tls::server_certificate(host, port)?;
        let actual = tls::sha256(&der);
        if actual != expected {
            bail!(
                "certificate of {host}:{port} has SHA-256 fingerprint {}, not the configured {}",
                hex::encode(actual),
                hex::encode(expected)
            );
        }
        debug!("certificate of {host}:{port} matches the configured fingerprint");
        return secure_session(host, port);
    }
    match secure_session(host, port) {
        Ok(ftp) => Ok(ftp),
        Err(err) => {
            warn!("no TLS with {host}:{port} ({err:#}), falling back to plain FTP");
            NativeTlsFtpStream::connect((host, port))
                .with_context(|| format!("connect to {host}:{port}"))
        }
    }
}

fn secure_session(host: &str, port: u16) -> Result<NativeTlsFtpStream> {
    let connector = NativeTlsConnector::from(tls::session_connector()?);
    let ftp = NativeTlsFtpStream::connect((host, port))
        .with_context(|| format!("connect to {host}:{port}"))?;
    ftp.into_secure(connector, host)
        .with_context(|| format!("negotiate TLS with {host}:{port}"))
}

fn dir_exists(ftp: &mut NativeTlsFtpStream, dir: &str) -> Result<bool> {
    let home = ftp.pwd()?;
    if ftp.cwd(dir).is_err() {
        return Ok(false);
    }
    ftp.cwd(&home)?;
    Ok(true)
}

fn file_exists(ftp: &mut NativeTlsFtpStream, path: &str) -> bool {
    ftp.size(path).is_ok()
}

fn require_container(ftp: &mut NativeTlsFtpStream, location: &str) -> Result<()> {
    if !dir_exists(ftp, location)? {
        return Err(CopyError::ContainerNotFound(location.to_string()).logged());
    }
    Ok(())
}

fn ensure_container(ftp: &mut NativeTlsFtpStream, location: &str) -> Result<()> {
    if dir_exists(ftp, location)? {
        return Ok(());
    }
    warn!("directory {} does not exist, creating", location);
    for dir in remote_ancestors(location) {
        if !dir_exists(ftp, &dir)? {
            ftp.mkdir(&dir)
                .with_context(|| format!("create directory {dir}"))?;
        }
    }
    Ok(())
}

fn require_element(ftp: &mut NativeTlsFtpStream, element: &ElementRef) -> Result<String> {
    let path = element.remote_path();
    if !file_exists(ftp, &path) {
        return Err(CopyError::ElementNotFound(path).logged());
    }
    Ok(path)
}

/// Container present; an existing element is removed so that servers
/// refusing to overwrite on `RNTO` behave like the others.
fn prepare_destination(ftp: &mut NativeTlsFtpStream, element: &ElementRef) -> Result<String> {
    ensure_container(ftp, &element.location)?;
    let path = element.remote_path();
    if file_exists(ftp, &path) {
        warn!("file {} already exists, overwriting", path);
        ftp.rm(&path)?;
    }
    Ok(path)
}

/// Source and destination paths of a move/copy, or `None` when both name
/// the same file.
fn transfer_paths(
    ftp: &mut NativeTlsFtpStream,
    source: &ElementRef,
    destination: &ElementRef,
) -> Result<Option<(String, String)>> {
    let from = require_element(ftp, source)?;
    if source.same_target(destination) {
        warn!("{} is its own destination, leaving it in place", from);
        return Ok(None);
    }
    let to = prepare_destination(ftp, destination)?;
    Ok(Some((from, to)))
}

#[async_trait]
impl StorageClient for FtpClient {
    fn credential(&self) -> &Credential {
        &self.credential
    }

    async fn exists(&self, element: &ElementRef) -> Result<bool> {
        let path = element.remote_path();
        self.with_stream(move |ftp| Ok(file_exists(ftp, &path)))
            .await
    }

    async fn list(&self, location: &str, filter: &ElementFilter) -> Result<Vec<ElementRef>> {
        let dir = location.to_string();
        let with_owner = filter.needs_owner();
        let mut entries: Vec<ElementMeta> = self
            .with_stream(move |ftp| {
                require_container(ftp, &dir)?;
                let lines = ftp
                    .list(Some(dir.as_str()))
                    .with_context(|| format!("list {dir}"))?;
                Ok(lines
                    .iter()
                    .filter_map(|line| parse_entry(line, with_owner))
                    .collect())
            })
            .await?;
        entries.sort_by(|a, b| a.name.cmp(&b.name));

        let label = format!("ftp client {:?}", self.credential.name);
        let mut listing = filter.begin_listing(&label);
        let mut selected = Vec::new();
        for meta in entries {
            if listing.check(&meta) {
                selected.push(ElementRef::new(location, meta.name));
            } else {
                debug!("{}/{} filtered out", location, meta.name);
            }
        }
        Ok(selected)
    }

    async fn read(&self, element: &ElementRef) -> Result<ElementReader> {
        let element = element.clone();
        let buffer = self
            .with_stream(move |ftp| {
                require_container(ftp, &element.location)?;
                let path = require_element(ftp, &element)?;
                ftp.retr_as_buffer(&path)
                    .with_context(|| format!("download {path}"))
            })
            .await?;
        Ok(Box::new(buffer))
    }

    async fn write(
        &self,
        element: &ElementRef,
        data: &mut (dyn AsyncRead + Send + Unpin),
    ) -> Result<()> {
        let mut bytes = Vec::new();
        data.read_to_end(&mut bytes).await?;
        let element = element.clone();
        self.with_stream(move |ftp| {
            let path = prepare_destination(ftp, &element)?;
            let written = ftp
                .put_file(&path, &mut Cursor::new(bytes))
                .with_context(|| format!("upload {path}"))?;
            debug!("uploaded {} bytes to {}", written, path);
            Ok(())
        })
        .await
    }

    async fn move_within(&self, source: &ElementRef, destination: &ElementRef) -> Result<()> {
        let (source, destination) = (source.clone(), destination.clone());
        self.with_stream(move |ftp| {
            let Some((from, to)) = transfer_paths(ftp, &source, &destination)? else {
                return Ok(());
            };
            ftp.rename(&from, &to)
                .with_context(|| format!("rename {from} to {to}"))?;
            Ok(())
        })
        .await
    }

    async fn copy_within(&self, source: &ElementRef, destination: &ElementRef) -> Result<()> {
        let (source, destination) = (source.clone(), destination.clone());
        self.with_stream(move |ftp| {
            let Some((from, to)) = transfer_paths(ftp, &source, &destination)? else {
                return Ok(());
            };
            // no server-side copy in FTP
            let mut buffer = ftp
                .retr_as_buffer(&from)
                .with_context(|| format!("download {from}"))?;
            ftp.put_file(&to, &mut buffer)
                .with_context(|| format!("upload {to}"))?;
            Ok(())
        })
        .await
    }

    async fn delete(&self, element: &ElementRef) -> Result<()> {
        let element = element.clone();
        self.with_stream(move |ftp| {
            require_container(ftp, &element.location)?;
            let path = element.remote_path();
            if !file_exists(ftp, &path) {
                warn!("file {} does not exist, nothing to delete", path);
                return Ok(());
            }
            ftp.rm(&path).with_context(|| format!("remove {path}"))?;
            Ok(())
        })
        .await
    }

    async fn release(&self) -> Result<()> {
        let stream = Arc::clone(&self.stream);
        let name = self.credential.name.clone();
        tokio::task::spawn_blocking(move || -> Result<()> {
            let taken = stream
                .lock()
                .map_err(|_| anyhow!("ftp session of {name:?} is poisoned"))?
                .take();
            if let Some(mut ftp) = taken {
                ftp.quit()?;
                info!("ftp client {:?} disconnected", name);
            }
            Ok(())
        })
        .await?
    }
}
