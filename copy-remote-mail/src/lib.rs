//! Mailbox backend for Copy, spoken over IMAP.
//!
//! A container is a folder plus a subject key (see [`MailLocation`]) and its
//! elements are the attachments of the unseen, undeleted messages whose
//! subject contains that key. Writing appends a fresh message carrying one
//! attachment. Deleting flags the carrying message `\Deleted` without
//! expunging it, after appending a copy of it that keeps its other
//! attachments.

mod location;
mod message;
mod removal;

pub use crate::location::MailLocation;

use crate::message::Parsed;
use crate::removal::{plan_removal, Removal};
use anyhow::{anyhow, Context, Result};
use async_imap::Session;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use copy_core::{
    CopyError, Credential, ElementFilter, ElementMeta, ElementReader, ElementRef, StorageClient,
};
use futures::TryStreamExt;
use std::collections::HashSet;
use std::io::Cursor;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::sync::Mutex;
use tokio_util::compat::{Compat, TokioAsyncReadCompatExt};
use tracing::{debug, info, warn};

type TlsStream = async_native_tls::TlsStream<Compat<tokio::net::TcpStream>>;
type ImapSession = Session<TlsStream>;

/// UIDs fetched per `FETCH` command.
const FETCH_PAGE: usize = 50;

/// A message matched by a location, already parsed.
struct Fetched {
    uid: u32,
    received: Option<DateTime<Utc>>,
    parsed: Parsed,
}

impl Fetched {
    fn attachment(&self, name: &str) -> Option<&[u8]> {
        self.parsed
            .attachments
            .iter()
            .find(|part| part.name == name)
            .map(|part| part.data.as_slice())
    }
}

pub struct MailClient {
    credential: Credential,
    sender: String,
    session: Mutex<Option<ImapSession>>,
}

impl MailClient {
    pub async fn connect(credential: Credential) -> Result<Self> {
        if credential.fingerprint.is_some() {
            warn!(
                "mail client {:?}: fingerprint pinning is not supported, relying on the system trust store",
                credential.name
            );
        }
        let host = server_host(&credential)?;
        let port = credential.effective_port();

        let stream = tokio::net::TcpStream::connect((host.as_str(), port))
            .await
            .with_context(|| format!("connect to {host}:{port}"))?;
        let tls_stream = async_native_tls::TlsConnector::new()
            .connect(&host, stream.compat())
            .await
            .with_context(|| format!("TLS handshake with {host}"))?;
        let client = async_imap::Client::new(tls_stream);
        let session = client
            .login(credential.username(), credential.password())
            .await
            .map_err(|(err, _client)| err)
            .with_context(|| format!("login to {host} as {:?}", credential.username()))?;

        info!("mail client {:?} connected to {}", credential.name, host);
        Ok(Self {
            sender: sender_address(&credential),
            credential,
            session: Mutex::new(Some(session)),
        })
    }

    fn released(&self) -> anyhow::Error {
        CopyError::ClientReleased(self.credential.name.clone()).logged()
    }

    /// Messages matching `location`, or `None` when its folder does not exist.
    async fn matching(
        session: &mut ImapSession,
        location: &MailLocation,
    ) -> Result<Option<Vec<Fetched>>> {
        match session.select(&location.folder).await {
            Ok(_) => {}
            Err(err) if folder_missing(&err) => {
                debug!("folder {} not selectable: {}", location.folder, err);
                return Ok(None);
            }
            Err(err) => {
                return Err(err).with_context(|| format!("select folder {}", location.folder));
            }
        }
        let mut uids: Vec<u32> = session
            .uid_search(location.search_query())
            .await
            .with_context(|| format!("search {location}"))?
            .into_iter()
            .collect();
        uids.sort_unstable();

        let mut messages = Vec::with_capacity(uids.len());
        for page in uids.chunks(FETCH_PAGE) {
            let set = page
                .iter()
                .map(u32::to_string)
                .collect::<Vec<_>>()
                .join(",");
            let fetched: Vec<_> = session
                .uid_fetch(&set, "(UID INTERNALDATE BODY.PEEK[])")
                .await
                .with_context(|| format!("fetch {location}"))?
                .try_collect()
                .await?;
            for fetch in fetched {
                let (Some(uid), Some(body)) = (fetch.uid, fetch.body()) else {
                    continue;
                };
                match message::parse(body) {
                    Some(parsed) => messages.push(Fetched {
                        uid,
                        received: fetch.internal_date().map(|d| d.with_timezone(&Utc)),
                        parsed,
                    }),
                    None => debug!("message {} in {} could not be parsed", uid, location),
                }
            }
        }
        Ok(Some(messages))
    }

    /// Like [`Self::matching`] but a missing folder is `ContainerNotFound`.
    async fn require_matching(
        session: &mut ImapSession,
        location: &MailLocation,
    ) -> Result<Vec<Fetched>> {
        match Self::matching(session, location).await? {
            Some(messages) => Ok(messages),
            None => Err(CopyError::ContainerNotFound(location.to_string()).logged()),
        }
    }

    async fn flag_deleted(session: &mut ImapSession, uids: &[u32]) -> Result<()> {
        if uids.is_empty() {
            return Ok(());
        }
        let set = uids
            .iter()
            .map(u32::to_string)
            .collect::<Vec<_>>()
            .join(",");
        let _: Vec<_> = session
            .uid_store(&set, "+FLAGS (\\Deleted)")
            .await?
            .try_collect()
            .await?;
        Ok(())
    }

    async fn fetch_attachment(session: &mut ImapSession, element: &ElementRef) -> Result<Vec<u8>> {
        let location = MailLocation::parse(&element.location);
        let messages = Self::require_matching(session, &location).await?;
        messages
            .iter()
            .find_map(|message| message.attachment(&element.name))
            .map(<[u8]>::to_vec)
            .ok_or_else(|| CopyError::ElementNotFound(element.to_string()).logged())
    }

    async fn append_attachment(
        &self,
        session: &mut ImapSession,
        element: &ElementRef,
        data: Vec<u8>,
    ) -> Result<()> {
        let location = MailLocation::parse(&element.location);
        let existing = match Self::matching(session, &location).await? {
            Some(messages) => messages,
            None => {
                warn!("folder {} does not exist, creating", location.folder);
                session
                    .create(&location.folder)
                    .await
                    .with_context(|| format!("create folder {}", location.folder))?;
                Vec::new()
            }
        };
        let removal = plan_removal(&existing, &element.name);
        if !removal.is_empty() {
            warn!("attachment {} already exists, overwriting", element);
            self.apply_removal(session, &location, removal).await?;
        }

        let size = data.len();
        let part = message::Part::new(element.name.clone(), data);
        let raw = message::compose(&self.sender, &location.key, vec![part])?;
        session
            .append(&location.folder, None, None, &raw)
            .await
            .with_context(|| format!("append to {}", location.folder))?;
        debug!("appended {} bytes as {}", size, element);
        Ok(())
    }

    async fn soft_delete(&self, session: &mut ImapSession, element: &ElementRef) -> Result<()> {
        let location = MailLocation::parse(&element.location);
        let messages = Self::require_matching(session, &location).await?;
        let removal = plan_removal(&messages, &element.name);
        if removal.is_empty() {
            warn!("attachment {} does not exist, nothing to delete", element);
            return Ok(());
        }
        self.apply_removal(session, &location, removal).await
    }

    /// Appends the survivors of a removal, then flags the messages they were
    /// cut from. A failure in between leaves duplicates, never losses.
    async fn apply_removal(
        &self,
        session: &mut ImapSession,
        location: &MailLocation,
        removal: Removal,
    ) -> Result<()> {
        for survivor in removal.survivors {
            let subject = survivor.subject.as_deref().unwrap_or(&location.key);
            let raw = match survivor.sender.as_deref() {
                Some(sender) => message::compose(sender, subject, survivor.parts.clone())
                    .or_else(|err| {
                        debug!("keeping own sender, original one rejected: {err:#}");
                        message::compose(&self.sender, subject, survivor.parts.clone())
                    })?,
                None => message::compose(&self.sender, subject, survivor.parts.clone())?,
            };
            session
                .append(&location.folder, None, survivor.internal_date().as_deref(), &raw)
                .await
                .with_context(|| format!("append to {}", location.folder))?;
            debug!(
                "kept {} sibling attachments in a new message in {}",
                survivor.parts.len(),
                location
            );
        }
        Self::flag_deleted(session, &removal.flagged).await
    }
}

/// A tagged `NO` to `SELECT` is how servers report a missing folder.
fn folder_missing(err: &async_imap::error::Error) -> bool {
    matches!(err, async_imap::error::Error::No(_))
}

/// Same folder, key and attachment name.
fn same_attachment(a: &ElementRef, b: &ElementRef) -> bool {
    a.name == b.name && MailLocation::parse(&a.location) == MailLocation::parse(&b.location)
}

/// `imap.<domain>` of the username when autodiscovery is on, the configured
/// host otherwise.
fn server_host(credential: &Credential) -> Result<String> {
    if !credential.autodiscover {
        return Ok(credential.host.clone());
    }
    credential
        .username()
        .rsplit_once('@')
        .map(|(_, domain)| format!("imap.{}", domain.trim()))
        .filter(|host| host.len() > "imap.".len())
        .ok_or_else(|| {
            anyhow!(
                "autodiscover needs an email address as username, got {:?}",
                credential.username()
            )
        })
}

fn sender_address(credential: &Credential) -> String {
    let username = credential.username();
    if username.contains('@') {
        username.to_string()
    } else {
        format!("{}@{}", username, server_host(credential).unwrap_or_default())
    }
}

#[async_trait]
impl StorageClient for MailClient {
    fn credential(&self) -> &Credential {
        &self.credential
    }

    async fn exists(&self, element: &ElementRef) -> Result<bool> {
        let mut guard = self.session.lock().await;
        let session = guard.as_mut().ok_or_else(|| self.released())?;
        let location = MailLocation::parse(&element.location);
        // approximated at message level: any live message carrying the key
        Ok(Self::matching(session, &location)
            .await?
            .is_some_and(|messages| !messages.is_empty()))
    }

    async fn list(&self, location: &str, filter: &ElementFilter) -> Result<Vec<ElementRef>> {
        let mut guard = self.session.lock().await;
        let session = guard.as_mut().ok_or_else(|| self.released())?;
        let parsed = MailLocation::parse(location);
        let messages = Self::require_matching(session, &parsed).await?;

        let label = format!("mail client {:?}", self.credential.name);
        let mut listing = filter.begin_listing(&label);
        let mut seen = HashSet::new();
        let mut selected = Vec::new();
        for message in &messages {
            for part in &message.parsed.attachments {
                if !seen.insert(part.name.as_str()) {
                    debug!("duplicate attachment {} in {} skipped", part.name, parsed);
                    continue;
                }
                let mut meta = ElementMeta::new(part.name.clone(), part.data.len() as u64);
                if let Some(sender) = &message.parsed.sender {
                    meta = meta.with_owner(sender.clone());
                }
                if let Some(received) = message.received {
                    meta = meta.with_created(received);
                }
                if listing.check(&meta) {
                    selected.push(ElementRef::new(location, part.name.clone()));
                } else {
                    debug!("{} in {} filtered out", part.name, parsed);
                }
            }
        }
        selected.sort();
        Ok(selected)
    }

    async fn read(&self, element: &ElementRef) -> Result<ElementReader> {
        let mut guard = self.session.lock().await;
        let session = guard.as_mut().ok_or_else(|| self.released())?;
        let data = Self::fetch_attachment(session, element).await?;
        Ok(Box::new(Cursor::new(data)))
    }

    async fn write(
        &self,
        element: &ElementRef,
        data: &mut (dyn AsyncRead + Send + Unpin),
    ) -> Result<()> {
        let mut bytes = Vec::new();
        data.read_to_end(&mut bytes).await?;
        let mut guard = self.session.lock().await;
        let session = guard.as_mut().ok_or_else(|| self.released())?;
        self.append_attachment(session, element, bytes).await
    }

    async fn move_within(&self, source: &ElementRef, destination: &ElementRef) -> Result<()> {
        let mut guard = self.session.lock().await;
        let session = guard.as_mut().ok_or_else(|| self.released())?;
        let data = Self::fetch_attachment(session, source).await?;
        if same_attachment(source, destination) {
            warn!("{} is its own destination, leaving it in place", source);
            return Ok(());
        }
        self.soft_delete(session, source).await?;
        self.append_attachment(session, destination, data).await
    }

    async fn copy_within(&self, source: &ElementRef, destination: &ElementRef) -> Result<()> {
        let mut guard = self.session.lock().await;
        let session = guard.as_mut().ok_or_else(|| self.released())?;
        let data = Self::fetch_attachment(session, source).await?;
        if same_attachment(source, destination) {
            warn!("{} is its own destination, leaving it in place", source);
            return Ok(());
        }
        self.append_attachment(session, destination, data).await
    }

    async fn delete(&self, element: &ElementRef) -> Result<()> {
        let mut guard = self.session.lock().await;
        let session = guard.as_mut().ok_or_else(|| self.released())?;
        self.soft_delete(session, element).await
    }

    async fn release(&self) -> Result<()> {
        let Some(mut session) = self.session.lock().await.take() else {
            return Ok(());
        };
        session.logout().await?;
        info!("mail client {:?} disconnected", self.credential.name);
        Ok(())
    }
}
