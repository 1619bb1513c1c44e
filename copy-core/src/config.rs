use crate::error::CopyError;
use crate::filter::ElementFilter;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

/// Backend a credential connects to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", try_from = "String")]
pub enum ClientKind {
    Local,
    Ftp,
    Sftp,
    Mail,
}

impl ClientKind {
    pub fn default_port(self) -> u16 {
        match self {
            ClientKind::Local => 0,
            ClientKind::Ftp => 21,
            ClientKind::Sftp => 22,
            ClientKind::Mail => 443,
        }
    }
}

impl TryFrom<String> for ClientKind {
    type Error = CopyError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        match value.to_ascii_lowercase().as_str() {
            "local" | "filesystem" => Ok(ClientKind::Local),
            "ftp" => Ok(ClientKind::Ftp),
            "sftp" => Ok(ClientKind::Sftp),
            "mail" | "mailbox" | "exchange" => Ok(ClientKind::Mail),
            _ => Err(CopyError::UnknownBackendKind(value)),
        }
    }
}

impl fmt::Display for ClientKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ClientKind::Local => "local",
            ClientKind::Ftp => "ftp",
            ClientKind::Sftp => "sftp",
            ClientKind::Mail => "mail",
        };
        f.write_str(s)
    }
}

/// Connection settings of one backend instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Credential {
    pub kind: ClientKind,
    /// Logical name tasks refer to.
    pub name: String,
    #[serde(default)]
    pub host: String,
    /// Falls back to [`ClientKind::default_port`] when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    /// Path to a private key file, or the key itself in OpenSSH PEM form.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub private_key: Option<String>,
    /// Pinned server fingerprint. Unset means the server is trusted as is.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fingerprint: Option<String>,
    /// Mail only: derive the server from the username's domain.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub autodiscover: bool,
}

impl Credential {
    pub fn new(kind: ClientKind, name: impl Into<String>) -> Self {
        Self {
            kind,
            name: name.into(),
            host: String::new(),
            port: None,
            username: None,
            password: None,
            private_key: None,
            fingerprint: None,
            autodiscover: false,
        }
    }

    pub fn effective_port(&self) -> u16 {
        self.port.unwrap_or_else(|| self.kind.default_port())
    }

    pub fn username(&self) -> &str {
        self.username.as_deref().unwrap_or("")
    }

    pub fn password(&self) -> &str {
        self.password.as_deref().unwrap_or("")
    }
}

/// One side of a task: a configured client and a container on it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Endpoint {
    pub client: String,
    pub location: String,
}

impl Endpoint {
    pub fn new(client: impl Into<String>, location: impl Into<String>) -> Self {
        Self {
            client: client.into(),
            location: location.into(),
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.client, self.location)
    }
}

/// Declarative element filter as written in the config file.
/// Compiled into an [`ElementFilter`] before use.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterConfig {
    /// Regular expression the element name must match.
    #[serde(default = "FilterConfig::match_all")]
    pub name: String,
    /// Regular expression the owner or sender must match.
    #[serde(default = "FilterConfig::match_all")]
    pub author: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_after: Option<DateTime<Utc>>,
    /// Exclusive upper size bound in bytes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_size: Option<u64>,
    /// Exclusive lower size bound in bytes.
    #[serde(default)]
    pub min_size: u64,
}

impl FilterConfig {
    pub const MATCH_ALL: &'static str = ".*";

    fn match_all() -> String {
        Self::MATCH_ALL.to_string()
    }
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            name: Self::match_all(),
            author: Self::match_all(),
            created_after: None,
            max_size: None,
            min_size: 0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CopyTask {
    /// Label used in logs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub source: Endpoint,
    pub destination: Endpoint,
    /// Remove the source element once it has been transferred.
    #[serde(default)]
    pub delete: bool,
    #[serde(default)]
    pub filter: FilterConfig,
}

impl CopyTask {
    pub fn new(source: Endpoint, destination: Endpoint) -> Self {
        Self {
            name: None,
            source,
            destination,
            delete: false,
            filter: FilterConfig::default(),
        }
    }

    pub fn label(&self) -> String {
        match &self.name {
            Some(name) => name.clone(),
            None => format!("{} -> {}", self.source, self.destination),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub debug: bool,
    #[serde(default)]
    pub clients: Vec<Credential>,
    #[serde(default)]
    pub tasks: Vec<CopyTask>,
}

impl Config {
    /// Checks that can fail before anything connects: unique client names
    /// and compilable filter patterns.
    pub fn validate(&self) -> Result<(), CopyError> {
        let mut seen = HashSet::new();
        for client in &self.clients {
            if !seen.insert(client.name.as_str()) {
                return Err(CopyError::DuplicateClient(client.name.clone()));
            }
        }
        for task in &self.tasks {
            ElementFilter::compile(&task.filter)?;
        }
        Ok(())
    }

    /// A config exercising every backend kind, written by `copy init`.
    pub fn sample() -> Self {
        let mut ftp = Credential::new(ClientKind::Ftp, "ftp");
        ftp.host = "ftp.example.com".into();
        ftp.port = Some(21);
        ftp.username = Some("user".into());
        ftp.password = Some("password".into());

        let mut sftp = Credential::new(ClientKind::Sftp, "sftp");
        sftp.host = "sftp.example.com".into();
        sftp.port = Some(22);
        sftp.username = Some("user".into());
        sftp.password = Some("password".into());

        let mut local = Credential::new(ClientKind::Local, "local");
        local.host = "localhost".into();

        let mut mail = Credential::new(ClientKind::Mail, "mail");
        mail.host = "imap.example.com".into();
        mail.port = Some(993);
        mail.username = Some("user@example.com".into());
        mail.password = Some("password".into());

        let mut ftp_task = CopyTask::new(
            Endpoint::new("ftp", "/outgoing"),
            Endpoint::new("local", "archive/ftp"),
        );
        ftp_task.delete = true;

        let mut sftp_task = CopyTask::new(
            Endpoint::new("sftp", "/reports"),
            Endpoint::new("sftp", "/reports/done"),
        );
        sftp_task.filter.name = r".*\.txt$".into();

        let mut local_task = CopyTask::new(
            Endpoint::new("local", "inbox"),
            Endpoint::new("ftp", "/incoming"),
        );
        local_task.delete = true;
        local_task.filter.min_size = 0;
        local_task.filter.max_size = Some(10 * 1024 * 1024);

        let mail_task = CopyTask::new(
            Endpoint::new("mail", "INBOX::Invoices"),
            Endpoint::new("local", "archive/invoices"),
        );

        Self {
            debug: false,
            clients: vec![ftp, sftp, local, mail],
            tasks: vec![ftp_task, sftp_task, local_task, mail_task],
        }
    }
}
