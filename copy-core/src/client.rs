use crate::config::{ClientKind, Credential};
use crate::element::ElementRef;
use crate::filter::ElementFilter;
use anyhow::Result;
use async_trait::async_trait;
use tokio::io::AsyncRead;

/// Byte stream returned by [`StorageClient::read`], positioned at its start.
pub type ElementReader = Box<dyn AsyncRead + Send + Unpin>;

/// Uniform operations every backend provides.
///
/// Conflicts are resolved the same way everywhere: a missing destination
/// container is created and a pre-existing destination element is
/// overwritten, both with a warning. Missing sources are errors.
#[async_trait]
pub trait StorageClient: Send + Sync {
    /// Credential this client was built from.
    fn credential(&self) -> &Credential;

    fn kind(&self) -> ClientKind {
        self.credential().kind
    }

    fn name(&self) -> &str {
        &self.credential().name
    }

    /// Never fails because the element is missing.
    async fn exists(&self, element: &ElementRef) -> Result<bool>;

    /// Elements of `location` selected by `filter`, each carrying `location`
    /// unchanged. Fails with `ContainerNotFound` if the container is absent.
    async fn list(&self, location: &str, filter: &ElementFilter) -> Result<Vec<ElementRef>>;

    async fn read(&self, element: &ElementRef) -> Result<ElementReader>;

    async fn write(&self, element: &ElementRef, data: &mut (dyn AsyncRead + Send + Unpin))
        -> Result<()>;

    /// Both references belong to this client.
    async fn move_within(&self, source: &ElementRef, destination: &ElementRef) -> Result<()>;

    /// Both references belong to this client.
    async fn copy_within(&self, source: &ElementRef, destination: &ElementRef) -> Result<()>;

    /// Idempotent: an already-absent element is logged, not an error.
    async fn delete(&self, element: &ElementRef) -> Result<()>;

    /// Tear down the connection. Later operations fail with `ClientReleased`.
    async fn release(&self) -> Result<()>;
}
