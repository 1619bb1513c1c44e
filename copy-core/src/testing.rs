//! Test doubles shared by the unit tests of this crate.

use crate::client::{ElementReader, StorageClient};
use crate::config::Credential;
use crate::element::ElementRef;
use crate::filter::ElementFilter;
use crate::local::LocalClient;
use anyhow::Result;
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::io::AsyncRead;

/// A [`LocalClient`] that counts its releases into a shared counter.
pub(crate) struct RecordingClient {
    inner: LocalClient,
    released: Arc<AtomicUsize>,
}

impl RecordingClient {
    pub fn new(credential: Credential, released: &Arc<AtomicUsize>) -> Self {
        Self {
            inner: LocalClient::new(credential),
            released: Arc::clone(released),
        }
    }
}

pub(crate) fn release_count(counter: &Arc<AtomicUsize>) -> usize {
    counter.load(Ordering::SeqCst)
}

#[async_trait]
impl StorageClient for RecordingClient {
    fn credential(&self) -> &Credential {
        self.inner.credential()
    }

    async fn exists(&self, element: &ElementRef) -> Result<bool> {
        self.inner.exists(element).await
    }

    async fn list(&self, location: &str, filter: &ElementFilter) -> Result<Vec<ElementRef>> {
        self.inner.list(location, filter).await
    }

    async fn read(&self, element: &ElementRef) -> Result<ElementReader> {
        self.inner.read(element).await
    }

    async fn write(
        &self,
        element: &ElementRef,
        data: &mut (dyn AsyncRead + Send + Unpin),
    ) -> Result<()> {
        self.inner.write(element, data).await
    }

    async fn move_within(&self, source: &ElementRef, destination: &ElementRef) -> Result<()> {
        self.inner.move_within(source, destination).await
    }

    async fn copy_within(&self, source: &ElementRef, destination: &ElementRef) -> Result<()> {
        self.inner.copy_within(source, destination).await
    }

    async fn delete(&self, element: &ElementRef) -> Result<()> {
        self.inner.delete(element).await
    }

    async fn release(&self) -> Result<()> {
        self.released.fetch_add(1, Ordering::SeqCst);
        self.inner.release().await
    }
}
