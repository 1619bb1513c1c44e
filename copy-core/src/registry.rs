use crate::client::StorageClient;
use crate::config::Credential;
use crate::error::CopyError;
use anyhow::Result;
use std::collections::HashMap;
use std::future::Future;
use tracing::{error, info};

/// One connected client per configured credential, keyed by logical name.
pub struct ClientRegistry<C> {
    clients: Vec<C>,
    by_name: HashMap<String, usize>,
}

impl<C: StorageClient> ClientRegistry<C> {
    /// Connect every credential in order. If one fails, the clients already
    /// connected are released before the error is returned.
    pub async fn connect<F, Fut>(credentials: &[Credential], mut connect: F) -> Result<Self>
    where
        F: FnMut(Credential) -> Fut,
        Fut: Future<Output = Result<C>>,
    {
        let mut registry = Self {
            clients: Vec::with_capacity(credentials.len()),
            by_name: HashMap::new(),
        };
        for credential in credentials {
            if registry.by_name.contains_key(&credential.name) {
                let err = CopyError::DuplicateClient(credential.name.clone()).logged();
                registry.release_all().await;
                return Err(err);
            }
            info!(
                "connecting {} client {:?} ({}:{})",
                credential.kind,
                credential.name,
                credential.host,
                credential.effective_port()
            );
            match connect(credential.clone()).await {
                Ok(client) => registry.insert(client),
                Err(err) => {
                    error!("failed to connect client {:?}: {err:#}", credential.name);
                    registry.release_all().await;
                    return Err(err);
                }
            }
        }
        Ok(registry)
    }

    /// Build from clients that are already connected.
    pub fn from_clients(clients: impl IntoIterator<Item = C>) -> Result<Self> {
        let mut registry = Self {
            clients: Vec::new(),
            by_name: HashMap::new(),
        };
        for client in clients {
            if registry.by_name.contains_key(client.name()) {
                return Err(CopyError::DuplicateClient(client.name().to_string()).logged());
            }
            registry.insert(client);
        }
        Ok(registry)
    }

    fn insert(&mut self, client: C) {
        self.by_name
            .insert(client.name().to_string(), self.clients.len());
        self.clients.push(client);
    }

    pub fn get(&self, name: &str) -> Result<&C> {
        self.by_name
            .get(name)
            .map(|&idx| &self.clients[idx])
            .ok_or_else(|| CopyError::ClientNotFound(name.to_string()).logged())
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }

    /// Release every client, in construction order. Failures are logged so
    /// the remaining clients still get released.
    pub async fn release_all(&mut self) {
        for client in self.clients.drain(..) {
            match client.release().await {
                Ok(()) => info!("released client {:?}", client.name()),
                Err(err) => error!("failed to release client {:?}: {err:#}", client.name()),
            }
        }
        self.by_name.clear();
    }
}
