use crate::client::StorageClient;
use crate::config::{Config, CopyTask, Credential};
use crate::error::CopyError;
use crate::registry::ClientRegistry;
use crate::task::{TaskReport, TaskRunner};
use anyhow::Result;
use std::future::Future;
use tracing::{error, info};

/// Everything one run needs, built once at startup.
pub struct RunContext<C> {
    tasks: Vec<CopyTask>,
    registry: ClientRegistry<C>,
}

impl<C: StorageClient> RunContext<C> {
    pub fn new(tasks: Vec<CopyTask>, registry: ClientRegistry<C>) -> Self {
        Self { tasks, registry }
    }

    /// Validate `config` and connect its clients with `connect`.
    pub async fn from_config<F, Fut>(config: Config, connect: F) -> Result<Self>
    where
        F: FnMut(Credential) -> Fut,
        Fut: Future<Output = Result<C>>,
    {
        config.validate().map_err(CopyError::logged)?;
        let registry = ClientRegistry::connect(&config.clients, connect).await?;
        info!(
            "{} clients connected, {} tasks queued",
            registry.len(),
            config.tasks.len()
        );
        Ok(Self::new(config.tasks, registry))
    }

    /// Run every task in order, then release every client whatever the
    /// outcome.
    pub async fn execute(mut self) -> Result<TaskReport> {
        let result = TaskRunner::new(&self.registry).run_all(&self.tasks).await;
        if let Err(err) = &result {
            error!("run aborted: {err:#}");
        }
        self.registry.release_all().await;
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ClientKind, Endpoint};
    use crate::local::LocalClient;
    use crate::testing::{release_count, RecordingClient};
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;

    #[tokio::test]
    async fn executes_config_end_to_end() {
        let root = tempfile::tempdir().unwrap();
        let input = root.path().join("in");
        std::fs::create_dir_all(&input).unwrap();
        std::fs::write(input.join("a.txt"), b"hello").unwrap();

        let mut task = CopyTask::new(
            Endpoint::new("disk", input.to_string_lossy()),
            Endpoint::new("other", root.path().join("out").to_string_lossy()),
        );
        task.delete = true;
        let config = Config {
            debug: false,
            clients: vec![
                Credential::new(ClientKind::Local, "disk"),
                Credential::new(ClientKind::Local, "other"),
            ],
            tasks: vec![task],
        };

        let ctx = RunContext::from_config(config, |cred| async move { Ok(LocalClient::new(cred)) })
            .await
            .unwrap();
        let report = ctx.execute().await.unwrap();
        assert_eq!((report.copied, report.deleted), (1, 1));
        assert!(!input.join("a.txt").exists());
        assert_eq!(std::fs::read(root.path().join("out/a.txt")).unwrap(), b"hello");
    }

    #[tokio::test]
    async fn invalid_config_never_connects() {
        let config = Config {
            clients: vec![
                Credential::new(ClientKind::Local, "x"),
                Credential::new(ClientKind::Local, "x"),
            ],
            ..Config::default()
        };
        let mut connected = 0;
        let result = RunContext::from_config(config, |cred| {
            connected += 1;
            async move { Ok(LocalClient::new(cred)) }
        })
        .await;
        let err = result.err().unwrap();
        assert!(matches!(CopyError::find(&err), Some(CopyError::DuplicateClient(_))));
        assert_eq!(connected, 0);
    }

    #[tokio::test]
    async fn failed_task_still_releases_every_client() {
        let root = tempfile::tempdir().unwrap();
        let task = CopyTask::new(
            Endpoint::new("disk", root.path().join("missing").to_string_lossy()),
            Endpoint::new("other", root.path().join("out").to_string_lossy()),
        );
        let config = Config {
            clients: vec![
                Credential::new(ClientKind::Local, "disk"),
                Credential::new(ClientKind::Local, "other"),
            ],
            tasks: vec![task],
            ..Config::default()
        };

        let released = Arc::new(AtomicUsize::new(0));
        let ctx = RunContext::from_config(config, |cred| {
            let released = Arc::clone(&released);
            async move { Ok(RecordingClient::new(cred, &released)) }
        })
        .await
        .unwrap();
        let err = ctx.execute().await.unwrap_err();
        assert!(matches!(CopyError::find(&err), Some(CopyError::ContainerNotFound(_))));
        assert_eq!(release_count(&released), 2);
    }
}
