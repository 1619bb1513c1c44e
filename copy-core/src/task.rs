use crate::client::StorageClient;
use crate::config::CopyTask;
use crate::element::ElementRef;
use crate::filter::ElementFilter;
use crate::registry::ClientRegistry;
use anyhow::Result;
use std::ops::AddAssign;
use tracing::{debug, info};

/// What a task (or a whole run) did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TaskReport {
    pub listed: usize,
    pub copied: usize,
    pub moved: usize,
    pub deleted: usize,
}

impl AddAssign for TaskReport {
    fn add_assign(&mut self, rhs: Self) {
        self.listed += rhs.listed;
        self.copied += rhs.copied;
        self.moved += rhs.moved;
        self.deleted += rhs.deleted;
    }
}

/// Runs copy tasks against the clients of a registry, one task and one
/// element at a time. The first error aborts the run.
pub struct TaskRunner<'a, C> {
    registry: &'a ClientRegistry<C>,
}

impl<'a, C: StorageClient> TaskRunner<'a, C> {
    pub fn new(registry: &'a ClientRegistry<C>) -> Self {
        Self { registry }
    }

    pub async fn run_all(&self, tasks: &[CopyTask]) -> Result<TaskReport> {
        let mut total = TaskReport::default();
        for (idx, task) in tasks.iter().enumerate() {
            info!("task {}/{} started: {}", idx + 1, tasks.len(), task.label());
            let report = self.run(task).await?;
            info!(
                "task {}/{} finished: {} listed, {} copied, {} moved, {} deleted",
                idx + 1,
                tasks.len(),
                report.listed,
                report.copied,
                report.moved,
                report.deleted
            );
            total += report;
        }
        Ok(total)
    }

    pub async fn run(&self, task: &CopyTask) -> Result<TaskReport> {
        let source = self.registry.get(&task.source.client)?;
        let destination = self.registry.get(&task.destination.client)?;
        let filter = ElementFilter::compile(&task.filter)?;

        let elements = source.list(&task.source.location, &filter).await?;
        let mut report = TaskReport {
            listed: elements.len(),
            ..TaskReport::default()
        };
        debug!("{} elements selected in {}", elements.len(), task.source);

        // one client per logical name, so identity is the same-backend test
        let same_client = std::ptr::eq(source, destination);
        for element in elements {
            let target = element.relocate(task.destination.location.clone());
            if same_client {
                if task.delete {
                    source.move_within(&element, &target).await?;
                    info!("moved {} to {}", element, target);
                    report.moved += 1;
                } else {
                    source.copy_within(&element, &target).await?;
                    info!("copied {} to {}", element, target);
                    report.copied += 1;
                }
            } else {
                self.transfer(source, destination, &element, &target).await?;
                report.copied += 1;
                if task.delete {
                    source.delete(&element).await?;
                    info!("deleted {} from {}", element, source.name());
                    report.deleted += 1;
                }
            }
        }
        Ok(report)
    }

    async fn transfer(
        &self,
        source: &C,
        destination: &C,
        element: &ElementRef,
        target: &ElementRef,
    ) -> Result<()> {
        let mut reader = source.read(element).await?;
        let written = destination.write(target, &mut *reader).await;
        // the stream is closed before any delete of the source
        drop(reader);
        written?;
        info!(
            "copied {}:{} to {}:{}",
            source.name(),
            element,
            destination.name(),
            target
        );
        Ok(())
    }
}
