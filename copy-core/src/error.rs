use thiserror::Error;
use tracing::error;

/// Failures that abort a run. Conflicts (overwrites, auto-created
/// containers, already-absent deletes) are logged instead and never show up
/// here.
#[derive(Debug, Error)]
pub enum CopyError {
    #[error("container {0} does not exist")]
    ContainerNotFound(String),

    #[error("element {0} does not exist")]
    ElementNotFound(String),

    #[error("no client named {0:?} is configured")]
    ClientNotFound(String),

    #[error("unable to resolve the owner of {0}")]
    OwnerResolutionFailed(String),

    #[error("unknown backend kind {0:?}")]
    UnknownBackendKind(String),

    #[error("client name {0:?} is configured more than once")]
    DuplicateClient(String),

    #[error("invalid {field} pattern {pattern:?}: {source}")]
    InvalidPattern {
        field: &'static str,
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("client {0:?} has already been released")]
    ClientReleased(String),
}

impl CopyError {
    /// Log at error level, then hand the error over for propagation.
    pub fn logged(self) -> anyhow::Error {
        error!("{self}");
        self.into()
    }

    /// Recover a taxonomy error from an `anyhow` chain, if there is one.
    pub fn find(err: &anyhow::Error) -> Option<&CopyError> {
        err.chain().find_map(|cause| cause.downcast_ref::<CopyError>())
    }
}
