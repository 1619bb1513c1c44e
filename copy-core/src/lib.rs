//! Core library for Copy – task-driven element transfer between storage backends.

mod client;
mod config;
mod context;
mod element;
mod error;
mod filter;
mod local;
mod registry;
mod task;
#[cfg(test)]
mod testing;

pub use client::{ElementReader, StorageClient};
pub use config::{ClientKind, Config, CopyTask, Credential, Endpoint, FilterConfig};
pub use context::RunContext;
pub use element::{as_posix_path, join_remote, remote_ancestors, ElementMeta, ElementRef};
pub use error::CopyError;
pub use filter::{ElementFilter, ListingFilter};
pub use local::LocalClient;
pub use registry::ClientRegistry;
pub use task::{TaskReport, TaskRunner};
