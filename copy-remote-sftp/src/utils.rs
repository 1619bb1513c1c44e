use anyhow::{bail, Result};
use copy_core::{as_posix_path, remote_ancestors};
use russh_sftp::client::SftpSession;

/// Create a remote directory and all of its parents.
///
/// Fails if some component already exists as a file.
pub async fn create_dir_all(sftp: &SftpSession, path: &str) -> Result<()> {
    if let Ok(attrs) = sftp.metadata(as_posix_path(path)).await {
        if attrs.is_dir() {
            return Ok(());
        }
        bail!("a file with the same name already exists: {path}");
    }

    for dir in remote_ancestors(path) {
        if let Err(err) = sftp.create_dir(dir.clone()).await {
            // servers report an existing directory as a generic failure
            match sftp.metadata(dir.clone()).await {
                Ok(attrs) if attrs.is_dir() => {}
                Ok(_) => bail!("path component is a file, not a directory: {dir}"),
                Err(_) => return Err(err.into()),
            }
        }
    }
    Ok(())
}
