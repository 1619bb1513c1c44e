use anyhow::Result;
use async_trait::async_trait;
use copy_core::{
    ClientKind, Credential, ElementFilter, ElementReader, ElementRef, LocalClient, StorageClient,
};
use copy_remote_ftp::FtpClient;
use copy_remote_mail::MailClient;
use copy_remote_sftp::SftpClient;
use tokio::io::AsyncRead;

/// Every backend this binary knows, selected by [`ClientKind`].
pub enum Client {
    Local(LocalClient),
    Ftp(FtpClient),
    Sftp(SftpClient),
    Mail(MailClient),
}

impl Client {
    pub async fn connect(credential: Credential) -> Result<Self> {
        Ok(match credential.kind {
            ClientKind::Local => Client::Local(LocalClient::new(credential)),
            ClientKind::Ftp => Client::Ftp(FtpClient::connect(credential).await?),
            ClientKind::Sftp => Client::Sftp(SftpClient::connect(credential).await?),
            ClientKind::Mail => Client::Mail(MailClient::connect(credential).await?),
        })
    }

    fn inner(&self) -> &dyn StorageClient {
        match self {
            Client::Local(c) => c,
            Client::Ftp(c) => c,
            Client::Sftp(c) => c,
            Client::Mail(c) => c,
        }
    }
}

#[async_trait]
impl StorageClient for Client {
    fn credential(&self) -> &Credential {
        self.inner().credential()
    }

    async fn exists(&self, element: &ElementRef) -> Result<bool> {
        self.inner().exists(element).await
    }

    async fn list(&self, location: &str, filter: &ElementFilter) -> Result<Vec<ElementRef>> {
        self.inner().list(location, filter).await
    }

    async fn read(&self, element: &ElementRef) -> Result<ElementReader> {
        self.inner().read(element).await
    }

    async fn write(
        &self,
        element: &ElementRef,
        data: &mut (dyn AsyncRead + Send + Unpin),
    ) -> Result<()> {
        self.inner().write(element, data).await
    }

    async fn move_within(&self, source: &ElementRef, destination: &ElementRef) -> Result<()> {
        self.inner().move_within(source, destination).await
    }

    async fn copy_within(&self, source: &ElementRef, destination: &ElementRef) -> Result<()> {
        self.inner().copy_within(source, destination).await
    }

    async fn delete(&self, element: &ElementRef) -> Result<()> {
        self.inner().delete(element).await
    }

    async fn release(&self) -> Result<()> {
        self.inner().release().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use copy_core::FilterConfig;

    #[tokio::test]
    async fn local_credentials_need_no_connection() {
        let dir = tempfile::tempdir().unwrap();
        tokio::fs::write(dir.path().join("a.txt"), b"abc").await.unwrap();
        let location = dir.path().to_string_lossy().into_owned();

        let client = Client::connect(Credential::new(ClientKind::Local, "disk"))
            .await
            .unwrap();
        assert!(matches!(client, Client::Local(_)));
        assert_eq!(client.name(), "disk");
        assert_eq!(client.kind(), ClientKind::Local);

        let filter = ElementFilter::compile(&FilterConfig::default()).unwrap();
        let listed = client.list(&location, &filter).await.unwrap();
        assert_eq!(listed, vec![ElementRef::new(location.as_str(), "a.txt")]);
        client.release().await.unwrap();
    }
}
