//! Round trips against a real SFTP server.
//!
//! Skipped unless `COPY_LIVE_SFTP_HOST` is set. Optional: `COPY_LIVE_SFTP_PORT`,
//! `COPY_LIVE_SFTP_USER`, `COPY_LIVE_SFTP_PASSWORD`, `COPY_LIVE_SFTP_KEY`,
//! `COPY_LIVE_SFTP_FINGERPRINT` and `COPY_LIVE_SFTP_DIR` (a writable
//! directory, default `/tmp`).

use copy_core::{
    ClientKind, Credential, ElementFilter, ElementRef, FilterConfig, StorageClient,
};
use copy_remote_sftp::SftpClient;
use std::env;
use tokio::io::AsyncReadExt;
use tracing_test::traced_test;

fn credential() -> Option<(Credential, String)> {
    let mut credential = Credential::new(ClientKind::Sftp, "live-sftp");
    credential.host = env::var("COPY_LIVE_SFTP_HOST").ok()?;
    credential.port = env::var("COPY_LIVE_SFTP_PORT")
        .ok()
        .and_then(|port| port.parse().ok());
    credential.username = env::var("COPY_LIVE_SFTP_USER").ok();
    credential.password = env::var("COPY_LIVE_SFTP_PASSWORD").ok();
    credential.private_key = env::var("COPY_LIVE_SFTP_KEY").ok();
    credential.fingerprint = env::var("COPY_LIVE_SFTP_FINGERPRINT").ok();
    let dir = env::var("COPY_LIVE_SFTP_DIR").unwrap_or_else(|_| "/tmp".into());
    Some((credential, dir))
}

async fn read_all(client: &SftpClient, element: &ElementRef) -> Vec<u8> {
    let mut reader = client.read(element).await.unwrap();
    let mut buf = Vec::new();
    reader.read_to_end(&mut buf).await.unwrap();
    buf
}

#[tokio::test]
#[traced_test]
async fn live_round_trip_copy_and_move() {
    let Some((credential, dir)) = credential() else {
        eprintln!("COPY_LIVE_SFTP_HOST not set, skipping");
        return;
    };
    let client = SftpClient::connect(credential).await.unwrap();
    let base = format!(
        "{}/copy-live-{}",
        dir.trim_end_matches('/'),
        chrono::Utc::now().timestamp_millis()
    );

    let a = ElementRef::new(format!("{base}/in"), "a.txt");
    client.write(&a, &mut &b"precious"[..]).await.unwrap();
    assert!(client.exists(&a).await.unwrap());
    assert_eq!(read_all(&client, &a).await, b"precious");

    let everything = ElementFilter::compile(&FilterConfig::default()).unwrap();
    assert_eq!(client.list(&a.location, &everything).await.unwrap(), [a.clone()]);

    client.copy_within(&a, &a).await.unwrap();
    let alias = ElementRef::new(format!("{}/", a.location), "a.txt");
    client.move_within(&a, &alias).await.unwrap();
    assert_eq!(read_all(&client, &a).await, b"precious");

    let copied = a.relocate(format!("{base}/copy"));
    client.copy_within(&a, &copied).await.unwrap();
    assert!(client.exists(&a).await.unwrap());
    assert_eq!(read_all(&client, &copied).await, b"precious");

    let moved = a.relocate(format!("{base}/moved"));
    client.move_within(&a, &moved).await.unwrap();
    assert!(!client.exists(&a).await.unwrap());
    assert_eq!(read_all(&client, &moved).await, b"precious");

    client.delete(&copied).await.unwrap();
    client.delete(&moved).await.unwrap();
    client.release().await.unwrap();
}
