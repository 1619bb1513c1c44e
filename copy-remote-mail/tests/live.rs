//! Round trips against a real IMAP mailbox.
//!
//! Skipped unless `COPY_LIVE_MAIL_USER` is set. Optional: `COPY_LIVE_MAIL_HOST`
//! (autodiscovered from the user when unset), `COPY_LIVE_MAIL_PORT` (default
//! 993) and `COPY_LIVE_MAIL_PASSWORD`. Messages are left `\Deleted`, not
//! expunged.

use copy_core::{
    ClientKind, Credential, ElementFilter, ElementRef, FilterConfig, StorageClient,
};
use copy_remote_mail::MailClient;
use std::env;
use tokio::io::AsyncReadExt;
use tracing_test::traced_test;

fn credential() -> Option<Credential> {
    let mut credential = Credential::new(ClientKind::Mail, "live-mail");
    credential.username = Some(env::var("COPY_LIVE_MAIL_USER").ok()?);
    credential.password = env::var("COPY_LIVE_MAIL_PASSWORD").ok();
    match env::var("COPY_LIVE_MAIL_HOST") {
        Ok(host) => credential.host = host,
        Err(_) => credential.autodiscover = true,
    }
    credential.port = Some(
        env::var("COPY_LIVE_MAIL_PORT")
            .ok()
            .and_then(|port| port.parse().ok())
            .unwrap_or(993),
    );
    Some(credential)
}

async fn read_all(client: &MailClient, element: &ElementRef) -> Vec<u8> {
    let mut reader = client.read(element).await.unwrap();
    let mut buf = Vec::new();
    reader.read_to_end(&mut buf).await.unwrap();
    buf
}

#[tokio::test]
#[traced_test]
async fn live_attachments_survive_overwrite_move_and_delete() {
    let Some(credential) = credential() else {
        eprintln!("COPY_LIVE_MAIL_USER not set, skipping");
        return;
    };
    let client = MailClient::connect(credential).await.unwrap();
    // subject search matches substrings, so neither key may contain the other
    let stamp = chrono::Utc::now().timestamp_millis();
    let key = format!("copy-live-{stamp}");
    let a = ElementRef::new(&key, "a.pdf");
    let b = ElementRef::new(&key, "b.pdf");

    client.write(&a, &mut &b"first"[..]).await.unwrap();
    client.write(&b, &mut &b"second"[..]).await.unwrap();
    client.write(&a, &mut &b"first, again"[..]).await.unwrap();
    assert_eq!(read_all(&client, &a).await, b"first, again");
    assert_eq!(read_all(&client, &b).await, b"second");

    let everything = ElementFilter::compile(&FilterConfig::default()).unwrap();
    assert_eq!(
        client.list(&key, &everything).await.unwrap(),
        [a.clone(), b.clone()]
    );

    let same = ElementRef::new(format!("INBOX::{key}"), "a.pdf");
    client.copy_within(&a, &same).await.unwrap();
    assert_eq!(read_all(&client, &a).await, b"first, again");

    let moved = b.relocate(format!("copy-live-moved-{stamp}"));
    client.move_within(&b, &moved).await.unwrap();
    assert_eq!(read_all(&client, &moved).await, b"second");
    assert_eq!(read_all(&client, &a).await, b"first, again");

    client.delete(&a).await.unwrap();
    assert!(!client.exists(&a).await.unwrap());
    client.delete(&moved).await.unwrap();
    client.release().await.unwrap();
}
