use russh::client::Handler;
use russh::keys::PublicKeyBase64;
use tracing::{info, warn};

/// Host key check against an optional pinned fingerprint.
pub(crate) struct HostKeyCheck {
    /// OpenSSH SHA256 fingerprint or base64 public key.
    pub pinned: Option<String>,
}

impl Handler for HostKeyCheck {
    type Error = anyhow::Error;

    async fn check_server_key(
        &mut self,
        server_public_key: &russh::keys::PublicKey,
    ) -> Result<bool, Self::Error> {
        let fp_sha256 = server_public_key
            .fingerprint(russh::keys::HashAlg::Sha256)
            .to_string();
        match &self.pinned {
            Some(pinned) => {
                let key_b64 = server_public_key.public_key_base64();
                let ok = fingerprint_matches(pinned, &fp_sha256, &key_b64);
                if ok {
                    info!("server key {} matches pinned fingerprint", fp_sha256);
                } else {
                    warn!("server key {} does not match pinned fingerprint", fp_sha256);
                }
                Ok(ok)
            }
            None => {
                info!("server key {} accepted (no fingerprint pinned)", fp_sha256);
                Ok(true)
            }
        }
    }
}

/// `pinned` may be written with or without the `SHA256:` prefix.
pub(crate) fn fingerprint_matches(pinned: &str, fp_sha256: &str, key_b64: &str) -> bool {
    let pinned = pinned.trim();
    let bare = fp_sha256.strip_prefix("SHA256:").unwrap_or(fp_sha256);
    pinned == fp_sha256 || pinned == bare || pinned == key_b64
}
