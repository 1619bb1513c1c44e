//! Explicit FTPS (`AUTH TLS`) and certificate pinning.
//!
//! The FTP session does not expose the certificate it negotiated, so a
//! pinned fingerprint is checked on a short-lived control connection that
//! stops right after the handshake.

use anyhow::{anyhow, bail, Context, Result};
use native_tls::TlsConnector;
use sha2::{Digest, Sha256};
use std::io::{BufRead, BufReader, Write};
use std::net::TcpStream;
use std::time::Duration;

const REPLY_TIMEOUT: Duration = Duration::from_secs(30);

/// SHA-256 certificate fingerprint as hex, with or without a `SHA256:`
/// prefix, colons or spaces, e.g. `AB:CD:...` or `sha256:abcd...`.
pub(crate) fn parse_fingerprint(value: &str) -> Result<[u8; 32]> {
    let trimmed = value.trim();
    let body = match trimmed.get(..7) {
        Some(prefix) if prefix.eq_ignore_ascii_case("sha256:") => &trimmed[7..],
        _ => trimmed,
    };
    let digits: String = body.chars().filter(|c| !matches!(c, ':' | ' ')).collect();
    let bytes = hex::decode(&digits)
        .with_context(|| format!("certificate fingerprint {value:?} is not hex"))?;
    bytes
        .try_into()
        .map_err(|_| anyhow!("certificate fingerprint {value:?} is not a SHA-256 digest"))
}

pub(crate) fn sha256(der: &[u8]) -> [u8; 32] {
    Sha256::digest(der).into()
}

/// One FTP reply: its code and full text. Multi-line replies (`220-...`)
/// run until the line starting with the same code and a space.
pub(crate) fn read_reply<R: BufRead>(reader: &mut R) -> Result<(u16, String)> {
    let mut line = String::new();
    if reader.read_line(&mut line)? == 0 {
        bail!("connection closed before a reply");
    }
    let code: u16 = line
        .get(..3)
        .and_then(|code| code.parse().ok())
        .ok_or_else(|| anyhow!("malformed reply {:?}", line.trim_end()))?;
    let mut text = line.trim_end().to_string();
    if line.as_bytes().get(3) == Some(&b'-') {
        let last = format!("{code} ");
        loop {
            line.clear();
            if reader.read_line(&mut line)? == 0 {
                bail!("connection closed inside a multi-line reply");
            }
            text.push('\n');
            text.push_str(line.trim_end());
            if line.starts_with(&last) {
                break;
            }
        }
    }
    Ok((code, text))
}

/// DER certificate the server presents after `AUTH TLS`. Nothing is
/// verified here; the caller compares fingerprints.
pub(crate) fn server_certificate(host: &str, port: u16) -> Result<Vec<u8>> {
    let stream =
        TcpStream::connect((host, port)).with_context(|| format!("connect to {host}:{port}"))?;
    stream.set_read_timeout(Some(REPLY_TIMEOUT))?;
    let mut reader = BufReader::new(stream.try_clone()?);
    let mut writer = stream;

    let (code, text) = read_reply(&mut reader)?;
    if code != 220 {
        bail!("unexpected greeting from {host}:{port}: {text}");
    }
    writer.write_all(b"AUTH TLS\r\n")?;
    let (code, text) = read_reply(&mut reader)?;
    if code != 234 {
        bail!("{host}:{port} refused AUTH TLS: {text}");
    }

    let tls = session_connector()?
        .connect(host, writer)
        .map_err(|err| anyhow!("TLS handshake with {host}:{port}: {err}"))?;
    let certificate = tls
        .peer_certificate()?
        .ok_or_else(|| anyhow!("{host}:{port} presented no certificate"))?;
    Ok(certificate.to_der()?)
}

/// Connector for the session itself. Any certificate is accepted: with a
/// pin it was already matched by [`server_certificate`], without one the
/// server is trusted unconditionally, as SSH hosts are.
pub(crate) fn session_connector() -> Result<TlsConnector> {
    Ok(TlsConnector::builder()
        .danger_accept_invalid_certs(true)
        .danger_accept_invalid_hostnames(true)
        .build()?)
}
