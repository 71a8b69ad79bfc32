/*
 * server.rs
 * Copyright (C) 2026 Chris Burdess
 *
 * This file is part of Raven, a multi-tenant IMAP4rev1 mail-access server.
 *
 * Raven is free software: you can redistribute it and/or modify
 * it under the terms of the GNU General Public License as published by
 * the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * Raven is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 * GNU General Public License for more details.
 *
 * You should have received a copy of the GNU General Public License
 * along with Raven.  If not, see <http://www.gnu.org/licenses/>.
 */

//! Inbound connection handling: loads the server TLS config from PEM files and
//! wraps accepted sockets in a tagged [`Connection`] so the session loop never
//! needs to know whether it is talking over plaintext, real TLS, or (in
//! tests) a mock TLS stream — all three only ever need to be read, written,
//! and asked whether they're encrypted.

use std::io;
use std::path::Path;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use rustls::ServerConfig;
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::TcpStream;
use tokio_rustls::server::TlsStream as TokioServerTlsStream;
use tokio_rustls::TlsAcceptor;

use crate::error::{RavenError, Result};

/// Installs `ring` as the process-wide rustls crypto provider. Idempotent:
/// a second install (e.g. from a test that also calls this) is ignored
/// rather than panicking, since rustls only allows the first one to stick.
pub fn install_crypto_provider() {
    let _ = rustls::crypto::ring::default_provider().install_default();
}

/// Load a `rustls::ServerConfig` from a PEM certificate chain and private key.
///
/// Accepts PKCS#8, RSA, or SEC1 EC private keys, matching what
/// `rustls-pemfile` can parse. Returns a [`TlsAcceptor`] ready to hand to
/// accepted TCP sockets.
pub fn load_server_config(cert_path: &Path, key_path: &Path) -> Result<TlsAcceptor> {
    let certs = load_certs(cert_path)?;
    let key = load_private_key(key_path)?;

    let config = ServerConfig::builder()
        .with_no_client_auth()
        .with_single_cert(certs, key)
        .map_err(|e| RavenError::Tls(format!("building server config: {e}")))?;

    Ok(TlsAcceptor::from(Arc::new(config)))
}

fn load_certs(path: &Path) -> Result<Vec<CertificateDer<'static>>> {
    let raw = std::fs::read(path)
        .map_err(|e| RavenError::Config(format!("reading cert {}: {e}", path.display())))?;
    let mut reader = io::BufReader::new(raw.as_slice());
    rustls_pemfile::certs(&mut reader)
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| RavenError::Tls(format!("parsing cert {}: {e}", path.display())))
}

fn load_private_key(path: &Path) -> Result<PrivateKeyDer<'static>> {
    let raw = std::fs::read(path)
        .map_err(|e| RavenError::Config(format!("reading key {}: {e}", path.display())))?;
    let mut reader = io::BufReader::new(raw.as_slice());
    rustls_pemfile::private_key(&mut reader)
        .map_err(|e| RavenError::Tls(format!("parsing key {}: {e}", path.display())))?
        .ok_or_else(|| RavenError::Tls(format!("no private key found in {}", path.display())))
}

/// An accepted connection, tagged by what's underneath it.
///
/// `Mock` exists only for tests: it lets integration tests exercise the
/// STARTTLS state transition (capability string changes, command table
/// changes) without generating a real certificate and handshake for every
/// test case.
pub enum Connection {
    Plain(TcpStream),
    Tls(Box<TokioServerTlsStream<TcpStream>>),
    Mock { inner: TcpStream, tls: bool },
}

impl Connection {
    pub fn plain(stream: TcpStream) -> Self {
        Connection::Plain(stream)
    }

    pub fn tls(stream: TokioServerTlsStream<TcpStream>) -> Self {
        Connection::Tls(Box::new(stream))
    }

    pub fn mock(stream: TcpStream, tls: bool) -> Self {
        Connection::Mock { inner: stream, tls }
    }

    pub fn is_tls(&self) -> bool {
        match self {
            Connection::Plain(_) => false,
            Connection::Tls(_) => true,
            Connection::Mock { tls, .. } => *tls,
        }
    }

    /// Consume a plaintext connection and perform the TLS handshake, per
    /// STARTTLS. Only valid on the `Plain` variant; callers hold that
    /// invariant by construction (STARTTLS is rejected once already secure).
    pub async fn upgrade(self, acceptor: &TlsAcceptor) -> Result<Self> {
        match self {
            Connection::Plain(tcp) => {
                let tls = acceptor
                    .accept(tcp)
                    .await
                    .map_err(|e| RavenError::Tls(format!("STARTTLS handshake failed: {e}")))?;
                Ok(Connection::Tls(Box::new(tls)))
            }
            other => Ok(other),
        }
    }
}

impl AsyncRead for Connection {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Connection::Plain(s) => Pin::new(s).poll_read(cx, buf),
            Connection::Tls(s) => Pin::new(s.as_mut()).poll_read(cx, buf),
            Connection::Mock { inner, .. } => Pin::new(inner).poll_read(cx, buf),
        }
    }
}

impl AsyncWrite for Connection {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        match self.get_mut() {
            Connection::Plain(s) => Pin::new(s).poll_write(cx, buf),
            Connection::Tls(s) => Pin::new(s.as_mut()).poll_write(cx, buf),
            Connection::Mock { inner, .. } => Pin::new(inner).poll_write(cx, buf),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Connection::Plain(s) => Pin::new(s).poll_flush(cx),
            Connection::Tls(s) => Pin::new(s.as_mut()).poll_flush(cx),
            Connection::Mock { inner, .. } => Pin::new(inner).poll_flush(cx),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Connection::Plain(s) => Pin::new(s).poll_shutdown(cx),
            Connection::Tls(s) => Pin::new(s.as_mut()).poll_shutdown(cx),
            Connection::Mock { inner, .. } => Pin::new(inner).poll_shutdown(cx),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_self_signed(dir: &std::path::Path) -> (std::path::PathBuf, std::path::PathBuf) {
        let cert = rcgen::generate_simple_self_signed(vec!["127.0.0.1".to_string()]).unwrap();
        let cert_path = dir.join("cert.pem");
        let key_path = dir.join("key.pem");
        std::fs::File::create(&cert_path)
            .unwrap()
            .write_all(cert.cert.pem().as_bytes())
            .unwrap();
        std::fs::File::create(&key_path)
            .unwrap()
            .write_all(cert.signing_key.serialize_pem().as_bytes())
            .unwrap();
        (cert_path, key_path)
    }

    #[test]
    fn loads_self_signed_pair() {
        let dir = std::env::temp_dir().join(format!("raven-test-tls-config-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let (cert_path, key_path) = write_self_signed(&dir);
        let result = load_server_config(&cert_path, &key_path);
        assert!(result.is_ok());
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn rejects_missing_cert_file() {
        let result = load_server_config(
            Path::new("/nonexistent/cert.pem"),
            Path::new("/nonexistent/key.pem"),
        );
        assert!(matches!(result, Err(RavenError::Config(_))));
    }
}
