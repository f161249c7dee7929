use crate::config::TlsConfig;
use crate::error::ServerError;
use anyhow::Result;
use async_trait::async_trait;
use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use rustls::ServerConfig;
use std::fs::File;
use std::io::BufReader;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio_rustls::TlsAcceptor;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SecurityBackend {
    Plaintext,
    Tls,
}

/// Split, buffered view of an accepted connection.
pub struct Channel {
    pub reader: Box<dyn AsyncBufRead + Send + Unpin>,
    pub writer: Box<dyn AsyncWrite + Send + Unpin>,
    pub backend: SecurityBackend,
}

#[async_trait]
pub trait SecureChannel: Send + Sync {
    fn backend(&self) -> SecurityBackend;

    async fn accept(&self, stream: TcpStream, peer_addr: SocketAddr) -> Result<Channel>;
}

pub struct PlaintextChannel;

impl Default for PlaintextChannel {
    fn default() -> Self {
        Self::new()
    }
}

impl PlaintextChannel {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl SecureChannel for PlaintextChannel {
    fn backend(&self) -> SecurityBackend {
        SecurityBackend::Plaintext
    }

    async fn accept(&self, stream: TcpStream, _peer_addr: SocketAddr) -> Result<Channel> {
        let (r, w) = stream.into_split();
        Ok(Channel {
            reader: Box::new(tokio::io::BufReader::new(r)),
            writer: Box::new(w),
            backend: SecurityBackend::Plaintext,
        })
    }
}

/// Server-side TLS wrapper. The acceptor is built once per listener.
pub struct TlsSecureChannel {
    acceptor: TlsAcceptor,
}

impl TlsSecureChannel {
    pub fn from_config(tls: &TlsConfig) -> std::result::Result<Self, ServerError> {
        let certs = load_certs(&tls.cert_path)?;
        let key = load_private_key(&tls.key_path)?;
        let provider = Arc::new(rustls::crypto::ring::default_provider());
        let server_cfg = ServerConfig::builder_with_provider(provider)
            .with_safe_default_protocol_versions()
            .map_err(|e| ServerError::config(format!("tls protocol setup failed: {}", e)))?
            .with_no_client_auth()
            .with_single_cert(certs, key)
            .map_err(|e| ServerError::config(format!("invalid tls cert/key: {}", e)))?;
        Ok(Self {
            acceptor: TlsAcceptor::from(Arc::new(server_cfg)),
        })
    }
}

#[async_trait]
impl SecureChannel for TlsSecureChannel {
    fn backend(&self) -> SecurityBackend {
        SecurityBackend::Tls
    }

    async fn accept(&self, stream: TcpStream, _peer_addr: SocketAddr) -> Result<Channel> {
        let tls_stream = self.acceptor.accept(stream).await?;
        let (r, w) = tokio::io::split(tls_stream);
        Ok(Channel {
            reader: Box::new(tokio::io::BufReader::new(r)),
            writer: Box::new(w),
            backend: SecurityBackend::Tls,
        })
    }
}

fn load_certs(path: &str) -> std::result::Result<Vec<CertificateDer<'static>>, ServerError> {
    let file = File::open(path)
        .map_err(|e| ServerError::config(format!("cannot open tls cert '{}': {}", path, e)))?;
    let mut reader = BufReader::new(file);
    let certs = rustls_pemfile::certs(&mut reader)
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| ServerError::config(format!("cannot parse tls cert '{}': {}", path, e)))?;
    if certs.is_empty() {
        return Err(ServerError::config(format!("no certificates in '{}'", path)));
    }
    Ok(certs)
}

fn load_private_key(path: &str) -> std::result::Result<PrivateKeyDer<'static>, ServerError> {
    let file = File::open(path)
        .map_err(|e| ServerError::config(format!("cannot open tls key '{}': {}", path, e)))?;
    let mut reader = BufReader::new(file);
    rustls_pemfile::private_key(&mut reader)
        .map_err(|e| ServerError::config(format!("cannot parse tls key '{}': {}", path, e)))?
        .ok_or_else(|| ServerError::config(format!("no private key in '{}'", path)))
}

/// Pick the channel for a listener. Secure listeners require TLS material.
pub fn make_secure_channel(
    secure: bool,
    tls: Option<&TlsConfig>,
) -> std::result::Result<Arc<dyn SecureChannel>, ServerError> {
    if !secure {
        return Ok(Arc::new(PlaintextChannel::new()));
    }
    match tls {
        Some(tls) => Ok(Arc::new(TlsSecureChannel::from_config(tls)?)),
        None => Err(ServerError::config(
            "secure listener configured but [tls] cert_path/key_path are missing",
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plaintext_needs_no_material() {
        let ch = make_secure_channel(false, None).unwrap();
        assert_eq!(ch.backend(), SecurityBackend::Plaintext);
    }

    #[test]
    fn secure_without_material_is_a_configuration_error() {
        let err = make_secure_channel(true, None).err().unwrap();
        assert!(err.is_configuration());
    }

    #[test]
    fn missing_files_are_configuration_errors() {
        let tls = TlsConfig {
            cert_path: "/nonexistent/cert.pem".into(),
            key_path: "/nonexistent/key.pem".into(),
        };
        let err = make_secure_channel(true, Some(&tls)).err().unwrap();
        assert!(err.is_configuration());
    }

    #[test]
    fn generated_material_builds_an_acceptor() {
        let dir = tempfile::tempdir().unwrap();
        let certified = rcgen::generate_simple_self_signed(vec!["localhost".to_string()]).unwrap();
        let cert_path = dir.path().join("cert.pem");
        let key_path = dir.path().join("key.pem");
        std::fs::write(&cert_path, certified.cert.pem()).unwrap();
        std::fs::write(&key_path, certified.key_pair.serialize_pem()).unwrap();
        let tls = TlsConfig {
            cert_path: cert_path.to_string_lossy().into_owned(),
            key_path: key_path.to_string_lossy().into_owned(),
        };
        let ch = make_secure_channel(true, Some(&tls)).unwrap();
        assert_eq!(ch.backend(), SecurityBackend::Tls);
    }
}
