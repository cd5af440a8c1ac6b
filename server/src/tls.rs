//! Optional TLS wrapping for client connections.
//!
//! When encryption is enabled and no certificate material exists on disk, a
//! self-signed certificate is generated at startup, so a fresh host works
//! without any manual setup. Supplied material always takes precedence.

use log::info;
use std::fs::File;
use std::io::{self, BufReader};
use std::path::Path;
use std::sync::Arc;
use tokio_rustls::rustls::pki_types::{CertificateDer, PrivateKeyDer};
use tokio_rustls::rustls::ServerConfig;
use tokio_rustls::TlsAcceptor;

/// First byte of a TLS ClientHello record. Used by the connection layer to
/// tell handshake attempts from plaintext when fallback is permitted.
pub const TLS_HANDSHAKE_BYTE: u8 = 0x16;

/// Builds an acceptor from PEM files, generating self-signed material first
/// if either file is missing.
pub fn build_acceptor(
    cert_path: &Path,
    key_path: &Path,
) -> Result<TlsAcceptor, Box<dyn std::error::Error>> {
    if !cert_path.exists() || !key_path.exists() {
        info!(
            "No certificate material at {}, generating a self-signed certificate",
            cert_path.display()
        );
        generate_self_signed(cert_path, key_path)?;
    }

    let certs = load_certs(cert_path)?;
    let key = load_key(key_path)?;

    let config = ServerConfig::builder()
        .with_no_client_auth()
        .with_single_cert(certs, key)?;

    info!("Loaded TLS certificate from {}", cert_path.display());
    Ok(TlsAcceptor::from(Arc::new(config)))
}

fn generate_self_signed(cert_path: &Path, key_path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let generated = rcgen::generate_simple_self_signed(vec!["localhost".to_string()])?;
    std::fs::write(cert_path, generated.cert.pem())?;
    std::fs::write(key_path, generated.key_pair.serialize_pem())?;
    Ok(())
}

fn load_certs(path: &Path) -> Result<Vec<CertificateDer<'static>>, io::Error> {
    let mut reader = BufReader::new(File::open(path)?);
    rustls_pemfile::certs(&mut reader).collect()
}

fn load_key(path: &Path) -> Result<PrivateKeyDer<'static>, io::Error> {
    let mut reader = BufReader::new(File::open(path)?);
    rustls_pemfile::private_key(&mut reader)?.ok_or_else(|| {
        io::Error::new(
            io::ErrorKind::InvalidData,
            format!("no private key found in {}", path.display()),
        )
    })
}
