//! TLS configuration for the public listener.

use std::path::PathBuf;

/// Paths to PEM-encoded TLS material.
#[derive(Debug, Clone)]
pub struct TlsServerConfig {
    /// Path to the certificate file.
    pub certificate: PathBuf,
    /// Path to the private key file.
    pub key: PathBuf,
}
