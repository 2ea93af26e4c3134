use std::path::PathBuf;

/// Tunables shared by both endpoint kinds.
///
/// A timeout of zero disables the corresponding deadline entirely.
#[derive(Debug, Clone, Copy)]
pub struct EndpointConfig {
    pub read_timeout_secs: u64,
    pub write_timeout_secs: u64,
    pub max_payload: usize,
}

impl Default for EndpointConfig {
    fn default() -> Self {
        EndpointConfig {
            read_timeout_secs: 30,
            write_timeout_secs: 30,
            max_payload: 1024 * 1024,
        }
    }
}

/// PEM files a TLS listener presents to its peers.
#[derive(Debug, Clone)]
pub struct TlsServerIdentity {
    pub cert_chain_path: PathBuf,
    pub private_key_path: PathBuf,
}

impl TlsServerIdentity {
    pub fn new(cert_chain_path: impl Into<PathBuf>, private_key_path: impl Into<PathBuf>) -> Self {
        TlsServerIdentity {
            cert_chain_path: cert_chain_path.into(),
            private_key_path: private_key_path.into(),
        }
    }
}
