//! TLS client configuration for secure sessions

use anyhow::{Context, Result};
use std::path::Path;
use std::sync::Arc;
use tracing::info;

use crate::config::TlsConfig;

/// Build the rustls client config shared by every secure connection.
///
/// Trusts the webpki roots plus, when configured, the certificates in
/// `tls.ca_path`. Always uses the ring provider, whatever the process
/// default is (or whether one is installed at all).
pub fn build_client_config(config: &TlsConfig) -> Result<Arc<rustls::ClientConfig>> {
    let mut root_store = rustls::RootCertStore::empty();
    root_store.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());

    if let Some(ca_path) = &config.ca_path {
        let added = add_pem_roots(&mut root_store, Path::new(ca_path))?;
        info!(ca = %ca_path, added, "Loaded extra CA certificates");
    }

    let provider = Arc::new(rustls::crypto::ring::default_provider());
    let tls_config = rustls::ClientConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()
        .context("Failed to select TLS protocol versions")?
        .with_root_certificates(root_store)
        .with_no_client_auth();

    Ok(Arc::new(tls_config))
}

fn add_pem_roots(store: &mut rustls::RootCertStore, path: &Path) -> Result<usize> {
    let pem = std::fs::read(path)
        .with_context(|| format!("Failed to read CA file: {:?}", path))?;

    let certs = rustls_pemfile::certs(&mut pem.as_slice())
        .collect::<Result<Vec<_>, _>>()
        .context("Failed to parse CA certificates")?;

    if certs.is_empty() {
        anyhow::bail!("No certificates found in {:?}", path);
    }

    let (added, _ignored) = store.add_parsable_certificates(certs);
    Ok(added)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_roots() {
        // No process-level crypto provider is installed in this binary
        let config = TlsConfig { ca_path: None };
        assert!(build_client_config(&config).is_ok());
    }

    #[test]
    fn test_extra_ca_is_trusted() {
        let cert = rcgen::generate_simple_self_signed(vec!["collab.test".to_string()]).unwrap();
        let path = std::env::temp_dir().join(format!("collab-mux-ca-{}.pem", std::process::id()));
        std::fs::write(&path, cert.cert.pem()).unwrap();

        let config = TlsConfig {
            ca_path: Some(path.to_string_lossy().into_owned()),
        };
        let built = build_client_config(&config);
        std::fs::remove_file(&path).unwrap();
        assert!(built.is_ok());
    }

    #[test]
    fn test_empty_ca_file_rejected() {
        let path = std::env::temp_dir().join(format!("collab-mux-empty-{}.pem", std::process::id()));
        std::fs::write(&path, "").unwrap();

        let config = TlsConfig {
            ca_path: Some(path.to_string_lossy().into_owned()),
        };
        let built = build_client_config(&config);
        std::fs::remove_file(&path).unwrap();
        assert!(built.is_err());
    }

    #[test]
    fn test_missing_ca_file() {
        let config = TlsConfig {
            ca_path: Some("/nonexistent/collab-mux-ca.pem".to_string()),
        };
        assert!(build_client_config(&config).is_err());
    }
}
