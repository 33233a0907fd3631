//! TLS termination with per-domain certificates selected by SNI.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio_rustls::rustls::crypto::CryptoProvider;
use tokio_rustls::rustls::pki_types::{CertificateDer, PrivateKeyDer};
use tokio_rustls::rustls::server::{ClientHello, ResolvesServerCert, ResolvesServerCertUsingSni};
use tokio_rustls::rustls::sign::CertifiedKey;
use tokio_rustls::rustls::{self, ServerConfig};

use crate::config::Config;

pub fn load_certs(path: &Path) -> Result<Vec<CertificateDer<'static>>> {
    let file = File::open(path).with_context(|| format!("opening certificate {}", path.display()))?;
    let certs = rustls_pemfile::certs(&mut BufReader::new(file))
        .collect::<Result<Vec<_>, _>>()
        .with_context(|| format!("reading certificate {}", path.display()))?;
    anyhow::ensure!(!certs.is_empty(), "no certificate found in {}", path.display());
    Ok(certs)
}

pub fn load_key(path: &Path) -> Result<PrivateKeyDer<'static>> {
    let file = File::open(path).with_context(|| format!("opening private key {}", path.display()))?;
    rustls_pemfile::private_key(&mut BufReader::new(file))
        .with_context(|| format!("reading private key {}", path.display()))?
        .with_context(|| format!("no private key found in {}", path.display()))
}

/// Picks the certificate by SNI name, or the default domain's when the client sent none.
#[derive(Debug)]
struct DomainResolver {
    by_name: ResolvesServerCertUsingSni,
    fallback: Option<Arc<CertifiedKey>>,
}

impl ResolvesServerCert for DomainResolver {
    fn resolve(&self, client_hello: ClientHello<'_>) -> Option<Arc<CertifiedKey>> {
        if client_hello.server_name().is_some() {
            self.by_name.resolve(client_hello)
        } else {
            self.fallback.clone()
        }
    }
}

/// Builds the rustls server configuration from every domain that has a certificate.
pub fn server_config(cfg: &Config) -> Result<Arc<ServerConfig>> {
    let provider = CryptoProvider::get_default()
        .cloned()
        .unwrap_or_else(|| Arc::new(rustls::crypto::ring::default_provider()));

    let mut by_name = ResolvesServerCertUsingSni::new();
    let mut fallback = None;
    for domain in &cfg.domains {
        let (Some(cert_path), Some(key_path)) = (&domain.certificate, &domain.key) else {
            continue;
        };
        let certs = load_certs(cert_path)?;
        let key = provider
            .key_provider
            .load_private_key(load_key(key_path)?)
            .with_context(|| format!("unsupported private key for {}", domain.name))?;
        let certified = Arc::new(CertifiedKey::new(certs, key));
        by_name
            .add(&domain.name, CertifiedKey::clone(&certified))
            .with_context(|| format!("certificate does not cover {}", domain.name))?;
        if domain.name.eq_ignore_ascii_case(&cfg.default_domain) {
            fallback = Some(certified);
        }
        tracing::info!(domain = %domain.name, "loaded certificate");
    }

    let mut config = ServerConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()
        .context("configuring TLS protocol versions")?
        .with_no_client_auth()
        .with_cert_resolver(Arc::new(DomainResolver { by_name, fallback }));
    config.alpn_protocols = vec![b"http/1.1".to_vec()];
    Ok(Arc::new(config))
}
