use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use serde::Deserialize;

use crate::http::message::MessageConfig;
use crate::http::parser::Limits;
use crate::websocket::frame::FrameConfig;

/// Environment variable naming the YAML configuration file.
pub const CONFIG_ENV: &str = "DTNWEB_CONFIG";
/// Environment variable overriding `listen_addr`.
pub const LISTEN_ENV: &str = "LISTEN";

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    pub listen_addr: String,
    /// Domain used for plain TCP and for TLS clients that send no SNI name.
    pub default_domain: String,
    pub domains: Vec<DomainConfig>,
    pub limits: LimitsConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DomainConfig {
    pub name: String,
    /// Document root.
    pub root: PathBuf,
    #[serde(default)]
    pub certificate: Option<PathBuf>,
    #[serde(default)]
    pub key: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default)]
pub struct LimitsConfig {
    pub header_capacity: usize,
    pub buffer_size: usize,
    pub max_method_length: usize,
    /// Bytes a connection may buffer while an HTTP request is incomplete.
    pub max_request_size: usize,
    pub max_frame_size: usize,
    pub max_message_size: usize,
    pub ws_chunk_size: usize,
    pub file_chunk_size: usize,
    pub recache_threshold: usize,
    /// Idle objects kept per size class. 0 disables pooling.
    pub pool_capacity: usize,
    pub lock_timeout_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen_addr: "127.0.0.1:8080".to_string(),
            default_domain: "localhost".to_string(),
            domains: vec![DomainConfig {
                name: "localhost".to_string(),
                root: PathBuf::from("public"),
                certificate: None,
                key: None,
            }],
            limits: LimitsConfig::default(),
        }
    }
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            header_capacity: 64,
            buffer_size: 4096,
            max_method_length: 16,
            max_request_size: 1024 * 1024,
            max_frame_size: 16 * 1024 * 1024,
            max_message_size: 64 * 1024 * 1024,
            ws_chunk_size: 64 * 1024,
            file_chunk_size: 64 * 1024,
            recache_threshold: 64 * 1024,
            pool_capacity: 32,
            lock_timeout_ms: 100,
        }
    }
}

impl Config {
    /// Loads the file named by `DTNWEB_CONFIG` (defaults when unset), then applies
    /// the `LISTEN` override.
    pub fn load() -> anyhow::Result<Self> {
        Self::load_with(|key| std::env::var(key).ok())
    }

    /// [`Config::load`] with an explicit environment lookup.
    pub fn load_with(env: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let mut cfg = match env(CONFIG_ENV) {
            Some(path) => {
                let text = std::fs::read_to_string(&path)
                    .with_context(|| format!("reading config file {path}"))?;
                Self::from_yaml(&text).with_context(|| format!("parsing config file {path}"))?
            }
            None => Self::default(),
        };
        if let Some(listen_addr) = env(LISTEN_ENV) {
            cfg.listen_addr = listen_addr;
        }
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn from_yaml(text: &str) -> anyhow::Result<Self> {
        Ok(serde_yaml::from_str(text)?)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        let limits = &self.limits;
        for (name, value) in [
            ("header_capacity", limits.header_capacity),
            ("buffer_size", limits.buffer_size),
            ("max_method_length", limits.max_method_length),
            ("ws_chunk_size", limits.ws_chunk_size),
            ("file_chunk_size", limits.file_chunk_size),
        ] {
            anyhow::ensure!(value > 0, "limits.{name} must be greater than zero");
        }
        for domain in &self.domains {
            anyhow::ensure!(
                domain.certificate.is_some() == domain.key.is_some(),
                "domain {} needs both certificate and key",
                domain.name
            );
        }
        Ok(())
    }

    /// Configuration for `name`, compared case-insensitively.
    pub fn domain(&self, name: &str) -> Option<&DomainConfig> {
        self.domains.iter().find(|d| d.name.eq_ignore_ascii_case(name))
    }

    /// True when at least one domain carries a certificate.
    pub fn has_tls(&self) -> bool {
        self.domains.iter().any(|d| d.certificate.is_some())
    }
}

impl LimitsConfig {
    pub fn message_config(&self) -> MessageConfig {
        MessageConfig {
            limits: Limits {
                header_capacity: self.header_capacity,
                max_method_length: self.max_method_length,
            },
            buffer_size: self.buffer_size,
            recache_threshold: self.recache_threshold,
        }
    }

    pub fn frame_config(&self) -> FrameConfig {
        FrameConfig {
            max_frame_size: self.max_frame_size,
            buffer_size: self.buffer_size,
            recache_threshold: self.recache_threshold,
        }
    }

    pub fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.lock_timeout_ms)
    }
}
