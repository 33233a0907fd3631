use std::collections::HashMap;
use std::io::Write;

use dtnweb::config::{CONFIG_ENV, Config, LISTEN_ENV};

fn env(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
    let vars: HashMap<String, String> = vars
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    move |key| vars.get(key).cloned()
}

#[test]
fn test_config_default_address() {
    // When LISTEN is not set, should use default
    let cfg = Config::load_with(env(&[])).unwrap();
    assert_eq!(cfg.listen_addr, "127.0.0.1:8080");
    assert_eq!(cfg.default_domain, "localhost");
    assert_eq!(cfg.limits.header_capacity, 64);
}

#[test]
fn test_config_custom_address_from_env() {
    let cfg = Config::load_with(env(&[(LISTEN_ENV, "0.0.0.0:3000")])).unwrap();
    assert_eq!(cfg.listen_addr, "0.0.0.0:3000");
}

#[test]
fn test_config_clone() {
    let cfg1 = Config::load_with(env(&[])).unwrap();
    let cfg2 = cfg1.clone();
    assert_eq!(cfg1.listen_addr, cfg2.listen_addr);
}

#[test]
fn test_config_from_yaml_fills_defaults() {
    let cfg = Config::from_yaml(
        r#"
listen_addr: "0.0.0.0:8443"
default_domain: example.com
domains:
  - name: example.com
    root: /srv/example
limits:
  max_frame_size: 1024
"#,
    )
    .unwrap();

    assert_eq!(cfg.listen_addr, "0.0.0.0:8443");
    assert_eq!(cfg.domains.len(), 1);
    assert_eq!(cfg.limits.max_frame_size, 1024);
    assert_eq!(cfg.limits.buffer_size, 4096);
    assert!(!cfg.has_tls());
    assert!(cfg.domain("EXAMPLE.com").is_some());
}

#[test]
fn test_config_file_then_env_override() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "listen_addr: \"127.0.0.1:9000\"\nlimits:\n  pool_capacity: 0").unwrap();
    let path = file.path().to_str().unwrap();

    let cfg = Config::load_with(env(&[(CONFIG_ENV, path)])).unwrap();
    assert_eq!(cfg.listen_addr, "127.0.0.1:9000");
    assert_eq!(cfg.limits.pool_capacity, 0);

    let cfg = Config::load_with(env(&[(CONFIG_ENV, path), (LISTEN_ENV, "127.0.0.1:8000")])).unwrap();
    assert_eq!(cfg.listen_addr, "127.0.0.1:8000");
}

#[test]
fn test_config_rejects_certificate_without_key() {
    let cfg = Config::from_yaml(
        r#"
domains:
  - name: example.com
    root: /srv/example
    certificate: /etc/tls/example.pem
"#,
    )
    .unwrap();
    assert!(cfg.validate().is_err());
}

#[test]
fn test_config_missing_file_is_an_error() {
    let result = Config::load_with(env(&[(CONFIG_ENV, "/nonexistent/dtnweb.yaml")]));
    assert!(result.is_err());
}
