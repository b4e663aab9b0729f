use std::io::Write;
use std::path::PathBuf;
use warden::config::{Config, ConfigError};

#[test]
fn test_config_defaults() {
    let cfg = Config::default();
    assert_eq!(cfg.server.listen_addr, "127.0.0.1:8080");
    assert_eq!(cfg.server.keep_alive_timeout_secs, 60);
    assert_eq!(cfg.server.keep_alive_max_requests, 1000);
    assert_eq!(cfg.server.buffer_size, 4096);
    assert_eq!(cfg.resources.forbidden, vec!["..".to_string(), ":".to_string()]);
    assert_eq!(cfg.mounts.len(), 1);
    assert_eq!(cfg.mounts[0].uri, "/");
}

#[test]
fn test_config_from_yaml() {
    let yaml = r#"
server:
  listen_addr: "0.0.0.0:9000"
  max_connections: 8
  keep_alive_timeout_secs: 5
resources:
  idle_ttl_secs: 300
  content_length_limit: 1048576
mounts:
  - uri: "/"
    path: "./public"
  - uri: "/assets"
    path: "./static"
"#;
    let cfg = Config::from_yaml_str(yaml).unwrap();

    assert_eq!(cfg.server.listen_addr, "0.0.0.0:9000");
    assert_eq!(cfg.server.max_connections, 8);
    assert_eq!(cfg.server.keep_alive_timeout().as_secs(), 5);
    // Unset fields keep their defaults.
    assert_eq!(cfg.server.backlog, 1024);
    assert_eq!(cfg.server.server_name, "warden");
    assert_eq!(cfg.resources.idle_ttl_secs, 300);
    assert_eq!(cfg.resources.content_length_limit, 1_048_576);
    assert_eq!(cfg.resources.forbidden.len(), 2);
    assert_eq!(cfg.mounts[1].uri, "/assets");
    assert_eq!(cfg.mounts[1].path, PathBuf::from("./static"));
}

#[test]
fn test_config_empty_yaml_uses_defaults() {
    let cfg = Config::from_yaml_str("{}").unwrap();
    assert_eq!(cfg.server.listen_addr, "127.0.0.1:8080");
    assert_eq!(cfg.mounts[0].path, PathBuf::from("."));
}

#[test]
fn test_config_invalid_yaml() {
    let err = Config::from_yaml_str("server: [not, a, map]").unwrap_err();
    assert!(matches!(err, ConfigError::Parse(_)));
}

#[test]
fn test_config_from_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "server:\n  server_name: \"edge\"").unwrap();

    let cfg = Config::from_file(file.path()).unwrap();
    assert_eq!(cfg.server.server_name, "edge");
}

#[test]
fn test_config_missing_file() {
    let err = Config::from_file("/definitely/not/here.yaml").unwrap_err();
    assert!(matches!(err, ConfigError::Read { .. }));
}

#[test]
fn test_config_listen_override_from_env() {
    unsafe {
        std::env::remove_var("WARDEN_CONFIG");
        std::env::set_var("LISTEN", "0.0.0.0:3000");
    }
    let cfg = Config::load().unwrap();
    assert_eq!(cfg.server.listen_addr, "0.0.0.0:3000");
    unsafe {
        std::env::remove_var("LISTEN");
    }
}
