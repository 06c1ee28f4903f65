use std::{env, fs, time::Duration};

use invcache_server::CacheTtls;
use invcache_server::config::loader::load_config;

#[test]
fn config_parsing_and_env_overrides_and_validation() {
    // Create a temporary TOML configuration file
    let dir = tempfile::tempdir().expect("tmp dir");
    let path = dir.path().join("invcache.toml");

    let toml_content = r#"
[namespace]
base = "warehouse"

[cache]
default_ttl_secs = 600
cleanup_interval_secs = 5

[cache.ttl_secs]
products = 60

[redis]
enabled = false
channel = "wh-invalidation"

[logging]
level = "debug"
"#;
    fs::write(&path, toml_content).expect("write toml");

    // 1) Valid config parses
    let cfg = load_config(path.to_str()).expect("should parse config");
    assert_eq!(cfg.namespace.base, "warehouse");
    assert_eq!(cfg.cache.cleanup_interval(), Duration::from_secs(5));
    assert_eq!(cfg.redis.channel, "wh-invalidation");
    assert_eq!(cfg.logging.level, "debug");

    let ttls = CacheTtls::from(&cfg.cache);
    assert_eq!(ttls.ttl_for("products"), Duration::from_secs(60));
    assert_eq!(ttls.ttl_for("suppliers"), Duration::from_secs(600));

    // 2) Env override should win over file
    unsafe {
        env::set_var("INVCACHE__CACHE__DEFAULT_TTL_SECS", "90");
    }
    let cfg_env = load_config(path.to_str()).expect("should parse config with env overrides");
    assert_eq!(cfg_env.cache.default_ttl_secs, 90);
    // cleanup env var
    unsafe {
        env::remove_var("INVCACHE__CACHE__DEFAULT_TTL_SECS");
    }

    // 3) Invalid config should error
    let invalid_path = dir.path().join("invalid.toml");
    let invalid_toml = r#"
[namespace]
base = "ware house"
"#;
    fs::write(&invalid_path, invalid_toml).expect("write invalid toml");
    let err = load_config(invalid_path.to_str()).expect_err("expected validation error");
    assert!(err.contains("namespace.base"));

    let redis_path = dir.path().join("redis.toml");
    fs::write(&redis_path, "[redis]\nenabled = true\nurl = \"\"\n").expect("write redis toml");
    let err = load_config(redis_path.to_str()).expect_err("expected validation error");
    assert!(err.contains("redis.url"));
}

#[test]
fn missing_file_falls_back_to_defaults() {
    let dir = tempfile::tempdir().expect("tmp dir");
    let path = dir.path().join("absent.toml");

    let cfg = load_config(path.to_str()).expect("defaults are valid");
    assert_eq!(cfg.namespace.base, "inventory");
    assert_eq!(cfg.cache.ttl_secs.get("categories"), Some(&7200));
    assert!(!cfg.redis.enabled);
}
