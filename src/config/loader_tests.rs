//! Tests for configuration file loading.

use super::*;
use serial_test::serial;
use std::env;
use std::fs;

/// Write `contents` to a uniquely named file in the temp directory.
fn temp_config(name: &str, contents: &str) -> PathBuf {
    let path = env::temp_dir().join(format!("asv_test_{}_{}.toml", name, std::process::id()));
    fs::write(&path, contents).expect("Failed to write test config");
    path
}

/// RAII guard to ensure environment variable cleanup even under test parallelism.
struct EnvGuard(&'static str);

impl EnvGuard {
    fn new(name: &'static str) -> Self {
        env::remove_var(name);
        EnvGuard(name)
    }
}

impl Drop for EnvGuard {
    fn drop(&mut self) {
        env::remove_var(self.0);
    }
}

// ===== Loading =====

#[test]
fn default_config_path_contains_asv_config_toml() {
    let path = default_config_path().expect("Should have default path");
    let path_str = path.to_string_lossy();
    assert!(
        path_str.contains("asv") && path_str.ends_with("config.toml"),
        "Path should contain 'asv' and end with 'config.toml', got: {}",
        path_str
    );
}

#[test]
fn load_config_file_returns_ok_none_for_missing_file() {
    let result = load_config_file("/nonexistent/path/to/config.toml");
    assert_eq!(
        result,
        Ok(None),
        "Missing config file should return Ok(None), not an error"
    );
}

#[test]
fn load_config_file_parses_valid_toml() {
    let path = temp_config(
        "valid",
        r#"
default_source = "codex"
default_model = "gpt-5-codex"
skip_permissions = true
remote_url = "ws://localhost:3001/ws/chat"
reconnect_delay_secs = 2
page_size = 20

[cli]
codex_path = "/opt/codex/bin/codex"
"#,
    );

    let config = load_config_file(&path)
        .expect("Should parse valid TOML")
        .expect("Should return Some for existing file");

    assert_eq!(config.default_source, Some(SourceCli::Codex));
    assert_eq!(config.default_model.as_deref(), Some("gpt-5-codex"));
    assert_eq!(config.skip_permissions, Some(true));
    assert_eq!(config.reconnect_delay_secs, Some(2));
    assert_eq!(config.page_size, Some(20));
    assert_eq!(
        config.cli.and_then(|cli| cli.codex_path),
        Some(PathBuf::from("/opt/codex/bin/codex"))
    );

    fs::remove_file(path).ok();
}

#[test]
fn load_config_file_returns_error_for_invalid_toml() {
    let path = temp_config("invalid", "default_model = [unclosed");

    let result = load_config_file(&path);
    assert!(
        matches!(result, Err(ConfigError::ParseError { .. })),
        "Invalid TOML should be a ParseError, got {:?}",
        result
    );

    fs::remove_file(path).ok();
}

#[test]
fn config_file_rejects_unknown_fields() {
    let result: Result<ConfigFile, _> = toml::from_str("theme = \"dark\"");
    assert!(result.is_err(), "Unknown keys should be rejected");
}

#[test]
fn config_file_rejects_unknown_source() {
    let result: Result<ConfigFile, _> = toml::from_str("default_source = \"gemini\"");
    assert!(result.is_err(), "Only claude and codex are valid sources");
}

// ===== Merging =====

#[test]
fn merge_config_uses_defaults_when_none() {
    assert_eq!(merge_config(None), ResolvedConfig::default());
}

#[test]
fn resolved_config_default_has_expected_values() {
    let config = ResolvedConfig::default();
    assert_eq!(config.default_source, SourceCli::Claude);
    assert_eq!(config.default_model, "");
    assert!(!config.skip_permissions);
    assert_eq!(config.remote_url, None);
    assert_eq!(config.quick_chat_url, None);
    assert_eq!(config.reconnect_delay, Duration::from_secs(5));
    assert_eq!(config.page_size, 50);
    assert_eq!(config.cli_paths, CliPaths::default());
}

#[test]
fn merge_config_overrides_with_config_file_values() {
    let file = ConfigFile {
        default_source: Some(SourceCli::Codex),
        quick_chat_url: Some("http://localhost:3001/api/quick-chat".to_string()),
        reconnect_delay_secs: Some(1),
        cli: Some(CliSection {
            claude_path: Some(PathBuf::from("/bin/claude")),
            codex_path: None,
        }),
        ..ConfigFile::default()
    };

    let resolved = merge_config(Some(file));

    assert_eq!(resolved.default_source, SourceCli::Codex);
    assert_eq!(
        resolved.quick_chat_url.as_deref(),
        Some("http://localhost:3001/api/quick-chat")
    );
    assert_eq!(resolved.reconnect_delay, Duration::from_secs(1));
    assert_eq!(resolved.cli_paths.claude, Some(PathBuf::from("/bin/claude")));
    assert_eq!(resolved.default_model, "", "Unset fields keep defaults");
}

#[test]
fn merge_config_ignores_zero_page_size() {
    let file = ConfigFile {
        page_size: Some(0),
        ..ConfigFile::default()
    };
    assert_eq!(merge_config(Some(file)).page_size, DEFAULT_PAGE_SIZE);
}

#[test]
fn config_file_log_path_overrides_default() {
    let custom_path = PathBuf::from("/custom/path/to/app.log");
    let file = ConfigFile {
        log_file_path: Some(custom_path.clone()),
        ..ConfigFile::default()
    };
    assert_eq!(merge_config(Some(file)).log_file_path, custom_path);
}

#[test]
fn default_log_path_ends_with_asv_log() {
    let path = default_log_path();
    assert!(
        path.to_string_lossy().ends_with("asv.log"),
        "Default log path should end with 'asv.log', got: {:?}",
        path
    );
}

// ===== Environment =====

#[test]
#[serial(asv_env)]
fn apply_env_overrides_reads_asv_variables() {
    let _source = EnvGuard::new("ASV_SOURCE");
    let _model = EnvGuard::new("ASV_MODEL");
    let _url = EnvGuard::new("ASV_REMOTE_URL");
    let _skip = EnvGuard::new("ASV_SKIP_PERMISSIONS");

    env::set_var("ASV_SOURCE", "codex");
    env::set_var("ASV_MODEL", "o4-mini");
    env::set_var("ASV_REMOTE_URL", "ws://example:1/ws");
    env::set_var("ASV_SKIP_PERMISSIONS", "TRUE");

    let result = apply_env_overrides(ResolvedConfig::default());

    assert_eq!(result.default_source, SourceCli::Codex);
    assert_eq!(result.default_model, "o4-mini");
    assert_eq!(result.remote_url.as_deref(), Some("ws://example:1/ws"));
    assert!(result.skip_permissions);
}

#[test]
#[serial(asv_env)]
fn apply_env_overrides_ignores_invalid_source() {
    let _source = EnvGuard::new("ASV_SOURCE");
    env::set_var("ASV_SOURCE", "gemini");

    let result = apply_env_overrides(ResolvedConfig::default());
    assert_eq!(result.default_source, SourceCli::Claude);
}

#[test]
#[serial(asv_env)]
fn apply_env_overrides_no_change_when_env_vars_not_set() {
    let _source = EnvGuard::new("ASV_SOURCE");
    let _model = EnvGuard::new("ASV_MODEL");
    let _url = EnvGuard::new("ASV_REMOTE_URL");
    let _skip = EnvGuard::new("ASV_SKIP_PERMISSIONS");

    let base = ResolvedConfig::default();
    assert_eq!(apply_env_overrides(base.clone()), base);
}

#[test]
#[serial(asv_config)]
fn load_config_with_precedence_prefers_explicit_path() {
    let _guard = EnvGuard::new("ASV_CONFIG");
    let explicit = temp_config("explicit", "default_model = \"explicit\"");
    let from_env = temp_config("env", "default_model = \"env\"");
    env::set_var("ASV_CONFIG", &from_env);

    let config = load_config_with_precedence(Some(explicit.clone()))
        .unwrap()
        .unwrap();
    assert_eq!(config.default_model.as_deref(), Some("explicit"));

    fs::remove_file(explicit).ok();
    fs::remove_file(from_env).ok();
}

#[test]
#[serial(asv_config)]
fn load_config_with_precedence_uses_env_var_when_no_explicit_path() {
    let _guard = EnvGuard::new("ASV_CONFIG");
    let from_env = temp_config("env_only", "default_model = \"env\"");
    env::set_var("ASV_CONFIG", &from_env);

    let config = load_config_with_precedence(None).unwrap().unwrap();
    assert_eq!(config.default_model.as_deref(), Some("env"));

    fs::remove_file(from_env).ok();
}

// ===== CLI =====

#[test]
#[serial(asv_env)]
fn precedence_chain_env_vars_to_cli_args() {
    let _model = EnvGuard::new("ASV_MODEL");
    env::set_var("ASV_MODEL", "from-env");

    let file = ConfigFile {
        default_model: Some("from-file".to_string()),
        ..ConfigFile::default()
    };
    let after_env = apply_env_overrides(merge_config(Some(file)));
    assert_eq!(after_env.default_model, "from-env");

    let after_cli = apply_cli_overrides(
        after_env,
        CliOverrides {
            model: Some("from-cli".to_string()),
            ..CliOverrides::default()
        },
    );
    assert_eq!(after_cli.default_model, "from-cli");
}

#[test]
fn apply_cli_overrides_no_overrides() {
    let base = ResolvedConfig::default();
    assert_eq!(apply_cli_overrides(base.clone(), CliOverrides::default()), base);
}

#[test]
fn skip_permissions_flag_only_enables() {
    let base = ResolvedConfig {
        skip_permissions: true,
        ..ResolvedConfig::default()
    };
    let result = apply_cli_overrides(base, CliOverrides::default());
    assert!(result.skip_permissions);
}
