//! Configuration loader
//!
//! Loads engine configuration from environment variables or files.
//!
//! ## Loading Strategy
//! 1. First, attempts to load from environment variables
//! 2. If a required variable is missing, falls back to loading from file
//! 3. Searches multiple paths for config files
//! 4. Supports JSON and TOML formats
//!
//! ## Environment Variables
//! Required:
//! - `PELAGIC_SERVER_URL`: Base URL of the server
//! - `PELAGIC_CLIENT_ID`: OAuth client id
//! - `PELAGIC_CLIENT_SECRET`: OAuth client secret
//! - `PELAGIC_DB_PATH`: Database file path
//!
//! Optional (defaults from `pelagic_domain::Config`):
//! - `PELAGIC_TIMEOUT_SECS`, `PELAGIC_MAX_ATTEMPTS`, `PELAGIC_USER_AGENT`
//! - `PELAGIC_SCOPES`: space-separated OAuth scopes
//! - `PELAGIC_REDIRECT_URI`: fixed redirect URI
//! - `PELAGIC_DB_POOL_SIZE`, `PELAGIC_DB_ENCRYPTION_KEY`
//! - `PELAGIC_REUSE_TTL_MS`: GET reuse window, `0` disables it
//! - `PELAGIC_AUTH_POLICY`: `reprompt` or `join`
//!
//! ## File Locations
//! The loader searches the following paths (in order):
//! 1. `./config.json` or `./config.toml` (current working directory)
//! 2. `./pelagic.json` or `./pelagic.toml` (current working directory)
//! 3. `../config.json` or `../config.toml` (parent directory)
//! 4. `../../config.json` or `../../config.toml` (grandparent directory)
//! 5. Relative to executable location

use std::path::{Path, PathBuf};
use std::str::FromStr;

use pelagic_domain::{
    AuthenticationPolicy, Config, DatabaseConfig, OAuthSettings, PelagicError, RequesterConfig,
    Result, ServerConfig,
};

/// Load configuration with automatic fallback strategy
///
/// First attempts to load from environment variables. If any required
/// variables are missing, falls back to loading from a config file.
///
/// # Errors
/// Returns `PelagicError::Config` if:
/// - Configuration cannot be loaded from either source
/// - File format is invalid
pub fn load() -> Result<Config> {
    match load_from_env() {
        Ok(config) => {
            tracing::info!("Configuration loaded from environment variables");
            Ok(config)
        }
        Err(e) => {
            tracing::debug!(error = ?e, "Failed to load from environment, trying file");
            load_from_file(None)
        }
    }
}

/// Load configuration from environment variables
///
/// # Errors
/// Returns `PelagicError::Config` if required variables are missing
/// or have invalid values.
pub fn load_from_env() -> Result<Config> {
    let server_defaults = ServerConfig::default();
    let oauth_defaults = OAuthSettings::default();
    let database_defaults = DatabaseConfig::default();
    let requester_defaults = RequesterConfig::default();

    let server = ServerConfig {
        base_url: env_var("PELAGIC_SERVER_URL")?,
        timeout_secs: env_parse("PELAGIC_TIMEOUT_SECS", server_defaults.timeout_secs)?,
        user_agent: std::env::var("PELAGIC_USER_AGENT").unwrap_or(server_defaults.user_agent),
        max_attempts: env_parse("PELAGIC_MAX_ATTEMPTS", server_defaults.max_attempts)?,
    };

    let oauth = OAuthSettings {
        client_id: env_var("PELAGIC_CLIENT_ID")?,
        client_secret: env_var("PELAGIC_CLIENT_SECRET")?,
        scopes: std::env::var("PELAGIC_SCOPES")
            .map(|s| s.split_whitespace().map(str::to_string).collect())
            .unwrap_or(oauth_defaults.scopes),
        redirect_uri: std::env::var("PELAGIC_REDIRECT_URI").ok(),
    };

    let database = DatabaseConfig {
        path: env_var("PELAGIC_DB_PATH")?,
        pool_size: env_parse("PELAGIC_DB_POOL_SIZE", database_defaults.pool_size)?,
        encryption_key: std::env::var("PELAGIC_DB_ENCRYPTION_KEY").ok(),
    };

    let requester = RequesterConfig {
        reuse_ttl_ms: env_parse("PELAGIC_REUSE_TTL_MS", requester_defaults.reuse_ttl_ms)?,
        authentication_policy: match std::env::var("PELAGIC_AUTH_POLICY") {
            Ok(value) => parse_policy(&value)?,
            Err(_) => requester_defaults.authentication_policy,
        },
    };

    Ok(Config { server, oauth, database, requester })
}

/// Load configuration from a file
///
/// If `path` is `None`, searches multiple locations for config files.
/// Supports both JSON and TOML formats (detected by file extension).
///
/// # Errors
/// Returns `PelagicError::Config` if:
/// - File not found (when path is specified)
/// - No config file found (when path is `None`)
/// - File format is invalid
pub fn load_from_file(path: Option<PathBuf>) -> Result<Config> {
    let config_path = match path {
        Some(p) => {
            if !p.exists() {
                return Err(PelagicError::Config(format!(
                    "Config file not found: {}",
                    p.display()
                )));
            }
            p
        }
        None => search_config_paths().ok_or_else(|| {
            PelagicError::Config("No config file found in any of the standard locations".to_string())
        })?,
    };

    tracing::info!(path = %config_path.display(), "Loading configuration from file");

    let contents = std::fs::read_to_string(&config_path)
        .map_err(|e| PelagicError::Config(format!("Failed to read config file: {e}")))?;

    parse_config(&contents, &config_path)
}

/// Parse configuration from string content, by file extension.
fn parse_config(contents: &str, path: &Path) -> Result<Config> {
    let extension = path.extension().and_then(|e| e.to_str()).unwrap_or("json");

    match extension {
        "toml" => toml::from_str(contents)
            .map_err(|e| PelagicError::Config(format!("Invalid TOML format: {e}"))),
        "json" => serde_json::from_str(contents)
            .map_err(|e| PelagicError::Config(format!("Invalid JSON format: {e}"))),
        _ => Err(PelagicError::Config(format!("Unsupported config format: {extension}"))),
    }
}

/// Search multiple paths for configuration files
///
/// Searches for config files in the following locations (in order):
/// 1. Current working directory (`./config.{json,toml}`,
///    `./pelagic.{json,toml}`)
/// 2. Parent directories (up to 2 levels)
/// 3. Relative to executable location
///
/// # Returns
/// The first config file found, or `None` if no file exists.
pub fn search_config_paths() -> Option<PathBuf> {
    let mut candidates = Vec::new();

    if let Ok(cwd) = std::env::current_dir() {
        candidates.extend(candidates_in(&cwd));
    }

    if let Ok(exe_path) = std::env::current_exe() {
        if let Some(exe_dir) = exe_path.parent() {
            candidates.extend(candidates_in(exe_dir));
        }
    }

    candidates.into_iter().find(|path| path.exists())
}

fn candidates_in(dir: &Path) -> Vec<PathBuf> {
    vec![
        dir.join("config.json"),
        dir.join("config.toml"),
        dir.join("pelagic.json"),
        dir.join("pelagic.toml"),
        dir.join("../config.json"),
        dir.join("../config.toml"),
        dir.join("../../config.json"),
        dir.join("../../config.toml"),
    ]
}

/// Get required environment variable
///
/// # Errors
/// Returns `PelagicError::Config` if the variable is not set.
fn env_var(key: &str) -> Result<String> {
    std::env::var(key)
        .map_err(|_| PelagicError::Config(format!("Missing required environment variable: {key}")))
}

/// Parse an optional environment variable, falling back to `default`.
fn env_parse<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|e| PelagicError::Config(format!("Invalid value for {key}: {e}"))),
        Err(_) => Ok(default),
    }
}

fn parse_policy(value: &str) -> Result<AuthenticationPolicy> {
    match value.trim().to_ascii_lowercase().as_str() {
        "reprompt" => Ok(AuthenticationPolicy::Reprompt),
        "join" => Ok(AuthenticationPolicy::Join),
        other => Err(PelagicError::Config(format!("Unknown authentication policy: {other}"))),
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;
    use std::sync::Mutex;

    use once_cell::sync::Lazy;
    use tempfile::NamedTempFile;

    use super::*;

    static ENV_LOCK: Lazy<Mutex<()>> = Lazy::new(|| Mutex::new(()));

    const REQUIRED: [(&str, &str); 4] = [
        ("PELAGIC_SERVER_URL", "https://example.social"),
        ("PELAGIC_CLIENT_ID", "client"),
        ("PELAGIC_CLIENT_SECRET", "secret"),
        ("PELAGIC_DB_PATH", "/tmp/pelagic-test.db"),
    ];

    const OPTIONAL: [&str; 9] = [
        "PELAGIC_TIMEOUT_SECS",
        "PELAGIC_MAX_ATTEMPTS",
        "PELAGIC_USER_AGENT",
        "PELAGIC_SCOPES",
        "PELAGIC_REDIRECT_URI",
        "PELAGIC_DB_POOL_SIZE",
        "PELAGIC_DB_ENCRYPTION_KEY",
        "PELAGIC_REUSE_TTL_MS",
        "PELAGIC_AUTH_POLICY",
    ];

    fn set_required() {
        for (key, value) in REQUIRED {
            std::env::set_var(key, value);
        }
    }

    fn clear_all() {
        for (key, _) in REQUIRED {
            std::env::remove_var(key);
        }
        for key in OPTIONAL {
            std::env::remove_var(key);
        }
    }

    fn write_temp(contents: &str, extension: &str) -> PathBuf {
        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(contents.as_bytes()).unwrap();
        let path = temp_file.path().with_extension(extension);
        std::fs::copy(temp_file.path(), &path).unwrap();
        path
    }

    #[test]
    fn test_load_from_env_required_only() {
        let _guard = ENV_LOCK.lock().expect("env mutex poisoned");
        clear_all();
        set_required();

        let config = load_from_env().expect("config from env");
        assert_eq!(config.server.base_url, "https://example.social");
        assert_eq!(config.server.max_attempts, 1);
        assert_eq!(config.oauth.client_id, "client");
        assert_eq!(config.oauth.scopes, vec!["read", "write", "follow"]);
        assert_eq!(config.database.path, "/tmp/pelagic-test.db");
        assert_eq!(config.database.encryption_key, None);
        assert_eq!(config.requester, RequesterConfig::default());

        clear_all();
    }

    #[test]
    fn test_load_from_env_all_vars_set() {
        let _guard = ENV_LOCK.lock().expect("env mutex poisoned");
        clear_all();
        set_required();
        std::env::set_var("PELAGIC_TIMEOUT_SECS", "5");
        std::env::set_var("PELAGIC_MAX_ATTEMPTS", "3");
        std::env::set_var("PELAGIC_SCOPES", "read write");
        std::env::set_var("PELAGIC_DB_POOL_SIZE", "8");
        std::env::set_var("PELAGIC_DB_ENCRYPTION_KEY", "test-key");
        std::env::set_var("PELAGIC_REUSE_TTL_MS", "0");
        std::env::set_var("PELAGIC_AUTH_POLICY", "Join");

        let config = load_from_env().expect("config from env");
        assert_eq!(config.server.timeout_secs, 5);
        assert_eq!(config.server.max_attempts, 3);
        assert_eq!(config.oauth.scope_string(), "read write");
        assert_eq!(config.database.pool_size, 8);
        assert_eq!(config.database.encryption_key, Some("test-key".to_string()));
        assert_eq!(config.requester.reuse_ttl_ms, 0);
        assert_eq!(config.requester.authentication_policy, AuthenticationPolicy::Join);

        clear_all();
    }

    #[test]
    fn test_load_from_env_missing_var() {
        let _guard = ENV_LOCK.lock().expect("env mutex poisoned");
        clear_all();
        set_required();
        std::env::remove_var("PELAGIC_CLIENT_SECRET");

        let err = load_from_env().unwrap_err();
        assert!(matches!(err, PelagicError::Config(ref msg) if msg.contains("PELAGIC_CLIENT_SECRET")));

        clear_all();
    }

    #[test]
    fn test_load_from_env_invalid_values() {
        let _guard = ENV_LOCK.lock().expect("env mutex poisoned");
        clear_all();
        set_required();

        std::env::set_var("PELAGIC_DB_POOL_SIZE", "not-a-number");
        assert!(matches!(load_from_env(), Err(PelagicError::Config(_))));
        std::env::remove_var("PELAGIC_DB_POOL_SIZE");

        std::env::set_var("PELAGIC_AUTH_POLICY", "sometimes");
        assert!(matches!(load_from_env(), Err(PelagicError::Config(_))));

        clear_all();
    }

    #[test]
    fn test_load_from_file_json() {
        let path = write_temp(
            r#"{
                "server": { "base_url": "https://json.social", "max_attempts": 2 },
                "oauth": { "client_id": "abc", "client_secret": "def" },
                "database": { "path": "test.db", "pool_size": 4, "encryption_key": "secret" }
            }"#,
            "json",
        );

        let config = load_from_file(Some(path.clone())).expect("config from JSON");
        assert_eq!(config.server.base_url, "https://json.social");
        assert_eq!(config.server.max_attempts, 2);
        assert_eq!(config.oauth.client_id, "abc");
        assert_eq!(config.database.encryption_key.as_deref(), Some("secret"));
        assert_eq!(config.requester.reuse_ttl_ms, 5_000);

        std::fs::remove_file(path).ok();
    }

    #[test]
    fn test_load_from_file_toml() {
        let path = write_temp(
            r#"
[server]
base_url = "https://toml.social"

[database]
path = "test.db"
pool_size = 6

[requester]
reuse_ttl_ms = 250
authentication_policy = "join"
"#,
            "toml",
        );

        let config = load_from_file(Some(path.clone())).expect("config from TOML");
        assert_eq!(config.server.base_url, "https://toml.social");
        assert_eq!(config.database.pool_size, 6);
        assert_eq!(config.requester.reuse_ttl_ms, 250);
        assert_eq!(config.requester.authentication_policy, AuthenticationPolicy::Join);

        std::fs::remove_file(path).ok();
    }

    #[test]
    fn test_load_from_file_not_found() {
        let err = load_from_file(Some(PathBuf::from("/nonexistent/config.json"))).unwrap_err();
        assert!(matches!(err, PelagicError::Config(_)));
    }

    #[test]
    fn test_load_from_file_invalid_json() {
        let path = write_temp(r#"{ "this is": "not valid json" "#, "json");

        let result = load_from_file(Some(path.clone()));
        assert!(matches!(result, Err(PelagicError::Config(_))));

        std::fs::remove_file(path).ok();
    }

    #[test]
    fn test_parse_config_unsupported_format() {
        let result = parse_config("some content", &PathBuf::from("test.yaml"));
        assert!(result.is_err(), "Should fail with unsupported format");
    }
}
