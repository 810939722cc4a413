use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use bridal_core::config::{AppConfig, LoadOptions};
use secrecy::ExposeSecret;
use toml::Value;

struct Field {
    key: &'static str,
    env_keys: &'static [&'static str],
    value: String,
}

pub fn run() -> String {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => return format!("config validation failed: {error}"),
    };

    let config_file_path = detect_config_path();
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());

    let mut lines = vec!["effective config (source precedence: env > file > default):".to_string()];
    for field in effective_fields(&config) {
        let source = field_source(
            field.key,
            field.env_keys,
            config_file_doc.as_ref(),
            config_file_path.as_deref(),
        );
        lines.push(format!("- {} = {} (source: {source})", field.key, field.value));
    }

    lines.join("\n")
}

fn effective_fields(config: &AppConfig) -> Vec<Field> {
    let remote_token = config
        .storage
        .remote_token
        .as_ref()
        .map(|token| redact_token(token.expose_secret()))
        .unwrap_or_else(|| "<unset>".to_string());

    vec![
        Field {
            key: "database.url",
            env_keys: &["BRIDAL_DATABASE_URL"],
            value: config.database.url.clone(),
        },
        Field {
            key: "database.max_connections",
            env_keys: &["BRIDAL_DATABASE_MAX_CONNECTIONS"],
            value: config.database.max_connections.to_string(),
        },
        Field {
            key: "database.timeout_secs",
            env_keys: &["BRIDAL_DATABASE_TIMEOUT_SECS"],
            value: config.database.timeout_secs.to_string(),
        },
        Field {
            key: "server.bind_address",
            env_keys: &["BRIDAL_SERVER_BIND_ADDRESS"],
            value: config.server.bind_address.clone(),
        },
        Field {
            key: "server.port",
            env_keys: &["BRIDAL_SERVER_PORT"],
            value: config.server.port.to_string(),
        },
        Field {
            key: "server.graceful_shutdown_secs",
            env_keys: &["BRIDAL_SERVER_GRACEFUL_SHUTDOWN_SECS"],
            value: config.server.graceful_shutdown_secs.to_string(),
        },
        Field {
            key: "auth.session_cookie",
            env_keys: &["BRIDAL_AUTH_SESSION_COOKIE"],
            value: config.auth.session_cookie.clone(),
        },
        Field {
            key: "auth.session_ttl_hours",
            env_keys: &["BRIDAL_AUTH_SESSION_TTL_HOURS"],
            value: config.auth.session_ttl_hours.to_string(),
        },
        Field {
            key: "storage.backend",
            env_keys: &["BRIDAL_STORAGE_BACKEND"],
            value: format!("{:?}", config.storage.backend),
        },
        Field {
            key: "storage.local_root",
            env_keys: &["BRIDAL_STORAGE_LOCAL_ROOT"],
            value: config.storage.local_root.display().to_string(),
        },
        Field {
            key: "storage.public_base_url",
            env_keys: &["BRIDAL_STORAGE_PUBLIC_BASE_URL"],
            value: config.storage.public_base_url.clone(),
        },
        Field {
            key: "storage.remote_api_url",
            env_keys: &["BRIDAL_STORAGE_REMOTE_API_URL"],
            value: config.storage.remote_api_url.clone(),
        },
        Field {
            key: "storage.remote_token",
            env_keys: &["BRIDAL_STORAGE_REMOTE_TOKEN", "BLOB_READ_WRITE_TOKEN"],
            value: remote_token,
        },
        Field {
            key: "storage.approvals_prefix",
            env_keys: &["BRIDAL_STORAGE_APPROVALS_PREFIX"],
            value: config.storage.approvals_prefix.clone(),
        },
        Field {
            key: "logging.level",
            env_keys: &["BRIDAL_LOGGING_LEVEL", "BRIDAL_LOG_LEVEL"],
            value: config.logging.level.clone(),
        },
        Field {
            key: "logging.format",
            env_keys: &["BRIDAL_LOGGING_FORMAT", "BRIDAL_LOG_FORMAT"],
            value: format!("{:?}", config.logging.format),
        },
    ]
}

fn detect_config_path() -> Option<PathBuf> {
    [PathBuf::from("bridal.toml"), PathBuf::from("config/bridal.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let raw = fs::read_to_string(path?).ok()?;
    raw.parse::<Value>().ok()
}

fn field_source(
    key_path: &str,
    env_keys: &[&str],
    config_file_doc: Option<&Value>,
    config_file_path: Option<&Path>,
) -> String {
    if let Some(env_key) = env_keys.iter().find(|key| env::var_os(key).is_some()) {
        return format!("env ({env_key})");
    }

    if config_file_doc.is_some_and(|doc| contains_path(doc, key_path)) {
        let file_path = config_file_path
            .map(|path| path.display().to_string())
            .unwrap_or_else(|| "config file".to_string());
        return format!("file ({file_path})");
    }

    "default".to_string()
}

fn contains_path(root: &Value, key_path: &str) -> bool {
    let mut current = root;
    for key in key_path.split('.') {
        let Some(next) = current.get(key) else {
            return false;
        };
        current = next;
    }
    true
}

/// Keeps the token's kind prefix (`vercel_blob_rw_`) and hides the rest.
fn redact_token(token: &str) -> String {
    let trimmed = token.trim();
    if trimmed.is_empty() {
        return "<empty>".to_string();
    }

    match trimmed.find("_rw_") {
        Some(index) => format!("{}***", &trimmed[..index + 4]),
        None => "<redacted>".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::{contains_path, field_source, redact_token};

    #[test]
    fn tokens_are_redacted() {
        assert_eq!(redact_token("vercel_blob_rw_abc123_secret"), "vercel_blob_rw_***");
        assert_eq!(redact_token("opaque-secret"), "<redacted>");
        assert_eq!(redact_token("  "), "<empty>");
    }

    #[test]
    fn file_keys_are_attributed_to_the_file() {
        let doc: toml::Value = "[storage]\nbackend = \"memory\"\n".parse().expect("toml");

        assert!(contains_path(&doc, "storage.backend"));
        assert!(!contains_path(&doc, "storage.local_root"));
        assert_eq!(
            field_source(
                "storage.backend",
                &["BRIDAL_TEST_UNSET_STORAGE_BACKEND"],
                Some(&doc),
                Some(std::path::Path::new("bridal.toml")),
            ),
            "file (bridal.toml)"
        );
        assert_eq!(
            field_source("storage.local_root", &["BRIDAL_TEST_UNSET_ROOT"], Some(&doc), None),
            "default"
        );
    }
}
