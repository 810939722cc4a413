use std::env;
use std::sync::{Mutex, OnceLock};

use bridal_cli::commands::{doctor, migrate, seed, session};
use serde_json::Value;

#[test]
fn migrate_returns_success_with_valid_env() {
    with_env(&[("BRIDAL_DATABASE_URL", "sqlite::memory:")], || {
        let result = migrate::run();
        assert_eq!(result.exit_code, 0, "expected successful migrate run");

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "migrate");
        assert_eq!(payload["status"], "ok");
    });
}

#[test]
fn migrate_returns_config_failure_for_remote_storage_without_token() {
    with_env(
        &[("BRIDAL_DATABASE_URL", "sqlite::memory:"), ("BRIDAL_STORAGE_BACKEND", "remote")],
        || {
            let result = migrate::run();
            assert_eq!(result.exit_code, 2, "expected config validation failure code");

            let payload = parse_payload(&result.output);
            assert_eq!(payload["status"], "error");
            assert_eq!(payload["error_class"], "config_validation");
        },
    );
}

#[test]
fn migrate_reports_unreachable_database() {
    with_env(
        &[("BRIDAL_DATABASE_URL", "sqlite:///nonexistent-bridal-dir/nested/bridal.db")],
        || {
            let result = migrate::run();
            assert_eq!(result.exit_code, 4, "expected db connectivity failure code");
            assert_eq!(parse_payload(&result.output)["error_class"], "db_connectivity");
        },
    );
}

#[test]
fn seed_is_idempotent_and_lists_demo_sessions() {
    let dir = tempfile::tempdir().expect("tempdir");
    let url = file_database_url(&dir);

    with_env(&[("BRIDAL_DATABASE_URL", url.as_str())], || {
        let first = seed::run();
        assert_eq!(first.exit_code, 0, "expected first seed invocation success");
        let first_payload = parse_payload(&first.output);
        assert_eq!(first_payload["command"], "seed");
        assert_eq!(first_payload["status"], "ok");

        let message = first_payload["message"].as_str().unwrap_or_default();
        assert!(message.contains("session for admin@atelier.example: demo-admin-session"));
        assert!(message.contains("session for employee@atelier.example: demo-employee-session"));

        let second = seed::run();
        assert_eq!(second.exit_code, 0, "expected second seed invocation success");
        assert_eq!(first_payload["message"], parse_payload(&second.output)["message"]);
    });
}

#[test]
fn session_is_issued_for_a_seeded_account() {
    let dir = tempfile::tempdir().expect("tempdir");
    let url = file_database_url(&dir);

    with_env(&[("BRIDAL_DATABASE_URL", url.as_str())], || {
        assert_eq!(seed::run().exit_code, 0, "seed first");

        let result = session::run("admin@atelier.example", Some(2));
        assert_eq!(result.exit_code, 0, "{}", result.output);
        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "session");
        let message = payload["message"].as_str().unwrap_or_default();
        assert!(message.contains("valid for 2h"), "{message}");
        assert!(message.contains("`session` cookie"), "{message}");

        let unknown = session::run("ghost@atelier.example", None);
        assert_eq!(unknown.exit_code, 8, "expected unknown user failure code");
        assert_eq!(parse_payload(&unknown.output)["error_class"], "unknown_user");
    });
}

#[test]
fn doctor_passes_on_a_migrated_database() {
    let dir = tempfile::tempdir().expect("tempdir");
    let url = file_database_url(&dir);

    with_env(&[("BRIDAL_DATABASE_URL", url.as_str()), ("BRIDAL_STORAGE_BACKEND", "memory")], || {
        assert_eq!(migrate::run().exit_code, 0, "migrate first");

        let result = doctor::run(true);
        assert_eq!(result.exit_code, 0, "{}", result.output);
        let report = parse_payload(&result.output);
        assert_eq!(report["overall_status"], "pass");
        assert_eq!(report["checks"].as_array().map(Vec::len), Some(3));
    });
}

#[test]
fn doctor_flags_pending_migrations() {
    with_env(
        &[("BRIDAL_DATABASE_URL", "sqlite::memory:"), ("BRIDAL_STORAGE_BACKEND", "memory")],
        || {
            let result = doctor::run(true);
            assert_eq!(result.exit_code, 10, "expected readiness failure code");

            let report = parse_payload(&result.output);
            assert_eq!(report["overall_status"], "fail");
            assert_eq!(report["checks"][1]["name"], "database_connectivity");
            assert_eq!(report["checks"][1]["status"], "fail");
        },
    );
}

fn file_database_url(dir: &tempfile::TempDir) -> String {
    format!("sqlite://{}", dir.path().join("bridal.db").display())
}

fn parse_payload(output: &str) -> Value {
    serde_json::from_str(output).expect("command output should be valid JSON")
}

fn with_env(vars: &[(&str, &str)], test_fn: impl FnOnce()) {
    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    let _guard =
        ENV_LOCK.get_or_init(|| Mutex::new(())).lock().expect("env mutex should not be poisoned");

    let keys = [
        "BRIDAL_DATABASE_URL",
        "BRIDAL_DATABASE_MAX_CONNECTIONS",
        "BRIDAL_DATABASE_TIMEOUT_SECS",
        "BRIDAL_SERVER_BIND_ADDRESS",
        "BRIDAL_SERVER_PORT",
        "BRIDAL_SERVER_GRACEFUL_SHUTDOWN_SECS",
        "BRIDAL_AUTH_SESSION_COOKIE",
        "BRIDAL_AUTH_SESSION_TTL_HOURS",
        "BRIDAL_STORAGE_BACKEND",
        "BRIDAL_STORAGE_LOCAL_ROOT",
        "BRIDAL_STORAGE_PUBLIC_BASE_URL",
        "BRIDAL_STORAGE_REMOTE_API_URL",
        "BRIDAL_STORAGE_REMOTE_TOKEN",
        "BLOB_READ_WRITE_TOKEN",
        "BRIDAL_STORAGE_APPROVALS_PREFIX",
        "BRIDAL_LOGGING_LEVEL",
        "BRIDAL_LOGGING_FORMAT",
        "BRIDAL_LOG_LEVEL",
        "BRIDAL_LOG_FORMAT",
    ];

    let previous_values: Vec<(&str, Option<String>)> =
        keys.iter().map(|key| (*key, env::var(key).ok())).collect();

    for key in &keys {
        env::remove_var(key);
    }
    for (key, value) in vars {
        env::set_var(key, value);
    }

    test_fn();

    for (key, value) in previous_values {
        if let Some(value) = value {
            env::set_var(key, value);
        } else {
            env::remove_var(key);
        }
    }
}
