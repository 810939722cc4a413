use std::fs;

use bridal_core::config::{AppConfig, LoadOptions, StorageBackend};
use bridal_db::migrations;
use serde::Serialize;

use crate::commands::{exit, open_pool, CommandResult};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
enum CheckStatus {
    Pass,
    Fail,
    Skipped,
}

#[derive(Debug, Serialize)]
struct DoctorCheck {
    name: &'static str,
    status: CheckStatus,
    details: String,
}

impl DoctorCheck {
    fn pass(name: &'static str, details: impl Into<String>) -> Self {
        Self { name, status: CheckStatus::Pass, details: details.into() }
    }

    fn fail(name: &'static str, details: impl Into<String>) -> Self {
        Self { name, status: CheckStatus::Fail, details: details.into() }
    }

    fn skipped(name: &'static str) -> Self {
        Self {
            name,
            status: CheckStatus::Skipped,
            details: "skipped because configuration did not load".to_string(),
        }
    }
}

#[derive(Debug, Serialize)]
struct DoctorReport {
    overall_status: CheckStatus,
    summary: String,
    checks: Vec<DoctorCheck>,
}

pub fn run(json_output: bool) -> CommandResult {
    let report = build_report();
    let exit_code = if report.overall_status == CheckStatus::Pass { 0 } else { exit::CHECKS_FAILED };

    let output = if json_output {
        serde_json::to_string_pretty(&report).unwrap_or_else(|error| {
            format!(
                "{{\"overall_status\":\"fail\",\"summary\":\"doctor serialization failed\",\"error\":\"{}\"}}",
                error.to_string().replace('\\', "\\\\").replace('"', "\\\"")
            )
        })
    } else {
        render_human(&report)
    };

    CommandResult { exit_code, output }
}

fn build_report() -> DoctorReport {
    let checks = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => vec![
            DoctorCheck::pass("config_validation", "configuration loaded and validated"),
            check_database(&config),
            check_storage(&config),
        ],
        Err(error) => vec![
            DoctorCheck::fail("config_validation", error.to_string()),
            DoctorCheck::skipped("database_connectivity"),
            DoctorCheck::skipped("blob_storage"),
        ],
    };

    let all_pass = checks.iter().all(|check| check.status == CheckStatus::Pass);
    let overall_status = if all_pass { CheckStatus::Pass } else { CheckStatus::Fail };
    let summary = if all_pass {
        "doctor: all readiness checks passed".to_string()
    } else {
        "doctor: one or more readiness checks failed".to_string()
    };

    DoctorReport { overall_status, summary, checks }
}

fn check_database(config: &AppConfig) -> DoctorCheck {
    const NAME: &str = "database_connectivity";

    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(error) => {
            return DoctorCheck::fail(NAME, format!("failed to initialize async runtime: {error}"))
        }
    };

    let result = runtime.block_on(async {
        let pool = open_pool(config).await.map_err(|(_, message, _)| {
            format!("failed to connect to database: {message}")
        })?;
        let pending = migrations::pending_count(&pool).await;
        pool.close().await;
        pending.map_err(|error| format!("failed to read migration state: {error}"))
    });

    match result {
        Ok(0) => DoctorCheck::pass(NAME, format!("connected using `{}`", config.database.url)),
        Ok(pending) => DoctorCheck::fail(
            NAME,
            format!(
                "connected using `{}` but {pending} migrations are pending; run `bridal migrate`",
                config.database.url
            ),
        ),
        Err(error) => DoctorCheck::fail(NAME, error),
    }
}

fn check_storage(config: &AppConfig) -> DoctorCheck {
    const NAME: &str = "blob_storage";
    let storage = &config.storage;

    match storage.backend {
        StorageBackend::Memory => {
            DoctorCheck::pass(NAME, "memory backend: uploads are lost on restart")
        }
        StorageBackend::Remote => DoctorCheck::pass(
            NAME,
            format!("remote backend at `{}` with a configured token", storage.remote_api_url),
        ),
        StorageBackend::Local => match fs::create_dir_all(&storage.local_root) {
            Ok(()) => DoctorCheck::pass(
                NAME,
                format!(
                    "local backend at `{}` served from `{}`",
                    storage.local_root.display(),
                    storage.public_base_url
                ),
            ),
            Err(error) => DoctorCheck::fail(
                NAME,
                format!("cannot create `{}`: {error}", storage.local_root.display()),
            ),
        },
    }
}

fn render_human(report: &DoctorReport) -> String {
    let mut lines = vec![report.summary.clone()];

    for check in &report.checks {
        let marker = match check.status {
            CheckStatus::Pass => "ok",
            CheckStatus::Fail => "fail",
            CheckStatus::Skipped => "skip",
        };
        lines.push(format!("- [{marker}] {}: {}", check.name, check.details));
    }

    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::{render_human, CheckStatus, DoctorCheck, DoctorReport};

    #[test]
    fn human_report_marks_each_check() {
        let report = DoctorReport {
            overall_status: CheckStatus::Fail,
            summary: "doctor: one or more readiness checks failed".to_string(),
            checks: vec![
                DoctorCheck::fail("config_validation", "bad port"),
                DoctorCheck::skipped("blob_storage"),
            ],
        };

        assert_eq!(
            render_human(&report),
            "doctor: one or more readiness checks failed\n\
             - [fail] config_validation: bad port\n\
             - [skip] blob_storage: skipped because configuration did not load"
        );
    }
}
