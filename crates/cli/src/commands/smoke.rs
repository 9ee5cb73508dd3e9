use std::time::Instant;

use crate::commands::CommandResult;
use rewear_core::config::{AppConfig, LoadOptions};
use rewear_db::{connect_with_settings, migrations};
use secrecy::ExposeSecret;
use serde::Serialize;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
enum SmokeStatus {
    Pass,
    Fail,
    Skipped,
}

#[derive(Debug, Serialize)]
struct SmokeCheck {
    name: &'static str,
    status: SmokeStatus,
    elapsed_ms: u64,
    message: String,
}

#[derive(Debug, Serialize)]
struct SmokeReport {
    command: &'static str,
    status: SmokeStatus,
    summary: String,
    total_elapsed_ms: u64,
    checks: Vec<SmokeCheck>,
}

pub fn run() -> CommandResult {
    let started = Instant::now();
    let mut checks = Vec::new();

    let config_started = Instant::now();
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => {
            checks.push(SmokeCheck {
                name: "config_validation",
                status: SmokeStatus::Pass,
                elapsed_ms: config_started.elapsed().as_millis() as u64,
                message: "configuration loaded and validated".to_string(),
            });
            config
        }
        Err(error) => {
            checks.push(SmokeCheck {
                name: "config_validation",
                status: SmokeStatus::Fail,
                elapsed_ms: config_started.elapsed().as_millis() as u64,
                message: error.to_string(),
            });
            checks.push(skipped("gateway_token_sanity"));
            checks.push(skipped("db_connectivity"));
            checks.push(skipped("migration_visibility"));
            return finalize_report(checks, started.elapsed().as_millis() as u64);
        }
    };

    let token_check_started = Instant::now();
    let token_ok = !config.gateway.auth_token.expose_secret().trim().is_empty();
    checks.push(SmokeCheck {
        name: "gateway_token_sanity",
        status: if token_ok { SmokeStatus::Pass } else { SmokeStatus::Fail },
        elapsed_ms: token_check_started.elapsed().as_millis() as u64,
        message: if token_ok {
            "gateway credentials present".to_string()
        } else {
            "expected a non-empty gateway auth token".to_string()
        },
    });

    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(error) => {
            checks.push(SmokeCheck {
                name: "db_connectivity",
                status: SmokeStatus::Fail,
                elapsed_ms: 0,
                message: format!("failed to initialize async runtime: {error}"),
            });
            checks.push(skipped("migration_visibility"));
            return finalize_report(checks, started.elapsed().as_millis() as u64);
        }
    };

    let db_started = Instant::now();
    let db_result = runtime.block_on(async {
        connect_with_settings(
            &config.database.url,
            config.database.max_connections,
            config.database.timeout_secs,
        )
        .await
    });

    let pool = match db_result {
        Ok(pool) => {
            checks.push(SmokeCheck {
                name: "db_connectivity",
                status: SmokeStatus::Pass,
                elapsed_ms: db_started.elapsed().as_millis() as u64,
                message: format!("connected using `{}`", config.database.url),
            });
            pool
        }
        Err(error) => {
            checks.push(SmokeCheck {
                name: "db_connectivity",
                status: SmokeStatus::Fail,
                elapsed_ms: db_started.elapsed().as_millis() as u64,
                message: error.to_string(),
            });
            checks.push(skipped("migration_visibility"));
            return finalize_report(checks, started.elapsed().as_millis() as u64);
        }
    };

    let migration_started = Instant::now();
    let migration_result = runtime.block_on(async {
        let outcome = migrations::run_pending(&pool).await;
        pool.close().await;
        outcome
    });
    checks.push(match migration_result {
        Ok(()) => SmokeCheck {
            name: "migration_visibility",
            status: SmokeStatus::Pass,
            elapsed_ms: migration_started.elapsed().as_millis() as u64,
            message: "embedded migrations are applicable".to_string(),
        },
        Err(error) => SmokeCheck {
            name: "migration_visibility",
            status: SmokeStatus::Fail,
            elapsed_ms: migration_started.elapsed().as_millis() as u64,
            message: error.to_string(),
        },
    });

    finalize_report(checks, started.elapsed().as_millis() as u64)
}

fn skipped(name: &'static str) -> SmokeCheck {
    SmokeCheck {
        name,
        status: SmokeStatus::Skipped,
        elapsed_ms: 0,
        message: "skipped due to earlier failure".to_string(),
    }
}

fn finalize_report(checks: Vec<SmokeCheck>, total_elapsed_ms: u64) -> CommandResult {
    let all_pass = checks.iter().all(|check| check.status == SmokeStatus::Pass);
    let report = SmokeReport {
        command: "smoke",
        status: if all_pass { SmokeStatus::Pass } else { SmokeStatus::Fail },
        summary: if all_pass {
            "smoke: all readiness checks passed".to_string()
        } else {
            "smoke: one or more readiness checks failed".to_string()
        },
        total_elapsed_ms,
        checks,
    };

    let output = serde_json::to_string(&report)
        .unwrap_or_else(|error| format!("{{\"command\":\"smoke\",\"status\":\"fail\",\"summary\":\"{error}\"}}"));

    CommandResult { exit_code: if all_pass { 0 } else { 1 }, output }
}
