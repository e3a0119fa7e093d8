use std::time::Duration;

use serde::Serialize;

use tracechat_core::config::{AppConfig, LoadOptions};

use super::{escape_json, CommandResult};

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
    fn skipped(name: &'static str) -> Self {
        Self { name, status: CheckStatus::Skipped, details: "skipped because configuration did not load".to_string() }
    }
}

#[derive(Debug, Serialize)]
struct DoctorReport {
    overall_status: CheckStatus,
    summary: String,
    checks: Vec<DoctorCheck>,
}

/// Exit code 1 when any blocking check fails so scripts can gate on readiness.
pub fn run(json_output: bool) -> CommandResult {
    let report = build_report();
    let exit_code = if report.overall_status == CheckStatus::Pass { 0 } else { 1 };

    let output = if json_output {
        serde_json::to_string_pretty(&report).unwrap_or_else(|error| {
            format!(
                "{{\"overall_status\":\"fail\",\"summary\":\"doctor serialization failed\",\"error\":\"{}\"}}",
                escape_json(&error.to_string())
            )
        })
    } else {
        render_human(&report)
    };

    CommandResult { exit_code, output }
}

fn build_report() -> DoctorReport {
    let mut checks = Vec::new();

    match AppConfig::load(LoadOptions::default()) {
        Ok(config) => {
            checks.push(DoctorCheck {
                name: "config_validation",
                status: CheckStatus::Pass,
                details: "configuration loaded and validated".to_string(),
            });
            checks.push(check_system_context(&config));
            checks.push(check_backend_reachability(&config));
        }
        Err(error) => {
            checks.push(DoctorCheck {
                name: "config_validation",
                status: CheckStatus::Fail,
                details: error.to_string(),
            });
            checks.push(DoctorCheck::skipped("system_context"));
            checks.push(DoctorCheck::skipped("backend_reachability"));
        }
    }

    // A missing context document degrades replies but does not block startup.
    let all_pass = checks
        .iter()
        .all(|check| check.status == CheckStatus::Pass || check.name == "system_context");
    let overall_status = if all_pass { CheckStatus::Pass } else { CheckStatus::Fail };
    let summary = if all_pass {
        "doctor: all readiness checks passed".to_string()
    } else {
        "doctor: one or more readiness checks failed".to_string()
    };

    DoctorReport { overall_status, summary, checks }
}

fn check_system_context(config: &AppConfig) -> DoctorCheck {
    let path = &config.context.system_context_path;
    match std::fs::read_to_string(path) {
        Ok(raw) if !raw.trim().is_empty() => DoctorCheck {
            name: "system_context",
            status: CheckStatus::Pass,
            details: format!("loaded `{}` ({} bytes)", path.display(), raw.len()),
        },
        Ok(_) => DoctorCheck {
            name: "system_context",
            status: CheckStatus::Fail,
            details: format!("`{}` is empty, the default context will be used", path.display()),
        },
        Err(error) => DoctorCheck {
            name: "system_context",
            status: CheckStatus::Fail,
            details: format!("cannot read `{}`: {error}; the default context will be used", path.display()),
        },
    }
}

/// Any HTTP answer counts as reachable; only transport failures fail the check.
fn check_backend_reachability(config: &AppConfig) -> DoctorCheck {
    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(error) => {
            return DoctorCheck {
                name: "backend_reachability",
                status: CheckStatus::Fail,
                details: format!("failed to initialize async runtime: {error}"),
            };
        }
    };

    let base_url = config.backend.base_url.clone();
    let timeout = Duration::from_secs(config.backend.timeout_secs);
    let result = runtime.block_on(async move {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|error| format!("failed to build http client: {error}"))?;
        let response = client
            .get(&base_url)
            .send()
            .await
            .map_err(|error| format!("backend `{base_url}` unreachable: {error}"))?;
        Ok::<_, String>(response.status())
    });

    match result {
        Ok(status) => DoctorCheck {
            name: "backend_reachability",
            status: CheckStatus::Pass,
            details: format!("`{}` answered with {status}", config.backend.base_url),
        },
        Err(error) => DoctorCheck { name: "backend_reachability", status: CheckStatus::Fail, details: error },
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
