use serde::Serialize;
use voicequote_agent::session::SessionRequest;
use voicequote_core::config::{AppConfig, LoadOptions};

use crate::commands::escape_json;

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

pub fn run(json_output: bool) -> String {
    let report = build_report();

    if json_output {
        return serde_json::to_string_pretty(&report).unwrap_or_else(|error| {
            format!(
                "{{\"overall_status\":\"fail\",\"summary\":\"doctor serialization failed\",\"error\":\"{}\"}}",
                escape_json(&error.to_string())
            )
        });
    }

    render_human(&report)
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
            checks.push(check_realtime_credential(&config));
            checks.push(check_session_request(&config));
        }
        Err(error) => {
            checks.push(DoctorCheck {
                name: "config_validation",
                status: CheckStatus::Fail,
                details: error.to_string(),
            });
            checks.push(DoctorCheck::skipped("realtime_credential"));
            checks.push(DoctorCheck::skipped("session_request"));
        }
    }

    let all_pass = checks.iter().all(|check| check.status == CheckStatus::Pass);
    let overall_status = if all_pass { CheckStatus::Pass } else { CheckStatus::Fail };
    let summary = if all_pass {
        "doctor: all readiness checks passed".to_string()
    } else {
        "doctor: one or more readiness checks failed".to_string()
    };

    DoctorReport { overall_status, summary, checks }
}

fn check_realtime_credential(config: &AppConfig) -> DoctorCheck {
    if config.realtime.has_api_key() {
        DoctorCheck {
            name: "realtime_credential",
            status: CheckStatus::Pass,
            details: format!("api key configured for {}", config.realtime.sessions_url()),
        }
    } else {
        DoctorCheck {
            name: "realtime_credential",
            status: CheckStatus::Fail,
            details: "OPENAI_API_KEY is not set; /api/ephemeral will return 500".to_string(),
        }
    }
}

fn check_session_request(config: &AppConfig) -> DoctorCheck {
    let request = SessionRequest::from_config(&config.realtime);
    let tool_names: Vec<&str> = request.tools.iter().map(|tool| tool.name).collect();

    match serde_json::to_vec(&request) {
        Ok(body) if !request.instructions.trim().is_empty() && !tool_names.is_empty() => {
            DoctorCheck {
                name: "session_request",
                status: CheckStatus::Pass,
                details: format!(
                    "model `{}`, voice `{}`, tools [{}], {} byte body",
                    request.model,
                    request.voice,
                    tool_names.join(", "),
                    body.len()
                ),
            }
        }
        Ok(_) => DoctorCheck {
            name: "session_request",
            status: CheckStatus::Fail,
            details: "session request is missing tools or instructions".to_string(),
        },
        Err(error) => DoctorCheck {
            name: "session_request",
            status: CheckStatus::Fail,
            details: format!("session request did not serialize: {error}"),
        },
    }
}

fn render_human(report: &DoctorReport) -> String {
    let mut lines = Vec::new();
    lines.push(report.summary.clone());

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
