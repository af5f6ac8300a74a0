use serde::Serialize;
use shopmate_agent::GuardrailPolicy;
use shopmate_core::config::{AppConfig, LlmProvider, LoadOptions};
use shopmate_core::{FunctionCall, FunctionName};

use crate::commands::{escape_json, CommandResult};

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

#[derive(Debug, Serialize)]
struct DoctorReport {
    overall_status: CheckStatus,
    summary: String,
    checks: Vec<DoctorCheck>,
}

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
            checks.push(check_model_readiness(&config));
            checks.push(check_guardrail_coverage(&config));
        }
        Err(error) => {
            checks.push(DoctorCheck {
                name: "config_validation",
                status: CheckStatus::Fail,
                details: error.to_string(),
            });
            for name in ["model_readiness", "guardrail_coverage"] {
                checks.push(DoctorCheck {
                    name,
                    status: CheckStatus::Skipped,
                    details: "skipped because configuration did not load".to_string(),
                });
            }
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

fn check_model_readiness(config: &AppConfig) -> DoctorCheck {
    let llm = &config.llm;
    let endpoint = match llm.provider {
        LlmProvider::Ollama => llm.base_url.clone().unwrap_or_default(),
        LlmProvider::OpenAi | LlmProvider::Anthropic => {
            llm.base_url.clone().unwrap_or_else(|| "provider default endpoint".to_string())
        }
    };
    if llm.model.trim().is_empty() {
        return DoctorCheck {
            name: "model_readiness",
            status: CheckStatus::Fail,
            details: "llm.model is empty".to_string(),
        };
    }

    DoctorCheck {
        name: "model_readiness",
        status: CheckStatus::Pass,
        details: format!(
            "{:?} model `{}` at {endpoint} with {}s timeout and {} retries",
            llm.provider, llm.model, llm.timeout_secs, llm.max_retries
        ),
    }
}

fn check_guardrail_coverage(config: &AppConfig) -> DoctorCheck {
    let policy = GuardrailPolicy::from_config(&config.orchestrator);
    let probe = FunctionCall::new(FunctionName::PlaceOrder.as_str(), serde_json::json!({}));

    if policy.privileged_name(&probe).is_some() {
        DoctorCheck {
            name: "guardrail_coverage",
            status: CheckStatus::Pass,
            details: format!(
                "{} privileged function(s); placeOrder requires authentication",
                policy.privileged_functions.len()
            ),
        }
    } else {
        DoctorCheck {
            name: "guardrail_coverage",
            status: CheckStatus::Fail,
            details: "placeOrder is not in orchestrator.privileged_functions".to_string(),
        }
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
