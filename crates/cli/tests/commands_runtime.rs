use std::env;
use std::fs;
use std::sync::{Mutex, OnceLock};

use serde_json::{json, Value};
use shopmate_cli::commands::{config, doctor, view};
use shopmate_core::{FunctionCall, FunctionResult, TurnEntry};

#[test]
fn config_reports_sources_and_redacts_api_key() {
    with_env(
        &[
            ("SHOPMATE_LLM_PROVIDER", "openai"),
            ("SHOPMATE_LLM_API_KEY", "sk-live-secret"),
            ("SHOPMATE_ORCHESTRATOR_MAX_ITERATIONS", "7"),
        ],
        || {
            let output = config::run();

            assert!(output.contains("- llm.api_key = sk-*** (source: env (SHOPMATE_LLM_API_KEY))"));
            assert!(output.contains(
                "- orchestrator.max_iterations = 7 (source: env (SHOPMATE_ORCHESTRATOR_MAX_ITERATIONS))"
            ));
            assert!(output.contains("- orchestrator.privileged_functions = placeOrder (source: default)"));
            assert!(!output.contains("live-secret"));
        },
    );
}

#[test]
fn config_reports_validation_failure() {
    with_env(&[("SHOPMATE_ORCHESTRATOR_MAX_ITERATIONS", "0")], || {
        let output = config::run();
        assert!(output.starts_with("config validation failed"));
    });
}

#[test]
fn doctor_passes_with_defaults() {
    with_env(&[], || {
        let result = doctor::run(true);
        assert_eq!(result.exit_code, 0);

        let payload = parse_payload(&result.output);
        assert_eq!(payload["overall_status"], "pass");
        let names: Vec<&str> = payload["checks"]
            .as_array()
            .expect("checks array")
            .iter()
            .filter_map(|check| check["name"].as_str())
            .collect();
        assert_eq!(names, vec!["config_validation", "model_readiness", "guardrail_coverage"]);
    });
}

#[test]
fn doctor_flags_unguarded_place_order() {
    with_env(&[("SHOPMATE_ORCHESTRATOR_PRIVILEGED_FUNCTIONS", "deleteCart")], || {
        let result = doctor::run(true);
        assert_eq!(result.exit_code, 1);

        let payload = parse_payload(&result.output);
        assert_eq!(payload["overall_status"], "fail");
        assert_eq!(payload["checks"][2]["status"], "fail");
    });
}

#[test]
fn doctor_skips_dependent_checks_when_config_is_invalid() {
    with_env(&[("SHOPMATE_LLM_PROVIDER", "anthropic")], || {
        let result = doctor::run(false);
        assert_eq!(result.exit_code, 1);
        assert!(result.output.contains("- [fail] config_validation"));
        assert!(result.output.contains("- [skip] model_readiness"));
        assert!(result.output.contains("- [skip] guardrail_coverage"));
    });
}

#[test]
fn view_merges_paged_search_results() {
    let dir = tempfile::tempdir().expect("temp dir");
    let path = dir.path().join("turns.json");
    let log = vec![
        TurnEntry::user("find apples"),
        TurnEntry::assistant_call(FunctionCall::new("searchItems", json!({ "query": "apples" }))),
        TurnEntry::function_result(
            FunctionResult::success(json!({ "shops": [{ "shopId": "S1", "items": [{ "itemId": "a1" }] }] }))
                .into_outcome("searchItems"),
        ),
        TurnEntry::assistant_call(FunctionCall::new(
            "searchItems",
            json!({ "query": "apples", "page": 2 }),
        )),
        TurnEntry::function_result(
            FunctionResult::success(json!({ "shops": [{ "shopId": "S1", "items": [{ "itemId": "a2" }] }] }))
                .into_outcome("searchItems"),
        ),
    ];
    fs::write(&path, serde_json::to_string(&log).expect("serialize log")).expect("write log");

    let result = view::run(&path);
    assert_eq!(result.exit_code, 0);

    let payload = parse_payload(&result.output);
    let entries = payload.as_array().expect("view array");
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0]["kind"], "turn");
    assert_eq!(entries[1]["kind"], "search");
    assert_eq!(entries[1]["pages"], 2);
    assert_eq!(
        entries[1]["combinedResult"]["shops"][0]["items"],
        json!([{ "itemId": "a1" }, { "itemId": "a2" }])
    );
}

#[test]
fn view_rejects_missing_and_malformed_files() {
    let dir = tempfile::tempdir().expect("temp dir");

    let missing = view::run(&dir.path().join("absent.json"));
    assert_eq!(missing.exit_code, 2);
    assert_eq!(parse_payload(&missing.output)["error_class"], "io");

    let path = dir.path().join("bad.json");
    fs::write(&path, "{\"not\":\"a log\"}").expect("write file");
    let malformed = view::run(&path);
    assert_eq!(malformed.exit_code, 2);
    assert_eq!(parse_payload(&malformed.output)["error_class"], "parse");
}

#[test]
fn view_rejects_inconsistent_entries() {
    let dir = tempfile::tempdir().expect("temp dir");
    let path = dir.path().join("turns.json");
    let mut entry = TurnEntry::user("hi");
    entry.function_call = Some(FunctionCall::new("getCart", json!({})));
    fs::write(&path, serde_json::to_string(&vec![entry]).expect("serialize")).expect("write");

    let result = view::run(&path);
    assert_eq!(result.exit_code, 2);
    assert_eq!(parse_payload(&result.output)["error_class"], "invalid_entry");
}

fn parse_payload(output: &str) -> Value {
    serde_json::from_str(output).expect("command output should be valid JSON")
}

fn with_env(vars: &[(&str, &str)], test_fn: impl FnOnce()) {
    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    let _guard =
        ENV_LOCK.get_or_init(|| Mutex::new(())).lock().expect("env mutex should not be poisoned");

    let keys = [
        "SHOPMATE_LLM_PROVIDER",
        "SHOPMATE_LLM_API_KEY",
        "SHOPMATE_LLM_BASE_URL",
        "SHOPMATE_LLM_MODEL",
        "SHOPMATE_LLM_TIMEOUT_SECS",
        "SHOPMATE_LLM_MAX_RETRIES",
        "SHOPMATE_ORCHESTRATOR_MAX_ITERATIONS",
        "SHOPMATE_ORCHESTRATOR_CAPABILITY_TIMEOUT_SECS",
        "SHOPMATE_ORCHESTRATOR_VALIDATION_TIMEOUT_SECS",
        "SHOPMATE_ORCHESTRATOR_EVENT_BUFFER",
        "SHOPMATE_ORCHESTRATOR_PRIVILEGED_FUNCTIONS",
        "SHOPMATE_LOGGING_LEVEL",
        "SHOPMATE_LOGGING_FORMAT",
        "SHOPMATE_LOG_LEVEL",
        "SHOPMATE_LOG_FORMAT",
    ];

    let previous_values: Vec<(&str, Option<String>)> =
        keys.iter().map(|key| (*key, env::var(key).ok())).collect();

    for key in &keys {
        env::remove_var(key);
    }
    for (key, value) in vars {
        env::set_var(key, value);
    }

    let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(test_fn));

    for (key, value) in previous_values {
        match value {
            Some(value) => env::set_var(key, value),
            None => env::remove_var(key),
        }
    }

    if let Err(panic) = outcome {
        std::panic::resume_unwind(panic);
    }
}
