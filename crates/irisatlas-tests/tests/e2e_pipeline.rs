//! End-to-end pipeline tests: ordering, gating, optional dependencies,
//! timeouts, and fault absorption.
//!
//! ```bash
//! cargo test -p irisatlas-tests --test e2e_pipeline
//! ```

use std::collections::BTreeSet;
use std::time::Duration;

use irisatlas_engine::{Runtime, StageTable};
use irisatlas_spec::ExtensionStatus;
use irisatlas_tests::harness::ring_segmenter;
use irisatlas_tests::{Behavior, ProbeStage, Workspace};
use pretty_assertions::assert_eq;
use serde_json::json;

fn statuses(output: &irisatlas_engine::RuntimeOutput) -> Vec<(String, ExtensionStatus)> {
    output
        .extension_telemetry
        .iter()
        .map(|t| (t.name.clone(), t.status))
        .collect()
}

#[test]
fn test_three_stage_scenario_all_succeed() {
    let ws = Workspace::new();
    let input = ws.write_eye();
    let a = ProbeStage::new("a");
    let b = ProbeStage::new("b").requires(&["a"]);
    let c = ProbeStage::new("c").optional_requires(&["a", "b"]);
    let table = StageTable::new(vec![a.handle(), b.handle(), c.handle()]).unwrap();

    let output = Runtime::new(ring_segmenter)
        .with_stages(table)
        .run(&input, "cpu", &ws.config())
        .unwrap();

    assert_eq!(
        statuses(&output),
        vec![
            ("a".to_string(), ExtensionStatus::Success),
            ("b".to_string(), ExtensionStatus::Success),
            ("c".to_string(), ExtensionStatus::Success),
        ]
    );
    let keys: BTreeSet<&str> = output
        .analysis_result
        .extensions
        .keys()
        .map(String::as_str)
        .collect();
    assert_eq!(keys, BTreeSet::from(["a", "b", "c"]));

    let manifest_names: Vec<&str> = output
        .manifest
        .extensions
        .iter()
        .map(|t| t.name.as_str())
        .collect();
    assert_eq!(manifest_names, vec!["a", "b", "c"]);

    // c saw both earlier outputs, a saw none.
    assert!(a.seen_outputs()[0].is_empty());
    let seen_by_c = &c.seen_outputs()[0];
    assert_eq!(seen_by_c["a"]["stage"], json!("a"));
    assert_eq!(seen_by_c["b"]["stage"], json!("b"));
    assert!(output.analysis_result.warnings.is_empty());
}

#[test]
fn test_timeout_gates_hard_dependent() {
    let ws = Workspace::new();
    let input = ws.write_eye();
    let a = ProbeStage::new("a").behavior(Behavior::Sleep(Duration::from_millis(200)));
    let b = ProbeStage::new("b").requires(&["a"]);
    let c = ProbeStage::new("c").optional_requires(&["a"]);
    let table = StageTable::new(vec![a.handle(), b.handle(), c.handle()]).unwrap();
    let config = ws.config_with_extensions(json!({"a": {"timeout_ms": 10}}));

    let output = Runtime::new(ring_segmenter)
        .with_stages(table)
        .run(&input, "cpu", &config)
        .unwrap();

    let a_record = &output.extension_telemetry[0];
    assert_eq!(a_record.status, ExtensionStatus::Timeout);
    assert!(a_record.duration_ms >= 10, "duration {}", a_record.duration_ms);
    assert!(a_record.duration_ms < 200, "duration {}", a_record.duration_ms);
    assert!(a_record.warning.as_deref().unwrap().contains("10"));

    // b is skipped without its body ever running.
    let b_record = &output.extension_telemetry[1];
    assert_eq!(b_record.status, ExtensionStatus::Skipped);
    assert_eq!(b_record.duration_ms, 0);
    assert_eq!(b.calls(), 0);
    assert_eq!(
        b_record.warning.as_deref(),
        Some("Required dependency 'a' not available for b.")
    );

    // c still runs and sees no entry for a.
    assert_eq!(output.extension_telemetry[2].status, ExtensionStatus::Success);
    assert_eq!(c.calls(), 1);
    assert!(!c.seen_outputs()[0].contains_key("a"));

    let warnings = &output.analysis_result.warnings;
    assert_eq!(warnings.len(), 2);
    assert!(warnings[0].starts_with("[a] "));
    assert_eq!(warnings[1], "[b] Required dependency 'a' not available for b.");
}

#[test]
fn test_faults_are_absorbed_and_not_merged() {
    let ws = Workspace::new();
    let input = ws.write_eye();
    let failing = ProbeStage::new("failing").behavior(Behavior::Fail("bad input".into()));
    let panicking = ProbeStage::new("panicking").behavior(Behavior::Panic("exploded".into()));
    let malformed = ProbeStage::new("malformed").behavior(Behavior::Malformed);
    let last = ProbeStage::new("last").optional_requires(&["failing", "panicking", "malformed"]);
    let table = StageTable::new(vec![
        failing.handle(),
        panicking.handle(),
        malformed.handle(),
        last.handle(),
    ])
    .unwrap();

    let output = Runtime::new(ring_segmenter)
        .with_stages(table)
        .run(&input, "cpu", &ws.config())
        .unwrap();

    assert_eq!(
        statuses(&output),
        vec![
            ("failing".to_string(), ExtensionStatus::Failed),
            ("panicking".to_string(), ExtensionStatus::Failed),
            ("malformed".to_string(), ExtensionStatus::Failed),
            ("last".to_string(), ExtensionStatus::Success),
        ]
    );
    assert_eq!(
        output.analysis_result.warnings,
        vec![
            "[failing] stage error: bad input".to_string(),
            "[panicking] stage error: exploded".to_string(),
            output.analysis_result.warnings[2].clone(),
        ]
    );
    assert!(output.analysis_result.warnings[2].starts_with("[malformed] Invalid extension result from malformed"));
    assert_eq!(
        output.analysis_result.extensions.keys().collect::<Vec<_>>(),
        vec!["last"]
    );
    assert!(last.seen_outputs()[0].is_empty());
    assert_eq!(ws.run_state().run_state, irisatlas_spec::RunState::Completed);
}

#[test]
fn test_builtin_stages_with_sector_schema() {
    let ws = Workspace::new();
    let input = ws.write_eye();
    let config = ws.config_with_extensions(json!({
        "micro_features": {"enabled": false},
        "sector_mapping": {"schema": 24},
    }));

    let output = Runtime::new(ring_segmenter).run(&input, "cpu", &config).unwrap();

    assert_eq!(
        statuses(&output),
        vec![
            ("micro_features".to_string(), ExtensionStatus::Skipped),
            ("sector_mapping".to_string(), ExtensionStatus::Success),
            ("interpretation".to_string(), ExtensionStatus::Success),
        ]
    );
    let results = ws.read_json("results.json");
    assert!(results["sector_density_metrics"].is_object());
    assert!(results["interpretation_text"]
        .as_str()
        .unwrap()
        .starts_with("DISCLAIMER"));
    assert!(results.get("micro_feature_metrics").is_none());
}
