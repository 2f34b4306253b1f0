//! Structural interpretation text.
//!
//! Produces a deterministic, non-diagnostic summary of the measurements and
//! micro-feature output, prefixed with a research-only disclaimer. Any
//! sentence containing banned clinical vocabulary is dropped and reported as
//! a safety event.

use std::collections::BTreeSet;
use std::sync::OnceLock;

use irisatlas_spec::{ExtensionResult, StageIdentity};
use regex::Regex;
use serde_json::{json, Value};

use crate::context::ContextSnapshot;
use crate::error::StageError;
use crate::stage::Extension;

pub const NAME: &str = "interpretation";
pub const VERSION: &str = "1";

pub const DISCLAIMER_HEADER: &str = "DISCLAIMER: Research-only structural analysis. This output is not medical advice, \
     not a diagnosis, and must not be used for clinical decisions.";

pub const BANNED_TERMS: &[&str] = &[
    "diagnosis",
    "disease",
    "syndrome",
    "treatment",
    "cure",
    "clinical",
    "prognosis",
    "risk score",
    "medical condition",
];

const EMPTY_AFTER_FILTER: &str = "No explanatory text available after safety filtering.";

/// Output mode, from `extensions.interpretation.mode`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    DeterministicOnly,
    VlmEnabled,
    Disabled,
}

impl Mode {
    fn parse(value: Option<&str>) -> Self {
        match value.map(str::trim) {
            Some("vlm_enabled") => Mode::VlmEnabled,
            Some("disabled") => Mode::Disabled,
            _ => Mode::DeterministicOnly,
        }
    }
}

/// The interpretation stage.
#[derive(Debug, Clone, Copy, Default)]
pub struct Interpretation;

impl Extension for Interpretation {
    fn identity(&self) -> StageIdentity {
        StageIdentity::new(NAME, VERSION).optional_requires([
            super::micro_features::NAME,
            super::sector_mapping::NAME,
        ])
    }

    fn run(&self, ctx: &ContextSnapshot) -> Result<ExtensionResult, StageError> {
        let settings = ctx.stage_settings(NAME);
        let mode = Mode::parse(settings.get("mode").and_then(Value::as_str));
        if mode == Mode::Disabled {
            return Ok(ExtensionResult::skipped("Interpretation disabled by config."));
        }

        let summary = structured_summary(ctx);
        let mut explanation = deterministic_text(&summary);

        let mut warnings = Vec::new();
        if mode == Mode::VlmEnabled {
            let note = settings
                .get("vlm_note")
                .and_then(Value::as_str)
                .map(str::trim)
                .unwrap_or("");
            if note.is_empty() {
                warnings.push("VLM mode enabled but no provider configured; deterministic text used.");
            } else {
                explanation.push_str("\n\nAdditional note: ");
                explanation.push_str(note);
            }
        }

        let (safe_text, removed) = sanitize(&explanation);
        if !removed.is_empty() {
            warnings.push("Interpretation text sanitized due to banned vocabulary.");
        }

        let safety_events = if removed.is_empty() {
            json!([])
        } else {
            let terms: BTreeSet<&str> = removed.iter().copied().collect();
            json!([{
                "event": "banned_vocabulary_filtered",
                "count": removed.len(),
                "terms": terms,
            }])
        };

        let mut result = ExtensionResult::success(json!({
            "interpretation_summary": summary,
            "interpretation_text": format!("{}\n\n{}", DISCLAIMER_HEADER, safe_text).trim().to_string(),
            "safety_events": safety_events,
        }));
        if !warnings.is_empty() {
            result = result.with_warning(warnings.join("; "));
        }
        Ok(result)
    }
}

fn structured_summary(ctx: &ContextSnapshot) -> Value {
    let m = &ctx.metrics;
    let micro = ctx
        .prior_output(super::micro_features::NAME)
        .and_then(|out| out.get("micro_feature_metrics"))
        .cloned()
        .unwrap_or_else(|| json!({}));
    json!({
        "ratios": {
            "pupil_to_iris": m.pupil_to_iris,
            "collarette_to_iris": m.collarette_to_iris,
            "furrow_to_iris": m.furrow_to_iris,
            "scurf_to_iris": m.scurf_to_iris,
        },
        "micro_features": {
            "lacunae_count": micro.get("lacunae_count").and_then(Value::as_u64).unwrap_or(0),
            "crypt_count": micro.get("crypt_count").and_then(Value::as_u64).unwrap_or(0),
            "area_ratio": micro.get("area_ratio").and_then(Value::as_f64).unwrap_or(0.0),
        },
        "notes": [
            "Structural-only description generated from segmentation and extension metrics.",
            "No diagnostic interpretation is performed.",
        ],
    })
}

fn deterministic_text(summary: &Value) -> String {
    let ratio = |key: &str| summary["ratios"][key].as_f64().unwrap_or(0.0);
    let micro = &summary["micro_features"];
    [
        "Deterministic structural summary:".to_string(),
        format!("- Pupil/Iris ratio: {:.4}", ratio("pupil_to_iris")),
        format!("- Collarette/Iris ratio: {:.4}", ratio("collarette_to_iris")),
        format!("- Furrow/Iris ratio: {:.4}", ratio("furrow_to_iris")),
        format!("- Scurf/Iris ratio: {:.4}", ratio("scurf_to_iris")),
        format!("- Lacunae count: {}", micro["lacunae_count"].as_u64().unwrap_or(0)),
        format!("- Crypt count: {}", micro["crypt_count"].as_u64().unwrap_or(0)),
        format!(
            "- Micro-feature area ratio: {:.4}",
            micro["area_ratio"].as_f64().unwrap_or(0.0)
        ),
    ]
    .join("\n")
}

fn sentence_boundary() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"[.!?]\s+|\n").expect("valid regex"))
}

/// Splits after terminal punctuation followed by whitespace, and at line
/// breaks. Decimal points are not boundaries.
fn split_sentences(text: &str) -> Vec<&str> {
    let mut sentences = Vec::new();
    let mut start = 0;
    for boundary in sentence_boundary().find_iter(text) {
        let end = if boundary.as_str().starts_with('\n') {
            boundary.start()
        } else {
            boundary.start() + 1
        };
        sentences.push(&text[start..end]);
        start = boundary.end();
    }
    sentences.push(&text[start..]);
    sentences
}

/// Drops every sentence that contains a banned term.
///
/// Returns the kept text and the banned terms hit, once per hit.
fn sanitize(text: &str) -> (String, Vec<&'static str>) {
    let mut removed = Vec::new();
    let mut kept = Vec::new();

    for sentence in split_sentences(text).into_iter().map(str::trim) {
        if sentence.is_empty() {
            continue;
        }
        let lower = sentence.to_lowercase();
        let hits: Vec<&'static str> = BANNED_TERMS
            .iter()
            .copied()
            .filter(|term| lower.contains(term))
            .collect();
        if hits.is_empty() {
            kept.push(sentence);
        } else {
            removed.extend(hits);
        }
    }

    let safe = kept.join("\n");
    let safe = safe.trim();
    if safe.is_empty() {
        (EMPTY_AFTER_FILTER.to_string(), removed)
    } else {
        (safe.to_string(), removed)
    }
}
