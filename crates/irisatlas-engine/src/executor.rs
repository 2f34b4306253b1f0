//! Timeout-bounded stage execution.
//!
//! Every invocation runs on its own named worker thread while the caller
//! waits on a channel for at most the stage's time budget. Whatever happens
//! inside the worker (a result, a malformed result, an error, a panic, or no
//! answer in time) is converted into an [`ExtensionResult`] plus a
//! [`TelemetryRecord`]; nothing escapes to the orchestrator.
//!
//! A worker that misses its deadline is detached, not killed. Its
//! computation may run on in the background and its result is discarded
//! when it eventually arrives. Stages must therefore not write to shared
//! resources outside their own output.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use irisatlas_spec::{ExtensionResult, ExtensionStatus, StageIdentity, TelemetryRecord};

use crate::context::ContextSnapshot;
use crate::determinism;
use crate::error::StageError;
use crate::memory;
use crate::stage::Extension;

/// What one invocation produced.
#[derive(Debug, Clone)]
pub struct StageOutcome {
    /// Normalized result. The payload is only meaningful on `Success`.
    pub result: ExtensionResult,
    /// Audit record for the invocation.
    pub telemetry: TelemetryRecord,
}

type WorkerReport = thread::Result<Result<ExtensionResult, StageError>>;

/// Runs `stage` against `context`, giving up after `timeout_ms`.
///
/// A budget of zero is treated as one millisecond.
pub fn invoke(stage: Arc<dyn Extension>, mut context: ContextSnapshot, timeout_ms: u64) -> StageOutcome {
    let identity = stage.identity();
    let budget = Duration::from_millis(timeout_ms.max(1));

    context.seed = determinism::reset();
    memory::reset_peak();
    let start = Instant::now();

    let (tx, rx) = mpsc::channel::<WorkerReport>();
    let spawned = thread::Builder::new()
        .name(format!("irisatlas-stage-{}", identity.name))
        .spawn(move || {
            let report = panic::catch_unwind(AssertUnwindSafe(|| stage.run(&context)));
            // The receiver is gone if the stage timed out.
            let _ = tx.send(report);
        });

    let result = match spawned {
        Err(err) => ExtensionResult::failed(format!("stage error: failed to spawn worker: {}", err)),
        Ok(handle) => match rx.recv_timeout(budget) {
            Ok(report) => {
                let _ = handle.join();
                normalize(&identity, report)
            }
            Err(RecvTimeoutError::Timeout) => {
                tracing::warn!(
                    stage = %identity.name,
                    timeout_ms,
                    "stage exceeded its time budget; abandoning worker"
                );
                drop(handle);
                ExtensionResult::new(ExtensionStatus::Timeout)
                    .with_warning(format!("stage timed out after {} ms", timeout_ms))
            }
            Err(RecvTimeoutError::Disconnected) => {
                let _ = handle.join();
                ExtensionResult::failed("stage error: worker exited without a result")
            }
        },
    };

    let duration_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX);
    let telemetry = TelemetryRecord {
        name: identity.name.clone(),
        version: identity.version.clone(),
        status: result.status,
        duration_ms,
        peak_memory_mb: memory::peak_rss_mb(),
        model_version: result.model_version.clone(),
        warning: result.warning.clone(),
    };

    StageOutcome { result, telemetry }
}

fn normalize(identity: &StageIdentity, report: WorkerReport) -> ExtensionResult {
    match report {
        Ok(Ok(result)) => match result.malformed_reason() {
            None => result,
            Some(reason) => ExtensionResult::failed(format!(
                "Invalid extension result from {}: {}",
                identity.name, reason
            )),
        },
        Ok(Err(err)) => ExtensionResult::failed(format!("stage error: {}", err)),
        Err(panic) => ExtensionResult::failed(format!("stage error: {}", panic_message(&*panic))),
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "stage panicked".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{build_snapshot, RunInfo, SharedState};
    use image::{GrayImage, RgbImage};
    use serde_json::json;
    use std::collections::BTreeMap;
    use std::path::PathBuf;

    struct FnStage<F>(&'static str, F);

    impl<F> Extension for FnStage<F>
    where
        F: Fn(&ContextSnapshot) -> Result<ExtensionResult, StageError> + Send + Sync,
    {
        fn identity(&self) -> StageIdentity {
            StageIdentity::new(self.0, "1")
        }

        fn run(&self, ctx: &ContextSnapshot) -> Result<ExtensionResult, StageError> {
            (self.1)(ctx)
        }
    }

    fn fn_stage<F>(name: &'static str, body: F) -> Arc<dyn Extension>
    where
        F: Fn(&ContextSnapshot) -> Result<ExtensionResult, StageError> + Send + Sync + 'static,
    {
        Arc::new(FnStage(name, body))
    }

    fn context() -> ContextSnapshot {
        let mask = GrayImage::from_raw(2, 1, vec![2, 1]).unwrap();
        let shared = SharedState {
            grayscale: GrayImage::new(2, 1),
            original: RgbImage::new(2, 1),
            iris_mask: crate::segmentation::iris_sub_mask(&mask),
            mask: mask.clone(),
        };
        let run = RunInfo {
            input_path: PathBuf::from("in.png"),
            output_dir: PathBuf::from("out"),
            device: "cpu".into(),
            model_version: "unknown".into(),
        };
        let metrics = crate::measurements::compute_measurements(&mask).unwrap();
        build_snapshot(&shared, &run, &metrics, &json!({}), &BTreeMap::new(), 0).unwrap()
    }

    #[test]
    fn test_success_passes_through() {
        let stage = fn_stage("ok", |ctx| {
            Ok(ExtensionResult::success(json!({"iris": ctx.metrics.iris_pixels}))
                .with_warning("note")
                .with_model_version("m1"))
        });
        let outcome = invoke(stage, context(), 5_000);
        assert_eq!(outcome.result.status, ExtensionStatus::Success);
        assert_eq!(outcome.result.payload, json!({"iris": 1}));
        assert_eq!(outcome.telemetry.name, "ok");
        assert_eq!(outcome.telemetry.model_version.as_deref(), Some("m1"));
        assert_eq!(outcome.telemetry.warning.as_deref(), Some("note"));
    }

    #[test]
    fn test_error_becomes_failed() {
        let stage = fn_stage("err", |_| Err(StageError::msg("bad input")));
        let outcome = invoke(stage, context(), 5_000);
        assert_eq!(outcome.result.status, ExtensionStatus::Failed);
        assert_eq!(outcome.result.warning.as_deref(), Some("stage error: bad input"));
    }

    #[test]
    fn test_panic_becomes_failed() {
        let stage = fn_stage("boom", |_| panic!("exploded"));
        let outcome = invoke(stage, context(), 5_000);
        assert_eq!(outcome.telemetry.status, ExtensionStatus::Failed);
        assert_eq!(outcome.result.warning.as_deref(), Some("stage error: exploded"));
    }

    #[test]
    fn test_malformed_result_becomes_failed() {
        let stage = fn_stage("shape", |_| {
            Ok(ExtensionResult::success(json!("not an object")).with_model_version("m1"))
        });
        let outcome = invoke(stage, context(), 5_000);
        assert_eq!(outcome.result.status, ExtensionStatus::Failed);
        assert_eq!(outcome.result.payload, json!({}));
        assert!(outcome.telemetry.model_version.is_none());
        let warning = outcome.result.warning.unwrap();
        assert!(warning.contains("shape"));
        assert!(warning.contains("payload must be an object"));
    }

    #[test]
    fn test_timeout_is_bounded() {
        let stage = fn_stage("slow", |_| {
            thread::sleep(Duration::from_millis(500));
            Ok(ExtensionResult::success(json!({})))
        });
        let outcome = invoke(stage, context(), 20);
        assert_eq!(outcome.result.status, ExtensionStatus::Timeout);
        assert!(outcome.telemetry.duration_ms >= 20);
        assert!(outcome.telemetry.duration_ms < 500);
        assert_eq!(
            outcome.telemetry.warning.as_deref(),
            Some("stage timed out after 20 ms")
        );
    }

    #[test]
    fn test_worker_thread_is_named() {
        let stage = fn_stage("named", |_| {
            let name = thread::current().name().map(str::to_string);
            Ok(ExtensionResult::success(json!({ "thread": name })))
        });
        let outcome = invoke(stage, context(), 5_000);
        assert_eq!(outcome.result.payload["thread"], json!("irisatlas-stage-named"));
    }
}
