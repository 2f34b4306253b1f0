//! The stage contract.

use irisatlas_spec::{ExtensionResult, StageIdentity};

use crate::context::ContextSnapshot;
use crate::error::StageError;

/// A pipeline stage.
///
/// Stages receive an isolated, read-only [`ContextSnapshot`] and must not
/// rely on running to completion: the runtime may abandon an invocation
/// once its time budget is spent.
///
/// # Example
///
/// ```
/// use irisatlas_engine::{ContextSnapshot, Extension, StageError};
/// use irisatlas_spec::{ExtensionResult, StageIdentity};
///
/// struct Echo;
///
/// impl Extension for Echo {
///     fn identity(&self) -> StageIdentity {
///         StageIdentity::new("echo", "1").optional_requires(["micro_features"])
///     }
///
///     fn run(&self, ctx: &ContextSnapshot) -> Result<ExtensionResult, StageError> {
///         Ok(ExtensionResult::success(serde_json::json!({
///             "iris_pixels": ctx.metrics.iris_pixels,
///         })))
///     }
/// }
///
/// assert_eq!(Echo.identity().name, "echo");
/// ```
pub trait Extension: Send + Sync {
    /// Declared name, version, and dependencies.
    fn identity(&self) -> StageIdentity;

    /// Runs the stage body.
    fn run(&self, ctx: &ContextSnapshot) -> Result<ExtensionResult, StageError>;
}
