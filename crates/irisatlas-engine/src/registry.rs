//! The static stage table.
//!
//! Pipeline order is fixed when the table is built, never discovered at run
//! time. [`StageTable::new`] enforces the ordering rule: a stage may only
//! depend on stages that come before it.

use std::collections::HashSet;
use std::sync::Arc;

use crate::error::{EngineError, EngineResult};
use crate::stage::Extension;
use crate::stages::{Detector, Interpretation, MicroFeatures, SectorMapping};

/// Built-in execution order.
pub const EXECUTION_ORDER: [&str; 3] = [
    crate::stages::micro_features::NAME,
    crate::stages::sector_mapping::NAME,
    crate::stages::interpretation::NAME,
];

/// Instantiates the built-in stages in [`EXECUTION_ORDER`].
pub fn build_extensions() -> Vec<Arc<dyn Extension>> {
    build_extensions_with(None)
}

/// Same as [`build_extensions`], with a detector backend for `micro_features`.
pub fn build_extensions_with(detector: Option<Arc<dyn Detector>>) -> Vec<Arc<dyn Extension>> {
    let micro = match detector {
        Some(detector) => MicroFeatures::with_detector(detector),
        None => MicroFeatures::new(),
    };
    vec![Arc::new(micro), Arc::new(SectorMapping), Arc::new(Interpretation)]
}

/// An ordered, validated list of stages.
#[derive(Clone)]
pub struct StageTable {
    stages: Vec<Arc<dyn Extension>>,
}

impl StageTable {
    /// Validates and wraps `stages`, keeping their order.
    ///
    /// Rejects duplicate names and any dependency, hard or optional, on a
    /// stage that is unknown or appears later in the table.
    pub fn new(stages: Vec<Arc<dyn Extension>>) -> EngineResult<Self> {
        let mut seen: HashSet<String> = HashSet::new();
        for stage in &stages {
            let identity = stage.identity();
            for dep in identity.requires.iter().chain(&identity.optional_requires) {
                if !seen.contains(dep) {
                    return Err(EngineError::InvalidStageTable {
                        message: format!(
                            "stage '{}' depends on '{}', which does not run before it",
                            identity.name, dep
                        ),
                    });
                }
            }
            if !seen.insert(identity.name.clone()) {
                return Err(EngineError::InvalidStageTable {
                    message: format!("duplicate stage name '{}'", identity.name),
                });
            }
        }
        Ok(Self { stages })
    }

    /// The built-in table.
    pub fn builtin() -> Self {
        Self {
            stages: build_extensions(),
        }
    }

    /// The built-in table with a detector backend.
    pub fn builtin_with_detector(detector: Arc<dyn Detector>) -> Self {
        Self {
            stages: build_extensions_with(Some(detector)),
        }
    }

    /// Stages in execution order.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn Extension>> {
        self.stages.iter()
    }

    /// Stage names in execution order.
    pub fn names(&self) -> Vec<String> {
        self.stages.iter().map(|s| s.identity().name).collect()
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }
}

impl Default for StageTable {
    fn default() -> Self {
        Self::builtin()
    }
}

impl std::fmt::Debug for StageTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StageTable")
            .field("stages", &self.names())
            .finish()
    }
}
