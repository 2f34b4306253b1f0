//! Dependency gate.
//!
//! Decides, before anything is built or invoked, whether a stage may run
//! given the outputs accumulated so far. Only hard dependencies gate; a
//! stage sees a missing optional dependency as an absent prior output.

use std::collections::BTreeMap;

use irisatlas_spec::StageIdentity;
use serde_json::Value;

/// Outcome of a gate check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateDecision {
    /// Every hard dependency produced a successful output.
    Proceed,
    /// A hard dependency is missing; the stage body must not run.
    Skip { reason: String },
}

/// Checks a stage's hard dependencies against the accumulated outputs.
pub fn check(identity: &StageIdentity, outputs: &BTreeMap<String, Value>) -> GateDecision {
    for dep in &identity.requires {
        if !outputs.contains_key(dep) {
            return GateDecision::Skip {
                reason: format!(
                    "Required dependency '{}' not available for {}.",
                    dep, identity.name
                ),
            };
        }
    }
    GateDecision::Proceed
}

/// Warning for a configured version that differs from the implementation.
///
/// The implementation's own version always runs.
pub fn version_warning(identity: &StageIdentity, configured: Option<&str>) -> Option<String> {
    let configured = configured?;
    if configured == identity.version {
        return None;
    }
    Some(format!(
        "Config version {} differs from implementation {}; executing implementation version.",
        configured, identity.version
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_missing_hard_dependency_skips() {
        let identity = StageIdentity::new("b", "1").requires(["a"]);
        let decision = check(&identity, &BTreeMap::new());
        assert_eq!(
            decision,
            GateDecision::Skip {
                reason: "Required dependency 'a' not available for b.".to_string()
            }
        );
    }

    #[test]
    fn test_present_dependency_proceeds() {
        let identity = StageIdentity::new("b", "1").requires(["a"]);
        let mut outputs = BTreeMap::new();
        outputs.insert("a".to_string(), json!({}));
        assert_eq!(check(&identity, &outputs), GateDecision::Proceed);
    }

    #[test]
    fn test_optional_dependency_never_gates() {
        let identity = StageIdentity::new("c", "1").optional_requires(["a", "b"]);
        assert_eq!(check(&identity, &BTreeMap::new()), GateDecision::Proceed);
    }

    #[test]
    fn test_version_warning() {
        let identity = StageIdentity::new("a", "1");
        assert!(version_warning(&identity, None).is_none());
        assert!(version_warning(&identity, Some("1")).is_none());
        assert_eq!(
            version_warning(&identity, Some("2")).as_deref(),
            Some("Config version 2 differs from implementation 1; executing implementation version.")
        );
    }
}
