//! IrisAtlas End-to-End Test Infrastructure
//!
//! Integration tests for the runtime guarantees:
//!
//! - **Pipeline**: stage order, dependency gating, optional dependencies,
//!   timeouts
//! - **Determinism**: identical artifacts across repeated runs
//! - **Fatal abort**: upstream contract violations leave a `failed` run state
//! - **Integrity**: manifest hash round-trip and tamper detection
//! - **Atomicity**: interrupted writes never touch the target
//!
//! ## Running Tests
//!
//! ```bash
//! cargo test -p irisatlas-tests
//! ```

pub mod harness;

pub use harness::{Behavior, ProbeStage, Workspace};
