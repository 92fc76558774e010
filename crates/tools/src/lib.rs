//! Developer tooling: read-only inspection of a running stage.
//!
//! # Invariants
//! - Inspecting never mutates the stage.

pub mod inspector;

pub use inspector::{LightInfo, NodeInfo, SceneInspector, StageSummary};
