//! Scene content: the node hierarchy, procedural geometry, materials, label
//! textures and the builder that authors the coffee shop.
//!
//! # Invariants
//! - Building is pure: same config, same graph.
//! - Every node is owned by exactly one parent or is a root.

pub mod builder;
pub mod geometry;
pub mod graph;
pub mod label;
pub mod material;

pub use builder::{build_cafe, CafeScene, COUNTER_TOP_Y};
pub use geometry::{Geometry, MeshData};
pub use graph::{GeometryId, MaterialId, Node, NodeId, NodeKind, SceneGraph, ShadowFlags, TextureId};
pub use label::{LabelError, LabelPainter, LabelSpec, TextLine};
pub use material::{BasicMaterial, Material, StandardMaterial};
