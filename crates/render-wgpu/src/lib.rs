//! wgpu render backend for the coffee shop stage.
//!
//! Consumes a [`cafescene_render::DrawList`] per frame: a depth-only pass of
//! the shadow casters from the directional light, then opaque meshes,
//! blended meshes back to front, and finally snow, steam and particle
//! sprites as camera-facing billboards. Exponential-squared fog is applied
//! to everything in the main pass.
//!
//! # Invariants
//! - Renderer never mutates the stage.
//! - GPU resources mirror the scene graph's append-only geometry and
//!   texture tables.

mod gpu;
mod shaders;
mod shadow;

pub use gpu::WgpuRenderer;
