//! Rendering adapter: draw lists extracted from the stage and a
//! renderer-agnostic interface.
//!
//! # Invariants
//! - Renderers read the stage; they never mutate it.
//! - A draw list is derived entirely from one stage snapshot.

mod draw_list;
mod renderer;

pub use draw_list::{DrawList, LightSample, MeshDraw, RenderView, ShadowView};
pub use renderer::{DebugTextRenderer, Renderer};
