use crate::draw_list::DrawList;
use cafescene_kernel::{ElementKind, Stage};
use std::fmt::Write;

/// Renderer-agnostic interface.
///
/// A renderer reads the stage and its extracted draw list and produces
/// output. It never mutates the stage.
pub trait Renderer {
    type Output;

    fn render(&self, stage: &Stage, frame: &DrawList) -> Self::Output;
}

/// Text rendering of a frame, for the CLI, logs and tests.
#[derive(Debug, Default)]
pub struct DebugTextRenderer {
    /// Also list every mesh node with its world position.
    pub verbose: bool,
}

impl DebugTextRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn verbose() -> Self {
        Self { verbose: true }
    }
}

impl Renderer for DebugTextRenderer {
    type Output = String;

    fn render(&self, stage: &Stage, frame: &DrawList) -> String {
        let mut out = String::new();
        let _ = writeln!(
            out,
            "=== Stage (frame={}, t={:.2}s) ===",
            stage.clock.frame(),
            stage.clock.elapsed()
        );
        let _ = writeln!(
            out,
            "Nodes: {} ({} meshes, {} opaque, {} transparent)",
            stage.graph.len(),
            frame.mesh_count(),
            frame.opaque.len(),
            frame.transparent.len()
        );
        let count = |kind| frame.sprites.iter().filter(|s| s.kind == kind).count();
        let _ = writeln!(
            out,
            "Sprites: snow={} steam={} particles={}",
            count(ElementKind::Snow),
            count(ElementKind::Steam),
            count(ElementKind::Particle)
        );
        let v = &frame.view;
        let _ = writeln!(
            out,
            "Camera: eye=({:.1}, {:.1}, {:.1}) target=({:.1}, {:.1}, {:.1}) distance={:.2}",
            v.eye.x,
            v.eye.y,
            v.eye.z,
            v.target.x,
            v.target.y,
            v.target.z,
            stage.camera.distance()
        );
        let _ = writeln!(
            out,
            "Fog: #{:06x} density={}",
            frame.fog_color.to_hex(),
            frame.fog_density
        );
        match &frame.shadow {
            Some(shadow) => {
                let _ = writeln!(
                    out,
                    "Shadows: {}px casters={}",
                    shadow.map_size,
                    frame.shadow_casters().count()
                );
            }
            None => {
                let _ = writeln!(out, "Shadows: off");
            }
        }
        for light in stage.lights.lights() {
            let _ = writeln!(
                out,
                "  light {:<12} #{:06x} intensity={:.3}",
                light.name,
                light.color.to_hex(),
                light.intensity()
            );
        }

        if self.verbose {
            for draw in frame.opaque.iter().chain(&frame.transparent) {
                let Some(node) = stage.graph.node(draw.node) else {
                    continue;
                };
                let p = draw.model.transform_point3(glam::Vec3::ZERO);
                let _ = writeln!(
                    out,
                    "  mesh {:<14} pos=({:.2}, {:.2}, {:.2})",
                    node.name, p.x, p.y, p.z
                );
            }
        }

        out
    }
}
