use crate::clock::Clock;
use crate::dynamics::DynamicElementSet;
use crate::lights::LightRig;
use cafescene_common::{AtmosphereConfig, SceneConfig, ShadowConfig};
use cafescene_input::OrbitController;
use cafescene_scene::{build_cafe, LabelPainter, NodeId, SceneGraph};

/// Everything one viewport animates: the scene graph, its lights, the
/// dynamic elements, the camera and the clock.
///
/// A stage is built once per viewport activation and dropped on teardown;
/// rebuilding from the same config yields the same initial state.
#[derive(Debug, Clone)]
pub struct Stage {
    pub graph: SceneGraph,
    pub lights: LightRig,
    pub dynamics: DynamicElementSet,
    pub camera: OrbitController,
    pub clock: Clock,
    pub atmosphere: AtmosphereConfig,
    pub shadows: ShadowConfig,
    cup_nodes: Vec<NodeId>,
    model: Option<NodeId>,
}

impl Stage {
    pub fn new(config: &SceneConfig, painter: &LabelPainter) -> Self {
        let cafe = build_cafe(config, painter);
        let mut graph = cafe.graph;
        let dynamics =
            DynamicElementSet::new(config, &mut graph, &cafe.cup_nodes, &cafe.steam_origins);
        let mut lights = LightRig::from_config(&config.lighting);
        lights.update(0.0);

        tracing::info!(
            nodes = graph.len(),
            lights = lights.len(),
            sprites = dynamics.sprite_count(),
            "stage built"
        );

        Self {
            graph,
            lights,
            dynamics,
            camera: OrbitController::new(&config.camera),
            clock: Clock::new(),
            atmosphere: config.atmosphere.clone(),
            shadows: config.shadows.clone(),
            cup_nodes: cafe.cup_nodes,
            model: None,
        }
    }

    /// Build with the painter the signage config asks for.
    pub fn from_config(config: &SceneConfig) -> Self {
        Self::new(config, &LabelPainter::from_config(&config.signage))
    }

    /// Step the clock and every time-driven part of the stage by `dt`.
    pub fn advance(&mut self, dt: f32) {
        self.advance_by(dt, dt);
    }

    /// Move the clock by `elapsed` seconds but integrate motion by `step`.
    /// The frame loop passes the measured frame time and its clamped value,
    /// so pulses keep wall-clock phase while particles never jump.
    pub fn advance_by(&mut self, elapsed: f32, step: f32) {
        let elapsed = self.clock.advance(elapsed);
        let step = step.max(0.0).min(elapsed);
        let t = self.clock.elapsed();
        self.lights.update(t);
        self.dynamics.update(&mut self.graph, step, t);
        self.camera.update(step);
    }

    /// Insert imported content into the graph and remember its root.
    /// A second model replaces nothing; the first attached root is kept.
    pub fn attach_model(&mut self, attach: impl FnOnce(&mut SceneGraph) -> NodeId) -> NodeId {
        let node = attach(&mut self.graph);
        if self.model.is_none() {
            self.model = Some(node);
        }
        tracing::info!(nodes = self.graph.subtree_len(node), "model attached");
        node
    }

    pub fn model(&self) -> Option<NodeId> {
        self.model
    }

    pub fn cup_nodes(&self) -> &[NodeId] {
        &self.cup_nodes
    }

    /// Number of animated entities outside their vertical band.
    pub fn out_of_band(&self) -> usize {
        self.dynamics.out_of_band(&self.graph)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cafescene_common::Transform;

    fn stage() -> Stage {
        Stage::new(&SceneConfig::default(), &LabelPainter::bitmap())
    }

    #[test]
    fn advance_moves_clock_lights_and_camera() {
        let mut stage = stage();
        stage.camera.zoom(5.0);
        let before = stage.camera.distance();
        stage.advance(0.25);
        assert_eq!(stage.clock.frame(), 1);
        assert!((stage.clock.elapsed() - 0.25).abs() < 1e-6);
        let expected = 0.8 + 0.3 * (1.4_f32 * 0.25).sin();
        let neon = stage.lights.get("neon_left").unwrap().intensity();
        assert!((neon - expected).abs() < 1e-5);
        assert!(stage.camera.distance() < before);
    }

    #[test]
    fn split_advance_keeps_clock_and_motion_apart() {
        let mut stage = stage();
        stage.camera.zoom(5.0);
        let mut reference = stage.clone();
        stage.advance_by(3.0, 0.1);
        reference.advance(0.1);
        assert!((stage.clock.elapsed() - 3.0).abs() < 1e-6);
        assert_eq!(stage.clock.delta(), 3.0);
        assert_eq!(stage.camera.distance(), reference.camera.distance());

        let expected = 0.8 + 0.3 * (1.4_f32 * 3.0).sin();
        let neon = stage.lights.get("neon_left").unwrap().intensity();
        assert!((neon - expected).abs() < 1e-5);
    }

    #[test]
    fn rebuild_yields_equivalent_stage() {
        let mut first = stage();
        for _ in 0..30 {
            first.advance(1.0 / 60.0);
        }
        drop(first);

        let a = stage();
        let b = stage();
        assert_eq!(a.graph, b.graph);
        assert_eq!(a.lights, b.lights);
        assert_eq!(a.clock, Clock::new());
        let sa: Vec<_> = a.dynamics.sprites().collect();
        let sb: Vec<_> = b.dynamics.sprites().collect();
        assert_eq!(sa, sb);
    }

    #[test]
    fn zero_dt_keeps_every_position() {
        let mut stage = stage();
        stage.advance(0.3);
        let sprites: Vec<_> = stage.dynamics.sprites().map(|s| s.position).collect();
        let matrices = stage.graph.world_matrices();
        let eye = stage.camera.eye();
        stage.advance(0.0);
        let after: Vec<_> = stage.dynamics.sprites().map(|s| s.position).collect();
        assert_eq!(after, sprites);
        assert_eq!(stage.graph.world_matrices(), matrices);
        assert_eq!(stage.camera.eye(), eye);
    }

    #[test]
    fn attach_model_records_first_root() {
        let mut stage = stage();
        let before = stage.graph.len();
        let node = stage.attach_model(|g| g.add_group(None, "model", Transform::default()));
        assert_eq!(stage.model(), Some(node));
        assert_eq!(stage.graph.len(), before + 1);
        stage.attach_model(|g| g.add_group(None, "model_2", Transform::default()));
        assert_eq!(stage.model(), Some(node));
    }

    #[test]
    fn long_run_keeps_invariants() {
        let mut stage = stage();
        for i in 0..3000 {
            stage.camera.zoom(if i % 2 == 0 { 40.0 } else { -40.0 });
            stage.advance(if i % 50 == 0 { 0.1 } else { 1.0 / 60.0 });
            assert_eq!(stage.out_of_band(), 0);
            let d = stage.camera.distance();
            assert!((6.0 - 1e-4..=30.0 + 1e-4).contains(&d));
        }
    }
}
