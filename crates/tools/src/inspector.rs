use cafescene_kernel::{LightKind, Stage};
use cafescene_scene::{NodeId, NodeKind};
use serde::Serialize;

/// Stage inspector for developer tooling.
///
/// Provides read-only queries for the debug overlay and the CLI.
pub struct SceneInspector;

impl SceneInspector {
    /// Produce a summary of the stage.
    pub fn summary(stage: &Stage) -> StageSummary {
        let lights = stage
            .lights
            .lights()
            .iter()
            .map(|l| LightInfo {
                name: l.name.clone(),
                kind: match l.kind {
                    LightKind::Ambient => "ambient",
                    LightKind::Directional { .. } => "directional",
                    LightKind::Point { .. } => "point",
                },
                intensity: l.intensity(),
                pulsing: l.pulse().is_some(),
            })
            .collect();

        StageSummary {
            frame: stage.clock.frame(),
            elapsed: stage.clock.elapsed(),
            nodes: stage.graph.len(),
            meshes: stage.graph.mesh_count(),
            groups: stage.graph.group_count(),
            anchors: stage.graph.len() - stage.graph.mesh_count() - stage.graph.group_count(),
            snowflakes: stage.dynamics.snow.len(),
            steam_puffs: stage.dynamics.steam.len(),
            particles: stage.dynamics.particles.len(),
            cups: stage.dynamics.cups.len(),
            camera_distance: stage.camera.distance(),
            camera_eye: stage.camera.eye().to_array(),
            model_loaded: stage.model().is_some(),
            out_of_band: stage.out_of_band(),
            lights,
        }
    }

    /// Look up a node by name.
    pub fn inspect_node(stage: &Stage, name: &str) -> Option<NodeInfo> {
        let id = stage.graph.find(name)?;
        Self::node_info(stage, id)
    }

    pub fn node_info(stage: &Stage, id: NodeId) -> Option<NodeInfo> {
        let node = stage.graph.node(id)?;
        let world = stage.graph.world_matrices();
        let position = world.get(id.0 as usize)?.w_axis.truncate();
        Some(NodeInfo {
            id: id.0,
            name: node.name.clone(),
            kind: match node.kind {
                NodeKind::Group => "group",
                NodeKind::Mesh { .. } => "mesh",
                NodeKind::Empty => "empty",
            },
            children: node.children().iter().map(|c| c.0).collect(),
            casts_shadow: node.shadows.cast,
            receives_shadow: node.shadows.receive,
            local_position: node.transform.position.to_array(),
            world_position: position.to_array(),
        })
    }

    /// Names of the top-level nodes, in build order.
    pub fn roots(stage: &Stage) -> Vec<String> {
        stage
            .graph
            .roots()
            .iter()
            .filter_map(|&id| stage.graph.node(id).map(|n| n.name.clone()))
            .collect()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct LightInfo {
    pub name: String,
    pub kind: &'static str,
    pub intensity: f32,
    pub pulsing: bool,
}

/// Summary of stage state for the inspector.
#[derive(Debug, Clone, Serialize)]
pub struct StageSummary {
    pub frame: u64,
    pub elapsed: f32,
    pub nodes: usize,
    pub meshes: usize,
    pub groups: usize,
    /// Empty anchor nodes.
    pub anchors: usize,
    pub snowflakes: usize,
    pub steam_puffs: usize,
    pub particles: usize,
    pub cups: usize,
    pub camera_distance: f32,
    pub camera_eye: [f32; 3],
    pub model_loaded: bool,
    pub out_of_band: usize,
    pub lights: Vec<LightInfo>,
}

impl std::fmt::Display for StageSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Stage: frame={} t={:.2}s nodes={} meshes={} snow={} steam={} particles={} cups={} camera={:.2}",
            self.frame,
            self.elapsed,
            self.nodes,
            self.meshes,
            self.snowflakes,
            self.steam_puffs,
            self.particles,
            self.cups,
            self.camera_distance,
        )
    }
}

/// Detailed info about a single node.
#[derive(Debug, Clone, Serialize)]
pub struct NodeInfo {
    pub id: u32,
    pub name: String,
    pub kind: &'static str,
    /// Ids of the direct children, in insertion order.
    pub children: Vec<u32>,
    pub casts_shadow: bool,
    pub receives_shadow: bool,
    pub local_position: [f32; 3],
    pub world_position: [f32; 3],
}

impl std::fmt::Display for NodeInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Node #{} {:?} {} children={} world=({:.2}, {:.2}, {:.2})",
            self.id,
            self.name,
            self.kind,
            self.children.len(),
            self.world_position[0],
            self.world_position[1],
            self.world_position[2],
        )?;
        match (self.casts_shadow, self.receives_shadow) {
            (true, true) => write!(f, " shadows=cast+receive"),
            (true, false) => write!(f, " shadows=cast"),
            (false, true) => write!(f, " shadows=receive"),
            (false, false) => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cafescene_common::SceneConfig;
    use cafescene_scene::LabelPainter;

    fn stage() -> Stage {
        Stage::new(&SceneConfig::default(), &LabelPainter::bitmap())
    }

    #[test]
    fn summary_fresh_stage() {
        let stage = stage();
        let summary = SceneInspector::summary(&stage);
        assert_eq!(summary.frame, 0);
        assert_eq!(summary.nodes, summary.meshes + summary.groups + summary.anchors);
        assert_eq!(summary.anchors, 3);
        assert_eq!(summary.snowflakes, 1500);
        assert_eq!(summary.lights.len(), 6);
        assert_eq!(summary.out_of_band, 0);
        assert!(!summary.model_loaded);
    }

    #[test]
    fn summary_tracks_frames() {
        let mut stage = stage();
        for _ in 0..3 {
            stage.advance(1.0 / 60.0);
        }
        let summary = SceneInspector::summary(&stage);
        assert_eq!(summary.frame, 3);
        assert!((summary.elapsed - 0.05).abs() < 1e-5);
    }

    #[test]
    fn pulsing_lights_are_marked() {
        let summary = SceneInspector::summary(&stage());
        let pulsing: Vec<_> = summary
            .lights
            .iter()
            .filter(|l| l.pulsing)
            .map(|l| l.name.as_str())
            .collect();
        assert_eq!(pulsing, ["neon_left", "neon_right", "banner"]);
    }

    #[test]
    fn inspect_node_found() {
        let stage = stage();
        let info = SceneInspector::inspect_node(&stage, "counter").unwrap();
        assert_eq!(info.kind, "group");
        assert_eq!(info.children.len(), 3);
        assert!(format!("{info}").contains("counter"));

        let top = SceneInspector::node_info(&stage, NodeId(info.children[0])).unwrap();
        assert_eq!(top.name, "counter_top");
        assert_eq!(top.kind, "mesh");
        assert!(format!("{top}").ends_with("shadows=cast+receive"));
    }

    #[test]
    fn anchors_report_as_empty() {
        let info = SceneInspector::inspect_node(&stage(), "steam_anchor").unwrap();
        assert_eq!(info.kind, "empty");
        assert!(info.children.is_empty());
        assert!(info.world_position[1] > info.local_position[1]);
    }

    #[test]
    fn inspect_node_not_found() {
        assert!(SceneInspector::inspect_node(&stage(), "espresso_machine").is_none());
    }

    #[test]
    fn roots_include_ground_and_shop() {
        let roots = SceneInspector::roots(&stage());
        assert!(roots.iter().any(|r| r == "ground"));
        assert!(roots.iter().any(|r| r == "shop"));
    }

    #[test]
    fn summary_serializes_to_json() {
        let summary = SceneInspector::summary(&stage());
        let json = serde_json::to_value(&summary).unwrap();
        assert_eq!(json["snowflakes"], 1500);
        assert_eq!(json["lights"][0]["kind"], "ambient");
        assert!(format!("{summary}").contains("snow=1500"));
    }
}
