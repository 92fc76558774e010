use cafescene_common::{Color, ShadowConfig};
use cafescene_kernel::{LightKind, Sprite, Stage, MAX_LIGHTS};
use cafescene_scene::{GeometryId, MaterialId, NodeId, ShadowFlags, TextureId};
use glam::{Mat4, Vec3};

/// Camera matrices for one frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RenderView {
    pub eye: Vec3,
    pub target: Vec3,
    pub view: Mat4,
    pub projection: Mat4,
}

impl RenderView {
    pub fn view_projection(&self) -> Mat4 {
        self.projection * self.view
    }

    /// Distance along the view direction, used to sort blended draws.
    pub fn depth(&self, point: Vec3) -> f32 {
        -self.view.transform_point3(point).z
    }
}

/// One mesh node to rasterize.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MeshDraw {
    pub node: NodeId,
    pub geometry: GeometryId,
    pub material: MaterialId,
    pub texture: Option<TextureId>,
    pub model: Mat4,
    pub transparent: bool,
    pub shadows: ShadowFlags,
}

/// Orthographic view of the shadow volume from the directional light.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ShadowView {
    /// World to light clip space; depth runs 0 (near the light) to 1.
    pub view_proj: Mat4,
    pub map_size: u32,
    pub depth_bias: f32,
}

impl ShadowView {
    /// Box of side `2 * half_extent` around the configured center, seen
    /// along `direction` from twice the half extent away.
    pub fn directional(direction: Vec3, config: &ShadowConfig) -> Self {
        let h = config.half_extent;
        let direction = direction.try_normalize().unwrap_or(Vec3::NEG_Y);
        let eye = config.center - direction * h * 2.0;
        let up = if direction.y.abs() > 0.99 { Vec3::Z } else { Vec3::Y };
        let view = Mat4::look_at_rh(eye, config.center, up);
        let projection = Mat4::orthographic_rh(-h, h, -h, h, 0.0, h * 4.0);
        Self {
            view_proj: projection * view,
            map_size: config.map_size,
            depth_bias: config.depth_bias,
        }
    }

    /// Light clip-space position of a world point.
    pub fn project(&self, point: Vec3) -> Vec3 {
        self.view_proj.project_point3(point)
    }
}

/// A light as the shading pass sees it: radiance already scaled by the
/// current intensity, in linear space.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LightSample {
    Directional { direction: Vec3, radiance: [f32; 3] },
    Point { position: Vec3, range: f32, radiance: [f32; 3] },
}

/// Everything one render pass needs, extracted from a [`Stage`].
///
/// Opaque draws keep graph order; transparent draws and sprites are sorted
/// back to front.
#[derive(Debug, Clone, PartialEq)]
pub struct DrawList {
    pub view: RenderView,
    pub opaque: Vec<MeshDraw>,
    pub transparent: Vec<MeshDraw>,
    pub sprites: Vec<Sprite>,
    pub lights: Vec<LightSample>,
    /// Present when shadows are enabled and a directional light casts.
    pub shadow: Option<ShadowView>,
    pub ambient: [f32; 3],
    pub background: Color,
    pub fog_color: Color,
    pub fog_density: f32,
}

impl DrawList {
    pub fn collect(stage: &Stage) -> Self {
        let camera = &stage.camera;
        let view = RenderView {
            eye: camera.eye(),
            target: camera.target(),
            view: camera.view_matrix(),
            projection: camera.projection().matrix(),
        };

        let mut opaque = Vec::new();
        let mut transparent = Vec::new();
        for (node, geometry, material, model) in stage.graph.meshes() {
            let Some(m) = stage.graph.material(material) else {
                continue;
            };
            let shadows = stage
                .graph
                .node(node)
                .map(|n| n.shadows)
                .unwrap_or_default();
            let draw = MeshDraw {
                node,
                geometry,
                material,
                texture: m.texture(),
                model,
                transparent: m.is_transparent(),
                shadows,
            };
            if draw.transparent {
                transparent.push(draw);
            } else {
                opaque.push(draw);
            }
        }
        transparent.sort_by(|a, b| {
            let da = view.depth(a.model.transform_point3(Vec3::ZERO));
            let db = view.depth(b.model.transform_point3(Vec3::ZERO));
            db.total_cmp(&da)
        });

        let mut sprites: Vec<Sprite> = stage.dynamics.sprites().collect();
        sprites.sort_by(|a, b| view.depth(b.position).total_cmp(&view.depth(a.position)));

        let lights = stage
            .lights
            .lights()
            .iter()
            .filter_map(|light| match light.kind {
                LightKind::Ambient => None,
                LightKind::Directional { direction } => Some(LightSample::Directional {
                    direction,
                    radiance: light.radiance(),
                }),
                LightKind::Point { position, range } => Some(LightSample::Point {
                    position,
                    range,
                    radiance: light.radiance(),
                }),
            })
            .take(MAX_LIGHTS)
            .collect();

        let shadow = stage
            .lights
            .shadow_caster()
            .filter(|_| stage.shadows.enabled)
            .map(|direction| ShadowView::directional(direction, &stage.shadows));

        tracing::trace!(
            opaque = opaque.len(),
            transparent = transparent.len(),
            sprites = sprites.len(),
            "draw list collected"
        );

        Self {
            view,
            opaque,
            transparent,
            sprites,
            lights,
            shadow,
            ambient: stage.lights.ambient(),
            background: stage.atmosphere.background,
            fog_color: stage.atmosphere.fog_color,
            fog_density: stage.atmosphere.fog_density,
        }
    }

    pub fn mesh_count(&self) -> usize {
        self.opaque.len() + self.transparent.len()
    }

    /// Opaque draws that occlude the directional light.
    pub fn shadow_casters(&self) -> impl Iterator<Item = &MeshDraw> {
        self.opaque.iter().filter(|d| d.shadows.cast)
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
    fn collects_every_mesh_once() {
        let stage = stage();
        let list = DrawList::collect(&stage);
        assert_eq!(list.mesh_count(), stage.graph.mesh_count());
        assert_eq!(list.sprites.len(), stage.dynamics.sprite_count());
        assert!(list.transparent.iter().all(|d| d.transparent));
        assert!(list.opaque.iter().all(|d| !d.transparent));
    }

    #[test]
    fn banner_is_a_textured_transparent_draw() {
        let stage = stage();
        let banner = stage.graph.find("banner").unwrap();
        let list = DrawList::collect(&stage);
        let draw = list.transparent.iter().find(|d| d.node == banner).unwrap();
        assert!(draw.texture.is_some());
    }

    #[test]
    fn sprites_are_sorted_back_to_front() {
        let list = DrawList::collect(&stage());
        let depths: Vec<f32> = list.sprites.iter().map(|s| list.view.depth(s.position)).collect();
        assert!(depths.windows(2).all(|w| w[0] >= w[1]));
    }

    #[test]
    fn lights_and_atmosphere_follow_the_stage() {
        let mut stage = stage();
        stage.advance(0.5);
        let list = DrawList::collect(&stage);
        // Ambient folds into one term; the rest are sampled individually.
        assert_eq!(list.lights.len(), stage.lights.len() - 1);
        assert!(list.ambient.iter().all(|&c| c > 0.0));
        assert_eq!(list.background.to_hex(), 0x071028);
        assert_eq!(list.fog_density, 0.012);
    }

    #[test]
    fn shadow_view_covers_the_shop() {
        let stage = stage();
        let list = DrawList::collect(&stage);
        let shadow = list.shadow.unwrap();
        assert_eq!(shadow.map_size, 2048);

        let center = shadow.project(stage.shadows.center);
        assert!(center.x.abs() < 1e-4 && center.y.abs() < 1e-4);
        assert!((center.z - 0.5).abs() < 1e-4);

        for draw in list.shadow_casters() {
            let p = shadow.project(draw.model.transform_point3(Vec3::ZERO));
            assert!(p.x.abs() <= 1.0 && p.y.abs() <= 1.0, "{:?} outside", draw.node);
            assert!((0.0..=1.0).contains(&p.z));
        }
    }

    #[test]
    fn occluder_is_nearer_the_light_than_its_shadow() {
        let stage = stage();
        let shadow = DrawList::collect(&stage).shadow.unwrap();
        let direction = stage.lights.shadow_caster().unwrap();
        let top = Vec3::new(0.0, 1.35, 2.6);
        let below = top + direction * (top.y / -direction.y);
        let (a, b) = (shadow.project(top), shadow.project(below));
        assert!((a.x - b.x).abs() < 1e-4 && (a.y - b.y).abs() < 1e-4);
        assert!(a.z < b.z);
    }

    #[test]
    fn casters_and_receivers_are_flagged() {
        let stage = stage();
        let list = DrawList::collect(&stage);
        let ground = stage.graph.find("ground").unwrap();
        let draw = list.opaque.iter().find(|d| d.node == ground).unwrap();
        assert!(draw.shadows.receive && !draw.shadows.cast);
        assert!(list.shadow_casters().all(|d| !d.transparent));
        assert!(list.shadow_casters().count() > 20);
    }

    #[test]
    fn disabled_shadows_leave_no_view() {
        let mut config = SceneConfig::default();
        config.shadows.enabled = false;
        let list = DrawList::collect(&Stage::new(&config, &LabelPainter::bitmap()));
        assert!(list.shadow.is_none());

        let mut config = SceneConfig::default();
        config.lighting.directional.cast_shadow = false;
        let list = DrawList::collect(&Stage::new(&config, &LabelPainter::bitmap()));
        assert!(list.shadow.is_none());
    }

    #[test]
    fn view_depth_is_positive_in_front_of_camera() {
        let list = DrawList::collect(&stage());
        assert!(list.view.depth(list.view.target) > 0.0);
        assert!(list.view.depth(list.view.eye).abs() < 1e-3);
    }
}
