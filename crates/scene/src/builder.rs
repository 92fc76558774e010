use crate::geometry::Geometry;
use crate::graph::{NodeId, SceneGraph, ShadowFlags};
use crate::label::{LabelPainter, LabelSpec, TextLine};
use crate::material::{BasicMaterial, StandardMaterial};
use cafescene_common::{Color, SceneConfig, Transform};
use glam::{Quat, Vec2, Vec3};
use std::f32::consts::{FRAC_PI_2, PI, TAU};

/// Surface height of the counter top, where cups rest.
pub const COUNTER_TOP_Y: f32 = 1.35;
const COUNTER_Z: f32 = 2.6;
/// Steam leaves a cup this far above the cup's origin.
const STEAM_LIFT: f32 = 0.4;

/// The procedurally built shop plus the handles the animation layer needs.
#[derive(Debug, Clone, PartialEq)]
pub struct CafeScene {
    pub graph: SceneGraph,
    /// Root node of each cup, in left-to-right order.
    pub cup_nodes: Vec<NodeId>,
    /// World-space points steam rises from, one per cup.
    pub steam_origins: Vec<Vec3>,
}

/// Build the static shop. Pure construction: the same config and painter
/// always produce an identical graph.
pub fn build_cafe(config: &SceneConfig, painter: &LabelPainter) -> CafeScene {
    let mut graph = SceneGraph::new();

    add_ground(&mut graph, config.atmosphere.background);
    add_shop(&mut graph);
    add_counter(&mut graph);
    add_signage(&mut graph, config, painter);
    let (cup_nodes, steam_origins) = add_cups(&mut graph, config);
    add_stools(&mut graph);
    add_lamps(&mut graph);

    tracing::debug!(
        nodes = graph.len(),
        meshes = graph.mesh_count(),
        textures = graph.textures().len(),
        "built cafe scene"
    );

    CafeScene {
        graph,
        cup_nodes,
        steam_origins,
    }
}

fn at(x: f32, y: f32, z: f32) -> Transform {
    Transform::from_position(Vec3::new(x, y, z))
}

fn add_ground(graph: &mut SceneGraph, color: Color) {
    let geo = graph.add_geometry(Geometry::plane(80.0, 80.0));
    let mat = graph.add_material(StandardMaterial {
        color,
        roughness: 0.95,
        ..StandardMaterial::default()
    });
    let ground = graph.add_mesh(
        None,
        "ground",
        Transform::default().with_rotation(Quat::from_rotation_x(-FRAC_PI_2)),
        geo,
        mat,
    );
    graph.set_shadows(ground, ShadowFlags::RECEIVE);
}

fn add_shop(graph: &mut SceneGraph) {
    let shop = graph.add_group(None, "shop", Transform::default());
    let wall = graph.add_material(StandardMaterial::colored(0x1b222b, 0.85));

    let back = graph.add_geometry(Geometry::cuboid(12.0, 6.0, 0.4));
    graph.add_mesh(Some(shop), "back_wall", at(0.0, 3.0, -3.0), back, wall);
    let side = graph.add_geometry(Geometry::cuboid(0.4, 6.0, 8.0));
    graph.add_mesh(Some(shop), "left_wall", at(-5.0, 3.0, 1.0), side, wall);
    graph.add_mesh(Some(shop), "right_wall", at(5.0, 3.0, 1.0), side, wall);

    let floor = graph.add_geometry(Geometry::cuboid(9.6, 0.1, 7.6));
    let wood = graph.add_material(StandardMaterial::colored(0x3a2a22, 0.7));
    graph.add_mesh(Some(shop), "floor", at(0.0, 0.05, 1.0), floor, wood);

    let roof = graph.add_geometry(Geometry::cuboid(12.4, 0.3, 8.6));
    let roof_mat = graph.add_material(StandardMaterial::colored(0x141a22, 0.9));
    graph.add_mesh(Some(shop), "roof", at(0.0, 6.15, 1.0), roof, roof_mat);

    let trim = graph.add_group(Some(shop), "roof_trim", at(0.0, 5.95, 5.25));
    let strip = graph.add_geometry(Geometry::cuboid(6.2, 0.12, 0.12));
    let pink = graph.add_material(StandardMaterial::glowing(0xff69b4, 2.0));
    let cyan = graph.add_material(StandardMaterial::glowing(0x00ffff, 2.0));
    graph.add_mesh(Some(trim), "trim_left", at(-3.1, 0.0, 0.0), strip, pink);
    graph.add_mesh(Some(trim), "trim_right", at(3.1, 0.0, 0.0), strip, cyan);

    graph.set_shadows(shop, ShadowFlags::BOTH);
    graph.set_shadows(trim, ShadowFlags::NONE);
}

fn add_counter(graph: &mut SceneGraph) {
    let counter = graph.add_group(None, "counter", at(0.0, 0.0, COUNTER_Z));

    let top = graph.add_geometry(Geometry::cuboid(6.0, 0.3, 1.6));
    let top_mat = graph.add_material(StandardMaterial::colored(0xd6b89a, 0.3));
    graph.add_mesh(Some(counter), "counter_top", at(0.0, 1.2, 0.0), top, top_mat);

    let body = graph.add_geometry(Geometry::cuboid(6.0, 1.4, 1.6));
    let body_mat = graph.add_material(StandardMaterial::colored(0x2e1b16, 0.8));
    graph.add_mesh(Some(counter), "counter_body", at(0.0, 0.5, 0.0), body, body_mat);

    let kick = graph.add_geometry(Geometry::cuboid(6.0, 0.06, 0.04));
    let mint = graph.add_material(StandardMaterial::glowing(0x00ffa3, 1.5));
    graph.add_mesh(Some(counter), "counter_kick", at(0.0, 0.12, 0.82), kick, mint);
    graph.set_shadows(counter, ShadowFlags::BOTH);
}

fn add_signage(graph: &mut SceneGraph, config: &SceneConfig, painter: &LabelPainter) {
    let sign = &config.signage;
    let signage = graph.add_group(None, "signage", Transform::default());

    let board = graph.add_geometry(Geometry::cuboid(6.4, 1.8, 0.15));
    let board_mat = graph.add_material(StandardMaterial::colored(0x0b1426, 0.6));
    let backing = graph.add_mesh(Some(signage), "sign_backing", at(0.0, 5.5, 3.4), board, board_mat);
    graph.set_shadows(backing, ShadowFlags::CAST);

    let banner_tex = graph.add_texture(painter.paint(&LabelSpec::banner(sign)));
    let banner_geo = graph.add_geometry(Geometry::plane(6.0, 1.4));
    let banner_mat = graph.add_material(BasicMaterial {
        texture: Some(banner_tex),
        transparent: true,
        ..BasicMaterial::default()
    });
    graph.add_mesh(Some(signage), "banner", at(0.0, 5.5, 3.5), banner_geo, banner_mat);

    let open_tex = graph.add_texture(painter.render_text(
        &sign.open_text,
        140.0,
        sign.open_color,
        Color::hex(0x0b0b14),
        512,
        192,
    ));
    let open_geo = graph.add_geometry(Geometry::plane(1.2, 0.45));
    let open_mat = graph.add_material(BasicMaterial {
        texture: Some(open_tex),
        ..BasicMaterial::default()
    });
    graph.add_mesh(Some(signage), "open_sign", at(3.6, 3.4, 4.9), open_geo, open_mat);

    let line_height = 576.0 / (sign.menu_lines.len() as f32 + 1.0);
    let menu_spec = LabelSpec {
        width: 1024,
        height: 576,
        background: Color::hex(0x10161c),
        lines: sign
            .menu_lines
            .iter()
            .enumerate()
            .map(|(i, text)| TextLine {
                text: text.clone(),
                size: if i == 0 { 110.0 } else { 72.0 },
                color: if i == 0 { sign.title_color } else { Color::hex(0xf4efe6) },
                baseline: line_height * (i as f32 + 1.0) + 20.0,
            })
            .collect(),
    };
    let menu_tex = graph.add_texture(painter.paint(&menu_spec));
    let menu_geo = graph.add_geometry(Geometry::plane(3.2, 1.8));
    let menu_mat = graph.add_material(StandardMaterial {
        texture: Some(menu_tex),
        roughness: 0.8,
        ..StandardMaterial::default()
    });
    graph.add_mesh(Some(signage), "menu_board", at(0.0, 3.4, -2.78), menu_geo, menu_mat);
}

fn add_cups(graph: &mut SceneGraph, config: &SceneConfig) -> (Vec<NodeId>, Vec<Vec3>) {
    let cups_cfg = &config.cups;
    let cups = graph.add_group(None, "cups", Transform::default());

    let ceramic = graph.add_material(StandardMaterial {
        color: cups_cfg.color,
        roughness: 0.35,
        ..StandardMaterial::default()
    });
    let coffee = graph.add_material(StandardMaterial::colored(0x3b2314, 0.2));
    let saucer = graph.add_geometry(Geometry::cylinder(0.22, 0.2, 0.03));
    let body = graph.add_geometry(Geometry::cylinder(0.16, 0.12, 0.3));
    let handle = graph.add_geometry(Geometry::torus(0.07, 0.018, PI));
    let surface = graph.add_geometry(Geometry::cylinder(0.14, 0.14, 0.01));

    let mut nodes = Vec::with_capacity(cups_cfg.count);
    let mut origins = Vec::with_capacity(cups_cfg.count);
    let mid = (cups_cfg.count as f32 - 1.0) * 0.5;
    for i in 0..cups_cfg.count {
        let x = (i as f32 - mid) * cups_cfg.spacing;
        let base = Vec3::new(x, COUNTER_TOP_Y, COUNTER_Z);
        let cup = graph.add_group(Some(cups), &format!("cup_{i}"), Transform::from_position(base));
        graph.add_mesh(Some(cup), "saucer", at(0.0, 0.015, 0.0), saucer, ceramic);
        graph.add_mesh(Some(cup), "cup_body", at(0.0, 0.18, 0.0), body, ceramic);
        graph.add_mesh(
            Some(cup),
            "cup_handle",
            at(0.15, 0.18, 0.0).with_rotation(Quat::from_rotation_z(-FRAC_PI_2)),
            handle,
            ceramic,
        );
        graph.add_mesh(Some(cup), "coffee", at(0.0, 0.32, 0.0), surface, coffee);
        graph.add_empty(Some(cup), "steam_anchor", at(0.0, STEAM_LIFT, 0.0));
        nodes.push(cup);
        origins.push(base + Vec3::Y * STEAM_LIFT);
    }
    graph.set_shadows(cups, ShadowFlags::BOTH);
    (nodes, origins)
}

fn add_stools(graph: &mut SceneGraph) {
    let stools = graph.add_group(None, "stools", Transform::default());
    let seat = graph.add_geometry(Geometry::cylinder(0.32, 0.3, 0.08));
    let leg = graph.add_geometry(Geometry::cylinder(0.05, 0.05, 0.9));
    let ring = graph.add_geometry(Geometry::torus(0.18, 0.02, TAU));
    let foot = graph.add_geometry(Geometry::cylinder(0.22, 0.25, 0.04));
    let leather = graph.add_material(StandardMaterial::colored(0x8a3b2e, 0.6));
    let chrome = graph.add_material(StandardMaterial {
        color: Color::hex(0x999999),
        roughness: 0.25,
        metalness: 0.8,
        ..StandardMaterial::default()
    });

    for (i, x) in [-2.25_f32, -0.75, 0.75, 2.25].into_iter().enumerate() {
        let stool = graph.add_group(Some(stools), &format!("stool_{i}"), at(x, 0.0, 4.1));
        graph.add_mesh(Some(stool), "seat", at(0.0, 0.95, 0.0), seat, leather);
        graph.add_mesh(Some(stool), "leg", at(0.0, 0.45, 0.0), leg, chrome);
        graph.add_mesh(
            Some(stool),
            "foot_ring",
            at(0.0, 0.35, 0.0).with_rotation(Quat::from_rotation_x(FRAC_PI_2)),
            ring,
            chrome,
        );
        graph.add_mesh(Some(stool), "base", at(0.0, 0.02, 0.0), foot, chrome);
    }
    graph.set_shadows(stools, ShadowFlags::BOTH);
}

fn add_lamps(graph: &mut SceneGraph) {
    let lamps = graph.add_group(None, "lamps", Transform::default());
    let cord = graph.add_geometry(Geometry::cylinder(0.01, 0.01, 1.2));
    let shade = graph.add_geometry(Geometry::Lathe {
        profile: vec![
            Vec2::new(0.32, 0.0),
            Vec2::new(0.22, 0.12),
            Vec2::new(0.1, 0.26),
            Vec2::new(0.04, 0.3),
        ],
        segments: 24,
    });
    let bulb = graph.add_geometry(Geometry::sphere(0.08));
    let black = graph.add_material(StandardMaterial::colored(0x111111, 0.5));
    let brass = graph.add_material(StandardMaterial {
        color: Color::hex(0xb08d57),
        roughness: 0.35,
        metalness: 0.7,
        ..StandardMaterial::default()
    });
    let glow = graph.add_material(StandardMaterial::glowing(0xffe7c9, 3.0));

    for (i, x) in [-2.0_f32, 0.0, 2.0].into_iter().enumerate() {
        let lamp = graph.add_group(Some(lamps), &format!("lamp_{i}"), at(x, 6.0, COUNTER_Z));
        graph.add_mesh(Some(lamp), "cord", at(0.0, -0.6, 0.0), cord, black);
        let shade = graph.add_mesh(Some(lamp), "shade", at(0.0, -1.5, 0.0), shade, brass);
        graph.set_shadows(shade, ShadowFlags::CAST);
        graph.add_mesh(Some(lamp), "bulb", at(0.0, -1.45, 0.0), bulb, glow);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::NodeKind;

    fn scene() -> CafeScene {
        build_cafe(&SceneConfig::default(), &LabelPainter::bitmap())
    }

    #[test]
    fn builds_all_groups() {
        let cafe = scene();
        for name in ["ground", "shop", "back_wall", "counter", "signage", "banner", "cups", "stools", "lamps"] {
            assert!(cafe.graph.find(name).is_some(), "missing {name}");
        }
        assert_eq!(cafe.graph.textures().len(), 3);
    }

    #[test]
    fn cups_match_config() {
        let mut config = SceneConfig::default();
        config.cups.count = 5;
        let cafe = build_cafe(&config, &LabelPainter::bitmap());
        assert_eq!(cafe.cup_nodes.len(), 5);
        assert_eq!(cafe.steam_origins.len(), 5);
        for (node, origin) in cafe.cup_nodes.iter().zip(&cafe.steam_origins) {
            let cup = cafe.graph.node(*node).unwrap();
            assert!(matches!(cup.kind, NodeKind::Group));
            assert_eq!(cup.transform.position.y, COUNTER_TOP_Y);
            assert!(origin.y > COUNTER_TOP_Y);
        }
    }

    #[test]
    fn cups_are_centered_on_counter() {
        let cafe = scene();
        let xs: Vec<f32> = cafe
            .cup_nodes
            .iter()
            .map(|n| cafe.graph.node(*n).unwrap().transform.position.x)
            .collect();
        assert_eq!(xs, vec![-1.8, 0.0, 1.8]);
    }

    #[test]
    fn building_is_deterministic() {
        assert_eq!(scene(), scene());
    }

    #[test]
    fn every_mesh_references_valid_tables() {
        let cafe = scene();
        for (_, geometry, material, _) in cafe.graph.meshes() {
            assert!(cafe.graph.geometry(geometry).is_some());
            let mat = cafe.graph.material(material).unwrap();
            if let Some(tex) = mat.texture() {
                assert!(cafe.graph.texture(tex).is_some());
            }
        }
    }

    #[test]
    fn ground_receives_and_props_cast() {
        let cafe = scene();
        let flags = |name: &str| cafe.graph.node(cafe.graph.find(name).unwrap()).unwrap().shadows;
        assert_eq!(flags("ground"), ShadowFlags::RECEIVE);
        assert_eq!(flags("counter_top"), ShadowFlags::BOTH);
        assert_eq!(flags("seat"), ShadowFlags::BOTH);
        assert!(flags("cup_body").cast);
        assert!(!flags("banner").cast);
        assert!(!flags("bulb").cast);
        assert!(!flags("trim_left").cast);
    }

    #[test]
    fn steam_anchors_match_origins() {
        let cafe = scene();
        let world = cafe.graph.world_matrices();
        let anchors: Vec<Vec3> = cafe
            .graph
            .nodes()
            .filter(|(_, n)| n.kind == NodeKind::Empty && n.name == "steam_anchor")
            .map(|(id, _)| world[id.0 as usize].transform_point3(Vec3::ZERO))
            .collect();
        assert_eq!(anchors.len(), cafe.steam_origins.len());
        for (anchor, origin) in anchors.iter().zip(&cafe.steam_origins) {
            assert!(anchor.distance(*origin) < 1e-5);
        }
    }

    #[test]
    fn banner_sits_in_front_of_backing() {
        let cafe = scene();
        let world = cafe.graph.world_matrices();
        let z = |name: &str| {
            let id = cafe.graph.find(name).unwrap();
            world[id.0 as usize].w_axis.z
        };
        assert!(z("banner") > z("sign_backing"));
    }
}
