use crate::AssetError;
use cafescene_common::{Color, ModelConfig, Transform};
use cafescene_scene::{Geometry, MeshData, NodeId, SceneGraph, StandardMaterial};
use glam::{Mat4, Vec3};
use image::RgbaImage;
use std::path::{Path, PathBuf};

/// One triangle primitive of the imported file, already placed in model space.
#[derive(Debug, Clone, PartialEq)]
pub struct ImportedMesh {
    pub name: String,
    pub mesh: MeshData,
    pub material: StandardMaterial,
    /// Base color texture, an index into [`ImportedModel::textures`].
    pub texture: Option<usize>,
    pub transform: Mat4,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct ImportedModel {
    pub meshes: Vec<ImportedMesh>,
    pub textures: Vec<RgbaImage>,
}

impl ImportedModel {
    pub fn triangle_count(&self) -> usize {
        self.meshes.iter().map(|m| m.mesh.triangle_count()).sum()
    }

    /// Model-space bounds over every mesh.
    pub fn bounds(&self) -> Option<(Vec3, Vec3)> {
        self.meshes
            .iter()
            .filter_map(|m| {
                let (lo, hi) = m.mesh.bounds()?;
                let a = m.transform.transform_point3(lo);
                let b = m.transform.transform_point3(hi);
                Some((a.min(b), a.max(b)))
            })
            .reduce(|(lo, hi), (a, b)| (lo.min(a), hi.max(b)))
    }

    /// Insert the model as a `model` group under the scene root. Textures
    /// join the graph's table and are bound to the materials that use them.
    pub fn attach(&self, graph: &mut SceneGraph, transform: Transform) -> NodeId {
        let textures: Vec<_> = self.textures.iter().map(|t| graph.add_texture(t.clone())).collect();
        let root = graph.add_group(None, "model", transform);
        for mesh in &self.meshes {
            let geometry = graph.add_geometry(Geometry::Mesh(mesh.mesh.clone()));
            let material = graph.add_material(StandardMaterial {
                texture: mesh.texture.and_then(|i| textures.get(i).copied()),
                ..mesh.material.clone()
            });
            let (scale, rotation, position) = mesh.transform.to_scale_rotation_translation();
            graph.add_mesh(
                Some(root),
                &mesh.name,
                Transform {
                    position,
                    rotation,
                    scale,
                },
                geometry,
                material,
            );
        }
        root
    }
}

/// Placement of the imported model in the shop.
pub fn model_transform(config: &ModelConfig) -> Transform {
    Transform::from_position(config.position).with_scale(Vec3::splat(config.scale))
}

/// Import every triangle primitive of a glTF or GLB file.
pub fn load_model(path: impl AsRef<Path>) -> Result<ImportedModel, AssetError> {
    let path = path.as_ref();
    std::fs::metadata(path).map_err(|source| AssetError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let (document, buffers, images) = gltf::import(path)?;
    let model = import_document(&document, &buffers, &images);
    finish(model, path.to_path_buf())
}

/// Import from an in-memory file. External buffers are not resolved.
pub fn load_model_from_slice(bytes: &[u8]) -> Result<ImportedModel, AssetError> {
    let (document, buffers, images) = gltf::import_slice(bytes)?;
    finish(import_document(&document, &buffers, &images), PathBuf::from("<memory>"))
}

fn finish(model: ImportedModel, path: PathBuf) -> Result<ImportedModel, AssetError> {
    if model.meshes.is_empty() {
        return Err(AssetError::NoTriangles { path });
    }
    tracing::debug!(
        path = %path.display(),
        meshes = model.meshes.len(),
        triangles = model.triangle_count(),
        textures = model.textures.len(),
        "imported model"
    );
    Ok(model)
}

/// Texture slots of the document: glTF image index to [`ImportedModel::textures`] index.
struct TextureTable {
    slots: Vec<Option<usize>>,
}

impl TextureTable {
    fn texture_for(&self, material: &gltf::Material) -> Option<usize> {
        let info = material.pbr_metallic_roughness().base_color_texture()?;
        let image = info.texture().source().index();
        self.slots.get(image).copied().flatten()
    }
}

fn import_document(
    document: &gltf::Document,
    buffers: &[gltf::buffer::Data],
    images: &[gltf::image::Data],
) -> ImportedModel {
    let mut model = ImportedModel::default();
    let Some(scene) = document.default_scene().or_else(|| document.scenes().next()) else {
        return model;
    };
    let mut slots = Vec::with_capacity(images.len());
    for data in images {
        slots.push(to_rgba(data).map(|image| {
            model.textures.push(image);
            model.textures.len() - 1
        }));
    }
    let table = TextureTable { slots };
    for node in scene.nodes() {
        visit_node(&node, Mat4::IDENTITY, buffers, &table, &mut model);
    }
    model
}

/// Expand 8-bit image data to RGBA. Wider formats are skipped.
fn to_rgba(data: &gltf::image::Data) -> Option<RgbaImage> {
    use gltf::image::Format;
    let pixels: Vec<u8> = match data.format {
        Format::R8G8B8A8 => data.pixels.clone(),
        Format::R8G8B8 => data
            .pixels
            .chunks_exact(3)
            .flat_map(|p| [p[0], p[1], p[2], 255])
            .collect(),
        Format::R8G8 => data
            .pixels
            .chunks_exact(2)
            .flat_map(|p| [p[0], p[0], p[0], p[1]])
            .collect(),
        Format::R8 => data.pixels.iter().flat_map(|&v| [v, v, v, 255]).collect(),
        other => {
            tracing::debug!(format = ?other, "skipping texture with unsupported pixel format");
            return None;
        }
    };
    RgbaImage::from_raw(data.width, data.height, pixels)
}

fn visit_node(
    node: &gltf::Node,
    parent: Mat4,
    buffers: &[gltf::buffer::Data],
    textures: &TextureTable,
    model: &mut ImportedModel,
) {
    let world = parent * Mat4::from_cols_array_2d(&node.transform().matrix());
    if let Some(mesh) = node.mesh() {
        let base = mesh.name().or(node.name()).unwrap_or("mesh");
        for (i, primitive) in mesh.primitives().enumerate() {
            if primitive.mode() != gltf::mesh::Mode::Triangles {
                tracing::debug!(mode = ?primitive.mode(), "skipping non-triangle primitive");
                continue;
            }
            let Some(data) = read_primitive(&primitive, buffers) else {
                continue;
            };
            let material = primitive.material();
            model.meshes.push(ImportedMesh {
                name: format!("{base}_{i}"),
                mesh: data,
                material: read_material(&material),
                texture: textures.texture_for(&material),
                transform: world,
            });
        }
    }
    for child in node.children() {
        visit_node(&child, world, buffers, textures, model);
    }
}

fn read_primitive(primitive: &gltf::Primitive, buffers: &[gltf::buffer::Data]) -> Option<MeshData> {
    let reader = primitive.reader(|buffer| buffers.get(buffer.index()).map(|d| &d.0[..]));
    let positions: Vec<[f32; 3]> = reader.read_positions()?.collect();
    let indices: Vec<u32> = match reader.read_indices() {
        Some(indices) => indices.into_u32().collect(),
        None => (0..positions.len() as u32).collect(),
    };
    if indices.len() < 3 || indices.iter().any(|&i| i as usize >= positions.len()) {
        return None;
    }
    let normals = match reader.read_normals() {
        Some(normals) => normals.collect(),
        None => vertex_normals(&positions, &indices),
    };
    let uvs = match reader.read_tex_coords(0) {
        Some(uvs) => uvs.into_f32().collect(),
        None => vec![[0.0, 0.0]; positions.len()],
    };
    Some(MeshData {
        positions,
        normals,
        uvs,
        indices,
    })
}

/// Area-weighted vertex normals for primitives that ship without them.
fn vertex_normals(positions: &[[f32; 3]], indices: &[u32]) -> Vec<[f32; 3]> {
    let mut sums = vec![Vec3::ZERO; positions.len()];
    for tri in indices.chunks_exact(3) {
        let [a, b, c] = [tri[0], tri[1], tri[2]].map(|i| Vec3::from_array(positions[i as usize]));
        let n = (b - a).cross(c - a);
        for &i in tri {
            sums[i as usize] += n;
        }
    }
    sums.into_iter()
        .map(|n| n.try_normalize().unwrap_or(Vec3::Y).to_array())
        .collect()
}

fn read_material(material: &gltf::Material) -> StandardMaterial {
    let pbr = material.pbr_metallic_roughness();
    let [r, g, b, a] = pbr.base_color_factor();
    let emissive = material.emissive_factor();
    let glowing = emissive.iter().any(|&c| c > 0.0);
    StandardMaterial {
        color: Color::from_linear([r, g, b]),
        roughness: pbr.roughness_factor(),
        metalness: pbr.metallic_factor(),
        emissive: Color::from_linear(emissive),
        emissive_intensity: if glowing { 1.0 } else { 0.0 },
        opacity: a,
        texture: None,
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use cafescene_common::SceneConfig;
    use cafescene_scene::{build_cafe, LabelPainter, NodeKind};
    use std::io::Write;

    /// One triangle with a red material, buffer embedded as a data URI.
    pub(crate) const TRIANGLE: &str = r#"{
        "asset": { "version": "2.0" },
        "scene": 0,
        "scenes": [{ "nodes": [0] }],
        "nodes": [{ "mesh": 0, "translation": [0.0, 2.0, 0.0] }],
        "meshes": [{
            "name": "tri",
            "primitives": [{ "attributes": { "POSITION": 0 }, "indices": 1, "material": 0 }]
        }],
        "materials": [{
            "pbrMetallicRoughness": {
                "baseColorFactor": [1.0, 0.0, 0.0, 1.0],
                "metallicFactor": 0.0,
                "roughnessFactor": 0.5
            }
        }],
        "buffers": [{
            "byteLength": 44,
            "uri": "data:application/octet-stream;base64,AAAAAAAAAAAAAAAAAACAPwAAAAAAAAAAAAAAAAAAgD8AAAAAAAABAAIAAAA="
        }],
        "bufferViews": [
            { "buffer": 0, "byteOffset": 0, "byteLength": 36 },
            { "buffer": 0, "byteOffset": 36, "byteLength": 6 }
        ],
        "accessors": [
            { "bufferView": 0, "componentType": 5126, "count": 3, "type": "VEC3",
              "min": [0.0, 0.0, 0.0], "max": [1.0, 1.0, 0.0] },
            { "bufferView": 1, "componentType": 5123, "count": 3, "type": "SCALAR" }
        ]
    }"#;

    #[test]
    fn imports_triangle_with_material() {
        let model = load_model_from_slice(TRIANGLE.as_bytes()).unwrap();
        assert_eq!(model.meshes.len(), 1);
        assert_eq!(model.triangle_count(), 1);
        let mesh = &model.meshes[0];
        assert_eq!(mesh.name, "tri_0");
        assert_eq!(mesh.mesh.normals.len(), 3);
        assert!((mesh.mesh.normals[0][2] - 1.0).abs() < 1e-5);
        assert_eq!(mesh.material.color.to_hex(), 0xff0000);
        assert_eq!(mesh.material.roughness, 0.5);
        let (lo, hi) = model.bounds().unwrap();
        assert_eq!(lo.y, 2.0);
        assert_eq!(hi.y, 3.0);
    }

    /// The triangle again, with a 2x1 PNG (red, half-transparent blue) as
    /// its base color texture, stored in the same buffer.
    const TEXTURED: &str = r#"{
        "asset": { "version": "2.0" },
        "scene": 0,
        "scenes": [{ "nodes": [0] }],
        "nodes": [{ "mesh": 0 }],
        "meshes": [{
            "name": "tri",
            "primitives": [{ "attributes": { "POSITION": 0 }, "indices": 1, "material": 0 }]
        }],
        "materials": [{
            "pbrMetallicRoughness": { "baseColorTexture": { "index": 0 } }
        }],
        "textures": [{ "source": 0 }],
        "images": [{ "bufferView": 2, "mimeType": "image/png" }],
        "buffers": [{
            "byteLength": 115,
            "uri": "data:application/octet-stream;base64,AAAAAAAAAAAAAAAAAACAPwAAAAAAAAAAAAAAAAAAgD8AAAAAAAABAAIAAACJUE5HDQoaCgAAAA1JSERSAAAAAgAAAAEIBgAAAPQif4oAAAAOSURBVHicY/jPwABCDQAPegN+d+l/lwAAAABJRU5ErkJggg=="
        }],
        "bufferViews": [
            { "buffer": 0, "byteOffset": 0, "byteLength": 36 },
            { "buffer": 0, "byteOffset": 36, "byteLength": 6 },
            { "buffer": 0, "byteOffset": 44, "byteLength": 71 }
        ],
        "accessors": [
            { "bufferView": 0, "componentType": 5126, "count": 3, "type": "VEC3",
              "min": [0.0, 0.0, 0.0], "max": [1.0, 1.0, 0.0] },
            { "bufferView": 1, "componentType": 5123, "count": 3, "type": "SCALAR" }
        ]
    }"#;

    #[test]
    fn base_color_texture_is_imported() {
        let model = load_model_from_slice(TEXTURED.as_bytes()).unwrap();
        assert_eq!(model.textures.len(), 1);
        assert_eq!(model.meshes[0].texture, Some(0));
        let image = &model.textures[0];
        assert_eq!(image.dimensions(), (2, 1));
        assert_eq!(image.get_pixel(0, 0).0, [255, 0, 0, 255]);
        assert_eq!(image.get_pixel(1, 0).0, [0, 0, 255, 128]);

        let plain = load_model_from_slice(TRIANGLE.as_bytes()).unwrap();
        assert!(plain.textures.is_empty());
        assert_eq!(plain.meshes[0].texture, None);
    }

    #[test]
    fn attached_material_samples_the_model_texture() {
        let model = load_model_from_slice(TEXTURED.as_bytes()).unwrap();
        let mut graph = build_cafe(&SceneConfig::default(), &LabelPainter::bitmap()).graph;
        let before = graph.textures().len();
        let root = model.attach(&mut graph, Transform::default());
        assert_eq!(graph.textures().len(), before + 1);

        let child = graph.node(root).unwrap().children()[0];
        let NodeKind::Mesh { material, .. } = graph.node(child).unwrap().kind else {
            panic!("model child is not a mesh");
        };
        let texture = graph.material(material).unwrap().texture().unwrap();
        assert_eq!(graph.texture(texture), Some(&model.textures[0]));
    }

    #[test]
    fn attach_adds_model_group() {
        let model = load_model_from_slice(TRIANGLE.as_bytes()).unwrap();
        let mut graph = SceneGraph::new();
        let root = model.attach(&mut graph, model_transform(&ModelConfig::default()));
        assert_eq!(graph.find("model"), Some(root));
        assert_eq!(graph.subtree_len(root), 2);
        let child = graph.node(root).unwrap().children()[0];
        let node = graph.node(child).unwrap();
        assert!(matches!(node.kind, NodeKind::Mesh { .. }));
        assert_eq!(node.transform.position, Vec3::new(0.0, 2.0, 0.0));
    }

    #[test]
    fn missing_model_is_not_found_and_scene_survives() {
        let err = load_model("definitely/not/here/tomcat.glb").unwrap_err();
        assert!(err.is_not_found());

        let cafe = build_cafe(&SceneConfig::default(), &LabelPainter::bitmap());
        for name in ["back_wall", "left_wall", "right_wall", "counter", "signage", "banner"] {
            assert!(cafe.graph.find(name).is_some(), "missing {name}");
        }
    }

    #[test]
    fn malformed_file_is_a_gltf_error() {
        let mut file = tempfile::Builder::new().suffix(".glb").tempfile().unwrap();
        file.write_all(b"not a model at all").unwrap();
        let err = load_model(file.path()).unwrap_err();
        assert!(!err.is_not_found());
        assert!(matches!(err, AssetError::Gltf(_)));
    }

    #[test]
    fn document_without_meshes_has_no_triangles() {
        let empty = r#"{ "asset": { "version": "2.0" }, "scenes": [{ "nodes": [] }] }"#;
        let err = load_model_from_slice(empty.as_bytes()).unwrap_err();
        assert!(matches!(err, AssetError::NoTriangles { .. }));
    }
}
