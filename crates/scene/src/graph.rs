use crate::geometry::Geometry;
use crate::material::Material;
use cafescene_common::Transform;
use glam::Mat4;
use image::RgbaImage;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GeometryId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MaterialId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TextureId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum NodeKind {
    /// Transform-only node that owns children.
    Group,
    Mesh {
        geometry: GeometryId,
        material: MaterialId,
    },
    /// A named point in space with no content and no children.
    Empty,
}

/// Whether a mesh occludes the directional light and whether it is
/// darkened by other occluders. Both default to off.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ShadowFlags {
    pub cast: bool,
    pub receive: bool,
}

impl ShadowFlags {
    pub const NONE: Self = Self { cast: false, receive: false };
    pub const CAST: Self = Self { cast: true, receive: false };
    pub const RECEIVE: Self = Self { cast: false, receive: true };
    pub const BOTH: Self = Self { cast: true, receive: true };
}

#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub name: String,
    pub transform: Transform,
    pub kind: NodeKind,
    pub shadows: ShadowFlags,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
}

impl Node {
    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    pub fn children(&self) -> &[NodeId] {
        &self.children
    }
}

/// Arena-backed node hierarchy plus the geometry, material and texture tables
/// its meshes refer to.
///
/// A node is always inserted after its parent, so ids are a valid
/// parent-before-child traversal order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SceneGraph {
    nodes: Vec<Node>,
    roots: Vec<NodeId>,
    geometries: Vec<Geometry>,
    materials: Vec<Material>,
    textures: Vec<RgbaImage>,
}

impl SceneGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_geometry(&mut self, geometry: Geometry) -> GeometryId {
        self.geometries.push(geometry);
        GeometryId(self.geometries.len() as u32 - 1)
    }

    pub fn add_material(&mut self, material: impl Into<Material>) -> MaterialId {
        self.materials.push(material.into());
        MaterialId(self.materials.len() as u32 - 1)
    }

    pub fn add_texture(&mut self, image: RgbaImage) -> TextureId {
        self.textures.push(image);
        TextureId(self.textures.len() as u32 - 1)
    }

    /// Add a group under `parent`, or as a root when `parent` is `None`.
    pub fn add_group(&mut self, parent: Option<NodeId>, name: &str, transform: Transform) -> NodeId {
        self.insert(parent, name, transform, NodeKind::Group)
    }

    pub fn add_mesh(
        &mut self,
        parent: Option<NodeId>,
        name: &str,
        transform: Transform,
        geometry: GeometryId,
        material: MaterialId,
    ) -> NodeId {
        self.insert(parent, name, transform, NodeKind::Mesh { geometry, material })
    }

    /// Add an empty anchor node.
    pub fn add_empty(&mut self, parent: Option<NodeId>, name: &str, transform: Transform) -> NodeId {
        self.insert(parent, name, transform, NodeKind::Empty)
    }

    fn insert(&mut self, parent: Option<NodeId>, name: &str, transform: Transform, kind: NodeKind) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        match parent {
            Some(p) => {
                let parent_node = &mut self.nodes[p.0 as usize];
                debug_assert!(
                    matches!(parent_node.kind, NodeKind::Group),
                    "only groups own children"
                );
                parent_node.children.push(id);
            }
            None => self.roots.push(id),
        }
        self.nodes.push(Node {
            name: name.to_string(),
            transform,
            kind,
            shadows: ShadowFlags::NONE,
            parent,
            children: Vec::new(),
        });
        id
    }

    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id.0 as usize)
    }

    pub fn transform_mut(&mut self, id: NodeId) -> Option<&mut Transform> {
        self.nodes.get_mut(id.0 as usize).map(|n| &mut n.transform)
    }

    /// Set the shadow flags of `id` and every node below it.
    pub fn set_shadows(&mut self, id: NodeId, flags: ShadowFlags) {
        let mut stack = vec![id];
        while let Some(next) = stack.pop() {
            let Some(node) = self.nodes.get_mut(next.0 as usize) else {
                continue;
            };
            node.shadows = flags;
            stack.extend_from_slice(&node.children);
        }
    }

    /// First node with the given name, in insertion order.
    pub fn find(&self, name: &str) -> Option<NodeId> {
        self.nodes
            .iter()
            .position(|n| n.name == name)
            .map(|i| NodeId(i as u32))
    }

    pub fn roots(&self) -> &[NodeId] {
        &self.roots
    }

    pub fn nodes(&self) -> impl Iterator<Item = (NodeId, &Node)> {
        self.nodes.iter().enumerate().map(|(i, n)| (NodeId(i as u32), n))
    }

    pub fn geometry(&self, id: GeometryId) -> Option<&Geometry> {
        self.geometries.get(id.0 as usize)
    }

    pub fn geometries(&self) -> &[Geometry] {
        &self.geometries
    }

    pub fn material(&self, id: MaterialId) -> Option<&Material> {
        self.materials.get(id.0 as usize)
    }

    pub fn materials(&self) -> &[Material] {
        &self.materials
    }

    pub fn texture(&self, id: TextureId) -> Option<&RgbaImage> {
        self.textures.get(id.0 as usize)
    }

    pub fn textures(&self) -> &[RgbaImage] {
        &self.textures
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn mesh_count(&self) -> usize {
        self.nodes
            .iter()
            .filter(|n| matches!(n.kind, NodeKind::Mesh { .. }))
            .count()
    }

    pub fn group_count(&self) -> usize {
        self.nodes
            .iter()
            .filter(|n| matches!(n.kind, NodeKind::Group))
            .count()
    }

    /// Number of nodes in the subtree rooted at `id`, including `id`.
    pub fn subtree_len(&self, id: NodeId) -> usize {
        self.node(id)
            .map(|n| 1 + n.children.iter().map(|c| self.subtree_len(*c)).sum::<usize>())
            .unwrap_or(0)
    }

    /// World matrix for every node, indexed by `NodeId`.
    pub fn world_matrices(&self) -> Vec<Mat4> {
        let mut world: Vec<Mat4> = Vec::with_capacity(self.nodes.len());
        for node in &self.nodes {
            let local = node.transform.matrix();
            let m = match node.parent {
                Some(p) => world[p.0 as usize] * local,
                None => local,
            };
            world.push(m);
        }
        world
    }

    /// Every mesh node with its world matrix.
    pub fn meshes(&self) -> Vec<(NodeId, GeometryId, MaterialId, Mat4)> {
        let world = self.world_matrices();
        self.nodes()
            .filter_map(|(id, node)| match node.kind {
                NodeKind::Mesh { geometry, material } => {
                    Some((id, geometry, material, world[id.0 as usize]))
                }
                NodeKind::Group | NodeKind::Empty => None,
            })
            .collect()
    }
}
