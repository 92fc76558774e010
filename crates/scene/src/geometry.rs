use glam::{Vec2, Vec3};
use std::f32::consts::{PI, TAU};

/// Triangle mesh in the layout every renderer consumes.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MeshData {
    pub positions: Vec<[f32; 3]>,
    pub normals: Vec<[f32; 3]>,
    pub uvs: Vec<[f32; 2]>,
    pub indices: Vec<u32>,
}

impl MeshData {
    pub fn vertex_count(&self) -> usize {
        self.positions.len()
    }

    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }

    /// Axis-aligned bounds, or `None` for an empty mesh.
    pub fn bounds(&self) -> Option<(Vec3, Vec3)> {
        let mut it = self.positions.iter().map(|p| Vec3::from_array(*p));
        let first = it.next()?;
        Some(it.fold((first, first), |(lo, hi), p| (lo.min(p), hi.max(p))))
    }

    fn push(&mut self, position: Vec3, normal: Vec3, uv: Vec2) -> u32 {
        let index = self.positions.len() as u32;
        self.positions.push(position.to_array());
        self.normals.push(normal.to_array());
        self.uvs.push(uv.to_array());
        index
    }
}

/// Procedural shape descriptions. All shapes are centered on their local origin.
#[derive(Debug, Clone, PartialEq)]
pub enum Geometry {
    /// Axis-aligned box with the given full extents.
    Box { width: f32, height: f32, depth: f32 },
    /// Rectangle in the XY plane facing +Z.
    Plane { width: f32, height: f32 },
    /// Y-aligned cylinder or truncated cone.
    Cylinder {
        radius_top: f32,
        radius_bottom: f32,
        height: f32,
        segments: u32,
    },
    Sphere {
        radius: f32,
        width_segments: u32,
        height_segments: u32,
    },
    /// Ring in the XY plane; `arc` below TAU leaves it open.
    Torus {
        radius: f32,
        tube: f32,
        radial_segments: u32,
        tubular_segments: u32,
        arc: f32,
    },
    /// Profile of (radius, height) points revolved around +Y.
    Lathe { profile: Vec<Vec2>, segments: u32 },
    /// Pre-built triangles, e.g. from an imported model.
    Mesh(MeshData),
}

impl Geometry {
    pub fn cuboid(width: f32, height: f32, depth: f32) -> Self {
        Geometry::Box {
            width,
            height,
            depth,
        }
    }

    pub fn plane(width: f32, height: f32) -> Self {
        Geometry::Plane { width, height }
    }

    pub fn cylinder(radius_top: f32, radius_bottom: f32, height: f32) -> Self {
        Geometry::Cylinder {
            radius_top,
            radius_bottom,
            height,
            segments: 24,
        }
    }

    pub fn sphere(radius: f32) -> Self {
        Geometry::Sphere {
            radius,
            width_segments: 16,
            height_segments: 12,
        }
    }

    pub fn torus(radius: f32, tube: f32, arc: f32) -> Self {
        Geometry::Torus {
            radius,
            tube,
            radial_segments: 10,
            tubular_segments: 24,
            arc,
        }
    }

    pub fn tessellate(&self) -> MeshData {
        match self {
            Geometry::Box {
                width,
                height,
                depth,
            } => box_mesh(Vec3::new(*width, *height, *depth) * 0.5),
            Geometry::Plane { width, height } => plane_mesh(*width, *height),
            Geometry::Cylinder {
                radius_top,
                radius_bottom,
                height,
                segments,
            } => cylinder_mesh(*radius_top, *radius_bottom, *height, (*segments).max(3)),
            Geometry::Sphere {
                radius,
                width_segments,
                height_segments,
            } => sphere_mesh(*radius, (*width_segments).max(3), (*height_segments).max(2)),
            Geometry::Torus {
                radius,
                tube,
                radial_segments,
                tubular_segments,
                arc,
            } => torus_mesh(
                *radius,
                *tube,
                (*radial_segments).max(3),
                (*tubular_segments).max(3),
                *arc,
            ),
            Geometry::Lathe { profile, segments } => lathe_mesh(profile, (*segments).max(3)),
            Geometry::Mesh(mesh) => mesh.clone(),
        }
    }
}

fn box_mesh(h: Vec3) -> MeshData {
    // (normal, u axis, v axis) per face; u x v == normal keeps faces counter-clockwise.
    let faces = [
        (Vec3::Z, Vec3::X, Vec3::Y),
        (Vec3::NEG_Z, Vec3::NEG_X, Vec3::Y),
        (Vec3::X, Vec3::NEG_Z, Vec3::Y),
        (Vec3::NEG_X, Vec3::Z, Vec3::Y),
        (Vec3::Y, Vec3::X, Vec3::NEG_Z),
        (Vec3::NEG_Y, Vec3::X, Vec3::Z),
    ];
    let mut mesh = MeshData::default();
    for (n, u, v) in faces {
        let center = n * h;
        let du = u * h;
        let dv = v * h;
        let a = mesh.push(center - du - dv, n, Vec2::new(0.0, 1.0));
        let b = mesh.push(center + du - dv, n, Vec2::new(1.0, 1.0));
        let c = mesh.push(center + du + dv, n, Vec2::new(1.0, 0.0));
        let d = mesh.push(center - du + dv, n, Vec2::new(0.0, 0.0));
        mesh.indices.extend_from_slice(&[a, b, c, c, d, a]);
    }
    mesh
}

fn plane_mesh(width: f32, height: f32) -> MeshData {
    let (x, y) = (width * 0.5, height * 0.5);
    let mut mesh = MeshData::default();
    let a = mesh.push(Vec3::new(-x, -y, 0.0), Vec3::Z, Vec2::new(0.0, 1.0));
    let b = mesh.push(Vec3::new(x, -y, 0.0), Vec3::Z, Vec2::new(1.0, 1.0));
    let c = mesh.push(Vec3::new(x, y, 0.0), Vec3::Z, Vec2::new(1.0, 0.0));
    let d = mesh.push(Vec3::new(-x, y, 0.0), Vec3::Z, Vec2::new(0.0, 0.0));
    mesh.indices.extend_from_slice(&[a, b, c, c, d, a]);
    mesh
}

fn cylinder_mesh(radius_top: f32, radius_bottom: f32, height: f32, segments: u32) -> MeshData {
    let mut mesh = MeshData::default();
    let half = height * 0.5;
    let slope = if height > 0.0 {
        (radius_bottom - radius_top) / height
    } else {
        0.0
    };

    // Side: top ring then bottom ring for each column.
    let mut columns = Vec::with_capacity(segments as usize + 1);
    for i in 0..=segments {
        let u = i as f32 / segments as f32;
        let (sin, cos) = (u * TAU).sin_cos();
        let normal = Vec3::new(sin, slope, cos).normalize();
        let top = mesh.push(
            Vec3::new(radius_top * sin, half, radius_top * cos),
            normal,
            Vec2::new(u, 0.0),
        );
        let bottom = mesh.push(
            Vec3::new(radius_bottom * sin, -half, radius_bottom * cos),
            normal,
            Vec2::new(u, 1.0),
        );
        columns.push((top, bottom));
    }
    for pair in columns.windows(2) {
        let ((a, b), (d, c)) = (pair[0], pair[1]);
        mesh.indices.extend_from_slice(&[a, b, c, c, d, a]);
    }

    for (radius, y, normal) in [(radius_top, half, Vec3::Y), (radius_bottom, -half, Vec3::NEG_Y)] {
        if radius <= 0.0 {
            continue;
        }
        let center = mesh.push(Vec3::new(0.0, y, 0.0), normal, Vec2::splat(0.5));
        let ring: Vec<u32> = (0..=segments)
            .map(|i| {
                let (sin, cos) = (i as f32 / segments as f32 * TAU).sin_cos();
                mesh.push(
                    Vec3::new(radius * sin, y, radius * cos),
                    normal,
                    Vec2::new(0.5 + sin * 0.5, 0.5 + cos * 0.5),
                )
            })
            .collect();
        for pair in ring.windows(2) {
            if normal.y > 0.0 {
                mesh.indices.extend_from_slice(&[center, pair[0], pair[1]]);
            } else {
                mesh.indices.extend_from_slice(&[center, pair[1], pair[0]]);
            }
        }
    }
    mesh
}

fn sphere_mesh(radius: f32, width_segments: u32, height_segments: u32) -> MeshData {
    let mut mesh = MeshData::default();
    let row = width_segments + 1;
    for iy in 0..=height_segments {
        let v = iy as f32 / height_segments as f32;
        for ix in 0..=width_segments {
            let u = ix as f32 / width_segments as f32;
            let dir = Vec3::new(
                -(u * TAU).cos() * (v * PI).sin(),
                (v * PI).cos(),
                (u * TAU).sin() * (v * PI).sin(),
            );
            mesh.push(dir * radius, dir, Vec2::new(u, v));
        }
    }
    for iy in 0..height_segments {
        for ix in 0..width_segments {
            let a = iy * row + ix + 1;
            let b = iy * row + ix;
            let c = (iy + 1) * row + ix;
            let d = (iy + 1) * row + ix + 1;
            if iy != 0 {
                mesh.indices.extend_from_slice(&[a, b, d]);
            }
            if iy != height_segments - 1 {
                mesh.indices.extend_from_slice(&[b, c, d]);
            }
        }
    }
    mesh
}

fn torus_mesh(radius: f32, tube: f32, radial: u32, tubular: u32, arc: f32) -> MeshData {
    let mut mesh = MeshData::default();
    for j in 0..=radial {
        let v = j as f32 / radial as f32 * TAU;
        for i in 0..=tubular {
            let u = i as f32 / tubular as f32 * arc;
            let ring = radius + tube * v.cos();
            let position = Vec3::new(ring * u.cos(), ring * u.sin(), tube * v.sin());
            let center = Vec3::new(radius * u.cos(), radius * u.sin(), 0.0);
            mesh.push(
                position,
                (position - center).normalize_or_zero(),
                Vec2::new(i as f32 / tubular as f32, j as f32 / radial as f32),
            );
        }
    }
    let stride = tubular + 1;
    for j in 1..=radial {
        for i in 1..=tubular {
            let a = stride * j + i - 1;
            let b = stride * (j - 1) + i - 1;
            let c = stride * (j - 1) + i;
            let d = stride * j + i;
            mesh.indices.extend_from_slice(&[a, b, d, b, c, d]);
        }
    }
    mesh
}

fn lathe_mesh(profile: &[Vec2], segments: u32) -> MeshData {
    let mut mesh = MeshData::default();
    let n = profile.len();
    if n < 2 {
        return mesh;
    }
    let normals_2d: Vec<Vec2> = (0..n)
        .map(|j| {
            let prev = profile[j.saturating_sub(1)];
            let next = profile[(j + 1).min(n - 1)];
            let t = next - prev;
            Vec2::new(t.y, -t.x).normalize_or_zero()
        })
        .collect();
    let total = profile.iter().zip(profile.iter().skip(1)).map(|(a, b)| a.distance(*b)).sum::<f32>();

    for i in 0..=segments {
        let u = i as f32 / segments as f32;
        let (sin, cos) = (u * TAU).sin_cos();
        let mut travelled = 0.0;
        for j in 0..n {
            if j > 0 {
                travelled += profile[j].distance(profile[j - 1]);
            }
            let p = profile[j];
            let n2 = normals_2d[j];
            let v = if total > 0.0 { travelled / total } else { 0.0 };
            mesh.push(
                Vec3::new(p.x * sin, p.y, p.x * cos),
                Vec3::new(n2.x * sin, n2.y, n2.x * cos),
                Vec2::new(u, v),
            );
        }
    }
    let n = n as u32;
    for i in 0..segments {
        for j in 0..n - 1 {
            let base = j + i * n;
            let (a, b, c, d) = (base, base + n, base + n + 1, base + 1);
            mesh.indices.extend_from_slice(&[a, b, d, c, d, b]);
        }
    }
    mesh
}
