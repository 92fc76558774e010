use crate::graph::TextureId;
use cafescene_common::Color;

/// Lit surface with a roughness/metalness response and optional glow.
#[derive(Debug, Clone, PartialEq)]
pub struct StandardMaterial {
    pub color: Color,
    pub roughness: f32,
    pub metalness: f32,
    pub emissive: Color,
    pub emissive_intensity: f32,
    pub opacity: f32,
    pub texture: Option<TextureId>,
}

impl Default for StandardMaterial {
    fn default() -> Self {
        Self {
            color: Color::WHITE,
            roughness: 1.0,
            metalness: 0.0,
            emissive: Color::BLACK,
            emissive_intensity: 1.0,
            opacity: 1.0,
            texture: None,
        }
    }
}

impl StandardMaterial {
    pub fn colored(color: u32, roughness: f32) -> Self {
        Self {
            color: Color::hex(color),
            roughness,
            ..Self::default()
        }
    }

    /// Self-illuminated strip such as a neon tube.
    pub fn glowing(color: u32, intensity: f32) -> Self {
        Self {
            color: Color::hex(color),
            emissive: Color::hex(color),
            emissive_intensity: intensity,
            roughness: 0.4,
            ..Self::default()
        }
    }
}

/// Unlit surface; renders its color or texture as-is.
#[derive(Debug, Clone, PartialEq)]
pub struct BasicMaterial {
    pub color: Color,
    pub opacity: f32,
    pub transparent: bool,
    pub texture: Option<TextureId>,
}

impl Default for BasicMaterial {
    fn default() -> Self {
        Self {
            color: Color::WHITE,
            opacity: 1.0,
            transparent: false,
            texture: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Material {
    Standard(StandardMaterial),
    Basic(BasicMaterial),
}

impl Material {
    pub fn color(&self) -> Color {
        match self {
            Material::Standard(m) => m.color,
            Material::Basic(m) => m.color,
        }
    }

    pub fn opacity(&self) -> f32 {
        match self {
            Material::Standard(m) => m.opacity,
            Material::Basic(m) => m.opacity,
        }
    }

    pub fn texture(&self) -> Option<TextureId> {
        match self {
            Material::Standard(m) => m.texture,
            Material::Basic(m) => m.texture,
        }
    }

    pub fn is_lit(&self) -> bool {
        matches!(self, Material::Standard(_))
    }

    /// Drawn after opaque geometry with blending and no depth writes.
    pub fn is_transparent(&self) -> bool {
        match self {
            Material::Standard(m) => m.opacity < 1.0,
            Material::Basic(m) => m.transparent || m.opacity < 1.0,
        }
    }

    /// Emitted radiance (emissive color times intensity) in linear space.
    pub fn emission(&self) -> [f32; 3] {
        match self {
            Material::Standard(m) => {
                let [r, g, b] = m.emissive.linear();
                let k = m.emissive_intensity;
                [r * k, g * k, b * k]
            }
            Material::Basic(_) => [0.0; 3],
        }
    }

    /// `(roughness, metalness)`; unlit materials report fully rough.
    pub fn surface(&self) -> (f32, f32) {
        match self {
            Material::Standard(m) => (m.roughness, m.metalness),
            Material::Basic(_) => (1.0, 0.0),
        }
    }
}

impl From<StandardMaterial> for Material {
    fn from(m: StandardMaterial) -> Self {
        Material::Standard(m)
    }
}

impl From<BasicMaterial> for Material {
    fn from(m: BasicMaterial) -> Self {
        Material::Basic(m)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn glowing_material_emits() {
        let m: Material = StandardMaterial::glowing(0xff69b4, 2.0).into();
        let [r, _, _] = m.emission();
        assert!((r - 2.0).abs() < 1e-5);
        assert!(m.is_lit());
        assert!(!m.is_transparent());
    }

    #[test]
    fn basic_transparency_flag() {
        let m: Material = BasicMaterial {
            transparent: true,
            ..BasicMaterial::default()
        }
        .into();
        assert!(m.is_transparent());
        assert_eq!(m.emission(), [0.0; 3]);
        assert_eq!(m.surface(), (1.0, 0.0));
    }

    #[test]
    fn faded_standard_is_transparent() {
        let m: Material = StandardMaterial {
            opacity: 0.5,
            ..StandardMaterial::default()
        }
        .into();
        assert!(m.is_transparent());
    }
}
