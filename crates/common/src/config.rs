use crate::types::Color;
use glam::Vec3;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Errors from loading or validating a [`SceneConfig`].
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Complete description of the authored scene. Every section falls back to
/// its defaults, so an empty file yields the stock coffee shop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SceneConfig {
    /// Seed for the per-entity phase/speed sampling.
    pub seed: u64,
    /// Upper bound on a single frame's delta time, in seconds.
    pub max_frame_delta: f32,
    pub viewport: ViewportConfig,
    pub camera: CameraConfig,
    pub atmosphere: AtmosphereConfig,
    pub lighting: LightingConfig,
    pub shadows: ShadowConfig,
    pub snow: SnowConfig,
    pub steam: SteamConfig,
    pub particles: ParticlesConfig,
    pub cups: CupsConfig,
    pub signage: SignageConfig,
    pub model: ModelConfig,
}

impl Default for SceneConfig {
    fn default() -> Self {
        Self {
            seed: 0x5eed_cafe,
            max_frame_delta: 0.1,
            viewport: ViewportConfig::default(),
            camera: CameraConfig::default(),
            atmosphere: AtmosphereConfig::default(),
            lighting: LightingConfig::default(),
            shadows: ShadowConfig::default(),
            snow: SnowConfig::default(),
            steam: SteamConfig::default(),
            particles: ParticlesConfig::default(),
            cups: CupsConfig::default(),
            signage: SignageConfig::default(),
            model: ModelConfig::default(),
        }
    }
}

impl SceneConfig {
    /// Load and validate a YAML config file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_yaml_str(&text)?;
        tracing::debug!(path = %path.display(), "loaded scene config");
        Ok(config)
    }

    pub fn from_yaml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = if text.trim().is_empty() {
            Self::default()
        } else {
            serde_yaml::from_str(text)?
        };
        config.validate()?;
        Ok(config)
    }

    /// Every check is phrased so that a NaN field fails it.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let cam = &self.camera;
        if !(cam.min_distance > 0.0 && cam.min_distance <= cam.max_distance && cam.max_distance.is_finite()) {
            return Err(ConfigError::Invalid(format!(
                "camera distance range [{}, {}] is empty or non-positive",
                cam.min_distance, cam.max_distance
            )));
        }
        if !(cam.min_polar >= 0.0 && cam.min_polar <= cam.max_polar && cam.max_polar <= std::f32::consts::PI) {
            return Err(ConfigError::Invalid(format!(
                "camera polar range [{}, {}] must lie within [0, pi]",
                cam.min_polar, cam.max_polar
            )));
        }
        if !(0.0..=1.0).contains(&cam.damping) {
            return Err(ConfigError::Invalid(format!(
                "camera damping {} must lie within [0, 1]",
                cam.damping
            )));
        }
        let snow = &self.snow;
        if !(snow.despawn_y.is_finite() && snow.respawn_min_y.is_finite() && snow.respawn_span.is_finite()) {
            return Err(ConfigError::Invalid("snow band edges must be finite".into()));
        }
        if !(snow.despawn_y < snow.respawn_min_y) {
            return Err(ConfigError::Invalid(
                "snow respawn band must start above the despawn threshold".into(),
            ));
        }
        if !(self.steam.rise_height > 0.0 && self.steam.rise_height.is_finite()) {
            return Err(ConfigError::Invalid("steam rise_height must be positive".into()));
        }
        let particles = &self.particles;
        if !(particles.min.is_finite() && particles.max.is_finite()) {
            return Err(ConfigError::Invalid("particle box must be finite".into()));
        }
        if !(particles.min.y < particles.max.y) {
            return Err(ConfigError::Invalid(
                "particle box must have positive height".into(),
            ));
        }
        if !(self.max_frame_delta > 0.0 && self.max_frame_delta.is_finite()) {
            return Err(ConfigError::Invalid("max_frame_delta must be positive".into()));
        }
        let shadows = &self.shadows;
        if shadows.enabled {
            if !(1..=MAX_SHADOW_MAP_SIZE).contains(&shadows.map_size) {
                return Err(ConfigError::Invalid(format!(
                    "shadow map_size {} must lie within [1, {MAX_SHADOW_MAP_SIZE}]",
                    shadows.map_size
                )));
            }
            if !(shadows.half_extent > 0.0 && shadows.half_extent.is_finite() && shadows.center.is_finite()) {
                return Err(ConfigError::Invalid(
                    "shadow volume must be finite with a positive half_extent".into(),
                ));
            }
            if !shadows.depth_bias.is_finite() {
                return Err(ConfigError::Invalid("shadow depth_bias must be finite".into()));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewportConfig {
    pub title: String,
    pub width: u32,
    pub height: u32,
    /// Cap on the display scale factor used for the surface size.
    pub max_pixel_ratio: f32,
}

impl Default for ViewportConfig {
    fn default() -> Self {
        Self {
            title: "Coffee Mama".into(),
            width: 1280,
            height: 720,
            max_pixel_ratio: 2.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraConfig {
    pub fov_degrees: f32,
    pub near: f32,
    pub far: f32,
    pub position: Vec3,
    pub target: Vec3,
    /// Fraction of the remaining distance to the goal covered per 60 Hz frame.
    pub damping: f32,
    pub rotate_speed: f32,
    pub zoom_speed: f32,
    pub pan_speed: f32,
    pub min_distance: f32,
    pub max_distance: f32,
    /// Polar angle limits in radians, measured from +Y.
    pub min_polar: f32,
    pub max_polar: f32,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            fov_degrees: 50.0,
            near: 0.1,
            far: 500.0,
            position: Vec3::new(0.0, 3.8, 12.0),
            target: Vec3::ZERO,
            damping: 0.12,
            rotate_speed: 0.5,
            zoom_speed: 0.9,
            pan_speed: 0.6,
            min_distance: 6.0,
            max_distance: 30.0,
            min_polar: 0.0,
            max_polar: std::f32::consts::PI,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AtmosphereConfig {
    pub background: Color,
    pub fog_color: Color,
    /// Exponential-squared fog density.
    pub fog_density: f32,
}

impl Default for AtmosphereConfig {
    fn default() -> Self {
        Self {
            background: Color::hex(0x071028),
            fog_color: Color::hex(0x071028),
            fog_density: 0.012,
        }
    }
}

/// Periodic function used by a light pulse.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Wave {
    Sin,
    Cos,
}

impl Wave {
    pub fn eval(self, x: f32) -> f32 {
        match self {
            Wave::Sin => x.sin(),
            Wave::Cos => x.cos(),
        }
    }
}

/// `intensity = base + amplitude * wave(frequency * t + phase)`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PulseConfig {
    pub amplitude: f32,
    pub frequency: f32,
    pub phase: f32,
    pub wave: Wave,
}

impl Default for PulseConfig {
    fn default() -> Self {
        Self {
            amplitude: 0.3,
            frequency: 1.0,
            phase: 0.0,
            wave: Wave::Sin,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AmbientLightConfig {
    pub color: Color,
    pub intensity: f32,
}

impl Default for AmbientLightConfig {
    fn default() -> Self {
        Self {
            color: Color::hex(0x9bb7ff),
            intensity: 0.25,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DirectionalLightConfig {
    pub color: Color,
    pub intensity: f32,
    /// Light position; rays travel from here toward the origin.
    pub position: Vec3,
    pub cast_shadow: bool,
}

impl Default for DirectionalLightConfig {
    fn default() -> Self {
        Self {
            color: Color::WHITE,
            intensity: 0.9,
            position: Vec3::new(-5.0, 10.0, 5.0),
            cast_shadow: true,
        }
    }
}

/// Largest accepted shadow map edge, in texels.
pub const MAX_SHADOW_MAP_SIZE: u32 = 8192;

/// Shadow map for the directional light.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShadowConfig {
    pub enabled: bool,
    /// Edge length of the square depth map, in texels.
    pub map_size: u32,
    /// Center of the volume the shadow map covers.
    pub center: Vec3,
    /// Half the side of the orthographic light box around `center`.
    pub half_extent: f32,
    /// Subtracted from the receiver depth before comparison.
    pub depth_bias: f32,
}

impl Default for ShadowConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            map_size: 2048,
            center: Vec3::new(0.0, 1.5, 1.5),
            half_extent: 12.0,
            depth_bias: 0.002,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PointLightConfig {
    pub color: Color,
    /// Base intensity; the pulse oscillates around it.
    pub intensity: f32,
    /// Cut-off distance. Zero means unbounded.
    pub range: f32,
    pub position: Vec3,
    pub pulse: Option<PulseConfig>,
}

impl Default for PointLightConfig {
    fn default() -> Self {
        Self {
            color: Color::WHITE,
            intensity: 1.0,
            range: 0.0,
            position: Vec3::ZERO,
            pulse: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LightingConfig {
    pub ambient: AmbientLightConfig,
    pub directional: DirectionalLightConfig,
    pub interior: PointLightConfig,
    pub neon_left: PointLightConfig,
    pub neon_right: PointLightConfig,
    pub banner: PointLightConfig,
}

impl Default for LightingConfig {
    fn default() -> Self {
        Self {
            ambient: AmbientLightConfig::default(),
            directional: DirectionalLightConfig::default(),
            interior: PointLightConfig {
                color: Color::hex(0xffe7c9),
                intensity: 1.8,
                range: 20.0,
                position: Vec3::new(0.0, 3.2, 2.5),
                pulse: None,
            },
            neon_left: PointLightConfig {
                color: Color::hex(0xff69b4),
                intensity: 0.8,
                range: 12.0,
                position: Vec3::new(-6.0, 4.2, 2.5),
                pulse: Some(PulseConfig {
                    amplitude: 0.3,
                    frequency: 1.4,
                    phase: 0.0,
                    wave: Wave::Sin,
                }),
            },
            neon_right: PointLightConfig {
                color: Color::hex(0x00ffff),
                intensity: 0.8,
                range: 12.0,
                position: Vec3::new(6.0, 4.2, 2.5),
                pulse: Some(PulseConfig {
                    amplitude: 0.3,
                    frequency: 1.1,
                    phase: 0.0,
                    wave: Wave::Cos,
                }),
            },
            banner: PointLightConfig {
                color: Color::hex(0x00ffa3),
                intensity: 1.2,
                range: 10.0,
                position: Vec3::new(0.0, 5.5, 3.8),
                pulse: Some(PulseConfig {
                    amplitude: 0.6,
                    frequency: 2.1,
                    phase: 0.0,
                    wave: Wave::Sin,
                }),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SnowConfig {
    pub count: usize,
    pub half_width: f32,
    pub half_depth: f32,
    pub initial_min_y: f32,
    pub initial_span: f32,
    /// Units per second.
    pub fall_speed: f32,
    /// Per-flake speed factor is sampled from `1 ± speed_jitter`.
    pub speed_jitter: f32,
    pub despawn_y: f32,
    pub respawn_min_y: f32,
    pub respawn_span: f32,
    pub sway: f32,
    pub sway_frequency: f32,
    pub size: f32,
    pub color: Color,
    pub opacity: f32,
}

impl Default for SnowConfig {
    fn default() -> Self {
        Self {
            count: 1500,
            half_width: 30.0,
            half_depth: 15.0,
            initial_min_y: 2.0,
            initial_span: 30.0,
            fall_speed: 0.5,
            speed_jitter: 0.2,
            despawn_y: -2.0,
            respawn_min_y: 8.0,
            respawn_span: 30.0,
            sway: 0.15,
            sway_frequency: 0.6,
            size: 0.08,
            color: Color::WHITE,
            opacity: 0.9,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SteamConfig {
    pub per_origin: usize,
    pub rise_speed: f32,
    pub speed_jitter: f32,
    /// Height above the spawn point at which a puff wraps back.
    pub rise_height: f32,
    /// Horizontal scatter radius around the origin.
    pub spread: f32,
    pub base_size: f32,
    /// Scale growth per unit of height above spawn.
    pub growth: f32,
    pub max_opacity: f32,
    pub color: Color,
}

impl Default for SteamConfig {
    fn default() -> Self {
        Self {
            per_origin: 6,
            rise_speed: 0.35,
            speed_jitter: 0.4,
            rise_height: 1.2,
            spread: 0.08,
            base_size: 0.06,
            growth: 1.5,
            max_opacity: 0.55,
            color: Color::hex(0xdfe8f0),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParticlesConfig {
    pub count: usize,
    pub min: Vec3,
    pub max: Vec3,
    pub rise_speed: f32,
    pub speed_jitter: f32,
    pub sway: f32,
    pub size: f32,
    pub color: Color,
    pub opacity: f32,
}

impl Default for ParticlesConfig {
    fn default() -> Self {
        Self {
            count: 120,
            min: Vec3::new(-10.0, 0.2, -4.0),
            max: Vec3::new(10.0, 7.0, 8.0),
            rise_speed: 0.25,
            speed_jitter: 0.5,
            sway: 0.3,
            size: 0.05,
            color: Color::hex(0xffd9a0),
            opacity: 0.7,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CupsConfig {
    pub count: usize,
    pub spacing: f32,
    pub bob_amplitude: f32,
    /// Angular speed of the bob, radians per second.
    pub bob_speed: f32,
    /// Rotation about Y, radians per second.
    pub spin: f32,
    pub color: Color,
}

impl Default for CupsConfig {
    fn default() -> Self {
        Self {
            count: 3,
            spacing: 1.8,
            bob_amplitude: 0.06,
            bob_speed: 1.6,
            spin: 0.5,
            color: Color::hex(0xf4efe6),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SignageConfig {
    pub title: String,
    pub subtitle: String,
    /// Outline font for the sign text; the font embedded in the scene crate is
    /// used when unset or unreadable.
    pub font_path: Option<PathBuf>,
    pub banner_width: u32,
    pub banner_height: u32,
    pub title_size: f32,
    pub subtitle_size: f32,
    pub title_color: Color,
    pub subtitle_color: Color,
    pub background: Color,
    pub open_text: String,
    pub open_color: Color,
    pub menu_lines: Vec<String>,
}

impl Default for SignageConfig {
    fn default() -> Self {
        Self {
            title: "COFFEE MAMA".into(),
            subtitle: "TEA - COFFEE - HOT TIFFIN - QUALITY IN EVERY SIP".into(),
            font_path: None,
            banner_width: 2048,
            banner_height: 512,
            title_size: 160.0,
            subtitle_size: 48.0,
            title_color: Color::hex(0x00ffa3),
            subtitle_color: Color::WHITE,
            background: Color::hex(0x071028),
            open_text: "OPEN".into(),
            open_color: Color::hex(0xff69b4),
            menu_lines: vec![
                "MENU".into(),
                "CHAI  20".into(),
                "COFFEE  40".into(),
                "SINGARA  15".into(),
            ],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    pub enabled: bool,
    pub path: PathBuf,
    pub position: Vec3,
    pub scale: f32,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            path: PathBuf::from("models/tomcat.glb"),
            position: Vec3::new(0.0, 0.0, 1.2),
            scale: 1.0,
        }
    }
}
