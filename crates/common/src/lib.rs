//! Shared types and the scene configuration for the cafescene renderer.

pub mod config;
pub mod types;

pub use config::{
    AmbientLightConfig, AtmosphereConfig, CameraConfig, ConfigError, CupsConfig,
    DirectionalLightConfig, LightingConfig, ModelConfig, ParticlesConfig, PointLightConfig,
    PulseConfig, SceneConfig, ShadowConfig, SignageConfig, SnowConfig, SteamConfig,
    ViewportConfig, Wave, MAX_SHADOW_MAP_SIZE,
};
pub use types::{Color, Transform};
