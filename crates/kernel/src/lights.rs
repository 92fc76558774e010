use cafescene_common::{Color, LightingConfig, PointLightConfig, PulseConfig};
use glam::Vec3;

/// Maximum number of lights the render pass accepts.
pub const MAX_LIGHTS: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LightKind {
    /// Uniform fill with no direction.
    Ambient,
    /// Parallel rays travelling along `direction` (normalized).
    Directional { direction: Vec3 },
    /// Radiates from `position`. A `range` of 0.0 means unbounded.
    Point { position: Vec3, range: f32 },
}

/// A light in the rig with its base and current intensity.
#[derive(Debug, Clone, PartialEq)]
pub struct Light {
    pub name: String,
    pub kind: LightKind,
    pub color: Color,
    /// Only directional lights are shadow-mapped.
    pub cast_shadow: bool,
    base_intensity: f32,
    intensity: f32,
    pulse: Option<PulseConfig>,
}

impl Light {
    pub fn ambient(name: &str, color: Color, intensity: f32) -> Self {
        Self::fixed(name, LightKind::Ambient, color, intensity)
    }

    /// A directional light shining from `position` toward the origin.
    pub fn directional(name: &str, color: Color, intensity: f32, position: Vec3) -> Self {
        let direction = (-position).try_normalize().unwrap_or(Vec3::NEG_Y);
        Self::fixed(name, LightKind::Directional { direction }, color, intensity)
    }

    pub fn point(name: &str, config: &PointLightConfig) -> Self {
        let mut light = Self::fixed(
            name,
            LightKind::Point {
                position: config.position,
                range: config.range.max(0.0),
            },
            config.color,
            config.intensity,
        );
        light.pulse = config.pulse;
        light
    }

    fn fixed(name: &str, kind: LightKind, color: Color, intensity: f32) -> Self {
        Self {
            name: name.to_owned(),
            kind,
            color,
            cast_shadow: false,
            base_intensity: intensity,
            intensity,
            pulse: None,
        }
    }

    pub fn with_shadow(mut self, cast: bool) -> Self {
        self.cast_shadow = cast;
        self
    }

    pub fn with_pulse(mut self, pulse: PulseConfig) -> Self {
        self.pulse = Some(pulse);
        self
    }

    pub fn intensity(&self) -> f32 {
        self.intensity
    }

    pub fn base_intensity(&self) -> f32 {
        self.base_intensity
    }

    pub fn pulse(&self) -> Option<&PulseConfig> {
        self.pulse.as_ref()
    }

    /// The interval the intensity can reach.
    pub fn intensity_range(&self) -> (f32, f32) {
        match &self.pulse {
            Some(p) => {
                let a = p.amplitude.abs();
                (self.base_intensity - a, self.base_intensity + a)
            }
            None => (self.base_intensity, self.base_intensity),
        }
    }

    /// Intensity at `elapsed` seconds. Lights without a pulse stay at base.
    pub fn intensity_at(&self, elapsed: f32) -> f32 {
        match &self.pulse {
            Some(p) => {
                self.base_intensity + p.amplitude * p.wave.eval(p.frequency * elapsed + p.phase)
            }
            None => self.base_intensity,
        }
    }

    /// Color premultiplied by the current intensity, in linear space.
    pub fn radiance(&self) -> [f32; 3] {
        let [r, g, b] = self.color.linear();
        [r * self.intensity, g * self.intensity, b * self.intensity]
    }
}

/// The fixed set of lights for one stage.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct LightRig {
    lights: Vec<Light>,
}

impl LightRig {
    pub fn new(lights: Vec<Light>) -> Self {
        if lights.len() > MAX_LIGHTS {
            tracing::warn!(
                count = lights.len(),
                max = MAX_LIGHTS,
                "light rig exceeds render limit; extra lights are ignored by the GPU pass"
            );
        }
        Self { lights }
    }

    pub fn from_config(config: &LightingConfig) -> Self {
        Self::new(vec![
            Light::ambient("ambient", config.ambient.color, config.ambient.intensity),
            Light::directional(
                "directional",
                config.directional.color,
                config.directional.intensity,
                config.directional.position,
            )
            .with_shadow(config.directional.cast_shadow),
            Light::point("interior", &config.interior),
            Light::point("neon_left", &config.neon_left),
            Light::point("neon_right", &config.neon_right),
            Light::point("banner", &config.banner),
        ])
    }

    /// Recompute every pulsing light for the given elapsed time.
    pub fn update(&mut self, elapsed: f32) {
        for light in self.lights.iter_mut().filter(|l| l.pulse.is_some()) {
            light.intensity = light.intensity_at(elapsed);
        }
    }

    pub fn lights(&self) -> &[Light] {
        &self.lights
    }

    pub fn get(&self, name: &str) -> Option<&Light> {
        self.lights.iter().find(|l| l.name == name)
    }

    pub fn len(&self) -> usize {
        self.lights.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lights.is_empty()
    }

    /// The first directional light that casts shadows, as a unit direction.
    pub fn shadow_caster(&self) -> Option<Vec3> {
        self.lights.iter().find_map(|l| match l.kind {
            LightKind::Directional { direction } if l.cast_shadow => Some(direction),
            _ => None,
        })
    }

    /// Sum of ambient contributions in linear space.
    pub fn ambient(&self) -> [f32; 3] {
        self.lights
            .iter()
            .filter(|l| l.kind == LightKind::Ambient)
            .fold([0.0; 3], |acc, l| {
                let r = l.radiance();
                [acc[0] + r[0], acc[1] + r[1], acc[2] + r[2]]
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rig() -> LightRig {
        LightRig::from_config(&LightingConfig::default())
    }

    #[test]
    fn default_rig_layout() {
        let rig = rig();
        assert_eq!(rig.len(), 6);
        assert!(rig.len() <= MAX_LIGHTS);
        let interior = rig.get("interior").unwrap();
        assert_eq!(interior.color.to_hex(), 0xffe7c9);
        assert!(matches!(interior.kind, LightKind::Point { range, .. } if range == 20.0));
        assert!(interior.pulse().is_none());
        match rig.get("directional").unwrap().kind {
            LightKind::Directional { direction } => {
                assert!((direction.length() - 1.0).abs() < 1e-5);
                assert!(direction.y < 0.0);
            }
            other => panic!("unexpected kind {other:?}"),
        }
    }

    #[test]
    fn pulses_follow_their_waves() {
        let mut rig = rig();
        rig.update(0.0);
        // sin(0) = 0, cos(0) = 1
        assert!((rig.get("neon_left").unwrap().intensity() - 0.8).abs() < 1e-5);
        assert!((rig.get("neon_right").unwrap().intensity() - 1.1).abs() < 1e-5);
        assert!((rig.get("banner").unwrap().intensity() - 1.2).abs() < 1e-5);

        let t = std::f32::consts::FRAC_PI_2 / 2.1;
        rig.update(t);
        assert!((rig.get("banner").unwrap().intensity() - 1.8).abs() < 1e-4);
    }

    #[test]
    fn intensity_stays_within_amplitude_band() {
        let mut rig = rig();
        for i in 0..5000 {
            let t = i as f32 * 0.137;
            rig.update(t);
            for light in rig.lights() {
                let (lo, hi) = light.intensity_range();
                let v = light.intensity();
                assert!(v >= lo - 1e-5 && v <= hi + 1e-5, "{} = {v} at {t}", light.name);
            }
        }
    }

    #[test]
    fn steady_lights_ignore_time() {
        let mut rig = rig();
        rig.update(42.0);
        assert_eq!(rig.get("interior").unwrap().intensity(), 1.8);
        assert_eq!(rig.get("ambient").unwrap().intensity(), 0.25);
    }

    #[test]
    fn directional_light_is_the_shadow_caster() {
        let rig = rig();
        let dir = rig.shadow_caster().unwrap();
        assert!(dir.y < 0.0);
        assert!(rig.lights().iter().filter(|l| l.cast_shadow).count() == 1);

        let mut lighting = LightingConfig::default();
        lighting.directional.cast_shadow = false;
        assert!(LightRig::from_config(&lighting).shadow_caster().is_none());
    }

    #[test]
    fn ambient_sums_ambient_lights_only() {
        let rig = LightRig::new(vec![
            Light::ambient("a", Color::WHITE, 0.5),
            Light::ambient("b", Color::WHITE, 0.25),
            Light::directional("sun", Color::WHITE, 10.0, Vec3::Y),
        ]);
        let [r, g, b] = rig.ambient();
        assert!((r - 0.75).abs() < 1e-5);
        assert_eq!(r, g);
        assert_eq!(g, b);
    }
}
