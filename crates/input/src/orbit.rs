use crate::gesture::Gesture;
use cafescene_common::CameraConfig;
use glam::{Mat4, Vec3};
use std::f32::consts::TAU;

/// Keeps the eye off the poles so `look_at` never sees a degenerate up vector.
const POLAR_EPSILON: f32 = 1e-4;
/// Distance factor applied per wheel step at zoom speed 1.
const ZOOM_BASE: f32 = 0.95;
/// Damping is specified per frame at this rate and rescaled for other steps.
const REFERENCE_FPS: f32 = 60.0;

/// Perspective parameters of the viewing camera.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Projection {
    /// Vertical field of view in radians.
    pub fov_y: f32,
    pub aspect: f32,
    pub near: f32,
    pub far: f32,
}

impl Projection {
    pub fn matrix(&self) -> Mat4 {
        Mat4::perspective_rh(self.fov_y, self.aspect, self.near, self.far)
    }
}

/// Spherical camera placement around a target point.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OrbitPose {
    /// Rotation around +Y, zero looking down -Z from +Z.
    pub azimuth: f32,
    /// Angle from +Y.
    pub polar: f32,
    pub distance: f32,
    pub target: Vec3,
}

impl OrbitPose {
    pub fn from_eye(eye: Vec3, target: Vec3) -> Self {
        let offset = eye - target;
        let distance = offset.length();
        if distance <= f32::EPSILON {
            return Self {
                azimuth: 0.0,
                polar: std::f32::consts::FRAC_PI_2,
                distance: 0.0,
                target,
            };
        }
        Self {
            azimuth: offset.x.atan2(offset.z),
            polar: (offset.y / distance).clamp(-1.0, 1.0).acos(),
            distance,
            target,
        }
    }

    pub fn eye(&self) -> Vec3 {
        let (sin_p, cos_p) = self.polar.sin_cos();
        let (sin_a, cos_a) = self.azimuth.sin_cos();
        self.target + Vec3::new(sin_p * sin_a, cos_p, sin_p * cos_a) * self.distance
    }

    fn lerp(&self, goal: &OrbitPose, t: f32) -> OrbitPose {
        OrbitPose {
            azimuth: self.azimuth + (goal.azimuth - self.azimuth) * t,
            polar: self.polar + (goal.polar - self.polar) * t,
            distance: self.distance + (goal.distance - self.distance) * t,
            target: self.target.lerp(goal.target, t),
        }
    }
}

/// Damped orbit camera.
///
/// Gestures move a goal pose immediately; [`OrbitController::update`] eases
/// the visible pose toward it. Limits are applied to the goal, so the
/// visible pose never leaves them either.
#[derive(Debug, Clone)]
pub struct OrbitController {
    goal: OrbitPose,
    current: OrbitPose,
    projection: Projection,
    viewport_height: f32,
    damping: f32,
    rotate_speed: f32,
    zoom_speed: f32,
    pan_speed: f32,
    min_distance: f32,
    max_distance: f32,
    min_polar: f32,
    max_polar: f32,
}

impl OrbitController {
    pub fn new(config: &CameraConfig) -> Self {
        let min_polar = config.min_polar.max(POLAR_EPSILON);
        let max_polar = config.max_polar.min(std::f32::consts::PI - POLAR_EPSILON);
        let mut pose = OrbitPose::from_eye(config.position, config.target);
        pose.distance = pose.distance.clamp(config.min_distance, config.max_distance);
        pose.polar = pose.polar.clamp(min_polar, max_polar.max(min_polar));

        Self {
            goal: pose,
            current: pose,
            projection: Projection {
                fov_y: config.fov_degrees.to_radians(),
                aspect: 16.0 / 9.0,
                near: config.near,
                far: config.far,
            },
            viewport_height: 720.0,
            damping: config.damping,
            rotate_speed: config.rotate_speed,
            zoom_speed: config.zoom_speed,
            pan_speed: config.pan_speed,
            min_distance: config.min_distance,
            max_distance: config.max_distance,
            min_polar,
            max_polar: max_polar.max(min_polar),
        }
    }

    pub fn apply(&mut self, gesture: Gesture) {
        tracing::trace!(?gesture, "camera gesture");
        match gesture {
            Gesture::Orbit { dx, dy } => self.rotate(dx, dy),
            Gesture::Pan { dx, dy } => self.pan(dx, dy),
            Gesture::Zoom { steps } => self.zoom(steps),
            Gesture::Pinch { scale } => self.pinch(scale),
        }
    }

    /// Orbit by a pointer delta in pixels. A drag the full viewport height
    /// turns `rotate_speed` full circles.
    pub fn rotate(&mut self, dx: f32, dy: f32) {
        let per_pixel = TAU / self.viewport_height * self.rotate_speed;
        self.goal.azimuth -= dx * per_pixel;
        self.goal.polar = (self.goal.polar - dy * per_pixel).clamp(self.min_polar, self.max_polar);
    }

    pub fn zoom(&mut self, steps: f32) {
        if !steps.is_finite() {
            return;
        }
        let factor = ZOOM_BASE.powf(self.zoom_speed * steps);
        self.set_goal_distance(self.goal.distance * factor);
    }

    pub fn pinch(&mut self, scale: f32) {
        if !scale.is_finite() || scale <= 0.0 {
            return;
        }
        self.set_goal_distance(self.goal.distance / scale);
    }

    /// Slide the target in the view plane so the point under the pointer
    /// follows it.
    pub fn pan(&mut self, dx: f32, dy: f32) {
        let view_height = 2.0 * self.goal.distance * (self.projection.fov_y * 0.5).tan();
        let per_pixel = view_height / self.viewport_height * self.pan_speed;
        let forward = (self.goal.target - self.goal.eye()).normalize_or_zero();
        let right = forward.cross(Vec3::Y).normalize_or_zero();
        let up = right.cross(forward);
        self.goal.target += (-right * dx + up * dy) * per_pixel;
    }

    /// Ease the visible pose toward the goal. `damping` is the fraction of
    /// the gap closed per 60 Hz frame; a zero step changes nothing.
    pub fn update(&mut self, dt: f32) {
        if dt.is_nan() || dt <= 0.0 {
            return;
        }
        let alpha = if self.damping <= 0.0 || self.damping >= 1.0 {
            1.0
        } else {
            1.0 - (1.0 - self.damping).powf(dt * REFERENCE_FPS)
        };
        self.current = self.current.lerp(&self.goal, alpha);
        self.current.distance = self.current.distance.clamp(self.min_distance, self.max_distance);
    }

    pub fn resize(&mut self, width: u32, height: u32) {
        if width == 0 || height == 0 {
            return;
        }
        self.viewport_height = height as f32;
        self.projection.aspect = width as f32 / height as f32;
    }

    pub fn eye(&self) -> Vec3 {
        self.current.eye()
    }

    pub fn target(&self) -> Vec3 {
        self.current.target
    }

    pub fn distance(&self) -> f32 {
        self.current.distance
    }

    pub fn pose(&self) -> OrbitPose {
        self.current
    }

    pub fn goal(&self) -> OrbitPose {
        self.goal
    }

    pub fn projection(&self) -> Projection {
        self.projection
    }

    pub fn is_settled(&self) -> bool {
        const EPS: f32 = 1e-4;
        (self.goal.azimuth - self.current.azimuth).abs() < EPS
            && (self.goal.polar - self.current.polar).abs() < EPS
            && (self.goal.distance - self.current.distance).abs() < EPS
            && self.goal.target.distance(self.current.target) < EPS
    }

    pub fn view_matrix(&self) -> Mat4 {
        Mat4::look_at_rh(self.eye(), self.current.target, Vec3::Y)
    }

    pub fn view_projection(&self) -> Mat4 {
        self.projection.matrix() * self.view_matrix()
    }

    fn set_goal_distance(&mut self, distance: f32) {
        self.goal.distance = distance.clamp(self.min_distance, self.max_distance);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn controller() -> OrbitController {
        OrbitController::new(&CameraConfig::default())
    }

    fn settle(c: &mut OrbitController) {
        for _ in 0..600 {
            c.update(1.0 / 60.0);
        }
    }

    #[test]
    fn starts_at_configured_eye() {
        let c = controller();
        let eye = c.eye();
        assert!((eye - Vec3::new(0.0, 3.8, 12.0)).length() < 1e-4);
        assert!(c.is_settled());
    }

    #[test]
    fn extreme_zoom_stays_within_limits() {
        let mut c = controller();
        c.zoom(10_000.0);
        settle(&mut c);
        assert!((c.distance() - 6.0).abs() < 1e-3);

        c.zoom(-10_000.0);
        for _ in 0..600 {
            c.update(1.0 / 60.0);
            assert!(c.distance() <= 30.0 + 1e-4);
        }
        assert!((c.distance() - 30.0).abs() < 1e-3);

        c.pinch(1e-6);
        c.update(1.0);
        assert!(c.distance() <= 30.0 + 1e-4);
    }

    #[test]
    fn zero_dt_changes_nothing() {
        let mut c = controller();
        c.rotate(200.0, 50.0);
        let before = c.pose();
        c.update(0.0);
        assert_eq!(c.pose(), before);
        c.update(-1.0);
        assert_eq!(c.pose(), before);
    }

    #[test]
    fn damping_converges_to_goal() {
        let mut c = controller();
        c.rotate(120.0, 0.0);
        c.update(1.0 / 60.0);
        assert!(!c.is_settled());
        let first = (c.goal().azimuth - c.pose().azimuth).abs();
        c.update(1.0 / 60.0);
        let second = (c.goal().azimuth - c.pose().azimuth).abs();
        assert!(second < first);
        settle(&mut c);
        assert!(c.is_settled());
    }

    #[test]
    fn damping_is_frame_rate_independent() {
        let mut fast = controller();
        let mut slow = controller();
        fast.rotate(300.0, 0.0);
        slow.rotate(300.0, 0.0);
        for _ in 0..4 {
            fast.update(1.0 / 120.0);
        }
        slow.update(1.0 / 30.0);
        assert!((fast.pose().azimuth - slow.pose().azimuth).abs() < 1e-4);
    }

    #[test]
    fn polar_angle_never_flips_over_the_pole() {
        let mut c = controller();
        c.rotate(0.0, 1e6);
        settle(&mut c);
        let eye = c.eye();
        assert!(eye.y > 0.0);
        assert!(!c.view_matrix().is_nan());
        c.rotate(0.0, -1e6);
        settle(&mut c);
        assert!(c.eye().y < 0.0);
        assert!(!c.view_projection().is_nan());
    }

    #[test]
    fn pan_moves_target_and_eye_together() {
        let mut c = controller();
        let offset_before = c.eye() - c.target();
        c.pan(40.0, 0.0);
        settle(&mut c);
        assert!(c.target().x < 0.0);
        let offset_after = c.eye() - c.target();
        assert!((offset_after - offset_before).length() < 1e-3);
    }

    #[test]
    fn resize_updates_aspect_and_ignores_zero() {
        let mut c = controller();
        c.resize(800, 400);
        assert!((c.projection().aspect - 2.0).abs() < 1e-6);
        c.resize(0, 400);
        assert!((c.projection().aspect - 2.0).abs() < 1e-6);
    }

    #[test]
    fn gestures_route_to_controls() {
        let mut c = controller();
        let start = c.goal().distance;
        c.apply(Gesture::Zoom { steps: 1.0 });
        assert!(c.goal().distance < start);
        c.apply(Gesture::Pinch { scale: 0.5 });
        assert!(c.goal().distance > start * 0.9);
    }
}
