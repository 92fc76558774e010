//! Camera input: device events become gestures, gestures drive a damped
//! orbit camera.
//!
//! # Invariants
//! - Camera distance stays within the configured limits.
//! - A zero time step leaves the camera pose unchanged.

pub mod gesture;
pub mod orbit;

pub use gesture::{Gesture, PointerButton, PointerTracker};
pub use orbit::{OrbitController, OrbitPose, Projection};
