//! Stage kernel: the state one viewport animates and the loop that drives it.
//!
//! # Invariants
//! - Every dynamic entity stays inside its vertical band; entities wrap, never vanish.
//! - Animated light intensity stays within `base ± amplitude`.
//! - A zero time step leaves every position unchanged.
//! - A stopped frame loop never advances the stage again.

pub mod clock;
pub mod dynamics;
pub mod frame_loop;
pub mod lights;
pub mod stage;

pub use clock::Clock;
pub use dynamics::{Bobbers, DynamicElementSet, ElementKind, Particles, Snow, Sprite, Steam};
pub use frame_loop::{FrameLoop, FrameReport, FrameState};
pub use lights::{Light, LightKind, LightRig, MAX_LIGHTS};
pub use stage::Stage;
