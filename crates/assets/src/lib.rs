//! Optional model import: a glTF/GLB file becomes meshes and materials that
//! can be attached to the scene graph.
//!
//! Loading is fallible and never fatal: [`apply_model`] logs the error and
//! the procedural scene keeps rendering.

pub mod model;
pub mod request;

pub use model::{load_model, load_model_from_slice, model_transform, ImportedMesh, ImportedModel};
pub use request::{apply_model, ModelRequest};

use std::path::PathBuf;

/// Errors from model import.
#[derive(Debug, thiserror::Error)]
pub enum AssetError {
    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("glTF error: {0}")]
    Gltf(#[from] gltf::Error),
    #[error("{} contains no triangle meshes", path.display())]
    NoTriangles { path: PathBuf },
}

impl AssetError {
    /// The file simply is not there, as opposed to being unreadable or malformed.
    pub fn is_not_found(&self) -> bool {
        matches!(self, AssetError::Io { source, .. } if source.kind() == std::io::ErrorKind::NotFound)
    }
}
