use crate::model::{load_model, ImportedModel};
use crate::AssetError;
use cafescene_common::Transform;
use cafescene_kernel::Stage;
use cafescene_scene::NodeId;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver, TryRecvError};
use std::thread;

/// A model load running on a background thread.
///
/// The render thread polls once per frame. Dropping the request abandons
/// the result; the loader thread finishes and its send is discarded.
#[derive(Debug)]
pub struct ModelRequest {
    path: PathBuf,
    rx: Option<Receiver<Result<ImportedModel, AssetError>>>,
}

impl ModelRequest {
    pub fn spawn(path: impl AsRef<Path>) -> Result<Self, AssetError> {
        let path = path.as_ref().to_path_buf();
        let (tx, rx) = mpsc::channel();
        let job = path.clone();
        thread::Builder::new()
            .name("model-loader".into())
            .spawn(move || {
                let _ = tx.send(load_model(&job));
            })
            .map_err(|source| AssetError::Io {
                path: path.clone(),
                source,
            })?;
        tracing::debug!(path = %path.display(), "model load started");
        Ok(Self { path, rx: Some(rx) })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_pending(&self) -> bool {
        self.rx.is_some()
    }

    /// The load result, exactly once. `None` while loading and after
    /// the result has been taken.
    pub fn poll(&mut self) -> Option<Result<ImportedModel, AssetError>> {
        let rx = self.rx.as_ref()?;
        match rx.try_recv() {
            Ok(result) => {
                self.rx = None;
                Some(result)
            }
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => {
                tracing::warn!(path = %self.path.display(), "model loader exited without a result");
                self.rx = None;
                None
            }
        }
    }
}

/// Hand a finished load to `stage`. A missing file is expected and logged
/// at `info`; any other failure is a `warn`. Either way the stage keeps its
/// procedural content.
pub fn apply_model(
    stage: &mut Stage,
    path: &Path,
    result: Result<ImportedModel, AssetError>,
    transform: Transform,
) -> Option<NodeId> {
    let path = path.display();
    match result {
        Ok(model) => {
            let node = stage.attach_model(|graph| model.attach(graph, transform));
            tracing::info!(%path, triangles = model.triangle_count(), "model loaded");
            Some(node)
        }
        Err(e) if e.is_not_found() => {
            tracing::info!(%path, "no model file; showing the scene without it");
            None
        }
        Err(e) => {
            tracing::warn!(%path, "model failed to load: {e}");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::tests::TRIANGLE;
    use cafescene_common::SceneConfig;
    use cafescene_scene::LabelPainter;
    use std::io::Write;
    use std::time::{Duration, Instant};

    fn stage() -> Stage {
        Stage::new(&SceneConfig::default(), &LabelPainter::bitmap())
    }

    fn wait(request: &mut ModelRequest) -> Option<Result<ImportedModel, AssetError>> {
        let deadline = Instant::now() + Duration::from_secs(10);
        while Instant::now() < deadline {
            if let Some(result) = request.poll() {
                return Some(result);
            }
            thread::sleep(Duration::from_millis(5));
        }
        None
    }

    #[test]
    fn missing_file_reports_not_found_once() {
        let mut request = ModelRequest::spawn("no/such/model.glb").unwrap();
        assert!(request.is_pending());
        let result = wait(&mut request).expect("loader should answer");
        assert!(result.unwrap_err().is_not_found());
        assert!(!request.is_pending());
        assert!(request.poll().is_none());
    }

    #[test]
    fn failed_request_leaves_the_scene_intact() {
        let mut stage = stage();
        let nodes = stage.graph.len();
        let mut request = ModelRequest::spawn("no/such/model.glb").unwrap();
        let result = wait(&mut request).expect("loader should answer");
        let attached = apply_model(&mut stage, request.path(), result, Transform::default());

        assert_eq!(attached, None);
        assert_eq!(stage.model(), None);
        assert_eq!(stage.graph.len(), nodes);
        for name in ["back_wall", "left_wall", "right_wall", "counter", "signage", "banner"] {
            assert!(stage.graph.find(name).is_some(), "missing {name}");
        }
    }

    #[test]
    fn malformed_file_is_not_attached() {
        let mut file = tempfile::Builder::new().suffix(".gltf").tempfile().unwrap();
        file.write_all(b"{ \"asset\": 7 }").unwrap();
        let mut stage = stage();
        let mut request = ModelRequest::spawn(file.path()).unwrap();
        let result = wait(&mut request).expect("loader should answer");
        assert!(apply_model(&mut stage, request.path(), result, Transform::default()).is_none());
        assert_eq!(stage.model(), None);
    }

    #[test]
    fn loaded_model_joins_the_stage() {
        let mut file = tempfile::Builder::new().suffix(".gltf").tempfile().unwrap();
        file.write_all(TRIANGLE.as_bytes()).unwrap();
        let mut stage = stage();
        let mut request = ModelRequest::spawn(file.path()).unwrap();
        let result = wait(&mut request).expect("loader should answer");
        let transform = Transform::from_position(glam::Vec3::new(0.0, 0.0, 1.2));
        let node = apply_model(&mut stage, request.path(), result, transform).unwrap();

        assert_eq!(stage.model(), Some(node));
        assert_eq!(stage.graph.find("model"), Some(node));
        assert_eq!(stage.graph.subtree_len(node), 2);
        assert!(stage.graph.find("counter").is_some());
    }

    #[test]
    fn dropping_a_request_is_harmless() {
        let request = ModelRequest::spawn("no/such/model.glb").unwrap();
        assert_eq!(request.path(), Path::new("no/such/model.glb"));
        drop(request);
    }
}
