use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use ndarray::prelude::*;
use ort::execution_providers::{CUDAExecutionProvider, TensorRTExecutionProvider};
use ort::session::{builder::SessionBuilder, Session};
use ort::value::TensorRef;
use parking_lot::Mutex;
use tracing::debug;

use crate::{
    errors::{CatMoodError, Result},
    fetch::{evict_cached, fetch_model_bytes, ModelLocation},
    labels::MoodTable,
    traits::{MoodClassifier, ModelSource},
};

/// Pretrained mood classifier backed by ONNX Runtime.
pub struct Model {
    input_name: String,
    output_name: String,
    num_classes: Option<usize>,
    session: Mutex<Session>,
}

impl Model {
    pub fn from_bytes(bytes: &[u8], device_id: i32) -> Result<Self> {
        let session = SessionBuilder::new()
            .map_err(|e| CatMoodError::Model {
                operation: "session builder init".to_string(),
                source: Box::new(e),
            })?
            .with_execution_providers([
                TensorRTExecutionProvider::default()
                    .with_device_id(device_id)
                    .build(),
                CUDAExecutionProvider::default()
                    .with_device_id(device_id)
                    .build(),
            ])
            .map_err(|e| CatMoodError::Model {
                operation: "execution provider setup".to_string(),
                source: Box::new(e),
            })?
            .with_memory_pattern(true)
            .map_err(|e| CatMoodError::Model {
                operation: "memory pattern setup".to_string(),
                source: Box::new(e),
            })?
            .commit_from_memory(bytes)
            .map_err(|e| CatMoodError::Model {
                operation: "model deserialization".to_string(),
                source: Box::new(e),
            })?;

        let input_name = session
            .inputs
            .first()
            .map(|input| input.name.clone())
            .ok_or_else(|| CatMoodError::config("model declares no inputs"))?;
        let output = session
            .outputs
            .first()
            .ok_or_else(|| CatMoodError::config("model declares no outputs"))?;
        let output_name = output.name.clone();

        // Dynamic dimensions are reported as -1 and checked per inference instead.
        let num_classes = output
            .output_type
            .tensor_shape()
            .and_then(|shape| shape.last().copied())
            .and_then(|dim| usize::try_from(dim).ok())
            .filter(|&dim| dim > 0);

        debug!(input = %input_name, output = %output_name, ?num_classes, "model session ready");

        Ok(Self {
            input_name,
            output_name,
            num_classes,
            session: Mutex::new(session),
        })
    }
}

impl MoodClassifier for Model {
    fn predict(&self, tensor: ArrayView4<f32>) -> Result<Vec<f32>> {
        let mut binding = self.session.lock();
        let outputs = binding.run(ort::inputs![
            self.input_name.as_str() => TensorRef::from_array_view(&tensor.as_standard_layout())?
        ])?;
        let scores = outputs[self.output_name.as_str()].try_extract_array::<f32>()?;
        Ok(scores.iter().copied().collect())
    }

    fn num_classes(&self) -> Option<usize> {
        self.num_classes
    }
}

/// Fetches the ONNX asset and builds a [`Model`] from it, checking the
/// model's output width against the mood table.
pub struct OnnxModelSource {
    location: ModelLocation,
    cache_dir: Option<PathBuf>,
    device_id: i32,
    table: Arc<MoodTable>,
}

impl OnnxModelSource {
    pub fn new(
        location: ModelLocation,
        cache_dir: Option<PathBuf>,
        device_id: i32,
        table: Arc<MoodTable>,
    ) -> Self {
        Self {
            location,
            cache_dir,
            device_id,
            table,
        }
    }
}

#[async_trait]
impl ModelSource<Model> for OnnxModelSource {
    async fn load(&self) -> Result<Model> {
        let bytes = fetch_model_bytes(&self.location, self.cache_dir.as_deref()).await?;

        let device_id = self.device_id;
        let built = tokio::task::spawn_blocking(move || Model::from_bytes(&bytes, device_id))
            .await
            .map_err(|e| CatMoodError::Model {
                operation: "model loading task".to_string(),
                source: Box::new(e),
            })?;
        let model = match built {
            Ok(model) => model,
            Err(e) => {
                // Whatever was served is not a model; don't keep serving it from cache.
                evict_cached(&self.location, self.cache_dir.as_deref()).await?;
                return Err(e);
            }
        };

        if let Some(classes) = model.num_classes() {
            self.table.ensure_output_len(classes)?;
        }
        Ok(model)
    }

    fn describe(&self) -> String {
        self.location.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_garbage_bytes_are_model_error() {
        let result = Model::from_bytes(b"definitely not onnx", 0);
        assert!(matches!(result, Err(CatMoodError::Model { .. })));
    }

    #[tokio::test]
    async fn test_unusable_cached_asset_is_evicted() -> Result<()> {
        let dir = TempDir::new()?;
        let cached = dir.path().join("mood.onnx");
        std::fs::write(&cached, b"<html>Bad Gateway</html>")?;
        let source = OnnxModelSource::new(
            ModelLocation::parse("http://127.0.0.1:9/assets/mood.onnx"),
            Some(dir.path().to_path_buf()),
            0,
            Arc::new(MoodTable::default()),
        );

        assert!(matches!(source.load().await, Err(CatMoodError::Model { .. })));
        assert!(!cached.exists());
        Ok(())
    }

    #[tokio::test]
    async fn test_missing_asset_fails_before_session() -> Result<()> {
        let dir = TempDir::new()?;
        let source = OnnxModelSource::new(
            ModelLocation::Path(dir.path().join("absent.onnx")),
            None,
            0,
            Arc::new(MoodTable::default()),
        );
        assert!(matches!(
            source.load().await,
            Err(CatMoodError::FileSystem { .. })
        ));
        assert!(source.describe().ends_with("absent.onnx"));
        Ok(())
    }
}
