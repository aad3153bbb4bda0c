use std::sync::Arc;

use ndarray::Array4;
use tracing::warn;

use crate::errors::{CatMoodError, Result};
use crate::provider::ModelProvider;
use crate::traits::MoodClassifier;

/// Runs forward passes against the provider's model.
pub struct Predictor<M> {
    provider: Arc<ModelProvider<M>>,
    expected_len: usize,
}

impl<M> Clone for Predictor<M> {
    fn clone(&self) -> Self {
        Self {
            provider: self.provider.clone(),
            expected_len: self.expected_len,
        }
    }
}

impl<M: MoodClassifier + 'static> Predictor<M> {
    pub fn new(provider: Arc<ModelProvider<M>>, expected_len: usize) -> Self {
        Self {
            provider,
            expected_len,
        }
    }

    pub fn provider(&self) -> &Arc<ModelProvider<M>> {
        &self.provider
    }

    /// One forward pass. Fails with `ModelNotReady` without touching the
    /// model when no model is loaded yet; never waits for a load.
    ///
    /// The tensor moves into the inference task and is dropped there along
    /// with the runtime's output, whatever the outcome. Panics inside the
    /// runtime are reported as `InferenceFailed`.
    pub async fn predict(&self, tensor: Array4<f32>) -> Result<Vec<f32>> {
        let model = self.provider.handle().ok_or(CatMoodError::ModelNotReady)?;

        let scores = tokio::task::spawn_blocking(move || model.predict(tensor.view()))
            .await
            .map_err(|e| {
                warn!(error = %e, "inference task aborted");
                CatMoodError::inference(format!("inference task aborted: {e}"))
            })?
            .map_err(|e| match e {
                CatMoodError::InferenceFailed { .. } => e,
                other => {
                    warn!(error = %other, "forward pass failed");
                    CatMoodError::inference(other.to_string())
                }
            })?;

        if scores.len() != self.expected_len {
            return Err(CatMoodError::inference(format!(
                "model returned {} scores, expected {}",
                scores.len(),
                self.expected_len
            )));
        }
        Ok(scores)
    }
}
