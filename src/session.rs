use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::errors::{CatMoodError, Result};
use crate::ingest::{ingest, ingest_file, UploadedImage};
use crate::labels::{MoodResult, MoodTable};
use crate::predictor::Predictor;
use crate::preprocess::preprocess;
use crate::provider::ModelProvider;
use crate::traits::MoodClassifier;

/// Everything the page shows about the current upload.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SessionState {
    /// Data URI of the most recent upload.
    pub image: Option<String>,
    pub mood: Option<String>,
    pub caption: Option<String>,
    pub requires_attention: Option<bool>,
    pub analyzing: bool,
    pub error: Option<String>,
}

#[derive(Debug)]
pub enum UploadOutcome {
    /// The upload was the latest one and its result is now on screen.
    Applied(MoodResult),
    /// The upload was the latest one and failed; the error is on screen.
    Failed(CatMoodError),
    /// A later upload replaced this one before it finished.
    Superseded,
}

struct Slot {
    token: u64,
    state: SessionState,
}

/// One page session: a model provider, the mood table, and the state of the
/// latest upload.
///
/// Each upload takes a ticket from a monotonically increasing counter. Only
/// the holder of the newest ticket may write to the session state, so a slow
/// earlier upload can never overwrite a later one.
pub struct MoodSession<M> {
    predictor: Predictor<M>,
    table: Arc<MoodTable>,
    next_token: AtomicU64,
    slot: Mutex<Slot>,
}

impl<M: MoodClassifier + 'static> MoodSession<M> {
    pub fn new(provider: Arc<ModelProvider<M>>, table: Arc<MoodTable>) -> Self {
        Self {
            predictor: Predictor::new(provider, table.len()),
            table,
            next_token: AtomicU64::new(0),
            slot: Mutex::new(Slot {
                token: 0,
                state: SessionState::default(),
            }),
        }
    }

    pub fn state(&self) -> SessionState {
        self.slot.lock().state.clone()
    }

    pub fn provider(&self) -> &Arc<ModelProvider<M>> {
        self.predictor.provider()
    }

    /// Uploads are accepted only once the model is ready.
    pub fn can_upload(&self) -> bool {
        self.provider().is_ready()
    }

    pub async fn upload(&self, bytes: Vec<u8>, declared_mime: Option<&str>) -> UploadOutcome {
        self.submit(ingest(bytes, declared_mime)).await
    }

    /// Upload an image file from disk, with its MIME type declared from the
    /// extension.
    pub async fn upload_file(&self, path: &Path) -> UploadOutcome {
        self.submit(ingest_file(path)).await
    }

    async fn submit(&self, image: Result<UploadedImage>) -> UploadOutcome {
        let token = self.next_token.fetch_add(1, Ordering::SeqCst) + 1;

        let image = match image {
            Ok(image) => image,
            Err(e) => {
                self.begin(token, None);
                return self.finish(token, Err(e));
            }
        };

        self.begin(token, Some(image.data_uri()));
        let result = self.analyze(image).await;
        self.finish(token, result)
    }

    async fn analyze(&self, image: UploadedImage) -> Result<MoodResult> {
        if !self.provider().is_ready() {
            return Err(CatMoodError::ModelNotReady);
        }

        let tensor = tokio::task::spawn_blocking(move || preprocess(&image))
            .await
            .map_err(|e| CatMoodError::inference(format!("preprocessing task aborted: {e}")))??;
        let scores = self.predictor.predict(tensor).await?;
        self.table.resolve(&scores)
    }

    /// Reset the visible state for a new upload, unless a newer upload has
    /// already claimed it.
    fn begin(&self, token: u64, image: Option<String>) {
        let mut slot = self.slot.lock();
        if token < slot.token {
            return;
        }
        slot.token = token;
        slot.state = SessionState {
            image,
            analyzing: true,
            ..SessionState::default()
        };
    }

    fn finish(&self, token: u64, result: Result<MoodResult>) -> UploadOutcome {
        let mut slot = self.slot.lock();
        if slot.token != token {
            debug!(token, latest = slot.token, "discarding superseded upload result");
            return UploadOutcome::Superseded;
        }

        slot.state.analyzing = false;
        match result {
            Ok(mood) => {
                info!(token, mood = %mood.label, confidence = mood.confidence, "mood resolved");
                slot.state.mood = Some(mood.label.clone());
                slot.state.caption = Some(mood.caption.clone());
                slot.state.requires_attention = Some(mood.requires_attention);
                slot.state.error = None;
                UploadOutcome::Applied(mood)
            }
            Err(e) => {
                warn!(token, error = %e, "upload failed");
                slot.state.mood = None;
                slot.state.caption = None;
                slot.state.requires_attention = None;
                slot.state.error = Some(e.user_message().to_string());
                UploadOutcome::Failed(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mocks::{create_mock_model, solid_png, MockMoodClassifier, ScriptedModelSource};
    use crate::provider::RetryPolicy;
    use std::time::Duration;

    async fn session(mock: MockMoodClassifier) -> MoodSession<MockMoodClassifier> {
        let provider = Arc::new(ModelProvider::new(
            ScriptedModelSource::new(mock, 0),
            RetryPolicy::default(),
        ));
        provider.acquire().await.unwrap();
        MoodSession::new(provider, Arc::new(MoodTable::default()))
    }

    #[tokio::test]
    async fn test_upload_applies_mood() {
        let session = session(create_mock_model()).await;

        let mood = match session.upload(solid_png(32, 32, 255), Some("image/png")).await {
            UploadOutcome::Applied(mood) => mood,
            other => panic!("expected applied outcome, got {other:?}"),
        };
        assert_eq!(mood.label, "Neutrality");

        let state = session.state();
        assert_eq!(state.mood.as_deref(), Some("Neutrality"));
        assert_eq!(state.caption.as_deref(), Some("今天我感觉平静，不急不躁。"));
        assert_eq!(state.requires_attention, Some(false));
        assert!(!state.analyzing);
        assert!(state.image.unwrap().starts_with("data:image/png;base64,"));
    }

    #[tokio::test]
    async fn test_failed_upload_clears_previous_mood() {
        let session = session(create_mock_model()).await;
        session.upload(solid_png(8, 8, 0), None).await;
        assert_eq!(session.state().mood.as_deref(), Some("Angry"));

        let outcome = session.upload(b"not an image".to_vec(), Some("image/jpeg")).await;
        assert!(matches!(
            outcome,
            UploadOutcome::Failed(CatMoodError::UnreadableImage { .. })
        ));

        let state = session.state();
        assert_eq!(state.mood, None);
        assert_eq!(state.caption, None);
        assert_eq!(state.image, None);
        assert!(state.error.is_some());
    }

    #[tokio::test]
    async fn test_new_upload_resets_state_before_inference() {
        let session = Arc::new(
            session(create_mock_model().with_dark_delay(Duration::from_millis(300))).await,
        );
        session.upload(solid_png(8, 8, 255), None).await;
        assert_eq!(session.state().mood.as_deref(), Some("Neutrality"));

        let dark = solid_png(8, 8, 0);
        let dark_uri = ingest(dark.clone(), None).unwrap().data_uri();
        let task = tokio::spawn({
            let session = session.clone();
            async move { session.upload(dark, None).await }
        });

        let in_flight = loop {
            let state = session.state();
            if state.analyzing {
                break state;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        };
        assert_eq!(in_flight.mood, None);
        assert_eq!(in_flight.caption, None);
        assert_eq!(in_flight.requires_attention, None);
        assert_eq!(in_flight.error, None);
        assert_eq!(in_flight.image.as_deref(), Some(dark_uri.as_str()));

        let outcome = task.await.unwrap();
        assert!(matches!(outcome, UploadOutcome::Applied(ref mood) if mood.label == "Angry"));
        assert!(!session.state().analyzing);
    }

    #[tokio::test]
    async fn test_upload_file_sniffs_and_applies() {
        let session = session(create_mock_model()).await;
        let dir = tempfile::TempDir::new().unwrap();

        let photo = dir.path().join("cat.png");
        std::fs::write(&photo, solid_png(8, 8, 0)).unwrap();
        let outcome = session.upload_file(&photo).await;
        assert!(matches!(outcome, UploadOutcome::Applied(ref mood) if mood.label == "Angry"));

        let missing = session.upload_file(&dir.path().join("gone.png")).await;
        assert!(matches!(
            missing,
            UploadOutcome::Failed(CatMoodError::FileSystem { .. })
        ));
        assert_eq!(session.state().mood, None);
    }

    #[tokio::test]
    async fn test_upload_before_model_ready() {
        let mock = create_mock_model();
        let provider = Arc::new(ModelProvider::new(
            ScriptedModelSource::new(mock.clone(), 0),
            RetryPolicy::default(),
        ));
        let session = MoodSession::new(provider, Arc::new(MoodTable::default()));
        assert!(!session.can_upload());

        let outcome = session.upload(solid_png(8, 8, 0), None).await;
        assert!(matches!(
            outcome,
            UploadOutcome::Failed(CatMoodError::ModelNotReady)
        ));
        assert_eq!(mock.calls(), 0);
        assert_eq!(
            session.state().error.as_deref(),
            Some(CatMoodError::ModelNotReady.user_message())
        );
    }

    #[tokio::test]
    async fn test_inference_fault_keeps_session_alive() {
        let session = session(MockMoodClassifier::panicking(6)).await;

        let outcome = session.upload(solid_png(8, 8, 0), None).await;
        assert!(matches!(
            outcome,
            UploadOutcome::Failed(CatMoodError::InferenceFailed { .. })
        ));
        assert_eq!(
            session.state().error.as_deref(),
            Some("Image analysis failed.")
        );
    }
}
