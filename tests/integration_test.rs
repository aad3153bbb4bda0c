use std::sync::Arc;
use std::time::Duration;

use cat_mood::ingest::ingest;
use cat_mood::mocks::{create_mock_model, solid_png, MockMoodClassifier, ScriptedModelSource};
use cat_mood::{
    CatMoodError, ModelProvider, ModelState, MoodSession, MoodTable, RetryPolicy, UploadOutcome,
};

async fn ready_session(mock: MockMoodClassifier) -> MoodSession<MockMoodClassifier> {
    let provider = Arc::new(ModelProvider::new(
        ScriptedModelSource::new(mock, 0),
        RetryPolicy::default(),
    ));
    provider.acquire().await.unwrap();
    MoodSession::new(provider, Arc::new(MoodTable::default()))
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_later_upload_wins_when_earlier_finishes_last() {
    // Dark images take the slow path, so upload A (dark) resolves after B (bright).
    let session =
        ready_session(create_mock_model().with_dark_delay(Duration::from_millis(400))).await;

    let (a, b) = tokio::join!(session.upload(solid_png(64, 64, 0), Some("image/png")), async {
        tokio::time::sleep(Duration::from_millis(50)).await;
        session.upload(solid_png(64, 64, 255), Some("image/png")).await
    });

    assert!(matches!(a, UploadOutcome::Superseded));
    assert!(matches!(b, UploadOutcome::Applied(ref mood) if mood.label == "Neutrality"));

    let b_uri = ingest(solid_png(64, 64, 255), None).unwrap().data_uri();
    let a_uri = ingest(solid_png(64, 64, 0), None).unwrap().data_uri();
    let state = session.state();
    assert_eq!(state.mood.as_deref(), Some("Neutrality"));
    assert_eq!(state.requires_attention, Some(false));
    assert_eq!(state.image.as_deref(), Some(b_uri.as_str()));
    assert_ne!(state.image.as_deref(), Some(a_uri.as_str()));
    assert!(!state.analyzing);
}

#[tokio::test]
async fn test_sequential_uploads_both_apply() {
    let session = ready_session(create_mock_model()).await;

    let first = session.upload(solid_png(16, 16, 0), None).await;
    assert!(matches!(first, UploadOutcome::Applied(ref mood) if mood.label == "Angry"));
    assert_eq!(session.state().requires_attention, Some(true));

    let second = session.upload(solid_png(16, 16, 255), None).await;
    assert!(matches!(second, UploadOutcome::Applied(_)));
    assert_eq!(session.state().mood.as_deref(), Some("Neutrality"));
}

#[tokio::test(start_paused = true)]
async fn test_model_recovers_on_third_attempt_then_serves_uploads() {
    let source = ScriptedModelSource::new(create_mock_model(), 2);
    let provider = Arc::new(ModelProvider::new(source.clone(), RetryPolicy::default()));
    let session = MoodSession::new(provider.clone(), Arc::new(MoodTable::default()));

    assert!(!session.can_upload());
    provider.acquire().await.unwrap();

    assert_eq!(source.attempts(), 3);
    assert_eq!(provider.state(), ModelState::Ready);
    assert!(provider.status().message.is_none());
    assert!(session.can_upload());

    let outcome = session.upload(solid_png(8, 8, 255), None).await;
    assert!(matches!(outcome, UploadOutcome::Applied(_)));
}

#[tokio::test(start_paused = true)]
async fn test_exhausted_retries_block_uploads() {
    let mock = create_mock_model();
    let provider = Arc::new(ModelProvider::new(
        ScriptedModelSource::always_failing(mock.clone()),
        RetryPolicy::new(3, Duration::from_secs(2)),
    ));
    let session = MoodSession::new(provider.clone(), Arc::new(MoodTable::default()));

    assert!(matches!(
        provider.acquire().await,
        Err(CatMoodError::ModelLoadFailed { attempts: 3, .. })
    ));
    assert_eq!(provider.state(), ModelState::LoadFailed);

    let outcome = session.upload(solid_png(8, 8, 255), None).await;
    assert!(matches!(
        outcome,
        UploadOutcome::Failed(CatMoodError::ModelNotReady)
    ));
    assert_eq!(mock.calls(), 0);
}

#[test]
fn test_default_table_matches_mock_width() {
    let table = MoodTable::default();
    assert_eq!(table.len(), 6);
    assert!(table.ensure_output_len(6).is_ok());
    assert!(table.labels().iter().all(|l| table.caption(l).is_some()));
}
