use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use tracing::{error, info, warn};

use crate::errors::{CatMoodError, Result};
use crate::traits::ModelSource;

/// Lifecycle of the model handle within a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelState {
    Absent,
    Loading { attempt: u32 },
    Ready,
    LoadFailed,
}

/// Fixed-delay retry schedule for model acquisition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub max_attempts: u32,
    pub delay: Duration,
}

impl RetryPolicy {
    pub const fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts,
            delay,
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_secs(2))
    }
}

/// Snapshot of the provider for display.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelStatus {
    pub state: ModelState,
    pub message: Option<String>,
}

struct ProviderState<M> {
    state: ModelState,
    model: Option<Arc<M>>,
    message: Option<String>,
    /// Attempts made so far, kept across cancelled `acquire` calls.
    attempts: u32,
    last_reason: Option<String>,
    failure: Option<(u32, String)>,
}

/// Acquires the classifier once per session.
///
/// Loads are single-flight: concurrent callers wait on the attempt already in
/// progress and share its outcome. A ready model is never reloaded, and a
/// terminal failure is never retried.
pub struct ModelProvider<M> {
    source: Box<dyn ModelSource<M>>,
    policy: RetryPolicy,
    inner: RwLock<ProviderState<M>>,
    load_lock: tokio::sync::Mutex<()>,
}

impl<M: Send + Sync + 'static> ModelProvider<M> {
    pub fn new(source: impl ModelSource<M> + 'static, policy: RetryPolicy) -> Self {
        Self {
            source: Box::new(source),
            policy,
            inner: RwLock::new(ProviderState {
                state: ModelState::Absent,
                model: None,
                message: None,
                attempts: 0,
                last_reason: None,
                failure: None,
            }),
            load_lock: tokio::sync::Mutex::new(()),
        }
    }

    pub fn state(&self) -> ModelState {
        self.inner.read().state
    }

    pub fn status(&self) -> ModelStatus {
        let inner = self.inner.read();
        ModelStatus {
            state: inner.state,
            message: inner.message.clone(),
        }
    }

    pub fn is_ready(&self) -> bool {
        self.inner.read().model.is_some()
    }

    /// The loaded model, without waiting for a load in progress.
    pub fn handle(&self) -> Option<Arc<M>> {
        self.inner.read().model.clone()
    }

    pub async fn acquire(&self) -> Result<Arc<M>> {
        if let Some(model) = self.handle() {
            return Ok(model);
        }

        let _guard = self.load_lock.lock().await;

        // Another caller may have finished while we waited.
        {
            let inner = self.inner.read();
            if let Some(model) = &inner.model {
                return Ok(model.clone());
            }
            if let Some((attempts, reason)) = &inner.failure {
                return Err(CatMoodError::ModelLoadFailed {
                    attempts: *attempts,
                    reason: reason.clone(),
                });
            }
        }

        let max_attempts = self.policy.max_attempts.max(1);

        // A caller dropped mid-chain leaves its attempt count behind; resume
        // after the wait it was cut off in.
        let resumed = self.inner.read().attempts;
        if resumed > 0 && resumed < max_attempts {
            info!(attempts = resumed, max_attempts, "resuming interrupted model load");
            tokio::time::sleep(self.policy.delay).await;
        }

        loop {
            let attempt = {
                let mut inner = self.inner.write();
                if inner.attempts >= max_attempts {
                    break;
                }
                inner.attempts += 1;
                inner.state = ModelState::Loading {
                    attempt: inner.attempts,
                };
                inner.attempts
            };
            info!(
                attempt,
                max_attempts,
                source = %self.source.describe(),
                "loading model"
            );

            match self.source.load().await {
                Ok(model) => {
                    let model = Arc::new(model);
                    let mut inner = self.inner.write();
                    inner.state = ModelState::Ready;
                    inner.model = Some(model.clone());
                    inner.message = None;
                    info!(attempt, "model ready");
                    return Ok(model);
                }
                Err(e) => {
                    warn!(attempt, error = %e, "model load attempt failed");
                    let transient = e.is_transient();
                    self.inner.write().last_reason = Some(e.to_string());
                    if !transient || attempt == max_attempts {
                        break;
                    }
                    self.inner.write().message = Some(format!(
                        "Model failed to load, retrying ({}/{max_attempts})...",
                        attempt + 1
                    ));
                    tokio::time::sleep(self.policy.delay).await;
                }
            }
        }

        let mut inner = self.inner.write();
        let attempts = inner.attempts;
        let reason = inner
            .last_reason
            .clone()
            .unwrap_or_else(|| "load was interrupted".to_string());
        let err = CatMoodError::ModelLoadFailed {
            attempts,
            reason: reason.clone(),
        };
        error!(attempts, %reason, "model load failed, giving up");

        inner.state = ModelState::LoadFailed;
        inner.message = Some(err.user_message().to_string());
        inner.failure = Some((attempts, reason));
        Err(err)
    }
}
