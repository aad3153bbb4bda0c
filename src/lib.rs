pub mod batch;
pub mod card;
pub mod config;
pub mod diary;
pub mod errors;
pub mod fetch;
pub mod ingest;
pub mod labels;
pub mod model;
pub mod predictor;
pub mod preprocess;
pub mod provider;
pub mod session;
pub mod traits;

pub mod mocks;

pub use card::{MoodCard, SharePayload};
pub use config::Config;
pub use errors::{CatMoodError, Result};
pub use labels::{MoodResult, MoodTable};
pub use model::{Model, OnnxModelSource};
pub use predictor::Predictor;
pub use provider::{ModelProvider, ModelState, ModelStatus, RetryPolicy};
pub use session::{MoodSession, SessionState, UploadOutcome};
pub use traits::*;
