use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use std::time::Duration;

use crate::fetch::ModelLocation;
use crate::provider::RetryPolicy;

pub const DEFAULT_MODEL_LOCATION: &str = "model/model.onnx";

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Parser, Debug, Clone)]
#[command(version, about, long_about = None)]
pub struct Config {
    /// Photo to analyze, or a directory of photos for a batch run
    pub input: PathBuf,

    /// Model path, or an http(s) URL in production
    #[arg(short, long, default_value = DEFAULT_MODEL_LOCATION, value_parser = check_model_location)]
    pub model: String,

    /// Directory used to force-cache a downloaded model
    #[arg(long)]
    pub cache_dir: Option<PathBuf>,

    /// JSON mood table with `labels` and `captions`
    #[arg(long)]
    pub moods: Option<PathBuf>,

    #[arg(short, long, default_value_t = 0)]
    pub device_id: i32,

    #[arg(long, default_value_t = 3, value_parser = clap::value_parser!(u32).range(1..))]
    pub max_attempts: u32,

    #[arg(long, default_value_t = 2000)]
    pub retry_delay_ms: u64,

    #[arg(short, long, value_enum, default_value_t = OutputFormat::Text)]
    pub output: OutputFormat,

    /// Page URL placed in the share payload
    #[arg(long)]
    pub share_url: Option<String>,

    /// Text-generation endpoint for the diary line
    #[arg(long)]
    pub diary_endpoint: Option<String>,

    #[arg(long, default_value = "好奇")]
    pub personality: String,

    #[arg(long, default_value = "今天")]
    pub time_of_day: String,
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}

impl Config {
    pub fn new() -> Self {
        Self::parse()
    }

    pub const fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.max_attempts,
            Duration::from_millis(self.retry_delay_ms),
        )
    }

    pub fn model_location(&self) -> ModelLocation {
        ModelLocation::parse(&self.model)
    }
}

fn check_model_location(s: &str) -> Result<String, String> {
    let s = s.trim();
    if s.is_empty() {
        return Err("model location must not be empty".to_string());
    }
    if let ModelLocation::Url(url) = ModelLocation::parse(s) {
        let rest = url.split_once("://").map(|(_, rest)| rest).unwrap_or("");
        if rest.is_empty() || rest.starts_with('/') {
            return Err(format!("{s} is missing a host"));
        }
    }
    Ok(s.to_string())
}
