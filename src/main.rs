use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, ensure, Context, Result};
use cat_mood::{
    batch::classify_directory,
    config::OutputFormat,
    diary::{DiaryClient, DiaryPrompt},
    Config, ModelProvider, MoodCard, MoodSession, MoodTable, OnnxModelSource, Predictor,
    UploadOutcome,
};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::warn;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let config = Config::parse();

    ensure!(config.input.exists(), "Input path does not exist");

    let table = Arc::new(match &config.moods {
        Some(path) => MoodTable::from_json_file(path)
            .with_context(|| format!("Invalid mood table: {}", path.display()))?,
        None => MoodTable::default(),
    });

    let source = OnnxModelSource::new(
        config.model_location(),
        config.cache_dir.clone(),
        config.device_id,
        table.clone(),
    );
    let provider = Arc::new(ModelProvider::new(source, config.retry_policy()));

    let spinner = ProgressBar::new_spinner();
    spinner.set_style(ProgressStyle::with_template("{spinner:.green} {msg}")?);
    spinner.set_message("Loading model...");
    spinner.enable_steady_tick(Duration::from_millis(100));
    let loaded = provider.acquire().await;
    spinner.finish_and_clear();
    if let Err(e) = loaded {
        bail!("{} ({e})", e.user_message());
    }

    if config.input.is_dir() {
        let predictor = Predictor::new(provider.clone(), table.len());
        let items = classify_directory(&predictor, &table, &config.input, true).await?;
        match config.output {
            OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&items)?),
            OutputFormat::Text => {
                for item in &items {
                    match (&item.result, &item.error) {
                        (Some(mood), _) => println!(
                            "{}: {} ({:.1}%)",
                            item.image_id,
                            mood.label,
                            mood.confidence * 100.0
                        ),
                        (None, Some(error)) => println!("{}: {error}", item.image_id),
                        (None, None) => {}
                    }
                }
            }
        }
        return Ok(());
    }

    let session = MoodSession::new(provider, table);
    let mood = match session.upload_file(&config.input).await {
        UploadOutcome::Applied(mood) => mood,
        UploadOutcome::Failed(e) => bail!("{} ({e})", e.user_message()),
        UploadOutcome::Superseded => bail!("Upload was superseded"),
    };

    let mut card = MoodCard::new(&mood, session.state().image, config.share_url.as_deref());
    if let Some(endpoint) = &config.diary_endpoint {
        let prompt = DiaryPrompt::new(&mood.label, &config.time_of_day, &config.personality);
        match DiaryClient::new(endpoint.as_str()).generate(&prompt).await {
            Ok(diary) => card = card.with_diary(diary),
            Err(e) => warn!(error = %e, "diary generation failed, keeping the fixed caption"),
        }
    }

    match config.output {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&card)?),
        OutputFormat::Text => println!("{card}"),
    }

    Ok(())
}
