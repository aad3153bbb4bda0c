use std::path::{Path, PathBuf};

use indicatif::{ProgressBar, ProgressStyle};
use ndarray::Array4;
use rayon::prelude::*;
use serde::Serialize;
use tracing::warn;
use walkdir::WalkDir;

use crate::errors::{CatMoodError, Result};
use crate::ingest::ingest_file;
use crate::labels::{MoodResult, MoodTable};
use crate::predictor::Predictor;
use crate::preprocess::preprocess;
use crate::traits::MoodClassifier;

/// One entry of a batch run, keyed by the image's path relative to the
/// batch root.
#[derive(Debug, Serialize)]
pub struct BatchItem {
    pub image_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<MoodResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl BatchItem {
    fn from_result(image_id: String, result: Result<MoodResult>) -> Self {
        match result {
            Ok(mood) => Self {
                image_id,
                result: Some(mood),
                error: None,
            },
            Err(e) => {
                warn!(image = %image_id, error = %e, "batch item failed");
                Self {
                    image_id,
                    result: None,
                    error: Some(e.user_message().to_string()),
                }
            }
        }
    }
}

pub fn is_supported_image_format(path: &Path) -> bool {
    if let Some(extension) = path.extension().and_then(|ext| ext.to_str()) {
        matches!(
            extension.to_lowercase().as_str(),
            "jpg" | "jpeg" | "png" | "webp" | "bmp" | "gif" | "tiff" | "avif"
        )
    } else {
        false
    }
}

/// Image files under `root`, sorted so batch output is stable.
pub fn collect_image_files(root: &Path) -> Result<Vec<PathBuf>> {
    if !root.is_dir() {
        return Err(CatMoodError::FileSystem {
            path: root.to_path_buf(),
            operation: "list batch directory".to_string(),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "not a directory"),
        });
    }

    let mut files: Vec<PathBuf> = WalkDir::new(root)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file() && is_supported_image_format(e.path()))
        .map(|e| e.into_path())
        .collect();
    files.sort();
    Ok(files)
}

fn image_id(root: &Path, path: &Path) -> String {
    path.strip_prefix(root)
        .unwrap_or(path)
        .to_string_lossy()
        .replace('\\', "/")
}

/// Files decoded per parallel round. Bounds how many input tensors are
/// alive at once.
pub fn preprocess_chunk_len() -> usize {
    rayon::current_num_threads().max(1) * 2
}

/// Classify every image under `root`.
///
/// Files are taken in chunks: each chunk is decoded and resized in parallel,
/// then its forward passes run one at a time in file order before the next
/// chunk is read. A failing image is reported in its entry and the batch goes
/// on.
pub async fn classify_directory<M: MoodClassifier + 'static>(
    predictor: &Predictor<M>,
    table: &MoodTable,
    root: &Path,
    progress: bool,
) -> Result<Vec<BatchItem>> {
    if !predictor.provider().is_ready() {
        return Err(CatMoodError::ModelNotReady);
    }

    let files = collect_image_files(root)?;

    let pb = if progress {
        let pb = ProgressBar::new(files.len() as u64);
        pb.set_style(
            ProgressStyle::with_template(
                "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta})",
            )
            .map_err(|e| CatMoodError::config(e.to_string()))?
            .progress_chars("#>-"),
        );
        pb
    } else {
        ProgressBar::hidden()
    };

    let items = classify_files(predictor, table, root, &files, preprocess_chunk_len(), &pb).await;
    pb.finish_and_clear();
    items
}

async fn classify_files<M: MoodClassifier + 'static>(
    predictor: &Predictor<M>,
    table: &MoodTable,
    root: &Path,
    files: &[PathBuf],
    chunk_len: usize,
    pb: &ProgressBar,
) -> Result<Vec<BatchItem>> {
    let mut items = Vec::with_capacity(files.len());

    for chunk in files.chunks(chunk_len.max(1)) {
        let tensors: Vec<(String, Result<Array4<f32>>)> = {
            let root = root.to_path_buf();
            let chunk = chunk.to_vec();
            tokio::task::spawn_blocking(move || {
                chunk
                    .par_iter()
                    .map(|path| {
                        let tensor = ingest_file(path).and_then(|image| preprocess(&image));
                        (image_id(&root, path), tensor)
                    })
                    .collect::<Vec<_>>()
            })
            .await
            .map_err(|e| CatMoodError::inference(format!("preprocessing task aborted: {e}")))?
        };

        for (id, tensor) in tensors {
            let result = match tensor {
                Ok(tensor) => match predictor.predict(tensor).await {
                    Ok(scores) => table.resolve(&scores),
                    Err(e) => Err(e),
                },
                Err(e) => Err(e),
            };
            items.push(BatchItem::from_result(id, result));
            pb.inc(1);
        }
    }

    Ok(items)
}
