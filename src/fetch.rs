use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::errors::{CatMoodError, Result};

/// Where the model asset lives: a relative path during development, a URL
/// in production.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModelLocation {
    Url(String),
    Path(PathBuf),
}

impl ModelLocation {
    pub fn parse(location: &str) -> Self {
        if location.starts_with("http://") || location.starts_with("https://") {
            Self::Url(location.to_string())
        } else {
            Self::Path(PathBuf::from(location))
        }
    }

    /// File name used when the asset is kept in a cache directory.
    pub fn cache_file_name(&self) -> String {
        match self {
            Self::Url(url) => url
                .split(['?', '#'])
                .next()
                .and_then(|u| u.rsplit('/').next())
                .filter(|name| !name.is_empty())
                .unwrap_or("model.onnx")
                .to_string(),
            Self::Path(path) => path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| "model.onnx".to_string()),
        }
    }
}

impl std::fmt::Display for ModelLocation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Url(url) => write!(f, "{url}"),
            Self::Path(path) => write!(f, "{}", path.display()),
        }
    }
}

/// Fetches model bytes, serving a URL from `cache_dir` when a cached copy
/// exists. The asset is immutable per deployment, so a cached copy is never
/// revalidated.
pub async fn fetch_model_bytes(
    location: &ModelLocation,
    cache_dir: Option<&Path>,
) -> Result<Vec<u8>> {
    match location {
        ModelLocation::Path(path) => read_file(path).await,
        ModelLocation::Url(url) => {
            let cached = cache_dir.map(|dir| dir.join(location.cache_file_name()));
            if let Some(cached) = cached.as_deref() {
                if tokio::fs::try_exists(cached).await.unwrap_or(false) {
                    debug!(path = %cached.display(), "using cached model asset");
                    return read_file(cached).await;
                }
            }

            let bytes = download(url).await?;

            if let Some(cached) = cached.as_deref() {
                write_cache(cached, &bytes).await?;
            }
            Ok(bytes)
        }
    }
}

/// Removes the cached copy of a URL asset so the next load downloads it
/// again. Returns whether a file was removed.
pub async fn evict_cached(location: &ModelLocation, cache_dir: Option<&Path>) -> Result<bool> {
    let cached = match (location, cache_dir) {
        (ModelLocation::Url(_), Some(dir)) => dir.join(location.cache_file_name()),
        _ => return Ok(false),
    };

    match tokio::fs::remove_file(&cached).await {
        Ok(()) => {
            warn!(path = %cached.display(), "evicted unusable cached model asset");
            Ok(true)
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(CatMoodError::FileSystem {
            path: cached,
            operation: "evict cached model asset".to_string(),
            source: e,
        }),
    }
}

async fn download(url: &str) -> Result<Vec<u8>> {
    info!(url, "downloading model asset");
    let response = reqwest::get(url).await?;
    if !response.status().is_success() {
        return Err(CatMoodError::Fetch {
            url: url.to_string(),
            reason: format!("HTTP {}", response.status()),
        });
    }
    let bytes = response.bytes().await?;
    debug!(url, len = bytes.len(), "model asset downloaded");
    Ok(bytes.to_vec())
}

async fn read_file(path: &Path) -> Result<Vec<u8>> {
    tokio::fs::read(path)
        .await
        .map_err(|e| CatMoodError::FileSystem {
            path: path.to_path_buf(),
            operation: "read model asset".to_string(),
            source: e,
        })
}

async fn write_cache(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| CatMoodError::FileSystem {
                path: parent.to_path_buf(),
                operation: "create cache directory".to_string(),
                source: e,
            })?;
    }

    // Write then rename so a partial download never looks like a cache hit.
    let partial = path.with_extension("part");
    tokio::fs::write(&partial, bytes)
        .await
        .map_err(|e| CatMoodError::FileSystem {
            path: partial.clone(),
            operation: "write cached model asset".to_string(),
            source: e,
        })?;
    tokio::fs::rename(&partial, path)
        .await
        .map_err(|e| CatMoodError::FileSystem {
            path: path.to_path_buf(),
            operation: "commit cached model asset".to_string(),
            source: e,
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_parse_location() {
        assert_eq!(
            ModelLocation::parse("https://cdn.example.com/cat/model.onnx"),
            ModelLocation::Url("https://cdn.example.com/cat/model.onnx".into())
        );
        assert_eq!(
            ModelLocation::parse("model/model.onnx"),
            ModelLocation::Path("model/model.onnx".into())
        );
    }

    #[test]
    fn test_cache_file_name() {
        let url = ModelLocation::parse("https://cdn.example.com/v3/mood.onnx?sig=abc");
        assert_eq!(url.cache_file_name(), "mood.onnx");
        let bare = ModelLocation::parse("https://cdn.example.com/");
        assert_eq!(bare.cache_file_name(), "model.onnx");
    }

    #[tokio::test]
    async fn test_reads_local_path() -> Result<()> {
        let dir = TempDir::new()?;
        let path = dir.path().join("model.onnx");
        std::fs::write(&path, b"weights")?;

        let bytes = fetch_model_bytes(&ModelLocation::Path(path), None).await?;
        assert_eq!(bytes, b"weights");
        Ok(())
    }

    #[tokio::test]
    async fn test_cached_url_skips_network() -> Result<()> {
        let dir = TempDir::new()?;
        // Unroutable URL: a cache miss would fail the test.
        let location = ModelLocation::parse("http://127.0.0.1:9/assets/mood.onnx");
        std::fs::write(dir.path().join("mood.onnx"), b"cached weights")?;

        let bytes = fetch_model_bytes(&location, Some(dir.path())).await?;
        assert_eq!(bytes, b"cached weights");
        Ok(())
    }

    #[tokio::test]
    async fn test_evict_removes_only_url_cache() -> Result<()> {
        let dir = TempDir::new()?;
        let cached = dir.path().join("mood.onnx");
        std::fs::write(&cached, b"<html>502</html>")?;

        let local = ModelLocation::Path(cached.clone());
        assert!(!evict_cached(&local, Some(dir.path())).await?);
        assert!(cached.exists());

        let url = ModelLocation::parse("http://127.0.0.1:9/assets/mood.onnx");
        assert!(!evict_cached(&url, None).await?);
        assert!(evict_cached(&url, Some(dir.path())).await?);
        assert!(!cached.exists());
        assert!(!evict_cached(&url, Some(dir.path())).await?);
        Ok(())
    }

    #[tokio::test]
    async fn test_missing_path_is_filesystem_error() {
        let result =
            fetch_model_bytes(&ModelLocation::Path("does/not/exist.onnx".into()), None).await;
        assert!(matches!(result, Err(CatMoodError::FileSystem { .. })));
    }
}
