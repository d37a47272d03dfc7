//! Concurrent image loading
//!
//! All sources of one print are fetched and decoded concurrently, and the
//! caller only proceeds once every load has settled. A failed load never
//! short-circuits the others; each source reports its own outcome.

use futures_util::future::join_all;

use super::{ImageSource, SourceImage};
use crate::error::{ChekiError, Result};
use crate::session::Session;

/// Fetches raw bytes and decoded images from files, URLs and memory
#[derive(Debug, Clone)]
pub struct AssetLoader {
    http: reqwest::Client,
    authorization: Option<String>,
}

impl AssetLoader {
    pub fn new() -> Self {
        Self {
            http: reqwest::Client::new(),
            authorization: None,
        }
    }

    /// Loader that forwards the session's bearer token on URL fetches
    pub fn for_session(session: &Session) -> Self {
        Self {
            http: reqwest::Client::new(),
            authorization: session.authorization(),
        }
    }

    /// Fetch the raw bytes of a source
    pub async fn fetch_bytes(&self, source: &ImageSource) -> Result<Vec<u8>> {
        match source {
            ImageSource::Path(path) => tokio::fs::read(path).await.map_err(|e| ChekiError::Load {
                origin: source.describe(),
                reason: e.to_string(),
            }),
            ImageSource::Url(url) => self.fetch_url(url).await,
            ImageSource::Bytes { data, .. } => Ok(data.clone()),
        }
    }

    async fn fetch_url(&self, url: &str) -> Result<Vec<u8>> {
        let mut request = self.http.get(url);
        if let Some(auth) = &self.authorization {
            request = request.header(reqwest::header::AUTHORIZATION, auth);
        }
        let load_error = |reason: String| ChekiError::Load {
            origin: url.to_string(),
            reason,
        };

        let response = request.send().await.map_err(|e| load_error(e.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            return Err(load_error(format!("fetch failed with status {}", status)));
        }
        let bytes = response.bytes().await.map_err(|e| load_error(e.to_string()))?;
        tracing::debug!(url, size = bytes.len(), "Fetched remote image");
        Ok(bytes.to_vec())
    }

    /// Fetch and decode one source. Decoding runs on the blocking pool.
    pub async fn load(&self, source: &ImageSource) -> Result<SourceImage> {
        let bytes = self.fetch_bytes(source).await?;
        let origin = source.describe();
        let task_origin = origin.clone();
        tokio::task::spawn_blocking(move || SourceImage::decode(task_origin, &bytes))
            .await
            .map_err(|e| ChekiError::Load {
                origin,
                reason: format!("decode task failed: {}", e),
            })?
    }
}

impl Default for AssetLoader {
    fn default() -> Self {
        Self::new()
    }
}

/// Load every source concurrently and wait for all of them.
///
/// The result has one entry per source, in input order.
pub async fn load_all(loader: &AssetLoader, sources: &[ImageSource]) -> Vec<Result<SourceImage>> {
    let results = join_all(sources.iter().map(|source| loader.load(source))).await;
    let failed = results.iter().filter(|r| r.is_err()).count();
    tracing::info!(
        total = sources.len(),
        failed,
        "Finished loading source images"
    );
    results
}

/// Blocking wrapper around [`load_all`] for synchronous callers.
///
/// Starts its own runtime, so it panics inside async code; await [`load_all`] there.
pub fn load_all_blocking(
    loader: &AssetLoader,
    sources: &[ImageSource],
) -> Result<Vec<Result<SourceImage>>> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    Ok(runtime.block_on(load_all(loader, sources)))
}

/// Load a single source synchronously.
///
/// Starts its own runtime, so it panics inside async code; await
/// [`AssetLoader::load`] there.
pub fn load_one(loader: &AssetLoader, source: &ImageSource) -> Result<SourceImage> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    runtime.block_on(loader.load(source))
}

/// Collapse per-source outcomes, failing on the first permanent failure
pub fn require_all(results: Vec<Result<SourceImage>>) -> Result<Vec<SourceImage>> {
    results.into_iter().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assets::encode_png;
    use image::{Rgba, RgbaImage};

    fn png_bytes(w: u32, h: u32) -> Vec<u8> {
        encode_png(&RgbaImage::from_pixel(w, h, Rgba([200, 10, 10, 255]))).unwrap()
    }

    #[tokio::test]
    async fn test_load_all_waits_for_every_source() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("photo.png");
        std::fs::write(&path, png_bytes(4, 6)).unwrap();

        let sources = vec![
            ImageSource::Path(path),
            ImageSource::Bytes {
                name: "qr".to_string(),
                data: png_bytes(2, 2),
            },
            ImageSource::Path(dir.path().join("missing.png")),
        ];

        let results = load_all(&AssetLoader::new(), &sources).await;
        assert_eq!(results.len(), 3);
        assert_eq!(results[0].as_ref().unwrap().height(), 6);
        assert_eq!(results[1].as_ref().unwrap().width(), 2);
        assert_eq!(results[2].as_ref().unwrap_err().error_code(), "LOAD_ERROR");
    }

    #[test]
    fn test_require_all_reports_failure() {
        let sources = vec![
            ImageSource::Bytes {
                name: "ok".to_string(),
                data: png_bytes(1, 1),
            },
            ImageSource::Bytes {
                name: "broken".to_string(),
                data: vec![1, 2, 3],
            },
        ];
        let results = load_all_blocking(&AssetLoader::new(), &sources).unwrap();
        let err = require_all(results).unwrap_err();
        assert!(err.to_string().contains("broken"));
    }
}
