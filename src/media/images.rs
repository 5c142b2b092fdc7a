use anyhow::{Context, Result};
use async_trait::async_trait;
use regex::Regex;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::{Mutex, OnceCell};
use url::Url;

use super::ImageSource;
use crate::config::ImageConfig;
use crate::utils::sanitize_filename;
use crate::VideoError;

const SEARCH_URL: &str = "https://www.google.com/search";

/// Hosts serving thumbnails rather than full images
const THUMBNAIL_HOSTS: &[&str] = &["encrypted-tbn0.gstatic.com", "gstatic.com"];

const IMAGE_URL_PATTERN: &str = r#"(?i)https?://[^"'\s<>\\]+?\.(?:jpe?g|png|webp|gif)\b"#;

/// Image search backed by a scraped results page and an on-disk cache.
///
/// Every keyword gets its own directory under the download dir. Directories
/// left by earlier runs are picked up at construction, so a keyword is only
/// searched once across runs. Each keyword has its own cell, so concurrent
/// searches for different keywords never wait on each other.
pub struct ImageGrabber {
    client: reqwest::Client,
    download_dir: PathBuf,
    to_download: usize,
    safe_search: String,
    search_options: String,
    url_pattern: Regex,
    memory: Mutex<HashMap<String, Arc<OnceCell<Vec<PathBuf>>>>>,
}

impl ImageGrabber {
    pub fn new(config: &ImageConfig) -> Result<Self> {
        fs_err::create_dir_all(&config.download_dir)
            .context("Failed to create image download directory")?;
        // Concat lists are read from the work dir, so paths must not be relative
        let download_dir = fs_err::canonicalize(&config.download_dir)?;

        let client = reqwest::Client::builder()
            .user_agent(config.user_agent.clone())
            .build()
            .context("Failed to build HTTP client")?;

        let memory: HashMap<String, Arc<OnceCell<Vec<PathBuf>>>> = load_cache(&download_dir)?
            .into_iter()
            .map(|(key, paths)| (key, Arc::new(OnceCell::from(paths))))
            .collect();
        tracing::debug!(
            "Loaded {} cached keywords from {}",
            memory.len(),
            download_dir.display()
        );

        Ok(Self {
            client,
            download_dir,
            to_download: config.to_download,
            safe_search: config.safe_search.clone(),
            search_options: config.search_options.clone(),
            url_pattern: Regex::new(IMAGE_URL_PATTERN)?,
            memory: Mutex::new(memory),
        })
    }

    /// Results page URL for `keyword`
    pub fn search_url(&self, keyword: &str) -> String {
        format!(
            "{}?safe={}&tbm=isch&q={}&tbs={}",
            SEARCH_URL,
            urlencoding::encode(&self.safe_search),
            urlencoding::encode(keyword),
            urlencoding::encode(&self.search_options),
        )
    }

    /// Full-size image URLs found in a results page, first occurrence order
    pub fn extract_image_urls(&self, html: &str) -> Vec<String> {
        let unescaped = html
            .replace("\\u003d", "=")
            .replace("\\u0026", "&")
            .replace("\\/", "/");

        let mut seen = HashSet::new();
        self.url_pattern
            .find_iter(&unescaped)
            .map(|m| m.as_str().to_string())
            .filter(|candidate| is_full_image(candidate))
            .filter(|candidate| seen.insert(candidate.clone()))
            .take(self.to_download)
            .collect()
    }

    async fn fetch_image_urls(&self, keyword: &str) -> Result<Vec<String>> {
        let response = self.client.get(self.search_url(keyword)).send().await?;

        if !response.status().is_success() {
            anyhow::bail!("Image search returned HTTP {}", response.status());
        }

        let html = response.text().await?;
        Ok(self.extract_image_urls(&html))
    }

    /// Download one image; failures are logged and skipped
    async fn download(&self, url: &str, dir: &Path, index: usize) -> Option<PathBuf> {
        tracing::debug!("Downloading from URL: {}", url);

        let response = match self.client.get(url).send().await {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!("Skipping image {}: {}", url, e);
                return None;
            }
        };

        if !response.status().is_success() {
            tracing::warn!("Skipping downloading image, got status {}", response.status());
            return None;
        }

        let bytes = match response.bytes().await {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::warn!("Skipping image {}: {}", url, e);
                return None;
            }
        };

        let path = dir.join(format!("image_{}.{}", index, extension_for(url)));
        match fs_err::write(&path, &bytes) {
            Ok(()) => Some(path),
            Err(e) => {
                tracing::warn!("Failed to save image {}: {}", path.display(), e);
                None
            }
        }
    }

    /// Cell holding the images for `key`; the map lock is released on return
    async fn cell_for(&self, key: &str) -> Arc<OnceCell<Vec<PathBuf>>> {
        let mut memory = self.memory.lock().await;
        memory.entry(key.to_string()).or_default().clone()
    }

    async fn download_keyword(&self, word: &str, key: &str) -> Result<Vec<PathBuf>> {
        tracing::info!("Downloading images for keyword: {}", word);
        let urls = self
            .fetch_image_urls(word)
            .await
            .map_err(|e| VideoError::ImageSearchFailed(format!("{}: {}", word, e)))?;

        let dir = self.download_dir.join(key);
        fs_err::create_dir_all(&dir)?;

        let mut paths = Vec::new();
        for url in &urls {
            if let Some(path) = self.download(url, &dir, paths.len() + 1).await {
                paths.push(path);
            }
        }

        tracing::info!("Downloaded {} of {} images for '{}'", paths.len(), urls.len(), word);
        Ok(paths)
    }
}

#[async_trait]
impl ImageSource for ImageGrabber {
    async fn search(&self, keyword: &str) -> Result<Vec<PathBuf>> {
        let word = keyword.trim();
        let key = cache_key(word);

        let cell = self.cell_for(&key).await;
        if let Some(paths) = cell.get() {
            tracing::debug!("Using {} cached images for '{}'", paths.len(), word);
            return Ok(paths.clone());
        }

        // A failed download leaves the cell empty so a later search retries
        let paths = cell.get_or_try_init(|| self.download_keyword(word, &key)).await?;
        Ok(paths.clone())
    }
}

/// Directory name used for a keyword
pub fn cache_key(keyword: &str) -> String {
    sanitize_filename(&keyword.trim().to_lowercase())
}

/// Read `<dir>/<keyword>/*` into memory; empty keyword directories are left out
fn load_cache(dir: &Path) -> Result<HashMap<String, Vec<PathBuf>>> {
    let mut cache = HashMap::new();

    for entry in fs_err::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if !path.is_dir() {
            continue;
        }

        let mut files: Vec<PathBuf> = fs_err::read_dir(&path)?
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.is_file())
            .map(|p| p.canonicalize().unwrap_or(p))
            .collect();
        if files.is_empty() {
            continue;
        }
        files.sort();

        let key = entry.file_name().to_string_lossy().to_lowercase();
        cache.insert(key, files);
    }

    Ok(cache)
}

fn is_full_image(candidate: &str) -> bool {
    let Ok(url) = Url::parse(candidate) else {
        return false;
    };
    match url.host_str() {
        Some(host) => !THUMBNAIL_HOSTS
            .iter()
            .any(|thumb| host == *thumb || host.ends_with(&format!(".{}", thumb))),
        None => false,
    }
}

fn extension_for(url: &str) -> &'static str {
    let lower = url.to_lowercase();
    if lower.ends_with(".png") {
        "png"
    } else if lower.ends_with(".webp") {
        "webp"
    } else if lower.ends_with(".gif") {
        "gif"
    } else {
        "jpg"
    }
}
