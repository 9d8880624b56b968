use std::path::{Path, PathBuf};
use std::fs;
use std::io;
use std::sync::Arc;
use std::env;
use tokio::sync::Mutex;
use sha2::{Sha256, Digest};

use crate::assets::{AssetInfo, RemoteFile};

const HASH_SUFFIX: &str = "sha256";

#[derive(Debug, thiserror::Error)]
pub enum ModelError {
    #[error("Asset not downloaded: {0}")]
    NotDownloaded(String),
    #[error("Download error: {0}")]
    DownloadError(#[from] reqwest::Error),
    #[error("IO error: {0}")]
    IoError(#[from] io::Error),
    #[error("Hash mismatch: expected {expected}, got {actual} for {file} file")]
    HashMismatch {
        file: String,
        expected: String,
        actual: String,
    },
}

/// Caches downloaded datasets and pretrained encoders on local disk.
///
/// Every cached file gets a `<file>.sha256` sidecar holding the hash it had
/// when it was written; cached files are checked against it before reuse.
#[derive(Clone)]
pub struct ModelManager {
    cache_dir: PathBuf,
    download_lock: Arc<Mutex<()>>,
}

impl ModelManager {
    /// Creates a new ModelManager with the default cache directory
    pub fn new_default() -> io::Result<Self> {
        Self::new(Self::get_default_cache_dir())
    }

    /// Returns the default cache directory path
    pub fn get_default_cache_dir() -> PathBuf {
        // 1. Check environment variable
        if let Ok(path) = env::var("EMOTION_CACHE") {
            return PathBuf::from(path).join("assets");
        }

        // 2. Use platform-specific cache directory
        if let Some(cache_dir) = dirs::cache_dir() {
            return cache_dir.join("emotion-classifier").join("assets");
        }

        // 3. Fallback to user's home directory
        if let Some(home_dir) = dirs::home_dir() {
            return home_dir.join(".cache").join("emotion-classifier").join("assets");
        }

        // 4. If all else fails, use system temp directory (platform agnostic)
        env::temp_dir().join("emotion-classifier").join("assets")
    }

    pub fn new<P: AsRef<Path>>(cache_dir: P) -> io::Result<Self> {
        let cache_dir = cache_dir.as_ref().to_path_buf();
        fs::create_dir_all(&cache_dir)?;
        Ok(Self {
            cache_dir,
            download_lock: Arc::new(Mutex::new(())),
        })
    }

    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    pub fn get_asset_dir(&self, asset: &AssetInfo) -> PathBuf {
        self.cache_dir.join(&asset.name)
    }

    pub fn get_file_path(&self, asset: &AssetInfo, file: &RemoteFile) -> PathBuf {
        self.get_asset_dir(asset).join(&file.name)
    }

    fn hash_path(path: &Path) -> PathBuf {
        let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
        name.push(".");
        name.push(HASH_SUFFIX);
        path.with_file_name(name)
    }

    pub fn is_downloaded(&self, asset: &AssetInfo) -> bool {
        asset.files.iter().all(|file| {
            let path = self.get_file_path(asset, file);
            log::debug!("  {:?} (exists: {})", path, path.exists());
            path.exists()
        })
    }

    fn hash_bytes(bytes: &[u8]) -> String {
        let mut hasher = Sha256::new();
        hasher.update(bytes);
        format!("{:x}", hasher.finalize())
    }

    /// Compares a cached file with its known hash or, failing that, the
    /// hash recorded at download time.
    fn verify_file(&self, path: &Path, file: &RemoteFile) -> Result<bool, ModelError> {
        log::info!("Verifying file: {:?}", path);
        let expected = match &file.sha256 {
            Some(hash) => hash.clone(),
            None => match fs::read_to_string(Self::hash_path(path)) {
                Ok(recorded) => recorded.trim().to_string(),
                Err(_) => {
                    log::warn!("No recorded hash for {:?}", path);
                    return Ok(false);
                }
            },
        };
        let bytes = fs::read(path)?;
        let hash = Self::hash_bytes(&bytes);
        log::debug!("Calculated hash: {}", hash);
        log::debug!("Expected hash:   {}", expected);
        Ok(hash == expected)
    }

    pub fn verify_asset(&self, asset: &AssetInfo) -> Result<bool, ModelError> {
        for file in &asset.files {
            let path = self.get_file_path(asset, file);
            if !path.exists() || !self.verify_file(&path, file)? {
                log::info!("Verification failed for {:?}", path);
                return Ok(false);
            }
        }
        Ok(true)
    }

    pub async fn download_asset(&self, asset: &AssetInfo) -> Result<PathBuf, ModelError> {
        let _lock = self.download_lock.lock().await;

        let asset_dir = self.get_asset_dir(asset);
        log::info!("Creating asset directory at {:?}", asset_dir);
        fs::create_dir_all(&asset_dir)?;

        for file in &asset.files {
            let path = self.get_file_path(asset, file);
            let result = if path.exists() && self.verify_file(&path, file)? {
                log::info!("Existing {} verified successfully", file.name);
                Ok(())
            } else {
                log::info!("Downloading {}...", file.name);
                self.download_and_verify_file(file, &path).await
            };

            if let Err(e) = result {
                log::error!("Failed to set up {}: {}", file.name, e);
                // Cleanup on failure
                let _ = self.remove_download(asset);
                return Err(e);
            }
        }

        log::info!("Asset {} ready to use", asset.name);
        Ok(asset_dir)
    }

    async fn download_and_verify_file(&self, file: &RemoteFile, path: &Path) -> Result<(), ModelError> {
        log::info!("Downloading {} from {} to {:?}", file.name, file.url, path);
        let response = reqwest::get(&file.url).await?.error_for_status()?;
        log::info!("Download response status: {}", response.status());
        let bytes = response.bytes().await?;
        log::info!("Downloaded {} bytes", bytes.len());

        let hash = Self::hash_bytes(&bytes);
        if let Some(expected) = &file.sha256 {
            if &hash != expected {
                log::error!("{} hash mismatch: expected {}, got {}", file.name, expected, hash);
                return Err(ModelError::HashMismatch {
                    file: file.name.clone(),
                    expected: expected.clone(),
                    actual: hash,
                });
            }
        }

        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        log::info!("Writing {} bytes to {:?}", bytes.len(), path);
        fs::write(path, &bytes)?;
        fs::write(Self::hash_path(path), &hash)?;
        Ok(())
    }

    pub fn remove_download(&self, asset: &AssetInfo) -> Result<(), ModelError> {
        for file in &asset.files {
            let path = self.get_file_path(asset, file);
            for candidate in [Self::hash_path(&path), path] {
                if candidate.exists() {
                    fs::remove_file(&candidate)?;
                }
            }
        }
        Ok(())
    }

    /// Ensures that an asset is downloaded and verified.
    /// If it doesn't exist, it will be downloaded.
    /// If verification fails, it will be re-downloaded.
    pub async fn ensure_downloaded(&self, asset: &AssetInfo) -> Result<PathBuf, ModelError> {
        log::info!("Checking if {} is downloaded...", asset.name);
        if self.is_downloaded(asset) && self.verify_asset(asset)? {
            log::info!("{} verification successful", asset.name);
            return Ok(self.get_asset_dir(asset));
        }
        self.download_asset(asset).await
    }

    /// Returns the cached asset directory without touching the network.
    pub fn cached(&self, asset: &AssetInfo) -> Result<PathBuf, ModelError> {
        if self.is_downloaded(asset) {
            Ok(self.get_asset_dir(asset))
        } else {
            Err(ModelError::NotDownloaded(asset.name.clone()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn local_asset() -> AssetInfo {
        AssetInfo {
            name: "local".to_string(),
            files: vec![RemoteFile::new("data.txt", "http://127.0.0.1:9/data.txt")],
        }
    }

    #[test]
    fn test_default_cache_dir() {
        // Test with environment variable
        env::set_var("EMOTION_CACHE", "/tmp/test-emotion-cache");
        let path = ModelManager::get_default_cache_dir();
        assert!(path.to_str().unwrap().contains("/tmp/test-emotion-cache/assets"));
        env::remove_var("EMOTION_CACHE");

        // Test without environment variable
        let path = ModelManager::get_default_cache_dir();
        assert!(path.to_str().unwrap().contains("assets"));
    }

    #[test]
    fn test_recorded_hash_detects_corruption() {
        let dir = tempfile::tempdir().unwrap();
        let manager = ModelManager::new(dir.path()).unwrap();
        let asset = local_asset();
        let path = manager.get_file_path(&asset, &asset.files[0]);
        fs::create_dir_all(path.parent().unwrap()).unwrap();

        fs::write(&path, b"hello").unwrap();
        assert!(!manager.verify_asset(&asset).unwrap(), "no sidecar yet");

        fs::write(ModelManager::hash_path(&path), ModelManager::hash_bytes(b"hello")).unwrap();
        assert!(manager.verify_asset(&asset).unwrap());
        assert!(manager.cached(&asset).is_ok());

        fs::write(&path, b"corrupted data").unwrap();
        assert!(!manager.verify_asset(&asset).unwrap());

        manager.remove_download(&asset).unwrap();
        assert!(!path.exists());
        assert!(matches!(manager.cached(&asset), Err(ModelError::NotDownloaded(_))));
    }

    #[tokio::test]
    async fn test_failed_download_leaves_nothing_behind() {
        let dir = tempfile::tempdir().unwrap();
        let manager = ModelManager::new(dir.path()).unwrap();
        let asset = local_asset();

        assert!(manager.download_asset(&asset).await.is_err());
        assert!(!manager.is_downloaded(&asset));
    }
}
