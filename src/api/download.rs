//! Authenticated file downloads (CSV/PDF reports and other binary payloads).
//!
//! A download is an authenticated GET with `Accept: */*`. The payload is
//! registered with a `SaveTarget` as a temporary object URL, saved under the
//! requested file name, and the object URL is always revoked afterwards.

use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{self, ErrorKind};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use reqwest::header::{HeaderValue, ACCEPT};
use thiserror::Error;

use super::client::{ApiClient, RequestOptions};
use super::ApiError;

/// File name used when the caller does not supply one.
pub const DEFAULT_FILENAME: &str = "download";

#[derive(Debug, Error)]
pub enum SaveError {
    #[error("Failed to write download: {0}")]
    Io(#[from] std::io::Error),

    #[error("Unknown or revoked object URL: {0}")]
    UnknownUrl(String),

    #[error("Invalid file name: {0:?}")]
    InvalidFileName(String),

    #[error("Save target lock poisoned")]
    Poisoned,
}

#[derive(Debug, Error)]
pub enum DownloadError {
    #[error(transparent)]
    Request(#[from] ApiError),

    /// The final response (after any refresh and retry) was not 2xx.
    #[error("Download failed {status}: {body}")]
    Failed { status: u16, body: String },

    #[error(transparent)]
    Save(#[from] SaveError),
}

/// Response payload handed to a `SaveTarget`.
#[derive(Debug, Clone)]
pub struct Blob {
    pub bytes: Vec<u8>,
    pub content_type: Option<String>,
}

/// Opaque handle to a blob registered with a `SaveTarget`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ObjectUrl(String);

impl ObjectUrl {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Destination for downloaded blobs.
///
/// `create_object_url` allocates a handle, `save` materializes it under a file
/// name, and `revoke_object_url` releases the handle whether or not the save
/// succeeded.
pub trait SaveTarget: Send + Sync {
    fn create_object_url(&self, blob: Blob) -> Result<ObjectUrl, SaveError>;

    /// Returns where the file ended up.
    fn save(&self, url: &ObjectUrl, filename: &str) -> Result<PathBuf, SaveError>;

    fn revoke_object_url(&self, url: &ObjectUrl);
}

/// Revokes its object URL when dropped, including on unwind.
struct ObjectUrlGuard<'a, T: SaveTarget + ?Sized> {
    target: &'a T,
    url: ObjectUrl,
}

impl<T: SaveTarget + ?Sized> Drop for ObjectUrlGuard<'_, T> {
    fn drop(&mut self) {
        self.target.revoke_object_url(&self.url);
    }
}

/// Result of a completed download.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SavedFile {
    pub path: PathBuf,
    pub size: usize,
    pub content_type: Option<String>,
}

/// Authenticated download wrapper over `ApiClient`.
pub struct DownloadHelper<T: SaveTarget> {
    api: Arc<ApiClient>,
    target: T,
}

impl<T: SaveTarget> DownloadHelper<T> {
    pub fn new(api: Arc<ApiClient>, target: T) -> Self {
        Self { api, target }
    }

    pub fn target(&self) -> &T {
        &self.target
    }

    /// Download `path` and save it as `filename` (or `DEFAULT_FILENAME`).
    pub async fn download(
        &self,
        path: &str,
        filename: Option<&str>,
    ) -> Result<SavedFile, DownloadError> {
        let options = RequestOptions::get().header(ACCEPT, HeaderValue::from_static("*/*"));
        let resp = self.api.request(path, options).await?;

        if !resp.is_success() {
            let status = resp.status().as_u16();
            log::warn!("Download of {} failed with status {}", path, status);
            return Err(DownloadError::Failed {
                status,
                body: resp.text(),
            });
        }

        let content_type = resp.content_type().map(str::to_string);
        let blob = Blob {
            bytes: resp.into_bytes(),
            content_type: content_type.clone(),
        };
        let size = blob.bytes.len();

        let filename = filename
            .map(str::trim)
            .filter(|f| !f.is_empty())
            .unwrap_or(DEFAULT_FILENAME);

        let guard = ObjectUrlGuard {
            target: &self.target,
            url: self.target.create_object_url(blob)?,
        };
        let saved = self.target.save(&guard.url, filename);
        drop(guard);

        let path = saved?;
        log::info!("Saved {} ({} bytes) to {}", filename, size, path.display());
        Ok(SavedFile {
            path,
            size,
            content_type,
        })
    }
}

/// Saves downloads into a directory.
///
/// `create_object_url` stages the blob in a hidden `.part` file, `save` copies
/// it into a newly created file (appending ` (n)` on name clashes like a
/// browser would), and `revoke_object_url` deletes the staging file.
#[derive(Debug)]
pub struct FsSaveTarget {
    dir: PathBuf,
    staged: Mutex<HashMap<ObjectUrl, PathBuf>>,
    next_id: AtomicU64,
}

impl FsSaveTarget {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            staged: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(0),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Number of object URLs created and not yet revoked.
    pub fn live_urls(&self) -> usize {
        self.staged.lock().map(|s| s.len()).unwrap_or(0)
    }

    /// Create the destination file, never replacing an existing one.
    ///
    /// Tries `name`, then `name (1)`, `name (2)`, ... Each candidate is
    /// opened with `create_new`, so a file that appears after the name was
    /// chosen is skipped rather than overwritten.
    fn claim(&self, filename: &str) -> Result<(PathBuf, File), SaveError> {
        // Only the final component is used; "../x" saves as "x".
        let name = Path::new(filename)
            .file_name()
            .and_then(|n| n.to_str())
            .filter(|n| !n.starts_with('.'))
            .ok_or_else(|| SaveError::InvalidFileName(filename.to_string()))?;

        let path = Path::new(name);
        let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or(name);
        let ext = path.extension().and_then(|e| e.to_str());

        for n in 0u32.. {
            let candidate = match (n, ext) {
                (0, _) => self.dir.join(name),
                (n, Some(ext)) => self.dir.join(format!("{} ({}).{}", stem, n, ext)),
                (n, None) => self.dir.join(format!("{} ({})", stem, n)),
            };
            match OpenOptions::new().write(true).create_new(true).open(&candidate) {
                Ok(file) => return Ok((candidate, file)),
                Err(e) if e.kind() == ErrorKind::AlreadyExists => continue,
                Err(e) => return Err(e.into()),
            }
        }
        Err(SaveError::InvalidFileName(filename.to_string()))
    }
}

impl SaveTarget for FsSaveTarget {
    fn create_object_url(&self, blob: Blob) -> Result<ObjectUrl, SaveError> {
        fs::create_dir_all(&self.dir)?;
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let url = ObjectUrl::new(format!("blob:{}-{}", std::process::id(), id));
        let staging = self
            .dir
            .join(format!(".interntrack-{}-{}.part", std::process::id(), id));
        fs::write(&staging, &blob.bytes)?;

        self.staged
            .lock()
            .map_err(|_| SaveError::Poisoned)?
            .insert(url.clone(), staging);
        Ok(url)
    }

    fn save(&self, url: &ObjectUrl, filename: &str) -> Result<PathBuf, SaveError> {
        let staging = self
            .staged
            .lock()
            .map_err(|_| SaveError::Poisoned)?
            .get(url)
            .cloned()
            .ok_or_else(|| SaveError::UnknownUrl(url.as_str().to_string()))?;

        let (dest, mut file) = self.claim(filename)?;
        let copied = File::open(&staging).and_then(|mut src| io::copy(&mut src, &mut file));
        if let Err(e) = copied {
            drop(file);
            if let Err(cleanup) = fs::remove_file(&dest) {
                log::warn!("Failed to remove partial {}: {}", dest.display(), cleanup);
            }
            return Err(e.into());
        }
        Ok(dest)
    }

    fn revoke_object_url(&self, url: &ObjectUrl) {
        let staging = match self.staged.lock() {
            Ok(mut staged) => staged.remove(url),
            Err(_) => None,
        };
        if let Some(staging) = staging {
            match fs::remove_file(&staging) {
                Ok(()) => {}
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => log::warn!("Failed to remove {}: {}", staging.display(), e),
            }
        }
    }
}
