use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use mime::Mime;

use crate::config::UploadConfig;

use super::domain::FileId;

/// Where an upload is headed; each context has its own allowlist and cap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadContext {
    Document,
    Logo,
    Contract,
    SignedContract,
}

impl UploadContext {
    pub fn allowed_extensions(self) -> &'static [&'static str] {
        match self {
            UploadContext::Document => {
                &["pdf", "doc", "docx", "xls", "xlsx", "jpg", "jpeg", "png"]
            }
            UploadContext::Logo => &["png", "jpg", "jpeg", "svg"],
            UploadContext::Contract | UploadContext::SignedContract => &["pdf"],
        }
    }

    fn key_prefix(self) -> &'static str {
        match self {
            UploadContext::Document => "documents",
            UploadContext::Logo => "logos",
            UploadContext::Contract => "contracts",
            UploadContext::SignedContract => "signed",
        }
    }
}

/// Raw upload as received from a client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Upload {
    pub filename: String,
    pub content_type: Option<String>,
    pub bytes: Vec<u8>,
}

/// Upload that passed policy checks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AcceptedUpload {
    pub original_filename: String,
    pub stored_filename: String,
    pub storage_key: String,
    pub content_type: String,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum UploadRejection {
    #[error("filename is required")]
    MissingFilename,
    #[error("file type .{extension} is not allowed here; accepted: {allowed}")]
    DisallowedType { extension: String, allowed: String },
    #[error("file is {size} bytes; the limit is {limit} bytes")]
    TooLarge { size: usize, limit: usize },
    #[error("file is empty")]
    Empty,
    #[error("content type '{0}' is not a valid media type")]
    InvalidContentType(String),
    #[error("content type {declared} does not match a .{extension} file")]
    ContentTypeMismatch { declared: String, extension: String },
}

/// Size and type rules applied before anything is persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UploadPolicy {
    pub max_bytes: usize,
    pub max_logo_bytes: usize,
}

impl Default for UploadPolicy {
    fn default() -> Self {
        Self {
            max_bytes: 10 * 1024 * 1024,
            max_logo_bytes: 5 * 1024 * 1024,
        }
    }
}

impl From<&UploadConfig> for UploadPolicy {
    fn from(config: &UploadConfig) -> Self {
        Self {
            max_bytes: config.max_upload_bytes,
            max_logo_bytes: config.max_logo_bytes,
        }
    }
}

impl UploadPolicy {
    pub fn limit_for(&self, context: UploadContext) -> usize {
        match context {
            UploadContext::Logo => self.max_logo_bytes.min(self.max_bytes),
            _ => self.max_bytes,
        }
    }

    pub fn check(
        &self,
        context: UploadContext,
        upload: &Upload,
        id: FileId,
    ) -> Result<AcceptedUpload, UploadRejection> {
        let original = sanitize_filename(&upload.filename);
        if original.is_empty() {
            return Err(UploadRejection::MissingFilename);
        }

        let extension = Path::new(&original)
            .extension()
            .and_then(|ext| ext.to_str())
            .map(str::to_ascii_lowercase)
            .unwrap_or_default();
        let allowed = context.allowed_extensions();
        if !allowed.contains(&extension.as_str()) {
            return Err(UploadRejection::DisallowedType {
                extension,
                allowed: allowed.join(", "),
            });
        }

        let limit = self.limit_for(context);
        if upload.bytes.len() > limit {
            return Err(UploadRejection::TooLarge {
                size: upload.bytes.len(),
                limit,
            });
        }
        if upload.bytes.is_empty() {
            return Err(UploadRejection::Empty);
        }

        let guessed = mime_guess::from_ext(&extension).first_or_octet_stream();
        if let Some(raw) = upload
            .content_type
            .as_deref()
            .map(str::trim)
            .filter(|raw| !raw.is_empty())
        {
            let declared: Mime = raw
                .parse()
                .map_err(|_| UploadRejection::InvalidContentType(raw.to_string()))?;
            // Generic binary is what most clients send when they do not know.
            if declared != mime::APPLICATION_OCTET_STREAM && declared.type_() != guessed.type_() {
                return Err(UploadRejection::ContentTypeMismatch {
                    declared: declared.essence_str().to_string(),
                    extension,
                });
            }
        }
        let content_type = guessed.essence_str().to_string();
        let stored_filename = format!("{id}.{extension}");
        let storage_key = format!("{}/{stored_filename}", context.key_prefix());

        Ok(AcceptedUpload {
            original_filename: original,
            stored_filename,
            storage_key,
            content_type,
        })
    }
}

/// Strip any directory components a client may have sent.
fn sanitize_filename(raw: &str) -> String {
    raw.rsplit(['/', '\\'])
        .next()
        .unwrap_or_default()
        .trim()
        .to_string()
}

#[derive(Debug, thiserror::Error)]
pub enum BlobError {
    #[error("blob storage failed for {key}: {source}")]
    Io { key: String, source: io::Error },
    #[error("blob {0} not found")]
    Missing(String),
    #[error("blob storage unavailable: {0}")]
    Unavailable(String),
}

/// Byte storage for uploaded files.
pub trait BlobStore: Send + Sync {
    /// Store `bytes` under `key` and return the path recorded on the file row.
    fn put(&self, key: &str, bytes: &[u8]) -> Result<String, BlobError>;
    fn get(&self, path: &str) -> Result<Vec<u8>, BlobError>;
    fn remove(&self, path: &str) -> Result<(), BlobError>;
}

/// Stores blobs below a root directory on local disk.
#[derive(Debug, Clone)]
pub struct DiskBlobStore {
    root: PathBuf,
}

impl DiskBlobStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn resolve(&self, key: &str) -> PathBuf {
        self.root.join(key)
    }
}

impl BlobStore for DiskBlobStore {
    fn put(&self, key: &str, bytes: &[u8]) -> Result<String, BlobError> {
        let path = self.resolve(key);
        let io_error = |source| BlobError::Io {
            key: key.to_string(),
            source,
        };
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(io_error)?;
        }
        fs::write(&path, bytes).map_err(io_error)?;
        Ok(key.to_string())
    }

    fn get(&self, path: &str) -> Result<Vec<u8>, BlobError> {
        fs::read(self.resolve(path)).map_err(|source| match source.kind() {
            io::ErrorKind::NotFound => BlobError::Missing(path.to_string()),
            _ => BlobError::Io {
                key: path.to_string(),
                source,
            },
        })
    }

    fn remove(&self, path: &str) -> Result<(), BlobError> {
        match fs::remove_file(self.resolve(path)) {
            Ok(()) => Ok(()),
            Err(source) if source.kind() == io::ErrorKind::NotFound => {
                Err(BlobError::Missing(path.to_string()))
            }
            Err(source) => Err(BlobError::Io {
                key: path.to_string(),
                source,
            }),
        }
    }
}

/// Blob store kept in memory.
#[derive(Debug, Default)]
pub struct MemoryBlobStore {
    blobs: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.blobs.lock().map(|blobs| blobs.len()).unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, Vec<u8>>>, BlobError> {
        self.blobs
            .lock()
            .map_err(|_| BlobError::Unavailable("blob lock poisoned".to_string()))
    }
}

impl BlobStore for MemoryBlobStore {
    fn put(&self, key: &str, bytes: &[u8]) -> Result<String, BlobError> {
        self.lock()?.insert(key.to_string(), bytes.to_vec());
        Ok(key.to_string())
    }

    fn get(&self, path: &str) -> Result<Vec<u8>, BlobError> {
        self.lock()?
            .get(path)
            .cloned()
            .ok_or_else(|| BlobError::Missing(path.to_string()))
    }

    fn remove(&self, path: &str) -> Result<(), BlobError> {
        self.lock()?
            .remove(path)
            .map(|_| ())
            .ok_or_else(|| BlobError::Missing(path.to_string()))
    }
}
