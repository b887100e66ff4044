//! Durable storage for onboarding crops.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use sha2::{Digest, Sha256};
use url::Url;

pub const DEFAULT_CONTAINER: &str = "images";
const DEFAULT_TIMEOUT_SECS: u64 = 30;
const NAME_HASH_CHARS: usize = 16;

/// Blob storage backend trait.
pub trait BlobStore: Send {
    fn name(&self) -> &'static str;

    /// Uploads a local file under `name` and returns its durable reference.
    fn upload(&self, local: &Path, name: &str) -> Result<String>;
}

impl<B: BlobStore + ?Sized> BlobStore for Box<B> {
    fn name(&self) -> &'static str {
        (**self).name()
    }

    fn upload(&self, local: &Path, name: &str) -> Result<String> {
        (**self).upload(local, name)
    }
}

/// Blob name for an encoded crop: `{camera}-{epoch_ms}-{sha256 prefix}.png`.
///
/// Names are content-addressed, so identical crops stored within the same
/// millisecond share one blob.
pub fn blob_name(camera_id: &str, epoch_ms: u64, bytes: &[u8]) -> String {
    let digest = hex::encode(Sha256::digest(bytes));
    let camera: String = camera_id
        .trim()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c.to_ascii_lowercase()
            } else {
                '_'
            }
        })
        .collect();
    let camera = if camera.is_empty() { "camera".to_string() } else { camera };
    format!("{}-{}-{}.png", camera, epoch_ms, &digest[..NAME_HASH_CHARS])
}

fn sanitize_blob_name(name: &str) -> Result<&str> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(anyhow!("blob name cannot be empty"));
    }
    if trimmed.starts_with('.')
        || !trimmed
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
    {
        return Err(anyhow!("blob name must be [A-Za-z0-9._-] only: {}", name));
    }
    Ok(trimmed)
}

/// Stores blobs under a local directory and hands out `file://` URLs.
pub struct FilesystemBlobStore {
    root: PathBuf,
}

impl FilesystemBlobStore {
    pub fn new(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root)
            .with_context(|| format!("create blob root {}", root.display()))?;
        let root = root
            .canonicalize()
            .with_context(|| format!("resolve blob root {}", root.display()))?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl BlobStore for FilesystemBlobStore {
    fn name(&self) -> &'static str {
        "filesystem"
    }

    fn upload(&self, local: &Path, name: &str) -> Result<String> {
        let name = sanitize_blob_name(name)?;
        let dest = self.root.join(name);
        let tmp = dest.with_extension("tmp");
        fs::copy(local, &tmp)
            .with_context(|| format!("copy {} into blob store", local.display()))?;
        fs::rename(&tmp, &dest)?;
        let url = Url::from_file_path(&dest)
            .map_err(|_| anyhow!("blob path {} is not absolute", dest.display()))?;
        Ok(url.to_string())
    }
}

/// Uploads blobs with `PUT {base}/{container}/{name}`.
///
/// The request carries `x-ms-blob-type: BlockBlob` so Azure-style block
/// blob endpoints accept it; plain object stores ignore the header.
pub struct HttpBlobStore {
    base: Url,
    container: String,
    token: Option<String>,
    agent: ureq::Agent,
}

impl HttpBlobStore {
    pub fn new(base: &str, container: &str, token: Option<String>) -> Result<Self> {
        let base = Url::parse(base).with_context(|| format!("parse blob url {}", base))?;
        if !matches!(base.scheme(), "http" | "https") || base.cannot_be_a_base() {
            return Err(anyhow!("blob url must be an http(s) base url: {}", base));
        }
        let container = container.trim();
        if container.is_empty() {
            return Err(anyhow!("blob container cannot be empty"));
        }
        let agent = ureq::AgentBuilder::new()
            .timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
            .build();
        Ok(Self {
            base,
            container: container.to_string(),
            token: token.filter(|t| !t.trim().is_empty()),
            agent,
        })
    }

    fn blob_url(&self, name: &str) -> Result<Url> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|_| anyhow!("blob url {} cannot carry a path", self.base))?
            .pop_if_empty()
            .extend([self.container.as_str(), name]);
        Ok(url)
    }
}

impl BlobStore for HttpBlobStore {
    fn name(&self) -> &'static str {
        "http"
    }

    fn upload(&self, local: &Path, name: &str) -> Result<String> {
        let name = sanitize_blob_name(name)?;
        let bytes = fs::read(local).with_context(|| format!("read {}", local.display()))?;
        let url = self.blob_url(name)?;
        let mut request = self
            .agent
            .request_url("PUT", &url)
            .set("Content-Type", "image/png")
            .set("x-ms-blob-type", "BlockBlob");
        if let Some(token) = &self.token {
            request = request.set("Authorization", &format!("Bearer {}", token));
        }
        request
            .send_bytes(&bytes)
            .map_err(|e| anyhow!("upload of {} failed: {}", name, e))?;
        Ok(url.to_string())
    }
}
