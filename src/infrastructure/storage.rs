use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use hyper::{Body, Client, Method, Request};
use thiserror::Error;
use tracing::info;

use crate::domain::StoredArtifact;
use crate::infrastructure::config::CredentialProvider;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("store credentials missing")]
    MissingCredentials { auth_url: String },

    #[error("upload transport error: {0}")]
    Transport(String),

    #[error("upload rejected: HTTP {0}")]
    Rejected(u16),

    #[error("malformed store response: {0}")]
    BadResponse(String),

    #[error("store io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Durable blob storage for rendered artifacts.
///
/// `upload` is atomic from the caller's perspective: either a usable
/// reference comes back or an error; no partial object is ever exposed.
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    /// Cheap preflight run before any persistence, so configuration
    /// problems surface before an artifact is rendered.
    fn ensure_ready(&self) -> Result<(), StoreError>;

    async fn upload(
        &self,
        name: &str,
        mime_type: &str,
        bytes: &[u8],
    ) -> Result<StoredArtifact, StoreError>;
}

/// Drive-style HTTP store: multipart/related upload with a Bearer token
/// from the injected credential provider.
pub struct DriveStore {
    client: Client<hyper::client::HttpConnector>,
    api_base: String,
    view_base: String,
    folder_id: String,
    credentials: Arc<CredentialProvider>,
}

impl DriveStore {
    pub fn new(
        api_base: String,
        view_base: String,
        folder_id: String,
        credentials: Arc<CredentialProvider>,
    ) -> Self {
        Self {
            client: Client::new(),
            api_base,
            view_base,
            folder_id,
            credentials,
        }
    }

    fn missing_credentials() -> StoreError {
        StoreError::MissingCredentials {
            auth_url: "/api/auth".to_string(),
        }
    }
}

#[async_trait]
impl ArtifactStore for DriveStore {
    fn ensure_ready(&self) -> Result<(), StoreError> {
        if self.credentials.access_token().is_none() {
            return Err(Self::missing_credentials());
        }
        Ok(())
    }

    async fn upload(
        &self,
        name: &str,
        mime_type: &str,
        bytes: &[u8],
    ) -> Result<StoredArtifact, StoreError> {
        let token = self
            .credentials
            .access_token()
            .ok_or_else(Self::missing_credentials)?;

        let boundary = format!("signoff-{}", uuid::Uuid::new_v4());
        let metadata = serde_json::json!({ "name": name, "parents": [self.folder_id] });

        let mut body = Vec::with_capacity(bytes.len() + 512);
        body.extend_from_slice(
            format!("--{boundary}\r\nContent-Type: application/json; charset=UTF-8\r\n\r\n")
                .as_bytes(),
        );
        body.extend_from_slice(metadata.to_string().as_bytes());
        body.extend_from_slice(
            format!("\r\n--{boundary}\r\nContent-Type: {mime_type}\r\n\r\n").as_bytes(),
        );
        body.extend_from_slice(bytes);
        body.extend_from_slice(format!("\r\n--{boundary}--\r\n").as_bytes());

        let request = Request::builder()
            .method(Method::POST)
            .uri(format!(
                "{}/upload/drive/v3/files?uploadType=multipart",
                self.api_base
            ))
            .header("authorization", format!("Bearer {token}"))
            .header(
                "content-type",
                format!("multipart/related; boundary={boundary}"),
            )
            .body(Body::from(body))
            .map_err(|e| StoreError::Transport(e.to_string()))?;

        let response = self
            .client
            .request(request)
            .await
            .map_err(|e| StoreError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(StoreError::Rejected(status.as_u16()));
        }

        let body = hyper::body::to_bytes(response)
            .await
            .map_err(|e| StoreError::Transport(e.to_string()))?;
        let parsed: serde_json::Value =
            serde_json::from_slice(&body).map_err(|e| StoreError::BadResponse(e.to_string()))?;
        let file_id = parsed["id"]
            .as_str()
            .ok_or_else(|| StoreError::BadResponse("missing file id".to_string()))?
            .to_string();

        let url = format!("{}/file/d/{}/view", self.view_base, file_id);
        info!(%file_id, "artifact uploaded to drive store");
        Ok(StoredArtifact { file_id, url })
    }
}

/// Local filesystem store backing a served uploads directory.
///
/// Bytes go to a temp file in the target directory and are renamed into
/// place on success; the temp file is cleaned up on every failure path.
pub struct LocalDirStore {
    dir: PathBuf,
    public_base: String,
}

impl LocalDirStore {
    pub fn new(dir: PathBuf, public_base: String) -> Self {
        Self { dir, public_base }
    }

    /// Reject names that could escape the uploads directory.
    pub fn sanitized(name: &str) -> Option<&str> {
        if name.is_empty()
            || name.starts_with('.')
            || name.contains('/')
            || name.contains('\\')
            || name.contains("..")
        {
            return None;
        }
        Some(name)
    }
}

#[async_trait]
impl ArtifactStore for LocalDirStore {
    fn ensure_ready(&self) -> Result<(), StoreError> {
        std::fs::create_dir_all(&self.dir)?;
        Ok(())
    }

    async fn upload(
        &self,
        name: &str,
        _mime_type: &str,
        bytes: &[u8],
    ) -> Result<StoredArtifact, StoreError> {
        let name = Self::sanitized(name)
            .ok_or_else(|| StoreError::BadResponse(format!("unsafe artifact name: {name}")))?;

        std::fs::create_dir_all(&self.dir)?;
        let mut tmp = tempfile::NamedTempFile::new_in(&self.dir)?;
        tmp.write_all(bytes)?;
        tmp.flush()?;
        tmp.persist(self.dir.join(name))
            .map_err(|e| StoreError::Io(e.error))?;

        let url = format!(
            "{}/files/{}",
            self.public_base.trim_end_matches('/'),
            name
        );
        info!(%name, "artifact stored in uploads directory");
        Ok(StoredArtifact {
            file_id: name.to_string(),
            url,
        })
    }
}
