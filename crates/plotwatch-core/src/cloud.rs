use crate::store::write_atomically;
use crate::{PlotwatchError, Result};
use reqwest::Client;
use std::env;
use std::io::Write;
use std::path::Path;
use tracing::{info, warn};
use url::Url;

const GRAPH_DRIVE_URL: &str = "https://graph.microsoft.com/v1.0/me/drive/";

/// OneDrive files addressed by path, through the Graph content endpoint.
///
/// Takes an already issued access token; refreshing it is up to whoever
/// put it in the environment.
pub struct CloudDrive {
    client: Client,
    token: String,
    base: Url,
}

impl CloudDrive {
    pub fn new(token: impl Into<String>) -> Result<Self> {
        Self::with_base(token, GRAPH_DRIVE_URL)
    }

    pub fn with_base(token: impl Into<String>, base: &str) -> Result<Self> {
        Ok(Self {
            client: Client::builder().build()?,
            token: token.into(),
            base: Url::parse(base)?,
        })
    }

    /// Built from `ONEDRIVE_ACCESS_TOKEN`, if set.
    pub fn from_env() -> Result<Option<Self>> {
        match env::var("ONEDRIVE_ACCESS_TOKEN") {
            Ok(token) if !token.is_empty() => Ok(Some(Self::new(token)?)),
            _ => Ok(None),
        }
    }

    /// `{base}root:/{remote path}:/content`, each segment percent-encoded.
    pub fn content_url(&self, remote_path: &str) -> Result<Url> {
        let segments: Vec<&str> = remote_path.split('/').filter(|s| !s.is_empty()).collect();
        let Some((last, dirs)) = segments.split_last() else {
            return Err(PlotwatchError::Config(format!(
                "Empty cloud drive path: {:?}",
                remote_path
            )));
        };

        let mut url = self.base.clone();
        {
            let mut path = url
                .path_segments_mut()
                .map_err(|_| PlotwatchError::Config(format!("Unusable drive URL {}", self.base)))?;
            path.pop_if_empty().push("root:");
            path.extend(dirs.iter().copied());
            path.push(&format!("{}:", last));
            path.push("content");
        }
        Ok(url)
    }

    pub async fn download(&self, remote_path: &str, local: &Path) -> Result<()> {
        let bytes = self
            .client
            .get(self.content_url(remote_path)?)
            .bearer_auth(&self.token)
            .send()
            .await?
            .error_for_status()?
            .bytes()
            .await?;

        write_atomically(local, |file| Ok(file.write_all(&bytes)?))?;
        info!("Downloaded {} from the cloud drive", remote_path);
        Ok(())
    }

    pub async fn upload(&self, local: &Path, remote_path: &str) -> Result<()> {
        let body = std::fs::read(local)?;
        self.client
            .put(self.content_url(remote_path)?)
            .bearer_auth(&self.token)
            .header(reqwest::header::CONTENT_TYPE, "application/octet-stream")
            .body(body)
            .send()
            .await?
            .error_for_status()?;
        info!("Uploaded {} to the cloud drive", remote_path);
        Ok(())
    }

    /// Refreshes the local copy; on failure the local copy is used as is.
    pub async fn pull(&self, remote_path: &str, local: &Path) -> bool {
        match self.download(remote_path, local).await {
            Ok(()) => true,
            Err(e) => {
                warn!("Could not download {}, using local copy: {}", remote_path, e);
                false
            }
        }
    }

    pub async fn push(&self, local: &Path, remote_path: &str) -> bool {
        match self.upload(local, remote_path).await {
            Ok(()) => true,
            Err(e) => {
                warn!("Could not upload {}: {}", local.display(), e);
                false
            }
        }
    }
}
