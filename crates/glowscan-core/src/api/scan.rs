use std::path::Path;

use reqwest::multipart::{Form, Part};
use tracing::info;

use super::{ApiClient, ApiError};
use crate::models::AnalysisResult;

/// One photo for a scan.
#[derive(Debug, Clone)]
pub struct ImagePart {
    pub file_name: String,
    pub mime: String,
    pub bytes: Vec<u8>,
}

impl ImagePart {
    pub fn new(file_name: impl Into<String>, mime: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            file_name: file_name.into(),
            mime: mime.into(),
            bytes,
        }
    }

    /// Read an image from disk, guessing the MIME type from the extension.
    pub async fn from_path(path: &Path) -> Result<Self, ApiError> {
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| ApiError::Storage(format!("{}: {}", path.display(), e)))?;
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "image.jpg".to_string());
        let mime = match path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .as_deref()
        {
            Some("png") => "image/png",
            Some("webp") => "image/webp",
            _ => "image/jpeg",
        };
        Ok(Self::new(file_name, mime, bytes))
    }

    fn into_part(self) -> Result<Part, ApiError> {
        Part::bytes(self.bytes)
            .file_name(self.file_name)
            .mime_str(&self.mime)
            .map_err(ApiError::from)
    }
}

/// Client for the scan-model service.
#[derive(Clone)]
pub struct ScanClient {
    api: ApiClient,
}

impl ScanClient {
    pub fn new(api: ApiClient) -> Self {
        Self { api }
    }

    /// Submit the three face photos for analysis.
    pub async fn analyze(
        &self,
        front: ImagePart,
        left: ImagePart,
        right: ImagePart,
    ) -> Result<AnalysisResult, ApiError> {
        let form = Form::new()
            .part("frontImage", front.into_part()?)
            .part("leftImage", left.into_part()?)
            .part("rightImage", right.into_part()?);

        let url = self.api.endpoints().scan("/analyze");
        let result: AnalysisResult = self.api.json(self.api.post(&url).multipart(form)).await?;
        info!(status = %result.status, "Scan analyzed");
        Ok(result)
    }
}
