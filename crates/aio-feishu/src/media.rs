use std::path::Path;
use std::sync::Arc;

use aio_core::BridgeError;
use bytes::Bytes;

use crate::api::FeishuApi;
use crate::backend::{ApiRequest, MultipartFile, RequestBody};

pub(crate) const IMAGES_PATH: &str = "/im/v1/images";
pub(crate) const FILES_PATH: &str = "/im/v1/files";

/// Uploads images and files, returning the keys used in image, file and card
/// messages.
pub struct MediaUploader {
    api: Arc<FeishuApi>,
}

fn file_name_of(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "upload".to_string())
}

async fn read(path: &Path) -> Result<Bytes, BridgeError> {
    tokio::fs::read(path)
        .await
        .map(Bytes::from)
        .map_err(|e| BridgeError::Config(format!("cannot read {}: {e}", path.display())))
}

impl MediaUploader {
    pub(crate) fn new(api: Arc<FeishuApi>) -> Self {
        Self { api }
    }

    /// Upload an image from disk and return its `image_key`.
    pub async fn upload_image(&self, path: impl AsRef<Path>) -> Result<String, BridgeError> {
        let path = path.as_ref();
        let bytes = read(path).await?;
        self.upload_image_bytes(file_name_of(path), bytes).await
    }

    pub async fn upload_image_bytes(
        &self,
        file_name: impl Into<String>,
        bytes: impl Into<Bytes>,
    ) -> Result<String, BridgeError> {
        let body = RequestBody::Multipart {
            fields: vec![("image_type".to_string(), "message".to_string())],
            file: MultipartFile {
                field: "image".to_string(),
                file_name: file_name.into(),
                bytes: bytes.into(),
            },
        };
        let data = self
            .api
            .call(ApiRequest::post(IMAGES_PATH, body), "upload_image")
            .await?;
        key_of(&data, "image_key")
    }

    /// Upload a file from disk as a generic stream and return its `file_key`.
    pub async fn upload_file(&self, path: impl AsRef<Path>) -> Result<String, BridgeError> {
        let path = path.as_ref();
        let bytes = read(path).await?;
        self.upload_file_bytes(file_name_of(path), bytes).await
    }

    pub async fn upload_file_bytes(
        &self,
        file_name: impl Into<String>,
        bytes: impl Into<Bytes>,
    ) -> Result<String, BridgeError> {
        let file_name = file_name.into();
        let body = RequestBody::Multipart {
            fields: vec![
                ("file_type".to_string(), "stream".to_string()),
                ("file_name".to_string(), file_name.clone()),
            ],
            file: MultipartFile {
                field: "file".to_string(),
                file_name,
                bytes: bytes.into(),
            },
        };
        let data = self
            .api
            .call(ApiRequest::post(FILES_PATH, body), "upload_file")
            .await?;
        key_of(&data, "file_key")
    }
}

fn key_of(data: &serde_json::Value, field: &str) -> Result<String, BridgeError> {
    match data[field].as_str() {
        Some(key) if !key.is_empty() => {
            tracing::debug!(field, key, "media uploaded");
            Ok(key.to_string())
        }
        _ => Err(BridgeError::Parsing(format!("upload response without {field}"))),
    }
}
