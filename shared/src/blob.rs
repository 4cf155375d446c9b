//! Pre-signed image uploads.
//!
//! The API never proxies file bytes. Clients ask for a short-lived signed
//! PUT URL, upload directly, then store the resulting public URL on the
//! program document.

use std::time::Duration;

use async_trait::async_trait;
use aws_sdk_s3::presigning::PresigningConfig;
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::{Error, Result};

/// Signed URLs stay valid for five minutes.
const UPLOAD_URL_EXPIRY: Duration = Duration::from_secs(300);

const ALLOWED_IMAGE_TYPES: &[&str] = &[
    "image/jpeg",
    "image/jpg",
    "image/png",
    "image/gif",
    "image/webp",
];

#[derive(Debug, Clone, Serialize)]
pub struct UploadTarget {
    #[serde(rename = "uploadUrl")]
    pub upload_url: String,
    #[serde(rename = "publicUrl")]
    pub public_url: String,
    pub key: String,
}

/// Reject anything that is not a known image content type.
pub fn validate_image_type(content_type: &str) -> Result<()> {
    let normalized = content_type.trim().to_lowercase();
    if ALLOWED_IMAGE_TYPES.contains(&normalized.as_str()) {
        Ok(())
    } else {
        Err(Error::Validation(format!(
            "Unsupported image type: {}",
            content_type
        )))
    }
}

fn sanitize_file_name(file_name: &str) -> String {
    file_name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '.' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// Object key for a program image. Drafts without a saved program yet go
/// under the `temp` folder.
pub fn image_object_key(file_name: &str, program_id: Option<&str>, now: DateTime<Utc>) -> String {
    let folder = program_id.filter(|id| !id.is_empty()).unwrap_or("temp");
    format!(
        "programs/{}/{}-{}",
        folder,
        now.timestamp_millis(),
        sanitize_file_name(file_name)
    )
}

#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn upload_url(&self, key: &str, content_type: &str) -> Result<UploadTarget>;
}

pub struct S3BlobStore {
    client: aws_sdk_s3::Client,
    bucket: String,
    region: String,
}

impl S3BlobStore {
    pub fn new(client: aws_sdk_s3::Client, bucket: String, region: String) -> Self {
        Self {
            client,
            bucket,
            region,
        }
    }

    pub async fn from_env(bucket: String, region: String) -> Self {
        let config = aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;
        Self::new(aws_sdk_s3::Client::new(&config), bucket, region)
    }
}

#[async_trait]
impl BlobStore for S3BlobStore {
    async fn upload_url(&self, key: &str, content_type: &str) -> Result<UploadTarget> {
        let presigning = PresigningConfig::expires_in(UPLOAD_URL_EXPIRY)
            .map_err(|e| Error::Dependency(format!("Invalid presigning config: {}", e)))?;

        let presigned = self
            .client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .content_type(content_type)
            .presigned(presigning)
            .await
            .map_err(|e| Error::Dependency(format!("Failed to presign upload: {}", e)))?;

        Ok(UploadTarget {
            upload_url: presigned.uri().to_string(),
            public_url: format!(
                "https://{}.s3.{}.amazonaws.com/{}",
                self.bucket, self.region, key
            ),
            key: key.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn accepts_known_image_types() {
        assert!(validate_image_type("image/png").is_ok());
        assert!(validate_image_type(" IMAGE/JPEG ").is_ok());
    }

    #[test]
    fn rejects_non_image_types() {
        assert!(validate_image_type("application/pdf").is_err());
        assert!(validate_image_type("text/html").is_err());
        assert!(validate_image_type("").is_err());
    }

    #[test]
    fn object_key_sanitizes_and_prefixes() {
        let now = Utc.with_ymd_and_hms(2026, 8, 25, 12, 0, 0).unwrap();
        let key = image_object_key("team photo (1).png", Some("p1"), now);
        assert_eq!(
            key,
            format!("programs/p1/{}-team_photo__1_.png", now.timestamp_millis())
        );
    }

    #[test]
    fn missing_program_id_uses_temp_folder() {
        let now = Utc.with_ymd_and_hms(2026, 8, 25, 12, 0, 0).unwrap();
        assert!(image_object_key("a.png", None, now).starts_with("programs/temp/"));
        assert!(image_object_key("a.png", Some(""), now).starts_with("programs/temp/"));
    }
}
