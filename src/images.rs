use std::collections::HashMap;

use anyhow::Context;
use axum::extract::Multipart;
use bytes::Bytes;
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::storage::StorageClient;

pub const PROFILE_PHOTO_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "heif", "hevc"];
pub const POST_IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "heic", "heif"];

const PRESIGN_TTL_SECS: u64 = 30 * 60;

/// A file received in a multipart body.
#[derive(Debug, Clone)]
pub struct Upload {
    pub file_name: Option<String>,
    pub content_type: Option<String>,
    pub body: Bytes,
}

/// Text fields and files of a multipart form, by field name.
#[derive(Debug, Default)]
pub struct UploadForm {
    pub fields: HashMap<String, String>,
    pub files: HashMap<String, Upload>,
}

impl UploadForm {
    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(String::as_str)
    }

    pub fn take_file(&mut self, name: &str) -> Option<Upload> {
        self.files.remove(name)
    }
}

pub async fn read_form(mut mp: Multipart) -> AppResult<UploadForm> {
    let mut form = UploadForm::default();
    while let Some(field) = mp
        .next_field()
        .await
        .map_err(|e| AppError::BadRequest(e.body_text()))?
    {
        let Some(name) = field.name().map(str::to_string) else {
            continue;
        };
        let file_name = field.file_name().map(str::to_string);
        let content_type = field.content_type().map(str::to_string);
        let data = field
            .bytes()
            .await
            .map_err(|e| AppError::BadRequest(e.body_text()))?;
        if file_name.is_some() {
            form.files.insert(
                name,
                Upload {
                    file_name,
                    content_type,
                    body: data,
                },
            );
        } else {
            let text = String::from_utf8(data.to_vec())
                .map_err(|_| AppError::BadRequest(format!("field {name} is not valid UTF-8")))?;
            form.fields.insert(name, text);
        }
    }
    Ok(form)
}

fn ext_from_mime(ct: &str) -> Option<&'static str> {
    match ct {
        "image/jpeg" | "image/jpg" => Some("jpg"),
        "image/png" => Some("png"),
        "image/heic" => Some("heic"),
        "image/heif" => Some("heif"),
        "video/hevc" => Some("hevc"),
        _ => None,
    }
}

fn extension_of(upload: &Upload) -> Option<String> {
    upload
        .file_name
        .as_deref()
        .and_then(|n| n.rsplit_once('.'))
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .filter(|ext| !ext.is_empty())
        .or_else(|| {
            upload
                .content_type
                .as_deref()
                .and_then(ext_from_mime)
                .map(str::to_string)
        })
}

/// Checks the upload is non-empty and carries an allowed extension, which it returns.
pub fn validate_upload(upload: &Upload, allowed: &[&str]) -> AppResult<String> {
    if upload.body.is_empty() {
        return Err(AppError::BadRequest("The submitted file is empty".into()));
    }
    let ext = extension_of(upload).unwrap_or_default();
    if !allowed.contains(&ext.as_str()) {
        return Err(AppError::BadRequest(format!(
            "File extension \"{ext}\" is not allowed. Allowed extensions are: {}",
            allowed.join(", ")
        )));
    }
    Ok(ext)
}

/// Validate and upload, returning the object key `<prefix>/<owner>/<uuid>.<ext>`.
pub async fn store_image(
    storage: &dyn StorageClient,
    prefix: &str,
    owner: Uuid,
    upload: Upload,
    allowed: &[&str],
) -> AppResult<String> {
    let ext = validate_upload(&upload, allowed)?;
    let key = format!("{}/{}/{}.{}", prefix, owner, Uuid::new_v4(), ext);
    let content_type = upload
        .content_type
        .unwrap_or_else(|| "application/octet-stream".into());
    storage
        .put_object(&key, upload.body, &content_type)
        .await
        .with_context(|| format!("put_object {}", key))?;
    Ok(key)
}

/// Remove an object whose owning row was never written. Failures are only logged.
pub async fn discard_image(storage: &dyn StorageClient, key: &str) {
    if let Err(e) = storage.delete_object(key).await {
        tracing::warn!(error = %e, key = %key, "failed to discard orphaned image");
    }
}

pub async fn presign(storage: &dyn StorageClient, key: &str) -> anyhow::Result<String> {
    storage
        .presign_get(key, PRESIGN_TTL_SECS)
        .await
        .with_context(|| format!("presign url for key {}", key))
}

pub async fn presign_opt(
    storage: &dyn StorageClient,
    key: Option<&str>,
) -> anyhow::Result<Option<String>> {
    match key {
        Some(k) => presign(storage, k).await.map(Some),
        None => Ok(None),
    }
}

#[cfg(test)]
mod image_tests {
    use super::*;
    use crate::storage::MemoryStorage;

    fn upload(name: Option<&str>, ct: Option<&str>, body: &'static [u8]) -> Upload {
        Upload {
            file_name: name.map(str::to_string),
            content_type: ct.map(str::to_string),
            body: Bytes::from_static(body),
        }
    }

    #[test]
    fn test_ext_from_mime() {
        assert_eq!(ext_from_mime("image/jpeg"), Some("jpg"));
        assert_eq!(ext_from_mime("image/jpg"), Some("jpg"));
        assert_eq!(ext_from_mime("image/png"), Some("png"));
        assert_eq!(ext_from_mime("image/heic"), Some("heic"));
        assert_eq!(ext_from_mime("application/octet-stream"), None);
    }

    #[test]
    fn extension_prefers_file_name() {
        let u = upload(Some("Me.JPEG"), Some("image/png"), b"x");
        assert_eq!(validate_upload(&u, PROFILE_PHOTO_EXTENSIONS).unwrap(), "jpeg");
        let u = upload(Some("noext"), Some("image/png"), b"x");
        assert_eq!(validate_upload(&u, PROFILE_PHOTO_EXTENSIONS).unwrap(), "png");
    }

    #[test]
    fn rejects_disallowed_and_empty() {
        let u = upload(Some("clip.gif"), None, b"x");
        assert!(matches!(
            validate_upload(&u, POST_IMAGE_EXTENSIONS),
            Err(AppError::BadRequest(_))
        ));
        // heic is fine for posts, not for profile photos
        let u = upload(Some("a.heic"), None, b"x");
        assert!(validate_upload(&u, POST_IMAGE_EXTENSIONS).is_ok());
        assert!(validate_upload(&u, PROFILE_PHOTO_EXTENSIONS).is_err());
        let u = upload(Some("a.png"), None, b"");
        assert!(validate_upload(&u, POST_IMAGE_EXTENSIONS).is_err());
    }

    #[tokio::test]
    async fn store_and_presign() {
        let storage = MemoryStorage::default();
        let owner = Uuid::new_v4();
        let key = store_image(
            &storage,
            "posts",
            owner,
            upload(Some("a.png"), Some("image/png"), b"png-bytes"),
            POST_IMAGE_EXTENSIONS,
        )
        .await
        .expect("stored");
        assert!(key.starts_with(&format!("posts/{owner}/")));
        assert!(key.ends_with(".png"));
        assert!(storage.contains(&key));
        let url = presign(&storage, &key).await.expect("presign");
        assert!(url.contains(&key));
        assert_eq!(presign_opt(&storage, None).await.unwrap(), None);
    }
}
