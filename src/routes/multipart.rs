use axum::extract::Multipart;
use std::collections::HashMap;

use crate::error::{AppError, AppResult};

pub struct UploadedFile {
    pub filename: Option<String>,
    pub content_type: Option<String>,
    pub bytes: Vec<u8>,
}

impl UploadedFile {
    pub fn is_image(&self) -> bool {
        self.content_type
            .as_deref()
            .is_some_and(|ct| ct.starts_with("image/"))
    }

    pub fn extension(&self) -> String {
        crate::assets::upload_extension(self.filename.as_deref(), self.content_type.as_deref())
    }
}

/// A fully read multipart body: the `file` part plus any text fields.
pub struct UploadForm {
    pub file: Option<UploadedFile>,
    pub fields: HashMap<String, String>,
}

impl UploadForm {
    pub async fn read(mut multipart: Multipart) -> AppResult<Self> {
        let mut file = None;
        let mut fields = HashMap::new();

        while let Some(field) = multipart
            .next_field()
            .await
            .map_err(|e| AppError::bad_request(format!("Malformed upload: {e}")))?
        {
            let Some(name) = field.name().map(str::to_string) else {
                continue;
            };

            if name == "file" {
                let filename = field.file_name().map(str::to_string);
                let content_type = field.content_type().map(str::to_string);
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| AppError::bad_request(format!("Malformed upload: {e}")))?;
                file = Some(UploadedFile {
                    filename,
                    content_type,
                    bytes: bytes.to_vec(),
                });
            } else {
                let value = field
                    .text()
                    .await
                    .map_err(|e| AppError::bad_request(format!("Malformed upload: {e}")))?;
                fields.insert(name, value);
            }
        }

        Ok(Self { file, fields })
    }

    pub fn require_file(&mut self) -> AppResult<UploadedFile> {
        self.file
            .take()
            .ok_or_else(|| AppError::bad_request("Missing file"))
    }

    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields
            .get(name)
            .map(String::as_str)
            .filter(|v| !v.is_empty())
    }

    /// Optional integer field. Present but unparsable is a client error.
    pub fn int_field(&self, name: &str) -> AppResult<Option<i64>> {
        self.field(name)
            .map(|v| {
                v.trim()
                    .parse()
                    .map_err(|_| AppError::bad_request(format!("Invalid {name}")))
            })
            .transpose()
    }
}
