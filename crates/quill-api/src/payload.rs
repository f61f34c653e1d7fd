use axum::{
    Json,
    extract::{FromRequest, Multipart, Request},
    http::header,
};
use serde::Deserialize;

use crate::error::{ApiError, FieldErrors};

const TEXT_EXTENSIONS: &[&str] = &[".md", ".markdown", ".txt"];
const TEXT_CONTENT_TYPES: &[&str] = &["text/markdown", "text/plain"];

/// Raw note payload from either a JSON body or a multipart form. The
/// multipart form additionally carries the file-upload variant, where the
/// note content comes from an uploaded markdown/plain-text document.
#[derive(Debug, Default, Deserialize)]
pub struct NotePayload {
    pub title: Option<String>,
    pub content: Option<String>,
    pub folder_id: Option<i64>,
    #[serde(skip)]
    pub file: Option<UploadedFile>,
    #[serde(skip)]
    folder_id_invalid: bool,
}

#[derive(Debug)]
pub struct UploadedFile {
    pub filename: String,
    pub content_type: Option<String>,
    pub data: Vec<u8>,
}

/// Validated note input: non-empty title, resolved content, and the folder
/// assignment with the `0` sentinel already collapsed to unfiled.
#[derive(Debug)]
pub struct NoteInput {
    pub title: String,
    pub content: String,
    pub folder_id: Option<i64>,
}

impl NotePayload {
    pub fn validate(self) -> Result<NoteInput, ApiError> {
        let mut errors = FieldErrors::default();

        let title = self.title.as_deref().map(str::trim).unwrap_or("").to_string();
        if title.is_empty() {
            errors.add("title", "title is required");
        } else if title.len() > 255 {
            errors.add("title", "title must not exceed 255 characters");
        }

        if self.folder_id_invalid {
            errors.add("folder_id", "folder_id must be an integer");
        }

        // Inline content wins; the uploaded file only fills in when absent.
        let mut content = self.content.clone().filter(|c| !c.trim().is_empty());
        let mut content_missing = false;
        if content.is_none() {
            match &self.file {
                Some(file) => content = file_content(file, &mut errors),
                None => content_missing = true,
            }
        }

        if content_missing {
            if errors.is_empty() {
                return Err(ApiError::ContentOrFileRequired);
            }
            errors.add("content", "content or file is required");
        }
        errors.into_result()?;

        let folder_id = match self.folder_id {
            // 0 is the explicit "unfiled" sentinel.
            Some(0) | None => None,
            other => other,
        };

        Ok(NoteInput {
            title,
            content: content.unwrap_or_default(),
            folder_id,
        })
    }

    async fn from_multipart(multipart: &mut Multipart) -> Result<Self, ApiError> {
        let mut payload = NotePayload::default();

        while let Some(field) = multipart
            .next_field()
            .await
            .map_err(|_| body_error("malformed multipart body"))?
        {
            let Some(name) = field.name().map(|n| n.to_string()) else {
                continue;
            };
            match name.as_str() {
                "title" => {
                    payload.title = Some(read_text(field).await?);
                }
                "content" => {
                    payload.content = Some(read_text(field).await?);
                }
                "folder_id" => {
                    let raw = read_text(field).await?;
                    match raw.trim().parse::<i64>() {
                        Ok(id) => payload.folder_id = Some(id),
                        Err(_) => payload.folder_id_invalid = true,
                    }
                }
                "file" => {
                    let filename = field.file_name().unwrap_or_default().to_string();
                    let content_type = field.content_type().map(|ct| ct.to_string());
                    let data = field
                        .bytes()
                        .await
                        .map_err(|_| body_error("could not read uploaded file"))?
                        .to_vec();
                    payload.file = Some(UploadedFile {
                        filename,
                        content_type,
                        data,
                    });
                }
                // Unknown fields are ignored, matching the JSON path.
                _ => {}
            }
        }

        Ok(payload)
    }
}

impl<S> FromRequest<S> for NotePayload
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let content_type = req
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("");

        if content_type.starts_with("multipart/form-data") {
            let mut multipart = Multipart::from_request(req, state)
                .await
                .map_err(|_| body_error("multipart body expected"))?;
            return Self::from_multipart(&mut multipart).await;
        }

        let Json(payload) = Json::<NotePayload>::from_request(req, state)
            .await
            .map_err(|_| body_error("JSON body expected"))?;
        Ok(payload)
    }
}

async fn read_text(field: axum::extract::multipart::Field<'_>) -> Result<String, ApiError> {
    field
        .text()
        .await
        .map_err(|_| body_error("malformed multipart field"))
}

fn body_error(message: &str) -> ApiError {
    let mut errors = FieldErrors::default();
    errors.add("body", message);
    ApiError::Validation(errors)
}

fn file_content(file: &UploadedFile, errors: &mut FieldErrors) -> Option<String> {
    if !is_text_kind(file) {
        errors.add("file", "file must be a markdown or plain-text document");
        return None;
    }
    match String::from_utf8(file.data.clone()) {
        Ok(text) if !text.trim().is_empty() => Some(text),
        Ok(_) => {
            errors.add("file", "uploaded file is empty");
            None
        }
        Err(_) => {
            errors.add("file", "file must be valid UTF-8 text");
            None
        }
    }
}

fn is_text_kind(file: &UploadedFile) -> bool {
    let name = file.filename.to_ascii_lowercase();
    if TEXT_EXTENSIONS.iter().any(|ext| name.ends_with(ext)) {
        return true;
    }
    file.content_type
        .as_deref()
        .is_some_and(|ct| TEXT_CONTENT_TYPES.contains(&ct))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payload(title: Option<&str>, content: Option<&str>, folder_id: Option<i64>) -> NotePayload {
        NotePayload {
            title: title.map(str::to_string),
            content: content.map(str::to_string),
            folder_id,
            ..NotePayload::default()
        }
    }

    fn md_file(data: &[u8]) -> UploadedFile {
        UploadedFile {
            filename: "plan.md".to_string(),
            content_type: Some("text/markdown".to_string()),
            data: data.to_vec(),
        }
    }

    #[test]
    fn folder_sentinel_zero_means_unfiled() {
        let input = payload(Some("Plan"), Some("body"), Some(0)).validate().unwrap();
        assert_eq!(input.folder_id, None);

        let input = payload(Some("Plan"), Some("body"), None).validate().unwrap();
        assert_eq!(input.folder_id, None);

        let input = payload(Some("Plan"), Some("body"), Some(7)).validate().unwrap();
        assert_eq!(input.folder_id, Some(7));
    }

    #[test]
    fn missing_content_and_file_is_its_own_failure() {
        let err = payload(Some("Plan"), None, None).validate().unwrap_err();
        assert!(matches!(err, ApiError::ContentOrFileRequired));

        // Blank content counts as missing.
        let err = payload(Some("Plan"), Some("   "), None).validate().unwrap_err();
        assert!(matches!(err, ApiError::ContentOrFileRequired));
    }

    #[test]
    fn missing_title_is_a_field_error() {
        let err = payload(None, Some("body"), None).validate().unwrap_err();
        let ApiError::Validation(fields) = err else {
            panic!("expected validation error");
        };
        assert!(fields.0.contains_key("title"));
    }

    #[test]
    fn file_supplies_content_when_inline_is_absent() {
        let mut p = payload(Some("Plan"), None, None);
        p.file = Some(md_file(b"# Plan\nShip it"));
        let input = p.validate().unwrap();
        assert_eq!(input.content, "# Plan\nShip it");
    }

    #[test]
    fn inline_content_wins_over_the_file() {
        let mut p = payload(Some("Plan"), Some("inline"), None);
        p.file = Some(md_file(b"from file"));
        let input = p.validate().unwrap();
        assert_eq!(input.content, "inline");
    }

    #[test]
    fn non_text_files_are_rejected() {
        let mut p = payload(Some("Plan"), None, None);
        p.file = Some(UploadedFile {
            filename: "plan.exe".to_string(),
            content_type: Some("application/octet-stream".to_string()),
            data: b"MZ".to_vec(),
        });
        let err = p.validate().unwrap_err();
        let ApiError::Validation(fields) = err else {
            panic!("expected validation error");
        };
        assert!(fields.0.contains_key("file"));
    }

    #[test]
    fn non_utf8_file_data_is_rejected() {
        let mut p = payload(Some("Plan"), None, None);
        p.file = Some(md_file(&[0xff, 0xfe, 0x00]));
        let err = p.validate().unwrap_err();
        let ApiError::Validation(fields) = err else {
            panic!("expected validation error");
        };
        assert!(fields.0.contains_key("file"));
    }
}
