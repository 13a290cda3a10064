//! Local checks and file loading for multipart uploads.

use std::path::Path;

use pitchdeck_protocol::constants::MAX_UPLOAD_SIZE;

use crate::client::ApiError;

const PDF: &str = "application/pdf";
const PPT: &str = "application/vnd.ms-powerpoint";
const PPTX: &str = "application/vnd.openxmlformats-officedocument.presentationml.presentation";
const OCTET_STREAM: &str = "application/octet-stream";

/// Upload rejected before reaching the server.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum UploadError {
    #[error("unsupported deck type '{0}': only PDF and PowerPoint files are allowed")]
    UnsupportedType(String),

    #[error("file is {size} bytes, exceeding the {max} byte limit")]
    TooLarge { size: u64, max: u64 },

    #[error("file is empty")]
    Empty,

    #[error("startup name is required")]
    MissingStartupName,

    #[error("path has no file name")]
    NoFileName,
}

/// A file read from disk and ready to attach to a form.
#[derive(Debug)]
pub struct UploadFile {
    pub file_name: String,
    pub mime: &'static str,
    pub bytes: Vec<u8>,
}

fn extension(path: &Path) -> String {
    path.extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default()
}

/// MIME type of a deck, or an error if the extension is not accepted.
pub fn deck_mime(path: &Path) -> Result<&'static str, UploadError> {
    match extension(path).as_str() {
        "pdf" => Ok(PDF),
        "ppt" => Ok(PPT),
        "pptx" => Ok(PPTX),
        other => Err(UploadError::UnsupportedType(other.to_string())),
    }
}

/// Best-effort MIME type of a knowledge file.
pub fn knowledge_mime(path: &Path) -> &'static str {
    match extension(path).as_str() {
        "pdf" => PDF,
        "ppt" => PPT,
        "pptx" => PPTX,
        "doc" => "application/msword",
        "docx" => "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
        "txt" => "text/plain",
        "md" => "text/markdown",
        "csv" => "text/csv",
        "json" => "application/json",
        _ => OCTET_STREAM,
    }
}

pub fn check_size(size: u64) -> Result<(), UploadError> {
    if size == 0 {
        return Err(UploadError::Empty);
    }
    if size > MAX_UPLOAD_SIZE {
        return Err(UploadError::TooLarge {
            size,
            max: MAX_UPLOAD_SIZE,
        });
    }
    Ok(())
}

/// Trimmed startup name; blank names are rejected.
pub fn startup_name(name: &str) -> Result<&str, UploadError> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(UploadError::MissingStartupName);
    }
    Ok(trimmed)
}

/// Checks the size on disk, then reads the file.
pub(crate) async fn load(path: &Path, mime: &'static str) -> Result<UploadFile, ApiError> {
    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or(UploadError::NoFileName)?
        .to_string();

    let size = tokio::fs::metadata(path).await?.len();
    check_size(size)?;

    let bytes = tokio::fs::read(path).await?;
    // The file may have changed between the two calls.
    check_size(bytes.len() as u64)?;

    Ok(UploadFile {
        file_name,
        mime,
        bytes,
    })
}
