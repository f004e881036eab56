//! Client-side checks run before a request is sent.

use crate::error::ApiError;

/// Constraints the server enforces on uploaded files, checked client-side
/// so an upload that can only fail is never sent.
#[derive(Debug, Clone, Copy)]
pub struct UploadRules {
    /// Form field the file is sent under.
    pub field: &'static str,
    /// Lower-case extensions accepted.
    pub extensions: &'static [&'static str],
    /// Maximum size in bytes.
    pub max_bytes: usize,
}

/// Profile avatar: png/jpg/jpeg up to 5 MiB.
pub const PROFILE_IMAGE: UploadRules = UploadRules {
    field: "image",
    extensions: &["png", "jpg", "jpeg"],
    max_bytes: 5 * 1024 * 1024,
};

/// Post media: images or short videos up to 20 MiB.
pub const POST_MEDIA: UploadRules = UploadRules {
    field: "media",
    extensions: &["png", "jpg", "jpeg", "mp4", "webm"],
    max_bytes: 20 * 1024 * 1024,
};

fn extension(file_name: &str) -> Option<String> {
    file_name
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .filter(|ext| !ext.is_empty())
}

/// Rejects files the server would refuse.
pub fn validate_upload(rules: &UploadRules, file_name: &str, len: usize) -> Result<(), ApiError> {
    if len == 0 {
        return Err(ApiError::validation("file is empty"));
    }
    let ext = extension(file_name)
        .ok_or_else(|| ApiError::validation(format!("{file_name}: missing file extension")))?;
    if !rules.extensions.contains(&ext.as_str()) {
        return Err(ApiError::validation(format!(
            "{file_name}: invalid file type (allowed: {})",
            rules.extensions.join(", ")
        )));
    }
    if len > rules.max_bytes {
        return Err(ApiError::validation(format!(
            "{file_name}: file too large ({len} bytes, max {})",
            rules.max_bytes
        )));
    }
    Ok(())
}

/// MIME type sent with an upload part.
pub fn mime_for(file_name: &str) -> &'static str {
    match extension(file_name).as_deref() {
        Some("png") => "image/png",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("mp4") => "video/mp4",
        Some("webm") => "video/webm",
        _ => "application/octet-stream",
    }
}

/// Title and content of a new post are mandatory.
pub fn validate_post_draft(title: &str, content: &str) -> Result<(), ApiError> {
    if title.trim().is_empty() {
        return Err(ApiError::validation("title is required"));
    }
    if content.trim().is_empty() {
        return Err(ApiError::validation("content is required"));
    }
    Ok(())
}

/// Login needs both an email and a password.
pub fn validate_login(email: &str, password: &str) -> Result<(), ApiError> {
    if email.trim().is_empty() || password.is_empty() {
        return Err(ApiError::validation("email and password are required"));
    }
    Ok(())
}
