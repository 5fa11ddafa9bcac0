use url::Url;

use crate::error::AppError;

/// Parse and normalize a user-supplied URL.
///
/// Trims whitespace, assumes `http://` when no scheme is present, and
/// rejects anything that is not `http`/`https`.
pub fn normalize_url(raw: &str) -> Result<Url, AppError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(AppError::InvalidInput("url must not be empty".to_string()));
    }

    let candidate = if trimmed.contains("://") {
        trimmed.to_string()
    } else {
        format!("http://{trimmed}")
    };

    let url = Url::parse(&candidate)
        .map_err(|e| AppError::InvalidInput(format!("Invalid URL \"{trimmed}\": {e}")))?;

    match url.scheme() {
        "http" | "https" => {}
        other => {
            return Err(AppError::InvalidInput(format!(
                "Unsupported URL scheme \"{other}\""
            )));
        }
    }

    if url.host_str().is_none() {
        return Err(AppError::InvalidInput(format!(
            "URL \"{trimmed}\" has no host"
        )));
    }

    Ok(url)
}
