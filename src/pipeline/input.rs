//! Input resolution: turn a user-supplied path or URL into PDF bytes.
//!
//! pdfium can load a document straight from memory, so both local files and
//! downloads end up as an owned byte buffer. Size and the `%PDF` magic bytes
//! are checked here so callers get a meaningful error rather than a pdfium
//! failure deep inside extraction.

use crate::error::QuizGenError;
use std::path::PathBuf;
use tracing::{debug, info};

/// A PDF held in memory, with a name for error messages and logs.
#[derive(Debug, Clone)]
pub struct PdfSource {
    pub name: String,
    pub bytes: Vec<u8>,
}

/// Check if the input string looks like a URL.
pub fn is_url(input: &str) -> bool {
    input.starts_with("http://") || input.starts_with("https://")
}

/// Resolve the input string to PDF bytes.
///
/// URLs are downloaded with `timeout_secs`; anything else is read as a
/// local path. Both paths enforce `max_bytes` and the PDF magic check.
pub async fn resolve_input(
    input: &str,
    timeout_secs: u64,
    max_bytes: u64,
) -> Result<PdfSource, QuizGenError> {
    if input.trim().is_empty() {
        return Err(QuizGenError::InvalidInput {
            input: input.to_string(),
        });
    }
    if is_url(input) {
        download_url(input, timeout_secs, max_bytes).await
    } else {
        read_local(input, max_bytes).await
    }
}

/// Validate an in-memory buffer: size limit first, then magic bytes.
pub fn check_pdf(name: &str, bytes: &[u8], max_bytes: u64) -> Result<(), QuizGenError> {
    let size = bytes.len() as u64;
    if size > max_bytes {
        return Err(QuizGenError::FileTooLarge {
            size,
            limit: max_bytes,
        });
    }
    if !bytes.starts_with(b"%PDF") {
        let mut magic = [0u8; 4];
        let n = bytes.len().min(4);
        magic[..n].copy_from_slice(&bytes[..n]);
        return Err(QuizGenError::NotAPdf {
            source_name: name.to_string(),
            magic,
        });
    }
    Ok(())
}

async fn read_local(path_str: &str, max_bytes: u64) -> Result<PdfSource, QuizGenError> {
    let path = PathBuf::from(path_str);

    let meta = match tokio::fs::metadata(&path).await {
        Ok(m) => m,
        Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
            return Err(QuizGenError::PermissionDenied { path });
        }
        Err(_) => return Err(QuizGenError::FileNotFound { path }),
    };
    if !meta.is_file() {
        return Err(QuizGenError::InvalidInput {
            input: path_str.to_string(),
        });
    }
    // Refuse before reading a huge file into memory.
    if meta.len() > max_bytes {
        return Err(QuizGenError::FileTooLarge {
            size: meta.len(),
            limit: max_bytes,
        });
    }

    let bytes = tokio::fs::read(&path).await.map_err(|e| match e.kind() {
        std::io::ErrorKind::PermissionDenied => QuizGenError::PermissionDenied { path: path.clone() },
        _ => QuizGenError::FileNotFound { path: path.clone() },
    })?;

    let name = path.display().to_string();
    check_pdf(&name, &bytes, max_bytes)?;
    debug!("Read local PDF: {} ({} bytes)", name, bytes.len());
    Ok(PdfSource { name, bytes })
}

async fn download_url(url: &str, timeout_secs: u64, max_bytes: u64) -> Result<PdfSource, QuizGenError> {
    info!("Downloading PDF from: {}", url);

    let download_failed = |reason: String| QuizGenError::DownloadFailed {
        url: url.to_string(),
        reason,
    };

    let client = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| download_failed(e.to_string()))?;

    let response = client.get(url).send().await.map_err(|e| {
        if e.is_timeout() {
            QuizGenError::DownloadTimeout {
                url: url.to_string(),
                secs: timeout_secs,
            }
        } else {
            download_failed(e.to_string())
        }
    })?;

    if !response.status().is_success() {
        return Err(download_failed(format!("HTTP {}", response.status())));
    }

    if let Some(len) = response.content_length() {
        if len > max_bytes {
            return Err(QuizGenError::FileTooLarge {
                size: len,
                limit: max_bytes,
            });
        }
    }

    let bytes = response.bytes().await.map_err(|e| {
        if e.is_timeout() {
            QuizGenError::DownloadTimeout {
                url: url.to_string(),
                secs: timeout_secs,
            }
        } else {
            download_failed(e.to_string())
        }
    })?;

    let name = extract_filename(url);
    check_pdf(&name, &bytes, max_bytes)?;
    info!("Downloaded {} ({} bytes)", name, bytes.len());

    Ok(PdfSource {
        name,
        bytes: bytes.to_vec(),
    })
}

/// Extract a reasonable filename from the URL path.
fn extract_filename(url: &str) -> String {
    if let Ok(parsed) = reqwest::Url::parse(url) {
        if let Some(mut segments) = parsed.path_segments() {
            if let Some(last) = segments.next_back() {
                if !last.is_empty() && last.contains('.') {
                    return last.to_string();
                }
            }
        }
    }

    "downloaded.pdf".to_string()
}
