//! Text extraction: PDF bytes → raw document text via pdfium.
//!
//! pdfium is a blocking C++ library, so the work runs inside
//! `tokio::task::spawn_blocking` to keep the async workers free.
//!
//! Binding order: the directory in `PDFIUM_LIB_PATH` if set, otherwise the
//! system library. A missing library is reported as
//! [`QuizGenError::PdfiumBindingFailed`] instead of a panic.

use crate::error::QuizGenError;
use pdfium_render::prelude::*;
use serde::Serialize;
use tracing::{debug, info, warn};

/// Raw text of a document plus page bookkeeping.
#[derive(Debug, Clone, Serialize)]
pub struct ExtractedText {
    pub text: String,
    pub page_count: usize,
    /// Pages that yielded no text (scans, figure-only pages).
    pub empty_pages: usize,
}

/// Extract the text of every page, joined with blank lines.
pub async fn extract_text(bytes: Vec<u8>, password: Option<String>) -> Result<ExtractedText, QuizGenError> {
    tokio::task::spawn_blocking(move || extract_text_blocking(bytes, password.as_deref()))
        .await
        .map_err(|e| QuizGenError::Internal(format!("Extraction task panicked: {}", e)))?
}

fn extract_text_blocking(bytes: Vec<u8>, password: Option<&str>) -> Result<ExtractedText, QuizGenError> {
    let pdfium = bind_pdfium()?;

    let document = pdfium
        .load_pdf_from_byte_vec(bytes, password)
        .map_err(|e| load_error(&e, password.is_some()))?;

    let pages = document.pages();
    let page_count = pages.len() as usize;
    info!("PDF loaded: {} pages", page_count);

    let mut page_texts = Vec::with_capacity(page_count);
    for (idx, page) in pages.iter().enumerate() {
        match page.text() {
            Ok(text) => page_texts.push(text.all()),
            Err(e) => {
                warn!("Page {}: no text layer ({:?})", idx + 1, e);
                page_texts.push(String::new());
            }
        }
    }

    let empty_pages = page_texts.iter().filter(|t| t.trim().is_empty()).count();
    let text = join_pages(&page_texts);
    debug!(
        "Extracted {} chars from {} pages ({} empty)",
        text.chars().count(),
        page_count,
        empty_pages
    );

    Ok(ExtractedText {
        text,
        page_count,
        empty_pages,
    })
}

fn bind_pdfium() -> Result<Pdfium, QuizGenError> {
    let bindings = match std::env::var("PDFIUM_LIB_PATH") {
        Ok(dir) if !dir.is_empty() => {
            Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path(&dir))
        }
        _ => Pdfium::bind_to_system_library(),
    }
    .map_err(|e| QuizGenError::PdfiumBindingFailed(format!("{:?}", e)))?;
    Ok(Pdfium::new(bindings))
}

/// pdfium reports password problems only through its error's debug text.
fn load_error(e: &PdfiumError, password_given: bool) -> QuizGenError {
    let detail = format!("{:?}", e);
    let reason = if detail.to_lowercase().contains("password") {
        if password_given {
            "the supplied password is incorrect".to_string()
        } else {
            "the document is encrypted; supply a password".to_string()
        }
    } else {
        format!("corrupt or unsupported PDF ({detail})")
    };
    QuizGenError::Extraction { reason }
}

/// Trim each page, drop empty ones, and separate pages with a blank line
/// so the chunker treats page breaks as paragraph boundaries.
fn join_pages(pages: &[String]) -> String {
    pages
        .iter()
        .map(|p| p.trim())
        .filter(|p| !p.is_empty())
        .collect::<Vec<_>>()
        .join("\n\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pages_joined_with_blank_lines() {
        let pages = vec![
            "  First page.\n".to_string(),
            "   ".to_string(),
            "Second page.".to_string(),
        ];
        assert_eq!(join_pages(&pages), "First page.\n\nSecond page.");
    }

    #[test]
    fn no_pages_is_empty_text() {
        assert_eq!(join_pages(&[]), "");
    }

    #[tokio::test]
    async fn garbage_bytes_fail_cleanly() {
        // Either pdfium is missing (binding error) or the bytes are rejected;
        // both must come back as errors, not panics.
        let err = extract_text(b"%PDF-not really".to_vec(), None).await.unwrap_err();
        assert!(matches!(
            err,
            QuizGenError::PdfiumBindingFailed(_) | QuizGenError::Extraction { .. }
        ));
    }
}
