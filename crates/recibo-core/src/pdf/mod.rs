//! Local PDF checks run before a document is sent to the extraction service.

use lopdf::Document;
use tracing::debug;

use crate::error::ExtractionError;

/// Basic facts about an accepted PDF.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PdfInfo {
    pub pages: usize,
    pub encrypted: bool,
}

/// Check that `data` is a readable PDF with at least one page and within the size limit.
///
/// Every failure is permanent: the same bytes will never pass on a retry.
pub fn validate_pdf(data: &[u8], max_bytes: usize) -> Result<PdfInfo, ExtractionError> {
    if data.is_empty() {
        return Err(ExtractionError::Permanent("file is empty".to_string()));
    }

    if data.len() > max_bytes {
        return Err(ExtractionError::Permanent(format!(
            "file is {} bytes, the limit is {}",
            data.len(),
            max_bytes
        )));
    }

    if !data.starts_with(b"%PDF-") {
        return Err(ExtractionError::Permanent("not a PDF file".to_string()));
    }

    let mut doc = Document::load_mem(data)
        .map_err(|e| ExtractionError::Permanent(format!("failed to parse PDF: {}", e)))?;

    // PDFs protected with an empty user password are still readable by the service.
    let encrypted = doc.is_encrypted();
    if encrypted {
        if doc.decrypt("").is_err() {
            return Err(ExtractionError::Permanent("PDF is password protected".to_string()));
        }
        debug!("Decrypted PDF with empty password");
    }

    let pages = doc.get_pages().len();
    if pages == 0 {
        return Err(ExtractionError::Permanent("PDF has no pages".to_string()));
    }

    debug!("Validated PDF with {} pages ({} bytes)", pages, data.len());
    Ok(PdfInfo { pages, encrypted })
}

/// Builds a minimal valid PDF in memory for tests.
#[cfg(test)]
pub(crate) fn sample_pdf(page_count: usize) -> Vec<u8> {
    use lopdf::{dictionary, Object};

    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();

    let kids: Vec<Object> = (0..page_count)
        .map(|_| {
            doc.add_object(dictionary! {
                "Type" => "Page",
                "Parent" => pages_id,
                "MediaBox" => vec![0.into(), 0.into(), 595.into(), 842.into()],
            })
            .into()
        })
        .collect();

    let pages = dictionary! {
        "Type" => "Pages",
        "Kids" => kids,
        "Count" => page_count as i64,
    };
    doc.objects.insert(pages_id, Object::Dictionary(pages));

    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let mut buffer = Vec::new();
    doc.save_to(&mut buffer).unwrap();
    buffer
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accepts_valid_pdf() {
        let info = validate_pdf(&sample_pdf(2), 1024 * 1024).unwrap();
        assert_eq!(info.pages, 2);
        assert!(!info.encrypted);
    }

    #[test]
    fn test_rejects_non_pdf() {
        let err = validate_pdf(b"PK\x03\x04 definitely a zip", 1024).unwrap_err();
        assert!(matches!(err, ExtractionError::Permanent(_)));
    }

    #[test]
    fn test_rejects_header_only_pdf() {
        let err = validate_pdf(b"%PDF-1.5\n%%EOF", 1024).unwrap_err();
        assert!(matches!(err, ExtractionError::Permanent(_)));
    }

    #[test]
    fn test_rejects_oversized_pdf() {
        let pdf = sample_pdf(1);
        let err = validate_pdf(&pdf, 10).unwrap_err();
        assert!(err.to_string().contains("limit"));
    }

    #[test]
    fn test_rejects_empty_file() {
        assert!(validate_pdf(&[], 10).is_err());
    }
}
