//! Concrete `PdfExtractor` backed by the `pdf-extract` crate. Extraction is
//! CPU-bound and blocking, so it runs on `spawn_blocking` rather than
//! tying up the async worker.

use async_trait::async_trait;

use crate::error::ServiceError;
use crate::ports::PdfExtractor;

#[derive(Debug, Clone, Default)]
pub struct PdfExtractPdfExtractor;

impl PdfExtractPdfExtractor {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl PdfExtractor for PdfExtractPdfExtractor {
    async fn extract_text(&self, pdf_bytes: &[u8]) -> Result<String, ServiceError> {
        let bytes = pdf_bytes.to_vec();
        tokio::task::spawn_blocking(move || pdf_extract::extract_text_from_mem(&bytes))
            .await
            .map_err(|e| ServiceError::retriable("pdf_extract_join", e))?
            .map_err(|e| ServiceError::retriable("pdf_extract", e))
    }
}
