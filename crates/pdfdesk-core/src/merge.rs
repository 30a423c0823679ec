//! PDF Merge
//!
//! Combines multiple PDFs into a single document.

use crate::document::Document;
use crate::error::PdfDeskError;
use crate::page_tree::{assemble, PageSource};
use tracing::info;

/// Merge documents into one, all pages of each input in input order
///
/// The first input's version and document info are kept. At least two
/// documents are required.
pub fn merge(documents: &[Document]) -> Result<Document, PdfDeskError> {
    if documents.len() < 2 {
        return Err(PdfDeskError::EmptyInput(format!(
            "At least 2 PDF files are needed to merge, got {}",
            documents.len()
        )));
    }

    let sources: Vec<PageSource<'_>> = documents.iter().map(PageSource::all_pages).collect();
    let merged = assemble(&sources)?;

    info!(
        inputs = documents.len(),
        pages = merged.page_count(),
        "Merged documents"
    );
    Ok(merged)
}
