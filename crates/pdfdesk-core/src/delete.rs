//! Page deletion

use crate::document::Document;
use crate::error::PdfDeskError;
use crate::page_tree::{assemble, PageSource};
use crate::selection::PageSelection;
use tracing::info;

/// Remove the selected pages, keeping the rest in their original order
pub fn delete_pages(
    document: &Document,
    selection: &PageSelection,
) -> Result<Document, PdfDeskError> {
    let page_count = document.page_count();
    selection.ensure_matches(page_count)?;

    if selection.covers_all() {
        return Err(PdfDeskError::AllPagesRemoved { page_count });
    }

    let keep: Vec<u32> = (1..=page_count)
        .filter(|page| !selection.contains(*page))
        .collect();
    let result = assemble(&[PageSource::new(document, keep)])?;

    info!(
        deleted = selection.len(),
        remaining = result.page_count(),
        "Deleted pages"
    );
    Ok(result)
}
