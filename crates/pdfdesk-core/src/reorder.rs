//! Page reordering

use crate::document::Document;
use crate::error::PdfDeskError;
use crate::page_tree::{assemble, PageSource};
use crate::selection::PageOrder;
use tracing::info;

/// Output page `i` is input page `order[i]`
pub fn reorder_pages(document: &Document, order: &PageOrder) -> Result<Document, PdfDeskError> {
    let page_count = document.page_count();
    if order.page_count() != page_count {
        return Err(PdfDeskError::Validation(format!(
            "Page order lists {} pages, but this document has {} pages",
            order.page_count(),
            page_count
        )));
    }

    let result = assemble(&[PageSource::new(document, order.pages().to_vec())])?;
    info!(pages = page_count, identity = order.is_identity(), "Reordered pages");
    Ok(result)
}
