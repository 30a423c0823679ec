//! PDF Split
//!
//! Breaks a document into smaller documents, either one per selected page or
//! into consecutive fixed-size chunks.

use crate::document::Document;
use crate::error::PdfDeskError;
use crate::page_tree::{assemble, PageSource};
use crate::selection::PageSelection;
use tracing::info;

/// One single-page document per selected page, ascending
pub fn split_by_selection(
    document: &Document,
    selection: &PageSelection,
) -> Result<Vec<Document>, PdfDeskError> {
    selection.ensure_matches(document.page_count())?;

    let parts = selection
        .iter()
        .map(|page| assemble(&[PageSource::new(document, vec![page])]))
        .collect::<Result<Vec<_>, _>>()?;

    info!(parts = parts.len(), "Split document by page selection");
    Ok(parts)
}

/// Consecutive chunks of `chunk_size` pages; the last chunk may be shorter
pub fn split_by_chunk_size(
    document: &Document,
    chunk_size: u32,
) -> Result<Vec<Document>, PdfDeskError> {
    if chunk_size == 0 {
        return Err(PdfDeskError::Validation(
            "Chunk size must be at least 1".into(),
        ));
    }

    let page_count = document.page_count();
    if page_count == 0 {
        return Err(PdfDeskError::SourceRead("Document has no pages".into()));
    }

    let pages: Vec<u32> = (1..=page_count).collect();
    let parts = pages
        .chunks(chunk_size as usize)
        .map(|chunk| assemble(&[PageSource::new(document, chunk.to_vec())]))
        .collect::<Result<Vec<_>, _>>()?;

    info!(
        parts = parts.len(),
        chunk_size, "Split document into chunks"
    );
    Ok(parts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::page_texts;
    use crate::selection::parse_page_selection;
    use crate::test_support::create_test_pdf;
    use pretty_assertions::assert_eq;

    fn load(pages: u32) -> Document {
        Document::from_bytes(&create_test_pdf(pages)).unwrap()
    }

    #[test]
    fn test_split_single_page() {
        let doc = load(5);
        let selection = parse_page_selection("3", 5).unwrap();
        let parts = split_by_selection(&doc, &selection).unwrap();
        assert_eq!(parts.len(), 1);
        assert_eq!(page_texts(&parts[0]), vec!["Page 3"]);
    }

    #[test]
    fn test_split_produces_one_document_per_page_in_ascending_order() {
        let doc = load(10);
        let selection = parse_page_selection("7, 2-3", 10).unwrap();
        let parts = split_by_selection(&doc, &selection).unwrap();

        let texts: Vec<Vec<String>> = parts.iter().map(page_texts).collect();
        assert_eq!(texts, vec![vec!["Page 2"], vec!["Page 3"], vec!["Page 7"]]);
        for part in parts {
            let reloaded = Document::from_bytes(&part.into_bytes().unwrap()).unwrap();
            assert_eq!(reloaded.page_count(), 1);
        }
    }

    #[test]
    fn test_split_rejects_selection_from_other_document() {
        let doc = load(3);
        let selection = parse_page_selection("1-4", 4).unwrap();
        assert!(matches!(
            split_by_selection(&doc, &selection),
            Err(PdfDeskError::Validation(_))
        ));
    }

    #[test]
    fn test_chunks_seven_by_three() {
        let doc = load(7);
        let parts = split_by_chunk_size(&doc, 3).unwrap();
        let counts: Vec<u32> = parts.iter().map(Document::page_count).collect();
        assert_eq!(counts, vec![3, 3, 1]);
        assert_eq!(page_texts(&parts[2]), vec!["Page 7"]);
    }

    #[test]
    fn test_chunk_larger_than_document() {
        let doc = load(2);
        let parts = split_by_chunk_size(&doc, 10).unwrap();
        assert_eq!(parts.len(), 1);
        assert_eq!(parts[0].page_count(), 2);
    }

    #[test]
    fn test_chunk_size_zero_is_invalid() {
        let doc = load(2);
        assert!(matches!(
            split_by_chunk_size(&doc, 0),
            Err(PdfDeskError::Validation(_))
        ));
    }
}
