//! Page tree assembly
//!
//! Every whole-page transformation is expressed as "build a new document from
//! this list of (source, page) picks". Objects of each source are imported
//! under an ID offset so references never collide, inherited page attributes
//! are copied onto each page first so pages survive leaving their original
//! tree, and a fresh flat page tree is written on top. Anything no longer
//! reachable from the new catalog is pruned.

use crate::document::{Document, INHERITABLE_ATTRIBUTES};
use crate::error::PdfDeskError;
use lopdf::{dictionary, Dictionary, Object, ObjectId};
use std::collections::HashSet;
use tracing::debug;

/// Pages to take from one source document, 1-indexed, in output order
pub(crate) struct PageSource<'a> {
    pub document: &'a Document,
    pub pages: Vec<u32>,
}

impl<'a> PageSource<'a> {
    pub fn new(document: &'a Document, pages: Vec<u32>) -> Self {
        Self { document, pages }
    }

    pub fn all_pages(document: &'a Document) -> Self {
        Self::new(document, (1..=document.page_count()).collect())
    }
}

/// Build a new document containing the picked pages, sources in order
pub(crate) fn assemble(sources: &[PageSource<'_>]) -> Result<Document, PdfDeskError> {
    let version = sources
        .iter()
        .map(|source| source.document.version())
        .max_by(|a, b| version_number(a).total_cmp(&version_number(b)))
        .unwrap_or("1.7")
        .to_string();

    let mut dest = lopdf::Document::with_version(version);
    let pages_id = dest.new_object_id();
    let mut kids = Vec::new();
    let mut used = HashSet::new();
    let mut info = None;

    for source in sources {
        let page_count = source.document.page_count();
        let mut doc = source.document.inner().clone();
        let page_ids: Vec<ObjectId> = doc.get_pages().into_values().collect();

        for &page_id in &page_ids {
            materialize_inherited(&mut doc, page_id);
        }

        let offset = dest.max_id;
        for (id, object) in std::mem::take(&mut doc.objects) {
            dest.objects.insert(shift(id, offset), remap_refs(object, offset));
        }
        dest.max_id = offset + doc.max_id;

        if info.is_none() {
            info = doc
                .trailer
                .get(b"Info")
                .ok()
                .and_then(|obj| obj.as_reference().ok())
                .map(|id| shift(id, offset));
        }

        for &page in &source.pages {
            if page == 0 || page > page_count {
                return Err(PdfDeskError::Validation(format!(
                    "Page {} does not exist (document has {} pages)",
                    page, page_count
                )));
            }
            let mut page_id = shift(page_ids[(page - 1) as usize], offset);

            // A page picked twice gets its own dictionary; content stays shared
            if !used.insert(page_id) {
                let copy = dest.get_object(page_id).map_err(write_error)?.clone();
                page_id = dest.add_object(copy);
                used.insert(page_id);
            }

            dest.get_object_mut(page_id)
                .and_then(Object::as_dict_mut)
                .map_err(write_error)?
                .set("Parent", pages_id);
            kids.push(Object::Reference(page_id));
        }
    }

    let count = kids.len() as i64;
    dest.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => count,
        }),
    );

    let catalog_id = dest.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    dest.trailer.set("Root", catalog_id);
    if let Some(info_id) = info {
        dest.trailer.set("Info", info_id);
    }

    let pruned = dest.prune_objects();
    debug!(pages = count, pruned = pruned.len(), "Assembled page tree");

    Ok(Document::from_inner(dest))
}

/// Copy inheritable attributes from ancestors onto the page itself
fn materialize_inherited(doc: &mut lopdf::Document, page_id: ObjectId) {
    let missing: Vec<(&[u8], Object)> = INHERITABLE_ATTRIBUTES
        .iter()
        .filter(|key| {
            doc.get_dictionary(page_id)
                .map(|page| !page.has(key))
                .unwrap_or(false)
        })
        .filter_map(|key| {
            crate::document::inherited_attribute(doc, page_id, key).map(|value| (*key, value))
        })
        .collect();

    if let Ok(page) = doc.get_object_mut(page_id).and_then(Object::as_dict_mut) {
        for (key, value) in missing {
            page.set(key, value);
        }
    }
}

fn shift(id: ObjectId, offset: u32) -> ObjectId {
    (id.0 + offset, id.1)
}

/// Recursively shift every object reference by `offset`
fn remap_refs(obj: Object, offset: u32) -> Object {
    match obj {
        Object::Reference(id) => Object::Reference(shift(id, offset)),
        Object::Array(items) => Object::Array(
            items
                .into_iter()
                .map(|item| remap_refs(item, offset))
                .collect(),
        ),
        Object::Dictionary(dict) => Object::Dictionary(remap_dict(dict, offset)),
        Object::Stream(mut stream) => {
            stream.dict = remap_dict(stream.dict, offset);
            Object::Stream(stream)
        }
        other => other,
    }
}

fn remap_dict(dict: Dictionary, offset: u32) -> Dictionary {
    let mut remapped = Dictionary::new();
    for (key, value) in dict.iter() {
        remapped.set(key.clone(), remap_refs(value.clone(), offset));
    }
    remapped
}

fn version_number(version: &str) -> f32 {
    version.parse().unwrap_or(0.0)
}

fn write_error(e: lopdf::Error) -> PdfDeskError {
    PdfDeskError::Write(format!("Failed to build page tree: {}", e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{create_labelled_pdf, create_test_pdf, PdfBuilder};
    use pretty_assertions::assert_eq;

    fn page_texts(doc: &Document) -> Vec<String> {
        crate::extract::page_texts(doc)
    }

    #[test]
    fn test_assemble_picks_pages_in_order() {
        let doc = Document::from_bytes(&create_test_pdf(4)).unwrap();
        let result = assemble(&[PageSource::new(&doc, vec![4, 2])]).unwrap();
        assert_eq!(result.page_count(), 2);
        assert_eq!(page_texts(&result), vec!["Page 4", "Page 2"]);
    }

    #[test]
    fn test_assemble_combines_sources_without_id_collisions() {
        let a = Document::from_bytes(&create_labelled_pdf(2, "A")).unwrap();
        let b = Document::from_bytes(&create_labelled_pdf(2, "B")).unwrap();
        let result = assemble(&[PageSource::all_pages(&a), PageSource::all_pages(&b)]).unwrap();

        let reparsed = Document::from_bytes(&result.into_bytes().unwrap()).unwrap();
        assert_eq!(
            page_texts(&reparsed),
            vec!["A-Page 1", "A-Page 2", "B-Page 1", "B-Page 2"]
        );
    }

    #[test]
    fn test_assemble_duplicate_pick_gets_distinct_page_object() {
        let doc = Document::from_bytes(&create_test_pdf(2)).unwrap();
        let result = assemble(&[PageSource::new(&doc, vec![1, 1])]).unwrap();
        let ids: Vec<ObjectId> = result.inner().get_pages().into_values().collect();
        assert_eq!(ids.len(), 2);
        assert_ne!(ids[0], ids[1]);
    }

    #[test]
    fn test_remap_refs_shifts_nested_references() {
        let dict = dictionary! {
            "Parent" => (3, 0),
            "Kids" => vec![Object::Reference((4, 0)), Object::Integer(7)],
            "Resources" => dictionary! { "Font" => dictionary! { "F1" => (9, 0) } },
        };
        let Object::Dictionary(remapped) = remap_refs(Object::Dictionary(dict), 10) else {
            panic!("expected a dictionary");
        };
        assert_eq!(remapped.get(b"Parent").unwrap(), &Object::Reference((13, 0)));
        assert_eq!(
            remapped.get(b"Kids").unwrap(),
            &Object::Array(vec![Object::Reference((14, 0)), Object::Integer(7)])
        );
        let font = remapped
            .get(b"Resources")
            .and_then(Object::as_dict)
            .and_then(|resources| resources.get(b"Font"))
            .and_then(Object::as_dict)
            .unwrap();
        assert_eq!(font.get(b"F1").unwrap(), &Object::Reference((19, 0)));
    }

    #[test]
    fn test_assemble_materializes_inherited_attributes() {
        let doc = Document::from_bytes(&PdfBuilder::new().inherited_attributes(3, 90).build()).unwrap();
        let result = assemble(&[PageSource::new(&doc, vec![2])]).unwrap();
        let info = result.page_info(1).unwrap();
        assert_eq!(info.rotation, 90);
        assert_eq!(info.width, 595.0);
        assert_eq!(page_texts(&result), vec!["Page 2"]);
    }

    #[test]
    fn test_assemble_prunes_unpicked_pages() {
        let doc = Document::from_bytes(&create_test_pdf(10)).unwrap();
        let result = assemble(&[PageSource::new(&doc, vec![1])]).unwrap();
        let small = result.into_bytes().unwrap();
        let full = create_test_pdf(10);
        assert!(small.len() < full.len());
    }

    #[test]
    fn test_assemble_rejects_missing_page() {
        let doc = Document::from_bytes(&create_test_pdf(2)).unwrap();
        assert!(assemble(&[PageSource::new(&doc, vec![3])]).is_err());
    }
}
