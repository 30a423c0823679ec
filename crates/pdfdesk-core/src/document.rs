//! Document handle
//!
//! [`Document`] owns one parsed PDF for the duration of a single operation.
//! It validates input on load, answers page-level questions and serializes
//! itself back to bytes.

use crate::error::PdfDeskError;
use lopdf::{Dictionary, Object, ObjectId};
use serde::Serialize;
use std::path::Path;

/// Attributes a page may inherit from its ancestors in the page tree
pub(crate) const INHERITABLE_ATTRIBUTES: [&[u8]; 4] = [b"Resources", b"MediaBox", b"CropBox", b"Rotate"];

/// Deepest page tree we are willing to walk when resolving inherited attributes
const MAX_TREE_DEPTH: usize = 64;

/// Document-level information
#[derive(Debug, Clone, Serialize, Default)]
pub struct PdfInfo {
    /// Number of pages in the document
    pub page_count: u32,
    /// PDF version string (e.g., "1.7")
    pub version: String,
    /// Whether the document is encrypted
    pub encrypted: bool,
    /// Serialized size in bytes, when the document was loaded from bytes
    pub size_bytes: usize,
    /// Document title from metadata (if available)
    pub title: Option<String>,
    /// Document author from metadata (if available)
    pub author: Option<String>,
}

/// Information about a single PDF page
#[derive(Debug, Clone, Serialize)]
pub struct PageInfo {
    /// Page number (1-indexed)
    pub page_num: u32,
    /// Page width in points (1 point = 1/72 inch)
    pub width: f32,
    /// Page height in points
    pub height: f32,
    /// Page rotation in degrees (0, 90, 180, 270)
    pub rotation: u16,
    /// Estimated orientation after rotation is applied
    pub orientation: PageOrientation,
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
pub enum PageOrientation {
    Portrait,
    Landscape,
    Square,
}

/// An opened PDF
#[derive(Debug, Clone)]
pub struct Document {
    inner: lopdf::Document,
    /// Serialized form, kept while the document is unmodified
    encoded: Option<Vec<u8>>,
}

impl Document {
    /// Parse PDF bytes. Fails with `SourceRead` for anything that is not a
    /// readable, unencrypted PDF.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, PdfDeskError> {
        if bytes.len() < 8 || !bytes.starts_with(b"%PDF-") {
            return Err(PdfDeskError::SourceRead(
                "Not a valid PDF file (missing %PDF- header)".into(),
            ));
        }

        let inner = lopdf::Document::load_mem(bytes)
            .map_err(|e| PdfDeskError::SourceRead(e.to_string()))?;

        if inner.is_encrypted() {
            return Err(PdfDeskError::SourceRead(
                "Document is encrypted; remove the password and try again".into(),
            ));
        }

        Ok(Self {
            inner,
            encoded: Some(bytes.to_vec()),
        })
    }

    /// Read and parse a PDF file
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, PdfDeskError> {
        let path = path.as_ref();
        let bytes = std::fs::read(path).map_err(|e| {
            PdfDeskError::SourceRead(format!("Cannot read {}: {}", path.display(), e))
        })?;
        Self::from_bytes(&bytes)
    }

    pub(crate) fn from_inner(inner: lopdf::Document) -> Self {
        Self {
            inner,
            encoded: None,
        }
    }

    /// Serialize now and keep the bytes, so later size queries and writes are free
    pub(crate) fn encoded(mut inner: lopdf::Document) -> Result<Self, PdfDeskError> {
        let mut buffer = Vec::new();
        inner
            .save_to(&mut buffer)
            .map_err(|e| PdfDeskError::Write(format!("Save failed: {}", e)))?;
        Ok(Self {
            inner,
            encoded: Some(buffer),
        })
    }

    pub(crate) fn inner(&self) -> &lopdf::Document {
        &self.inner
    }

    pub fn page_count(&self) -> u32 {
        self.inner.get_pages().len() as u32
    }

    pub fn version(&self) -> &str {
        &self.inner.version
    }

    /// Serialized size when the document still matches the bytes it was loaded from
    pub fn encoded_len(&self) -> Option<usize> {
        self.encoded.as_ref().map(Vec::len)
    }

    pub fn info(&self) -> PdfInfo {
        let (title, author) = extract_metadata(&self.inner);
        PdfInfo {
            page_count: self.page_count(),
            version: self.inner.version.clone(),
            encrypted: self.inner.is_encrypted(),
            size_bytes: self.encoded_len().unwrap_or(0),
            title,
            author,
        }
    }

    /// Page-level information for a 1-indexed page
    pub fn page_info(&self, page_num: u32) -> Result<PageInfo, PdfDeskError> {
        let pages = self.inner.get_pages();
        let page_id = pages.get(&page_num).ok_or_else(|| {
            PdfDeskError::Validation(format!(
                "Page {} does not exist (document has {} pages)",
                page_num,
                pages.len()
            ))
        })?;

        let media_box = inherited_attribute(&self.inner, *page_id, b"MediaBox")
            .and_then(|obj| parse_box(&self.inner, &obj))
            .unwrap_or([0.0, 0.0, 612.0, 792.0]);
        let (width, height) = (
            (media_box[2] - media_box[0]).abs(),
            (media_box[3] - media_box[1]).abs(),
        );

        let rotation = page_rotation(&self.inner, *page_id);

        let (effective_width, effective_height) = if rotation == 90 || rotation == 270 {
            (height, width)
        } else {
            (width, height)
        };

        let orientation = if (effective_width - effective_height).abs() < 1.0 {
            PageOrientation::Square
        } else if effective_width > effective_height {
            PageOrientation::Landscape
        } else {
            PageOrientation::Portrait
        };

        Ok(PageInfo {
            page_num,
            width,
            height,
            rotation,
            orientation,
        })
    }

    /// Serialize, reusing the loaded bytes when the document is unmodified
    pub fn to_bytes(&self) -> Result<Vec<u8>, PdfDeskError> {
        match &self.encoded {
            Some(bytes) => Ok(bytes.clone()),
            None => self.clone().into_bytes(),
        }
    }

    /// Serialize, consuming the handle
    pub fn into_bytes(self) -> Result<Vec<u8>, PdfDeskError> {
        if let Some(bytes) = self.encoded {
            return Ok(bytes);
        }

        let mut inner = self.inner;
        let mut buffer = Vec::new();
        inner
            .save_to(&mut buffer)
            .map_err(|e| PdfDeskError::Write(format!("Save failed: {}", e)))?;
        Ok(buffer)
    }

    /// Serialize to a file, returning the number of bytes written
    pub fn save<P: AsRef<Path>>(self, path: P) -> Result<usize, PdfDeskError> {
        let path = path.as_ref();
        let bytes = self.into_bytes()?;
        std::fs::write(path, &bytes).map_err(|e| {
            PdfDeskError::Write(format!("Cannot write {}: {}", path.display(), e))
        })?;
        Ok(bytes.len())
    }
}

/// Look up an attribute on a page, walking up the page tree when the page
/// itself does not define it
pub(crate) fn inherited_attribute(
    doc: &lopdf::Document,
    page_id: ObjectId,
    key: &[u8],
) -> Option<Object> {
    let mut current = doc.get_dictionary(page_id).ok()?;
    for _ in 0..MAX_TREE_DEPTH {
        if let Ok(value) = current.get(key) {
            return Some(value.clone());
        }
        let parent_id = current.get(b"Parent").ok()?.as_reference().ok()?;
        current = doc.get_dictionary(parent_id).ok()?;
    }
    None
}

/// Effective rotation of a page, normalized to 0, 90, 180 or 270
pub(crate) fn page_rotation(doc: &lopdf::Document, page_id: ObjectId) -> u16 {
    inherited_attribute(doc, page_id, b"Rotate")
        .and_then(|obj| resolve(doc, &obj).as_i64().ok())
        .map(normalize_rotation)
        .unwrap_or(0)
}

/// Follow a reference to its target; other objects are returned as-is
pub(crate) fn resolve<'a>(doc: &'a lopdf::Document, obj: &'a Object) -> &'a Object {
    match obj {
        Object::Reference(id) => doc.get_object(*id).unwrap_or(obj),
        other => other,
    }
}

/// Resolve an object that should be a dictionary, directly or by reference
pub(crate) fn resolve_dict<'a>(doc: &'a lopdf::Document, obj: &'a Object) -> Option<&'a Dictionary> {
    resolve(doc, obj).as_dict().ok()
}

/// Normalize rotation to 0, 90, 180, or 270. Values that are not multiples of
/// 90 are invalid in PDF and are rounded down to the nearest quarter turn.
pub(crate) fn normalize_rotation(angle: i64) -> u16 {
    let quarter_turns = angle.div_euclid(90).rem_euclid(4);
    (quarter_turns * 90) as u16
}

fn parse_box(doc: &lopdf::Document, obj: &Object) -> Option<[f32; 4]> {
    let array = resolve(doc, obj).as_array().ok()?;
    if array.len() != 4 {
        return None;
    }

    let mut result = [0.0; 4];
    for (slot, obj) in result.iter_mut().zip(array) {
        *slot = resolve(doc, obj).as_float().ok()?;
    }
    Some(result)
}

/// Extract title and author from document metadata
fn extract_metadata(document: &lopdf::Document) -> (Option<String>, Option<String>) {
    let Some(info_dict) = document
        .trailer
        .get(b"Info")
        .ok()
        .and_then(|info| resolve_dict(document, info))
    else {
        return (None, None);
    };

    let text_field = |key: &[u8]| {
        info_dict
            .get(key)
            .ok()
            .and_then(|obj| resolve(document, obj).as_str().ok())
            .map(|bytes| String::from_utf8_lossy(bytes).into_owned())
            .filter(|text| !text.is_empty())
    };

    (text_field(b"Title"), text_field(b"Author"))
}
