//! Page selection and whole-page PDF transformations
//!
//! All structural work goes through lopdf. Operations take [`Document`]
//! handles and return new handles; nothing is modified in place.
//!
//! - [`selection`]: parse page expressions into validated selections and orders
//! - `merge`, `split`, `delete`, `rotate`, `reorder`: page-level transforms
//! - `compress`: lossless rewrite at three effort levels
//! - [`convert`], [`extract`], [`render`]: images in and out of PDFs, text extraction

pub mod archive;
pub mod command;
pub mod compress;
pub mod convert;
pub mod delete;
pub mod document;
pub mod error;
pub mod extract;
pub mod merge;
mod page_tree;
pub mod render;
pub mod reorder;
pub mod rotate;
pub mod selection;
pub mod split;

#[cfg(any(test, feature = "test-support"))]
pub mod test_support;

pub use archive::write_zip;
pub use command::{PdfCommand, ProcessMetrics};
pub use compress::{compress, CompressionLevel, CompressionReport};
pub use convert::{images_to_document, rasterize};
pub use delete::delete_pages;
pub use document::{Document, PageInfo, PageOrientation, PdfInfo};
pub use error::PdfDeskError;
pub use extract::{extract_embedded_images, extract_text, ExtractedImage};
pub use merge::merge;
pub use render::PageRenderer;
#[cfg(feature = "pdfium")]
pub use render::PdfiumRenderer;
pub use reorder::reorder_pages;
pub use rotate::{rotate_pages, RotationAngle, RotationScope};
pub use selection::{parse_page_order, parse_page_selection, PageOrder, PageSelection};
pub use split::{split_by_chunk_size, split_by_selection};
