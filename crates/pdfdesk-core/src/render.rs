//! Page rendering seam
//!
//! lopdf cannot rasterize, so turning pages into pixels goes through a
//! [`PageRenderer`]. The PDFium-backed implementation is only compiled with
//! the `pdfium` feature and binds the system library at runtime.

use crate::error::PdfDeskError;
use image::DynamicImage;

/// Renders pages of a serialized PDF to images
pub trait PageRenderer: Send + Sync {
    /// Render one page (1-indexed) at `dpi`
    fn render_page(&self, pdf: &[u8], page: u32, dpi: u32) -> Result<DynamicImage, String>;

    /// Render pages `1..=page_count` in order, stopping at the first failure
    fn render_all(&self, pdf: &[u8], page_count: u32, dpi: u32) -> Result<Vec<DynamicImage>, PdfDeskError> {
        (1..=page_count)
            .map(|page| {
                self.render_page(pdf, page, dpi)
                    .map_err(|message| PdfDeskError::Render { page, message })
            })
            .collect()
    }
}

#[cfg(feature = "pdfium")]
pub use self::pdfium::PdfiumRenderer;

#[cfg(feature = "pdfium")]
mod pdfium {
    use super::PageRenderer;
    use crate::error::PdfDeskError;
    use image::{DynamicImage, RgbaImage};
    use pdfium_render::prelude::*;
    use std::path::PathBuf;
    use tracing::debug;

    /// Largest rendered edge in pixels, whatever the DPI
    const MAX_DIMENSION: f32 = 10_000.0;

    /// Renderer backed by the PDFium shared library
    #[derive(Debug, Clone, Default)]
    pub struct PdfiumRenderer {
        library_dir: Option<PathBuf>,
    }

    impl PdfiumRenderer {
        /// Bind PDFium from the system library path, failing early if it is missing
        pub fn new() -> Result<Self, PdfDeskError> {
            let renderer = Self { library_dir: None };
            renderer.bind()?;
            Ok(renderer)
        }

        /// Bind PDFium from a specific directory
        pub fn with_library_dir(dir: impl Into<PathBuf>) -> Result<Self, PdfDeskError> {
            let renderer = Self {
                library_dir: Some(dir.into()),
            };
            renderer.bind()?;
            Ok(renderer)
        }

        fn bind(&self) -> Result<Pdfium, PdfDeskError> {
            let bindings = match &self.library_dir {
                Some(dir) => Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path(dir)),
                None => Pdfium::bind_to_system_library(),
            }
            .map_err(|e| PdfDeskError::Render {
                page: 0,
                message: format!("PDFium library unavailable: {}", e),
            })?;
            Ok(Pdfium::new(bindings))
        }

        fn render(page: &PdfPage, dpi: u32) -> Result<DynamicImage, String> {
            let scale = dpi as f32 / 72.0;
            let mut width = page.width().value * scale;
            let mut height = page.height().value * scale;
            let longest = width.max(height);
            if longest > MAX_DIMENSION {
                width *= MAX_DIMENSION / longest;
                height *= MAX_DIMENSION / longest;
            }

            let config = PdfRenderConfig::new()
                .set_target_width(width.round().max(1.0) as i32)
                .set_target_height(height.round().max(1.0) as i32)
                .render_form_data(true)
                .render_annotations(true);

            let bitmap = page.render_with_config(&config).map_err(|e| e.to_string())?;
            let (w, h) = (bitmap.width() as u32, bitmap.height() as u32);
            RgbaImage::from_raw(w, h, bitmap.as_rgba_bytes())
                .map(|rgba| DynamicImage::ImageRgb8(DynamicImage::ImageRgba8(rgba).to_rgb8()))
                .ok_or_else(|| "rendered bitmap has unexpected size".to_string())
        }
    }

    impl PageRenderer for PdfiumRenderer {
        fn render_page(&self, pdf: &[u8], page: u32, dpi: u32) -> Result<DynamicImage, String> {
            let pdfium = self.bind().map_err(|e| e.to_string())?;
            let document = pdfium
                .load_pdf_from_byte_slice(pdf, None)
                .map_err(|e| e.to_string())?;
            let index = u16::try_from(page.saturating_sub(1)).map_err(|_| format!("page {} out of range", page))?;
            let page = document.pages().get(index).map_err(|e| e.to_string())?;
            Self::render(&page, dpi)
        }

        /// Loads the document once for all pages
        fn render_all(&self, pdf: &[u8], page_count: u32, dpi: u32) -> Result<Vec<DynamicImage>, PdfDeskError> {
            let pdfium = self.bind()?;
            let document = pdfium
                .load_pdf_from_byte_slice(pdf, None)
                .map_err(|e| PdfDeskError::Render {
                    page: 1,
                    message: e.to_string(),
                })?;

            let mut images = Vec::with_capacity(page_count as usize);
            for (index, page) in document.pages().iter().enumerate() {
                let page_num = index as u32 + 1;
                let image = Self::render(&page, dpi).map_err(|message| PdfDeskError::Render {
                    page: page_num,
                    message,
                })?;
                debug!(page = page_num, dpi, "Rendered page");
                images.push(image);
            }
            Ok(images)
        }
    }
}
