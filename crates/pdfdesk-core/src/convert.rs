//! PDF to image and image to PDF conversion

use crate::document::Document;
use crate::error::PdfDeskError;
use crate::render::PageRenderer;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use image::DynamicImage;
use lopdf::{dictionary, Object, Stream};
use std::io::Write;
use std::ops::RangeInclusive;
use tracing::info;

/// Accepted rasterization resolutions
pub const DPI_RANGE: RangeInclusive<u32> = 36..=600;

/// Render every page to an image, in page order
///
/// The first page that fails to render aborts the whole call; no partial
/// output is returned.
pub fn rasterize(
    document: &Document,
    dpi: u32,
    renderer: &dyn PageRenderer,
) -> Result<Vec<DynamicImage>, PdfDeskError> {
    if !DPI_RANGE.contains(&dpi) {
        return Err(PdfDeskError::Validation(format!(
            "DPI must be between {} and {}, got {}",
            DPI_RANGE.start(),
            DPI_RANGE.end(),
            dpi
        )));
    }

    let page_count = document.page_count();
    let bytes = document.to_bytes()?;
    let images = renderer.render_all(&bytes, page_count, dpi)?;

    info!(pages = images.len(), dpi, "Rasterized document");
    Ok(images)
}

/// Build a PDF with one page per image, in input order
///
/// Images are converted to 8-bit RGB and embedded losslessly. Each page is
/// exactly the size of its image at 72 DPI.
pub fn images_to_document(images: &[DynamicImage]) -> Result<Document, PdfDeskError> {
    if images.is_empty() {
        return Err(PdfDeskError::EmptyInput(
            "At least one image is needed to build a PDF".into(),
        ));
    }

    let mut doc = lopdf::Document::with_version("1.7");
    let pages_id = doc.new_object_id();
    let mut kids = Vec::with_capacity(images.len());

    for image in images {
        let rgb = image.to_rgb8();
        let (width, height) = rgb.dimensions();

        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(rgb.as_raw())?;
        let samples = encoder.finish()?;

        let image_id = doc.add_object(Stream::new(
            dictionary! {
                "Type" => "XObject",
                "Subtype" => "Image",
                "Width" => width as i64,
                "Height" => height as i64,
                "ColorSpace" => "DeviceRGB",
                "BitsPerComponent" => 8,
                "Filter" => "FlateDecode",
            },
            samples,
        ));

        let draw = format!("q {} 0 0 {} 0 0 cm /Im0 Do Q", width, height);
        let content_id = doc.add_object(Stream::new(lopdf::Dictionary::new(), draw.into_bytes()));

        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "MediaBox" => Object::Array(vec![0.into(), 0.into(), (width as i64).into(), (height as i64).into()]),
            "Contents" => content_id,
            "Resources" => dictionary! {
                "XObject" => dictionary! { "Im0" => image_id },
            },
        });
        kids.push(Object::Reference(page_id));
    }

    let count = kids.len() as i64;
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => count,
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    info!(pages = count, "Built PDF from images");
    Ok(Document::from_inner(doc))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::extract_embedded_images;
    use crate::test_support::create_test_pdf;
    use image::{GrayImage, Luma, Rgb, RgbImage, RgbaImage};
    use pretty_assertions::assert_eq;
    use std::sync::Mutex;

    /// Records requested pages and paints a DPI-sized image
    #[derive(Default)]
    struct RecordingRenderer {
        calls: Mutex<Vec<(u32, u32)>>,
        fail_on: Option<u32>,
    }

    impl PageRenderer for RecordingRenderer {
        fn render_page(&self, pdf: &[u8], page: u32, dpi: u32) -> Result<DynamicImage, String> {
            assert!(pdf.starts_with(b"%PDF-"));
            self.calls.lock().unwrap().push((page, dpi));
            if Some(page) == self.fail_on {
                return Err("corrupt page".into());
            }
            Ok(DynamicImage::new_rgb8(dpi / 10, page))
        }
    }

    #[test]
    fn test_rasterize_renders_each_page_in_order() {
        let doc = Document::from_bytes(&create_test_pdf(3)).unwrap();
        let renderer = RecordingRenderer::default();
        let images = rasterize(&doc, 150, &renderer).unwrap();

        assert_eq!(images.len(), 3);
        assert_eq!(images[2].height(), 3);
        assert_eq!(*renderer.calls.lock().unwrap(), vec![(1, 150), (2, 150), (3, 150)]);
    }

    #[test]
    fn test_rasterize_fails_fast() {
        let doc = Document::from_bytes(&create_test_pdf(4)).unwrap();
        let renderer = RecordingRenderer {
            fail_on: Some(2),
            ..Default::default()
        };
        let err = rasterize(&doc, 72, &renderer).unwrap_err();
        assert!(matches!(err, PdfDeskError::Render { page: 2, .. }));
        assert_eq!(renderer.calls.lock().unwrap().len(), 2);
    }

    #[test]
    fn test_rasterize_rejects_dpi_out_of_range() {
        let doc = Document::from_bytes(&create_test_pdf(1)).unwrap();
        let renderer = RecordingRenderer::default();
        assert!(rasterize(&doc, 35, &renderer).is_err());
        assert!(rasterize(&doc, 601, &renderer).is_err());
        assert!(renderer.calls.lock().unwrap().is_empty());
    }

    #[test]
    fn test_images_to_document_empty() {
        assert!(matches!(
            images_to_document(&[]),
            Err(PdfDeskError::EmptyInput(_))
        ));
    }

    #[test]
    fn test_images_to_document_page_per_image() {
        let images = vec![
            DynamicImage::ImageRgb8(RgbImage::from_pixel(40, 20, Rgb([255, 0, 0]))),
            DynamicImage::ImageLuma8(GrayImage::from_pixel(10, 30, Luma([128]))),
            DynamicImage::ImageRgba8(RgbaImage::new(5, 5)),
        ];
        let doc = images_to_document(&images).unwrap();
        let reloaded = Document::from_bytes(&doc.into_bytes().unwrap()).unwrap();
        assert_eq!(reloaded.page_count(), 3);

        let first = reloaded.page_info(1).unwrap();
        assert_eq!((first.width, first.height), (40.0, 20.0));
        let second = reloaded.page_info(2).unwrap();
        assert_eq!((second.width, second.height), (10.0, 30.0));
    }

    #[test]
    fn test_images_survive_round_trip_as_rgb() {
        let source = DynamicImage::ImageRgb8(RgbImage::from_pixel(6, 4, Rgb([10, 200, 30])));
        let doc = images_to_document(std::slice::from_ref(&source)).unwrap();
        let extracted = extract_embedded_images(&doc);
        assert_eq!(extracted.len(), 1);
        assert_eq!(extracted[0].image.to_rgb8(), source.to_rgb8());
    }
}
