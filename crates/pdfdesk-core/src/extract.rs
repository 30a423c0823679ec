//! Text and embedded image extraction
//!
//! Text comes from lopdf's per-page extraction (text-showing operators
//! decoded through each font's encoding, no layout analysis). Images are decoded from the image XObjects a
//! page references, including those nested in form XObjects.

use crate::document::{inherited_attribute, resolve, resolve_dict, Document};
use flate2::read::ZlibDecoder;
use image::{DynamicImage, GrayImage, ImageFormat, RgbImage};
use lopdf::{Dictionary, Object, ObjectId, Stream};
use std::collections::HashSet;
use std::io::Read;
use tracing::{debug, warn};

/// How deep form XObjects may nest before we stop following them
const MAX_FORM_DEPTH: usize = 12;

/// An image decoded from a page's resources
#[derive(Debug, Clone)]
pub struct ExtractedImage {
    /// Page the image is drawn on (1-indexed)
    pub page: u32,
    /// Resource name of the XObject (e.g. "Im1")
    pub name: String,
    pub image: DynamicImage,
}

/// All text of the document, pages in order separated by a blank line
///
/// Pages without text still take their slot, so page boundaries survive
/// as runs of blank lines. Leading and trailing whitespace is trimmed.
pub fn extract_text(document: &Document) -> String {
    page_texts(document).join("\n\n").trim().to_string()
}

/// Text of each page, in page order
///
/// Strings are decoded through the font's declared `/Encoding`, so
/// WinAnsi and MacRoman text comes out as the intended characters.
pub(crate) fn page_texts(document: &Document) -> Vec<String> {
    let doc = document.inner();
    doc.get_pages()
        .into_keys()
        .map(|page_num| page_text(doc, page_num))
        .collect()
}

fn page_text(doc: &lopdf::Document, page_num: u32) -> String {
    match doc.extract_text(&[page_num]) {
        Ok(text) => text
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .collect::<Vec<_>>()
            .join("\n"),
        Err(e) => {
            debug!(page = page_num, error = %e, "No readable text on page");
            String::new()
        }
    }
}

/// Decode every supported image XObject, pages in order then resource order
///
/// Images in encodings we cannot decode are skipped with a warning, so an
/// empty result is normal for scanned-to-JBIG2 or CMYK documents.
pub fn extract_embedded_images(document: &Document) -> Vec<ExtractedImage> {
    let doc = document.inner();
    let mut images = Vec::new();

    for (page_num, page_id) in doc.get_pages() {
        let Some(resources) = inherited_attribute(doc, page_id, b"Resources") else {
            continue;
        };
        let Some(resources) = resolve_dict(doc, &resources) else {
            continue;
        };
        let mut visited = HashSet::new();
        collect_images(doc, resources, page_num, 0, &mut visited, &mut images);
    }

    debug!(count = images.len(), "Extracted embedded images");
    images
}

fn collect_images(
    doc: &lopdf::Document,
    resources: &Dictionary,
    page_num: u32,
    depth: usize,
    visited: &mut HashSet<ObjectId>,
    images: &mut Vec<ExtractedImage>,
) {
    let Some(xobjects) = resources
        .get(b"XObject")
        .ok()
        .and_then(|obj| resolve_dict(doc, obj))
    else {
        return;
    };

    for (name, reference) in xobjects.iter() {
        if let Object::Reference(id) = reference {
            if !visited.insert(*id) {
                continue;
            }
        }
        let Ok(stream) = resolve(doc, reference).as_stream() else {
            continue;
        };
        let name = String::from_utf8_lossy(name).into_owned();

        match stream.dict.get(b"Subtype").and_then(Object::as_name) {
            Ok(b"Image") => match decode_image(doc, stream) {
                Ok(image) => images.push(ExtractedImage {
                    page: page_num,
                    name,
                    image,
                }),
                Err(reason) => warn!(page = page_num, name = %name, %reason, "Skipping image"),
            },
            Ok(b"Form") if depth < MAX_FORM_DEPTH => {
                if let Some(form_resources) = stream
                    .dict
                    .get(b"Resources")
                    .ok()
                    .and_then(|obj| resolve_dict(doc, obj))
                {
                    collect_images(doc, form_resources, page_num, depth + 1, visited, images);
                }
            }
            _ => {}
        }
    }
}

fn decode_image(doc: &lopdf::Document, stream: &Stream) -> Result<DynamicImage, String> {
    let filters = stream_filters(doc, &stream.dict);

    match filters.as_slice() {
        [filter] if filter == b"DCTDecode" => {
            image::load_from_memory_with_format(&stream.content, ImageFormat::Jpeg)
                .map_err(|e| format!("invalid JPEG data: {}", e))
        }
        [] => decode_raw_samples(doc, &stream.dict, stream.content.clone()),
        [filter] if filter == b"FlateDecode" => {
            if has_predictor(doc, &stream.dict) {
                return Err("Flate predictors are not supported".into());
            }
            let mut samples = Vec::new();
            ZlibDecoder::new(stream.content.as_slice())
                .read_to_end(&mut samples)
                .map_err(|e| format!("corrupt Flate data: {}", e))?;
            decode_raw_samples(doc, &stream.dict, samples)
        }
        other => Err(format!(
            "unsupported filter chain {:?}",
            other
                .iter()
                .map(|f| String::from_utf8_lossy(f).into_owned())
                .collect::<Vec<_>>()
        )),
    }
}

fn stream_filters(doc: &lopdf::Document, dict: &Dictionary) -> Vec<Vec<u8>> {
    match dict.get(b"Filter").map(|obj| resolve(doc, obj)) {
        Ok(Object::Name(name)) => vec![name.clone()],
        Ok(Object::Array(items)) => items
            .iter()
            .filter_map(|item| resolve(doc, item).as_name().ok())
            .map(<[u8]>::to_vec)
            .collect(),
        _ => Vec::new(),
    }
}

fn has_predictor(doc: &lopdf::Document, dict: &Dictionary) -> bool {
    dict.get(b"DecodeParms")
        .ok()
        .and_then(|obj| resolve_dict(doc, obj))
        .and_then(|parms| parms.get(b"Predictor").ok())
        .and_then(|p| p.as_i64().ok())
        .is_some_and(|p| p > 1)
}

/// Interpret unfiltered samples; only 8-bit gray and RGB are supported
fn decode_raw_samples(
    doc: &lopdf::Document,
    dict: &Dictionary,
    samples: Vec<u8>,
) -> Result<DynamicImage, String> {
    let int_field = |key: &[u8]| {
        dict.get(key)
            .ok()
            .and_then(|obj| resolve(doc, obj).as_i64().ok())
            .and_then(|v| u32::try_from(v).ok())
    };

    let width = int_field(b"Width").ok_or("missing Width")?;
    let height = int_field(b"Height").ok_or("missing Height")?;
    let bits = int_field(b"BitsPerComponent").unwrap_or(8);
    if bits != 8 {
        return Err(format!("{} bits per component", bits));
    }

    let components = color_components(doc, dict).ok_or("unsupported color space")?;
    let expected = width as usize * height as usize * components;
    if samples.len() < expected {
        return Err(format!(
            "expected {} bytes of samples, found {}",
            expected,
            samples.len()
        ));
    }
    let mut samples = samples;
    samples.truncate(expected);

    let image = match components {
        1 => GrayImage::from_raw(width, height, samples).map(DynamicImage::ImageLuma8),
        _ => RgbImage::from_raw(width, height, samples).map(DynamicImage::ImageRgb8),
    };
    image.ok_or_else(|| "sample buffer does not match dimensions".into())
}

/// 1 for gray, 3 for RGB, None for anything else
fn color_components(doc: &lopdf::Document, dict: &Dictionary) -> Option<usize> {
    match resolve(doc, dict.get(b"ColorSpace").ok()?) {
        Object::Name(name) => match name.as_slice() {
            b"DeviceGray" | b"CalGray" => Some(1),
            b"DeviceRGB" | b"CalRGB" => Some(3),
            _ => None,
        },
        Object::Array(items) => {
            let family = resolve(doc, items.first()?).as_name().ok()?;
            if family != b"ICCBased" {
                return None;
            }
            let profile = resolve(doc, items.get(1)?).as_stream().ok()?;
            match profile.dict.get(b"N").ok()?.as_i64().ok()? {
                1 => Some(1),
                3 => Some(3),
                _ => None,
            }
        }
        _ => None,
    }
}
