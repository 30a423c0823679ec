//! Lossless document compression
//!
//! Each level does strictly more work than the one below it:
//!
//! - `Low`: drop unreachable objects, Flate-encode unfiltered streams at level 1
//! - `Medium`: also drop zero-length streams, try Flate levels 1 and 6, and
//!   re-encode existing plain Flate streams
//! - `High`: also try Flate level 9 and renumber objects densely
//!
//! Every stream keeps the smallest of its candidate encodings and is only
//! ever replaced by something smaller. A level's candidates include all of
//! the lower levels' candidates, so a higher level never produces a larger
//! file. Level 9 is not always smaller than 6 with the default zlib backend.

use crate::document::Document;
use crate::error::PdfDeskError;
use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use lopdf::{Object, Stream};
use serde::Serialize;
use std::fmt;
use std::io::{Read, Write};
use std::str::FromStr;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CompressionLevel {
    Low,
    Medium,
    High,
}

impl CompressionLevel {
    /// Flate levels tried for each stream
    fn flate_levels(self) -> &'static [u32] {
        match self {
            Self::Low => &[1],
            Self::Medium => &[1, 6],
            Self::High => &[1, 6, 9],
        }
    }

    fn reencodes_flate(self) -> bool {
        self != Self::Low
    }
}

impl FromStr for CompressionLevel {
    type Err = PdfDeskError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "low" => Ok(Self::Low),
            "medium" => Ok(Self::Medium),
            "high" => Ok(Self::High),
            other => Err(PdfDeskError::Validation(format!(
                "Unknown compression level '{}'. Use low, medium or high",
                other
            ))),
        }
    }
}

impl fmt::Display for CompressionLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        };
        f.write_str(name)
    }
}

/// Size before and after compression
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CompressionReport {
    pub original_size: u64,
    pub compressed_size: u64,
    /// Rounded to one decimal; negative when the output grew
    pub reduction_percent: f64,
}

impl CompressionReport {
    pub fn new(original_size: u64, compressed_size: u64) -> Self {
        let reduction_percent = if original_size == 0 {
            0.0
        } else {
            let saved = original_size as f64 - compressed_size as f64;
            (saved / original_size as f64 * 1000.0).round() / 10.0
        };
        Self {
            original_size,
            compressed_size,
            reduction_percent,
        }
    }

    pub fn bytes_saved(&self) -> i64 {
        self.original_size as i64 - self.compressed_size as i64
    }
}

/// Rewrite `document` at the given effort level
pub fn compress(
    document: &Document,
    level: CompressionLevel,
) -> Result<(Document, CompressionReport), PdfDeskError> {
    let original_size = document.to_bytes()?.len() as u64;
    let mut doc = document.inner().clone();

    let pruned = doc.prune_objects().len();
    let emptied = if level == CompressionLevel::Low {
        0
    } else {
        doc.delete_zero_length_streams().len()
    };

    let flate = level.flate_levels();
    let mut encoded = 0;
    let mut reencoded = 0;
    for object in doc.objects.values_mut() {
        let Object::Stream(stream) = object else {
            continue;
        };
        if !stream.dict.has(b"Filter") {
            if stream.allows_compression && encode_unfiltered(stream, flate) {
                encoded += 1;
            }
        } else if level.reencodes_flate() && reencode_flate(stream, flate) {
            reencoded += 1;
        }
    }

    if level == CompressionLevel::High {
        doc.renumber_objects();
    }

    debug!(
        %level,
        pruned, emptied, encoded, reencoded, "Compression passes finished"
    );

    let result = Document::encoded(doc)?;
    let compressed_size = result.encoded_len().unwrap_or(0) as u64;
    let report = CompressionReport::new(original_size, compressed_size);

    info!(
        %level,
        original_size,
        compressed_size,
        reduction_percent = report.reduction_percent,
        "Compressed document"
    );
    Ok((result, report))
}

/// Flate-encode a stream that has no filter; true if the stream was replaced
fn encode_unfiltered(stream: &mut Stream, levels: &[u32]) -> bool {
    let Some(compressed) = smallest_deflate(&stream.content, levels) else {
        return false;
    };
    if compressed.len() >= stream.content.len() {
        return false;
    }
    stream.dict.set("Filter", "FlateDecode");
    stream.set_content(compressed);
    true
}

/// Re-encode a plain Flate stream (no predictor, no filter chain) when the
/// new encoding is smaller
fn reencode_flate(stream: &mut Stream, levels: &[u32]) -> bool {
    let plain_flate = matches!(
        stream.dict.get(b"Filter"),
        Ok(Object::Name(name)) if name == b"FlateDecode"
    );
    if !plain_flate || stream.dict.has(b"DecodeParms") {
        return false;
    }

    let mut raw = Vec::new();
    if ZlibDecoder::new(stream.content.as_slice())
        .read_to_end(&mut raw)
        .is_err()
    {
        return false;
    }

    match smallest_deflate(&raw, levels) {
        Some(compressed) if compressed.len() < stream.content.len() => {
            stream.set_content(compressed);
            true
        }
        _ => false,
    }
}

fn smallest_deflate(data: &[u8], levels: &[u32]) -> Option<Vec<u8>> {
    levels
        .iter()
        .filter_map(|&level| deflate(data, Compression::new(level)))
        .min_by_key(Vec::len)
}

fn deflate(data: &[u8], level: Compression) -> Option<Vec<u8>> {
    let mut encoder = ZlibEncoder::new(Vec::with_capacity(data.len() / 2), level);
    encoder.write_all(data).ok()?;
    encoder.finish().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::page_texts;
    use crate::test_support::{create_test_pdf, PdfBuilder};
    use lopdf::dictionary;
    use pretty_assertions::assert_eq;

    fn bulky_document() -> Document {
        let pdf = PdfBuilder::new().text_pages(2).bulky_page(2000).build();
        Document::from_bytes(&pdf).unwrap()
    }

    #[test]
    fn test_level_from_str() {
        assert_eq!("low".parse::<CompressionLevel>().unwrap(), CompressionLevel::Low);
        assert_eq!(" HIGH ".parse::<CompressionLevel>().unwrap(), CompressionLevel::High);
        assert!("extreme".parse::<CompressionLevel>().is_err());
    }

    #[test]
    fn test_report_rounding() {
        let report = CompressionReport::new(3000, 1000);
        assert_eq!(report.reduction_percent, 66.7);
        assert_eq!(report.bytes_saved(), 2000);
    }

    #[test]
    fn test_report_zero_original() {
        assert_eq!(CompressionReport::new(0, 0).reduction_percent, 0.0);
        assert_eq!(CompressionReport::new(0, 10).reduction_percent, 0.0);
    }

    #[test]
    fn test_report_negative_when_output_grows() {
        let report = CompressionReport::new(100, 110);
        assert_eq!(report.reduction_percent, -10.0);
    }

    #[test]
    fn test_compress_shrinks_repetitive_content() {
        let doc = bulky_document();
        for level in [CompressionLevel::Low, CompressionLevel::Medium, CompressionLevel::High] {
            let (result, report) = compress(&doc, level).unwrap();
            assert_eq!(report.original_size, doc.encoded_len().unwrap() as u64);
            assert!(report.compressed_size < report.original_size, "{:?}", level);
            assert!(report.reduction_percent > 0.0 && report.reduction_percent <= 100.0);
            assert_eq!(result.encoded_len(), Some(report.compressed_size as usize));
        }
    }

    fn compressed_sizes(doc: &Document) -> [u64; 3] {
        [CompressionLevel::Low, CompressionLevel::Medium, CompressionLevel::High]
            .map(|level| compress(doc, level).unwrap().1.compressed_size)
    }

    #[test]
    fn test_higher_levels_are_not_larger() {
        for repeats in [200, 2000, 3000] {
            let pdf = PdfBuilder::new().text_pages(2).bulky_page(repeats).build();
            let [low, medium, high] = compressed_sizes(&Document::from_bytes(&pdf).unwrap());
            assert!(medium <= low, "{} repeats: medium {} > low {}", repeats, medium, low);
            assert!(high <= medium, "{} repeats: high {} > medium {}", repeats, high, medium);
        }
    }

    #[test]
    fn test_medium_reencodes_already_flate_streams() {
        // Content streams compressed at level 1 before we see them
        let mut doc = bulky_document().inner().clone();
        for object in doc.objects.values_mut() {
            if let Object::Stream(stream) = object {
                if !stream.dict.has(b"Filter") {
                    let fast = deflate(&stream.content, Compression::fast()).unwrap();
                    stream.dict.set("Filter", "FlateDecode");
                    stream.set_content(fast);
                }
            }
        }
        let doc = Document::encoded(doc).unwrap();

        let [low, medium, high] = compressed_sizes(&doc);
        assert!(medium < low, "medium {} not below low {}", medium, low);
        assert!(high <= medium);
    }

    #[test]
    fn test_compressed_document_keeps_pages() {
        let doc = Document::from_bytes(&create_test_pdf(3)).unwrap();
        let (result, _) = compress(&doc, CompressionLevel::High).unwrap();
        let reloaded = Document::from_bytes(&result.into_bytes().unwrap()).unwrap();
        assert_eq!(page_texts(&reloaded), vec!["Page 1", "Page 2", "Page 3"]);
    }

    #[test]
    fn test_reencode_skips_streams_with_predictor() {
        let mut stream = Stream::new(
            dictionary! {
                "Filter" => "FlateDecode",
                "DecodeParms" => dictionary! { "Predictor" => 12 },
            },
            deflate(b"abcabcabc", Compression::fast()).unwrap(),
        );
        assert!(!reencode_flate(&mut stream, CompressionLevel::High.flate_levels()));
    }
}
