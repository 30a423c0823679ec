use crate::compress::CompressionLevel;
use crate::rotate::{RotationAngle, RotationScope};
use crate::selection::{PageOrder, PageSelection};
use serde::Serialize;

/// A fully parameterized operation, ready to run
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type")]
pub enum PdfCommand {
    Merge,
    SplitPages { selection: PageSelection },
    SplitChunks { chunk_size: u32 },
    Delete { selection: PageSelection },
    Rotate { angle: RotationAngle, scope: RotationScope },
    Reorder { order: PageOrder },
    Compress { level: CompressionLevel },
    ExtractText,
    ExtractImages,
    Rasterize { dpi: u32 },
    ImagesToPdf,
}

impl PdfCommand {
    /// One-line description for confirmation prompts
    pub fn summary(&self) -> String {
        match self {
            Self::Merge => "Merge the uploaded PDFs in upload order".into(),
            Self::SplitPages { selection } => format!(
                "Split into {} single-page PDF(s): pages {}",
                selection.len(),
                format_pages(selection.pages())
            ),
            Self::SplitChunks { chunk_size } => {
                format!("Split into parts of {} page(s) each", chunk_size)
            }
            Self::Delete { selection } => {
                format!("Delete pages {}", format_pages(selection.pages()))
            }
            Self::Rotate { angle, scope } => match scope {
                RotationScope::AllPages => format!("Rotate all pages by {}", angle),
                RotationScope::Pages(selection) => format!(
                    "Rotate pages {} by {}",
                    format_pages(selection.pages()),
                    angle
                ),
            },
            Self::Reorder { order } => {
                format!("Reorder pages as {}", format_pages(order.pages()))
            }
            Self::Compress { level } => format!("Compress with {} compression", level),
            Self::ExtractText => "Extract all text".into(),
            Self::ExtractImages => "Extract embedded images".into(),
            Self::Rasterize { dpi } => format!("Convert every page to a PNG image at {} DPI", dpi),
            Self::ImagesToPdf => "Combine the uploaded images into one PDF".into(),
        }
    }
}

fn format_pages(pages: &[u32]) -> String {
    pages
        .iter()
        .map(u32::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ProcessMetrics {
    pub input_size_bytes: usize,
    pub output_size_bytes: usize,
    pub page_count: u32,
    pub processing_time_ms: u64,
}
