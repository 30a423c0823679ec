//! Running a confirmed command against stored files
//!
//! Every output is written through an [`ArtifactWriter`]. If any step
//! fails, everything written so far is deleted before the error is returned.

use crate::config::Settings;
use crate::error::SessionError;
use crate::session::{UploadedFile, UserId};
use crate::storage::StorageArea;
use image::{DynamicImage, ImageFormat};
use pdfdesk_core::{
    compress, delete_pages, extract_embedded_images, extract_text, images_to_document, merge,
    rasterize, reorder_pages, rotate_pages, split_by_chunk_size, split_by_selection, write_zip,
    Document, PageRenderer, PdfCommand, PdfDeskError, ProcessMetrics,
};
use std::fs;
use std::path::PathBuf;
use std::time::Instant;
use tracing::{debug, info};

/// One file produced for the user
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    pub path: PathBuf,
    /// Name shown to the user
    pub filename: String,
    pub size: u64,
}

#[derive(Debug)]
pub(crate) struct ExecutionOutput {
    pub files: Vec<Artifact>,
    /// ZIP of all files, present when there are more than the delivery batch limit
    pub bundle: Option<Artifact>,
    pub message: String,
    pub metrics: ProcessMetrics,
}

impl ExecutionOutput {
    pub fn paths(&self) -> impl Iterator<Item = &PathBuf> {
        self.files.iter().chain(self.bundle.iter()).map(|a| &a.path)
    }
}

pub(crate) struct ExecutionContext<'a> {
    pub settings: &'a Settings,
    pub storage: &'a dyn StorageArea,
    pub renderer: Option<&'a dyn PageRenderer>,
    pub user: UserId,
}

pub(crate) fn execute(
    ctx: &ExecutionContext<'_>,
    command: &PdfCommand,
    files: &[UploadedFile],
    images: &[UploadedFile],
) -> Result<ExecutionOutput, SessionError> {
    let started = Instant::now();
    let mut writer = ArtifactWriter::new(ctx.storage, ctx.user);

    let result = run(ctx, &mut writer, command, files, images).and_then(|(message, pages)| {
        let bundle = match bundle_name(command) {
            Some(name) if writer.files.len() > ctx.settings.delivery_batch_limit => {
                Some(writer.bundle(name)?)
            }
            _ => None,
        };
        Ok((message, pages, bundle))
    });

    match result {
        Ok((message, page_count, bundle)) => {
            let input_size: u64 = match command {
                PdfCommand::ImagesToPdf => images.iter().map(|f| f.size).sum(),
                PdfCommand::Merge => files.iter().map(|f| f.size).sum(),
                _ => files.first().map(|f| f.size).unwrap_or(0),
            };
            let metrics = ProcessMetrics {
                input_size_bytes: input_size as usize,
                output_size_bytes: writer.files.iter().map(|a| a.size).sum::<u64>() as usize,
                page_count,
                processing_time_ms: started.elapsed().as_millis() as u64,
            };
            info!(
                user = ctx.user,
                command = ?command,
                outputs = writer.files.len(),
                elapsed_ms = metrics.processing_time_ms,
                "Command completed"
            );
            Ok(ExecutionOutput {
                files: writer.files,
                bundle,
                message,
                metrics,
            })
        }
        Err(e) => {
            writer.discard();
            Err(e)
        }
    }
}

/// Returns the reply message and the page count of the produced PDFs or images
fn run(
    ctx: &ExecutionContext<'_>,
    writer: &mut ArtifactWriter<'_>,
    command: &PdfCommand,
    files: &[UploadedFile],
    images: &[UploadedFile],
) -> Result<(String, u32), SessionError> {
    match command {
        PdfCommand::Merge => {
            let documents = files
                .iter()
                .map(|file| Document::open(&file.path))
                .collect::<Result<Vec<_>, _>>()?;
            let merged = merge(&documents)?;
            let pages = merged.page_count();
            writer.pdf("merged.pdf", merged)?;
            Ok((
                format!("Merged {} files into one PDF with {} pages", files.len(), pages),
                pages,
            ))
        }
        PdfCommand::SplitPages { selection } => {
            let document = open_primary(files)?;
            let parts = split_by_selection(&document, selection)?;
            for (page, part) in selection.iter().zip(parts) {
                writer.pdf(&format!("page_{}.pdf", page), part)?;
            }
            Ok((
                format!("Split into {} single-page PDF(s)", selection.len()),
                selection.len() as u32,
            ))
        }
        PdfCommand::SplitChunks { chunk_size } => {
            let document = open_primary(files)?;
            let parts = split_by_chunk_size(&document, *chunk_size)?;
            let count = parts.len();
            for (index, part) in parts.into_iter().enumerate() {
                writer.pdf(&format!("part_{}.pdf", index + 1), part)?;
            }
            Ok((
                format!(
                    "Split into {} part(s) of up to {} page(s)",
                    count, chunk_size
                ),
                document.page_count(),
            ))
        }
        PdfCommand::Delete { selection } => {
            let document = open_primary(files)?;
            let result = delete_pages(&document, selection)?;
            let remaining = result.page_count();
            writer.pdf("pages_deleted.pdf", result)?;
            Ok((
                format!(
                    "Deleted {} page(s), {} page(s) remain",
                    selection.len(),
                    remaining
                ),
                remaining,
            ))
        }
        PdfCommand::Rotate { angle, scope } => {
            let document = open_primary(files)?;
            let result = rotate_pages(&document, scope, *angle)?;
            let pages = result.page_count();
            writer.pdf("pages_rotated.pdf", result)?;
            Ok((format!("Rotated pages by {}", angle), pages))
        }
        PdfCommand::Reorder { order } => {
            let document = open_primary(files)?;
            let result = reorder_pages(&document, order)?;
            let pages = result.page_count();
            writer.pdf("pages_reordered.pdf", result)?;
            Ok(("Pages reordered".to_string(), pages))
        }
        PdfCommand::Compress { level } => {
            let document = open_primary(files)?;
            let (result, report) = compress(&document, *level)?;
            let pages = result.page_count();
            writer.pdf("compressed.pdf", result)?;
            Ok((
                format!(
                    "Compressed with {} compression: {} -> {} ({}% smaller)",
                    level,
                    crate::storage::format_file_size(report.original_size),
                    crate::storage::format_file_size(report.compressed_size),
                    report.reduction_percent
                ),
                pages,
            ))
        }
        PdfCommand::ExtractText => {
            let document = open_primary(files)?;
            let text = extract_text(&document);
            if text.is_empty() {
                return Ok(("No text found in this PDF".to_string(), 0));
            }

            let limit = ctx.settings.text_preview_chars;
            let chars = text.chars().count();
            if chars <= limit {
                return Ok((text, document.page_count()));
            }
            writer.text("extracted_text.txt", &text)?;
            let preview: String = text.chars().take(limit).collect();
            Ok((
                format!(
                    "Extracted {} characters, the full text is attached. Preview:\n\n{}...",
                    chars, preview
                ),
                document.page_count(),
            ))
        }
        PdfCommand::ExtractImages => {
            let document = open_primary(files)?;
            let extracted = extract_embedded_images(&document);
            if extracted.is_empty() {
                return Ok(("No images found in this PDF".to_string(), 0));
            }

            let mut page = 0;
            let mut index = 0;
            for item in &extracted {
                if item.page != page {
                    page = item.page;
                    index = 0;
                }
                index += 1;
                writer.png(&format!("page_{}_img_{}.png", page, index), &item.image)?;
            }
            Ok((
                format!("Extracted {} image(s)", extracted.len()),
                extracted.len() as u32,
            ))
        }
        PdfCommand::Rasterize { dpi } => {
            let renderer = ctx.renderer.ok_or(SessionError::RendererUnavailable)?;
            let document = open_primary(files)?;
            let pages = rasterize(&document, *dpi, renderer)?;
            for (index, image) in pages.iter().enumerate() {
                writer.png(&format!("page_{}.png", index + 1), image)?;
            }
            Ok((
                format!("Converted {} page(s) to PNG at {} DPI", pages.len(), dpi),
                pages.len() as u32,
            ))
        }
        PdfCommand::ImagesToPdf => {
            let decoded = images
                .iter()
                .map(|file| image::open(&file.path).map_err(PdfDeskError::from))
                .collect::<Result<Vec<_>, _>>()?;
            let document = images_to_document(&decoded)?;
            let pages = document.page_count();
            writer.pdf("images_to_pdf.pdf", document)?;
            Ok((format!("Created a PDF from {} image(s)", decoded.len()), pages))
        }
    }
}

fn open_primary(files: &[UploadedFile]) -> Result<Document, SessionError> {
    let file = files.first().ok_or(SessionError::NoDocument)?;
    Ok(Document::open(&file.path)?)
}

fn bundle_name(command: &PdfCommand) -> Option<&'static str> {
    match command {
        PdfCommand::SplitPages { .. } | PdfCommand::SplitChunks { .. } => Some("split_pages.zip"),
        PdfCommand::ExtractImages => Some("extracted_images.zip"),
        PdfCommand::Rasterize { .. } => Some("pdf_pages_as_images.zip"),
        _ => None,
    }
}

/// Allocates output paths and remembers them for cleanup
struct ArtifactWriter<'a> {
    storage: &'a dyn StorageArea,
    user: UserId,
    files: Vec<Artifact>,
    /// Paths allocated but not yet recorded as artifacts
    pending: Vec<PathBuf>,
}

impl<'a> ArtifactWriter<'a> {
    fn new(storage: &'a dyn StorageArea, user: UserId) -> Self {
        Self {
            storage,
            user,
            files: Vec::new(),
            pending: Vec::new(),
        }
    }

    fn allocate(&mut self, filename: &str) -> Result<PathBuf, SessionError> {
        let path = self.storage.allocate(self.user, filename)?;
        self.pending.push(path.clone());
        Ok(path)
    }

    fn record(&mut self, path: PathBuf, filename: &str) -> Result<Artifact, SessionError> {
        let size = fs::metadata(&path)?.len();
        self.pending.retain(|p| p != &path);
        debug!(path = %path.display(), size, "Wrote artifact");
        Ok(Artifact {
            path,
            filename: filename.to_string(),
            size,
        })
    }

    fn pdf(&mut self, filename: &str, document: Document) -> Result<(), SessionError> {
        let path = self.allocate(filename)?;
        document.save(&path)?;
        let artifact = self.record(path, filename)?;
        self.files.push(artifact);
        Ok(())
    }

    fn png(&mut self, filename: &str, image: &DynamicImage) -> Result<(), SessionError> {
        let path = self.allocate(filename)?;
        image
            .save_with_format(&path, ImageFormat::Png)
            .map_err(PdfDeskError::from)?;
        let artifact = self.record(path, filename)?;
        self.files.push(artifact);
        Ok(())
    }

    fn text(&mut self, filename: &str, text: &str) -> Result<(), SessionError> {
        let path = self.allocate(filename)?;
        fs::write(&path, text)?;
        let artifact = self.record(path, filename)?;
        self.files.push(artifact);
        Ok(())
    }

    fn bundle(&mut self, filename: &str) -> Result<Artifact, SessionError> {
        let path = self.allocate(filename)?;
        let entries: Vec<(&str, &PathBuf)> = self
            .files
            .iter()
            .map(|a| (a.filename.as_str(), &a.path))
            .collect();
        write_zip(&path, &entries)?;
        self.record(path, filename)
    }

    fn discard(self) {
        let removed = self
            .files
            .iter()
            .map(|a| &a.path)
            .chain(self.pending.iter())
            .filter(|path| self.storage.delete(path))
            .count();
        debug!(removed, "Discarded partial outputs");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::DiskStorage;
    use pdfdesk_core::test_support::{create_labelled_pdf, ImageFixture, PdfBuilder};
    use pdfdesk_core::{parse_page_selection, CompressionLevel};
    use pretty_assertions::assert_eq;

    struct Fixture {
        _dir: tempfile::TempDir,
        storage: DiskStorage,
        settings: Settings,
    }

    impl Fixture {
        fn new() -> Self {
            let dir = tempfile::tempdir().unwrap();
            let storage = DiskStorage::new(dir.path().join("store")).unwrap();
            Self {
                _dir: dir,
                storage,
                settings: Settings::default(),
            }
        }

        fn ctx(&self) -> ExecutionContext<'_> {
            ExecutionContext {
                settings: &self.settings,
                storage: &self.storage,
                renderer: None,
                user: 1,
            }
        }

        fn upload(&self, name: &str, bytes: &[u8]) -> UploadedFile {
            let path = self.storage.allocate(1, name).unwrap();
            fs::write(&path, bytes).unwrap();
            UploadedFile {
                path,
                name: name.to_string(),
                size: bytes.len() as u64,
                page_count: None,
            }
        }

        fn stored(&self) -> usize {
            self.storage.usage().total_files
        }
    }

    fn names(output: &ExecutionOutput) -> Vec<&str> {
        output.files.iter().map(|a| a.filename.as_str()).collect()
    }

    #[test]
    fn test_merge_writes_one_pdf() {
        let fx = Fixture::new();
        let files = vec![
            fx.upload("a.pdf", &create_labelled_pdf(2, "A")),
            fx.upload("b.pdf", &create_labelled_pdf(3, "B")),
        ];
        let output = execute(&fx.ctx(), &PdfCommand::Merge, &files, &[]).unwrap();

        assert_eq!(names(&output), vec!["merged.pdf"]);
        assert_eq!(output.metrics.page_count, 5);
        assert!(output.bundle.is_none());
        let merged = Document::open(&output.files[0].path).unwrap();
        assert_eq!(merged.page_count(), 5);
    }

    #[test]
    fn test_split_names_parts_by_page() {
        let fx = Fixture::new();
        let files = vec![fx.upload("in.pdf", &create_labelled_pdf(5, "A"))];
        let command = PdfCommand::SplitPages {
            selection: parse_page_selection("2,4", 5).unwrap(),
        };
        let output = execute(&fx.ctx(), &command, &files, &[]).unwrap();
        assert_eq!(names(&output), vec!["page_2.pdf", "page_4.pdf"]);
    }

    #[test]
    fn test_many_outputs_get_a_bundle() {
        let mut fx = Fixture::new();
        fx.settings.delivery_batch_limit = 2;
        let files = vec![fx.upload("in.pdf", &create_labelled_pdf(5, "A"))];
        let command = PdfCommand::SplitChunks { chunk_size: 1 };
        let output = execute(&fx.ctx(), &command, &files, &[]).unwrap();

        assert_eq!(output.files.len(), 5);
        let bundle = output.bundle.as_ref().unwrap();
        assert_eq!(bundle.filename, "split_pages.zip");
        assert!(bundle.size > 0);
        assert_eq!(output.paths().count(), 6);
    }

    #[test]
    fn test_failure_leaves_no_outputs_behind() {
        let fx = Fixture::new();
        let files = vec![fx.upload("in.pdf", &create_labelled_pdf(3, "A"))];
        let before = fx.stored();

        // Selection validated against a different page count
        let command = PdfCommand::Delete {
            selection: parse_page_selection("1", 9).unwrap(),
        };
        assert!(execute(&fx.ctx(), &command, &files, &[]).is_err());
        assert_eq!(fx.stored(), before);
    }

    #[test]
    fn test_short_text_is_inline_long_text_is_attached() {
        let mut fx = Fixture::new();
        let files = vec![fx.upload("in.pdf", &create_labelled_pdf(2, "A"))];

        let output = execute(&fx.ctx(), &PdfCommand::ExtractText, &files, &[]).unwrap();
        assert!(output.files.is_empty());
        assert_eq!(output.message, "A-Page 1\n\nA-Page 2");

        fx.settings.text_preview_chars = 5;
        let output = execute(&fx.ctx(), &PdfCommand::ExtractText, &files, &[]).unwrap();
        assert_eq!(names(&output), vec!["extracted_text.txt"]);
        assert!(output.message.contains("A-Pag..."));
        let saved = fs::read_to_string(&output.files[0].path).unwrap();
        assert_eq!(saved, "A-Page 1\n\nA-Page 2");
    }

    #[test]
    fn test_no_text_or_images_is_not_an_error() {
        let fx = Fixture::new();
        let blank = PdfBuilder::new().bulky_page(10).build();
        let files = vec![fx.upload("blank.pdf", &blank)];

        let text = execute(&fx.ctx(), &PdfCommand::ExtractText, &files, &[]).unwrap();
        assert_eq!(text.message, "No text found in this PDF");

        let images = execute(&fx.ctx(), &PdfCommand::ExtractImages, &files, &[]).unwrap();
        assert_eq!(images.message, "No images found in this PDF");
        assert!(images.files.is_empty());
    }

    #[test]
    fn test_extract_images_numbers_per_page() {
        let fx = Fixture::new();
        let pdf = PdfBuilder::new()
            .image_page(ImageFixture::RawRgb {
                width: 4,
                height: 3,
            })
            .image_page(ImageFixture::FlateGray {
                width: 2,
                height: 2,
            })
            .build();
        let files = vec![fx.upload("img.pdf", &pdf)];
        let output = execute(&fx.ctx(), &PdfCommand::ExtractImages, &files, &[]).unwrap();
        assert_eq!(names(&output), vec!["page_1_img_1.png", "page_2_img_1.png"]);
    }

    #[test]
    fn test_rasterize_without_renderer() {
        let fx = Fixture::new();
        let files = vec![fx.upload("in.pdf", &create_labelled_pdf(1, "A"))];
        let err = execute(&fx.ctx(), &PdfCommand::Rasterize { dpi: 150 }, &files, &[]).unwrap_err();
        assert!(matches!(err, SessionError::RendererUnavailable));
    }

    #[test]
    fn test_images_to_pdf() {
        let fx = Fixture::new();
        let mut png = Vec::new();
        DynamicImage::new_rgb8(20, 10)
            .write_to(&mut std::io::Cursor::new(&mut png), ImageFormat::Png)
            .unwrap();
        let images = vec![fx.upload("a.png", &png), fx.upload("b.png", &png)];

        let output = execute(&fx.ctx(), &PdfCommand::ImagesToPdf, &[], &images).unwrap();
        assert_eq!(names(&output), vec!["images_to_pdf.pdf"]);
        assert_eq!(output.metrics.page_count, 2);
        assert_eq!(output.metrics.input_size_bytes, png.len() * 2);
    }

    #[test]
    fn test_compress_reports_sizes() {
        let fx = Fixture::new();
        let pdf = PdfBuilder::new().bulky_page(200).build();
        let files = vec![fx.upload("big.pdf", &pdf)];
        let command = PdfCommand::Compress {
            level: CompressionLevel::High,
        };
        let output = execute(&fx.ctx(), &command, &files, &[]).unwrap();
        assert!(output.message.starts_with("Compressed with high compression"));
        assert_eq!(output.metrics.input_size_bytes, pdf.len());
    }
}
