//! Conversation driver
//!
//! The orchestrator turns user events into session transitions and, once a
//! command is confirmed, runs it and delivers the results. Transport is
//! abstracted behind [`Delivery`]; the orchestrator itself never panics on
//! user input and reports every failure as a reply.

use crate::config::Settings;
use crate::error::SessionError;
use crate::execute::{execute, ExecutionContext, ExecutionOutput};
use crate::session::{OperationKind, Session, SessionState, Step, UploadedFile, UserId};
use crate::storage::{format_file_size, is_image_file, is_pdf_file, StorageArea};
use crate::store::{lock, InMemorySessionStore, SessionHandle, SessionStore};
use pdfdesk_core::{
    parse_page_order, parse_page_selection, CompressionLevel, Document, PageRenderer, PdfCommand,
    PdfDeskError, ProcessMetrics, RotationAngle, RotationScope,
};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};

/// Input from the user
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Start,
    Help,
    Cancel,
    Status,
    /// A file the transport has already saved to `path`
    Upload { path: PathBuf, name: String },
    Select(OperationKind),
    Text(String),
    Confirm,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Reply {
    pub text: String,
    /// Present when a command ran to completion
    pub outcome: Option<Outcome>,
}

impl Reply {
    fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            outcome: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Outcome {
    /// Names of the files handed to [`Delivery`] successfully
    pub delivered: Vec<String>,
    pub failed: usize,
    pub metrics: ProcessMetrics,
}

/// Sends produced files back to the user
pub trait Delivery: Send + Sync {
    fn send_file(
        &self,
        user: UserId,
        path: &Path,
        filename: &str,
        caption: Option<&str>,
    ) -> io::Result<()>;
}

const HELP: &str = "\
Upload a PDF, then choose what to do with it:
/merge - combine several PDFs into one
/split - split into single pages or fixed-size parts
/delete - delete pages
/rotate - rotate pages by 90, 180 or 270 degrees
/reorder - put the pages in a new order
/compress - make the file smaller
/text - extract the text
/images - extract embedded images
/convert - PDF to images or images to PDF
/status - show the current step
/cancel - abort and remove your files";

const CONFIRM_HINT: &str = "Send /confirm to proceed or /cancel to abort.";

pub struct Orchestrator {
    settings: Settings,
    storage: Arc<dyn StorageArea>,
    delivery: Arc<dyn Delivery>,
    renderer: Option<Arc<dyn PageRenderer>>,
    sessions: Arc<dyn SessionStore>,
}

impl Orchestrator {
    pub fn new(
        settings: Settings,
        storage: Arc<dyn StorageArea>,
        delivery: Arc<dyn Delivery>,
    ) -> Self {
        Self {
            settings,
            storage,
            delivery,
            renderer: None,
            sessions: Arc::new(InMemorySessionStore::new()),
        }
    }

    /// Enable PDF to image conversion
    pub fn with_renderer(mut self, renderer: Arc<dyn PageRenderer>) -> Self {
        self.renderer = Some(renderer);
        self
    }

    pub fn with_session_store(mut self, sessions: Arc<dyn SessionStore>) -> Self {
        self.sessions = sessions;
        self
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn storage(&self) -> &dyn StorageArea {
        self.storage.as_ref()
    }

    pub fn session(&self, user: UserId) -> SessionHandle {
        self.sessions.get_or_create(user)
    }

    /// Handle one event, converting any error into a reply
    pub fn handle(&self, user: UserId, event: Event) -> Reply {
        match self.try_handle(user, event) {
            Ok(reply) => reply,
            Err(e) => {
                debug!(user, error = %e, "Event rejected");
                Reply::text(e.to_string())
            }
        }
    }

    pub fn try_handle(&self, user: UserId, event: Event) -> Result<Reply, SessionError> {
        match event {
            Event::Start => {
                self.sessions.reset(user, self.storage.as_ref());
                Ok(Reply::text(format!(
                    "Welcome! I can merge, split, rotate, compress and convert PDF files.\n\n{}",
                    HELP
                )))
            }
            Event::Help => Ok(Reply::text(HELP)),
            Event::Cancel => self.cancel(user),
            Event::Status => Ok(self.status(user)),
            Event::Confirm => self.confirm(user),
            Event::Upload { path, name } => {
                let handle = self.session(user);
                let mut session = lock(&handle);
                ensure_idle_worker(&session)?;
                self.upload(&mut session, &path, &name)
            }
            Event::Select(kind) => {
                let handle = self.session(user);
                let mut session = lock(&handle);
                ensure_idle_worker(&session)?;
                self.select(&mut session, kind)
            }
            Event::Text(text) => {
                let handle = self.session(user);
                let mut session = lock(&handle);
                ensure_idle_worker(&session)?;
                if matches!(session.state, SessionState::Confirming(_)) {
                    match text.trim().to_ascii_lowercase().as_str() {
                        "yes" | "confirm" => {
                            drop(session);
                            return self.confirm(user);
                        }
                        "no" => {
                            drop(session);
                            return self.cancel(user);
                        }
                        _ => {}
                    }
                }
                self.text(&mut session, text.trim())
            }
        }
    }

    fn cancel(&self, user: UserId) -> Result<Reply, SessionError> {
        let handle = self.session(user);
        let mut session = lock(&handle);
        if session.is_pristine() && !session.executing {
            return Ok(Reply::text("Nothing to cancel"));
        }
        session.reset(self.storage.as_ref());
        info!(user, "Session cancelled");
        Ok(Reply::text("Cancelled. Your files have been removed."))
    }

    fn status(&self, user: UserId) -> Reply {
        let handle = self.session(user);
        let session = lock(&handle);
        let mut text = format!("Status: {}", session.phase());
        if let Some(kind) = session.state.operation() {
            text.push_str(&format!("\nOperation: {}", kind));
        }
        if let SessionState::Confirming(command) = &session.state {
            text.push_str(&format!("\nPending: {}", command.summary()));
        }
        text.push_str(&format!(
            "\nPDFs: {}\nImages: {}",
            session.files.len(),
            session.images.len()
        ));
        for file in &session.files {
            text.push_str(&format!("\n- {} ({})", file.name, format_file_size(file.size)));
        }
        Reply::text(text)
    }

    fn upload(
        &self,
        session: &mut Session,
        source: &Path,
        name: &str,
    ) -> Result<Reply, SessionError> {
        let size = fs::metadata(source)?.len();
        if size > self.settings.max_file_size {
            return Err(SessionError::FileTooLarge {
                size: format_file_size(size),
                limit: format_file_size(self.settings.max_file_size),
            });
        }

        if is_pdf_file(name) {
            match &session.state {
                SessionState::Idle
                | SessionState::AwaitingFile(_)
                | SessionState::Collecting(Step::MergeFiles) => {}
                SessionState::Collecting(Step::ImageFiles) => {
                    return Err(SessionError::UnexpectedInput(
                        "Send images to convert, or 'done' when finished".into(),
                    ))
                }
                other => return Err(in_progress(other)),
            }

            let file = self.store_pdf(session.user(), source, name, size)?;
            let pages = file.page_count.unwrap_or(0);
            session.files.push(file);

            match session.state.clone() {
                SessionState::AwaitingFile(kind) => self.prompt_for(session, kind),
                SessionState::Collecting(Step::MergeFiles) => Ok(Reply::text(format!(
                    "Received {} ({} pages). {} file(s) so far. Send more or 'done' to merge.",
                    name,
                    pages,
                    session.files.len()
                ))),
                _ => Ok(Reply::text(format!(
                    "Received {} ({} pages, {}). What would you like to do?\n\n{}",
                    name,
                    pages,
                    format_file_size(size),
                    HELP
                ))),
            }
        } else if is_image_file(name) {
            match &session.state {
                SessionState::Idle | SessionState::Collecting(Step::ImageFiles) => {}
                SessionState::AwaitingFile(_) | SessionState::Collecting(Step::MergeFiles) => {
                    return Err(SessionError::UnexpectedInput(
                        "Please send a PDF file".into(),
                    ))
                }
                other => return Err(in_progress(other)),
            }

            let file = self.store_image(session.user(), source, name, size)?;
            session.images.push(file);
            let count = session.images.len();
            if session.state == SessionState::Collecting(Step::ImageFiles) {
                Ok(Reply::text(format!(
                    "Image {} received. Send more, 'done' to create the PDF or 'clear' to start over.",
                    count
                )))
            } else {
                Ok(Reply::text(format!(
                    "Image received ({} so far). Use /convert to turn images into a PDF.",
                    count
                )))
            }
        } else {
            Err(SessionError::UnsupportedFile(format!(
                "{}. Send a PDF or an image (JPG, PNG, GIF, BMP, TIFF, WEBP)",
                name
            )))
        }
    }

    fn store_pdf(
        &self,
        user: UserId,
        source: &Path,
        name: &str,
        size: u64,
    ) -> Result<UploadedFile, SessionError> {
        let document = Document::open(source)?;
        let page_count = document.page_count();
        if page_count == 0 {
            return Err(SessionError::UnsupportedFile(format!("{} has no pages", name)));
        }
        if page_count > self.settings.max_pdf_pages {
            return Err(SessionError::UnsupportedFile(format!(
                "{} has {} pages, the limit is {}",
                name, page_count, self.settings.max_pdf_pages
            )));
        }
        let path = self.copy_in(user, source, name)?;
        debug!(user, name, page_count, "Stored PDF upload");
        Ok(UploadedFile {
            path,
            name: name.to_string(),
            size,
            page_count: Some(page_count),
        })
    }

    fn store_image(
        &self,
        user: UserId,
        source: &Path,
        name: &str,
        size: u64,
    ) -> Result<UploadedFile, SessionError> {
        image::image_dimensions(source)
            .map_err(|e| SessionError::UnsupportedFile(format!("{} is not a readable image: {}", name, e)))?;
        let path = self.copy_in(user, source, name)?;
        Ok(UploadedFile {
            path,
            name: name.to_string(),
            size,
            page_count: None,
        })
    }

    fn copy_in(&self, user: UserId, source: &Path, name: &str) -> Result<PathBuf, SessionError> {
        let path = self.storage.allocate(user, name)?;
        if let Err(e) = fs::copy(source, &path) {
            self.storage.delete(&path);
            return Err(SessionError::Storage(format!("Cannot store {}: {}", name, e)));
        }
        Ok(path)
    }

    fn select(&self, session: &mut Session, kind: OperationKind) -> Result<Reply, SessionError> {
        if !self.settings.features.is_enabled(kind) {
            return Err(SessionError::FeatureDisabled(kind));
        }
        if session.state != SessionState::Idle {
            return Err(in_progress(&session.state));
        }

        match kind {
            OperationKind::Merge => {
                session.state = SessionState::Collecting(Step::MergeFiles);
                Ok(Reply::text(format!(
                    "Send the PDFs to merge, in order. You have {} so far; at least 2 are needed. Send 'done' when finished.",
                    session.files.len()
                )))
            }
            OperationKind::Convert => {
                session.state = SessionState::Collecting(Step::ConvertDirection);
                Ok(Reply::text(
                    "Convert 'pdf2images' (every page to a PNG) or 'images2pdf' (images into one PDF)?",
                ))
            }
            _ if session.files.is_empty() => {
                session.state = SessionState::AwaitingFile(kind);
                Ok(Reply::text(format!(
                    "Send the PDF you want to {}.",
                    kind
                )))
            }
            _ => self.prompt_for(session, kind),
        }
    }

    /// First parameter prompt for an operation whose document is available
    fn prompt_for(&self, session: &mut Session, kind: OperationKind) -> Result<Reply, SessionError> {
        let pages = session.primary_page_count().ok_or(SessionError::NoDocument)?;
        let (state, text) = match kind {
            OperationKind::Split => (
                SessionState::Collecting(Step::SplitMode),
                "Split by 'pages' (one file per selected page) or by 'chunks' (fixed number of pages per file)?".to_string(),
            ),
            OperationKind::Delete => (
                SessionState::Collecting(Step::DeletePages),
                format!(
                    "The document has {} pages. Which pages should be deleted? (e.g. 1,3,5-7)",
                    pages
                ),
            ),
            OperationKind::Rotate => (
                SessionState::Collecting(Step::RotateAngle),
                "Rotate clockwise by 90, 180 or 270 degrees?".to_string(),
            ),
            OperationKind::Reorder => (
                SessionState::Collecting(Step::ReorderOrder),
                format!(
                    "Send the new order of all {} pages, e.g. {}",
                    pages,
                    example_order(pages)
                ),
            ),
            OperationKind::Compress => (
                SessionState::Collecting(Step::CompressLevel),
                "Choose compression: low, medium or high".to_string(),
            ),
            OperationKind::ExtractText => return Ok(confirming(session, PdfCommand::ExtractText)),
            OperationKind::ExtractImages => {
                return Ok(confirming(session, PdfCommand::ExtractImages))
            }
            OperationKind::Convert => return self.rasterize_prompt(session),
            OperationKind::Merge => {
                session.state = SessionState::Collecting(Step::MergeFiles);
                return Ok(Reply::text(format!(
                    "{} file(s) so far. Send more PDFs or 'done' to merge.",
                    session.files.len()
                )));
            }
        };
        session.state = state;
        Ok(Reply::text(text))
    }

    fn rasterize_prompt(&self, session: &mut Session) -> Result<Reply, SessionError> {
        if self.renderer.is_none() {
            return Err(SessionError::RendererUnavailable);
        }
        Ok(confirming(
            session,
            PdfCommand::Rasterize {
                dpi: self.settings.image_dpi,
            },
        ))
    }

    fn text(&self, session: &mut Session, text: &str) -> Result<Reply, SessionError> {
        let keyword = text.to_ascii_lowercase();
        let step = match &session.state {
            SessionState::Idle => {
                return Err(SessionError::UnexpectedInput(
                    "Upload a PDF or choose an operation. Send /help to see what I can do".into(),
                ))
            }
            SessionState::AwaitingFile(_) => return Err(SessionError::NoDocument),
            SessionState::Confirming(_) => {
                return Err(SessionError::UnexpectedInput(CONFIRM_HINT.into()))
            }
            SessionState::Collecting(step) => step.clone(),
        };

        match step {
            Step::MergeFiles => {
                if keyword != "done" {
                    return Err(SessionError::UnexpectedInput(
                        "Send PDF files to merge, or 'done' when finished".into(),
                    ));
                }
                if session.files.len() < 2 {
                    return Err(SessionError::UnexpectedInput(format!(
                        "Merging needs at least 2 PDFs, you have sent {}",
                        session.files.len()
                    )));
                }
                Ok(confirming(session, PdfCommand::Merge))
            }
            Step::ImageFiles => match keyword.as_str() {
                "done" if session.images.is_empty() => Err(SessionError::UnexpectedInput(
                    "Send at least one image first".into(),
                )),
                "done" => Ok(confirming(session, PdfCommand::ImagesToPdf)),
                "clear" => {
                    let removed = session.clear_images(self.storage.as_ref());
                    Ok(Reply::text(format!(
                        "Removed {} image(s). Send new images.",
                        removed
                    )))
                }
                _ => Err(SessionError::UnexpectedInput(
                    "Send images, 'done' to create the PDF or 'clear' to start over".into(),
                )),
            },
            Step::ConvertDirection => match keyword.as_str() {
                "pdf2images" if session.files.is_empty() => {
                    if self.renderer.is_none() {
                        return Err(SessionError::RendererUnavailable);
                    }
                    session.state = SessionState::AwaitingFile(OperationKind::Convert);
                    Ok(Reply::text("Send the PDF to convert to images."))
                }
                "pdf2images" => self.rasterize_prompt(session),
                "images2pdf" => {
                    session.state = SessionState::Collecting(Step::ImageFiles);
                    Ok(Reply::text(format!(
                        "Send the images in page order ({} received so far). Send 'done' when finished or 'clear' to start over.",
                        session.images.len()
                    )))
                }
                _ => Err(SessionError::UnexpectedInput(
                    "Choose 'pdf2images' or 'images2pdf'".into(),
                )),
            },
            Step::SplitMode => {
                let pages = self.page_count(session)?;
                match keyword.as_str() {
                    "pages" => {
                        session.state = SessionState::Collecting(Step::SplitPages);
                        Ok(Reply::text(format!(
                            "Which pages should become separate files? The document has {} pages (e.g. 1,3,5-7 or all)",
                            pages
                        )))
                    }
                    "chunks" | "range" => {
                        session.state = SessionState::Collecting(Step::SplitChunkSize);
                        Ok(Reply::text(format!(
                            "How many pages per part? The document has {} pages",
                            pages
                        )))
                    }
                    _ => Err(SessionError::UnexpectedInput(
                        "Choose 'pages' or 'chunks'".into(),
                    )),
                }
            }
            Step::SplitPages => {
                let selection = parse_page_selection(text, self.page_count(session)?)?;
                Ok(confirming(session, PdfCommand::SplitPages { selection }))
            }
            Step::SplitChunkSize => {
                let chunk_size = text
                    .parse::<u32>()
                    .ok()
                    .filter(|size| *size > 0)
                    .ok_or_else(|| {
                        SessionError::UnexpectedInput(
                            "Send a whole number of pages per part, e.g. 2".into(),
                        )
                    })?;
                Ok(confirming(session, PdfCommand::SplitChunks { chunk_size }))
            }
            Step::DeletePages => {
                let page_count = self.page_count(session)?;
                let selection = parse_page_selection(text, page_count)?;
                if selection.covers_all() {
                    return Err(PdfDeskError::AllPagesRemoved { page_count }.into());
                }
                Ok(confirming(session, PdfCommand::Delete { selection }))
            }
            Step::RotateAngle => {
                let degrees = keyword
                    .trim_end_matches('°')
                    .trim()
                    .parse::<u16>()
                    .map_err(|_| {
                        SessionError::UnexpectedInput("Choose 90, 180 or 270".into())
                    })?;
                let angle = RotationAngle::try_from(degrees)?;
                session.state = SessionState::Collecting(Step::RotateScope { angle });
                Ok(Reply::text(format!(
                    "Rotate 'all' pages by {}, or list the pages (e.g. 1,3,5-7)?",
                    angle
                )))
            }
            Step::RotateScope { angle } => {
                let scope = if keyword == "all" {
                    RotationScope::AllPages
                } else {
                    RotationScope::Pages(parse_page_selection(text, self.page_count(session)?)?)
                };
                Ok(confirming(session, PdfCommand::Rotate { angle, scope }))
            }
            Step::ReorderOrder => {
                let order = parse_page_order(text, self.page_count(session)?)?;
                Ok(confirming(session, PdfCommand::Reorder { order }))
            }
            Step::CompressLevel => {
                let level: CompressionLevel = keyword.parse()?;
                Ok(confirming(session, PdfCommand::Compress { level }))
            }
        }
    }

    fn page_count(&self, session: &Session) -> Result<u32, SessionError> {
        session.primary_page_count().ok_or(SessionError::NoDocument)
    }

    /// Run the pending command
    ///
    /// The session lock is released while the command runs; the executing
    /// flag keeps a second confirmation out until delivery is finished.
    fn confirm(&self, user: UserId) -> Result<Reply, SessionError> {
        let handle = self.session(user);
        let (command, files, images, generation) = {
            let mut session = lock(&handle);
            if session.executing {
                return Err(SessionError::Busy);
            }
            let SessionState::Confirming(command) = &session.state else {
                return Err(SessionError::UnexpectedInput(
                    "There is nothing to confirm. Choose an operation first".into(),
                ));
            };
            let command = command.clone();
            session.executing = true;
            (
                command,
                session.files.clone(),
                session.images.clone(),
                session.generation,
            )
        };
        let _guard = ExecutionGuard { session: &handle };

        info!(user, command = %command.summary(), "Executing command");
        let ctx = ExecutionContext {
            settings: &self.settings,
            storage: self.storage.as_ref(),
            renderer: self.renderer.as_deref(),
            user,
        };
        let result = execute(&ctx, &command, &files, &images);

        let output = {
            let mut session = lock(&handle);
            if session.generation != generation {
                if let Ok(output) = &result {
                    self.discard(output);
                }
                info!(user, "Discarded result of cancelled command");
                return Ok(Reply::text(
                    "The operation was cancelled; its results were discarded.",
                ));
            }
            match result {
                Ok(output) => {
                    session.artifacts.extend(output.paths().cloned());
                    output
                }
                Err(e) => {
                    warn!(user, error = %e, "Command failed");
                    session.state = SessionState::Idle;
                    return Err(e);
                }
            }
        };

        let outcome = self.deliver(user, &output);

        let mut session = lock(&handle);
        if session.generation == generation {
            session.reset(self.storage.as_ref());
        }
        drop(session);

        let mut text = output.message;
        if !outcome.delivered.is_empty() {
            text.push_str(&format!("\n\nSent {} file(s)", outcome.delivered.len()));
        }
        if outcome.failed > 0 {
            text.push_str(&format!(
                "\n{} file(s) could not be sent, please try again",
                outcome.failed
            ));
        }
        Ok(Reply {
            text,
            outcome: Some(outcome),
        })
    }

    /// Send the first batch individually, then the bundle if there is one
    fn deliver(&self, user: UserId, output: &ExecutionOutput) -> Outcome {
        let limit = self.settings.delivery_batch_limit;
        let batch = output.files.iter().take(limit);
        let total = output.files.len();

        let mut delivered = Vec::new();
        let mut failed = 0;
        for (index, artifact) in batch.chain(output.bundle.iter()).enumerate() {
            let caption = if output.bundle.as_ref() == Some(artifact) {
                Some(format!("All {} files", total))
            } else if total > 1 {
                Some(format!("{} of {}", index + 1, total))
            } else {
                None
            };
            match self
                .delivery
                .send_file(user, &artifact.path, &artifact.filename, caption.as_deref())
            {
                Ok(()) => delivered.push(artifact.filename.clone()),
                Err(e) => {
                    warn!(user, file = %artifact.filename, error = %e, "Delivery failed");
                    failed += 1;
                }
            }
        }

        Outcome {
            delivered,
            failed,
            metrics: output.metrics.clone(),
        }
    }

    fn discard(&self, output: &ExecutionOutput) {
        for path in output.paths() {
            self.storage.delete(path);
        }
    }

    /// Remove stored files past the retention window, then forget sessions
    /// with nothing left in them. Returns the number of files removed.
    pub fn sweep(&self) -> usize {
        let removed = self.storage.sweep(self.settings.file_retention());
        let evicted = self.sessions.evict_idle();
        if evicted > 0 {
            info!(evicted, sessions = self.sessions.len(), "Dropped idle sessions");
        }
        removed
    }
}

/// Clears the executing flag when the command is finished, even on error
struct ExecutionGuard<'a> {
    session: &'a Mutex<Session>,
}

impl Drop for ExecutionGuard<'_> {
    fn drop(&mut self) {
        lock(self.session).executing = false;
    }
}

fn ensure_idle_worker(session: &Session) -> Result<(), SessionError> {
    if session.executing {
        Err(SessionError::Busy)
    } else {
        Ok(())
    }
}

fn in_progress(state: &SessionState) -> SessionError {
    match state.operation() {
        Some(kind) => SessionError::OperationInProgress(kind),
        None => SessionError::UnexpectedInput("Send /cancel to start over".into()),
    }
}

fn confirming(session: &mut Session, command: PdfCommand) -> Reply {
    let text = format!("{}\n\n{}", command.summary(), CONFIRM_HINT);
    session.state = SessionState::Confirming(command);
    Reply::text(text)
}

fn example_order(pages: u32) -> String {
    (1..=pages.min(3))
        .rev()
        .map(|p| p.to_string())
        .collect::<Vec<_>>()
        .join(",")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::DiskStorage;
    use pdfdesk_core::test_support::create_labelled_pdf;
    use pretty_assertions::assert_eq;
    use std::sync::Mutex as StdMutex;

    #[derive(Default)]
    struct Recorder {
        sent: StdMutex<Vec<String>>,
    }

    impl Delivery for Recorder {
        fn send_file(&self, _: UserId, path: &Path, filename: &str, _: Option<&str>) -> io::Result<()> {
            assert!(path.exists());
            self.sent.lock().unwrap().push(filename.to_string());
            Ok(())
        }
    }

    struct Harness {
        dir: tempfile::TempDir,
        orchestrator: Orchestrator,
        recorder: Arc<Recorder>,
    }

    impl Harness {
        fn new() -> Self {
            Self::with_settings(Settings::default())
        }

        fn with_settings(settings: Settings) -> Self {
            let dir = tempfile::tempdir().unwrap();
            let storage = Arc::new(DiskStorage::new(dir.path().join("store")).unwrap());
            let recorder = Arc::new(Recorder::default());
            let orchestrator = Orchestrator::new(settings, storage, recorder.clone());
            Self {
                dir,
                orchestrator,
                recorder,
            }
        }

        fn upload(&self, name: &str, bytes: &[u8]) -> Reply {
            let path = self.dir.path().join(name);
            fs::write(&path, bytes).unwrap();
            self.orchestrator.handle(
                1,
                Event::Upload {
                    path,
                    name: name.to_string(),
                },
            )
        }

        fn send(&self, event: Event) -> Reply {
            self.orchestrator.handle(1, event)
        }

        fn text(&self, text: &str) -> Reply {
            self.send(Event::Text(text.to_string()))
        }

        fn state(&self) -> SessionState {
            lock(&self.orchestrator.session(1)).state.clone()
        }
    }

    #[test]
    fn test_delete_flow() {
        let h = Harness::new();
        h.upload("doc.pdf", &create_labelled_pdf(4, "A"));
        h.send(Event::Select(OperationKind::Delete));
        assert_eq!(h.state(), SessionState::Collecting(Step::DeletePages));

        let reply = h.text("2-3");
        assert!(reply.text.starts_with("Delete pages 2, 3"));

        let reply = h.send(Event::Confirm);
        let outcome = reply.outcome.unwrap();
        assert_eq!(outcome.delivered, vec!["pages_deleted.pdf"]);
        assert_eq!(outcome.metrics.page_count, 2);
        assert_eq!(h.state(), SessionState::Idle);
        assert_eq!(h.orchestrator.storage().usage().total_files, 0);
    }

    #[test]
    fn test_delete_all_pages_stays_in_step() {
        let h = Harness::new();
        h.upload("doc.pdf", &create_labelled_pdf(3, "A"));
        h.send(Event::Select(OperationKind::Delete));
        let reply = h.text("all");
        assert!(reply.text.contains("Cannot delete all 3 pages"));
        assert_eq!(h.state(), SessionState::Collecting(Step::DeletePages));
    }

    #[test]
    fn test_select_while_in_progress_is_rejected() {
        let h = Harness::new();
        h.upload("doc.pdf", &create_labelled_pdf(3, "A"));
        h.send(Event::Select(OperationKind::Rotate));
        let err = h
            .orchestrator
            .try_handle(1, Event::Select(OperationKind::Compress))
            .unwrap_err();
        assert!(matches!(err, SessionError::OperationInProgress(OperationKind::Rotate)));
        assert_eq!(h.state(), SessionState::Collecting(Step::RotateAngle));
    }

    #[test]
    fn test_operation_before_upload_waits_for_file() {
        let h = Harness::new();
        h.send(Event::Select(OperationKind::Compress));
        assert_eq!(h.state(), SessionState::AwaitingFile(OperationKind::Compress));

        let err = h
            .orchestrator
            .try_handle(1, Event::Text("high".into()))
            .unwrap_err();
        assert!(matches!(err, SessionError::NoDocument));

        h.upload("doc.pdf", &create_labelled_pdf(1, "A"));
        assert_eq!(h.state(), SessionState::Collecting(Step::CompressLevel));
    }

    #[test]
    fn test_disabled_feature_is_refused() {
        let mut settings = Settings::default();
        settings.features.split = false;
        let h = Harness::with_settings(settings);
        let err = h
            .orchestrator
            .try_handle(1, Event::Select(OperationKind::Split))
            .unwrap_err();
        assert!(matches!(err, SessionError::FeatureDisabled(OperationKind::Split)));
    }

    #[test]
    fn test_oversized_upload_is_rejected() {
        let settings = Settings {
            max_file_size: 100,
            ..Settings::default()
        };
        let h = Harness::with_settings(settings);
        let reply = h.upload("doc.pdf", &create_labelled_pdf(2, "A"));
        assert!(reply.text.starts_with("File is too large"));
        assert!(lock(&h.orchestrator.session(1)).files.is_empty());
    }

    #[test]
    fn test_invalid_pdf_upload_is_rejected() {
        let h = Harness::new();
        let reply = h.upload("fake.pdf", b"not a pdf at all");
        assert!(reply.text.starts_with("Failed to read PDF"));
        assert_eq!(h.orchestrator.storage().usage().total_files, 0);
    }

    #[test]
    fn test_unsupported_upload() {
        let h = Harness::new();
        let err = {
            let path = h.dir.path().join("notes.txt");
            fs::write(&path, b"hello").unwrap();
            h.orchestrator
                .try_handle(
                    1,
                    Event::Upload {
                        path,
                        name: "notes.txt".into(),
                    },
                )
                .unwrap_err()
        };
        assert!(matches!(err, SessionError::UnsupportedFile(_)));
    }

    #[test]
    fn test_invalid_parameter_keeps_step() {
        let h = Harness::new();
        h.upload("doc.pdf", &create_labelled_pdf(3, "A"));
        h.send(Event::Select(OperationKind::Reorder));

        let reply = h.text("1,1,2");
        assert!(reply.text.starts_with("Invalid input"));
        assert_eq!(h.state(), SessionState::Collecting(Step::ReorderOrder));

        h.text("3,1,2");
        assert!(matches!(h.state(), SessionState::Confirming(PdfCommand::Reorder { .. })));
    }

    #[test]
    fn test_rotate_scope_all() {
        let h = Harness::new();
        h.upload("doc.pdf", &create_labelled_pdf(2, "A"));
        h.send(Event::Select(OperationKind::Rotate));
        h.text("90");
        h.text("all");
        assert_eq!(
            h.state(),
            SessionState::Confirming(PdfCommand::Rotate {
                angle: RotationAngle::Quarter,
                scope: RotationScope::AllPages,
            })
        );
        let reply = h.text("yes");
        assert_eq!(reply.outcome.unwrap().delivered, vec!["pages_rotated.pdf"]);
    }

    #[test]
    fn test_confirm_without_pending_command() {
        let h = Harness::new();
        let reply = h.send(Event::Confirm);
        assert!(reply.text.starts_with("There is nothing to confirm"));
    }

    #[test]
    fn test_cancel_clears_files() {
        let h = Harness::new();
        h.upload("doc.pdf", &create_labelled_pdf(2, "A"));
        assert_eq!(h.orchestrator.storage().usage().total_files, 1);

        let reply = h.send(Event::Cancel);
        assert!(reply.text.starts_with("Cancelled"));
        assert_eq!(h.orchestrator.storage().usage().total_files, 0);
        assert_eq!(h.send(Event::Cancel).text, "Nothing to cancel");
    }

    #[test]
    fn test_convert_without_renderer() {
        let h = Harness::new();
        h.upload("doc.pdf", &create_labelled_pdf(1, "A"));
        h.send(Event::Select(OperationKind::Convert));
        let err = h
            .orchestrator
            .try_handle(1, Event::Text("pdf2images".into()))
            .unwrap_err();
        assert!(matches!(err, SessionError::RendererUnavailable));
        assert_eq!(h.state(), SessionState::Collecting(Step::ConvertDirection));
    }

    #[test]
    fn test_status_reports_phase() {
        let h = Harness::new();
        h.upload("doc.pdf", &create_labelled_pdf(2, "A"));
        h.send(Event::Select(OperationKind::Split));
        let status = h.send(Event::Status).text;
        assert!(status.contains("Status: operation selected"));
        assert!(status.contains("Operation: split"));
        assert!(status.contains("- doc.pdf"));
    }

    #[test]
    fn test_sweep_drops_finished_sessions() {
        let h = Harness::new();
        h.upload("doc.pdf", &create_labelled_pdf(2, "A"));
        h.send(Event::Select(OperationKind::Compress));
        h.text("low");
        h.orchestrator.handle(2, Event::Select(OperationKind::Merge));
        assert_eq!(h.orchestrator.sessions.len(), 2);

        h.orchestrator.sweep();
        assert_eq!(h.orchestrator.sessions.len(), 2);

        h.send(Event::Confirm);
        h.orchestrator.sweep();
        assert_eq!(h.orchestrator.sessions.len(), 1);
        assert_eq!(
            lock(&h.orchestrator.session(2)).state,
            SessionState::Collecting(Step::MergeFiles)
        );
    }

    #[test]
    fn test_recorder_sees_files() {
        let h = Harness::new();
        h.upload("doc.pdf", &create_labelled_pdf(2, "A"));
        h.send(Event::Select(OperationKind::Compress));
        h.text("low");
        h.send(Event::Confirm);
        assert_eq!(*h.recorder.sent.lock().unwrap(), vec!["compressed.pdf"]);
    }
}
