//! Per-user conversation state

use crate::storage::StorageArea;
use chrono::{DateTime, Utc};
use pdfdesk_core::{PdfCommand, RotationAngle};
use serde::Serialize;
use std::fmt;
use std::path::PathBuf;
use tracing::debug;

pub type UserId = i64;

/// The operations a user can pick from the menu
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum OperationKind {
    Merge,
    Split,
    Delete,
    Rotate,
    Reorder,
    Compress,
    ExtractText,
    ExtractImages,
    Convert,
}

impl OperationKind {
    pub const ALL: [OperationKind; 9] = [
        Self::Merge,
        Self::Split,
        Self::Delete,
        Self::Rotate,
        Self::Reorder,
        Self::Compress,
        Self::ExtractText,
        Self::ExtractImages,
        Self::Convert,
    ];

    /// Operations that work on a single uploaded PDF
    pub fn needs_document(self) -> bool {
        !matches!(self, Self::Merge | Self::Convert)
    }

    pub fn of_command(command: &PdfCommand) -> Self {
        match command {
            PdfCommand::Merge => Self::Merge,
            PdfCommand::SplitPages { .. } | PdfCommand::SplitChunks { .. } => Self::Split,
            PdfCommand::Delete { .. } => Self::Delete,
            PdfCommand::Rotate { .. } => Self::Rotate,
            PdfCommand::Reorder { .. } => Self::Reorder,
            PdfCommand::Compress { .. } => Self::Compress,
            PdfCommand::ExtractText => Self::ExtractText,
            PdfCommand::ExtractImages => Self::ExtractImages,
            PdfCommand::Rasterize { .. } | PdfCommand::ImagesToPdf => Self::Convert,
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Merge => "merge",
            Self::Split => "split",
            Self::Delete => "delete pages",
            Self::Rotate => "rotate",
            Self::Reorder => "reorder",
            Self::Compress => "compress",
            Self::ExtractText => "extract text",
            Self::ExtractImages => "extract images",
            Self::Convert => "convert",
        };
        f.write_str(name)
    }
}

/// A parameter the orchestrator is waiting for
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    MergeFiles,
    SplitMode,
    SplitPages,
    SplitChunkSize,
    DeletePages,
    RotateAngle,
    RotateScope { angle: RotationAngle },
    ReorderOrder,
    CompressLevel,
    ConvertDirection,
    ImageFiles,
}

impl Step {
    pub fn operation(&self) -> OperationKind {
        match self {
            Self::MergeFiles => OperationKind::Merge,
            Self::SplitMode | Self::SplitPages | Self::SplitChunkSize => OperationKind::Split,
            Self::DeletePages => OperationKind::Delete,
            Self::RotateAngle | Self::RotateScope { .. } => OperationKind::Rotate,
            Self::ReorderOrder => OperationKind::Reorder,
            Self::CompressLevel => OperationKind::Compress,
            Self::ConvertDirection | Self::ImageFiles => OperationKind::Convert,
        }
    }

    /// Steps that pick between variants of an operation rather than collect values
    fn is_choice(&self) -> bool {
        matches!(
            self,
            Self::SplitMode | Self::RotateAngle | Self::CompressLevel | Self::ConvertDirection
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SessionState {
    Idle,
    AwaitingFile(OperationKind),
    Collecting(Step),
    Confirming(PdfCommand),
}

impl SessionState {
    pub fn operation(&self) -> Option<OperationKind> {
        match self {
            Self::Idle => None,
            Self::AwaitingFile(kind) => Some(*kind),
            Self::Collecting(step) => Some(step.operation()),
            Self::Confirming(command) => Some(OperationKind::of_command(command)),
        }
    }
}

/// Coarse lifecycle position, for status reporting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SessionPhase {
    Idle,
    AwaitingFile,
    OperationSelected,
    CollectingParameters,
    Confirming,
    Executing,
}

impl fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::AwaitingFile => "waiting for a file",
            Self::OperationSelected => "operation selected",
            Self::CollectingParameters => "collecting parameters",
            Self::Confirming => "waiting for confirmation",
            Self::Executing => "processing",
        };
        f.write_str(name)
    }
}

/// A user file copied into storage
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadedFile {
    pub path: PathBuf,
    pub name: String,
    pub size: u64,
    /// Set for PDFs
    pub page_count: Option<u32>,
}

#[derive(Debug)]
pub struct Session {
    user: UserId,
    pub(crate) files: Vec<UploadedFile>,
    pub(crate) images: Vec<UploadedFile>,
    pub(crate) state: SessionState,
    pub(crate) artifacts: Vec<PathBuf>,
    pub(crate) executing: bool,
    /// Bumped on every reset so a finishing execution can tell it was cancelled
    pub(crate) generation: u64,
    created_at: DateTime<Utc>,
}

impl Session {
    pub fn new(user: UserId) -> Self {
        Self {
            user,
            files: Vec::new(),
            images: Vec::new(),
            state: SessionState::Idle,
            artifacts: Vec::new(),
            executing: false,
            generation: 0,
            created_at: Utc::now(),
        }
    }

    pub fn user(&self) -> UserId {
        self.user
    }

    pub fn files(&self) -> &[UploadedFile] {
        &self.files
    }

    pub fn images(&self) -> &[UploadedFile] {
        &self.images
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn is_executing(&self) -> bool {
        self.executing
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn phase(&self) -> SessionPhase {
        if self.executing {
            return SessionPhase::Executing;
        }
        match &self.state {
            SessionState::Idle => SessionPhase::Idle,
            SessionState::AwaitingFile(_) => SessionPhase::AwaitingFile,
            SessionState::Collecting(step) if step.is_choice() => SessionPhase::OperationSelected,
            SessionState::Collecting(_) => SessionPhase::CollectingParameters,
            SessionState::Confirming(_) => SessionPhase::Confirming,
        }
    }

    /// The PDF single-document operations work on
    pub fn primary_document(&self) -> Option<&UploadedFile> {
        self.files.first()
    }

    pub(crate) fn primary_page_count(&self) -> Option<u32> {
        self.primary_document().and_then(|file| file.page_count)
    }

    /// True if there is nothing to clear
    pub fn is_pristine(&self) -> bool {
        self.state == SessionState::Idle
            && self.files.is_empty()
            && self.images.is_empty()
            && self.artifacts.is_empty()
    }

    /// Drop the uploaded images and delete their files
    pub(crate) fn clear_images(&mut self, storage: &dyn StorageArea) -> usize {
        self.images
            .drain(..)
            .filter(|file| storage.delete(&file.path))
            .count()
    }

    /// Clear all state and delete every tracked file
    ///
    /// The executing flag is left alone; it belongs to the running execution.
    pub fn reset(&mut self, storage: &dyn StorageArea) -> usize {
        let paths: Vec<PathBuf> = self
            .files
            .drain(..)
            .chain(self.images.drain(..))
            .map(|file| file.path)
            .chain(self.artifacts.drain(..))
            .collect();
        let removed = paths.iter().filter(|path| storage.delete(path)).count();

        self.state = SessionState::Idle;
        self.generation += 1;
        debug!(user = self.user, removed, "Session reset");
        removed
    }
}
