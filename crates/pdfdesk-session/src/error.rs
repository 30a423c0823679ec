use crate::session::OperationKind;
use pdfdesk_core::PdfDeskError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Please upload a PDF file first")]
    NoDocument,

    #[error("The {0} operation is already in progress. Finish it or send /cancel first")]
    OperationInProgress(OperationKind),

    #[error("{0}")]
    UnexpectedInput(String),

    #[error("Your previous request is still being processed, please wait")]
    Busy,

    #[error("File is too large ({size}). The maximum size is {limit}")]
    FileTooLarge { size: String, limit: String },

    #[error("Unsupported file: {0}")]
    UnsupportedFile(String),

    #[error("The {0} operation is currently disabled")]
    FeatureDisabled(OperationKind),

    #[error("Converting pages to images is not available on this server")]
    RendererUnavailable,

    #[error("Storage error: {0}")]
    Storage(String),

    #[error(transparent)]
    Pdf(#[from] PdfDeskError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
