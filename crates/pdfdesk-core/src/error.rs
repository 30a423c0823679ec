use thiserror::Error;

#[derive(Error, Debug)]
pub enum PdfDeskError {
    #[error("Could not parse input: {0}")]
    Parse(String),

    #[error("Invalid input: {0}")]
    Validation(String),

    #[error("Failed to read PDF: {0}")]
    SourceRead(String),

    #[error("Failed to write output: {0}")]
    Write(String),

    #[error("Not enough input: {0}")]
    EmptyInput(String),

    #[error("Cannot delete all {page_count} pages; at least one page must remain")]
    AllPagesRemoved { page_count: u32 },

    #[error("Failed to render page {page}: {message}")]
    Render { page: u32, message: String },

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
