//! Conversational sessions over pdfdesk-core
//!
//! Each user gets an in-memory [`Session`] that walks through choosing an
//! operation, collecting its parameters and confirming it. The
//! [`Orchestrator`] owns the transitions, runs confirmed commands and hands
//! the outputs to a [`Delivery`] implementation. Files live in a
//! [`StorageArea`] and are removed on reset or by the retention sweep.

pub mod config;
pub mod error;
mod execute;
pub mod orchestrator;
pub mod session;
pub mod storage;
pub mod store;

pub use config::{FeatureFlags, Settings};
pub use error::SessionError;
pub use execute::Artifact;
pub use orchestrator::{Delivery, Event, Orchestrator, Outcome, Reply};
pub use session::{
    OperationKind, Session, SessionPhase, SessionState, Step, UploadedFile, UserId,
};
pub use storage::{
    format_file_size, is_image_file, is_pdf_file, sanitize_filename, DiskStorage, StorageArea,
    StorageUsage, StoredFile,
};
pub use store::{InMemorySessionStore, SessionHandle, SessionStore};
