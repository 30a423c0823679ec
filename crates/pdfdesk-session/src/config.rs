//! Runtime settings
//!
//! Every field has a default, so an empty TOML document is a valid
//! configuration:
//!
//! ```toml
//! temp_dir = "/var/tmp/pdfdesk"
//! max_file_size = 52428800
//! file_retention_secs = 1800
//!
//! [features]
//! compress = false
//! ```

use crate::session::OperationKind;
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Directory holding uploaded files and operation outputs
    #[serde(default = "default_temp_dir")]
    pub temp_dir: PathBuf,
    /// Largest accepted upload in bytes (default: 50 MiB)
    #[serde(default = "default_max_file_size")]
    pub max_file_size: u64,
    /// Stored files older than this are removed by the sweep (default: 30 minutes)
    #[serde(default = "default_file_retention_secs")]
    pub file_retention_secs: u64,
    /// How often the sweep runs (default: 1 hour)
    #[serde(default = "default_cleanup_interval_secs")]
    pub cleanup_interval_secs: u64,
    /// Largest accepted page count for an uploaded PDF
    #[serde(default = "default_max_pdf_pages")]
    pub max_pdf_pages: u32,
    /// Resolution used when converting pages to images
    #[serde(default = "default_image_dpi")]
    pub image_dpi: u32,
    /// Outputs delivered one by one before a ZIP bundle is added
    #[serde(default = "default_delivery_batch_limit")]
    pub delivery_batch_limit: usize,
    /// Extracted text longer than this is sent as a .txt file
    #[serde(default = "default_text_preview_chars")]
    pub text_preview_chars: usize,
    #[serde(default)]
    pub features: FeatureFlags,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            temp_dir: default_temp_dir(),
            max_file_size: default_max_file_size(),
            file_retention_secs: default_file_retention_secs(),
            cleanup_interval_secs: default_cleanup_interval_secs(),
            max_pdf_pages: default_max_pdf_pages(),
            image_dpi: default_image_dpi(),
            delivery_batch_limit: default_delivery_batch_limit(),
            text_preview_chars: default_text_preview_chars(),
            features: FeatureFlags::default(),
        }
    }
}

impl Settings {
    /// Load settings from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        Self::from_str(&content)
    }

    /// Parse settings from a TOML string
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> anyhow::Result<Self> {
        let settings: Self = toml::from_str(s).context("Failed to parse TOML configuration")?;
        settings.validate()?;
        Ok(settings)
    }

    fn validate(&self) -> anyhow::Result<()> {
        if !pdfdesk_core::convert::DPI_RANGE.contains(&self.image_dpi) {
            anyhow::bail!(
                "image_dpi must be between {} and {}",
                pdfdesk_core::convert::DPI_RANGE.start(),
                pdfdesk_core::convert::DPI_RANGE.end()
            );
        }
        if self.delivery_batch_limit == 0 {
            anyhow::bail!("delivery_batch_limit must be at least 1");
        }
        if self.max_pdf_pages == 0 {
            anyhow::bail!("max_pdf_pages must be at least 1");
        }
        Ok(())
    }

    pub fn file_retention(&self) -> Duration {
        Duration::from_secs(self.file_retention_secs)
    }

    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.cleanup_interval_secs.max(1))
    }
}

fn default_temp_dir() -> PathBuf {
    std::env::temp_dir().join("pdfdesk")
}

fn default_max_file_size() -> u64 {
    50 * 1024 * 1024
}

fn default_file_retention_secs() -> u64 {
    1800
}

fn default_cleanup_interval_secs() -> u64 {
    3600
}

fn default_max_pdf_pages() -> u32 {
    1000
}

fn default_image_dpi() -> u32 {
    200
}

fn default_delivery_batch_limit() -> usize {
    10
}

fn default_text_preview_chars() -> usize {
    4000
}

fn enabled() -> bool {
    true
}

/// Per-operation switches; everything is enabled unless turned off
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeatureFlags {
    #[serde(default = "enabled")]
    pub merge: bool,
    #[serde(default = "enabled")]
    pub split: bool,
    #[serde(default = "enabled")]
    pub delete_pages: bool,
    #[serde(default = "enabled")]
    pub rotate: bool,
    #[serde(default = "enabled")]
    pub reorder: bool,
    #[serde(default = "enabled")]
    pub compress: bool,
    #[serde(default = "enabled")]
    pub extract_text: bool,
    #[serde(default = "enabled")]
    pub extract_images: bool,
    #[serde(default = "enabled")]
    pub convert: bool,
}

impl Default for FeatureFlags {
    fn default() -> Self {
        Self {
            merge: true,
            split: true,
            delete_pages: true,
            rotate: true,
            reorder: true,
            compress: true,
            extract_text: true,
            extract_images: true,
            convert: true,
        }
    }
}

impl FeatureFlags {
    pub fn is_enabled(&self, kind: OperationKind) -> bool {
        match kind {
            OperationKind::Merge => self.merge,
            OperationKind::Split => self.split,
            OperationKind::Delete => self.delete_pages,
            OperationKind::Rotate => self.rotate,
            OperationKind::Reorder => self.reorder,
            OperationKind::Compress => self.compress,
            OperationKind::ExtractText => self.extract_text,
            OperationKind::ExtractImages => self.extract_images,
            OperationKind::Convert => self.convert,
        }
    }
}
