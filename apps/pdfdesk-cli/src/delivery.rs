//! Delivery into a local output directory

use pdfdesk_session::{Delivery, UserId};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::info;

/// Copies each delivered file into `output_dir` and announces it on stdout
#[derive(Debug)]
pub struct ConsoleDelivery {
    output_dir: PathBuf,
}

impl ConsoleDelivery {
    pub fn new(output_dir: impl Into<PathBuf>) -> io::Result<Self> {
        let output_dir = output_dir.into();
        fs::create_dir_all(&output_dir)?;
        Ok(Self { output_dir })
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }
}

impl Delivery for ConsoleDelivery {
    fn send_file(
        &self,
        user: UserId,
        path: &Path,
        filename: &str,
        caption: Option<&str>,
    ) -> io::Result<()> {
        let dest = self.output_dir.join(filename);
        let size = fs::copy(path, &dest)?;
        info!(user, dest = %dest.display(), size, "Delivered file");
        match caption {
            Some(caption) => println!("[file] {} ({})", dest.display(), caption),
            None => println!("[file] {}", dest.display()),
        }
        Ok(())
    }
}
