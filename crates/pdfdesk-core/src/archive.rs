//! ZIP bundling of operation outputs

use crate::error::PdfDeskError;
use std::fs::File;
use std::io::{self, BufReader, Seek, Write};
use std::path::Path;
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipWriter};

/// Write `files` (entry name, source path) into a deflate ZIP archive at `dest`
///
/// Returns the archive size in bytes.
pub fn write_zip<N, P>(dest: &Path, files: &[(N, P)]) -> Result<u64, PdfDeskError>
where
    N: AsRef<str>,
    P: AsRef<Path>,
{
    if files.is_empty() {
        return Err(PdfDeskError::EmptyInput("Nothing to archive".into()));
    }

    let file = File::create(dest)
        .map_err(|e| PdfDeskError::Write(format!("Cannot create {}: {}", dest.display(), e)))?;
    let mut file = write_entries(file, files)?;
    file.flush()?;
    Ok(file.stream_position()?)
}

fn write_entries<W, N, P>(writer: W, files: &[(N, P)]) -> Result<W, PdfDeskError>
where
    W: Write + Seek,
    N: AsRef<str>,
    P: AsRef<Path>,
{
    let mut zip = ZipWriter::new(writer);
    let options = FileOptions::default().compression_method(CompressionMethod::Deflated);

    for (name, path) in files {
        zip.start_file(name.as_ref(), options).map_err(zip_error)?;
        let mut source = BufReader::new(File::open(path.as_ref())?);
        io::copy(&mut source, &mut zip)?;
    }

    zip.finish().map_err(zip_error)
}

fn zip_error(e: zip::result::ZipError) -> PdfDeskError {
    PdfDeskError::Write(format!("ZIP archive: {}", e))
}
