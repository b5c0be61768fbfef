//! Delta archive packaging.

use std::fs::File;
use std::io::{self, Seek};
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::error::{ApiError, Result};
use crate::fingerprint::Fingerprint;

/// A zip archive on disk, exclusively owned by one upload attempt. Deleted on drop.
#[derive(Debug)]
pub struct PackagedArchive {
    file: NamedTempFile,
    pub size: u64,
    pub file_count: u64,
}

impl PackagedArchive {
    pub fn path(&self) -> &Path {
        self.file.path()
    }

    pub fn to_path_buf(&self) -> PathBuf {
        self.file.path().to_path_buf()
    }
}

/// Writes every file in `files`, read from under `root`, into a fresh zip archive.
///
/// Entry names equal the fingerprint paths; each entry stores the fingerprint's permission
/// bits. A file that disappeared or became unreadable since collection fails the whole
/// packaging step.
pub fn package(root: &Path, files: &[Fingerprint]) -> Result<PackagedArchive> {
    let temp = tempfile::Builder::new()
        .prefix("cfpush-upload")
        .suffix(".zip")
        .tempfile()
        .map_err(|e| ApiError::Packaging(format!("creating archive file: {e}")))?;

    let handle = temp
        .reopen()
        .map_err(|e| ApiError::Packaging(format!("opening archive file: {e}")))?;
    let mut writer = ZipWriter::new(handle);

    for fingerprint in files {
        add_entry(&mut writer, root, fingerprint).map_err(|e| {
            tracing::error!(
                error = %e,
                file = %fingerprint.relative_path,
                "Failed to add file to archive"
            );
            ApiError::Packaging(format!("{}: {e}", fingerprint.relative_path))
        })?;
    }

    let mut handle = writer
        .finish()
        .map_err(|e| ApiError::Packaging(format!("finishing archive: {e}")))?;
    let size = handle
        .seek(io::SeekFrom::End(0))
        .map_err(|e| ApiError::Packaging(format!("sizing archive: {e}")))?;

    tracing::info!(
        files = files.len(),
        bytes = size,
        archive = %temp.path().display(),
        "Packaged application archive"
    );

    Ok(PackagedArchive {
        file: temp,
        size,
        file_count: files.len() as u64,
    })
}

fn add_entry(
    writer: &mut ZipWriter<File>,
    root: &Path,
    fingerprint: &Fingerprint,
) -> std::result::Result<(), String> {
    let source = root.join(&fingerprint.relative_path);
    let mut input = File::open(&source).map_err(|e| e.to_string())?;
    let options = SimpleFileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .unix_permissions(fingerprint.mode & 0o777);
    writer
        .start_file(fingerprint.relative_path.as_str(), options)
        .map_err(|e| e.to_string())?;
    io::copy(&mut input, writer).map_err(|e| e.to_string())?;
    Ok(())
}
