//! Fingerprint collection for a local application.
//!
//! A source path is either a directory, walked as-is, or a zip archive (detected by its
//! signature, whatever the extension), extracted into a private temp directory that lives
//! as long as the returned [`CollectedApp`].

use std::fs::{self, File};
use std::io::{self, Read};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use sha1::{Digest, Sha1};
use tempfile::TempDir;
use walkdir::{DirEntry, WalkDir};

use crate::error::{ApiError, Result};

/// Mode recorded for every file on hosts without a permission model.
pub const DEFAULT_FILE_MODE: u32 = 0o644;

/// Entries never pushed: VCS and OS metadata.
const EXCLUDED_NAMES: &[&str] = &[".git", ".svn", ".hg", "_darcs", ".DS_Store"];

const ZIP_LOCAL_HEADER: [u8; 4] = *b"PK\x03\x04";
const ZIP_EMPTY_ARCHIVE: [u8; 4] = *b"PK\x05\x06";

/// Content- and path-derived identity of one local file.
///
/// Serializes to the resource-match wire shape `{fn, size, sha1, mode}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fingerprint {
    #[serde(rename = "fn")]
    pub relative_path: String,
    pub size: u64,
    #[serde(rename = "sha1")]
    pub digest: String,
    #[serde(with = "octal_mode", default)]
    pub mode: u32,
}

impl Fingerprint {
    /// Identity used for set operations: path plus digest.
    pub fn key(&self) -> (&str, &str) {
        (&self.relative_path, &self.digest)
    }
}

/// Permission bits travel as an octal string, e.g. `"755"`.
mod octal_mode {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(mode: &u32, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&format!("{:o}", mode & 0o777))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u32, D::Error> {
        let raw = Option::<String>::deserialize(deserializer)?;
        match raw {
            Some(s) if !s.is_empty() => {
                u32::from_str_radix(&s, 8).map_err(serde::de::Error::custom)
            }
            _ => Ok(0),
        }
    }
}

/// Result of collecting a source path. Keeps any extraction directory alive until dropped.
#[derive(Debug)]
pub struct CollectedApp {
    /// Absolute path the caller asked for.
    pub source_path: PathBuf,
    /// Directory the fingerprints are relative to.
    pub root: PathBuf,
    pub fingerprints: Vec<Fingerprint>,
    _extracted: Option<TempDir>,
}

impl CollectedApp {
    pub fn total_size(&self) -> u64 {
        self.fingerprints.iter().map(|f| f.size).sum()
    }
}

/// Produces fingerprints for every regular file under `path`.
///
/// Fails with [`ApiError::InvalidSource`] naming the absolute path when the path is missing
/// or is neither a directory nor a zip archive. Performs no network I/O.
pub fn collect(path: &Path) -> Result<CollectedApp> {
    let source_path = std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf());
    let invalid = |reason: String| ApiError::InvalidSource {
        path: source_path.clone(),
        reason,
    };

    let metadata = fs::metadata(&source_path).map_err(|e| {
        tracing::error!(error = ?e, path = %source_path.display(), "Application path is not accessible");
        invalid(e.to_string())
    })?;

    let (root, extracted) = if metadata.is_dir() {
        (source_path.clone(), None)
    } else if metadata.is_file() && is_zip(&source_path).map_err(|e| invalid(e.to_string()))? {
        let dir = extract_zip(&source_path).map_err(|e| {
            tracing::error!(error = %e, path = %source_path.display(), "Failed to extract zip archive");
            invalid(e)
        })?;
        (dir.path().to_path_buf(), Some(dir))
    } else {
        tracing::error!(path = %source_path.display(), "Application path is neither a directory nor a zip archive");
        return Err(invalid("not a directory or zip archive".to_string()));
    };

    let fingerprints = walk(&root).map_err(|e| {
        tracing::error!(error = ?e, root = %root.display(), "Failed to fingerprint application files");
        invalid(e.to_string())
    })?;

    tracing::info!(
        path = %source_path.display(),
        files = fingerprints.len(),
        extracted = extracted.is_some(),
        "Collected application fingerprints"
    );

    Ok(CollectedApp {
        source_path,
        root,
        fingerprints,
        _extracted: extracted,
    })
}

/// Detects a zip archive by its leading signature.
pub fn is_zip(path: &Path) -> io::Result<bool> {
    let mut signature = [0u8; 4];
    let mut file = File::open(path)?;
    match file.read_exact(&mut signature) {
        Ok(()) => Ok(signature == ZIP_LOCAL_HEADER || signature == ZIP_EMPTY_ARCHIVE),
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => Ok(false),
        Err(e) => Err(e),
    }
}

fn extract_zip(path: &Path) -> std::result::Result<TempDir, String> {
    let dir = tempfile::Builder::new()
        .prefix("cfpush-unzipped-app")
        .tempdir()
        .map_err(|e| format!("creating extraction directory: {e}"))?;
    let file = File::open(path).map_err(|e| e.to_string())?;
    let mut archive = zip::ZipArchive::new(file).map_err(|e| e.to_string())?;
    archive.extract(dir.path()).map_err(|e| e.to_string())?;
    tracing::debug!(
        archive = %path.display(),
        into = %dir.path().display(),
        entries = archive.len(),
        "Extracted zip archive"
    );
    Ok(dir)
}

fn is_excluded(entry: &DirEntry) -> bool {
    entry.depth() > 0
        && entry
            .file_name()
            .to_str()
            .map(|name| EXCLUDED_NAMES.contains(&name))
            .unwrap_or(false)
}

fn walk(root: &Path) -> io::Result<Vec<Fingerprint>> {
    let mut fingerprints = Vec::new();
    let walker = WalkDir::new(root)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| !is_excluded(e));

    for entry in walker {
        let entry = entry.map_err(io::Error::other)?;
        if !entry.file_type().is_file() {
            continue;
        }
        let relative = entry
            .path()
            .strip_prefix(root)
            .map_err(io::Error::other)?;
        let metadata = entry.metadata().map_err(io::Error::other)?;
        fingerprints.push(Fingerprint {
            relative_path: to_slash(relative),
            size: metadata.len(),
            digest: sha1_hex(entry.path())?,
            mode: file_mode(&metadata),
        });
    }
    Ok(fingerprints)
}

/// Relative path with forward-slash separators on every host.
fn to_slash(path: &Path) -> String {
    path.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

fn sha1_hex(path: &Path) -> io::Result<String> {
    let mut file = File::open(path)?;
    let mut hasher = Sha1::new();
    let mut buf = [0u8; 64 * 1024];
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(format!("{:x}", hasher.finalize()))
}

#[cfg(unix)]
pub(crate) fn file_mode(metadata: &fs::Metadata) -> u32 {
    use std::os::unix::fs::PermissionsExt;
    metadata.permissions().mode() & 0o777
}

#[cfg(not(unix))]
pub(crate) fn file_mode(_metadata: &fs::Metadata) -> u32 {
    DEFAULT_FILE_MODE
}
