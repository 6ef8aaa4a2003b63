//! Directory sources are zipped into a scratch directory before sending.

use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use walkdir::WalkDir;
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::{Result, TransferError};

/// The file actually streamed for a send request.
///
/// For a directory this is a deflate archive in a temporary directory that
/// is removed when the value is dropped, whatever the transfer outcome.
#[derive(Debug)]
pub struct PreparedSource {
    path: PathBuf,
    name: String,
    size: u64,
    scratch: Option<TempDir>,
}

impl PreparedSource {
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Name announced to the receiver.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn is_archive(&self) -> bool {
        self.scratch.is_some()
    }
}

/// Resolve `path` to something streamable, archiving directories.
pub async fn prepare_source(path: &Path) -> Result<PreparedSource> {
    let meta = match tokio::fs::metadata(path).await {
        Ok(meta) => meta,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            return Err(TransferError::NotFound(path.to_path_buf()))
        }
        Err(e) => return Err(e.into()),
    };

    if meta.is_dir() {
        let dir = path.to_path_buf();
        return tokio::task::spawn_blocking(move || archive_to_scratch(&dir))
            .await
            .map_err(|e| TransferError::Archive(e.to_string()))?;
    }

    if !meta.is_file() {
        return Err(TransferError::NotFound(path.to_path_buf()));
    }

    Ok(PreparedSource {
        path: path.to_path_buf(),
        name: display_name(path),
        size: meta.len(),
        scratch: None,
    })
}

fn archive_to_scratch(dir: &Path) -> Result<PreparedSource> {
    let scratch = tempfile::Builder::new().prefix("pinshare-").tempdir()?;
    let name = format!("{}.zip", display_name(dir));
    let path = scratch.path().join(&name);

    tracing::info!("Archiving directory {}", dir.display());
    let size = archive_dir(dir, &path)?;
    tracing::info!("Archive ready: {} ({} bytes)", name, size);

    Ok(PreparedSource {
        path,
        name,
        size,
        scratch: Some(scratch),
    })
}

/// Write a deflate zip of everything under `src` to `dest`; returns its size.
///
/// Entry names are relative to `src`. Symlinks are skipped.
pub fn archive_dir(src: &Path, dest: &Path) -> Result<u64> {
    let mut zip = ZipWriter::new(File::create(dest)?);
    let options = FileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .unix_permissions(0o755);

    for entry in WalkDir::new(src).min_depth(1).sort_by_file_name() {
        let entry = entry?;
        let rel = entry
            .path()
            .strip_prefix(src)
            .map_err(|e| TransferError::Archive(e.to_string()))?;
        let name = entry_name(rel);

        if entry.file_type().is_dir() {
            zip.add_directory(name, options)?;
        } else if entry.file_type().is_file() {
            tracing::debug!("Adding {}", name);
            zip.start_file(name, options)?;
            let mut f = File::open(entry.path())?;
            io::copy(&mut f, &mut zip)?;
        } else {
            tracing::warn!("Skipping {} (not a regular file)", entry.path().display());
        }
    }

    let file = zip.finish()?;
    Ok(file.metadata()?.len())
}

/// Zip entry names always use `/`.
fn entry_name(rel: &Path) -> String {
    rel.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

/// Last path component, falling back to the canonical path's for `.` and
/// friends.
fn display_name(path: &Path) -> String {
    let named = path.file_name().map(|n| n.to_os_string()).or_else(|| {
        std::fs::canonicalize(path)
            .ok()
            .and_then(|p| p.file_name().map(|n| n.to_os_string()))
    });
    match named {
        Some(n) => n.to_string_lossy().into_owned(),
        None => "archive".to_string(),
    }
}
