use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::fs::{self, File, OpenOptions};

/// Highest numeric suffix tried before giving up on a destination name.
pub const MAX_SUFFIX: u32 = 9999;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("invalid file name: {0:?}")]
    InvalidName(String),
    #[error("no free destination name for {0} (tried _1.._9999)")]
    NameExhausted(PathBuf),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Directory that received files are written into.
///
/// Existing files are never overwritten: a clashing name gets a `_N` suffix
/// before its extension.
#[derive(Debug, Clone)]
pub struct OutputDir {
    root: PathBuf,
}

impl OutputDir {
    /// Open `root`, creating it and any missing parents.
    pub async fn create(root: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let root = root.into();
        fs::create_dir_all(&root).await?;
        Ok(Self { root })
    }

    pub fn path(&self) -> &Path {
        &self.root
    }

    /// Create a new file for `name`, picking the first free suffix.
    ///
    /// The file is opened with `create_new`, so a name taken between the
    /// check and the open moves on to the next suffix. The returned
    /// [`PendingFile`] deletes it again unless [`kept`](PendingFile::keep).
    pub async fn create_unique(&self, name: &str) -> Result<(PendingFile, File), StorageError> {
        let name = sanitize_name(name)?;
        for candidate in candidates(&self.root, &name) {
            match OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&candidate)
                .await
            {
                Ok(file) => {
                    tracing::debug!("Created destination {}", candidate.display());
                    return Ok((PendingFile::new(candidate), file));
                }
                Err(e) if e.kind() == ErrorKind::AlreadyExists => continue,
                Err(e) => return Err(e.into()),
            }
        }
        Err(StorageError::NameExhausted(self.root.join(name)))
    }
}

/// A destination file that is not trusted yet.
///
/// Dropping it removes the file, so a cancelled or failed receive leaves
/// nothing behind. Call [`keep`](Self::keep) once the contents are verified.
#[derive(Debug)]
pub struct PendingFile {
    path: PathBuf,
    armed: bool,
}

impl PendingFile {
    fn new(path: PathBuf) -> Self {
        Self { path, armed: true }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Disarm the guard and hand back the final path.
    pub fn keep(mut self) -> PathBuf {
        self.armed = false;
        std::mem::take(&mut self.path)
    }

    /// Remove the file now. A missing file is not an error.
    pub async fn discard(mut self) -> Result<(), StorageError> {
        self.armed = false;
        match fs::remove_file(&self.path).await {
            Ok(()) => {
                tracing::debug!("Discarded {}", self.path.display());
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

impl Drop for PendingFile {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        match std::fs::remove_file(&self.path) {
            Ok(()) => tracing::debug!("Removed unverified {}", self.path.display()),
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => tracing::warn!("Could not remove {}: {}", self.path.display(), e),
        }
    }
}

/// Reduce a peer-supplied name to a bare file name.
///
/// Only the last path component survives, with either separator style.
pub fn sanitize_name(name: &str) -> Result<String, StorageError> {
    let last = name.rsplit(['/', '\\']).next().unwrap_or("").trim();
    if last.is_empty() || last == "." || last == ".." || last.contains('\0') {
        return Err(StorageError::InvalidName(name.to_string()));
    }
    Ok(last.to_string())
}

/// `name`, then `stem_1.ext` through `stem_9999.ext`.
fn candidates<'a>(root: &'a Path, name: &'a str) -> impl Iterator<Item = PathBuf> + 'a {
    let path = Path::new(name);
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| name.to_string());
    let ext = path
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy()))
        .unwrap_or_default();

    std::iter::once(root.join(name)).chain(
        (1..=MAX_SUFFIX).map(move |i| root.join(format!("{stem}_{i}{ext}"))),
    )
}
