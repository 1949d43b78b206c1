pub mod naming;

use std::ffi::OsStr;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use tracing::{info, warn};

pub use self::naming::{derive_mime_type, sanitize_filename, unique_name};

/// On-disk attachment storage.
///
/// Each post owns a directory `{root}/{post_id}`; its files are named
/// `<token>_<sanitized original name>`.
#[derive(Debug, Clone)]
pub struct FileStore {
    root: PathBuf,
}

/// A file written through [`StagedFiles::write`].
#[derive(Debug, Clone)]
pub struct StoredFile {
    pub stored_name: String,
    pub size: u64,
}

impl FileStore {
    pub fn open(root: PathBuf) -> io::Result<Self> {
        fs::create_dir_all(&root)?;
        info!("Uploads directory: {}", root.display());
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn post_dir(&self, post_id: i64) -> PathBuf {
        self.root.join(post_id.to_string())
    }

    /// Begin writing files for `post_id`. Nothing written through the
    /// returned guard survives unless [`StagedFiles::commit`] is called.
    pub fn stage(&self, post_id: i64) -> StagedFiles {
        StagedFiles {
            dir: self.post_dir(post_id),
            created_dir: false,
            written: Vec::new(),
            committed: false,
        }
    }

    /// Path of a recorded stored name, if it is a regular file.
    pub async fn resolve(&self, post_id: i64, stored_name: &str) -> Option<PathBuf> {
        // Stored names are generated server-side, but never trust a path
        // component read back from the database.
        if Path::new(stored_name).file_name() != Some(OsStr::new(stored_name)) {
            return None;
        }
        let path = self.post_dir(post_id).join(stored_name);
        match tokio::fs::metadata(&path).await {
            Ok(meta) if meta.is_file() => Some(path),
            _ => None,
        }
    }

    /// Scan a post directory for a file whose name is the sanitized original
    /// name, or ends with `_<sanitized>`. Used for rows without a stored name.
    pub async fn find_by_original_name(
        &self,
        post_id: i64,
        original_name: &str,
    ) -> io::Result<Option<PathBuf>> {
        let dir = self.post_dir(post_id);
        let sanitized = sanitize_filename(original_name);

        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e),
        };

        while let Some(entry) = entries.next_entry().await? {
            let Some(name) = entry.file_name().to_str().map(str::to_string) else {
                continue;
            };
            if naming::matches_stored_name(&name, &sanitized) {
                let meta = entry.metadata().await?;
                return Ok(meta.is_file().then(|| entry.path()));
            }
        }

        Ok(None)
    }
}

/// Scoped set of files written for one upload.
///
/// Dropping the guard without committing removes every file it wrote, and the
/// post directory too if the guard created it.
#[derive(Debug)]
pub struct StagedFiles {
    dir: PathBuf,
    created_dir: bool,
    written: Vec<PathBuf>,
    committed: bool,
}

impl StagedFiles {
    pub fn write(&mut self, sanitized_name: &str, bytes: &[u8]) -> io::Result<StoredFile> {
        if !self.dir.exists() {
            fs::create_dir_all(&self.dir)?;
            self.created_dir = true;
        }

        let stored_name = unique_name(sanitized_name);
        let path = self.dir.join(&stored_name);
        let mut file = fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)?;
        self.written.push(path);
        file.write_all(bytes)?;
        file.sync_all()?;

        Ok(StoredFile {
            stored_name,
            size: bytes.len() as u64,
        })
    }

    /// Keep the written files. Call only after the database commit.
    pub fn commit(mut self) {
        self.committed = true;
    }
}

impl Drop for StagedFiles {
    fn drop(&mut self) {
        if self.committed || (self.written.is_empty() && !self.created_dir) {
            return;
        }

        warn!(
            "Discarding {} staged file(s) in {}",
            self.written.len(),
            self.dir.display()
        );
        for path in &self.written {
            if let Err(e) = fs::remove_file(path) {
                if e.kind() != io::ErrorKind::NotFound {
                    warn!("Failed to remove {}: {}", path.display(), e);
                }
            }
        }
        if self.created_dir {
            if let Err(e) = fs::remove_dir(&self.dir) {
                warn!("Failed to remove {}: {}", self.dir.display(), e);
            }
        }
    }
}
