use std::collections::HashSet;
use std::fs;
use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};

use chrono::Utc;
use soyokaze_common::{Error, Result};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::journal_store::JournalStore;

/// Directory under the config dir that holds copies of attached images.
pub const IMAGES_DIR_NAME: &str = "journal_images";

const DEFAULT_EXTENSION: &str = "jpg";

/// Local copies of journal images. Entries reference the returned paths in
/// their `images` column; files no entry references are orphans.
#[derive(Debug, Clone)]
pub struct ImageStore {
    root: PathBuf,
}

impl ImageStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn in_config_dir(config_dir: &Path) -> Self {
        Self::new(config_dir.join(IMAGES_DIR_NAME))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn init(&self) -> Result<()> {
        fs::create_dir_all(&self.root).map_err(|e| {
            Error::Other(format!(
                "failed to create image directory {}: {e}",
                self.root.display()
            ))
        })
    }

    /// Copy `source` into the store under a fresh name and return the stored
    /// path, ready to be put in a journal entry.
    pub fn save(&self, source: &Path) -> Result<String> {
        if !source.is_file() {
            return Err(Error::NotFound(format!("image {}", source.display())));
        }
        self.init()?;

        let extension = source
            .extension()
            .and_then(|ext| ext.to_str())
            .map(str::to_ascii_lowercase)
            .unwrap_or_else(|| DEFAULT_EXTENSION.to_string());
        let suffix = Uuid::new_v4().simple().to_string();
        let file_name = format!(
            "journal_{}_{}.{extension}",
            Utc::now().timestamp_millis(),
            &suffix[..6]
        );
        let dest = self.root.join(file_name);

        fs::copy(source, &dest).map_err(|e| {
            Error::Other(format!(
                "failed to copy image {} to {}: {e}",
                source.display(),
                dest.display()
            ))
        })?;
        debug!("saved image {} as {}", source.display(), dest.display());
        Ok(dest.to_string_lossy().into_owned())
    }

    /// Save each source, skipping the ones that fail.
    pub fn save_many(&self, sources: &[PathBuf]) -> Vec<String> {
        sources
            .iter()
            .filter_map(|source| match self.save(source) {
                Ok(stored) => Some(stored),
                Err(e) => {
                    warn!("skipping image {}: {e}", source.display());
                    None
                }
            })
            .collect()
    }

    /// Remove a stored image. Deleting an image that is already gone succeeds.
    pub fn delete(&self, uri: &str) -> Result<()> {
        let path = self
            .resolve(uri)
            .ok_or_else(|| Error::Validation(format!("not a stored image: {uri}")))?;
        match fs::remove_file(&path) {
            Ok(()) => {
                debug!("deleted image {}", path.display());
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Error::Other(format!(
                "failed to delete image {}: {e}",
                path.display()
            ))),
        }
    }

    pub fn delete_many(&self, uris: &[String]) {
        for uri in uris {
            if let Err(e) = self.delete(uri) {
                warn!("failed to delete image {uri}: {e}");
            }
        }
    }

    /// Whether `uri` (a plain path or a `file://` URL) names a file inside
    /// the store.
    pub fn is_local(&self, uri: &str) -> bool {
        self.resolve(uri).is_some()
    }

    /// Files currently in the store, sorted. A store that was never
    /// initialized is empty.
    pub fn stored(&self) -> Result<Vec<PathBuf>> {
        let entries = match fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(Error::Other(format!(
                    "failed to list {}: {e}",
                    self.root.display()
                )));
            }
        };

        let mut files = Vec::new();
        for entry in entries {
            let path = entry?.path();
            if path.is_file() {
                files.push(path);
            }
        }
        files.sort();
        Ok(files)
    }

    /// Stored files that no journal entry references.
    pub fn orphans(&self, journal: &JournalStore<'_>) -> Result<Vec<PathBuf>> {
        let referenced: HashSet<PathBuf> = journal
            .list()?
            .into_iter()
            .flat_map(|entry| entry.images)
            .filter_map(|uri| local_path(&uri))
            .collect();

        Ok(self
            .stored()?
            .into_iter()
            .filter(|path| !referenced.contains(path))
            .collect())
    }

    /// Delete every orphan and return the paths that were removed.
    pub fn remove_orphans(&self, journal: &JournalStore<'_>) -> Result<Vec<PathBuf>> {
        let mut removed = Vec::new();
        for path in self.orphans(journal)? {
            match fs::remove_file(&path) {
                Ok(()) => removed.push(path),
                Err(e) => warn!("failed to remove orphaned image {}: {e}", path.display()),
            }
        }
        if !removed.is_empty() {
            info!("removed {} orphaned images", removed.len());
        }
        Ok(removed)
    }

    fn resolve(&self, uri: &str) -> Option<PathBuf> {
        let path = local_path(uri)?;
        if path.components().any(|c| c == Component::ParentDir) {
            return None;
        }
        (path.starts_with(&self.root) && path != self.root).then_some(path)
    }
}

fn local_path(uri: &str) -> Option<PathBuf> {
    match url::Url::parse(uri) {
        Ok(url) if url.scheme() == "file" => url.to_file_path().ok(),
        Ok(_) => None,
        Err(_) => Some(PathBuf::from(uri)),
    }
}
