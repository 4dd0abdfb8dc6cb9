//! One pretty-printed JSON file per episode.

use super::Store;
use crate::episode::{Episode, EpisodeDocument, EpisodeId, NewEpisode};
use crate::error::{PodscribeError, Result};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tempfile::NamedTempFile;
use tracing::debug;

const FILE_PREFIX: &str = "episode-";
const FILE_SUFFIX: &str = ".json";

pub struct JsonFileStore {
    dir: PathBuf,
    // Serializes id allocation in `create`.
    create_lock: Mutex<()>,
}

impl JsonFileStore {
    /// Open a store rooted at `dir`, creating the directory if needed.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(Self {
            dir,
            create_lock: Mutex::new(()),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, id: EpisodeId) -> PathBuf {
        self.dir.join(format!("{}{}{}", FILE_PREFIX, id, FILE_SUFFIX))
    }

    fn stored_ids(&self) -> Result<Vec<EpisodeId>> {
        let mut ids = Vec::new();
        for entry in std::fs::read_dir(&self.dir)? {
            let name = entry?.file_name();
            let name = name.to_string_lossy();
            if let Some(id) = name
                .strip_prefix(FILE_PREFIX)
                .and_then(|rest| rest.strip_suffix(FILE_SUFFIX))
                .and_then(|id| id.parse::<EpisodeId>().ok())
            {
                ids.push(id);
            }
        }
        ids.sort_unstable();
        Ok(ids)
    }

    fn write_atomic(&self, path: &Path, doc: &EpisodeDocument) -> Result<()> {
        let body = serde_json::to_vec_pretty(doc)?;
        let mut tmp = NamedTempFile::new_in(&self.dir)?;
        tmp.write_all(&body)?;
        tmp.as_file().sync_all()?;
        tmp.persist(path)
            .map_err(|e| PodscribeError::Store(format!("failed to persist {}: {}", path.display(), e)))?;
        Ok(())
    }
}

impl Store for JsonFileStore {
    fn load(&self, id: EpisodeId) -> Result<EpisodeDocument> {
        let path = self.path_for(id);
        let body = match std::fs::read(&path) {
            Ok(body) => body,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(PodscribeError::EpisodeNotFound(id))
            }
            Err(e) => return Err(e.into()),
        };
        Ok(serde_json::from_slice(&body)?)
    }

    fn save(&self, doc: &EpisodeDocument) -> Result<()> {
        let path = self.path_for(doc.id());
        debug!("Saving episode {} to {}", doc.id(), path.display());
        self.write_atomic(&path, doc)
    }

    fn create(&self, new: NewEpisode) -> Result<EpisodeDocument> {
        let _guard = self
            .create_lock
            .lock()
            .map_err(|_| PodscribeError::Store("store lock poisoned".to_string()))?;
        let id = self.stored_ids()?.last().copied().unwrap_or(0) + 1;
        let doc = EpisodeDocument::new(id, new);
        self.write_atomic(&self.path_for(id), &doc)?;
        Ok(doc)
    }

    fn list(&self) -> Result<Vec<Episode>> {
        self.stored_ids()?
            .into_iter()
            .map(|id| self.load(id).map(|doc| doc.episode))
            .collect()
    }
}
