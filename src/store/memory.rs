use super::Store;
use crate::episode::{Episode, EpisodeDocument, EpisodeId, NewEpisode};
use crate::error::{PodscribeError, Result};
use std::collections::BTreeMap;
use std::sync::Mutex;

/// In-process store, used by tests and when embedding the engine.
#[derive(Debug, Default)]
pub struct MemoryStore {
    docs: Mutex<BTreeMap<EpisodeId, EpisodeDocument>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, BTreeMap<EpisodeId, EpisodeDocument>>> {
        self.docs
            .lock()
            .map_err(|_| PodscribeError::Store("memory store lock poisoned".to_string()))
    }
}

impl Store for MemoryStore {
    fn load(&self, id: EpisodeId) -> Result<EpisodeDocument> {
        self.lock()?
            .get(&id)
            .cloned()
            .ok_or(PodscribeError::EpisodeNotFound(id))
    }

    fn save(&self, doc: &EpisodeDocument) -> Result<()> {
        self.lock()?.insert(doc.id(), doc.clone());
        Ok(())
    }

    fn create(&self, new: NewEpisode) -> Result<EpisodeDocument> {
        let mut docs = self.lock()?;
        let id = docs.keys().next_back().copied().unwrap_or(0) + 1;
        let doc = EpisodeDocument::new(id, new);
        docs.insert(id, doc.clone());
        Ok(doc)
    }

    fn list(&self) -> Result<Vec<Episode>> {
        Ok(self.lock()?.values().map(|d| d.episode.clone()).collect())
    }
}
