//! Episode persistence.
//!
//! A store loads and saves whole [`EpisodeDocument`]s. `save` must be atomic:
//! after a crash the previous or the new document is on disk, never a mix.

pub mod json;
pub mod memory;

pub use json::JsonFileStore;
pub use memory::MemoryStore;

use crate::episode::{source_hash, Episode, EpisodeDocument, EpisodeId, NewEpisode, Stage};
use crate::error::Result;
use tracing::info;

pub trait Store: Send + Sync {
    /// Load an episode, failing with `EpisodeNotFound` when absent.
    fn load(&self, id: EpisodeId) -> Result<EpisodeDocument>;

    /// Replace the stored document.
    fn save(&self, doc: &EpisodeDocument) -> Result<()>;

    /// Allocate an id and persist a fresh document at [`Stage::Init`].
    fn create(&self, new: NewEpisode) -> Result<EpisodeDocument>;

    /// All stored episodes, ordered by id.
    fn list(&self) -> Result<Vec<Episode>>;

    fn find_by_source(&self, source_url: &str) -> Result<Option<EpisodeDocument>> {
        let hash = source_hash(source_url);
        for episode in self.list()? {
            if episode.source_hash == hash {
                return self.load(episode.id).map(Some);
            }
        }
        Ok(None)
    }
}

/// Return the episode for `new.source_url`, creating it on first ingestion.
///
/// With `force_restart` an existing episode is sent back to [`Stage::Init`].
/// The boolean is true when the episode was newly created.
pub fn create_or_get_episode(
    store: &dyn Store,
    new: NewEpisode,
    force_restart: bool,
) -> Result<(EpisodeDocument, bool)> {
    match store.find_by_source(&new.source_url)? {
        Some(mut doc) => {
            if force_restart && doc.episode.stage != Stage::Init {
                info!(
                    "Force restart: episode {} reset from {} to {}",
                    doc.id(),
                    doc.episode.stage,
                    Stage::Init
                );
                doc.episode.stage = Stage::Init;
                doc.touch();
                store.save(&doc)?;
            }
            Ok((doc, false))
        }
        None => {
            let doc = store.create(new)?;
            info!("Created episode {} ({})", doc.id(), doc.episode.title);
            Ok((doc, true))
        }
    }
}
