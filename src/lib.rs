pub mod batch;
pub mod config;
pub mod episode;
pub mod error;
pub mod llm;
pub mod proofread;
pub mod segment;
pub mod store;
pub mod subtitle;
pub mod translate;
pub mod workflow;

pub use batch::{BatchConfig, BatchProcessor, BatchRunStats, RetryPolicy};
pub use config::Config;
pub use episode::{EpisodeDocument, EpisodeId, NewEpisode, Stage};
pub use error::{PodscribeError, Result};
pub use store::{create_or_get_episode, JsonFileStore, MemoryStore, Store};
pub use workflow::{RunOptions, RunReport, WorkflowRunner};
