//! Chunked, resumable AI batch processing over an episode's cues.

pub mod partial;
pub mod processor;
pub mod retry;

pub use partial::{parse_partial_list, strip_code_fence, ListShape, PartialParse, Validate};
pub use processor::{
    ApplyOutcome, BatchConfig, BatchJob, BatchProcessor, BatchRunStats, Coverage,
};
pub use retry::RetryPolicy;
