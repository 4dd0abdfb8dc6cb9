//! Stage orchestration for a single episode.

pub mod runner;
pub mod state_machine;

pub use runner::{
    IngestedTranscript, RunOptions, RunReport, StageExecutor, StageHandlers, WorkflowRunner,
};
pub use state_machine::{can_resume, next_step, progress, NextStep, Step, WorkflowInfo};
