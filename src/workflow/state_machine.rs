//! Which step an episode needs next, and how far along it is.

use crate::episode::{Episode, EpisodeId, Stage};

/// A unit of work that moves an episode forward by one stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Step {
    Download,
    Transcribe,
    Proofread,
    Segment,
    Translate,
    GenerateDocument,
}

impl Step {
    pub const ALL: [Step; 6] = [
        Step::Download,
        Step::Transcribe,
        Step::Proofread,
        Step::Segment,
        Step::Translate,
        Step::GenerateDocument,
    ];

    /// The step that runs from `stage`, or `None` once the workflow is done.
    pub fn from_stage(stage: Stage) -> Option<Step> {
        match stage {
            Stage::Init => Some(Step::Download),
            Stage::Downloaded => Some(Step::Transcribe),
            Stage::Transcribed => Some(Step::Proofread),
            Stage::Proofread => Some(Step::Segment),
            Stage::Segmented => Some(Step::Translate),
            Stage::Translated => Some(Step::GenerateDocument),
            Stage::ReadyForReview | Stage::Published => None,
        }
    }

    /// Stage an episode must be at for this step to run.
    pub fn entry_stage(self) -> Stage {
        match self {
            Step::Download => Stage::Init,
            Step::Transcribe => Stage::Downloaded,
            Step::Proofread => Stage::Transcribed,
            Step::Segment => Stage::Proofread,
            Step::Translate => Stage::Segmented,
            Step::GenerateDocument => Stage::Translated,
        }
    }

    /// Stage reached when the step succeeds.
    pub fn exit_stage(self) -> Stage {
        self.entry_stage().next()
    }

    pub fn label(self) -> &'static str {
        match self {
            Step::Download => "download",
            Step::Transcribe => "transcribe",
            Step::Proofread => "proofread",
            Step::Segment => "segment",
            Step::Translate => "translate",
            Step::GenerateDocument => "generate document",
        }
    }
}

impl std::fmt::Display for Step {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.label())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NextStep {
    Run(Step),
    Done,
}

pub fn next_step(episode: &Episode) -> NextStep {
    match Step::from_stage(episode.stage) {
        Some(step) => NextStep::Run(step),
        None => NextStep::Done,
    }
}

/// Whether a run would pick up partway, with a reason for the operator.
pub fn can_resume(episode: &Episode) -> (bool, String) {
    match (episode.stage, next_step(episode)) {
        (Stage::Init, _) => (false, "not started yet; a run starts from the beginning".to_string()),
        (_, NextStep::Done) => (false, format!("already {}", episode.stage)),
        (stage, NextStep::Run(step)) => (
            true,
            format!("currently {}, resumes at step '{}'", stage, step),
        ),
    }
}

/// Snapshot of an episode's progress through the steps.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkflowInfo {
    pub episode_id: EpisodeId,
    pub stage: Stage,
    pub completed: Vec<&'static str>,
    pub remaining: Vec<&'static str>,
    pub percent: f64,
}

impl std::fmt::Display for WorkflowInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Episode {}: {} ({:.0}%)", self.episode_id, self.stage, self.percent)?;
        for label in &self.completed {
            writeln!(f, "  [x] {}", label)?;
        }
        for label in &self.remaining {
            writeln!(f, "  [ ] {}", label)?;
        }
        Ok(())
    }
}

pub fn progress(episode: &Episode) -> WorkflowInfo {
    let (completed, remaining): (Vec<Step>, Vec<Step>) = Step::ALL
        .iter()
        .partition(|step| step.entry_stage() < episode.stage);

    let percent = if episode.stage.is_terminal() {
        100.0
    } else {
        completed.len() as f64 / Step::ALL.len() as f64 * 100.0
    };

    WorkflowInfo {
        episode_id: episode.id,
        stage: episode.stage,
        completed: completed.iter().map(|s| s.label()).collect(),
        remaining: remaining.iter().map(|s| s.label()).collect(),
        percent,
    }
}
