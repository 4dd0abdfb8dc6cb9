use crate::error::PodscribeError;
use serde::{Deserialize, Serialize};

/// Processing stage of an episode.
///
/// Stages are totally ordered. An episode only moves forward one stage per
/// successful step, or back to [`Stage::Init`] on an explicit force restart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
#[repr(u8)]
pub enum Stage {
    #[default]
    Init = 0,
    Downloaded = 1,
    Transcribed = 2,
    Proofread = 3,
    Segmented = 4,
    Translated = 5,
    ReadyForReview = 6,
    Published = 7,
}

impl Stage {
    pub const ALL: [Stage; 8] = [
        Stage::Init,
        Stage::Downloaded,
        Stage::Transcribed,
        Stage::Proofread,
        Stage::Segmented,
        Stage::Translated,
        Stage::ReadyForReview,
        Stage::Published,
    ];

    /// First stage at which the automated workflow has nothing left to do.
    pub const TERMINAL: Stage = Stage::ReadyForReview;

    pub fn value(self) -> u8 {
        self as u8
    }

    /// The following stage, or `self` once published.
    pub fn next(self) -> Stage {
        match self {
            Stage::Init => Stage::Downloaded,
            Stage::Downloaded => Stage::Transcribed,
            Stage::Transcribed => Stage::Proofread,
            Stage::Proofread => Stage::Segmented,
            Stage::Segmented => Stage::Translated,
            Stage::Translated => Stage::ReadyForReview,
            Stage::ReadyForReview | Stage::Published => Stage::Published,
        }
    }

    pub fn is_terminal(self) -> bool {
        self >= Stage::TERMINAL
    }

    pub fn label(self) -> &'static str {
        match self {
            Stage::Init => "initialized",
            Stage::Downloaded => "downloaded",
            Stage::Transcribed => "transcribed",
            Stage::Proofread => "proofread",
            Stage::Segmented => "segmented",
            Stage::Translated => "translated",
            Stage::ReadyForReview => "ready for review",
            Stage::Published => "published",
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.label())
    }
}

impl TryFrom<u8> for Stage {
    type Error = PodscribeError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Stage::ALL
            .get(value as usize)
            .copied()
            .ok_or(PodscribeError::UnknownStage(value))
    }
}

impl From<Stage> for u8 {
    fn from(stage: Stage) -> Self {
        stage.value()
    }
}
