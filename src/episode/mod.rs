pub mod record;
pub mod stage;

pub use record::{Correction, RecordStatus, Translation};
pub use stage::Stage;

use crate::error::{PodscribeError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

pub type EpisodeId = u64;
pub type CueId = u64;

/// A long-form audio item moving through the workflow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Episode {
    pub id: EpisodeId,
    pub title: String,
    pub source_url: String,
    pub source_hash: String,
    /// Audio duration in seconds, 0 when unknown.
    pub duration: f64,
    pub stage: Stage,
    pub audio_path: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One timestamped subtitle line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cue {
    pub id: CueId,
    pub start_time: f64,
    pub end_time: f64,
    pub text: String,
    pub speaker: Option<String>,
    pub corrected_text: Option<String>,
    /// Set once proofreading has looked at this cue.
    #[serde(default)]
    pub proofread: bool,
    /// Index of the chapter this cue belongs to.
    pub chapter: Option<u32>,
}

impl Cue {
    /// Corrected text when a correction exists, the transcribed text otherwise.
    pub fn effective_text(&self) -> &str {
        self.corrected_text.as_deref().unwrap_or(&self.text)
    }

    pub fn duration(&self) -> f64 {
        self.end_time - self.start_time
    }
}

/// A time range of an episode, `[start_time, end_time)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chapter {
    pub index: u32,
    pub title: String,
    pub summary: String,
    pub start_time: f64,
    pub end_time: f64,
    pub model: Option<String>,
}

impl Chapter {
    pub fn duration(&self) -> f64 {
        self.end_time - self.start_time
    }
}

/// Fields needed to register a new episode.
#[derive(Debug, Clone, Default)]
pub struct NewEpisode {
    pub title: String,
    pub source_url: String,
    pub duration: f64,
}

/// An episode together with everything hanging off it.
///
/// This is the unit of persistence: stores load and save whole documents.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpisodeDocument {
    pub episode: Episode,
    #[serde(default)]
    pub cues: Vec<Cue>,
    #[serde(default)]
    pub chapters: Vec<Chapter>,
    #[serde(default)]
    pub translations: Vec<Translation>,
    #[serde(default)]
    pub corrections: Vec<Correction>,
}

impl EpisodeDocument {
    pub fn new(id: EpisodeId, new: NewEpisode) -> Self {
        let now = Utc::now();
        Self {
            episode: Episode {
                id,
                title: new.title,
                source_hash: source_hash(&new.source_url),
                source_url: new.source_url,
                duration: new.duration,
                stage: Stage::Init,
                audio_path: None,
                created_at: now,
                updated_at: now,
            },
            cues: Vec::new(),
            chapters: Vec::new(),
            translations: Vec::new(),
            corrections: Vec::new(),
        }
    }

    pub fn id(&self) -> EpisodeId {
        self.episode.id
    }

    /// Append a cue; ids are assigned in insertion order.
    pub fn add_cue(
        &mut self,
        start_time: f64,
        end_time: f64,
        text: impl Into<String>,
        speaker: Option<String>,
    ) -> Result<CueId> {
        if !(start_time >= 0.0 && start_time < end_time) {
            return Err(PodscribeError::Subtitle(format!(
                "invalid cue range {:.3}-{:.3}",
                start_time, end_time
            )));
        }
        let id = self.cues.iter().map(|c| c.id).max().unwrap_or(0) + 1;
        self.cues.push(Cue {
            id,
            start_time,
            end_time,
            text: text.into(),
            speaker,
            corrected_text: None,
            proofread: false,
            chapter: None,
        });
        Ok(id)
    }

    /// Positions into `cues` ordered by start time, ties kept in insertion order.
    pub fn ordered_cue_positions(&self) -> Vec<usize> {
        let mut positions: Vec<usize> = (0..self.cues.len()).collect();
        positions.sort_by(|&a, &b| self.cues[a].start_time.total_cmp(&self.cues[b].start_time));
        positions
    }

    pub fn ordered_cues(&self) -> Vec<&Cue> {
        self.ordered_cue_positions()
            .into_iter()
            .map(|i| &self.cues[i])
            .collect()
    }

    pub fn cue(&self, id: CueId) -> Option<&Cue> {
        self.cues.iter().find(|c| c.id == id)
    }

    pub fn cue_mut(&mut self, id: CueId) -> Option<&mut Cue> {
        self.cues.iter_mut().find(|c| c.id == id)
    }

    pub fn translation(&self, cue_id: CueId, language: &str) -> Option<&Translation> {
        self.translations
            .iter()
            .find(|t| t.cue_id == cue_id && t.language == language)
    }

    pub fn translation_mut(&mut self, cue_id: CueId, language: &str) -> Option<&mut Translation> {
        self.translations
            .iter_mut()
            .find(|t| t.cue_id == cue_id && t.language == language)
    }

    /// Completed translation text for a cue.
    pub fn translated_text(&self, cue_id: CueId, language: &str) -> Option<&str> {
        self.translation(cue_id, language)
            .filter(|t| t.status.is_completed())
            .and_then(|t| t.translation.as_deref())
    }

    pub fn correction(&self, cue_id: CueId) -> Option<&Correction> {
        self.corrections.iter().find(|c| c.cue_id == cue_id)
    }

    pub fn correction_mut(&mut self, cue_id: CueId) -> Option<&mut Correction> {
        self.corrections.iter_mut().find(|c| c.cue_id == cue_id)
    }

    /// Count of cues with a completed translation, and total cues.
    pub fn translation_progress(&self, language: &str) -> (usize, usize) {
        let done = self
            .cues
            .iter()
            .filter(|c| self.translated_text(c.id, language).is_some())
            .count();
        (done, self.cues.len())
    }

    /// Episode duration, falling back to the last cue end when unknown.
    pub fn total_duration(&self) -> f64 {
        if self.episode.duration > 0.0 {
            return self.episode.duration;
        }
        self.cues.iter().map(|c| c.end_time).fold(0.0, f64::max)
    }

    /// Drop all chapters and every cue's chapter reference.
    pub fn clear_chapters(&mut self) {
        self.chapters.clear();
        for cue in &mut self.cues {
            cue.chapter = None;
        }
    }

    pub fn touch(&mut self) {
        self.episode.updated_at = Utc::now();
    }
}

/// Stable dedupe key for a source url.
pub fn source_hash(source_url: &str) -> String {
    let digest = Sha256::digest(source_url.trim().as_bytes());
    digest.iter().map(|b| format!("{:02x}", b)).collect()
}
