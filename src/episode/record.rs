//! Derived records: AI output attached to a cue that a reviewer may edit later.
//!
//! Every record keeps the first AI value next to the current value so edits
//! can be told apart from generated text.

use super::CueId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordStatus {
    #[default]
    Pending,
    Processing,
    Completed,
    Failed,
}

impl RecordStatus {
    pub fn is_completed(self) -> bool {
        self == RecordStatus::Completed
    }
}

impl std::fmt::Display for RecordStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RecordStatus::Pending => write!(f, "pending"),
            RecordStatus::Processing => write!(f, "processing"),
            RecordStatus::Completed => write!(f, "completed"),
            RecordStatus::Failed => write!(f, "failed"),
        }
    }
}

/// Translation of one cue into one language.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Translation {
    pub cue_id: CueId,
    pub language: String,
    /// First AI output; never changed once set.
    pub original_translation: Option<String>,
    /// Active text, possibly edited by a reviewer.
    pub translation: Option<String>,
    pub is_edited: bool,
    pub status: RecordStatus,
    pub error: Option<String>,
    pub retry_count: u32,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Translation {
    pub fn completed(cue_id: CueId, language: &str, text: &str) -> Self {
        Self {
            cue_id,
            language: language.to_string(),
            original_translation: Some(text.to_string()),
            translation: Some(text.to_string()),
            is_edited: false,
            status: RecordStatus::Completed,
            error: None,
            retry_count: 0,
            completed_at: Some(Utc::now()),
        }
    }

    pub fn failed(cue_id: CueId, language: &str, error: &str) -> Self {
        Self {
            cue_id,
            language: language.to_string(),
            original_translation: None,
            translation: None,
            is_edited: false,
            status: RecordStatus::Failed,
            error: Some(error.to_string()),
            retry_count: 1,
            completed_at: None,
        }
    }

    /// Apply a reviewer edit. An edited record counts as completed, even
    /// when the AI never produced a translation for it.
    pub fn edit(&mut self, text: &str) {
        self.translation = Some(text.to_string());
        self.is_edited = self.original_translation.as_deref() != Some(text);
        self.status = RecordStatus::Completed;
        self.error = None;
        if self.completed_at.is_none() {
            self.completed_at = Some(Utc::now());
        }
    }
}

/// One proofreading correction of a cue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Correction {
    pub cue_id: CueId,
    /// Cue text the correction was made against.
    pub source_text: String,
    /// AI suggestion as first returned; later AI passes leave it alone.
    pub suggested_text: String,
    /// Active corrected text, possibly edited by a reviewer.
    pub corrected_text: String,
    pub reason: String,
    pub confidence: f32,
    pub model: Option<String>,
    pub is_edited: bool,
    pub status: RecordStatus,
    pub created_at: DateTime<Utc>,
}

impl Correction {
    pub fn edit(&mut self, text: &str) {
        self.corrected_text = text.to_string();
        self.is_edited = self.suggested_text != text;
    }
}
