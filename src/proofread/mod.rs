//! Transcript proofreading as a patch-mode [`BatchJob`].
//!
//! The model sees a chunk of cues and returns corrections only for the lines
//! that need one. A clean response with no entry for a cue means the cue was
//! reviewed and is fine.

use crate::batch::{ApplyOutcome, BatchJob, Coverage, ListShape, Validate};
use crate::episode::{Correction, CueId, EpisodeDocument, RecordStatus};
use crate::llm::StructuredRequest;
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

const MAX_TEXT_CHARS: usize = 500;
const MAX_REASON_CHARS: usize = 200;

const SYSTEM_PROMPT: &str = "You proofread machine-generated podcast transcripts. \
Fix speech recognition mistakes: misheard words, wrong names and terms, broken \
punctuation. Do not rephrase correct lines and do not translate. Only return the \
lines that need a correction; copy original_text exactly, and give a short reason \
and a confidence between 0 and 1.";

#[derive(Debug, Clone, Deserialize)]
pub struct CorrectionItem {
    pub cue_id: CueId,
    pub original_text: String,
    pub corrected_text: String,
    pub reason: String,
    pub confidence: f32,
}

impl Validate for CorrectionItem {
    fn validate(&self) -> std::result::Result<(), String> {
        if self.cue_id < 1 {
            return Err("cue_id must be at least 1".to_string());
        }
        check_len("original_text", &self.original_text, MAX_TEXT_CHARS)?;
        check_len("corrected_text", &self.corrected_text, MAX_TEXT_CHARS)?;
        check_len("reason", &self.reason, MAX_REASON_CHARS)?;
        if !(0.0..=1.0).contains(&self.confidence) {
            return Err(format!("confidence {} outside 0..1", self.confidence));
        }
        Ok(())
    }
}

fn check_len(field: &str, value: &str, max: usize) -> std::result::Result<(), String> {
    let len = value.chars().count();
    if len == 0 {
        return Err(format!("{} must not be empty", field));
    }
    if len > max {
        return Err(format!("{} longer than {} chars", field, max));
    }
    Ok(())
}

#[derive(Debug, Clone, Default)]
pub struct ProofreadJob;

impl ProofreadJob {
    pub fn new() -> Self {
        Self
    }

    fn response_schema() -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "corrections": {
                    "type": "array",
                    "items": {
                        "type": "object",
                        "properties": {
                            "cue_id": {"type": "integer"},
                            "original_text": {"type": "string"},
                            "corrected_text": {"type": "string"},
                            "reason": {"type": "string"},
                            "confidence": {"type": "number"}
                        },
                        "required": ["cue_id", "original_text", "corrected_text", "reason", "confidence"]
                    }
                }
            },
            "required": ["corrections"]
        })
    }
}

impl BatchJob for ProofreadJob {
    type Item = CorrectionItem;

    fn name(&self) -> &str {
        "proofread"
    }

    fn coverage(&self) -> Coverage {
        Coverage::Sparse
    }

    fn list_shape(&self) -> ListShape<'static> {
        ListShape::Field("corrections")
    }

    fn is_complete(&self, doc: &EpisodeDocument, cue_id: CueId) -> bool {
        doc.cue(cue_id).is_some_and(|c| c.proofread)
    }

    fn build_request(&self, doc: &EpisodeDocument, chunk: &[CueId]) -> StructuredRequest {
        let lines: Vec<_> = chunk
            .iter()
            .filter_map(|id| doc.cue(*id))
            .map(|cue| match &cue.speaker {
                Some(speaker) => json!({"cue_id": cue.id, "speaker": speaker, "text": cue.text}),
                None => json!({"cue_id": cue.id, "text": cue.text}),
            })
            .collect();
        let mut user = String::new();
        if !doc.episode.title.is_empty() {
            user.push_str(&format!("Episode: {}\n", doc.episode.title));
        }
        user.push_str(&format!(
            "Proofread these {} transcript lines:\n{}",
            lines.len(),
            serde_json::Value::Array(lines)
        ));

        StructuredRequest::new(SYSTEM_PROMPT, user)
            .with_temperature(0.1)
            .with_schema(Self::response_schema())
    }

    fn item_cue_id(&self, item: &CorrectionItem) -> CueId {
        item.cue_id
    }

    fn item_confidence(&self, item: &CorrectionItem) -> Option<f32> {
        Some(item.confidence)
    }

    fn check_item(&self, doc: &EpisodeDocument, item: &CorrectionItem) -> std::result::Result<(), String> {
        let cue = doc
            .cue(item.cue_id)
            .ok_or_else(|| format!("cue_id {} does not exist", item.cue_id))?;
        if item.original_text.trim() != cue.text.trim() {
            return Err(format!("original_text does not match cue {}", item.cue_id));
        }
        Ok(())
    }

    fn apply(&self, doc: &mut EpisodeDocument, item: CorrectionItem, model: &str) -> ApplyOutcome {
        let cue_id = item.cue_id;
        let corrected = item.corrected_text.trim().to_string();

        let outcome = match doc.correction_mut(cue_id) {
            Some(existing) if existing.is_edited => ApplyOutcome::PreservedEdit,
            Some(existing) => {
                existing.corrected_text = corrected.clone();
                existing.reason = item.reason;
                existing.confidence = item.confidence;
                existing.model = Some(model.to_string());
                existing.status = RecordStatus::Completed;
                ApplyOutcome::Written
            }
            None if corrected == item.original_text.trim() => {
                debug!("Cue {} returned unchanged, nothing to record", cue_id);
                ApplyOutcome::Written
            }
            None => {
                doc.corrections.push(Correction {
                    cue_id,
                    source_text: item.original_text.trim().to_string(),
                    suggested_text: corrected.clone(),
                    corrected_text: corrected.clone(),
                    reason: item.reason,
                    confidence: item.confidence,
                    model: Some(model.to_string()),
                    is_edited: false,
                    status: RecordStatus::Completed,
                    created_at: Utc::now(),
                });
                ApplyOutcome::Written
            }
        };

        let current = doc.correction(cue_id).map(|c| c.corrected_text.clone());
        if let Some(cue) = doc.cue_mut(cue_id) {
            cue.proofread = true;
            if current.is_some() {
                cue.corrected_text = current;
            }
        }
        outcome
    }

    fn mark_reviewed(&self, doc: &mut EpisodeDocument, cue_id: CueId) {
        if let Some(cue) = doc.cue_mut(cue_id) {
            cue.proofread = true;
        }
    }

    fn mark_failed(&self, _doc: &mut EpisodeDocument, cue_id: CueId, error: &str) {
        // Stays pending; the next run asks again.
        debug!("Cue {} not proofread: {}", cue_id, error);
    }
}
