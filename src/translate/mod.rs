//! Cue translation as a [`BatchJob`].

use crate::batch::{ApplyOutcome, BatchJob, Coverage, ListShape, Validate};
use crate::episode::{CueId, EpisodeDocument, RecordStatus, Translation};
use crate::llm::StructuredRequest;
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;
use tracing::warn;

/// Longest translation stored; anything beyond is cut.
pub const MAX_TRANSLATION_CHARS: usize = 10_000;

/// Allowed length ratio when the echoed source text only nearly matches.
const ECHO_LENGTH_TOLERANCE: f64 = 1.25;

const SYSTEM_PROMPT: &str = "You are a professional subtitle translator for podcasts. \
Translate every subtitle line you are given into {language}. Keep the meaning, tone and \
speaker intent; do not merge or split lines. Return one entry per line with the cue_id \
unchanged, the original text copied exactly, and the translation.";

#[derive(Debug, Clone, Deserialize)]
pub struct TranslationItem {
    pub cue_id: CueId,
    pub original_text: String,
    pub translated_text: String,
}

impl Validate for TranslationItem {
    fn validate(&self) -> std::result::Result<(), String> {
        if self.cue_id < 1 {
            return Err("cue_id must be at least 1".to_string());
        }
        if self.original_text.trim().is_empty() {
            return Err("original_text must not be empty".to_string());
        }
        if self.translated_text.trim().is_empty() {
            return Err("translated_text must not be empty".to_string());
        }
        Ok(())
    }
}

/// Translates cues into one target language.
#[derive(Debug, Clone)]
pub struct TranslationJob {
    language: String,
}

impl TranslationJob {
    pub fn new(language: impl Into<String>) -> Self {
        Self {
            language: language.into(),
        }
    }

    pub fn language(&self) -> &str {
        &self.language
    }

    /// Whether every cue has a completed translation.
    pub fn is_fully_translated(&self, doc: &EpisodeDocument) -> bool {
        let (done, total) = doc.translation_progress(&self.language);
        total > 0 && done == total
    }

    fn response_schema() -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "translations": {
                    "type": "array",
                    "items": {
                        "type": "object",
                        "properties": {
                            "cue_id": {"type": "integer"},
                            "original_text": {"type": "string"},
                            "translated_text": {"type": "string"}
                        },
                        "required": ["cue_id", "original_text", "translated_text"]
                    }
                }
            },
            "required": ["translations"]
        })
    }
}

impl BatchJob for TranslationJob {
    type Item = TranslationItem;

    fn name(&self) -> &str {
        "translate"
    }

    fn coverage(&self) -> Coverage {
        Coverage::Complete
    }

    fn list_shape(&self) -> ListShape<'static> {
        ListShape::Field("translations")
    }

    fn is_complete(&self, doc: &EpisodeDocument, cue_id: CueId) -> bool {
        doc.translated_text(cue_id, &self.language).is_some()
    }

    fn build_request(&self, doc: &EpisodeDocument, chunk: &[CueId]) -> StructuredRequest {
        let lines: Vec<_> = chunk
            .iter()
            .filter_map(|id| doc.cue(*id))
            .map(|cue| json!({"cue_id": cue.id, "text": cue.effective_text()}))
            .collect();
        let user = format!(
            "Translate these {} subtitle lines:\n{}",
            lines.len(),
            serde_json::Value::Array(lines)
        );
        let system = SYSTEM_PROMPT.replace("{language}", language_code_to_name(&self.language));

        StructuredRequest::new(system, user).with_schema(Self::response_schema())
    }

    fn item_cue_id(&self, item: &TranslationItem) -> CueId {
        item.cue_id
    }

    fn check_item(&self, doc: &EpisodeDocument, item: &TranslationItem) -> std::result::Result<(), String> {
        let cue = doc
            .cue(item.cue_id)
            .ok_or_else(|| format!("cue_id {} does not exist", item.cue_id))?;
        if echo_matches(&item.original_text, cue.effective_text())
            || echo_matches(&item.original_text, &cue.text)
        {
            Ok(())
        } else {
            Err(format!("original_text does not match cue {}", item.cue_id))
        }
    }

    fn apply(&self, doc: &mut EpisodeDocument, item: TranslationItem, _model: &str) -> ApplyOutcome {
        let mut text = item.translated_text.trim().to_string();
        if text.chars().count() > MAX_TRANSLATION_CHARS {
            warn!(
                "Translation of cue {} exceeds {} chars, truncating",
                item.cue_id, MAX_TRANSLATION_CHARS
            );
            text = text.chars().take(MAX_TRANSLATION_CHARS).collect();
        }

        match doc.translation_mut(item.cue_id, &self.language) {
            Some(record) if record.is_edited => {
                // An edited record is done even if its last AI call failed.
                if record.translation.is_some() && !record.status.is_completed() {
                    record.status = RecordStatus::Completed;
                    record.error = None;
                }
                ApplyOutcome::PreservedEdit
            }
            Some(record) => {
                if record.original_translation.is_none() {
                    record.original_translation = Some(text.clone());
                }
                record.translation = Some(text);
                record.status = RecordStatus::Completed;
                record.error = None;
                record.completed_at = Some(Utc::now());
                ApplyOutcome::Written
            }
            None => {
                doc.translations
                    .push(Translation::completed(item.cue_id, &self.language, &text));
                ApplyOutcome::Written
            }
        }
    }

    fn mark_failed(&self, doc: &mut EpisodeDocument, cue_id: CueId, error: &str) {
        match doc.translation_mut(cue_id, &self.language) {
            Some(record) if record.status.is_completed() => {}
            Some(record) => {
                record.status = RecordStatus::Failed;
                record.error = Some(error.to_string());
                record.retry_count += 1;
            }
            None => doc
                .translations
                .push(Translation::failed(cue_id, &self.language, error)),
        }
    }
}

/// Whether the source text echoed back by the model is the cue's text.
///
/// Comparison ignores case and whitespace runs. A near match, where one text
/// contains the other and the lengths differ by at most 25%, also counts.
fn echo_matches(echoed: &str, actual: &str) -> bool {
    let echoed = normalize(echoed);
    let actual = normalize(actual);
    if echoed == actual {
        return true;
    }
    if echoed.is_empty() || actual.is_empty() {
        return false;
    }
    let (short, long) = if echoed.len() <= actual.len() {
        (&echoed, &actual)
    } else {
        (&actual, &echoed)
    };
    long.contains(short.as_str())
        && (long.chars().count() as f64) <= short.chars().count() as f64 * ECHO_LENGTH_TOLERANCE
}

fn normalize(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Convert language code to human-readable name for better prompting.
pub fn language_code_to_name(code: &str) -> &'static str {
    let lowercase = code.to_lowercase();
    match lowercase.as_str() {
        "en" => "English",
        "es" => "Spanish",
        "fr" => "French",
        "de" => "German",
        "it" => "Italian",
        "pt" => "Portuguese",
        "ru" => "Russian",
        "ja" => "Japanese",
        "ko" => "Korean",
        "zh" | "zh-cn" | "zh-hans" => "Simplified Chinese",
        "zh-tw" | "zh-hant" => "Traditional Chinese",
        "ar" => "Arabic",
        "hi" => "Hindi",
        "th" => "Thai",
        "vi" => "Vietnamese",
        "id" => "Indonesian",
        "nl" => "Dutch",
        "pl" => "Polish",
        "tr" => "Turkish",
        "uk" => "Ukrainian",
        "sv" => "Swedish",
        // For unknown codes, return a static fallback
        _ => "the target language",
    }
}
