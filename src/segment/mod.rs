//! Chapter segmentation: ask the model for chapter boundaries, validate them,
//! fall back to a single chapter when that fails, then bind cues.

pub mod assign;

pub use assign::{assign_cues, check_chapters, find_chapter, AssignStats, ChapterIssue};

use crate::batch::{parse_partial_list, ListShape, RetryPolicy, Validate};
use crate::episode::{Chapter, Cue, EpisodeDocument};
use crate::error::{PodscribeError, Result};
use crate::llm::{StructuredLlm, StructuredRequest};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tracing::{info, warn};

/// Cue budget for the sampled retry after a context-size failure.
pub const SAMPLED_MAX_CUES: usize = 2000;

const SYSTEM_PROMPT: &str = "You split podcast transcripts into chapters. Find the points \
where the conversation changes topic. Chapters must be contiguous, the first starts at 0, \
and each has a short title and a one or two sentence summary. Times are in seconds.";

#[derive(Debug, Clone, Deserialize)]
pub struct ChapterItem {
    pub title: String,
    pub summary: String,
    pub start_time: f64,
    pub end_time: f64,
}

impl Validate for ChapterItem {
    fn validate(&self) -> std::result::Result<(), String> {
        let title = self.title.trim().chars().count();
        if title == 0 || title > 100 {
            return Err("title must be 1-100 chars".to_string());
        }
        let summary = self.summary.trim().chars().count();
        if summary == 0 || summary > 1000 {
            return Err("summary must be 1-1000 chars".to_string());
        }
        if self.start_time < 0.0 {
            return Err("start_time must not be negative".to_string());
        }
        if self.end_time <= self.start_time {
            return Err("end_time must be after start_time".to_string());
        }
        Ok(())
    }
}

/// Layout rules for a proposed chapter list.
#[derive(Debug, Clone)]
pub struct SegmentationValidator {
    pub min_chapter_duration: f64,
    pub max_chapter_count: usize,
    /// Allowed overshoot of the last chapter past the episode end.
    pub duration_tolerance: f64,
}

impl Default for SegmentationValidator {
    fn default() -> Self {
        Self {
            min_chapter_duration: 30.0,
            max_chapter_count: 20,
            duration_tolerance: 1.1,
        }
    }
}

impl SegmentationValidator {
    /// Reject unusable layouts; return warnings for merely odd ones.
    pub fn validate(&self, chapters: &[ChapterItem], total_duration: f64) -> Result<Vec<String>> {
        let first = chapters
            .first()
            .ok_or_else(|| PodscribeError::Segmentation("no chapters returned".to_string()))?;

        if first.start_time.abs() > f64::EPSILON {
            return Err(PodscribeError::Segmentation(format!(
                "first chapter must start at 0, starts at {:.1}s",
                first.start_time
            )));
        }

        for (i, pair) in chapters.windows(2).enumerate() {
            if pair[0].end_time > pair[1].start_time {
                return Err(PodscribeError::Segmentation(format!(
                    "chapters {} and {} overlap: {:.1}s > {:.1}s",
                    i + 1,
                    i + 2,
                    pair[0].end_time,
                    pair[1].start_time
                )));
            }
        }

        let last_end = chapters[chapters.len() - 1].end_time;
        let max_allowed = total_duration * self.duration_tolerance;
        if last_end > max_allowed {
            return Err(PodscribeError::Segmentation(format!(
                "last chapter ends at {:.1}s, past the {:.1}s limit",
                last_end, max_allowed
            )));
        }

        let mut warnings = Vec::new();
        for (i, chapter) in chapters.iter().enumerate() {
            let duration = chapter.end_time - chapter.start_time;
            if duration < self.min_chapter_duration {
                warnings.push(format!("chapter {} is only {:.1}s long", i + 1, duration));
            }
        }
        if chapters.len() > self.max_chapter_count {
            warnings.push(format!(
                "{} chapters, more than the suggested {}",
                chapters.len(),
                self.max_chapter_count
            ));
        }
        Ok(warnings)
    }
}

/// Result of [`SegmentationService::segment`].
#[derive(Debug, Clone, Default)]
pub struct SegmentOutcome {
    pub chapters: usize,
    /// Existing chapters were kept and only unassigned cues were bound.
    pub reused: bool,
    pub sampled: bool,
    pub fallback: bool,
    pub assign: AssignStats,
}

pub struct SegmentationService {
    llm: Arc<dyn StructuredLlm>,
    retry: RetryPolicy,
    validator: SegmentationValidator,
}

impl SegmentationService {
    pub fn new(llm: Arc<dyn StructuredLlm>, retry: RetryPolicy) -> Self {
        Self {
            llm,
            retry,
            validator: SegmentationValidator::default(),
        }
    }

    pub fn with_validator(mut self, validator: SegmentationValidator) -> Self {
        self.validator = validator;
        self
    }

    /// Produce chapters for the episode and bind every cue to one.
    ///
    /// Existing chapters are kept unless `force`. Model failures never fail
    /// the call: the episode falls back to a single chapter.
    pub async fn segment(&self, doc: &mut EpisodeDocument, force: bool) -> Result<SegmentOutcome> {
        if doc.cues.is_empty() {
            return Err(PodscribeError::NoCues(doc.id()));
        }

        if !doc.chapters.is_empty() && !force {
            let assign = assign_cues(&doc.chapters, &mut doc.cues, false);
            info!(
                "Episode {} already has {} chapters, bound {} cues",
                doc.id(),
                doc.chapters.len(),
                assign.changed()
            );
            return Ok(SegmentOutcome {
                chapters: doc.chapters.len(),
                reused: true,
                assign,
                ..Default::default()
            });
        }

        doc.clear_chapters();
        let duration = doc.total_duration();
        let ordered: Vec<Cue> = doc.ordered_cues().into_iter().cloned().collect();

        let mut outcome = SegmentOutcome::default();
        let items = match self.propose(&ordered, duration).await {
            Ok(items) => items,
            Err(e) if is_context_error(&e) => {
                warn!("Full transcript failed ({}), retrying with sampled cues", e);
                outcome.sampled = true;
                let sampled = sample_cues_by_time(&ordered, SAMPLED_MAX_CUES);
                match self.propose(&sampled, duration).await {
                    Ok(items) => items,
                    Err(e) => {
                        warn!("Sampled segmentation failed too: {}", e);
                        Vec::new()
                    }
                }
            }
            Err(e) => {
                warn!("Segmentation failed: {}", e);
                Vec::new()
            }
        };

        let model = self.llm.model().to_string();
        doc.chapters = if items.is_empty() {
            warn!("Using a single fallback chapter for episode {}", doc.id());
            outcome.fallback = true;
            vec![fallback_chapter(doc, duration)]
        } else {
            items
                .into_iter()
                .enumerate()
                .map(|(i, item)| Chapter {
                    index: i as u32,
                    title: item.title.trim().to_string(),
                    summary: item.summary.trim().to_string(),
                    start_time: item.start_time,
                    end_time: item.end_time,
                    model: Some(model.clone()),
                })
                .collect()
        };

        outcome.chapters = doc.chapters.len();
        outcome.assign = assign_cues(&doc.chapters, &mut doc.cues, true);
        info!(
            "Episode {} segmented into {} chapters ({} cues bound, {} out of range)",
            doc.id(),
            outcome.chapters,
            outcome.assign.changed(),
            outcome.assign.out_of_range
        );
        Ok(outcome)
    }

    async fn propose(&self, cues: &[Cue], duration: f64) -> Result<Vec<ChapterItem>> {
        let request = build_request(cues, duration);
        let llm = &self.llm;
        let request = &request;
        let raw = self
            .retry
            .run_transient("segment", move |_| llm.call_structured(request))
            .await?;

        let parsed =
            parse_partial_list::<ChapterItem, _>(&raw, ListShape::Field("chapters"), |_| Ok(()));
        if !parsed.is_clean() {
            return Err(PodscribeError::Segmentation(format!(
                "unusable chapter list: {}",
                parsed.invalid.join("; ")
            )));
        }

        for warning in self.validator.validate(&parsed.valid, duration)? {
            warn!("Segmentation: {}", warning);
        }
        Ok(parsed.valid)
    }
}

/// Chapter ceiling by episode length.
pub fn max_chapters_for(duration_secs: f64) -> usize {
    let minutes = duration_secs / 60.0;
    if minutes < 8.0 {
        2
    } else if minutes < 20.0 {
        4
    } else {
        6
    }
}

/// Render cues as `[MM:SS] speaker: text` lines.
pub fn transcript_text(cues: &[Cue]) -> String {
    cues.iter()
        .map(|cue| {
            let total = cue.start_time.max(0.0) as u64;
            format!(
                "[{:02}:{:02}] {}: {}",
                total / 60,
                total % 60,
                cue.speaker.as_deref().unwrap_or("Speaker"),
                cue.effective_text()
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Pick at most about `max_cues` cues spread evenly over time, always
/// keeping the last one.
pub fn sample_cues_by_time(cues: &[Cue], max_cues: usize) -> Vec<Cue> {
    if cues.len() <= max_cues || max_cues == 0 {
        return cues.to_vec();
    }
    let last = &cues[cues.len() - 1];
    let interval = last.start_time / max_cues as f64;

    let mut sampled: Vec<Cue> = Vec::with_capacity(max_cues + 1);
    let mut last_time = f64::NEG_INFINITY;
    for cue in cues {
        if cue.start_time - last_time >= interval {
            sampled.push(cue.clone());
            last_time = cue.start_time;
            if sampled.len() >= max_cues {
                break;
            }
        }
    }
    if sampled.last().map(|c| c.id) != Some(last.id) {
        sampled.push(last.clone());
    }
    sampled
}

fn build_request(cues: &[Cue], duration: f64) -> StructuredRequest {
    let user = format!(
        "Episode length: {:.1} minutes ({:.0} seconds). Use at most {} chapters.\n\nTranscript:\n{}",
        duration / 60.0,
        duration,
        max_chapters_for(duration),
        transcript_text(cues)
    );
    let schema = json!({
        "type": "object",
        "properties": {
            "chapters": {
                "type": "array",
                "items": {
                    "type": "object",
                    "properties": {
                        "title": {"type": "string"},
                        "summary": {"type": "string"},
                        "start_time": {"type": "number"},
                        "end_time": {"type": "number"}
                    },
                    "required": ["title", "summary", "start_time", "end_time"]
                }
            }
        },
        "required": ["chapters"]
    });
    StructuredRequest::new(SYSTEM_PROMPT, user).with_schema(schema)
}

fn fallback_chapter(doc: &EpisodeDocument, duration: f64) -> Chapter {
    let title = if doc.episode.title.trim().is_empty() {
        "Full episode".to_string()
    } else {
        doc.episode.title.clone()
    };
    Chapter {
        index: 0,
        title,
        summary: format!(
            "Automatic chapter detection failed; one chapter covers all {:.1} minutes.",
            duration / 60.0
        ),
        start_time: 0.0,
        end_time: duration,
        model: None,
    }
}

/// Failures that a smaller prompt may avoid.
fn is_context_error(error: &PodscribeError) -> bool {
    match error {
        PodscribeError::ApiStatus { status, .. } if *status == 413 || *status == 429 => true,
        PodscribeError::Http(e) if e.is_timeout() => true,
        other => {
            let message = other.to_string().to_lowercase();
            ["context", "token", "length", "rate", "timeout"]
                .iter()
                .any(|needle| message.contains(needle))
        }
    }
}
