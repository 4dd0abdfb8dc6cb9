use crate::batch::partial::{parse_partial_list, ListShape, PartialParse, Validate};
use crate::batch::retry::RetryPolicy;
use crate::episode::{CueId, EpisodeDocument};
use crate::error::{PodscribeError, Result};
use crate::llm::{StructuredLlm, StructuredRequest};
use crate::store::Store;
use indicatif::{ProgressBar, ProgressStyle};
use serde::de::DeserializeOwned;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Tunables for one batch run.
#[derive(Debug, Clone)]
pub struct BatchConfig {
    pub chunk_size: usize,
    pub retry: RetryPolicy,
    /// Records below this confidence are logged, never rejected.
    pub confidence_warn_threshold: f32,
    pub show_progress: bool,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            chunk_size: 50,
            retry: RetryPolicy::default(),
            confidence_warn_threshold: 0.7,
            show_progress: true,
        }
    }
}

/// Counts for one invocation of [`BatchProcessor::run`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchRunStats {
    pub total: usize,
    pub completed: usize,
    pub skipped: usize,
    pub failed: usize,
    pub chunks: usize,
    pub failed_chunks: usize,
}

impl BatchRunStats {
    /// Work was attempted and none of it succeeded.
    pub fn is_total_failure(&self) -> bool {
        self.completed == 0 && self.failed > 0
    }
}

impl std::fmt::Display for BatchRunStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} total, {} completed, {} skipped, {} failed",
            self.total, self.completed, self.skipped, self.failed
        )
    }
}

/// Whether a response is expected to mention every requested cue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Coverage {
    /// Every cue gets a record; a missing cue failed.
    Complete,
    /// Only cues needing a change are returned; silence means "fine as is",
    /// but only when the response was clean.
    Sparse,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    Written,
    /// A reviewer edit exists and was left untouched.
    PreservedEdit,
}

/// One kind of per-cue AI work (translation, proofreading).
pub trait BatchJob: Send + Sync {
    type Item: DeserializeOwned + Validate;

    fn name(&self) -> &str;
    fn coverage(&self) -> Coverage;
    fn list_shape(&self) -> ListShape<'static>;

    /// Whether this cue needs no further work in a non-forced run.
    fn is_complete(&self, doc: &EpisodeDocument, cue_id: CueId) -> bool;

    fn build_request(&self, doc: &EpisodeDocument, chunk: &[CueId]) -> StructuredRequest;

    fn item_cue_id(&self, item: &Self::Item) -> CueId;

    fn item_confidence(&self, _item: &Self::Item) -> Option<f32> {
        None
    }

    /// Business rule beyond the record's own schema checks.
    fn check_item(&self, doc: &EpisodeDocument, item: &Self::Item) -> std::result::Result<(), String>;

    fn apply(&self, doc: &mut EpisodeDocument, item: Self::Item, model: &str) -> ApplyOutcome;

    /// Record that a cue was looked at and needed nothing.
    fn mark_reviewed(&self, _doc: &mut EpisodeDocument, _cue_id: CueId) {}

    fn mark_failed(&self, doc: &mut EpisodeDocument, cue_id: CueId, error: &str);
}

/// Drives the cues of one episode through a [`BatchJob`] chunk by chunk.
pub struct BatchProcessor {
    llm: Arc<dyn StructuredLlm>,
    config: BatchConfig,
}

impl BatchProcessor {
    pub fn new(llm: Arc<dyn StructuredLlm>, config: BatchConfig) -> Self {
        Self { llm, config }
    }

    /// Enable or disable progress bar display.
    pub fn with_progress(mut self, show: bool) -> Self {
        self.config.show_progress = show;
        self
    }

    pub fn config(&self) -> &BatchConfig {
        &self.config
    }

    pub fn llm(&self) -> &Arc<dyn StructuredLlm> {
        &self.llm
    }

    /// Process every pending cue, or every cue when `force` is set.
    ///
    /// A failed chunk never stops the run. The document is saved after each
    /// chunk, so an interrupted run resumes where it stopped.
    pub async fn run<J: BatchJob>(
        &self,
        job: &J,
        doc: &mut EpisodeDocument,
        store: &dyn Store,
        force: bool,
    ) -> Result<BatchRunStats> {
        if doc.cues.is_empty() {
            return Err(PodscribeError::NoCues(doc.id()));
        }

        let ordered: Vec<CueId> = doc.ordered_cues().iter().map(|c| c.id).collect();
        let mut stats = BatchRunStats {
            total: ordered.len(),
            ..Default::default()
        };

        let pending: Vec<CueId> = if force {
            ordered
        } else {
            ordered
                .into_iter()
                .filter(|id| !job.is_complete(doc, *id))
                .collect()
        };
        stats.skipped = stats.total - pending.len();

        if pending.is_empty() {
            info!(
                "{}: all {} cues of episode {} already done",
                job.name(),
                stats.total,
                doc.id()
            );
            return Ok(stats);
        }

        let chunk_size = self.config.chunk_size.max(1);
        let chunks: Vec<&[CueId]> = pending.chunks(chunk_size).collect();
        stats.chunks = chunks.len();

        info!(
            "{}: {} of {} cues pending in {} chunks using {} ({})",
            job.name(),
            pending.len(),
            stats.total,
            stats.chunks,
            self.llm.name(),
            self.llm.model()
        );

        let progress_bar = if self.config.show_progress {
            let pb = ProgressBar::new(stats.chunks as u64);
            pb.set_style(
                ProgressStyle::default_bar()
                    .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} chunks ({eta})")
                    .unwrap_or_else(|_| ProgressStyle::default_bar())
                    .progress_chars("#>-"),
            );
            Some(pb)
        } else {
            None
        };

        for (index, chunk) in chunks.iter().enumerate() {
            let label = format!("{} chunk {}/{}", job.name(), index + 1, stats.chunks);
            let request = job.build_request(doc, chunk);

            let llm = &self.llm;
            let request = &request;
            let result = self
                .config
                .retry
                .run_transient(&label, move |_| llm.call_structured(request))
                .await;

            match result {
                Ok(raw) => self.apply_response(job, doc, chunk, &raw, &label, &mut stats),
                Err(e) => {
                    warn!("{} failed, {} cues left for the next run: {}", label, chunk.len(), e);
                    let message = e.to_string();
                    for cue_id in chunk.iter() {
                        job.mark_failed(doc, *cue_id, &message);
                    }
                    stats.failed += chunk.len();
                    stats.failed_chunks += 1;
                }
            }

            doc.touch();
            store.save(doc)?;

            if let Some(ref pb) = progress_bar {
                pb.inc(1);
            }
        }

        if let Some(pb) = progress_bar {
            pb.finish_with_message(format!("{} complete", job.name()));
        }

        info!("{} finished for episode {}: {}", job.name(), doc.id(), stats);
        Ok(stats)
    }

    fn apply_response<J: BatchJob>(
        &self,
        job: &J,
        doc: &mut EpisodeDocument,
        chunk: &[CueId],
        raw: &str,
        label: &str,
        stats: &mut BatchRunStats,
    ) {
        let parsed = self.parse_chunk(job, doc, chunk, raw);
        for message in &parsed.invalid {
            warn!("{}: dropped record {}", label, message);
        }
        debug!(
            "{}: {} valid, {} invalid records",
            label,
            parsed.valid.len(),
            parsed.invalid.len()
        );

        let clean = parsed.is_clean();
        let first_problem = parsed.invalid.first().cloned();
        let mut answered = HashSet::new();

        for item in parsed.valid {
            let cue_id = job.item_cue_id(&item);
            if let Some(confidence) = job.item_confidence(&item) {
                if confidence < self.config.confidence_warn_threshold {
                    warn!(
                        "{}: low confidence {:.2} for cue {}",
                        label, confidence, cue_id
                    );
                }
            }
            answered.insert(cue_id);
            match job.apply(doc, item, self.llm.model()) {
                ApplyOutcome::Written => stats.completed += 1,
                ApplyOutcome::PreservedEdit => {
                    debug!("{}: cue {} has a reviewer edit, kept", label, cue_id);
                    stats.skipped += 1;
                }
            }
        }

        let reason = match first_problem {
            Some(problem) => format!("response rejected: {}", problem),
            None => "missing from response".to_string(),
        };

        for cue_id in chunk.iter().filter(|id| !answered.contains(*id)) {
            match job.coverage() {
                Coverage::Sparse if clean => {
                    job.mark_reviewed(doc, *cue_id);
                    stats.completed += 1;
                }
                _ => {
                    job.mark_failed(doc, *cue_id, &reason);
                    stats.failed += 1;
                }
            }
        }
    }

    fn parse_chunk<J: BatchJob>(
        &self,
        job: &J,
        doc: &EpisodeDocument,
        chunk: &[CueId],
        raw: &str,
    ) -> PartialParse<J::Item> {
        let requested: HashSet<CueId> = chunk.iter().copied().collect();
        let mut seen = HashSet::new();

        parse_partial_list::<J::Item, _>(raw, job.list_shape(), |item| {
            let cue_id = job.item_cue_id(item);
            if !requested.contains(&cue_id) {
                return Err(format!("cue_id {} was not requested", cue_id));
            }
            job.check_item(doc, item)?;
            if !seen.insert(cue_id) {
                return Err(format!("duplicate cue_id {}", cue_id));
            }
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::episode::NewEpisode;
    use crate::store::MemoryStore;
    use async_trait::async_trait;
    use serde::Deserialize;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::time::Duration;

    /// Replays canned responses in order.
    struct ScriptedLlm {
        responses: Mutex<VecDeque<Result<String>>>,
        calls: Mutex<usize>,
    }

    impl ScriptedLlm {
        fn new(responses: Vec<Result<String>>) -> Self {
            Self {
                responses: Mutex::new(responses.into()),
                calls: Mutex::new(0),
            }
        }

        fn calls(&self) -> usize {
            *self.calls.lock().unwrap()
        }
    }

    #[async_trait]
    impl StructuredLlm for ScriptedLlm {
        async fn call_structured(&self, _request: &StructuredRequest) -> Result<String> {
            *self.calls.lock().unwrap() += 1;
            self.responses
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(PodscribeError::Api("script exhausted".to_string())))
        }

        fn name(&self) -> &'static str {
            "scripted"
        }

        fn model(&self) -> &str {
            "scripted-1"
        }
    }

    #[derive(Debug, Deserialize)]
    struct Upper {
        cue_id: CueId,
        text: String,
    }

    impl Validate for Upper {
        fn validate(&self) -> std::result::Result<(), String> {
            if self.text.is_empty() {
                return Err("text must not be empty".to_string());
            }
            Ok(())
        }
    }

    /// Writes the returned text into `corrected_text`.
    struct UpperJob;

    impl BatchJob for UpperJob {
        type Item = Upper;

        fn name(&self) -> &str {
            "upper"
        }

        fn coverage(&self) -> Coverage {
            Coverage::Complete
        }

        fn list_shape(&self) -> ListShape<'static> {
            ListShape::Field("items")
        }

        fn is_complete(&self, doc: &EpisodeDocument, cue_id: CueId) -> bool {
            doc.cue(cue_id).is_some_and(|c| c.corrected_text.is_some())
        }

        fn build_request(&self, _doc: &EpisodeDocument, chunk: &[CueId]) -> StructuredRequest {
            StructuredRequest::new("upper", format!("{:?}", chunk))
        }

        fn item_cue_id(&self, item: &Upper) -> CueId {
            item.cue_id
        }

        fn check_item(&self, _doc: &EpisodeDocument, _item: &Upper) -> std::result::Result<(), String> {
            Ok(())
        }

        fn apply(&self, doc: &mut EpisodeDocument, item: Upper, _model: &str) -> ApplyOutcome {
            if let Some(cue) = doc.cue_mut(item.cue_id) {
                cue.corrected_text = Some(item.text);
            }
            ApplyOutcome::Written
        }

        fn mark_failed(&self, _doc: &mut EpisodeDocument, _cue_id: CueId, _error: &str) {}
    }

    fn doc_with_cues(n: usize) -> EpisodeDocument {
        let mut doc = EpisodeDocument::new(1, NewEpisode::default());
        for i in 0..n {
            doc.add_cue(i as f64, i as f64 + 1.0, format!("line {}", i), None)
                .unwrap();
        }
        doc
    }

    fn processor(llm: Arc<dyn StructuredLlm>, chunk_size: usize) -> BatchProcessor {
        BatchProcessor::new(
            llm,
            BatchConfig {
                chunk_size,
                retry: RetryPolicy::new(3, Duration::from_millis(10), 2.0),
                confidence_warn_threshold: 0.7,
                show_progress: false,
            },
        )
    }

    fn items(ids: &[CueId]) -> String {
        let items: Vec<_> = ids
            .iter()
            .map(|id| serde_json::json!({"cue_id": id, "text": format!("LINE {}", id)}))
            .collect();
        serde_json::json!({ "items": items }).to_string()
    }

    #[tokio::test]
    async fn test_no_cues_is_an_error() {
        let llm = Arc::new(ScriptedLlm::new(vec![]));
        let mut doc = doc_with_cues(0);
        let store = MemoryStore::new();
        let result = processor(llm, 4).run(&UpperJob, &mut doc, &store, false).await;
        assert!(matches!(result, Err(PodscribeError::NoCues(1))));
    }

    #[tokio::test]
    async fn test_unrequested_and_duplicate_ids_are_dropped() {
        let raw = serde_json::json!({"items": [
            {"cue_id": 1, "text": "ONE"},
            {"cue_id": 1, "text": "AGAIN"},
            {"cue_id": 99, "text": "STRAY"}
        ]})
        .to_string();
        let llm = Arc::new(ScriptedLlm::new(vec![Ok(raw)]));
        let mut doc = doc_with_cues(2);
        let store = MemoryStore::new();

        let stats = processor(llm, 4)
            .run(&UpperJob, &mut doc, &store, false)
            .await
            .unwrap();

        assert_eq!(stats.completed, 1);
        assert_eq!(stats.failed, 1);
        assert_eq!(doc.cue(1).unwrap().corrected_text.as_deref(), Some("ONE"));
        assert!(doc.cue(2).unwrap().corrected_text.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_chunk_does_not_abort_batch() {
        let non_retriable = || {
            Err(PodscribeError::ApiStatus {
                status: 400,
                body: "bad".to_string(),
            })
        };
        let llm = Arc::new(ScriptedLlm::new(vec![non_retriable(), Ok(items(&[3, 4]))]));
        let mut doc = doc_with_cues(4);
        let store = MemoryStore::new();

        let stats = processor(llm.clone(), 2)
            .run(&UpperJob, &mut doc, &store, false)
            .await
            .unwrap();

        assert_eq!(stats.completed, 2);
        assert_eq!(stats.failed, 2);
        assert_eq!(stats.failed_chunks, 1);
        assert_eq!(llm.calls(), 2);
        // Saved after every chunk
        assert_eq!(store.load(1).unwrap(), doc);
    }

    #[tokio::test]
    async fn test_second_run_skips_completed_cues() {
        let llm = Arc::new(ScriptedLlm::new(vec![Ok(items(&[1, 2, 3]))]));
        let mut doc = doc_with_cues(3);
        let store = MemoryStore::new();
        let processor = processor(llm.clone(), 10);

        processor.run(&UpperJob, &mut doc, &store, false).await.unwrap();
        let stats = processor.run(&UpperJob, &mut doc, &store, false).await.unwrap();

        assert_eq!(llm.calls(), 1);
        assert_eq!(stats.skipped, 3);
        assert_eq!(stats.completed, 0);
        assert_eq!(stats.chunks, 0);
    }

    #[test]
    fn test_total_failure() {
        let stats = BatchRunStats {
            total: 4,
            failed: 4,
            ..Default::default()
        };
        assert!(stats.is_total_failure());
        assert!(!BatchRunStats::default().is_total_failure());
    }
}
