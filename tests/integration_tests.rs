//! Integration tests for podscribe
//!
//! These tests drive the engine end to end against scripted model responses,
//! without requiring external API keys.

use async_trait::async_trait;
use podscribe::batch::{BatchConfig, BatchProcessor, RetryPolicy};
use podscribe::config::{Config, Provider};
use podscribe::episode::{EpisodeDocument, NewEpisode, RecordStatus, Stage};
use podscribe::error::{PodscribeError, Result};
use podscribe::llm::{create_client, StructuredLlm, StructuredRequest};
use podscribe::segment::SegmentationService;
use podscribe::store::{create_or_get_episode, JsonFileStore, MemoryStore, Store};
use podscribe::subtitle::{
    entries_from_document, parse_srt, MarkdownDocumentWriter, SrtFormatter, SubtitleFormatter,
};
use podscribe::translate::TranslationJob;
use podscribe::workflow::{IngestedTranscript, RunOptions, StageHandlers, WorkflowRunner};
use serde_json::json;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

/// Replays canned responses in order and records every prompt it saw.
struct ScriptedLlm {
    responses: Mutex<VecDeque<Result<String>>>,
    prompts: Mutex<Vec<String>>,
    calls: AtomicUsize,
}

impl ScriptedLlm {
    fn new(responses: Vec<Result<String>>) -> Arc<Self> {
        Arc::new(Self {
            responses: Mutex::new(responses.into()),
            prompts: Mutex::new(Vec::new()),
            calls: AtomicUsize::new(0),
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl StructuredLlm for ScriptedLlm {
    async fn call_structured(&self, request: &StructuredRequest) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.prompts.lock().unwrap().push(request.user.clone());
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

fn unavailable() -> Result<String> {
    Err(PodscribeError::ApiStatus {
        status: 503,
        body: "overloaded".to_string(),
    })
}

fn translations(ids: std::ops::RangeInclusive<u64>) -> Result<String> {
    let items: Vec<_> = ids
        .map(|i| {
            json!({
                "cue_id": i,
                "original_text": format!("line {}", i),
                "translated_text": format!("第{}行", i)
            })
        })
        .collect();
    Ok(json!({ "translations": items }).to_string())
}

/// Episode with `n` ten-second cues "line 1".."line n".
fn episode_with_cues(store: &dyn Store, n: u64) -> EpisodeDocument {
    let mut doc = store
        .create(NewEpisode {
            title: "Scripted".to_string(),
            source_url: "https://example.com/scripted".to_string(),
            duration: n as f64 * 10.0,
        })
        .unwrap();
    for i in 0..n {
        let start = i as f64 * 10.0;
        doc.add_cue(start, start + 10.0, format!("line {}", i + 1), None)
            .unwrap();
    }
    store.save(&doc).unwrap();
    doc
}

fn processor(llm: Arc<ScriptedLlm>, chunk_size: usize, retry: RetryPolicy) -> BatchProcessor {
    BatchProcessor::new(
        llm,
        BatchConfig {
            chunk_size,
            retry,
            show_progress: false,
            ..Default::default()
        },
    )
}

// ============================================================================
// Batch Processing Integration Tests
// ============================================================================

mod batch_tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_retry_and_partial_recovery_across_chunks() {
        let store = MemoryStore::new();
        let mut doc = episode_with_cues(&store, 10);

        let bad_chunk: Vec<_> = (5..=8)
            .map(|i| json!({"cue_id": i, "original_text": format!("line {}", i), "translated_text": ""}))
            .collect();
        let llm = ScriptedLlm::new(vec![
            unavailable(),
            unavailable(),
            translations(1..=4),
            Ok(json!({ "translations": bad_chunk }).to_string()),
            translations(9..=10),
        ]);
        let processor = processor(
            llm.clone(),
            4,
            RetryPolicy::new(3, Duration::from_millis(1000), 2.0),
        );

        let started = tokio::time::Instant::now();
        let stats = processor
            .run(&TranslationJob::new("zh"), &mut doc, &store, false)
            .await
            .unwrap();

        assert_eq!(stats.total, 10);
        assert_eq!(stats.completed, 6);
        assert_eq!(stats.failed, 4);
        assert_eq!(stats.skipped, 0);
        assert_eq!(stats.chunks, 3);
        assert_eq!(stats.failed_chunks, 0);
        assert_eq!(llm.calls(), 5);
        // 1s then 2s of backoff before the third attempt of chunk 1
        assert_eq!(started.elapsed(), Duration::from_millis(3000));

        let stored = store.load(doc.id()).unwrap();
        assert_eq!(stored.translation_progress("zh"), (6, 10));
        for id in 5..=8 {
            let record = stored.translation(id, "zh").unwrap();
            assert_eq!(record.status, RecordStatus::Failed);
            assert!(record.error.as_deref().unwrap().starts_with("response rejected"));
        }
        assert_eq!(stored.translated_text(9, "zh"), Some("第9行"));
    }

    #[tokio::test]
    async fn test_second_run_only_retries_failed_cues() {
        let store = MemoryStore::new();
        let mut doc = episode_with_cues(&store, 6);

        let first = ScriptedLlm::new(vec![
            translations(1..=3),
            Err(PodscribeError::Api("quota exceeded".to_string())),
        ]);
        let stats = processor(first, 3, RetryPolicy::none())
            .run(&TranslationJob::new("zh"), &mut doc, &store, false)
            .await
            .unwrap();
        assert_eq!((stats.completed, stats.failed, stats.failed_chunks), (3, 3, 1));

        let mut doc = store.load(doc.id()).unwrap();
        let second = ScriptedLlm::new(vec![translations(4..=6)]);
        let stats = processor(second.clone(), 3, RetryPolicy::none())
            .run(&TranslationJob::new("zh"), &mut doc, &store, false)
            .await
            .unwrap();

        assert_eq!(second.calls(), 1);
        assert_eq!(stats.skipped, 3);
        assert_eq!(stats.completed, 3);
        assert!(second.prompts.lock().unwrap()[0].contains("line 4"));
        assert!(!second.prompts.lock().unwrap()[0].contains("line 1"));
        assert!(TranslationJob::new("zh").is_fully_translated(&doc));

        // A third run has nothing left to do and changes no record
        let before = doc.clone();
        let third = ScriptedLlm::new(Vec::new());
        let stats = processor(third.clone(), 3, RetryPolicy::none())
            .run(&TranslationJob::new("zh"), &mut doc, &store, false)
            .await
            .unwrap();
        assert_eq!(third.calls(), 0);
        assert_eq!(stats.skipped, 6);
        assert_eq!(doc.translations, before.translations);
        assert_eq!(doc.cues, before.cues);
        assert_eq!(store.load(doc.id()).unwrap().translations, before.translations);
    }

    #[tokio::test]
    async fn test_edited_failed_translation_is_not_requested_again() {
        let store = MemoryStore::new();
        let mut doc = episode_with_cues(&store, 2);

        let llm = ScriptedLlm::new(vec![translations(2..=2)]);
        processor(llm, 10, RetryPolicy::none())
            .run(&TranslationJob::new("zh"), &mut doc, &store, false)
            .await
            .unwrap();
        assert_eq!(doc.translation(1, "zh").unwrap().status, RecordStatus::Failed);

        doc.translation_mut(1, "zh").unwrap().edit("人工译文");
        store.save(&doc).unwrap();

        for _ in 0..2 {
            let llm = ScriptedLlm::new(Vec::new());
            let stats = processor(llm.clone(), 10, RetryPolicy::none())
                .run(&TranslationJob::new("zh"), &mut doc, &store, false)
                .await
                .unwrap();
            assert_eq!(llm.calls(), 0);
            assert_eq!(stats.skipped, 2);
        }

        let stored = store.load(doc.id()).unwrap();
        assert_eq!(stored.translated_text(1, "zh"), Some("人工译文"));
        assert!(TranslationJob::new("zh").is_fully_translated(&stored));
    }

    #[tokio::test]
    async fn test_forced_run_keeps_reviewer_edits() {
        let store = MemoryStore::new();
        let mut doc = episode_with_cues(&store, 3);

        let llm = ScriptedLlm::new(vec![translations(1..=3)]);
        processor(llm, 10, RetryPolicy::none())
            .run(&TranslationJob::new("zh"), &mut doc, &store, false)
            .await
            .unwrap();

        doc.translation_mut(2, "zh").unwrap().edit("审校后的第二行");
        store.save(&doc).unwrap();

        let llm = ScriptedLlm::new(vec![translations(1..=3)]);
        let stats = processor(llm.clone(), 10, RetryPolicy::none())
            .run(&TranslationJob::new("zh"), &mut doc, &store, true)
            .await
            .unwrap();

        assert_eq!(llm.calls(), 1);
        assert_eq!(stats.completed, 2);
        assert_eq!(stats.skipped, 1);
        let record = store.load(doc.id()).unwrap().translation(2, "zh").cloned().unwrap();
        assert!(record.is_edited);
        assert_eq!(record.translation.as_deref(), Some("审校后的第二行"));
        assert_eq!(record.original_translation.as_deref(), Some("第2行"));
    }

    #[tokio::test]
    async fn test_garbage_response_fails_whole_chunk() {
        let store = MemoryStore::new();
        let mut doc = episode_with_cues(&store, 2);

        let llm = ScriptedLlm::new(vec![Ok("I cannot help with that.".to_string())]);
        let stats = processor(llm, 10, RetryPolicy::none())
            .run(&TranslationJob::new("ja"), &mut doc, &store, false)
            .await
            .unwrap();

        assert!(stats.is_total_failure());
        assert_eq!(doc.translation(1, "ja").unwrap().status, RecordStatus::Failed);
    }
}

// ============================================================================
// Workflow Runner Integration Tests
// ============================================================================

mod workflow_tests {
    use super::*;

    fn proofread_response() -> Result<String> {
        Ok(json!({
            "corrections": [{
                "cue_id": 2,
                "original_text": "line 2",
                "corrected_text": "Line two.",
                "reason": "number spelled out",
                "confidence": 0.92
            }]
        })
        .to_string())
    }

    fn segment_response() -> Result<String> {
        Ok(json!({
            "chapters": [
                {"title": "Opening", "summary": "The hosts say hello.", "start_time": 0, "end_time": 60},
                {"title": "Main topic", "summary": "The actual discussion.", "start_time": 60, "end_time": 120}
            ]
        })
        .to_string())
    }

    fn runner(store: Arc<dyn Store>, llm: Arc<ScriptedLlm>, output: &std::path::Path) -> WorkflowRunner {
        let config = BatchConfig {
            retry: RetryPolicy::none(),
            show_progress: false,
            ..Default::default()
        };
        WorkflowRunner::new(
            store,
            BatchProcessor::new(llm.clone(), config),
            SegmentationService::new(llm, RetryPolicy::none()),
            StageHandlers {
                download: Box::new(IngestedTranscript),
                transcribe: Box::new(IngestedTranscript),
                document: Box::new(MarkdownDocumentWriter::new(output, "zh")),
            },
            "zh",
        )
    }

    #[tokio::test]
    async fn test_runner_reaches_review_ready() {
        let dir = TempDir::new().unwrap();
        let store: Arc<dyn Store> = Arc::new(JsonFileStore::open(dir.path().join("store")).unwrap());
        let doc = episode_with_cues(store.as_ref(), 12);

        let llm = ScriptedLlm::new(vec![
            proofread_response(),
            segment_response(),
            translations(1..=12),
        ]);
        let report = runner(store.clone(), llm.clone(), &dir.path().join("out"))
            .run(doc.id(), RunOptions::default())
            .await
            .unwrap();

        assert!(report.is_done());
        assert_eq!(report.final_stage, Stage::ReadyForReview);
        assert_eq!(report.steps.len(), 6);
        assert_eq!(llm.calls(), 3);

        let stored = store.load(doc.id()).unwrap();
        assert_eq!(stored.cue(2).unwrap().effective_text(), "Line two.");
        assert!(stored.cues.iter().all(|c| c.proofread));
        assert_eq!(stored.chapters.len(), 2);
        assert_eq!(stored.cue(6).unwrap().chapter, Some(0));
        assert_eq!(stored.cue(7).unwrap().chapter, Some(1));
        assert_eq!(stored.translation_progress("zh"), (12, 12));

        let path = dir.path().join("out").join(format!("episode-{}.md", doc.id()));
        let document = std::fs::read_to_string(path).unwrap();
        assert!(document.contains("## Opening"));
        assert!(document.contains("Line two.\n第2行"));
    }

    #[tokio::test]
    async fn test_runner_resumes_after_failed_translation() {
        let dir = TempDir::new().unwrap();
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        let doc = episode_with_cues(store.as_ref(), 12);

        // Translation has no scripted answer, so that step fails outright
        let llm = ScriptedLlm::new(vec![proofread_response(), segment_response()]);
        let result = runner(store.clone(), llm, dir.path())
            .run(doc.id(), RunOptions::default())
            .await;
        assert!(matches!(result, Err(PodscribeError::BatchFailed(_))));
        assert_eq!(store.load(doc.id()).unwrap().episode.stage, Stage::Segmented);

        let llm = ScriptedLlm::new(vec![translations(1..=12)]);
        let report = runner(store.clone(), llm.clone(), dir.path())
            .run(doc.id(), RunOptions::default())
            .await
            .unwrap();

        assert_eq!(llm.calls(), 1);
        assert_eq!(report.steps.len(), 2);
        assert!(report.is_done());
    }

    #[tokio::test]
    async fn test_partial_translation_stalls_without_error() {
        let dir = TempDir::new().unwrap();
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        let mut doc = episode_with_cues(store.as_ref(), 4);
        doc.episode.stage = Stage::Segmented;
        store.save(&doc).unwrap();

        let llm = ScriptedLlm::new(vec![translations(1..=2)]);
        let report = runner(store.clone(), llm, dir.path())
            .run(doc.id(), RunOptions::default())
            .await
            .unwrap();

        assert!(!report.is_done());
        assert_eq!(report.final_stage, Stage::Segmented);
        assert!(report.stalled.unwrap().contains("2 of 4"));
    }
}

// ============================================================================
// Store Integration Tests
// ============================================================================

mod store_tests {
    use super::*;

    #[test]
    fn test_json_store_survives_reopen() {
        let dir = TempDir::new().unwrap();
        let id = {
            let store = JsonFileStore::open(dir.path()).unwrap();
            let doc = episode_with_cues(&store, 3);
            doc.id()
        };

        let store = JsonFileStore::open(dir.path()).unwrap();
        let doc = store.load(id).unwrap();
        assert_eq!(doc.cues.len(), 3);
        assert_eq!(doc.episode.title, "Scripted");
        assert_eq!(store.list().unwrap().len(), 1);
    }

    #[test]
    fn test_ingestion_is_keyed_by_source() {
        let store = MemoryStore::new();
        let new = || NewEpisode {
            title: "Ep".to_string(),
            source_url: "https://example.com/feed/42".to_string(),
            duration: 0.0,
        };

        let (first, created) = create_or_get_episode(&store, new(), false).unwrap();
        assert!(created);

        let mut advanced = first.clone();
        advanced.episode.stage = Stage::Translated;
        store.save(&advanced).unwrap();

        let (again, created) = create_or_get_episode(&store, new(), false).unwrap();
        assert!(!created);
        assert_eq!(again.id(), first.id());
        assert_eq!(again.episode.stage, Stage::Translated);

        let (restarted, _) = create_or_get_episode(&store, new(), true).unwrap();
        assert_eq!(restarted.episode.stage, Stage::Init);
        assert_eq!(store.load(first.id()).unwrap().episode.stage, Stage::Init);
    }
}

// ============================================================================
// Subtitle And Config Integration Tests
// ============================================================================

mod subtitle_tests {
    use super::*;

    #[test]
    fn test_srt_import_then_bilingual_export() {
        let srt = "1\n00:00:00,000 --> 00:00:02,500\n[Ann] Hello there\n\n2\n00:00:02,500 --> 00:00:05,000\nGeneral Kenobi\n";
        let entries = parse_srt(srt).unwrap();

        let mut doc = EpisodeDocument::new(1, NewEpisode::default());
        for entry in entries {
            doc.add_cue(entry.start.as_secs_f64(), entry.end.as_secs_f64(), entry.text, entry.speaker)
                .unwrap();
        }
        doc.translations
            .push(podscribe::episode::Translation::completed(1, "zh", "你好"));

        let output = SrtFormatter.format(&entries_from_document(&doc, Some("zh")));
        assert!(output.starts_with("1\n00:00:00,000 --> 00:00:02,500\nHello there\n你好\n"));
        assert!(output.contains("2\n00:00:02,500 --> 00:00:05,000\nGeneral Kenobi\n"));
    }
}

mod config_tests {
    use super::*;

    #[test]
    fn test_create_client_per_provider() {
        let mut config = Config::default();
        config.gemini.api_key = Some("g-key".to_string());
        let client = create_client(&config).unwrap();
        assert_eq!(client.name(), "gemini");

        config.provider = Provider::Zhipu;
        assert!(create_client(&config).is_err());

        config.zhipu.api_key = Some("z-key".to_string());
        config.zhipu.model = Some("glm-4-plus".to_string());
        let client = create_client(&config).unwrap();
        assert_eq!(client.name(), "zhipu");
        assert_eq!(client.model(), "glm-4-plus");
    }

    #[test]
    fn test_batch_config_follows_config() {
        let mut config = Config::default();
        config.chunk_size = 25;
        config.max_retries = 5;
        let batch = config.batch_config();
        assert_eq!(batch.chunk_size, 25);
        assert_eq!(batch.retry.max_retries, 5);
    }
}
