use crate::batch::{BatchProcessor, BatchRunStats};
use crate::episode::{EpisodeDocument, EpisodeId, Stage};
use crate::error::{PodscribeError, Result};
use crate::proofread::ProofreadJob;
use crate::segment::{SegmentOutcome, SegmentationService};
use crate::store::Store;
use crate::translate::TranslationJob;
use crate::workflow::state_machine::{can_resume, next_step, progress, NextStep, Step};
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// A step implemented outside the engine (download, transcription, documents).
#[async_trait]
pub trait StageExecutor: Send + Sync {
    fn name(&self) -> &str;
    async fn execute(&self, doc: &mut EpisodeDocument) -> Result<()>;
}

/// The external executors the runner needs.
pub struct StageHandlers {
    pub download: Box<dyn StageExecutor>,
    pub transcribe: Box<dyn StageExecutor>,
    pub document: Box<dyn StageExecutor>,
}

/// Satisfies download and transcription for episodes whose transcript was
/// imported directly.
pub struct IngestedTranscript;

#[async_trait]
impl StageExecutor for IngestedTranscript {
    fn name(&self) -> &str {
        "ingested transcript"
    }

    async fn execute(&self, doc: &mut EpisodeDocument) -> Result<()> {
        if doc.cues.is_empty() {
            return Err(PodscribeError::NoCues(doc.id()));
        }
        debug!("Episode {} has {} ingested cues", doc.id(), doc.cues.len());
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct RunOptions {
    /// Send the episode back to the first stage before running.
    pub force_restart: bool,
    /// Drop chapters and redo segmentation and everything after it.
    pub force_resegment: bool,
}

#[derive(Debug, Clone, Default)]
pub struct RunReport {
    pub episode_id: EpisodeId,
    pub steps: Vec<Step>,
    pub final_stage: Stage,
    /// Why the run stopped short of the terminal stage, if it did.
    pub stalled: Option<String>,
    pub proofread: Option<BatchRunStats>,
    pub translate: Option<BatchRunStats>,
    pub segment: Option<SegmentOutcome>,
}

impl RunReport {
    pub fn is_done(&self) -> bool {
        self.final_stage.is_terminal()
    }
}

enum StepOutcome {
    Advance,
    Stall(String),
}

/// Runs an episode's remaining steps one stage at a time.
pub struct WorkflowRunner {
    store: Arc<dyn Store>,
    processor: BatchProcessor,
    segmenter: SegmentationService,
    handlers: StageHandlers,
    language: String,
    cancelled: Arc<AtomicBool>,
}

impl WorkflowRunner {
    pub fn new(
        store: Arc<dyn Store>,
        processor: BatchProcessor,
        segmenter: SegmentationService,
        handlers: StageHandlers,
        language: impl Into<String>,
    ) -> Self {
        Self {
            store,
            processor,
            segmenter,
            handlers,
            language: language.into(),
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Share a flag that stops the run between steps once set.
    pub fn with_cancel_flag(mut self, cancelled: Arc<AtomicBool>) -> Self {
        self.cancelled = cancelled;
        self
    }

    pub async fn run(&self, episode_id: EpisodeId, options: RunOptions) -> Result<RunReport> {
        let mut doc = self.store.load(episode_id)?;
        self.apply_options(&mut doc, options)?;

        let (resumable, reason) = can_resume(&doc.episode);
        if resumable {
            info!("Resuming episode {}: {}", episode_id, reason);
        }
        debug!("{}", progress(&doc.episode));

        let mut report = RunReport {
            episode_id,
            ..Default::default()
        };

        loop {
            let step = match next_step(&doc.episode) {
                NextStep::Done => break,
                NextStep::Run(step) => step,
            };

            if self.cancelled.load(Ordering::SeqCst) {
                warn!("Cancelled before step '{}'", step);
                return Err(PodscribeError::Cancelled);
            }

            info!("Episode {}: running step '{}'", episode_id, step);
            match self.execute(step, &mut doc, &mut report).await? {
                StepOutcome::Advance => {
                    doc.episode.stage = step.exit_stage();
                    doc.touch();
                    self.store.save(&doc)?;
                    report.steps.push(step);
                    info!("Episode {} is now {}", episode_id, doc.episode.stage);
                }
                StepOutcome::Stall(reason) => {
                    warn!("Episode {} stopped at step '{}': {}", episode_id, step, reason);
                    self.store.save(&doc)?;
                    report.stalled = Some(reason);
                    break;
                }
            }
        }

        report.final_stage = doc.episode.stage;
        Ok(report)
    }

    fn apply_options(&self, doc: &mut EpisodeDocument, options: RunOptions) -> Result<()> {
        if !options.force_restart && !options.force_resegment {
            return Ok(());
        }
        if options.force_restart {
            info!("Force restart: episode {} back to {}", doc.id(), Stage::Init);
            doc.episode.stage = Stage::Init;
        }
        if options.force_resegment {
            info!(
                "Force resegment: dropping {} chapters of episode {}",
                doc.chapters.len(),
                doc.id()
            );
            doc.clear_chapters();
            if doc.episode.stage > Stage::Proofread {
                doc.episode.stage = Stage::Proofread;
            }
        }
        doc.touch();
        self.store.save(doc)
    }

    async fn execute(
        &self,
        step: Step,
        doc: &mut EpisodeDocument,
        report: &mut RunReport,
    ) -> Result<StepOutcome> {
        match step {
            Step::Download => {
                self.handlers.download.execute(doc).await?;
                Ok(StepOutcome::Advance)
            }
            Step::Transcribe => {
                self.handlers.transcribe.execute(doc).await?;
                if doc.cues.is_empty() {
                    return Err(PodscribeError::NoCues(doc.id()));
                }
                Ok(StepOutcome::Advance)
            }
            Step::Proofread => {
                let stats = self
                    .processor
                    .run(&ProofreadJob::new(), doc, self.store.as_ref(), false)
                    .await?;
                report.proofread = Some(stats.clone());
                if stats.is_total_failure() {
                    return Err(PodscribeError::BatchFailed(format!(
                        "proofreading made no progress ({})",
                        stats
                    )));
                }
                // Corrections are optional; leftover cues are picked up by a
                // standalone proofread run.
                Ok(StepOutcome::Advance)
            }
            Step::Segment => {
                let outcome = self.segmenter.segment(doc, false).await?;
                report.segment = Some(outcome);
                Ok(StepOutcome::Advance)
            }
            Step::Translate => {
                let job = TranslationJob::new(self.language.clone());
                let stats = self
                    .processor
                    .run(&job, doc, self.store.as_ref(), false)
                    .await?;
                report.translate = Some(stats.clone());

                if job.is_fully_translated(doc) {
                    return Ok(StepOutcome::Advance);
                }
                if stats.is_total_failure() {
                    return Err(PodscribeError::BatchFailed(format!(
                        "translation made no progress ({})",
                        stats
                    )));
                }
                let (done, total) = doc.translation_progress(job.language());
                Ok(StepOutcome::Stall(format!(
                    "{} of {} cues translated to {}; run again to resume",
                    done,
                    total,
                    job.language()
                )))
            }
            Step::GenerateDocument => {
                self.handlers.document.execute(doc).await?;
                Ok(StepOutcome::Advance)
            }
        }
    }
}
