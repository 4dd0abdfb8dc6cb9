use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use podscribe::batch::{BatchProcessor, BatchRunStats};
use podscribe::config::Config;
use podscribe::episode::{EpisodeDocument, EpisodeId, NewEpisode};
use podscribe::llm::{create_client, StructuredLlm};
use podscribe::proofread::ProofreadJob;
use podscribe::segment::{assign_cues, SegmentationService};
use podscribe::store::{create_or_get_episode, JsonFileStore, Store};
use podscribe::subtitle::{
    entries_from_document, parse_srt, render_review_document, MarkdownDocumentWriter,
    SrtFormatter, SubtitleFormatter,
};
use podscribe::translate::{language_code_to_name, TranslationJob};
use podscribe::workflow::{
    progress, IngestedTranscript, RunOptions, RunReport, StageHandlers, WorkflowRunner,
};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[derive(Parser)]
#[command(name = "podscribe")]
#[command(version, about = "Resumable podcast transcript pipeline")]
#[command(
    long_about = "Ingest a podcast transcript, then proofread, segment into chapters and translate it with an LLM. Every step is saved as it completes, so an interrupted run picks up where it stopped."
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Import an SRT transcript as an episode
    Ingest {
        /// SRT file to import
        srt: PathBuf,

        /// Source url or identifier; re-ingesting the same source reuses the episode
        #[arg(long)]
        source: String,

        /// Episode title (defaults to the file name)
        #[arg(long)]
        title: Option<String>,

        /// Replace the cues of an existing episode and start over
        #[arg(long)]
        force_restart: bool,
    },

    /// Run the remaining workflow steps for an episode
    Run {
        episode: EpisodeId,

        #[arg(long)]
        force_restart: bool,

        /// Drop chapters and redo segmentation and translation
        #[arg(long)]
        force_resegment: bool,
    },

    /// Show workflow progress for one episode, or list all episodes
    Status { episode: Option<EpisodeId> },

    /// Proofread an episode's cues
    Proofread {
        episode: EpisodeId,

        /// Reprocess cues that already have a result
        #[arg(long)]
        force: bool,
    },

    /// Translate an episode's cues
    Translate {
        episode: EpisodeId,

        /// Target language code (e.g., zh, ja, es)
        #[arg(short, long)]
        language: Option<String>,

        #[arg(long)]
        force: bool,
    },

    /// Bind cues to the episode's existing chapters
    Backfill {
        episode: EpisodeId,

        /// Reassign cues that already have a chapter
        #[arg(long)]
        force: bool,

        /// Report what would change without saving
        #[arg(long)]
        dry_run: bool,
    },

    /// Write an episode as SRT or as a markdown review document
    Export {
        episode: EpisodeId,

        /// Output file; `.md` writes the review document, anything else SRT
        #[arg(short, long)]
        output: PathBuf,

        /// Include translations in this language
        #[arg(short, long)]
        language: Option<String>,
    },
}

fn init_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .init();
}

#[derive(Debug, PartialEq)]
enum ExportFormat {
    Srt,
    Markdown,
}

fn export_format(output: &Path) -> ExportFormat {
    match output.extension().and_then(|e| e.to_str()) {
        Some(ext) if ext.eq_ignore_ascii_case("md") => ExportFormat::Markdown,
        _ => ExportFormat::Srt,
    }
}

fn open_store(config: &Config) -> Result<Arc<dyn Store>> {
    let store = JsonFileStore::open(&config.store_dir)
        .with_context(|| format!("Failed to open store at {}", config.store_dir.display()))?;
    Ok(Arc::new(store))
}

fn build_llm(config: &Config) -> Result<Arc<dyn StructuredLlm>> {
    config.validate().context("Configuration validation failed")?;
    let client = create_client(config).context("Failed to create LLM client")?;
    info!("Provider: {} ({})", client.name(), client.model());
    Ok(Arc::from(client))
}

fn ingest(
    store: &dyn Store,
    srt: &Path,
    source: String,
    title: Option<String>,
    force_restart: bool,
) -> Result<EpisodeDocument> {
    if !srt.exists() {
        anyhow::bail!("Input file not found: {}", srt.display());
    }
    let content = std::fs::read_to_string(srt)
        .with_context(|| format!("Failed to read {}", srt.display()))?;
    let entries = parse_srt(&content).context("Failed to parse transcript")?;

    let title = title.unwrap_or_else(|| {
        srt.file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default()
    });
    let duration = entries
        .iter()
        .map(|e| e.end.as_secs_f64())
        .fold(0.0, f64::max);
    let new = NewEpisode {
        title,
        source_url: source,
        duration,
    };

    let (mut doc, created) = create_or_get_episode(store, new, force_restart)?;
    if !created && !doc.cues.is_empty() && !force_restart {
        info!(
            "Episode {} already ingested with {} cues; use --force-restart to replace them",
            doc.id(),
            doc.cues.len()
        );
        return Ok(doc);
    }

    doc.cues.clear();
    doc.chapters.clear();
    doc.translations.clear();
    doc.corrections.clear();
    let mut dropped = 0;
    for entry in entries {
        if let Err(e) = doc.add_cue(
            entry.start.as_secs_f64(),
            entry.end.as_secs_f64(),
            entry.text,
            entry.speaker,
        ) {
            warn!("Skipping subtitle {}: {}", entry.index, e);
            dropped += 1;
        }
    }
    if doc.cues.is_empty() {
        anyhow::bail!("No usable cues in {}", srt.display());
    }
    doc.episode.duration = duration;
    doc.touch();
    store.save(&doc)?;

    info!(
        "Ingested {} cues into episode {} ({} skipped)",
        doc.cues.len(),
        doc.id(),
        dropped
    );
    Ok(doc)
}

fn print_stats(title: &str, stats: &BatchRunStats) {
    println!();
    println!("═══════════════════════════════════════════════════════════════");
    println!("  {}", title);
    println!("═══════════════════════════════════════════════════════════════");
    println!("  Cues:       {}", stats.total);
    println!("  Completed:  {}", stats.completed);
    println!("  Skipped:    {}", stats.skipped);
    println!("  Failed:     {}", stats.failed);
    println!(
        "  Chunks:     {} ({} failed)",
        stats.chunks, stats.failed_chunks
    );
    println!();
}

fn print_report(report: &RunReport) {
    println!();
    println!("═══════════════════════════════════════════════════════════════");
    println!("  Episode {}: {}", report.episode_id, report.final_stage);
    println!("═══════════════════════════════════════════════════════════════");
    if report.steps.is_empty() {
        println!("  Nothing to do");
    } else {
        let steps: Vec<String> = report.steps.iter().map(|s| s.to_string()).collect();
        println!("  Steps:      {}", steps.join(", "));
    }
    if let Some(ref stats) = report.proofread {
        println!("  Proofread:  {}", stats);
    }
    if let Some(ref outcome) = report.segment {
        println!(
            "  Chapters:   {}{}",
            outcome.chapters,
            if outcome.fallback { " (fallback)" } else { "" }
        );
    }
    if let Some(ref stats) = report.translate {
        println!("  Translate:  {}", stats);
    }
    if let Some(ref reason) = report.stalled {
        println!();
        println!("  Stopped: {}", reason);
    }
    println!();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(cli.verbose);

    let config = Config::load().context("Failed to load configuration")?;
    let store = open_store(&config)?;

    match cli.command {
        Command::Ingest {
            srt,
            source,
            title,
            force_restart,
        } => {
            let doc = ingest(store.as_ref(), &srt, source, title, force_restart)?;
            println!("{}", doc.id());
        }

        Command::Run {
            episode,
            force_restart,
            force_resegment,
        } => {
            let llm = build_llm(&config)?;
            let cancelled = Arc::new(AtomicBool::new(false));
            let flag = cancelled.clone();
            ctrlc::set_handler(move || {
                warn!("Interrupt received, stopping after the current step");
                flag.store(true, Ordering::SeqCst);
            })
            .context("Failed to install Ctrl+C handler")?;

            let language = config.target_language.clone();
            info!("Target language: {}", language_code_to_name(&language));
            let runner = WorkflowRunner::new(
                store,
                BatchProcessor::new(llm.clone(), config.batch_config()),
                SegmentationService::new(llm, config.retry_policy()),
                StageHandlers {
                    download: Box::new(IngestedTranscript),
                    transcribe: Box::new(IngestedTranscript),
                    document: Box::new(MarkdownDocumentWriter::new(
                        config.output_dir.clone(),
                        language.clone(),
                    )),
                },
                language,
            )
            .with_cancel_flag(cancelled);

            let report = runner
                .run(
                    episode,
                    RunOptions {
                        force_restart,
                        force_resegment,
                    },
                )
                .await
                .with_context(|| format!("Workflow failed for episode {}", episode))?;
            print_report(&report);
        }

        Command::Status { episode: Some(id) } => {
            let doc = store.load(id)?;
            println!("{}", progress(&doc.episode));
            let (done, total) = doc.translation_progress(&config.target_language);
            println!(
                "  Translated ({}): {}/{}",
                config.target_language, done, total
            );
            println!("  Corrections: {}", doc.corrections.len());
            println!("  Chapters:    {}", doc.chapters.len());
        }

        Command::Status { episode: None } => {
            let episodes = store.list()?;
            if episodes.is_empty() {
                println!("No episodes in {}", config.store_dir.display());
            }
            for episode in episodes {
                println!(
                    "{:>5}  {:<20}  {}",
                    episode.id,
                    episode.stage.to_string(),
                    episode.title
                );
            }
        }

        Command::Proofread { episode, force } => {
            let llm = build_llm(&config)?;
            let mut doc = store.load(episode)?;
            let processor = BatchProcessor::new(llm, config.batch_config());
            let stats = processor
                .run(&ProofreadJob::new(), &mut doc, store.as_ref(), force)
                .await?;
            print_stats(&format!("Proofread episode {}", episode), &stats);
        }

        Command::Translate {
            episode,
            language,
            force,
        } => {
            let llm = build_llm(&config)?;
            let language = language.unwrap_or_else(|| config.target_language.clone());
            let mut doc = store.load(episode)?;
            let processor = BatchProcessor::new(llm, config.batch_config());
            let stats = processor
                .run(&TranslationJob::new(language.clone()), &mut doc, store.as_ref(), force)
                .await?;
            print_stats(
                &format!(
                    "Translate episode {} to {}",
                    episode,
                    language_code_to_name(&language)
                ),
                &stats,
            );
        }

        Command::Backfill {
            episode,
            force,
            dry_run,
        } => {
            let mut doc = store.load(episode)?;
            if doc.chapters.is_empty() {
                anyhow::bail!("Episode {} has no chapters; run segmentation first", episode);
            }
            let stats = if dry_run {
                let mut cues = doc.cues.clone();
                assign_cues(&doc.chapters, &mut cues, force)
            } else {
                let stats = assign_cues(&doc.chapters, &mut doc.cues, force);
                if stats.changed() > 0 {
                    doc.touch();
                    store.save(&doc)?;
                }
                stats
            };

            println!(
                "{}assigned {}, reassigned {}, skipped {}, out of range {}, unassigned {} -> {}",
                if dry_run { "[dry run] " } else { "" },
                stats.assigned,
                stats.reassigned,
                stats.skipped,
                stats.out_of_range,
                stats.unassigned_before,
                stats.unassigned_after
            );
        }

        Command::Export {
            episode,
            output,
            language,
        } => {
            let doc = store.load(episode)?;
            let body = match export_format(&output) {
                ExportFormat::Markdown => {
                    let language = language.unwrap_or_else(|| config.target_language.clone());
                    render_review_document(&doc, &language)
                }
                ExportFormat::Srt => {
                    SrtFormatter.format(&entries_from_document(&doc, language.as_deref()))
                }
            };
            if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(&output, body)
                .with_context(|| format!("Failed to write {}", output.display()))?;
            info!("Exported episode {} to {}", episode, output.display());
        }
    }

    Ok(())
}
