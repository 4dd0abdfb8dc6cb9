//! Markdown review document: chapters, then each cue with its translation.

use super::format_clock;
use crate::episode::{Cue, EpisodeDocument};
use crate::error::Result;
use crate::workflow::StageExecutor;
use async_trait::async_trait;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use tracing::info;

pub fn render_review_document(doc: &EpisodeDocument, language: &str) -> String {
    let mut out = String::new();
    let title = if doc.episode.title.is_empty() {
        format!("Episode {}", doc.id())
    } else {
        doc.episode.title.clone()
    };
    let _ = writeln!(out, "# {}\n", title);
    if !doc.episode.source_url.is_empty() {
        let _ = writeln!(out, "Source: {}\n", doc.episode.source_url);
    }

    let ordered = doc.ordered_cues();
    let mut chapters: Vec<_> = doc.chapters.iter().collect();
    chapters.sort_by_key(|c| c.index);

    if chapters.is_empty() {
        write_cues(&mut out, doc, ordered.iter().copied(), language);
        return out;
    }

    let _ = writeln!(out, "## Contents\n");
    for chapter in &chapters {
        let _ = writeln!(
            out,
            "- [{}] {}",
            format_clock(chapter.start_time),
            chapter.title
        );
    }
    out.push('\n');

    for chapter in &chapters {
        let _ = writeln!(out, "## {}\n", chapter.title);
        if !chapter.summary.is_empty() {
            let _ = writeln!(out, "> {}\n", chapter.summary);
        }
        let cues = ordered
            .iter()
            .copied()
            .filter(|c| c.chapter == Some(chapter.index));
        write_cues(&mut out, doc, cues, language);
    }

    let orphans: Vec<&Cue> = ordered
        .iter()
        .copied()
        .filter(|c| !c.chapter.is_some_and(|i| chapters.iter().any(|ch| ch.index == i)))
        .collect();
    if !orphans.is_empty() {
        let _ = writeln!(out, "## Unassigned\n");
        write_cues(&mut out, doc, orphans.into_iter(), language);
    }
    out
}

fn write_cues<'a>(
    out: &mut String,
    doc: &EpisodeDocument,
    cues: impl Iterator<Item = &'a Cue>,
    language: &str,
) {
    for cue in cues {
        let speaker = cue
            .speaker
            .as_deref()
            .map(|s| format!("**{}**: ", s))
            .unwrap_or_default();
        let _ = writeln!(
            out,
            "[{}] {}{}",
            format_clock(cue.start_time),
            speaker,
            cue.effective_text().trim()
        );
        if let Some(translated) = doc.translated_text(cue.id, language) {
            let _ = writeln!(out, "{}", translated.trim());
        }
        out.push('\n');
    }
}

/// Writes `episode-<id>.md` into the output directory.
pub struct MarkdownDocumentWriter {
    output_dir: PathBuf,
    language: String,
}

impl MarkdownDocumentWriter {
    pub fn new(output_dir: impl Into<PathBuf>, language: impl Into<String>) -> Self {
        Self {
            output_dir: output_dir.into(),
            language: language.into(),
        }
    }

    pub fn path_for(&self, doc: &EpisodeDocument) -> PathBuf {
        self.output_dir.join(format!("episode-{}.md", doc.id()))
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }
}

#[async_trait]
impl StageExecutor for MarkdownDocumentWriter {
    fn name(&self) -> &str {
        "markdown document"
    }

    async fn execute(&self, doc: &mut EpisodeDocument) -> Result<()> {
        tokio::fs::create_dir_all(&self.output_dir).await?;
        let path = self.path_for(doc);
        let body = render_review_document(doc, &self.language);
        tokio::fs::write(&path, body).await?;
        info!("Review document written to {}", path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::episode::{Chapter, NewEpisode, Translation};
    use tempfile::TempDir;

    fn doc() -> EpisodeDocument {
        let mut doc = EpisodeDocument::new(
            4,
            NewEpisode {
                title: "Rust Talk".to_string(),
                source_url: "https://example.com/rust".to_string(),
                duration: 120.0,
            },
        );
        let a = doc.add_cue(0.0, 5.0, "Welcome.", Some("Host".to_string())).unwrap();
        let b = doc.add_cue(65.0, 70.0, "Let's dig in.", None).unwrap();
        doc.translations.push(Translation::completed(a, "zh", "欢迎。"));
        doc.chapters = vec![
            Chapter {
                index: 0,
                title: "Intro".to_string(),
                summary: "Hello.".to_string(),
                start_time: 0.0,
                end_time: 60.0,
                model: None,
            },
            Chapter {
                index: 1,
                title: "Deep dive".to_string(),
                summary: String::new(),
                start_time: 60.0,
                end_time: 120.0,
                model: None,
            },
        ];
        doc.cue_mut(a).unwrap().chapter = Some(0);
        doc.cue_mut(b).unwrap().chapter = Some(1);
        doc
    }

    #[test]
    fn test_render_with_chapters() {
        let text = render_review_document(&doc(), "zh");
        assert!(text.starts_with("# Rust Talk"));
        assert!(text.contains("- [01:00] Deep dive"));
        assert!(text.contains("## Intro\n\n> Hello."));
        assert!(text.contains("[00:00] **Host**: Welcome.\n欢迎。"));
        assert!(text.contains("[01:05] Let's dig in."));
        assert!(!text.contains("Unassigned"));
    }

    #[test]
    fn test_render_without_chapters() {
        let mut doc = doc();
        doc.clear_chapters();
        let text = render_review_document(&doc, "zh");
        assert!(!text.contains("## Contents"));
        assert!(text.contains("Welcome."));
    }

    #[tokio::test]
    async fn test_writer_creates_file() {
        let dir = TempDir::new().unwrap();
        let writer = MarkdownDocumentWriter::new(dir.path().join("out"), "zh");
        let mut doc = doc();
        writer.execute(&mut doc).await.unwrap();

        let written = std::fs::read_to_string(dir.path().join("out").join("episode-4.md")).unwrap();
        assert!(written.contains("Deep dive"));
    }
}
