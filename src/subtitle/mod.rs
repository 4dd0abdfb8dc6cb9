pub mod markdown;
pub mod srt;

pub use markdown::{render_review_document, MarkdownDocumentWriter};
pub use srt::{parse_srt, SrtFormatter};

use crate::episode::EpisodeDocument;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq)]
pub struct SubtitleEntry {
    pub index: usize,
    pub start: Duration,
    pub end: Duration,
    pub text: String,
    pub speaker: Option<String>,
}

pub trait SubtitleFormatter {
    fn format(&self, entries: &[SubtitleEntry]) -> String;
    fn extension(&self) -> &'static str;
}

/// Subtitle entries for an episode in time order, using corrected text.
///
/// With a `language`, each entry carries the translation on a second line
/// when one is completed.
pub fn entries_from_document(doc: &EpisodeDocument, language: Option<&str>) -> Vec<SubtitleEntry> {
    doc.ordered_cues()
        .into_iter()
        .enumerate()
        .map(|(i, cue)| {
            let mut text = cue.effective_text().trim().to_string();
            if let Some(translated) = language.and_then(|lang| doc.translated_text(cue.id, lang)) {
                text.push('\n');
                text.push_str(translated.trim());
            }
            SubtitleEntry {
                index: i + 1,
                start: Duration::from_secs_f64(cue.start_time.max(0.0)),
                end: Duration::from_secs_f64(cue.end_time.max(0.0)),
                text,
                speaker: cue.speaker.clone(),
            }
        })
        .collect()
}

/// `MM:SS`, or `H:MM:SS` past the hour.
pub fn format_clock(seconds: f64) -> String {
    let total = seconds.max(0.0) as u64;
    let (hours, minutes, secs) = (total / 3600, (total % 3600) / 60, total % 60);
    if hours > 0 {
        format!("{}:{:02}:{:02}", hours, minutes, secs)
    } else {
        format!("{:02}:{:02}", minutes, secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::episode::{NewEpisode, Translation};

    #[test]
    fn test_entries_are_bilingual_when_translated() {
        let mut doc = EpisodeDocument::new(1, NewEpisode::default());
        let a = doc.add_cue(3.0, 4.0, "second", None).unwrap();
        doc.add_cue(1.0, 2.5, "first", None).unwrap();
        doc.translations.push(Translation::completed(a, "zh", "第二"));

        let entries = entries_from_document(&doc, Some("zh"));
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].text, "first");
        assert_eq!(entries[0].index, 1);
        assert_eq!(entries[1].text, "second\n第二");
        assert_eq!(entries[0].start, Duration::from_millis(1000));

        let plain = entries_from_document(&doc, None);
        assert_eq!(plain[1].text, "second");
    }

    #[test]
    fn test_format_clock() {
        assert_eq!(format_clock(0.0), "00:00");
        assert_eq!(format_clock(75.9), "01:15");
        assert_eq!(format_clock(3725.0), "1:02:05");
    }
}
