// SRT subtitle format
use super::{SubtitleEntry, SubtitleFormatter};
use crate::error::{PodscribeError, Result};
use regex::Regex;
use std::sync::OnceLock;
use std::time::Duration;

pub struct SrtFormatter;

impl SubtitleFormatter for SrtFormatter {
    fn format(&self, entries: &[SubtitleEntry]) -> String {
        entries
            .iter()
            .map(|entry| {
                format!(
                    "{}\n{} --> {}\n{}\n",
                    entry.index,
                    format_timestamp(entry.start),
                    format_timestamp(entry.end),
                    entry.text
                )
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    fn extension(&self) -> &'static str {
        "srt"
    }
}

fn format_timestamp(d: Duration) -> String {
    let total_secs = d.as_secs();
    let hours = total_secs / 3600;
    let minutes = (total_secs % 3600) / 60;
    let seconds = total_secs % 60;
    let millis = d.subsec_millis();
    format!("{:02}:{:02}:{:02},{:03}", hours, minutes, seconds, millis)
}

fn timing_line() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"^(\d{1,2}):(\d{2}):(\d{2})[,.](\d{1,3})\s*-->\s*(\d{1,2}):(\d{2}):(\d{2})[,.](\d{1,3})",
        )
        .expect("Invalid regex")
    })
}

fn speaker_prefix() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\[([^\]]{1,40})\]\s*(.*)$").expect("Invalid regex"))
}

fn capture_duration(caps: &regex::Captures<'_>, first: usize) -> Duration {
    let num = |i: usize| caps[first + i].parse::<u64>().unwrap_or(0);
    let millis_raw = &caps[first + 3];
    // "5" means 500ms, "05" means 50ms
    let millis = num(3) * 10u64.pow(3 - millis_raw.len() as u32);
    Duration::from_millis(((num(0) * 60 + num(1)) * 60 + num(2)) * 1000 + millis)
}

/// Parse SRT text into entries. A leading `[Name]` on a cue's first line is
/// taken as the speaker.
pub fn parse_srt(content: &str) -> Result<Vec<SubtitleEntry>> {
    let content = content.trim_start_matches('\u{feff}').replace("\r\n", "\n");
    let mut entries = Vec::new();

    for block in content.split("\n\n").map(str::trim).filter(|b| !b.is_empty()) {
        let mut lines = block.lines();
        let mut line = lines.next().unwrap_or_default();

        // The numeric counter is optional in the wild.
        if line.trim().parse::<usize>().is_ok() {
            line = lines.next().unwrap_or_default();
        }

        let caps = timing_line().captures(line.trim()).ok_or_else(|| {
            PodscribeError::Subtitle(format!("bad timing line in block {}: '{}'", entries.len() + 1, line))
        })?;
        let start = capture_duration(&caps, 1);
        let end = capture_duration(&caps, 5);

        let text_lines: Vec<&str> = lines.map(str::trim).filter(|l| !l.is_empty()).collect();
        if text_lines.is_empty() {
            continue;
        }
        let mut text = text_lines.join(" ");
        let mut speaker = None;
        if let Some(caps) = speaker_prefix().captures(&text) {
            speaker = Some(caps[1].trim().to_string());
            text = caps[2].trim().to_string();
        }

        entries.push(SubtitleEntry {
            index: entries.len() + 1,
            start,
            end,
            text,
            speaker,
        });
    }

    if entries.is_empty() {
        return Err(PodscribeError::Subtitle("no subtitle entries found".to_string()));
    }
    Ok(entries)
}
