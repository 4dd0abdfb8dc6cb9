//! Binding cues to chapters by start time.

use crate::episode::{Chapter, Cue};
use tracing::warn;

/// A structural problem in a chapter list sorted by index.
#[derive(Debug, Clone, PartialEq)]
pub enum ChapterIssue {
    Overlap { first: u32, second: u32, amount: f64 },
    Gap { first: u32, second: u32, amount: f64 },
    /// The later chapter starts before the earlier one.
    OutOfOrder { first: u32, second: u32 },
    /// A single chapter whose end precedes its start.
    Reversed { index: u32 },
}

impl std::fmt::Display for ChapterIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChapterIssue::Overlap {
                first,
                second,
                amount,
            } => write!(f, "chapters {} and {} overlap by {:.2}s", first, second, amount),
            ChapterIssue::Gap {
                first,
                second,
                amount,
            } => write!(f, "gap of {:.2}s between chapters {} and {}", amount, first, second),
            ChapterIssue::OutOfOrder { first, second } => {
                write!(f, "chapter {} starts before chapter {}", second, first)
            }
            ChapterIssue::Reversed { index } => {
                write!(f, "chapter {} ends before it starts", index)
            }
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct AssignStats {
    pub total: usize,
    /// Previously unassigned cues that received a chapter.
    pub assigned: usize,
    /// Cues whose chapter changed under force.
    pub reassigned: usize,
    /// Cues left as they were.
    pub skipped: usize,
    /// Cues past every chapter, placed in the last one. A cue exactly at
    /// the last chapter's end is in range.
    pub out_of_range: usize,
    pub unassigned_before: usize,
    pub unassigned_after: usize,
    pub chapter_issues: Vec<ChapterIssue>,
}

impl AssignStats {
    pub fn changed(&self) -> usize {
        self.assigned + self.reassigned
    }
}

/// Report overlaps, gaps, out-of-order neighbours and reversed ranges. Gaps
/// and overlaps under a millisecond are ignored. An out-of-order pair is not
/// also reported as an overlap.
pub fn check_chapters(chapters: &[Chapter]) -> Vec<ChapterIssue> {
    const EPSILON: f64 = 1e-3;
    let mut issues = Vec::new();

    for chapter in chapters {
        if chapter.end_time < chapter.start_time {
            issues.push(ChapterIssue::Reversed {
                index: chapter.index,
            });
        }
    }

    for pair in chapters.windows(2) {
        let (a, b) = (&pair[0], &pair[1]);
        let delta = b.start_time - a.end_time;
        if b.start_time < a.start_time {
            issues.push(ChapterIssue::OutOfOrder {
                first: a.index,
                second: b.index,
            });
        } else if delta < -EPSILON {
            issues.push(ChapterIssue::Overlap {
                first: a.index,
                second: b.index,
                amount: -delta,
            });
        } else if delta > EPSILON {
            issues.push(ChapterIssue::Gap {
                first: a.index,
                second: b.index,
                amount: delta,
            });
        }
    }

    issues
}

/// Position of the chapter a cue starting at `t` belongs to, plus whether
/// it fell outside every chapter. `chapters` must be non-empty.
///
/// The first chapter with `start <= t < end` wins. A cue exactly at the end
/// of the last chapter belongs to it and is not reported as out of range,
/// since the last chapter closes the episode. Anything else unmatched falls
/// back to the last chapter and is reported as out of range.
pub fn find_chapter(chapters: &[Chapter], t: f64) -> (usize, bool) {
    let last = chapters.len() - 1;
    if let Some(pos) = chapters
        .iter()
        .position(|c| c.start_time <= t && t < c.end_time)
    {
        return (pos, false);
    }
    if t == chapters[last].end_time {
        return (last, false);
    }
    (last, true)
}

/// Set each cue's chapter reference.
///
/// Without `force` only cues lacking a valid reference are touched. With
/// `force` every cue is recomputed and unchanged ones count as skipped.
pub fn assign_cues(chapters: &[Chapter], cues: &mut [Cue], force: bool) -> AssignStats {
    let mut ordered = chapters.to_vec();
    ordered.sort_by_key(|c| c.index);

    let is_valid = |r: Option<u32>| r.is_some_and(|i| ordered.iter().any(|c| c.index == i));

    let mut stats = AssignStats {
        total: cues.len(),
        unassigned_before: cues.iter().filter(|c| !is_valid(c.chapter)).count(),
        chapter_issues: check_chapters(&ordered),
        ..Default::default()
    };

    for issue in &stats.chapter_issues {
        warn!("Chapter layout: {}", issue);
    }

    if ordered.is_empty() {
        stats.skipped = cues.len();
        stats.unassigned_after = stats.unassigned_before;
        return stats;
    }

    for cue in cues.iter_mut() {
        let had_valid = is_valid(cue.chapter);
        if had_valid && !force {
            stats.skipped += 1;
            continue;
        }

        let (pos, out_of_range) = find_chapter(&ordered, cue.start_time);
        if out_of_range {
            stats.out_of_range += 1;
        }
        let target = ordered[pos].index;

        if cue.chapter == Some(target) {
            stats.skipped += 1;
        } else {
            cue.chapter = Some(target);
            if had_valid {
                stats.reassigned += 1;
            } else {
                stats.assigned += 1;
            }
        }
    }

    stats.unassigned_after = cues.iter().filter(|c| !is_valid(c.chapter)).count();
    stats
}
