//! Intro/credits hints from chapter, metadata and subtitle cues.

use crate::keywords::kind_for_label;
use crate::media::{TextTrack, TrackKind};
use crate::ranges::{Interval, SegmentRanges};

fn is_scanned_kind(kind: &TrackKind) -> bool {
    matches!(
        kind,
        TrackKind::Chapters | TrackKind::Metadata | TrackKind::Subtitles
    )
}

/// Scan cues whose `"<id> <text>"` label names an intro or credits segment.
pub fn ranges_from_text_tracks(tracks: &[TextTrack]) -> SegmentRanges {
    let mut ranges = SegmentRanges::new();

    for track in tracks.iter().filter(|t| is_scanned_kind(&t.kind)) {
        for cue in &track.cues {
            let label = format!("{} {}", cue.id, cue.text);
            if let Some(kind) = kind_for_label(label.trim()) {
                ranges.push(kind, Interval::new(cue.start_time, cue.end_time));
            }
        }
    }

    ranges
}
