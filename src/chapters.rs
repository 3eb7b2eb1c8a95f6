//! Chapter side files as timed-text tracks.
//!
//! File-based hosts have no player exposing chapter cues, so the cue provider
//! is fed from files next to the media instead: CUE sheets (one `TRACK` per
//! chapter, `INDEX 01 mm:ss:ff` as its start, 75 frames per second) and
//! WebVTT files (chapters or subtitles).

use crate::error::Result;
use crate::media::{Cue, TextTrack, TrackKind};
use std::fs;
use std::path::Path;

const CUE_FRAMES_PER_SECOND: f64 = 75.0;

/// Load a `.cue` or `.vtt` file as a chapters track.
///
/// CUE tracks end where the next one starts; the last one ends at
/// `duration`, or is dropped when the duration is unknown.
pub fn load_chapter_file(path: &Path, duration: Option<f64>) -> Result<TextTrack> {
    let content = fs::read_to_string(path)?;
    let is_cue = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("cue"));

    let track = if is_cue {
        parse_cue_sheet(&content, duration)
    } else {
        parse_webvtt(&content, TrackKind::Chapters)
    };
    Ok(track)
}

#[derive(Debug, Default)]
struct CueTrack {
    number: String,
    title: String,
    start: Option<f64>,
}

/// Parse a CUE sheet. Lines that do not parse are skipped.
pub fn parse_cue_sheet(content: &str, duration: Option<f64>) -> TextTrack {
    let mut tracks: Vec<CueTrack> = Vec::new();

    for line in content.lines() {
        let line = line.trim();
        let (keyword, rest) = line.split_once(char::is_whitespace).unwrap_or((line, ""));
        let rest = rest.trim();

        match keyword.to_ascii_uppercase().as_str() {
            "TRACK" => tracks.push(CueTrack {
                number: rest.split_whitespace().next().unwrap_or("").to_string(),
                ..CueTrack::default()
            }),
            "TITLE" => {
                // Album-level TITLE lines precede the first TRACK.
                if let Some(track) = tracks.last_mut() {
                    track.title = unquote(rest).to_string();
                }
            }
            "INDEX" => {
                let mut parts = rest.split_whitespace();
                if parts.next() == Some("01") {
                    if let (Some(track), Some(ts)) = (tracks.last_mut(), parts.next()) {
                        track.start = parse_cue_time(ts);
                    }
                }
            }
            _ => {}
        }
    }

    let mut starts: Vec<(f64, CueTrack)> = tracks
        .into_iter()
        .filter_map(|t| t.start.map(|s| (s, t)))
        .collect();
    starts.sort_by(|a, b| a.0.total_cmp(&b.0));

    let ends: Vec<Option<f64>> = starts
        .iter()
        .skip(1)
        .map(|(s, _)| Some(*s))
        .chain(std::iter::once(duration.filter(|d| d.is_finite())))
        .collect();

    let cues = starts
        .into_iter()
        .zip(ends)
        .filter_map(|((start, track), end)| {
            end.map(|end| Cue {
                id: track.number,
                text: track.title,
                start_time: start,
                end_time: end,
            })
        })
        .collect();

    TextTrack {
        kind: TrackKind::Chapters,
        cues,
    }
}

/// Parse a WebVTT file into a track of the given kind.
pub fn parse_webvtt(content: &str, kind: TrackKind) -> TextTrack {
    let mut cues = Vec::new();
    let normalized = content.replace("\r\n", "\n");

    for block in normalized.split("\n\n") {
        let lines: Vec<&str> = block.lines().map(str::trim_end).filter(|l| !l.is_empty()).collect();
        let Some(timing_idx) = lines.iter().position(|l| l.contains("-->")) else {
            // Header, NOTE, STYLE and REGION blocks carry no timing line.
            continue;
        };

        let Some((start, end)) = parse_vtt_timing(lines[timing_idx]) else {
            continue;
        };
        let id = if timing_idx > 0 { lines[timing_idx - 1] } else { "" };
        cues.push(Cue {
            id: id.to_string(),
            text: lines[timing_idx + 1..].join("\n"),
            start_time: start,
            end_time: end,
        });
    }

    TextTrack { kind, cues }
}

fn unquote(s: &str) -> &str {
    s.strip_prefix('"')
        .and_then(|s| s.strip_suffix('"'))
        .unwrap_or(s)
}

/// `mm:ss:ff` to seconds.
fn parse_cue_time(ts: &str) -> Option<f64> {
    let mut parts = ts.split(':');
    let minutes: f64 = parts.next()?.parse().ok()?;
    let seconds: f64 = parts.next()?.parse().ok()?;
    let frames: f64 = parts.next()?.parse().ok()?;
    if parts.next().is_some() {
        return None;
    }
    Some(minutes * 60.0 + seconds + frames / CUE_FRAMES_PER_SECOND)
}

/// `start --> end [settings]`
fn parse_vtt_timing(line: &str) -> Option<(f64, f64)> {
    let (start, rest) = line.split_once("-->")?;
    let end = rest.split_whitespace().next()?;
    Some((parse_vtt_time(start.trim())?, parse_vtt_time(end)?))
}

/// `hh:mm:ss.ttt` or `mm:ss.ttt` to seconds.
fn parse_vtt_time(ts: &str) -> Option<f64> {
    let parts: Vec<&str> = ts.split(':').collect();
    let (hours, minutes, seconds) = match parts.as_slice() {
        [m, s] => ("0", *m, *s),
        [h, m, s] => (*h, *m, *s),
        _ => return None,
    };
    let hours: f64 = hours.parse().ok()?;
    let minutes: f64 = minutes.parse().ok()?;
    let seconds: f64 = seconds.parse().ok()?;
    Some(hours * 3600.0 + minutes * 60.0 + seconds)
}
