//! Interval arithmetic shared by every segment source.
//!
//! All times are seconds from the start of the media. Sources hand in raw,
//! possibly overlapping or out-of-bounds intervals; everything that reaches the
//! fusion engine or the cache has been through [`normalize_ranges`].

use serde::{Deserialize, Serialize};
use std::fmt;

/// A time range in seconds. `end > start` holds once normalized.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Interval {
    pub start: f64,
    pub end: f64,
}

impl Interval {
    pub fn new(start: f64, end: f64) -> Self {
        Self { start, end }
    }

    pub fn length(&self) -> f64 {
        self.end - self.start
    }

    /// Inclusive on both ends.
    pub fn contains(&self, time: f64) -> bool {
        time >= self.start && time <= self.end
    }
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.1}-{:.1}s", self.start, self.end)
    }
}

/// The two kinds of skippable segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SegmentKind {
    Intro,
    Credits,
}

impl SegmentKind {
    pub const ALL: [SegmentKind; 2] = [SegmentKind::Intro, SegmentKind::Credits];

    pub fn as_str(&self) -> &'static str {
        match self {
            SegmentKind::Intro => "intro",
            SegmentKind::Credits => "credits",
        }
    }
}

impl fmt::Display for SegmentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Intervals per segment kind. After normalization each list is sorted by
/// start and free of overlaps.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SegmentRanges {
    #[serde(default)]
    pub intro: Vec<Interval>,
    #[serde(default)]
    pub credits: Vec<Interval>,
}

impl SegmentRanges {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, kind: SegmentKind) -> &[Interval] {
        match kind {
            SegmentKind::Intro => &self.intro,
            SegmentKind::Credits => &self.credits,
        }
    }

    pub fn get_mut(&mut self, kind: SegmentKind) -> &mut Vec<Interval> {
        match kind {
            SegmentKind::Intro => &mut self.intro,
            SegmentKind::Credits => &mut self.credits,
        }
    }

    pub fn push(&mut self, kind: SegmentKind, interval: Interval) {
        self.get_mut(kind).push(interval);
    }

    /// True when neither kind has any interval.
    pub fn is_empty(&self) -> bool {
        self.intro.is_empty() && self.credits.is_empty()
    }

    pub fn clear(&mut self) {
        self.intro.clear();
        self.credits.clear();
    }
}

impl fmt::Display for SegmentRanges {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "intro={}; credits={}",
            format_ranges(&self.intro),
            format_ranges(&self.credits)
        )
    }
}

/// Validate a raw interval and clamp it into `[0, duration]`.
///
/// Returns `None` when either endpoint is not finite, or when the (clamped)
/// interval is empty or reversed. The duration is only applied when it is
/// finite and positive; metadata that has not loaded yet leaves the interval
/// unclamped.
pub fn normalize(range: Interval, duration: Option<f64>) -> Option<Interval> {
    if !range.start.is_finite() || !range.end.is_finite() {
        return None;
    }

    let mut start = range.start;
    let mut end = range.end;
    if let Some(d) = duration.filter(|d| d.is_finite() && *d > 0.0) {
        start = start.clamp(0.0, d);
        end = end.clamp(0.0, d);
    }

    if end <= start {
        return None;
    }
    Some(Interval { start, end })
}

/// Normalize every interval of both kinds, drop invalid ones and merge true
/// overlaps.
pub fn normalize_ranges(raw: &SegmentRanges, duration: Option<f64>) -> SegmentRanges {
    let mut out = SegmentRanges::new();
    for kind in SegmentKind::ALL {
        let valid: Vec<Interval> = raw
            .get(kind)
            .iter()
            .filter_map(|r| normalize(*r, duration))
            .collect();
        *out.get_mut(kind) = merge_segments(&valid, 0.0);
    }
    out
}

/// Sort by start and fold together intervals separated by at most
/// `gap_seconds`. With a zero gap only overlapping or touching intervals merge.
pub fn merge_segments(intervals: &[Interval], gap_seconds: f64) -> Vec<Interval> {
    if intervals.is_empty() {
        return Vec::new();
    }

    let mut sorted = intervals.to_vec();
    sorted.sort_by(|a, b| a.start.total_cmp(&b.start));

    let mut merged: Vec<Interval> = Vec::with_capacity(sorted.len());
    for cur in sorted {
        match merged.last_mut() {
            Some(prev) if cur.start - prev.end <= gap_seconds => {
                prev.end = prev.end.max(cur.end);
            }
            _ => merged.push(cur),
        }
    }
    merged
}

/// Order-statistic median. An empty slice yields 0.
pub fn median(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }

    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));

    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    }
}

/// Element-wise equality of two interval sequences.
pub fn interval_lists_equal(a: &[Interval], b: &[Interval]) -> bool {
    a.len() == b.len()
        && a
            .iter()
            .zip(b)
            .all(|(x, y)| x.start == y.start && x.end == y.end)
}

pub fn is_time_in_ranges(time: f64, ranges: &[Interval]) -> bool {
    ranges.iter().any(|r| r.contains(time))
}

/// First interval containing `time`, if any.
pub fn find_range_at(time: f64, ranges: &[Interval]) -> Option<Interval> {
    ranges.iter().copied().find(|r| r.contains(time))
}

/// `"85.0-145.0s, 1300.0-1440.0s"`, or `"none"` for an empty list.
pub fn format_ranges(ranges: &[Interval]) -> String {
    if ranges.is_empty() {
        return "none".to_string();
    }
    ranges
        .iter()
        .map(|r| r.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}
