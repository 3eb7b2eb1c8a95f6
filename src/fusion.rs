//! Source arbitration: turns proposals from every detector into one belief.
//!
//! Each segment kind is tracked independently. A proposal replaces the
//! current belief for a kind when there is no belief yet, or when its source
//! ranks at least as high as the source of the current belief. Equal rank
//! means the latest writer wins, which lets the continuously re-evaluating
//! audio detector refine its own earlier guess.

use crate::cache_writer::CacheWriter;
use crate::ranges::{
    find_range_at, interval_lists_equal, normalize_ranges, Interval, SegmentKind, SegmentRanges,
};
use crate::segment_cache::ContentKey;
use log::{debug, warn};
use std::fmt;

/// Where a proposal came from, lowest authority first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Source {
    Cache,
    Audio,
    TextTracks,
    PlayerData,
}

impl Source {
    pub fn priority(&self) -> u8 {
        match self {
            Source::Cache => 0,
            Source::Audio => 1,
            Source::TextTracks => 2,
            Source::PlayerData => 3,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Source::Cache => "cache",
            Source::Audio => "audio",
            Source::TextTracks => "textTracks",
            Source::PlayerData => "playerData",
        }
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which segment kinds the user wants offered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SkipPolicy {
    pub enabled: bool,
    pub skip_intro: bool,
    pub skip_credits: bool,
}

impl SkipPolicy {
    pub fn allows(&self, kind: SegmentKind) -> bool {
        self.enabled
            && match kind {
                SegmentKind::Intro => self.skip_intro,
                SegmentKind::Credits => self.skip_credits,
            }
    }
}

impl Default for SkipPolicy {
    fn default() -> Self {
        Self {
            enabled: true,
            skip_intro: true,
            skip_credits: true,
        }
    }
}

/// Which kinds an ingest actually changed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestOutcome {
    pub intro: bool,
    pub credits: bool,
}

impl IngestOutcome {
    pub fn updated(&self) -> bool {
        self.intro || self.credits
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct KindState {
    source: Option<Source>,
    consumed: bool,
}

pub struct FusionEngine {
    policy: SkipPolicy,
    belief: SegmentRanges,
    intro: KindState,
    credits: KindState,
    duration: Option<f64>,
    content_key: Option<ContentKey>,
    writer: Option<CacheWriter>,
}

impl FusionEngine {
    pub fn new(policy: SkipPolicy) -> Self {
        Self {
            policy,
            belief: SegmentRanges::new(),
            intro: KindState::default(),
            credits: KindState::default(),
            duration: None,
            content_key: None,
            writer: None,
        }
    }

    /// Persist accepted ranges through `writer`.
    pub fn with_cache(mut self, writer: CacheWriter) -> Self {
        self.set_cache(writer);
        self
    }

    pub fn set_cache(&mut self, writer: CacheWriter) {
        self.writer = Some(writer);
    }

    pub fn policy(&self) -> SkipPolicy {
        self.policy
    }

    pub fn set_policy(&mut self, policy: SkipPolicy) {
        self.policy = policy;
    }

    pub fn belief(&self) -> &SegmentRanges {
        &self.belief
    }

    pub fn source_of(&self, kind: SegmentKind) -> Option<Source> {
        self.state(kind).source
    }

    pub fn is_consumed(&self, kind: SegmentKind) -> bool {
        self.state(kind).consumed
    }

    pub fn content_key(&self) -> Option<&ContentKey> {
        self.content_key.as_ref()
    }

    /// Forget belief, sources and consumed flags.
    pub fn reset_session(&mut self) {
        self.belief.clear();
        self.intro = KindState::default();
        self.credits = KindState::default();
        self.duration = None;
        self.content_key = None;
    }

    /// Start a fresh session for media of the given identity and duration.
    pub fn begin_session(&mut self, key: Option<ContentKey>, duration: Option<f64>) {
        self.reset_session();
        self.content_key = key;
        self.duration = duration.filter(|d| d.is_finite() && *d > 0.0);
    }

    /// Seed the belief from the cache entry of the current content, if any.
    pub fn seed_from_cache(&mut self) -> IngestOutcome {
        let cached = match (&self.writer, &self.content_key) {
            (Some(writer), Some(key)) => writer.read(key),
            _ => None,
        };
        match cached {
            Some(ranges) => self.ingest(Source::Cache, &ranges),
            None => IngestOutcome::default(),
        }
    }

    /// Offer raw ranges from `source`. Returns which kinds changed.
    pub fn ingest(&mut self, source: Source, raw: &SegmentRanges) -> IngestOutcome {
        let normalized = normalize_ranges(raw, self.duration);
        let outcome = IngestOutcome {
            intro: self.apply_kind(source, SegmentKind::Intro, &normalized.intro),
            credits: self.apply_kind(source, SegmentKind::Credits, &normalized.credits),
        };

        if outcome.updated() {
            debug!("segments from {}: {}", source, self.belief);
            if source != Source::Cache {
                self.persist();
            }
        }
        outcome
    }

    /// The segment kind to offer at `time`, if any. Intro wins when both match.
    pub fn query_at(&self, time: f64) -> Option<SegmentKind> {
        self.active_at(time).map(|(kind, _)| kind)
    }

    /// Like [`query_at`](Self::query_at), also returning the matching interval.
    pub fn active_at(&self, time: f64) -> Option<(SegmentKind, Interval)> {
        if !time.is_finite() {
            return None;
        }
        SegmentKind::ALL.into_iter().find_map(|kind| {
            if !self.policy.allows(kind) || self.is_consumed(kind) {
                return None;
            }
            find_range_at(time, self.belief.get(kind)).map(|range| (kind, range))
        })
    }

    /// Mark `kind` as skipped for the rest of the session.
    pub fn consume(&mut self, kind: SegmentKind) {
        self.state_mut(kind).consumed = true;
    }

    /// Let the cache writer flush if its debounce delay has passed.
    pub fn tick(&mut self) {
        if let Some(writer) = self.writer.as_mut() {
            writer.tick();
        }
    }

    /// Flush pending cache writes and reset. Call when playback stops.
    pub fn end_session(&mut self) {
        if let Some(writer) = self.writer.as_mut() {
            if let Err(e) = writer.flush() {
                warn!("failed to save segment cache: {}", e);
            }
        }
        self.reset_session();
    }

    // ========== Private methods ==========

    fn state(&self, kind: SegmentKind) -> &KindState {
        match kind {
            SegmentKind::Intro => &self.intro,
            SegmentKind::Credits => &self.credits,
        }
    }

    fn state_mut(&mut self, kind: SegmentKind) -> &mut KindState {
        match kind {
            SegmentKind::Intro => &mut self.intro,
            SegmentKind::Credits => &mut self.credits,
        }
    }

    fn apply_kind(&mut self, source: Source, kind: SegmentKind, incoming: &[Interval]) -> bool {
        if incoming.is_empty() {
            return false;
        }

        let current = self.belief.get(kind);
        let accept = current.is_empty()
            || self
                .source_of(kind)
                .map_or(true, |held| source.priority() >= held.priority());
        if !accept || interval_lists_equal(current, incoming) {
            return false;
        }

        *self.belief.get_mut(kind) = incoming.to_vec();
        self.state_mut(kind).source = Some(source);
        true
    }

    fn persist(&mut self) {
        if let (Some(writer), Some(key)) = (self.writer.as_mut(), self.content_key.as_ref()) {
            writer.schedule(key, &self.belief);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn intro(start: f64, end: f64) -> SegmentRanges {
        SegmentRanges {
            intro: vec![Interval::new(start, end)],
            credits: Vec::new(),
        }
    }

    fn engine() -> FusionEngine {
        let mut engine = FusionEngine::new(SkipPolicy::default());
        engine.begin_session(None, Some(1440.0));
        engine
    }

    #[test]
    fn test_priority_order() {
        assert!(Source::Cache.priority() < Source::Audio.priority());
        assert!(Source::Audio.priority() < Source::TextTracks.priority());
        assert!(Source::TextTracks.priority() < Source::PlayerData.priority());
    }

    #[test]
    fn test_first_proposal_is_accepted() {
        let mut engine = engine();
        let outcome = engine.ingest(Source::Cache, &intro(85.0, 145.0));
        assert!(outcome.intro && !outcome.credits);
        assert_eq!(engine.source_of(SegmentKind::Intro), Some(Source::Cache));
    }

    #[test]
    fn test_arbitration() {
        let mut engine = engine();
        engine.ingest(Source::TextTracks, &intro(80.0, 140.0));

        // Empty proposal from a stronger source changes nothing.
        let outcome = engine.ingest(Source::PlayerData, &SegmentRanges::new());
        assert!(!outcome.updated());
        assert_eq!(engine.belief().intro, vec![Interval::new(80.0, 140.0)]);

        // Weaker source is rejected.
        assert!(!engine.ingest(Source::Cache, &intro(0.0, 30.0)).updated());
        assert!(!engine.ingest(Source::Audio, &intro(0.0, 30.0)).updated());

        // Stronger, different proposal overwrites.
        assert!(engine.ingest(Source::PlayerData, &intro(85.0, 145.0)).intro);
        assert_eq!(engine.belief().intro, vec![Interval::new(85.0, 145.0)]);
        assert_eq!(engine.source_of(SegmentKind::Intro), Some(Source::PlayerData));
    }

    #[test]
    fn test_same_source_refines_and_equal_is_noop() {
        let mut engine = engine();
        assert!(engine.ingest(Source::Audio, &intro(0.0, 10.0)).updated());
        assert!(engine.ingest(Source::Audio, &intro(0.0, 12.0)).updated());
        assert!(!engine.ingest(Source::Audio, &intro(0.0, 12.0)).updated());
        assert_eq!(engine.belief().intro, vec![Interval::new(0.0, 12.0)]);
    }

    #[test]
    fn test_kinds_are_arbitrated_independently() {
        let mut engine = engine();
        engine.ingest(Source::PlayerData, &intro(85.0, 145.0));
        let audio = SegmentRanges {
            intro: vec![Interval::new(0.0, 20.0)],
            credits: vec![Interval::new(1350.0, 1440.0)],
        };
        let outcome = engine.ingest(Source::Audio, &audio);
        assert!(!outcome.intro && outcome.credits);
        assert_eq!(engine.source_of(SegmentKind::Credits), Some(Source::Audio));
    }

    #[test]
    fn test_ingest_normalizes_against_duration() {
        let mut engine = engine();
        let raw = SegmentRanges {
            intro: vec![Interval::new(-5.0, 30.0), Interval::new(20.0, 40.0)],
            credits: vec![Interval::new(1400.0, 2000.0), Interval::new(f64::NAN, 1.0)],
        };
        engine.ingest(Source::TextTracks, &raw);
        assert_eq!(engine.belief().intro, vec![Interval::new(0.0, 40.0)]);
        assert_eq!(engine.belief().credits, vec![Interval::new(1400.0, 1440.0)]);
    }

    #[test]
    fn test_query_and_consume() {
        let mut engine = engine();
        engine.ingest(
            Source::PlayerData,
            &SegmentRanges {
                intro: vec![Interval::new(85.0, 145.0)],
                credits: vec![Interval::new(1300.0, 1440.0)],
            },
        );
        assert_eq!(engine.query_at(90.0), Some(SegmentKind::Intro));
        assert_eq!(engine.query_at(600.0), None);
        assert_eq!(engine.query_at(1400.0), Some(SegmentKind::Credits));
        assert_eq!(engine.query_at(f64::NAN), None);

        engine.consume(SegmentKind::Intro);
        engine.consume(SegmentKind::Intro);
        assert_eq!(engine.query_at(90.0), None);
        assert_eq!(engine.query_at(1400.0), Some(SegmentKind::Credits));

        engine.reset_session();
        assert!(!engine.is_consumed(SegmentKind::Intro));
        assert!(engine.belief().is_empty());
    }

    #[test]
    fn test_intro_wins_overlap() {
        let mut engine = engine();
        engine.ingest(
            Source::TextTracks,
            &SegmentRanges {
                intro: vec![Interval::new(0.0, 100.0)],
                credits: vec![Interval::new(50.0, 150.0)],
            },
        );
        assert_eq!(engine.active_at(60.0), Some((SegmentKind::Intro, Interval::new(0.0, 100.0))));
    }

    #[test]
    fn test_policy_gates_queries() {
        let mut engine = engine();
        engine.ingest(Source::PlayerData, &intro(85.0, 145.0));
        engine.set_policy(SkipPolicy {
            skip_intro: false,
            ..SkipPolicy::default()
        });
        assert_eq!(engine.query_at(90.0), None);
        engine.set_policy(SkipPolicy {
            enabled: false,
            ..SkipPolicy::default()
        });
        assert_eq!(engine.query_at(90.0), None);
    }
}
