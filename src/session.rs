//! One playback session: wires the host's media handle to the providers, the
//! audio detector and the fusion engine.
//!
//! The host forwards its player events to the `on_*` methods. Everything runs
//! on the caller's thread, one event at a time. After `on_player_stop` the
//! media handle is dropped, so buffers or time updates that still arrive are
//! ignored.

use crate::audio_detector::{AudioSegmentDetector, PlaybackPosition};
use crate::cache_writer::CacheWriter;
use crate::error::Result;
use crate::fusion::{FusionEngine, IngestOutcome, Source};
use crate::media::{HostAdapter, MediaHandle, MediaLocator};
use crate::providers::{ranges_from_player_data, ranges_from_text_tracks};
use crate::ranges::{Interval, SegmentKind, SegmentRanges};
use crate::readiness::{Attempt, ReadinessPolicy, Retry};
use crate::segment_cache::content_key;
use crate::settings::Settings;
use log::{debug, info, warn};
use std::cell::RefCell;
use std::rc::Rc;

/// The segment playback is currently inside.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ActiveSegment {
    pub kind: SegmentKind,
    pub range: Interval,
}

impl ActiveSegment {
    /// Where a skip of this segment lands.
    pub fn skip_target(&self, duration: f64) -> f64 {
        skip_target(self.kind, self.range, duration)
    }
}

/// Seek target for skipping `range`.
///
/// Intros jump to their end. Credits jump to their end but stay one second
/// short of the media end, so the player does not treat the skip as "finished".
pub fn skip_target(kind: SegmentKind, range: Interval, duration: f64) -> f64 {
    match kind {
        SegmentKind::Intro => range.end,
        SegmentKind::Credits => {
            let end = range.end.max(0.0);
            if duration.is_finite() {
                end.min(duration - 1.0).max(0.0)
            } else {
                end
            }
        }
    }
}

/// Consumer-facing output of a session. All methods default to no-ops.
pub trait SessionObserver {
    /// The believed ranges changed because of `source`.
    fn on_belief_changed(&mut self, _source: Source, _ranges: &SegmentRanges) {}

    /// Playback entered a skippable segment.
    fn on_segment_entered(&mut self, _segment: &ActiveSegment) {}

    /// Playback left the segment it was in, or the segment was skipped.
    fn on_segment_left(&mut self, _kind: SegmentKind) {}

    /// A skip was performed. `message` is set when notifications are on.
    fn on_skipped(&mut self, _kind: SegmentKind, _target: f64, _message: Option<&str>) {}
}

/// Observer that ignores everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullObserver;

impl SessionObserver for NullObserver {}

impl<O: SessionObserver + ?Sized> SessionObserver for Rc<RefCell<O>> {
    fn on_belief_changed(&mut self, source: Source, ranges: &SegmentRanges) {
        self.borrow_mut().on_belief_changed(source, ranges)
    }

    fn on_segment_entered(&mut self, segment: &ActiveSegment) {
        self.borrow_mut().on_segment_entered(segment)
    }

    fn on_segment_left(&mut self, kind: SegmentKind) {
        self.borrow_mut().on_segment_left(kind)
    }

    fn on_skipped(&mut self, kind: SegmentKind, target: f64, message: Option<&str>) {
        self.borrow_mut().on_skipped(kind, target, message)
    }
}

fn skip_message(kind: SegmentKind) -> &'static str {
    match kind {
        SegmentKind::Intro => "Intro skipped",
        SegmentKind::Credits => "Credits skipped",
    }
}

/// A media locator waiting for the player to create its element.
struct PendingLocate<M: MediaHandle> {
    locator: Box<dyn MediaLocator<M>>,
    retry: Retry,
}

pub struct AutoSkipSession<M: MediaHandle> {
    settings: Settings,
    engine: FusionEngine,
    detector: AudioSegmentDetector,
    host: Box<dyn HostAdapter>,
    observer: Box<dyn SessionObserver>,
    locating: Option<PendingLocate<M>>,
    media: Option<M>,
    ready: bool,
    active: Option<ActiveSegment>,
}

impl<M: MediaHandle> AutoSkipSession<M> {
    /// Session without a cache or observer.
    pub fn new(settings: Settings, host: Box<dyn HostAdapter>) -> Self {
        let engine = FusionEngine::new(settings.skip_policy());
        let detector = AudioSegmentDetector::new(settings.detector_config());
        Self {
            settings,
            engine,
            detector,
            host,
            observer: Box::new(NullObserver),
            locating: None,
            media: None,
            ready: false,
            active: None,
        }
    }

    pub fn with_cache(mut self, writer: CacheWriter) -> Self {
        self.engine.set_cache(writer);
        self
    }

    pub fn with_observer(mut self, observer: Box<dyn SessionObserver>) -> Self {
        self.observer = observer;
        self
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn engine(&self) -> &FusionEngine {
        &self.engine
    }

    pub fn detector(&self) -> &AudioSegmentDetector {
        &self.detector
    }

    pub fn media(&self) -> Option<&M> {
        self.media.as_ref()
    }

    pub fn media_mut(&mut self) -> Option<&mut M> {
        self.media.as_mut()
    }

    pub fn belief(&self) -> &SegmentRanges {
        self.engine.belief()
    }

    pub fn active(&self) -> Option<ActiveSegment> {
        self.active
    }

    /// True once metadata has loaded and the one-shot sources have run.
    pub fn is_ready(&self) -> bool {
        self.ready
    }

    /// True while a player start is still waiting for its media element.
    pub fn is_locating(&self) -> bool {
        self.locating.is_some()
    }

    /// Apply changed settings. Disabling stops the detector, enabling starts
    /// it again for the current media.
    pub fn update_settings(&mut self, settings: Settings) {
        let was_enabled = self.settings.is_enabled();
        self.engine.set_policy(settings.skip_policy());
        self.settings = settings;

        if !self.settings.is_enabled() {
            self.detector.stop();
            self.set_active(None);
        } else if !was_enabled && self.ready {
            self.start_detector();
        }
    }

    /// The player started a new item. Looks for its media element once and
    /// returns whether it was found. Otherwise the host calls
    /// [`retry_locate`](Self::retry_locate) on each tick until it is found or
    /// `policy` runs out.
    pub fn on_player_start<L>(&mut self, locator: L, policy: ReadinessPolicy) -> bool
    where
        L: MediaLocator<M> + 'static,
    {
        if !self.settings.is_enabled() || !self.settings.auto_start() {
            debug!("autoskip disabled, ignoring player start");
            return false;
        }

        self.locating = Some(PendingLocate {
            locator: Box::new(locator),
            retry: Retry::new(policy),
        });
        self.retry_locate()
    }

    /// One more attempt to find the media element of a started item.
    /// Returns true when it was found and attached by this call.
    pub fn retry_locate(&mut self) -> bool {
        let mut pending = match self.locating.take() {
            Some(pending) => pending,
            None => return false,
        };

        let locator = &mut pending.locator;
        match pending.retry.attempt(|| locator.locate()) {
            Attempt::Ready(media) => {
                self.attach(media);
                true
            }
            Attempt::Pending => {
                self.locating = Some(pending);
                false
            }
            Attempt::GaveUp => {
                warn!("no media element found, autoskip inactive for this item");
                false
            }
        }
    }

    /// Begin a session on `media`, replacing any previous one.
    pub fn attach(&mut self, media: M) {
        self.on_player_stop();
        self.media = Some(media);
        self.on_metadata_loaded();
    }

    /// The media reported its duration. Runs the one-shot sources once.
    pub fn on_metadata_loaded(&mut self) {
        if self.ready {
            return;
        }
        let duration = match self.media.as_ref().and_then(|m| m.known_duration()) {
            Some(duration) => duration,
            None => return,
        };
        self.ready = true;

        let (source_id, tracks) = match self.media.as_ref() {
            Some(media) => (media.source_id(), media.text_tracks()),
            None => return,
        };
        let key = content_key(source_id.as_deref(), duration);
        info!(
            "media ready ({:.1}s, key {})",
            duration,
            key.as_ref().map_or("none", |k| k.as_str())
        );
        self.engine.begin_session(key, Some(duration));

        let outcome = self.engine.seed_from_cache();
        self.notify(Source::Cache, outcome);

        let player_data = self.host.player_data();
        self.ingest(Source::PlayerData, &ranges_from_player_data(player_data.as_ref()));
        self.ingest(Source::TextTracks, &ranges_from_text_tracks(&tracks));

        if self.settings.is_enabled() {
            self.start_detector();
        }
    }

    /// A buffer of planar audio from the tap.
    pub fn on_audio_buffer(&mut self, channels: &[Vec<f32>]) {
        let position = match &self.media {
            Some(media) if self.ready => PlaybackPosition {
                current_time: media.current_time(),
                duration: media.duration(),
            },
            _ => return,
        };

        for update in self.detector.process_buffer(channels, position) {
            debug!(
                "audio baseline: median {:.4}, mad {:.4}, threshold {:.4}, {} candidates",
                update.stats.median,
                update.stats.mad,
                update.stats.threshold,
                update.stats.candidates
            );
            self.ingest(Source::Audio, &update.ranges);
        }
    }

    pub fn on_seek(&mut self) {
        self.detector.on_seek();
    }

    pub fn on_playback_resumed(&mut self) {
        self.detector.resume();
    }

    /// Periodic time update. Returns the segment playback is in, if any.
    pub fn on_time_update(&mut self) -> Option<ActiveSegment> {
        self.engine.tick();

        let now = match &self.media {
            Some(media) if self.ready && media.known_duration().is_some() => media.current_time(),
            _ => return None,
        };

        let current = self
            .engine
            .active_at(now)
            .map(|(kind, range)| ActiveSegment { kind, range });
        self.set_active(current);
        current
    }

    /// Skip the active segment. Returns the seek target, or `None` when
    /// playback is not inside a segment.
    pub fn skip_active(&mut self) -> Result<Option<f64>> {
        let segment = match self.active {
            Some(segment) => segment,
            None => return Ok(None),
        };
        let media = match self.media.as_mut() {
            Some(media) => media,
            None => return Ok(None),
        };

        let target = segment.skip_target(media.duration());
        media.seek(target)?;
        self.engine.consume(segment.kind);
        self.set_active(None);

        info!("{} skipped, seeking to {:.1}s", segment.kind, target);
        let message = self.settings.show_notifications().then(|| skip_message(segment.kind));
        self.observer.on_skipped(segment.kind, target, message);
        Ok(Some(target))
    }

    /// The player stopped. Releases the tap and flushes the cache.
    pub fn on_player_stop(&mut self) {
        self.locating = None;
        self.detector.stop();
        self.engine.end_session();
        self.set_active(None);
        self.media = None;
        self.ready = false;
    }

    // ========== Private methods ==========

    fn start_detector(&mut self) {
        let tap = match self.media.as_mut().map(|m| m.audio_tap()) {
            Some(Ok(tap)) => tap,
            Some(Err(e)) => {
                warn!("audio-based detection disabled: {}", e);
                return;
            }
            None => return,
        };
        self.detector.start(tap);
    }

    fn ingest(&mut self, source: Source, ranges: &SegmentRanges) {
        let outcome = self.engine.ingest(source, ranges);
        self.notify(source, outcome);
    }

    fn notify(&mut self, source: Source, outcome: IngestOutcome) {
        if outcome.updated() {
            self.observer.on_belief_changed(source, self.engine.belief());
        }
    }

    fn set_active(&mut self, current: Option<ActiveSegment>) {
        if current == self.active {
            return;
        }
        if let Some(previous) = self.active {
            self.observer.on_segment_left(previous.kind);
        }
        if let Some(segment) = &current {
            self.observer.on_segment_entered(segment);
        }
        self.active = current;
    }
}

impl<M: MediaHandle> Drop for AutoSkipSession<M> {
    fn drop(&mut self) {
        self.on_player_stop();
    }
}
