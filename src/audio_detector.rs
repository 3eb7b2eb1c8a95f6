//! Streaming audio anomaly detector for intro and credits segments.
//!
//! The detector has two states:
//! 1. **Idle**: no tap, no history. Incoming buffers are ignored.
//! 2. **Analyzing**: audio is down-mixed to mono and cut into fixed windows
//!    whose RMS energy is kept in a bounded history.
//!
//! After every completed window the whole history is re-evaluated against a
//! robust baseline (median and MAD of the most recent windows). Windows that
//! deviate from the baseline are merged into segments; long enough segments
//! near the start of the media become the intro candidate, long enough
//! segments near the end become the credits candidate.

use crate::media::AudioTap;
use crate::ranges::{interval_lists_equal, median, merge_segments, Interval, SegmentRanges};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

pub const DEFAULT_WINDOW_SEC: f64 = 0.5;
pub const DEFAULT_BASELINE_WINDOWS: usize = 120;
pub const DEFAULT_Z_THRESHOLD: f64 = 1.4;
pub const DEFAULT_MIN_SEGMENT_SEC: f64 = 8.0;
pub const DEFAULT_MERGE_GAP_SEC: f64 = 1.0;
/// About 30 minutes of history at the default window size.
pub const DEFAULT_MAX_WINDOWS: usize = 3600;

/// Intro candidates must start within this fraction of the duration.
pub const INTRO_ZONE: f64 = 0.35;
/// Credits candidates must end after this fraction of the duration.
pub const CREDITS_ZONE: f64 = 0.65;

/// Scales a MAD to a standard-deviation estimate for normal data.
const MAD_TO_SIGMA: f64 = 1.4826;
const DEGENERATE_MAD: f64 = 1e-7;
const MAD_FLOOR: f64 = 1e-6;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DetectorConfig {
    pub window_sec: f64,
    pub baseline_windows: usize,
    pub z_threshold: f64,
    pub min_segment_sec: f64,
    pub merge_gap_sec: f64,
    pub max_windows: usize,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            window_sec: DEFAULT_WINDOW_SEC,
            baseline_windows: DEFAULT_BASELINE_WINDOWS,
            z_threshold: DEFAULT_Z_THRESHOLD,
            min_segment_sec: DEFAULT_MIN_SEGMENT_SEC,
            merge_gap_sec: DEFAULT_MERGE_GAP_SEC,
            max_windows: DEFAULT_MAX_WINDOWS,
        }
    }
}

/// RMS energy of one fixed-length slice of audio.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AudioWindow {
    pub start: f64,
    pub end: f64,
    pub rms: f64,
}

/// Statistics of the re-evaluation that produced an update.
#[derive(Debug, Clone, PartialEq)]
pub struct BaselineStats {
    pub windows: usize,
    pub baseline_size: usize,
    pub median: f64,
    pub mad: f64,
    pub threshold: f64,
    pub candidates: usize,
}

/// A changed intro/credits proposal.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioUpdate {
    pub ranges: SegmentRanges,
    pub stats: BaselineStats,
}

/// Playback position sampled when a buffer arrives.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlaybackPosition {
    pub current_time: f64,
    pub duration: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum DetectorState {
    Idle,
    Analyzing,
}

pub struct AudioSegmentDetector {
    config: DetectorConfig,
    state: DetectorState,
    tap: Option<Box<dyn AudioTap>>,

    // In-flight window
    window_samples: usize,
    sum_squares: f64,
    sample_count: usize,

    windows: VecDeque<AudioWindow>,
    last_emitted: Option<SegmentRanges>,
}

impl AudioSegmentDetector {
    pub fn new(config: DetectorConfig) -> Self {
        Self {
            config,
            state: DetectorState::Idle,
            tap: None,
            window_samples: 1,
            sum_squares: 0.0,
            sample_count: 0,
            windows: VecDeque::new(),
            last_emitted: None,
        }
    }

    pub fn config(&self) -> &DetectorConfig {
        &self.config
    }

    pub fn is_analyzing(&self) -> bool {
        self.state == DetectorState::Analyzing
    }

    pub fn window_count(&self) -> usize {
        self.windows.len()
    }

    pub fn windows(&self) -> impl Iterator<Item = &AudioWindow> {
        self.windows.iter()
    }

    /// Connect the tap and begin analyzing.
    ///
    /// Returns false, and stays idle, when the tap cannot be opened. Starting
    /// an already running detector is a no-op.
    pub fn start(&mut self, mut tap: Box<dyn AudioTap>) -> bool {
        if self.is_analyzing() {
            debug!("audio analysis already running");
            return true;
        }

        let format = match tap.open() {
            Ok(format) => format,
            Err(e) => {
                warn!("audio-based detection disabled: {}", e);
                tap.close();
                return false;
            }
        };

        self.window_samples =
            ((self.config.window_sec * format.sample_rate as f64).floor() as usize).max(1);
        self.reset_accumulator();
        self.windows.clear();
        self.last_emitted = None;
        self.tap = Some(tap);
        self.state = DetectorState::Analyzing;

        info!(
            "audio analysis started (rate {} Hz, {} channels, window {}s)",
            format.sample_rate, format.channels, self.config.window_sec
        );
        true
    }

    /// Release the tap and forget all history. Safe to call at any time.
    pub fn stop(&mut self) {
        if let Some(mut tap) = self.tap.take() {
            tap.close();
            debug!("audio analysis stopped after {} windows", self.windows.len());
        }
        self.state = DetectorState::Idle;
        self.reset_accumulator();
        self.windows.clear();
        self.last_emitted = None;
    }

    /// Playback resumed; wake a suspended tap.
    pub fn resume(&mut self) {
        if let Some(tap) = self.tap.as_mut() {
            tap.resume();
        }
    }

    /// Discard the partially filled window so audio from both sides of a
    /// seek is never mixed. History is kept.
    pub fn on_seek(&mut self) {
        if self.is_analyzing() {
            self.reset_accumulator();
        }
    }

    /// Feed one buffer of planar samples (one `Vec` per channel).
    ///
    /// Returns the proposals that changed while consuming the buffer; usually
    /// none or one.
    pub fn process_buffer(
        &mut self,
        channels: &[Vec<f32>],
        position: PlaybackPosition,
    ) -> Vec<AudioUpdate> {
        let mut updates = Vec::new();
        if !self.is_analyzing() || channels.is_empty() {
            return updates;
        }

        let num_channels = channels.len();
        let frames = channels.iter().map(|c| c.len()).min().unwrap_or(0);

        for i in 0..frames {
            let sum: f32 = channels.iter().map(|c| c[i]).sum();
            let mono = (sum / num_channels as f32) as f64;
            self.sum_squares += mono * mono;
            self.sample_count += 1;

            if self.sample_count >= self.window_samples {
                let rms = (self.sum_squares / self.sample_count as f64).sqrt();
                let end = position.current_time;
                let start = (end - self.config.window_sec).max(0.0);
                self.reset_accumulator();

                let window = AudioWindow { start, end, rms };
                if let Some(update) = self.push_window(window, position.duration) {
                    updates.push(update);
                }
            }
        }

        updates
    }

    /// Append a completed window and re-evaluate. Ignored while idle.
    pub fn push_window(&mut self, window: AudioWindow, duration: f64) -> Option<AudioUpdate> {
        if !self.is_analyzing() {
            return None;
        }

        self.windows.push_back(window);
        while self.windows.len() > self.config.max_windows {
            self.windows.pop_front();
        }

        self.reevaluate(duration)
    }

    // ========== Private methods ==========

    fn reset_accumulator(&mut self) {
        self.sum_squares = 0.0;
        self.sample_count = 0;
    }

    fn reevaluate(&mut self, duration: f64) -> Option<AudioUpdate> {
        if !duration.is_finite() || duration <= 0.0 || self.windows.is_empty() {
            return None;
        }

        let baseline_size = self.config.baseline_windows.min(self.windows.len()).max(1);
        let values: Vec<f64> = self
            .windows
            .iter()
            .skip(self.windows.len() - baseline_size)
            .map(|w| w.rms)
            .collect();

        let (center, mad) = robust_baseline(&values);
        let threshold = self.config.z_threshold * mad * MAD_TO_SIGMA;

        let flagged: Vec<Interval> = self
            .windows
            .iter()
            .filter(|w| (w.rms - center).abs() > threshold)
            .map(|w| Interval::new(w.start, w.end))
            .collect();

        let candidates: Vec<Interval> = merge_segments(&flagged, self.config.merge_gap_sec)
            .into_iter()
            .filter(|seg| seg.length() >= self.config.min_segment_sec)
            .collect();
        if candidates.is_empty() {
            return None;
        }

        // Candidates are sorted by start.
        let intro = candidates
            .iter()
            .find(|seg| seg.start <= duration * INTRO_ZONE)
            .copied();
        let credits = candidates
            .iter()
            .rev()
            .find(|seg| seg.end >= duration * CREDITS_ZONE)
            .copied();
        if intro.is_none() && credits.is_none() {
            return None;
        }

        let ranges = SegmentRanges {
            intro: intro.into_iter().collect(),
            credits: credits.into_iter().collect(),
        };

        if let Some(last) = &self.last_emitted {
            if interval_lists_equal(&last.intro, &ranges.intro)
                && interval_lists_equal(&last.credits, &ranges.credits)
            {
                return None;
            }
        }

        let stats = BaselineStats {
            windows: self.windows.len(),
            baseline_size,
            median: center,
            mad,
            threshold,
            candidates: candidates.len(),
        };
        debug!(
            "audio candidates {} (windows {}, baseline {}, median {:.5}, mad {:.5}, threshold {:.5})",
            ranges, stats.windows, stats.baseline_size, stats.median, stats.mad, stats.threshold
        );

        self.last_emitted = Some(ranges.clone());
        Some(AudioUpdate { ranges, stats })
    }
}

/// Median and MAD of `values`. A MAD that collapses to zero (constant
/// baseline) is replaced by the standard deviation around the median, scaled
/// to MAD units and floored.
fn robust_baseline(values: &[f64]) -> (f64, f64) {
    let center = median(values);
    let deviations: Vec<f64> = values.iter().map(|v| (v - center).abs()).collect();
    let mad = median(&deviations);
    if mad.is_finite() && mad >= DEGENERATE_MAD {
        return (center, mad);
    }

    let variance =
        values.iter().map(|v| (v - center).powi(2)).sum::<f64>() / values.len().max(1) as f64;
    let fallback = (variance.max(0.0).sqrt() / MAD_TO_SIGMA).max(MAD_FLOOR);
    (center, fallback)
}

impl Drop for AudioSegmentDetector {
    fn drop(&mut self) {
        self.stop();
    }
}
