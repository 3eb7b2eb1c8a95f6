//! Host-side collaborators the engine talks to.
//!
//! The engine never inspects the player directly. A host implements these
//! traits once per player integration; tests implement them with plain
//! structs.

use crate::error::Result;
use serde_json::Value;
use std::convert::Infallible;
use std::str::FromStr;

/// Kind of a timed-text track, as the host labels it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrackKind {
    Chapters,
    Metadata,
    Subtitles,
    Captions,
    Descriptions,
    Other(String),
}

/// Parses the host's kind label. Unknown labels become `Other`.
impl FromStr for TrackKind {
    type Err = Infallible;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(match s.to_ascii_lowercase().as_str() {
            "chapters" => TrackKind::Chapters,
            "metadata" => TrackKind::Metadata,
            "subtitles" => TrackKind::Subtitles,
            "captions" => TrackKind::Captions,
            "descriptions" => TrackKind::Descriptions,
            other => TrackKind::Other(other.to_string()),
        })
    }
}

/// One timed-text cue.
#[derive(Debug, Clone, PartialEq)]
pub struct Cue {
    pub id: String,
    pub text: String,
    pub start_time: f64,
    pub end_time: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TextTrack {
    pub kind: TrackKind,
    pub cues: Vec<Cue>,
}

/// The playing media element.
pub trait MediaHandle {
    /// Current playback position in seconds.
    fn current_time(&self) -> f64;

    /// Total duration in seconds. NaN or infinite until metadata has loaded.
    fn duration(&self) -> f64;

    /// Identity of the playing resource (usually its URL), if known.
    fn source_id(&self) -> Option<String>;

    /// Move the playback position.
    fn seek(&mut self, position: f64) -> Result<()>;

    /// Timed-text tracks currently attached to the media.
    fn text_tracks(&self) -> Vec<TextTrack>;

    /// Open a real-time tap on the media's audio output.
    ///
    /// Errors when the runtime has no audio processing or the stream cannot be
    /// tapped (e.g. cross-origin media).
    fn audio_tap(&mut self) -> Result<Box<dyn AudioTap>>;

    /// Duration if it is usable (finite and positive).
    fn known_duration(&self) -> Option<f64> {
        let d = self.duration();
        (d.is_finite() && d > 0.0).then_some(d)
    }
}

/// Source of the opaque per-item metadata object a player exposes.
///
/// Implemented once per player version; the engine only depends on this.
pub trait HostAdapter {
    fn player_data(&self) -> Option<Value>;
}

/// Host without any metadata object.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoHostData;

impl HostAdapter for NoHostData {
    fn player_data(&self) -> Option<Value> {
        None
    }
}

/// Fixed metadata object, e.g. read from a side file.
#[derive(Debug, Default, Clone)]
pub struct StaticHostData(pub Option<Value>);

impl HostAdapter for StaticHostData {
    fn player_data(&self) -> Option<Value> {
        self.0.clone()
    }
}

/// Format of the audio delivered through a tap.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TapFormat {
    pub sample_rate: u32,
    pub channels: usize,
}

/// A live connection to the media's audio. Buffers are pushed by the host
/// into [`crate::session::AutoSkipSession::on_audio_buffer`]; the tap itself
/// only manages setup and teardown.
pub trait AudioTap {
    /// Connect the tap. Called once by the detector on start.
    fn open(&mut self) -> Result<TapFormat>;

    /// Resume a suspended processing graph after playback resumes.
    fn resume(&mut self) {}

    /// Disconnect and release everything. Must tolerate repeated calls.
    fn close(&mut self);
}

/// Finds the media element once the player has created it.
pub trait MediaLocator<M: MediaHandle> {
    fn locate(&mut self) -> Option<M>;
}

impl<M, F> MediaLocator<M> for F
where
    M: MediaHandle,
    F: FnMut() -> Option<M>,
{
    fn locate(&mut self) -> Option<M> {
        self()
    }
}
