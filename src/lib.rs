pub mod audio_detector;
pub mod audio_source;
pub mod cache_writer;
pub mod chapters;
pub mod clock;
pub mod error;
pub mod fusion;
pub mod keywords;
pub mod logging;
pub mod media;
pub mod providers;
pub mod ranges;
pub mod readiness;
pub mod segment_cache;
pub mod session;
pub mod settings;

pub use audio_detector::{
    AudioSegmentDetector, AudioUpdate, AudioWindow, DetectorConfig, PlaybackPosition,
};
pub use audio_source::{FileAudioSource, FileMedia, FileTap};
pub use cache_writer::CacheWriter;
pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{AutoskipError, Result};
pub use fusion::{FusionEngine, IngestOutcome, SkipPolicy, Source};
pub use media::{
    AudioTap, Cue, HostAdapter, MediaHandle, MediaLocator, TapFormat, TextTrack, TrackKind,
};
pub use ranges::{Interval, SegmentKind, SegmentRanges};
pub use readiness::{Attempt, ReadinessPolicy, Retry};
pub use segment_cache::{content_key, CacheStore, ContentKey, FileStore, MemoryStore, SegmentCache};
pub use session::{ActiveSegment, AutoSkipSession, SessionObserver};
pub use settings::Settings;
