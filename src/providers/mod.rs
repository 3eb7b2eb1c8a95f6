//! One-shot metadata scanners that propose intro/credits ranges.
//!
//! Both providers are pure and fail soft: missing or malformed input simply
//! yields fewer candidates. Their output is raw; the fusion engine normalizes
//! it against the media duration.

pub mod player_data;
pub mod text_tracks;

pub use player_data::ranges_from_player_data;
pub use text_tracks::ranges_from_text_tracks;
