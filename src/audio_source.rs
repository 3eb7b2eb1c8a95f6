//! Decoded audio from media files, for offline analysis.
//!
//! Supports whatever the enabled symphonia features decode (WAV, MP3, FLAC).
//! Samples are delivered planar as `f32` in `[-1, 1]`, the layout the
//! detector consumes.

use crate::error::{AutoskipError, Result};
use crate::media::{AudioTap, MediaHandle, TapFormat, TextTrack};
use log::{debug, warn};
use std::fs::File;
use std::path::{Path, PathBuf};
use symphonia::core::audio::{AudioBuffer, AudioBufferRef, Signal};
use symphonia::core::codecs::{Decoder, DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::{FormatOptions, FormatReader};
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use symphonia::core::sample::Sample;

/// A media file being decoded front to back.
pub struct FileAudioSource {
    path: PathBuf,
    format_reader: Box<dyn FormatReader>,
    decoder: Box<dyn Decoder>,
    track_id: u32,
    sample_rate: u32,
    channels: usize,
    duration: Option<f64>,
    buffer: Vec<Vec<f32>>,
    frames_read: u64,
    finished: bool,
}

impl FileAudioSource {
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path)?;
        let mss = MediaSourceStream::new(Box::new(file), Default::default());

        let mut hint = Hint::new();
        if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
            hint.with_extension(ext);
        }

        let probed = symphonia::default::get_probe().format(
            &hint,
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )?;
        let format_reader = probed.format;

        let track = format_reader
            .tracks()
            .iter()
            .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
            .ok_or_else(|| AutoskipError::NoAudioTrack(path.display().to_string()))?;

        let sample_rate = track.codec_params.sample_rate.ok_or_else(|| {
            AutoskipError::AudioUnavailable(format!("unknown sample rate in {}", path.display()))
        })?;
        let channels = track.codec_params.channels.map(|c| c.count()).unwrap_or(1).max(1);
        let duration = track
            .codec_params
            .n_frames
            .map(|n| n as f64 / sample_rate as f64);
        let track_id = track.id;
        let decoder = symphonia::default::get_codecs()
            .make(&track.codec_params, &DecoderOptions::default())?;

        debug!(
            "opened {} ({} Hz, {} channels, {:?}s)",
            path.display(),
            sample_rate,
            channels,
            duration
        );

        Ok(Self {
            path: path.to_path_buf(),
            format_reader,
            decoder,
            track_id,
            sample_rate,
            channels,
            duration,
            buffer: vec![Vec::new(); channels],
            frames_read: 0,
            finished: false,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    /// Duration from the container header, if it declares one.
    pub fn duration_secs(&self) -> Option<f64> {
        self.duration
    }

    /// Seconds of audio handed out so far.
    pub fn position_secs(&self) -> f64 {
        self.frames_read as f64 / self.sample_rate as f64
    }

    pub fn tap_format(&self) -> TapFormat {
        TapFormat {
            sample_rate: self.sample_rate,
            channels: self.channels,
        }
    }

    /// Next `frames` frames, one `Vec` per channel. The last chunk may be
    /// shorter; `None` once the file is exhausted.
    pub fn read_chunk(&mut self, frames: usize) -> Option<Vec<Vec<f32>>> {
        while !self.finished && self.buffer[0].len() < frames {
            self.refill_buffer();
        }

        let n = frames.min(self.buffer[0].len());
        if n == 0 {
            return None;
        }

        let chunk = self
            .buffer
            .iter_mut()
            .map(|ch| ch.drain(..n).collect())
            .collect();
        self.frames_read += n as u64;
        Some(chunk)
    }

    fn refill_buffer(&mut self) {
        let packet = match self.format_reader.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                self.finished = true;
                return;
            }
            Err(e) => {
                warn!("stopped reading {}: {}", self.path.display(), e);
                self.finished = true;
                return;
            }
        };

        if packet.track_id() != self.track_id {
            return;
        }

        match self.decoder.decode(&packet) {
            Ok(decoded) => extend_planar(&decoded, &mut self.buffer),
            Err(SymphoniaError::DecodeError(e)) => {
                // A corrupt packet only loses its own samples.
                debug!("skipping undecodable packet: {}", e);
            }
            Err(e) => {
                warn!("stopped decoding {}: {}", self.path.display(), e);
                self.finished = true;
            }
        }
    }
}

/// Append a decoded buffer to `out`. Missing channels repeat the last one.
fn extend_planar(decoded: &AudioBufferRef, out: &mut [Vec<f32>]) {
    match decoded {
        AudioBufferRef::U8(buf) => push_channels(&**buf, out, |s| (s as f32 - 128.0) / 128.0),
        AudioBufferRef::U16(buf) => push_channels(&**buf, out, |s| (s as f32 - 32768.0) / 32768.0),
        AudioBufferRef::U24(buf) => {
            push_channels(&**buf, out, |s| (s.inner() as f32 - 8_388_608.0) / 8_388_608.0)
        }
        AudioBufferRef::U32(buf) => {
            push_channels(&**buf, out, |s| ((s as f64 - 2_147_483_648.0) / 2_147_483_648.0) as f32)
        }
        AudioBufferRef::S8(buf) => push_channels(&**buf, out, |s| s as f32 / 128.0),
        AudioBufferRef::S16(buf) => push_channels(&**buf, out, |s| s as f32 / 32768.0),
        AudioBufferRef::S24(buf) => push_channels(&**buf, out, |s| s.inner() as f32 / 8_388_608.0),
        AudioBufferRef::S32(buf) => {
            push_channels(&**buf, out, |s| (s as f64 / 2_147_483_648.0) as f32)
        }
        AudioBufferRef::F32(buf) => push_channels(&**buf, out, |s| s),
        AudioBufferRef::F64(buf) => push_channels(&**buf, out, |s| s as f32),
    }
}

fn push_channels<S: Sample>(
    buf: &AudioBuffer<S>,
    out: &mut [Vec<f32>],
    convert: impl Fn(S) -> f32,
) {
    let source_channels = buf.spec().channels.count();
    if source_channels == 0 {
        return;
    }
    for (ch, dst) in out.iter_mut().enumerate() {
        let src = buf.chan(ch.min(source_channels - 1));
        dst.extend(src.iter().map(|&s| convert(s)));
    }
}

/// Tap over a file source. Buffers are pulled from the source by the caller;
/// the tap only reports the format.
pub struct FileTap {
    format: TapFormat,
}

impl FileTap {
    pub fn new(format: TapFormat) -> Self {
        Self { format }
    }
}

impl AudioTap for FileTap {
    fn open(&mut self) -> Result<TapFormat> {
        Ok(self.format)
    }

    fn close(&mut self) {}
}

/// A media file played back offline, as a [`MediaHandle`].
///
/// The playback position is advanced by whoever feeds the decoded audio to
/// the session; seeking only moves that position.
pub struct FileMedia {
    source_id: String,
    duration: f64,
    time: f64,
    tracks: Vec<TextTrack>,
    format: TapFormat,
}

impl FileMedia {
    pub fn new(source: &FileAudioSource, tracks: Vec<TextTrack>) -> Self {
        Self {
            source_id: source.path().display().to_string(),
            duration: source.duration_secs().unwrap_or(f64::NAN),
            time: 0.0,
            tracks,
            format: source.tap_format(),
        }
    }

    pub fn set_time(&mut self, time: f64) {
        self.time = time;
    }
}

impl MediaHandle for FileMedia {
    fn current_time(&self) -> f64 {
        self.time
    }

    fn duration(&self) -> f64 {
        self.duration
    }

    fn source_id(&self) -> Option<String> {
        Some(self.source_id.clone())
    }

    fn seek(&mut self, position: f64) -> Result<()> {
        if !position.is_finite() || position < 0.0 {
            return Err(AutoskipError::SeekFailed {
                position,
                reason: "position out of range".to_string(),
            });
        }
        self.time = position;
        Ok(())
    }

    fn text_tracks(&self) -> Vec<TextTrack> {
        self.tracks.clone()
    }

    fn audio_tap(&mut self) -> Result<Box<dyn AudioTap>> {
        Ok(Box::new(FileTap::new(self.format)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    /// Minimal 16-bit PCM WAV writer.
    fn write_wav(path: &Path, sample_rate: u32, channels: u16, samples: &[i16]) {
        let data_len = (samples.len() * 2) as u32;
        let block_align = channels * 2;
        let mut bytes = Vec::new();
        bytes.extend_from_slice(b"RIFF");
        bytes.extend_from_slice(&(36 + data_len).to_le_bytes());
        bytes.extend_from_slice(b"WAVE");
        bytes.extend_from_slice(b"fmt ");
        bytes.extend_from_slice(&16u32.to_le_bytes());
        bytes.extend_from_slice(&1u16.to_le_bytes());
        bytes.extend_from_slice(&channels.to_le_bytes());
        bytes.extend_from_slice(&sample_rate.to_le_bytes());
        bytes.extend_from_slice(&(sample_rate * block_align as u32).to_le_bytes());
        bytes.extend_from_slice(&block_align.to_le_bytes());
        bytes.extend_from_slice(&16u16.to_le_bytes());
        bytes.extend_from_slice(b"data");
        bytes.extend_from_slice(&data_len.to_le_bytes());
        for s in samples {
            bytes.extend_from_slice(&s.to_le_bytes());
        }
        File::create(path).unwrap().write_all(&bytes).unwrap();
    }

    #[test]
    fn test_decode_wav() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tone.wav");
        // One second of stereo at 8 kHz: left at half scale, right silent.
        let samples: Vec<i16> = (0..8000).flat_map(|_| [16384i16, 0]).collect();
        write_wav(&path, 8000, 2, &samples);

        let mut source = FileAudioSource::open(&path).unwrap();
        assert_eq!(source.sample_rate(), 8000);
        assert_eq!(source.channels(), 2);
        assert_eq!(source.duration_secs(), Some(1.0));

        let mut total = 0;
        while let Some(chunk) = source.read_chunk(1000) {
            assert_eq!(chunk.len(), 2);
            assert!((chunk[0][0] - 0.5).abs() < 1e-6);
            assert_eq!(chunk[1][0], 0.0);
            total += chunk[0].len();
        }
        assert_eq!(total, 8000);
        assert_eq!(source.position_secs(), 1.0);
    }

    #[test]
    fn test_missing_file() {
        assert!(matches!(
            FileAudioSource::open(Path::new("/nonexistent/file.wav")),
            Err(AutoskipError::Io(_))
        ));
    }

    #[test]
    fn test_file_media() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("short.wav");
        write_wav(&path, 8000, 1, &[0i16; 800]);
        let source = FileAudioSource::open(&path).unwrap();

        let mut media = FileMedia::new(&source, Vec::new());
        assert_eq!(media.known_duration(), Some(0.1));
        media.seek(0.05).unwrap();
        assert_eq!(media.current_time(), 0.05);
        assert!(media.seek(f64::NAN).is_err());

        let mut tap = media.audio_tap().unwrap();
        assert_eq!(tap.open().unwrap().sample_rate, 8000);
    }
}
