//! Segment analyzer - runs a full skip session over a media file offline.
//!
//! Useful for tuning the audio detector. The file is decoded front to back
//! and fed to the session as if it were playing. Output:
//! - Ranges proposed by chapter files and host metadata
//! - Every audio re-evaluation that changed the proposal (with --verbose)
//! - The final believed intro/credits ranges and their sources

use autoskip::chapters::load_chapter_file;
use autoskip::media::StaticHostData;
use autoskip::session::SessionObserver;
use autoskip::{
    logging, AutoSkipSession, CacheWriter, FileAudioSource, FileMedia, SegmentKind, SegmentRanges,
    Settings, Source,
};
use std::env;
use std::fs;
use std::path::PathBuf;
use std::process;

fn print_usage() {
    println!("Segment Analyzer - Detect intro and credits segments in a media file");
    println!();
    println!("Usage: segment_analyzer <FILE> [OPTIONS]");
    println!();
    println!("Options:");
    println!("  --chapters <FILE>       CUE sheet or WebVTT file with chapter cues");
    println!("  --metadata <FILE>       JSON file with player metadata for the item");
    println!("  --window <SEC>          Analysis window length (default: 0.5)");
    println!("  --baseline <N>          Windows in the rolling baseline (default: 120)");
    println!("  --z <Z>                 Outlier threshold in MAD units (default: 1.4)");
    println!("  --min-segment <SEC>     Shortest segment reported (default: 8)");
    println!("  --merge-gap <SEC>       Gap bridged when merging windows (default: 1)");
    println!("  --no-cache              Neither read nor write the segment cache");
    println!("  --verbose, -v           Log every proposal change");
    println!("  --help                  Show this help message");
    println!();
    println!("Tuning tips:");
    println!("  - If nothing is found: lower --z or --min-segment");
    println!("  - If dialogue scenes are flagged: raise --z or --baseline");
}

fn format_timestamp(seconds: f64) -> String {
    let mins = (seconds / 60.0) as u32;
    let secs = seconds % 60.0;
    format!("{:02}:{:05.2}", mins, secs)
}

/// Prints belief changes as they happen.
struct PrintObserver;

impl SessionObserver for PrintObserver {
    fn on_belief_changed(&mut self, source: Source, ranges: &SegmentRanges) {
        println!("  [{}] {}", source, ranges);
    }
}

fn parse_value<T: std::str::FromStr>(args: &[String], i: usize, name: &str) -> T {
    match args.get(i + 1).map(|v| v.parse()) {
        Some(Ok(value)) => value,
        _ => {
            eprintln!("Error: {} needs a valid value", name);
            process::exit(1);
        }
    }
}

fn main() {
    let args: Vec<String> = env::args().collect();

    if args.len() < 2 {
        print_usage();
        process::exit(1);
    }

    let mut media_file: Option<PathBuf> = None;
    let mut chapters_file: Option<PathBuf> = None;
    let mut metadata_file: Option<PathBuf> = None;
    let mut use_cache = true;
    let mut overrides = Settings::new();

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--chapters" => {
                chapters_file = Some(PathBuf::from(parse_value::<String>(&args, i, "--chapters")));
                i += 1;
            }
            "--metadata" => {
                metadata_file = Some(PathBuf::from(parse_value::<String>(&args, i, "--metadata")));
                i += 1;
            }
            "--window" => {
                overrides.window_sec = Some(parse_value(&args, i, "--window"));
                i += 1;
            }
            "--baseline" => {
                overrides.baseline_windows = Some(parse_value(&args, i, "--baseline"));
                i += 1;
            }
            "--z" => {
                overrides.z_threshold = Some(parse_value(&args, i, "--z"));
                i += 1;
            }
            "--min-segment" => {
                overrides.min_segment_sec = Some(parse_value(&args, i, "--min-segment"));
                i += 1;
            }
            "--merge-gap" => {
                overrides.merge_gap_sec = Some(parse_value(&args, i, "--merge-gap"));
                i += 1;
            }
            "--no-cache" => use_cache = false,
            "--verbose" | "-v" => overrides.debug = Some(true),
            "--help" | "-h" => {
                print_usage();
                process::exit(0);
            }
            arg => {
                if arg.starts_with("--") {
                    eprintln!("Unknown option: {}", arg);
                    process::exit(1);
                }
                if media_file.is_none() {
                    media_file = Some(PathBuf::from(arg));
                }
            }
        }
        i += 1;
    }

    let media_file = media_file.unwrap_or_else(|| {
        eprintln!("Error: No media file specified");
        print_usage();
        process::exit(1);
    });

    let mut settings = Settings::load().unwrap_or_else(|e| {
        eprintln!("Warning: could not load settings: {}", e);
        Settings::new()
    });
    settings.merge(&overrides);
    // Offline analysis ignores the user's on/off switches.
    settings.enabled = Some(true);
    settings.skip_intro = Some(true);
    settings.skip_credits = Some(true);
    logging::init(settings.debug());

    println!("Segment Analyzer");
    println!("================");
    println!("File: {}", media_file.display());
    println!();

    let mut source = FileAudioSource::open(&media_file).unwrap_or_else(|e| {
        eprintln!("Error opening file: {}", e);
        process::exit(1);
    });
    let duration = source.duration_secs();

    println!("Audio Info:");
    println!("  Sample rate: {} Hz", source.sample_rate());
    println!("  Channels: {}", source.channels());
    match duration {
        Some(d) => println!("  Duration: {}", format_timestamp(d)),
        None => println!("  Duration: unknown (chapter ends and cache keys need it)"),
    }
    println!();

    let tracks = match &chapters_file {
        Some(path) => match load_chapter_file(path, duration) {
            Ok(track) => vec![track],
            Err(e) => {
                eprintln!("Warning: cannot read chapters {}: {}", path.display(), e);
                Vec::new()
            }
        },
        None => Vec::new(),
    };

    let metadata = metadata_file.as_ref().and_then(|path| {
        fs::read_to_string(path)
            .map_err(|e| e.to_string())
            .and_then(|s| serde_json::from_str::<serde_json::Value>(&s).map_err(|e| e.to_string()))
            .map_err(|e| eprintln!("Warning: cannot read metadata {}: {}", path.display(), e))
            .ok()
    });

    settings.print("Settings");
    println!();

    let mut session = AutoSkipSession::new(settings.clone(), Box::new(StaticHostData(metadata)))
        .with_observer(Box::new(PrintObserver));
    if use_cache {
        match CacheWriter::from_settings(&settings) {
            Ok(writer) => session = session.with_cache(writer),
            Err(e) => eprintln!("Warning: segment cache disabled: {}", e),
        }
    }

    println!("Proposals:");
    session.attach(FileMedia::new(&source, tracks));

    let chunk_frames = (source.sample_rate() / 10).max(1) as usize;
    while let Some(chunk) = source.read_chunk(chunk_frames) {
        let now = source.position_secs();
        if let Some(media) = session.media_mut() {
            media.set_time(now);
        }
        session.on_audio_buffer(&chunk);
        session.on_time_update();
    }

    println!();
    println!("Analyzed {} windows", session.detector().window_count());
    println!();
    println!("Result:");
    for kind in SegmentKind::ALL {
        let ranges = session.belief().get(kind);
        let source = session
            .engine()
            .source_of(kind)
            .map_or("-".to_string(), |s| s.to_string());
        if ranges.is_empty() {
            println!("  {:<8} none", kind.as_str());
        }
        for range in ranges {
            println!(
                "  {:<8} {} - {}  ({:.1}s, from {})",
                kind.as_str(),
                format_timestamp(range.start),
                format_timestamp(range.end),
                range.length(),
                source
            );
        }
    }

    session.on_player_stop();
}
