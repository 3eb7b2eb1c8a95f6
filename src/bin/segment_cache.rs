//! Inspect and edit the segment cache.

use autoskip::segment_cache::{CacheStore, FileStore, SegmentCache};
use autoskip::{logging, Settings};
use std::env;
use std::process;

fn print_usage() {
    println!("Segment Cache - Inspect remembered intro and credits ranges");
    println!();
    println!("Usage: segment_cache <COMMAND> [ARGS]");
    println!();
    println!("Commands:");
    println!("  list                    List cached titles, newest first");
    println!("  show <KEY>              Show the ranges cached for one title");
    println!("  remove <KEY>            Forget one title");
    println!("  clear                   Forget everything");
    println!();
    println!("Options:");
    println!("  --file <PATH>           Cache file (default from settings)");
    println!("  --help                  Show this help message");
}

fn save_or_exit(cache: &SegmentCache, store: &mut FileStore) {
    if let Err(e) = cache.save(store) {
        eprintln!("Error saving cache {}: {}", store.path().display(), e);
        process::exit(1);
    }
}

fn main() {
    let args: Vec<String> = env::args().collect();
    let mut positional: Vec<String> = Vec::new();
    let mut file_override: Option<String> = None;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--file" => {
                if i + 1 < args.len() {
                    file_override = Some(args[i + 1].clone());
                    i += 1;
                }
            }
            "--help" | "-h" => {
                print_usage();
                process::exit(0);
            }
            arg => {
                if arg.starts_with("--") {
                    eprintln!("Unknown option: {}", arg);
                    process::exit(1);
                }
                positional.push(arg.to_string());
            }
        }
        i += 1;
    }

    let settings = Settings::load().unwrap_or_else(|e| {
        eprintln!("Warning: could not load settings: {}", e);
        Settings::new()
    });
    logging::init(settings.debug());

    let path = match file_override {
        Some(path) => path.into(),
        None => settings.cache_path().unwrap_or_else(|e| {
            eprintln!("Error: {}", e);
            process::exit(1);
        }),
    };
    let mut store = FileStore::new(path);
    if let Err(e) = store.load() {
        eprintln!("Error reading {}: {}", store.path().display(), e);
        process::exit(1);
    }
    let mut cache = SegmentCache::load(&store, settings.cache_max_entries());

    match positional.first().map(String::as_str) {
        Some("list") => {
            if cache.is_empty() {
                println!("Cache is empty ({})", store.path().display());
                return;
            }
            println!("{} cached titles in {}:", cache.len(), store.path().display());
            for (key, entry) in cache.entries() {
                println!("  {}  [{}]", key, entry.ranges);
            }
        }
        Some("show") => {
            let key = positional.get(1).unwrap_or_else(|| {
                eprintln!("Error: show needs a key");
                process::exit(1);
            });
            match cache.entry(key) {
                Some(entry) => {
                    println!("Key:     {}", key);
                    println!("Written: {} (unix ms)", entry.last_write);
                    println!("Ranges:  {}", entry.ranges);
                }
                None => {
                    eprintln!("No entry for {}", key);
                    process::exit(1);
                }
            }
        }
        Some("remove") => {
            let key = positional.get(1).unwrap_or_else(|| {
                eprintln!("Error: remove needs a key");
                process::exit(1);
            });
            if !cache.remove(key) {
                eprintln!("No entry for {}", key);
                process::exit(1);
            }
            save_or_exit(&cache, &mut store);
            println!("Removed {}", key);
        }
        Some("clear") => {
            let count = cache.len();
            cache.clear();
            save_or_exit(&cache, &mut store);
            println!("Removed {} entries", count);
        }
        _ => {
            print_usage();
            process::exit(1);
        }
    }
}
