//! Logger setup for the tools and for hosts that do not bring their own.

use log::LevelFilter;

/// Install `env_logger` at `info`, or `debug` when `debug` is set.
/// `RUST_LOG` overrides both. Later calls are ignored.
pub fn init(debug: bool) {
    let level = if debug { LevelFilter::Debug } else { LevelFilter::Info };

    let mut builder = env_logger::Builder::new();
    builder.filter_level(level).format_timestamp_millis();
    if let Ok(filters) = std::env::var("RUST_LOG") {
        builder.parse_filters(&filters);
    }
    let _ = builder.try_init();
}
