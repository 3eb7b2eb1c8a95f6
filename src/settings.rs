use crate::audio_detector::DetectorConfig;
use crate::cache_writer::DEFAULT_WRITE_DELAY;
use crate::error::{AutoskipError, Result};
use crate::fusion::SkipPolicy;
use crate::segment_cache::{default_cache_path, DEFAULT_MAX_ENTRIES};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// User settings that can be saved to a file.
///
/// Every field is optional so a file only has to name what it changes;
/// accessors supply the defaults.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub auto_start: Option<bool>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub skip_intro: Option<bool>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub skip_credits: Option<bool>,

    /// Older name of `skip_intro`, read only when `skip_intro` is absent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skip_openings: Option<bool>,

    /// Older name of `skip_credits`, read only when `skip_credits` is absent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skip_endings: Option<bool>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub show_notifications: Option<bool>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub debug: Option<bool>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub window_sec: Option<f64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub baseline_windows: Option<usize>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub z_threshold: Option<f64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_segment_sec: Option<f64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub merge_gap_sec: Option<f64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_windows: Option<usize>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache_max_entries: Option<usize>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache_write_delay_ms: Option<u64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache_path: Option<PathBuf>,
}

impl Settings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the settings file path (~/.state/autoskip/settings.toml)
    pub fn get_settings_path() -> Result<PathBuf> {
        let home = std::env::var("HOME").map_err(|_| AutoskipError::NoHomeDir)?;
        Ok(Path::new(&home)
            .join(".state")
            .join("autoskip")
            .join("settings.toml"))
    }

    /// Load settings from the default file. A missing file yields empty settings.
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::get_settings_path()?)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Settings::new());
        }

        let content = fs::read_to_string(path)?;
        let settings: Settings = toml::from_str(&content)?;
        Ok(settings)
    }

    /// Save settings to the default file
    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::get_settings_path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let toml_string = toml::to_string_pretty(self)?;
        fs::write(path, toml_string)?;
        Ok(())
    }

    // ========== Effective values ==========

    pub fn is_enabled(&self) -> bool {
        self.enabled.unwrap_or(true)
    }

    pub fn auto_start(&self) -> bool {
        self.auto_start.unwrap_or(true)
    }

    pub fn skip_intro(&self) -> bool {
        self.skip_intro.or(self.skip_openings).unwrap_or(true)
    }

    pub fn skip_credits(&self) -> bool {
        self.skip_credits.or(self.skip_endings).unwrap_or(true)
    }

    pub fn show_notifications(&self) -> bool {
        self.show_notifications.unwrap_or(true)
    }

    pub fn debug(&self) -> bool {
        self.debug.unwrap_or(false)
    }

    pub fn skip_policy(&self) -> SkipPolicy {
        SkipPolicy {
            enabled: self.is_enabled(),
            skip_intro: self.skip_intro(),
            skip_credits: self.skip_credits(),
        }
    }

    pub fn detector_config(&self) -> DetectorConfig {
        let defaults = DetectorConfig::default();
        DetectorConfig {
            window_sec: self.window_sec.unwrap_or(defaults.window_sec),
            baseline_windows: self.baseline_windows.unwrap_or(defaults.baseline_windows),
            z_threshold: self.z_threshold.unwrap_or(defaults.z_threshold),
            min_segment_sec: self.min_segment_sec.unwrap_or(defaults.min_segment_sec),
            merge_gap_sec: self.merge_gap_sec.unwrap_or(defaults.merge_gap_sec),
            max_windows: self.max_windows.unwrap_or(defaults.max_windows),
        }
    }

    pub fn cache_max_entries(&self) -> usize {
        self.cache_max_entries.unwrap_or(DEFAULT_MAX_ENTRIES)
    }

    pub fn write_delay(&self) -> Duration {
        self.cache_write_delay_ms
            .map(Duration::from_millis)
            .unwrap_or(DEFAULT_WRITE_DELAY)
    }

    pub fn cache_path(&self) -> Result<PathBuf> {
        match &self.cache_path {
            Some(path) => Ok(path.clone()),
            None => default_cache_path(),
        }
    }

    /// Merge these settings with another, preferring values from other
    pub fn merge(&mut self, other: &Settings) {
        fn take<T: Clone>(dst: &mut Option<T>, src: &Option<T>) {
            if src.is_some() {
                *dst = src.clone();
            }
        }

        take(&mut self.enabled, &other.enabled);
        take(&mut self.auto_start, &other.auto_start);
        take(&mut self.skip_intro, &other.skip_intro);
        take(&mut self.skip_credits, &other.skip_credits);
        take(&mut self.skip_openings, &other.skip_openings);
        take(&mut self.skip_endings, &other.skip_endings);
        take(&mut self.show_notifications, &other.show_notifications);
        take(&mut self.debug, &other.debug);
        take(&mut self.window_sec, &other.window_sec);
        take(&mut self.baseline_windows, &other.baseline_windows);
        take(&mut self.z_threshold, &other.z_threshold);
        take(&mut self.min_segment_sec, &other.min_segment_sec);
        take(&mut self.merge_gap_sec, &other.merge_gap_sec);
        take(&mut self.max_windows, &other.max_windows);
        take(&mut self.cache_max_entries, &other.cache_max_entries);
        take(&mut self.cache_write_delay_ms, &other.cache_write_delay_ms);
        take(&mut self.cache_path, &other.cache_path);
    }

    /// Print the effective settings in a human-readable format
    pub fn print(&self, title: &str) {
        let on_off = |b: bool| if b { "enabled" } else { "disabled" };
        let detector = self.detector_config();

        println!("{}:", title);
        println!("  Autoskip:           {}", on_off(self.is_enabled()));
        println!("  Auto start:         {}", on_off(self.auto_start()));
        println!("  Skip intro:         {}", on_off(self.skip_intro()));
        println!("  Skip credits:       {}", on_off(self.skip_credits()));
        println!("  Notifications:      {}", on_off(self.show_notifications()));
        println!("  Debug logging:      {}", on_off(self.debug()));
        println!("  Window:             {} seconds", detector.window_sec);
        println!("  Baseline windows:   {}", detector.baseline_windows);
        println!("  Z threshold:        {}", detector.z_threshold);
        println!("  Min segment:        {} seconds", detector.min_segment_sec);
        println!("  Merge gap:          {} seconds", detector.merge_gap_sec);
        println!("  Max windows:        {}", detector.max_windows);
        println!("  Cache entries:      {}", self.cache_max_entries());
        println!("  Cache write delay:  {} ms", self.write_delay().as_millis());
        if let Ok(path) = self.cache_path() {
            println!("  Cache file:         {}", path.display());
        }
    }
}
