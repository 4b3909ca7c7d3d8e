use std::path::PathBuf;
use std::time::Duration;

use image::Rgba;
use log::LevelFilter;

use crate::canvas::{DEFAULT_CANVAS_HEIGHT, DEFAULT_CANVAS_WIDTH};
use crate::components::history::DEFAULT_MAX_UNDO_STEPS;
use crate::components::tools::{DEFAULT_COLOR, MAX_BRUSH_SIZE, parse_hex_color, to_hex_color};
use crate::io::EXPORT_FILE_NAME;
use crate::logger;

/// Largest preview magnification accepted from the settings file.
pub const MAX_PREVIEW_SCALE: u32 = 16;

/// Startup configuration, persisted as a `key=value` text file.
#[derive(Clone, Debug, PartialEq)]
pub struct EditorSettings {
    /// Canvas size, read once at startup.
    pub canvas_width: u32,
    pub canvas_height: u32,
    pub max_undo_steps: usize,
    /// Safety-net republish cadence of the render pipeline.
    pub refresh_interval_ms: u64,
    pub brush_size: u32,
    pub color: Rgba<u8>,
    /// Nearest-neighbor magnification of the 2D preview.
    pub preview_scale: u32,
    /// Screen pixels per canvas pixel in the editor view.
    pub canvas_zoom: u32,
    pub export_file_name: String,
    pub log_level: LevelFilter,
    pub store_path: PathBuf,
}

impl Default for EditorSettings {
    fn default() -> Self {
        Self {
            canvas_width: DEFAULT_CANVAS_WIDTH,
            canvas_height: DEFAULT_CANVAS_HEIGHT,
            max_undo_steps: DEFAULT_MAX_UNDO_STEPS,
            refresh_interval_ms: 200,
            brush_size: 1,
            color: DEFAULT_COLOR,
            preview_scale: 4,
            canvas_zoom: 8,
            export_file_name: EXPORT_FILE_NAME.to_string(),
            log_level: LevelFilter::Info,
            store_path: logger::data_dir().join(logger::APP_DIR).join("local_store.bin"),
        }
    }
}

impl EditorSettings {
    /// Path to the settings file.
    /// On Linux:   ~/.config/nexuscape/nexuscape_settings.cfg  (XDG_CONFIG_HOME respected)
    /// On Windows: %APPDATA%\NexusCape\nexuscape_settings.cfg
    /// On macOS:   ~/Library/Application Support/NexusCape/nexuscape_settings.cfg
    /// Fallback:   same directory as the executable.
    pub fn settings_path() -> Option<PathBuf> {
        #[cfg(target_os = "linux")]
        {
            let config_dir = std::env::var("XDG_CONFIG_HOME")
                .map(PathBuf::from)
                .unwrap_or_else(|_| {
                    let home = std::env::var("HOME").unwrap_or_else(|_| "~".to_string());
                    PathBuf::from(home).join(".config")
                })
                .join("nexuscape");
            return Some(config_dir.join("nexuscape_settings.cfg"));
        }
        #[cfg(target_os = "windows")]
        {
            let appdata = std::env::var("APPDATA").or_else(|_| std::env::var("USERPROFILE")).ok()?;
            return Some(PathBuf::from(appdata).join("NexusCape").join("nexuscape_settings.cfg"));
        }
        #[cfg(target_os = "macos")]
        {
            let home = std::env::var("HOME").unwrap_or_else(|_| "~".to_string());
            return Some(
                PathBuf::from(home)
                    .join("Library")
                    .join("Application Support")
                    .join("NexusCape")
                    .join("nexuscape_settings.cfg"),
            );
        }
        #[cfg(not(any(target_os = "linux", target_os = "windows", target_os = "macos")))]
        {
            std::env::current_exe()
                .ok()
                .and_then(|p| p.parent().map(|d| d.join("nexuscape_settings.cfg")))
        }
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_millis(self.refresh_interval_ms)
    }

    /// Render as the on-disk `key=value` text.
    pub fn to_config_string(&self) -> String {
        format!(
            "canvas_width={}\n\
             canvas_height={}\n\
             max_undo_steps={}\n\
             refresh_interval_ms={}\n\
             brush_size={}\n\
             color={}\n\
             preview_scale={}\n\
             canvas_zoom={}\n\
             export_file_name={}\n\
             log_level={}\n\
             store_path={}\n",
            self.canvas_width,
            self.canvas_height,
            self.max_undo_steps,
            self.refresh_interval_ms,
            self.brush_size,
            to_hex_color(self.color),
            self.preview_scale,
            self.canvas_zoom,
            self.export_file_name,
            self.log_level.as_str().to_ascii_lowercase(),
            self.store_path.display(),
        )
    }

    /// Parse settings text. Unknown keys are skipped and malformed values
    /// keep their defaults.
    pub fn parse(content: &str) -> Self {
        let mut s = Self::default();
        for line in content.lines() {
            let Some((key, val)) = line.split_once('=') else { continue };
            let key = key.trim();
            let val = val.trim();
            match key {
                "canvas_width" => {
                    if let Some(v) = positive(val) { s.canvas_width = v; }
                }
                "canvas_height" => {
                    if let Some(v) = positive(val) { s.canvas_height = v; }
                }
                "max_undo_steps" => {
                    s.max_undo_steps = val.parse().unwrap_or(DEFAULT_MAX_UNDO_STEPS);
                }
                "refresh_interval_ms" => {
                    s.refresh_interval_ms = val.parse().unwrap_or(200);
                }
                "brush_size" => {
                    if let Some(v) = positive(val) { s.brush_size = v.min(MAX_BRUSH_SIZE); }
                }
                "color" => {
                    if let Some(c) = parse_hex_color(val) { s.color = c; }
                }
                "preview_scale" => {
                    if let Some(v) = positive(val) { s.preview_scale = v.min(MAX_PREVIEW_SCALE); }
                }
                "canvas_zoom" => {
                    if let Some(v) = positive(val) { s.canvas_zoom = v; }
                }
                "export_file_name" => {
                    if !val.is_empty() { s.export_file_name = val.to_string(); }
                }
                "log_level" => {
                    s.log_level = logger::parse_level(val);
                }
                "store_path" => {
                    if !val.is_empty() { s.store_path = PathBuf::from(val); }
                }
                _ => {}
            }
        }
        s
    }

    /// Load settings from disk (defaults if the file is missing or unreadable).
    pub fn load() -> Self {
        let Some(path) = Self::settings_path() else { return Self::default() };
        let Ok(content) = std::fs::read_to_string(&path) else { return Self::default() };
        Self::parse(&content)
    }

    /// Save settings to disk. Failures are logged, never fatal.
    pub fn save(&self) {
        let Some(path) = Self::settings_path() else { return };
        if let Some(parent) = path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }
        if let Err(e) = std::fs::write(&path, self.to_config_string()) {
            log::warn!("Could not save settings to {}: {}", path.display(), e);
        }
    }
}

fn positive(val: &str) -> Option<u32> {
    val.parse::<u32>().ok().filter(|v| *v > 0)
}
