//! Persistent widget settings: a plain `key=value` file in the platform
//! config directory.  Missing or corrupt entries fall back to defaults, so
//! an old or hand-edited file can never prevent startup.

use crate::components::tools::EraserMode;
use egui::Color32;
use std::path::PathBuf;

/// Which optional widget features are wired up.  One widget serves every
/// deployment; a disabled capability removes its UI and behavior cleanly.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Capabilities {
    /// Server upload flow (pick file, POST, reload from server path).
    pub upload: bool,
    /// Maintain the hidden mask surface and include it in save payloads.
    pub mask: bool,
    /// History stack with undo/redo controls and shortcuts.
    pub undo: bool,
    /// Pen color selection UI.
    pub color_picker: bool,
    /// Accept images dropped onto the window.
    pub drag_drop: bool,
}

impl Default for Capabilities {
    fn default() -> Self {
        Self {
            upload: true,
            mask: true,
            undo: true,
            color_picker: true,
            drag_drop: true,
        }
    }
}

/// Configuration problems worth refusing to start over.
#[derive(Debug)]
pub enum ConfigError {
    EmptyServerUrl,
    BadServerUrl(String),
    ZeroUploadCap,
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::EmptyServerUrl => {
                write!(f, "upload capability requires a server base URL")
            }
            ConfigError::BadServerUrl(url) => {
                write!(f, "server base URL must start with http:// or https://: {}", url)
            }
            ConfigError::ZeroUploadCap => write!(f, "upload size cap must be at least 1 MB"),
        }
    }
}

pub struct AppSettings {
    /// Annotation server, e.g. `http://localhost:5000`.
    pub server_base_url: String,
    /// Name of the environment variable holding the API key.  The key
    /// itself is never written to disk.
    pub api_key_env: String,
    /// Upload/load size cap in whole megabytes.
    pub max_upload_mb: u32,
    pub pen_width: f32,
    pub eraser_width: f32,
    pub pen_color: Color32,
    pub eraser_mode: EraserMode,
    /// Maximum number of undo steps.
    pub max_undo_steps: usize,
    pub caps: Capabilities,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            server_base_url: "http://localhost:5000".to_string(),
            api_key_env: "MASKPAD_API_KEY".to_string(),
            max_upload_mb: 10,
            pen_width: 10.0,
            eraser_width: 10.0,
            pen_color: Color32::from_rgba_unmultiplied(0, 0, 0, 128),
            eraser_mode: EraserMode::Transparent,
            max_undo_steps: 50,
            caps: Capabilities::default(),
        }
    }
}

impl AppSettings {
    /// Path to the settings file.
    /// On Linux:   ~/.config/maskpad/maskpad_settings.cfg  (XDG_CONFIG_HOME respected)
    /// On Windows: %APPDATA%\maskpad\maskpad_settings.cfg
    /// On macOS:   ~/Library/Application Support/maskpad/maskpad_settings.cfg
    /// Fallback:   same directory as the executable.
    pub(crate) fn settings_path() -> Option<PathBuf> {
        #[cfg(target_os = "linux")]
        {
            let config_dir = std::env::var("XDG_CONFIG_HOME")
                .map(PathBuf::from)
                .unwrap_or_else(|_| {
                    let home = std::env::var("HOME").unwrap_or_else(|_| "~".to_string());
                    PathBuf::from(home).join(".config")
                })
                .join("maskpad");
            let _ = std::fs::create_dir_all(&config_dir);
            return Some(config_dir.join("maskpad_settings.cfg"));
        }
        #[cfg(target_os = "windows")]
        {
            let appdata = std::env::var("APPDATA")
                .or_else(|_| std::env::var("USERPROFILE"))
                .unwrap_or_else(|_| {
                    std::env::current_exe()
                        .ok()
                        .and_then(|p| p.parent().map(|d| d.to_string_lossy().into_owned()))
                        .unwrap_or_default()
                });
            let config_dir = PathBuf::from(appdata).join("maskpad");
            let _ = std::fs::create_dir_all(&config_dir);
            return Some(config_dir.join("maskpad_settings.cfg"));
        }
        #[cfg(target_os = "macos")]
        {
            let home = std::env::var("HOME").unwrap_or_else(|_| "~".to_string());
            let config_dir = PathBuf::from(home)
                .join("Library")
                .join("Application Support")
                .join("maskpad");
            let _ = std::fs::create_dir_all(&config_dir);
            return Some(config_dir.join("maskpad_settings.cfg"));
        }
        #[cfg(not(any(target_os = "linux", target_os = "windows", target_os = "macos")))]
        {
            std::env::current_exe()
                .ok()
                .and_then(|p| p.parent().map(|d| d.join("maskpad_settings.cfg")))
        }
    }

    pub fn max_upload_bytes(&self) -> u64 {
        self.max_upload_mb as u64 * 1024 * 1024
    }

    /// Read the API key from the configured environment variable.
    /// Empty values count as unset.
    pub fn api_key(&self) -> Option<String> {
        std::env::var(&self.api_key_env)
            .ok()
            .filter(|v| !v.trim().is_empty())
    }

    /// Refuse clearly broken configurations before the window opens.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.caps.upload {
            if self.server_base_url.trim().is_empty() {
                return Err(ConfigError::EmptyServerUrl);
            }
            if !self.server_base_url.starts_with("http://")
                && !self.server_base_url.starts_with("https://")
            {
                return Err(ConfigError::BadServerUrl(self.server_base_url.clone()));
            }
        }
        if self.max_upload_mb == 0 {
            return Err(ConfigError::ZeroUploadCap);
        }
        Ok(())
    }

    /// Serialize a Color32 as "r,g,b,a"
    fn color_to_str(c: Color32) -> String {
        format!("{},{},{},{}", c.r(), c.g(), c.b(), c.a())
    }

    /// Parse a Color32 from "r,g,b,a"
    fn str_to_color(s: &str) -> Option<Color32> {
        let parts: Vec<&str> = s.split(',').collect();
        if parts.len() == 4 {
            let r = parts[0].trim().parse::<u8>().ok()?;
            let g = parts[1].trim().parse::<u8>().ok()?;
            let b = parts[2].trim().parse::<u8>().ok()?;
            let a = parts[3].trim().parse::<u8>().ok()?;
            Some(Color32::from_rgba_unmultiplied(r, g, b, a))
        } else {
            None
        }
    }

    fn to_config_string(&self) -> String {
        let eraser_str = match self.eraser_mode {
            EraserMode::Transparent => "transparent",
            EraserMode::White => "white",
        };
        format!(
            "server_base_url={}\n\
             api_key_env={}\n\
             max_upload_mb={}\n\
             pen_width={}\n\
             eraser_width={}\n\
             pen_color={}\n\
             eraser_mode={eraser_str}\n\
             max_undo_steps={}\n\
             cap_upload={}\n\
             cap_mask={}\n\
             cap_undo={}\n\
             cap_color_picker={}\n\
             cap_drag_drop={}\n",
            self.server_base_url,
            self.api_key_env,
            self.max_upload_mb,
            self.pen_width,
            self.eraser_width,
            Self::color_to_str(self.pen_color),
            self.max_undo_steps,
            self.caps.upload,
            self.caps.mask,
            self.caps.undo,
            self.caps.color_picker,
            self.caps.drag_drop,
        )
    }

    fn apply_line(&mut self, key: &str, val: &str) {
        match key {
            "server_base_url" => {
                self.server_base_url = val.to_string();
            }
            "api_key_env" => {
                self.api_key_env = val.to_string();
            }
            "max_upload_mb" => {
                self.max_upload_mb = val.parse().unwrap_or(10);
            }
            "pen_width" => {
                self.pen_width = val.parse().unwrap_or(10.0);
            }
            "eraser_width" => {
                self.eraser_width = val.parse().unwrap_or(10.0);
            }
            "pen_color" => {
                if let Some(c) = Self::str_to_color(val) {
                    self.pen_color = c;
                }
            }
            "eraser_mode" => {
                self.eraser_mode = match val {
                    "white" => EraserMode::White,
                    _ => EraserMode::Transparent,
                };
            }
            "max_undo_steps" => {
                self.max_undo_steps = val.parse().unwrap_or(50);
            }
            "cap_upload" => {
                self.caps.upload = val == "true";
            }
            "cap_mask" => {
                self.caps.mask = val == "true";
            }
            "cap_undo" => {
                self.caps.undo = val == "true";
            }
            "cap_color_picker" => {
                self.caps.color_picker = val == "true";
            }
            "cap_drag_drop" => {
                self.caps.drag_drop = val == "true";
            }
            _ => {}
        }
    }

    /// Save settings to disk.
    pub fn save(&self) {
        let Some(path) = Self::settings_path() else {
            return;
        };
        let _ = std::fs::write(path, self.to_config_string());
    }

    /// Load settings from disk (returns defaults if file missing or corrupt).
    pub fn load() -> Self {
        let Some(path) = Self::settings_path() else {
            return Self::default();
        };
        let Ok(content) = std::fs::read_to_string(&path) else {
            return Self::default();
        };
        Self::from_config_string(&content)
    }

    fn from_config_string(content: &str) -> Self {
        let mut s = Self::default();
        for line in content.lines() {
            let Some((key, val)) = line.split_once('=') else {
                continue;
            };
            s.apply_line(key.trim(), val.trim());
        }
        s
    }
}
