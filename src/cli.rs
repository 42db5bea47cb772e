// ============================================================================
// Maskpad CLI — launch options for the annotation window
// ============================================================================
//
// Usage examples:
//   maskpad                                    (open empty, settings from disk)
//   maskpad --image photo.png                  (open with a local image loaded)
//   maskpad --resume a3f0b2.png                (pull an earlier upload back down)
//   maskpad --server http://annotate.lan:5000
//   maskpad --no-mask --no-undo                (plain sketch-over-image mode)
//
// Every option overrides the corresponding settings-file value for this
// launch only; nothing given here is written back to the settings file.

use std::path::PathBuf;

use clap::Parser;

use crate::settings::AppSettings;

// ============================================================================
// CLI argument definition (clap Derive)
// ============================================================================

/// Maskpad image annotation window.
///
/// Draw strokes and a hidden selection mask over an image, then send the
/// result to an annotation server.
#[derive(Parser, Debug, Default)]
#[command(
    name = "maskpad",
    about = "Image annotation window with mask painting",
    long_about = "Open an image, paint strokes and a hidden selection mask over it, and\n\
                  send merged/drawing/mask layers to an annotation server.\n\n\
                  Example:\n  \
                  maskpad --image photo.png\n  \
                  maskpad --server http://annotate.lan:5000 --no-drag-drop"
)]
pub struct CliArgs {
    /// Image file to load at startup.
    #[arg(short, long, value_name = "FILE")]
    pub image: Option<PathBuf>,

    /// Resume editing a previously uploaded image, by its server filename.
    #[arg(long, value_name = "NAME", conflicts_with = "image")]
    pub resume: Option<String>,

    /// Annotation server base URL (e.g. http://localhost:5000).
    #[arg(short, long, value_name = "URL")]
    pub server: Option<String>,

    /// Name of the environment variable holding the server API key.
    #[arg(long, value_name = "VAR")]
    pub api_key_env: Option<String>,

    /// Upload and load size cap in megabytes.
    #[arg(long, value_name = "MB")]
    pub max_upload_mb: Option<u32>,

    /// Disable the server upload flow (local open/export still works).
    #[arg(long)]
    pub no_upload: bool,

    /// Disable the hidden mask surface (strokes only).
    #[arg(long)]
    pub no_mask: bool,

    /// Disable undo/redo history.
    #[arg(long)]
    pub no_undo: bool,

    /// Disable the pen color picker (fixed default color).
    #[arg(long)]
    pub no_color_picker: bool,

    /// Ignore images dropped onto the window.
    #[arg(long)]
    pub no_drag_drop: bool,
}

impl CliArgs {
    /// Fold launch options into loaded settings. Flags only ever disable
    /// capabilities; a capability turned off in the settings file stays off.
    pub fn apply_to(&self, settings: &mut AppSettings) {
        if let Some(server) = &self.server {
            settings.server_base_url = server.clone();
        }
        if let Some(var) = &self.api_key_env {
            settings.api_key_env = var.clone();
        }
        if let Some(mb) = self.max_upload_mb {
            settings.max_upload_mb = mb;
        }
        if self.no_upload {
            settings.caps.upload = false;
        }
        if self.no_mask {
            settings.caps.mask = false;
        }
        if self.no_undo {
            settings.caps.undo = false;
        }
        if self.no_color_picker {
            settings.caps.color_picker = false;
        }
        if self.no_drag_drop {
            settings.caps.drag_drop = false;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overrides_apply_without_touching_other_fields() {
        let args = CliArgs {
            server: Some("http://other:9000".into()),
            max_upload_mb: Some(42),
            no_mask: true,
            ..Default::default()
        };
        let mut settings = AppSettings::default();
        args.apply_to(&mut settings);

        assert_eq!(settings.server_base_url, "http://other:9000");
        assert_eq!(settings.max_upload_mb, 42);
        assert!(!settings.caps.mask);
        assert!(settings.caps.upload);
        assert_eq!(settings.api_key_env, "MASKPAD_API_KEY");
    }

    #[test]
    fn flags_never_re_enable_capabilities() {
        let args = CliArgs::default();
        let mut settings = AppSettings::default();
        settings.caps.undo = false;
        args.apply_to(&mut settings);
        assert!(!settings.caps.undo);
    }

    #[test]
    fn resume_conflicts_with_local_image() {
        let result = CliArgs::try_parse_from([
            "maskpad",
            "--image",
            "photo.png",
            "--resume",
            "a3f0b2.png",
        ]);
        assert!(result.is_err(), "--image and --resume are mutually exclusive");
    }

    #[test]
    fn parses_typical_invocation() {
        let args = CliArgs::parse_from([
            "maskpad",
            "--image",
            "photo.png",
            "--server",
            "http://annotate.lan:5000",
            "--no-drag-drop",
        ]);
        assert_eq!(args.image.as_deref(), Some(std::path::Path::new("photo.png")));
        assert_eq!(args.server.as_deref(), Some("http://annotate.lan:5000"));
        assert!(args.no_drag_drop);
        assert!(!args.no_upload);
    }
}
