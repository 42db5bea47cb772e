use crate::canvas::DrawingSession;
use crate::components::tools::{StrokeEngine, ToolProperties};
use crate::io;
use crate::net::{ApiClient, SavePayload};
use crate::settings::{AppSettings, Capabilities};
use crate::view::CanvasViewer;
use crate::{log_err, log_info, log_warn};
use eframe::egui;
use image::RgbaImage;
use std::path::{Path, PathBuf};
use std::sync::mpsc;

/// Result delivered from a background job thread.
pub enum JobResult {
    /// An image decoded successfully and replaces the session wholesale.
    /// `uploaded` marks a fresh upload, so the status line can report the
    /// server name the user will need to resume later.
    SessionReady {
        image: RgbaImage,
        label: String,
        uploaded: bool,
    },
    /// Load, decode, or upload failed.
    SessionFailed(String),
    /// The save payload was accepted by the server.
    Saved,
    SaveFailed(String),
    /// A layer PNG written to a local file.
    Exported(PathBuf),
    ExportFailed(String),
    /// Remaining credits reported by the server.
    Credits(i64),
    CreditsFailed(String),
}

/// Which layer an export writes to disk.
#[derive(Clone, Copy)]
enum ExportLayer {
    Merged,
    Drawing,
    Mask,
}

pub struct MaskpadApp {
    // Active image being annotated; None until a load succeeds.
    session: Option<DrawingSession>,
    // Display name of the loaded image (file name or server name).
    image_label: Option<String>,

    // Canvas presentation and texture cache
    viewer: CanvasViewer,

    // Tool state and the in-progress stroke
    props: ToolProperties,
    engine: StrokeEngine,

    // Configuration (capabilities copied out for terse checks)
    settings: AppSettings,
    caps: Capabilities,

    // Server client; cloned into worker threads
    client: ApiClient,

    // Background job plumbing
    job_sender: mpsc::Sender<JobResult>,
    job_receiver: mpsc::Receiver<JobResult>,
    pending_jobs: usize,

    // Status bar
    status: String,
    credits: Option<i64>,

    // Launch actions from the command line, run on the first frame
    startup_image: Option<PathBuf>,
    startup_resume: Option<String>,
    first_frame: bool,
}

impl MaskpadApp {
    pub fn new(
        cc: &eframe::CreationContext<'_>,
        settings: AppSettings,
        startup_image: Option<PathBuf>,
        startup_resume: Option<String>,
    ) -> Self {
        cc.egui_ctx.set_visuals(egui::Visuals::dark());

        let caps = settings.caps;
        let client = ApiClient::new(&settings.server_base_url, settings.api_key());

        // Seed tool state from saved preferences
        let props = ToolProperties {
            pen_width: settings.pen_width,
            eraser_width: settings.eraser_width,
            pen_color: settings.pen_color,
            eraser_mode: settings.eraser_mode,
            ..Default::default()
        };

        let (job_sender, job_receiver) = mpsc::channel();

        Self {
            session: None,
            image_label: None,
            viewer: CanvasViewer::default(),
            props,
            engine: StrokeEngine::default(),
            settings,
            caps,
            client,
            job_sender,
            job_receiver,
            pending_jobs: 0,
            status: "Open an image to start".to_string(),
            credits: None,
            startup_image,
            startup_resume,
            first_frame: true,
        }
    }

    // ------------------------------------------------------------------
    // Background jobs
    // ------------------------------------------------------------------

    /// Decode a local image file on a worker thread.
    fn open_local_file(&mut self, path: PathBuf) {
        let sender = self.job_sender.clone();
        let max_bytes = self.settings.max_upload_bytes();
        self.pending_jobs += 1;
        self.status = format!("Loading {}...", path.display());
        rayon::spawn(move || {
            let label = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| path.display().to_string());
            match io::load_image_file(&path, max_bytes) {
                Ok(image) => {
                    let _ = sender.send(JobResult::SessionReady {
                        image,
                        label,
                        uploaded: false,
                    });
                }
                Err(e) => {
                    let _ = sender.send(JobResult::SessionFailed(format!("{}", e)));
                }
            }
        });
    }

    /// Pick a file, upload it, and reload the canvas from the server's copy.
    fn start_upload(&mut self) {
        let Some(path) = io::pick_image_path() else {
            return;
        };
        let sender = self.job_sender.clone();
        let client = self.client.clone();
        let max_bytes = self.settings.max_upload_bytes();
        self.pending_jobs += 1;
        self.status = format!("Uploading {}...", path.display());
        rayon::spawn(move || match upload_and_reload(&client, &path, max_bytes) {
            Ok((server_name, image)) => {
                let _ = sender.send(JobResult::SessionReady {
                    image,
                    label: server_name,
                    uploaded: true,
                });
            }
            Err(e) => {
                let _ = sender.send(JobResult::SessionFailed(e));
            }
        });
    }

    /// Fetch a previously uploaded image back from the server by name, to
    /// resume an earlier edit session.
    fn start_resume(&mut self, server_name: String) {
        let sender = self.job_sender.clone();
        let client = self.client.clone();
        let max_bytes = self.settings.max_upload_bytes();
        self.pending_jobs += 1;
        self.status = format!("Fetching {} from the server...", server_name);
        rayon::spawn(move || {
            let result = client
                .fetch_image(&server_name, max_bytes)
                .map_err(|e| e.to_string())
                .and_then(|bytes| {
                    io::decode_image_bytes(&bytes, max_bytes).map_err(|e| e.to_string())
                });
            match result {
                Ok(image) => {
                    let _ = sender.send(JobResult::SessionReady {
                        image,
                        label: server_name,
                        uploaded: false,
                    });
                }
                Err(e) => {
                    let _ = sender.send(JobResult::SessionFailed(e));
                }
            }
        });
    }

    /// Encode the current surfaces and POST them to the server.
    fn start_save(&mut self) {
        let Some(session) = &self.session else {
            self.status = "Nothing to save yet".to_string();
            return;
        };
        let merged = session.merged();
        let ink = session.ink().clone();
        let mask = if self.caps.mask {
            Some(session.mask().clone())
        } else {
            None
        };
        let sender = self.job_sender.clone();
        let client = self.client.clone();
        self.pending_jobs += 1;
        self.status = "Saving to server...".to_string();
        rayon::spawn(move || {
            let result = SavePayload::from_surfaces(&merged, &ink, mask.as_ref())
                .and_then(|payload| client.save_annotation(&payload));
            match result {
                Ok(()) => {
                    let _ = sender.send(JobResult::Saved);
                }
                Err(e) => {
                    let _ = sender.send(JobResult::SaveFailed(format!("{}", e)));
                }
            }
        });
    }

    /// Write one layer to a local PNG file.
    fn start_export(&mut self, layer: ExportLayer) {
        let Some(session) = &self.session else {
            self.status = "Nothing to export yet".to_string();
            return;
        };
        let (surface, suffix) = match layer {
            ExportLayer::Merged => (session.merged(), "annotated"),
            ExportLayer::Drawing => (session.ink().clone(), "drawing"),
            ExportLayer::Mask => (session.mask().clone(), "mask"),
        };
        let default_name = self
            .image_label
            .as_deref()
            .and_then(|n| Path::new(n).file_stem().map(|s| s.to_string_lossy().into_owned()))
            .map(|stem| format!("{}_{}.png", stem, suffix))
            .unwrap_or_else(|| format!("{}.png", suffix));
        let Some(path) = io::pick_export_path(&default_name) else {
            return;
        };
        let sender = self.job_sender.clone();
        self.pending_jobs += 1;
        rayon::spawn(move || match io::export_png(&surface, &path) {
            Ok(()) => {
                let _ = sender.send(JobResult::Exported(path));
            }
            Err(e) => {
                let _ = sender.send(JobResult::ExportFailed(format!("{}", e)));
            }
        });
    }

    /// Ask the server how many credits remain on the configured key.
    fn request_credits(&mut self) {
        let sender = self.job_sender.clone();
        let client = self.client.clone();
        self.pending_jobs += 1;
        rayon::spawn(move || match client.fetch_credits() {
            Ok(credits) => {
                let _ = sender.send(JobResult::Credits(credits));
            }
            Err(e) => {
                let _ = sender.send(JobResult::CreditsFailed(format!("{}", e)));
            }
        });
    }

    // ------------------------------------------------------------------
    // Job completion
    // ------------------------------------------------------------------

    /// Replace the session wholesale: fresh surfaces, fresh history, textures
    /// re-uploaded next frame.  Cancels any stroke in progress.
    fn install_session(&mut self, image: RgbaImage, label: String) {
        self.engine.cancel();
        let mut session = DrawingSession::from_image(image);
        let max_steps = if self.caps.undo {
            self.settings.max_undo_steps
        } else {
            1
        };
        session.set_history_limit(max_steps);
        log_info!(
            "Session ready: {} ({}x{})",
            label,
            session.width(),
            session.height()
        );
        self.session = Some(session);
        self.image_label = Some(label);
        self.viewer.invalidate();
    }

    fn handle_job(&mut self, result: JobResult) {
        match result {
            JobResult::SessionReady {
                image,
                label,
                uploaded,
            } => {
                self.status = if uploaded {
                    format!("Uploaded as {}", label)
                } else {
                    format!("Loaded {}", label)
                };
                self.install_session(image, label);
            }
            JobResult::SessionFailed(msg) => {
                log_err!("Load failed: {}", msg);
                self.status = format!("Load failed: {}", msg);
            }
            JobResult::Saved => {
                log_info!("Annotation accepted by server");
                self.status = "Annotation saved".to_string();
            }
            JobResult::SaveFailed(msg) => {
                log_err!("Save failed: {}", msg);
                self.status = format!("Save failed: {}", msg);
            }
            JobResult::Exported(path) => {
                log_info!("Export OK  →  {}", path.display());
                self.status = format!("Exported {}", path.display());
            }
            JobResult::ExportFailed(msg) => {
                log_err!("Export failed: {}", msg);
                self.status = format!("Export failed: {}", msg);
            }
            JobResult::Credits(credits) => {
                self.credits = Some(credits);
            }
            JobResult::CreditsFailed(msg) => {
                log_warn!("Credits query failed: {}", msg);
                self.credits = None;
            }
        }
    }

    // ------------------------------------------------------------------
    // Edits
    // ------------------------------------------------------------------

    fn do_undo(&mut self) {
        if let Some(session) = &mut self.session
            && let Some(label) = session.undo()
        {
            self.status = format!("Undid {}", label);
        }
    }

    fn do_redo(&mut self) {
        if let Some(session) = &mut self.session
            && let Some(label) = session.redo()
        {
            self.status = format!("Redid {}", label);
        }
    }

    // ------------------------------------------------------------------
    // Panels
    // ------------------------------------------------------------------

    fn show_toolbar(&mut self, ctx: &egui::Context) {
        egui::TopBottomPanel::top("toolbar").show(ctx, |ui| {
            ui.horizontal_wrapped(|ui| {
                if ui
                    .button("Open")
                    .on_hover_text("Open a local image file")
                    .clicked()
                    && let Some(path) = io::pick_image_path()
                {
                    self.open_local_file(path);
                }
                if self.caps.upload
                    && ui
                        .button("Upload")
                        .on_hover_text("Upload to the annotation server and reload its copy")
                        .clicked()
                {
                    self.start_upload();
                }
                ui.separator();

                self.props.show_controls(ui, self.caps.color_picker);
                ui.separator();

                let has_session = self.session.is_some();
                if self.caps.undo {
                    let can_undo = self.session.as_ref().is_some_and(|s| s.can_undo());
                    let undo_tip = self
                        .session
                        .as_ref()
                        .and_then(|s| s.undo_label())
                        .map(|l| format!("Undo {}", l))
                        .unwrap_or_else(|| "Undo (Ctrl+Z)".to_string());
                    if ui
                        .add_enabled(can_undo, egui::Button::new("Undo"))
                        .on_hover_text(undo_tip)
                        .clicked()
                    {
                        self.do_undo();
                    }

                    let can_redo = self.session.as_ref().is_some_and(|s| s.can_redo());
                    let redo_tip = self
                        .session
                        .as_ref()
                        .and_then(|s| s.redo_label())
                        .map(|l| format!("Redo {}", l))
                        .unwrap_or_else(|| "Redo (Ctrl+Y)".to_string());
                    if ui
                        .add_enabled(can_redo, egui::Button::new("Redo"))
                        .on_hover_text(redo_tip)
                        .clicked()
                    {
                        self.do_redo();
                    }
                }
                if ui
                    .add_enabled(has_session, egui::Button::new("Reset"))
                    .on_hover_text("Clear every stroke, keeping the image")
                    .clicked()
                    && let Some(session) = &mut self.session
                {
                    session.reset_ink();
                    self.status = "Cleared all strokes".to_string();
                }
                ui.separator();

                if self.caps.upload
                    && ui
                        .add_enabled(has_session, egui::Button::new("Save"))
                        .on_hover_text("Send merged, drawing and mask layers to the server")
                        .clicked()
                {
                    self.start_save();
                }
                ui.add_enabled_ui(has_session, |ui| {
                    ui.menu_button("Export", |ui| {
                        if ui.button("Merged PNG").clicked() {
                            self.start_export(ExportLayer::Merged);
                            ui.close_menu();
                        }
                        if ui.button("Drawing PNG").clicked() {
                            self.start_export(ExportLayer::Drawing);
                            ui.close_menu();
                        }
                        if self.caps.mask && ui.button("Mask PNG").clicked() {
                            self.start_export(ExportLayer::Mask);
                            ui.close_menu();
                        }
                    });
                });
            });
        });
    }

    fn show_status_bar(&mut self, ctx: &egui::Context) {
        egui::TopBottomPanel::bottom("status_bar").show(ctx, |ui| {
            ui.horizontal(|ui| {
                if self.pending_jobs > 0 {
                    ui.spinner();
                }
                ui.label(self.status.as_str());
                ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                    if let Some(credits) = self.credits {
                        ui.label(format!("Credits: {}", credits));
                        ui.separator();
                    }
                    if let Some(session) = &self.session {
                        ui.label(format!("{} x {}", session.width(), session.height()));
                    }
                });
            });
        });
    }

    fn show_canvas(&mut self, ctx: &egui::Context) {
        egui::CentralPanel::default().show(ctx, |ui| {
            let Some(session) = self.session.as_mut() else {
                let response =
                    ui.allocate_response(ui.available_size(), egui::Sense::click_and_drag());
                if response.drag_started() || response.clicked() {
                    log_warn!("Pointer stroke ignored: no image loaded");
                    self.status = "Open an image before drawing".to_string();
                }
                let hint = if self.caps.drag_drop {
                    "Open an image, or drop one here"
                } else {
                    "Open an image to start annotating"
                };
                ui.painter().text(
                    response.rect.center(),
                    egui::Align2::CENTER_CENTER,
                    hint,
                    egui::FontId::proportional(16.0),
                    ui.visuals().weak_text_color(),
                );
                return;
            };

            let frame = self.viewer.show(ui, session);

            if let Some(screen_pos) = frame.response.interact_pointer_pos() {
                match self
                    .viewer
                    .screen_to_canvas_f32(screen_pos, frame.image_rect, session)
                {
                    Some(canvas_pos) => {
                        if self.engine.is_active() {
                            self.engine.pointer_move(session, &self.props, canvas_pos);
                        } else {
                            self.engine.pointer_down(session, &self.props, canvas_pos);
                        }
                    }
                    // Held pointer slid off the image: the stroke ends at the
                    // last point inside.
                    None => self.engine.pointer_up(),
                }
            } else if self.engine.is_active() {
                self.engine.pointer_up();
            }

            // Brush outline under the pointer, sized to the active tool.
            // Two circles (black + white) stay visible on any background.
            if let Some(hover) = frame.response.hover_pos()
                && frame.image_rect.contains(hover)
            {
                let radius = self.props.active_radius() * frame.scale;
                if radius > 1.5 {
                    let painter = ui.painter();
                    painter.circle_stroke(
                        hover,
                        radius,
                        egui::Stroke::new(1.5, egui::Color32::from_black_alpha(160)),
                    );
                    painter.circle_stroke(
                        hover,
                        radius,
                        egui::Stroke::new(0.75, egui::Color32::from_white_alpha(200)),
                    );
                }
            }
        });
    }
}

impl eframe::App for MaskpadApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        // --- Dynamic window title: "Maskpad - <image>" ---
        {
            let title = match &self.image_label {
                Some(label) => format!("Maskpad - {}", label),
                None => "Maskpad".to_string(),
            };
            ctx.send_viewport_cmd(egui::ViewportCommand::Title(title));
        }

        // --- First frame: run launch actions, query credits ---
        if self.first_frame {
            self.first_frame = false;
            if let Some(path) = self.startup_image.take() {
                self.open_local_file(path);
            }
            if let Some(name) = self.startup_resume.take() {
                self.start_resume(name);
            }
            if self.caps.upload && self.client.has_api_key() {
                self.request_credits();
            }
        }

        // --- Poll background job results ---
        while let Ok(result) = self.job_receiver.try_recv() {
            self.pending_jobs = self.pending_jobs.saturating_sub(1);
            self.handle_job(result);
        }
        if self.pending_jobs > 0 {
            // Keep frames coming so finished jobs are picked up promptly.
            ctx.request_repaint();
        }

        // --- Drag-and-drop: a dropped image replaces the session ---
        if self.caps.drag_drop {
            let dropped: Vec<egui::DroppedFile> = ctx.input(|i| i.raw.dropped_files.clone());
            for file in dropped {
                if let Some(path) = file.path {
                    let ext = path
                        .extension()
                        .map(|e| e.to_string_lossy().to_lowercase())
                        .unwrap_or_default();
                    if io::IMAGE_EXTENSIONS.contains(&ext.as_str()) {
                        self.open_local_file(path);
                    } else {
                        log_warn!("Dropped file ignored (not an image): {}", path.display());
                        self.status = format!("Not an image file: {}", path.display());
                    }
                }
            }
        }

        // --- Keyboard shortcuts ---
        // NOTE: Check Ctrl+Shift+Z before Ctrl+Z so the redo combo is not
        // consumed as undo.  Shortcuts are ignored mid-stroke.
        if self.caps.undo && !self.engine.is_active() {
            use egui::{Key, Modifiers};
            let ctrl_shift = Modifiers {
                shift: true,
                ..Modifiers::COMMAND
            };
            let redo_pressed = ctx.input_mut(|i| {
                i.consume_key(ctrl_shift, Key::Z) || i.consume_key(Modifiers::COMMAND, Key::Y)
            });
            let undo_pressed = ctx.input_mut(|i| i.consume_key(Modifiers::COMMAND, Key::Z));
            if redo_pressed {
                self.do_redo();
            }
            if undo_pressed {
                self.do_undo();
            }
        }

        self.show_toolbar(ctx);
        self.show_status_bar(ctx);
        self.show_canvas(ctx);
    }

    fn on_exit(&mut self, _gl: Option<&eframe::glow::Context>) {
        // Carry tool preferences over to the next launch.
        self.settings.pen_width = self.props.pen_width;
        self.settings.eraser_width = self.props.eraser_width;
        self.settings.pen_color = self.props.pen_color;
        self.settings.eraser_mode = self.props.eraser_mode;
        self.settings.save();
    }
}

/// Upload a local file, then pull the server's stored copy back down so the
/// canvas shows exactly what the server has.
fn upload_and_reload(
    client: &ApiClient,
    path: &Path,
    max_bytes: u64,
) -> Result<(String, RgbaImage), String> {
    let metadata = std::fs::metadata(path).map_err(|e| e.to_string())?;
    if metadata.len() > max_bytes {
        return Err(io::LoadError::TooLarge(metadata.len(), max_bytes).to_string());
    }
    let bytes = std::fs::read(path).map_err(|e| e.to_string())?;
    let local_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "upload.png".to_string());
    let server_name = client
        .upload_image(&local_name, &bytes)
        .map_err(|e| e.to_string())?;
    let fetched = client
        .fetch_image(&server_name, max_bytes)
        .map_err(|e| e.to_string())?;
    let image = io::decode_image_bytes(&fetched, max_bytes).map_err(|e| e.to_string())?;
    Ok((server_name, image))
}
