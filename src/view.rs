//! Canvas viewport: aspect-fit layout, texture display, and the mapping
//! between screen space and canvas pixel space.
//!
//! The session surfaces keep their intrinsic dimensions at all times; only
//! the display rectangle changes when the window does.  Every pointer
//! position is corrected by the intrinsic/displayed ratio per axis before it
//! reaches the stroke engine, so a resized window never skews strokes.

use crate::canvas::DrawingSession;
use eframe::egui;
use egui::{Color32, ColorImage, Pos2, Rect, Sense, TextureHandle, TextureOptions, Vec2};
use image::RgbaImage;

/// Pixels trimmed from each axis of the available panel before fitting,
/// matching the widget's original fixed window margin.
pub const FIT_MARGIN: f32 = 20.0;

/// Largest aspect-preserving rectangle for a `width`x`height` image inside
/// `avail` minus [`FIT_MARGIN`], centered.  Upscaling beyond 1:1 is allowed;
/// small panels shrink the box freely.
pub fn fit_rect(avail: Rect, width: u32, height: u32) -> Rect {
    let max_w = (avail.width() - FIT_MARGIN).max(1.0);
    let max_h = (avail.height() - FIT_MARGIN).max(1.0);
    let scale = (max_w / width as f32).min(max_h / height as f32);
    let size = Vec2::new(width as f32 * scale, height as f32 * scale);

    let temp = Rect::from_center_size(avail.center(), size);
    // Round to pixel boundaries to prevent sub-pixel rendering gaps.
    Rect::from_min_max(
        Pos2::new(temp.min.x.round(), temp.min.y.round()),
        Pos2::new(temp.max.x.round(), temp.max.y.round()),
    )
}

/// What the viewer hands back to the input layer each frame.
pub struct CanvasFrame {
    pub response: egui::Response,
    /// Where the image is displayed this frame, in screen coordinates.
    pub image_rect: Rect,
    /// Displayed-pixels per canvas-pixel, horizontal axis.
    pub scale: f32,
}

/// Displays the session surfaces and owns their GPU textures.
#[derive(Default)]
pub struct CanvasViewer {
    background_tex: Option<TextureHandle>,
    ink_tex: Option<TextureHandle>,
    uploaded_revision: Option<u64>,
}

impl CanvasViewer {
    /// Drop cached textures; the next frame re-uploads from the session.
    /// Called when a load replaces the session wholesale.
    pub fn invalidate(&mut self) {
        self.background_tex = None;
        self.ink_tex = None;
        self.uploaded_revision = None;
    }

    /// Lay out, upload textures as needed, and paint the session.
    pub fn show(&mut self, ui: &mut egui::Ui, session: &DrawingSession) -> CanvasFrame {
        let (canvas_rect, response) =
            ui.allocate_exact_size(ui.available_size(), Sense::click_and_drag());
        let painter = ui.painter_at(canvas_rect);

        let image_rect = fit_rect(canvas_rect, session.width(), session.height());
        let scale = image_rect.width() / session.width() as f32;

        // Background texture only changes with the session itself.
        if self.background_tex.is_none() {
            self.background_tex = Some(ui.ctx().load_texture(
                "session_background",
                rgba_image_to_color_image(session.background()),
                TextureOptions::LINEAR,
            ));
        }

        // Ink texture follows the session revision.
        if self.uploaded_revision != Some(session.revision()) {
            let color_image = rgba_image_to_color_image(session.ink());
            match &mut self.ink_tex {
                Some(tex) => tex.set(color_image, TextureOptions::LINEAR),
                None => {
                    self.ink_tex = Some(ui.ctx().load_texture(
                        "session_ink",
                        color_image,
                        TextureOptions::LINEAR,
                    ));
                }
            }
            self.uploaded_revision = Some(session.revision());
        }

        let uv = Rect::from_min_max(Pos2::ZERO, Pos2::new(1.0, 1.0));
        if let Some(tex) = &self.background_tex {
            painter.image(tex.id(), image_rect, uv, Color32::WHITE);
        }
        if let Some(tex) = &self.ink_tex {
            painter.image(tex.id(), image_rect, uv, Color32::WHITE);
        }
        painter.rect_stroke(image_rect, 0.0, ui.visuals().window_stroke);

        CanvasFrame {
            response,
            image_rect,
            scale,
        }
    }

    /// Screen position to sub-pixel canvas coordinates, correcting each axis
    /// by its intrinsic/displayed ratio.  `None` outside the display box.
    pub fn screen_to_canvas_f32(
        &self,
        screen_pos: Pos2,
        image_rect: Rect,
        session: &DrawingSession,
    ) -> Option<(f32, f32)> {
        if !image_rect.contains(screen_pos) {
            return None;
        }

        let rel_x =
            (screen_pos.x - image_rect.min.x) * (session.width() as f32 / image_rect.width());
        let rel_y =
            (screen_pos.y - image_rect.min.y) * (session.height() as f32 / image_rect.height());

        if rel_x >= 0.0
            && rel_x < session.width() as f32
            && rel_y >= 0.0
            && rel_y < session.height() as f32
        {
            Some((rel_x, rel_y))
        } else {
            None
        }
    }
}

/// Converts an RgbaImage to egui's ColorImage format.
fn rgba_image_to_color_image(img: &RgbaImage) -> ColorImage {
    let size = [img.width() as usize, img.height() as usize];
    let pixels = img.as_flat_samples();
    let rgba_data = pixels.as_slice();

    let color_pixels: Vec<Color32> = rgba_data
        .chunks_exact(4)
        .map(|chunk| Color32::from_rgba_unmultiplied(chunk[0], chunk[1], chunk[2], chunk[3]))
        .collect();

    ColorImage {
        size,
        pixels: color_pixels,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use egui::pos2;
    use image::Rgba;

    fn session(w: u32, h: u32) -> DrawingSession {
        DrawingSession::from_image(RgbaImage::from_pixel(w, h, Rgba([0, 0, 0, 255])))
    }

    #[test]
    fn fit_preserves_aspect_and_margin() {
        let avail = Rect::from_min_size(pos2(0.0, 0.0), Vec2::new(820.0, 620.0));
        let rect = fit_rect(avail, 400, 300);

        let aspect = rect.width() / rect.height();
        assert!((aspect - 400.0 / 300.0).abs() < 0.02, "aspect {aspect}");
        assert!(rect.width() <= 800.0 + 1.0);
        assert!(rect.height() <= 600.0 + 1.0);
        assert!(avail.contains_rect(rect));
    }

    #[test]
    fn fit_upscales_small_images() {
        let avail = Rect::from_min_size(pos2(0.0, 0.0), Vec2::new(1020.0, 1020.0));
        let rect = fit_rect(avail, 100, 100);
        assert!(rect.width() > 900.0);
    }

    #[test]
    fn portrait_panel_fits_by_width() {
        let avail = Rect::from_min_size(pos2(0.0, 0.0), Vec2::new(220.0, 1000.0));
        let rect = fit_rect(avail, 400, 300);
        assert!(rect.width() <= 200.0 + 1.0);
        assert!((rect.width() / rect.height() - 4.0 / 3.0).abs() < 0.05);
    }

    #[test]
    fn mapping_inverts_display_transform() {
        let viewer = CanvasViewer::default();
        let s = session(400, 300);
        // Displayed at 2x scale, offset from the origin.
        let image_rect = Rect::from_min_size(pos2(100.0, 50.0), Vec2::new(800.0, 600.0));

        let (x, y) = viewer
            .screen_to_canvas_f32(pos2(100.0, 50.0), image_rect, &s)
            .unwrap();
        assert!(x < 0.6 && y < 0.6, "origin maps near (0,0), got ({x},{y})");

        let (x, y) = viewer
            .screen_to_canvas_f32(pos2(500.0, 350.0), image_rect, &s)
            .unwrap();
        assert!((x - 200.0).abs() < 0.6 && (y - 150.0).abs() < 0.6);

        let (x, y) = viewer
            .screen_to_canvas_f32(pos2(899.0, 649.0), image_rect, &s)
            .unwrap();
        assert!((x - 399.5).abs() < 1.0 && (y - 299.5).abs() < 1.0);
    }

    #[test]
    fn positions_outside_display_box_are_rejected() {
        let viewer = CanvasViewer::default();
        let s = session(400, 300);
        let image_rect = Rect::from_min_size(pos2(100.0, 50.0), Vec2::new(800.0, 600.0));

        assert!(viewer.screen_to_canvas_f32(pos2(99.0, 50.0), image_rect, &s).is_none());
        assert!(viewer.screen_to_canvas_f32(pos2(901.0, 300.0), image_rect, &s).is_none());
        assert!(viewer.screen_to_canvas_f32(pos2(400.0, 651.0), image_rect, &s).is_none());
    }

    #[test]
    fn unscaled_display_maps_one_to_one() {
        let viewer = CanvasViewer::default();
        let s = session(400, 300);
        let image_rect = Rect::from_min_size(pos2(0.0, 0.0), Vec2::new(400.0, 300.0));

        let (x, y) = viewer
            .screen_to_canvas_f32(pos2(123.25, 77.5), image_rect, &s)
            .unwrap();
        assert!((x - 123.25).abs() < f32::EPSILON * 400.0);
        assert!((y - 77.5).abs() < f32::EPSILON * 300.0);
    }
}
