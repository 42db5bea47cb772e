use crate::canvas::{DEFAULT_PEN_INK, DrawingSession, INK_CLEAR, MASK_MARKED, MASK_UNMARKED};
use eframe::egui;
use egui::Color32;
use image::Rgba;

/// Smallest and largest permitted stroke width, in canvas pixels.
pub const MIN_STROKE_WIDTH: f32 = 1.0;
pub const MAX_STROKE_WIDTH: f32 = 100.0;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum Tool {
    #[default]
    Pen,
    Eraser,
}

impl Tool {
    pub fn label(&self) -> &'static str {
        match self {
            Tool::Pen => "Pen",
            Tool::Eraser => "Eraser",
        }
    }

    /// History entry label for a stroke made with this tool.
    pub fn stroke_label(&self) -> &'static str {
        match self {
            Tool::Pen => "Pen stroke",
            Tool::Eraser => "Eraser stroke",
        }
    }
}

/// What the eraser writes to the ink overlay.
///
/// `Transparent` punches through to the background (the overlay analog of a
/// destination-out composite).  `White` paints opaque white, for deployments
/// that flatten the annotation onto an opaque surface.  Both restore the
/// mask to unmarked.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum EraserMode {
    #[default]
    Transparent,
    White,
}

/// Active tool plus per-tool parameters.  Read on every draw call, mutated
/// only by the toolbar; nothing here is stroke state.
#[derive(Clone, Debug)]
pub struct ToolProperties {
    pub tool: Tool,
    /// Stroke widths are independent per tool, matching the separate pen
    /// and eraser size controls.
    pub pen_width: f32,
    pub eraser_width: f32,
    pub pen_color: Color32,
    pub eraser_mode: EraserMode,
}

impl Default for ToolProperties {
    fn default() -> Self {
        Self {
            tool: Tool::Pen,
            pen_width: 10.0,
            eraser_width: 10.0,
            pen_color: Color32::from_rgba_unmultiplied(
                DEFAULT_PEN_INK[0],
                DEFAULT_PEN_INK[1],
                DEFAULT_PEN_INK[2],
                DEFAULT_PEN_INK[3],
            ),
            eraser_mode: EraserMode::Transparent,
        }
    }
}

impl ToolProperties {
    /// Width of the active tool, clamped to the permitted range.
    pub fn active_width(&self) -> f32 {
        let w = match self.tool {
            Tool::Pen => self.pen_width,
            Tool::Eraser => self.eraser_width,
        };
        w.clamp(MIN_STROKE_WIDTH, MAX_STROKE_WIDTH)
    }

    pub fn active_radius(&self) -> f32 {
        self.active_width() / 2.0
    }

    /// The pixel the active tool writes to the ink overlay.
    pub fn ink_pixel(&self) -> Rgba<u8> {
        match self.tool {
            Tool::Pen => color32_to_rgba(self.pen_color),
            Tool::Eraser => match self.eraser_mode {
                EraserMode::Transparent => INK_CLEAR,
                EraserMode::White => Rgba([255, 255, 255, 255]),
            },
        }
    }

    /// The pixel the active tool writes to the mask.
    pub fn mask_pixel(&self) -> Rgba<u8> {
        match self.tool {
            Tool::Pen => MASK_MARKED,
            Tool::Eraser => MASK_UNMARKED,
        }
    }

    /// Toolbar controls: tool buttons, the active tool's width slider, and
    /// (when enabled) the pen color button.
    pub fn show_controls(&mut self, ui: &mut egui::Ui, show_color_picker: bool) {
        for tool in [Tool::Pen, Tool::Eraser] {
            if ui
                .selectable_label(self.tool == tool, tool.label())
                .clicked()
            {
                self.tool = tool;
            }
        }

        ui.separator();

        let width = match self.tool {
            Tool::Pen => &mut self.pen_width,
            Tool::Eraser => &mut self.eraser_width,
        };
        ui.label("Size:");
        ui.add(
            egui::Slider::new(width, MIN_STROKE_WIDTH..=MAX_STROKE_WIDTH)
                .fixed_decimals(0),
        );

        if show_color_picker && self.tool == Tool::Pen {
            ui.separator();
            ui.label("Color:");
            ui.color_edit_button_srgba(&mut self.pen_color);
        }
    }
}

pub(crate) fn color32_to_rgba(c: Color32) -> Rgba<u8> {
    Rgba([c.r(), c.g(), c.b(), c.a()])
}

// ============================================================================
// STROKE ENGINE
// ============================================================================

/// The idle/drawing state machine between pointer events and the session.
///
/// One history snapshot per stroke, taken on pointer-down before the first
/// disc lands, so undo removes whole strokes.
#[derive(Default)]
pub struct StrokeEngine {
    active: bool,
    last_point: Option<(f32, f32)>,
}

impl StrokeEngine {
    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Begin a stroke at a mapped canvas position.  Stamps immediately so a
    /// click with no movement still leaves a dot.
    pub fn pointer_down(
        &mut self,
        session: &mut DrawingSession,
        props: &ToolProperties,
        pos: (f32, f32),
    ) {
        session.record_history(props.tool.stroke_label());
        session.stroke_segment(
            pos,
            pos,
            props.active_radius(),
            props.ink_pixel(),
            props.mask_pixel(),
        );
        self.active = true;
        self.last_point = Some(pos);
    }

    /// Extend the stroke to a new mapped position.  Each pointer event is one
    /// discrete segment from the previous position.
    pub fn pointer_move(
        &mut self,
        session: &mut DrawingSession,
        props: &ToolProperties,
        pos: (f32, f32),
    ) {
        if !self.active {
            return;
        }
        if let Some(last) = self.last_point {
            session.stroke_segment(
                last,
                pos,
                props.active_radius(),
                props.ink_pixel(),
                props.mask_pixel(),
            );
        }
        self.last_point = Some(pos);
    }

    /// Close the stroke (pointer released or left the canvas).
    pub fn pointer_up(&mut self) {
        self.active = false;
        self.last_point = None;
    }

    /// Abort without closing normally; used when a load replaces the session
    /// while a stroke is mid-flight.
    pub fn cancel(&mut self) {
        self.active = false;
        self.last_point = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::RgbaImage;

    fn session() -> DrawingSession {
        DrawingSession::from_image(RgbaImage::from_pixel(60, 60, Rgba([20, 20, 20, 255])))
    }

    #[test]
    fn down_move_up_draws_one_undoable_stroke() {
        let mut s = session();
        let props = ToolProperties::default();
        let mut engine = StrokeEngine::default();

        engine.pointer_down(&mut s, &props, (10.0, 10.0));
        assert!(engine.is_active());
        engine.pointer_move(&mut s, &props, (30.0, 10.0));
        engine.pointer_move(&mut s, &props, (50.0, 30.0));
        engine.pointer_up();
        assert!(!engine.is_active());

        assert_eq!(*s.mask().get_pixel(30, 10), MASK_MARKED);
        assert_eq!(*s.mask().get_pixel(40, 20), MASK_MARKED);

        // The whole stroke is one history entry.
        assert_eq!(s.undo().as_deref(), Some("Pen stroke"));
        assert!(s.mask().pixels().all(|p| *p == MASK_UNMARKED));
        assert!(!s.can_undo());
    }

    #[test]
    fn tap_without_movement_leaves_a_dot() {
        let mut s = session();
        let props = ToolProperties::default();
        let mut engine = StrokeEngine::default();

        engine.pointer_down(&mut s, &props, (25.0, 25.0));
        engine.pointer_up();

        assert_eq!(*s.mask().get_pixel(25, 25), MASK_MARKED);
        assert!(s.ink().get_pixel(25, 25)[3] > 0);
    }

    #[test]
    fn move_without_down_is_ignored() {
        let mut s = session();
        let props = ToolProperties::default();
        let mut engine = StrokeEngine::default();

        engine.pointer_move(&mut s, &props, (25.0, 25.0));
        assert!(s.mask().pixels().all(|p| *p == MASK_UNMARKED));
        assert!(!s.can_undo());
    }

    #[test]
    fn transparent_eraser_clears_ink_and_mask() {
        let mut s = session();
        let mut props = ToolProperties::default();
        props.pen_width = 8.0;
        let mut engine = StrokeEngine::default();

        engine.pointer_down(&mut s, &props, (20.0, 20.0));
        engine.pointer_move(&mut s, &props, (40.0, 20.0));
        engine.pointer_up();

        props.tool = Tool::Eraser;
        props.eraser_width = 12.0;
        engine.pointer_down(&mut s, &props, (20.0, 20.0));
        engine.pointer_move(&mut s, &props, (40.0, 20.0));
        engine.pointer_up();

        assert!(s.ink().pixels().all(|p| p[3] == 0));
        assert!(s.mask().pixels().all(|p| *p == MASK_UNMARKED));
        assert_eq!(s.undo_label(), Some("Eraser stroke"));
    }

    #[test]
    fn white_eraser_paints_opaque_white_but_unmarks_mask() {
        let mut s = session();
        let mut props = ToolProperties {
            tool: Tool::Eraser,
            eraser_mode: EraserMode::White,
            ..ToolProperties::default()
        };
        props.eraser_width = 6.0;
        let mut engine = StrokeEngine::default();

        engine.pointer_down(&mut s, &props, (30.0, 30.0));
        engine.pointer_up();

        assert_eq!(*s.ink().get_pixel(30, 30), Rgba([255, 255, 255, 255]));
        assert_eq!(*s.mask().get_pixel(30, 30), MASK_UNMARKED);
    }

    #[test]
    fn widths_are_independent_per_tool() {
        let mut props = ToolProperties::default();
        props.pen_width = 3.0;
        props.eraser_width = 40.0;

        props.tool = Tool::Pen;
        assert_eq!(props.active_width(), 3.0);
        props.tool = Tool::Eraser;
        assert_eq!(props.active_width(), 40.0);
    }

    #[test]
    fn out_of_range_widths_clamp() {
        let mut props = ToolProperties::default();
        props.pen_width = 0.0;
        assert_eq!(props.active_width(), MIN_STROKE_WIDTH);
        props.pen_width = 10_000.0;
        assert_eq!(props.active_width(), MAX_STROKE_WIDTH);
    }

    #[test]
    fn cancel_mid_stroke_stops_extension() {
        let mut s = session();
        let props = ToolProperties::default();
        let mut engine = StrokeEngine::default();

        engine.pointer_down(&mut s, &props, (10.0, 10.0));
        engine.cancel();
        engine.pointer_move(&mut s, &props, (50.0, 50.0));

        assert_eq!(*s.mask().get_pixel(50, 50), MASK_UNMARKED);
    }
}
