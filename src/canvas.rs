//! The drawing session: three equally-sized RGBA surfaces over one image.
//!
//! * **background** — the loaded image, repainted only on load.
//! * **ink** — the visible stroke overlay the user draws on.
//! * **mask** — a hidden two-tone surface marking edited regions for the
//!   annotation server: white where the pen touched, black everywhere else
//!   (the eraser writes black, restoring the untouched value exactly).
//!
//! Ink and mask are only ever written together, disc for disc, so their
//! covered regions cannot drift apart.  All stroke geometry is hard-edged:
//! an anti-aliased rim would put gray pixels on the mask.

use image::{Rgba, RgbaImage};
use rayon::prelude::*;

use crate::components::history::{HistoryManager, SessionSnapshot};

/// Mask value under pen strokes.
pub const MASK_MARKED: Rgba<u8> = Rgba([255, 255, 255, 255]);
/// Mask value everywhere else (initial fill, and what the eraser restores).
pub const MASK_UNMARKED: Rgba<u8> = Rgba([0, 0, 0, 255]);
/// Ink value the transparent eraser writes.
pub const INK_CLEAR: Rgba<u8> = Rgba([0, 0, 0, 0]);
/// Default pen ink: half-transparent black, so the image stays readable
/// under the annotation.
pub const DEFAULT_PEN_INK: Rgba<u8> = Rgba([0, 0, 0, 128]);

// ============================================================================
// DRAWING SESSION
// ============================================================================

/// One loaded image plus everything drawn over it.
///
/// A session is constructed whole from a decoded image and replaced whole by
/// the next load, so state from a previous image cannot leak through.  The
/// three surfaces always share the session's intrinsic dimensions; only a new
/// session changes them.
pub struct DrawingSession {
    background: RgbaImage,
    ink: RgbaImage,
    mask: RgbaImage,
    width: u32,
    height: u32,
    history: HistoryManager,
    /// Bumped on every pixel mutation; the viewer re-uploads its texture
    /// when this moves.
    revision: u64,
}

impl DrawingSession {
    /// Start a session over a freshly decoded image.  Ink starts fully
    /// transparent, the mask fully unmarked, history empty.
    pub fn from_image(background: RgbaImage) -> Self {
        let (width, height) = background.dimensions();
        Self {
            background,
            ink: RgbaImage::from_pixel(width, height, INK_CLEAR),
            mask: RgbaImage::from_pixel(width, height, MASK_UNMARKED),
            width,
            height,
            history: HistoryManager::default(),
            revision: 0,
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn background(&self) -> &RgbaImage {
        &self.background
    }

    pub fn ink(&self) -> &RgbaImage {
        &self.ink
    }

    pub fn mask(&self) -> &RgbaImage {
        &self.mask
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    // ------------------------------------------------------------------
    // History
    // ------------------------------------------------------------------

    /// Cap the number of undo steps kept for this session.
    pub fn set_history_limit(&mut self, max_entries: usize) {
        self.history.set_max_entries(max_entries);
    }

    /// Record the current surfaces as the state to return to on undo.
    /// Called once at stroke start and before destructive edits.
    pub fn record_history(&mut self, label: &str) {
        self.history
            .push(label, SessionSnapshot::capture(&self.ink, &self.mask));
    }

    pub fn undo(&mut self) -> Option<String> {
        let label = self.history.undo(&mut self.ink, &mut self.mask)?;
        self.revision += 1;
        Some(label)
    }

    pub fn redo(&mut self) -> Option<String> {
        let label = self.history.redo(&mut self.ink, &mut self.mask)?;
        self.revision += 1;
        Some(label)
    }

    pub fn can_undo(&self) -> bool {
        self.history.can_undo()
    }

    pub fn can_redo(&self) -> bool {
        self.history.can_redo()
    }

    pub fn undo_label(&self) -> Option<&str> {
        self.history.undo_label()
    }

    pub fn redo_label(&self) -> Option<&str> {
        self.history.redo_label()
    }

    // ------------------------------------------------------------------
    // Editing
    // ------------------------------------------------------------------

    /// Clear every stroke, keeping the loaded image.  Undoable.
    pub fn reset_ink(&mut self) {
        self.record_history("Reset");
        self.ink = RgbaImage::from_pixel(self.width, self.height, INK_CLEAR);
        self.mask = RgbaImage::from_pixel(self.width, self.height, MASK_UNMARKED);
        self.revision += 1;
    }

    /// Stamp one hard-edged disc onto ink and mask at a sub-pixel center.
    /// Pixels outside the surfaces are clipped.
    pub fn stamp_disc(
        &mut self,
        center: (f32, f32),
        radius: f32,
        ink_px: Rgba<u8>,
        mask_px: Rgba<u8>,
    ) {
        let (cx, cy) = center;
        let radius_sq = radius * radius;
        if radius_sq < 0.001 {
            return;
        }

        let min_x = ((cx - radius).max(0.0)) as u32;
        let max_x = ((cx + radius) as u32).min(self.width.saturating_sub(1));
        let min_y = ((cy - radius).max(0.0)) as u32;
        let max_y = ((cy + radius) as u32).min(self.height.saturating_sub(1));
        if min_x > max_x || min_y > max_y {
            return;
        }

        for y in min_y..=max_y {
            for x in min_x..=max_x {
                let dx = x as f32 + 0.5 - cx;
                let dy = y as f32 + 0.5 - cy;
                if dx * dx + dy * dy <= radius_sq {
                    self.ink.put_pixel(x, y, ink_px);
                    self.mask.put_pixel(x, y, mask_px);
                }
            }
        }
        self.revision += 1;
    }

    /// Stamp discs densely along a segment; with the disc radius this yields
    /// round caps and joins.  A zero-length segment (pointer tap) leaves a
    /// single dot.
    pub fn stroke_segment(
        &mut self,
        start: (f32, f32),
        end: (f32, f32),
        radius: f32,
        ink_px: Rgba<u8>,
        mask_px: Rgba<u8>,
    ) {
        let (x0, y0) = start;
        let (x1, y1) = end;
        let dx = x1 - x0;
        let dy = y1 - y0;
        let distance = (dx * dx + dy * dy).sqrt();

        if distance < 0.1 {
            if x0 >= 0.0 && (x0 as u32) < self.width && y0 >= 0.0 && (y0 as u32) < self.height {
                self.stamp_disc(start, radius, ink_px, mask_px);
            }
            return;
        }

        // Dense unit stepping keeps the hard-edged discs gap-free.
        let steps = distance.ceil() as usize;
        for i in 0..=steps {
            let t = i as f32 / steps as f32;
            let x = x0 + dx * t;
            let y = y0 + dy * t;
            if x >= 0.0 && (x as u32) < self.width && y >= 0.0 && (y as u32) < self.height {
                self.stamp_disc((x, y), radius, ink_px, mask_px);
            }
        }
    }

    // ------------------------------------------------------------------
    // Output
    // ------------------------------------------------------------------

    /// Composite the ink overlay onto the background (straight-alpha
    /// source-over), row-parallel.  Neither input surface is modified.
    pub fn merged(&self) -> RgbaImage {
        let mut out = self.background.clone();
        let row_bytes = self.width as usize * 4;
        if row_bytes == 0 {
            return out;
        }
        let ink = self.ink.as_raw();
        out.par_chunks_exact_mut(row_bytes)
            .zip(ink.par_chunks_exact(row_bytes))
            .for_each(|(dst_row, ink_row)| {
                for (dst, src) in dst_row
                    .chunks_exact_mut(4)
                    .zip(ink_row.chunks_exact(4))
                {
                    blend_over(dst, src);
                }
            });
        out
    }
}

/// Straight-alpha source-over of one RGBA pixel onto another, in place.
fn blend_over(dst: &mut [u8], src: &[u8]) {
    let sa = src[3] as f32 / 255.0;
    if sa <= 0.0 {
        return;
    }
    if sa >= 1.0 {
        dst.copy_from_slice(src);
        return;
    }
    let da = dst[3] as f32 / 255.0;
    let out_a = sa + da * (1.0 - sa);
    for c in 0..3 {
        let sc = src[c] as f32 / 255.0;
        let dc = dst[c] as f32 / 255.0;
        let out_c = (sc * sa + dc * da * (1.0 - sa)) / out_a;
        dst[c] = (out_c * 255.0).round() as u8;
    }
    dst[3] = (out_a * 255.0).round() as u8;
}
