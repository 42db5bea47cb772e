//! Integration tests: drawing session end to end.
//!
//! Drives the stroke engine the way pointer events do, then checks the
//! invariants the rest of the app depends on: ink and mask stay paired,
//! undo round trips are exact, a new load replaces state wholesale, and
//! save payloads survive the encode/decode round trip.

use egui::{Rect, pos2, vec2};
use image::{Rgba, RgbaImage};
use maskpad::canvas::DrawingSession;
use maskpad::components::tools::{StrokeEngine, Tool, ToolProperties};
use maskpad::io;
use maskpad::net::SavePayload;
use maskpad::view::{CanvasViewer, fit_rect};

/// A session over a patterned background, so compositing mistakes show up
/// as byte differences instead of cancelling out on a flat color.
fn patterned_session(width: u32, height: u32) -> DrawingSession {
    let background = RgbaImage::from_fn(width, height, |x, y| {
        Rgba([(x % 251) as u8, (y % 241) as u8, ((x + y) % 253) as u8, 255])
    });
    DrawingSession::from_image(background)
}

fn pen(width: f32) -> ToolProperties {
    ToolProperties {
        tool: Tool::Pen,
        pen_width: width,
        ..Default::default()
    }
}

fn eraser(width: f32) -> ToolProperties {
    ToolProperties {
        tool: Tool::Eraser,
        eraser_width: width,
        ..Default::default()
    }
}

/// One whole pointer gesture: down, one move, up.
fn stroke(
    session: &mut DrawingSession,
    props: &ToolProperties,
    from: (f32, f32),
    to: (f32, f32),
) {
    let mut engine = StrokeEngine::default();
    engine.pointer_down(session, props, from);
    engine.pointer_move(session, props, to);
    engine.pointer_up();
}

/// Every mask pixel is exactly marked-white or unmarked-black, and a pixel
/// is marked precisely when the ink above it has any coverage.  Holds for
/// the default transparent eraser.
fn assert_surfaces_paired(session: &DrawingSession) {
    for (ink_px, mask_px) in session.ink().pixels().zip(session.mask().pixels()) {
        let marked = mask_px.0 == [255, 255, 255, 255];
        let unmarked = mask_px.0 == [0, 0, 0, 255];
        assert!(
            marked || unmarked,
            "mask must stay two-tone, got {:?}",
            mask_px
        );
        assert_eq!(
            ink_px.0[3] > 0,
            marked,
            "ink coverage and mask marking disagree"
        );
    }
}

// ─── Strokes and mask pairing ───────────────────────────────────────────

#[test]
fn horizontal_stroke_marks_expected_band() {
    let mut session = patterned_session(400, 300);
    stroke(&mut session, &pen(10.0), (50.0, 50.0), (150.0, 50.0));

    let marked = [(100, 50), (100, 47), (100, 53), (48, 50), (152, 50)];
    for (x, y) in marked {
        assert_eq!(
            session.mask().get_pixel(x, y).0,
            [255, 255, 255, 255],
            "({}, {}) should be inside the band",
            x,
            y
        );
    }
    let unmarked = [(100, 58), (40, 50), (160, 50), (200, 200)];
    for (x, y) in unmarked {
        assert_eq!(
            session.mask().get_pixel(x, y).0,
            [0, 0, 0, 255],
            "({}, {}) should be outside the band",
            x,
            y
        );
    }
    assert_surfaces_paired(&session);
}

#[test]
fn overlapping_pen_and_eraser_keep_surfaces_paired() {
    let mut session = patterned_session(200, 200);
    stroke(&mut session, &pen(16.0), (30.0, 100.0), (170.0, 100.0));
    stroke(&mut session, &pen(16.0), (100.0, 30.0), (100.0, 170.0));
    // Eraser diagonally through both strokes
    stroke(&mut session, &eraser(12.0), (40.0, 40.0), (160.0, 160.0));

    assert_surfaces_paired(&session);

    // The eraser path itself is clean again
    assert_eq!(session.ink().get_pixel(100, 100).0[3], 0);
    assert_eq!(session.mask().get_pixel(100, 100).0, [0, 0, 0, 255]);
    // Stroke areas away from the eraser path are still inked
    assert!(session.ink().get_pixel(40, 100).0[3] > 0);
    assert_eq!(session.mask().get_pixel(40, 100).0, [255, 255, 255, 255]);
}

#[test]
fn tap_without_movement_leaves_a_dot() {
    let mut session = patterned_session(100, 100);
    let props = pen(8.0);
    let mut engine = StrokeEngine::default();
    engine.pointer_down(&mut session, &props, (50.0, 50.0));
    engine.pointer_up();

    assert_eq!(session.mask().get_pixel(50, 50).0, [255, 255, 255, 255]);
    assert_eq!(session.mask().get_pixel(50, 57).0, [0, 0, 0, 255]);
    assert_surfaces_paired(&session);
}

#[test]
fn strokes_past_the_edge_are_clamped() {
    let mut session = patterned_session(64, 64);
    stroke(&mut session, &pen(20.0), (2.0, 32.0), (-40.0, 32.0));

    // Pixels near the edge are painted, and nothing panicked
    assert!(session.ink().get_pixel(0, 32).0[3] > 0);
    assert_surfaces_paired(&session);
}

// ─── Undo and redo ──────────────────────────────────────────────────────

#[test]
fn undo_redo_round_trip_is_byte_exact() {
    let mut session = patterned_session(120, 90);

    let mut checkpoints: Vec<(RgbaImage, RgbaImage)> =
        vec![(session.ink().clone(), session.mask().clone())];
    stroke(&mut session, &pen(6.0), (10.0, 10.0), (90.0, 10.0));
    checkpoints.push((session.ink().clone(), session.mask().clone()));
    stroke(&mut session, &pen(6.0), (10.0, 40.0), (90.0, 40.0));
    checkpoints.push((session.ink().clone(), session.mask().clone()));
    stroke(&mut session, &eraser(10.0), (50.0, 0.0), (50.0, 89.0));
    checkpoints.push((session.ink().clone(), session.mask().clone()));

    // Walk all the way back, comparing against each checkpoint
    for expected in checkpoints.iter().rev().skip(1) {
        assert!(session.undo().is_some(), "undo should succeed");
        assert!(
            session.ink().as_raw() == expected.0.as_raw(),
            "ink does not match its checkpoint after undo"
        );
        assert!(
            session.mask().as_raw() == expected.1.as_raw(),
            "mask does not match its checkpoint after undo"
        );
    }
    assert!(session.undo().is_none(), "history should be exhausted");

    // And all the way forward again
    for expected in checkpoints.iter().skip(1) {
        assert!(session.redo().is_some(), "redo should succeed");
        assert!(
            session.ink().as_raw() == expected.0.as_raw(),
            "ink does not match its checkpoint after redo"
        );
        assert!(
            session.mask().as_raw() == expected.1.as_raw(),
            "mask does not match its checkpoint after redo"
        );
    }
    assert!(session.redo().is_none());
}

#[test]
fn one_gesture_is_one_undo_step() {
    let mut session = patterned_session(100, 100);
    let props = pen(6.0);
    let mut engine = StrokeEngine::default();
    engine.pointer_down(&mut session, &props, (10.0, 50.0));
    for step in 1..=8 {
        engine.pointer_move(&mut session, &props, (10.0 + step as f32 * 10.0, 50.0));
    }
    engine.pointer_up();

    assert!(session.undo().is_some());
    assert!(
        session.ink().pixels().all(|p| p.0[3] == 0),
        "a single undo should remove the whole gesture"
    );
    assert!(session.undo().is_none());
}

#[test]
fn new_stroke_after_undo_drops_redo() {
    let mut session = patterned_session(80, 80);
    stroke(&mut session, &pen(6.0), (10.0, 10.0), (70.0, 10.0));
    stroke(&mut session, &pen(6.0), (10.0, 40.0), (70.0, 40.0));

    session.undo();
    assert!(session.can_redo());

    stroke(&mut session, &pen(6.0), (10.0, 70.0), (70.0, 70.0));
    assert!(!session.can_redo(), "a fresh edit invalidates the redone future");
}

#[test]
fn history_limit_caps_undo_depth() {
    let mut session = patterned_session(60, 60);
    session.set_history_limit(2);

    stroke(&mut session, &pen(4.0), (5.0, 10.0), (55.0, 10.0));
    stroke(&mut session, &pen(4.0), (5.0, 30.0), (55.0, 30.0));
    stroke(&mut session, &pen(4.0), (5.0, 50.0), (55.0, 50.0));

    assert!(session.undo().is_some());
    assert!(session.undo().is_some());
    assert!(session.undo().is_none(), "oldest step should have been dropped");
}

#[test]
fn reset_clears_everything_and_is_undoable() {
    let mut session = patterned_session(90, 90);
    stroke(&mut session, &pen(8.0), (10.0, 45.0), (80.0, 45.0));
    let inked = session.ink().clone();

    session.reset_ink();
    assert!(session.ink().pixels().all(|p| p.0[3] == 0));
    assert!(session.mask().pixels().all(|p| p.0 == [0, 0, 0, 255]));

    assert_eq!(session.undo().as_deref(), Some("Reset"));
    assert!(
        session.ink().as_raw() == inked.as_raw(),
        "undoing a reset should bring the strokes back"
    );
}

// ─── Loading replaces the session wholesale ─────────────────────────────

#[test]
fn fresh_session_carries_no_residue() {
    let mut first = patterned_session(64, 64);
    stroke(&mut first, &pen(10.0), (5.0, 32.0), (60.0, 32.0));
    assert!(first.can_undo());

    // A new load constructs a new session; nothing is copied over.
    let second = DrawingSession::from_image(RgbaImage::from_pixel(
        32,
        48,
        Rgba([9, 9, 9, 255]),
    ));

    assert_eq!((second.width(), second.height()), (32, 48));
    assert!(second.ink().pixels().all(|p| p.0[3] == 0));
    assert!(second.mask().pixels().all(|p| p.0 == [0, 0, 0, 255]));
    assert!(!second.can_undo() && !second.can_redo());
    assert!(
        second.merged().as_raw() == second.background().as_raw(),
        "an untouched session must merge to its background exactly"
    );
}

// ─── Viewport geometry never touches the surfaces ───────────────────────

#[test]
fn fitting_and_mapping_leave_surfaces_untouched() {
    let mut session = patterned_session(200, 100);
    stroke(&mut session, &pen(10.0), (20.0, 50.0), (180.0, 50.0));
    let ink_before = session.ink().clone();
    let revision_before = session.revision();

    let viewer = CanvasViewer::default();
    for (w, h) in [(900.0, 500.0), (300.0, 800.0), (120.0, 70.0)] {
        let avail = Rect::from_min_size(pos2(0.0, 0.0), vec2(w, h));
        let image_rect = fit_rect(avail, session.width(), session.height());
        assert!(avail.contains_rect(image_rect));
        let _ = viewer.screen_to_canvas_f32(image_rect.center(), image_rect, &session);
    }

    assert!(session.ink().as_raw() == ink_before.as_raw());
    assert_eq!(session.revision(), revision_before);
}

#[test]
fn screen_mapping_inverts_the_fit_scaling() {
    let session = patterned_session(200, 100);
    let viewer = CanvasViewer::default();
    // Displayed at exactly 2x, offset into the window
    let image_rect = Rect::from_min_size(pos2(40.0, 30.0), vec2(400.0, 200.0));

    let (x, y) = viewer
        .screen_to_canvas_f32(pos2(140.0, 130.0), image_rect, &session)
        .unwrap();
    assert!((x - 50.0).abs() < 1e-4);
    assert!((y - 50.0).abs() < 1e-4);

    // Outside the displayed box maps to nothing
    assert!(
        viewer
            .screen_to_canvas_f32(pos2(10.0, 10.0), image_rect, &session)
            .is_none()
    );
}

// ─── Save payloads ──────────────────────────────────────────────────────

#[test]
fn save_payload_round_trips_every_surface() {
    let mut session = patterned_session(96, 64);
    stroke(&mut session, &pen(8.0), (10.0, 32.0), (86.0, 32.0));
    stroke(&mut session, &eraser(6.0), (48.0, 5.0), (48.0, 60.0));

    let merged = session.merged();
    let payload = SavePayload::from_surfaces(&merged, session.ink(), Some(session.mask()))
        .expect("payload encoding should succeed");

    let merged_back = io::from_data_url(&payload.merged_image).unwrap();
    let ink_back = io::from_data_url(&payload.drawing_image).unwrap();
    let mask_back = io::from_data_url(payload.mask_image.as_deref().unwrap()).unwrap();

    assert!(merged_back.as_raw() == merged.as_raw(), "merged layer changed in transit");
    assert!(ink_back.as_raw() == session.ink().as_raw(), "drawing layer changed in transit");
    assert!(mask_back.as_raw() == session.mask().as_raw(), "mask layer changed in transit");
}

#[test]
fn payload_omits_mask_when_capability_is_off() {
    let session = patterned_session(16, 16);
    let merged = session.merged();
    let payload = SavePayload::from_surfaces(&merged, session.ink(), None).unwrap();
    assert!(payload.mask_image.is_none());

    let json = serde_json::to_value(&payload).unwrap();
    assert!(json.get("mask_image").is_none(), "absent mask must not serialize as null");
}

#[test]
fn oversized_input_is_rejected_before_decoding() {
    // Valid PNG bytes, but over the configured cap: the cap must win.
    let image = RgbaImage::from_pixel(64, 64, Rgba([1, 2, 3, 255]));
    let bytes = io::encode_png(&image).unwrap();
    let cap = (bytes.len() as u64) - 1;

    match io::decode_image_bytes(&bytes, cap) {
        Err(io::LoadError::TooLarge(size, max)) => {
            assert_eq!(size, bytes.len() as u64);
            assert_eq!(max, cap);
        }
        other => panic!("expected TooLarge, got {:?}", other.map(|_| "image")),
    }

    // Under the cap the same bytes decode fine.
    let decoded = io::decode_image_bytes(&bytes, bytes.len() as u64).unwrap();
    assert_eq!(decoded.dimensions(), (64, 64));
}
