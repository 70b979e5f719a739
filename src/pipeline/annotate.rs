use font8x8::{BASIC_FONTS, UnicodeFonts};

use crate::types::{Frame, PoseLandmarks, PostureState};

/// MediaPipe pose connections.
pub const CONNECTIONS: &[(usize, usize)] = &[
    (0, 1),
    (1, 2),
    (2, 3),
    (3, 7),
    (0, 4),
    (4, 5),
    (5, 6),
    (6, 8),
    (9, 10),
    (11, 12),
    (11, 13),
    (13, 15),
    (15, 17),
    (15, 19),
    (15, 21),
    (17, 19),
    (12, 14),
    (14, 16),
    (16, 18),
    (16, 20),
    (16, 22),
    (18, 20),
    (11, 23),
    (12, 24),
    (23, 24),
    (23, 25),
    (24, 26),
    (25, 27),
    (26, 28),
    (27, 29),
    (28, 30),
    (29, 31),
    (30, 32),
    (27, 31),
    (28, 32),
];

/// Face, hand and foot-tip landmarks left out of the overlay.
pub const HIDDEN_LANDMARKS: &[usize] = &[
    0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 17, 18, 19, 20, 21, 22, 29, 30, 31, 32,
];

pub const VISIBILITY_THRESHOLD: f32 = 0.5;

pub const LABEL_X_START: i32 = 25;
pub const LABEL_X_END: i32 = 275;
pub const LABEL_Y: i32 = 25;
const LABEL_LINE_GAP: i32 = 20;
const PLATE_OUTER_HEIGHT: i32 = 50;
const PLATE_INNER_HEIGHT: i32 = 45;

pub const PLATE_OUTER_COLOR: [u8; 4] = [255, 0, 255, 255];
pub const PLATE_INNER_COLOR: [u8; 4] = [0, 0, 0, 255];
pub const TEXT_COLOR: [u8; 4] = [255, 255, 255, 255];
pub const CONNECTION_COLOR: [u8; 4] = [230, 66, 245, 255];
pub const JOINT_COLOR: [u8; 4] = [0, 0, 255, 255];

const SKELETON_LINE_THICKNESS: i32 = 2;
const JOINT_RADIUS: i32 = 2;
const GLYPH_SIZE: i32 = 8;

/// Text shown for a slope; image y grows downward so the sign is flipped.
pub fn slope_label(slope: f32) -> String {
    let shown = -slope;
    let shown = if shown.abs() < 0.005 { 0.0 } else { shown };
    format!("Posture Slope: {shown:.2}")
}

pub fn posture_label(posture: PostureState) -> String {
    format!("Posture: {}", posture.label())
}

pub fn draw_posture_label(frame: &mut Frame, slope: f32, posture: PostureState) {
    let x0 = LABEL_X_START - 2;
    fill_rect(
        frame,
        x0,
        LABEL_Y - PLATE_OUTER_HEIGHT / 2,
        LABEL_X_END,
        LABEL_Y + PLATE_OUTER_HEIGHT / 2,
        PLATE_OUTER_COLOR,
    );
    fill_rect(
        frame,
        x0,
        LABEL_Y - PLATE_INNER_HEIGHT / 2,
        LABEL_X_END,
        LABEL_Y + PLATE_INNER_HEIGHT / 2,
        PLATE_INNER_COLOR,
    );

    // `LABEL_Y` is the text baseline.
    draw_text(
        frame,
        LABEL_X_START,
        LABEL_Y - GLYPH_SIZE,
        &slope_label(slope),
        TEXT_COLOR,
    );
    draw_text(
        frame,
        LABEL_X_START,
        LABEL_Y + LABEL_LINE_GAP - GLYPH_SIZE,
        &posture_label(posture),
        TEXT_COLOR,
    );
}

/// Draws the skeleton from a redacted copy; `landmarks` is left as is.
pub fn draw_pose_overlay(frame: &mut Frame, landmarks: &PoseLandmarks) {
    let redacted = landmarks.redacted(HIDDEN_LANDMARKS);
    let points: Vec<Option<(f32, f32)>> = redacted
        .points()
        .iter()
        .map(|lm| {
            let on_frame = (0.0..=1.0).contains(&lm.x) && (0.0..=1.0).contains(&lm.y);
            (lm.visibility >= VISIBILITY_THRESHOLD && on_frame)
                .then(|| lm.to_pixel(frame.width, frame.height))
        })
        .collect();

    for &(a, b) in CONNECTIONS {
        if let (Some(Some(pa)), Some(Some(pb))) = (points.get(a), points.get(b)) {
            draw_line(frame, pa, pb, CONNECTION_COLOR, SKELETON_LINE_THICKNESS);
        }
    }

    for &(x, y) in points.iter().flatten() {
        draw_circle(frame, (x as i32, y as i32), JOINT_RADIUS, JOINT_COLOR);
    }
}

fn draw_text(frame: &mut Frame, x: i32, y: i32, text: &str, color: [u8; 4]) {
    let mut pen_x = x;
    for ch in text.chars() {
        if let Some(glyph) = BASIC_FONTS.get(ch) {
            for (row, bits) in glyph.iter().enumerate() {
                for col in 0..GLYPH_SIZE {
                    if bits & (1 << col) != 0 {
                        put_pixel_safe(frame, pen_x + col, y + row as i32, color);
                    }
                }
            }
        }
        pen_x += GLYPH_SIZE;
    }
}

fn fill_rect(frame: &mut Frame, x0: i32, y0: i32, x1: i32, y1: i32, color: [u8; 4]) {
    for y in y0..=y1 {
        for x in x0..=x1 {
            put_pixel_safe(frame, x, y, color);
        }
    }
}

fn draw_line(frame: &mut Frame, p0: &(f32, f32), p1: &(f32, f32), color: [u8; 4], thickness: i32) {
    let (mut x0, mut y0) = (p0.0 as i32, p0.1 as i32);
    let (x1, y1) = (p1.0 as i32, p1.1 as i32);
    let dx = (x1 - x0).abs();
    let sx = if x0 < x1 { 1 } else { -1 };
    let dy = -(y1 - y0).abs();
    let sy = if y0 < y1 { 1 } else { -1 };
    let mut err = dx + dy;
    let radius = thickness.max(1) / 2;

    loop {
        for ox in -radius..=radius {
            for oy in -radius..=radius {
                if ox.abs() + oy.abs() <= radius {
                    put_pixel_safe(frame, x0 + ox, y0 + oy, color);
                }
            }
        }
        if x0 == x1 && y0 == y1 {
            break;
        }
        let e2 = 2 * err;
        if e2 >= dy {
            err += dy;
            x0 += sx;
        }
        if e2 <= dx {
            err += dx;
            y0 += sy;
        }
    }
}

fn draw_circle(frame: &mut Frame, center: (i32, i32), radius: i32, color: [u8; 4]) {
    let (cx, cy) = center;
    for dy in -radius..=radius {
        for dx in -radius..=radius {
            if dx * dx + dy * dy <= radius * radius {
                put_pixel_safe(frame, cx + dx, cy + dy, color);
            }
        }
    }
}

fn put_pixel_safe(frame: &mut Frame, x: i32, y: i32, color: [u8; 4]) {
    if x < 0 || y < 0 {
        return;
    }
    let (ux, uy) = (x as u32, y as u32);
    if ux >= frame.width || uy >= frame.height {
        return;
    }
    let idx = ((uy * frame.width + ux) as usize) * 4;
    if idx + 3 < frame.rgba.len() {
        frame.rgba[idx..idx + 4].copy_from_slice(&color);
    }
}
