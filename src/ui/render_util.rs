use super::{Arc, HUD_ACCENT, ImageBuffer, ImageFrame, RenderImage, Rgba};
use crate::types::Frame;

const RETICLE_THICKNESS: i32 = 3;

/// Turns a camera frame into a GPUI image with the HUD reticle burned in.
pub(super) fn frame_to_image(frame: &Frame) -> Option<Arc<RenderImage>> {
    if frame.width == 0 || frame.height == 0 {
        return None;
    }

    let mut rgba = frame.rgba.clone();
    draw_reticle(&mut rgba, frame.width, frame.height);

    // GPUI expects BGRA; convert in place to avoid the async asset pipeline and flicker.
    for px in rgba.chunks_exact_mut(4) {
        px.swap(0, 2);
    }

    let buffer = ImageBuffer::<Rgba<u8>, Vec<u8>>::from_raw(frame.width, frame.height, rgba)?;
    Some(Arc::new(RenderImage::new(vec![ImageFrame::new(buffer)])))
}

fn hud_color() -> [u8; 4] {
    [
        (HUD_ACCENT >> 16) as u8,
        (HUD_ACCENT >> 8) as u8,
        HUD_ACCENT as u8,
        255,
    ]
}

/// Corner brackets plus a small centre cross, scaled to the frame.
fn draw_reticle(buffer: &mut [u8], width: u32, height: u32) {
    let color = hud_color();
    let (w, h) = (width as i32, height as i32);
    let margin = (w.min(h) / 12).max(4);
    let arm = (w.min(h) / 8).max(6);
    let (left, top, right, bottom) = (margin, margin, w - 1 - margin, h - 1 - margin);

    let corners = [
        ((left, top), (left + arm, top), (left, top + arm)),
        ((right, top), (right - arm, top), (right, top + arm)),
        ((left, bottom), (left + arm, bottom), (left, bottom - arm)),
        ((right, bottom), (right - arm, bottom), (right, bottom - arm)),
    ];
    for (corner, horizontal, vertical) in corners {
        draw_line(buffer, width, height, corner, horizontal, color, RETICLE_THICKNESS);
        draw_line(buffer, width, height, corner, vertical, color, RETICLE_THICKNESS);
    }

    let (cx, cy) = (w / 2, h / 2);
    let cross = arm / 3;
    draw_line(buffer, width, height, (cx - cross, cy), (cx + cross, cy), color, 1);
    draw_line(buffer, width, height, (cx, cy - cross), (cx, cy + cross), color, 1);
}

fn draw_line(
    buffer: &mut [u8],
    width: u32,
    height: u32,
    p0: (i32, i32),
    p1: (i32, i32),
    color: [u8; 4],
    thickness: i32,
) {
    let (mut x0, mut y0) = p0;
    let (x1, y1) = p1;
    let dx = (x1 - x0).abs();
    let sx = if x0 < x1 { 1 } else { -1 };
    let dy = -(y1 - y0).abs();
    let sy = if y0 < y1 { 1 } else { -1 };
    let mut err = dx + dy;
    let radius = (thickness.max(1) - 1) / 2;

    loop {
        for ox in -radius..=radius {
            for oy in -radius..=radius {
                put_pixel_safe(buffer, width, height, x0 + ox, y0 + oy, color);
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

fn put_pixel_safe(buffer: &mut [u8], width: u32, height: u32, x: i32, y: i32, color: [u8; 4]) {
    if x < 0 || y < 0 {
        return;
    }
    let (ux, uy) = (x as u32, y as u32);
    if ux >= width || uy >= height {
        return;
    }
    let idx = ((uy * width + ux) as usize) * 4;
    if let Some(px) = buffer.get_mut(idx..idx + 4) {
        px.copy_from_slice(&color);
    }
}
