// Skeleton overlay - draws detected keypoints and edges onto a frame

use crate::models::pose::{Keypoint, PoseFrame, POSE_CONNECTIONS};
use image::{imageops, Rgba, RgbaImage};
use imageproc::drawing::{draw_filled_circle_mut, draw_hollow_circle_mut, draw_line_segment_mut};

#[derive(Debug, Clone)]
pub struct OverlayStyle {
    pub edge_color: Rgba<u8>,
    pub edge_width: u32,
    pub joint_fill: Rgba<u8>,
    pub joint_stroke: Rgba<u8>,
    pub joint_radius: u32,
}

impl Default for OverlayStyle {
    fn default() -> Self {
        Self {
            edge_color: Rgba([99, 102, 241, 255]),
            edge_width: 3,
            joint_fill: Rgba([139, 92, 246, 255]),
            joint_stroke: Rgba([99, 102, 241, 255]),
            joint_radius: 5,
        }
    }
}

/// What actually made it onto the frame
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OverlayStats {
    pub edges_drawn: usize,
    pub joints_drawn: usize,
}

/// Mirror the frame so the user sees themselves as in a mirror
pub fn mirror_frame(image: &mut RgbaImage) {
    imageops::flip_horizontal_in_place(image);
}

/// Draw the skeleton. Keypoints at or below `threshold` visibility, or with a
/// non-finite coordinate, are skipped. An edge is only drawn when both
/// endpoints pass.
pub fn draw_skeleton(
    image: &mut RgbaImage,
    pose: &PoseFrame,
    threshold: f32,
    mirror: bool,
    style: &OverlayStyle,
) -> OverlayStats {
    let (width, height) = image.dimensions();
    let (w, h) = (width as f32, height as f32);
    let keypoints = pose.keypoints();
    // Overshoot is kept within one frame of the image on each side
    let to_px = |x: f32, y: f32| -> (f32, f32) {
        let x = if mirror { 1.0 - x } else { x };
        ((x * w).clamp(-w, 2.0 * w), (y * h).clamp(-h, 2.0 * h))
    };
    let drawable =
        |kp: &Keypoint| kp.x.is_finite() && kp.y.is_finite() && kp.is_visible(threshold);

    let mut stats = OverlayStats::default();
    let half_width = (style.edge_width / 2) as i32;

    for &(start_idx, end_idx) in POSE_CONNECTIONS.iter() {
        let (Some(start), Some(end)) = (keypoints.get(start_idx), keypoints.get(end_idx)) else {
            continue;
        };
        if !drawable(start) || !drawable(end) {
            continue;
        }
        let (fx, fy) = to_px(start.x, start.y);
        let (tx, ty) = to_px(end.x, end.y);

        // Widen by stacking offset segments
        for offset in -half_width..=half_width {
            let o = offset as f32;
            draw_line_segment_mut(image, (fx + o, fy), (tx + o, ty), style.edge_color);
            draw_line_segment_mut(image, (fx, fy + o), (tx, ty + o), style.edge_color);
        }
        stats.edges_drawn += 1;
    }

    let radius = style.joint_radius as i32;
    for kp in keypoints.iter().filter(|kp| drawable(*kp)) {
        let (x, y) = to_px(kp.x, kp.y);
        let center = (x.round() as i32, y.round() as i32);
        draw_filled_circle_mut(image, center, radius, style.joint_fill);
        draw_hollow_circle_mut(image, center, radius, style.joint_stroke);
        stats.joints_drawn += 1;
    }

    stats
}
