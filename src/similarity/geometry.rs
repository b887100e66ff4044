//! Bounding box overlap.

use crate::vehicle::BoundingBox;

/// Guards the union against division by zero for degenerate boxes.
pub const IOU_EPSILON: f64 = 1e-6;

/// Intersection-over-union of two boxes, clamped to `[0, 1]`.
///
/// Zero-area boxes are valid input and score 0 against anything.
pub fn iou(a: &BoundingBox, b: &BoundingBox) -> f64 {
    let x_min = (a.left as f64).max(b.left as f64);
    let y_min = (a.top as f64).max(b.top as f64);
    let x_max = a.right().min(b.right());
    let y_max = a.bottom().min(b.bottom());

    let inter = (x_max - x_min).max(0.0) * (y_max - y_min).max(0.0);
    let union = a.area() + b.area() - inter + IOU_EPSILON;

    (inter / union).clamp(0.0, 1.0)
}

/// IoU with the soft boost applied: once the raw overlap exceeds
/// `threshold`, the score is lifted to at least `floor`.
pub fn boosted_iou(a: &BoundingBox, b: &BoundingBox, threshold: f64, floor: f64) -> f64 {
    let raw = iou(a, b);
    if raw > threshold {
        raw.max(floor)
    } else {
        raw
    }
}
