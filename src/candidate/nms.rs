//! Greedy non-maximum suppression over corner-form boxes.

use crate::trace::{trace_event, trace_span};
use crate::util::math::guarded_ratio;
use crate::util::{FaceBoxesError, FaceBoxesResult};

/// Axis-aligned box in corner form.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BoxCorners {
    /// Left edge.
    pub x1: f32,
    /// Top edge.
    pub y1: f32,
    /// Right edge.
    pub x2: f32,
    /// Bottom edge.
    pub y2: f32,
}

impl BoxCorners {
    /// Converts a center/size box to corner form.
    pub fn from_center(cx: f32, cy: f32, w: f32, h: f32) -> Self {
        Self {
            x1: cx - 0.5 * w,
            y1: cy - 0.5 * h,
            x2: cx + 0.5 * w,
            y2: cy + 0.5 * h,
        }
    }

    /// Box area. With `include_boundaries` the corners are treated as
    /// inclusive pixel indices and each side gains one unit.
    pub fn area(&self, include_boundaries: bool) -> f32 {
        let b = boundary(include_boundaries);
        (self.x2 - self.x1 + b) * (self.y2 - self.y1 + b)
    }

    /// Intersection over union with `other`; 0 when the union is empty.
    pub fn iou(&self, other: &Self, include_boundaries: bool) -> f32 {
        let union_base = self.area(include_boundaries) + other.area(include_boundaries);
        overlap(self, other, union_base, include_boundaries)
    }
}

/// Suppression parameters.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct NmsParams {
    /// Boxes overlapping a kept box by more than this IoU are dropped.
    pub iou_threshold: f32,
    /// Treat corners as inclusive pixel indices.
    pub include_boundaries: bool,
    /// Size of the candidate pool taken from the top of the score order
    /// before suppression starts.
    pub max_keep: Option<usize>,
}

impl Default for NmsParams {
    fn default() -> Self {
        Self {
            iou_threshold: 0.3,
            include_boundaries: false,
            max_keep: None,
        }
    }
}

fn boundary(include_boundaries: bool) -> f32 {
    if include_boundaries {
        1.0
    } else {
        0.0
    }
}

fn overlap(a: &BoxCorners, b: &BoxCorners, area_sum: f32, include_boundaries: bool) -> f32 {
    let pad = boundary(include_boundaries);
    let w = (a.x2.min(b.x2) - a.x1.max(b.x1) + pad).max(0.0);
    let h = (a.y2.min(b.y2) - a.y1.max(b.y1) + pad).max(0.0);
    let intersection = w * h;
    guarded_ratio(intersection, area_sum - intersection)
}

/// Runs greedy NMS and returns the kept indices in descending score order.
///
/// Candidates are stably sorted by descending score, so equal scores keep
/// their input order. With `max_keep` set, only the first `max_keep`
/// candidates of that order take part. The head of the pool is kept and
/// every remaining candidate whose IoU with it exceeds the threshold is
/// dropped, until the pool is empty.
pub fn nms_boxes(
    boxes: &[BoxCorners],
    scores: &[f32],
    params: NmsParams,
) -> FaceBoxesResult<Vec<usize>> {
    if boxes.len() != scores.len() {
        return Err(FaceBoxesError::RowCountMismatch {
            expected: boxes.len(),
            got: scores.len(),
            context: "nms scores",
        });
    }
    let _span = trace_span!("nms", candidates = boxes.len()).entered();

    let areas: Vec<f32> = boxes
        .iter()
        .map(|b| b.area(params.include_boundaries))
        .collect();

    let mut order: Vec<usize> = (0..boxes.len()).collect();
    order.sort_by(|&a, &b| scores[b].total_cmp(&scores[a]));
    if let Some(max_keep) = params.max_keep {
        order.truncate(max_keep);
    }

    let mut keep = Vec::new();
    while let Some((&head, rest)) = order.split_first() {
        keep.push(head);
        let kept_box = &boxes[head];
        let survivors: Vec<usize> = rest
            .iter()
            .copied()
            .filter(|&idx| {
                let iou = overlap(
                    kept_box,
                    &boxes[idx],
                    areas[head] + areas[idx],
                    params.include_boundaries,
                );
                iou <= params.iou_threshold
            })
            .collect();
        order = survivors;
    }

    trace_event!("nms_kept", kept = keep.len());
    Ok(keep)
}
