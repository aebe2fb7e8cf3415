//! Candidate pruning.
//!
//! Decoded boxes are pruned with greedy IoU-based non-maximum suppression.

pub mod nms;

pub use nms::{nms_boxes, BoxCorners, NmsParams};
