//! Low-level building blocks for custom post-processing pipelines.
//!
//! These expose the individual stages behind `PostProcessor` for callers
//! that run their own orchestration, for example to reuse the decoder with
//! a different suppression strategy.

pub use crate::candidate::nms::nms_boxes;
pub use crate::decode::{pair_rows, BoxDecoder, PriorRow, REGRESSION_COLUMNS, SCORE_COLUMNS};
pub use crate::tensor::BoundOutputs;
