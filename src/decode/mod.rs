//! Decoding of regression and score rows against their anchors.
//!
//! The network predicts, per anchor, a center offset and a log-scale size
//! correction, both normalized by a fixed variance pair. Decoding undoes the
//! normalization, applies the corrections to the anchor and converts the
//! result to corner form. Rows whose foreground score does not exceed the
//! confidence threshold are dropped; survivors keep tensor order.
//!
//! Anchors and tensor rows are zipped into `PriorRow`s after a length check,
//! so an anchor can only ever be decoded with its own row.

#[cfg(feature = "rayon")]
pub mod rayon;

use crate::anchor::Anchor;
use crate::candidate::BoxCorners;
use crate::tensor::BoundOutputs;
use crate::trace::{trace_event, trace_span};
use crate::util::{FaceBoxesError, FaceBoxesResult};

/// Columns of the regression tensor: `dx, dy, dw, dh`.
pub const REGRESSION_COLUMNS: usize = 4;
/// Columns of the score tensor: background, foreground.
pub const SCORE_COLUMNS: usize = 2;
const FOREGROUND: usize = 1;

/// Scale factors applied to regression outputs before decoding.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Variance {
    /// Multiplier for the center offsets.
    pub center: f32,
    /// Multiplier for the log-size corrections.
    pub size: f32,
}

impl Default for Variance {
    fn default() -> Self {
        Self {
            center: 0.1,
            size: 0.2,
        }
    }
}

impl Variance {
    /// Validates that both factors are finite and positive.
    pub fn validate(&self) -> FaceBoxesResult<()> {
        if !self.center.is_finite() || !self.size.is_finite() {
            return Err(FaceBoxesError::InvalidConfig {
                reason: "variance must be finite",
            });
        }
        if self.center <= 0.0 || self.size <= 0.0 {
            return Err(FaceBoxesError::InvalidConfig {
                reason: "variance must be > 0",
            });
        }
        Ok(())
    }
}

/// Candidate box in normalized input coordinates, before suppression.
///
/// Coordinates are not clamped and may leave `[0, 1]` slightly.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RawDetection {
    /// Index of the anchor (and tensor row) this box was decoded from.
    pub anchor_index: usize,
    /// Decoded box in corner form.
    pub bbox: BoxCorners,
    /// Foreground confidence.
    pub score: f32,
}

/// An anchor together with its regression and score rows.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PriorRow {
    /// Position in the anchor set and in both output tensors.
    pub index: usize,
    /// The anchor.
    pub anchor: Anchor,
    /// `dx, dy, dw, dh`.
    pub regression: [f32; REGRESSION_COLUMNS],
    /// Background and foreground scores.
    pub scores: [f32; SCORE_COLUMNS],
}

impl PriorRow {
    /// Foreground confidence of this row.
    pub fn foreground(&self) -> f32 {
        self.scores[FOREGROUND]
    }

    /// Applies the regression to the anchor.
    pub fn decode_box(&self, variance: Variance) -> BoxCorners {
        let [dx, dy, dw, dh] = self.regression;
        let a = &self.anchor;
        let cx = variance.center * dx * a.w + a.cx;
        let cy = variance.center * dy * a.h + a.cy;
        let w = (variance.size * dw).exp() * a.w;
        let h = (variance.size * dh).exp() * a.h;
        BoxCorners::from_center(cx, cy, w, h)
    }
}

/// Zips anchors with their regression and score rows.
///
/// `regression` and `scores` are flat row-major buffers with 4 and 2 columns.
/// Any length disagreement is an error rather than a silent truncation.
pub fn pair_rows<'a>(
    anchors: &'a [Anchor],
    regression: &'a [f32],
    scores: &'a [f32],
) -> FaceBoxesResult<impl ExactSizeIterator<Item = PriorRow> + 'a> {
    check_rows(anchors.len(), regression.len(), scores.len())?;
    let rows = anchors
        .iter()
        .zip(regression.chunks_exact(REGRESSION_COLUMNS))
        .zip(scores.chunks_exact(SCORE_COLUMNS))
        .enumerate()
        .map(|(index, ((anchor, reg), score))| PriorRow {
            index,
            anchor: *anchor,
            regression: [reg[0], reg[1], reg[2], reg[3]],
            scores: [score[0], score[1]],
        });
    Ok(rows)
}

pub(crate) fn check_rows(anchors: usize, regression: usize, scores: usize) -> FaceBoxesResult<()> {
    if anchors.checked_mul(REGRESSION_COLUMNS) != Some(regression) {
        return Err(FaceBoxesError::RowCountMismatch {
            expected: anchors,
            got: regression / REGRESSION_COLUMNS,
            context: "regression rows",
        });
    }
    if anchors.checked_mul(SCORE_COLUMNS) != Some(scores) {
        return Err(FaceBoxesError::RowCountMismatch {
            expected: anchors,
            got: scores / SCORE_COLUMNS,
            context: "score rows",
        });
    }
    Ok(())
}

/// Turns paired rows into confidence-filtered candidates.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BoxDecoder {
    variance: Variance,
    confidence_threshold: f32,
}

impl BoxDecoder {
    /// Creates a decoder; rows need a foreground score strictly above
    /// `confidence_threshold` to survive.
    pub fn new(variance: Variance, confidence_threshold: f32) -> Self {
        Self {
            variance,
            confidence_threshold,
        }
    }

    /// Variance pair used for decoding.
    pub fn variance(&self) -> Variance {
        self.variance
    }

    /// Minimum (exclusive) foreground score.
    pub fn confidence_threshold(&self) -> f32 {
        self.confidence_threshold
    }

    /// Decodes one row, or returns `None` if it falls below the threshold.
    pub fn decode_row(&self, row: &PriorRow) -> Option<RawDetection> {
        let score = row.foreground();
        (score > self.confidence_threshold).then(|| RawDetection {
            anchor_index: row.index,
            bbox: row.decode_box(self.variance),
            score,
        })
    }

    /// Decodes flat regression and score buffers against `anchors`.
    pub fn decode_slices(
        &self,
        anchors: &[Anchor],
        regression: &[f32],
        scores: &[f32],
    ) -> FaceBoxesResult<Vec<RawDetection>> {
        let _span = trace_span!("decode", rows = anchors.len()).entered();
        let out: Vec<RawDetection> = pair_rows(anchors, regression, scores)?
            .filter_map(|row| self.decode_row(&row))
            .collect();
        trace_event!("decode_candidates", candidates = out.len());
        Ok(out)
    }

    /// Decodes bound network outputs against `anchors`.
    pub fn decode(
        &self,
        anchors: &[Anchor],
        outputs: &BoundOutputs<'_>,
    ) -> FaceBoxesResult<Vec<RawDetection>> {
        self.decode_slices(
            anchors,
            outputs.boxes().as_slice(),
            outputs.scores().as_slice(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn anchor(cx: f32, cy: f32, w: f32, h: f32) -> Anchor {
        Anchor { cx, cy, w, h }
    }

    #[test]
    fn zero_regression_reproduces_anchor() {
        let anchors = [anchor(0.5, 0.5, 0.2, 0.2)];
        let decoder = BoxDecoder::new(Variance::default(), 0.5);
        let out = decoder
            .decode_slices(&anchors, &[0.0; 4], &[0.1, 0.9])
            .unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].bbox, BoxCorners::from_center(0.5, 0.5, 0.2, 0.2));
        assert_eq!(out[0].anchor_index, 0);
        assert_eq!(out[0].score, 0.9);
    }

    #[test]
    fn regression_scales_by_variance_and_anchor_size() {
        let row = PriorRow {
            index: 3,
            anchor: anchor(0.5, 0.5, 0.2, 0.4),
            regression: [1.0, -1.0, 0.0, 5.0],
            scores: [0.0, 1.0],
        };
        let bbox = row.decode_box(Variance::default());
        // cx = 0.5 + 0.1 * 0.2, cy = 0.5 - 0.1 * 0.4, h = 0.4 * e
        let h = 0.4 * 1.0f32.exp();
        assert!(((bbox.x1 + bbox.x2) * 0.5 - 0.52).abs() < 1e-6);
        assert!(((bbox.y1 + bbox.y2) * 0.5 - 0.46).abs() < 1e-6);
        assert!((bbox.x2 - bbox.x1 - 0.2).abs() < 1e-6);
        assert!((bbox.y2 - bbox.y1 - h).abs() < 1e-5);
    }

    #[test]
    fn threshold_is_exclusive() {
        let anchors = [anchor(0.2, 0.2, 0.1, 0.1), anchor(0.7, 0.7, 0.1, 0.1)];
        let decoder = BoxDecoder::new(Variance::default(), 0.5);
        let above = 0.5f32 + 1e-6;
        let out = decoder
            .decode_slices(&anchors, &[0.0; 8], &[0.5, 0.5, 0.0, above])
            .unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].anchor_index, 1);
    }

    #[test]
    fn nan_scores_are_dropped() {
        let anchors = [anchor(0.2, 0.2, 0.1, 0.1)];
        let decoder = BoxDecoder::new(Variance::default(), 0.5);
        let out = decoder
            .decode_slices(&anchors, &[0.0; 4], &[0.0, f32::NAN])
            .unwrap();
        assert!(out.is_empty());
    }

    #[test]
    fn row_count_mismatch_is_reported() {
        let anchors = [anchor(0.2, 0.2, 0.1, 0.1); 2];
        let decoder = BoxDecoder::new(Variance::default(), 0.5);
        let err = decoder
            .decode_slices(&anchors, &[0.0; 4], &[0.0; 4])
            .unwrap_err();
        assert_eq!(
            err,
            FaceBoxesError::RowCountMismatch {
                expected: 2,
                got: 1,
                context: "regression rows",
            }
        );
        let err = decoder
            .decode_slices(&anchors, &[0.0; 8], &[0.0; 2])
            .unwrap_err();
        assert_eq!(
            err,
            FaceBoxesError::RowCountMismatch {
                expected: 2,
                got: 1,
                context: "score rows",
            }
        );
    }
}
