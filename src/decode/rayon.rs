//! Rayon-parallel decoding (feature-gated).
//!
//! Rows are independent, so they are decoded with an indexed parallel
//! iterator. Collecting an indexed iterator keeps tensor order, which makes
//! the output identical to `BoxDecoder::decode_slices`.

use super::{check_rows, BoxDecoder, PriorRow, RawDetection, REGRESSION_COLUMNS, SCORE_COLUMNS};
use crate::anchor::Anchor;
use crate::trace::{trace_event, trace_span};
use crate::util::FaceBoxesResult;
use rayon::prelude::*;

impl BoxDecoder {
    /// Parallel counterpart of [`BoxDecoder::decode_slices`].
    pub fn decode_slices_par(
        &self,
        anchors: &[Anchor],
        regression: &[f32],
        scores: &[f32],
    ) -> FaceBoxesResult<Vec<RawDetection>> {
        check_rows(anchors.len(), regression.len(), scores.len())?;
        let _span = trace_span!("decode_par", rows = anchors.len()).entered();

        let out: Vec<RawDetection> = anchors
            .par_iter()
            .zip(regression.par_chunks_exact(REGRESSION_COLUMNS))
            .zip(scores.par_chunks_exact(SCORE_COLUMNS))
            .enumerate()
            .filter_map(|(index, ((anchor, reg), score))| {
                let row = PriorRow {
                    index,
                    anchor: *anchor,
                    regression: [reg[0], reg[1], reg[2], reg[3]],
                    scores: [score[0], score[1]],
                };
                self.decode_row(&row)
            })
            .collect();

        trace_event!("decode_candidates", candidates = out.len());
        Ok(out)
    }
}
