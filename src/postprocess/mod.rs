//! End-to-end post-processing of FaceBoxes outputs.
//!
//! `PostProcessor` owns everything a call needs: the validated tensor layout,
//! the immutable configuration and the anchor set for the network input
//! size. A call binds the output tensors, decodes and filters candidates,
//! suppresses overlaps, caps the result and rescales the survivors to the
//! original image.

use crate::anchor::{Anchor, AnchorCache, AnchorConfig, AnchorGenerator};
use crate::candidate::{nms_boxes, BoxCorners, NmsParams};
use crate::decode::{BoxDecoder, RawDetection, Variance};
use crate::tensor::{BoundOutputs, ModelLayout, NetworkInfo, RawOutputs};
use crate::trace::{trace_event, trace_span};
use crate::util::{FaceBoxesError, FaceBoxesResult};
use std::sync::Arc;

/// Class id of every detection this model produces.
pub const FACE_CLASS_ID: u32 = 0;

/// Class names indexed by class id.
pub const LABELS: [&str; 1] = ["Face"];

/// Height and width of an image in pixels.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ImageShape {
    /// Rows.
    pub height: usize,
    /// Columns.
    pub width: usize,
}

impl ImageShape {
    /// Creates a shape.
    pub fn new(height: usize, width: usize) -> Self {
        Self { height, width }
    }

    fn validate(&self) -> FaceBoxesResult<()> {
        if self.height == 0 || self.width == 0 {
            return Err(FaceBoxesError::InvalidDimensions {
                height: self.height,
                width: self.width,
            });
        }
        Ok(())
    }
}

/// Shapes recorded by the preprocessing step for one image.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ImageMeta {
    /// Image as supplied by the caller, before resizing.
    pub original: ImageShape,
    /// Image after resizing to the network input.
    pub resized: ImageShape,
}

impl ImageMeta {
    /// Creates metadata from the original and resized shapes.
    pub fn new(original: ImageShape, resized: ImageShape) -> Self {
        Self { original, resized }
    }
}

/// A face in absolute pixel coordinates of the original image.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Detection {
    /// Left edge.
    pub xmin: f32,
    /// Top edge.
    pub ymin: f32,
    /// Right edge.
    pub xmax: f32,
    /// Bottom edge.
    pub ymax: f32,
    /// Foreground confidence.
    pub score: f32,
    /// Class id, always [`FACE_CLASS_ID`].
    pub class_id: u32,
}

impl Detection {
    /// Human-readable class name.
    pub fn label(&self) -> Option<&'static str> {
        LABELS.get(self.class_id as usize).copied()
    }

    /// Box width in pixels.
    pub fn width(&self) -> f32 {
        self.xmax - self.xmin
    }

    /// Box height in pixels.
    pub fn height(&self) -> f32 {
        self.ymax - self.ymin
    }
}

/// Scales a normalized candidate to pixel coordinates of `original`.
pub fn rescale(raw: &RawDetection, original: ImageShape) -> Detection {
    let w = original.width as f32;
    let h = original.height as f32;
    Detection {
        xmin: raw.bbox.x1 * w,
        ymin: raw.bbox.y1 * h,
        xmax: raw.bbox.x2 * w,
        ymax: raw.bbox.y2 * h,
        score: raw.score,
        class_id: FACE_CLASS_ID,
    }
}

/// Post-processing parameters.
#[derive(Clone, Debug, PartialEq)]
pub struct PostprocessConfig {
    /// Anchor layout the network was trained with.
    pub anchors: AnchorConfig,
    /// Regression variance pair.
    pub variance: Variance,
    /// Foreground scores must be strictly above this value.
    pub confidence_threshold: f32,
    /// IoU above which a lower-scored box is suppressed.
    pub nms_threshold: f32,
    /// Maximum number of detections returned. Also bounds the NMS
    /// candidate pool.
    pub keep_top_k: usize,
    /// Decode rows in parallel (requires the `rayon` feature).
    pub parallel: bool,
}

impl Default for PostprocessConfig {
    fn default() -> Self {
        Self {
            anchors: AnchorConfig::default(),
            variance: Variance::default(),
            confidence_threshold: 0.5,
            nms_threshold: 0.3,
            keep_top_k: 750,
            parallel: false,
        }
    }
}

impl PostprocessConfig {
    /// Validates all parameters.
    pub fn validate(&self) -> FaceBoxesResult<()> {
        self.anchors.validate()?;
        self.variance.validate()?;
        if !self.confidence_threshold.is_finite() {
            return Err(FaceBoxesError::InvalidConfig {
                reason: "confidence_threshold must be finite",
            });
        }
        if !self.nms_threshold.is_finite() || !(0.0..=1.0).contains(&self.nms_threshold) {
            return Err(FaceBoxesError::InvalidConfig {
                reason: "nms_threshold must be within [0, 1]",
            });
        }
        if self.keep_top_k == 0 {
            return Err(FaceBoxesError::InvalidConfig {
                reason: "keep_top_k must be at least 1",
            });
        }
        Ok(())
    }

    fn nms_params(&self) -> NmsParams {
        NmsParams {
            iou_threshold: self.nms_threshold,
            include_boundaries: false,
            max_keep: Some(self.keep_top_k),
        }
    }
}

/// Converts FaceBoxes output tensors into face detections.
#[derive(Clone, Debug)]
pub struct PostProcessor {
    layout: ModelLayout,
    cfg: PostprocessConfig,
    decoder: BoxDecoder,
    anchors: Arc<[Anchor]>,
}

impl PostProcessor {
    /// Validates the network layout and configuration and generates the
    /// anchors for the network input size.
    ///
    /// Fails if the anchor count differs from the output row count.
    pub fn new(network: &NetworkInfo, cfg: PostprocessConfig) -> FaceBoxesResult<Self> {
        cfg.validate()?;
        let layout = ModelLayout::resolve(network)?;
        let generator = AnchorGenerator::new(cfg.anchors.clone())?;
        let anchors: Arc<[Anchor]> = generator
            .generate(layout.input_height(), layout.input_width())?
            .into();
        Self::assemble(layout, cfg, anchors)
    }

    /// Like [`PostProcessor::new`], taking anchors from a shared cache.
    pub fn with_cache(
        network: &NetworkInfo,
        cfg: PostprocessConfig,
        cache: &AnchorCache,
    ) -> FaceBoxesResult<Self> {
        cfg.validate()?;
        if cache.config() != &cfg.anchors {
            return Err(FaceBoxesError::InvalidConfig {
                reason: "anchor cache layout differs from the postprocess config",
            });
        }
        let layout = ModelLayout::resolve(network)?;
        let anchors = cache.get_or_generate(layout.input_height(), layout.input_width())?;
        Self::assemble(layout, cfg, anchors)
    }

    fn assemble(
        layout: ModelLayout,
        cfg: PostprocessConfig,
        anchors: Arc<[Anchor]>,
    ) -> FaceBoxesResult<Self> {
        if anchors.len() != layout.num_anchors() {
            return Err(FaceBoxesError::AnchorCountMismatch {
                anchors: anchors.len(),
                rows: layout.num_anchors(),
            });
        }
        let decoder = BoxDecoder::new(cfg.variance, cfg.confidence_threshold);
        Ok(Self {
            layout,
            cfg,
            decoder,
            anchors,
        })
    }

    /// Validated tensor layout.
    pub fn layout(&self) -> &ModelLayout {
        &self.layout
    }

    /// Configuration in use.
    pub fn config(&self) -> &PostprocessConfig {
        &self.cfg
    }

    /// Anchors for the network input size.
    pub fn anchors(&self) -> &[Anchor] {
        &self.anchors
    }

    /// Runs the full pipeline on one image's outputs.
    ///
    /// Returns detections sorted by descending score, at most
    /// `keep_top_k` of them.
    pub fn process(
        &self,
        outputs: RawOutputs<'_>,
        meta: &ImageMeta,
    ) -> FaceBoxesResult<Vec<Detection>> {
        let bound = self.layout.bind(outputs)?;
        self.process_bound(&bound, meta.original)
    }

    /// Runs the pipeline on outputs already bound to this layout.
    pub fn process_bound(
        &self,
        outputs: &BoundOutputs<'_>,
        original: ImageShape,
    ) -> FaceBoxesResult<Vec<Detection>> {
        original.validate()?;
        let _span = trace_span!("postprocess", anchors = self.anchors.len()).entered();

        let candidates = self.decode(outputs)?;
        if candidates.is_empty() {
            trace_event!("postprocess_done", detections = 0usize);
            return Ok(Vec::new());
        }

        let keep = self.suppress(&candidates)?;
        let detections: Vec<Detection> = keep
            .into_iter()
            .map(|idx| rescale(&candidates[idx], original))
            .collect();

        trace_event!("postprocess_done", detections = detections.len());
        Ok(detections)
    }

    /// Decodes and confidence-filters all rows.
    pub fn decode(&self, outputs: &BoundOutputs<'_>) -> FaceBoxesResult<Vec<RawDetection>> {
        #[cfg(feature = "rayon")]
        if self.cfg.parallel {
            return self.decoder.decode_slices_par(
                &self.anchors,
                outputs.boxes().as_slice(),
                outputs.scores().as_slice(),
            );
        }
        self.decoder.decode(&self.anchors, outputs)
    }

    /// Suppresses overlapping candidates and applies the output cap.
    ///
    /// Returns indices into `candidates` in descending score order.
    pub fn suppress(&self, candidates: &[RawDetection]) -> FaceBoxesResult<Vec<usize>> {
        let boxes: Vec<BoxCorners> = candidates.iter().map(|c| c.bbox).collect();
        let scores: Vec<f32> = candidates.iter().map(|c| c.score).collect();
        let mut keep = nms_boxes(&boxes, &scores, self.cfg.nms_params())?;
        // The candidate pool is already capped; this bounds the output too.
        keep.truncate(self.cfg.keep_top_k);
        Ok(keep)
    }
}
