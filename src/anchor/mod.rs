//! Anchor (prior box) generation for the FaceBoxes detection head.
//!
//! Anchors are laid out per feature-map level. Every level walks its grid in
//! row-major order and emits, per cell, one dense sub-grid of centers for each
//! prior size. The resulting order is the order the network was trained with:
//! regression row `i` refines anchor `i`, so the layout must never change for
//! a given configuration and input size.

pub mod cache;

use crate::trace::{trace_event, trace_span};
use crate::util::math::{ceil_div, clamp_unit};
use crate::util::{FaceBoxesError, FaceBoxesResult};

pub use cache::AnchorCache;

/// Reference box in center form, normalized by the network input size.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Anchor {
    /// Center x in `[0, 1]`.
    pub cx: f32,
    /// Center y in `[0, 1]`.
    pub cy: f32,
    /// Width in `[0, 1]`.
    pub w: f32,
    /// Height in `[0, 1]`.
    pub h: f32,
}

impl Anchor {
    fn clamped(cx: f32, cy: f32, w: f32, h: f32) -> Self {
        Self {
            cx: clamp_unit(cx),
            cy: clamp_unit(cy),
            w: clamp_unit(w),
            h: clamp_unit(h),
        }
    }
}

/// One prior size on a feature-map level.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PriorSpec {
    /// Side length of the prior in input pixels.
    pub min_size: f32,
    /// Sub-positions per cell along each axis.
    ///
    /// A density of `d > 1` places centers at `{0, 1/d, .., (d-1)/d}` of the
    /// cell; a density of 1 places a single center at `0.5`.
    pub density: usize,
}

impl PriorSpec {
    /// Prior with a single centered anchor per cell.
    pub const fn centered(min_size: f32) -> Self {
        Self {
            min_size,
            density: 1,
        }
    }

    /// Prior with a `density x density` sub-grid per cell.
    pub const fn dense(min_size: f32, density: usize) -> Self {
        Self { min_size, density }
    }

    fn anchors_per_cell(&self) -> usize {
        self.density * self.density
    }

    fn offsets(&self) -> Vec<f32> {
        if self.density == 1 {
            return vec![0.5];
        }
        let d = self.density as f32;
        (0..self.density).map(|k| k as f32 / d).collect()
    }
}

/// A feature-map level: its stride and the priors placed in every cell.
#[derive(Clone, Debug, PartialEq)]
pub struct FeatureLevel {
    /// Stride of the feature map in input pixels.
    pub step: usize,
    /// Priors emitted for every cell, in order.
    pub priors: Vec<PriorSpec>,
}

impl FeatureLevel {
    /// Number of anchors each cell of this level contributes.
    pub fn anchors_per_cell(&self) -> usize {
        self.priors.iter().map(PriorSpec::anchors_per_cell).sum()
    }

    /// Feature-map grid `(rows, cols)` for an input size.
    pub fn grid(&self, height: usize, width: usize) -> (usize, usize) {
        (ceil_div(height, self.step), ceil_div(width, self.step))
    }
}

/// Multi-level anchor layout.
#[derive(Clone, Debug, PartialEq)]
pub struct AnchorConfig {
    /// Feature-map levels, finest first.
    pub levels: Vec<FeatureLevel>,
}

impl Default for AnchorConfig {
    /// The FaceBoxes layout: min sizes `[[32, 64, 128], [256], [512]]` on
    /// steps `[32, 64, 128]`, with 4x4 and 2x2 densification of the two
    /// smallest priors.
    fn default() -> Self {
        Self {
            levels: vec![
                FeatureLevel {
                    step: 32,
                    priors: vec![
                        PriorSpec::dense(32.0, 4),
                        PriorSpec::dense(64.0, 2),
                        PriorSpec::centered(128.0),
                    ],
                },
                FeatureLevel {
                    step: 64,
                    priors: vec![PriorSpec::centered(256.0)],
                },
                FeatureLevel {
                    step: 128,
                    priors: vec![PriorSpec::centered(512.0)],
                },
            ],
        }
    }
}

impl AnchorConfig {
    /// Validates the layout parameters.
    pub fn validate(&self) -> FaceBoxesResult<()> {
        if self.levels.is_empty() {
            return Err(FaceBoxesError::InvalidConfig {
                reason: "anchor config needs at least one level",
            });
        }
        for level in &self.levels {
            if level.step == 0 {
                return Err(FaceBoxesError::InvalidConfig {
                    reason: "level step must be > 0",
                });
            }
            if level.priors.is_empty() {
                return Err(FaceBoxesError::InvalidConfig {
                    reason: "level needs at least one prior",
                });
            }
            for prior in &level.priors {
                if !prior.min_size.is_finite() || prior.min_size <= 0.0 {
                    return Err(FaceBoxesError::InvalidConfig {
                        reason: "prior min_size must be finite and > 0",
                    });
                }
                if prior.density == 0 {
                    return Err(FaceBoxesError::InvalidConfig {
                        reason: "prior density must be > 0",
                    });
                }
            }
        }
        Ok(())
    }

    /// Minimum prior sizes per level.
    pub fn min_sizes(&self) -> Vec<Vec<f32>> {
        self.levels
            .iter()
            .map(|level| level.priors.iter().map(|p| p.min_size).collect())
            .collect()
    }

    /// Step per level.
    pub fn steps(&self) -> Vec<usize> {
        self.levels.iter().map(|level| level.step).collect()
    }
}

/// Builds the ordered anchor set for an input size.
#[derive(Clone, Debug)]
pub struct AnchorGenerator {
    cfg: AnchorConfig,
}

impl Default for AnchorGenerator {
    fn default() -> Self {
        Self {
            cfg: AnchorConfig::default(),
        }
    }
}

impl AnchorGenerator {
    /// Creates a generator after validating the layout.
    pub fn new(cfg: AnchorConfig) -> FaceBoxesResult<Self> {
        cfg.validate()?;
        Ok(Self { cfg })
    }

    /// Returns the layout this generator was built with.
    pub fn config(&self) -> &AnchorConfig {
        &self.cfg
    }

    /// Number of anchors `generate` yields for an input size.
    pub fn anchor_count(&self, height: usize, width: usize) -> FaceBoxesResult<usize> {
        if height == 0 || width == 0 {
            return Err(FaceBoxesError::InvalidDimensions { height, width });
        }
        let mut total = 0usize;
        for level in &self.cfg.levels {
            let (rows, cols) = level.grid(height, width);
            total = rows
                .checked_mul(cols)
                .and_then(|cells| cells.checked_mul(level.anchors_per_cell()))
                .and_then(|count| total.checked_add(count))
                .ok_or(FaceBoxesError::InvalidDimensions { height, width })?;
        }
        Ok(total)
    }

    /// Generates all anchors for an input of `height x width` pixels.
    ///
    /// Levels are emitted in configuration order. Within a level, rows are
    /// the outer loop and columns the inner loop; within a cell, priors keep
    /// their configured order and each sub-grid varies x fastest. All
    /// coordinates are clamped to `[0, 1]`.
    pub fn generate(&self, height: usize, width: usize) -> FaceBoxesResult<Vec<Anchor>> {
        let count = self.anchor_count(height, width)?;
        let _span = trace_span!("anchor_generate", height = height, width = width).entered();

        let h_f = height as f32;
        let w_f = width as f32;
        let mut anchors = Vec::with_capacity(count);
        for level in &self.cfg.levels {
            let (rows, cols) = level.grid(height, width);
            let step = level.step as f32;
            let priors: Vec<(PriorSpec, Vec<f32>)> = level
                .priors
                .iter()
                .map(|prior| (*prior, prior.offsets()))
                .collect();

            for i in 0..rows {
                for j in 0..cols {
                    for (prior, offsets) in &priors {
                        let w = prior.min_size / w_f;
                        let h = prior.min_size / h_f;
                        for &oy in offsets {
                            let cy = (i as f32 + oy) * step / h_f;
                            for &ox in offsets {
                                let cx = (j as f32 + ox) * step / w_f;
                                anchors.push(Anchor::clamped(cx, cy, w, h));
                            }
                        }
                    }
                }
            }
        }

        debug_assert_eq!(anchors.len(), count);
        trace_event!("anchors_generated", anchors = anchors.len());
        Ok(anchors)
    }
}
