//! FaceBoxes is a post-processing core for the FaceBoxes face detector.
//!
//! It regenerates the detector's anchor layout, decodes the network's box
//! regression and score tensors against it, and prunes the candidates with
//! greedy non-maximum suppression. Model loading, inference and image
//! resizing are left to the caller; this crate only consumes their results.
//! Optional parallel decoding is available via the `rayon` feature.

pub mod anchor;
pub mod candidate;
pub mod decode;
#[cfg(feature = "image-io")]
pub mod io;
pub mod lowlevel;
pub mod postprocess;
pub mod tensor;
mod trace;
pub mod util;

pub use anchor::{Anchor, AnchorCache, AnchorConfig, AnchorGenerator, FeatureLevel, PriorSpec};
pub use candidate::{BoxCorners, NmsParams};
pub use decode::{RawDetection, Variance};
pub use postprocess::{
    rescale, Detection, ImageMeta, ImageShape, PostProcessor, PostprocessConfig, FACE_CLASS_ID,
    LABELS,
};
pub use tensor::{ModelLayout, NetworkInfo, RawOutputs, TensorDesc, TensorView};
pub use util::{FaceBoxesError, FaceBoxesResult};
