//! Python bindings for the faceboxes post-processing library.
//!
//! The inference engine stays on the Python side; these bindings take its
//! output arrays and return face detections in original image pixels.

use numpy::{
    PyArray1, PyArray2, PyArrayMethods, PyReadonlyArray1, PyReadonlyArray2, PyReadonlyArray3,
    PyUntypedArrayMethods,
};
use pyo3::exceptions::{PyRuntimeError, PyValueError};
use pyo3::prelude::*;

use faceboxes::lowlevel::nms_boxes;
use faceboxes::{
    AnchorConfig, AnchorGenerator, BoxCorners, Detection as RustDetection, FaceBoxesError,
    ImageMeta, ImageShape, NetworkInfo, NmsParams, PostProcessor as RustPostProcessor,
    PostprocessConfig as RustPostprocessConfig, RawOutputs, TensorView, Variance,
};

/// Convert a FaceBoxesError to a Python exception.
fn to_py_err(err: FaceBoxesError) -> PyErr {
    PyRuntimeError::new_err(err.to_string())
}

/// A detected face in original image pixels.
#[pyclass]
#[derive(Clone)]
pub struct Detection {
    /// Left edge.
    #[pyo3(get)]
    pub xmin: f32,
    /// Top edge.
    #[pyo3(get)]
    pub ymin: f32,
    /// Right edge.
    #[pyo3(get)]
    pub xmax: f32,
    /// Bottom edge.
    #[pyo3(get)]
    pub ymax: f32,
    /// Foreground confidence.
    #[pyo3(get)]
    pub score: f32,
    /// Class id (always 0).
    #[pyo3(get)]
    pub class_id: u32,
    /// Class name.
    #[pyo3(get)]
    pub label: &'static str,
}

#[pymethods]
impl Detection {
    fn __repr__(&self) -> String {
        format!(
            "Detection(xmin={:.1}, ymin={:.1}, xmax={:.1}, ymax={:.1}, score={:.4}, label='{}')",
            self.xmin, self.ymin, self.xmax, self.ymax, self.score, self.label
        )
    }
}

impl From<RustDetection> for Detection {
    fn from(d: RustDetection) -> Self {
        Self {
            xmin: d.xmin,
            ymin: d.ymin,
            xmax: d.xmax,
            ymax: d.ymax,
            score: d.score,
            class_id: d.class_id,
            label: d.label().unwrap_or("unknown"),
        }
    }
}

/// Post-processing parameters.
#[pyclass]
#[derive(Clone)]
pub struct PostprocessConfig {
    inner: RustPostprocessConfig,
}

#[pymethods]
impl PostprocessConfig {
    /// Create a new PostprocessConfig.
    ///
    /// Args:
    ///     confidence_threshold: Minimum (exclusive) face score (default: 0.5)
    ///     nms_threshold: IoU above which overlapping boxes are dropped (default: 0.3)
    ///     keep_top_k: Maximum number of detections (default: 750)
    ///     variance: Center and size variance (default: (0.1, 0.2))
    ///     parallel: Decode rows in parallel (default: False)
    #[new]
    #[pyo3(signature = (
        confidence_threshold = 0.5,
        nms_threshold = 0.3,
        keep_top_k = 750,
        variance = (0.1, 0.2),
        parallel = false
    ))]
    fn new(
        confidence_threshold: f32,
        nms_threshold: f32,
        keep_top_k: usize,
        variance: (f32, f32),
        parallel: bool,
    ) -> PyResult<Self> {
        let inner = RustPostprocessConfig {
            variance: Variance {
                center: variance.0,
                size: variance.1,
            },
            confidence_threshold,
            nms_threshold,
            keep_top_k,
            parallel,
            ..RustPostprocessConfig::default()
        };
        inner.validate().map_err(to_py_err)?;
        Ok(Self { inner })
    }

    /// Validate the configuration.
    fn validate(&self) -> PyResult<()> {
        self.inner.validate().map_err(to_py_err)
    }

    fn __repr__(&self) -> String {
        format!(
            "PostprocessConfig(confidence_threshold={}, nms_threshold={}, keep_top_k={}, variance=({}, {}), parallel={})",
            self.inner.confidence_threshold,
            self.inner.nms_threshold,
            self.inner.keep_top_k,
            self.inner.variance.center,
            self.inner.variance.size,
            self.inner.parallel
        )
    }
}

/// Post-processor bound to one network input size.
#[pyclass]
pub struct PostProcessor {
    inner: RustPostProcessor,
}

#[pymethods]
impl PostProcessor {
    /// Create a post-processor for a network with the given input size.
    ///
    /// Args:
    ///     input_height: Network input height in pixels
    ///     input_width: Network input width in pixels
    ///     config: PostprocessConfig (default: PostprocessConfig())
    #[new]
    #[pyo3(signature = (input_height, input_width, config = None))]
    fn new(
        input_height: usize,
        input_width: usize,
        config: Option<PostprocessConfig>,
    ) -> PyResult<Self> {
        let cfg = config.map(|c| c.inner).unwrap_or_default();
        let generator = AnchorGenerator::new(cfg.anchors.clone()).map_err(to_py_err)?;
        let num_anchors = generator
            .anchor_count(input_height, input_width)
            .map_err(to_py_err)?;
        let network = NetworkInfo::faceboxes(input_height, input_width, num_anchors);
        let inner = RustPostProcessor::new(&network, cfg).map_err(to_py_err)?;
        Ok(Self { inner })
    }

    /// Number of anchors (rows expected in each output array).
    #[getter]
    fn num_anchors(&self) -> usize {
        self.inner.anchors().len()
    }

    /// Turn raw network outputs into detections.
    ///
    /// Args:
    ///     boxes: float32 array of shape (1, N, 4)
    ///     scores: float32 array of shape (1, N, 2)
    ///     original_height: Height of the image before resizing
    ///     original_width: Width of the image before resizing
    ///
    /// Returns:
    ///     List of Detection objects, sorted by score (best first)
    fn process(
        &self,
        boxes: PyReadonlyArray3<'_, f32>,
        scores: PyReadonlyArray3<'_, f32>,
        original_height: usize,
        original_width: usize,
    ) -> PyResult<Vec<Detection>> {
        let boxes = TensorView::new(boxes.as_slice()?, boxes.shape()).map_err(to_py_err)?;
        let scores = TensorView::new(scores.as_slice()?, scores.shape()).map_err(to_py_err)?;
        let layout = self.inner.layout();
        let meta = ImageMeta::new(
            ImageShape::new(original_height, original_width),
            ImageShape::new(layout.input_height(), layout.input_width()),
        );
        let detections = self
            .inner
            .process(RawOutputs::Pair { boxes, scores }, &meta)
            .map_err(to_py_err)?;
        Ok(detections.into_iter().map(Detection::from).collect())
    }

    fn __repr__(&self) -> String {
        let layout = self.inner.layout();
        format!(
            "PostProcessor(input={}x{}, num_anchors={})",
            layout.input_height(),
            layout.input_width(),
            layout.num_anchors()
        )
    }
}

/// Generate the FaceBoxes anchors for an input size.
///
/// Args:
///     height: Network input height in pixels
///     width: Network input width in pixels
///
/// Returns:
///     float32 array of shape (N, 4) with normalized (cx, cy, w, h) rows
#[pyfunction]
fn prior_boxes(py: Python<'_>, height: usize, width: usize) -> PyResult<Bound<'_, PyArray2<f32>>> {
    let generator = AnchorGenerator::new(AnchorConfig::default()).map_err(to_py_err)?;
    let anchors = generator.generate(height, width).map_err(to_py_err)?;
    let rows = anchors.len();
    let flat: Vec<f32> = anchors
        .iter()
        .flat_map(|a| [a.cx, a.cy, a.w, a.h])
        .collect();
    PyArray1::from_vec(py, flat).reshape([rows, 4])
}

/// Greedy non-maximum suppression.
///
/// Args:
///     boxes: float32 array of shape (N, 4) with (x1, y1, x2, y2) rows
///     scores: float32 array of shape (N,)
///     iou_threshold: Boxes overlapping a kept box above this IoU are dropped (default: 0.3)
///     include_boundaries: Treat corners as inclusive pixel indices (default: False)
///     max_keep: Size of the candidate pool taken by descending score (default: all)
///
/// Returns:
///     Indices of kept boxes in descending score order
#[pyfunction]
#[pyo3(signature = (boxes, scores, iou_threshold = 0.3, include_boundaries = false, max_keep = None))]
fn nms(
    boxes: PyReadonlyArray2<'_, f32>,
    scores: PyReadonlyArray1<'_, f32>,
    iou_threshold: f32,
    include_boundaries: bool,
    max_keep: Option<usize>,
) -> PyResult<Vec<usize>> {
    if boxes.shape()[1] != 4 {
        return Err(PyValueError::new_err("boxes must have shape (N, 4)"));
    }
    let corners: Vec<BoxCorners> = boxes
        .as_slice()?
        .chunks_exact(4)
        .map(|c| BoxCorners {
            x1: c[0],
            y1: c[1],
            x2: c[2],
            y2: c[3],
        })
        .collect();
    let params = NmsParams {
        iou_threshold,
        include_boundaries,
        max_keep,
    };
    nms_boxes(&corners, scores.as_slice()?, params).map_err(to_py_err)
}

/// Python module for FaceBoxes post-processing.
#[pymodule]
fn _faceboxes(m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add_class::<Detection>()?;
    m.add_class::<PostprocessConfig>()?;
    m.add_class::<PostProcessor>()?;
    m.add_function(wrap_pyfunction!(prior_boxes, m)?)?;
    m.add_function(wrap_pyfunction!(nms, m)?)?;

    m.add("__version__", env!("CARGO_PKG_VERSION"))?;

    Ok(())
}
