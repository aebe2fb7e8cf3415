//! Network layout discovery and per-call output binding.
//!
//! `ModelLayout::resolve` inspects the network metadata once: one
//! `[1, 3, H, W]` input and two rank-3 outputs told apart by their trailing
//! dimension (4 for box regression, 2 for class scores). Per call, the
//! caller hands over outputs either by name or as an explicit pair; `bind`
//! resolves either form into `BoundOutputs` and checks the shapes.

use super::TensorView;
use crate::util::{FaceBoxesError, FaceBoxesResult};
use std::collections::HashMap;

const BOX_COLUMNS: usize = 4;
const SCORE_COLUMNS: usize = 2;

/// Name and shape of one network tensor.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TensorDesc {
    /// Tensor name as reported by the inference engine.
    pub name: String,
    /// Tensor dimensions.
    pub shape: Vec<usize>,
}

impl TensorDesc {
    /// Creates a descriptor.
    pub fn new(name: impl Into<String>, shape: &[usize]) -> Self {
        Self {
            name: name.into(),
            shape: shape.to_vec(),
        }
    }
}

/// Input and output metadata of a loaded network.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct NetworkInfo {
    /// Input tensors.
    pub inputs: Vec<TensorDesc>,
    /// Output tensors.
    pub outputs: Vec<TensorDesc>,
}

impl NetworkInfo {
    /// Describes a FaceBoxes network with the conventional tensor names
    /// (`data`, `boxes`, `scores`).
    pub fn faceboxes(height: usize, width: usize, num_anchors: usize) -> Self {
        Self {
            inputs: vec![TensorDesc::new("data", &[1, 3, height, width])],
            outputs: vec![
                TensorDesc::new("boxes", &[1, num_anchors, BOX_COLUMNS]),
                TensorDesc::new("scores", &[1, num_anchors, SCORE_COLUMNS]),
            ],
        }
    }
}

/// Validated tensor layout of a FaceBoxes network.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ModelLayout {
    input_name: String,
    input_height: usize,
    input_width: usize,
    boxes_name: String,
    scores_name: String,
    num_anchors: usize,
}

impl ModelLayout {
    /// Checks the network metadata and locates the box and score outputs.
    pub fn resolve(info: &NetworkInfo) -> FaceBoxesResult<Self> {
        let [input] = info.inputs.as_slice() else {
            return Err(FaceBoxesError::InputCount {
                got: info.inputs.len(),
            });
        };
        let (input_height, input_width) = check_input_shape(&input.shape)?;

        let [first, second] = info.outputs.as_slice() else {
            return Err(FaceBoxesError::OutputCount {
                got: info.outputs.len(),
            });
        };
        let shape_err = || FaceBoxesError::InvalidOutputShape {
            first: first.shape.clone(),
            second: second.shape.clone(),
        };

        let (boxes, scores) = match (output_columns(first), output_columns(second)) {
            (Some(BOX_COLUMNS), Some(SCORE_COLUMNS)) => (first, second),
            (Some(SCORE_COLUMNS), Some(BOX_COLUMNS)) => (second, first),
            _ => return Err(shape_err()),
        };

        let num_anchors = boxes.shape[1];
        if scores.shape[1] != num_anchors {
            return Err(FaceBoxesError::RowCountMismatch {
                expected: num_anchors,
                got: scores.shape[1],
                context: "score output",
            });
        }

        Ok(Self {
            input_name: input.name.clone(),
            input_height,
            input_width,
            boxes_name: boxes.name.clone(),
            scores_name: scores.name.clone(),
            num_anchors,
        })
    }

    /// Name of the image input.
    pub fn input_name(&self) -> &str {
        &self.input_name
    }

    /// Network input height in pixels.
    pub fn input_height(&self) -> usize {
        self.input_height
    }

    /// Network input width in pixels.
    pub fn input_width(&self) -> usize {
        self.input_width
    }

    /// Name of the `[1, N, 4]` regression output.
    pub fn boxes_name(&self) -> &str {
        &self.boxes_name
    }

    /// Name of the `[1, N, 2]` score output.
    pub fn scores_name(&self) -> &str {
        &self.scores_name
    }

    /// Rows per output tensor.
    pub fn num_anchors(&self) -> usize {
        self.num_anchors
    }

    /// Resolves per-call outputs into the box and score views.
    pub fn bind<'a>(&self, outputs: RawOutputs<'a>) -> FaceBoxesResult<BoundOutputs<'a>> {
        let (boxes, scores) = match outputs {
            RawOutputs::Pair { boxes, scores } => (boxes, scores),
            RawOutputs::Named(mut named) => {
                let boxes = named.remove(self.boxes_name.as_str()).ok_or_else(|| {
                    FaceBoxesError::MissingOutput {
                        name: self.boxes_name.clone(),
                    }
                })?;
                let scores = named.remove(self.scores_name.as_str()).ok_or_else(|| {
                    FaceBoxesError::MissingOutput {
                        name: self.scores_name.clone(),
                    }
                })?;
                (boxes, scores)
            }
        };

        if boxes.shape() != [1, self.num_anchors, BOX_COLUMNS]
            || scores.shape() != [1, self.num_anchors, SCORE_COLUMNS]
        {
            return Err(FaceBoxesError::InvalidOutputShape {
                first: boxes.shape().to_vec(),
                second: scores.shape().to_vec(),
            });
        }
        Ok(BoundOutputs { boxes, scores })
    }
}

/// Output tensors as handed over by the caller.
#[derive(Clone, Debug)]
pub enum RawOutputs<'a> {
    /// Outputs keyed by tensor name, as most inference engines return them.
    Named(HashMap<&'a str, TensorView<'a>>),
    /// Outputs already told apart by the caller.
    Pair {
        /// `[1, N, 4]` box regression.
        boxes: TensorView<'a>,
        /// `[1, N, 2]` background/foreground scores.
        scores: TensorView<'a>,
    },
}

/// Box and score tensors checked against a `ModelLayout`.
#[derive(Clone, Debug)]
pub struct BoundOutputs<'a> {
    boxes: TensorView<'a>,
    scores: TensorView<'a>,
}

impl<'a> BoundOutputs<'a> {
    /// `[1, N, 4]` regression tensor.
    pub fn boxes(&self) -> &TensorView<'a> {
        &self.boxes
    }

    /// `[1, N, 2]` score tensor.
    pub fn scores(&self) -> &TensorView<'a> {
        &self.scores
    }
}

fn check_input_shape(shape: &[usize]) -> FaceBoxesResult<(usize, usize)> {
    let &[n, c, h, w] = shape else {
        return Err(FaceBoxesError::InvalidInputShape {
            shape: shape.to_vec(),
            reason: "expected rank 4 [N, C, H, W]",
        });
    };
    if n != 1 {
        return Err(FaceBoxesError::InvalidInputShape {
            shape: shape.to_vec(),
            reason: "only batch size 1 is supported",
        });
    }
    if c != 3 {
        return Err(FaceBoxesError::InvalidInputShape {
            shape: shape.to_vec(),
            reason: "expected 3-channel input",
        });
    }
    if h == 0 || w == 0 {
        return Err(FaceBoxesError::InvalidDimensions {
            height: h,
            width: w,
        });
    }
    Ok((h, w))
}

/// Trailing dimension of a `[1, N, C]` output, or `None` for any other rank
/// or batch size.
fn output_columns(desc: &TensorDesc) -> Option<usize> {
    match desc.shape.as_slice() {
        &[1, _, cols] => Some(cols),
        _ => None,
    }
}
