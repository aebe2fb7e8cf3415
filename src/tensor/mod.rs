//! Borrowed tensor views and network layout descriptions.
//!
//! The post-processor never runs the network. It only sees the metadata the
//! inference engine reports and the flat `f32` buffers it produced.
//! `TensorView` pairs such a buffer with its shape, and `layout` checks the
//! metadata once, up front, so per-call code can rely on it.

pub mod layout;

pub use layout::{BoundOutputs, ModelLayout, NetworkInfo, RawOutputs, TensorDesc};

use crate::util::{FaceBoxesError, FaceBoxesResult};

/// Borrowed, row-major `f32` tensor.
#[derive(Clone, Debug)]
pub struct TensorView<'a> {
    data: &'a [f32],
    shape: Vec<usize>,
}

impl<'a> TensorView<'a> {
    /// Wraps `data` with `shape`; extra trailing elements are ignored.
    pub fn new(data: &'a [f32], shape: &[usize]) -> FaceBoxesResult<Self> {
        let needed = shape
            .iter()
            .try_fold(1usize, |acc, &dim| acc.checked_mul(dim))
            .ok_or(FaceBoxesError::BufferTooSmall {
                needed: usize::MAX,
                got: data.len(),
            })?;
        if data.len() < needed {
            return Err(FaceBoxesError::BufferTooSmall {
                needed,
                got: data.len(),
            });
        }
        Ok(Self {
            data: &data[..needed],
            shape: shape.to_vec(),
        })
    }

    /// Dimensions of the tensor.
    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    /// Backing elements, exactly as many as the shape describes.
    pub fn as_slice(&self) -> &'a [f32] {
        self.data
    }

    /// Size of the last dimension, if any.
    pub fn trailing(&self) -> Option<usize> {
        self.shape.last().copied()
    }

    /// Iterates over the innermost rows.
    pub fn rows(&self) -> impl ExactSizeIterator<Item = &'a [f32]> + 'a {
        let width = self.trailing().unwrap_or(0).max(1);
        self.data.chunks_exact(width)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn view_checks_buffer_length() {
        let data = [0.0f32; 7];
        let err = TensorView::new(&data, &[1, 2, 4]).unwrap_err();
        assert_eq!(err, FaceBoxesError::BufferTooSmall { needed: 8, got: 7 });

        let view = TensorView::new(&data, &[1, 3, 2]).unwrap();
        assert_eq!(view.as_slice().len(), 6);
        assert_eq!(view.trailing(), Some(2));
    }

    #[test]
    fn rows_follow_trailing_dimension() {
        let data: Vec<f32> = (0..8).map(|v| v as f32).collect();
        let view = TensorView::new(&data, &[1, 2, 4]).unwrap();
        let rows: Vec<&[f32]> = view.rows().collect();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1], &[4.0, 5.0, 6.0, 7.0]);
    }
}
