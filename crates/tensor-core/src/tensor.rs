// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Core tensor type and view abstractions.

use crate::{DType, Shape, TensorError};
use rand::Rng;

/// An owned, n-dimensional `f32` tensor stored in contiguous memory.
///
/// `Tensor` carries activations through a traced forward pass and holds
/// model parameters inside graphs and artifacts.
///
/// # Memory Layout
/// Data is stored in row-major (C) order. Conversion to and from the
/// little-endian byte layout used by SafeTensors and ONNX goes through
/// [`from_le_bytes`](Tensor::from_le_bytes) and
/// [`to_le_bytes`](Tensor::to_le_bytes).
#[derive(Debug, Clone, PartialEq)]
pub struct Tensor {
    shape: Shape,
    data: Vec<f32>,
}

impl Tensor {
    /// Creates a new tensor filled with zeros.
    ///
    /// # Examples
    /// ```
    /// use tensor_core::{Tensor, Shape};
    /// let t = Tensor::zeros(Shape::matrix(2, 3));
    /// assert_eq!(t.size_bytes(), 24); // 2 * 3 * 4 bytes
    /// ```
    pub fn zeros(shape: Shape) -> Self {
        let n = shape.num_elements();
        Self {
            shape,
            data: vec![0.0; n],
        }
    }

    /// Creates a tensor from a slice of `f32` values.
    ///
    /// # Examples
    /// ```
    /// use tensor_core::{Tensor, Shape};
    /// let t = Tensor::from_f32(Shape::vector(3), &[1.0, 2.0, 3.0]).unwrap();
    /// assert_eq!(t.as_f32_slice(), &[1.0, 2.0, 3.0]);
    /// ```
    pub fn from_f32(shape: Shape, values: &[f32]) -> Result<Self, TensorError> {
        Self::from_vec(shape, values.to_vec())
    }

    /// Creates a tensor that takes ownership of `values`.
    pub fn from_vec(shape: Shape, values: Vec<f32>) -> Result<Self, TensorError> {
        let Some(expected) = shape.checked_num_elements() else {
            return Err(TensorError::Overflow(shape));
        };
        if values.len() != expected {
            return Err(TensorError::BufferSizeMismatch {
                expected,
                actual: values.len(),
            });
        }
        Ok(Self {
            shape,
            data: values,
        })
    }

    /// Decodes a tensor from little-endian bytes of the given dtype.
    ///
    /// Only `F32` payloads are accepted; other dtypes would need a lossy
    /// widening step the converter does not perform.
    pub fn from_le_bytes(shape: Shape, dtype: DType, bytes: &[u8]) -> Result<Self, TensorError> {
        if dtype != DType::F32 {
            return Err(TensorError::UnsupportedDType {
                op: "from_le_bytes",
                dtype,
            });
        }
        let Some(expected) = shape.checked_size_bytes(DType::F32) else {
            return Err(TensorError::Overflow(shape));
        };
        if bytes.len() != expected {
            return Err(TensorError::BufferSizeMismatch {
                expected: expected / DType::F32.size_bytes(),
                actual: bytes.len() / DType::F32.size_bytes(),
            });
        }
        let data = bytes
            .chunks_exact(4)
            .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect();
        Ok(Self { shape, data })
    }

    /// Creates a tensor filled with uniform random values in `[0, 1)`.
    ///
    /// Used to build the synthetic example input for tracing.
    pub fn random_uniform<R: Rng + ?Sized>(shape: Shape, rng: &mut R) -> Self {
        let n = shape.num_elements();
        let data = (0..n).map(|_| rng.gen::<f32>()).collect();
        Self { shape, data }
    }

    /// Returns the tensor's shape.
    pub fn shape(&self) -> &Shape {
        &self.shape
    }

    /// Returns an immutable view over this tensor's data.
    pub fn view(&self) -> TensorView<'_> {
        TensorView {
            shape: &self.shape,
            data: &self.data,
        }
    }

    /// Encodes the values as little-endian `f32` bytes.
    pub fn to_le_bytes(&self) -> Vec<u8> {
        self.data.iter().flat_map(|v| v.to_le_bytes()).collect()
    }

    /// Returns the memory footprint of this tensor in bytes.
    pub fn size_bytes(&self) -> usize {
        self.data.len() * DType::F32.size_bytes()
    }

    /// Returns the values as a slice.
    pub fn as_f32_slice(&self) -> &[f32] {
        &self.data
    }

    /// Returns the values as a mutable slice.
    pub fn as_f32_slice_mut(&mut self) -> &mut [f32] {
        &mut self.data
    }

    /// Returns a tensor with the same data and a new shape.
    ///
    /// The element count must be unchanged.
    pub fn reshape(self, shape: Shape) -> Result<Self, TensorError> {
        if shape.num_elements() != self.data.len() {
            return Err(TensorError::ShapeMismatch {
                op: "reshape",
                lhs: self.shape,
                rhs: shape,
            });
        }
        Ok(Self {
            shape,
            data: self.data,
        })
    }

    /// Mean of all elements (0.0 for an empty tensor).
    pub fn mean(&self) -> f32 {
        if self.data.is_empty() {
            return 0.0;
        }
        self.data.iter().sum::<f32>() / self.data.len() as f32
    }
}

/// A borrowed, read-only view over a [`Tensor`]'s data.
///
/// Views are zero-copy and tied to the lifetime of the source tensor,
/// enforced by the borrow checker.
#[derive(Debug, Clone, Copy)]
pub struct TensorView<'a> {
    shape: &'a Shape,
    data: &'a [f32],
}

impl<'a> TensorView<'a> {
    /// Returns the shape of the viewed tensor.
    pub fn shape(&self) -> &'a Shape {
        self.shape
    }

    /// Returns the viewed values.
    pub fn as_f32_slice(&self) -> &'a [f32] {
        self.data
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{rngs::StdRng, SeedableRng};

    #[test]
    fn test_zeros() {
        let t = Tensor::zeros(Shape::matrix(2, 3));
        assert_eq!(t.size_bytes(), 24);
        assert_eq!(t.shape(), &Shape::matrix(2, 3));
        assert!(t.as_f32_slice().iter().all(|&x| x == 0.0));
    }

    #[test]
    fn test_from_f32() {
        let data = vec![1.0f32, 2.0, 3.0, 4.0, 5.0, 6.0];
        let t = Tensor::from_f32(Shape::matrix(2, 3), &data).unwrap();
        assert_eq!(t.as_f32_slice(), &data);
    }

    #[test]
    fn test_from_f32_size_mismatch() {
        let result = Tensor::from_f32(Shape::matrix(2, 3), &[0.0; 5]);
        assert!(matches!(
            result,
            Err(TensorError::BufferSizeMismatch { expected: 6, actual: 5 })
        ));
    }

    #[test]
    fn test_le_bytes() {
        let t = Tensor::from_f32(Shape::vector(3), &[1.5, -2.0, 0.25]).unwrap();
        let bytes = t.to_le_bytes();
        assert_eq!(bytes.len(), 12);
        let back = Tensor::from_le_bytes(Shape::vector(3), DType::F32, &bytes).unwrap();
        assert_eq!(back, t);
    }

    #[test]
    fn test_from_le_bytes_rejects_f16() {
        let result = Tensor::from_le_bytes(Shape::vector(2), DType::F16, &[0u8; 4]);
        assert!(matches!(result, Err(TensorError::UnsupportedDType { .. })));
    }

    #[test]
    fn test_overflowing_shape_rejected() {
        let huge = Shape::new(vec![1 << 40, 1 << 40]);
        assert!(matches!(
            Tensor::from_vec(huge.clone(), Vec::new()),
            Err(TensorError::Overflow(_))
        ));
        assert!(matches!(
            Tensor::from_le_bytes(huge, DType::F32, &[]),
            Err(TensorError::Overflow(_))
        ));
    }

    #[test]
    fn test_random_uniform_range_and_determinism() {
        let mut a = StdRng::seed_from_u64(7);
        let mut b = StdRng::seed_from_u64(7);
        let t1 = Tensor::random_uniform(Shape::new(vec![1, 3, 4, 4]), &mut a);
        let t2 = Tensor::random_uniform(Shape::new(vec![1, 3, 4, 4]), &mut b);
        assert_eq!(t1, t2);
        assert!(t1.as_f32_slice().iter().all(|&x| (0.0..1.0).contains(&x)));
    }

    #[test]
    fn test_view() {
        let t = Tensor::from_f32(Shape::vector(4), &[1.0, 2.0, 3.0, 4.0]).unwrap();
        let v = t.view();
        assert_eq!(v.shape(), &Shape::vector(4));
        assert_eq!(v.as_f32_slice(), &[1.0, 2.0, 3.0, 4.0]);
    }

    #[test]
    fn test_mean() {
        let t = Tensor::from_f32(Shape::vector(4), &[1.0, 2.0, 3.0, 6.0]).unwrap();
        assert!((t.mean() - 3.0).abs() < 1e-6);
        assert_eq!(Tensor::zeros(Shape::vector(0)).mean(), 0.0);
    }

    #[test]
    fn test_reshape() {
        let t = Tensor::zeros(Shape::new(vec![1, 4, 1, 1]));
        let r = t.reshape(Shape::matrix(1, 4)).unwrap();
        assert_eq!(r.shape(), &Shape::matrix(1, 4));
        assert!(Tensor::zeros(Shape::vector(3)).reshape(Shape::vector(4)).is_err());
    }
}
