// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Tensor shapes.

use crate::DType;
use std::fmt;

/// Dimensions of a [`crate::Tensor`], outermost first.
///
/// Image activations are NCHW; classifier outputs are `[N, classes]`.
///
/// ```
/// use tensor_core::Shape;
/// let s = Shape::new(vec![1, 3, 224, 224]);
/// assert_eq!(s.nchw(), Some((1, 3, 224, 224)));
/// assert_eq!(s.num_elements(), 150_528);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(transparent)]
pub struct Shape {
    dims: Vec<usize>,
}

impl Shape {
    pub fn new(dims: Vec<usize>) -> Self {
        Self { dims }
    }

    /// Rank 0; holds exactly one element.
    pub fn scalar() -> Self {
        Self::new(Vec::new())
    }

    pub fn vector(len: usize) -> Self {
        Self::new(vec![len])
    }

    pub fn matrix(rows: usize, cols: usize) -> Self {
        Self::new(vec![rows, cols])
    }

    pub fn rank(&self) -> usize {
        self.dims.len()
    }

    /// Product of all dimensions (1 for a scalar).
    pub fn num_elements(&self) -> usize {
        self.dims.iter().product()
    }

    /// Product of all dimensions, or `None` if it overflows `usize`.
    pub fn checked_num_elements(&self) -> Option<usize> {
        self.dims.iter().try_fold(1usize, |acc, &d| acc.checked_mul(d))
    }

    pub fn dims(&self) -> &[usize] {
        &self.dims
    }

    /// Size of axis `index`, or `None` past the last axis.
    pub fn dim(&self, index: usize) -> Option<usize> {
        self.dims.get(index).copied()
    }

    /// Bytes needed to store this many `dtype` elements.
    pub fn size_bytes(&self, dtype: DType) -> usize {
        self.num_elements() * dtype.size_bytes()
    }

    /// [`Shape::size_bytes`], or `None` if the count overflows `usize`.
    pub fn checked_size_bytes(&self, dtype: DType) -> Option<usize> {
        self.checked_num_elements()?.checked_mul(dtype.size_bytes())
    }

    /// `(N, C, H, W)` of a rank-4 shape.
    pub fn nchw(&self) -> Option<(usize, usize, usize, usize)> {
        match *self.dims.as_slice() {
            [n, c, h, w] => Some((n, c, h, w)),
            _ => None,
        }
    }

    /// Width of the innermost axis; the class count of classifier output.
    pub fn last_dim(&self) -> Option<usize> {
        self.dims.last().copied()
    }
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let dims: Vec<String> = self.dims.iter().map(usize::to_string).collect();
        write!(f, "[{}]", dims.join(", "))
    }
}

impl From<Vec<usize>> for Shape {
    fn from(dims: Vec<usize>) -> Self {
        Self::new(dims)
    }
}

impl From<&[usize]> for Shape {
    fn from(dims: &[usize]) -> Self {
        Self::new(dims.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scalar_has_one_element() {
        let s = Shape::scalar();
        assert_eq!(s.rank(), 0);
        assert_eq!(s.num_elements(), 1);
        assert_eq!(s.last_dim(), None);
    }

    #[test]
    fn test_image_shape() {
        let s = Shape::new(vec![8, 3, 32, 32]);
        assert_eq!(s.rank(), 4);
        assert_eq!(s.nchw(), Some((8, 3, 32, 32)));
        assert_eq!(s.dim(1), Some(3));
        assert_eq!(s.dim(4), None);
        assert_eq!(s.size_bytes(DType::F32), 8 * 3 * 32 * 32 * 4);
    }

    #[test]
    fn test_classifier_output() {
        let s = Shape::matrix(1, 1000);
        assert_eq!(s.nchw(), None);
        assert_eq!(s.last_dim(), Some(1000));
        assert_eq!(s.size_bytes(DType::F16), 2000);
    }

    #[test]
    fn test_checked_counts() {
        let s = Shape::new(vec![2, 3, 4]);
        assert_eq!(s.checked_num_elements(), Some(24));
        assert_eq!(s.checked_size_bytes(DType::F32), Some(96));

        let huge = Shape::new(vec![1 << 40, 1 << 40]);
        assert_eq!(huge.checked_num_elements(), None);
        assert_eq!(huge.checked_size_bytes(DType::F32), None);
        let almost = Shape::new(vec![usize::MAX / 2 + 1]);
        assert!(almost.checked_num_elements().is_some());
        assert_eq!(almost.checked_size_bytes(DType::F32), None);
    }

    #[test]
    fn test_display() {
        assert_eq!(Shape::new(vec![1, 3, 224, 224]).to_string(), "[1, 3, 224, 224]");
        assert_eq!(Shape::scalar().to_string(), "[]");
    }

    #[test]
    fn test_conversions() {
        let a: Shape = vec![2, 3].into();
        let b: Shape = (&[2, 3][..]).into();
        assert_eq!(a, b);
    }
}
