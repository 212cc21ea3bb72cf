//! Dense n-dimensional tensor used for variable values and PRNG key arrays.
//!
//! ```text
//! Tensor<T: Element>
//! ├── Array    = Tensor<f64>      (variables, arguments, results)
//! └── KeyArray = Tensor<PrngKey>  (rng streams, split per batch index / step)
//! ```
//!
//! Both share the same axis machinery in [`crate::operations`], so a split
//! key array is sliced and stacked exactly like a parameter array.

use std::fmt::Debug;

use crate::error::TensorError;
use crate::random::PrngKey;
use crate::strides::{cartesian_to_linear, compute_strides};

/// Element types a [`Tensor`] can hold.
pub trait Element: Copy + Debug + PartialEq + 'static {}

impl Element for f64 {}
impl Element for PrngKey {}

/// A dense tensor with row-major storage.
///
/// A rank-0 tensor (empty shape) holds exactly one element.
#[derive(Debug, Clone, PartialEq)]
pub struct Tensor<T: Element = f64> {
    data: Vec<T>,
    shape: Vec<usize>,
    strides: Vec<usize>,
}

/// Tensor of floating point values.
pub type Array = Tensor<f64>;

/// Tensor of PRNG keys.
pub type KeyArray = Tensor<PrngKey>;

impl<T: Element> Tensor<T> {
    /// Create tensor from data and shape.
    ///
    /// # Errors
    ///
    /// Returns `TensorError::ShapeMismatch` if data length doesn't match shape.
    ///
    /// # Examples
    ///
    /// ```
    /// use scopelift::Tensor;
    ///
    /// let t = Tensor::from_vec(vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0], &[2, 3]).unwrap();
    /// assert_eq!(t.shape(), &[2, 3]);
    /// assert_eq!(t.get(&[0, 1]), Some(&2.0));
    /// assert_eq!(t.get(&[1, 0]), Some(&4.0));
    /// ```
    pub fn from_vec(data: Vec<T>, shape: &[usize]) -> Result<Self, TensorError> {
        let expected: usize = shape.iter().product();
        if data.len() != expected {
            return Err(TensorError::ShapeMismatch {
                expected,
                actual: data.len(),
            });
        }
        Ok(Self {
            data,
            shape: shape.to_vec(),
            strides: compute_strides(shape),
        })
    }

    /// Create a tensor with every element set to `value`.
    pub fn full(shape: &[usize], value: T) -> Self {
        let len: usize = shape.iter().product();
        Self {
            data: vec![value; len],
            shape: shape.to_vec(),
            strides: compute_strides(shape),
        }
    }

    /// Create a rank-0 tensor.
    pub fn scalar(value: T) -> Self {
        Self::full(&[], value)
    }

    #[inline]
    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    #[inline]
    pub fn ndim(&self) -> usize {
        self.shape.len()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Get underlying data as slice.
    #[inline]
    pub fn data(&self) -> &[T] {
        &self.data
    }

    /// Get element by cartesian indices.
    pub fn get(&self, indices: &[usize]) -> Option<&T> {
        if indices.len() != self.ndim() {
            return None;
        }
        if indices.iter().zip(&self.shape).any(|(&i, &d)| i >= d) {
            return None;
        }
        self.data.get(cartesian_to_linear(indices, &self.strides))
    }

    /// Set element by cartesian indices.
    ///
    /// # Errors
    ///
    /// Returns an error if the number of indices or any index is invalid.
    pub fn set(&mut self, indices: &[usize], value: T) -> Result<(), TensorError> {
        if indices.len() != self.ndim() {
            return Err(TensorError::WrongNumberOfIndices {
                expected: self.ndim(),
                actual: indices.len(),
            });
        }
        for (&index, &dim_size) in indices.iter().zip(&self.shape) {
            if index >= dim_size {
                return Err(TensorError::IndexOutOfBounds { index, dim_size });
            }
        }
        let linear = cartesian_to_linear(indices, &self.strides);
        self.data[linear] = value;
        Ok(())
    }

    /// The single element of a rank-0 tensor.
    ///
    /// # Errors
    ///
    /// Returns `TensorError::NotScalar` for tensors of rank > 0.
    pub fn to_scalar(&self) -> Result<T, TensorError> {
        if self.ndim() != 0 {
            return Err(TensorError::NotScalar {
                shape: self.shape.clone(),
            });
        }
        Ok(self.data[0])
    }

    /// Apply `f` to every element, producing a tensor of the same shape.
    pub fn map<U: Element>(&self, f: impl Fn(T) -> U) -> Tensor<U> {
        Tensor {
            data: self.data.iter().map(|&x| f(x)).collect(),
            shape: self.shape.clone(),
            strides: self.strides.clone(),
        }
    }
}

impl Tensor<f64> {
    /// Create a new tensor with the given shape, zero-initialized.
    ///
    /// # Examples
    ///
    /// ```
    /// use scopelift::Tensor;
    ///
    /// let t = Tensor::zeros(&[2, 3, 4]);
    /// assert_eq!(t.shape(), &[2, 3, 4]);
    /// assert_eq!(t.len(), 24);
    /// ```
    pub fn zeros(shape: &[usize]) -> Self {
        Self::full(shape, 0.0)
    }

    pub fn ones(shape: &[usize]) -> Self {
        Self::full(shape, 1.0)
    }

    /// Values `0, 1, ..., n - 1` as a rank-1 tensor.
    pub fn arange(n: usize) -> Self {
        Self {
            data: (0..n).map(|i| i as f64).collect(),
            shape: vec![n],
            strides: vec![1],
        }
    }
}

impl From<f64> for Tensor<f64> {
    fn from(value: f64) -> Self {
        Self::scalar(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_vec_shape_mismatch() {
        let result = Tensor::from_vec(vec![1.0, 2.0, 3.0], &[2, 2]);
        assert_eq!(
            result,
            Err(TensorError::ShapeMismatch {
                expected: 4,
                actual: 3
            })
        );
    }

    #[test]
    fn test_scalar() {
        let t = Tensor::scalar(3.5);
        assert_eq!(t.ndim(), 0);
        assert_eq!(t.len(), 1);
        assert_eq!(t.to_scalar(), Ok(3.5));
    }

    #[test]
    fn test_to_scalar_rejects_vector() {
        let t = Tensor::arange(3);
        assert!(matches!(t.to_scalar(), Err(TensorError::NotScalar { .. })));
    }

    #[test]
    fn test_zero_sized_dimension() {
        let t = Tensor::zeros(&[0, 3]);
        assert!(t.is_empty());
        assert_eq!(t.shape(), &[0, 3]);
    }

    #[test]
    fn test_get_set_row_major() {
        let mut t = Tensor::zeros(&[2, 3]);
        t.set(&[1, 2], 7.0).unwrap();
        assert_eq!(t.get(&[1, 2]), Some(&7.0));
        assert_eq!(t.data()[5], 7.0);
        assert_eq!(t.get(&[2, 0]), None);
    }

    #[test]
    fn test_set_out_of_bounds() {
        let mut t = Tensor::zeros(&[2, 2]);
        assert!(matches!(
            t.set(&[0, 2], 1.0),
            Err(TensorError::IndexOutOfBounds {
                index: 2,
                dim_size: 2
            })
        ));
        assert!(matches!(
            t.set(&[0], 1.0),
            Err(TensorError::WrongNumberOfIndices { .. })
        ));
    }

    #[test]
    fn test_map_keeps_shape() {
        let t = Tensor::arange(4);
        let doubled = t.map(|x| x * 2.0);
        assert_eq!(doubled.shape(), &[4]);
        assert_eq!(doubled.data(), &[0.0, 2.0, 4.0, 6.0]);
    }
}
