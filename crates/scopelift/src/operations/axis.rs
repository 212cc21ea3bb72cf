//! Slicing and stacking along a single axis.

use crate::error::TensorError;
use crate::strides::split_at_axis;
use crate::tensor::{Element, Tensor};

/// Select index `index` along `axis`, removing that axis.
///
/// This creates a copy of the selected data (not a view).
///
/// # Errors
///
/// Returns an error if `axis` is not a dimension of `tensor` or `index` is
/// out of range for it.
///
/// # Example
///
/// ```
/// use scopelift::Tensor;
/// use scopelift::operations::index_axis;
///
/// let t = Tensor::from_vec(vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0], &[2, 3]).unwrap();
/// assert_eq!(index_axis(&t, 0, 1).unwrap().data(), &[4.0, 5.0, 6.0]);
/// assert_eq!(index_axis(&t, 1, 2).unwrap().data(), &[3.0, 6.0]);
/// ```
pub fn index_axis<T: Element>(
    tensor: &Tensor<T>,
    axis: usize,
    index: usize,
) -> Result<Tensor<T>, TensorError> {
    let shape = tensor.shape();
    if axis >= shape.len() {
        return Err(TensorError::AxisOutOfBounds {
            axis,
            ndim: shape.len(),
        });
    }
    let dim_size = shape[axis];
    if index >= dim_size {
        return Err(TensorError::IndexOutOfBounds { index, dim_size });
    }

    let (outer, inner) = split_at_axis(shape, axis);
    let mut data = Vec::with_capacity(outer * inner);
    for o in 0..outer {
        let start = (o * dim_size + index) * inner;
        data.extend_from_slice(&tensor.data()[start..start + inner]);
    }

    let mut new_shape = shape.to_vec();
    new_shape.remove(axis);
    Tensor::from_vec(data, &new_shape)
}

/// Stack equally shaped tensors along a new axis at position `axis`.
///
/// # Errors
///
/// Returns an error if `tensors` is empty, the shapes disagree, or `axis`
/// exceeds the rank of the inputs.
///
/// # Example
///
/// ```
/// use scopelift::Tensor;
/// use scopelift::operations::stack;
///
/// let a = Tensor::from_vec(vec![1.0, 2.0], &[2]).unwrap();
/// let b = Tensor::from_vec(vec![3.0, 4.0], &[2]).unwrap();
/// let rows = stack(&[a.clone(), b.clone()], 0).unwrap();
/// assert_eq!(rows.shape(), &[2, 2]);
/// assert_eq!(rows.data(), &[1.0, 2.0, 3.0, 4.0]);
/// let cols = stack(&[a, b], 1).unwrap();
/// assert_eq!(cols.data(), &[1.0, 3.0, 2.0, 4.0]);
/// ```
pub fn stack<T: Element>(tensors: &[Tensor<T>], axis: usize) -> Result<Tensor<T>, TensorError> {
    let first = tensors.first().ok_or(TensorError::EmptyStack)?;
    let item_shape = first.shape();
    if axis > item_shape.len() {
        return Err(TensorError::AxisOutOfBounds {
            axis,
            ndim: item_shape.len() + 1,
        });
    }
    if let Some(bad) = tensors.iter().find(|t| t.shape() != item_shape) {
        return Err(TensorError::IncompatibleShapes {
            expected: item_shape.to_vec(),
            actual: bad.shape().to_vec(),
        });
    }

    let outer: usize = item_shape[..axis].iter().product();
    let inner: usize = item_shape[axis..].iter().product();
    let mut data = Vec::with_capacity(outer * inner * tensors.len());
    for o in 0..outer {
        for t in tensors {
            data.extend_from_slice(&t.data()[o * inner..(o + 1) * inner]);
        }
    }

    let mut new_shape = item_shape.to_vec();
    new_shape.insert(axis, tensors.len());
    Tensor::from_vec(data, &new_shape)
}
