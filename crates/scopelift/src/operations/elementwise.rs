//! Element-wise tensor operations.

use crate::error::TensorError;
use crate::tensor::Tensor;

/// Apply a unary function to every element.
///
/// # Example
///
/// ```
/// use scopelift::Tensor;
/// use scopelift::operations::apply_unary;
///
/// let t = apply_unary(&Tensor::arange(3), |x| x + 1.0);
/// assert_eq!(t.data(), &[1.0, 2.0, 3.0]);
/// ```
pub fn apply_unary(tensor: &Tensor, f: impl Fn(f64) -> f64) -> Tensor {
    tensor.map(f)
}

/// Apply a binary function element-wise.
///
/// A rank-0 `b` is broadcast against every element of `a`.
///
/// # Errors
///
/// Returns `TensorError::IncompatibleShapes` if the shapes differ and `b` is
/// not a scalar.
pub fn apply_binary(
    a: &Tensor,
    b: &Tensor,
    f: impl Fn(f64, f64) -> f64,
) -> Result<Tensor, TensorError> {
    if b.ndim() == 0 {
        let rhs = b.data()[0];
        return Ok(a.map(|x| f(x, rhs)));
    }
    if a.shape() != b.shape() {
        return Err(TensorError::IncompatibleShapes {
            expected: a.shape().to_vec(),
            actual: b.shape().to_vec(),
        });
    }
    let data = a
        .data()
        .iter()
        .zip(b.data())
        .map(|(&x, &y)| f(x, y))
        .collect();
    Tensor::from_vec(data, a.shape())
}
