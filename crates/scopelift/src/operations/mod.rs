//! Tensor operations.
//!
//! Axis operations are generic over [`Element`](crate::tensor::Element), so
//! arrays and key arrays are batched the same way:
//!
//! ```text
//! index_axis(t, axis, i)   [.., n, ..] -> [.., ..]      (one batch index)
//! stack(ts, axis)          k x [.., ..] -> [.., k, ..]  (collect results)
//! ```

mod axis;
mod elementwise;

pub use axis::{index_axis, stack};
pub use elementwise::{apply_binary, apply_unary};
