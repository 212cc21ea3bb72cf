//! Eager batched map.
//!
//! The loop-and-stack rendition of a vectorizing map: every operand mapped
//! over an axis is sliced per batch index, the body runs once per index, and
//! the per-index results are stacked back along the output axes.

use tracing::{instrument, trace};

use crate::error::{LiftError, Result};
use crate::value::Value;

/// How one operand or result is laid out with respect to the batch.
///
/// `Some(axis)` means the batch runs along `axis`; `None` means the value is
/// shared by every batch index.
pub type BatchAxis = Option<usize>;

/// Map `f` over `axis_size` batch indices.
///
/// `in_axes` has one entry per operand and `out_axes` one entry per result.
/// Unbatched results (`None`) must not vary with the batch index; the value
/// produced for index 0 is returned.
///
/// # Errors
///
/// Fails if `axis_size` is zero, an axis entry count does not match, an
/// operand cannot be sliced, or results cannot be stacked.
///
/// # Example
///
/// ```
/// use scopelift::{Tensor, Value};
/// use scopelift::primitives::batched_map;
///
/// let xs = Value::Array(Tensor::arange(3));
/// let out = batched_map(
///     |ops| Ok(vec![Value::scalar(ops[0].to_f64()? * 10.0)]),
///     &[xs],
///     &[Some(0)],
///     &[Some(0)],
///     3,
/// )
/// .unwrap();
/// assert_eq!(out[0].as_array().unwrap().data(), &[0.0, 10.0, 20.0]);
/// ```
#[instrument(skip_all, fields(axis_size = axis_size, operands = operands.len()))]
pub fn batched_map<F>(
    mut f: F,
    operands: &[Value],
    in_axes: &[BatchAxis],
    out_axes: &[BatchAxis],
    axis_size: usize,
) -> Result<Vec<Value>>
where
    F: FnMut(Vec<Value>) -> Result<Vec<Value>>,
{
    if axis_size == 0 {
        return Err(LiftError::EmptyAxis { kind: "batch" });
    }
    check_arity("in_axes", operands.len(), in_axes.len())?;

    let mut columns: Vec<Vec<Value>> = vec![Vec::with_capacity(axis_size); out_axes.len()];
    for index in 0..axis_size {
        let sliced = operands
            .iter()
            .zip(in_axes)
            .map(|(op, axis)| match axis {
                Some(axis) => op.index_axis(*axis, index),
                None => Ok(op.clone()),
            })
            .collect::<Result<Vec<_>>>()?;
        let results = f(sliced)?;
        check_arity("out_axes", results.len(), out_axes.len())?;
        for (column, (result, axis)) in columns.iter_mut().zip(results.into_iter().zip(out_axes)) {
            if axis.is_some() || index == 0 {
                column.push(result);
            }
        }
        trace!(index, "batch index done");
    }

    columns
        .into_iter()
        .zip(out_axes)
        .map(|(column, axis)| match axis {
            Some(axis) => Value::stack(&column, *axis),
            None => column.into_iter().next().ok_or(LiftError::EmptyAxis { kind: "batch" }),
        })
        .collect()
}

pub(crate) fn check_arity(what: &str, values: usize, axes: usize) -> Result<()> {
    if values != axes {
        return Err(LiftError::StructureMismatch {
            reason: format!("{what} has {axes} entries for {values} values"),
        });
    }
    Ok(())
}
