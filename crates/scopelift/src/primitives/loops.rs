//! Eager scan.

use tracing::{instrument, trace};

use crate::error::{LiftError, Result};
use crate::primitives::batching::{BatchAxis, check_arity};
use crate::value::Value;

/// Result of [`scan`].
#[derive(Debug, Clone, PartialEq)]
pub struct ScanOutput<B, C> {
    /// Broadcast output of the first step.
    pub broadcast: B,
    /// Carry after the last step.
    pub carry: C,
    /// Per-step outputs, stacked along their out axes.
    pub ys: Vec<Value>,
}

/// Loop `f` over `length` steps.
///
/// Each step receives the shared `broadcast` value, the running carry and
/// one slice of every operand with `Some(axis)` in `in_axes`. Operands with
/// `None` are passed whole to every step. Step `i` always sees slice `i`;
/// with `reverse` the steps run from `length - 1` down to `0`.
///
/// The broadcast output must not change between steps, so only the first
/// step's is kept.
///
/// # Errors
///
/// Fails on a zero `length`, mismatched axis counts, or on the first error
/// returned by `f`.
///
/// # Example
///
/// ```
/// use scopelift::Value;
/// use scopelift::primitives::scan;
///
/// let out = scan(
///     |_: &(), c: f64, _| Ok(((), c + 1.0, vec![Value::scalar(c)])),
///     &(),
///     0.0,
///     &[],
///     &[],
///     &[0],
///     5,
///     false,
/// )
/// .unwrap();
/// assert_eq!(out.carry, 5.0);
/// assert_eq!(out.ys[0].as_array().unwrap().data(), &[0.0, 1.0, 2.0, 3.0, 4.0]);
/// ```
#[allow(clippy::too_many_arguments)]
#[instrument(skip_all, fields(length = length, reverse = reverse))]
pub fn scan<B, C, F>(
    mut f: F,
    broadcast: &B,
    init: C,
    xs: &[Value],
    in_axes: &[BatchAxis],
    out_axes: &[usize],
    length: usize,
    reverse: bool,
) -> Result<ScanOutput<B, C>>
where
    F: FnMut(&B, C, Vec<Value>) -> Result<(B, C, Vec<Value>)>,
{
    if length == 0 {
        return Err(LiftError::EmptyAxis { kind: "scan" });
    }
    check_arity("in_axes", xs.len(), in_axes.len())?;

    let mut carry = init;
    let mut broadcast_out = None;
    let mut steps: Vec<Vec<Value>> = Vec::with_capacity(length);
    let order: Box<dyn Iterator<Item = usize>> = if reverse {
        Box::new((0..length).rev())
    } else {
        Box::new(0..length)
    };
    for i in order {
        let sliced = xs
            .iter()
            .zip(in_axes)
            .map(|(x, axis)| match axis {
                Some(axis) => x.index_axis(*axis, i),
                None => Ok(x.clone()),
            })
            .collect::<Result<Vec<_>>>()?;
        let (b, c, ys) = f(broadcast, carry, sliced)?;
        check_arity("out_axes", ys.len(), out_axes.len())?;
        carry = c;
        broadcast_out.get_or_insert(b);
        steps.push(ys);
        trace!(step = i, "scan step done");
    }
    if reverse {
        steps.reverse();
    }

    let mut columns: Vec<Vec<Value>> = vec![Vec::with_capacity(length); out_axes.len()];
    for step in steps {
        for (column, y) in columns.iter_mut().zip(step) {
            column.push(y);
        }
    }
    let ys = columns
        .iter()
        .zip(out_axes)
        .map(|(column, axis)| Value::stack(column, *axis))
        .collect::<Result<Vec<_>>>()?;

    Ok(ScanOutput {
        broadcast: broadcast_out.ok_or(LiftError::EmptyAxis { kind: "scan" })?,
        carry,
        ys,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tensor::Tensor;

    #[test]
    fn test_scanned_operand() {
        let xs = Value::Array(Tensor::arange(4));
        let out = scan(
            |_: &(), acc: f64, x| {
                let acc = acc + x[0].to_f64()?;
                Ok(((), acc, vec![Value::scalar(acc)]))
            },
            &(),
            0.0,
            &[xs],
            &[Some(0)],
            &[0],
            4,
            false,
        )
        .unwrap();
        assert_eq!(out.carry, 6.0);
        assert_eq!(out.ys[0].as_array().unwrap().data(), &[0.0, 1.0, 3.0, 6.0]);
    }

    #[test]
    fn test_reverse_keeps_step_alignment() {
        let xs = Value::Array(Tensor::arange(3));
        let out = scan(
            |_: &(), acc: f64, x| {
                let acc = acc + x[0].to_f64()?;
                Ok(((), acc, vec![Value::scalar(acc)]))
            },
            &(),
            0.0,
            &[xs],
            &[Some(0)],
            &[0],
            3,
            true,
        )
        .unwrap();
        // steps run 2, 1, 0; ys[i] is the output of the step that saw xs[i]
        assert_eq!(out.ys[0].as_array().unwrap().data(), &[3.0, 3.0, 2.0]);
    }

    #[test]
    fn test_broadcast_output_from_first_step() {
        let out = scan(
            |b: &f64, c: f64, _| Ok((*b + c, c + 1.0, Vec::new())),
            &10.0,
            0.0,
            &[],
            &[],
            &[],
            3,
            false,
        )
        .unwrap();
        assert_eq!(out.broadcast, 10.0);
        assert!(out.ys.is_empty());
    }

    #[test]
    fn test_zero_length() {
        let err = scan(
            |_: &(), c: f64, _| Ok(((), c, Vec::new())),
            &(),
            0.0,
            &[],
            &[],
            &[],
            0,
            false,
        )
        .unwrap_err();
        assert_eq!(err, LiftError::EmptyAxis { kind: "scan" });
    }
}
