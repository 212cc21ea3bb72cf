//! Axis specifications shared by the vmap and scan lifts.

use std::collections::BTreeSet;

use crate::error::{LiftError, Result};
use crate::filter::Filter;
use crate::primitives::BatchAxis;
use crate::value::Value;

/// Direction tag on a per-collection axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InOut<T> {
    /// Used for the collection both on the way in and on the way out.
    Both(T),
    /// Input-only: the collection is mapped in but not returned.
    In(T),
    /// Output-only: the collection is produced but not read.
    Out(T),
}

impl<T: Copy> InOut<T> {
    pub fn input(&self) -> Option<T> {
        match *self {
            InOut::Both(a) | InOut::In(a) => Some(a),
            InOut::Out(_) => None,
        }
    }

    pub fn output(&self) -> Option<T> {
        match *self {
            InOut::Both(a) | InOut::Out(a) => Some(a),
            InOut::In(_) => None,
        }
    }
}

impl<T> From<T> for InOut<T> {
    fn from(axis: T) -> Self {
        InOut::Both(axis)
    }
}

/// Split `(filter, axis)` pairs into the input and output sides.
pub(crate) fn split_in_out<T: Copy>(
    axes: &[(Filter, InOut<T>)],
) -> (Vec<(Filter, T)>, Vec<(Filter, T)>) {
    let inputs = axes
        .iter()
        .filter_map(|(f, a)| a.input().map(|a| (f.clone(), a)))
        .collect();
    let outputs = axes
        .iter()
        .filter_map(|(f, a)| a.output().map(|a| (f.clone(), a)))
        .collect();
    (inputs, outputs)
}

/// Axes of positional arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArgAxes {
    /// The same axis for every argument.
    Uniform(BatchAxis),
    /// One axis per argument.
    PerArg(Vec<BatchAxis>),
}

impl Default for ArgAxes {
    fn default() -> Self {
        ArgAxes::Uniform(Some(0))
    }
}

impl ArgAxes {
    /// Axes for `num_args` arguments.
    pub fn resolve(&self, num_args: usize) -> Result<Vec<BatchAxis>> {
        match self {
            ArgAxes::Uniform(axis) => Ok(vec![*axis; num_args]),
            ArgAxes::PerArg(axes) if axes.len() == num_args => Ok(axes.clone()),
            ArgAxes::PerArg(axes) => Err(LiftError::StructureMismatch {
                reason: format!("in_axes has {} entries for {num_args} arguments", axes.len()),
            }),
        }
    }
}

impl From<BatchAxis> for ArgAxes {
    fn from(axis: BatchAxis) -> Self {
        ArgAxes::Uniform(axis)
    }
}

impl From<Vec<BatchAxis>> for ArgAxes {
    fn from(axes: Vec<BatchAxis>) -> Self {
        ArgAxes::PerArg(axes)
    }
}

/// Sizes of the mapped axis over every leaf of every mapped operand.
pub(crate) fn mapped_axis_sizes(operands: &[Value], axes: &[BatchAxis]) -> Result<BTreeSet<usize>> {
    let mut sizes = BTreeSet::new();
    for (op, axis) in operands.iter().zip(axes) {
        if let Some(axis) = axis {
            sizes.extend(op.axis_sizes(*axis)?);
        }
    }
    Ok(sizes)
}

/// Pick the mapped axis length.
///
/// An explicit length wins; otherwise the inputs must agree on exactly one
/// size. Inputs that disagree with each other, or with the explicit length,
/// are an error built by `inconsistent`.
pub(crate) fn resolve_axis_size(
    sizes: BTreeSet<usize>,
    explicit: Option<usize>,
    inconsistent: impl FnOnce(BTreeSet<usize>) -> LiftError,
    unspecified: LiftError,
) -> Result<usize> {
    match explicit {
        Some(n) if sizes.iter().all(|&s| s == n) => Ok(n),
        Some(n) => {
            let mut sizes = sizes;
            sizes.insert(n);
            Err(inconsistent(sizes))
        }
        None if sizes.len() > 1 => Err(inconsistent(sizes)),
        None => sizes.into_iter().next().ok_or(unspecified),
    }
}
