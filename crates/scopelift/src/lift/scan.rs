//! Loop lift.
//!
//! Collections take one of three roles in the loop:
//!
//! ```text
//! broadcast  same value every step, outputs taken from the first step
//! carry      threaded from one step to the next
//! scanned    sliced per step along an axis, outputs stacked
//! ```

use tracing::debug;

use crate::collection::VariableGroup;
use crate::error::{LiftError, Result};
use crate::filter::Filter;
use crate::lift::axes::{ArgAxes, InOut, mapped_axis_sizes, resolve_axis_size, split_in_out};
use crate::lift::pack::{
    Pack, VariableGroups, rng_groups_from_values, variable_groups_from_values,
    variable_groups_to_values,
};
use crate::lift::remat::remat;
use crate::lift::vmap::split_rng_values;
use crate::primitives::{self, BatchAxis};
use crate::scope::ScopeStructure;
use crate::value::Value;

/// Configuration of [`scan`].
#[derive(Debug, Clone)]
pub struct ScanOptions {
    /// Collections sliced per step.
    pub variable_axes: Vec<(Filter, InOut<usize>)>,
    pub variable_broadcast: Filter,
    pub variable_carry: Filter,
    /// Streams selected by a filter marked `true` get a fresh key per step.
    pub split_rngs: Vec<(Filter, bool)>,
    pub in_axes: ArgAxes,
    pub out_axes: usize,
    /// Number of steps when no scanned argument determines it.
    pub length: Option<usize>,
    pub reverse: bool,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            variable_axes: Vec::new(),
            variable_broadcast: Filter::Nothing,
            variable_carry: Filter::Nothing,
            split_rngs: Vec::new(),
            in_axes: ArgAxes::default(),
            out_axes: 0,
            length: None,
            reverse: false,
        }
    }
}

impl ScanOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn variable_axis(mut self, filter: impl Into<Filter>, axis: impl Into<InOut<usize>>) -> Self {
        self.variable_axes.push((filter.into(), axis.into()));
        self
    }

    pub fn variable_broadcast(mut self, filter: impl Into<Filter>) -> Self {
        self.variable_broadcast = filter.into();
        self
    }

    pub fn variable_carry(mut self, filter: impl Into<Filter>) -> Self {
        self.variable_carry = filter.into();
        self
    }

    pub fn split_rng(mut self, filter: impl Into<Filter>, split: bool) -> Self {
        self.split_rngs.push((filter.into(), split));
        self
    }

    pub fn in_axes(mut self, axes: impl Into<ArgAxes>) -> Self {
        self.in_axes = axes.into();
        self
    }

    pub fn out_axes(mut self, axis: usize) -> Self {
        self.out_axes = axis;
        self
    }

    pub fn length(mut self, length: usize) -> Self {
        self.length = Some(length);
        self
    }

    pub fn reverse(mut self, reverse: bool) -> Self {
        self.reverse = reverse;
        self
    }
}

/// Lift `f` into a loop.
///
/// `f(scope, carry, xs)` returns the next carry and this step's output. The
/// lifted function takes the initial carry and the arguments, and returns
/// the final carry and the per-step outputs stacked along `out_axes`.
///
/// # Errors
///
/// Fails with [`LiftError::InconsistentScanLengths`] when scanned arguments
/// disagree on the step count, and [`LiftError::LengthUnspecified`] when
/// nothing determines it.
///
/// # Example
///
/// ```
/// use scopelift::{Filter, Scope, Value};
/// use scopelift::lift::{ScanOptions, scan};
///
/// let scope = Scope::new(Default::default(), Default::default(), Filter::All);
/// let count = |_: &Scope, c: Value, _: Vec<Value>| -> scopelift::Result<(Value, Value)> {
///     let n = c.to_f64()?;
///     Ok((Value::scalar(n + 1.0), Value::scalar(n)))
/// };
/// let looped = scan(count, ScanOptions::new().length(3));
/// let (carry, ys) = looped(&scope, Value::scalar(0.0), Vec::new()).unwrap();
/// assert_eq!(carry, Value::scalar(3.0));
/// assert_eq!(ys.as_array().unwrap().data(), &[0.0, 1.0, 2.0]);
/// ```
pub fn scan<S, F>(f: F, options: ScanOptions) -> impl Fn(&S, Value, Vec<Value>) -> Result<(Value, Value)>
where
    S: ScopeStructure,
    F: Fn(&S, Value, Vec<Value>) -> Result<(Value, Value)>,
{
    let (var_in, var_out) = split_in_out(&options.variable_axes);
    let roles = [options.variable_broadcast.clone(), options.variable_carry.clone()];
    let strategy = Pack::new(
        roles.iter().cloned().chain(var_in.iter().map(|(f, _)| f.clone())).collect(),
        roles.iter().cloned().chain(var_out.iter().map(|(f, _)| f.clone())).collect(),
        options.split_rngs.iter().map(|(f, _)| f.clone()).collect(),
    );
    let var_in_axes: Vec<BatchAxis> = var_in.into_iter().map(|(_, a)| Some(a)).collect();
    let var_out_axes: Vec<usize> = var_out.into_iter().map(|(_, a)| a).collect();
    let splits: Vec<bool> = options.split_rngs.iter().map(|(_, s)| *s).collect();

    move |scope_tree: &S, init: Value, args: Vec<Value>| {
        strategy.run(scope_tree, (init, args), |call, packed, (init, args)| {
            let arg_axes = options.in_axes.resolve(args.len())?;
            let length = resolve_axis_size(
                mapped_axis_sizes(&args, &arg_axes)?,
                options.length,
                |lengths| LiftError::InconsistentScanLengths { lengths },
                LiftError::LengthUnspecified,
            )?;
            debug!(length, reverse = options.reverse, scopes = call.num_scopes(), "scan");

            let mut groups = packed.variable_groups.into_iter();
            let broadcast_in = groups.next().unwrap_or_default();
            let carry_in = groups.next().unwrap_or_default();
            let scanned_in: VariableGroups = groups.collect();

            let scanned_values = variable_groups_to_values(&scanned_in);
            let num_scanned = scanned_values.len();
            let (rng_values, rng_axes) = split_rng_values(packed.rng_groups, &splits, length)?;
            let num_rngs = rng_values.len();

            let mut xs = scanned_values;
            xs.extend(rng_values);
            xs.extend(args);
            let mut in_axes = var_in_axes.clone();
            in_axes.extend(rng_axes);
            in_axes.extend(arg_axes);
            let mut out_axes = vec![options.out_axes];
            out_axes.extend(var_out_axes.iter().copied());

            let step = |broadcast: &Vec<VariableGroup>,
                        (carry_vars, c): (Vec<VariableGroup>, Value),
                        xs: Vec<Value>|
             -> Result<(Vec<VariableGroup>, (Vec<VariableGroup>, Value), Vec<Value>)> {
                let mut xs = xs.into_iter();
                let scanned = variable_groups_from_values(xs.by_ref().take(num_scanned).collect())?;
                let rngs = rng_groups_from_values(xs.by_ref().take(num_rngs).collect())?;
                let mut groups = vec![broadcast.clone(), carry_vars];
                groups.extend(scanned);

                let inner = call.scope_fn(groups, rngs)?;
                let (c, y) = f(&inner, c, xs.collect())?;
                let mut out = call.repack(&inner)?.into_iter();

                let mut broadcast_out = out.next().unwrap_or_default();
                let carry_out = out.next().unwrap_or_default();
                // frozen broadcast collections are not repacked
                for (out_group, in_group) in broadcast_out.iter_mut().zip(broadcast) {
                    for (col, collection) in in_group {
                        if !out_group.contains_key(col) {
                            out_group.insert(col.clone(), collection.clone());
                        }
                    }
                }
                let mut ys = vec![y];
                ys.extend(variable_groups_to_values(&out.collect()));
                Ok((broadcast_out, (carry_out, c), ys))
            };

            let output = primitives::scan(
                step,
                &broadcast_in,
                (carry_in, init),
                &xs,
                &in_axes,
                &out_axes,
                length,
                options.reverse,
            )?;

            let mut broadcast_out = output.broadcast;
            for group in &mut broadcast_out {
                group.retain(|_, collection| !collection.is_frozen());
            }
            let (carry_out, c) = output.carry;
            let mut ys = output.ys.into_iter();
            let y = ys.next().unwrap_or_else(Value::unit);

            let mut out_groups = vec![broadcast_out, carry_out];
            out_groups.extend(variable_groups_from_values(ys.collect())?);
            Ok(((c, y), out_groups))
        })
    }
}

/// Nested, rematerialized loop over `lengths.iter().product()` steps.
///
/// `body(scope, carry)` runs once per step. Each entry of `lengths` adds one
/// level of `scan(remat(...))`, so only one carry per level is kept live.
/// Every scanned collection in `options.variable_axes` gains one leading
/// axis per level.
///
/// Only the filter options of `options` are used. Each level scans its own
/// length over no arguments.
pub fn remat_scan<S>(
    body: &dyn Fn(&S, Value) -> Result<Value>,
    scope: &S,
    carry: Value,
    lengths: &[usize],
    options: &ScanOptions,
) -> Result<Value>
where
    S: ScopeStructure,
{
    let Some((&length, rest)) = lengths.split_first() else {
        return body(scope, carry);
    };
    let level = ScanOptions {
        in_axes: ArgAxes::default(),
        out_axes: 0,
        length: Some(length),
        ..options.clone()
    };
    let inner = remat(
        |scope: &S, carry: Value| remat_scan(body, scope, carry, rest, options),
        Filter::All,
        Filter::All,
    );
    let looped = scan(
        |scope: &S, carry: Value, _: Vec<Value>| Ok((inner(scope, carry)?, Value::unit())),
        level,
    );
    let (carry, _) = looped(scope, carry, Vec::new())?;
    Ok(carry)
}
