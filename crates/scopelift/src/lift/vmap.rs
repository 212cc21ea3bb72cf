//! Batched-map lift.

use tracing::debug;

use crate::error::{LiftError, Result};
use crate::filter::Filter;
use crate::lift::axes::{ArgAxes, InOut, mapped_axis_sizes, resolve_axis_size, split_in_out};
use crate::lift::pack::{
    Pack, RngGroups, rng_groups_from_values, rng_groups_to_values, variable_groups_from_values,
    variable_groups_to_values,
};
use crate::primitives::{BatchAxis, batched_map};
use crate::scope::ScopeStructure;
use crate::value::Value;

/// Configuration of [`vmap`].
#[derive(Debug, Clone)]
pub struct VmapOptions {
    /// Per-collection batch axes. `None` broadcasts the collection.
    pub variable_axes: Vec<(Filter, InOut<BatchAxis>)>,
    /// Streams selected by a filter marked `true` get one key per batch index.
    pub split_rngs: Vec<(Filter, bool)>,
    pub in_axes: ArgAxes,
    pub out_axes: BatchAxis,
    /// Batch size used when no mapped input determines it.
    pub axis_size: Option<usize>,
}

impl Default for VmapOptions {
    fn default() -> Self {
        Self {
            variable_axes: Vec::new(),
            split_rngs: Vec::new(),
            in_axes: ArgAxes::default(),
            out_axes: Some(0),
            axis_size: None,
        }
    }
}

impl VmapOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn variable_axis(mut self, filter: impl Into<Filter>, axis: impl Into<InOut<BatchAxis>>) -> Self {
        self.variable_axes.push((filter.into(), axis.into()));
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

    pub fn out_axes(mut self, axis: BatchAxis) -> Self {
        self.out_axes = axis;
        self
    }

    pub fn axis_size(mut self, size: usize) -> Self {
        self.axis_size = Some(size);
        self
    }
}

/// Split every key of the streams marked for splitting into `n` keys.
///
/// Returns the stream groups as values together with their batch axes.
pub(crate) fn split_rng_values(
    rng_groups: RngGroups,
    splits: &[bool],
    n: usize,
) -> Result<(Vec<Value>, Vec<BatchAxis>)> {
    let mut axes = Vec::with_capacity(splits.len());
    let mut groups = Vec::with_capacity(splits.len());
    for (per_scope, &split) in rng_groups.into_iter().zip(splits) {
        if !split {
            groups.push(per_scope);
            axes.push(None);
            continue;
        }
        let per_scope = per_scope
            .into_iter()
            .map(|group| {
                group
                    .into_iter()
                    .map(|(stream, keys)| Ok((stream, keys.to_scalar()?.split(n))))
                    .collect::<Result<_>>()
            })
            .collect::<Result<Vec<_>>>()?;
        groups.push(per_scope);
        axes.push(Some(0));
    }
    Ok((rng_groups_to_values(&groups), axes))
}

/// Lift `f` over a batch axis.
///
/// Variable collections are mapped along their axes in `variable_axes`,
/// arguments along `in_axes`. The body runs once per batch index on a scope
/// holding that index's slice of every mapped collection. Results are stacked
/// along `out_axes`, and mutated collections along their out axes.
///
/// # Errors
///
/// Fails with [`LiftError::InconsistentAxisSizes`] when mapped inputs
/// disagree on the batch size, and [`LiftError::AxisSizeUnspecified`] when
/// nothing determines it.
///
/// # Example
///
/// ```
/// use scopelift::{Filter, PrngKey, Scope, Tensor, Value};
/// use scopelift::lift::{VmapOptions, vmap};
///
/// let scope = Scope::new(Default::default(), [("params".to_string(), PrngKey::new(0))].into(), Filter::All);
/// let dense = |scope: &Scope, args: Vec<Value>| -> scopelift::Result<Value> {
///     let w = scope.param("w", |key| Tensor::normal(key, &[]).into())?;
///     Ok(Value::scalar(w.to_f64()? * args[0].to_f64()?))
/// };
/// let batched = vmap(
///     dense,
///     VmapOptions::new()
///         .variable_axis("params", Some(0))
///         .split_rng("params", true),
/// );
/// let y = batched(&scope, vec![Tensor::arange(3).into()]).unwrap();
/// assert_eq!(y.as_array().unwrap().shape(), &[3]);
/// let w = scope.get_variable("params", "w").unwrap();
/// assert_eq!(w.as_array().unwrap().shape(), &[3]);
/// ```
pub fn vmap<S, F>(f: F, options: VmapOptions) -> impl Fn(&S, Vec<Value>) -> Result<Value>
where
    S: ScopeStructure,
    F: Fn(&S, Vec<Value>) -> Result<Value>,
{
    let (var_in, var_out) = split_in_out(&options.variable_axes);
    let strategy = Pack::new(
        var_in.iter().map(|(f, _)| f.clone()).collect(),
        var_out.iter().map(|(f, _)| f.clone()).collect(),
        options.split_rngs.iter().map(|(f, _)| f.clone()).collect(),
    );
    let var_in_axes: Vec<BatchAxis> = var_in.into_iter().map(|(_, a)| a).collect();
    let var_out_axes: Vec<BatchAxis> = var_out.into_iter().map(|(_, a)| a).collect();
    let splits: Vec<bool> = options.split_rngs.iter().map(|(_, s)| *s).collect();

    move |scope_tree: &S, args: Vec<Value>| {
        strategy.run(scope_tree, args, |call, packed, args| {
            let arg_axes = options.in_axes.resolve(args.len())?;
            let var_values = variable_groups_to_values(&packed.variable_groups);
            let mut sizes = mapped_axis_sizes(&var_values, &var_in_axes)?;
            sizes.extend(mapped_axis_sizes(&args, &arg_axes)?);
            let axis_size = resolve_axis_size(
                sizes,
                options.axis_size,
                |sizes| LiftError::InconsistentAxisSizes { sizes },
                LiftError::AxisSizeUnspecified,
            )?;
            debug!(axis_size, scopes = call.num_scopes(), "vmap");

            let num_vars = var_values.len();
            let (rng_values, rng_axes) = split_rng_values(packed.rng_groups, &splits, axis_size)?;
            let num_rngs = rng_values.len();

            let mut operands = var_values;
            operands.extend(rng_values);
            operands.extend(args);
            let mut in_axes = var_in_axes.clone();
            in_axes.extend(rng_axes);
            in_axes.extend(arg_axes);
            let mut out_axes = vec![options.out_axes];
            out_axes.extend(var_out_axes.iter().copied());

            let results = batched_map(
                |operands| {
                    let mut operands = operands.into_iter();
                    let vars = variable_groups_from_values(operands.by_ref().take(num_vars).collect())?;
                    let rngs = rng_groups_from_values(operands.by_ref().take(num_rngs).collect())?;
                    let inner = call.scope_fn(vars, rngs)?;
                    let y = f(&inner, operands.collect())?;
                    let mut results = vec![y];
                    results.extend(variable_groups_to_values(&call.repack(&inner)?));
                    Ok(results)
                },
                &operands,
                &in_axes,
                &out_axes,
                axis_size,
            )?;

            let mut results = results.into_iter();
            let y = results.next().unwrap_or_else(Value::unit);
            Ok((y, variable_groups_from_values(results.collect())?))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collection::{Collection, Variables};
    use crate::random::PrngKey;
    use crate::scope::Scope;
    use crate::tensor::Tensor;
    use crate::value::dict;
    use indexmap::IndexMap;
    use std::collections::BTreeSet;

    fn scope_with(params: Value) -> Scope {
        let vars = Variables::from([(
            "params".to_string(),
            Collection::Mutable(dict([("w", params)])),
        )]);
        Scope::new(vars, IndexMap::new(), Filter::All)
    }

    fn read_w(scope: &Scope, args: Vec<Value>) -> Result<Value> {
        let w = scope.get_variable("params", "w").unwrap_or_else(Value::unit);
        Ok(Value::Tuple(vec![w, args.into_iter().next().unwrap_or_else(Value::unit)]))
    }

    #[test]
    fn test_mapped_variable_is_sliced() {
        let scope = scope_with(Tensor::arange(4).into());
        let f = vmap(read_w, VmapOptions::new().variable_axis("params", Some(0)));
        let y = f(&scope, vec![Tensor::zeros(&[4]).into()]).unwrap();
        let parts = y.as_tuple().unwrap();
        assert_eq!(parts[0].as_array().unwrap().data(), &[0.0, 1.0, 2.0, 3.0]);
    }

    #[test]
    fn test_inconsistent_sizes_reported() {
        let scope = scope_with(Tensor::arange(4).into());
        let f = vmap(read_w, VmapOptions::new().variable_axis("params", Some(0)));
        let err = f(&scope, vec![Tensor::zeros(&[5]).into()]).unwrap_err();
        assert_eq!(
            err,
            LiftError::InconsistentAxisSizes {
                sizes: BTreeSet::from([4, 5])
            }
        );
    }

    #[test]
    fn test_unspecified_size() {
        let scope = scope_with(Value::scalar(1.0));
        let f = vmap(read_w, VmapOptions::new().in_axes(ArgAxes::Uniform(None)));
        let err = f(&scope, vec![Value::scalar(0.0)]).unwrap_err();
        assert_eq!(err, LiftError::AxisSizeUnspecified);
    }

    #[test]
    fn test_explicit_size_broadcasts() {
        let scope = scope_with(Value::scalar(1.0));
        let f = vmap(read_w, VmapOptions::new().in_axes(ArgAxes::Uniform(None)).axis_size(3));
        let y = f(&scope, vec![Value::scalar(2.0)]).unwrap();
        assert_eq!(y.as_tuple().unwrap()[1].as_array().unwrap().data(), &[2.0; 3]);
    }

    #[test]
    fn test_split_rng_values() {
        let groups: RngGroups = vec![
            vec![IndexMap::from([(
                "dropout".to_string(),
                crate::tensor::KeyArray::scalar(PrngKey::new(1)),
            )])],
            vec![IndexMap::from([(
                "params".to_string(),
                crate::tensor::KeyArray::scalar(PrngKey::new(2)),
            )])],
        ];
        let (values, axes) = split_rng_values(groups, &[true, false], 3).unwrap();
        assert_eq!(axes, vec![Some(0), None]);
        assert_eq!(values[0].axis_sizes(0).unwrap(), BTreeSet::from([3]));
        assert!(values[1].axis_sizes(0).is_err());
    }
}
