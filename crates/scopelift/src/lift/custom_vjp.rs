//! Custom-gradient lift.
//!
//! The variables selected by `grad_kind` become an explicit differentiable
//! input of the lifted function, next to its positional arguments:
//!
//! ```text
//! operands    [grad_variables, args...]
//! output      (y, mutated variables)
//! residuals   (grad_variables, user residuals)
//! cotangent   (g_y, ())
//! ```

use tracing::debug;

use crate::collection::{VariableGroup, group_from_value, group_to_value};
use crate::error::{LiftError, Result};
use crate::filter::Filter;
use crate::lift::pack::{Pack, PackCall, RngGroups, variable_groups_from_values, variable_groups_to_values};
use crate::primitives::CustomVjp;
use crate::scope::ScopeStructure;
use crate::value::Value;

/// Configuration of [`custom_vjp`].
#[derive(Debug, Clone)]
pub struct CustomVjpOptions {
    /// Collections that receive gradients.
    pub grad_kind: Filter,
    /// Operands without gradients, indexing `[grad_variables, args...]`.
    pub nondiff_argnums: Vec<usize>,
}

impl Default for CustomVjpOptions {
    fn default() -> Self {
        Self {
            grad_kind: Filter::from("params"),
            nondiff_argnums: Vec::new(),
        }
    }
}

impl CustomVjpOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn grad_kind(mut self, filter: impl Into<Filter>) -> Self {
        self.grad_kind = filter.into();
        self
    }

    pub fn nondiff_argnums(mut self, argnums: impl IntoIterator<Item = usize>) -> Self {
        self.nondiff_argnums = argnums.into_iter().collect();
        self
    }
}

/// Builds scopes for the backward rule.
///
/// The scope holds the given gradient-bearing variables, read-only, next to
/// the remaining variables and streams of the forward call.
pub struct VjpScopeFactory<'a, 'p, S> {
    call: &'a PackCall<'p, S>,
    other: &'a VariableGroup,
    rngs: &'a RngGroups,
    frozen: &'a Filter,
}

impl<S: ScopeStructure> VjpScopeFactory<'_, '_, S> {
    pub fn scope(&self, grad_variables: VariableGroup) -> Result<S> {
        self.call.scope_fn_frozen(
            vec![vec![grad_variables], vec![self.other.clone()]],
            self.rngs.clone(),
            self.frozen,
        )
    }
}

/// Result of [`LiftedVjp::vjp`].
#[derive(Debug, Clone, PartialEq)]
pub struct VjpOutput {
    pub y: Value,
    /// Cotangent of the gradient-bearing variables. Empty when they are
    /// listed in `nondiff_argnums`.
    pub grad_variables: VariableGroup,
    /// One cotangent per differentiable argument.
    pub grad_args: Vec<Value>,
}

/// A function lifted by [`custom_vjp`].
pub struct LiftedVjp<F, B> {
    forward: F,
    backward: B,
    grad_kind: Filter,
    nondiff_argnums: Vec<usize>,
    strategy: Pack,
}

/// Lift `forward` with the gradient rule `backward`.
///
/// `forward(scope, args)` returns `(y, residuals)`.
/// `backward(nondiff_args, factory, grad_variables, residuals, g_y)` returns
/// the cotangent of the gradient-bearing variables and one cotangent per
/// differentiable argument.
pub fn custom_vjp<F, B>(forward: F, backward: B, options: CustomVjpOptions) -> LiftedVjp<F, B> {
    let filters = vec![options.grad_kind.clone(), Filter::All];
    LiftedVjp {
        forward,
        backward,
        strategy: Pack::new(filters.clone(), filters, vec![Filter::All]),
        grad_kind: options.grad_kind,
        nondiff_argnums: options.nondiff_argnums,
    }
}

impl<F, B> LiftedVjp<F, B> {
    /// Evaluate the primal output.
    pub fn call<S>(&self, scope_tree: &S, args: Vec<Value>) -> Result<Value>
    where
        S: ScopeStructure,
        F: Fn(&S, Vec<Value>) -> Result<(Value, Value)>,
        B: Fn(&[Value], &VjpScopeFactory<'_, '_, S>, VariableGroup, Value, Value) -> Result<(VariableGroup, Vec<Value>)>,
    {
        Ok(self.run(scope_tree, args, None)?.y)
    }

    /// Evaluate the output and pull `g_y` back through the backward rule.
    pub fn vjp<S>(&self, scope_tree: &S, args: Vec<Value>, g_y: Value) -> Result<VjpOutput>
    where
        S: ScopeStructure,
        F: Fn(&S, Vec<Value>) -> Result<(Value, Value)>,
        B: Fn(&[Value], &VjpScopeFactory<'_, '_, S>, VariableGroup, Value, Value) -> Result<(VariableGroup, Vec<Value>)>,
    {
        self.run(scope_tree, args, Some(g_y))
    }

    fn run<S>(&self, scope_tree: &S, args: Vec<Value>, cotangent: Option<Value>) -> Result<VjpOutput>
    where
        S: ScopeStructure,
        F: Fn(&S, Vec<Value>) -> Result<(Value, Value)>,
        B: Fn(&[Value], &VjpScopeFactory<'_, '_, S>, VariableGroup, Value, Value) -> Result<(VariableGroup, Vec<Value>)>,
    {
        self.strategy.run(scope_tree, args, |call, packed, args| {
            if call.num_scopes() != 1 {
                return Err(LiftError::MultiScopeUnsupported {
                    transform: "custom_vjp",
                });
            }
            let mut groups = packed
                .variable_groups
                .into_iter()
                .map(|per_scope| per_scope.into_iter().next().unwrap_or_default());
            let grad_in = groups.next().unwrap_or_default();
            let other = groups.next().unwrap_or_default();
            let rngs = packed.rng_groups;
            let differentiates_variables = !self.nondiff_argnums.contains(&0);
            // the forward pass of a vjp only reads the gradient-bearing variables
            let forward_frozen = match cotangent {
                Some(_) => self.grad_kind.clone(),
                None => Filter::Nothing,
            };

            let primitive = CustomVjp::new(
                |operands: &[Value]| -> Result<(Value, Value)> {
                    let grad_group = group_from_value(operands[0].clone())?;
                    let inner = call.scope_fn_frozen(
                        vec![vec![grad_group], vec![other.clone()]],
                        rngs.clone(),
                        &forward_frozen,
                    )?;
                    let (y, residuals) = (self.forward)(&inner, operands[1..].to_vec())?;
                    let vars_out = Value::Tuple(variable_groups_to_values(&call.repack(&inner)?));
                    Ok((
                        Value::Tuple(vec![y, vars_out]),
                        Value::Tuple(vec![operands[0].clone(), residuals]),
                    ))
                },
                |nondiff: &[Value], residuals: Value, cotangent: Value| -> Result<Vec<Value>> {
                    let (grad_variables, residuals) = into_pair(residuals)?;
                    let (g_y, _) = into_pair(cotangent)?;
                    let factory = VjpScopeFactory {
                        call,
                        other: &other,
                        rngs: &rngs,
                        frozen: &self.grad_kind,
                    };
                    let (grad_group, grad_args) =
                        (self.backward)(nondiff, &factory, group_from_value(grad_variables)?, residuals, g_y)?;
                    let mut grads = Vec::with_capacity(grad_args.len() + 1);
                    if differentiates_variables {
                        grads.push(group_to_value(&grad_group));
                    }
                    grads.extend(grad_args);
                    Ok(grads)
                },
                self.nondiff_argnums.iter().copied(),
            );

            let mut operands = vec![group_to_value(&grad_in)];
            operands.extend(args);
            let (out, grads) = match cotangent {
                None => (primitive.call(&operands)?, Vec::new()),
                Some(g_y) => primitive.vjp(&operands, Value::Tuple(vec![g_y, Value::unit()]))?,
            };
            debug!(grads = grads.len(), "custom vjp lift");

            let (y, vars_out) = into_pair(out)?;
            let out_groups = variable_groups_from_values(vars_out.into_tuple()?)?;
            let mut grads = grads.into_iter();
            let grad_variables = if differentiates_variables {
                grads.next().map(group_from_value).transpose()?.unwrap_or_default()
            } else {
                VariableGroup::new()
            };
            let output = VjpOutput {
                y,
                grad_variables,
                grad_args: grads.collect(),
            };
            Ok((output, out_groups))
        })
    }
}

fn into_pair(value: Value) -> Result<(Value, Value)> {
    let mut items = value.into_tuple()?.into_iter();
    match (items.next(), items.next(), items.next()) {
        (Some(a), Some(b), None) => Ok((a, b)),
        _ => Err(LiftError::StructureMismatch {
            reason: "expected a pair".to_string(),
        }),
    }
}
