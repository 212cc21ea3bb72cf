//! Functions with user-defined vector-Jacobian products.
//!
//! No differentiation happens here. [`CustomVjp`] pairs a forward function,
//! which returns the primal output and residuals, with a backward function
//! mapping residuals and an output cotangent to one cotangent per
//! differentiable operand.

use std::collections::BTreeSet;

use tracing::{debug, instrument};

use crate::error::{LiftError, Result};
use crate::value::Value;

/// Forward and backward rules of one function.
pub struct CustomVjp<F, B> {
    forward: F,
    backward: B,
    nondiff_argnums: BTreeSet<usize>,
}

impl<F, B> CustomVjp<F, B>
where
    F: Fn(&[Value]) -> Result<(Value, Value)>,
    B: Fn(&[Value], Value, Value) -> Result<Vec<Value>>,
{
    /// `forward(operands)` returns `(output, residuals)`.
    /// `backward(nondiff_operands, residuals, cotangent)` returns cotangents
    /// for the remaining operands, in order.
    pub fn new(forward: F, backward: B, nondiff_argnums: impl IntoIterator<Item = usize>) -> Self {
        Self {
            forward,
            backward,
            nondiff_argnums: nondiff_argnums.into_iter().collect(),
        }
    }

    fn check_argnums(&self, num_args: usize) -> Result<()> {
        match self.nondiff_argnums.iter().find(|&&i| i >= num_args) {
            Some(&index) => Err(LiftError::InvalidNondiffArgnum { index, num_args }),
            None => Ok(()),
        }
    }

    /// Evaluate the primal output.
    pub fn call(&self, operands: &[Value]) -> Result<Value> {
        self.check_argnums(operands.len())?;
        let (y, _) = (self.forward)(operands)?;
        Ok(y)
    }

    /// Evaluate the output and pull `cotangent` back through the backward rule.
    ///
    /// Returns the output and one cotangent per differentiable operand.
    ///
    /// # Errors
    ///
    /// Fails if a nondiff index is out of range or the backward rule returns
    /// the wrong number of cotangents.
    #[instrument(skip_all, fields(operands = operands.len()))]
    pub fn vjp(&self, operands: &[Value], cotangent: Value) -> Result<(Value, Vec<Value>)> {
        self.check_argnums(operands.len())?;
        let (y, residuals) = (self.forward)(operands)?;
        let nondiff: Vec<Value> = self
            .nondiff_argnums
            .iter()
            .map(|&i| operands[i].clone())
            .collect();
        let grads = (self.backward)(&nondiff, residuals, cotangent)?;
        let expected = operands.len() - self.nondiff_argnums.len();
        if grads.len() != expected {
            return Err(LiftError::GradientArity {
                expected,
                actual: grads.len(),
            });
        }
        debug!(grads = grads.len(), "custom vjp");
        Ok((y, grads))
    }
}
