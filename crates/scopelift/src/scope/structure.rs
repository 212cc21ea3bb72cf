//! Trees of scope handles.
//!
//! Transforms accept any [`ScopeStructure`]: a single scope, a vector of
//! scopes, tuples of those, and so on. The structure is flattened into a list
//! of handles for deduplication and later rebuilt, with fresh scopes, using the
//! original value as the shape template.

use crate::error::{LiftError, Result};
use crate::scope::Scope;

/// A tree whose leaves are scope handles.
pub trait ScopeStructure: Sized {
    /// Append every leaf scope, in order.
    fn flatten_scopes(&self, out: &mut Vec<Scope>);

    /// Build a tree of the same shape whose leaves are taken from `leaves`.
    fn rebuild_scopes(&self, leaves: &mut dyn Iterator<Item = Scope>) -> Result<Self>;

    /// All leaf scopes, in order.
    fn scopes(&self) -> Vec<Scope> {
        let mut out = Vec::new();
        self.flatten_scopes(&mut out);
        out
    }

    /// A tree of the same shape with exactly `scopes` as leaves.
    ///
    /// # Errors
    ///
    /// Fails if `scopes` does not have one entry per leaf.
    fn with_scopes(&self, scopes: Vec<Scope>) -> Result<Self> {
        let expected = self.scopes().len();
        if scopes.len() != expected {
            return Err(LiftError::ScopeCountMismatch {
                expected,
                actual: scopes.len(),
            });
        }
        self.rebuild_scopes(&mut scopes.into_iter())
    }
}

impl ScopeStructure for Scope {
    fn flatten_scopes(&self, out: &mut Vec<Scope>) {
        out.push(self.clone());
    }

    fn rebuild_scopes(&self, leaves: &mut dyn Iterator<Item = Scope>) -> Result<Self> {
        leaves.next().ok_or_else(|| LiftError::StructureMismatch {
            reason: "ran out of scopes while rebuilding scope tree".to_string(),
        })
    }
}

impl<S: ScopeStructure> ScopeStructure for Vec<S> {
    fn flatten_scopes(&self, out: &mut Vec<Scope>) {
        self.iter().for_each(|s| s.flatten_scopes(out));
    }

    fn rebuild_scopes(&self, leaves: &mut dyn Iterator<Item = Scope>) -> Result<Self> {
        self.iter().map(|s| s.rebuild_scopes(leaves)).collect()
    }
}

impl<A: ScopeStructure, B: ScopeStructure> ScopeStructure for (A, B) {
    fn flatten_scopes(&self, out: &mut Vec<Scope>) {
        self.0.flatten_scopes(out);
        self.1.flatten_scopes(out);
    }

    fn rebuild_scopes(&self, leaves: &mut dyn Iterator<Item = Scope>) -> Result<Self> {
        Ok((self.0.rebuild_scopes(leaves)?, self.1.rebuild_scopes(leaves)?))
    }
}

impl<A: ScopeStructure, B: ScopeStructure, C: ScopeStructure> ScopeStructure for (A, B, C) {
    fn flatten_scopes(&self, out: &mut Vec<Scope>) {
        self.0.flatten_scopes(out);
        self.1.flatten_scopes(out);
        self.2.flatten_scopes(out);
    }

    fn rebuild_scopes(&self, leaves: &mut dyn Iterator<Item = Scope>) -> Result<Self> {
        Ok((
            self.0.rebuild_scopes(leaves)?,
            self.1.rebuild_scopes(leaves)?,
            self.2.rebuild_scopes(leaves)?,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::Filter;

    #[test]
    fn test_flatten_nested() {
        let root = Scope::new(Default::default(), Default::default(), Filter::All);
        let a = root.push("a", false).unwrap();
        let tree = (root.clone(), vec![a.clone(), root.clone()]);
        assert_eq!(tree.scopes(), vec![root.clone(), a.clone(), root.clone()]);
    }

    #[test]
    fn test_with_scopes_count_mismatch() {
        let root = Scope::new(Default::default(), Default::default(), Filter::All);
        let tree = vec![root.clone(), root.clone()];
        let err = tree.with_scopes(vec![root.clone()]).unwrap_err();
        assert_eq!(
            err,
            LiftError::ScopeCountMismatch {
                expected: 2,
                actual: 1
            }
        );
        let rebuilt = tree.with_scopes(vec![root.clone(), root.clone()]).unwrap();
        assert_eq!(rebuilt.len(), 2);
    }
}
