//! Scope-tree deduplication.
//!
//! A flattened scope tree can mention the same scope twice, or a scope and
//! one of its descendants. [`Dedup`] reduces it to the minimal ordered set of
//! independent roots, plus one [`ScopePath`] per input handle recording how to
//! reach that handle from its root. [`Dedup::reduplicate`] replays the paths
//! on fresh roots.

use indexmap::IndexSet;
use smallvec::smallvec;
use tracing::trace;

use crate::error::{LiftError, Result};
use crate::scope::{Scope, ScopePathNames};

/// Location of a scope relative to one of the deduplicated roots.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScopePath {
    /// Index into [`Dedup::roots`].
    pub root: usize,
    /// Child names from the root down to the scope.
    pub names: ScopePathNames,
}

/// A deduplicated scope tree.
#[derive(Debug, Clone)]
pub struct Dedup {
    roots: Vec<Scope>,
    paths: Vec<ScopePath>,
}

impl Dedup {
    /// Deduplicate `scopes`.
    ///
    /// Roots keep the order in which they first appear. A scope is dropped
    /// from the root set as soon as one of its ancestors is found in it.
    pub fn new(scopes: &[Scope]) -> Self {
        let mut minimal: IndexSet<Scope> = scopes.iter().cloned().collect();
        let mut found = Vec::with_capacity(scopes.len());
        for leaf in scopes {
            let mut max_parent = leaf.clone();
            let mut max_path = ScopePathNames::new();
            let mut path: ScopePathNames = smallvec![leaf.name().unwrap_or_default()];
            let mut current = leaf.parent();
            while let Some(scope) = current {
                if minimal.contains(&scope) {
                    max_parent = scope.clone();
                    max_path = path.iter().rev().cloned().collect();
                }
                path.push(scope.name().unwrap_or_default());
                current = scope.parent();
            }
            if max_parent != *leaf {
                minimal.shift_remove(leaf);
            }
            found.push((max_parent, max_path));
        }

        let paths = found
            .into_iter()
            .map(|(root, names)| ScopePath {
                root: minimal
                    .get_index_of(&root)
                    .expect("topmost ancestor is never removed from the root set"),
                names,
            })
            .collect();
        let roots: Vec<Scope> = minimal.into_iter().collect();
        trace!(handles = scopes.len(), roots = roots.len(), "dedup scopes");
        Self { roots, paths }
    }

    pub fn roots(&self) -> &[Scope] {
        &self.roots
    }

    pub fn paths(&self) -> &[ScopePath] {
        &self.paths
    }

    /// Recreate one scope per recorded path, starting from `fresh_roots`.
    ///
    /// `fresh_roots[i]` stands in for `self.roots()[i]`. Children along each
    /// path are created with `push(name, reuse = true)`, so aliased handles
    /// come back as the same scope.
    ///
    /// # Errors
    ///
    /// Fails if the number of fresh roots differs from the number of roots, or
    /// if a fresh root cannot create children.
    pub fn reduplicate(&self, fresh_roots: &[Scope]) -> Result<Vec<Scope>> {
        if fresh_roots.len() != self.roots.len() {
            return Err(LiftError::ScopeCountMismatch {
                expected: self.roots.len(),
                actual: fresh_roots.len(),
            });
        }
        self.paths
            .iter()
            .map(|path| {
                path.names
                    .iter()
                    .try_fold(fresh_roots[path.root].clone(), |scope, name| {
                        scope.push(name, true)
                    })
            })
            .collect()
    }
}
