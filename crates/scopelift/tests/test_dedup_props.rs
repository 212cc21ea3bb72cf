//! Property tests for scope-tree deduplication.

mod common;

use common::{init_test_logging, root_scope, test_proptest_config};
use proptest::prelude::*;
use scopelift::Scope;
use scopelift::lift::Dedup;

const CHILDREN: [&str; 2] = ["dense", "norm"];
const GRANDCHILDREN: [&str; 2] = ["kernel", "bias"];

/// A handle into one of two forests: root, then up to two child names.
fn arb_handle() -> impl Strategy<Value = (usize, usize, usize, usize)> {
    (0..2usize, 0..=2usize, 0..2usize, 0..2usize)
}

fn resolve(roots: &[Scope], (root, depth, child, grandchild): (usize, usize, usize, usize)) -> Scope {
    let mut scope = roots[root].clone();
    if depth >= 1 {
        scope = scope.push(CHILDREN[child], true).unwrap();
    }
    if depth >= 2 {
        scope = scope.push(GRANDCHILDREN[grandchild], true).unwrap();
    }
    scope
}

fn is_ancestor_or_self(ancestor: &Scope, scope: &Scope) -> bool {
    let mut current = Some(scope.clone());
    while let Some(s) = current {
        if s == *ancestor {
            return true;
        }
        current = s.parent();
    }
    false
}

proptest! {
    #![proptest_config(test_proptest_config(200))]

    /// Replaying every path on the original roots returns the original handles.
    #[test]
    fn reduplicate_on_same_roots_is_identity(handles in prop::collection::vec(arb_handle(), 1..8)) {
        init_test_logging();
        let roots = [root_scope(&[]), root_scope(&[])];
        let scopes: Vec<Scope> = handles.iter().map(|&h| resolve(&roots, h)).collect();
        let dedup = Dedup::new(&scopes);
        let replayed = dedup.reduplicate(dedup.roots()).unwrap();
        prop_assert_eq!(replayed, scopes);
    }

    /// Replaying on fresh roots rebuilds the same tree shape below each root.
    #[test]
    fn reduplicate_on_fresh_roots_is_isomorphic(handles in prop::collection::vec(arb_handle(), 1..8)) {
        init_test_logging();
        let roots = [root_scope(&[]), root_scope(&[])];
        let scopes: Vec<Scope> = handles.iter().map(|&h| resolve(&roots, h)).collect();
        let dedup = Dedup::new(&scopes);
        let fresh: Vec<Scope> = dedup.roots().iter().map(|_| root_scope(&[])).collect();
        let replayed = dedup.reduplicate(&fresh).unwrap();
        prop_assert_eq!(replayed.len(), scopes.len());

        for (i, (scope, copy)) in scopes.iter().zip(&replayed).enumerate() {
            let path = &dedup.paths()[i];
            let root_depth = dedup.roots()[path.root].path().len();
            prop_assert!(is_ancestor_or_self(&fresh[path.root], copy));
            let copy_path = copy.path();
            let scope_path = scope.path();
            prop_assert_eq!(copy_path.as_slice(), &scope_path[root_depth..]);
            prop_assert!(!scopes.contains(copy));
            for (other, other_copy) in scopes.iter().zip(&replayed) {
                prop_assert_eq!(scope == other, copy == other_copy);
                prop_assert_eq!(is_ancestor_or_self(scope, other), is_ancestor_or_self(copy, other_copy));
                prop_assert_eq!(other.parent().as_ref() == Some(scope), other_copy.parent().as_ref() == Some(copy));
            }
        }
    }

    /// Roots are unrelated, and each handle lives under its recorded root.
    #[test]
    fn roots_are_minimal_and_cover_every_handle(handles in prop::collection::vec(arb_handle(), 1..8)) {
        init_test_logging();
        let roots = [root_scope(&[]), root_scope(&[])];
        let scopes: Vec<Scope> = handles.iter().map(|&h| resolve(&roots, h)).collect();
        let dedup = Dedup::new(&scopes);

        for (i, a) in dedup.roots().iter().enumerate() {
            prop_assert!(scopes.contains(a));
            for b in &dedup.roots()[i + 1..] {
                prop_assert!(!is_ancestor_or_self(a, b) && !is_ancestor_or_self(b, a));
            }
        }
        for (scope, path) in scopes.iter().zip(dedup.paths()) {
            let root = &dedup.roots()[path.root];
            prop_assert!(is_ancestor_or_self(root, scope));
            prop_assert_eq!(path.names.len(), scope.path().len() - root.path().len());
        }
    }

    /// Equal handles get equal paths.
    #[test]
    fn aliased_handles_share_paths(handle in arb_handle(), copies in 2..5usize) {
        init_test_logging();
        let roots = [root_scope(&[]), root_scope(&[])];
        let scope = resolve(&roots, handle);
        let scopes = vec![scope; copies];
        let dedup = Dedup::new(&scopes);
        prop_assert_eq!(dedup.roots().len(), 1);
        let first = &dedup.paths()[0];
        prop_assert!(dedup.paths().iter().all(|p| p == first));
    }
}
