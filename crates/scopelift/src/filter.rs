//! Collection and RNG stream filters.
//!
//! A [`Filter`] selects names. Transforms use ordered lists of filters to
//! partition a scope's collections into disjoint groups with
//! [`group_collections`]: each name lands in the first group whose filter
//! matches it, and unmatched names form a trailing remainder.
//!
//! ```
//! use scopelift::Filter;
//!
//! let params = Filter::from("params");
//! assert!(params.matches("params"));
//! assert!((!params.clone()).matches("batch_stats"));
//! assert_eq!(params.union(&!Filter::from("params")), Filter::All);
//! ```

use std::collections::BTreeSet;
use std::ops::Not;

use indexmap::IndexMap;

/// Predicate over collection or stream names.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Filter {
    #[default]
    All,
    Nothing,
    Names(BTreeSet<String>),
    Except(BTreeSet<String>),
}

impl Filter {
    /// Filter selecting exactly `names`. An empty set selects nothing.
    pub fn names<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let set: BTreeSet<String> = names.into_iter().map(Into::into).collect();
        if set.is_empty() {
            Filter::Nothing
        } else {
            Filter::Names(set)
        }
    }

    /// Filter selecting everything except `names`.
    pub fn except<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        !Filter::names(names)
    }

    pub fn matches(&self, name: &str) -> bool {
        match self {
            Filter::All => true,
            Filter::Nothing => false,
            Filter::Names(set) => set.contains(name),
            Filter::Except(set) => !set.contains(name),
        }
    }

    /// Names matched by either filter.
    pub fn union(&self, other: &Filter) -> Filter {
        use Filter::*;
        match (self, other) {
            (All, _) | (_, All) => All,
            (Nothing, f) | (f, Nothing) => f.clone(),
            (Names(a), Names(b)) => Filter::names(a.union(b).cloned()),
            (Except(a), Except(b)) => Filter::except(a.intersection(b).cloned()),
            (Names(a), Except(b)) | (Except(b), Names(a)) => {
                Filter::except(b.difference(a).cloned())
            }
        }
    }

    /// Names matched by both filters.
    pub fn intersect(&self, other: &Filter) -> Filter {
        use Filter::*;
        match (self, other) {
            (Nothing, _) | (_, Nothing) => Nothing,
            (All, f) | (f, All) => f.clone(),
            (Names(a), Names(b)) => Filter::names(a.intersection(b).cloned()),
            (Except(a), Except(b)) => Filter::except(a.union(b).cloned()),
            (Names(a), Except(b)) | (Except(b), Names(a)) => {
                Filter::names(a.difference(b).cloned())
            }
        }
    }

    /// Union of every filter in `filters`.
    pub fn union_all<'a>(filters: impl IntoIterator<Item = &'a Filter>) -> Filter {
        filters
            .into_iter()
            .fold(Filter::Nothing, |acc, f| acc.union(f))
    }
}

impl Not for Filter {
    type Output = Filter;

    fn not(self) -> Filter {
        match self {
            Filter::All => Filter::Nothing,
            Filter::Nothing => Filter::All,
            Filter::Names(set) => Filter::Except(set),
            Filter::Except(set) if set.is_empty() => Filter::Nothing,
            Filter::Except(set) => Filter::Names(set),
        }
    }
}

impl From<bool> for Filter {
    fn from(all: bool) -> Self {
        if all { Filter::All } else { Filter::Nothing }
    }
}

impl From<&str> for Filter {
    fn from(name: &str) -> Self {
        Filter::names([name])
    }
}

impl From<String> for Filter {
    fn from(name: String) -> Self {
        Filter::names([name])
    }
}

impl<const N: usize> From<[&str; N]> for Filter {
    fn from(names: [&str; N]) -> Self {
        Filter::names(names)
    }
}

impl From<Vec<&str>> for Filter {
    fn from(names: Vec<&str>) -> Self {
        Filter::names(names)
    }
}

/// Partition `xs` by `filters`.
///
/// Returns one group per filter, in filter order, plus the remainder of
/// entries no filter matched. Each entry appears in exactly one group, the
/// first whose filter matches it; within a group the order of `xs` is kept.
pub fn group_collections<V>(
    xs: IndexMap<String, V>,
    filters: &[Filter],
) -> (Vec<IndexMap<String, V>>, IndexMap<String, V>) {
    let mut groups: Vec<IndexMap<String, V>> = filters.iter().map(|_| IndexMap::new()).collect();
    let mut rest = IndexMap::new();
    for (name, value) in xs {
        match filters.iter().position(|f| f.matches(&name)) {
            Some(i) => {
                groups[i].insert(name, value);
            }
            None => {
                rest.insert(name, value);
            }
        }
    }
    (groups, rest)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn xs() -> IndexMap<String, u32> {
        ["params", "batch_stats", "cache", "intermediates"]
            .iter()
            .enumerate()
            .map(|(i, n)| (n.to_string(), i as u32))
            .collect()
    }

    #[test]
    fn test_matches() {
        assert!(Filter::All.matches("x"));
        assert!(!Filter::Nothing.matches("x"));
        assert!(Filter::from(["a", "b"]).matches("b"));
        assert!(!Filter::except(["a"]).matches("a"));
        assert!(Filter::except(["a"]).matches("b"));
        assert_eq!(Filter::from(true), Filter::All);
        assert_eq!(Filter::from(false), Filter::Nothing);
        assert_eq!(Filter::from(Vec::<&str>::new()), Filter::Nothing);
    }

    #[test]
    fn test_union_and_intersect() {
        let a = Filter::from(["params", "cache"]);
        let b = Filter::from("cache");
        let not_params = Filter::except(["params"]);

        assert_eq!(a.union(&b), a);
        assert_eq!(a.intersect(&b), b);
        assert_eq!(a.intersect(&not_params), Filter::from("cache"));
        assert_eq!(b.union(&not_params), not_params);
        assert_eq!(a.union(&not_params), Filter::All);
        assert_eq!(
            not_params.intersect(&Filter::except(["cache"])),
            Filter::except(["params", "cache"])
        );
        assert_eq!(Filter::Nothing.union(&b), b);
        assert_eq!(Filter::All.intersect(&b), b);
        assert_eq!(Filter::union_all(&[]), Filter::Nothing);
    }

    #[test]
    fn test_not_roundtrip() {
        for f in [
            Filter::All,
            Filter::Nothing,
            Filter::from("params"),
            Filter::except(["params", "cache"]),
        ] {
            assert_eq!(!!f.clone(), f);
        }
    }

    #[test]
    fn test_group_collections_first_match_wins() {
        let filters = [Filter::from(["params", "cache"]), Filter::from("params")];
        let (groups, rest) = group_collections(xs(), &filters);
        assert_eq!(groups[0].keys().collect::<Vec<_>>(), ["params", "cache"]);
        assert!(groups[1].is_empty());
        assert_eq!(rest.keys().collect::<Vec<_>>(), ["batch_stats", "intermediates"]);
    }

    #[test]
    fn test_group_collections_catch_all() {
        let filters = [Filter::from("cache"), Filter::All];
        let (groups, rest) = group_collections(xs(), &filters);
        assert_eq!(groups[0].len(), 1);
        assert_eq!(groups[1].len(), 3);
        assert!(rest.is_empty());
    }
}
