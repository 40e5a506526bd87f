//! Dependency sorter for the components of one composite
//!
//! Components declare the *types* they must be initialized after. A
//! dependency on type `T` orders the dependent after every sibling of type
//! `T`. The sort is a stable topological sort: whenever several components are
//! ready, the one declared first goes first, so the same composite always
//! yields the same order.

use std::cmp::Reverse;
use std::collections::{BTreeSet, BinaryHeap};

use void_core::{BatchResult, Error, ErrorReport};

/// One component as seen by the sorter
#[derive(Clone, Copy, Debug)]
pub struct SortItem<'a> {
    /// Component identifier, used in error reports
    pub id: &'a str,
    /// Registered type name
    pub type_name: &'a str,
    /// Type names this component is initialized after
    pub dependencies: &'a [String],
}

/// Compute an initialization order as indices into `items`.
///
/// Fails with every `MissingDependency` in the composite, or with the first
/// `DependencyCycle` found. Never returns a partial order.
pub fn order(items: &[SortItem<'_>]) -> BatchResult<Vec<usize>> {
    let n = items.len();
    let mut report = ErrorReport::new();

    // depends_on[a] = components a must follow; dependents[b] = the reverse
    let mut depends_on: Vec<BTreeSet<usize>> = vec![BTreeSet::new(); n];
    let mut dependents: Vec<BTreeSet<usize>> = vec![BTreeSet::new(); n];

    for (a, item) in items.iter().enumerate() {
        for dep in item.dependencies {
            let providers: Vec<usize> = items
                .iter()
                .enumerate()
                .filter(|(b, other)| *b != a && other.type_name == dep.as_str())
                .map(|(b, _)| b)
                .collect();
            if providers.is_empty() {
                report.push(Error::MissingDependency {
                    component: item.id.to_string(),
                    dependency: dep.clone(),
                });
            }
            for b in providers {
                depends_on[a].insert(b);
                dependents[b].insert(a);
            }
        }
    }
    report.check()?;

    let mut in_degree: Vec<usize> = depends_on.iter().map(BTreeSet::len).collect();
    let mut ready: BinaryHeap<Reverse<usize>> = (0..n)
        .filter(|i| in_degree[*i] == 0)
        .map(Reverse)
        .collect();
    let mut result = Vec::with_capacity(n);

    while let Some(Reverse(next)) = ready.pop() {
        result.push(next);
        for &d in &dependents[next] {
            in_degree[d] -= 1;
            if in_degree[d] == 0 {
                ready.push(Reverse(d));
            }
        }
    }

    if result.len() < n {
        let done: BTreeSet<usize> = result.iter().copied().collect();
        let path = cycle_path(items, &depends_on, &done);
        return Err(Error::DependencyCycle { path }.into());
    }
    Ok(result)
}

/// Walk dependency edges among the unsorted components until one repeats.
///
/// Every unsorted component still depends on another unsorted one, so the
/// walk always closes a loop.
fn cycle_path(items: &[SortItem<'_>], depends_on: &[BTreeSet<usize>], done: &BTreeSet<usize>) -> Vec<String> {
    let Some(start) = (0..items.len()).find(|i| !done.contains(i)) else {
        return Vec::new();
    };
    let mut walk = vec![start];
    let mut current = start;
    loop {
        let Some(next) = depends_on[current].iter().copied().find(|d| !done.contains(d)) else {
            break;
        };
        if let Some(pos) = walk.iter().position(|w| *w == next) {
            let mut path: Vec<String> = walk[pos..].iter().map(|i| items[*i].id.to_string()).collect();
            path.push(items[next].id.to_string());
            return path;
        }
        walk.push(next);
        current = next;
    }
    walk.iter().map(|i| items[*i].id.to_string()).collect()
}
