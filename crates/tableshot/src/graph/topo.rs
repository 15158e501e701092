//! Dependency ordering.

use std::collections::HashMap;
use std::fmt::Display;
use std::hash::Hash;

use tracing::warn;

use crate::error::{CloneError, Result};

/// What to do when the dependency relation contains a cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CyclePolicy {
    /// Log the cycle, stop descending that branch and return a best-effort order.
    #[default]
    Lenient,

    /// Fail with [`CloneError::Cycle`].
    Strict,
}

impl CyclePolicy {
    pub fn from_strict(strict: bool) -> Self {
        if strict {
            CyclePolicy::Strict
        } else {
            CyclePolicy::Lenient
        }
    }
}

#[derive(Clone, Copy)]
enum Mark {
    InProgress,
    Done,
}

/// Order `items` so that every item comes after its dependencies.
///
/// Depth-first postorder with an explicit stack. Roots are visited in input
/// order and dependencies in the order `dependencies` yields them, so the
/// output is deterministic. Dependencies not in `items` are still visited
/// and emitted. An item depending on itself is not a cycle.
pub fn topological_sort<T, F, I>(items: &[T], mut dependencies: F, policy: CyclePolicy) -> Result<Vec<T>>
where
    T: Clone + Eq + Hash + Display,
    F: FnMut(&T) -> I,
    I: IntoIterator<Item = T>,
{
    let mut marks: HashMap<T, Mark> = HashMap::with_capacity(items.len());
    let mut sorted = Vec::with_capacity(items.len());
    let mut stack: Vec<(T, std::vec::IntoIter<T>)> = Vec::new();

    for root in items {
        if marks.contains_key(root) {
            continue;
        }
        marks.insert(root.clone(), Mark::InProgress);
        let pending: Vec<T> = dependencies(root).into_iter().collect();
        stack.push((root.clone(), pending.into_iter()));

        loop {
            let next = match stack.last_mut() {
                Some((_, pending)) => pending.next(),
                None => break,
            };

            match next {
                Some(dep) => match marks.get(&dep) {
                    Some(Mark::Done) => {}
                    Some(Mark::InProgress) => {
                        let is_self = stack.last().is_some_and(|(node, _)| *node == dep);
                        if is_self {
                            continue;
                        }
                        match policy {
                            CyclePolicy::Strict => {
                                return Err(CloneError::Cycle {
                                    item: dep.to_string(),
                                })
                            }
                            CyclePolicy::Lenient => {
                                warn!("Dependency cycle at {}, ordering is best effort", dep);
                            }
                        }
                    }
                    None => {
                        marks.insert(dep.clone(), Mark::InProgress);
                        let pending: Vec<T> = dependencies(&dep).into_iter().collect();
                        stack.push((dep, pending.into_iter()));
                    }
                },
                None => {
                    if let Some((node, _)) = stack.pop() {
                        marks.insert(node.clone(), Mark::Done);
                        sorted.push(node);
                    }
                }
            }
        }
    }

    Ok(sorted)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn deps_of<'a>(edges: &'a [(&'a str, &'a str)]) -> impl FnMut(&String) -> Vec<String> + 'a {
        move |item: &String| {
            edges
                .iter()
                .filter(|(from, _)| *from == item.as_str())
                .map(|(_, to)| to.to_string())
                .collect()
        }
    }

    fn items(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    fn position(order: &[String], name: &str) -> usize {
        order.iter().position(|s| s == name).unwrap()
    }

    #[test]
    fn test_dependencies_come_first() {
        let edges = [("orders", "customers"), ("lines", "orders"), ("lines", "products")];
        let order = topological_sort(
            &items(&["lines", "orders", "customers", "products"]),
            deps_of(&edges),
            CyclePolicy::Strict,
        )
        .unwrap();

        assert_eq!(order.len(), 4);
        assert!(position(&order, "customers") < position(&order, "orders"));
        assert!(position(&order, "orders") < position(&order, "lines"));
        assert!(position(&order, "products") < position(&order, "lines"));
    }

    #[test]
    fn test_independent_items_keep_input_order() {
        let order =
            topological_sort(&items(&["c", "a", "b"]), deps_of(&[]), CyclePolicy::Strict).unwrap();
        assert_eq!(order, items(&["c", "a", "b"]));
    }

    #[test]
    fn test_diamond_emits_each_item_once() {
        let edges = [("d", "b"), ("d", "c"), ("b", "a"), ("c", "a")];
        let order =
            topological_sort(&items(&["d"]), deps_of(&edges), CyclePolicy::Strict).unwrap();
        assert_eq!(order.first().map(String::as_str), Some("a"));
        assert_eq!(order.last().map(String::as_str), Some("d"));
        assert_eq!(order.len(), 4);
    }

    #[test]
    fn test_self_dependency_is_not_a_cycle() {
        let edges = [("employee", "employee"), ("employee", "dept")];
        let order =
            topological_sort(&items(&["employee"]), deps_of(&edges), CyclePolicy::Strict).unwrap();
        assert_eq!(order, items(&["dept", "employee"]));
    }

    #[test]
    fn test_strict_cycle_fails() {
        let edges = [("a", "b"), ("b", "a")];
        let err = topological_sort(&items(&["a", "b"]), deps_of(&edges), CyclePolicy::Strict)
            .unwrap_err();
        assert!(matches!(err, CloneError::Cycle { ref item } if item == "a"));
    }

    #[test]
    fn test_lenient_cycle_returns_every_item() {
        let edges = [("a", "b"), ("b", "a")];
        let order =
            topological_sort(&items(&["a", "b"]), deps_of(&edges), CyclePolicy::Lenient).unwrap();
        assert_eq!(order, items(&["b", "a"]));
    }

    #[test]
    fn test_deep_chain_does_not_recurse() {
        let names: Vec<String> = (0..20_000).map(|i| format!("t{i}")).collect();
        let order = topological_sort(
            &names[..1],
            |item: &String| {
                let i: usize = item[1..].parse().unwrap();
                (i + 1 < 20_000).then(|| format!("t{}", i + 1))
            },
            CyclePolicy::Strict,
        )
        .unwrap();
        assert_eq!(order.len(), 20_000);
        assert_eq!(order[0], "t19999");
    }
}
