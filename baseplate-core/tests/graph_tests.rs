//! Parameterised ordering tests for the task graph resolver.
//!
//! Each `#[case]` is isolated; no shared state.

use baseplate_core::{toposort, GraphError};
use rstest::rstest;

fn nodes(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

fn edges(items: &[(&str, &str)]) -> Vec<(String, String)> {
    items.iter().map(|(a, b)| (a.to_string(), b.to_string())).collect()
}

fn assert_respects(order: &[String], constraints: &[(String, String)]) {
    for (before, after) in constraints {
        let b = order.iter().position(|n| n == before).expect("before present");
        let a = order.iter().position(|n| n == after).expect("after present");
        assert!(b < a, "{before} must precede {after} in {order:?}");
    }
}

#[rstest]
#[case("chain", &["a", "b", "c"], &[("a", "b"), ("b", "c")])]
#[case("diamond", &["d", "c", "b", "a"], &[("a", "b"), ("a", "c"), ("b", "d"), ("c", "d")])]
#[case("forest", &["x", "a", "y", "b"], &[("a", "b"), ("x", "y")])]
#[case("fan_in", &["sink", "s1", "s2", "s3"], &[("s1", "sink"), ("s2", "sink"), ("s3", "sink")])]
fn order_respects_every_edge(
    #[case] label: &str,
    #[case] input: &[&str],
    #[case] constraints: &[(&str, &str)],
) {
    let constraints = edges(constraints);
    let order = toposort(&nodes(input), &constraints)
        .unwrap_or_else(|e| panic!("[{label}] unexpected error: {e}"));
    assert_eq!(order.len(), input.len(), "[{label}] length");
    assert_respects(&order, &constraints);
}

#[rstest]
#[case(&[("a", "b"), ("b", "a")], &["a", "b"])]
#[case(&[("a", "b"), ("b", "c"), ("c", "a")], &["a", "b", "c"])]
fn cycle_error_lists_every_member(#[case] input: &[(&str, &str)], #[case] members: &[&str]) {
    let err = toposort(&nodes(&["a", "b", "c"]), &edges(input)).expect_err("cycle");
    let GraphError::Cycle { path } = &err else {
        panic!("expected cycle, got {err:?}");
    };
    for member in members {
        assert!(path.iter().any(|p| p == member), "{member} missing from {path:?}");
    }
    assert!(err.to_string().contains(" -> "), "message: {err}");
}

#[test]
fn stable_ordering_is_deterministic_across_runs() {
    let input = nodes(&["e", "d", "c", "b", "a"]);
    let constraints = edges(&[("a", "e")]);
    let first = toposort(&input, &constraints).expect("order");
    for _ in 0..10 {
        assert_eq!(toposort(&input, &constraints).expect("order"), first);
    }
}
