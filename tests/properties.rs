use std::collections::BTreeSet;

use factflow::{eav, eavrc, Program};
use proptest::prelude::*;

const NODES: u8 = 5;

fn transitive() -> Program {
    let mut program = Program::new("paths");
    program
        .block("edges are paths", |f| {
            let from = f.find(&[]);
            let to = f.attr(from, "edge");
            f.add(from, "path", to);
        })
        .unwrap()
        .block("paths compose", |f| {
            let from = f.find(&[]);
            let middle = f.attr(from, "path");
            let to = f.attr(middle, "path");
            f.add(from, "path", to);
        })
        .unwrap();
    program
}

fn closure(edges: &BTreeSet<(u8, u8)>) -> BTreeSet<(String, String)> {
    let mut paths: BTreeSet<(u8, u8)> = edges.clone();
    loop {
        let next: Vec<(u8, u8)> = paths
            .iter()
            .flat_map(|(a, b)| paths.iter().filter(move |(c, _)| c == b).map(move |(_, d)| (*a, *d)))
            .filter(|path| !paths.contains(path))
            .collect();
        if next.is_empty() {
            break;
        }
        paths.extend(next);
    }
    paths.into_iter().map(|(a, b)| (a.to_string(), b.to_string())).collect()
}

fn paths(program: &Program) -> BTreeSet<(String, String)> {
    program
        .facts()
        .into_iter()
        .filter(|(_, a, _)| a.as_str() == Some("path"))
        .map(|(e, _, v)| (e.to_string(), v.to_string()))
        .collect()
}

fn ops() -> impl Strategy<Value = Vec<(u8, u8)>> {
    prop::collection::vec((0..NODES, 0..NODES), 1..12)
}

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 64,
        failure_persistence: None,
        ..ProptestConfig::default()
    })]

    /// Each op toggles one edge in its own transaction; the derived paths
    /// always equal the closure of the edges present.
    #[test]
    fn incremental_closure_matches_recomputation(toggles in ops()) {
        let mut program = transitive();
        let mut edges = BTreeSet::new();
        for (from, to) in toggles {
            let change = if edges.remove(&(from, to)) {
                eavrc(i32::from(from), "edge", i32::from(to), 0, -1)
            } else {
                edges.insert((from, to));
                eav(i32::from(from), "edge", i32::from(to))
            };
            program.input_eavs(&[change]).unwrap();
            prop_assert_eq!(paths(&program), closure(&edges));
        }
    }

    #[test]
    fn retracting_everything_empties_the_index(toggles in ops()) {
        let edges: BTreeSet<(u8, u8)> = toggles.into_iter().collect();
        let mut program = transitive();
        let asserted: Vec<_> = edges
            .iter()
            .map(|(from, to)| eav(i32::from(*from), "edge", i32::from(*to)))
            .collect();
        program.input_eavs(&asserted).unwrap();
        prop_assert_eq!(paths(&program), closure(&edges));

        let retracted: Vec<_> = edges
            .iter()
            .map(|(from, to)| eavrc(i32::from(*from), "edge", i32::from(*to), 0, -1))
            .collect();
        program.input_eavs(&retracted).unwrap();
        prop_assert!(program.facts().is_empty());
    }

    #[test]
    fn batching_does_not_change_the_result(toggles in ops()) {
        let edges: BTreeSet<(u8, u8)> = toggles.into_iter().collect();

        let mut batched = transitive();
        let all: Vec<_> = edges
            .iter()
            .map(|(from, to)| eav(i32::from(*from), "edge", i32::from(*to)))
            .collect();
        batched.input_eavs(&all).unwrap();

        let mut stepwise = transitive();
        for change in &all {
            stepwise.input_eavs(std::slice::from_ref(change)).unwrap();
        }

        prop_assert_eq!(paths(&batched), paths(&stepwise));
    }
}
