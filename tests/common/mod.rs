#![allow(dead_code)]

use std::collections::BTreeMap;

use factflow::program::INPUT_NODE;
use factflow::{eavrc, Count, Program, RawChange, RawValue, Round, TransactionReport};

type Shape = Vec<(String, String, Round, Count)>;

/// Changes produced by blocks, without the input facts themselves.
pub fn outputs(program: &Program, report: &TransactionReport) -> Vec<RawChange> {
    let input = program.interner().get(&RawValue::from(INPUT_NODE));
    report
        .changes
        .iter()
        .filter(|change| Some(change.node) != input)
        .filter_map(|change| change.to_raw(program.interner()))
        .collect()
}

fn key(value: &RawValue) -> String {
    format!("{value:?}")
}

fn by_entity(changes: &[RawChange]) -> BTreeMap<String, Shape> {
    let mut groups: BTreeMap<String, Shape> = BTreeMap::new();
    for change in changes {
        groups
            .entry(key(&change.e))
            .or_default()
            .push((key(&change.a), key(&change.v), change.round, change.count));
    }
    for shape in groups.values_mut() {
        shape.sort();
    }
    groups
}

fn render(changes: &[RawChange]) -> String {
    changes.iter().map(|c| format!("\n  {c}")).collect()
}

/// Assert that `actual` equals `expected` up to a renaming of entities.
/// Generated record ids never match the placeholders used in expectations,
/// so entities are paired by the facts they carry.
pub fn assert_changes(actual: &[RawChange], expected: &[RawChange]) {
    let message = format!("actual:{}\nexpected:{}", render(actual), render(expected));
    assert_eq!(actual.len(), expected.len(), "change count differs\n{message}");

    let mut remaining = by_entity(expected);
    for (entity, shape) in by_entity(actual) {
        let matched = remaining
            .iter()
            .find(|(_, candidate)| **candidate == shape)
            .map(|(name, _)| name.clone());
        match matched {
            Some(name) => {
                remaining.remove(&name);
            }
            None => panic!("no expected entity matches {entity}\n{message}"),
        }
    }
    assert!(remaining.is_empty(), "unmatched expectations\n{message}");
}

/// Feed `input` as one transaction and compare what the blocks produced.
pub fn verify(program: &mut Program, input: &[RawChange], expected: &[RawChange]) {
    let report = program.input_eavs(input).unwrap();
    assert_changes(&outputs(program, &report), expected);
}

/// Run a script of transactions against `program`.
///
/// Transactions are separated by `;` and the changes inside one by `,`,
/// each at the next round; changes at the same round are separated by
/// spaces. `+A` asserts `[A, tag, input]`, `-A` retracts
/// it and `+A:1` also asserts `[A, arg0, 1]`.
pub fn verify_script(program: &mut Program, script: &str, expected: &[Vec<RawChange>]) {
    let transactions: Vec<&str> = script.split(';').map(str::trim).collect();
    assert_eq!(transactions.len(), expected.len(), "one expectation per transaction");
    for (transaction, expected) in transactions.into_iter().zip(expected) {
        let mut input = Vec::new();
        for (round, step) in transaction.split(',').map(str::trim).enumerate() {
            let round = Round::try_from(round).unwrap();
            for item in step.split_whitespace() {
                let (count, rest) = match item.split_at(1) {
                    ("+", rest) => (1, rest),
                    ("-", rest) => (-1, rest),
                    _ => panic!("bad step {item}"),
                };
                let (entity, arg) = match rest.split_once(':') {
                    Some((entity, arg)) => (entity, Some(arg)),
                    None => (rest, None),
                };
                input.push(eavrc(entity, "tag", "input", round, count));
                if let Some(arg) = arg {
                    let arg: RawValue = arg.parse::<f64>().map_or_else(|_| arg.into(), RawValue::from);
                    input.push(eavrc(entity, "arg0", arg, round, count));
                }
            }
        }
        verify(program, &input, expected);
    }
}

