mod common;

use common::{verify, verify_script};
use factflow::{eav, eavrc, Program};

fn left_without_right() -> Program {
    let mut program = Program::new("antijoin");
    program
        .block("left records nobody points at", |f| {
            let left = f.find(&["left"]);
            f.not(|f| {
                f.find_with(&["right"], [("left", left)]);
            });
            f.record(&["success"]);
        })
        .unwrap();
    program
}

fn input_without_arg() -> Program {
    let mut program = Program::new("antijoin");
    program
        .block("inputs without an argument", |f| {
            let input = f.find(&["input"]);
            f.not(|f| {
                f.attr(input, "arg0");
            });
            f.record(&["result"]);
        })
        .unwrap();
    program
}

fn input_without_arg_dynamic() -> Program {
    let mut program = Program::new("antijoin");
    program
        .block("inputs without an argument, by input", |f| {
            let input = f.find(&["input"]);
            f.not(|f| {
                f.attr(input, "arg0");
            });
            f.record_with(&["result"], [("output", input)]);
        })
        .unwrap();
    program
}

#[test]
fn simple_left() {
    let mut program = left_without_right();
    verify(&mut program, &[eav(1, "tag", "left")], &[eavrc(2, "tag", "success", 1, 1)]);
}

#[test]
fn simple_right() {
    let mut program = left_without_right();
    verify(&mut program, &[eav(1, "tag", "right")], &[]);
    verify(&mut program, &[eav(1, "left", 2)], &[]);
    verify(&mut program, &[eav(2, "tag", "left")], &[]);
}

#[test]
fn left_then_right() {
    let mut program = left_without_right();
    verify(&mut program, &[eav(2, "tag", "left")], &[eavrc(3, "tag", "success", 1, 1)]);
    verify(
        &mut program,
        &[eav(1, "tag", "right"), eav(1, "left", 2)],
        &[eavrc(3, "tag", "success", 1, -1)],
    );
}

#[test]
fn left_then_right_same_transaction() {
    let mut program = left_without_right();
    verify(
        &mut program,
        &[
            eav(2, "tag", "left"),
            eavrc(1, "tag", "right", 1, 1),
            eavrc(1, "left", 2, 1, 1),
        ],
        &[eavrc(3, "tag", "success", 1, 1), eavrc(3, "tag", "success", 2, -1)],
    );
}

#[test]
fn right_then_left_same_transaction() {
    let mut program = left_without_right();
    verify(
        &mut program,
        &[eav(1, "tag", "right"), eav(1, "left", 2), eavrc(2, "tag", "left", 1, 1)],
        &[],
    );
}

#[test]
fn right_left_unright() {
    let mut program = left_without_right();
    verify(
        &mut program,
        &[
            eav(1, "tag", "right"),
            eav(1, "left", 2),
            eavrc(2, "tag", "left", 1, 1),
            eavrc(1, "tag", "right", 2, -1),
            eavrc(1, "left", 2, 2, -1),
        ],
        &[eavrc(3, "tag", "success", 3, 1)],
    );
}

#[test]
fn right_right_left_unright() {
    let mut program = left_without_right();
    verify(
        &mut program,
        &[
            eav(1, "tag", "right"),
            eav(1, "left", 2),
            eavrc(4, "tag", "right", 5, 1),
            eavrc(4, "left", 2, 5, 1),
        ],
        &[],
    );
    verify(
        &mut program,
        &[
            eavrc(2, "tag", "left", 2, 1),
            eavrc(1, "tag", "right", 3, -1),
            eavrc(1, "left", 2, 3, -1),
        ],
        &[eavrc(3, "tag", "success", 4, 1), eavrc(3, "tag", "success", 6, -1)],
    );
}

#[test]
fn right_unright_right_left() {
    let mut program = left_without_right();
    verify(
        &mut program,
        &[
            eav(1, "tag", "right"),
            eavrc(1, "tag", "right", 3, -1),
            eavrc(4, "tag", "right", 5, 1),
            eav(1, "left", 2),
            eavrc(1, "left", 2, 3, -1),
            eavrc(4, "left", 2, 5, 1),
        ],
        &[],
    );
    verify(
        &mut program,
        &[eav(2, "tag", "left")],
        &[eavrc(3, "tag", "success", 4, 1), eavrc(3, "tag", "success", 6, -1)],
    );
}

#[test]
fn left_right_unright() {
    let mut program = left_without_right();
    verify(
        &mut program,
        &[eav(2, "tag", "left"), eavrc(4, "tag", "right", 5, 1), eavrc(4, "left", 2, 5, 1)],
        &[eavrc(3, "tag", "success", 1, 1), eavrc(3, "tag", "success", 6, -1)],
    );
    verify(
        &mut program,
        &[eavrc(4, "tag", "right", 5, -1), eavrc(4, "left", 2, 5, -1)],
        &[eavrc(3, "tag", "success", 6, 1)],
    );
}

#[test]
fn right_right_left() {
    let mut program = left_without_right();
    verify(
        &mut program,
        &[
            eavrc(1, "tag", "right", 4, 1),
            eavrc(1, "left", 2, 4, 1),
            eavrc(4, "tag", "right", 5, 1),
            eavrc(4, "left", 2, 5, 1),
        ],
        &[],
    );
    verify(
        &mut program,
        &[eav(2, "tag", "left")],
        &[eavrc(3, "tag", "success", 1, 1), eavrc(3, "tag", "success", 5, -1)],
    );
}

#[test]
fn script_assert_retract_assert() {
    let mut program = input_without_arg();
    verify_script(
        &mut program,
        "+A; -A; +A",
        &[
            vec![eavrc(2, "tag", "result", 1, 1)],
            vec![eavrc(2, "tag", "result", 1, -1)],
            vec![eavrc(2, "tag", "result", 1, 1)],
        ],
    );
}

#[test]
fn script_two_inputs() {
    let mut program = input_without_arg();
    verify_script(
        &mut program,
        "+A; +B; -A; -B",
        &[vec![eavrc(2, "tag", "result", 1, 1)], vec![], vec![], vec![eavrc(2, "tag", "result", 1, -1)]],
    );
}

#[test]
fn script_rounds_in_one_transaction() {
    let mut program = input_without_arg();
    verify_script(
        &mut program,
        "+A, -A, +A",
        &[vec![
            eavrc(2, "tag", "result", 1, 1),
            eavrc(2, "tag", "result", 2, -1),
            eavrc(2, "tag", "result", 3, 1),
        ]],
    );

    let mut program = input_without_arg();
    verify_script(
        &mut program,
        "+A, +B, -A, -B",
        &[vec![eavrc(2, "tag", "result", 1, 1), eavrc(2, "tag", "result", 4, -1)]],
    );
}

#[test]
fn script_argument_blocks_result() {
    let mut program = input_without_arg();
    verify_script(
        &mut program,
        "+A; +A:1; -A:1; -A",
        &[
            vec![eavrc(2, "tag", "result", 1, 1)],
            vec![eavrc(2, "tag", "result", 1, -1)],
            vec![eavrc(2, "tag", "result", 1, 1)],
            vec![eavrc(2, "tag", "result", 1, -1)],
        ],
    );

    let mut program = input_without_arg();
    verify_script(
        &mut program,
        "+A; +A:1; +A:2; -A:1; -A:2",
        &[
            vec![eavrc(2, "tag", "result", 1, 1)],
            vec![eavrc(2, "tag", "result", 1, -1)],
            vec![],
            vec![],
            vec![eavrc(2, "tag", "result", 1, 1)],
        ],
    );
}

#[test]
fn script_other_inputs_keep_result() {
    let mut program = input_without_arg();
    verify_script(
        &mut program,
        "+A; +B:1; -A; +C",
        &[
            vec![eavrc(2, "tag", "result", 1, 1)],
            vec![],
            vec![eavrc(2, "tag", "result", 1, -1)],
            vec![eavrc(2, "tag", "result", 1, 1)],
        ],
    );

    let mut program = input_without_arg();
    verify_script(
        &mut program,
        "+A; +B:1; +C; +A:1",
        &[vec![eavrc(2, "tag", "result", 1, 1)], vec![], vec![], vec![]],
    );
}

#[test]
fn script_dynamic_results_per_input() {
    let mut program = input_without_arg_dynamic();
    verify_script(
        &mut program,
        "+A; +B; -A; -B",
        &[
            vec![eavrc(2, "tag", "result", 1, 1), eavrc(2, "output", "A", 1, 1)],
            vec![eavrc(3, "tag", "result", 1, 1), eavrc(3, "output", "B", 1, 1)],
            vec![eavrc(2, "tag", "result", 1, -1), eavrc(2, "output", "A", 1, -1)],
            vec![eavrc(3, "tag", "result", 1, -1), eavrc(3, "output", "B", 1, -1)],
        ],
    );
}

#[test]
fn retraction_restores_index() {
    let mut program = left_without_right();
    program.input_eavs(&[eav(2, "tag", "left")]).unwrap();
    let before = program.facts();

    program.input_eavs(&[eav(1, "tag", "right"), eav(1, "left", 2)]).unwrap();
    assert_eq!(program.facts().len(), before.len() + 1);

    program
        .input_eavs(&[eavrc(1, "tag", "right", 0, -1), eavrc(1, "left", 2, 0, -1)])
        .unwrap();
    assert_eq!(program.facts(), before);
}
