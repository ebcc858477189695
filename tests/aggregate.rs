mod common;

use common::verify;
use factflow::{eav, eavrc, Direction, Program, Reference};

fn person_program(name: &str, body: fn(&mut factflow::Flow<'_>, Reference)) -> Program {
    let mut program = Program::new(name);
    program
        .block(name, |f| {
            let person = f.find(&["person"]);
            body(f, person);
        })
        .unwrap();
    program
}

#[test]
fn count_in_choose() {
    let mut program = Program::new("aggregate");
    program
        .block("count pets or zero", |f| {
            let person = f.find(&["person"]);
            let count = f.choose(|b| {
                b.branch(|f| {
                    let pet = f.attr(person, "pet");
                    f.gather(&[pet]).count()
                })
                .branch(|_| 0);
            });
            f.record_with(&["result"], [("person", person), ("count", count[0])]);
        })
        .unwrap();

    verify(
        &mut program,
        &[eav("A", "tag", "person")],
        &[
            eavrc(1, "tag", "result", 1, 1),
            eavrc(1, "person", "A", 1, 1),
            eavrc(1, "count", 0, 1, 1),
        ],
    );
    verify(
        &mut program,
        &[eav("A", "pet", "B")],
        &[
            eavrc(1, "tag", "result", 1, -1),
            eavrc(1, "person", "A", 1, -1),
            eavrc(1, "count", 0, 1, -1),
            eavrc(2, "tag", "result", 1, 1),
            eavrc(2, "person", "A", 1, 1),
            eavrc(2, "count", 1, 1, 1),
        ],
    );
    verify(
        &mut program,
        &[eav("A", "pet", "C")],
        &[
            eavrc(2, "tag", "result", 1, -1),
            eavrc(2, "person", "A", 1, -1),
            eavrc(2, "count", 1, 1, -1),
            eavrc(3, "tag", "result", 1, 1),
            eavrc(3, "person", "A", 1, 1),
            eavrc(3, "count", 2, 1, 1),
        ],
    );
}

#[test]
fn direction_less_sort() {
    let mut program = person_program("sort by name", |f, person| {
        let name = f.attr(person, "name");
        let pos = f.gather(&[name]).sort(&[]);
        f.add(person, "pos", pos);
    });

    verify(
        &mut program,
        &[eav("A", "tag", "person"), eav("A", "name", "Jane")],
        &[eavrc("A", "pos", 1, 1, 1)],
    );
    verify(
        &mut program,
        &[eav("B", "tag", "person"), eav("B", "name", "Chris")],
        &[
            eavrc("B", "pos", 1, 1, 1),
            eavrc("A", "pos", 1, 1, -1),
            eavrc("A", "pos", 2, 1, 1),
        ],
    );
    verify(
        &mut program,
        &[eav("C", "tag", "person"), eav("C", "name", "Zaria")],
        &[eavrc("C", "pos", 3, 1, 1)],
    );
    verify(
        &mut program,
        &[eavrc("B", "tag", "person", 0, -1), eavrc("B", "name", "Chris", 0, -1)],
        &[
            eavrc("B", "pos", 1, 1, -1),
            eavrc("A", "pos", 1, 1, 1),
            eavrc("A", "pos", 2, 1, -1),
            eavrc("C", "pos", 2, 1, 1),
            eavrc("C", "pos", 3, 1, -1),
        ],
    );
}

#[test]
fn down_sort() {
    let mut program = person_program("sort by name, descending", |f, person| {
        let name = f.attr(person, "name");
        let pos = f.gather(&[name]).sort(&[Direction::Down]);
        f.add(person, "pos", pos);
    });

    verify(
        &mut program,
        &[eav("A", "tag", "person"), eav("A", "name", "Jane")],
        &[eavrc("A", "pos", 1, 1, 1)],
    );
    verify(
        &mut program,
        &[eav("B", "tag", "person"), eav("B", "name", "Chris")],
        &[eavrc("B", "pos", 2, 1, 1)],
    );
    verify(
        &mut program,
        &[eav("C", "tag", "person"), eav("C", "name", "Zaria")],
        &[
            eavrc("C", "pos", 1, 1, 1),
            eavrc("A", "pos", 1, 1, -1),
            eavrc("A", "pos", 2, 1, 1),
            eavrc("B", "pos", 2, 1, -1),
            eavrc("B", "pos", 3, 1, 1),
        ],
    );
    verify(
        &mut program,
        &[eavrc("C", "tag", "person", 0, -1), eavrc("C", "name", "Zaria", 0, -1)],
        &[
            eavrc("C", "pos", 1, 1, -1),
            eavrc("A", "pos", 1, 1, 1),
            eavrc("A", "pos", 2, 1, -1),
            eavrc("B", "pos", 2, 1, 1),
            eavrc("B", "pos", 3, 1, -1),
        ],
    );
}

#[test]
fn multi_direction_sort() {
    let mut program = person_program("sort by name then age", |f, person| {
        let name = f.attr(person, "name");
        let age = f.attr(person, "age");
        let pos = f.gather(&[name, age]).sort(&[Direction::Down, Direction::Up]);
        f.add(person, "pos", pos);
    });

    verify(
        &mut program,
        &[eav("A", "tag", "person"), eav("A", "name", "Jane"), eav("A", "age", 27)],
        &[eavrc("A", "pos", 1, 1, 1)],
    );
    verify(
        &mut program,
        &[eav("B", "tag", "person"), eav("B", "name", "Chris"), eav("B", "age", 25)],
        &[eavrc("B", "pos", 2, 1, 1)],
    );
    verify(
        &mut program,
        &[eav("C", "tag", "person"), eav("C", "name", "Jane"), eav("C", "age", 19)],
        &[
            eavrc("C", "pos", 1, 1, 1),
            eavrc("A", "pos", 1, 1, -1),
            eavrc("A", "pos", 2, 1, 1),
            eavrc("B", "pos", 2, 1, -1),
            eavrc("B", "pos", 3, 1, 1),
        ],
    );
    verify(
        &mut program,
        &[eavrc("C", "tag", "person", 0, -1)],
        &[
            eavrc("C", "pos", 1, 1, -1),
            eavrc("A", "pos", 1, 1, 1),
            eavrc("A", "pos", 2, 1, -1),
            eavrc("B", "pos", 2, 1, 1),
            eavrc("B", "pos", 3, 1, -1),
        ],
    );
}

#[test]
fn sort_with_limit() {
    let mut program = person_program("first two by name", |f, person| {
        let name = f.attr(person, "name");
        let pos = f.gather(&[name, person]).sort(&[]);
        f.lte(pos, 2);
        f.add(person, "pos", pos);
    });

    verify(
        &mut program,
        &[eav("B", "tag", "person"), eav("B", "name", "Jane")],
        &[eavrc("B", "pos", 1, 1, 1)],
    );
    verify(
        &mut program,
        &[eav("A", "tag", "person"), eav("A", "name", "Jane")],
        &[
            eavrc("A", "pos", 1, 1, 1),
            eavrc("B", "pos", 1, 1, -1),
            eavrc("B", "pos", 2, 1, 1),
        ],
    );
    verify(&mut program, &[eav("C", "tag", "person"), eav("C", "name", "Jane")], &[]);
    verify(
        &mut program,
        &[eav("D", "tag", "person"), eav("D", "name", "Chris")],
        &[
            eavrc("A", "pos", 1, 1, -1),
            eavrc("A", "pos", 2, 1, 1),
            eavrc("B", "pos", 2, 1, -1),
            eavrc("D", "pos", 1, 1, 1),
        ],
    );
}

#[test]
fn group_sort() {
    let mut program = person_program("sort by name per age", |f, person| {
        let name = f.attr(person, "name");
        let age = f.attr(person, "age");
        let pos = f.gather(&[name]).per(&[age]).sort(&[Direction::Down]);
        f.add(person, "pos", pos);
    });

    verify(
        &mut program,
        &[eav("A", "tag", "person"), eav("A", "name", "Jane"), eav("A", "age", 27)],
        &[eavrc("A", "pos", 1, 1, 1)],
    );
    verify(
        &mut program,
        &[eav("B", "tag", "person"), eav("B", "name", "Chris"), eav("B", "age", 27)],
        &[eavrc("B", "pos", 2, 1, 1)],
    );
    verify(
        &mut program,
        &[eav("C", "tag", "person"), eav("C", "name", "Zaria"), eav("C", "age", 25)],
        &[eavrc("C", "pos", 1, 1, 1)],
    );
    verify(
        &mut program,
        &[eav("D", "tag", "person"), eav("D", "name", "Dana"), eav("D", "age", 27)],
        &[
            eavrc("D", "pos", 2, 1, 1),
            eavrc("B", "pos", 2, 1, -1),
            eavrc("B", "pos", 3, 1, 1),
        ],
    );
    verify(
        &mut program,
        &[eavrc("C", "tag", "person", 0, -1)],
        &[eavrc("C", "pos", 1, 1, -1)],
    );
}

#[test]
fn sort_tracks_the_highest_value() {
    let mut program = Program::new("aggregate");
    program
        .block("next is the highest node sort plus one", |f| {
            let block = f.find(&["block"]);
            let node = f.attr(block, "node");
            let sort = f.attr(node, "sort");
            let pos = f.gather(&[sort]).per(&[block]).sort(&[Direction::Down]);
            f.gt(2, pos);
            let next = f.plus(sort, 1);
            f.add(block, "next", next);
        })
        .unwrap();

    verify(
        &mut program,
        &[eav(1, "tag", "block"), eav(1, "node", 2), eav(2, "sort", 1)],
        &[eavrc(1, "next", 2, 1, 1)],
    );
    verify(
        &mut program,
        &[eav(1, "node", 3), eav(3, "sort", 2)],
        &[eavrc(1, "next", 3, 1, 1), eavrc(1, "next", 2, 1, -1)],
    );
    verify(
        &mut program,
        &[eav(1, "node", 4), eav(4, "sort", 5)],
        &[eavrc(1, "next", 6, 1, 1), eavrc(1, "next", 3, 1, -1)],
    );
}

#[test]
fn count_in_choose_without_outer_key() {
    let mut program = person_program("count the names of people", |f, person| {
        let next = f.choose(|b| {
            b.branch(|f| {
                let name = f.attr(person, "name");
                f.gather(&[name]).count()
            })
            .branch(|_| "yo yo yo");
        });
        f.add(person, "next", next[0]);
    });

    verify(
        &mut program,
        &[
            eav(1, "tag", "person"),
            eav(1, "name", "chris"),
            eav(1, "name", "christopher"),
            eav(2, "name", "joe"),
        ],
        &[eavrc(1, "next", 2, 1, 1)],
    );
    verify(
        &mut program,
        &[eavrc(1, "tag", "person", 0, -1)],
        &[eavrc(1, "next", 2, 1, -1)],
    );
    verify(
        &mut program,
        &[eavrc(1, "name", "chris", 0, -1), eav(1, "tag", "person")],
        &[eavrc(1, "next", 1, 1, 1)],
    );
    verify(
        &mut program,
        &[eav(1, "name", "chris"), eavrc(1, "tag", "person", 0, -1)],
        &[eavrc(1, "next", 1, 1, -1)],
    );
}

#[test]
fn sum_per_group() {
    let mut program = Program::new("aggregate");
    program
        .block("order totals", |f| {
            let order = f.find(&["order"]);
            let item = f.attr(order, "item");
            let price = f.attr(item, "price");
            let total = f.gather(&[item]).per(&[order]).sum(price);
            f.add(order, "total", total);
        })
        .unwrap();

    verify(
        &mut program,
        &[
            eav("o1", "tag", "order"),
            eav("o1", "item", "i1"),
            eav("o1", "item", "i2"),
            eav("i1", "price", 3),
            eav("i2", "price", 4),
            eav("o2", "tag", "order"),
            eav("o2", "item", "i2"),
        ],
        &[eavrc("o1", "total", 7, 1, 1), eavrc("o2", "total", 4, 1, 1)],
    );
    verify(
        &mut program,
        &[eavrc("o1", "item", "i2", 0, -1)],
        &[eavrc("o1", "total", 7, 1, -1), eavrc("o1", "total", 3, 1, 1)],
    );
}
