mod common;

use common::verify;
use factflow::{eav, eavrc, Program};

#[test]
fn equality_chain_in_any_order() {
    let mut program = Program::new("unify");
    program
        .block("tagged a, b and c", |f| {
            let a = f.find(&["a"]);
            let b = f.find(&["b"]);
            let c = f.find(&["c"]);
            f.eq(a, b);
            f.eq(c, a);
            f.add(a, "abc", "yes");
        })
        .unwrap();

    verify(
        &mut program,
        &[
            eav(1, "tag", "a"),
            eav(1, "tag", "b"),
            eav(1, "tag", "c"),
            eav(2, "tag", "a"),
            eav(2, "tag", "c"),
        ],
        &[eavrc(1, "abc", "yes", 1, 1)],
    );
}

#[test]
fn attribute_chain_in_any_order() {
    let mut program = Program::new("unify");
    program
        .block("people sharing a name", |f| {
            let p = f.find(&["person"]);
            let q = f.find(&["person"]);
            let r = f.find(&["person"]);
            let p_name = f.attr(p, "name");
            let q_name = f.attr(q, "name");
            let r_name = f.attr(r, "name");
            f.eq(p_name, q_name);
            f.eq(r_name, p_name);
            f.add(p, "shares", r);
        })
        .unwrap();

    verify(
        &mut program,
        &[
            eav("A", "tag", "person"),
            eav("A", "name", "joe"),
            eav("B", "tag", "person"),
            eav("B", "name", "joe"),
            eav("C", "tag", "person"),
            eav("C", "name", "ann"),
        ],
        &[
            eavrc("A", "shares", "A", 1, 1),
            eavrc("A", "shares", "B", 1, 1),
            eavrc("B", "shares", "A", 1, 1),
            eavrc("B", "shares", "B", 1, 1),
            eavrc("C", "shares", "C", 1, 1),
        ],
    );
}

#[test]
fn sibling_nots_keep_their_own_registers() {
    let mut program = Program::new("scopes");
    program
        .block("people without pets", |f| {
            let person = f.find(&["person"]);
            f.not(|f| {
                f.find_with(&["dog"], [("owner", person)]);
            });
            f.not(|f| {
                f.find_with(&["cat"], [("owner", person)]);
            });
            f.add(person, "petless", "yes");
        })
        .unwrap();

    verify(
        &mut program,
        &[
            eav("A", "tag", "person"),
            eav("B", "tag", "person"),
            eav("C", "tag", "person"),
            eav("D", "tag", "dog"),
            eav("D", "owner", "A"),
            eav("E", "tag", "cat"),
            eav("E", "owner", "B"),
        ],
        &[eavrc("C", "petless", "yes", 1, 1)],
    );
    verify(
        &mut program,
        &[eavrc("D", "tag", "dog", 0, -1)],
        &[eavrc("A", "petless", "yes", 1, 1)],
    );
}

#[test]
fn union_branches_keep_their_own_registers() {
    let mut program = Program::new("scopes");
    program
        .block("pets by name", |f| {
            let person = f.find(&["person"]);
            let pet = f.union(|b| {
                b.branch(|f| {
                    let dog = f.find_with(&["dog"], [("owner", person)]);
                    f.attr(dog, "name")
                })
                .branch(|f| {
                    let cat = f.find_with(&["cat"], [("owner", person)]);
                    f.attr(cat, "name")
                });
            });
            f.add(person, "pet", pet[0]);
        })
        .unwrap();

    verify(
        &mut program,
        &[
            eav("A", "tag", "person"),
            eav("B", "tag", "person"),
            eav("D", "tag", "dog"),
            eav("D", "owner", "A"),
            eav("D", "name", "rex"),
            eav("T", "tag", "cat"),
            eav("T", "owner", "A"),
            eav("T", "name", "tom"),
            eav("K", "tag", "cat"),
            eav("K", "owner", "B"),
            eav("K", "name", "kit"),
        ],
        &[
            eavrc("A", "pet", "rex", 1, 1),
            eavrc("A", "pet", "tom", 1, 1),
            eavrc("B", "pet", "kit", 1, 1),
        ],
    );
}
