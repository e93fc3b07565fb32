use cinder_ast::{BaseType, IndexTerm, Symbol};
use cinder_verify::{Prover, SimpleProver, SmtProfile};
use proptest::{
    prelude::any,
    test_runner::{Config, TestCaseError, TestRunner},
};

fn var(name: &str, bt: BaseType) -> IndexTerm {
    IndexTerm::sym(Symbol::fresh(name), bt)
}

#[test]
fn linear_facts_fix_sums_and_differences() {
    let mut runner = TestRunner::new(Config {
        cases: 64,
        ..Config::default()
    });
    let strat = (any::<i32>(), any::<i32>());

    runner
        .run(&strat, |(a, b)| {
            let (a, b) = (i128::from(a), i128::from(b));
            let x = var("x", BaseType::Integer);
            let y = var("y", BaseType::Integer);
            let facts = [
                IndexTerm::eq(x.clone(), IndexTerm::int(a)),
                IndexTerm::eq(y.clone(), IndexTerm::int(b)),
            ];
            let mut prover = SimpleProver::from_profile(SmtProfile::Fast);
            let sum = IndexTerm::eq(IndexTerm::add(x.clone(), y.clone()), IndexTerm::int(a + b));
            let wrong = IndexTerm::eq(IndexTerm::sub(x, y), IndexTerm::int(a - b + 1));
            if !prover.entails(&facts, &sum) {
                return Err(TestCaseError::fail(format!("x + y = {} not proved", a + b)));
            }
            if prover.entails(&facts, &wrong) {
                return Err(TestCaseError::fail("proved a false difference".to_string()));
            }
            Ok(())
        })
        .expect("property holds");
}

#[test]
fn array_contents_updated_by_map_set_are_readable() {
    let m = var("xs", BaseType::map(BaseType::Integer));
    let i = var("i", BaseType::Integer);
    let v = var("v", BaseType::Integer);
    let j = var("j", BaseType::Integer);
    let updated = IndexTerm::map_set(m.clone(), i.clone(), v.clone());
    let mut prover = SimpleProver::default();

    let read_back = IndexTerm::eq(IndexTerm::map_get(updated.clone(), i.clone()), v.clone());
    assert!(prover.entails(&[], &read_back));

    // Same index reached through an equality.
    let facts = [IndexTerm::eq(j.clone(), i)];
    let via_alias = IndexTerm::eq(IndexTerm::map_get(updated, j), v);
    assert!(prover.entails(&facts, &via_alias));
}

#[test]
fn pointer_offsets_are_plain_integers() {
    let p = var("p", BaseType::Pointer);
    let q = var("q", BaseType::Pointer);
    let facts = [IndexTerm::eq(q.clone(), IndexTerm::ptr_add(p.clone(), IndexTerm::int(4)))];
    let goal = IndexTerm::eq(
        IndexTerm::ptr_add(q, IndexTerm::int(4)),
        IndexTerm::array_shift(p, 4, IndexTerm::int(2)),
    );
    let mut prover = SimpleProver::default();
    assert!(prover.entails(&facts, &goal));
}

#[test]
fn opaque_equalities_are_symmetric() {
    let a = var("a", BaseType::Datatype("tree".into()));
    let b = var("b", BaseType::Datatype("tree".into()));
    let mut prover = SimpleProver::default();
    let facts = [IndexTerm::eq(a.clone(), b.clone())];
    assert!(prover.entails(&facts, &IndexTerm::eq(b.clone(), a.clone())));
    assert!(prover.unsatisfiable(&[
        IndexTerm::eq(a.clone(), b.clone()),
        IndexTerm::ne(b, a),
    ]));
}
