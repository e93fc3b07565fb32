#![cfg(feature = "z3")]

use cinder_ast::{BaseType, IndexTerm, Symbol};
use cinder_verify::{Prover, SmtProfile, Z3Prover};

#[test]
fn z3_agrees_with_linear_reasoning() {
    let x = IndexTerm::sym(Symbol::fresh("x"), BaseType::Integer);
    let mut prover = Z3Prover::new(SmtProfile::Ci);
    let facts = [IndexTerm::ge(x.clone(), IndexTerm::int(0))];
    assert!(prover.entails(
        &facts,
        &IndexTerm::gt(IndexTerm::add(x.clone(), IndexTerm::int(1)), IndexTerm::int(0)),
    ));
    assert!(!prover.entails(&facts, &IndexTerm::gt(x, IndexTerm::int(0))));
}

#[test]
fn z3_treats_unknown_sorts_as_opaque() {
    let l = IndexTerm::sym(Symbol::fresh("l"), BaseType::list(BaseType::Integer));
    let head = IndexTerm::head(l);
    let mut prover = Z3Prover::new(SmtProfile::Fast);
    let facts = [IndexTerm::eq(head.clone(), IndexTerm::int(3))];
    assert!(prover.entails(&facts, &IndexTerm::lt(head, IndexTerm::int(4))));
}
