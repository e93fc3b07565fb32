use cinder_ast::{BaseType, IndexTerm, Resource, Symbol, no_span};
use cinder_core::{Binding, Context, ErrorKind};
use proptest::prelude::*;
use proptest::test_runner::{Config, TestCaseError, TestRunner};

#[derive(Clone, Debug)]
enum Op {
    Logical,
    Constraint(i128),
    Resource,
    Use(usize),
    Mark,
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        Just(Op::Logical),
        (-5i128..5).prop_map(Op::Constraint),
        Just(Op::Resource),
        any::<usize>().prop_map(Op::Use),
        Just(Op::Mark),
    ]
}

fn build(ops: &[Op]) -> (Context, Vec<Symbol>) {
    let mut ctx = Context::new();
    let mut resources = Vec::new();
    for op in ops {
        match op {
            Op::Logical => {
                ctx = ctx
                    .add_logical(Symbol::fresh("n"), BaseType::Integer, no_span())
                    .expect("fresh symbol");
            }
            Op::Constraint(k) => {
                let n = IndexTerm::sym(Symbol::fresh("n"), BaseType::Integer);
                ctx = ctx.add_constraint(IndexTerm::le(IndexTerm::int(*k), n));
            }
            Op::Resource => {
                let p = IndexTerm::sym(Symbol::fresh("p"), BaseType::Pointer);
                let (s, next) = ctx.add_resource(Resource::points(p, IndexTerm::int(0), 4));
                resources.push(s);
                ctx = next;
            }
            Op::Use(i) if !resources.is_empty() => {
                let s = &resources[i % resources.len()];
                if let Ok(next) = ctx.use_resource(s, vec![no_span()], no_span()) {
                    ctx = next;
                }
            }
            Op::Use(_) => {}
            Op::Mark => ctx = ctx.mark(),
        }
    }
    (ctx, resources)
}

#[test]
fn consumption_never_shrinks_the_history() {
    let mut runner = TestRunner::new(Config {
        cases: 64,
        ..Config::default()
    });
    runner
        .run(
            &(1usize..8, proptest::collection::vec(any::<usize>(), 0..16)),
            |(count, uses)| {
                let (mut ctx, symbols) = build(&vec![Op::Resource; count]);
                for i in uses {
                    let s = &symbols[i % symbols.len()];
                    let before = ctx.len();
                    if let Ok(next) = ctx.use_resource(s, vec![no_span()], no_span()) {
                        ctx = next;
                    }
                    if ctx.len() < before {
                        return Err(TestCaseError::fail("context shrank"));
                    }
                    match ctx.get(s) {
                        Some(Binding::Resource(_)) | Some(Binding::UsedResource(..)) => {}
                        other => {
                            return Err(TestCaseError::fail(format!(
                                "{s:?} lost its resource: {other:?}"
                            )));
                        }
                    }
                }
                let live = ctx.all_resources().len();
                let used = ctx.all_used_resources().len();
                if live + used != count {
                    return Err(TestCaseError::fail(format!(
                        "{live} live and {used} used out of {count}"
                    )));
                }
                Ok(())
            },
        )
        .expect("property holds");
}

#[test]
fn used_resource_cannot_be_used_again() {
    let (ctx, symbols) = build(&[Op::Resource, Op::Use(0)]);
    let err = ctx
        .use_resource(&symbols[0], vec![no_span()], no_span())
        .expect_err("already used");
    assert!(err.to_string().contains("resource"), "unexpected: {}", err);
}

#[test]
fn merging_a_context_with_itself_changes_nothing() {
    let mut runner = TestRunner::new(Config {
        cases: 64,
        ..Config::default()
    });
    runner
        .run(&proptest::collection::vec(op(), 0..24), |ops| {
            let (ctx, _) = build(&ops);
            let merged = ctx
                .merge(&ctx, no_span())
                .map_err(|e| TestCaseError::fail(e.to_string()))?;
            if merged != ctx {
                return Err(TestCaseError::fail("merge is not idempotent"));
            }
            Ok(())
        })
        .expect("property holds");
}

#[test]
fn merge_joins_consumption_locations() {
    let (ctx, symbols) = build(&[Op::Resource]);
    let here = cinder_ast::span(3, 1);
    let there = cinder_ast::span(9, 1);
    let left = ctx.use_resource(&symbols[0], vec![here], here).expect("live");
    let right = ctx.use_resource(&symbols[0], vec![there], there).expect("live");
    let merged = left.merge(&right, no_span()).expect("same shape");
    let used = merged.all_used_resources();
    assert_eq!(used.len(), 1);
    assert_eq!(used[0].2, vec![here, there]);
}

#[test]
fn live_against_used_does_not_merge() {
    let (ctx, symbols) = build(&[Op::Resource]);
    let used = ctx.use_resource(&symbols[0], vec![no_span()], no_span()).expect("live");
    let err = ctx.merge(&used, no_span()).expect_err("one path consumed it");
    assert!(err.is_fatal(), "unexpected: {}", err);
}

#[test]
fn differing_live_resources_do_not_merge() {
    let s = Symbol::fresh("r");
    let p = IndexTerm::sym(Symbol::fresh("p"), BaseType::Pointer);
    let v = IndexTerm::sym(Symbol::fresh("v"), BaseType::Integer);
    let bind = |pointee: IndexTerm| {
        Context::new()
            .add(s.clone(), Binding::Resource(Resource::points(p.clone(), pointee, 4)), no_span())
            .expect("fresh symbol")
    };
    // Would unify with `v := 1`, but the two paths must agree exactly.
    let left = bind(IndexTerm::int(1));
    let right = bind(v);
    let err = left.merge(&right, no_span()).expect_err("resource differs");
    assert!(
        matches!(err.kind, ErrorKind::IncompatibleEnvironments { .. }),
        "unexpected: {}",
        err
    );
    assert!(err.is_fatal());
}
