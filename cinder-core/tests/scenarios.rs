use cinder_ast::{
    Access, Action, BaseType, Binop, Expr, ExprKind, FunctionSpec, GlobalDecl, IndexTerm,
    LabelDef, MemType, PExpr, Pattern, PredicateDef, Resource, ReturnType, Symbol, Tail,
    Telescope,
};
use cinder_core::{
    Checker, CheckerConfig, Context, ErrorKind, Fallible, Global, OwnershipHistory,
    check_function, check_procedure,
};
use cinder_verify::SimpleProver;
use tracing_subscriber::EnvFilter;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn var(s: &Symbol, bt: BaseType) -> IndexTerm {
    IndexTerm::sym(s.clone(), bt)
}

fn ret_int() -> (Symbol, IndexTerm) {
    let r = Symbol::fresh("ret");
    let t = var(&r, BaseType::Integer);
    (r, t)
}

fn load(pointer: PExpr) -> Expr {
    Expr::action(Action::Load {
        ty: MemType::int(4),
        pointer,
    })
}

fn store(pointer: PExpr, value: PExpr) -> Expr {
    Expr::action(Action::Store {
        ty: MemType::int(4),
        pointer,
        value,
    })
}

fn ret(pe: PExpr) -> Expr {
    Expr::new(ExprKind::Return(pe))
}

#[test]
fn increment_meets_its_postcondition() {
    init_tracing();
    let x = Symbol::fresh("x");
    let (r, rt) = ret_int();
    let xt = var(&x, BaseType::Integer);
    let spec = FunctionSpec::new(
        Telescope::returning(
            ReturnType::new(r, BaseType::Integer)
                .constraint(IndexTerm::eq(rt, IndexTerm::add(xt.clone(), IndexTerm::int(1)))),
        )
        .arg(x.clone(), BaseType::Integer)
        .constraint(IndexTerm::ge(xt, IndexTerm::int(0))),
    );
    let body = PExpr::binop(Binop::Add, PExpr::sym(&x), PExpr::int(1));

    let mut prover = SimpleProver::default();
    check_function(&Global::new(), &mut prover, &CheckerConfig::default(), &spec, &body)
        .expect("x + 1 is x + 1");
}

#[test]
fn wrong_result_is_an_unsatisfied_constraint() {
    let x = Symbol::fresh("x");
    let (r, rt) = ret_int();
    let xt = var(&x, BaseType::Integer);
    let spec = FunctionSpec::new(
        Telescope::returning(
            ReturnType::new(r, BaseType::Integer)
                .constraint(IndexTerm::eq(rt, IndexTerm::add(xt, IndexTerm::int(1)))),
        )
        .arg(x.clone(), BaseType::Integer),
    );
    let body = PExpr::binop(Binop::Add, PExpr::sym(&x), PExpr::int(2));

    let mut prover = SimpleProver::default();
    let err = check_function(&Global::new(), &mut prover, &CheckerConfig::default(), &spec, &body)
        .expect_err("x + 2 is not x + 1");
    assert!(matches!(err.kind, ErrorKind::UnsatConstraint { .. }), "unexpected: {}", err);
    assert!(err.explanation.is_some());
}

#[test]
fn load_without_ownership_is_rejected() {
    init_tracing();
    let p = Symbol::fresh("p");
    let (r, _) = ret_int();
    let spec = FunctionSpec::new(
        Telescope::returning(ReturnType::new(r, BaseType::Integer)).arg(p.clone(), BaseType::Pointer),
    );
    let body = load(PExpr::sym(&p));

    let mut prover = SimpleProver::default();
    let err = check_procedure(&Global::new(), &mut prover, &CheckerConfig::default(), &spec, &body, &[])
        .expect_err("nothing owns p");
    assert!(
        matches!(
            err.kind,
            ErrorKind::MissingOwnership {
                history: OwnershipHistory::NeverOwned,
                ..
            }
        ),
        "unexpected: {}",
        err
    );
}

#[test]
fn call_requiring_ownership_fails_without_it() {
    let q = Symbol::fresh("q");
    let v = Symbol::fresh("v");
    let callee = Symbol::fresh("read_cell");
    let (r, _) = ret_int();
    let callee_spec = FunctionSpec::new(
        Telescope::returning(
            ReturnType::new(r, BaseType::Integer).resource(Resource::points(
                var(&q, BaseType::Pointer),
                var(&v, BaseType::Integer),
                4,
            )),
        )
        .arg(q.clone(), BaseType::Pointer)
        .logical(v.clone(), BaseType::Integer)
        .resource(Resource::points(var(&q, BaseType::Pointer), var(&v, BaseType::Integer), 4)),
    );
    let global = Global::new().with_function(callee.clone(), callee_spec);

    let p = Symbol::fresh("p");
    let (r2, _) = ret_int();
    let spec = FunctionSpec::new(
        Telescope::returning(ReturnType::new(r2, BaseType::Integer)).arg(p.clone(), BaseType::Pointer),
    );
    let body = Expr::new(ExprKind::Call {
        func: callee,
        args: vec![PExpr::sym(&p)],
    });

    let mut prover = SimpleProver::default();
    let err = check_procedure(&global, &mut prover, &CheckerConfig::default(), &spec, &body, &[])
        .expect_err("caller does not own p");
    assert!(matches!(err.kind, ErrorKind::MissingOwnership { .. }), "unexpected: {}", err);
}

#[test]
fn branches_join_into_a_disjunctive_result() {
    let c = Symbol::fresh("c");
    let ctx = Context::new()
        .add_logical(c.clone(), BaseType::Bool, cinder_ast::no_span())
        .expect("bind c");
    let body = PExpr::if_(PExpr::sym(&c), PExpr::int(1), PExpr::int(2));

    let global = Global::new();
    let config = CheckerConfig::default();
    let mut prover = SimpleProver::default();
    let mut checker = Checker::new(&global, &mut prover, &config);
    let Fallible::Normal((value, after)) = checker.infer_pexpr(&ctx, &body).expect("infers") else {
        panic!("both branches reach their end");
    };
    assert_eq!(value.bt(), &BaseType::Integer);
    assert!(after.all_resources().is_empty());
    let constraints = after.all_constraints();
    assert_eq!(constraints.len(), 1);
    assert_eq!(constraints[0].to_string(), "(c && (ret = 1)) || (!c && (ret = 2))");
}

#[test]
fn branching_function_meets_disjunctive_postcondition() {
    let c = Symbol::fresh("c");
    let (r, rt) = ret_int();
    let ct = var(&c, BaseType::Bool);
    let post = IndexTerm::or(vec![
        IndexTerm::and(vec![ct.clone(), IndexTerm::eq(rt.clone(), IndexTerm::int(1))]),
        IndexTerm::and(vec![IndexTerm::not(ct), IndexTerm::eq(rt, IndexTerm::int(2))]),
    ]);
    let spec = FunctionSpec::new(
        Telescope::returning(ReturnType::new(r, BaseType::Integer).constraint(post))
            .arg(c.clone(), BaseType::Bool),
    );
    let body = PExpr::if_(PExpr::sym(&c), PExpr::int(1), PExpr::int(2));

    let mut prover = SimpleProver::default();
    check_function(&Global::new(), &mut prover, &CheckerConfig::default(), &spec, &body)
        .expect("each branch returns what the postcondition says");
}

#[test]
fn unconsumed_precondition_is_unused() {
    let p = Symbol::fresh("p");
    let v = Symbol::fresh("v");
    let spec = FunctionSpec::new(
        Telescope::returning(ReturnType::new(Symbol::fresh("ret"), BaseType::Unit))
            .arg(p.clone(), BaseType::Pointer)
            .logical(v.clone(), BaseType::Integer)
            .resource(Resource::points(var(&p, BaseType::Pointer), var(&v, BaseType::Integer), 4)),
    );

    let mut prover = SimpleProver::default();
    let err = check_function(&Global::new(), &mut prover, &CheckerConfig::default(), &spec, &PExpr::unit())
        .expect_err("p is leaked");
    assert!(matches!(err.kind, ErrorKind::UnusedResource { .. }), "unexpected: {}", err);
}

#[test]
fn allocate_write_read_free() {
    init_tracing();
    let p = Symbol::fresh("p");
    let x = Symbol::fresh("x");
    let (r, rt) = ret_int();
    let spec = FunctionSpec::new(Telescope::returning(
        ReturnType::new(r, BaseType::Integer).constraint(IndexTerm::eq(rt, IndexTerm::int(5))),
    ));
    let body = Expr::let_(
        Pattern::bind(p.clone()),
        Expr::action(Action::Create { ty: MemType::int(4) }),
        Expr::seq(
            store(PExpr::sym(&p), PExpr::int(5)),
            Expr::let_(
                Pattern::bind(x.clone()),
                load(PExpr::sym(&p)),
                Expr::seq(
                    Expr::action(Action::Kill {
                        ty: MemType::int(4),
                        pointer: PExpr::sym(&p),
                    }),
                    ret(PExpr::sym(&x)),
                ),
            ),
        ),
    );

    let mut prover = SimpleProver::default();
    check_procedure(&Global::new(), &mut prover, &CheckerConfig::default(), &spec, &body, &[])
        .expect("allocation is used exactly once");
}

#[test]
fn read_after_free_reports_where_it_went() {
    let p = Symbol::fresh("p");
    let spec = FunctionSpec::new(Telescope::returning(ReturnType::new(
        Symbol::fresh("ret"),
        BaseType::Integer,
    )));
    let kill_span = cinder_ast::span(40, 7);
    let body = Expr::let_(
        Pattern::bind(p.clone()),
        Expr::action(Action::Create { ty: MemType::int(4) }),
        Expr::seq(
            Expr::action(Action::Kill {
                ty: MemType::int(4),
                pointer: PExpr::sym(&p),
            })
            .at(kill_span),
            load(PExpr::sym(&p)),
        ),
    );

    let mut prover = SimpleProver::default();
    let err = check_procedure(&Global::new(), &mut prover, &CheckerConfig::default(), &spec, &body, &[])
        .expect_err("p was freed");
    match err.kind {
        ErrorKind::MissingOwnership {
            history: OwnershipHistory::UsedAt(spans),
            ..
        } => assert_eq!(spans, vec![kill_span]),
        other => panic!("unexpected: {other}"),
    }
}

#[test]
fn uninitialised_allocation_cannot_be_read() {
    let p = Symbol::fresh("p");
    let spec = FunctionSpec::new(Telescope::returning(ReturnType::new(
        Symbol::fresh("ret"),
        BaseType::Integer,
    )));
    let body = Expr::let_(
        Pattern::bind(p.clone()),
        Expr::action(Action::Create { ty: MemType::int(4) }),
        load(PExpr::sym(&p)),
    );
    let mut prover = SimpleProver::default();
    let err = check_procedure(&Global::new(), &mut prover, &CheckerConfig::default(), &spec, &body, &[])
        .expect_err("never written");
    assert!(matches!(err.kind, ErrorKind::UninitialisedRead { .. }), "unexpected: {}", err);
}

fn counter_global() -> (Symbol, Global) {
    let g = Symbol::fresh("counter");
    let global = Global::new().with_global(GlobalDecl {
        address: g.clone(),
        ty: MemType::int(4),
    });
    (g, global)
}

#[test]
fn accesses_clause_grants_ownership_of_the_global() {
    let (g, global) = counter_global();
    let old = Symbol::fresh("old");
    let new = Symbol::fresh("new");
    let x = Symbol::fresh("x");
    let spec = FunctionSpec::new(Telescope::returning(
        ReturnType::new(Symbol::fresh("ret"), BaseType::Unit).constraint(IndexTerm::eq(
            var(&new, BaseType::Integer),
            IndexTerm::add(var(&old, BaseType::Integer), IndexTerm::int(1)),
        )),
    ))
    .accesses(Access {
        global: g.clone(),
        pre_value: old,
        post_value: new,
    });
    let body = Expr::let_(
        Pattern::bind(x.clone()),
        load(PExpr::sym(&g)),
        Expr::seq(
            store(
                PExpr::sym(&g),
                PExpr::binop(Binop::Add, PExpr::sym(&x), PExpr::int(1)),
            ),
            ret(PExpr::unit()),
        ),
    );

    let mut prover = SimpleProver::default();
    check_procedure(&global, &mut prover, &CheckerConfig::default(), &spec, &body, &[])
        .expect("counter is incremented");
}

#[test]
fn global_without_accesses_clause_is_not_owned() {
    let (g, global) = counter_global();
    let spec = FunctionSpec::new(Telescope::returning(ReturnType::new(
        Symbol::fresh("ret"),
        BaseType::Integer,
    )));
    let body = load(PExpr::sym(&g));

    let mut prover = SimpleProver::default();
    let err = check_procedure(&global, &mut prover, &CheckerConfig::default(), &spec, &body, &[])
        .expect_err("no accesses clause");
    assert!(matches!(err.kind, ErrorKind::MissingGlobalOwnership { .. }), "unexpected: {}", err);
}

#[test]
fn jump_to_label_hands_over_the_arguments() {
    let n = Symbol::fresh("n");
    let done = Symbol::fresh("done");
    let (r, rt) = ret_int();
    let spec = FunctionSpec::new(Telescope::returning(
        ReturnType::new(r, BaseType::Integer).constraint(IndexTerm::eq(rt, IndexTerm::int(3))),
    ));
    let label = LabelDef {
        name: done.clone(),
        telescope: Telescope::new(Tail::NoReturn)
            .arg(n.clone(), BaseType::Integer)
            .constraint(IndexTerm::eq(var(&n, BaseType::Integer), IndexTerm::int(3))),
        body: ret(PExpr::sym(&n)),
    };
    let body = Expr::new(ExprKind::Run {
        label: done,
        args: vec![PExpr::int(3)],
    });

    let mut prover = SimpleProver::default();
    check_procedure(&Global::new(), &mut prover, &CheckerConfig::default(), &spec, &body, &[label])
        .expect("label returns 3");
}

#[test]
fn jump_keeping_resources_is_rejected() {
    let done = Symbol::fresh("done");
    let p = Symbol::fresh("p");
    let spec = FunctionSpec::new(Telescope::returning(ReturnType::new(
        Symbol::fresh("ret"),
        BaseType::Unit,
    )));
    let label = LabelDef {
        name: done.clone(),
        telescope: Telescope::new(Tail::NoReturn),
        body: ret(PExpr::unit()),
    };
    let body = Expr::let_(
        Pattern::bind(p),
        Expr::action(Action::Create { ty: MemType::int(4) }),
        Expr::new(ExprKind::Run {
            label: done,
            args: vec![],
        }),
    );

    let mut prover = SimpleProver::default();
    let err = check_procedure(&Global::new(), &mut prover, &CheckerConfig::default(), &spec, &body, &[label])
        .expect_err("allocation is dropped on the jump");
    assert!(matches!(err.kind, ErrorKind::UnusedResource { .. }), "unexpected: {}", err);
}

/// `cell(p) -> (v)`: a 4-byte cell holding a non-negative value.
fn cell_predicate() -> PredicateDef {
    let p = Symbol::fresh("p");
    let v = Symbol::fresh("v");
    let pack = Telescope::new(Tail::Outputs(vec![var(&v, BaseType::Integer)]))
        .arg(p.clone(), BaseType::Pointer)
        .logical(v.clone(), BaseType::Integer)
        .resource(Resource::points(var(&p, BaseType::Pointer), var(&v, BaseType::Integer), 4))
        .constraint(IndexTerm::ge(var(&v, BaseType::Integer), IndexTerm::int(0)));
    let p2 = Symbol::fresh("p");
    let v2 = Symbol::fresh("v");
    let unpack = Telescope::new(Tail::NoReturn)
        .arg(p2.clone(), BaseType::Pointer)
        .arg(v2.clone(), BaseType::Integer)
        .resource(Resource::points(var(&p2, BaseType::Pointer), var(&v2, BaseType::Integer), 4))
        .constraint(IndexTerm::ge(var(&v2, BaseType::Integer), IndexTerm::int(0)));
    PredicateDef {
        name: "cell".into(),
        iargs: vec![BaseType::Pointer],
        oargs: vec![BaseType::Integer],
        pack: vec![pack],
        unpack: vec![unpack],
    }
}

#[test]
fn predicate_is_unpacked_for_a_load_and_packed_on_return() {
    init_tracing();
    let global = Global::new().with_predicate(cell_predicate());
    let p = Symbol::fresh("p");
    let v = Symbol::fresh("v");
    let w = Symbol::fresh("w");
    let (r, rt) = ret_int();
    let pt = var(&p, BaseType::Pointer);
    let spec = FunctionSpec::new(
        Telescope::returning(
            ReturnType::new(r, BaseType::Integer)
                .logical(w.clone(), BaseType::Integer)
                .resource(Resource::Predicate {
                    name: "cell".into(),
                    iargs: vec![pt.clone()],
                    oargs: vec![var(&w, BaseType::Integer)],
                })
                .constraint(IndexTerm::eq(rt.clone(), var(&v, BaseType::Integer)))
                .constraint(IndexTerm::ge(rt, IndexTerm::int(0))),
        )
        .arg(p.clone(), BaseType::Pointer)
        .logical(v.clone(), BaseType::Integer)
        .resource(Resource::Predicate {
            name: "cell".into(),
            iargs: vec![pt],
            oargs: vec![var(&v, BaseType::Integer)],
        }),
    );
    let x = Symbol::fresh("x");
    let body = Expr::let_(Pattern::bind(x.clone()), load(PExpr::sym(&p)), ret(PExpr::sym(&x)));

    let mut prover = SimpleProver::default();
    check_procedure(&global, &mut prover, &CheckerConfig::default(), &spec, &body, &[])
        .expect("cell is read and handed back");
}

#[test]
fn packing_is_bounded_by_configured_depth() {
    let global = Global::new().with_predicate(cell_predicate());
    let p = Symbol::fresh("p");
    let v = Symbol::fresh("v");
    let w = Symbol::fresh("w");
    let pt = var(&p, BaseType::Pointer);
    let spec = FunctionSpec::new(
        Telescope::returning(ReturnType::new(Symbol::fresh("ret"), BaseType::Unit)
            .logical(w.clone(), BaseType::Integer)
            .resource(Resource::Predicate {
                name: "cell".into(),
                iargs: vec![pt.clone()],
                oargs: vec![var(&w, BaseType::Integer)],
            }))
        .arg(p.clone(), BaseType::Pointer)
        .logical(v.clone(), BaseType::Integer)
        .resource(Resource::points(pt, var(&v, BaseType::Integer), 4))
        .constraint(IndexTerm::le(IndexTerm::int(0), var(&v, BaseType::Integer))),
    );
    let body = ret(PExpr::unit());

    let mut prover = SimpleProver::default();
    check_procedure(&global, &mut prover, &CheckerConfig::default(), &spec, &body, &[])
        .expect("points is packed into a cell");

    let no_packing = CheckerConfig {
        max_pack_depth: 0,
        ..CheckerConfig::default()
    };
    let err = check_procedure(&global, &mut prover, &no_packing, &spec, &body, &[])
        .expect_err("packing disabled");
    assert!(matches!(err.kind, ErrorKind::MissingResource { .. }), "unexpected: {}", err);
}
