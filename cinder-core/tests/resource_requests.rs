use cinder_ast::{BaseType, BlockKind, IndexTerm, Resource, Symbol, no_span};
use cinder_core::{Checker, CheckerConfig, Context, ErrorKind, Global, Requested, Solver};
use cinder_verify::SimpleProver;

fn pointer(name: &str) -> IndexTerm {
    IndexTerm::sym(Symbol::fresh(name), BaseType::Pointer)
}

fn value(name: &str) -> IndexTerm {
    IndexTerm::sym(Symbol::fresh(name), BaseType::Integer)
}

fn contents(name: &str) -> IndexTerm {
    IndexTerm::sym(Symbol::fresh(name), BaseType::map(BaseType::Integer))
}

fn array(pointer: IndexTerm, length: i128, content: IndexTerm) -> Resource {
    Resource::Array {
        pointer,
        element_size: 4,
        length: IndexTerm::int(length),
        content,
    }
}

fn found(requested: Requested) -> (Resource, Context) {
    match requested {
        Requested::Found(r, ctx) => (r, ctx),
        Requested::NeedsPacking { name, .. } => panic!("unexpected packing request for {name}"),
    }
}

#[test]
fn points_request_needs_the_exact_size() {
    let global = Global::new();
    let config = CheckerConfig::default();
    let mut prover = SimpleProver::default();
    let mut checker = Checker::new(&global, &mut prover, &config);

    let p = pointer("p");
    let v = value("v");
    let (_, ctx) = Context::new().add_resource(Resource::points(p.clone(), v.clone(), 4));

    for size in [3, 5] {
        let err = checker
            .request(&ctx, &Resource::points(p.clone(), value("w"), size), no_span())
            .expect_err("size differs");
        assert!(matches!(err.kind, ErrorKind::ResourceMismatch { .. }), "unexpected: {}", err);
    }

    let (r, after) = found(
        checker
            .request(&ctx, &Resource::points(p.clone(), value("w"), 4), no_span())
            .expect("same size"),
    );
    assert_eq!(r, Resource::points(p, v, 4));
    assert!(after.all_resources().is_empty());
    assert_eq!(after.all_used_resources().len(), 1);
}

#[test]
fn array_request_leaves_the_tail_owned() {
    let global = Global::new();
    let config = CheckerConfig::default();
    let mut prover = SimpleProver::default();
    let mut checker = Checker::new(&global, &mut prover, &config);

    let p = pointer("p");
    let xs = contents("xs");
    let (_, ctx) = Context::new().add_resource(array(p.clone(), 10, xs.clone()));

    let (r, ctx) = found(
        checker
            .request(&ctx, &array(p.clone(), 3, contents("ys")), no_span())
            .expect("prefix is owned"),
    );
    let Resource::Array { content, .. } = r else {
        panic!("array expected, got {r}");
    };
    assert_eq!(content, xs);

    let live = ctx.all_resources();
    assert_eq!(live.len(), 1);
    let Resource::Array {
        pointer: rest,
        element_size,
        length,
        ..
    } = &live[0].1
    else {
        panic!("residual array expected, got {}", live[0].1);
    };
    assert_eq!(*element_size, 4);
    assert_eq!(rest, &IndexTerm::array_shift(p.clone(), 4, IndexTerm::int(3)));

    let (_, ctx) = found(
        checker
            .request(&ctx, &array(rest.clone(), 7, contents("zs")), no_span())
            .expect("remaining seven elements"),
    );
    assert!(ctx.all_resources().is_empty());
    drop(checker);
    assert!(prover.holds(&Context::new(), &IndexTerm::eq(length.clone(), IndexTerm::int(7))));
}

#[test]
fn array_request_absorbs_one_adjacent_cell() {
    let global = Global::new();
    let config = CheckerConfig::default();
    let mut prover = SimpleProver::default();
    let mut checker = Checker::new(&global, &mut prover, &config);

    let p = pointer("p");
    let v = value("v");
    let xs = contents("xs");
    let (_, ctx) = Context::new().add_resource(array(p.clone(), 2, xs.clone()));
    let (_, ctx) = ctx.add_resource(Resource::points(
        IndexTerm::array_shift(p.clone(), 4, IndexTerm::int(2)),
        v.clone(),
        4,
    ));

    let (r, ctx) = found(
        checker
            .request(&ctx, &array(p, 3, contents("ys")), no_span())
            .expect("array grows by the cell after it"),
    );
    let Resource::Array { content, .. } = r else {
        panic!("array expected, got {r}");
    };
    assert_eq!(content, IndexTerm::map_set(xs, IndexTerm::int(2), v));
    assert!(ctx.all_resources().is_empty());
}

#[test]
fn array_request_beyond_what_is_owned_is_unsupported() {
    let global = Global::new();
    let config = CheckerConfig::default();
    let mut prover = SimpleProver::default();
    let mut checker = Checker::new(&global, &mut prover, &config);

    let p = pointer("p");
    let (_, ctx) = Context::new().add_resource(array(p.clone(), 2, contents("xs")));
    let err = checker
        .request(&ctx, &array(p, 5, contents("ys")), no_span())
        .expect_err("three elements short");
    assert!(matches!(err.kind, ErrorKind::Unsupported { .. }), "unexpected: {}", err);
}

#[test]
fn empty_array_needs_no_ownership() {
    let global = Global::new();
    let config = CheckerConfig::default();
    let mut prover = SimpleProver::default();
    let mut checker = Checker::new(&global, &mut prover, &config);

    let ctx = Context::new();
    let (_, after) = found(
        checker
            .request(&ctx, &array(pointer("p"), 0, contents("ys")), no_span())
            .expect("nothing to own"),
    );
    assert!(after.all_used_resources().is_empty());
}

#[test]
fn region_is_consumed_piecewise() {
    let global = Global::new();
    let config = CheckerConfig::default();
    let mut prover = SimpleProver::default();
    let mut checker = Checker::new(&global, &mut prover, &config);

    let p = pointer("p");
    let (_, ctx) = Context::new().add_resource(Resource::region(p.clone(), IndexTerm::int(12)));

    let ctx = checker
        .ownership_request(&ctx, &p, &IndexTerm::int(5), no_span())
        .expect("first five bytes");
    assert_eq!(ctx.all_resources().len(), 1);

    let rest = IndexTerm::ptr_add(p.clone(), IndexTerm::int(5));
    let ctx = checker
        .ownership_request(&ctx, &rest, &IndexTerm::int(7), no_span())
        .expect("remaining seven bytes");
    assert!(ctx.all_resources().is_empty());
    assert_eq!(ctx.all_used_resources().len(), 2);

    let err = checker
        .ownership_request(&ctx, &p, &IndexTerm::int(1), no_span())
        .expect_err("all of it is gone");
    assert!(matches!(err.kind, ErrorKind::MissingOwnership { .. }), "unexpected: {}", err);
}

#[test]
fn block_cannot_stand_in_for_points() {
    let global = Global::new();
    let config = CheckerConfig::default();
    let mut prover = SimpleProver::default();
    let mut checker = Checker::new(&global, &mut prover, &config);

    let p = pointer("p");
    let (_, ctx) = Context::new().add_resource(Resource::block(p.clone(), 4, BlockKind::Uninit));
    let err = checker
        .request(&ctx, &Resource::points(p, value("v"), 4), no_span())
        .expect_err("nothing was written");
    assert!(matches!(err.kind, ErrorKind::ResourceMismatch { .. }), "unexpected: {}", err);
}
