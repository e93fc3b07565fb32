#![forbid(unsafe_code)]

//! Spine judgment and the backtracking driver for predicate packing.
//!
//! A spine consumes a telescope against actual arguments: computational
//! formals are matched positionally, logical formals become unification
//! slots, resources are requested in order (binding slots from their
//! outputs), and constraints are proved last.
//!
//! A resource request that misses a predicate turns into a choice among the
//! predicate's pack clauses. Each clause runs as a nested spine on top of
//! the suspended one. The driver below keeps the suspended machines on an
//! explicit stack and tries alternatives depth-first in clause order, so the
//! recursion between packing and spine checking never touches the native
//! call stack.

use cinder_ast::{IndexTerm, Resource, Sort, Span, Subst, Symbol, Tail, Telescope};
use tracing::{debug, trace};

use crate::check::Checker;
use crate::context::Context;
use crate::error::{ErrorKind, TypeError};
use crate::resources::Requested;
use crate::solver::Solver;

/// State of one telescope being consumed.
#[derive(Clone, Debug)]
struct SpineFrame {
    resources: Vec<Resource>,
    constraints: Vec<IndexTerm>,
    /// Logical formals not yet bound by a resource output.
    slots: Vec<(Symbol, Sort)>,
    resolved: Subst,
    /// Output equalities that mentioned unresolved slots when unified.
    deferred: Vec<IndexTerm>,
    tail: Tail,
}

impl SpineFrame {
    fn is_slot(&self, s: &Symbol) -> bool {
        self.slots.iter().any(|(x, _)| x == s)
    }

    fn first_unresolved_in(&self, t: &IndexTerm) -> Option<&Symbol> {
        self.slots.iter().map(|(x, _)| x).find(|x| t.mentions(x))
    }

    fn bind(&mut self, slot: &Symbol, value: IndexTerm) {
        self.slots.retain(|(x, _)| x != slot);
        let mut s = Subst::new();
        s.insert(slot.clone(), value);
        self.resources = self.resources.iter().map(|r| r.subst(&s)).collect();
        self.constraints = self.constraints.iter().map(|c| c.subst(&s)).collect();
        self.deferred = self.deferred.iter().map(|c| c.subst(&s)).collect();
        self.tail = self.tail.subst(&s);
        for v in self.resolved.values_mut() {
            *v = v.subst(&s);
        }
        self.resolved.extend(s);
    }
}

#[derive(Clone, Debug)]
enum Completion {
    /// The spine the caller asked for.
    Caller,
    /// A pack clause; on success the predicate instance joins the context.
    Pack { name: String, iargs: Vec<IndexTerm> },
}

#[derive(Clone, Debug)]
struct Frame {
    spine: SpineFrame,
    completion: Completion,
}

/// A suspended search state: the context and the stack of open spines.
#[derive(Clone, Debug)]
struct Machine {
    ctx: Context,
    frames: Vec<Frame>,
}

impl Machine {
    fn pack_depth(&self) -> usize {
        self.frames
            .iter()
            .filter(|f| matches!(f.completion, Completion::Pack { .. }))
            .count()
    }
}

/// Alternative waiting on the backtracking stack. The clause spine is only
/// built when the alternative is tried.
struct PackAlternative {
    base: Machine,
    name: String,
    iargs: Vec<IndexTerm>,
    clause: Telescope,
}

enum Step {
    Continue(Machine),
    Done(Tail, Context),
    Choose {
        base: Machine,
        wanted: Resource,
        name: String,
        iargs: Vec<IndexTerm>,
        clauses: Vec<Telescope>,
    },
}

fn unsat(lc: &IndexTerm, ctx: &Context, span: Span) -> TypeError {
    TypeError::new(
        ErrorKind::UnsatConstraint {
            constraint: lc.to_string(),
        },
        span,
    )
    .explained(ctx)
}

fn unconstrained(slot: &Symbol, span: Span) -> TypeError {
    TypeError::new(
        ErrorKind::UnconstrainedLogicalVariable {
            name: slot.to_string(),
        },
        span,
    )
}

fn missing_resource(r: &Resource, ctx: &Context, span: Span) -> TypeError {
    TypeError::new(
        ErrorKind::MissingResource {
            resource: r.to_string(),
        },
        span,
    )
    .explained(ctx)
}

impl<S: Solver + ?Sized> Checker<'_, S> {
    /// Check `args` against `telescope` and return its tail, with every
    /// logical formal replaced by what the resources determined.
    pub fn spine(
        &mut self,
        ctx: &Context,
        args: &[IndexTerm],
        telescope: &Telescope,
        span: Span,
    ) -> Result<(Tail, Context), TypeError> {
        let first = self.open_spine(args, telescope, span)?;
        let mut current = Some(Machine {
            ctx: ctx.clone(),
            frames: vec![Frame {
                spine: first,
                completion: Completion::Caller,
            }],
        });
        let mut pending: Vec<PackAlternative> = Vec::new();
        // Outermost predicate that needed packing, reported once every
        // alternative has failed.
        let mut root_choice: Option<TypeError> = None;
        // Most telling failure among the alternatives tried so far.
        let mut last_error: Option<TypeError> = None;

        loop {
            let machine = match current.take() {
                Some(m) => m,
                None => {
                    let Some(alt) = pending.pop() else {
                        return Err(exhausted(root_choice, last_error, span));
                    };
                    trace!(predicate = %alt.name, remaining = pending.len(), "trying pack clause");
                    match self.open_spine(&alt.iargs, &alt.clause, span) {
                        Ok(spine) => {
                            let mut m = alt.base;
                            m.frames.push(Frame {
                                spine,
                                completion: Completion::Pack {
                                    name: alt.name,
                                    iargs: alt.iargs,
                                },
                            });
                            m
                        }
                        Err(e) if e.is_fatal() => return Err(e),
                        Err(e) => {
                            remember(&mut last_error, e);
                            continue;
                        }
                    }
                }
            };

            match self.step(machine, span) {
                Ok(Step::Continue(m)) => current = Some(m),
                Ok(Step::Done(tail, ctx)) => return Ok((tail, ctx)),
                Ok(Step::Choose {
                    base,
                    wanted,
                    name,
                    iargs,
                    clauses,
                }) => {
                    if root_choice.is_none() {
                        root_choice = Some(missing_resource(&wanted, &base.ctx, span));
                    }
                    for clause in clauses.into_iter().rev() {
                        pending.push(PackAlternative {
                            base: base.clone(),
                            name: name.clone(),
                            iargs: iargs.clone(),
                            clause,
                        });
                    }
                }
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    trace!(error = %e, "alternative failed");
                    remember(&mut last_error, e);
                }
            }
        }
    }

    fn open_spine(
        &mut self,
        args: &[IndexTerm],
        telescope: &Telescope,
        span: Span,
    ) -> Result<SpineFrame, TypeError> {
        if args.len() != telescope.computational.len() {
            return Err(TypeError::new(
                ErrorKind::NumberArguments {
                    expected: telescope.computational.len(),
                    found: args.len(),
                },
                span,
            ));
        }
        let telescope = telescope.freshen();
        let mut formals = Subst::new();
        for ((x, bt), arg) in telescope.computational.iter().zip(args) {
            if arg.bt() != bt {
                return Err(TypeError::new(
                    ErrorKind::Mismatch {
                        expected: bt.clone(),
                        found: arg.bt().clone(),
                    },
                    span,
                ));
            }
            formals.insert(x.clone(), arg.clone());
        }
        let telescope = telescope.subst(&formals);
        Ok(SpineFrame {
            resources: telescope.resources,
            constraints: telescope.constraints,
            slots: telescope.logical,
            resolved: Subst::new(),
            deferred: Vec::new(),
            tail: telescope.tail,
        })
    }

    fn step(&mut self, mut m: Machine, span: Span) -> Result<Step, TypeError> {
        let depth = m.pack_depth();
        let Some(top) = m.frames.last_mut() else {
            return Err(TypeError::internal("spine machine without frames", span));
        };

        if let Some(wanted) = top.spine.resources.first().cloned() {
            for input in wanted.inputs() {
                if let Some(slot) = top.spine.first_unresolved_in(input) {
                    return Err(unconstrained(slot, span));
                }
            }
            return match self.request(&m.ctx, &wanted, span)? {
                Requested::Found(actual, ctx) => {
                    top.spine.resources.remove(0);
                    self.unify(&ctx, &mut top.spine, &wanted, &actual, span)?;
                    m.ctx = ctx;
                    Ok(Step::Continue(m))
                }
                Requested::NeedsPacking { name, iargs } => {
                    if depth >= self.config.max_pack_depth {
                        debug!(predicate = %name, depth, "pack depth limit reached");
                        return Err(missing_resource(&wanted, &m.ctx, span));
                    }
                    let def = self.global.get_predicate(&name, span)?;
                    if def.pack.is_empty() {
                        return Err(missing_resource(&wanted, &m.ctx, span));
                    }
                    Ok(Step::Choose {
                        clauses: def.pack.clone(),
                        base: m,
                        wanted,
                        name,
                        iargs,
                    })
                }
            };
        }

        if let Some((slot, _)) = top.spine.slots.first() {
            return Err(unconstrained(slot, span));
        }
        for lc in top.spine.deferred.iter().chain(&top.spine.constraints) {
            if !self.holds(&m.ctx, lc) {
                return Err(unsat(lc, &m.ctx, span));
            }
        }

        let Some(done) = m.frames.pop() else {
            return Err(TypeError::internal("spine machine without frames", span));
        };
        match done.completion {
            Completion::Caller => Ok(Step::Done(done.spine.tail, m.ctx)),
            Completion::Pack { name, iargs } => {
                let Tail::Outputs(oargs) = done.spine.tail else {
                    return Err(TypeError::internal(
                        format!("pack clause of {name} does not end in its outputs"),
                        span,
                    ));
                };
                let packed = Resource::Predicate { name, iargs, oargs };
                debug!(resource = %packed, "packed");
                m.ctx = m.ctx.add_resource(packed).1;
                Ok(Step::Continue(m))
            }
        }
    }

    /// Match the outputs of a formal resource against the found one,
    /// binding slots where the formal is a bare slot.
    fn unify(
        &mut self,
        ctx: &Context,
        frame: &mut SpineFrame,
        formal: &Resource,
        actual: &Resource,
        span: Span,
    ) -> Result<(), TypeError> {
        let formal_outputs: Vec<IndexTerm> = formal.outputs().into_iter().cloned().collect();
        let actual_outputs: Vec<IndexTerm> = actual.outputs().into_iter().cloned().collect();
        if formal_outputs.len() != actual_outputs.len() {
            return Err(TypeError::new(
                ErrorKind::ResourceMismatch {
                    expected: formal.to_string(),
                    found: actual.to_string(),
                },
                span,
            ));
        }
        for (f, a) in formal_outputs.into_iter().zip(actual_outputs) {
            let f = f.subst(&frame.resolved);
            if let Some(x) = f.as_sym().filter(|x| frame.is_slot(x)).cloned() {
                if f.bt() != a.bt() {
                    return Err(TypeError::new(
                        ErrorKind::Mismatch {
                            expected: f.bt().clone(),
                            found: a.bt().clone(),
                        },
                        span,
                    ));
                }
                trace!(slot = %x, value = %a, "slot resolved");
                frame.bind(&x, a);
            } else if frame.first_unresolved_in(&f).is_some() {
                frame.deferred.push(IndexTerm::eq(f, a));
            } else if !self.provably_equal(ctx, &f, &a) {
                return Err(TypeError::new(
                    ErrorKind::ResourceMismatch {
                        expected: formal.subst(&frame.resolved).to_string(),
                        found: actual.to_string(),
                    },
                    span,
                )
                .explained(ctx));
            }
        }
        Ok(())
    }
}

/// A failure that more packing could repair never displaces one that it
/// could not.
fn remember(slot: &mut Option<TypeError>, e: TypeError) {
    if slot.as_ref().is_none_or(|last| last.kind.is_missing()) {
        *slot = Some(e);
    }
}

fn exhausted(root_choice: Option<TypeError>, last_error: Option<TypeError>, span: Span) -> TypeError {
    match (root_choice, last_error) {
        (Some(mut root), Some(last)) => {
            let hint = format!("packing failed with: {}", last.kind);
            if let Some(e) = root.explanation.take() {
                let e = (*e).hint(hint);
                root.help = Some(e.render());
                root.explanation = Some(Box::new(e));
            }
            root
        }
        (Some(root), None) => root,
        (None, Some(last)) => last,
        (None, None) => TypeError::internal("spine search ended without a result", span),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CheckerConfig;
    use crate::global::Global;
    use cinder_ast::{BaseType, PredicateDef, ReturnType, no_span};
    use cinder_verify::SimpleProver;

    fn sym(name: &str, bt: BaseType) -> (Symbol, IndexTerm) {
        let s = Symbol::fresh(name);
        (s.clone(), IndexTerm::sym(s, bt))
    }

    /// `owned(p) -> (v)`: packed from `Points{p, v, 4}` with `v >= 0`.
    fn owned_predicate() -> PredicateDef {
        let (p, pt) = sym("p", BaseType::Pointer);
        let (v, vt) = sym("v", BaseType::Integer);
        let pack = Telescope::new(Tail::Outputs(vec![vt.clone()]))
            .arg(p.clone(), BaseType::Pointer)
            .logical(v.clone(), BaseType::Integer)
            .resource(Resource::points(pt.clone(), vt.clone(), 4))
            .constraint(IndexTerm::ge(vt.clone(), IndexTerm::int(0)));
        let (p2, pt2) = sym("p", BaseType::Pointer);
        let (v2, vt2) = sym("v", BaseType::Integer);
        let unpack = Telescope::new(Tail::NoReturn)
            .arg(p2, BaseType::Pointer)
            .arg(v2, BaseType::Integer)
            .resource(Resource::points(pt2, vt2.clone(), 4))
            .constraint(IndexTerm::ge(vt2, IndexTerm::int(0)));
        PredicateDef {
            name: "owned".into(),
            iargs: vec![BaseType::Pointer],
            oargs: vec![BaseType::Integer],
            pack: vec![pack],
            unpack: vec![unpack],
        }
    }

    #[test]
    fn slots_are_bound_from_resource_outputs() {
        let global = Global::new();
        let config = CheckerConfig::default();
        let mut prover = SimpleProver::default();
        let mut checker = Checker::new(&global, &mut prover, &config);

        let (_, p) = sym("p", BaseType::Pointer);
        let (_, v) = sym("v", BaseType::Integer);
        let ctx = Context::new().add_constraint(IndexTerm::eq(v.clone(), IndexTerm::int(7)));
        let (_, ctx) = ctx.add_resource(Resource::points(p.clone(), v.clone(), 4));

        let (q, qt) = sym("q", BaseType::Pointer);
        let (x, xt) = sym("x", BaseType::Integer);
        let ret = Symbol::fresh("ret");
        let t = Telescope::returning(
            ReturnType::new(ret, BaseType::Integer).constraint(IndexTerm::eq(xt.clone(), xt.clone())),
        )
        .arg(q, BaseType::Pointer)
        .logical(x, BaseType::Integer)
        .resource(Resource::points(qt, xt.clone(), 4))
        .constraint(IndexTerm::gt(xt, IndexTerm::int(0)));

        let (tail, after) = checker.spine(&ctx, &[p], &t, no_span()).expect("spine succeeds");
        let Tail::Return(rt) = tail else {
            panic!("expected a return type");
        };
        assert_eq!(rt.constraints[0], IndexTerm::eq(v.clone(), v));
        assert!(after.all_resources().is_empty());
    }

    #[test]
    fn wrong_arity_is_reported() {
        let global = Global::new();
        let config = CheckerConfig::default();
        let mut prover = SimpleProver::default();
        let mut checker = Checker::new(&global, &mut prover, &config);
        let t = Telescope::new(Tail::NoReturn).arg(Symbol::fresh("x"), BaseType::Integer);
        let err = checker
            .spine(&Context::new(), &[], &t, no_span())
            .expect_err("arity");
        assert!(matches!(err.kind, ErrorKind::NumberArguments { expected: 1, found: 0 }), "unexpected: {}", err);
    }

    #[test]
    fn predicate_is_packed_on_demand() {
        let global = Global::new().with_predicate(owned_predicate());
        let config = CheckerConfig::default();
        let mut prover = SimpleProver::default();
        let mut checker = Checker::new(&global, &mut prover, &config);

        let (_, p) = sym("p", BaseType::Pointer);
        let (_, v) = sym("v", BaseType::Integer);
        let ctx = Context::new().add_constraint(IndexTerm::eq(v.clone(), IndexTerm::int(3)));
        let (_, ctx) = ctx.add_resource(Resource::points(p.clone(), v.clone(), 4));

        let (q, qt) = sym("q", BaseType::Pointer);
        let (o, ot) = sym("o", BaseType::Integer);
        let t = Telescope::new(Tail::NoReturn)
            .arg(q, BaseType::Pointer)
            .logical(o, BaseType::Integer)
            .resource(Resource::Predicate {
                name: "owned".into(),
                iargs: vec![qt],
                oargs: vec![ot.clone()],
            })
            .constraint(IndexTerm::eq(ot, IndexTerm::int(3)));

        let (_, after) = checker.spine(&ctx, &[p], &t, no_span()).expect("packs");
        assert!(after.all_resources().is_empty());
        assert_eq!(after.all_used_resources().len(), 2);
    }

    #[test]
    fn failed_packing_reports_missing_predicate() {
        let global = Global::new().with_predicate(owned_predicate());
        let config = CheckerConfig::default();
        let mut prover = SimpleProver::default();
        let mut checker = Checker::new(&global, &mut prover, &config);

        let (_, p) = sym("p", BaseType::Pointer);
        let (q, qt) = sym("q", BaseType::Pointer);
        let (o, ot) = sym("o", BaseType::Integer);
        let t = Telescope::new(Tail::NoReturn)
            .arg(q, BaseType::Pointer)
            .logical(o, BaseType::Integer)
            .resource(Resource::Predicate {
                name: "owned".into(),
                iargs: vec![qt],
                oargs: vec![ot],
            });
        let err = checker
            .spine(&Context::new(), &[p], &t, no_span())
            .expect_err("nothing to pack from");
        assert!(matches!(err.kind, ErrorKind::MissingResource { .. }), "unexpected: {}", err);
        let explanation = err.explanation.expect("explained");
        assert!(explanation.hints.iter().any(|h| h.contains("missing ownership")));
    }
}
