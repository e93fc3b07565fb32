#![forbid(unsafe_code)]

//! Inference over pure and impure expressions, and the public checking
//! entry points.

use std::collections::HashMap;

use cinder_ast::{
    Action, BaseType, Binop, Ctor, Expr, ExprKind, FunctionSpec, IndexTerm, LabelDef, Lit,
    PExpr, PExprKind, Pattern, ReturnType, Span, Subst, Symbol, Tail, Telescope,
};
use tracing::{debug, instrument};

use crate::config::CheckerConfig;
use crate::context::{Binding, Context};
use crate::error::{ErrorKind, TypeError};
use crate::global::Global;
use crate::merge::{Fallible, merge_paths, merge_return_paths};
use crate::solver::Solver;

/// Value of an expression and the context after evaluating it.
pub type Inferred = Fallible<(IndexTerm, Context)>;

macro_rules! reach {
    ($e:expr) => {
        match $e {
            Fallible::Normal(x) => x,
            Fallible::Unreachable => return Ok(Fallible::Unreachable),
        }
    };
}

/// The checker: declarations, a solver and configuration, all borrowed.
pub struct Checker<'a, S: Solver + ?Sized> {
    pub(crate) global: &'a Global,
    pub(crate) solver: &'a mut S,
    pub(crate) config: &'a CheckerConfig,
}

/// What `return` and `run` refer to inside a procedure body.
#[derive(Clone, Debug, Default)]
struct Scope {
    ret: Option<ReturnType>,
    labels: HashMap<Symbol, Telescope>,
}

/// How a branch is entered.
enum Entry<'p> {
    Guard(IndexTerm),
    Pattern(&'p Pattern),
}

fn expect_bt(t: &IndexTerm, expected: &BaseType, span: Span) -> Result<(), TypeError> {
    if t.bt() == expected {
        Ok(())
    } else {
        Err(TypeError::new(
            ErrorKind::Mismatch {
                expected: expected.clone(),
                found: t.bt().clone(),
            },
            span,
        ))
    }
}

fn expect_return(tail: Tail, span: Span) -> Result<ReturnType, TypeError> {
    match tail {
        Tail::Return(rt) => Ok(rt),
        _ => Err(TypeError::internal("function specification has no return type", span)),
    }
}

fn ensure_no_leftovers(ctx: &Context, span: Span) -> Result<(), TypeError> {
    match ctx.all_resources().first() {
        Some((_, r)) => Err(TypeError::new(
            ErrorKind::UnusedResource {
                resource: r.to_string(),
            },
            span,
        )
        .explained(ctx)),
        None => Ok(()),
    }
}

impl<'a, S: Solver + ?Sized> Checker<'a, S> {
    pub fn new(global: &'a Global, solver: &'a mut S, config: &'a CheckerConfig) -> Self {
        Self {
            global,
            solver,
            config,
        }
    }

    /// Check a function whose body is a pure expression.
    #[instrument(skip_all, fields(params = spec.telescope.computational.len()))]
    pub fn check_function(&mut self, spec: &FunctionSpec, body: &PExpr) -> Result<(), TypeError> {
        debug!("checking function");
        let span = body.span;
        let (ctx, rt) = self.enter(spec, span)?;
        match self.infer_pexpr(&ctx, body)? {
            Fallible::Normal((value, ctx)) => self.check_return(&ctx, &value, &rt, span),
            Fallible::Unreachable => Ok(()),
        }
    }

    /// Check a procedure body and each of its labels.
    #[instrument(skip_all, fields(labels = labels.len()))]
    pub fn check_procedure(
        &mut self,
        spec: &FunctionSpec,
        body: &Expr,
        labels: &[LabelDef],
    ) -> Result<(), TypeError> {
        debug!("checking procedure");
        let (ctx, rt) = self.enter(spec, body.span)?;
        let scope = Scope {
            ret: Some(rt.clone()),
            labels: labels
                .iter()
                .map(|l| (l.name.clone(), l.telescope.clone()))
                .collect(),
        };
        for label in labels {
            debug!(label = %label.name, "checking label");
            let (entry, _) = self.bind_telescope(&ctx.pure_part(), &label.telescope, label.body.span)?;
            self.run_to_end(&entry, &label.body, &scope, &rt)?;
        }
        self.run_to_end(&ctx, body, &scope, &rt)
    }

    fn run_to_end(
        &mut self,
        ctx: &Context,
        body: &Expr,
        scope: &Scope,
        rt: &ReturnType,
    ) -> Result<(), TypeError> {
        match self.infer_expr(ctx, body, scope)? {
            Fallible::Normal((value, ctx)) => self.check_return(&ctx, &value, rt, body.span),
            Fallible::Unreachable => Ok(()),
        }
    }

    fn enter(&mut self, spec: &FunctionSpec, span: Span) -> Result<(Context, ReturnType), TypeError> {
        let telescope = self.global.effective_telescope(spec, span)?;
        let start = self.initial_context(span)?;
        let (ctx, tail) = self.bind_telescope(&start, &telescope, span)?;
        Ok((ctx, expect_return(tail, span)?))
    }

    /// Global addresses, bound as non-null pointers.
    fn initial_context(&mut self, span: Span) -> Result<Context, TypeError> {
        let mut ctx = Context::new();
        for g in self.global.globals() {
            ctx = ctx
                .add_logical(g.address.clone(), BaseType::Pointer, span)?
                .add_constraint(IndexTerm::ne(
                    IndexTerm::sym(g.address.clone(), BaseType::Pointer),
                    IndexTerm::null(),
                ));
        }
        Ok(ctx)
    }

    /// Assume a telescope: arguments become program variables, the rest is
    /// added to the context as given.
    fn bind_telescope(
        &mut self,
        ctx: &Context,
        telescope: &Telescope,
        span: Span,
    ) -> Result<(Context, Tail), TypeError> {
        let mut ctx = ctx.clone();
        let mut aliases = Subst::new();
        for (x, bt) in &telescope.computational {
            let v = x.fresh_like();
            ctx = ctx
                .add_logical(v.clone(), bt.clone(), span)?
                .add_computational(x.clone(), v.clone(), bt.clone(), span)?;
            aliases.insert(x.clone(), IndexTerm::sym(v, bt.clone()));
        }
        let telescope = telescope.subst(&aliases);
        let ctx = self.produce(
            &ctx,
            &telescope.logical,
            &telescope.resources,
            &telescope.constraints,
            span,
        )?;
        Ok((ctx, telescope.tail))
    }

    /// `value` has the return type `rt`, and nothing else is left owned.
    pub fn check_return(
        &mut self,
        ctx: &Context,
        value: &IndexTerm,
        rt: &ReturnType,
        span: Span,
    ) -> Result<(), TypeError> {
        let expected = Telescope {
            computational: vec![rt.ret.clone()],
            logical: rt.logical.clone(),
            resources: rt.resources.clone(),
            constraints: rt.constraints.clone(),
            tail: Tail::NoReturn,
        };
        let (_, ctx) = self.spine(ctx, std::slice::from_ref(value), &expected, span)?;
        ensure_no_leftovers(&ctx, span)
    }

    /// Unreachable when the context is contradictory.
    pub fn false_if_unreachable(&mut self, ctx: Context) -> Fallible<Context> {
        if self.is_inconsistent(&ctx) {
            Fallible::Unreachable
        } else {
            Fallible::Normal(ctx)
        }
    }

    fn infer_pexprs(
        &mut self,
        ctx: &Context,
        items: &[PExpr],
    ) -> Result<Fallible<(Vec<IndexTerm>, Context)>, TypeError> {
        let mut ctx = ctx.clone();
        let mut values = Vec::with_capacity(items.len());
        for item in items {
            let (v, next) = reach!(self.infer_pexpr(&ctx, item)?);
            values.push(v);
            ctx = next;
        }
        Ok(Fallible::Normal((values, ctx)))
    }

    fn undefined(&mut self, ctx: &Context, what: String, span: Span) -> Result<Inferred, TypeError> {
        if self.is_inconsistent(ctx) {
            return Ok(Fallible::Unreachable);
        }
        Err(TypeError::new(ErrorKind::UndefinedBehaviour { what }, span).explained(ctx))
    }

    pub fn infer_pexpr(&mut self, ctx: &Context, pe: &PExpr) -> Result<Inferred, TypeError> {
        let span = pe.span;
        let done = |v: IndexTerm, ctx: Context| Ok(Fallible::Normal((v, ctx)));
        match &pe.kind {
            PExprKind::Sym(x) => {
                let v = match ctx.lookup(x, span)? {
                    Binding::Computational { logical, bt } => IndexTerm::sym(logical.clone(), bt.clone()),
                    Binding::Logical(sort) => IndexTerm::sym(x.clone(), sort.clone()),
                    other => {
                        return Err(TypeError::new(
                            ErrorKind::KindMismatch {
                                name: x.to_string(),
                                expected: "computational variable",
                                found: other.kind_name(),
                            },
                            span,
                        ));
                    }
                };
                done(v, ctx.clone())
            }
            PExprKind::Lit(lit) => {
                let v = match lit {
                    Lit::Unit => IndexTerm::unit(),
                    Lit::Bool(b) => IndexTerm::boolean(*b),
                    Lit::Int(n) => IndexTerm::int(*n),
                    Lit::Null => IndexTerm::null(),
                };
                done(v, ctx.clone())
            }
            PExprKind::Ctor { ctor, args } => {
                let (values, ctx) = reach!(self.infer_pexprs(ctx, args)?);
                let v = self.construct(ctor, values, span)?;
                done(v, ctx)
            }
            PExprKind::Binop { op, left, right } => {
                let (a, ctx) = reach!(self.infer_pexpr(ctx, left)?);
                let (b, ctx) = reach!(self.infer_pexpr(&ctx, right)?);
                self.binop(&ctx, *op, a, b, span)
            }
            PExprKind::Not(inner) => {
                let (a, ctx) = reach!(self.infer_pexpr(ctx, inner)?);
                expect_bt(&a, &BaseType::Bool, span)?;
                done(IndexTerm::not(a), ctx)
            }
            PExprKind::ArrayShift {
                base,
                elem_size,
                index,
            } => {
                let (b, ctx) = reach!(self.infer_pexpr(ctx, base)?);
                let (i, ctx) = reach!(self.infer_pexpr(&ctx, index)?);
                expect_bt(&b, &BaseType::Pointer, span)?;
                expect_bt(&i, &BaseType::Integer, span)?;
                done(IndexTerm::array_shift(b, *elem_size, i), ctx)
            }
            PExprKind::MemberShift { base, tag, member } => {
                let (b, ctx) = reach!(self.infer_pexpr(ctx, base)?);
                expect_bt(&b, &BaseType::Pointer, span)?;
                let layout = self.global.get_struct(tag, span)?;
                let (offset, _) = layout.member(member).ok_or_else(|| {
                    TypeError::new(
                        ErrorKind::UnboundName {
                            name: format!("{tag}.{member}"),
                        },
                        span,
                    )
                })?;
                done(IndexTerm::ptr_add(b, IndexTerm::int(i128::from(offset))), ctx)
            }
            PExprKind::StructMember { value, member } => {
                let (v, ctx) = reach!(self.infer_pexpr(ctx, value)?);
                let BaseType::Struct(tag) = v.bt() else {
                    return Err(TypeError::new(
                        ErrorKind::Mismatch {
                            expected: BaseType::Struct(String::new()),
                            found: v.bt().clone(),
                        },
                        span,
                    ));
                };
                let layout = self.global.get_struct(tag, span)?;
                let (_, mty) = layout.member(member).ok_or_else(|| {
                    TypeError::new(
                        ErrorKind::UnboundName {
                            name: format!("{tag}.{member}"),
                        },
                        span,
                    )
                })?;
                let bt = mty.bt.clone();
                done(IndexTerm::struct_member(v, member.clone(), bt), ctx)
            }
            PExprKind::Let { pat, value, body } => {
                let (v, ctx) = reach!(self.infer_pexpr(ctx, value)?);
                let (ctx, _) = self.match_pattern(&ctx, &v, pat)?;
                self.infer_pexpr(&ctx, body)
            }
            PExprKind::If {
                cond,
                then_branch,
                else_branch,
            } => {
                let (c, ctx) = reach!(self.infer_pexpr(ctx, cond)?);
                expect_bt(&c, &BaseType::Bool, span)?;
                let arms = [
                    (Entry::Guard(c.clone()), then_branch.as_ref()),
                    (Entry::Guard(IndexTerm::not(c)), else_branch.as_ref()),
                ];
                self.infer_branches(&ctx, None, arms, span, |this, ctx, e| this.infer_pexpr(ctx, e))
            }
            PExprKind::Case { scrutinee, arms } => {
                let (v, ctx) = reach!(self.infer_pexpr(ctx, scrutinee)?);
                let arms = arms.iter().map(|(p, e)| (Entry::Pattern(p), e));
                self.infer_branches(&ctx, Some(&v), arms, span, |this, ctx, e| this.infer_pexpr(ctx, e))
            }
            PExprKind::Undef(what) => self.undefined(ctx, what.clone(), span),
            PExprKind::Error(message) => self.undefined(ctx, format!("reachable error: {message}"), span),
        }
    }

    fn construct(&mut self, ctor: &Ctor, mut values: Vec<IndexTerm>, span: Span) -> Result<IndexTerm, TypeError> {
        let arity = |expected: usize, found: usize| {
            if expected == found {
                Ok(())
            } else {
                Err(TypeError::new(ErrorKind::NumberArguments { expected, found }, span))
            }
        };
        match ctor {
            Ctor::Nil(bt) => {
                arity(0, values.len())?;
                Ok(IndexTerm::nil(bt.clone()))
            }
            Ctor::Cons => {
                arity(2, values.len())?;
                let tail = values.pop().ok_or_else(|| TypeError::internal("cons tail", span))?;
                let head = values.pop().ok_or_else(|| TypeError::internal("cons head", span))?;
                expect_bt(&tail, &BaseType::list(head.bt().clone()), span)?;
                Ok(IndexTerm::cons(head, tail))
            }
            Ctor::Tuple => Ok(IndexTerm::tuple(values)),
            Ctor::Struct { tag, members } => {
                arity(members.len(), values.len())?;
                let layout = self.global.get_struct(tag, span)?;
                let mut fields = Vec::with_capacity(members.len());
                for (m, v) in members.iter().zip(values) {
                    let (_, mty) = layout.member(m).ok_or_else(|| {
                        TypeError::new(
                            ErrorKind::UnboundName {
                                name: format!("{tag}.{m}"),
                            },
                            span,
                        )
                    })?;
                    expect_bt(&v, &mty.bt, span)?;
                    fields.push((m.clone(), v));
                }
                Ok(IndexTerm::struct_lit(tag.clone(), fields))
            }
            Ctor::Specified => {
                arity(1, values.len())?;
                values.pop().ok_or_else(|| TypeError::internal("specified value", span))
            }
            Ctor::Array(_) => Err(TypeError::unsupported("array values", span)),
        }
    }

    fn binop(
        &mut self,
        ctx: &Context,
        op: Binop,
        a: IndexTerm,
        b: IndexTerm,
        span: Span,
    ) -> Result<Inferred, TypeError> {
        let int = BaseType::Integer;
        let v = match op {
            Binop::Add | Binop::Sub | Binop::Mul | Binop::Div | Binop::Rem => {
                expect_bt(&a, &int, span)?;
                expect_bt(&b, &int, span)?;
                if matches!(op, Binop::Div | Binop::Rem)
                    && !self.holds(ctx, &IndexTerm::ne(b.clone(), IndexTerm::int(0)))
                {
                    return self.undefined(ctx, format!("division by {b}, which may be zero"), span);
                }
                match op {
                    Binop::Add => IndexTerm::add(a, b),
                    Binop::Sub => IndexTerm::sub(a, b),
                    Binop::Mul => IndexTerm::mul(a, b),
                    Binop::Div => IndexTerm::div(a, b),
                    _ => IndexTerm::rem(a, b),
                }
            }
            Binop::Lt | Binop::Le | Binop::Gt | Binop::Ge => {
                if !a.bt().is_arithmetic() {
                    expect_bt(&a, &int, span)?;
                }
                expect_bt(&b, a.bt(), span)?;
                match op {
                    Binop::Lt => IndexTerm::lt(a, b),
                    Binop::Le => IndexTerm::le(a, b),
                    Binop::Gt => IndexTerm::gt(a, b),
                    _ => IndexTerm::ge(a, b),
                }
            }
            Binop::Eq | Binop::Ne => {
                expect_bt(&b, a.bt(), span)?;
                if op == Binop::Eq {
                    IndexTerm::eq(a, b)
                } else {
                    IndexTerm::ne(a, b)
                }
            }
            Binop::And | Binop::Or => {
                expect_bt(&a, &BaseType::Bool, span)?;
                expect_bt(&b, &BaseType::Bool, span)?;
                if op == Binop::And {
                    IndexTerm::and(vec![a, b])
                } else {
                    IndexTerm::or(vec![a, b])
                }
            }
        };
        Ok(Fallible::Normal((v, ctx.clone())))
    }

    /// Check each arm from a marked copy of `ctx`, then join the arms that
    /// reach their end. Arms are tried in order; an arm's path condition
    /// excludes the patterns of the arms before it.
    fn infer_branches<'p, T: 'p>(
        &mut self,
        ctx: &Context,
        scrutinee: Option<&IndexTerm>,
        arms: impl IntoIterator<Item = (Entry<'p>, &'p T)>,
        span: Span,
        mut infer: impl FnMut(&mut Self, &Context, &T) -> Result<Inferred, TypeError>,
    ) -> Result<Inferred, TypeError> {
        let mut closed = Vec::new();
        let mut earlier: Vec<IndexTerm> = Vec::new();
        for (entry, body) in arms {
            let entered = ctx.mark();
            let (entered, guard) = match entry {
                Entry::Guard(g) => (entered.add_constraint(g.clone()), g),
                Entry::Pattern(pat) => {
                    let value = scrutinee
                        .ok_or_else(|| TypeError::internal("pattern arm without scrutinee", span))?;
                    let (entered, matched) = self.match_pattern(&entered, value, pat)?;
                    let mut parts: Vec<IndexTerm> =
                        earlier.iter().map(|g| IndexTerm::not(g.clone())).collect();
                    parts.push(matched.clone());
                    earlier.push(matched);
                    let guard = IndexTerm::and(parts);
                    (entered.add_constraint(guard.clone()), guard)
                }
            };
            let Fallible::Normal(entered) = self.false_if_unreachable(entered) else {
                closed.push(Fallible::Unreachable);
                continue;
            };
            match infer(self, &entered, body)? {
                Fallible::Normal((value, after)) => {
                    closed.push(Fallible::Normal(close_branch(guard, value, after)?));
                }
                Fallible::Unreachable => closed.push(Fallible::Unreachable),
            }
        }
        self.join_branches(closed, span)
    }

    fn join_branches(
        &mut self,
        branches: Vec<Fallible<(IndexTerm, ReturnType, Context)>>,
        span: Span,
    ) -> Result<Inferred, TypeError> {
        let mut contexts = Vec::new();
        let mut returns = Vec::new();
        for (guard, rt, before) in branches.into_iter().filter_map(Fallible::normal) {
            contexts.push(Fallible::Normal(before));
            returns.push(Fallible::Normal((guard, rt)));
        }
        let ctx = reach!(merge_paths(contexts, span)?);
        let (_, rt) = reach!(merge_return_paths(returns, span)?);
        let mut logical = vec![rt.ret.clone()];
        logical.extend(rt.logical.iter().cloned());
        let ctx = self.produce(&ctx, &logical, &rt.resources, &rt.constraints, span)?;
        Ok(Fallible::Normal((rt.ret_term(), ctx)))
    }

    fn infer_expr(&mut self, ctx: &Context, e: &Expr, scope: &Scope) -> Result<Inferred, TypeError> {
        let span = e.span;
        match &e.kind {
            ExprKind::Pure(pe) => self.infer_pexpr(ctx, pe),
            ExprKind::Action(action) => self.infer_action(ctx, action, span),
            ExprKind::Skip => Ok(Fallible::Normal((IndexTerm::unit(), ctx.clone()))),
            ExprKind::Call { func, args } => {
                let (args, ctx) = reach!(self.infer_pexprs(ctx, args)?);
                let spec = self.global.get_function(func, span)?;
                let telescope = self.global.effective_telescope(spec, span)?;
                debug!(function = %func, "call");
                let ctx = self.unpack_resources(&ctx, span)?;
                match self.spine(&ctx, &args, &telescope, span)? {
                    (Tail::Return(rt), ctx) => {
                        let mut logical = vec![rt.ret.clone()];
                        logical.extend(rt.logical.iter().cloned());
                        let ctx = self.produce(&ctx, &logical, &rt.resources, &rt.constraints, span)?;
                        Ok(Fallible::Normal((rt.ret_term(), ctx)))
                    }
                    (Tail::NoReturn, _) => Ok(Fallible::Unreachable),
                    (Tail::Outputs(_), _) => Err(TypeError::internal(
                        format!("`{func}` has a predicate clause for a specification"),
                        span,
                    )),
                }
            }
            ExprKind::Let { pat, value, body } => {
                let (v, ctx) = reach!(self.infer_expr(ctx, value, scope)?);
                let (ctx, _) = self.match_pattern(&ctx, &v, pat)?;
                self.infer_expr(&ctx, body, scope)
            }
            ExprKind::Seq { first, second } => {
                let (_, ctx) = reach!(self.infer_expr(ctx, first, scope)?);
                self.infer_expr(&ctx, second, scope)
            }
            ExprKind::If {
                cond,
                then_branch,
                else_branch,
            } => {
                let (c, ctx) = reach!(self.infer_pexpr(ctx, cond)?);
                expect_bt(&c, &BaseType::Bool, span)?;
                let arms = [
                    (Entry::Guard(c.clone()), then_branch.as_ref()),
                    (Entry::Guard(IndexTerm::not(c)), else_branch.as_ref()),
                ];
                self.infer_branches(&ctx, None, arms, span, |this, ctx, e| {
                    this.infer_expr(ctx, e, scope)
                })
            }
            ExprKind::Case { scrutinee, arms } => {
                let (v, ctx) = reach!(self.infer_pexpr(ctx, scrutinee)?);
                let arms = arms.iter().map(|(p, e)| (Entry::Pattern(p), e));
                self.infer_branches(&ctx, Some(&v), arms, span, |this, ctx, e| {
                    this.infer_expr(ctx, e, scope)
                })
            }
            ExprKind::Run { label, args } => {
                let (args, ctx) = reach!(self.infer_pexprs(ctx, args)?);
                let telescope = scope.labels.get(label).ok_or_else(|| {
                    TypeError::new(
                        ErrorKind::UnboundName {
                            name: label.to_string(),
                        },
                        span,
                    )
                })?;
                debug!(label = %label, "jump");
                let ctx = self.unpack_resources(&ctx, span)?;
                let (_, ctx) = self.spine(&ctx, &args, telescope, span)?;
                ensure_no_leftovers(&ctx, span)?;
                Ok(Fallible::Unreachable)
            }
            ExprKind::Return(pe) => {
                let (v, ctx) = reach!(self.infer_pexpr(ctx, pe)?);
                let rt = scope
                    .ret
                    .as_ref()
                    .ok_or_else(|| TypeError::unsupported("return outside a procedure", span))?;
                self.check_return(&ctx, &v, rt, span)?;
                Ok(Fallible::Unreachable)
            }
            ExprKind::Assert(pe) => {
                let (lc, ctx) = reach!(self.infer_pexpr(ctx, pe)?);
                expect_bt(&lc, &BaseType::Bool, span)?;
                if !self.holds(&ctx, &lc) {
                    return Err(TypeError::new(
                        ErrorKind::UnsatConstraint {
                            constraint: lc.to_string(),
                        },
                        span,
                    )
                    .explained(&ctx));
                }
                Ok(Fallible::Normal((IndexTerm::unit(), ctx.add_constraint(lc))))
            }
        }
    }

    fn infer_action(&mut self, ctx: &Context, action: &Action, span: Span) -> Result<Inferred, TypeError> {
        match action {
            Action::Create { ty } => {
                let ctx = self.unpack_resources(ctx, span)?;
                let p = Symbol::fresh("alloc");
                let pointer = IndexTerm::sym(p.clone(), BaseType::Pointer);
                let mut ctx = ctx
                    .add_logical(p, BaseType::Pointer, span)?
                    .add_constraint(IndexTerm::ne(pointer.clone(), IndexTerm::null()));
                if self.config.check_alignment && ty.align > 1 {
                    ctx = ctx.add_constraint(IndexTerm::eq(
                        IndexTerm::rem(pointer.clone(), IndexTerm::int(i128::from(ty.align))),
                        IndexTerm::int(0),
                    ));
                }
                let footprint = self.store(ty, &pointer, None, span)?;
                debug!(pointer = %pointer, size = ty.size, "create");
                let ctx = self.produce(
                    &ctx,
                    &footprint.logical,
                    &footprint.resources,
                    &footprint.constraints,
                    span,
                )?;
                Ok(Fallible::Normal((pointer, ctx)))
            }
            Action::Kill { ty, pointer } => {
                let (p, ctx) = reach!(self.infer_pexpr(ctx, pointer)?);
                expect_bt(&p, &BaseType::Pointer, span)?;
                let ctx = self.unpack_resources(&ctx, span)?;
                debug!(pointer = %p, size = ty.size, "kill");
                let ctx = self.ownership_request(&ctx, &p, &IndexTerm::int(i128::from(ty.size)), span)?;
                Ok(Fallible::Normal((IndexTerm::unit(), ctx)))
            }
            Action::Store { ty, pointer, value } => {
                let (p, ctx) = reach!(self.infer_pexpr(ctx, pointer)?);
                let (v, ctx) = reach!(self.infer_pexpr(&ctx, value)?);
                expect_bt(&p, &BaseType::Pointer, span)?;
                expect_bt(&v, &ty.bt, span)?;
                let ctx = self.unpack_resources(&ctx, span)?;
                self.check_alignment(&ctx, &p, ty, span)?;
                let ctx = self.ownership_request(&ctx, &p, &IndexTerm::int(i128::from(ty.size)), span)?;
                let written = self.store(ty, &p, Some(&v), span)?;
                let ctx = self.produce(
                    &ctx,
                    &written.logical,
                    &written.resources,
                    &written.constraints,
                    span,
                )?;
                Ok(Fallible::Normal((IndexTerm::unit(), ctx)))
            }
            Action::Load { ty, pointer } => {
                let (p, ctx) = reach!(self.infer_pexpr(ctx, pointer)?);
                expect_bt(&p, &BaseType::Pointer, span)?;
                let ctx = self.unpack_resources(&ctx, span)?;
                self.check_alignment(&ctx, &p, ty, span)?;
                let (value, loaded) = self.load(&ctx, ty, &p, span)?;
                let ctx = self.produce(&ctx, &loaded.logical, &[], &loaded.constraints, span)?;
                Ok(Fallible::Normal((value, ctx)))
            }
        }
    }
}

/// Package what a branch added since its marker as a return type, and
/// rewind to the context before the marker.
fn close_branch(
    guard: IndexTerm,
    value: IndexTerm,
    ctx: Context,
) -> Result<(IndexTerm, ReturnType, Context), TypeError> {
    let (since, before) = ctx.since()?;
    let ret = Symbol::fresh("ret");
    let mut rt = ReturnType::new(ret, value.bt().clone());
    for (s, binding) in since {
        match binding {
            Binding::Logical(sort) => rt.logical.push((s, sort)),
            Binding::Resource(r) => rt.resources.push(r),
            Binding::Constraint(lc) if lc != guard => rt.constraints.push(lc),
            _ => {}
        }
    }
    let ret_is_value = IndexTerm::eq(rt.ret_term(), value);
    rt.constraints.push(ret_is_value);
    Ok((guard, rt, before))
}

/// Check a function with a pure body against its specification.
pub fn check_function<S: Solver + ?Sized>(
    global: &Global,
    solver: &mut S,
    config: &CheckerConfig,
    spec: &FunctionSpec,
    body: &PExpr,
) -> Result<(), TypeError> {
    Checker::new(global, solver, config).check_function(spec, body)
}

/// Check a procedure body, with its labels, against its specification.
pub fn check_procedure<S: Solver + ?Sized>(
    global: &Global,
    solver: &mut S,
    config: &CheckerConfig,
    spec: &FunctionSpec,
    body: &Expr,
    labels: &[LabelDef],
) -> Result<(), TypeError> {
    Checker::new(global, solver, config).check_procedure(spec, body, labels)
}
