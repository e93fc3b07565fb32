#![forbid(unsafe_code)]

//! Resource request engine.
//!
//! Finds, splits, joins and unfolds live resources so that a requested
//! resource shape is owned. Predicate packing is not done here: a miss on a
//! predicate is reported as [`Requested::NeedsPacking`] and the spine driver
//! decides which pack clauses to try.

use cinder_ast::{BaseType, IndexTerm, Resource, Sort, Span, Subst, Symbol};
use tracing::{debug, trace, warn};

use crate::check::Checker;
use crate::context::{Binding, Context};
use crate::error::{ErrorKind, OwnershipHistory, TypeError};
use crate::solver::Solver;

#[derive(Clone, Debug)]
pub enum Requested {
    /// The resource as owned, with the pointer of the request, and the
    /// context after consuming it.
    Found(Resource, Context),
    /// No live instance of the predicate; packing may produce one.
    NeedsPacking { name: String, iargs: Vec<IndexTerm> },
}

fn mismatch(expected: &Resource, found: &Resource, span: Span) -> TypeError {
    TypeError::new(
        ErrorKind::ResourceMismatch {
            expected: expected.to_string(),
            found: found.to_string(),
        },
        span,
    )
}

fn better_array_inference(span: Span) -> TypeError {
    TypeError::unsupported("better array inference", span)
}

impl<S: Solver + ?Sized> Checker<'_, S> {
    pub(crate) fn holds(&mut self, ctx: &Context, lc: &IndexTerm) -> bool {
        lc.is_true() || self.solver.holds(ctx, lc)
    }

    pub(crate) fn provably_equal(&mut self, ctx: &Context, a: &IndexTerm, b: &IndexTerm) -> bool {
        a == b || self.holds(ctx, &IndexTerm::eq(a.clone(), b.clone()))
    }

    pub(crate) fn is_inconsistent(&mut self, ctx: &Context) -> bool {
        self.solver.is_inconsistent(ctx)
    }

    /// Most recent live resource whose footprint starts at `pointer`.
    fn resource_at(&mut self, ctx: &Context, pointer: &IndexTerm) -> Option<(Symbol, Resource)> {
        for (s, r) in ctx.all_resources().into_iter().rev() {
            if let Some((start, _)) = r.footprint() {
                if self.provably_equal(ctx, &start, pointer) {
                    return Some((s, r));
                }
            }
        }
        None
    }

    fn consume(&mut self, ctx: &Context, s: &Symbol, r: &Resource, span: Span) -> Result<Context, TypeError> {
        debug!(resource = %r, "consume");
        ctx.use_resource(s, vec![span], span)
    }

    /// Search for `r`, whose input terms are known.
    pub fn request(
        &mut self,
        ctx: &Context,
        r: &Resource,
        span: Span,
    ) -> Result<Requested, TypeError> {
        trace!(request = %r, "resource request");
        match r {
            Resource::Points { pointer, size, .. } => self.request_points(ctx, r, pointer, *size, span),
            Resource::Block { pointer, size, .. } | Resource::Region { pointer, size } => {
                let ctx = self.ownership_request(ctx, pointer, size, span)?;
                Ok(Requested::Found(r.clone(), ctx))
            }
            Resource::Array {
                pointer,
                element_size,
                length,
                content,
            } => self.request_array(ctx, pointer, *element_size, length, content.bt(), span),
            Resource::Predicate { name, iargs, .. } => self.request_predicate(ctx, name, iargs, span),
        }
    }

    fn request_points(
        &mut self,
        ctx: &Context,
        requested: &Resource,
        pointer: &IndexTerm,
        size: u64,
        span: Span,
    ) -> Result<Requested, TypeError> {
        match self.resource_at(ctx, pointer) {
            Some((s, found @ Resource::Points { .. })) => {
                let Resource::Points {
                    pointee,
                    size: found_size,
                    ..
                } = &found
                else {
                    return Err(TypeError::internal("points resource expected", span));
                };
                if *found_size != size {
                    return Err(mismatch(requested, &found, span).explained(ctx));
                }
                let pointee = pointee.clone();
                let ctx = self.consume(ctx, &s, &found, span)?;
                Ok(Requested::Found(
                    Resource::points(pointer.clone(), pointee, size),
                    ctx,
                ))
            }
            Some((_, found)) => Err(mismatch(requested, &found, span).explained(ctx)),
            None => Err(self.missing_ownership(ctx, pointer, span)),
        }
    }

    /// Consume ownership of `need` bytes starting at `pointer`, splitting the
    /// last resource if it is larger than what remains.
    pub fn ownership_request(
        &mut self,
        ctx: &Context,
        pointer: &IndexTerm,
        need: &IndexTerm,
        span: Span,
    ) -> Result<Context, TypeError> {
        let mut ctx = ctx.clone();
        let mut pointer = pointer.clone();
        let mut need = need.clone();
        loop {
            if self.holds(&ctx, &IndexTerm::le(need.clone(), IndexTerm::int(0))) {
                return Ok(ctx);
            }
            let Some((s, found)) = self.resource_at(&ctx, &pointer) else {
                return Err(self.missing_ownership(&ctx, &pointer, span));
            };
            let Some((_, size)) = found.footprint() else {
                return Err(TypeError::internal("resource without footprint", span));
            };
            if self.holds(&ctx, &IndexTerm::eq(size.clone(), need.clone())) {
                return self.consume(&ctx, &s, &found, span);
            }
            if self.holds(&ctx, &IndexTerm::gt(size.clone(), need.clone())) {
                let next = self.consume(&ctx, &s, &found, span)?;
                let residual = Resource::region(
                    IndexTerm::ptr_add(pointer.clone(), need.clone()),
                    IndexTerm::sub(size, need),
                );
                return Ok(next.add_resource(residual).1);
            }
            if self.holds(&ctx, &IndexTerm::lt(size.clone(), need.clone())) {
                ctx = self.consume(&ctx, &s, &found, span)?;
                pointer = IndexTerm::ptr_add(pointer, size.clone());
                need = IndexTerm::sub(need, size);
                continue;
            }
            return Err(TypeError::new(
                ErrorKind::UnknownResourceSize {
                    resource: found.to_string(),
                },
                span,
            )
            .explained(&ctx));
        }
    }

    fn request_array(
        &mut self,
        ctx: &Context,
        pointer: &IndexTerm,
        element_size: u64,
        length: &IndexTerm,
        content_sort: &Sort,
        span: Span,
    ) -> Result<Requested, TypeError> {
        let answer = |content: IndexTerm| Resource::Array {
            pointer: pointer.clone(),
            element_size,
            length: length.clone(),
            content,
        };

        if self.holds(ctx, &IndexTerm::le(length.clone(), IndexTerm::int(0))) {
            let xs = Symbol::fresh("xs");
            let ctx = ctx.add_logical(xs.clone(), content_sort.clone(), span)?;
            return Ok(Requested::Found(answer(IndexTerm::sym(xs, content_sort.clone())), ctx));
        }

        let Some((s, found)) = self.resource_at(ctx, pointer) else {
            return Err(self.missing_ownership(ctx, pointer, span));
        };
        match &found {
            Resource::Array {
                element_size: e2,
                length: available,
                content,
                ..
            } => {
                if *e2 != element_size {
                    return Err(mismatch(&answer(content.clone()), &found, span).explained(ctx));
                }
                if self.holds(ctx, &IndexTerm::eq(available.clone(), length.clone())) {
                    let ctx = self.consume(ctx, &s, &found, span)?;
                    return Ok(Requested::Found(answer(content.clone()), ctx));
                }
                if self.holds(ctx, &IndexTerm::lt(length.clone(), available.clone())) {
                    let next = self.consume(ctx, &s, &found, span)?;
                    let residual = Resource::Array {
                        pointer: IndexTerm::array_shift(pointer.clone(), element_size, length.clone()),
                        element_size,
                        length: IndexTerm::sub(available.clone(), length.clone()),
                        content: IndexTerm::map_shift(content.clone(), length.clone()),
                    };
                    let (_, next) = next.add_resource(residual);
                    return Ok(Requested::Found(answer(content.clone()), next));
                }
                let one_more = IndexTerm::add(available.clone(), IndexTerm::int(1));
                if self.holds(ctx, &IndexTerm::eq(length.clone(), one_more)) {
                    let last = IndexTerm::array_shift(pointer.clone(), element_size, available.clone());
                    let Some((s2, cell @ Resource::Points { .. })) = self.resource_at(ctx, &last) else {
                        return Err(better_array_inference(span));
                    };
                    let Resource::Points { pointee, size, .. } = &cell else {
                        return Err(better_array_inference(span));
                    };
                    if *size != element_size {
                        return Err(better_array_inference(span));
                    }
                    let grown = IndexTerm::map_set(content.clone(), available.clone(), pointee.clone());
                    let ctx = self.consume(ctx, &s, &found, span)?;
                    let ctx = self.consume(&ctx, &s2, &cell, span)?;
                    return Ok(Requested::Found(answer(grown), ctx));
                }
                if self.holds(ctx, &IndexTerm::gt(length.clone(), available.clone())) {
                    return Err(better_array_inference(span));
                }
                Err(TypeError::new(
                    ErrorKind::UnknownResourceSize {
                        resource: found.to_string(),
                    },
                    span,
                )
                .explained(ctx))
            }
            Resource::Points { pointee, size, .. } => {
                if *size != element_size {
                    let xs = IndexTerm::sym(Symbol::fresh("xs"), content_sort.clone());
                    return Err(mismatch(&answer(xs), &found, span).explained(ctx));
                }
                if self.holds(ctx, &IndexTerm::eq(length.clone(), IndexTerm::int(1))) {
                    let xs = Symbol::fresh("xs");
                    let content = IndexTerm::sym(xs.clone(), content_sort.clone());
                    let pointee = pointee.clone();
                    let ctx = self.consume(ctx, &s, &found, span)?;
                    let ctx = ctx
                        .add_logical(xs, content_sort.clone(), span)?
                        .add_constraint(IndexTerm::eq(
                            IndexTerm::map_get(content.clone(), IndexTerm::int(0)),
                            pointee,
                        ));
                    return Ok(Requested::Found(answer(content), ctx));
                }
                if self.holds(ctx, &IndexTerm::gt(length.clone(), IndexTerm::int(1))) {
                    return Err(better_array_inference(span));
                }
                Err(TypeError::new(
                    ErrorKind::UnknownResourceSize {
                        resource: found.to_string(),
                    },
                    span,
                )
                .explained(ctx))
            }
            _ => {
                let xs = IndexTerm::sym(Symbol::fresh("xs"), content_sort.clone());
                Err(mismatch(&answer(xs), &found, span).explained(ctx))
            }
        }
    }

    fn request_predicate(
        &mut self,
        ctx: &Context,
        name: &str,
        iargs: &[IndexTerm],
        span: Span,
    ) -> Result<Requested, TypeError> {
        for (s, found) in ctx.all_resources().into_iter().rev() {
            let Resource::Predicate {
                name: found_name,
                iargs: found_iargs,
                oargs,
            } = &found
            else {
                continue;
            };
            if found_name != name || found_iargs.len() != iargs.len() {
                continue;
            }
            let same_inputs = IndexTerm::and(
                iargs
                    .iter()
                    .zip(found_iargs)
                    .map(|(a, b)| IndexTerm::eq(a.clone(), b.clone()))
                    .collect(),
            );
            if self.holds(ctx, &same_inputs) {
                let oargs = oargs.clone();
                let ctx = self.consume(ctx, &s, &found, span)?;
                return Ok(Requested::Found(
                    Resource::Predicate {
                        name: name.to_string(),
                        iargs: iargs.to_vec(),
                        oargs,
                    },
                    ctx,
                ));
            }
        }
        Ok(Requested::NeedsPacking {
            name: name.to_string(),
            iargs: iargs.to_vec(),
        })
    }

    /// Error for a pointer nobody owns, with whatever history explains it.
    pub(crate) fn missing_ownership(&mut self, ctx: &Context, pointer: &IndexTerm, span: Span) -> TypeError {
        let mut used_at = Vec::new();
        for (_, r, spans) in ctx.all_used_resources() {
            if let Some((start, _)) = r.footprint() {
                if self.provably_equal(ctx, &start, pointer) {
                    used_at.extend(spans);
                }
            }
        }
        let kind = if !used_at.is_empty() {
            ErrorKind::MissingOwnership {
                pointer: pointer.to_string(),
                history: OwnershipHistory::UsedAt(used_at),
            }
        } else if let Some(g) = self.global_owning(ctx, pointer) {
            ErrorKind::MissingGlobalOwnership { global: g }
        } else {
            ErrorKind::MissingOwnership {
                pointer: pointer.to_string(),
                history: OwnershipHistory::NeverOwned,
            }
        };
        TypeError::new(kind, span).explained(ctx)
    }

    fn global_owning(&mut self, ctx: &Context, pointer: &IndexTerm) -> Option<String> {
        let global = self.global;
        for g in global.globals() {
            let address = IndexTerm::sym(g.address.clone(), BaseType::Pointer);
            if self.provably_equal(ctx, &address, pointer) {
                return Some(g.address.to_string());
            }
        }
        None
    }

    /// Add logical variables, resources and constraints to `ctx`.
    pub(crate) fn produce(
        &mut self,
        ctx: &Context,
        logical: &[(Symbol, Sort)],
        resources: &[Resource],
        constraints: &[IndexTerm],
        span: Span,
    ) -> Result<Context, TypeError> {
        let mut ctx = ctx.clone();
        for (s, sort) in logical {
            ctx = ctx.add_logical(s.clone(), sort.clone(), span)?;
        }
        for r in resources {
            ctx = ctx.add_resource(r.clone()).1;
        }
        for lc in constraints {
            ctx = ctx.add_constraint(lc.clone());
        }
        Ok(ctx)
    }

    /// Replace predicate resources by their contents wherever exactly one
    /// unpack clause is consistent, until nothing changes.
    pub fn unpack_resources(&mut self, ctx: &Context, span: Span) -> Result<Context, TypeError> {
        if !ctx
            .all_resources()
            .iter()
            .any(|(_, r)| matches!(r, Resource::Predicate { .. }))
        {
            return Ok(ctx.clone());
        }
        if self.is_inconsistent(ctx) {
            return Ok(ctx.clone());
        }
        let global = self.global;
        let mut ctx = ctx.clone();
        for round in 0..self.config.max_unpack_rounds {
            let mut changed = false;
            for (s, r) in ctx.all_resources() {
                let Resource::Predicate { name, iargs, oargs } = &r else {
                    continue;
                };
                let def = global.get_predicate(name, span)?;
                if def.unpack.is_empty() {
                    continue;
                }
                // The binding may have been consumed by an earlier unpacking this round.
                if !matches!(ctx.get(&s), Some(Binding::Resource(_))) {
                    continue;
                }
                let actuals: Vec<IndexTerm> = iargs.iter().chain(oargs).cloned().collect();
                let mut consistent = Vec::new();
                for clause in &def.unpack {
                    let clause = clause.freshen();
                    if clause.computational.len() != actuals.len() {
                        return Err(TypeError::internal(
                            format!("unpack clause of {name} has the wrong number of formals"),
                            span,
                        ));
                    }
                    let formals: Subst = clause
                        .computational
                        .iter()
                        .map(|(x, _)| x.clone())
                        .zip(actuals.iter().cloned())
                        .collect();
                    let clause = clause.subst(&formals);
                    let unpacked = ctx.use_resource(&s, vec![span], span)?;
                    let unpacked = self.produce(
                        &unpacked,
                        &clause.logical,
                        &clause.resources,
                        &clause.constraints,
                        span,
                    )?;
                    if !self.is_inconsistent(&unpacked) {
                        consistent.push(unpacked);
                    }
                }
                match consistent.len() {
                    0 => {
                        return Err(TypeError::internal(
                            format!("no unpack clause of {r} is consistent"),
                            span,
                        )
                        .explained(&ctx));
                    }
                    1 => {
                        debug!(round, predicate = %r, "unpacked");
                        ctx = consistent.remove(0);
                        changed = true;
                    }
                    n => warn!(predicate = %r, clauses = n, "ambiguous unpacking deferred"),
                }
            }
            if !changed {
                break;
            }
        }
        Ok(ctx)
    }
}
