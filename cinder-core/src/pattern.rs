#![forbid(unsafe_code)]

use cinder_ast::{BaseType, IndexTerm, Pattern, PatternKind, Span, Symbol};

use crate::check::Checker;
use crate::context::Context;
use crate::error::{ErrorKind, TypeError};
use crate::solver::Solver;

impl<S: Solver + ?Sized> Checker<'_, S> {
    /// Destructure `value` against `pat`.
    ///
    /// Returns the extended context and the condition under which the
    /// pattern matches. Matching only adds bindings and equalities; the
    /// matched term itself stays as it was.
    pub fn match_pattern(
        &mut self,
        ctx: &Context,
        value: &IndexTerm,
        pat: &Pattern,
    ) -> Result<(Context, IndexTerm), TypeError> {
        let span = pat.span;
        match &pat.kind {
            PatternKind::Bind(name) => {
                let bt = value.bt().clone();
                let v = Symbol::fresh(name.as_ref().map_or("_", |n| n.hint()));
                let mut ctx = ctx
                    .add_logical(v.clone(), bt.clone(), span)?
                    .add_constraint(IndexTerm::eq(IndexTerm::sym(v.clone(), bt.clone()), value.clone()));
                if let Some(name) = name {
                    ctx = ctx.add_computational(name.clone(), v, bt, span)?;
                }
                Ok((ctx, IndexTerm::boolean(true)))
            }
            PatternKind::Nil => {
                let elem = list_element(value, span)?;
                let guard = IndexTerm::eq(value.clone(), IndexTerm::nil(elem));
                Ok((ctx.add_constraint(guard.clone()), guard))
            }
            PatternKind::Cons(head, tail) => {
                let elem = list_element(value, span)?;
                let non_empty = IndexTerm::ne(value.clone(), IndexTerm::nil(elem));
                let ctx = ctx.add_constraint(non_empty.clone());
                let (ctx, g1) = self.match_pattern(&ctx, &IndexTerm::head(value.clone()), head)?;
                let (ctx, g2) = self.match_pattern(&ctx, &IndexTerm::tail(value.clone()), tail)?;
                Ok((ctx, IndexTerm::and(guards([non_empty, g1, g2]))))
            }
            PatternKind::Tuple(items) => {
                let BaseType::Tuple(bts) = value.bt() else {
                    return Err(TypeError::new(
                        ErrorKind::Mismatch {
                            expected: BaseType::Tuple(vec![BaseType::Unit; items.len()]),
                            found: value.bt().clone(),
                        },
                        span,
                    ));
                };
                if bts.len() != items.len() {
                    return Err(TypeError::new(
                        ErrorKind::NumberArguments {
                            expected: bts.len(),
                            found: items.len(),
                        },
                        span,
                    ));
                }
                let mut ctx = ctx.clone();
                let mut parts = Vec::new();
                for (i, item) in items.iter().enumerate() {
                    let (next, g) = self.match_pattern(&ctx, &IndexTerm::nth(i, value.clone()), item)?;
                    ctx = next;
                    parts.push(g);
                }
                Ok((ctx, IndexTerm::and(guards(parts))))
            }
            PatternKind::Specified(inner) => self.match_pattern(ctx, value, inner),
            PatternKind::Array(_) => Err(TypeError::unsupported("array patterns", span)),
            PatternKind::Ctor(name, _) => Err(TypeError::unsupported(
                format!("constructor pattern `{name}`"),
                span,
            )),
        }
    }
}

fn list_element(value: &IndexTerm, span: Span) -> Result<BaseType, TypeError> {
    value.bt().list_element().cloned().ok_or_else(|| {
        TypeError::new(
            ErrorKind::Mismatch {
                expected: BaseType::list(BaseType::Unit),
                found: value.bt().clone(),
            },
            span,
        )
    })
}

fn guards(parts: impl IntoIterator<Item = IndexTerm>) -> Vec<IndexTerm> {
    parts.into_iter().filter(|g| !g.is_true()).collect()
}
