#![forbid(unsafe_code)]

use cinder_ast::IndexTerm;
use cinder_verify::Prover;
use tracing::trace;

use crate::context::Context;

/// Logical queries against a typing context.
pub trait Solver {
    /// The context's constraints imply `lc`.
    fn holds(&mut self, ctx: &Context, lc: &IndexTerm) -> bool;

    /// The context's constraints have no model, so this point is unreachable.
    fn is_inconsistent(&mut self, ctx: &Context) -> bool;
}

impl<P: Prover + ?Sized> Solver for P {
    fn holds(&mut self, ctx: &Context, lc: &IndexTerm) -> bool {
        let facts = ctx.all_constraints();
        let ok = self.entails(&facts, lc);
        trace!(constraint = %lc, holds = ok, "solver query");
        ok
    }

    fn is_inconsistent(&mut self, ctx: &Context) -> bool {
        self.unsatisfiable(&ctx.all_constraints())
    }
}
