#![forbid(unsafe_code)]

use std::str::FromStr;

use cinder_ast::IndexTerm;
use miette::Diagnostic;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Decision procedure behind the checker's `holds` and inconsistency queries.
///
/// Answers must be sound: `true` only when the claim really holds. `false`
/// means "could not establish", which callers report as a verification
/// failure.
pub trait Prover {
    /// `facts` imply `goal`.
    fn entails(&mut self, facts: &[IndexTerm], goal: &IndexTerm) -> bool;

    /// `facts` have no model.
    fn unsatisfiable(&mut self, facts: &[IndexTerm]) -> bool;
}

impl<P: Prover + ?Sized> Prover for &mut P {
    fn entails(&mut self, facts: &[IndexTerm], goal: &IndexTerm) -> bool {
        (**self).entails(facts, goal)
    }

    fn unsatisfiable(&mut self, facts: &[IndexTerm]) -> bool {
        (**self).unsatisfiable(facts)
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SmtProfile {
    /// Very low timeouts, few case splits.
    Fast,
    /// CI-friendly medium timeouts.
    #[default]
    Ci,
    /// Higher timeouts, deep case splitting.
    Thorough,
}

impl SmtProfile {
    pub fn timeout_ms(self) -> u32 {
        match self {
            SmtProfile::Fast => 50,
            SmtProfile::Ci => 250,
            SmtProfile::Thorough => 2_000,
        }
    }

    /// Case-split budget of the built-in prover.
    pub fn case_splits(self) -> usize {
        match self {
            SmtProfile::Fast => 8,
            SmtProfile::Ci => 64,
            SmtProfile::Thorough => 1_024,
        }
    }
}

#[derive(Debug, Error, Diagnostic)]
#[error("unknown solver profile `{0}` (expected fast, ci or thorough)")]
#[diagnostic(code(cinder::profile))]
pub struct UnknownProfile(pub String);

impl FromStr for SmtProfile {
    type Err = UnknownProfile;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "fast" => Ok(SmtProfile::Fast),
            "ci" => Ok(SmtProfile::Ci),
            "thorough" => Ok(SmtProfile::Thorough),
            _ => Err(UnknownProfile(s.to_string())),
        }
    }
}

#[cfg(feature = "z3")]
pub mod z3_prover {
    use std::collections::HashMap;

    use super::{Prover, SmtProfile};
    use cinder_ast::{ArithOp, CmpOp, IndexTerm, Term};
    use tracing::trace;

    use z3::{
        Config, Context, Params, SatResult, Solver,
        ast::{Ast, Bool, Int},
    };

    /// Prover backed by Z3 over the integer, pointer and boolean fragment.
    ///
    /// Subterms outside that fragment become uninterpreted constants, one per
    /// distinct term, so the translation stays sound.
    pub struct Z3Prover {
        ctx: &'static Context,
        profile: SmtProfile,
        opaque_ints: HashMap<IndexTerm, Int<'static>>,
        opaque_bools: HashMap<IndexTerm, Bool<'static>>,
    }

    impl Z3Prover {
        pub fn new(profile: SmtProfile) -> Self {
            let cfg = Config::new();
            // Leaked so translated terms can be cached across queries without
            // a self-referential struct.
            let ctx: &'static Context = Box::leak(Box::new(Context::new(&cfg)));
            Self {
                ctx,
                profile,
                opaque_ints: HashMap::new(),
                opaque_bools: HashMap::new(),
            }
        }

        fn opaque_int(&mut self, t: &IndexTerm) -> Int<'static> {
            let ctx = self.ctx;
            let n = self.opaque_ints.len();
            self.opaque_ints
                .entry(t.clone())
                .or_insert_with(|| Int::new_const(ctx, format!("opaque_int!{n}")))
                .clone()
        }

        fn opaque_bool(&mut self, t: &IndexTerm) -> Bool<'static> {
            let ctx = self.ctx;
            let n = self.opaque_bools.len();
            self.opaque_bools
                .entry(t.clone())
                .or_insert_with(|| Bool::new_const(ctx, format!("opaque_bool!{n}")))
                .clone()
        }

        fn int(&mut self, t: &IndexTerm) -> Int<'static> {
            let ctx = self.ctx;
            match t.term() {
                Term::Sym(s) if t.bt().is_arithmetic() => {
                    Int::new_const(ctx, format!("{}!{}", s.hint(), s.id()))
                }
                Term::Int(n) => match i64::try_from(*n) {
                    Ok(n) => Int::from_i64(ctx, n),
                    Err(_) => self.opaque_int(t),
                },
                Term::Null => Int::from_i64(ctx, 0),
                Term::Arith(op, a, b) => {
                    let a = self.int(a);
                    let b = self.int(b);
                    match op {
                        ArithOp::Add => Int::add(ctx, &[&a, &b]),
                        ArithOp::Sub => Int::sub(ctx, &[&a, &b]),
                        ArithOp::Mul => Int::mul(ctx, &[&a, &b]),
                        ArithOp::Div => a.div(&b),
                        ArithOp::Rem => a.rem(&b),
                    }
                }
                Term::PtrAdd(a, b) => {
                    let a = self.int(a);
                    let b = self.int(b);
                    Int::add(ctx, &[&a, &b])
                }
                Term::Ite(c, a, b) => {
                    let c = self.boolean(c);
                    let a = self.int(a);
                    let b = self.int(b);
                    c.ite(&a, &b)
                }
                _ => self.opaque_int(t),
            }
        }

        fn boolean(&mut self, t: &IndexTerm) -> Bool<'static> {
            let ctx = self.ctx;
            match t.term() {
                Term::Bool(b) => Bool::from_bool(ctx, *b),
                Term::Sym(s) => Bool::new_const(ctx, format!("{}!{}", s.hint(), s.id())),
                Term::Not(a) => self.boolean(a).not(),
                Term::And(items) => {
                    let items: Vec<_> = items.iter().map(|i| self.boolean(i)).collect();
                    let refs: Vec<_> = items.iter().collect();
                    Bool::and(ctx, &refs)
                }
                Term::Or(items) => {
                    let items: Vec<_> = items.iter().map(|i| self.boolean(i)).collect();
                    let refs: Vec<_> = items.iter().collect();
                    Bool::or(ctx, &refs)
                }
                Term::Implies(a, b) => {
                    let a = self.boolean(a);
                    let b = self.boolean(b);
                    a.implies(&b)
                }
                Term::Ite(c, a, b) => {
                    let c = self.boolean(c);
                    let a = self.boolean(a);
                    let b = self.boolean(b);
                    c.ite(&a, &b)
                }
                Term::Cmp(op, a, b) => {
                    let a = self.int(a);
                    let b = self.int(b);
                    match op {
                        CmpOp::Lt => a.lt(&b),
                        CmpOp::Le => a.le(&b),
                    }
                }
                Term::Eq(a, b) if a.bt().is_arithmetic() => {
                    let a = self.int(a);
                    let b = self.int(b);
                    a._eq(&b)
                }
                Term::Eq(a, b) if *a.bt() == cinder_ast::BaseType::Bool => {
                    let a = self.boolean(a);
                    let b = self.boolean(b);
                    a._eq(&b)
                }
                Term::Eq(a, b) if a == b => Bool::from_bool(ctx, true),
                _ => self.opaque_bool(t),
            }
        }

        fn check(&mut self, assertions: &[Bool<'static>]) -> SatResult {
            let solver = Solver::new(self.ctx);
            let mut params = Params::new(self.ctx);
            params.set_u32("timeout", self.profile.timeout_ms());
            params.set_u32("smt.random_seed", 0);
            solver.set_params(&params);
            for a in assertions {
                solver.assert(a);
            }
            solver.check()
        }
    }

    impl Prover for Z3Prover {
        fn entails(&mut self, facts: &[IndexTerm], goal: &IndexTerm) -> bool {
            let mut assertions: Vec<_> = facts.iter().map(|f| self.boolean(f)).collect();
            assertions.push(self.boolean(goal).not());
            let result = self.check(&assertions);
            trace!(%goal, ?result, "z3 entailment query");
            result == SatResult::Unsat
        }

        fn unsatisfiable(&mut self, facts: &[IndexTerm]) -> bool {
            let assertions: Vec<_> = facts.iter().map(|f| self.boolean(f)).collect();
            self.check(&assertions) == SatResult::Unsat
        }
    }
}
