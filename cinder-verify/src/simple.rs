#![forbid(unsafe_code)]

use std::collections::{BTreeSet, HashMap};

use cinder_ast::{IndexTerm, Subst, Term};
use tracing::trace;

use crate::normalize::{Formula, Linear, normalize, simplify, to_formula};
use crate::solver::{Prover, SmtProfile};

/// Fourier–Motzkin gives up past this many inequalities.
const MAX_INEQUALITIES: usize = 400;

/// Built-in refutation prover for linear integer/pointer arithmetic with
/// opaque boolean atoms.
///
/// Sound but incomplete: equalities are eliminated by substitution,
/// inequalities by Fourier–Motzkin with integer tightening, and
/// disjunctions by case splitting up to `max_case_splits` splits per query.
#[derive(Clone, Debug)]
pub struct SimpleProver {
    max_case_splits: usize,
}

impl SimpleProver {
    pub fn new(max_case_splits: usize) -> Self {
        Self { max_case_splits }
    }

    pub fn from_profile(profile: SmtProfile) -> Self {
        Self::new(profile.case_splits())
    }

    fn refute(&self, facts: Vec<Formula>) -> bool {
        Refutation {
            splits_left: self.max_case_splits,
        }
        .refute(facts)
    }
}

impl Default for SimpleProver {
    fn default() -> Self {
        Self::from_profile(SmtProfile::default())
    }
}

impl Prover for SimpleProver {
    fn entails(&mut self, facts: &[IndexTerm], goal: &IndexTerm) -> bool {
        let goal = simplify(goal);
        if goal.is_true() || facts.contains(&goal) {
            return true;
        }
        let mut formulas: Vec<Formula> = facts.iter().map(normalize).collect();
        formulas.push(to_formula(&goal, false));
        let proved = self.refute(formulas);
        trace!(%goal, facts = facts.len(), proved, "entailment query");
        proved
    }

    fn unsatisfiable(&mut self, facts: &[IndexTerm]) -> bool {
        let refuted = self.refute(facts.iter().map(normalize).collect());
        trace!(facts = facts.len(), refuted, "consistency query");
        refuted
    }
}

struct Refutation {
    splits_left: usize,
}

impl Refutation {
    /// `true` when the conjunction of `facts` has no integer model.
    fn refute(&mut self, mut facts: Vec<Formula>) -> bool {
        loop {
            let mut literals = Vec::new();
            let mut disjunctions = Vec::new();
            for f in facts {
                if !flatten(f, &mut literals, &mut disjunctions) {
                    return true;
                }
            }

            if let Some(s) = find_substitution(&literals) {
                facts = literals
                    .into_iter()
                    .chain(disjunctions)
                    .map(|f| f.subst(&s))
                    .collect();
                continue;
            }

            if contradictory_atoms(&literals) || infeasible(&literals) {
                return true;
            }

            if disjunctions.is_empty() || self.splits_left == 0 {
                return false;
            }
            self.splits_left -= 1;
            let Formula::Or(alternatives) = disjunctions.remove(0) else {
                return false;
            };
            return alternatives.into_iter().all(|alt| {
                let mut branch = literals.clone();
                branch.extend(disjunctions.iter().cloned());
                branch.push(alt);
                self.refute(branch)
            });
        }
    }
}

/// Split `f` into literals and disjunctions. Returns `false` on a literal `false`.
fn flatten(f: Formula, literals: &mut Vec<Formula>, disjunctions: &mut Vec<Formula>) -> bool {
    match f {
        Formula::Const(b) => b,
        Formula::And(items) => items
            .into_iter()
            .all(|i| flatten(i, literals, disjunctions)),
        Formula::Or(_) => {
            disjunctions.push(f);
            true
        }
        other => {
            literals.push(other);
            true
        }
    }
}

/// One variable definition read off a literal, if any literal is a definition.
fn find_substitution(literals: &[Formula]) -> Option<Subst> {
    for lit in literals {
        let found = match lit {
            Formula::Eq(l) => solve_linear(l),
            Formula::Atom(t, polarity) => solve_atom(t, *polarity),
            _ => None,
        };
        if let Some((x, value)) = found {
            let mut s = Subst::new();
            s.insert(x, value);
            return Some(s);
        }
    }
    None
}

fn solve_linear(l: &Linear) -> Option<(cinder_ast::Symbol, IndexTerm)> {
    l.coeffs.iter().find_map(|(atom, c)| {
        let x = atom.as_sym()?;
        if c.abs() != 1 {
            return None;
        }
        let rest = l.without(atom);
        if rest.mentions(x) {
            return None;
        }
        // c·x + rest = 0  =>  x = -c·rest
        let value = rest.scale(-c)?.to_term(atom.bt());
        Some((x.clone(), value))
    })
}

fn solve_atom(t: &IndexTerm, polarity: bool) -> Option<(cinder_ast::Symbol, IndexTerm)> {
    match t.term() {
        Term::Sym(b) => Some((b.clone(), IndexTerm::boolean(polarity))),
        Term::Eq(a, b) if polarity => {
            if let Some(x) = a.as_sym().filter(|x| !b.mentions(x)) {
                Some((x.clone(), b.clone()))
            } else {
                b.as_sym()
                    .filter(|x| !a.mentions(x))
                    .map(|x| (x.clone(), a.clone()))
            }
        }
        _ => None,
    }
}

fn contradictory_atoms(literals: &[Formula]) -> bool {
    let mut seen: HashMap<&IndexTerm, bool> = HashMap::new();
    for lit in literals {
        if let Formula::Atom(t, p) = lit {
            if let Some(prev) = seen.insert(t, *p) {
                if prev != *p {
                    return true;
                }
            }
        }
    }
    false
}

fn infeasible(literals: &[Formula]) -> bool {
    let mut ineqs = Vec::new();
    for lit in literals {
        match lit {
            Formula::Le(l) => ineqs.push(l.clone()),
            Formula::Eq(l) => {
                ineqs.push(l.clone());
                if let Some(n) = l.scale(-1) {
                    ineqs.push(n);
                }
            }
            _ => {}
        }
    }
    fourier_motzkin(ineqs)
}

/// `true` when the system `lin <= 0` for every `lin` has no integer solution.
fn fourier_motzkin(mut ineqs: Vec<Linear>) -> bool {
    loop {
        let mut system = BTreeSet::new();
        for l in ineqs {
            match Formula::le(l) {
                Formula::Const(false) => return true,
                Formula::Le(l) => {
                    system.insert(l);
                }
                _ => {}
            }
        }
        if system.is_empty() || system.len() > MAX_INEQUALITIES {
            return false;
        }

        let atoms: BTreeSet<&IndexTerm> = system.iter().flat_map(|l| l.coeffs.keys()).collect();
        let Some(pivot) = atoms
            .into_iter()
            .min_by_key(|a| {
                let pos = system.iter().filter(|l| l.coeff_of(a) > 0).count();
                let neg = system.iter().filter(|l| l.coeff_of(a) < 0).count();
                pos * neg
            })
            .cloned()
        else {
            return false;
        };

        let mut keep = Vec::new();
        let mut upper = Vec::new();
        let mut lower = Vec::new();
        for l in system {
            match l.coeff_of(&pivot).signum() {
                1 => upper.push(l),
                -1 => lower.push(l),
                _ => keep.push(l),
            }
        }
        for u in &upper {
            for w in &lower {
                let a = u.coeff_of(&pivot);
                let b = -w.coeff_of(&pivot);
                let combined = u
                    .scale(b)
                    .and_then(|x| w.scale(a).and_then(|y| x.add(&y)));
                if let Some(c) = combined {
                    keep.push(c);
                }
            }
        }
        ineqs = keep;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cinder_ast::{BaseType, Symbol};

    fn var(name: &str, bt: BaseType) -> IndexTerm {
        IndexTerm::sym(Symbol::fresh(name), bt)
    }

    #[test]
    fn proves_successor_positive() {
        let x = var("x", BaseType::Integer);
        let mut p = SimpleProver::default();
        let facts = [IndexTerm::ge(x.clone(), IndexTerm::int(0))];
        assert!(p.entails(&facts, &IndexTerm::gt(IndexTerm::add(x.clone(), IndexTerm::int(1)), IndexTerm::int(0))));
        assert!(!p.entails(&facts, &IndexTerm::gt(x, IndexTerm::int(0))));
    }

    #[test]
    fn chains_equalities() {
        let x = var("x", BaseType::Integer);
        let y = var("y", BaseType::Integer);
        let facts = [
            IndexTerm::eq(x.clone(), IndexTerm::add(y.clone(), IndexTerm::int(1))),
            IndexTerm::eq(y, IndexTerm::int(2)),
        ];
        let mut p = SimpleProver::default();
        assert!(p.entails(&facts, &IndexTerm::eq(x, IndexTerm::int(3))));
    }

    #[test]
    fn pointer_disequality_survives_aliasing() {
        let ptr = var("p", BaseType::Pointer);
        let q = var("q", BaseType::Pointer);
        let facts = [
            IndexTerm::ne(ptr.clone(), IndexTerm::null()),
            IndexTerm::eq(q.clone(), ptr),
        ];
        let mut p = SimpleProver::default();
        assert!(p.entails(&facts, &IndexTerm::ne(q, IndexTerm::null())));
    }

    #[test]
    fn splits_on_disjunctive_facts() {
        let c = var("c", BaseType::Bool);
        let r = var("ret", BaseType::Integer);
        let fact = IndexTerm::or(vec![
            IndexTerm::and(vec![c.clone(), IndexTerm::eq(r.clone(), IndexTerm::int(1))]),
            IndexTerm::and(vec![IndexTerm::not(c), IndexTerm::eq(r.clone(), IndexTerm::int(2))]),
        ]);
        let mut p = SimpleProver::default();
        assert!(p.entails(&[fact.clone()], &IndexTerm::ge(r.clone(), IndexTerm::int(1))));
        assert!(!p.entails(&[fact], &IndexTerm::eq(r, IndexTerm::int(1))));
    }

    #[test]
    fn detects_inconsistent_bounds_and_atoms() {
        let x = var("x", BaseType::Integer);
        let b = var("b", BaseType::Bool);
        let mut p = SimpleProver::default();
        assert!(p.unsatisfiable(&[
            IndexTerm::lt(x.clone(), IndexTerm::int(0)),
            IndexTerm::gt(x.clone(), IndexTerm::int(0)),
        ]));
        assert!(p.unsatisfiable(&[b.clone(), IndexTerm::not(b)]));
        assert!(!p.unsatisfiable(&[IndexTerm::ge(x, IndexTerm::int(0))]));
    }

    #[test]
    fn integer_tightening_refutes_rational_solutions() {
        // 0 < 2x < 2 has a rational solution but no integer one.
        let x = var("x", BaseType::Integer);
        let two_x = IndexTerm::mul(IndexTerm::int(2), x);
        let mut p = SimpleProver::default();
        assert!(p.unsatisfiable(&[
            IndexTerm::lt(IndexTerm::int(0), two_x.clone()),
            IndexTerm::lt(two_x, IndexTerm::int(2)),
        ]));
    }

    #[test]
    fn zero_split_budget_gives_up_on_disjunctions() {
        let x = var("x", BaseType::Integer);
        let fact = IndexTerm::or(vec![
            IndexTerm::eq(x.clone(), IndexTerm::int(1)),
            IndexTerm::eq(x.clone(), IndexTerm::int(2)),
        ]);
        let mut p = SimpleProver::new(0);
        assert!(!p.entails(&[fact], &IndexTerm::ge(x, IndexTerm::int(1))));
    }
}
