#![forbid(unsafe_code)]

//! Term simplification and the normal form the built-in prover works on.
//!
//! Integer and pointer terms are flattened into linear combinations over
//! atoms (anything that is not `+`, `-`, scaling by a constant or a literal).
//! Pointers are plain integers here and `NULL` is zero. Boolean terms are
//! pushed into negation normal form over three kinds of literal: `lin <= 0`,
//! `lin = 0` and opaque boolean atoms with a polarity.
//!
//! Overflowing coefficients make the affected fact collapse to `true`, which
//! only ever weakens what the prover knows.

use std::collections::BTreeMap;

use cinder_ast::{ArithOp, BaseType, CmpOp, IndexTerm, Subst, Symbol, Term};

/// `Σ coeff·atom + constant`, with no zero coefficients.
#[derive(Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Linear {
    pub coeffs: BTreeMap<IndexTerm, i128>,
    pub constant: i128,
}

impl Linear {
    pub fn constant(c: i128) -> Self {
        Self {
            coeffs: BTreeMap::new(),
            constant: c,
        }
    }

    pub fn atom(t: IndexTerm) -> Self {
        let mut coeffs = BTreeMap::new();
        coeffs.insert(t, 1);
        Self {
            coeffs,
            constant: 0,
        }
    }

    pub fn is_constant(&self) -> bool {
        self.coeffs.is_empty()
    }

    pub fn add(&self, other: &Linear) -> Option<Linear> {
        let mut out = self.clone();
        out.constant = out.constant.checked_add(other.constant)?;
        for (atom, c) in &other.coeffs {
            let entry = out.coeffs.entry(atom.clone()).or_insert(0);
            *entry = entry.checked_add(*c)?;
            if *entry == 0 {
                out.coeffs.remove(atom);
            }
        }
        Some(out)
    }

    pub fn scale(&self, k: i128) -> Option<Linear> {
        if k == 0 {
            return Some(Linear::default());
        }
        let mut coeffs = BTreeMap::new();
        for (atom, c) in &self.coeffs {
            coeffs.insert(atom.clone(), c.checked_mul(k)?);
        }
        Some(Linear {
            coeffs,
            constant: self.constant.checked_mul(k)?,
        })
    }

    pub fn sub(&self, other: &Linear) -> Option<Linear> {
        self.add(&other.scale(-1)?)
    }

    pub fn plus(&self, k: i128) -> Option<Linear> {
        self.add(&Linear::constant(k))
    }

    pub fn coeff_of(&self, atom: &IndexTerm) -> i128 {
        self.coeffs.get(atom).copied().unwrap_or(0)
    }

    pub fn without(&self, atom: &IndexTerm) -> Linear {
        let mut out = self.clone();
        out.coeffs.remove(atom);
        out
    }

    fn coeff_gcd(&self) -> i128 {
        self.coeffs.values().fold(0, |g, c| gcd(g, c.abs()))
    }

    pub fn mentions(&self, sym: &Symbol) -> bool {
        self.coeffs.keys().any(|a| a.mentions(sym))
    }

    /// Rebuild a term of sort `bt` denoting this combination.
    pub fn to_term(&self, bt: &BaseType) -> IndexTerm {
        let mut acc: Option<IndexTerm> = None;
        for (atom, c) in &self.coeffs {
            let summand = if *c == 1 {
                atom.clone()
            } else {
                IndexTerm::new(
                    Term::Arith(ArithOp::Mul, IndexTerm::int(*c), atom.clone()),
                    bt.clone(),
                )
            };
            acc = Some(match acc {
                None => summand,
                Some(a) => IndexTerm::new(Term::Arith(ArithOp::Add, a, summand), bt.clone()),
            });
        }
        match acc {
            None => IndexTerm::new(Term::Int(self.constant), bt.clone()),
            Some(a) if self.constant == 0 => a,
            Some(a) => IndexTerm::new(
                Term::Arith(ArithOp::Add, a, IndexTerm::int(self.constant)),
                bt.clone(),
            ),
        }
    }

    pub fn subst(&self, s: &Subst) -> Option<Linear> {
        let mut out = Linear::constant(self.constant);
        for (atom, c) in &self.coeffs {
            let l = linearize(&simplify(&atom.subst(s))).scale(*c)?;
            out = out.add(&l)?;
        }
        Some(out)
    }
}

pub(crate) fn gcd(a: i128, b: i128) -> i128 {
    let (mut a, mut b) = (a.abs(), b.abs());
    while b != 0 {
        let r = a % b;
        a = b;
        b = r;
    }
    a
}

pub(crate) fn ceil_div(a: i128, b: i128) -> i128 {
    let q = a / b;
    if (a % b != 0) && ((a < 0) == (b < 0)) {
        q + 1
    } else {
        q
    }
}

/// Linear view of an arithmetic term; non-linear parts become atoms.
pub fn linearize(t: &IndexTerm) -> Linear {
    try_linearize(t).unwrap_or_else(|| Linear::atom(t.clone()))
}

fn try_linearize(t: &IndexTerm) -> Option<Linear> {
    match t.term() {
        Term::Int(n) => Some(Linear::constant(*n)),
        Term::Null => Some(Linear::constant(0)),
        Term::Arith(ArithOp::Add, a, b) | Term::PtrAdd(a, b) => linearize(a).add(&linearize(b)),
        Term::Arith(ArithOp::Sub, a, b) => linearize(a).sub(&linearize(b)),
        Term::Arith(ArithOp::Mul, a, b) => {
            let (la, lb) = (linearize(a), linearize(b));
            if la.is_constant() {
                lb.scale(la.constant)
            } else if lb.is_constant() {
                la.scale(lb.constant)
            } else {
                None
            }
        }
        _ => None,
    }
}

/// Bottom-up structural simplification.
pub fn simplify(t: &IndexTerm) -> IndexTerm {
    let t = t.map_children(&mut simplify);
    simplify_node(t)
}

fn simplify_node(t: IndexTerm) -> IndexTerm {
    match t.term() {
        Term::Arith(op, a, b) => match (a.as_int(), b.as_int(), op) {
            (Some(x), Some(y), _) => fold_arith(*op, x, y).map_or(t.clone(), |n| {
                IndexTerm::new(Term::Int(n), t.bt().clone())
            }),
            (Some(0), _, ArithOp::Add) => b.clone(),
            (_, Some(0), ArithOp::Add | ArithOp::Sub) => a.clone(),
            (Some(1), _, ArithOp::Mul) => b.clone(),
            (_, Some(1), ArithOp::Mul | ArithOp::Div) => a.clone(),
            _ => t.clone(),
        },
        Term::PtrAdd(a, b) if b.as_int() == Some(0) => a.clone(),
        Term::Not(a) => match a.term() {
            Term::Bool(b) => IndexTerm::boolean(!b),
            Term::Not(inner) => inner.clone(),
            _ => t.clone(),
        },
        Term::And(items) => {
            let mut out = Vec::new();
            for i in items {
                match i.term() {
                    Term::Bool(true) => {}
                    Term::Bool(false) => return IndexTerm::boolean(false),
                    Term::And(inner) => out.extend(inner.iter().cloned()),
                    _ => out.push(i.clone()),
                }
            }
            IndexTerm::and(out)
        }
        Term::Or(items) => {
            let mut out = Vec::new();
            for i in items {
                match i.term() {
                    Term::Bool(false) => {}
                    Term::Bool(true) => return IndexTerm::boolean(true),
                    Term::Or(inner) => out.extend(inner.iter().cloned()),
                    _ => out.push(i.clone()),
                }
            }
            IndexTerm::or(out)
        }
        Term::Implies(a, b) => match (a.as_bool(), b.as_bool()) {
            (Some(false), _) | (_, Some(true)) => IndexTerm::boolean(true),
            (Some(true), _) => b.clone(),
            _ => t.clone(),
        },
        Term::Eq(a, b) if a == b => IndexTerm::boolean(true),
        Term::Eq(a, b) => match (a.term(), b.term()) {
            (Term::Int(x), Term::Int(y)) => IndexTerm::boolean(x == y),
            (Term::Bool(x), Term::Bool(y)) => IndexTerm::boolean(x == y),
            (Term::Null, Term::Int(n)) | (Term::Int(n), Term::Null) => IndexTerm::boolean(*n == 0),
            _ => t.clone(),
        },
        Term::Cmp(op, a, b) => match (a.as_int(), b.as_int()) {
            (Some(x), Some(y)) => IndexTerm::boolean(match op {
                CmpOp::Lt => x < y,
                CmpOp::Le => x <= y,
            }),
            _ => t.clone(),
        },
        Term::Ite(c, a, b) => match c.as_bool() {
            Some(true) => a.clone(),
            Some(false) => b.clone(),
            None if a == b => a.clone(),
            None => t.clone(),
        },
        Term::StructMember(s, m) => match s.term() {
            Term::StructLit(_, fields) => fields
                .iter()
                .find(|(name, _)| name == m)
                .map_or(t.clone(), |(_, v)| v.clone()),
            _ => t.clone(),
        },
        Term::Head(l) => match l.term() {
            Term::Cons(h, _) => h.clone(),
            _ => t.clone(),
        },
        Term::Tail(l) => match l.term() {
            Term::Cons(_, rest) => rest.clone(),
            _ => t.clone(),
        },
        Term::NthTuple(i, tup) => match tup.term() {
            Term::Tuple(items) => items.get(*i).cloned().unwrap_or_else(|| t.clone()),
            _ => t.clone(),
        },
        Term::MapGet(m, j) => match m.term() {
            Term::MapSet(inner, i, v) => {
                let diff = linearize(i).sub(&linearize(j));
                match diff {
                    Some(d) if d.is_constant() && d.constant == 0 => v.clone(),
                    Some(d) if d.is_constant() => {
                        simplify_node(IndexTerm::map_get(inner.clone(), j.clone()))
                    }
                    _ => t.clone(),
                }
            }
            Term::MapShift(inner, n) => {
                let index = simplify(&IndexTerm::add(j.clone(), n.clone()));
                simplify_node(IndexTerm::map_get(inner.clone(), index))
            }
            _ => t.clone(),
        },
        Term::MapShift(m, n) => {
            if n.as_int() == Some(0) {
                return m.clone();
            }
            match m.term() {
                Term::MapShift(inner, k) => {
                    let count = simplify(&IndexTerm::add(k.clone(), n.clone()));
                    simplify_node(IndexTerm::map_shift(inner.clone(), count))
                }
                _ => t.clone(),
            }
        }
        _ => t.clone(),
    }
}

fn fold_arith(op: ArithOp, x: i128, y: i128) -> Option<i128> {
    match op {
        ArithOp::Add => x.checked_add(y),
        ArithOp::Sub => x.checked_sub(y),
        ArithOp::Mul => x.checked_mul(y),
        ArithOp::Div => x.checked_div(y),
        ArithOp::Rem => x.checked_rem(y),
    }
}

/// Negation normal form over linear literals and opaque atoms.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum Formula {
    Const(bool),
    /// `lin <= 0`
    Le(Linear),
    /// `lin = 0`
    Eq(Linear),
    /// Boolean term the prover cannot look into, with its polarity.
    Atom(IndexTerm, bool),
    And(Vec<Formula>),
    Or(Vec<Formula>),
}

impl Formula {
    pub fn le(l: Linear) -> Formula {
        if l.is_constant() {
            return Formula::Const(l.constant <= 0);
        }
        let g = l.coeff_gcd();
        if g <= 1 {
            return Formula::Le(l);
        }
        let coeffs = l.coeffs.into_iter().map(|(a, c)| (a, c / g)).collect();
        Formula::Le(Linear {
            coeffs,
            constant: ceil_div(l.constant, g),
        })
    }

    pub fn eq(l: Linear) -> Formula {
        if l.is_constant() {
            return Formula::Const(l.constant == 0);
        }
        let g = l.coeff_gcd();
        if l.constant % g != 0 {
            return Formula::Const(false);
        }
        let sign = match l.coeffs.values().next() {
            Some(c) if *c < 0 => -1,
            _ => 1,
        };
        let k = g * sign;
        let coeffs = l.coeffs.into_iter().map(|(a, c)| (a, c / k)).collect();
        Formula::Eq(Linear {
            coeffs,
            constant: l.constant / k,
        })
    }

    pub fn and(items: Vec<Formula>) -> Formula {
        let mut out = Vec::new();
        for f in items {
            match f {
                Formula::Const(true) => {}
                Formula::Const(false) => return Formula::Const(false),
                Formula::And(inner) => out.extend(inner),
                other => out.push(other),
            }
        }
        match out.len() {
            0 => Formula::Const(true),
            1 => out.remove(0),
            _ => Formula::And(out),
        }
    }

    pub fn or(items: Vec<Formula>) -> Formula {
        let mut out = Vec::new();
        for f in items {
            match f {
                Formula::Const(false) => {}
                Formula::Const(true) => return Formula::Const(true),
                Formula::Or(inner) => out.extend(inner),
                other => out.push(other),
            }
        }
        match out.len() {
            0 => Formula::Const(false),
            1 => out.remove(0),
            _ => Formula::Or(out),
        }
    }

    pub fn negate(&self) -> Formula {
        match self {
            Formula::Const(b) => Formula::Const(!b),
            // lin > 0  <=>  1 - lin <= 0
            Formula::Le(l) => l
                .scale(-1)
                .and_then(|n| n.plus(1))
                .map_or(Formula::Const(true), Formula::le),
            Formula::Eq(l) => not_equal(l),
            Formula::Atom(t, p) => Formula::Atom(t.clone(), !p),
            Formula::And(items) => Formula::or(items.iter().map(Formula::negate).collect()),
            Formula::Or(items) => Formula::and(items.iter().map(Formula::negate).collect()),
        }
    }

    pub fn subst(&self, s: &Subst) -> Formula {
        match self {
            Formula::Const(_) => self.clone(),
            Formula::Le(l) => l.subst(s).map_or(Formula::Const(true), Formula::le),
            Formula::Eq(l) => l.subst(s).map_or(Formula::Const(true), Formula::eq),
            Formula::Atom(t, p) => to_formula(&simplify(&t.subst(s)), *p),
            Formula::And(items) => Formula::and(items.iter().map(|f| f.subst(s)).collect()),
            Formula::Or(items) => Formula::or(items.iter().map(|f| f.subst(s)).collect()),
        }
    }
}

/// `lin != 0` over the integers: `lin <= -1` or `lin >= 1`.
fn not_equal(l: &Linear) -> Formula {
    let below = l.plus(1).map_or(Formula::Const(true), Formula::le);
    let above = l
        .scale(-1)
        .and_then(|n| n.plus(1))
        .map_or(Formula::Const(true), Formula::le);
    Formula::or(vec![below, above])
}

fn difference(a: &IndexTerm, b: &IndexTerm) -> Option<Linear> {
    linearize(a).sub(&linearize(b))
}

/// Normal form of `t` (or of `¬t` when `polarity` is false). `t` should
/// already be simplified.
pub fn to_formula(t: &IndexTerm, polarity: bool) -> Formula {
    let pos = |f: Formula| if polarity { f } else { f.negate() };
    match t.term() {
        Term::Bool(b) => Formula::Const(*b == polarity),
        Term::Not(a) => to_formula(a, !polarity),
        Term::And(items) => {
            let parts = items.iter().map(|i| to_formula(i, polarity)).collect();
            if polarity {
                Formula::and(parts)
            } else {
                Formula::or(parts)
            }
        }
        Term::Or(items) => {
            let parts = items.iter().map(|i| to_formula(i, polarity)).collect();
            if polarity {
                Formula::or(parts)
            } else {
                Formula::and(parts)
            }
        }
        Term::Implies(a, b) => {
            let f = Formula::or(vec![to_formula(a, false), to_formula(b, true)]);
            pos(f)
        }
        Term::Ite(c, a, b) => {
            let f = Formula::or(vec![
                Formula::and(vec![to_formula(c, true), to_formula(a, true)]),
                Formula::and(vec![to_formula(c, false), to_formula(b, true)]),
            ]);
            pos(f)
        }
        // a < b  <=>  a - b + 1 <= 0
        Term::Cmp(CmpOp::Lt, a, b) => pos(difference(a, b)
            .and_then(|d| d.plus(1))
            .map_or(Formula::Const(true), Formula::le)),
        Term::Cmp(CmpOp::Le, a, b) => {
            pos(difference(a, b).map_or(Formula::Const(true), Formula::le))
        }
        Term::Eq(a, b) => pos(equality(a, b)),
        _ => Formula::Atom(t.clone(), polarity),
    }
}

fn equality(a: &IndexTerm, b: &IndexTerm) -> Formula {
    if a == b {
        return Formula::Const(true);
    }
    let bt = a.bt();
    if bt.is_arithmetic() {
        return difference(a, b).map_or(Formula::Const(true), Formula::eq);
    }
    match bt {
        BaseType::Unit => Formula::Const(true),
        BaseType::Bool => Formula::or(vec![
            Formula::and(vec![to_formula(a, true), to_formula(b, true)]),
            Formula::and(vec![to_formula(a, false), to_formula(b, false)]),
        ]),
        BaseType::Tuple(items) => Formula::and(
            (0..items.len())
                .map(|i| {
                    let x = simplify(&IndexTerm::nth(i, a.clone()));
                    let y = simplify(&IndexTerm::nth(i, b.clone()));
                    equality(&x, &y)
                })
                .collect(),
        ),
        BaseType::Struct(_) => match (a.term(), b.term()) {
            (Term::StructLit(_, fields), _) | (_, Term::StructLit(_, fields)) => Formula::and(
                fields
                    .iter()
                    .map(|(m, v)| {
                        let x = simplify(&IndexTerm::struct_member(a.clone(), m.clone(), v.bt().clone()));
                        let y = simplify(&IndexTerm::struct_member(b.clone(), m.clone(), v.bt().clone()));
                        equality(&x, &y)
                    })
                    .collect(),
            ),
            _ => opaque_equality(a, b),
        },
        BaseType::List(_) => match (a.term(), b.term()) {
            (Term::Nil, Term::Cons(..)) | (Term::Cons(..), Term::Nil) => Formula::Const(false),
            (Term::Cons(h1, t1), Term::Cons(h2, t2)) => {
                Formula::and(vec![equality(h1, h2), equality(t1, t2)])
            }
            _ => opaque_equality(a, b),
        },
        _ => opaque_equality(a, b),
    }
}

fn opaque_equality(a: &IndexTerm, b: &IndexTerm) -> Formula {
    let (x, y) = if a <= b { (a, b) } else { (b, a) };
    Formula::Atom(IndexTerm::eq(x.clone(), y.clone()), true)
}

/// Simplify then normalise a boolean term.
pub fn normalize(t: &IndexTerm) -> Formula {
    to_formula(&simplify(t), true)
}
