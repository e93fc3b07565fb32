#![forbid(unsafe_code)]

use std::collections::{BTreeSet, HashMap};
use std::fmt;

use crate::symbol::Symbol;
use crate::types::{BaseType, Member, Tag};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ArithOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
}

impl ArithOp {
    fn symbol(self) -> &'static str {
        match self {
            ArithOp::Add => "+",
            ArithOp::Sub => "-",
            ArithOp::Mul => "*",
            ArithOp::Div => "/",
            ArithOp::Rem => "%",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum CmpOp {
    Lt,
    Le,
}

/// Symbolic expression used both for run-time values and inside formulas.
///
/// Every term carries its base type. Build terms through the constructor
/// functions below; they compute the type of the result.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct IndexTerm {
    term: Box<Term>,
    bt: BaseType,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Term {
    Sym(Symbol),
    Unit,
    Bool(bool),
    Int(i128),
    Null,
    Arith(ArithOp, IndexTerm, IndexTerm),
    Cmp(CmpOp, IndexTerm, IndexTerm),
    Eq(IndexTerm, IndexTerm),
    Not(IndexTerm),
    And(Vec<IndexTerm>),
    Or(Vec<IndexTerm>),
    Implies(IndexTerm, IndexTerm),
    Ite(IndexTerm, IndexTerm, IndexTerm),
    /// Pointer plus a byte offset.
    PtrAdd(IndexTerm, IndexTerm),
    StructLit(Tag, Vec<(Member, IndexTerm)>),
    StructMember(IndexTerm, Member),
    Nil,
    Cons(IndexTerm, IndexTerm),
    Head(IndexTerm),
    Tail(IndexTerm),
    Tuple(Vec<IndexTerm>),
    NthTuple(usize, IndexTerm),
    MapGet(IndexTerm, IndexTerm),
    MapSet(IndexTerm, IndexTerm, IndexTerm),
    /// `MapShift(m, n)[i] = m[i + n]`.
    MapShift(IndexTerm, IndexTerm),
}

pub type Subst = HashMap<Symbol, IndexTerm>;

impl IndexTerm {
    pub fn new(term: Term, bt: BaseType) -> Self {
        Self {
            term: Box::new(term),
            bt,
        }
    }

    pub fn term(&self) -> &Term {
        &self.term
    }

    pub fn bt(&self) -> &BaseType {
        &self.bt
    }

    pub fn sym(s: Symbol, bt: BaseType) -> Self {
        Self::new(Term::Sym(s), bt)
    }

    pub fn unit() -> Self {
        Self::new(Term::Unit, BaseType::Unit)
    }

    pub fn boolean(b: bool) -> Self {
        Self::new(Term::Bool(b), BaseType::Bool)
    }

    pub fn int(n: i128) -> Self {
        Self::new(Term::Int(n), BaseType::Integer)
    }

    pub fn null() -> Self {
        Self::new(Term::Null, BaseType::Pointer)
    }

    pub fn arith(op: ArithOp, a: IndexTerm, b: IndexTerm) -> Self {
        let bt = a.bt.clone();
        Self::new(Term::Arith(op, a, b), bt)
    }

    pub fn add(a: IndexTerm, b: IndexTerm) -> Self {
        Self::arith(ArithOp::Add, a, b)
    }

    pub fn sub(a: IndexTerm, b: IndexTerm) -> Self {
        Self::arith(ArithOp::Sub, a, b)
    }

    pub fn mul(a: IndexTerm, b: IndexTerm) -> Self {
        Self::arith(ArithOp::Mul, a, b)
    }

    pub fn div(a: IndexTerm, b: IndexTerm) -> Self {
        Self::arith(ArithOp::Div, a, b)
    }

    pub fn rem(a: IndexTerm, b: IndexTerm) -> Self {
        Self::new(Term::Arith(ArithOp::Rem, a, b), BaseType::Integer)
    }

    pub fn lt(a: IndexTerm, b: IndexTerm) -> Self {
        Self::new(Term::Cmp(CmpOp::Lt, a, b), BaseType::Bool)
    }

    pub fn le(a: IndexTerm, b: IndexTerm) -> Self {
        Self::new(Term::Cmp(CmpOp::Le, a, b), BaseType::Bool)
    }

    pub fn gt(a: IndexTerm, b: IndexTerm) -> Self {
        Self::lt(b, a)
    }

    pub fn ge(a: IndexTerm, b: IndexTerm) -> Self {
        Self::le(b, a)
    }

    pub fn eq(a: IndexTerm, b: IndexTerm) -> Self {
        Self::new(Term::Eq(a, b), BaseType::Bool)
    }

    pub fn ne(a: IndexTerm, b: IndexTerm) -> Self {
        Self::not(Self::eq(a, b))
    }

    pub fn not(a: IndexTerm) -> Self {
        Self::new(Term::Not(a), BaseType::Bool)
    }

    /// Conjunction; the empty conjunction is `true` and singletons are unwrapped.
    pub fn and(mut items: Vec<IndexTerm>) -> Self {
        match items.len() {
            0 => Self::boolean(true),
            1 => items.remove(0),
            _ => Self::new(Term::And(items), BaseType::Bool),
        }
    }

    /// Disjunction; the empty disjunction is `false` and singletons are unwrapped.
    pub fn or(mut items: Vec<IndexTerm>) -> Self {
        match items.len() {
            0 => Self::boolean(false),
            1 => items.remove(0),
            _ => Self::new(Term::Or(items), BaseType::Bool),
        }
    }

    pub fn implies(a: IndexTerm, b: IndexTerm) -> Self {
        Self::new(Term::Implies(a, b), BaseType::Bool)
    }

    pub fn ite(c: IndexTerm, a: IndexTerm, b: IndexTerm) -> Self {
        let bt = a.bt.clone();
        Self::new(Term::Ite(c, a, b), bt)
    }

    pub fn ptr_add(base: IndexTerm, offset: IndexTerm) -> Self {
        Self::new(Term::PtrAdd(base, offset), BaseType::Pointer)
    }

    /// `base + index * elem_size`.
    pub fn array_shift(base: IndexTerm, elem_size: u64, index: IndexTerm) -> Self {
        Self::ptr_add(base, Self::mul(Self::int(i128::from(elem_size)), index))
    }

    pub fn struct_lit(tag: Tag, fields: Vec<(Member, IndexTerm)>) -> Self {
        let bt = BaseType::Struct(tag.clone());
        Self::new(Term::StructLit(tag, fields), bt)
    }

    pub fn struct_member(t: IndexTerm, member: Member, bt: BaseType) -> Self {
        Self::new(Term::StructMember(t, member), bt)
    }

    pub fn nil(elem: BaseType) -> Self {
        Self::new(Term::Nil, BaseType::list(elem))
    }

    pub fn cons(head: IndexTerm, tail: IndexTerm) -> Self {
        let bt = tail.bt.clone();
        Self::new(Term::Cons(head, tail), bt)
    }

    pub fn head(list: IndexTerm) -> Self {
        let bt = list.bt.list_element().cloned().unwrap_or(BaseType::Unit);
        Self::new(Term::Head(list), bt)
    }

    pub fn tail(list: IndexTerm) -> Self {
        let bt = list.bt.clone();
        Self::new(Term::Tail(list), bt)
    }

    pub fn tuple(items: Vec<IndexTerm>) -> Self {
        let bt = BaseType::Tuple(items.iter().map(|t| t.bt.clone()).collect());
        Self::new(Term::Tuple(items), bt)
    }

    pub fn nth(index: usize, t: IndexTerm) -> Self {
        let bt = match &t.bt {
            BaseType::Tuple(items) => items.get(index).cloned().unwrap_or(BaseType::Unit),
            _ => BaseType::Unit,
        };
        Self::new(Term::NthTuple(index, t), bt)
    }

    pub fn map_get(map: IndexTerm, index: IndexTerm) -> Self {
        let bt = map.bt.map_element().cloned().unwrap_or(BaseType::Unit);
        Self::new(Term::MapGet(map, index), bt)
    }

    pub fn map_set(map: IndexTerm, index: IndexTerm, value: IndexTerm) -> Self {
        let bt = map.bt.clone();
        Self::new(Term::MapSet(map, index, value), bt)
    }

    pub fn map_shift(map: IndexTerm, count: IndexTerm) -> Self {
        let bt = map.bt.clone();
        Self::new(Term::MapShift(map, count), bt)
    }

    pub fn as_sym(&self) -> Option<&Symbol> {
        match &*self.term {
            Term::Sym(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i128> {
        match &*self.term {
            Term::Int(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match &*self.term {
            Term::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn is_true(&self) -> bool {
        self.as_bool() == Some(true)
    }

    pub fn is_false(&self) -> bool {
        self.as_bool() == Some(false)
    }

    /// Immediate subterms, left to right.
    pub fn children(&self) -> Vec<&IndexTerm> {
        match &*self.term {
            Term::Sym(_) | Term::Unit | Term::Bool(_) | Term::Int(_) | Term::Null | Term::Nil => {
                Vec::new()
            }
            Term::Not(a)
            | Term::StructMember(a, _)
            | Term::Head(a)
            | Term::Tail(a)
            | Term::NthTuple(_, a) => vec![a],
            Term::Arith(_, a, b)
            | Term::Cmp(_, a, b)
            | Term::Eq(a, b)
            | Term::Implies(a, b)
            | Term::PtrAdd(a, b)
            | Term::Cons(a, b)
            | Term::MapGet(a, b)
            | Term::MapShift(a, b) => vec![a, b],
            Term::Ite(a, b, c) | Term::MapSet(a, b, c) => vec![a, b, c],
            Term::And(items) | Term::Or(items) | Term::Tuple(items) => items.iter().collect(),
            Term::StructLit(_, fields) => fields.iter().map(|(_, t)| t).collect(),
        }
    }

    /// Rebuild this node with every immediate subterm passed through `f`.
    pub fn map_children(&self, f: &mut impl FnMut(&IndexTerm) -> IndexTerm) -> IndexTerm {
        let term = match &*self.term {
            Term::Sym(_) | Term::Unit | Term::Bool(_) | Term::Int(_) | Term::Null | Term::Nil => {
                return self.clone();
            }
            Term::Arith(op, a, b) => Term::Arith(*op, f(a), f(b)),
            Term::Cmp(op, a, b) => Term::Cmp(*op, f(a), f(b)),
            Term::Eq(a, b) => Term::Eq(f(a), f(b)),
            Term::Not(a) => Term::Not(f(a)),
            Term::And(items) => Term::And(items.iter().map(&mut *f).collect()),
            Term::Or(items) => Term::Or(items.iter().map(&mut *f).collect()),
            Term::Implies(a, b) => Term::Implies(f(a), f(b)),
            Term::Ite(c, a, b) => Term::Ite(f(c), f(a), f(b)),
            Term::PtrAdd(a, b) => Term::PtrAdd(f(a), f(b)),
            Term::StructLit(tag, fields) => Term::StructLit(
                tag.clone(),
                fields.iter().map(|(m, t)| (m.clone(), f(t))).collect(),
            ),
            Term::StructMember(a, m) => Term::StructMember(f(a), m.clone()),
            Term::Cons(a, b) => Term::Cons(f(a), f(b)),
            Term::Head(a) => Term::Head(f(a)),
            Term::Tail(a) => Term::Tail(f(a)),
            Term::Tuple(items) => Term::Tuple(items.iter().map(&mut *f).collect()),
            Term::NthTuple(i, a) => Term::NthTuple(*i, f(a)),
            Term::MapGet(a, b) => Term::MapGet(f(a), f(b)),
            Term::MapSet(a, b, c) => Term::MapSet(f(a), f(b), f(c)),
            Term::MapShift(a, b) => Term::MapShift(f(a), f(b)),
        };
        IndexTerm::new(term, self.bt.clone())
    }

    pub fn subst(&self, s: &Subst) -> IndexTerm {
        if s.is_empty() {
            return self.clone();
        }
        match &*self.term {
            Term::Sym(x) => s.get(x).cloned().unwrap_or_else(|| self.clone()),
            _ => self.map_children(&mut |c| c.subst(s)),
        }
    }

    pub fn collect_free_vars(&self, out: &mut BTreeSet<Symbol>) {
        if let Term::Sym(x) = &*self.term {
            out.insert(x.clone());
        }
        for c in self.children() {
            c.collect_free_vars(out);
        }
    }

    pub fn free_vars(&self) -> BTreeSet<Symbol> {
        let mut out = BTreeSet::new();
        self.collect_free_vars(&mut out);
        out
    }

    pub fn mentions(&self, sym: &Symbol) -> bool {
        match &*self.term {
            Term::Sym(x) => x == sym,
            _ => self.children().into_iter().any(|c| c.mentions(sym)),
        }
    }

    fn is_atomic(&self) -> bool {
        matches!(
            &*self.term,
            Term::Sym(_)
                | Term::Unit
                | Term::Bool(_)
                | Term::Int(_)
                | Term::Null
                | Term::Not(_)
                | Term::Nil
                | Term::Tuple(_)
                | Term::StructLit(..)
                | Term::StructMember(..)
                | Term::Head(_)
                | Term::Tail(_)
                | Term::NthTuple(..)
                | Term::MapGet(..)
                | Term::MapSet(..)
                | Term::MapShift(..)
        )
    }
}

struct Operand<'a>(&'a IndexTerm);

impl fmt::Display for Operand<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_atomic() {
            write!(f, "{}", self.0)
        } else {
            write!(f, "({})", self.0)
        }
    }
}

fn join(f: &mut fmt::Formatter<'_>, items: &[IndexTerm], sep: &str) -> fmt::Result {
    for (i, t) in items.iter().enumerate() {
        if i > 0 {
            write!(f, "{sep}")?;
        }
        write!(f, "{}", Operand(t))?;
    }
    Ok(())
}

impl fmt::Display for IndexTerm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &*self.term {
            Term::Sym(s) => write!(f, "{s}"),
            Term::Unit => write!(f, "()"),
            Term::Bool(b) => write!(f, "{b}"),
            Term::Int(n) => write!(f, "{n}"),
            Term::Null => write!(f, "NULL"),
            Term::Arith(op, a, b) => write!(f, "{} {} {}", Operand(a), op.symbol(), Operand(b)),
            Term::Cmp(CmpOp::Lt, a, b) => write!(f, "{} < {}", Operand(a), Operand(b)),
            Term::Cmp(CmpOp::Le, a, b) => write!(f, "{} <= {}", Operand(a), Operand(b)),
            Term::Eq(a, b) => write!(f, "{} = {}", Operand(a), Operand(b)),
            Term::Not(a) => write!(f, "!{}", Operand(a)),
            Term::And(items) => join(f, items, " && "),
            Term::Or(items) => join(f, items, " || "),
            Term::Implies(a, b) => write!(f, "{} ==> {}", Operand(a), Operand(b)),
            Term::Ite(c, a, b) => write!(
                f,
                "if {} then {} else {}",
                Operand(c),
                Operand(a),
                Operand(b)
            ),
            Term::PtrAdd(a, b) => write!(f, "{} +p {}", Operand(a), Operand(b)),
            Term::StructLit(tag, fields) => {
                write!(f, "struct {tag} {{")?;
                for (i, (m, t)) in fields.iter().enumerate() {
                    if i > 0 {
                        write!(f, ",")?;
                    }
                    write!(f, " .{m} = {t}")?;
                }
                write!(f, " }}")
            }
            Term::StructMember(a, m) => write!(f, "{}.{m}", Operand(a)),
            Term::Nil => write!(f, "[]"),
            Term::Cons(a, b) => write!(f, "{} :: {}", Operand(a), Operand(b)),
            Term::Head(a) => write!(f, "hd({a})"),
            Term::Tail(a) => write!(f, "tl({a})"),
            Term::Tuple(items) => {
                write!(f, "(")?;
                join(f, items, ", ")?;
                write!(f, ")")
            }
            Term::NthTuple(i, a) => write!(f, "{}.{i}", Operand(a)),
            Term::MapGet(m, i) => write!(f, "{}[{i}]", Operand(m)),
            Term::MapSet(m, i, v) => write!(f, "{}[{i} := {v}]", Operand(m)),
            Term::MapShift(m, n) => write!(f, "{}[{n}..]", Operand(m)),
        }
    }
}
